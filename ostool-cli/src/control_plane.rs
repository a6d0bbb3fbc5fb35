use std::sync::Arc;

use anyhow::{anyhow, Result};
use ostool_common::{ControlPlaneInstance, ProjectFailure};
use ostool_providers::inventory::{ProjectRecord, ServerRecord};
use ostool_providers::ComputeDirectory;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::retry::{with_retry, RetryPolicy};

pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Everything the control plane reported for one hypervisor.
#[derive(Debug, Default)]
pub struct ControlPlaneInventory {
    pub instances: Vec<ControlPlaneInstance>,
    pub failed_projects: Vec<ProjectFailure>,
    pub projects_scanned: usize,
}

pub struct ControlPlaneInventoryReader {
    directory: Arc<dyn ComputeDirectory>,
    retry: RetryPolicy,
    max_concurrency: usize,
}

impl ControlPlaneInventoryReader {
    pub fn new(directory: Arc<dyn ComputeDirectory>, retry: RetryPolicy) -> Self {
        Self {
            directory,
            retry,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n.max(1);
        self
    }

    /// Instances on `hypervisor_hostname` across every project.
    ///
    /// Failing to list projects is fatal. A project whose server listing
    /// keeps failing is recorded in `failed_projects` and contributes nothing.
    pub async fn list_instances_on_hypervisor(&self, hypervisor_hostname: &str) -> Result<ControlPlaneInventory> {
        let directory = self.directory.clone();
        let projects = with_retry(self.retry, "list projects", || directory.list_projects()).await?;
        tracing::debug!(count = projects.len(), "fetched projects");

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut set = JoinSet::new();
        for project in projects.iter().cloned() {
            let directory = self.directory.clone();
            let semaphore = semaphore.clone();
            let retry = self.retry;
            let hostname = hypervisor_hostname.to_string();
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                // The listing runs as its own task so a panic in it still
                // reports against this project.
                let (id, name) = (project.id.clone(), project.name.clone());
                let listing = tokio::spawn(async move {
                    let what = format!("list servers for project {}", name);
                    let servers = with_retry(retry, &what, || directory.list_instances(&id)).await?;
                    Ok::<_, anyhow::Error>(on_hypervisor(&servers, &hostname))
                });
                let listed = match listing.await {
                    Ok(listed) => listed,
                    Err(e) => Err(anyhow!("project listing task failed: {}", e)),
                };
                (project, listed)
            });
        }

        let mut inventory = ControlPlaneInventory {
            projects_scanned: projects.len(),
            ..Default::default()
        };
        while let Some(joined) = set.join_next().await {
            let (project, listed) = match joined {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!("project listing task failed: {}", e);
                    continue;
                }
            };
            match listed {
                Ok(names) => {
                    tracing::debug!(project = %project.name, count = names.len(), "fetched VMs for project");
                    inventory
                        .instances
                        .extend(names.into_iter().map(|instance_name| ControlPlaneInstance {
                            instance_name,
                            tenant_name: project.name.clone(),
                            status: String::new(),
                        }));
                }
                Err(e) => {
                    tracing::warn!(project = %project.name, project_id = %project.id, "error fetching VMs for project: {:#}", e);
                    inventory.failed_projects.push(failure(&project, &e));
                }
            }
        }

        tracing::debug!(
            count = inventory.instances.len(),
            failed = inventory.failed_projects.len(),
            "fetched OpenStack VM list"
        );
        Ok(inventory)
    }
}

fn failure(project: &ProjectRecord, error: &anyhow::Error) -> ProjectFailure {
    ProjectFailure {
        project_id: project.id.clone(),
        project_name: project.name.clone(),
        error: format!("{:#}", error),
    }
}

/// Hypervisor-level names of servers placed on `hostname` (case-insensitive).
fn on_hypervisor(servers: &[ServerRecord], hostname: &str) -> Vec<String> {
    servers
        .iter()
        .filter(|s| {
            s.hypervisor_hostname
                .as_deref()
                .is_some_and(|h| h.eq_ignore_ascii_case(hostname))
        })
        .filter_map(|s| match &s.instance_name {
            Some(name) => Some(name.clone()),
            None => {
                tracing::debug!(server = %s.name, "server missing OS-EXT-SRV-ATTR:instance_name");
                None
            }
        })
        .collect()
}
