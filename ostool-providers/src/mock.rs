//! In-memory collaborators for tests and local dry runs.

use crate::shell::{CommandOutput, ShellTarget};
use crate::{inventory, ComputeDirectory, RemoteConnection, RemoteSession, RemoteShell};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct MockComputeDirectory {
    hypervisors: Vec<inventory::HypervisorRecord>,
    projects: Vec<inventory::ProjectRecord>,
    servers: HashMap<String, Vec<inventory::ServerRecord>>,
    failing_tenants: HashSet<String>,
    panicking_tenants: HashSet<String>,
    fail_identity: bool,
    fail_projects: bool,
    hypervisor_failures_left: AtomicUsize,
    instance_calls: AtomicUsize,
    listing_delay: Duration,
    listings_in_flight: AtomicUsize,
    max_listings_in_flight: AtomicUsize,
}

impl MockComputeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hypervisor(mut self, host_ip: &str, hostname: &str) -> Self {
        self.hypervisors.push(inventory::HypervisorRecord {
            host_ip: host_ip.to_string(),
            hypervisor_hostname: hostname.to_string(),
        });
        self
    }

    pub fn with_project(mut self, id: &str, name: &str) -> Self {
        self.projects.push(inventory::ProjectRecord {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    /// Add a server owned by `tenant_id`, placed on `hypervisor_hostname`.
    pub fn with_server(mut self, tenant_id: &str, hypervisor_hostname: &str, instance_name: &str) -> Self {
        self.servers
            .entry(tenant_id.to_string())
            .or_default()
            .push(inventory::ServerRecord {
                name: format!("display-{}", instance_name),
                status: "ACTIVE".to_string(),
                hypervisor_hostname: Some(hypervisor_hostname.to_string()),
                instance_name: Some(instance_name.to_string()),
            });
        self
    }

    pub fn with_raw_server(mut self, tenant_id: &str, server: inventory::ServerRecord) -> Self {
        self.servers.entry(tenant_id.to_string()).or_default().push(server);
        self
    }

    /// Every listing for this tenant fails.
    pub fn failing_tenant(mut self, tenant_id: &str) -> Self {
        self.failing_tenants.insert(tenant_id.to_string());
        self
    }

    /// Listing this tenant panics, as a buggy client would.
    pub fn panicking_tenant(mut self, tenant_id: &str) -> Self {
        self.panicking_tenants.insert(tenant_id.to_string());
        self
    }

    /// Every instance listing takes `delay` before answering.
    pub fn with_listing_delay(mut self, delay: Duration) -> Self {
        self.listing_delay = delay;
        self
    }

    pub fn failing_identity(mut self) -> Self {
        self.fail_identity = true;
        self
    }

    pub fn failing_projects(mut self) -> Self {
        self.fail_projects = true;
        self
    }

    /// The first `n` hypervisor listings fail.
    pub fn flaky_hypervisors(self, n: usize) -> Self {
        self.hypervisor_failures_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn instance_calls(&self) -> usize {
        self.instance_calls.load(Ordering::SeqCst)
    }

    /// Highest number of instance listings that were running at once.
    pub fn max_concurrent_listings(&self) -> usize {
        self.max_listings_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ComputeDirectory for MockComputeDirectory {
    async fn verify_identity(&self) -> Result<()> {
        if self.fail_identity {
            bail!("identity service unreachable");
        }
        Ok(())
    }

    async fn list_hypervisors(&self) -> Result<Vec<inventory::HypervisorRecord>> {
        let left = self.hypervisor_failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.hypervisor_failures_left.store(left - 1, Ordering::SeqCst);
            bail!("failed to list hypervisors: 503 Service Unavailable");
        }
        Ok(self.hypervisors.clone())
    }

    async fn list_projects(&self) -> Result<Vec<inventory::ProjectRecord>> {
        if self.fail_projects {
            bail!("failed to list projects: 403 Forbidden");
        }
        Ok(self.projects.clone())
    }

    async fn list_instances(&self, tenant_id: &str) -> Result<Vec<inventory::ServerRecord>> {
        self.instance_calls.fetch_add(1, Ordering::SeqCst);
        let running = self.listings_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_listings_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.listing_delay.is_zero() {
            tokio::time::sleep(self.listing_delay).await;
        }
        self.listings_in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panicking_tenants.contains(tenant_id) {
            panic!("unexpected payload for tenant {}", tenant_id);
        }
        if self.failing_tenants.contains(tenant_id) {
            return Err(anyhow!("failed to list servers for tenant {}: 500", tenant_id));
        }
        Ok(self.servers.get(tenant_id).cloned().unwrap_or_default())
    }
}

/// Scripted remote host.
///
/// Commands are answered by the first registered responder whose needle is
/// contained in the command; unmatched commands succeed with empty output.
/// Every command that reaches a session is recorded.
#[derive(Clone, Default)]
pub struct MockShell {
    inner: Arc<MockShellState>,
}

#[derive(Default)]
struct MockShellState {
    responders: Mutex<Vec<(String, MockReply)>>,
    refuse_connections: Mutex<bool>,
    session_failures_left: AtomicUsize,
    connections: AtomicUsize,
    sessions: AtomicUsize,
    commands: Mutex<Vec<String>>,
}

#[derive(Clone)]
enum MockReply {
    Output(CommandOutput),
    TransportError(String),
    Stall,
}

impl MockShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, needle: &str, exit_status: u32, stdout: &str, stderr: &str) -> Self {
        self.push(
            needle,
            MockReply::Output(CommandOutput {
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                exit_status: Some(exit_status),
            }),
        );
        self
    }

    pub fn transport_error(self, needle: &str, message: &str) -> Self {
        self.push(needle, MockReply::TransportError(message.to_string()));
        self
    }

    /// Commands containing `needle` never finish.
    pub fn stall(self, needle: &str) -> Self {
        self.push(needle, MockReply::Stall);
        self
    }

    /// The first `n` session opens fail.
    pub fn failing_sessions(self, n: usize) -> Self {
        self.inner.session_failures_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn refuse_connections(self) -> Self {
        *lock(&self.inner.refuse_connections) = true;
        self
    }

    pub fn connections(&self) -> usize {
        self.inner.connections.load(Ordering::SeqCst)
    }

    pub fn sessions(&self) -> usize {
        self.inner.sessions.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<String> {
        lock(&self.inner.commands).clone()
    }

    fn push(&self, needle: &str, reply: MockReply) {
        lock(&self.inner.responders).push((needle.to_string(), reply));
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl RemoteShell for MockShell {
    async fn connect(&self, target: &ShellTarget) -> Result<Box<dyn RemoteConnection>> {
        if *lock(&self.inner.refuse_connections) {
            bail!("dial tcp {}: connection refused", target.address());
        }
        self.inner.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            state: self.inner.clone(),
        }))
    }
}

struct MockConnection {
    state: Arc<MockShellState>,
}

#[async_trait]
impl RemoteConnection for MockConnection {
    async fn open_session(&mut self) -> Result<Box<dyn RemoteSession>> {
        let failing = self
            .state
            .session_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            bail!("ssh: rejected: administratively prohibited (open failed)");
        }
        self.state.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            state: self.state.clone(),
        }))
    }
}

struct MockSession {
    state: Arc<MockShellState>,
}

#[async_trait]
impl RemoteSession for MockSession {
    async fn run(&mut self, command: &str) -> Result<CommandOutput> {
        lock(&self.state.commands).push(command.to_string());

        let reply = lock(&self.state.responders)
            .iter()
            .find(|(needle, _)| command.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone());

        match reply {
            Some(MockReply::Output(out)) => Ok(out),
            Some(MockReply::TransportError(msg)) => Err(anyhow!(msg)),
            Some(MockReply::Stall) => std::future::pending().await,
            None => Ok(CommandOutput {
                exit_status: Some(0),
                ..Default::default()
            }),
        }
    }
}
