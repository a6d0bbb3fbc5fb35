use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ostool_common::error::InventorySource;
use ostool_common::{CleanupError, CleanupResult, OrphanRecord, OutputFormat, RemoteInstance, RunStage};
use ostool_providers::inventory::HypervisorRecord;
use ostool_providers::shell::ShellTarget;
use ostool_providers::RemoteShell;
use tracing::Instrument;
use uuid::Uuid;

use crate::cleanup::{CleanupExecutor, CleanupReport, ConfirmationPrompt, OutcomeSink};
use crate::control_plane::{ControlPlaneInventory, ControlPlaneInventoryReader};
use crate::hypervisor::{fetch_hypervisors, resolve_hostname};
use crate::provider_manager::DirectoryConnector;
use crate::reconciliation::find_orphans;
use crate::remote_inventory::RemoteInventoryReader;
use crate::report::{self, InventoryReport};
use crate::retry::{with_retry, RetryPolicy};
use crate::state_machine::StageTracker;

/// What to clean and how.
#[derive(Debug, Clone)]
pub struct CleanupRequest {
    pub target: ShellTarget,
    pub dry_run: bool,
    pub output: OutputFormat,
    pub partition_patterns: Vec<String>,
    pub retry: RetryPolicy,
}

/// Collaborators a run talks to.
#[derive(Clone)]
pub struct RunServices {
    pub connector: Arc<dyn DirectoryConnector>,
    pub shell: Arc<dyn RemoteShell>,
    pub prompt: Arc<dyn ConfirmationPrompt>,
    pub outcomes: Arc<dyn OutcomeSink>,
}

#[derive(Debug)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub hypervisor: HypervisorRecord,
    pub control_plane: ControlPlaneInventory,
    pub remote: Vec<RemoteInstance>,
    pub orphans: Vec<OrphanRecord>,
    /// `None` when there was nothing to clean.
    pub cleanup: Option<CleanupReport>,
}

/// Run the whole pipeline under one deadline. On expiry the error names the
/// stage the run had reached; deletions finished before that were already
/// handed to the outcome sink.
pub async fn run_with_deadline(
    deadline: Duration,
    request: CleanupRequest,
    services: RunServices,
) -> CleanupResult<RunSummary> {
    let tracker = StageTracker::new();
    match tokio::time::timeout(deadline, run(&tracker, request, services)).await {
        Ok(result) => result,
        Err(_) => {
            let stage = tracker.current();
            tracing::warn!(%stage, ?deadline, "run deadline expired");
            Err(CleanupError::Timeout { stage, after: deadline })
        }
    }
}

pub async fn run(tracker: &StageTracker, request: CleanupRequest, services: RunServices) -> CleanupResult<RunSummary> {
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("clean_nova_stale_vms", %run_id, ip = %request.target.host);
    run_inner(tracker, run_id, request, services).instrument(span).await
}

async fn run_inner(
    tracker: &StageTracker,
    run_id: Uuid,
    request: CleanupRequest,
    services: RunServices,
) -> CleanupResult<RunSummary> {
    let started_at = Utc::now();
    tracing::debug!(
        user = %request.target.user,
        dry_run = request.dry_run,
        output = ?request.output,
        "starting VM cleanup"
    );

    tracker.advance(RunStage::Authenticating);
    let directory = services
        .connector
        .connect()
        .await
        .map_err(CleanupError::Authentication)?;
    directory
        .verify_identity()
        .await
        .map_err(CleanupError::Authentication)?;

    tracker.advance(RunStage::ResolvingHypervisor);
    let hypervisors = fetch_hypervisors(directory.as_ref(), request.retry)
        .await
        .map_err(|e| CleanupError::fetch(RunStage::ResolvingHypervisor, InventorySource::Hypervisors, e))?;
    let hypervisor = resolve_hostname(&request.target.host, &hypervisors)
        .cloned()
        .ok_or_else(|| CleanupError::Resolution {
            ip: request.target.host.clone(),
        })?;
    tracing::info!(hostname = %hypervisor.hypervisor_hostname, "resolved hypervisor");

    tracker.advance(RunStage::FetchingInventories);
    let control_plane_reader = ControlPlaneInventoryReader::new(directory.clone(), request.retry);
    let remote_reader = RemoteInventoryReader::new(services.shell.clone(), request.partition_patterns.clone());
    let (control_plane, remote) = tokio::join!(
        control_plane_reader.list_instances_on_hypervisor(&hypervisor.hypervisor_hostname),
        with_retry(request.retry, "remote VM list", || remote_reader
            .list_remote_instances(&request.target)),
    );
    let control_plane = control_plane
        .map_err(|e| CleanupError::fetch(RunStage::FetchingInventories, InventorySource::ControlPlane, e))?;
    let remote = remote.map_err(|e| CleanupError::fetch(RunStage::FetchingInventories, InventorySource::Remote, e))?;
    tracing::debug!(
        openstack = control_plane.instances.len(),
        remote = remote.len(),
        "fetched both inventories"
    );

    tracker.advance(RunStage::Reconciling);
    let orphans = find_orphans(&control_plane.instances, &remote);

    tracker.advance(RunStage::Reporting);
    let rendered = report::render_inventory(
        request.output,
        &InventoryReport {
            openstack_vms: &control_plane.instances,
            remote_vms: &remote,
            missing_vms: &orphans,
            failed_projects: &control_plane.failed_projects,
        },
    )?;
    println!("{}", rendered);

    let cleanup = if orphans.is_empty() {
        tracker.advance(RunStage::Idle);
        None
    } else {
        tracker.advance(RunStage::Cleaning);
        tracing::debug!(count = orphans.len(), "found missing VMs, starting deletion");
        let executor = CleanupExecutor::new(
            services.shell.clone(),
            services.prompt.clone(),
            services.outcomes.clone(),
            request.output,
        );
        let outcome = executor.execute(&orphans, &request.target, request.dry_run).await?;
        println!("{}", report::render_cleanup(request.output, &outcome)?);
        Some(outcome)
    };

    tracker.advance(RunStage::Done);
    tracing::debug!("VM cleanup finished");
    Ok(RunSummary {
        run_id,
        started_at,
        finished_at: Utc::now(),
        hypervisor,
        control_plane,
        remote,
        orphans,
        cleanup,
    })
}
