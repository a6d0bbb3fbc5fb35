use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use ostool_common::patterns::parse_partition_patterns;
use ostool_common::{CleanupResult, OutputFormat};
use ostool_providers::shell::ShellTarget;

mod clean_stale_vms;
mod cleanup;
mod cli;
mod config;
mod control_plane;
mod hypervisor;
mod logger;
mod provider_manager;
mod reconciliation;
mod remote_inventory;
mod report;
mod retry;
mod state_machine;

use clean_stale_vms::{CleanupRequest, RunServices};
use cli::{CleanArgs, Cli, Commands};
use provider_manager::{OpenStackConnector, ProviderManager};

const SSH_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::CleanNovaStaleVms(args) => clean_nova_stale_vms(args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn clean_nova_stale_vms(args: CleanArgs) -> CleanupResult<()> {
    logger::init(args.verbose);

    let credentials = config::openstack_credentials_from_env()?;
    tracing::debug!(?credentials, "loaded OpenStack credentials");

    let output = OutputFormat::parse(&args.output);
    let request = CleanupRequest {
        target: ShellTarget::new(&args.ip, &args.user, &args.password),
        dry_run: args.dry_run,
        output,
        partition_patterns: parse_partition_patterns(args.exclude_pattern.as_deref()),
        retry: Default::default(),
    };
    let services = RunServices {
        connector: Arc::new(OpenStackConnector::new(credentials)),
        shell: ProviderManager::remote_shell(SSH_CONNECT_TIMEOUT),
        prompt: Arc::new(cleanup::StdinPrompt),
        outcomes: Arc::new(cleanup::StdoutOutcomes::new(output)),
    };

    let summary =
        clean_stale_vms::run_with_deadline(Duration::from_secs(args.timeout), request, services).await?;
    let deleted = summary
        .cleanup
        .as_ref()
        .map(|c| c.outcomes().iter().filter(|o| o.is_success()).count())
        .unwrap_or(0);
    tracing::debug!(
        run_id = %summary.run_id,
        hostname = %summary.hypervisor.hypervisor_hostname,
        projects = summary.control_plane.projects_scanned,
        openstack = summary.control_plane.instances.len(),
        remote = summary.remote.len(),
        missing = summary.orphans.len(),
        deleted,
        elapsed_ms = (summary.finished_at - summary.started_at).num_milliseconds(),
        "run complete"
    );
    Ok(())
}
