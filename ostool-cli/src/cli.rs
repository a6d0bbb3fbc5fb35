use clap::{Args, Parser, Subcommand};

/// Top-level CLI definition for `openstack-tool`.
#[derive(Debug, Parser)]
#[command(
    name = "openstack-tool",
    version,
    about = "Operational helpers for OpenStack PowerVM clouds."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Find VMs a NovaLink host runs that Nova no longer knows about, and optionally delete them.
    CleanNovaStaleVms(CleanArgs),
}

#[derive(Debug, Args)]
pub struct CleanArgs {
    /// SSH user on the hypervisor.
    #[arg(long, value_name = "USER")]
    pub user: String,

    /// SSH password on the hypervisor.
    #[arg(long, value_name = "PASSWORD")]
    pub password: String,

    /// Host IP of the hypervisor, as registered in Nova.
    #[arg(long, value_name = "IP")]
    pub ip: String,

    /// Report what would be deleted without deleting anything.
    #[arg(long)]
    pub dry_run: bool,

    /// `table` or `json`. Anything else falls back to table.
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    pub output: String,

    /// Deadline for the whole run, in seconds.
    #[arg(long, value_name = "SECS", default_value_t = 300)]
    pub timeout: u64,

    #[arg(long, short, help = "Enable debug logging on stderr")]
    pub verbose: bool,

    /// Comma-separated globs of management partitions to ignore on the host.
    #[arg(long, value_name = "GLOBS", help = "Management partitions to skip (default: *ltc*-nova*)")]
    pub exclude_pattern: Option<String>,
}
