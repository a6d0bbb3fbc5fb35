use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use ostool_common::{CleanupError, CleanupOutcome, CleanupResult, OrphanRecord, OutputFormat};
use ostool_providers::shell::ShellTarget;
use ostool_providers::RemoteShell;

use crate::report;

pub const CONFIRMATION_TOKEN: &str = "confirm";

pub fn is_confirmation(response: &str) -> bool {
    response.trim().eq_ignore_ascii_case(CONFIRMATION_TOKEN)
}

fn sh_escape_single(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\"'\"'"))
}

pub fn delete_command(vm: &str) -> String {
    format!(
        "pvmctl LogicalPartition delete --object-id {}",
        sh_escape_single(&format!("name={}", vm))
    )
}

/// Asks the operator to approve a destructive step.
#[async_trait]
pub trait ConfirmationPrompt: Send + Sync {
    /// Show `message` and return the raw response line.
    async fn ask(&self, message: &str) -> Result<String>;
}

/// Prompts on stdout, reads one line from stdin.
pub struct StdinPrompt;

#[async_trait]
impl ConfirmationPrompt for StdinPrompt {
    async fn ask(&self, message: &str) -> Result<String> {
        let message = message.to_string();
        let line = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
            let mut stdout = std::io::stdout();
            write!(stdout, "{}", message)?;
            stdout.flush()?;
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            Ok(line)
        })
        .await??;
        Ok(line)
    }
}

/// Receives each deletion outcome as soon as it is known, so a run cut short
/// still shows what was already deleted.
pub trait OutcomeSink: Send + Sync {
    fn record(&self, outcome: &CleanupOutcome);
}

/// Prints each outcome on stdout in the run's output format.
pub struct StdoutOutcomes {
    format: OutputFormat,
}

impl StdoutOutcomes {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }
}

impl OutcomeSink for StdoutOutcomes {
    fn record(&self, outcome: &CleanupOutcome) {
        match report::render_outcome(self.format, outcome) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!(vm = %outcome.vm, "{}", e),
        }
    }
}

/// Keeps outcomes in memory.
#[cfg(test)]
#[derive(Default)]
pub struct RecordedOutcomes(std::sync::Mutex<Vec<CleanupOutcome>>);

#[cfg(test)]
impl RecordedOutcomes {
    pub fn all(&self) -> Vec<CleanupOutcome> {
        self.0.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl OutcomeSink for RecordedOutcomes {
    fn record(&self, outcome: &CleanupOutcome) {
        self.0.lock().unwrap().push(outcome.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupReport {
    NothingToDo,
    DryRun(Vec<OrphanRecord>),
    Aborted,
    Completed(Vec<CleanupOutcome>),
}

impl CleanupReport {
    pub fn outcomes(&self) -> &[CleanupOutcome] {
        match self {
            CleanupReport::Completed(outcomes) => outcomes,
            _ => &[],
        }
    }
}

pub struct CleanupExecutor {
    shell: Arc<dyn RemoteShell>,
    prompt: Arc<dyn ConfirmationPrompt>,
    outcomes: Arc<dyn OutcomeSink>,
    format: OutputFormat,
}

impl CleanupExecutor {
    pub fn new(
        shell: Arc<dyn RemoteShell>,
        prompt: Arc<dyn ConfirmationPrompt>,
        outcomes: Arc<dyn OutcomeSink>,
        format: OutputFormat,
    ) -> Self {
        Self {
            shell,
            prompt,
            outcomes,
            format,
        }
    }

    pub async fn execute(
        &self,
        orphans: &[OrphanRecord],
        target: &ShellTarget,
        dry_run: bool,
    ) -> CleanupResult<CleanupReport> {
        if orphans.is_empty() {
            return Ok(CleanupReport::NothingToDo);
        }
        if dry_run {
            tracing::info!(count = orphans.len(), "dry run, nothing will be deleted");
            return Ok(CleanupReport::DryRun(orphans.to_vec()));
        }

        let message = report::render_prompt(self.format, orphans.len());
        let response = match self.prompt.ask(&message).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("could not read confirmation: {:#}", e);
                String::new()
            }
        };
        if !is_confirmation(&response) {
            tracing::info!("deletion aborted by user");
            return Ok(CleanupReport::Aborted);
        }

        let outcomes = self.delete_all(orphans, target).await?;
        Ok(CleanupReport::Completed(outcomes))
    }

    /// One connection, one session per VM, strictly in order. Only the
    /// connection failing is fatal; everything else is a per-VM outcome.
    async fn delete_all(&self, orphans: &[OrphanRecord], target: &ShellTarget) -> CleanupResult<Vec<CleanupOutcome>> {
        let mut connection = self
            .shell
            .connect(target)
            .await
            .map_err(|error| CleanupError::Connection {
                host: target.address(),
                error,
            })?;

        let mut outcomes = Vec::with_capacity(orphans.len());
        for orphan in orphans {
            let outcome = CleanupOutcome::pending(orphan);
            let vm = orphan.instance_name.as_str();

            let mut session = match connection.open_session().await {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(vm, "SSH session failed: {:#}", e);
                    let outcome = outcome.fail(format!("SSH session failed: {:#}", e));
                    self.outcomes.record(&outcome);
                    outcomes.push(outcome);
                    continue;
                }
            };

            let cmd = delete_command(vm);
            tracing::debug!(vm, %cmd, "executing deletion command");
            let result = session.run(&cmd).await;
            let outcome = match result {
                Ok(out) if out.success() => {
                    tracing::info!(vm, "deleted VM");
                    outcome.succeed(cmd)
                }
                Ok(out) => {
                    let status = out
                        .exit_status
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    tracing::warn!(vm, %status, "failed to delete VM");
                    outcome.fail(format!(
                        "Failed to delete VM: exit status {}, Output: {}",
                        status,
                        out.combined().trim()
                    ))
                }
                Err(e) => {
                    tracing::warn!(vm, "failed to delete VM: {:#}", e);
                    outcome.fail(format!("Failed to delete VM: {:#}", e))
                }
            };
            self.outcomes.record(&outcome);
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}
