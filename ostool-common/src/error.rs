use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Stages of one cleanup run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Configuring,
    Authenticating,
    ResolvingHypervisor,
    FetchingInventories,
    Reconciling,
    Reporting,
    Idle,
    Cleaning,
    Done,
}

impl RunStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStage::Configuring => "configuring",
            RunStage::Authenticating => "authenticating",
            RunStage::ResolvingHypervisor => "resolving hypervisor",
            RunStage::FetchingInventories => "fetching inventories",
            RunStage::Reconciling => "reconciling",
            RunStage::Reporting => "reporting",
            RunStage::Idle => "idle",
            RunStage::Cleaning => "cleaning",
            RunStage::Done => "done",
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which inventory a fatal fetch error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventorySource {
    Hypervisors,
    ControlPlane,
    Remote,
}

impl fmt::Display for InventorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InventorySource::Hypervisors => f.write_str("hypervisor list"),
            InventorySource::ControlPlane => f.write_str("OpenStack VM list"),
            InventorySource::Remote => f.write_str("remote VM list"),
        }
    }
}

pub type CleanupResult<T> = Result<T, CleanupError>;

/// Fatal errors of a cleanup run.
///
/// Per-project listing failures, per-VM deletion failures and a declined
/// confirmation are not errors: they are reported through the inventory and
/// cleanup reports instead.
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("authentication error: {0:#}")]
    Authentication(anyhow::Error),

    #[error("no matching hypervisor found for IP: {ip}")]
    Resolution { ip: String },

    #[error("error fetching {source_kind} ({stage}): {error:#}")]
    Fetch {
        stage: RunStage,
        source_kind: InventorySource,
        error: anyhow::Error,
    },

    #[error("SSH connection error to {host}: {error:#}")]
    Connection { host: String, error: anyhow::Error },

    #[error("timed out after {after:?} while {stage}")]
    Timeout { stage: RunStage, after: Duration },

    #[error("failed to render {what}: {error}")]
    Render {
        what: &'static str,
        #[source]
        error: serde_json::Error,
    },
}

impl CleanupError {
    pub fn fetch(stage: RunStage, source_kind: InventorySource, error: anyhow::Error) -> Self {
        CleanupError::Fetch {
            stage,
            source_kind,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_identify_the_failing_step() {
        let err = CleanupError::fetch(
            RunStage::FetchingInventories,
            InventorySource::Remote,
            anyhow::anyhow!("SSH connection failed").context("attempt 3 of 3"),
        );
        assert_eq!(
            err.to_string(),
            "error fetching remote VM list (fetching inventories): attempt 3 of 3: SSH connection failed"
        );

        let err = CleanupError::Resolution {
            ip: "10.0.0.9".to_string(),
        };
        assert_eq!(err.to_string(), "no matching hypervisor found for IP: 10.0.0.9");

        let err = CleanupError::Timeout {
            stage: RunStage::ResolvingHypervisor,
            after: Duration::from_secs(300),
        };
        assert_eq!(err.to_string(), "timed out after 300s while resolving hypervisor");

        let err = CleanupError::Timeout {
            stage: RunStage::Cleaning,
            after: Duration::from_millis(300),
        };
        assert_eq!(err.to_string(), "timed out after 300ms while cleaning");
    }
}
