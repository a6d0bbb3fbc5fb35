use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod error;
pub mod patterns;

pub use error::{CleanupError, CleanupResult, RunStage};

/// Tenant recorded for orphans: the control plane never saw them.
pub const UNKNOWN_TENANT: &str = "Unknown";

// --- Inventories ---

/// One VM as the control plane knows it, scoped to a single hypervisor.
///
/// `instance_name` is the hypervisor-level name (`OS-EXT-SRV-ATTR:instance_name`),
/// which is what the hypervisor itself reports. It is the match key against the
/// remote inventory, never the Nova server id.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ControlPlaneInstance {
    pub instance_name: String,
    pub tenant_name: String,
    pub status: String, // not queried on this path, always empty
}

/// One VM as reported by the hypervisor's local inventory.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RemoteInstance {
    pub name: String,
    pub state: String,
}

/// A remote VM with no matching control-plane instance.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct OrphanRecord {
    pub instance_name: String,
    pub tenant_name: String,
    pub state: String,
}

impl OrphanRecord {
    pub fn from_remote(remote: &RemoteInstance) -> Self {
        Self {
            instance_name: remote.name.clone(),
            tenant_name: UNKNOWN_TENANT.to_string(),
            state: remote.state.clone(),
        }
    }
}

/// A project whose instance listing failed. It contributed zero instances.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ProjectFailure {
    pub project_id: String,
    pub project_name: String,
    pub error: String,
}

// --- Cleanup ---

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Pending,
    Success,
    Error,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Pending => "pending",
            OutcomeStatus::Success => "success",
            OutcomeStatus::Error => "error",
        }
    }
}

/// Result of one deletion attempt.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CleanupOutcome {
    pub vm: String,
    pub tenant: String,
    pub status: OutcomeStatus,
    pub message: String,
    pub finished_at: Option<DateTime<Utc>>,
}

impl CleanupOutcome {
    pub fn pending(orphan: &OrphanRecord) -> Self {
        Self {
            vm: orphan.instance_name.clone(),
            tenant: orphan.tenant_name.clone(),
            status: OutcomeStatus::Pending,
            message: String::new(),
            finished_at: None,
        }
    }

    pub fn succeed(mut self, message: impl Into<String>) -> Self {
        self.status = OutcomeStatus::Success;
        self.message = message.into();
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.status = OutcomeStatus::Error;
        self.message = message.into();
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

// --- Output ---

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl OutputFormat {
    /// Anything that is not `json` (any case) renders as a table.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("json") {
            OutputFormat::Json
        } else {
            OutputFormat::Table
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orphan_from_remote_forces_unknown_tenant() {
        let remote = RemoteInstance {
            name: "vm-orphaned1".to_string(),
            state: "Running".to_string(),
        };
        let orphan = OrphanRecord::from_remote(&remote);
        assert_eq!(orphan.instance_name, "vm-orphaned1");
        assert_eq!(orphan.tenant_name, "Unknown");
        assert_eq!(orphan.state, "Running");
    }

    #[test]
    fn outcome_lifecycle() {
        let orphan = OrphanRecord {
            instance_name: "vm1".to_string(),
            tenant_name: UNKNOWN_TENANT.to_string(),
            state: "Running".to_string(),
        };
        let pending = CleanupOutcome::pending(&orphan);
        assert_eq!(pending.status, OutcomeStatus::Pending);
        assert!(pending.finished_at.is_none());

        let failed = pending.clone().fail("boom");
        assert_eq!(failed.status, OutcomeStatus::Error);
        assert_eq!(failed.message, "boom");
        assert!(failed.finished_at.is_some());

        let ok = pending.succeed("deleted");
        assert!(ok.is_success());
    }

    #[test]
    fn outcome_status_serializes_lowercase() {
        let v = serde_json::to_value(OutcomeStatus::Success).unwrap();
        assert_eq!(v, serde_json::json!("success"));
        assert_eq!(OutcomeStatus::Error.as_str(), "error");
    }

    #[test]
    fn result_alias_is_exported_at_the_root() {
        fn load() -> CleanupResult<()> {
            Err(CleanupError::Configuration("OS_REGION_NAME not set".to_string()))
        }
        assert_eq!(load().unwrap_err().to_string(), "configuration error: OS_REGION_NAME not set");
    }

    #[test]
    fn output_format_parse() {
        assert_eq!(OutputFormat::parse("json"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse(" JSON "), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("table"), OutputFormat::Table);
        assert_eq!(OutputFormat::parse("yaml"), OutputFormat::Table);
    }
}
