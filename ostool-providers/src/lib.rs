use anyhow::Result;
use async_trait::async_trait;

/// Read-only view of the cloud control plane needed by the cleanup run.
///
/// Implementations are expected to be authenticated at construction time.
#[async_trait]
pub trait ComputeDirectory: Send + Sync {
    /// Check that the identity service answers with the current token.
    async fn verify_identity(&self) -> Result<()>;

    async fn list_hypervisors(&self) -> Result<Vec<inventory::HypervisorRecord>>;

    /// All projects visible to the authenticated identity.
    async fn list_projects(&self) -> Result<Vec<inventory::ProjectRecord>>;

    /// Servers of one tenant, listed with all-tenants scope.
    async fn list_instances(&self, tenant_id: &str) -> Result<Vec<inventory::ServerRecord>>;
}

/// Opens authenticated command-execution connections to a host.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn connect(&self, target: &shell::ShellTarget) -> Result<Box<dyn RemoteConnection>>;
}

/// One authenticated connection. Sessions opened on it are used one at a time.
#[async_trait]
pub trait RemoteConnection: Send {
    async fn open_session(&mut self) -> Result<Box<dyn RemoteSession>>;
}

#[async_trait]
pub trait RemoteSession: Send {
    /// Run one command to completion. A non-zero exit is not an `Err`:
    /// callers inspect `CommandOutput::success`.
    async fn run(&mut self, command: &str) -> Result<shell::CommandOutput>;
}

pub mod inventory {
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct HypervisorRecord {
        pub host_ip: String,
        pub hypervisor_hostname: String,
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct ProjectRecord {
        pub id: String,
        pub name: String,
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct ServerRecord {
        pub name: String,
        pub status: String,
        pub hypervisor_hostname: Option<String>,
        pub instance_name: Option<String>, // OS-EXT-SRV-ATTR:instance_name
    }
}

pub mod shell {
    use std::fmt;

    pub const DEFAULT_SSH_PORT: u16 = 22;

    #[derive(Clone)]
    pub struct ShellTarget {
        pub host: String,
        pub port: u16,
        pub user: String,
        pub password: String,
    }

    impl ShellTarget {
        pub fn new(host: &str, user: &str, password: &str) -> Self {
            Self {
                host: host.trim().to_string(),
                port: DEFAULT_SSH_PORT,
                user: user.to_string(),
                password: password.to_string(),
            }
        }

        pub fn address(&self) -> String {
            format!("{}:{}", self.host, self.port)
        }
    }

    // Never print the password.
    impl fmt::Debug for ShellTarget {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("ShellTarget")
                .field("host", &self.host)
                .field("port", &self.port)
                .field("user", &self.user)
                .finish_non_exhaustive()
        }
    }

    #[derive(Clone, Debug, Default, PartialEq, Eq)]
    pub struct CommandOutput {
        pub stdout: String,
        pub stderr: String,
        pub exit_status: Option<u32>,
    }

    impl CommandOutput {
        pub fn success(&self) -> bool {
            self.exit_status == Some(0)
        }

        /// stdout followed by stderr, as a terminal would show them.
        pub fn combined(&self) -> String {
            let mut out = self.stdout.clone();
            if !self.stderr.is_empty() {
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str(&self.stderr);
            }
            out
        }
    }
}

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "openstack")]
pub mod openstack;

#[cfg(feature = "ssh")]
pub mod ssh;

#[cfg(test)]
mod tests {
    use super::shell::*;

    #[test]
    fn target_defaults_to_port_22_and_hides_password() {
        let t = ShellTarget::new(" 10.0.0.5 ", "root", "s3cret");
        assert_eq!(t.address(), "10.0.0.5:22");
        let dbg = format!("{:?}", t);
        assert!(dbg.contains("root"));
        assert!(!dbg.contains("s3cret"));
    }

    #[test]
    fn command_output_success_and_combined() {
        let ok = CommandOutput {
            stdout: "done".to_string(),
            stderr: String::new(),
            exit_status: Some(0),
        };
        assert!(ok.success());
        assert_eq!(ok.combined(), "done");

        let failed = CommandOutput {
            stdout: "partial".to_string(),
            stderr: "HSCL1234 not found".to_string(),
            exit_status: Some(1),
        };
        assert!(!failed.success());
        assert_eq!(failed.combined(), "partial\nHSCL1234 not found");

        // Channel closed without an exit status.
        assert!(!CommandOutput::default().success());
    }
}
