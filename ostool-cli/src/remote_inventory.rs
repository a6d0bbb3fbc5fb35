use std::sync::Arc;

use anyhow::{bail, Context, Result};
use ostool_common::patterns::matches_any_pattern;
use ostool_common::RemoteInstance;
use ostool_providers::shell::ShellTarget;
use ostool_providers::RemoteShell;

pub const INVENTORY_COMMAND: &str =
    "export TERM=xterm; pvmctl vm list --display-fields LogicalPartition.name LogicalPartition.state";

/// Lists the VMs a hypervisor knows about over a remote shell.
pub struct RemoteInventoryReader {
    shell: Arc<dyn RemoteShell>,
    partition_patterns: Vec<String>,
}

impl RemoteInventoryReader {
    pub fn new(shell: Arc<dyn RemoteShell>, partition_patterns: Vec<String>) -> Self {
        Self {
            shell,
            partition_patterns,
        }
    }

    /// One attempt: connect, open a session, run the inventory command.
    /// Any transport failure or non-zero exit is an error.
    pub async fn list_remote_instances(&self, target: &ShellTarget) -> Result<Vec<RemoteInstance>> {
        let mut connection = self
            .shell
            .connect(target)
            .await
            .context("SSH connection failed")?;
        let mut session = connection.open_session().await.context("SSH session failed")?;

        let output = session.run(INVENTORY_COMMAND).await.context("command failed")?;
        if !output.success() {
            bail!(
                "command failed with exit status {} - output: {}",
                output
                    .exit_status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                output.combined().trim()
            );
        }
        tracing::debug!(bytes = output.stdout.len(), "inventory command finished");

        let instances = parse_inventory(&output.stdout, &self.partition_patterns);
        tracing::debug!(count = instances.len(), "fetched remote VM list");
        Ok(instances)
    }
}

/// Parse `pvmctl` output, dropping blank lines and partitions whose name
/// matches one of `partition_patterns`.
pub fn parse_inventory(output: &str, partition_patterns: &[String]) -> Vec<RemoteInstance> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(parse_line)
        .filter(|vm| {
            let excluded = matches_any_pattern(&vm.name, partition_patterns);
            if excluded {
                tracing::debug!(vm = %vm.name, "skipping management partition");
            }
            !excluded
        })
        .collect()
}

/// `name=<n>,state=<s>[,...]`. Unknown keys are ignored; a line without both
/// a non-empty name and a state yields nothing.
fn parse_line(line: &str) -> Option<RemoteInstance> {
    let mut name = None;
    let mut state = None;
    for field in line.split(',') {
        let Some((key, value)) = field.split_once('=') else {
            continue;
        };
        match key.trim() {
            "name" => name = Some(value.trim()),
            "state" => state = Some(value.trim()),
            _ => {}
        }
    }

    match (name, state) {
        (Some(name), Some(state)) if !name.is_empty() => Some(RemoteInstance {
            name: name.to_string(),
            state: state.to_string(),
        }),
        _ => {
            tracing::debug!(line, "ignoring unparseable inventory line");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ostool_common::patterns::parse_partition_patterns;
    use ostool_providers::mock::MockShell;

    fn defaults() -> Vec<String> {
        parse_partition_patterns(None)
    }

    fn target() -> ShellTarget {
        ShellTarget::new("10.10.0.1", "padmin", "secret")
    }

    #[test]
    fn management_partition_and_blank_lines_are_dropped() {
        let out = parse_inventory("name=vm1,state=Running\nname=ltc01-nova,state=Running\n\n", &defaults());
        assert_eq!(
            out,
            vec![RemoteInstance {
                name: "vm1".to_string(),
                state: "Running".to_string(),
            }]
        );
    }

    #[test]
    fn tolerant_line_parsing() {
        let raw = "  name=vm-a , state=Not Activated  \r\n\
                   state=Running,name=vm-b,id=42\n\
                   name=vm-c\n\
                   garbage line\n\
                   name=,state=Running\n\
                   name=vm-d,state=\n";
        let out = parse_inventory(raw, &defaults());
        let got: Vec<(&str, &str)> = out.iter().map(|r| (r.name.as_str(), r.state.as_str())).collect();
        assert_eq!(
            got,
            vec![("vm-a", "Not Activated"), ("vm-b", "Running"), ("vm-d", "")]
        );
    }

    #[test]
    fn custom_exclusion_pattern() {
        let patterns = parse_partition_patterns(Some("*vios*"));
        let out = parse_inventory("name=vios1,state=Running\nname=ltc01-nova,state=Running\n", &patterns);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "ltc01-nova");
    }

    #[test]
    fn exclusion_globs_apply_to_the_partition_name() {
        let patterns = parse_partition_patterns(Some("vios*, mgmt-*"));
        let out = parse_inventory(
            "name=vios1,state=Running\nname=mgmt-01,state=Running\nname=vm1,state=Running\nname=my-vios,state=Running\n",
            &patterns,
        );
        let kept: Vec<&str> = out.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(kept, vec!["vm1", "my-vios"]);
    }

    #[tokio::test]
    async fn reads_inventory_over_one_session() {
        let shell = MockShell::new().respond(
            "pvmctl vm list",
            0,
            "name=vm1,state=Running\nname=vm2,state=Not Activated\nname=ltc01-nova,state=Running\n",
            "",
        );
        let reader = RemoteInventoryReader::new(Arc::new(shell.clone()), defaults());
        let vms = reader.list_remote_instances(&target()).await.unwrap();
        assert_eq!(vms.len(), 2);
        assert_eq!(shell.connections(), 1);
        assert_eq!(shell.sessions(), 1);
        assert_eq!(shell.commands(), vec![INVENTORY_COMMAND.to_string()]);
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let shell = MockShell::new().respond("pvmctl vm list", 1, "", "pvmctl: command not found");
        let reader = RemoteInventoryReader::new(Arc::new(shell), defaults());
        let err = reader.list_remote_instances(&target()).await.unwrap_err();
        assert!(format!("{:#}", err).contains("pvmctl: command not found"));
    }

    #[tokio::test]
    async fn connection_failure_is_an_error() {
        let shell = MockShell::new().refuse_connections();
        let reader = RemoteInventoryReader::new(Arc::new(shell.clone()), defaults());
        let err = reader.list_remote_instances(&target()).await.unwrap_err();
        assert!(format!("{:#}", err).starts_with("SSH connection failed"));
        assert!(shell.commands().is_empty());
    }
}
