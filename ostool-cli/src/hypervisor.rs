use ostool_providers::inventory::HypervisorRecord;
use ostool_providers::ComputeDirectory;

use crate::retry::{with_retry, RetryPolicy};

pub async fn fetch_hypervisors(
    directory: &dyn ComputeDirectory,
    retry: RetryPolicy,
) -> anyhow::Result<Vec<HypervisorRecord>> {
    let hypervisors = with_retry(retry, "list hypervisors", || directory.list_hypervisors()).await?;
    tracing::debug!(count = hypervisors.len(), "fetched hypervisor list");
    Ok(hypervisors)
}

/// Exact match of `ip` against each hypervisor's host IP; first match wins.
pub fn resolve_hostname<'a>(ip: &str, hypervisors: &'a [HypervisorRecord]) -> Option<&'a HypervisorRecord> {
    let ip = ip.trim();
    let found = hypervisors.iter().find(|h| h.host_ip == ip);
    match found {
        Some(h) => tracing::debug!(ip, hostname = %h.hypervisor_hostname, "resolved hypervisor"),
        None => tracing::debug!(ip, "no hypervisor has this host IP"),
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use ostool_providers::mock::MockComputeDirectory;
    use std::time::Duration;

    fn catalog() -> Vec<HypervisorRecord> {
        vec![
            HypervisorRecord {
                host_ip: "10.10.0.11".to_string(),
                hypervisor_hostname: "nl-host-11".to_string(),
            },
            HypervisorRecord {
                host_ip: "10.10.0.1".to_string(),
                hypervisor_hostname: "nl-host-01".to_string(),
            },
        ]
    }

    #[test]
    fn exact_ip_match_only() {
        let c = catalog();
        assert_eq!(resolve_hostname("10.10.0.1", &c).unwrap().hypervisor_hostname, "nl-host-01");
        assert_eq!(resolve_hostname(" 10.10.0.11 ", &c).unwrap().hypervisor_hostname, "nl-host-11");
        // no prefix matching
        assert!(resolve_hostname("10.10.0.", &c).is_none());
        assert!(resolve_hostname("10.10.0.2", &c).is_none());
    }

    #[tokio::test]
    async fn hypervisor_listing_is_retried() {
        let dir = MockComputeDirectory::new()
            .with_hypervisor("10.10.0.1", "nl-host-01")
            .flaky_hypervisors(2);
        let list = fetch_hypervisors(&dir, RetryPolicy::new(3, Duration::ZERO)).await.unwrap();
        assert_eq!(list.len(), 1);

        let dir = MockComputeDirectory::new().flaky_hypervisors(5);
        assert!(fetch_hypervisors(&dir, RetryPolicy::new(3, Duration::ZERO)).await.is_err());
    }
}
