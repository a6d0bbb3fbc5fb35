use std::collections::HashSet;

use ostool_common::{ControlPlaneInstance, OrphanRecord, RemoteInstance};

/// VMs the hypervisor reports that the control plane has no record of.
///
/// One-directional (remote minus control plane). Names match
/// case-insensitively. Output keeps the order of `remote`.
pub fn find_orphans(control_plane: &[ControlPlaneInstance], remote: &[RemoteInstance]) -> Vec<OrphanRecord> {
    let known: HashSet<String> = control_plane
        .iter()
        .map(|i| i.instance_name.to_lowercase())
        .collect();

    let orphans: Vec<OrphanRecord> = remote
        .iter()
        .filter(|vm| {
            let found = known.contains(&vm.name.to_lowercase());
            if !found {
                tracing::debug!(vm = %vm.name, state = %vm.state, "remote VM unknown to OpenStack");
            }
            !found
        })
        .map(OrphanRecord::from_remote)
        .collect();

    tracing::debug!(count = orphans.len(), "identified missing VMs");
    orphans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cp(names: &[&str]) -> Vec<ControlPlaneInstance> {
        names
            .iter()
            .map(|n| ControlPlaneInstance {
                instance_name: n.to_string(),
                tenant_name: "demo".to_string(),
                status: String::new(),
            })
            .collect()
    }

    fn remote(names: &[&str]) -> Vec<RemoteInstance> {
        names
            .iter()
            .map(|n| RemoteInstance {
                name: n.to_string(),
                state: "Running".to_string(),
            })
            .collect()
    }

    fn names(orphans: &[OrphanRecord]) -> Vec<&str> {
        orphans.iter().map(|o| o.instance_name.as_str()).collect()
    }

    #[test]
    fn remote_minus_control_plane_in_remote_order() {
        let c = cp(&["vm-b", "vm-d", "only-in-openstack"]);
        let r = remote(&["vm-e", "vm-b", "vm-a", "vm-d"]);
        let orphans = find_orphans(&c, &r);
        assert_eq!(names(&orphans), vec!["vm-e", "vm-a"]);
        // never reports control-plane-only entries
        assert!(!names(&orphans).contains(&"only-in-openstack"));
        for o in &orphans {
            assert_eq!(o.tenant_name, "Unknown");
            assert_eq!(o.state, "Running");
        }
    }

    #[test]
    fn matching_ignores_case() {
        let orphans = find_orphans(&cp(&["VM1"]), &remote(&["vm1"]));
        assert!(orphans.is_empty());
    }

    #[test]
    fn empty_remote_means_no_orphans() {
        assert!(find_orphans(&cp(&["vm1", "vm2"]), &[]).is_empty());
        assert!(find_orphans(&[], &[]).is_empty());
    }

    #[test]
    fn full_coverage_means_no_orphans() {
        let c = cp(&["Alpha", "beta", "GAMMA", "extra"]);
        let r = remote(&["alpha", "BETA", "gamma"]);
        assert!(find_orphans(&c, &r).is_empty());
    }

    #[test]
    fn empty_control_plane_orphans_everything() {
        let r = remote(&["vm-orphaned1", "vm-orphaned2"]);
        assert_eq!(names(&find_orphans(&[], &r)), vec!["vm-orphaned1", "vm-orphaned2"]);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let c = cp(&["vm1", "vm3"]);
        let r = remote(&["vm4", "vm1", "vm2", "vm3", "vm5"]);
        let first = find_orphans(&c, &r);
        let second = find_orphans(&c, &r);
        assert_eq!(first, second);
        assert_eq!(names(&first), vec!["vm4", "vm2", "vm5"]);
    }

    #[test]
    fn duplicate_control_plane_names_still_match() {
        let c = cp(&["vm1", "VM1"]);
        assert!(find_orphans(&c, &remote(&["Vm1"])).is_empty());
    }
}
