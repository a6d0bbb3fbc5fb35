use std::fmt::Write;

use ostool_common::{
    CleanupError, CleanupOutcome, CleanupResult, ControlPlaneInstance, OrphanRecord, OutcomeStatus, OutputFormat,
    ProjectFailure, RemoteInstance,
};
use serde::Serialize;

use crate::cleanup::{CleanupReport, CONFIRMATION_TOKEN};

/// Reconciliation result as printed after the inventories are compared.
#[derive(Debug, Serialize)]
pub struct InventoryReport<'a> {
    pub openstack_vms: &'a [ControlPlaneInstance],
    pub remote_vms: &'a [RemoteInstance],
    pub missing_vms: &'a [OrphanRecord],
    pub failed_projects: &'a [ProjectFailure],
}

#[derive(Serialize)]
struct StatusMessage<'a> {
    status: &'a str,
    message: String,
}

fn to_json<T: Serialize + ?Sized>(what: &'static str, value: &T, pretty: bool) -> CleanupResult<String> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    rendered.map_err(|error| CleanupError::Render { what, error })
}

fn orphan_line(out: &mut String, vm: &OrphanRecord) {
    let _ = writeln!(
        out,
        " - VM: {}, Tenant: {}, Status: {}",
        vm.instance_name, vm.tenant_name, vm.state
    );
}

pub fn render_inventory(format: OutputFormat, report: &InventoryReport<'_>) -> CleanupResult<String> {
    if format == OutputFormat::Json {
        return to_json("inventory report", report, true);
    }

    let mut out = String::new();
    let _ = writeln!(out, "🔹 OpenStack VM count: {}", report.openstack_vms.len());
    let _ = writeln!(out, "🔹 Remote VM count: {}", report.remote_vms.len());
    let _ = writeln!(out, "🔹 Missing VM count: {}", report.missing_vms.len());
    if !report.failed_projects.is_empty() {
        let _ = writeln!(
            out,
            "⚠️ Could not list VMs for {} project(s); their VMs may be reported as missing:",
            report.failed_projects.len()
        );
        for p in report.failed_projects {
            let _ = writeln!(out, " - Project: {} ({}): {}", p.project_name, p.project_id, p.error);
        }
    }
    if report.missing_vms.is_empty() {
        out.push_str("✅ No missing VMs detected!\n");
    } else {
        out.push_str("Missing VMs:\n");
        for vm in report.missing_vms {
            orphan_line(&mut out, vm);
        }
    }
    Ok(out.trim_end().to_string())
}

/// Confirmation prompt text. The table form has no trailing newline so the
/// answer is typed on the same line.
pub fn render_prompt(format: OutputFormat, count: usize) -> String {
    let message = format!("Type '{}' to delete {} VMs", CONFIRMATION_TOKEN, count);
    match format {
        OutputFormat::Table => format!("{}: ", message),
        OutputFormat::Json => {
            let doc = StatusMessage {
                status: "prompt",
                message,
            };
            format!("{}\n", serde_json::to_string(&doc).unwrap_or_default())
        }
    }
}

/// One deletion result, printed as soon as the VM is done.
pub fn render_outcome(format: OutputFormat, o: &CleanupOutcome) -> CleanupResult<String> {
    if format == OutputFormat::Json {
        return to_json("deletion result", o, false);
    }
    Ok(match o.status {
        OutcomeStatus::Success => format!(" - VM: {}, Tenant: {} → Command: {}", o.vm, o.tenant, o.message),
        OutcomeStatus::Error => format!("❌ VM {} (Tenant: {}): {}", o.vm, o.tenant, o.message),
        OutcomeStatus::Pending => format!(" - VM: {}, Tenant: {}: not attempted", o.vm, o.tenant),
    })
}

fn deleted_tally(outcomes: &[CleanupOutcome]) -> String {
    let deleted = outcomes.iter().filter(|o| o.is_success()).count();
    format!("Deleted {} of {} VMs.", deleted, outcomes.len())
}

pub fn render_cleanup(format: OutputFormat, report: &CleanupReport) -> CleanupResult<String> {
    match (format, report) {
        (OutputFormat::Json, CleanupReport::NothingToDo) => Ok("[]".to_string()),
        (OutputFormat::Json, CleanupReport::DryRun(orphans)) => to_json("dry-run list", orphans, true),
        (OutputFormat::Json, CleanupReport::Aborted) => to_json(
            "abort notice",
            &StatusMessage {
                status: "aborted",
                message: "Deletion aborted by user.".to_string(),
            },
            false,
        ),
        (OutputFormat::Json, CleanupReport::Completed(outcomes)) => to_json(
            "deletion summary",
            &StatusMessage {
                status: "completed",
                message: deleted_tally(outcomes),
            },
            false,
        ),

        (OutputFormat::Table, CleanupReport::NothingToDo) => Ok("✅ No abandoned VMs to delete.".to_string()),
        (OutputFormat::Table, CleanupReport::DryRun(orphans)) => {
            let mut out = String::from("⚠️ Dry-run mode enabled. VMs that would be deleted:\n");
            for vm in orphans {
                orphan_line(&mut out, vm);
            }
            Ok(out.trim_end().to_string())
        }
        (OutputFormat::Table, CleanupReport::Aborted) => Ok("❌ Deletion aborted by user.".to_string()),
        (OutputFormat::Table, CleanupReport::Completed(outcomes)) => Ok(deleted_tally(outcomes)),
    }
}
