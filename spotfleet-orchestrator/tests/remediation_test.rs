// Classifier-driven single-shot remediation
mod common;

use common::*;
use serde_json::json;
use spotfleet_common::ErrorClass;
use spotfleet_providers::mock::MockOp;

#[tokio::test]
async fn stale_disk_with_other_security_type_is_cleared() {
    let mock = mock();
    mock.seed_resource_group(GROUP, LOCATION);
    mock.seed_disk(GROUP, "w-1-osdisk", "Standard");
    // The pre-create cleanup reports success but the disk is still there.
    mock.linger_disk_deletes(1);

    let report = orchestrator(&mock).run(&request(1)).await.unwrap();

    assert!(report.is_success());
    let rec = record(&report, "w-1");
    assert_eq!(rec.remediation_applied.as_deref(), Some("disk-conflict-cleared"));
    assert_eq!(mock.call_count(MockOp::CreateVirtualMachine), 2);
    assert_eq!(mock.disk_count(GROUP, "w-1-osdisk"), 1);
    let disk = mock.disk(GROUP, "w-1-osdisk").unwrap();
    assert_eq!(disk.security_type.as_deref(), Some("TrustedLaunch"));
    assert!(disk.attached_to.is_some());
}

#[tokio::test]
async fn lingering_disk_with_same_security_type_is_cleared() {
    let mock = mock();
    mock.seed_resource_group(GROUP, LOCATION);
    mock.seed_disk(GROUP, "w-1-osdisk", "TrustedLaunch");
    mock.linger_disk_deletes(1);

    let report = orchestrator(&mock).run(&request(1)).await.unwrap();

    assert!(report.is_success());
    let rec = record(&report, "w-1");
    assert_eq!(rec.remediation_applied.as_deref(), Some("disk-conflict-cleared"));
    assert_eq!(report.summary.remediated, 1);
    // Pre-create cleanup (lingered) plus the remediation delete.
    assert_eq!(mock.call_count(MockOp::DeleteDisk), 2);
    assert_eq!(mock.successes(MockOp::DeleteDisk), 1);
    assert_eq!(mock.call_count(MockOp::CreateVirtualMachine), 2);
    assert_eq!(mock.disk_count(GROUP, "w-1-osdisk"), 1);
    assert!(mock.disk(GROUP, "w-1-osdisk").unwrap().attached_to.is_some());
}

#[tokio::test]
async fn stale_disk_is_removed_before_create() {
    let mock = mock();
    mock.seed_resource_group(GROUP, LOCATION);
    mock.seed_disk(GROUP, "w-1-osdisk", "Standard");

    let report = orchestrator(&mock).run(&request(1)).await.unwrap();

    assert!(report.is_success());
    assert!(record(&report, "w-1").remediation_applied.is_none());
    assert_eq!(mock.call_count(MockOp::CreateVirtualMachine), 1);
    assert_eq!(mock.successes(MockOp::DeleteDisk), 1);
}

#[tokio::test]
async fn acceleration_rejection_recreates_interface_without_it() {
    let mock = mock();
    mock.reject_acceleration_for(SIZE);

    let report = orchestrator(&mock).run(&request(1)).await.unwrap();

    assert!(report.is_success());
    let rec = record(&report, "w-1");
    assert_eq!(rec.remediation_applied.as_deref(), Some("acceleration-disabled"));
    assert!(rec.address.is_some());
    assert_eq!(report.summary.remediated, 1);
    assert_eq!(mock.successes(MockOp::DeleteNetworkInterface), 1);
    assert_eq!(mock.successes(MockOp::CreateNetworkInterface), 2);
    assert!(!mock.nic(GROUP, "w-1-nic").unwrap().accelerated_networking);
}

#[tokio::test]
async fn disable_acceleration_switch_skips_the_feature() {
    let mock = mock();
    mock.reject_acceleration_for(SIZE);

    let req = request_with(1, json!({ "switches": { "disableAcceleration": true } }));
    let report = orchestrator(&mock).run(&req).await.unwrap();

    assert!(record(&report, "w-1").remediation_applied.is_none());
    assert_eq!(mock.call_count(MockOp::CreateVirtualMachine), 1);
}

#[tokio::test]
async fn unsupported_trusted_launch_falls_back_to_standard() {
    let mock = mock();
    mock.reject_trusted_launch_for(SIZE);

    let report = orchestrator(&mock).run(&request(1)).await.unwrap();

    let rec = record(&report, "w-1");
    assert!(rec.success);
    assert_eq!(
        rec.remediation_applied.as_deref(),
        Some("security-mode-fallback:TrustedLaunch->Standard")
    );
    let disk = mock.disk(GROUP, "w-1-osdisk").unwrap();
    assert_eq!(disk.security_type.as_deref(), Some("Standard"));
}

#[tokio::test]
async fn strict_security_mode_makes_rejection_terminal() {
    let mock = mock();
    mock.reject_trusted_launch_for(SIZE);

    let req = request_with(1, json!({ "switches": { "strictSecurityMode": true } }));
    let report = orchestrator(&mock).run(&req).await.unwrap();

    let rec = record(&report, "w-1");
    assert!(!rec.success);
    assert_eq!(rec.error_class, Some(ErrorClass::SecurityModeUnsupported));
    assert!(!rec.retried);
    assert_eq!(mock.call_count(MockOp::CreateVirtualMachine), 1);
}

#[tokio::test]
async fn remediations_do_not_chain() {
    let mock = mock();
    // First create trips on TrustedLaunch, the fallback then trips on acceleration.
    mock.reject_trusted_launch_for(SIZE);
    mock.reject_acceleration_for(SIZE);

    let report = orchestrator(&mock).run(&request(1)).await.unwrap();

    let rec = record(&report, "w-1");
    assert!(!rec.success);
    assert!(rec.retried);
    assert_eq!(rec.error_class, Some(ErrorClass::NetworkAccelerationUnsupported));
    assert_eq!(mock.call_count(MockOp::CreateVirtualMachine), 2);
}

#[tokio::test]
async fn feature_flag_is_terminal_and_surfaced() {
    let mock = mock();
    mock.fail_for(MockOp::CreateVirtualMachine, "w-1", FEATURE_FLAG_ERROR);

    let report = orchestrator(&mock).run(&request(1)).await.unwrap();

    let rec = record(&report, "w-1");
    assert_eq!(rec.error_class, Some(ErrorClass::FeatureFlagRequired));
    assert_eq!(rec.required_feature.as_deref(), Some("Microsoft.Compute/SpotPreview"));
    assert_eq!(mock.call_count(MockOp::CreateVirtualMachine), 1);
}

#[tokio::test]
async fn unclassified_errors_are_preserved_verbatim() {
    let mock = mock();
    let raw = "InternalExecutionError: An internal execution error occurred. Please retry later.";
    mock.fail_for(MockOp::CreateVirtualMachine, "w-1", raw);

    let report = orchestrator(&mock).run(&request(1)).await.unwrap();

    let rec = record(&report, "w-1");
    assert_eq!(rec.error_class, Some(ErrorClass::Unclassified));
    assert_eq!(rec.error.as_deref(), Some(raw));
}
