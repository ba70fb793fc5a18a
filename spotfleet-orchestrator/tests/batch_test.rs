// End-to-end batch behaviour against the mock provider
mod common;

use common::*;
use serde_json::json;
use spotfleet_common::{ErrorClass, ImagePreference, RequestError};
use spotfleet_orchestrator::image;
use spotfleet_orchestrator::{Orchestrator, OrchestratorError, RetryPolicies, RetryPolicy};
use spotfleet_providers::mock::MockOp;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test]
async fn failed_instance_does_not_stop_the_batch() {
    let mock = mock();
    mock.fail_for(MockOp::CreateVirtualMachine, "w-2", SPOT_QUOTA_ERROR);

    let report = orchestrator(&mock).run(&request(3)).await.unwrap();

    assert_eq!(report.records.len(), 3);
    assert_eq!(report.summary.succeeded, 2);
    assert_eq!(report.summary.failed, 1);
    assert!(!report.is_success());

    assert!(record(&report, "w-1").success);
    let failed = record(&report, "w-2");
    assert!(!failed.success);
    assert_eq!(failed.error_class, Some(ErrorClass::QuotaExceeded));
    let figures = failed.quota.unwrap();
    assert_eq!(figures.limit, Some(10));
    assert_eq!(figures.usage, Some(8));
    assert_eq!(figures.required, Some(2));
    assert!(record(&report, "w-3").success);

    assert_eq!(mock.call_count(MockOp::CreateVirtualMachine), 3);
    assert!(mock.vm(GROUP, "w-3").is_some());
    assert!(mock.vm(GROUP, "w-2").is_none());
}

#[tokio::test]
async fn records_follow_request_order() {
    let mock = mock();
    let req = request_with(
        0,
        json!({ "names": { "range": { "prefix": "spot", "start": 8, "end": 10 } } }),
    );
    let report = orchestrator(&mock).run(&req).await.unwrap();

    let names: Vec<&str> = report.records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["spot8", "spot9", "spot10"]);
}

#[tokio::test]
async fn empty_catalog_uses_last_resort_image() {
    let mock = mock();
    mock.clear_catalog();

    let img = image::resolve(mock.as_ref(), LOCATION, SIZE, &ImagePreference::default()).await;
    assert_eq!(img.offer, "0001-com-ubuntu-server-jammy");
    assert_eq!(img.sku, "22_04-lts-gen2");

    let arm = image::resolve(mock.as_ref(), LOCATION, "Standard_D4pls_v5", &ImagePreference::default()).await;
    assert_eq!(arm.sku, "22_04-lts-arm64");

    let report = orchestrator(&mock).run(&request(1)).await.unwrap();
    let rec = record(&report, "w-1");
    assert_eq!(rec.image_offer.as_deref(), Some("0001-com-ubuntu-server-jammy"));
    assert_eq!(rec.image_sku.as_deref(), Some("22_04-lts-gen2"));
}

#[tokio::test]
async fn lts_and_full_image_preferences() {
    let mock = mock();
    let req = request_with(1, json!({ "image": { "preferLts": true, "preferFullImage": true } }));
    let report = orchestrator(&mock).run(&req).await.unwrap();
    let rec = record(&report, "w-1");
    assert_eq!(rec.image_offer.as_deref(), Some("ubuntu-24_04-lts"));
    assert_eq!(rec.image_sku.as_deref(), Some("server"));
}

#[tokio::test]
async fn public_ip_quota_stops_immediately() {
    let mock = mock();
    mock.fail_for(MockOp::CreatePublicIp, "w-1-ip", IP_QUOTA_ERROR);

    let report = orchestrator(&mock).run(&request(2)).await.unwrap();

    let rec = record(&report, "w-1");
    assert_eq!(rec.error_class, Some(ErrorClass::QuotaExceeded));
    assert!(!rec.retried);
    assert!(record(&report, "w-2").success);
    // One failed attempt for w-1, one for w-2.
    assert_eq!(mock.call_count(MockOp::CreatePublicIp), 2);
}

#[tokio::test]
async fn transient_public_ip_errors_are_retried() {
    let mock = mock();
    for _ in 0..2 {
        mock.fail_for(MockOp::CreatePublicIp, "w-1-ip", "InternalServerError: try again");
    }

    let report = orchestrator(&mock).run(&request(1)).await.unwrap();

    assert!(record(&report, "w-1").success);
    assert_eq!(mock.call_count(MockOp::CreatePublicIp), 3);
}

#[tokio::test]
async fn private_only_instances_have_no_address_or_firewall() {
    let mock = mock();
    let req = request_with(1, json!({ "networkMode": "none" }));
    let report = orchestrator(&mock).run(&req).await.unwrap();

    let rec = record(&report, "w-1");
    assert!(rec.address.is_none());
    assert!(rec.private_address.is_some());
    assert_eq!(mock.call_count(MockOp::CreatePublicIp), 0);
    assert_eq!(mock.call_count(MockOp::CreateSecurityGroup), 0);
}

#[tokio::test]
async fn firewall_skip_creates_no_rule_set() {
    let mock = mock();
    let req = request_with(1, json!({ "firewall": "skip" }));
    orchestrator(&mock).run(&req).await.unwrap();
    assert_eq!(mock.call_count(MockOp::CreateSecurityGroup), 0);

    let mock = common::mock();
    orchestrator(&mock).run(&request(1)).await.unwrap();
    assert_eq!(mock.successes(MockOp::CreateSecurityGroup), 1);
}

#[tokio::test]
async fn password_generated_only_without_credentials() {
    let mock = mock();
    let report = orchestrator(&mock).run(&request(2)).await.unwrap();
    let p1 = record(&report, "w-1").generated_password.clone().unwrap();
    let p2 = record(&report, "w-2").generated_password.clone().unwrap();
    assert_eq!(p1.len(), 24);
    assert_ne!(p1, p2);

    let mock = common::mock();
    let req = request_with(
        1,
        json!({ "credentials": { "sshPublicKey": "ssh-ed25519 AAAAC3Nza test@host" } }),
    );
    let report = orchestrator(&mock).run(&req).await.unwrap();
    assert!(record(&report, "w-1").generated_password.is_none());
}

#[tokio::test]
async fn existing_instance_is_left_alone_without_overwrite() {
    let mock = mock();
    mock.seed_resource_group(GROUP, LOCATION);
    mock.seed_virtual_machine(GROUP, "w-1", SIZE);

    let report = orchestrator(&mock).run(&request(1)).await.unwrap();

    let rec = record(&report, "w-1");
    assert!(rec.success);
    assert!(rec.existing);
    assert_eq!(mock.call_count(MockOp::CreateVirtualMachine), 0);
    assert_eq!(mock.call_count(MockOp::CreatePublicIp), 0);
}

#[tokio::test]
async fn overwrite_shuts_down_deletes_and_recreates() {
    let mock = mock();
    mock.seed_resource_group(GROUP, LOCATION);
    mock.seed_virtual_machine(GROUP, "w-1", SIZE);

    let req = request_with(1, json!({ "switches": { "overwrite": true } }));
    let report = orchestrator(&mock).run(&req).await.unwrap();

    let rec = record(&report, "w-1");
    assert!(rec.success);
    assert!(!rec.existing);
    let commands = mock.run_commands();
    assert_eq!(commands.len(), 1);
    assert!(commands[0].1[0].contains("poweroff"));
    assert_eq!(mock.successes(MockOp::DeleteVirtualMachine), 1);
    assert_eq!(mock.successes(MockOp::CreateVirtualMachine), 1);
}

#[tokio::test]
async fn url_init_runs_after_create() {
    let mock = mock();
    let req = request_with(
        1,
        json!({ "init": { "kind": "url", "value": "https://example.com/bootstrap.sh" } }),
    );
    let report = orchestrator(&mock).run(&req).await.unwrap();

    assert!(record(&report, "w-1").warnings.is_empty());
    let commands = mock.run_commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].0, "w-1");
    assert!(commands[0].1.iter().any(|l| l.contains("https://example.com/bootstrap.sh")));
}

#[tokio::test]
async fn failed_init_is_a_warning_not_a_failure() {
    let mock = mock();
    mock.fail_for(
        MockOp::RunCommand,
        "w-1",
        "Conflict: Run command extension execution is in progress.",
    );
    let req = request_with(
        1,
        json!({ "init": { "kind": "url", "value": "https://example.com/bootstrap.sh" } }),
    );
    let report = orchestrator(&mock).run(&req).await.unwrap();

    let rec = record(&report, "w-1");
    assert!(rec.success);
    assert_eq!(rec.warnings.len(), 1);
    assert!(rec.warnings[0].contains("Run command extension"));
}

#[tokio::test]
async fn non_ascii_size_is_rejected_before_any_call() {
    let mock = mock();
    let req = request_with(1, json!({ "size": "Standardé_D2as_v5" }));

    let err = orchestrator(&mock).run(&req).await.unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::InvalidRequest(RequestError::InvalidSize(_))
    ));
    assert!(mock.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unpropagated_group_gets_the_long_address_delay() {
    let mock = mock();
    for _ in 0..2 {
        mock.fail_for(MockOp::CreatePublicIp, "w-1-ip", RG_NOT_FOUND);
    }
    let policies = RetryPolicies {
        public_ip: RetryPolicy::new(5, 5),
        public_ip_propagation_delay: Duration::from_secs(30),
        ..RetryPolicies::immediate()
    };

    let started = Instant::now();
    let report = Orchestrator::new(mock.clone())
        .with_policies(policies)
        .run(&request(1))
        .await
        .unwrap();

    assert!(record(&report, "w-1").success);
    assert_eq!(mock.call_count(MockOp::CreatePublicIp), 3);
    // Two waits on the 30 s delay, not the 5 s one.
    assert!(started.elapsed() >= Duration::from_secs(60));
}

#[tokio::test]
async fn address_propagation_budget_is_bounded() {
    let mock = mock();
    for _ in 0..5 {
        mock.fail_for(MockOp::CreatePublicIp, "w-1-ip", RG_NOT_FOUND);
    }

    let report = orchestrator(&mock).run(&request(1)).await.unwrap();

    let rec = record(&report, "w-1");
    assert!(!rec.success);
    assert!(rec.retried);
    assert_eq!(rec.error_class, Some(ErrorClass::PropagationDelay));
    assert_eq!(mock.call_count(MockOp::CreatePublicIp), 5);
    assert_eq!(mock.call_count(MockOp::CreateNetworkInterface), 0);
}

#[tokio::test]
async fn interface_waits_for_its_address_to_appear() {
    let mock = mock();
    for _ in 0..2 {
        mock.fail_for(MockOp::CreateNetworkInterface, "w-1-nic", NIC_DEPENDENCY_NOT_FOUND);
    }

    let report = orchestrator(&mock).run(&request(1)).await.unwrap();

    assert!(record(&report, "w-1").success);
    assert_eq!(mock.call_count(MockOp::CreateNetworkInterface), 3);
    assert_eq!(mock.successes(MockOp::CreateVirtualMachine), 1);
}

#[tokio::test]
async fn interface_retry_budget_is_bounded() {
    let mock = mock();
    for _ in 0..3 {
        mock.fail_for(MockOp::CreateNetworkInterface, "w-1-nic", NIC_DEPENDENCY_NOT_FOUND);
    }

    let report = orchestrator(&mock).run(&request(2)).await.unwrap();

    let rec = record(&report, "w-1");
    assert!(!rec.success);
    assert!(rec.retried);
    assert_eq!(rec.error_class, Some(ErrorClass::PropagationDelay));
    assert!(record(&report, "w-2").success);
    // Three attempts for w-1, one for w-2.
    assert_eq!(mock.call_count(MockOp::CreateNetworkInterface), 4);
    assert!(mock.vm(GROUP, "w-1").is_none());
}

#[tokio::test]
async fn other_interface_errors_are_not_retried() {
    let mock = mock();
    mock.fail_for(
        MockOp::CreateNetworkInterface,
        "w-1-nic",
        "InvalidRequestFormat: Cannot parse the request.",
    );

    let report = orchestrator(&mock).run(&request(1)).await.unwrap();

    let rec = record(&report, "w-1");
    assert_eq!(rec.error_class, Some(ErrorClass::Unclassified));
    assert!(!rec.retried);
    assert_eq!(mock.call_count(MockOp::CreateNetworkInterface), 1);
}
