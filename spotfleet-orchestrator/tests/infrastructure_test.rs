// Integration tests for the shared network graph
mod common;

use common::*;
use spotfleet_common::ErrorClass;
use spotfleet_orchestrator::network;
use spotfleet_orchestrator::{OrchestratorError, RetryPolicies};
use spotfleet_providers::mock::MockOp;
use spotfleet_providers::CloudProvider;

#[tokio::test]
async fn second_build_issues_no_creates() {
    let mock = mock();
    let req = gateway_request();
    let policies = RetryPolicies::immediate();

    let first = network::build(mock.as_ref(), &req, &policies).await.unwrap();
    let before = mock.calls().len();
    let second = network::build(mock.as_ref(), &req, &policies).await.unwrap();

    assert_eq!(first, second);
    let rerun: Vec<String> = mock.calls()[before..].to_vec();
    assert!(
        rerun.iter().all(|c| !c.starts_with("Create")),
        "unexpected creates on rerun: {:?}",
        rerun
    );
    assert_eq!(mock.successes(MockOp::CreateResourceGroup), 1);
    assert_eq!(mock.successes(MockOp::CreateVirtualNetwork), 1);
    assert_eq!(mock.successes(MockOp::CreateNatGateway), 1);
}

#[tokio::test]
async fn group_in_wrong_location_is_recreated() {
    let mock = mock();
    mock.seed_resource_group(GROUP, "eastus");
    mock.set_group_deletion_polls(3);

    let ctx = network::build(mock.as_ref(), &request(1), &RetryPolicies::immediate())
        .await
        .unwrap();

    assert_eq!(ctx.location, LOCATION);
    assert_eq!(mock.successes(MockOp::DeleteResourceGroup), 1);
    let group = mock.get_resource_group(GROUP).await.unwrap().unwrap();
    assert_eq!(group.location, LOCATION);
}

#[tokio::test]
async fn group_deletion_poll_budget_is_bounded() {
    let mock = mock();
    mock.seed_resource_group(GROUP, "eastus");
    mock.set_group_deletion_polls(100);

    let err = network::build(mock.as_ref(), &request(1), &RetryPolicies::immediate())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Infrastructure {
            step: "resource-group",
            ..
        }
    ));
    assert_eq!(mock.call_count(MockOp::CreateResourceGroup), 0);
}

#[tokio::test]
async fn network_create_waits_for_group_propagation() {
    let mock = mock();
    mock.fail_times(MockOp::CreateVirtualNetwork, RG_NOT_FOUND, 3);

    let ctx = network::build(mock.as_ref(), &request(1), &RetryPolicies::immediate())
        .await
        .unwrap();

    assert_eq!(ctx.vnet_name, VNET);
    assert_eq!(mock.call_count(MockOp::CreateVirtualNetwork), 4);
}

#[tokio::test]
async fn exhausted_propagation_budget_aborts_batch() {
    let mock = mock();
    mock.fail_times(MockOp::CreateVirtualNetwork, RG_NOT_FOUND, 12);

    let err = orchestrator(&mock).run(&request(2)).await.unwrap_err();
    match err {
        OrchestratorError::Infrastructure { step, class, .. } => {
            assert_eq!(step, "virtual-network");
            assert_eq!(class, ErrorClass::PropagationDelay);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(mock.call_count(MockOp::CreateVirtualNetwork), 12);
    assert_eq!(mock.call_count(MockOp::CreateVirtualMachine), 0);
}

#[tokio::test]
async fn unsupported_region_aborts_without_retry() {
    let mock = mock();
    mock.fail_next(
        MockOp::CreateResourceGroup,
        "LocationNotAvailableForResourceType: The provided location 'westeurope' is not available for resource type 'Microsoft.Resources/resourceGroups'.",
    );

    let err = orchestrator(&mock).run(&request(1)).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Infrastructure {
            class: ErrorClass::UnsupportedRegion,
            ..
        }
    ));
    assert_eq!(mock.call_count(MockOp::CreatePublicIp), 0);
    assert_eq!(mock.call_count(MockOp::CreateVirtualMachine), 0);
}

#[tokio::test]
async fn infrastructure_only_returns_identifiers() {
    let mock = mock();
    let record = orchestrator(&mock)
        .create_infrastructure(&gateway_request())
        .await
        .unwrap();

    assert_eq!(record.resource_group, GROUP);
    assert!(record.virtual_network.ends_with("/virtualNetworks/fleet-vnet"));
    assert!(record.subnet.ends_with("/subnets/default"));
    assert!(record.nat_gateway.as_deref().unwrap().ends_with("/natGateways/fleet-natgw"));
    assert!(record.nat_gateway_address.is_some());
    assert_eq!(mock.call_count(MockOp::CreateVirtualMachine), 0);
    assert_eq!(mock.call_count(MockOp::ComputeUsages), 0);
}
