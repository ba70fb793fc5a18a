// Concurrent builders racing on the shared NAT gateway
mod common;

use common::*;
use spotfleet_orchestrator::network;
use spotfleet_orchestrator::RetryPolicies;
use spotfleet_providers::mock::MockOp;
use spotfleet_providers::{CloudProvider, SubnetSpec};

#[tokio::test]
async fn concurrent_builders_share_one_gateway() {
    let mock = mock();
    let req = gateway_request();
    let policies = RetryPolicies::immediate();

    let (a, b) = tokio::join!(
        network::build(mock.as_ref(), &req, &policies),
        network::build(mock.as_ref(), &req, &policies),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    assert!(a.gateway_id.is_some());
    assert_eq!(a.gateway_id, b.gateway_id);
    assert_eq!(mock.successes(MockOp::CreateNatGateway), 1);

    let subnet = mock.subnet(GROUP, VNET, SUBNET).unwrap();
    assert_eq!(subnet.nat_gateway_id, a.gateway_id);
}

#[tokio::test]
async fn losing_creator_adopts_gateway_and_repairs_association() {
    let mock = mock();
    // Another process wins the create and stops before associating the subnet.
    mock.inject_gateway_conflict();

    let ctx = network::build(mock.as_ref(), &gateway_request(), &RetryPolicies::immediate())
        .await
        .unwrap();

    assert_eq!(mock.successes(MockOp::CreateNatGateway), 0);
    assert_eq!(mock.call_count(MockOp::CreateNatGateway), 1);
    let gateway_id = ctx.gateway_id.clone().unwrap();
    assert!(gateway_id.ends_with("/natGateways/fleet-natgw"));
    let subnet = mock.subnet(GROUP, VNET, SUBNET).unwrap();
    assert_eq!(subnet.nat_gateway_id.as_deref(), Some(gateway_id.as_str()));
}

#[tokio::test]
async fn rerun_repairs_dropped_association() {
    let mock = mock();
    let req = gateway_request();
    let policies = RetryPolicies::immediate();
    let ctx = network::build(mock.as_ref(), &req, &policies).await.unwrap();

    // Subnet rewritten without the gateway, as a partial run would leave it.
    mock.create_or_update_subnet(
        GROUP,
        VNET,
        &SubnetSpec {
            name: SUBNET.to_string(),
            address_prefix: "10.0.0.0/24".to_string(),
            nat_gateway_id: None,
        },
    )
    .await
    .unwrap();

    let again = network::build(mock.as_ref(), &req, &policies).await.unwrap();
    assert_eq!(again.gateway_id, ctx.gateway_id);
    assert_eq!(mock.successes(MockOp::CreateNatGateway), 1);
    let subnet = mock.subnet(GROUP, VNET, SUBNET).unwrap();
    assert_eq!(subnet.nat_gateway_id, ctx.gateway_id);
}
