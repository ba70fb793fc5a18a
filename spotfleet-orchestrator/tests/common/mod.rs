// Common test utilities and fixtures
#![allow(dead_code)]

use serde_json::{json, Value};
use spotfleet_common::{ProvisioningReport, ProvisioningRequest, ResultRecord};
use spotfleet_orchestrator::{Orchestrator, RetryPolicies};
use spotfleet_providers::mock::MockProvider;
use std::sync::Arc;

pub const GROUP: &str = "fleet";
pub const LOCATION: &str = "westeurope";
pub const SIZE: &str = "Standard_D2as_v5";
pub const VNET: &str = "fleet-vnet";
pub const SUBNET: &str = "default";

pub const SPOT_QUOTA_ERROR: &str = "OperationNotAllowed: Operation could not be completed as it results in exceeding approved LowPriorityCores quota. Additional details - Deployment Model: Resource Manager, Location: westeurope, Current Limit: 10, Current Usage: 8, Additional Required: 2, (Minimum) New Limit Required: 12.";
pub const IP_QUOTA_ERROR: &str = "PublicIPCountLimitReached: Cannot create more than 20 public IP addresses for this subscription in this region.";
pub const RG_NOT_FOUND: &str = "ResourceGroupNotFound: Resource group 'fleet' could not be found.";
pub const NIC_DEPENDENCY_NOT_FOUND: &str = "NotFound: Resource /subscriptions/0000/resourceGroups/fleet/providers/Microsoft.Network/publicIPAddresses/w-1-ip not found.";
pub const FEATURE_FLAG_ERROR: &str = "BadRequest: The requested VM size Standard_D2as_v5 is not available to the current subscription. Please register the subscription for feature flags: Microsoft.Compute/SpotPreview.";

pub fn mock() -> Arc<MockProvider> {
    Arc::new(MockProvider::new())
}

/// Orchestrator over the mock with zero-delay retries.
pub fn orchestrator(mock: &Arc<MockProvider>) -> Orchestrator {
    Orchestrator::new(mock.clone()).with_policies(RetryPolicies::immediate())
}

/// `count` instances named `w-1..w-N`, public address per instance.
pub fn request(count: u32) -> ProvisioningRequest {
    request_with(count, json!({}))
}

/// Base request with `overrides` merged in at the top level.
pub fn request_with(count: u32, overrides: Value) -> ProvisioningRequest {
    let mut base = json!({
        "resourceGroup": GROUP,
        "location": LOCATION,
        "size": SIZE,
        "names": { "count": { "prefix": "w", "count": count } },
    });
    if let (Some(obj), Some(extra)) = (base.as_object_mut(), overrides.as_object()) {
        for (k, v) in extra {
            obj.insert(k.clone(), v.clone());
        }
    }
    serde_json::from_value(base).expect("valid request")
}

pub fn gateway_request() -> ProvisioningRequest {
    request_with(1, json!({ "networkMode": "sharedGateway" }))
}

pub fn record<'a>(report: &'a ProvisioningReport, name: &str) -> &'a ResultRecord {
    report
        .records
        .iter()
        .find(|r| r.name == name)
        .unwrap_or_else(|| panic!("no record for {}", name))
}
