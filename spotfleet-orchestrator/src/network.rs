//! Shared infrastructure for a batch: resource group, virtual network + subnet, and
//! optionally a NAT gateway associated with the subnet.
//!
//! Every step is get-or-create, so running the builder twice issues no creates the
//! second time. Several orchestrator processes may run it concurrently against the
//! same group; the gateway step absorbs the "already exists" loser and repairs the
//! subnet association it may have left behind.

use crate::error::OrchestratorError;
use crate::retry::{RetryPolicies, RetryPolicy};
use anyhow::anyhow;
use spotfleet_common::error_class::is_already_exists;
use spotfleet_common::request::{DEFAULT_SUBNET_ADDRESS_PREFIX, DEFAULT_VNET_ADDRESS_PREFIX};
use spotfleet_common::{classify, ErrorClass, InfrastructureRecord, ProvisioningRequest};
use spotfleet_providers::{CloudProvider, NatGateway, PublicIp, ResourceGroup, Subnet, SubnetSpec};
use std::future::Future;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkContext {
    pub resource_group: String,
    pub location: String,
    pub vnet_name: String,
    pub vnet_id: String,
    pub subnet_name: String,
    pub subnet_id: String,
    pub gateway_id: Option<String>,
    pub gateway_address: Option<String>,
}

impl NetworkContext {
    pub fn record(&self) -> InfrastructureRecord {
        InfrastructureRecord {
            resource_group: self.resource_group.clone(),
            location: self.location.clone(),
            virtual_network: self.vnet_id.clone(),
            subnet: self.subnet_id.clone(),
            nat_gateway: self.gateway_id.clone(),
            nat_gateway_address: self.gateway_address.clone(),
        }
    }
}

fn infra_error(step: &'static str, message: String) -> OrchestratorError {
    OrchestratorError::Infrastructure {
        step,
        class: classify(&message),
        message,
    }
}

/// Run `op` until it succeeds, retrying only while the failure reads as propagation delay.
async fn with_propagation_retry<T, F, Fut>(
    policy: &RetryPolicy,
    step: &'static str,
    mut op: F,
) -> Result<T, OrchestratorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let message = match op().await {
            Ok(v) => return Ok(v),
            Err(e) => e.to_string(),
        };
        let class = classify(&message);
        if class != ErrorClass::PropagationDelay {
            tracing::error!("❌ [network] {} failed [{}]: {}", step, class, message);
            return Err(OrchestratorError::Infrastructure {
                step,
                class,
                message,
            });
        }
        if attempt >= policy.max_attempts {
            tracing::error!(
                "❌ [network] {} still not visible after {} attempts",
                step,
                attempt
            );
            return Err(OrchestratorError::Infrastructure {
                step,
                class,
                message: format!("retry budget exhausted after {} attempts: {}", attempt, message),
            });
        }
        tracing::warn!(
            "🔄 [network] {} not propagated yet (attempt {}/{}): {}",
            step,
            attempt,
            policy.max_attempts,
            message
        );
        policy.pause().await;
    }
}

/// Poll until the group is gone. Deletion is started by the caller.
async fn wait_group_gone(
    provider: &dyn CloudProvider,
    name: &str,
    policy: &RetryPolicy,
) -> Result<(), OrchestratorError> {
    for attempt in 1..=policy.max_attempts {
        match provider.get_resource_group(name).await {
            Ok(None) => {
                tracing::info!("✅ [network] Resource group {} deleted", name);
                return Ok(());
            }
            Ok(Some(_)) => {
                tracing::info!(
                    "⏳ [network] Waiting for resource group {} deletion ({}/{})",
                    name,
                    attempt,
                    policy.max_attempts
                );
            }
            Err(e) => tracing::warn!("⚠️ [network] Deletion poll for {} failed: {}", name, e),
        }
        policy.pause().await;
    }
    Err(OrchestratorError::Infrastructure {
        step: "resource-group",
        class: ErrorClass::PropagationDelay,
        message: format!(
            "resource group '{}' still deleting after {} polls",
            name, policy.max_attempts
        ),
    })
}

async fn ensure_resource_group(
    provider: &dyn CloudProvider,
    name: &str,
    location: &str,
    policies: &RetryPolicies,
) -> Result<ResourceGroup, OrchestratorError> {
    let existing = provider
        .get_resource_group(name)
        .await
        .map_err(|e| infra_error("resource-group", e.to_string()))?;

    match existing {
        Some(group) if group.is_deleting() => {
            tracing::warn!("⚠️ [network] Resource group {} is being deleted; waiting", name);
            wait_group_gone(provider, name, &policies.group_deletion).await?;
        }
        Some(group) if !group.location.eq_ignore_ascii_case(location) => {
            // A group cannot move; the only way to reuse the name is to recreate it.
            tracing::warn!(
                "⚠️ [network] Resource group {} is in {}, requested {}; deleting it",
                name,
                group.location,
                location
            );
            provider
                .delete_resource_group(name)
                .await
                .map_err(|e| infra_error("resource-group", e.to_string()))?;
            wait_group_gone(provider, name, &policies.group_deletion).await?;
        }
        Some(group) => {
            tracing::info!("✅ [network] Reusing resource group {} ({})", name, group.location);
            return Ok(group);
        }
        None => {}
    }

    let group = provider
        .create_resource_group(name, location)
        .await
        .map_err(|e| infra_error("resource-group", e.to_string()))?;
    tracing::info!("✅ [network] Created resource group {} in {}", name, location);
    Ok(group)
}

async fn ensure_public_ip(
    provider: &dyn CloudProvider,
    group: &str,
    location: &str,
    name: &str,
    policy: &RetryPolicy,
) -> Result<PublicIp, OrchestratorError> {
    with_propagation_retry(policy, "gateway-address", move || async move {
        if let Some(ip) = provider.get_public_ip(group, name).await? {
            return Ok(ip);
        }
        provider.create_public_ip(group, location, name).await
    })
    .await
}

async fn ensure_gateway(
    provider: &dyn CloudProvider,
    group: &str,
    location: &str,
    name: &str,
    address_id: &str,
    policy: &RetryPolicy,
) -> Result<NatGateway, OrchestratorError> {
    with_propagation_retry(policy, "nat-gateway", move || async move {
        if let Some(gw) = provider.get_nat_gateway(group, name).await? {
            return Ok(gw);
        }
        match provider.create_nat_gateway(group, location, name, address_id).await {
            Ok(created) => {
                tracing::info!("✅ [network] Created NAT gateway {}", name);
                // Re-read: a concurrent creator may have replaced what we just wrote.
                Ok(provider
                    .get_nat_gateway(group, name)
                    .await?
                    .unwrap_or(created))
            }
            Err(e) if is_already_exists(&e.to_string()) => {
                tracing::warn!(
                    "⚠️ [network] NAT gateway {} was created concurrently; adopting it",
                    name
                );
                provider.get_nat_gateway(group, name).await?.ok_or_else(|| {
                    anyhow!(
                        "NotFound: NAT gateway '{}' reported as existing but not visible yet",
                        name
                    )
                })
            }
            Err(e) => Err(e),
        }
    })
    .await
}

async fn ensure_association(
    provider: &dyn CloudProvider,
    group: &str,
    vnet: &str,
    subnet: Subnet,
    gateway_id: &str,
    policy: &RetryPolicy,
) -> Result<Subnet, OrchestratorError> {
    let associated = subnet
        .nat_gateway_id
        .as_deref()
        .map(|id| id.eq_ignore_ascii_case(gateway_id))
        .unwrap_or(false);
    if associated {
        return Ok(subnet);
    }

    tracing::info!(
        "🔄 [network] Associating NAT gateway with subnet {}/{}",
        vnet,
        subnet.name
    );
    let spec = SubnetSpec {
        name: subnet.name.clone(),
        address_prefix: subnet.address_prefix.clone(),
        nat_gateway_id: Some(gateway_id.to_string()),
    };
    let spec = &spec;
    with_propagation_retry(policy, "subnet-association", move || async move {
        provider.create_or_update_subnet(group, vnet, spec).await
    })
    .await
}

/// Establish the batch's shared infrastructure. Any failure aborts the batch.
pub async fn build(
    provider: &dyn CloudProvider,
    request: &ProvisioningRequest,
    policies: &RetryPolicies,
) -> Result<NetworkContext, OrchestratorError> {
    let group = request.resource_group.trim();
    let location = request.location.trim();
    let vnet_name = request.vnet_name();
    let subnet_name = request.subnet_name();
    let (vnet, subnet_n) = (vnet_name.as_str(), subnet_name.as_str());

    tracing::info!("🔵 [network] Ensuring infrastructure in {} / {}", group, location);
    ensure_resource_group(provider, group, location, policies).await?;

    let subnet_spec = SubnetSpec {
        name: subnet_name.clone(),
        address_prefix: DEFAULT_SUBNET_ADDRESS_PREFIX.to_string(),
        nat_gateway_id: None,
    };
    let spec = &subnet_spec;

    let network = with_propagation_retry(&policies.propagation, "virtual-network", move || async move {
        if let Some(existing) = provider.get_virtual_network(group, vnet).await? {
            return Ok(existing);
        }
        let created = provider
            .create_virtual_network(group, location, vnet, DEFAULT_VNET_ADDRESS_PREFIX, spec)
            .await?;
        tracing::info!("✅ [network] Created virtual network {}", vnet);
        Ok::<_, anyhow::Error>(created)
    })
    .await?;

    let mut subnet = with_propagation_retry(&policies.propagation, "subnet", move || async move {
        if let Some(existing) = provider.get_subnet(group, vnet, subnet_n).await? {
            return Ok(existing);
        }
        tracing::info!("🔵 [network] Adding subnet {} to {}", subnet_n, vnet);
        provider.create_or_update_subnet(group, vnet, spec).await
    })
    .await?;

    let mut gateway_id = None;
    let mut gateway_address = None;
    if request.network_mode.uses_gateway() {
        let address_name = request.gateway_address_name();
        let gateway_name = request.gateway_name();
        let ip = ensure_public_ip(provider, group, location, &address_name, &policies.propagation).await?;
        let gw = ensure_gateway(
            provider,
            group,
            location,
            &gateway_name,
            &ip.id,
            &policies.propagation,
        )
        .await?;
        subnet = ensure_association(provider, group, vnet, subnet, &gw.id, &policies.propagation).await?;
        gateway_id = Some(gw.id);
        gateway_address = ip.ip_address;
    }

    tracing::info!("✅ [network] Infrastructure ready: {} / {}", network.name, subnet.name);
    Ok(NetworkContext {
        resource_group: group.to_string(),
        location: location.to_string(),
        vnet_name: network.name,
        vnet_id: network.id,
        subnet_name: subnet.name,
        subnet_id: subnet.id,
        gateway_id,
        gateway_address,
    })
}
