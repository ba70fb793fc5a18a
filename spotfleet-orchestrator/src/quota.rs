use spotfleet_common::{
    classify, ErrorClass, NetworkMode, ProvisioningRequest, QuotaOutcome, QuotaShortfall, VmSize,
};
use spotfleet_providers::{CloudProvider, Usage};

/// Regional Spot vCPU counter.
pub const SPOT_CORES_QUOTA: &str = "lowPriorityCores";
/// Standard-tier counter first, the legacy aggregate as fallback.
pub const PUBLIC_IP_QUOTAS: [&str; 2] = ["StandardSkuPublicIpAddresses", "PublicIPAddresses"];

fn find<'a>(usages: &'a [Usage], name: &str) -> Option<&'a Usage> {
    usages.iter().find(|u| u.name.eq_ignore_ascii_case(name))
}

fn shortfall(usage: &Usage, required: i64) -> Option<QuotaShortfall> {
    let available = usage.limit - usage.current;
    (available < required).then(|| QuotaShortfall {
        quota: usage.name.clone(),
        required,
        available,
        limit: usage.limit,
    })
}

/// Public addresses the batch is about to create: one per instance, or the shared
/// gateway's address unless an earlier run already left it in place.
pub async fn addresses_needed(
    provider: &dyn CloudProvider,
    request: &ProvisioningRequest,
    count: usize,
) -> usize {
    match request.network_mode {
        NetworkMode::PublicIp => count,
        NetworkMode::SharedGateway => {
            let existing = provider
                .get_public_ip(request.resource_group.trim(), &request.gateway_address_name())
                .await;
            match existing {
                Ok(Some(_)) => 0,
                _ => 1,
            }
        }
        NetworkMode::None => 0,
    }
}

/// Read-only capacity check run once before the instance loop.
///
/// Never errors: an unreachable usage API downgrades to `PassUnknown`, and a location
/// without the API reads as `RegionUnsupported`. Both let the batch proceed.
pub async fn preflight(
    provider: &dyn CloudProvider,
    location: &str,
    size: &str,
    count: usize,
    public_addresses: usize,
) -> QuotaOutcome {
    let Some(cores) = VmSize::parse(size).cores else {
        tracing::warn!("⚠️ [quota] Cannot derive vCPU count from size {}; skipping check", size);
        return QuotaOutcome::PassUnknown {
            reason: format!("cannot derive vCPU count from size '{}'", size),
        };
    };
    let required_cores = count as i64 * cores as i64;

    let compute = match provider.list_compute_usages(location).await {
        Ok(u) => u,
        Err(e) => {
            let message = e.to_string();
            if classify(&message) == ErrorClass::UnsupportedRegion {
                tracing::warn!("⚠️ [quota] Usage API not available in {}: {}", location, message);
                return QuotaOutcome::RegionUnsupported { message };
            }
            tracing::warn!("⚠️ [quota] Compute usage query failed: {}", message);
            return QuotaOutcome::PassUnknown { reason: message };
        }
    };

    let Some(spot) = find(&compute, SPOT_CORES_QUOTA) else {
        return QuotaOutcome::PassUnknown {
            reason: format!("no '{}' counter in {}", SPOT_CORES_QUOTA, location),
        };
    };
    let available_cores = spot.limit - spot.current;
    tracing::info!(
        "🔵 [quota] {}: required {} vCPUs ({} x {}), available {} of {}",
        location,
        required_cores,
        count,
        cores,
        available_cores,
        spot.limit
    );

    let mut shortfalls: Vec<QuotaShortfall> = shortfall(spot, required_cores).into_iter().collect();
    let mut unknown: Option<String> = None;

    if public_addresses > 0 {
        match provider.list_network_usages(location).await {
            Ok(network) => match PUBLIC_IP_QUOTAS.iter().find_map(|n| find(&network, n)) {
                Some(ips) => shortfalls.extend(shortfall(ips, public_addresses as i64)),
                None => unknown = Some("no public IP counter reported".to_string()),
            },
            Err(e) => {
                tracing::warn!("⚠️ [quota] Network usage query failed: {}", e);
                unknown = Some(e.to_string());
            }
        }
    }

    if !shortfalls.is_empty() {
        for s in &shortfalls {
            tracing::warn!("⚠️ [quota] Insufficient headroom: {}", s);
        }
        return QuotaOutcome::WarnBlockable { shortfalls };
    }
    if let Some(reason) = unknown {
        return QuotaOutcome::PassUnknown { reason };
    }
    tracing::info!("✅ [quota] Sufficient headroom in {}", location);
    QuotaOutcome::Pass {
        required_cores,
        available_cores,
    }
}
