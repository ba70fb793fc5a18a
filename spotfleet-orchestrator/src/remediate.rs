use crate::provision::{InstanceSpec, InterfaceBindings, Provisioner};
use spotfleet_common::error_class::{extract_feature_flag, parse_quota_figures};
use spotfleet_common::{classify, ErrorClass, InstanceResult, Remediation};
use spotfleet_providers::VmSpec;

/// Terminal failure record, enriched with whatever the message tells us.
pub fn terminal(message: &str, retried: bool) -> InstanceResult {
    let error_class = classify(message);
    InstanceResult::Failed {
        error_class,
        message: message.to_string(),
        retried,
        required_feature: match error_class {
            ErrorClass::FeatureFlagRequired => extract_feature_flag(message),
            _ => None,
        },
        quota: match error_class {
            ErrorClass::QuotaExceeded => parse_quota_figures(message),
            _ => None,
        },
    }
}

/// Single remediation pass for a failed instance create.
///
/// At most one fix is applied and the create is resubmitted exactly once; a second
/// failure is terminal whatever its class.
pub async fn remediate(
    p: &Provisioner<'_>,
    spec: &InstanceSpec,
    bindings: &InterfaceBindings,
    submitted: &VmSpec,
    message: String,
) -> Result<Remediation, InstanceResult> {
    let class = classify(&message);
    tracing::warn!("⚠️ [remediate] {}: create failed [{}]: {}", spec.name, class, message);

    if !class.is_remediable() {
        if class == ErrorClass::FeatureFlagRequired {
            tracing::error!(
                "❌ [remediate] {}: size requires feature registration ({})",
                spec.name,
                extract_feature_flag(&message).as_deref().unwrap_or("unknown flag")
            );
        }
        return Err(terminal(&message, false));
    }

    let (remediation, resubmit) = match class {
        ErrorClass::SecurityModeConflict | ErrorClass::DiskNameConflict => {
            tracing::info!("🔄 [remediate] {}: deleting conflicting disk {}", spec.name, spec.disk_name);
            if let Err(e) = p.provider.delete_disk(p.group(), &spec.disk_name).await {
                tracing::error!("❌ [remediate] {}: disk delete failed: {}", spec.name, e);
                return Err(terminal(&message, false));
            }
            (Remediation::DiskConflictCleared, submitted.clone())
        }
        ErrorClass::SecurityModeUnsupported => {
            if p.request.switches.strict_security_mode {
                tracing::warn!("⚠️ [remediate] {}: strict security mode, not falling back", spec.name);
                return Err(terminal(&message, false));
            }
            let to = spec.security_mode.fallback();
            if submitted.security_type == to.as_str() {
                return Err(terminal(&message, false));
            }
            p.delete_orphaned_disk(spec).await;
            (
                Remediation::SecurityModeFallback {
                    from: submitted.security_type.clone(),
                    to: to.as_str().to_string(),
                },
                VmSpec {
                    security_type: to.as_str().to_string(),
                    ..submitted.clone()
                },
            )
        }
        ErrorClass::NetworkAccelerationUnsupported => {
            tracing::info!(
                "🔄 [remediate] {}: recreating {} without accelerated networking",
                spec.name,
                spec.nic_name
            );
            if let Err(e) = p
                .provider
                .delete_network_interface(p.group(), &spec.nic_name)
                .await
            {
                tracing::error!("❌ [remediate] {}: interface delete failed: {}", spec.name, e);
                return Err(terminal(&message, false));
            }
            p.delete_orphaned_disk(spec).await;
            let nic = p.create_interface(spec, bindings, false).await?;
            (
                Remediation::AccelerationDisabled,
                VmSpec {
                    nic_id: nic.id,
                    ..submitted.clone()
                },
            )
        }
        _ => return Err(terminal(&message, false)),
    };

    p.policies.remediation.pause().await;
    tracing::info!("🔄 [remediate] {}: resubmitting ({})", spec.name, remediation.label());
    match p.provider.create_virtual_machine(p.group(), &resubmit).await {
        Ok(_) => {
            tracing::info!("✅ [remediate] {}: create succeeded after {}", spec.name, remediation.label());
            Ok(remediation)
        }
        Err(e) => {
            let message = e.to_string();
            tracing::error!("❌ [remediate] {}: resubmission failed: {}", spec.name, message);
            Err(terminal(&message, true))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_records_carry_extracted_details() {
        let quota = terminal(
            "OperationNotAllowed: Operation could not be completed as it results in exceeding approved LowPriorityCores quota. Current Limit: 10, Current Usage: 8, Additional Required: 4.",
            false,
        );
        let InstanceResult::Failed { error_class, quota: Some(figures), .. } = quota else {
            panic!("expected quota figures");
        };
        assert_eq!(error_class, ErrorClass::QuotaExceeded);
        assert_eq!(figures.limit, Some(10));
        assert_eq!(figures.required, Some(4));

        let flag = terminal(
            "BadRequest: The requested VM size Standard_D2pls_v6 is not available to the current subscription. Please register the subscription for feature flags: Microsoft.Compute/ArmV6Preview.",
            false,
        );
        let InstanceResult::Failed { required_feature, .. } = flag else {
            panic!("expected failure");
        };
        assert_eq!(required_feature.as_deref(), Some("Microsoft.Compute/ArmV6Preview"));
    }
}
