use crate::error::OrchestratorError;
use crate::image;
use crate::init;
use crate::network;
use crate::provision::Provisioner;
use crate::quota;
use crate::report::Aggregator;
use crate::retry::RetryPolicies;
use spotfleet_common::vm_size::parse_size_patterns;
use spotfleet_common::{
    InfrastructureRecord, InstanceResult, ProvisioningReport, ProvisioningRequest, QuotaOutcome,
};
use spotfleet_providers::CloudProvider;
use std::sync::Arc;

/// Drives one batch: quota preflight, shared infrastructure, image selection, then
/// every instance in sequence.
pub struct Orchestrator {
    provider: Arc<dyn CloudProvider>,
    policies: RetryPolicies,
    accelerated_patterns: Vec<String>,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn CloudProvider>) -> Self {
        Self {
            provider,
            policies: RetryPolicies::default(),
            accelerated_patterns: parse_size_patterns(None),
        }
    }

    pub fn with_policies(mut self, policies: RetryPolicies) -> Self {
        self.policies = policies;
        self
    }

    pub fn with_accelerated_patterns(mut self, patterns: Vec<String>) -> Self {
        self.accelerated_patterns = patterns;
        self
    }

    /// Build the shared infrastructure only and return its identifiers.
    pub async fn create_infrastructure(
        &self,
        request: &ProvisioningRequest,
    ) -> Result<InfrastructureRecord, OrchestratorError> {
        for (field, value) in [
            ("resourceGroup", &request.resource_group),
            ("location", &request.location),
        ] {
            if value.trim().is_empty() {
                return Err(spotfleet_common::RequestError::Missing(field).into());
            }
        }
        let context = network::build(self.provider.as_ref(), request, &self.policies).await?;
        Ok(context.record())
    }

    /// Run the whole batch.
    ///
    /// Errors only when the batch aborts before the instance loop. Once the loop
    /// starts, every instance gets exactly one record whatever happens to the others.
    pub async fn run(
        &self,
        request: &ProvisioningRequest,
    ) -> Result<ProvisioningReport, OrchestratorError> {
        let provider = self.provider.as_ref();
        let names = request.validate()?;
        let prepared = init::prepare(request.init.as_ref()).await?;

        let quota = if request.switches.skip_quota_check {
            tracing::info!("🔵 [quota] Preflight skipped on request");
            QuotaOutcome::Skipped
        } else {
            let addresses = quota::addresses_needed(provider, request, names.len()).await;
            quota::preflight(
                provider,
                request.location.trim(),
                &request.size,
                names.len(),
                addresses,
            )
            .await
        };
        if let QuotaOutcome::WarnBlockable { shortfalls } = &quota {
            if quota.blocks(request.switches.force) {
                tracing::error!("❌ [quota] Insufficient quota; aborting before any instance is created");
                return Err(OrchestratorError::QuotaBlocked {
                    shortfalls: shortfalls.clone(),
                });
            }
            tracing::warn!("⚠️ [quota] Insufficient quota reported; continuing because force is set");
        }

        let context = network::build(provider, request, &self.policies).await?;
        let image = image::resolve(provider, &context.location, &request.size, &request.image).await;

        let provisioner = Provisioner::new(
            provider,
            request,
            &context,
            &image,
            &prepared,
            &self.policies,
            &self.accelerated_patterns,
        );

        let mut aggregator = Aggregator::new(request, quota);
        tracing::info!(
            "🔵 [provision] Batch {}: {} instance(s) of {} in {}",
            aggregator.batch_id(),
            names.len(),
            request.size,
            context.location
        );
        for (i, name) in names.iter().enumerate() {
            tracing::info!("🔵 [provision] [{}/{}] {}", i + 1, names.len(), name);
            let result = provisioner.provision(name).await;
            match &result {
                InstanceResult::Succeeded { .. } => tracing::info!("✅ [provision] {} succeeded", name),
                InstanceResult::Failed { error_class, .. } => {
                    tracing::error!("❌ [provision] {} failed [{}]", name, error_class)
                }
            }
            aggregator.record(name, result);
        }

        let report = aggregator.finish();
        tracing::info!(
            "✅ [provision] Batch done: {}/{} succeeded, {} failed, {} remediated",
            report.summary.succeeded,
            report.summary.requested,
            report.summary.failed,
            report.summary.remediated
        );
        Ok(report)
    }
}
