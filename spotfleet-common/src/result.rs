use crate::error_class::{ErrorClass, QuotaFigures};
use crate::quota::QuotaOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Remediation {
    /// Stale disk deleted, original request resubmitted unchanged.
    DiskConflictCleared,
    SecurityModeFallback { from: String, to: String },
    AccelerationDisabled,
}

impl Remediation {
    pub fn label(&self) -> String {
        match self {
            Remediation::DiskConflictCleared => "disk-conflict-cleared".to_string(),
            Remediation::SecurityModeFallback { from, to } => {
                format!("security-mode-fallback:{}->{}", from, to)
            }
            Remediation::AccelerationDisabled => "acceleration-disabled".to_string(),
        }
    }
}

/// Outcome of one instance. Written once, never mutated.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum InstanceResult {
    #[serde(rename_all = "camelCase")]
    Succeeded {
        address: Option<String>,
        private_address: Option<String>,
        generated_password: Option<String>,
        image_offer: String,
        image_sku: String,
        remediation: Option<Remediation>,
        /// Instance was already there and overwrite was not requested.
        existing: bool,
        warnings: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        error_class: ErrorClass,
        message: String,
        retried: bool,
        required_feature: Option<String>,
        quota: Option<QuotaFigures>,
    },
}

impl InstanceResult {
    pub fn is_success(&self) -> bool {
        matches!(self, InstanceResult::Succeeded { .. })
    }

    pub fn failed(error_class: ErrorClass, message: impl Into<String>, retried: bool) -> Self {
        InstanceResult::Failed {
            error_class,
            message: message.into(),
            retried,
            required_feature: None,
            quota: None,
        }
    }
}

/// Flat per-instance record in the response contract shape.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_offer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_sku: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation_applied: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub existing: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_class: Option<ErrorClass>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub retried: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_feature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota: Option<QuotaFigures>,
}

impl ResultRecord {
    pub fn from_result(name: &str, result: &InstanceResult) -> Self {
        match result {
            InstanceResult::Succeeded {
                address,
                private_address,
                generated_password,
                image_offer,
                image_sku,
                remediation,
                existing,
                warnings,
            } => ResultRecord {
                name: name.to_string(),
                success: true,
                address: address.clone(),
                private_address: private_address.clone(),
                generated_password: generated_password.clone(),
                image_offer: Some(image_offer.clone()).filter(|s| !s.is_empty()),
                image_sku: Some(image_sku.clone()).filter(|s| !s.is_empty()),
                remediation_applied: remediation.as_ref().map(Remediation::label),
                existing: *existing,
                warnings: warnings.clone(),
                ..Default::default()
            },
            InstanceResult::Failed {
                error_class,
                message,
                retried,
                required_feature,
                quota,
            } => ResultRecord {
                name: name.to_string(),
                success: false,
                error: Some(message.clone()),
                error_class: Some(*error_class),
                retried: *retried,
                required_feature: required_feature.clone(),
                quota: *quota,
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub remediated: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningReport {
    pub batch_id: Uuid,
    pub location: String,
    pub size: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub quota: QuotaOutcome,
    pub records: Vec<ResultRecord>,
    pub summary: Summary,
}

impl ProvisioningReport {
    /// Overall success needs every requested instance to have succeeded.
    pub fn is_success(&self) -> bool {
        self.summary.requested > 0 && self.summary.succeeded == self.summary.requested
    }
}

/// Identifiers of the shared infrastructure, returned by infrastructure-only mode.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureRecord {
    pub resource_group: String,
    pub location: String,
    pub virtual_network: String,
    pub subnet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nat_gateway: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nat_gateway_address: Option<String>,
}
