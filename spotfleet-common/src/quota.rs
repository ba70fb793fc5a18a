use serde::{Deserialize, Serialize};

/// One quota counter that cannot absorb the request.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuotaShortfall {
    pub quota: String,
    pub required: i64,
    pub available: i64,
    pub limit: i64,
}

impl std::fmt::Display for QuotaShortfall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: required {}, available {} (limit {})",
            self.quota, self.required, self.available, self.limit
        )
    }
}

/// Result of the preflight capacity check.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum QuotaOutcome {
    #[serde(rename_all = "camelCase")]
    Pass {
        required_cores: i64,
        available_cores: i64,
    },
    /// Usage API unreachable or ambiguous; never blocks.
    PassUnknown { reason: String },
    /// Insufficient headroom; the caller may override with `force`.
    WarnBlockable { shortfalls: Vec<QuotaShortfall> },
    /// The usage API does not exist in this location; proceed anyway.
    RegionUnsupported { message: String },
    Skipped,
}

impl QuotaOutcome {
    pub fn blocks(&self, force: bool) -> bool {
        matches!(self, QuotaOutcome::WarnBlockable { .. }) && !force
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_warn_blocks_and_force_overrides() {
        let warn = QuotaOutcome::WarnBlockable {
            shortfalls: vec![QuotaShortfall {
                quota: "lowPriorityCores".into(),
                required: 8,
                available: 2,
                limit: 10,
            }],
        };
        assert!(warn.blocks(false));
        assert!(!warn.blocks(true));
        assert!(!QuotaOutcome::Skipped.blocks(false));
        assert!(!QuotaOutcome::PassUnknown { reason: "x".into() }.blocks(false));
        assert!(!QuotaOutcome::RegionUnsupported { message: "x".into() }.blocks(false));
    }
}
