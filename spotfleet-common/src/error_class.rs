/// Provider error taxonomy.
///
/// Azure surfaces failures as free text (`"<code>: <message>"`). Every remediation
/// decision goes through [`classify`], so any drift in provider wording shows up in
/// the pinned tests at the bottom of this file rather than as a silent misroute.
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorClass {
    QuotaExceeded,
    PropagationDelay,
    SecurityModeConflict,
    SecurityModeUnsupported,
    FeatureFlagRequired,
    NetworkAccelerationUnsupported,
    DiskNameConflict,
    UnsupportedRegion,
    Unclassified,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::QuotaExceeded => "quota-exceeded",
            ErrorClass::PropagationDelay => "propagation-delay",
            ErrorClass::SecurityModeConflict => "security-mode-conflict",
            ErrorClass::SecurityModeUnsupported => "security-mode-unsupported",
            ErrorClass::FeatureFlagRequired => "feature-flag-required",
            ErrorClass::NetworkAccelerationUnsupported => "network-acceleration-unsupported",
            ErrorClass::DiskNameConflict => "disk-name-conflict",
            ErrorClass::UnsupportedRegion => "unsupported-region",
            ErrorClass::Unclassified => "unclassified",
        }
    }

    /// Classes the remediator can act on with a single resubmission.
    pub fn is_remediable(self) -> bool {
        matches!(
            self,
            ErrorClass::SecurityModeConflict
                | ErrorClass::SecurityModeUnsupported
                | ErrorClass::NetworkAccelerationUnsupported
                | ErrorClass::DiskNameConflict
        )
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn has_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Map a provider message to its class. Order matters: the more specific
/// patterns are checked before the generic quota / not-found ones.
pub fn classify(message: &str) -> ErrorClass {
    let m = message.to_ascii_lowercase();

    if m.contains("not available to the current subscription") && m.contains("feature") {
        return ErrorClass::FeatureFlagRequired;
    }

    if has_any(
        &m,
        &[
            "locationnotavailableforresourcetype",
            "is not available for resource type",
            "noregisteredproviderfound",
            "no registered resource provider found",
        ],
    ) {
        return ErrorClass::UnsupportedRegion;
    }

    if (m.contains("propertychangenotallowed")
        || (m.contains("changing property") && m.contains("not allowed")))
        && m.contains("security")
    {
        return ErrorClass::SecurityModeConflict;
    }

    if has_any(
        &m,
        &[
            "vmsizeisnotpermittedtoenableacceleratednetworking",
            "acceleratednetworking",
            "accelerated networking",
        ],
    ) {
        return ErrorClass::NetworkAccelerationUnsupported;
    }

    if m.contains("trustedlaunch") && m.contains("not supported") {
        return ErrorClass::SecurityModeUnsupported;
    }

    if m.contains("disk")
        && (m.contains("already exists") || m.contains("conflictinguserinput"))
    {
        return ErrorClass::DiskNameConflict;
    }

    if has_any(
        &m,
        &[
            "quotaexceeded",
            "exceeding approved",
            "exceeding quota",
            "quota exceeded",
            "limitreached",
            "limit exceeded",
            "limitexceeded",
            "cannot create more than",
        ],
    ) {
        return ErrorClass::QuotaExceeded;
    }

    if has_any(
        &m,
        &[
            "resourcegroupnotfound",
            "resourcenotfound",
            "notfound",
            "could not be found",
            "was not found",
            "not found",
        ],
    ) {
        return ErrorClass::PropagationDelay;
    }

    ErrorClass::Unclassified
}

/// True for "someone else created it first" responses.
pub fn is_already_exists(message: &str) -> bool {
    let m = message.to_ascii_lowercase();
    m.contains("already exists") || m.contains("alreadyexists") || m.starts_with("conflict")
}

/// Extract the preview feature a size is gated behind, e.g. `Microsoft.Compute/ArmV6Preview`.
pub fn extract_feature_flag(message: &str) -> Option<String> {
    let trim = |s: &str| {
        s.trim_matches(|c: char| !(c.is_ascii_alphanumeric() || c == '/' || c == '.' || c == '_' || c == '-'))
            .trim_end_matches('.')
            .to_string()
    };

    // Namespaced flag anywhere in the text wins.
    if let Some(tok) = message
        .split_whitespace()
        .map(trim)
        .find(|t| t.starts_with("Microsoft.") && t.contains('/'))
    {
        return Some(tok);
    }

    // Otherwise the word following "feature flag(s)".
    let lower = message.to_ascii_lowercase();
    for marker in ["feature flags", "feature flag", "feature"] {
        if let Some(pos) = lower.find(marker) {
            let rest = &message[pos + marker.len()..];
            if let Some(tok) = rest
                .split_whitespace()
                .map(trim)
                .find(|t| !t.is_empty() && !t.eq_ignore_ascii_case("is") && !t.eq_ignore_ascii_case("required"))
            {
                return Some(tok);
            }
        }
    }
    None
}

/// Limit / usage / required figures when a quota message states them.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuotaFigures {
    pub limit: Option<i64>,
    pub usage: Option<i64>,
    pub required: Option<i64>,
}

fn number_after(message: &str, label: &str) -> Option<i64> {
    let lower = message.to_ascii_lowercase();
    let pos = lower.find(label)?;
    message[pos + label.len()..]
        .trim_start_matches(|c: char| c == ':' || c.is_whitespace())
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .ok()
}

pub fn parse_quota_figures(message: &str) -> Option<QuotaFigures> {
    let figures = QuotaFigures {
        limit: number_after(message, "current limit"),
        usage: number_after(message, "current usage"),
        required: number_after(message, "additional required"),
    };
    if figures.limit.is_none() && figures.usage.is_none() && figures.required.is_none() {
        None
    } else {
        Some(figures)
    }
}
