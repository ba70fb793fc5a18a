/// VM size helpers shared by the quota check, image resolver and provisioner.
///
/// Azure size names follow `Standard_<Family><vCPUs>[-<constrained>]<features>[_<accel>][_v<N>]`.
/// A `p` among the lowercase feature letters marks an Arm64 (Ampere / Cobalt) size.
use serde::{Deserialize, Serialize};

// Families known to accept accelerated networking. `B`/`A` series are left out on purpose:
// most of their sizes reject it at create time.
pub const DEFAULT_ACCELERATED_SIZE_PATTERNS: &str =
    "STANDARD_D*,STANDARD_E*,STANDARD_F*,STANDARD_L*,STANDARD_M*,STANDARD_N*,STANDARD_HB*,STANDARD_HC*";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    X64,
    Arm64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmSize {
    pub name: String,
    pub family: String,
    pub cores: Option<u32>,
    pub features: String,
    pub arch: Architecture,
}

impl VmSize {
    pub fn parse(name: &str) -> VmSize {
        let trimmed = name.trim();
        let body = strip_tier(trimmed);
        let head = body.split('_').next().unwrap_or("");

        let family: String = head.chars().take_while(|c| c.is_ascii_uppercase()).collect();
        let rest = &head[family.len()..];
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        let mut rest = &rest[digits.len()..];

        // Constrained-core sizes (E4-2s_v5): skip the active-core suffix.
        if let Some(stripped) = rest.strip_prefix('-') {
            let skip = stripped.chars().take_while(|c| c.is_ascii_digit()).count();
            rest = &stripped[skip..];
        }

        let features: String = rest.chars().take_while(|c| c.is_ascii_lowercase()).collect();
        let arch = if features.contains('p') {
            Architecture::Arm64
        } else {
            Architecture::X64
        };

        VmSize {
            name: trimmed.to_string(),
            family,
            cores: digits.parse().ok(),
            features,
            arch,
        }
    }

    pub fn is_arm64(&self) -> bool {
        self.arch == Architecture::Arm64
    }

    /// Accelerated networking needs a compatible family and at least two vCPUs.
    pub fn supports_acceleration(&self, patterns: &[String]) -> bool {
        self.cores.unwrap_or(0) >= 2 && size_matches_patterns(&self.name, patterns)
    }
}

fn strip_tier(name: &str) -> &str {
    for prefix in ["Standard_", "Basic_"] {
        let matches = name
            .get(..prefix.len())
            .map_or(false, |head| head.eq_ignore_ascii_case(prefix));
        if matches {
            return &name[prefix.len()..];
        }
    }
    name
}

/// Parse comma-separated patterns.
///
/// - Trims whitespace
/// - Drops empty entries
/// - If input is empty/None, returns the default patterns
pub fn parse_size_patterns(raw: Option<&str>) -> Vec<String> {
    let mut out: Vec<String> = raw
        .unwrap_or("")
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect();

    if out.is_empty() {
        out = DEFAULT_ACCELERATED_SIZE_PATTERNS
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();
    }

    out
}

/// Return true if `size` matches at least one pattern.
///
/// Pattern rules:
/// - Case-insensitive
/// - `*` matches any substring (including empty)
pub fn size_matches_patterns(size: &str, patterns: &[String]) -> bool {
    let it = size.trim().to_ascii_uppercase();
    if it.is_empty() {
        return false;
    }
    patterns.iter().any(|pat| glob_match(&it, &pat.trim().to_ascii_uppercase()))
}

fn glob_match(text: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    if !pattern.contains('*') {
        return text == pattern;
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let first = parts[0];
    let last = parts[parts.len() - 1];
    if !text.starts_with(first) {
        return false;
    }
    let mut idx = first.len();

    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match text[idx..].find(part) {
            Some(pos) => idx += pos + part.len(),
            None => return false,
        }
    }

    text.len() >= idx + last.len() && text[idx..].ends_with(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_sizes() {
        let s = VmSize::parse("Standard_D4as_v5");
        assert_eq!(s.family, "D");
        assert_eq!(s.cores, Some(4));
        assert_eq!(s.features, "as");
        assert_eq!(s.arch, Architecture::X64);

        let s = VmSize::parse("Standard_NC24ads_A100_v4");
        assert_eq!(s.family, "NC");
        assert_eq!(s.cores, Some(24));

        let s = VmSize::parse("Standard_E4-2s_v5");
        assert_eq!(s.cores, Some(4));
        assert_eq!(s.features, "s");

        let s = VmSize::parse("standard_A1_v2");
        assert_eq!(s.cores, Some(1));

        assert_eq!(VmSize::parse("Weird").cores, None);
    }

    #[test]
    fn multibyte_names_parse_without_panicking() {
        let s = VmSize::parse("Standardé_D2as_v5");
        assert_eq!(s.cores, None);
        assert_eq!(VmSize::parse("Stä").family, "S");
        assert_eq!(VmSize::parse("Standard_D2é").cores, Some(2));
    }

    #[test]
    fn detects_arm64() {
        for size in ["Standard_D4ps_v5", "Standard_D2pls_v5", "Standard_E8pds_v6", "Standard_B2pts_v2"] {
            assert!(VmSize::parse(size).is_arm64(), "{}", size);
        }
        for size in ["Standard_D4s_v5", "Standard_F16s_v2", "Standard_DC2s_v3"] {
            assert!(!VmSize::parse(size).is_arm64(), "{}", size);
        }
    }

    #[test]
    fn default_patterns_when_empty() {
        assert_eq!(parse_size_patterns(None).len(), 8);
        assert_eq!(parse_size_patterns(Some(" , ")).len(), 8);
        assert_eq!(
            parse_size_patterns(Some("standard_d*, STANDARD_F2S")),
            vec!["standard_d*".to_string(), "STANDARD_F2S".to_string()]
        );
    }

    #[test]
    fn glob_matching() {
        let patterns = vec!["STANDARD_D*S_V5".to_string(), "Standard_F2s".to_string()];
        assert!(size_matches_patterns("Standard_D4as_v5", &patterns));
        assert!(size_matches_patterns("standard_f2s", &patterns));
        assert!(!size_matches_patterns("Standard_D4as_v4", &patterns));
        assert!(!size_matches_patterns("", &patterns));
        assert!(size_matches_patterns("anything", &["*".to_string()]));
        assert!(size_matches_patterns("Standard_E2", &["*E2".to_string()]));
        assert!(!size_matches_patterns("Standard_E2", &["*E2*X".to_string()]));
    }

    #[test]
    fn acceleration_support() {
        let patterns = parse_size_patterns(None);
        assert!(VmSize::parse("Standard_D4as_v5").supports_acceleration(&patterns));
        assert!(!VmSize::parse("Standard_B2ats_v2").supports_acceleration(&patterns));
        assert!(!VmSize::parse("Standard_D1_v2").supports_acceleration(&patterns));
    }
}
