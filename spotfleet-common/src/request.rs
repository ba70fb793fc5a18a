use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

pub const DEFAULT_ADMIN_USERNAME: &str = "azureuser";
pub const DEFAULT_SUBNET_NAME: &str = "default";
pub const DEFAULT_VNET_ADDRESS_PREFIX: &str = "10.0.0.0/16";
pub const DEFAULT_SUBNET_ADDRESS_PREFIX: &str = "10.0.0.0/24";

// --- Enums ---

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum NetworkMode {
    #[default]
    PublicIp, // One public address per instance
    SharedGateway, // One NAT gateway for the whole subnet
    None,          // Private addresses only
}

impl NetworkMode {
    pub fn creates_public_ip(self) -> bool {
        matches!(self, NetworkMode::PublicIp)
    }

    pub fn uses_gateway(self) -> bool {
        matches!(self, NetworkMode::SharedGateway)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum FirewallPolicy {
    #[default]
    Allow, // Inbound administrative port open
    Block, // Rule set without the allow rule
    Skip,  // No rule set at all
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum SecurityMode {
    TrustedLaunch,
    Standard,
}

impl SecurityMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SecurityMode::TrustedLaunch => "TrustedLaunch",
            SecurityMode::Standard => "Standard",
        }
    }

    /// Mode used when the preferred one is rejected for a size.
    pub fn fallback(self) -> SecurityMode {
        SecurityMode::Standard
    }
}

impl std::fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Request parts ---

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ImagePreference {
    pub prefer_lts: bool,
    pub prefer_full_image: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Credentials {
    pub username: Option<String>,
    pub ssh_public_key: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl Credentials {
    pub fn username(&self) -> &str {
        self.username
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_ADMIN_USERNAME)
    }

    pub fn public_key(&self) -> Option<&str> {
        self.ssh_public_key
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|s| !s.is_empty())
    }

    /// Neither key nor password: a password has to be generated per instance.
    pub fn needs_generation(&self) -> bool {
        self.public_key().is_none() && self.password().is_none()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum InitPayload {
    Inline(String),
    Url(String),
    File(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Switches {
    pub force: bool,
    pub skip_quota_check: bool,
    pub overwrite: bool,
    pub strict_security_mode: bool,
    pub disable_acceleration: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum InstanceNames {
    Explicit(Vec<String>),
    Count { prefix: String, count: u32 },
    Range { prefix: String, start: u32, end: u32 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("no instance names requested")]
    Empty,
    #[error("invalid range {start}..={end}")]
    InvalidRange { start: u32, end: u32 },
    #[error("duplicate instance name '{0}'")]
    Duplicate(String),
    #[error("invalid instance name '{0}'")]
    InvalidName(String),
    #[error("invalid VM size '{0}'")]
    InvalidSize(String),
    #[error("missing field '{0}'")]
    Missing(&'static str),
}

impl InstanceNames {
    /// Expand into concrete, validated instance names.
    pub fn expand(&self) -> Result<Vec<String>, RequestError> {
        let names: Vec<String> = match self {
            InstanceNames::Explicit(list) => list.iter().map(|s| s.trim().to_string()).collect(),
            InstanceNames::Count { prefix, count } => {
                (1..=*count).map(|n| format!("{}-{}", prefix, n)).collect()
            }
            InstanceNames::Range { prefix, start, end } => {
                if start > end {
                    return Err(RequestError::InvalidRange {
                        start: *start,
                        end: *end,
                    });
                }
                (*start..=*end).map(|n| format!("{}{}", prefix, n)).collect()
            }
        };

        if names.is_empty() {
            return Err(RequestError::Empty);
        }

        let mut seen = HashSet::new();
        for name in &names {
            if !is_valid_instance_name(name) {
                return Err(RequestError::InvalidName(name.clone()));
            }
            if !seen.insert(name.as_str()) {
                return Err(RequestError::Duplicate(name.clone()));
            }
        }
        Ok(names)
    }
}

/// Azure Linux VM name rules: 1-64 chars of `[A-Za-z0-9._-]`, not ending in `.` or `-`.
pub fn is_valid_instance_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 64 {
        return false;
    }
    if name.ends_with('.') || name.ends_with('-') {
        return false;
    }
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Size names are plain ASCII: `Standard_D4as_v5`, `Standard_E4-2s_v5`.
pub fn is_valid_size_name(size: &str) -> bool {
    !size.is_empty()
        && size
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
}

/// Declarative batch request. Immutable once orchestration begins.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningRequest {
    pub resource_group: String,
    pub location: String,
    pub size: String,
    pub names: InstanceNames,
    #[serde(default)]
    pub network_mode: NetworkMode,
    #[serde(default)]
    pub firewall: FirewallPolicy,
    #[serde(default)]
    pub image: ImagePreference,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub init: Option<InitPayload>,
    #[serde(default)]
    pub switches: Switches,
    #[serde(default)]
    pub vnet_name: Option<String>,
    #[serde(default)]
    pub subnet_name: Option<String>,
}

impl ProvisioningRequest {
    pub fn validate(&self) -> Result<Vec<String>, RequestError> {
        if self.resource_group.trim().is_empty() {
            return Err(RequestError::Missing("resourceGroup"));
        }
        if self.location.trim().is_empty() {
            return Err(RequestError::Missing("location"));
        }
        if self.size.trim().is_empty() {
            return Err(RequestError::Missing("size"));
        }
        if !is_valid_size_name(self.size.trim()) {
            return Err(RequestError::InvalidSize(self.size.clone()));
        }
        self.names.expand()
    }

    pub fn vnet_name(&self) -> String {
        self.vnet_name
            .clone()
            .unwrap_or_else(|| format!("{}-vnet", self.resource_group))
    }

    pub fn subnet_name(&self) -> String {
        self.subnet_name
            .clone()
            .unwrap_or_else(|| DEFAULT_SUBNET_NAME.to_string())
    }

    pub fn gateway_name(&self) -> String {
        format!("{}-natgw", self.resource_group)
    }

    pub fn gateway_address_name(&self) -> String {
        format!("{}-natgw-ip", self.resource_group)
    }
}
