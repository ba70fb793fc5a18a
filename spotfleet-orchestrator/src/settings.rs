use crate::provider_manager::ProviderManager;
use crate::retry::RetryPolicies;
use spotfleet_common::vm_size::parse_size_patterns;
use std::env;
use std::path::PathBuf;

pub const DEFAULT_REQUEST_FILE: &str = "request.json";

fn env_flag(name: &str) -> bool {
    env::var(name)
        .ok()
        .map(|v| {
            matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub provider: String,
    pub request_file: PathBuf,
    pub infra_only: bool,
    pub accelerated_size_patterns: Vec<String>,
    pub fast_retries: bool,
}

impl Settings {
    /// `arg` is the first positional CLI argument; it wins over `SPOTFLEET_REQUEST_FILE`.
    pub fn from_env(arg: Option<String>) -> Self {
        let request_file = arg
            .filter(|a| !a.trim().is_empty())
            .or_else(|| env::var("SPOTFLEET_REQUEST_FILE").ok())
            .unwrap_or_else(|| DEFAULT_REQUEST_FILE.to_string());

        Self {
            provider: ProviderManager::current_provider_name(),
            request_file: PathBuf::from(request_file),
            infra_only: env_flag("SPOTFLEET_INFRA_ONLY"),
            accelerated_size_patterns: parse_size_patterns(
                env::var("SPOTFLEET_ACCELERATED_SIZE_PATTERNS").ok().as_deref(),
            ),
            fast_retries: env_flag("SPOTFLEET_FAST_RETRIES"),
        }
    }

    pub fn retry_policies(&self) -> RetryPolicies {
        if self.fast_retries {
            RetryPolicies::immediate()
        } else {
            RetryPolicies::default()
        }
    }
}
