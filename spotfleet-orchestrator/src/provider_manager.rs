use spotfleet_providers::CloudProvider;
use std::env;
use std::fs;
use std::sync::Arc;

/// Prefer *_FILE for secrets (Docker/K8s friendly), fallback to env var.
#[allow(dead_code)]
fn read_secret(file_var: &str, var: &str) -> Option<String> {
    env::var(file_var)
        .ok()
        .and_then(|path| fs::read_to_string(path).ok())
        .or_else(|| env::var(var).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub struct ProviderManager;

impl ProviderManager {
    pub fn current_provider_name() -> String {
        env::var("PROVIDER")
            .map(|p| p.trim().to_ascii_lowercase())
            .ok()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "azure".to_string())
    }

    pub fn get_provider(provider_name: &str) -> Option<Arc<dyn CloudProvider>> {
        match provider_name.trim().to_lowercase().as_str() {
            #[cfg(feature = "provider-azure")]
            "azure" => {
                use spotfleet_providers::azure::{AzureCredential, AzureProvider};

                let subscription_id = env::var("AZURE_SUBSCRIPTION_ID")
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())?;

                let credential = match read_secret("AZURE_ACCESS_TOKEN_FILE", "AZURE_ACCESS_TOKEN") {
                    Some(token) => AzureCredential::Token(token),
                    None => AzureCredential::ServicePrincipal {
                        tenant_id: env::var("AZURE_TENANT_ID").ok()?.trim().to_string(),
                        client_id: env::var("AZURE_CLIENT_ID").ok()?.trim().to_string(),
                        client_secret: read_secret(
                            "AZURE_CLIENT_SECRET_FILE",
                            "AZURE_CLIENT_SECRET",
                        )?,
                    },
                };

                match AzureProvider::new(subscription_id, credential) {
                    Ok(p) => Some(Arc::new(p)),
                    Err(e) => {
                        tracing::error!("❌ [azure] Failed to initialise provider: {:#}", e);
                        None
                    }
                }
            }
            #[cfg(feature = "provider-mock")]
            "mock" => Some(Arc::new(spotfleet_providers::mock::MockProvider::new())),
            _ => None,
        }
    }
}
