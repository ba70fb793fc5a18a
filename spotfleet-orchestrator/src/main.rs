use anyhow::{anyhow, Context};
use serde_json::json;
use spotfleet_common::ProvisioningRequest;
use spotfleet_orchestrator::provider_manager::ProviderManager;
use spotfleet_orchestrator::{Orchestrator, OrchestratorError, Settings};
use tracing_subscriber::EnvFilter;

const EXIT_OK: i32 = 0;
const EXIT_PARTIAL: i32 = 1;
const EXIT_ABORTED: i32 = 2;

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_abort(err: &OrchestratorError) -> anyhow::Result<()> {
    print_json(&json!({
        "aborted": true,
        "kind": err.kind(),
        "error": err.to_string(),
    }))
}

async fn run() -> anyhow::Result<i32> {
    let settings = Settings::from_env(std::env::args().nth(1));

    let raw = tokio::fs::read_to_string(&settings.request_file)
        .await
        .with_context(|| format!("cannot read request file {}", settings.request_file.display()))?;
    let request: ProvisioningRequest =
        serde_json::from_str(&raw).context("request file is not a valid provisioning request")?;

    let provider = ProviderManager::get_provider(&settings.provider).ok_or_else(|| {
        anyhow!(
            "provider '{}' is not available (missing credentials or not compiled in)",
            settings.provider
        )
    })?;
    tracing::info!("🚀 spotfleet starting (provider: {})", settings.provider);

    let orchestrator = Orchestrator::new(provider)
        .with_policies(settings.retry_policies())
        .with_accelerated_patterns(settings.accelerated_size_patterns.clone());

    if settings.infra_only {
        return match orchestrator.create_infrastructure(&request).await {
            Ok(record) => {
                print_json(&record)?;
                Ok(EXIT_OK)
            }
            Err(e) => {
                tracing::error!("❌ {}", e);
                print_abort(&e)?;
                Ok(EXIT_ABORTED)
            }
        };
    }

    match orchestrator.run(&request).await {
        Ok(report) => {
            print_json(&report)?;
            Ok(if report.is_success() {
                EXIT_OK
            } else {
                EXIT_PARTIAL
            })
        }
        Err(e) => {
            tracing::error!("❌ Batch aborted: {}", e);
            print_abort(&e)?;
            Ok(EXIT_ABORTED)
        }
    }
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("❌ {:#}", e);
            EXIT_ABORTED
        }
    };
    std::process::exit(code);
}
