//! Spot VM batch provisioning: quota preflight, shared network graph, image
//! selection, per-instance provisioning with single-shot remediation, and reporting.

pub mod credentials;
pub mod error;
pub mod image;
pub mod init;
pub mod network;
pub mod orchestrator;
pub mod provider_manager;
pub mod provision;
pub mod quota;
pub mod remediate;
pub mod report;
pub mod retry;
pub mod settings;

pub use error::OrchestratorError;
pub use network::NetworkContext;
pub use orchestrator::Orchestrator;
pub use retry::{RetryPolicies, RetryPolicy};
pub use settings::Settings;
