//! Provider-agnostic types shared by the providers and the orchestrator.

pub mod error_class;
pub mod quota;
pub mod request;
pub mod result;
pub mod vm_size;

pub use error_class::{classify, ErrorClass, QuotaFigures};
pub use quota::{QuotaOutcome, QuotaShortfall};
pub use request::{
    Credentials, FirewallPolicy, ImagePreference, InitPayload, InstanceNames, NetworkMode,
    ProvisioningRequest, RequestError, SecurityMode, Switches,
};
pub use result::{
    InfrastructureRecord, InstanceResult, ProvisioningReport, Remediation, ResultRecord, Summary,
};
pub use vm_size::{Architecture, VmSize};
