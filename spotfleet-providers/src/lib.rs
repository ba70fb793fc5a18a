use anyhow::Result;
use async_trait::async_trait;

pub use model::*;

/// Cloud management API consumed by the orchestrator.
///
/// Lookups return `Ok(None)` when the resource does not exist. Every other failure is an
/// error whose text reads `"<code>: <message>"`, which is what the orchestrator classifies.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    // Resource groups
    async fn get_resource_group(&self, name: &str) -> Result<Option<ResourceGroup>>;
    async fn create_resource_group(&self, name: &str, location: &str) -> Result<ResourceGroup>;
    /// Starts deletion; callers poll `get_resource_group` for completion.
    async fn delete_resource_group(&self, name: &str) -> Result<()>;

    // Virtual network + subnet
    async fn get_virtual_network(&self, group: &str, name: &str) -> Result<Option<VirtualNetwork>>;
    async fn create_virtual_network(
        &self,
        group: &str,
        location: &str,
        name: &str,
        address_prefix: &str,
        subnet: &SubnetSpec,
    ) -> Result<VirtualNetwork>;
    async fn get_subnet(&self, group: &str, vnet: &str, name: &str) -> Result<Option<Subnet>>;
    /// Adds the subnet, or updates it in place (used to associate a NAT gateway).
    async fn create_or_update_subnet(
        &self,
        group: &str,
        vnet: &str,
        subnet: &SubnetSpec,
    ) -> Result<Subnet>;

    // Public addresses (static, standard tier)
    async fn get_public_ip(&self, group: &str, name: &str) -> Result<Option<PublicIp>>;
    async fn create_public_ip(&self, group: &str, location: &str, name: &str) -> Result<PublicIp>;

    // Shared outbound gateway
    async fn get_nat_gateway(&self, group: &str, name: &str) -> Result<Option<NatGateway>>;
    async fn create_nat_gateway(
        &self,
        group: &str,
        location: &str,
        name: &str,
        public_ip_id: &str,
    ) -> Result<NatGateway>;

    // Firewall rule sets
    async fn get_security_group(&self, group: &str, name: &str) -> Result<Option<SecurityGroup>>;
    async fn create_security_group(
        &self,
        group: &str,
        location: &str,
        name: &str,
        rules: &[SecurityRule],
    ) -> Result<SecurityGroup>;

    // Network interfaces
    async fn get_network_interface(
        &self,
        group: &str,
        name: &str,
    ) -> Result<Option<NetworkInterface>>;
    async fn create_network_interface(
        &self,
        group: &str,
        spec: &NicSpec,
    ) -> Result<NetworkInterface>;
    async fn delete_network_interface(&self, group: &str, name: &str) -> Result<()>;

    // Managed disks
    async fn get_disk(&self, group: &str, name: &str) -> Result<Option<Disk>>;
    async fn delete_disk(&self, group: &str, name: &str) -> Result<()>;

    // Compute
    async fn get_virtual_machine(&self, group: &str, name: &str) -> Result<Option<VirtualMachine>>;
    async fn create_virtual_machine(&self, group: &str, spec: &VmSpec) -> Result<VirtualMachine>;
    async fn delete_virtual_machine(&self, group: &str, name: &str) -> Result<()>;

    // Optional: run a shell script on a running instance.
    // Default implementation returns None (not supported).
    async fn run_command(
        &self,
        _group: &str,
        _vm: &str,
        _script: &[String],
    ) -> Result<Option<String>> {
        Ok(None)
    }

    // Regional usage / quota
    async fn list_compute_usages(&self, location: &str) -> Result<Vec<Usage>>;
    async fn list_network_usages(&self, location: &str) -> Result<Vec<Usage>>;

    // Image catalog
    async fn list_image_skus(
        &self,
        location: &str,
        publisher: &str,
        offer: &str,
    ) -> Result<Vec<String>>;
}

pub mod model {
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct ResourceGroup {
        pub id: String,
        pub name: String,
        pub location: String,
        pub provisioning_state: Option<String>,
    }

    impl ResourceGroup {
        /// Deletion in flight: the group is still visible but cannot be reused.
        pub fn is_deleting(&self) -> bool {
            self.provisioning_state
                .as_deref()
                .map(|s| s.eq_ignore_ascii_case("Deleting"))
                .unwrap_or(false)
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct VirtualNetwork {
        pub id: String,
        pub name: String,
        pub location: String,
        pub address_prefix: String,
        pub subnets: Vec<String>,
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct SubnetSpec {
        pub name: String,
        pub address_prefix: String,
        pub nat_gateway_id: Option<String>,
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct Subnet {
        pub id: String,
        pub name: String,
        pub address_prefix: String,
        pub nat_gateway_id: Option<String>,
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct PublicIp {
        pub id: String,
        pub name: String,
        pub ip_address: Option<String>,
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct NatGateway {
        pub id: String,
        pub name: String,
        pub public_ip_ids: Vec<String>,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum RuleAccess {
        Allow,
        Deny,
    }

    impl RuleAccess {
        pub fn as_str(self) -> &'static str {
            match self {
                RuleAccess::Allow => "Allow",
                RuleAccess::Deny => "Deny",
            }
        }
    }

    /// Inbound TCP rule on a single destination port.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct SecurityRule {
        pub name: String,
        pub priority: u32,
        pub access: RuleAccess,
        pub port: u16,
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct SecurityGroup {
        pub id: String,
        pub name: String,
        pub rules: Vec<SecurityRule>,
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct NicSpec {
        pub name: String,
        pub location: String,
        pub subnet_id: String,
        pub public_ip_id: Option<String>,
        pub security_group_id: Option<String>,
        pub accelerated_networking: bool,
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct NetworkInterface {
        pub id: String,
        pub name: String,
        pub private_ip: Option<String>,
        pub public_ip_id: Option<String>,
        pub accelerated_networking: bool,
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct Disk {
        pub id: String,
        pub name: String,
        pub security_type: Option<String>,
        pub attached_to: Option<String>,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ImageReference {
        pub publisher: String,
        pub offer: String,
        pub sku: String,
        pub version: String,
    }

    /// Everything the compute create call needs. Priority is always Spot with
    /// eviction policy Delete; disk and interface are deleted with the instance.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct VmSpec {
        pub name: String,
        pub location: String,
        pub size: String,
        /// `TrustedLaunch` or `Standard`.
        pub security_type: String,
        pub image: ImageReference,
        pub nic_id: String,
        pub os_disk_name: String,
        pub admin_username: String,
        pub ssh_public_key: Option<String>,
        pub admin_password: Option<String>,
        /// Base64-encoded cloud-init / script payload.
        pub custom_data: Option<String>,
        pub boot_diagnostics: bool,
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct VirtualMachine {
        pub id: String,
        pub name: String,
        pub vm_id: Option<String>,
        pub size: String,
        pub provisioning_state: Option<String>,
        pub nic_ids: Vec<String>,
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct Usage {
        /// Machine name of the counter, e.g. `lowPriorityCores`.
        pub name: String,
        pub current: i64,
        pub limit: i64,
    }

    /// Last path segment of an ARM resource id.
    pub fn name_from_id(id: &str) -> &str {
        id.rsplit('/').next().unwrap_or(id)
    }
}

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "azure")]
pub mod azure;
