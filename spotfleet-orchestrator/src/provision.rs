use crate::credentials::generate_password;
use crate::init::PreparedInit;
use crate::network::NetworkContext;
use crate::remediate::{self, terminal};
use crate::retry::RetryPolicies;
use spotfleet_common::{
    classify, ErrorClass, FirewallPolicy, InstanceResult, ProvisioningRequest, Remediation,
    SecurityMode, VmSize,
};
use spotfleet_providers::{
    name_from_id, CloudProvider, ImageReference, NetworkInterface, NicSpec, PublicIp, RuleAccess,
    SecurityGroup, SecurityRule, VmSpec,
};

pub const ADMIN_PORT: u16 = 22;

/// Per-instance derivation of the request. Every resource name is a pure function
/// of the instance name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSpec {
    pub name: String,
    pub size: VmSize,
    pub image: ImageReference,
    pub security_mode: SecurityMode,
    pub accelerated_networking: bool,
    pub nic_name: String,
    pub public_ip_name: String,
    pub security_group_name: String,
    pub disk_name: String,
}

impl InstanceSpec {
    pub fn new(
        name: &str,
        request: &ProvisioningRequest,
        image: &ImageReference,
        accelerated_patterns: &[String],
    ) -> Self {
        let size = VmSize::parse(&request.size);
        // Trusted launch is x64 only.
        let security_mode = if size.is_arm64() {
            SecurityMode::Standard
        } else {
            SecurityMode::TrustedLaunch
        };
        let accelerated_networking =
            !request.switches.disable_acceleration && size.supports_acceleration(accelerated_patterns);

        Self {
            name: name.to_string(),
            size,
            image: image.clone(),
            security_mode,
            accelerated_networking,
            nic_name: format!("{}-nic", name),
            public_ip_name: format!("{}-ip", name),
            security_group_name: format!("{}-nsg", name),
            disk_name: format!("{}-osdisk", name),
        }
    }
}

/// What the network interface is bound to besides the subnet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceBindings {
    pub public_ip_id: Option<String>,
    pub security_group_id: Option<String>,
}

fn shutdown_script() -> Vec<String> {
    vec!["sudo systemctl poweroff --no-block || sudo shutdown -h now".to_string()]
}

pub struct Provisioner<'a> {
    pub(crate) provider: &'a dyn CloudProvider,
    pub(crate) request: &'a ProvisioningRequest,
    pub(crate) network: &'a NetworkContext,
    pub(crate) image: &'a ImageReference,
    pub(crate) init: &'a PreparedInit,
    pub(crate) policies: &'a RetryPolicies,
    pub(crate) accelerated_patterns: &'a [String],
}

impl<'a> Provisioner<'a> {
    pub fn new(
        provider: &'a dyn CloudProvider,
        request: &'a ProvisioningRequest,
        network: &'a NetworkContext,
        image: &'a ImageReference,
        init: &'a PreparedInit,
        policies: &'a RetryPolicies,
        accelerated_patterns: &'a [String],
    ) -> Self {
        Self {
            provider,
            request,
            network,
            image,
            init,
            policies,
            accelerated_patterns,
        }
    }

    pub(crate) fn group(&self) -> &str {
        &self.network.resource_group
    }

    /// Provision one instance end to end. Never errors: every outcome is a result record.
    pub async fn provision(&self, name: &str) -> InstanceResult {
        let spec = InstanceSpec::new(name, self.request, self.image, self.accelerated_patterns);
        tracing::info!(
            "🔵 [provision] {}: size={}, arch={:?}, security={}, accelerated={}",
            spec.name,
            spec.size.name,
            spec.size.arch,
            spec.security_mode,
            spec.accelerated_networking
        );

        if let Some(result) = self.handle_existing(&spec).await {
            return result;
        }

        let (password, generated) = self.admin_password();

        let public_ip = if self.request.network_mode.creates_public_ip() {
            match self.create_public_ip(&spec).await {
                Ok(ip) => Some(ip),
                Err(failed) => return failed,
            }
        } else {
            None
        };

        let security_group = match (&public_ip, self.request.firewall) {
            (Some(_), FirewallPolicy::Allow | FirewallPolicy::Block) => {
                match self.ensure_security_group(&spec).await {
                    Ok(nsg) => Some(nsg),
                    Err(failed) => return failed,
                }
            }
            _ => None,
        };

        let bindings = InterfaceBindings {
            public_ip_id: public_ip.map(|ip| ip.id),
            security_group_id: security_group.map(|nsg| nsg.id),
        };
        let nic = match self
            .create_interface(&spec, &bindings, spec.accelerated_networking)
            .await
        {
            Ok(nic) => nic,
            Err(failed) => return failed,
        };

        self.delete_orphaned_disk(&spec).await;

        let vm_spec = self.vm_spec(&spec, &nic.id, password.clone());
        tracing::info!(
            "🔵 [provision] {}: creating Spot instance with {}:{}",
            spec.name,
            spec.image.offer,
            spec.image.sku
        );
        let remediation: Option<Remediation> =
            match self.provider.create_virtual_machine(self.group(), &vm_spec).await {
                Ok(_) => None,
                Err(e) => {
                    match remediate::remediate(self, &spec, &bindings, &vm_spec, e.to_string()).await {
                        Ok(applied) => Some(applied),
                        Err(failed) => return failed,
                    }
                }
            };

        let generated_password = if generated { password } else { None };
        self.finish(&spec, generated_password, remediation).await
    }

    /// `Some` when the existing instance decides the outcome on its own.
    async fn handle_existing(&self, spec: &InstanceSpec) -> Option<InstanceResult> {
        let vm = match self.provider.get_virtual_machine(self.group(), &spec.name).await {
            Ok(Some(vm)) => vm,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("⚠️ [provision] {}: existence check failed: {}", spec.name, e);
                return None;
            }
        };

        if !self.request.switches.overwrite {
            let nic_name = vm
                .nic_ids
                .first()
                .map(|id| name_from_id(id).to_string())
                .unwrap_or_else(|| spec.nic_name.clone());
            let (address, private_address) = self.addresses(&nic_name).await;
            tracing::info!("✅ [provision] {}: already exists, leaving it untouched", spec.name);
            return Some(InstanceResult::Succeeded {
                address,
                private_address,
                generated_password: None,
                image_offer: String::new(),
                image_sku: String::new(),
                remediation: None,
                existing: true,
                warnings: vec![],
            });
        }

        tracing::warn!("⚠️ [provision] {}: overwriting existing instance", spec.name);
        // Give the guest a chance to shut down cleanly before the delete.
        if let Err(e) = self
            .provider
            .run_command(self.group(), &spec.name, &shutdown_script())
            .await
        {
            tracing::warn!("⚠️ [provision] {}: shutdown signal failed: {}", spec.name, e);
        }
        if let Err(e) = self
            .provider
            .delete_virtual_machine(self.group(), &spec.name)
            .await
        {
            tracing::error!("❌ [provision] {}: delete before overwrite failed: {}", spec.name, e);
            return Some(terminal(&e.to_string(), false));
        }
        None
    }

    fn admin_password(&self) -> (Option<String>, bool) {
        let creds = &self.request.credentials;
        if let Some(pw) = creds.password() {
            return (Some(pw.to_string()), false);
        }
        if creds.needs_generation() {
            return (Some(generate_password(&mut rand::thread_rng())), true);
        }
        (None, false)
    }

    /// Address creation classifies before retrying: quota stops at once, an
    /// unpropagated group waits longer, anything else retries on the short delay.
    async fn create_public_ip(&self, spec: &InstanceSpec) -> Result<PublicIp, InstanceResult> {
        let policy = self.policies.public_ip;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let message = match self
                .provider
                .create_public_ip(self.group(), &self.network.location, &spec.public_ip_name)
                .await
            {
                Ok(ip) => return Ok(ip),
                Err(e) => e.to_string(),
            };
            let class = classify(&message);
            if class == ErrorClass::QuotaExceeded || attempt >= policy.max_attempts {
                tracing::error!(
                    "❌ [provision] {}: public address failed [{}]: {}",
                    spec.name,
                    class,
                    message
                );
                return Err(terminal(&message, attempt > 1));
            }
            tracing::warn!(
                "🔄 [provision] {}: public address attempt {}/{} failed [{}]: {}",
                spec.name,
                attempt,
                policy.max_attempts,
                class,
                message
            );
            if class == ErrorClass::PropagationDelay {
                if !self.policies.public_ip_propagation_delay.is_zero() {
                    tokio::time::sleep(self.policies.public_ip_propagation_delay).await;
                }
            } else {
                policy.pause().await;
            }
        }
    }

    async fn ensure_security_group(&self, spec: &InstanceSpec) -> Result<SecurityGroup, InstanceResult> {
        match self
            .provider
            .get_security_group(self.group(), &spec.security_group_name)
            .await
        {
            Ok(Some(nsg)) => return Ok(nsg),
            Ok(None) => {}
            Err(e) => return Err(terminal(&e.to_string(), false)),
        }

        let rules = match self.request.firewall {
            FirewallPolicy::Allow => vec![SecurityRule {
                name: "allow-ssh".to_string(),
                priority: 1000,
                access: RuleAccess::Allow,
                port: ADMIN_PORT,
            }],
            FirewallPolicy::Block | FirewallPolicy::Skip => vec![],
        };
        self.provider
            .create_security_group(
                self.group(),
                &self.network.location,
                &spec.security_group_name,
                &rules,
            )
            .await
            .map_err(|e| terminal(&e.to_string(), false))
    }

    /// Interface creation can race ahead of its address or rule set becoming visible,
    /// so "not found" gets a few retries.
    pub(crate) async fn create_interface(
        &self,
        spec: &InstanceSpec,
        bindings: &InterfaceBindings,
        accelerated: bool,
    ) -> Result<NetworkInterface, InstanceResult> {
        let nic = NicSpec {
            name: spec.nic_name.clone(),
            location: self.network.location.clone(),
            subnet_id: self.network.subnet_id.clone(),
            public_ip_id: bindings.public_ip_id.clone(),
            security_group_id: bindings.security_group_id.clone(),
            accelerated_networking: accelerated,
        };
        let policy = self.policies.interface;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let message = match self.provider.create_network_interface(self.group(), &nic).await {
                Ok(created) => return Ok(created),
                Err(e) => e.to_string(),
            };
            if classify(&message) == ErrorClass::PropagationDelay && attempt < policy.max_attempts {
                tracing::warn!(
                    "🔄 [provision] {}: interface not ready (attempt {}/{}): {}",
                    spec.name,
                    attempt,
                    policy.max_attempts,
                    message
                );
                policy.pause().await;
                continue;
            }
            tracing::error!("❌ [provision] {}: interface failed: {}", spec.name, message);
            return Err(terminal(&message, attempt > 1));
        }
    }

    /// Remove a leftover unattached OS disk. A stale disk from an earlier failed
    /// attempt can carry a security type that makes the create fail deterministically.
    pub(crate) async fn delete_orphaned_disk(&self, spec: &InstanceSpec) {
        let disk = match self.provider.get_disk(self.group(), &spec.disk_name).await {
            Ok(Some(disk)) => disk,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("⚠️ [provision] {}: disk lookup failed: {}", spec.name, e);
                return;
            }
        };
        if let Some(owner) = &disk.attached_to {
            tracing::warn!(
                "⚠️ [provision] {}: disk {} is attached to {}; leaving it",
                spec.name,
                disk.name,
                name_from_id(owner)
            );
            return;
        }
        tracing::info!(
            "🔄 [provision] {}: deleting stale disk {} (security type {})",
            spec.name,
            disk.name,
            disk.security_type.as_deref().unwrap_or("unknown")
        );
        if let Err(e) = self.provider.delete_disk(self.group(), &disk.name).await {
            tracing::warn!("⚠️ [provision] {}: stale disk delete failed: {}", spec.name, e);
        }
    }

    pub(crate) fn vm_spec(&self, spec: &InstanceSpec, nic_id: &str, password: Option<String>) -> VmSpec {
        let creds = &self.request.credentials;
        VmSpec {
            name: spec.name.clone(),
            location: self.network.location.clone(),
            size: spec.size.name.clone(),
            security_type: spec.security_mode.as_str().to_string(),
            image: spec.image.clone(),
            nic_id: nic_id.to_string(),
            os_disk_name: spec.disk_name.clone(),
            admin_username: creds.username().to_string(),
            ssh_public_key: creds.public_key().map(str::to_string),
            admin_password: password,
            custom_data: self.init.custom_data(),
            boot_diagnostics: true,
        }
    }

    /// (public, private) addresses as seen through the instance's interface.
    async fn addresses(&self, nic_name: &str) -> (Option<String>, Option<String>) {
        let nic = match self.provider.get_network_interface(self.group(), nic_name).await {
            Ok(Some(nic)) => nic,
            Ok(None) => return (None, None),
            Err(e) => {
                tracing::warn!("⚠️ [provision] interface lookup for {} failed: {}", nic_name, e);
                return (None, None);
            }
        };
        let public = match &nic.public_ip_id {
            Some(id) => self
                .provider
                .get_public_ip(self.group(), name_from_id(id))
                .await
                .ok()
                .flatten()
                .and_then(|ip| ip.ip_address),
            None => None,
        };
        (public, nic.private_ip)
    }

    async fn run_post_create(&self, spec: &InstanceSpec) -> Vec<String> {
        let Some(script) = self.init.post_create() else {
            return vec![];
        };
        tracing::info!("🔵 [provision] {}: running post-create init", spec.name);
        match self.provider.run_command(self.group(), &spec.name, script).await {
            Ok(Some(_)) => vec![],
            Ok(None) => vec!["post-create init skipped: provider has no run-command support".to_string()],
            Err(e) => {
                tracing::warn!("⚠️ [provision] {}: post-create init failed: {}", spec.name, e);
                vec![format!("post-create init failed: {}", e)]
            }
        }
    }

    async fn finish(
        &self,
        spec: &InstanceSpec,
        generated_password: Option<String>,
        remediation: Option<Remediation>,
    ) -> InstanceResult {
        let (address, private_address) = self.addresses(&spec.nic_name).await;
        let warnings = self.run_post_create(spec).await;
        tracing::info!(
            "✅ [provision] {}: ready (public={}, private={})",
            spec.name,
            address.as_deref().unwrap_or("-"),
            private_address.as_deref().unwrap_or("-")
        );
        InstanceResult::Succeeded {
            address,
            private_address,
            generated_password,
            image_offer: spec.image.offer.clone(),
            image_sku: spec.image.sku.clone(),
            remediation,
            existing: false,
            warnings,
        }
    }
}
