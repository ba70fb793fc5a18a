use crate::{model::*, CloudProvider};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Operations that can be scripted to fail or inspected afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MockOp {
    GetResourceGroup,
    CreateResourceGroup,
    DeleteResourceGroup,
    GetVirtualNetwork,
    CreateVirtualNetwork,
    CreateSubnet,
    CreatePublicIp,
    GetNatGateway,
    CreateNatGateway,
    CreateSecurityGroup,
    CreateNetworkInterface,
    DeleteNetworkInterface,
    DeleteDisk,
    CreateVirtualMachine,
    DeleteVirtualMachine,
    RunCommand,
    ComputeUsages,
    NetworkUsages,
    ListImageSkus,
}

type Key = (String, String);

fn key(group: &str, name: &str) -> Key {
    (group.to_ascii_lowercase(), name.to_ascii_lowercase())
}

#[derive(Default)]
struct MockState {
    groups: BTreeMap<String, ResourceGroup>,
    deleting_groups: HashMap<String, u32>,
    vnets: BTreeMap<Key, VirtualNetwork>,
    subnets: BTreeMap<(String, String, String), Subnet>,
    public_ips: BTreeMap<Key, PublicIp>,
    nat_gateways: BTreeMap<Key, NatGateway>,
    security_groups: BTreeMap<Key, SecurityGroup>,
    nics: BTreeMap<Key, NetworkInterface>,
    disks: BTreeMap<Key, Disk>,
    vms: BTreeMap<Key, VirtualMachine>,

    compute_usages: Vec<Usage>,
    network_usages: Vec<Usage>,
    catalog: HashMap<String, Vec<String>>,

    failures: HashMap<MockOp, VecDeque<String>>,
    targeted_failures: HashMap<(MockOp, String), VecDeque<String>>,
    successes: HashMap<MockOp, u32>,
    calls: Vec<String>,
    run_commands: Vec<(String, Vec<String>)>,

    trusted_launch_unsupported: HashSet<String>,
    acceleration_unsupported: HashSet<String>,
    lingering_disk_deletes: u32,
    gateway_conflict_pending: bool,
    group_deletion_polls: u32,
    next_public_ip: u32,
    next_private_ip: u32,
}

/// In-memory management plane.
///
/// Behaves like the real control plane where it matters to the orchestrator: creates
/// validate their dependencies (missing group or subnet reads as "not found"), NAT
/// gateway creation is not idempotent, a stale OS disk with another security type
/// blocks instance creation, and group deletion takes a few polls to finish.
/// Every operation yields once to the scheduler so concurrent callers interleave.
pub struct MockProvider {
    subscription_id: String,
    state: Mutex<MockState>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    pub fn new() -> Self {
        let mut state = MockState {
            group_deletion_polls: 2,
            next_public_ip: 10,
            next_private_ip: 4,
            ..Default::default()
        };
        state.compute_usages = vec![
            usage("cores", 0, 350),
            usage("lowPriorityCores", 0, 100),
            usage("virtualMachines", 0, 25_000),
        ];
        state.network_usages = vec![
            usage("PublicIPAddresses", 0, 1000),
            usage("StandardSkuPublicIpAddresses", 0, 100),
        ];
        for (offer, skus) in [
            ("ubuntu-25_04", &["server", "server-arm64", "minimal", "minimal-arm64"][..]),
            ("ubuntu-24_04-lts", &["server", "server-arm64", "minimal", "minimal-arm64", "server-gen1", "cvm"][..]),
            ("0001-com-ubuntu-server-jammy", &["22_04-lts", "22_04-lts-gen2", "22_04-lts-arm64"][..]),
            ("0001-com-ubuntu-minimal-jammy", &["minimal-22_04-lts-gen2", "minimal-22_04-lts-arm64"][..]),
        ] {
            state
                .catalog
                .insert(offer.to_string(), skus.iter().map(|s| s.to_string()).collect());
        }
        Self {
            subscription_id: "00000000-0000-0000-0000-000000000000".to_string(),
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn resource_id(&self, group: &str, kind: &str, name: &str) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/{}/{}",
            self.subscription_id, group, kind, name
        )
    }

    /// Record the call, yield once, then pop a scripted failure if one is queued.
    async fn enter(&self, op: MockOp, target: &str) -> Result<()> {
        tokio::task::yield_now().await;
        let mut st = self.lock();
        st.calls.push(format!("{:?}:{}", op, target));
        let targeted = (op, target.to_ascii_lowercase());
        if let Some(msg) = st.targeted_failures.get_mut(&targeted).and_then(|q| q.pop_front()) {
            return Err(anyhow!(msg));
        }
        if let Some(msg) = st.failures.get_mut(&op).and_then(|q| q.pop_front()) {
            return Err(anyhow!(msg));
        }
        Ok(())
    }

    fn succeeded(&self, st: &mut MockState, op: MockOp) {
        *st.successes.entry(op).or_insert(0) += 1;
    }

    fn require_group(st: &MockState, group: &str) -> Result<()> {
        let g = group.to_ascii_lowercase();
        if st.groups.contains_key(&g) && !st.deleting_groups.contains_key(&g) {
            Ok(())
        } else {
            Err(anyhow!(
                "ResourceGroupNotFound: Resource group '{}' could not be found.",
                group
            ))
        }
    }

    // --- Scripting ---

    /// Queue a failure for the next call of `op`.
    pub fn fail_next(&self, op: MockOp, message: &str) {
        self.fail_times(op, message, 1);
    }

    pub fn fail_times(&self, op: MockOp, message: &str, times: usize) {
        let mut st = self.lock();
        let q = st.failures.entry(op).or_default();
        for _ in 0..times {
            q.push_back(message.to_string());
        }
    }

    /// Queue a failure for the next call of `op` against `target` only.
    pub fn fail_for(&self, op: MockOp, target: &str, message: &str) {
        self.lock()
            .targeted_failures
            .entry((op, target.to_ascii_lowercase()))
            .or_default()
            .push_back(message.to_string());
    }

    pub fn set_compute_usage(&self, name: &str, current: i64, limit: i64) {
        let mut st = self.lock();
        set_usage(&mut st.compute_usages, name, current, limit);
    }

    pub fn set_network_usage(&self, name: &str, current: i64, limit: i64) {
        let mut st = self.lock();
        set_usage(&mut st.network_usages, name, current, limit);
    }

    pub fn set_catalog(&self, offer: &str, skus: &[&str]) {
        self.lock()
            .catalog
            .insert(offer.to_string(), skus.iter().map(|s| s.to_string()).collect());
    }

    pub fn clear_catalog(&self) {
        self.lock().catalog.clear();
    }

    pub fn reject_trusted_launch_for(&self, size: &str) {
        self.lock()
            .trusted_launch_unsupported
            .insert(size.to_ascii_lowercase());
    }

    pub fn reject_acceleration_for(&self, size: &str) {
        self.lock()
            .acceleration_unsupported
            .insert(size.to_ascii_lowercase());
    }

    /// The next `n` disk deletions report success but leave the disk in place.
    pub fn linger_disk_deletes(&self, n: u32) {
        self.lock().lingering_disk_deletes = n;
    }

    /// Make the next NAT gateway create lose a race: a competing creator's gateway
    /// appears (without subnet association) and the call fails with a conflict.
    pub fn inject_gateway_conflict(&self) {
        self.lock().gateway_conflict_pending = true;
    }

    pub fn set_group_deletion_polls(&self, polls: u32) {
        self.lock().group_deletion_polls = polls;
    }

    pub fn seed_resource_group(&self, name: &str, location: &str) {
        let id = format!("/subscriptions/{}/resourceGroups/{}", self.subscription_id, name);
        self.lock().groups.insert(
            name.to_ascii_lowercase(),
            ResourceGroup {
                id,
                name: name.to_string(),
                location: location.to_string(),
                provisioning_state: Some("Succeeded".to_string()),
            },
        );
    }

    pub fn seed_disk(&self, group: &str, name: &str, security_type: &str) {
        let id = self.resource_id(group, "Microsoft.Compute/disks", name);
        self.lock().disks.insert(
            key(group, name),
            Disk {
                id,
                name: name.to_string(),
                security_type: Some(security_type.to_string()),
                attached_to: None,
            },
        );
    }

    pub fn seed_virtual_machine(&self, group: &str, name: &str, size: &str) {
        let id = self.resource_id(group, "Microsoft.Compute/virtualMachines", name);
        self.lock().vms.insert(
            key(group, name),
            VirtualMachine {
                id,
                name: name.to_string(),
                vm_id: Some(uuid::Uuid::new_v4().to_string()),
                size: size.to_string(),
                provisioning_state: Some("Succeeded".to_string()),
                nic_ids: vec![],
            },
        );
    }

    // --- Inspection ---

    /// Number of successful calls of a mutating operation.
    pub fn successes(&self, op: MockOp) -> u32 {
        self.lock().successes.get(&op).copied().unwrap_or(0)
    }

    /// Every call made, as `"<Op>:<target>"`, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, op: MockOp) -> usize {
        let prefix = format!("{:?}:", op);
        self.lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .count()
    }

    pub fn disk(&self, group: &str, name: &str) -> Option<Disk> {
        self.lock().disks.get(&key(group, name)).cloned()
    }

    pub fn disk_count(&self, group: &str, name: &str) -> usize {
        let k = key(group, name);
        self.lock().disks.keys().filter(|d| **d == k).count()
    }

    pub fn nic(&self, group: &str, name: &str) -> Option<NetworkInterface> {
        self.lock().nics.get(&key(group, name)).cloned()
    }

    pub fn vm(&self, group: &str, name: &str) -> Option<VirtualMachine> {
        self.lock().vms.get(&key(group, name)).cloned()
    }

    pub fn subnet(&self, group: &str, vnet: &str, name: &str) -> Option<Subnet> {
        self.lock()
            .subnets
            .get(&(
                group.to_ascii_lowercase(),
                vnet.to_ascii_lowercase(),
                name.to_ascii_lowercase(),
            ))
            .cloned()
    }

    pub fn run_commands(&self) -> Vec<(String, Vec<String>)> {
        self.lock().run_commands.clone()
    }

    fn finalize_group_deletion(st: &mut MockState, group: &str) {
        let g = group.to_ascii_lowercase();
        st.groups.remove(&g);
        st.deleting_groups.remove(&g);
        st.vnets.retain(|k, _| k.0 != g);
        st.subnets.retain(|k, _| k.0 != g);
        st.public_ips.retain(|k, _| k.0 != g);
        st.nat_gateways.retain(|k, _| k.0 != g);
        st.security_groups.retain(|k, _| k.0 != g);
        st.nics.retain(|k, _| k.0 != g);
        st.disks.retain(|k, _| k.0 != g);
        st.vms.retain(|k, _| k.0 != g);
    }
}

fn usage(name: &str, current: i64, limit: i64) -> Usage {
    Usage {
        name: name.to_string(),
        current,
        limit,
    }
}

fn set_usage(list: &mut Vec<Usage>, name: &str, current: i64, limit: i64) {
    match list.iter_mut().find(|u| u.name.eq_ignore_ascii_case(name)) {
        Some(u) => {
            u.current = current;
            u.limit = limit;
        }
        None => list.push(usage(name, current, limit)),
    }
}

#[async_trait]
impl CloudProvider for MockProvider {
    async fn get_resource_group(&self, name: &str) -> Result<Option<ResourceGroup>> {
        self.enter(MockOp::GetResourceGroup, name).await?;
        let mut st = self.lock();
        let g = name.to_ascii_lowercase();
        if let Some(remaining) = st.deleting_groups.get_mut(&g) {
            if *remaining == 0 {
                Self::finalize_group_deletion(&mut st, name);
                return Ok(None);
            }
            *remaining -= 1;
        }
        Ok(st.groups.get(&g).cloned())
    }

    async fn create_resource_group(&self, name: &str, location: &str) -> Result<ResourceGroup> {
        self.enter(MockOp::CreateResourceGroup, name).await?;
        let mut st = self.lock();
        let g = name.to_ascii_lowercase();
        if st.deleting_groups.contains_key(&g) {
            return Err(anyhow!(
                "ResourceGroupBeingDeleted: The resource group '{}' is in deprovisioning state and cannot perform this operation.",
                name
            ));
        }
        if let Some(existing) = st.groups.get(&g) {
            if !existing.location.eq_ignore_ascii_case(location) {
                return Err(anyhow!(
                    "InvalidResourceGroupLocation: Invalid resource group location '{}'. The Resource group already exists in location '{}'.",
                    location,
                    existing.location
                ));
            }
            return Ok(existing.clone());
        }
        let group = ResourceGroup {
            id: format!("/subscriptions/{}/resourceGroups/{}", self.subscription_id, name),
            name: name.to_string(),
            location: location.to_string(),
            provisioning_state: Some("Succeeded".to_string()),
        };
        st.groups.insert(g, group.clone());
        self.succeeded(&mut st, MockOp::CreateResourceGroup);
        Ok(group)
    }

    async fn delete_resource_group(&self, name: &str) -> Result<()> {
        self.enter(MockOp::DeleteResourceGroup, name).await?;
        let mut st = self.lock();
        let g = name.to_ascii_lowercase();
        if !st.groups.contains_key(&g) {
            return Ok(());
        }
        let polls = st.group_deletion_polls;
        st.deleting_groups.insert(g.clone(), polls);
        if let Some(group) = st.groups.get_mut(&g) {
            group.provisioning_state = Some("Deleting".to_string());
        }
        self.succeeded(&mut st, MockOp::DeleteResourceGroup);
        Ok(())
    }

    async fn get_virtual_network(&self, group: &str, name: &str) -> Result<Option<VirtualNetwork>> {
        self.enter(MockOp::GetVirtualNetwork, name).await?;
        Ok(self.lock().vnets.get(&key(group, name)).cloned())
    }

    async fn create_virtual_network(
        &self,
        group: &str,
        location: &str,
        name: &str,
        address_prefix: &str,
        subnet: &SubnetSpec,
    ) -> Result<VirtualNetwork> {
        self.enter(MockOp::CreateVirtualNetwork, name).await?;
        let mut st = self.lock();
        Self::require_group(&st, group)?;
        let vnet = VirtualNetwork {
            id: self.resource_id(group, "Microsoft.Network/virtualNetworks", name),
            name: name.to_string(),
            location: location.to_string(),
            address_prefix: address_prefix.to_string(),
            subnets: vec![subnet.name.clone()],
        };
        let sub = Subnet {
            id: format!("{}/subnets/{}", vnet.id, subnet.name),
            name: subnet.name.clone(),
            address_prefix: subnet.address_prefix.clone(),
            nat_gateway_id: subnet.nat_gateway_id.clone(),
        };
        st.vnets.insert(key(group, name), vnet.clone());
        st.subnets.insert(
            (
                group.to_ascii_lowercase(),
                name.to_ascii_lowercase(),
                subnet.name.to_ascii_lowercase(),
            ),
            sub,
        );
        self.succeeded(&mut st, MockOp::CreateVirtualNetwork);
        Ok(vnet)
    }

    async fn get_subnet(&self, group: &str, vnet: &str, name: &str) -> Result<Option<Subnet>> {
        tokio::task::yield_now().await;
        Ok(self.subnet(group, vnet, name))
    }

    async fn create_or_update_subnet(
        &self,
        group: &str,
        vnet: &str,
        subnet: &SubnetSpec,
    ) -> Result<Subnet> {
        self.enter(MockOp::CreateSubnet, &subnet.name).await?;
        let mut st = self.lock();
        Self::require_group(&st, group)?;
        let Some(parent) = st.vnets.get_mut(&key(group, vnet)) else {
            return Err(anyhow!(
                "NotFound: Virtual network '{}' was not found in resource group '{}'.",
                vnet,
                group
            ));
        };
        if !parent.subnets.iter().any(|s| s.eq_ignore_ascii_case(&subnet.name)) {
            parent.subnets.push(subnet.name.clone());
        }
        let sub = Subnet {
            id: format!("{}/subnets/{}", parent.id, subnet.name),
            name: subnet.name.clone(),
            address_prefix: subnet.address_prefix.clone(),
            nat_gateway_id: subnet.nat_gateway_id.clone(),
        };
        st.subnets.insert(
            (
                group.to_ascii_lowercase(),
                vnet.to_ascii_lowercase(),
                subnet.name.to_ascii_lowercase(),
            ),
            sub.clone(),
        );
        self.succeeded(&mut st, MockOp::CreateSubnet);
        Ok(sub)
    }

    async fn get_public_ip(&self, group: &str, name: &str) -> Result<Option<PublicIp>> {
        tokio::task::yield_now().await;
        Ok(self.lock().public_ips.get(&key(group, name)).cloned())
    }

    async fn create_public_ip(&self, group: &str, _location: &str, name: &str) -> Result<PublicIp> {
        self.enter(MockOp::CreatePublicIp, name).await?;
        let mut st = self.lock();
        Self::require_group(&st, group)?;
        if let Some(existing) = st.public_ips.get(&key(group, name)) {
            return Ok(existing.clone());
        }
        st.next_public_ip += 1;
        let ip = PublicIp {
            id: self.resource_id(group, "Microsoft.Network/publicIPAddresses", name),
            name: name.to_string(),
            ip_address: Some(format!("20.50.{}.{}", st.next_public_ip / 250, st.next_public_ip % 250)),
        };
        st.public_ips.insert(key(group, name), ip.clone());
        self.succeeded(&mut st, MockOp::CreatePublicIp);
        Ok(ip)
    }

    async fn get_nat_gateway(&self, group: &str, name: &str) -> Result<Option<NatGateway>> {
        self.enter(MockOp::GetNatGateway, name).await?;
        Ok(self.lock().nat_gateways.get(&key(group, name)).cloned())
    }

    async fn create_nat_gateway(
        &self,
        group: &str,
        _location: &str,
        name: &str,
        public_ip_id: &str,
    ) -> Result<NatGateway> {
        self.enter(MockOp::CreateNatGateway, name).await?;
        let mut st = self.lock();
        Self::require_group(&st, group)?;
        let gateway = NatGateway {
            id: self.resource_id(group, "Microsoft.Network/natGateways", name),
            name: name.to_string(),
            public_ip_ids: vec![public_ip_id.to_string()],
        };
        if st.gateway_conflict_pending {
            st.gateway_conflict_pending = false;
            st.nat_gateways.insert(key(group, name), gateway);
            return Err(anyhow!(
                "Conflict: NAT gateway '{}' already exists in resource group '{}'.",
                name,
                group
            ));
        }
        if st.nat_gateways.contains_key(&key(group, name)) {
            return Err(anyhow!(
                "Conflict: NAT gateway '{}' already exists in resource group '{}'.",
                name,
                group
            ));
        }
        st.nat_gateways.insert(key(group, name), gateway.clone());
        self.succeeded(&mut st, MockOp::CreateNatGateway);
        Ok(gateway)
    }

    async fn get_security_group(&self, group: &str, name: &str) -> Result<Option<SecurityGroup>> {
        tokio::task::yield_now().await;
        Ok(self.lock().security_groups.get(&key(group, name)).cloned())
    }

    async fn create_security_group(
        &self,
        group: &str,
        _location: &str,
        name: &str,
        rules: &[SecurityRule],
    ) -> Result<SecurityGroup> {
        self.enter(MockOp::CreateSecurityGroup, name).await?;
        let mut st = self.lock();
        Self::require_group(&st, group)?;
        let nsg = SecurityGroup {
            id: self.resource_id(group, "Microsoft.Network/networkSecurityGroups", name),
            name: name.to_string(),
            rules: rules.to_vec(),
        };
        st.security_groups.insert(key(group, name), nsg.clone());
        self.succeeded(&mut st, MockOp::CreateSecurityGroup);
        Ok(nsg)
    }

    async fn get_network_interface(
        &self,
        group: &str,
        name: &str,
    ) -> Result<Option<NetworkInterface>> {
        tokio::task::yield_now().await;
        Ok(self.nic(group, name))
    }

    async fn create_network_interface(
        &self,
        group: &str,
        spec: &NicSpec,
    ) -> Result<NetworkInterface> {
        self.enter(MockOp::CreateNetworkInterface, &spec.name).await?;
        let mut st = self.lock();
        Self::require_group(&st, group)?;
        if !st.subnets.values().any(|s| s.id == spec.subnet_id) {
            return Err(anyhow!("NotFound: Subnet '{}' not found.", spec.subnet_id));
        }
        if let Some(ip_id) = &spec.public_ip_id {
            if !st.public_ips.values().any(|p| &p.id == ip_id) {
                return Err(anyhow!(
                    "InvalidResourceReference: Resource {} referenced by resource {} was not found.",
                    ip_id,
                    spec.name
                ));
            }
        }
        st.next_private_ip += 1;
        let nic = NetworkInterface {
            id: self.resource_id(group, "Microsoft.Network/networkInterfaces", &spec.name),
            name: spec.name.clone(),
            private_ip: Some(format!("10.0.0.{}", st.next_private_ip)),
            public_ip_id: spec.public_ip_id.clone(),
            accelerated_networking: spec.accelerated_networking,
        };
        st.nics.insert(key(group, &spec.name), nic.clone());
        self.succeeded(&mut st, MockOp::CreateNetworkInterface);
        Ok(nic)
    }

    async fn delete_network_interface(&self, group: &str, name: &str) -> Result<()> {
        self.enter(MockOp::DeleteNetworkInterface, name).await?;
        let mut st = self.lock();
        if st.nics.remove(&key(group, name)).is_some() {
            self.succeeded(&mut st, MockOp::DeleteNetworkInterface);
        }
        Ok(())
    }

    async fn get_disk(&self, group: &str, name: &str) -> Result<Option<Disk>> {
        tokio::task::yield_now().await;
        Ok(self.disk(group, name))
    }

    async fn delete_disk(&self, group: &str, name: &str) -> Result<()> {
        self.enter(MockOp::DeleteDisk, name).await?;
        let mut st = self.lock();
        if st.lingering_disk_deletes > 0 {
            st.lingering_disk_deletes -= 1;
            return Ok(());
        }
        if st.disks.remove(&key(group, name)).is_some() {
            self.succeeded(&mut st, MockOp::DeleteDisk);
        }
        Ok(())
    }

    async fn get_virtual_machine(&self, group: &str, name: &str) -> Result<Option<VirtualMachine>> {
        tokio::task::yield_now().await;
        Ok(self.vm(group, name))
    }

    async fn create_virtual_machine(&self, group: &str, spec: &VmSpec) -> Result<VirtualMachine> {
        self.enter(MockOp::CreateVirtualMachine, &spec.name).await?;
        let mut st = self.lock();
        Self::require_group(&st, group)?;
        let size = spec.size.to_ascii_lowercase();

        if spec.security_type == "TrustedLaunch" && st.trusted_launch_unsupported.contains(&size) {
            return Err(anyhow!(
                "BadRequest: The VM size '{}' is not supported for creation of VMs and Virtual Machine Scale Set with 'TrustedLaunch' security type.",
                spec.size
            ));
        }

        let Some(nic) = st.nics.values().find(|n| n.id == spec.nic_id).cloned() else {
            return Err(anyhow!(
                "NotFound: Network interface '{}' not found.",
                spec.nic_id
            ));
        };
        if nic.accelerated_networking && st.acceleration_unsupported.contains(&size) {
            return Err(anyhow!(
                "VMSizeIsNotPermittedToEnableAcceleratedNetworking: VM size {} is not compatible with enabling accelerated networking on network interface(s) on the VM.",
                spec.size
            ));
        }

        let disk_key = key(group, &spec.os_disk_name);
        if let Some(disk) = st.disks.get(&disk_key) {
            let same = disk
                .security_type
                .as_deref()
                .map(|s| s == spec.security_type)
                .unwrap_or(false);
            return if same {
                Err(anyhow!(
                    "ConflictingUserInput: Disk {} already exists in resource group {}. Only CreateOption.Attach is supported.",
                    spec.os_disk_name,
                    group.to_ascii_uppercase()
                ))
            } else {
                Err(anyhow!(
                    "PropertyChangeNotAllowed: Changing property 'securityProfile.securityType' is not allowed."
                ))
            };
        }

        let vm = VirtualMachine {
            id: self.resource_id(group, "Microsoft.Compute/virtualMachines", &spec.name),
            name: spec.name.clone(),
            vm_id: Some(uuid::Uuid::new_v4().to_string()),
            size: spec.size.clone(),
            provisioning_state: Some("Succeeded".to_string()),
            nic_ids: vec![nic.id.clone()],
        };
        let disk = Disk {
            id: self.resource_id(group, "Microsoft.Compute/disks", &spec.os_disk_name),
            name: spec.os_disk_name.clone(),
            security_type: Some(spec.security_type.clone()),
            attached_to: Some(vm.id.clone()),
        };
        st.disks.insert(disk_key, disk);
        st.vms.insert(key(group, &spec.name), vm.clone());
        self.succeeded(&mut st, MockOp::CreateVirtualMachine);
        Ok(vm)
    }

    async fn delete_virtual_machine(&self, group: &str, name: &str) -> Result<()> {
        self.enter(MockOp::DeleteVirtualMachine, name).await?;
        let mut st = self.lock();
        let Some(vm) = st.vms.remove(&key(group, name)) else {
            return Ok(());
        };
        // Disk and interface are created with deleteOption=Delete.
        st.disks.retain(|_, d| d.attached_to.as_deref() != Some(vm.id.as_str()));
        st.nics.retain(|_, n| !vm.nic_ids.contains(&n.id));
        self.succeeded(&mut st, MockOp::DeleteVirtualMachine);
        Ok(())
    }

    async fn run_command(&self, group: &str, vm: &str, script: &[String]) -> Result<Option<String>> {
        self.enter(MockOp::RunCommand, vm).await?;
        let mut st = self.lock();
        if !st.vms.contains_key(&key(group, vm)) {
            return Err(anyhow!("ResourceNotFound: The Resource 'Microsoft.Compute/virtualMachines/{}' under resource group '{}' was not found.", vm, group));
        }
        st.run_commands.push((vm.to_string(), script.to_vec()));
        self.succeeded(&mut st, MockOp::RunCommand);
        Ok(Some("Enable succeeded: \n[stdout]\n\n[stderr]\n".to_string()))
    }

    async fn list_compute_usages(&self, location: &str) -> Result<Vec<Usage>> {
        self.enter(MockOp::ComputeUsages, location).await?;
        Ok(self.lock().compute_usages.clone())
    }

    async fn list_network_usages(&self, location: &str) -> Result<Vec<Usage>> {
        self.enter(MockOp::NetworkUsages, location).await?;
        Ok(self.lock().network_usages.clone())
    }

    async fn list_image_skus(
        &self,
        _location: &str,
        _publisher: &str,
        offer: &str,
    ) -> Result<Vec<String>> {
        self.enter(MockOp::ListImageSkus, offer).await?;
        Ok(self.lock().catalog.get(offer).cloned().unwrap_or_default())
    }
}
