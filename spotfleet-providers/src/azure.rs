use crate::{model::*, CloudProvider};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

const ARM: &str = "https://management.azure.com";
const LOGIN: &str = "https://login.microsoftonline.com";
const API_RESOURCES: &str = "2021-04-01";
const API_NETWORK: &str = "2023-09-01";
const API_COMPUTE: &str = "2024-03-01";
const API_DISKS: &str = "2023-04-02";

pub enum AzureCredential {
    /// Pre-obtained bearer token (e.g. `az account get-access-token`).
    Token(String),
    ServicePrincipal {
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
}

pub struct AzureProvider {
    client: Client,
    subscription_id: String,
    credential: AzureCredential,
    token: Mutex<Option<(String, Instant)>>,
    poll_interval: Duration,
    max_polls: u32,
}

impl AzureProvider {
    pub fn new(subscription_id: String, credential: AzureCredential) -> Result<Self> {
        // Default reqwest client has no overall timeout. If ARM stalls, a batch can hang forever.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            subscription_id: subscription_id.trim().to_string(),
            credential,
            token: Mutex::new(None),
            poll_interval: Duration::from_secs(5),
            max_polls: 180,
        })
    }

    async fn bearer(&self) -> Result<String> {
        let (tenant_id, client_id, client_secret) = match &self.credential {
            AzureCredential::Token(t) => return Ok(t.trim().to_string()),
            AzureCredential::ServicePrincipal {
                tenant_id,
                client_id,
                client_secret,
            } => (tenant_id, client_id, client_secret),
        };

        let mut cached = self.token.lock().await;
        if let Some((token, expires)) = cached.as_ref() {
            if Instant::now() < *expires {
                return Ok(token.clone());
            }
        }

        let url = format!("{}/{}/oauth2/v2.0/token", LOGIN, tenant_id);
        let resp = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("scope", "https://management.azure.com/.default"),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!(
                "AuthenticationFailed: token request failed: status={} body={}",
                status.as_u16(),
                text
            ));
        }
        let body: Value = resp.json().await?;
        let token = body["access_token"]
            .as_str()
            .ok_or_else(|| anyhow!("AuthenticationFailed: no access_token in token response"))?
            .to_string();
        let ttl = body["expires_in"].as_u64().unwrap_or(3600).saturating_sub(120);
        *cached = Some((token.clone(), Instant::now() + Duration::from_secs(ttl)));
        Ok(token)
    }

    fn group_url(&self, group: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}",
            ARM, self.subscription_id, group
        )
    }

    fn resource_url(&self, group: &str, kind: &str, name: &str) -> String {
        format!("{}/providers/{}/{}", self.group_url(group), kind, name)
    }

    fn id_url(id: &str) -> String {
        format!("{}{}", ARM, id)
    }

    async fn get_json(&self, url: &str, api: &str) -> Result<Option<Value>> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(self.bearer().await?)
            .query(&[("api-version", api)])
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check(resp, "GET", url).await?;
        Ok(Some(resp.json().await?))
    }

    /// GET where a 404 carries meaning of its own, e.g. a location without the API.
    async fn get_required_json(&self, url: &str, api: &str) -> Result<Value> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(self.bearer().await?)
            .query(&[("api-version", api)])
            .send()
            .await?;
        let resp = check(resp, "GET", url).await?;
        Ok(resp.json().await?)
    }

    /// PUT and wait until the resource reaches a terminal provisioning state.
    async fn put_json(&self, url: &str, api: &str, body: &Value) -> Result<Value> {
        tracing::debug!("🔵 [azure] PUT {}", url);
        let resp = self
            .client
            .put(url)
            .bearer_auth(self.bearer().await?)
            .query(&[("api-version", api)])
            .json(body)
            .send()
            .await?;
        let resp = check(resp, "PUT", url).await?;
        let async_op = header(&resp, "azure-asyncoperation");
        let initial: Value = resp.json().await.unwrap_or(Value::Null);

        if let Some(op_url) = async_op {
            self.wait_operation(&op_url).await?;
        }
        self.wait_provisioned(url, api, initial).await
    }

    async fn wait_provisioned(&self, url: &str, api: &str, mut current: Value) -> Result<Value> {
        for _ in 0..self.max_polls {
            let state = current["properties"]["provisioningState"]
                .as_str()
                .unwrap_or("Succeeded")
                .to_string();
            match state.as_str() {
                "Succeeded" => return Ok(current),
                "Failed" | "Canceled" => {
                    return Err(anyhow!(
                        "ProvisioningFailed: {} ended in state {}",
                        url,
                        state
                    ))
                }
                _ => {}
            }
            sleep(self.poll_interval).await;
            current = self
                .get_json(url, api)
                .await?
                .ok_or_else(|| anyhow!("NotFound: {} disappeared while provisioning", url))?;
        }
        Err(anyhow!(
            "OperationTimedOut: {} did not finish provisioning",
            url
        ))
    }

    /// Poll an `Azure-AsyncOperation` URL until it settles; returns the final status body.
    async fn wait_operation(&self, op_url: &str) -> Result<Value> {
        for _ in 0..self.max_polls {
            let resp = self
                .client
                .get(op_url)
                .bearer_auth(self.bearer().await?)
                .send()
                .await?;
            let resp = check(resp, "GET", op_url).await?;
            let body: Value = resp.json().await.unwrap_or(Value::Null);
            match body["status"].as_str().unwrap_or("InProgress") {
                "Succeeded" => return Ok(body),
                "Failed" | "Canceled" => return Err(anyhow!(error_text(&body))),
                _ => sleep(self.poll_interval).await,
            }
        }
        Err(anyhow!("OperationTimedOut: {} did not complete", op_url))
    }

    async fn delete(&self, url: &str, api: &str, wait: bool) -> Result<()> {
        tracing::debug!("🔵 [azure] DELETE {}", url);
        let resp = self
            .client
            .delete(url)
            .bearer_auth(self.bearer().await?)
            .query(&[("api-version", api)])
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND || resp.status() == StatusCode::NO_CONTENT {
            return Ok(());
        }
        let resp = check(resp, "DELETE", url).await?;
        if wait {
            if let Some(op_url) = header(&resp, "azure-asyncoperation") {
                self.wait_operation(&op_url).await?;
            }
        }
        Ok(())
    }

    async fn list_usages(&self, url: &str, api: &str) -> Result<Vec<Usage>> {
        let body = self.get_required_json(url, api).await?;
        Ok(usages_from(&body))
    }
}

fn header(resp: &Response, name: &str) -> Option<String> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Turn an ARM error body into `"<code>: <message>"`.
fn error_text(body: &Value) -> String {
    let err = if body["error"].is_object() {
        &body["error"]
    } else {
        body
    };
    let code = err["code"].as_str().unwrap_or("Unknown");
    let mut message = err["message"].as_str().unwrap_or("").to_string();
    if let Some(details) = err["details"].as_array() {
        for d in details {
            if let Some(m) = d["message"].as_str() {
                message.push_str(" | ");
                message.push_str(d["code"].as_str().unwrap_or(""));
                message.push_str(": ");
                message.push_str(m);
            }
        }
    }
    format!("{}: {}", code, message)
}

fn usages_from(body: &Value) -> Vec<Usage> {
    body["value"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|u| Usage {
                    name: u["name"]["value"].as_str().unwrap_or("").to_string(),
                    current: u["currentValue"].as_i64().unwrap_or(0),
                    limit: u["limit"].as_i64().unwrap_or(0),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Failure text for a non-success response: the ARM error when the body has one.
fn failure_text(status: StatusCode, text: &str) -> String {
    match serde_json::from_str::<Value>(text) {
        Ok(parsed) if parsed.is_object() => error_text(&parsed),
        _ => format!("HttpError{}: {}", status.as_u16(), text),
    }
}

async fn check(resp: Response, method: &str, url: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let msg = failure_text(status, &text);
    tracing::warn!(
        "❌ [azure] {} {} failed: status={} error={}",
        method,
        url,
        status.as_u16(),
        msg
    );
    Err(anyhow!(msg))
}

fn str_at(v: &Value, path: &[&str]) -> Option<String> {
    let mut cur = v;
    for p in path {
        cur = &cur[*p];
    }
    cur.as_str().map(|s| s.to_string())
}

fn to_group(v: &Value) -> ResourceGroup {
    ResourceGroup {
        id: str_at(v, &["id"]).unwrap_or_default(),
        name: str_at(v, &["name"]).unwrap_or_default(),
        location: str_at(v, &["location"]).unwrap_or_default(),
        provisioning_state: str_at(v, &["properties", "provisioningState"]),
    }
}

fn to_vnet(v: &Value) -> VirtualNetwork {
    VirtualNetwork {
        id: str_at(v, &["id"]).unwrap_or_default(),
        name: str_at(v, &["name"]).unwrap_or_default(),
        location: str_at(v, &["location"]).unwrap_or_default(),
        address_prefix: v["properties"]["addressSpace"]["addressPrefixes"][0]
            .as_str()
            .unwrap_or("")
            .to_string(),
        subnets: v["properties"]["subnets"]
            .as_array()
            .map(|s| {
                s.iter()
                    .filter_map(|x| x["name"].as_str().map(|n| n.to_string()))
                    .collect()
            })
            .unwrap_or_default(),
    }
}

fn to_subnet(v: &Value) -> Subnet {
    Subnet {
        id: str_at(v, &["id"]).unwrap_or_default(),
        name: str_at(v, &["name"]).unwrap_or_default(),
        address_prefix: str_at(v, &["properties", "addressPrefix"]).unwrap_or_default(),
        nat_gateway_id: str_at(v, &["properties", "natGateway", "id"]),
    }
}

fn to_public_ip(v: &Value) -> PublicIp {
    PublicIp {
        id: str_at(v, &["id"]).unwrap_or_default(),
        name: str_at(v, &["name"]).unwrap_or_default(),
        ip_address: str_at(v, &["properties", "ipAddress"]),
    }
}

fn to_nat(v: &Value) -> NatGateway {
    NatGateway {
        id: str_at(v, &["id"]).unwrap_or_default(),
        name: str_at(v, &["name"]).unwrap_or_default(),
        public_ip_ids: v["properties"]["publicIpAddresses"]
            .as_array()
            .map(|a| {
                a.iter()
                    .filter_map(|x| x["id"].as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default(),
    }
}

fn to_security_group(v: &Value) -> SecurityGroup {
    let rules = v["properties"]["securityRules"]
        .as_array()
        .map(|rules| {
            rules
                .iter()
                .map(|r| SecurityRule {
                    name: str_at(r, &["name"]).unwrap_or_default(),
                    priority: r["properties"]["priority"].as_u64().unwrap_or(0) as u32,
                    access: if r["properties"]["access"].as_str() == Some("Deny") {
                        RuleAccess::Deny
                    } else {
                        RuleAccess::Allow
                    },
                    port: str_at(r, &["properties", "destinationPortRange"])
                        .and_then(|p| p.parse().ok())
                        .unwrap_or(0),
                })
                .collect()
        })
        .unwrap_or_default();
    SecurityGroup {
        id: str_at(v, &["id"]).unwrap_or_default(),
        name: str_at(v, &["name"]).unwrap_or_default(),
        rules,
    }
}

fn to_nic(v: &Value) -> NetworkInterface {
    let ipc = &v["properties"]["ipConfigurations"][0]["properties"];
    NetworkInterface {
        id: str_at(v, &["id"]).unwrap_or_default(),
        name: str_at(v, &["name"]).unwrap_or_default(),
        private_ip: str_at(ipc, &["privateIPAddress"]),
        public_ip_id: str_at(ipc, &["publicIPAddress", "id"]),
        accelerated_networking: v["properties"]["enableAcceleratedNetworking"]
            .as_bool()
            .unwrap_or(false),
    }
}

fn to_disk(v: &Value) -> Disk {
    Disk {
        id: str_at(v, &["id"]).unwrap_or_default(),
        name: str_at(v, &["name"]).unwrap_or_default(),
        // Absent security profile means a Standard disk.
        security_type: Some(
            str_at(v, &["properties", "securityProfile", "securityType"])
                .unwrap_or_else(|| "Standard".to_string()),
        ),
        attached_to: str_at(v, &["managedBy"]),
    }
}

fn to_vm(v: &Value) -> VirtualMachine {
    VirtualMachine {
        id: str_at(v, &["id"]).unwrap_or_default(),
        name: str_at(v, &["name"]).unwrap_or_default(),
        vm_id: str_at(v, &["properties", "vmId"]),
        size: str_at(v, &["properties", "hardwareProfile", "vmSize"]).unwrap_or_default(),
        provisioning_state: str_at(v, &["properties", "provisioningState"]),
        nic_ids: v["properties"]["networkProfile"]["networkInterfaces"]
            .as_array()
            .map(|a| {
                a.iter()
                    .filter_map(|x| x["id"].as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default(),
    }
}

fn subnet_body(spec: &SubnetSpec) -> Value {
    let mut body = json!({
        "name": spec.name,
        "properties": { "addressPrefix": spec.address_prefix }
    });
    if let Some(nat) = &spec.nat_gateway_id {
        body["properties"]["natGateway"] = json!({ "id": nat });
    }
    body
}

fn vm_body(spec: &VmSpec) -> Value {
    let mut os_profile = json!({
        "computerName": spec.name,
        "adminUsername": spec.admin_username,
        "linuxConfiguration": {
            "disablePasswordAuthentication": spec.admin_password.is_none(),
        }
    });
    if let Some(pw) = &spec.admin_password {
        os_profile["adminPassword"] = json!(pw);
    }
    if let Some(key) = &spec.ssh_public_key {
        os_profile["linuxConfiguration"]["ssh"] = json!({
            "publicKeys": [{
                "path": format!("/home/{}/.ssh/authorized_keys", spec.admin_username),
                "keyData": key,
            }]
        });
    }
    if let Some(data) = &spec.custom_data {
        os_profile["customData"] = json!(data);
    }

    let mut body = json!({
        "location": spec.location,
        "properties": {
            "hardwareProfile": { "vmSize": spec.size },
            "priority": "Spot",
            "evictionPolicy": "Delete",
            "billingProfile": { "maxPrice": -1 },
            "storageProfile": {
                "imageReference": {
                    "publisher": spec.image.publisher,
                    "offer": spec.image.offer,
                    "sku": spec.image.sku,
                    "version": spec.image.version,
                },
                "osDisk": {
                    "name": spec.os_disk_name,
                    "createOption": "FromImage",
                    "deleteOption": "Delete",
                    "managedDisk": { "storageAccountType": "StandardSSD_LRS" }
                }
            },
            "osProfile": os_profile,
            "networkProfile": {
                "networkInterfaces": [{
                    "id": spec.nic_id,
                    "properties": { "primary": true, "deleteOption": "Delete" }
                }]
            },
            "diagnosticsProfile": { "bootDiagnostics": { "enabled": spec.boot_diagnostics } }
        }
    });
    // Standard is expressed by omitting the security profile.
    if spec.security_type == "TrustedLaunch" {
        body["properties"]["securityProfile"] = json!({
            "securityType": "TrustedLaunch",
            "uefiSettings": { "secureBootEnabled": true, "vTpmEnabled": true }
        });
    }
    body
}

#[async_trait]
impl CloudProvider for AzureProvider {
    async fn get_resource_group(&self, name: &str) -> Result<Option<ResourceGroup>> {
        Ok(self
            .get_json(&self.group_url(name), API_RESOURCES)
            .await?
            .as_ref()
            .map(to_group))
    }

    async fn create_resource_group(&self, name: &str, location: &str) -> Result<ResourceGroup> {
        let body = json!({ "location": location, "tags": { "managed-by": "spotfleet" } });
        let v = self
            .put_json(&self.group_url(name), API_RESOURCES, &body)
            .await?;
        tracing::info!("✅ [azure] Resource group {} ready in {}", name, location);
        Ok(to_group(&v))
    }

    async fn delete_resource_group(&self, name: &str) -> Result<()> {
        self.delete(&self.group_url(name), API_RESOURCES, false).await
    }

    async fn get_virtual_network(&self, group: &str, name: &str) -> Result<Option<VirtualNetwork>> {
        let url = self.resource_url(group, "Microsoft.Network/virtualNetworks", name);
        Ok(self.get_json(&url, API_NETWORK).await?.as_ref().map(to_vnet))
    }

    async fn create_virtual_network(
        &self,
        group: &str,
        location: &str,
        name: &str,
        address_prefix: &str,
        subnet: &SubnetSpec,
    ) -> Result<VirtualNetwork> {
        let url = self.resource_url(group, "Microsoft.Network/virtualNetworks", name);
        let body = json!({
            "location": location,
            "properties": {
                "addressSpace": { "addressPrefixes": [address_prefix] },
                "subnets": [subnet_body(subnet)]
            }
        });
        let v = self.put_json(&url, API_NETWORK, &body).await?;
        Ok(to_vnet(&v))
    }

    async fn get_subnet(&self, group: &str, vnet: &str, name: &str) -> Result<Option<Subnet>> {
        let url = format!(
            "{}/subnets/{}",
            self.resource_url(group, "Microsoft.Network/virtualNetworks", vnet),
            name
        );
        Ok(self.get_json(&url, API_NETWORK).await?.as_ref().map(to_subnet))
    }

    async fn create_or_update_subnet(
        &self,
        group: &str,
        vnet: &str,
        subnet: &SubnetSpec,
    ) -> Result<Subnet> {
        let url = format!(
            "{}/subnets/{}",
            self.resource_url(group, "Microsoft.Network/virtualNetworks", vnet),
            subnet.name
        );
        let v = self.put_json(&url, API_NETWORK, &subnet_body(subnet)).await?;
        Ok(to_subnet(&v))
    }

    async fn get_public_ip(&self, group: &str, name: &str) -> Result<Option<PublicIp>> {
        let url = self.resource_url(group, "Microsoft.Network/publicIPAddresses", name);
        Ok(self.get_json(&url, API_NETWORK).await?.as_ref().map(to_public_ip))
    }

    async fn create_public_ip(&self, group: &str, location: &str, name: &str) -> Result<PublicIp> {
        let url = self.resource_url(group, "Microsoft.Network/publicIPAddresses", name);
        let body = json!({
            "location": location,
            "sku": { "name": "Standard", "tier": "Regional" },
            "properties": {
                "publicIPAllocationMethod": "Static",
                "publicIPAddressVersion": "IPv4"
            }
        });
        let v = self.put_json(&url, API_NETWORK, &body).await?;
        Ok(to_public_ip(&v))
    }

    async fn get_nat_gateway(&self, group: &str, name: &str) -> Result<Option<NatGateway>> {
        let url = self.resource_url(group, "Microsoft.Network/natGateways", name);
        Ok(self.get_json(&url, API_NETWORK).await?.as_ref().map(to_nat))
    }

    async fn create_nat_gateway(
        &self,
        group: &str,
        location: &str,
        name: &str,
        public_ip_id: &str,
    ) -> Result<NatGateway> {
        let url = self.resource_url(group, "Microsoft.Network/natGateways", name);
        let body = json!({
            "location": location,
            "sku": { "name": "Standard" },
            "properties": {
                "idleTimeoutInMinutes": 4,
                "publicIpAddresses": [{ "id": public_ip_id }]
            }
        });
        let v = self.put_json(&url, API_NETWORK, &body).await?;
        Ok(to_nat(&v))
    }

    async fn get_security_group(&self, group: &str, name: &str) -> Result<Option<SecurityGroup>> {
        let url = self.resource_url(group, "Microsoft.Network/networkSecurityGroups", name);
        Ok(self
            .get_json(&url, API_NETWORK)
            .await?
            .as_ref()
            .map(to_security_group))
    }

    async fn create_security_group(
        &self,
        group: &str,
        location: &str,
        name: &str,
        rules: &[SecurityRule],
    ) -> Result<SecurityGroup> {
        let url = self.resource_url(group, "Microsoft.Network/networkSecurityGroups", name);
        let rules: Vec<Value> = rules
            .iter()
            .map(|r| {
                json!({
                    "name": r.name,
                    "properties": {
                        "priority": r.priority,
                        "direction": "Inbound",
                        "access": r.access.as_str(),
                        "protocol": "Tcp",
                        "sourceAddressPrefix": "*",
                        "sourcePortRange": "*",
                        "destinationAddressPrefix": "*",
                        "destinationPortRange": r.port.to_string(),
                    }
                })
            })
            .collect();
        let body = json!({ "location": location, "properties": { "securityRules": rules } });
        let v = self.put_json(&url, API_NETWORK, &body).await?;
        Ok(to_security_group(&v))
    }

    async fn get_network_interface(
        &self,
        group: &str,
        name: &str,
    ) -> Result<Option<NetworkInterface>> {
        let url = self.resource_url(group, "Microsoft.Network/networkInterfaces", name);
        Ok(self.get_json(&url, API_NETWORK).await?.as_ref().map(to_nic))
    }

    async fn create_network_interface(
        &self,
        group: &str,
        spec: &NicSpec,
    ) -> Result<NetworkInterface> {
        let url = self.resource_url(group, "Microsoft.Network/networkInterfaces", &spec.name);
        let mut ipc = json!({
            "name": "ipconfig1",
            "properties": {
                "privateIPAllocationMethod": "Dynamic",
                "subnet": { "id": spec.subnet_id }
            }
        });
        if let Some(ip) = &spec.public_ip_id {
            ipc["properties"]["publicIPAddress"] = json!({ "id": ip });
        }
        let mut body = json!({
            "location": spec.location,
            "properties": {
                "enableAcceleratedNetworking": spec.accelerated_networking,
                "ipConfigurations": [ipc]
            }
        });
        if let Some(nsg) = &spec.security_group_id {
            body["properties"]["networkSecurityGroup"] = json!({ "id": nsg });
        }
        let v = self.put_json(&url, API_NETWORK, &body).await?;
        Ok(to_nic(&v))
    }

    async fn delete_network_interface(&self, group: &str, name: &str) -> Result<()> {
        let url = self.resource_url(group, "Microsoft.Network/networkInterfaces", name);
        self.delete(&url, API_NETWORK, true).await
    }

    async fn get_disk(&self, group: &str, name: &str) -> Result<Option<Disk>> {
        let url = self.resource_url(group, "Microsoft.Compute/disks", name);
        Ok(self.get_json(&url, API_DISKS).await?.as_ref().map(to_disk))
    }

    async fn delete_disk(&self, group: &str, name: &str) -> Result<()> {
        let url = self.resource_url(group, "Microsoft.Compute/disks", name);
        self.delete(&url, API_DISKS, true).await
    }

    async fn get_virtual_machine(&self, group: &str, name: &str) -> Result<Option<VirtualMachine>> {
        let url = self.resource_url(group, "Microsoft.Compute/virtualMachines", name);
        Ok(self.get_json(&url, API_COMPUTE).await?.as_ref().map(to_vm))
    }

    async fn create_virtual_machine(&self, group: &str, spec: &VmSpec) -> Result<VirtualMachine> {
        let url = self.resource_url(group, "Microsoft.Compute/virtualMachines", &spec.name);
        let body = vm_body(spec);
        tracing::info!(
            "🔵 [azure] Creating VM {}: size={}, image={}:{}:{}, security={}",
            spec.name,
            spec.size,
            spec.image.publisher,
            spec.image.offer,
            spec.image.sku,
            spec.security_type
        );
        let v = self.put_json(&url, API_COMPUTE, &body).await?;
        Ok(to_vm(&v))
    }

    async fn delete_virtual_machine(&self, group: &str, name: &str) -> Result<()> {
        let url = self.resource_url(group, "Microsoft.Compute/virtualMachines", name);
        self.delete(&url, API_COMPUTE, true).await
    }

    async fn run_command(&self, group: &str, vm: &str, script: &[String]) -> Result<Option<String>> {
        let url = format!(
            "{}/runCommand",
            self.resource_url(group, "Microsoft.Compute/virtualMachines", vm)
        );
        let body = json!({ "commandId": "RunShellScript", "script": script });
        let resp = self
            .client
            .post(&url)
            .bearer_auth(self.bearer().await?)
            .query(&[("api-version", API_COMPUTE)])
            .json(&body)
            .send()
            .await?;
        let resp = check(resp, "POST", &url).await?;
        let op_url = header(&resp, "azure-asyncoperation");
        let mut result: Value = resp.json().await.unwrap_or(Value::Null);
        if let Some(op_url) = op_url {
            result = self.wait_operation(&op_url).await?;
        }
        let output = result["properties"]["output"]["value"]
            .as_array()
            .or_else(|| result["value"].as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i["message"].as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();
        Ok(Some(output))
    }

    async fn list_compute_usages(&self, location: &str) -> Result<Vec<Usage>> {
        let url = format!(
            "{}/subscriptions/{}/providers/Microsoft.Compute/locations/{}/usages",
            ARM, self.subscription_id, location
        );
        self.list_usages(&url, API_COMPUTE).await
    }

    async fn list_network_usages(&self, location: &str) -> Result<Vec<Usage>> {
        let url = format!(
            "{}/subscriptions/{}/providers/Microsoft.Network/locations/{}/usages",
            ARM, self.subscription_id, location
        );
        self.list_usages(&url, API_NETWORK).await
    }

    async fn list_image_skus(
        &self,
        location: &str,
        publisher: &str,
        offer: &str,
    ) -> Result<Vec<String>> {
        let url = format!(
            "{}/subscriptions/{}/providers/Microsoft.Compute/locations/{}/publishers/{}/artifacttypes/vmimage/offers/{}/skus",
            ARM, self.subscription_id, location, publisher, offer
        );
        let Some(body) = self.get_json(&url, API_COMPUTE).await? else {
            return Ok(vec![]);
        };
        Ok(body
            .as_array()
            .map(|skus| {
                skus.iter()
                    .filter_map(|s| s["name"].as_str().map(|n| n.to_string()))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_keeps_the_arm_error() {
        let body = r#"{"error":{"code":"NoRegisteredProviderFound","message":"No registered resource provider found for location 'marsnorth' and API version '2024-03-01' for type 'locations/usages'."}}"#;
        let text = failure_text(StatusCode::NOT_FOUND, body);
        assert!(text.starts_with("NoRegisteredProviderFound: No registered resource provider"));

        assert_eq!(
            failure_text(StatusCode::NOT_FOUND, "gone"),
            "HttpError404: gone"
        );
    }

    #[test]
    fn usages_read_name_value_and_limits() {
        let body = json!({
            "value": [
                { "name": { "value": "lowPriorityCores" }, "currentValue": 8, "limit": 100 },
                { "name": { "value": "cores" }, "limit": 20 }
            ]
        });
        let usages = usages_from(&body);
        assert_eq!(usages.len(), 2);
        assert_eq!(usages[0].name, "lowPriorityCores");
        assert_eq!(usages[0].current, 8);
        assert_eq!(usages[1].current, 0);
        assert!(usages_from(&json!({})).is_empty());
    }

    #[test]
    fn error_text_includes_code_and_details() {
        let body = json!({
            "error": {
                "code": "OperationNotAllowed",
                "message": "Operation could not be completed as it results in exceeding approved LowPriorityCores quota.",
                "details": [{ "code": "QuotaExceeded", "message": "Current Limit: 10" }]
            }
        });
        assert_eq!(
            error_text(&body),
            "OperationNotAllowed: Operation could not be completed as it results in exceeding approved LowPriorityCores quota. | QuotaExceeded: Current Limit: 10"
        );
    }

    #[test]
    fn vm_body_is_spot_with_delete_eviction() {
        let spec = VmSpec {
            name: "w-1".into(),
            location: "westeurope".into(),
            size: "Standard_D2as_v5".into(),
            security_type: "TrustedLaunch".into(),
            image: ImageReference {
                publisher: "Canonical".into(),
                offer: "ubuntu-24_04-lts".into(),
                sku: "minimal".into(),
                version: "latest".into(),
            },
            nic_id: "/nic".into(),
            os_disk_name: "w-1-osdisk".into(),
            admin_username: "azureuser".into(),
            ssh_public_key: Some("ssh-ed25519 AAAA".into()),
            admin_password: None,
            custom_data: Some("IyEvYmluL2Jhc2g=".into()),
            boot_diagnostics: true,
        };
        let body = vm_body(&spec);
        let p = &body["properties"];
        assert_eq!(p["priority"], "Spot");
        assert_eq!(p["evictionPolicy"], "Delete");
        assert_eq!(p["storageProfile"]["osDisk"]["deleteOption"], "Delete");
        assert_eq!(p["securityProfile"]["securityType"], "TrustedLaunch");
        assert_eq!(p["osProfile"]["customData"], "IyEvYmluL2Jhc2g=");
        assert_eq!(
            p["osProfile"]["linuxConfiguration"]["disablePasswordAuthentication"],
            true
        );

        let standard = VmSpec {
            security_type: "Standard".into(),
            ..spec
        };
        assert!(vm_body(&standard)["properties"]["securityProfile"].is_null());
    }

    #[test]
    fn disk_without_profile_is_standard() {
        let disk = to_disk(&json!({ "id": "/d", "name": "d", "properties": {} }));
        assert_eq!(disk.security_type.as_deref(), Some("Standard"));
    }
}
