//! Network resource provisioning
//!
//! Every create function looks the resource up by its generated name first
//! and applies an [`ExistencePolicy`] before anything is written.

use crate::client::{ArmClient, NETWORK_API_VERSION, NETWORK_PROVIDER, RESOURCES_API_VERSION};
use crate::models::{
    AddressSpace, IpConfiguration, IpConfigurationProperties, NetworkInterface,
    NetworkInterfaceProperties, NetworkSecurityGroup, NetworkSecurityGroupProperties,
    PublicIpAddress, PublicIpAddressDnsSettings, PublicIpAddressProperties, ResourceGroup,
    SecurityRule, SecurityRuleProperties, SubResource, Subnet, SubnetProperties, VirtualMachine,
    VirtualNetwork, VirtualNetworkProperties,
};
use flotilla_cloud::resource_id::{self, NETWORK_INTERFACES, NETWORK_SECURITY_GROUPS, PUBLIC_IP_ADDRESSES};
use flotilla_cloud::{
    AsyncOperation, CloudError, Existence, ExistencePolicy, Invocation, ResourceIdError, Result,
    not_found_as_none,
};
use flotilla_config::naming;
use flotilla_config::{VirtualNetworkSettings, VmResource};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;

/// First priority handed out to generated inbound rules
pub const INBOUND_RULE_PRIORITY_START: u32 = 100;

/// Public IP idle timeout in minutes
pub const PUBLIC_IP_IDLE_TIMEOUT_MINUTES: u32 = 30;

// ============ Resource group ============

/// Create a resource group unless it already exists
pub async fn create_resource_group(
    client: &ArmClient,
    resource_group: &str,
    location: &str,
) -> Result<ResourceGroup> {
    let path = client.resource_group_path(resource_group);
    if client.exists(&path, RESOURCES_API_VERSION).await? {
        tracing::debug!("resource group {} exists", resource_group);
        return Ok(client.get(&path, RESOURCES_API_VERSION).await?);
    }

    tracing::info!("creating resource group: {}", resource_group);
    let body = json!({ "location": location });
    Ok(client.put(&path, RESOURCES_API_VERSION, &body).await?)
}

// ============ Virtual network and subnet ============

fn virtual_network_path(client: &ArmClient, resource_group: &str, name: &str) -> String {
    client.resource_path(resource_group, NETWORK_PROVIDER, &["virtualNetworks", name])
}

fn subnet_path(client: &ArmClient, resource_group: &str, vnet_name: &str, subnet_name: &str) -> String {
    client.resource_path(
        resource_group,
        NETWORK_PROVIDER,
        &["virtualNetworks", vnet_name, "subnets", subnet_name],
    )
}

/// Create (or reuse, per settings) a virtual network and its subnet
pub async fn create_virtual_network_and_subnet(
    client: &ArmClient,
    resource_group: &str,
    location: &str,
    vnet_settings: &VirtualNetworkSettings,
) -> Result<(VirtualNetwork, Subnet)> {
    let policy = ExistencePolicy::new(vnet_settings.existing_ok, vnet_settings.create_nonexistent);

    let vnet_path = virtual_network_path(client, resource_group, &vnet_settings.name);
    let existing = not_found_as_none(client.get::<VirtualNetwork>(&vnet_path, NETWORK_API_VERSION).await)?;
    let description = format!("virtual network {}", vnet_settings.name);
    let virtual_network = match policy.resolve(&description, existing)? {
        Existence::Reuse(vnet) => vnet,
        Existence::Create => {
            create_resource_group(client, resource_group, location).await?;
            tracing::info!("creating virtual network: {}", vnet_settings.name);
            let body = VirtualNetwork {
                location: location.to_string(),
                properties: VirtualNetworkProperties {
                    address_space: AddressSpace {
                        address_prefixes: vec![vnet_settings.address_space.clone()],
                    },
                    provisioning_state: None,
                },
                ..Default::default()
            };
            let invocation = Invocation::new("virtual_networks.create_or_update")
                .arg("resource_group_name", resource_group)
                .arg("virtual_network_name", &vnet_settings.name);
            let call = client.begin_put(&vnet_path, NETWORK_API_VERSION, to_body(&body)?, invocation);
            let mut operation =
                AsyncOperation::<VirtualNetwork>::new(call, client.operation_options()).await?;
            created(operation.result().await?, &description)?
        }
    };

    let subnet_path = subnet_path(client, resource_group, &vnet_settings.name, &vnet_settings.subnet_name);
    let existing = not_found_as_none(client.get::<Subnet>(&subnet_path, NETWORK_API_VERSION).await)?;
    let description = format!(
        "virtual network {} and subnet {}",
        vnet_settings.name, vnet_settings.subnet_name
    );
    let subnet = match policy.resolve(&description, existing)? {
        Existence::Reuse(subnet) => subnet,
        Existence::Create => {
            tracing::info!(
                "attaching subnet {} to virtual network {}",
                vnet_settings.subnet_name,
                vnet_settings.name
            );
            let body = Subnet {
                properties: SubnetProperties {
                    address_prefix: Some(vnet_settings.subnet_address_prefix.clone()),
                    provisioning_state: None,
                },
                ..Default::default()
            };
            let invocation = Invocation::new("subnets.create_or_update")
                .arg("resource_group_name", resource_group)
                .arg("virtual_network_name", &vnet_settings.name)
                .arg("subnet_name", &vnet_settings.subnet_name);
            let call = client.begin_put(&subnet_path, NETWORK_API_VERSION, to_body(&body)?, invocation);
            let mut operation = AsyncOperation::<Subnet>::new(call, client.operation_options()).await?;
            created(operation.result().await?, &description)?
        }
    };

    tracing::info!(
        "virtual network: {} [provisioning_state={} address_space={:?} subnet={} address_prefix={}]",
        virtual_network.id,
        virtual_network.properties.provisioning_state.as_deref().unwrap_or("unknown"),
        virtual_network.properties.address_space.address_prefixes,
        vnet_settings.subnet_name,
        subnet.properties.address_prefix.as_deref().unwrap_or("unknown"),
    );
    Ok((virtual_network, subnet))
}

// ============ Network security group ============

fn network_security_group_path(client: &ArmClient, resource_group: &str, name: &str) -> String {
    client.resource_path(resource_group, NETWORK_PROVIDER, &["networkSecurityGroups", name])
}

/// Expand the inbound settings into one rule per source address prefix.
///
/// Priorities start at [`INBOUND_RULE_PRIORITY_START`] and increase across
/// all rules; the per-rule index restarts for every settings entry.
pub fn inbound_security_rules(vm_resource: &VmResource) -> Result<Vec<SecurityRule>> {
    let mut priority = INBOUND_RULE_PRIORITY_START;
    let mut rules = Vec::new();
    for (name, inbound) in &vm_resource.network_security.inbound {
        let protocol = match inbound.protocol.to_lowercase().as_str() {
            "tcp" => "Tcp",
            "udp" => "Udp",
            "*" => "*",
            other => {
                return Err(CloudError::InvalidConfig(format!(
                    "Unknown protocol {} for rule {}",
                    other, name
                )));
            }
        };
        for (index, prefix) in (0u32..).zip(&inbound.source_address_prefix) {
            rules.push(SecurityRule {
                name: naming::inbound_rule_name(name, index),
                properties: SecurityRuleProperties {
                    description: Some(naming::inbound_rule_description(name, index)),
                    protocol: protocol.to_string(),
                    source_port_range: "*".to_string(),
                    destination_port_range: inbound.destination_port_range.to_string(),
                    source_address_prefix: prefix.clone(),
                    destination_address_prefix: "*".to_string(),
                    access: "Allow".to_string(),
                    priority,
                    direction: "Inbound".to_string(),
                },
            });
            priority += 1;
        }
    }
    Ok(rules)
}

/// Start creating the network security group for a VM set.
///
/// Returns `None` when the settings define no inbound rules.
pub async fn create_network_security_group(
    client: &ArmClient,
    vm_resource: &VmResource,
) -> Result<Option<AsyncOperation<NetworkSecurityGroup>>> {
    let nsg_name = naming::network_security_group_name(vm_resource);
    let path = network_security_group_path(client, &vm_resource.resource_group, &nsg_name);
    let existing = not_found_as_none(client.get::<NetworkSecurityGroup>(&path, NETWORK_API_VERSION).await)?;
    ExistencePolicy::CREATE_ONLY.resolve(&format!("network security group {}", nsg_name), existing)?;

    let security_rules = inbound_security_rules(vm_resource)?;
    if security_rules.is_empty() {
        tracing::warn!("no security rules to apply, not creating a network security group");
        return Ok(None);
    }

    tracing::debug!("creating network security group: {}", nsg_name);
    let body = NetworkSecurityGroup {
        location: vm_resource.location.clone(),
        properties: NetworkSecurityGroupProperties {
            security_rules,
            provisioning_state: None,
        },
        ..Default::default()
    };
    let invocation = Invocation::new("network_security_groups.create_or_update")
        .arg("resource_group_name", &vm_resource.resource_group)
        .arg("network_security_group_name", &nsg_name);
    let call = client.begin_put(&path, NETWORK_API_VERSION, to_body(&body)?, invocation);
    Ok(Some(AsyncOperation::new(call, client.operation_options()).await?))
}

// ============ Public IP ============

fn public_ip_path(client: &ArmClient, resource_group: &str, name: &str) -> String {
    client.resource_path(resource_group, NETWORK_PROVIDER, &["publicIPAddresses", name])
}

/// Start creating the public IP for VM `offset`
pub async fn create_public_ip(
    client: &ArmClient,
    vm_resource: &VmResource,
    offset: u32,
) -> Result<AsyncOperation<PublicIpAddress>> {
    let pip_name = naming::public_ip_name(vm_resource, offset);
    let path = public_ip_path(client, &vm_resource.resource_group, &pip_name);
    let existing = not_found_as_none(client.get::<PublicIpAddress>(&path, NETWORK_API_VERSION).await)?;
    ExistencePolicy::CREATE_ONLY.resolve(&format!("public ip {}", pip_name), existing)?;

    let hostname = naming::hostname(vm_resource, offset);
    tracing::debug!("creating public ip: {} with label: {}", pip_name, hostname);
    let allocation = if vm_resource.public_ip.static_ip {
        "Static"
    } else {
        "Dynamic"
    };
    let body = PublicIpAddress {
        location: vm_resource.location.clone(),
        properties: PublicIpAddressProperties {
            public_ip_allocation_method: allocation.to_string(),
            public_ip_address_version: "IPv4".to_string(),
            idle_timeout_in_minutes: Some(PUBLIC_IP_IDLE_TIMEOUT_MINUTES),
            dns_settings: Some(PublicIpAddressDnsSettings {
                domain_name_label: hostname,
                fqdn: None,
            }),
            ..Default::default()
        },
        ..Default::default()
    };
    let invocation = Invocation::new("public_ip_addresses.create_or_update")
        .arg("resource_group_name", &vm_resource.resource_group)
        .arg("public_ip_address_name", &pip_name);
    let call = client.begin_put(&path, NETWORK_API_VERSION, to_body(&body)?, invocation);
    AsyncOperation::new(call, client.operation_options()).await
}

// ============ Network interface ============

fn network_interface_path(client: &ArmClient, resource_group: &str, name: &str) -> String {
    client.resource_path(resource_group, NETWORK_PROVIDER, &["networkInterfaces", name])
}

/// Start creating the network interface for VM `offset`.
///
/// `pips` maps VM offsets to their public IPs; an empty map means no public
/// IP. `private_ips`, when given, holds one static address per offset.
pub async fn create_network_interface(
    client: &ArmClient,
    vm_resource: &VmResource,
    subnet: &Subnet,
    nsg: Option<&NetworkSecurityGroup>,
    private_ips: Option<&[String]>,
    pips: &BTreeMap<u32, PublicIpAddress>,
    offset: u32,
) -> Result<AsyncOperation<NetworkInterface>> {
    let nic_name = naming::network_interface_name(vm_resource, offset);
    let path = network_interface_path(client, &vm_resource.resource_group, &nic_name);
    let existing = not_found_as_none(client.get::<NetworkInterface>(&path, NETWORK_API_VERSION).await)?;
    ExistencePolicy::CREATE_ONLY.resolve(&format!("network interface {}", nic_name), existing)?;

    let public_ip = if pips.is_empty() {
        tracing::debug!("not assigning public ip to network interface {}", nic_name);
        None
    } else {
        let pip = pips.get(&offset).ok_or_else(|| {
            CloudError::InvalidConfig(format!("no public ip for network interface {}", nic_name))
        })?;
        tracing::debug!("assigning public ip {} to network interface {}", pip.name, nic_name);
        Some(SubResource::new(&pip.id))
    };

    let mut ip_properties = IpConfigurationProperties {
        subnet: Some(SubResource::new(&subnet.id)),
        public_ip_address: public_ip,
        ..Default::default()
    };
    if let Some(private_ips) = private_ips {
        let address = private_ips.get(offset as usize).ok_or_else(|| {
            CloudError::InvalidConfig(format!("no private ip for network interface {}", nic_name))
        })?;
        ip_properties.private_ip_address = Some(address.clone());
        ip_properties.private_ip_allocation_method = Some("Static".to_string());
        ip_properties.private_ip_address_version = Some("IPv4".to_string());
    }

    tracing::debug!("creating network interface: {}", nic_name);
    let body = NetworkInterface {
        location: vm_resource.location.clone(),
        properties: NetworkInterfaceProperties {
            ip_configurations: vec![IpConfiguration {
                name: vm_resource.hostname_prefix.clone(),
                id: None,
                properties: ip_properties,
            }],
            network_security_group: nsg.map(|nsg| SubResource::new(&nsg.id)),
            enable_accelerated_networking: vm_resource.accelerated_networking,
            ..Default::default()
        },
        ..Default::default()
    };
    let invocation = Invocation::new("network_interfaces.create_or_update")
        .arg("resource_group_name", &vm_resource.resource_group)
        .arg("network_interface_name", &nic_name);
    let call = client.begin_put(&path, NETWORK_API_VERSION, to_body(&body)?, invocation);
    AsyncOperation::new(call, client.operation_options()).await
}

// ============ Lookups from a virtual machine ============

/// Names of the network resources a virtual machine is wired to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VmResourceNames {
    pub network_interface: String,
    pub public_ip: Option<String>,
    pub subnet: String,
    pub virtual_network: String,
    pub network_security_group: Option<String>,
}

fn primary_nic_name(vm: &VirtualMachine) -> std::result::Result<&str, ResourceIdError> {
    let nic_id = vm
        .properties
        .network_profile
        .network_interfaces
        .first()
        .map(|nic| nic.id.as_str())
        .unwrap_or_default();
    resource_id::resource_name(nic_id, NETWORK_INTERFACES)
}

fn primary_ip_configuration(nic: &NetworkInterface) -> Result<&IpConfiguration> {
    nic.primary_ip_configuration().ok_or_else(|| {
        CloudError::ResourceId(ResourceIdError {
            expected: "ipConfigurations".to_string(),
            id: nic.id.clone(),
        })
    })
}

/// Fetch the primary network interface of a virtual machine
pub async fn get_nic_from_virtual_machine(
    client: &ArmClient,
    resource_group: &str,
    vm: &VirtualMachine,
) -> Result<NetworkInterface> {
    let nic_name = primary_nic_name(vm)?;
    let path = network_interface_path(client, resource_group, nic_name);
    Ok(client.get(&path, NETWORK_API_VERSION).await?)
}

/// Fetch the primary network interface (unless given) and its public IP
pub async fn get_nic_and_pip_from_virtual_machine(
    client: &ArmClient,
    resource_group: &str,
    vm: &VirtualMachine,
    nic: Option<NetworkInterface>,
) -> Result<(NetworkInterface, Option<PublicIpAddress>)> {
    let nic = match nic {
        Some(nic) => nic,
        None => get_nic_from_virtual_machine(client, resource_group, vm).await?,
    };

    let pip = match &primary_ip_configuration(&nic)?.properties.public_ip_address {
        Some(pip_ref) => {
            let pip_name = resource_id::resource_name(&pip_ref.id, PUBLIC_IP_ADDRESSES)?;
            let path = public_ip_path(client, resource_group, pip_name);
            Some(client.get(&path, NETWORK_API_VERSION).await?)
        }
        None => None,
    };
    Ok((nic, pip))
}

/// Work out the names of everything a virtual machine's NIC points at
pub async fn get_resource_names_from_virtual_machine(
    client: &ArmClient,
    vm_resource: &VmResource,
    vm: &VirtualMachine,
    nic: Option<&NetworkInterface>,
    pip: Option<&PublicIpAddress>,
) -> Result<VmResourceNames> {
    let fetched;
    let nic = match nic {
        Some(nic) => nic,
        None => {
            fetched = get_nic_from_virtual_machine(client, &vm_resource.resource_group, vm).await?;
            &fetched
        }
    };
    let ip_configuration = primary_ip_configuration(nic)?;

    let public_ip = match pip {
        Some(pip) => Some(pip.name.clone()),
        None => match &ip_configuration.properties.public_ip_address {
            Some(pip_ref) => Some(resource_id::resource_name(&pip_ref.id, PUBLIC_IP_ADDRESSES)?.to_string()),
            None => None,
        },
    };

    let subnet_id = ip_configuration
        .properties
        .subnet
        .as_ref()
        .map(|subnet| subnet.id.as_str())
        .unwrap_or_default();
    let (subnet, virtual_network) = resource_id::subnet_and_virtual_network_names(subnet_id)?;

    let network_security_group = match &nic.properties.network_security_group {
        Some(nsg_ref) => Some(resource_id::resource_name(&nsg_ref.id, NETWORK_SECURITY_GROUPS)?.to_string()),
        None => None,
    };

    Ok(VmResourceNames {
        network_interface: nic.name.clone(),
        public_ip,
        subnet: subnet.to_string(),
        virtual_network: virtual_network.to_string(),
        network_security_group,
    })
}

// ============ Deletion ============

pub async fn delete_network_interface(
    client: &ArmClient,
    resource_group: &str,
    nic_name: &str,
) -> Result<AsyncOperation> {
    tracing::debug!("deleting network interface {}", nic_name);
    let invocation = Invocation::new("network_interfaces.delete")
        .arg("resource_group_name", resource_group)
        .arg("network_interface_name", nic_name);
    let path = network_interface_path(client, resource_group, nic_name);
    let call = client.begin_delete(&path, NETWORK_API_VERSION, invocation);
    AsyncOperation::new(call, client.operation_options()).await
}

pub async fn delete_network_security_group(
    client: &ArmClient,
    resource_group: &str,
    nsg_name: &str,
) -> Result<AsyncOperation> {
    tracing::debug!("deleting network security group {}", nsg_name);
    let invocation = Invocation::new("network_security_groups.delete")
        .arg("resource_group_name", resource_group)
        .arg("network_security_group_name", nsg_name);
    let path = network_security_group_path(client, resource_group, nsg_name);
    let call = client.begin_delete(&path, NETWORK_API_VERSION, invocation);
    AsyncOperation::new(call, client.operation_options()).await
}

pub async fn delete_public_ip(
    client: &ArmClient,
    resource_group: &str,
    pip_name: &str,
) -> Result<AsyncOperation> {
    tracing::debug!("deleting public ip {}", pip_name);
    let invocation = Invocation::new("public_ip_addresses.delete")
        .arg("resource_group_name", resource_group)
        .arg("public_ip_address_name", pip_name);
    let path = public_ip_path(client, resource_group, pip_name);
    let call = client.begin_delete(&path, NETWORK_API_VERSION, invocation);
    AsyncOperation::new(call, client.operation_options()).await
}

pub async fn delete_subnet(
    client: &ArmClient,
    resource_group: &str,
    vnet_name: &str,
    subnet_name: &str,
) -> Result<AsyncOperation> {
    tracing::debug!("deleting subnet {} on virtual network {}", subnet_name, vnet_name);
    let invocation = Invocation::new("subnets.delete")
        .arg("resource_group_name", resource_group)
        .arg("virtual_network_name", vnet_name)
        .arg("subnet_name", subnet_name);
    let path = subnet_path(client, resource_group, vnet_name, subnet_name);
    let call = client.begin_delete(&path, NETWORK_API_VERSION, invocation);
    AsyncOperation::new(call, client.operation_options()).await
}

pub async fn delete_virtual_network(
    client: &ArmClient,
    resource_group: &str,
    vnet_name: &str,
) -> Result<AsyncOperation> {
    tracing::debug!("deleting virtual network {}", vnet_name);
    let invocation = Invocation::new("virtual_networks.delete")
        .arg("resource_group_name", resource_group)
        .arg("virtual_network_name", vnet_name);
    let path = virtual_network_path(client, resource_group, vnet_name);
    let call = client.begin_delete(&path, NETWORK_API_VERSION, invocation);
    AsyncOperation::new(call, client.operation_options()).await
}

// ============ Helpers ============

pub(crate) fn to_body(resource: &impl Serialize) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(resource)?)
}

/// A create operation always yields the resource; `None` here means the
/// service answered a PUT with nothing
pub(crate) fn created<T>(resource: Option<T>, description: &str) -> Result<T> {
    resource.ok_or_else(|| {
        CloudError::Provider(flotilla_cloud::ProviderError::new(
            200,
            format!("no resource returned creating {}", description),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_config::Settings;

    fn vm_resource(inbound: &str) -> VmResource {
        let yaml = format!(
            r#"
virtual_machines:
  location: eastus
  resource_group: rg1
  hostname_prefix: pool
  virtual_network:
    name: vnet1
    address_space: 10.0.0.0/16
    subnet_name: default
    subnet_address_prefix: 10.0.0.0/24
  network_security:
    inbound:
{}
  ssh:
    ssh_public_key_data: ssh-rsa AAAA test
"#,
            inbound
        );
        Settings::from_yaml(&yaml).unwrap().virtual_machines
    }

    #[test]
    fn test_inbound_rule_priorities() {
        let vm = vm_resource(
            r#"      ssh:
        destination_port_range: 22
        source_address_prefix: ["*"]
        protocol: TCP
      glusterfs:
        destination_port_range: "24007-24008"
        source_address_prefix: ["10.0.0.0/16", "192.168.0.0/24"]
        protocol: "*""#,
        );

        let rules = inbound_security_rules(&vm).unwrap();
        let summary: Vec<(&str, u32, &str)> = rules
            .iter()
            .map(|r| (r.name.as_str(), r.properties.priority, r.properties.protocol.as_str()))
            .collect();

        // settings entries are walked in name order
        assert_eq!(
            summary,
            vec![
                ("glusterfs_in-000", 100, "*"),
                ("glusterfs_in-001", 101, "*"),
                ("ssh_in-000", 102, "Tcp"),
            ]
        );
        assert_eq!(rules[1].properties.source_address_prefix, "192.168.0.0/24");
        assert_eq!(rules[1].properties.destination_port_range, "24007-24008");
        assert_eq!(rules[2].properties.destination_port_range, "22");
        assert!(rules.iter().all(|r| r.properties.direction == "Inbound"));
    }

    #[test]
    fn test_unknown_protocol() {
        let vm = vm_resource(
            r#"      ping:
        destination_port_range: "*"
        source_address_prefix: ["*"]
        protocol: icmp"#,
        );

        match inbound_security_rules(&vm).unwrap_err() {
            CloudError::InvalidConfig(msg) => {
                assert!(msg.contains("icmp"));
                assert!(msg.contains("ping"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_no_inbound_rules() {
        let vm = vm_resource("      {}");
        assert!(inbound_security_rules(&vm).unwrap().is_empty());
    }

    #[test]
    fn test_created_requires_resource() {
        assert_eq!(created(Some(1), "thing").unwrap(), 1);
        let err = created::<i32>(None, "virtual network vnet1").unwrap_err();
        assert_eq!(err.status_code(), Some(200));
    }
}
