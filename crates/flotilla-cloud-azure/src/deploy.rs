//! Provisioning and teardown of a whole VM set

use crate::client::ArmClient;
use crate::compute;
use crate::error::Result;
use crate::models::{NetworkInterface, PublicIpAddress, VirtualMachine};
use crate::network::{self, VmResourceNames, created};
use flotilla_cloud::AsyncOperation;
use flotilla_config::VmResource;
use flotilla_config::naming;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// What a provisioned virtual machine ended up with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VirtualMachineSummary {
    pub name: String,
    pub id: String,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
    pub fqdn: Option<String>,
}

/// What teardown deleted and skipped
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeardownSummary {
    pub deleted_virtual_machines: Vec<String>,
    pub missing_virtual_machines: Vec<String>,
    pub deleted_resources: Vec<String>,
}

/// Provision every VM of the set along with its network resources.
///
/// Independent resources are submitted together and awaited afterwards, so
/// the service works on them concurrently.
pub async fn provision_virtual_machines(
    client: &ArmClient,
    vm_resource: &VmResource,
    ssh_public_key: &str,
) -> Result<Vec<VirtualMachineSummary>> {
    let resource_group = &vm_resource.resource_group;
    let (_, subnet) = network::create_virtual_network_and_subnet(
        client,
        resource_group,
        &vm_resource.location,
        &vm_resource.virtual_network,
    )
    .await?;

    // security group and public IPs do not depend on each other
    let nsg_operation = network::create_network_security_group(client, vm_resource).await?;
    let mut pip_operations = Vec::new();
    if vm_resource.public_ip.enabled {
        for offset in 0..vm_resource.vm_count {
            pip_operations.push((offset, network::create_public_ip(client, vm_resource, offset).await?));
        }
    }

    let nsg = match nsg_operation {
        Some(mut operation) => operation.result().await?,
        None => None,
    };
    let mut pips: BTreeMap<u32, PublicIpAddress> = BTreeMap::new();
    for (offset, mut operation) in pip_operations {
        let description = naming::public_ip_name(vm_resource, offset);
        pips.insert(offset, created(operation.result().await?, &description)?);
    }
    tracing::info!("{} public ips created", pips.len());

    let mut nic_operations = Vec::new();
    for offset in 0..vm_resource.vm_count {
        let operation = network::create_network_interface(
            client,
            vm_resource,
            &subnet,
            nsg.as_ref(),
            vm_resource.private_ips.as_deref(),
            &pips,
            offset,
        )
        .await?;
        nic_operations.push((offset, operation));
    }
    let nics: BTreeMap<u32, NetworkInterface> = await_created(nic_operations, |offset| {
        naming::network_interface_name(vm_resource, offset)
    })
    .await?;
    tracing::info!("{} network interfaces created", nics.len());

    let mut vm_operations = Vec::new();
    for (offset, nic) in &nics {
        let operation =
            compute::create_virtual_machine(client, vm_resource, nic, ssh_public_key, *offset).await?;
        vm_operations.push((*offset, operation));
    }
    let vms: BTreeMap<u32, VirtualMachine> = await_created(vm_operations, |offset| {
        naming::virtual_machine_name(vm_resource, offset)
    })
    .await?;

    let mut summaries = Vec::new();
    for vm in vms.values() {
        let (nic, pip) =
            network::get_nic_and_pip_from_virtual_machine(client, resource_group, vm, None).await?;
        let summary = summarize(vm, &nic, pip.as_ref());
        tracing::info!(
            "virtual machine: {} [private_ip={} public_ip={} fqdn={}]",
            summary.name,
            summary.private_ip.as_deref().unwrap_or("-"),
            summary.public_ip.as_deref().unwrap_or("-"),
            summary.fqdn.as_deref().unwrap_or("-"),
        );
        summaries.push(summary);
    }
    Ok(summaries)
}

async fn await_created<T: serde::de::DeserializeOwned>(
    operations: Vec<(u32, AsyncOperation<T>)>,
    describe: impl Fn(u32) -> String,
) -> Result<BTreeMap<u32, T>> {
    let mut resources = BTreeMap::new();
    for (offset, mut operation) in operations {
        let resource = created(operation.result().await?, &describe(offset))?;
        resources.insert(offset, resource);
    }
    Ok(resources)
}

fn summarize(
    vm: &VirtualMachine,
    nic: &NetworkInterface,
    pip: Option<&PublicIpAddress>,
) -> VirtualMachineSummary {
    let private_ip = nic
        .primary_ip_configuration()
        .and_then(|ip| ip.properties.private_ip_address.clone());
    let public_ip = pip.and_then(|pip| pip.properties.ip_address.clone());
    let fqdn = pip
        .and_then(|pip| pip.properties.dns_settings.as_ref())
        .and_then(|dns| dns.fqdn.clone());

    VirtualMachineSummary {
        name: vm.name.clone(),
        id: vm.id.clone(),
        private_ip,
        public_ip,
        fqdn,
    }
}

/// Delete every VM of the set and the network resources attached to it.
///
/// VM and NIC deletions are always awaited, since a NIC cannot be deleted
/// while a VM holds it and a public IP cannot be deleted while a NIC holds
/// it. With `wait` unset the remaining deletions are only submitted, and the
/// subnet and virtual network are left alone.
pub async fn teardown_virtual_machines(
    client: &ArmClient,
    vm_resource: &VmResource,
    delete_virtual_network: bool,
    wait: bool,
) -> Result<TeardownSummary> {
    let resource_group = &vm_resource.resource_group;
    let mut summary = TeardownSummary::default();
    let mut attached: Vec<VmResourceNames> = Vec::new();
    let mut vm_deletions = Vec::new();

    for offset in 0..vm_resource.vm_count {
        let vm_name = naming::virtual_machine_name(vm_resource, offset);
        let Some(vm) = compute::get_virtual_machine(client, resource_group, &vm_name).await? else {
            tracing::warn!("virtual machine {} not found", vm_name);
            summary.missing_virtual_machines.push(vm_name);
            continue;
        };
        let names =
            network::get_resource_names_from_virtual_machine(client, vm_resource, &vm, None, None)
                .await?;
        tracing::info!("deleting virtual machine {}", vm_name);
        vm_deletions.push(compute::delete_virtual_machine(client, resource_group, &vm_name).await?);
        attached.push(names);
        summary.deleted_virtual_machines.push(vm_name);
    }
    settle(vm_deletions, true).await?;

    let mut nic_deletions = Vec::new();
    for names in &attached {
        nic_deletions.push(
            network::delete_network_interface(client, resource_group, &names.network_interface)
                .await?,
        );
        summary.deleted_resources.push(names.network_interface.clone());
    }
    settle(nic_deletions, true).await?;

    let mut deletions = Vec::new();
    for pip in attached.iter().filter_map(|names| names.public_ip.as_ref()) {
        deletions.push(network::delete_public_ip(client, resource_group, pip).await?);
        summary.deleted_resources.push(pip.clone());
    }

    let nsg_names: BTreeSet<String> = if attached.is_empty() {
        BTreeSet::from([naming::network_security_group_name(vm_resource)])
    } else {
        attached
            .iter()
            .filter_map(|names| names.network_security_group.clone())
            .collect()
    };
    for nsg in &nsg_names {
        deletions.push(network::delete_network_security_group(client, resource_group, nsg).await?);
        summary.deleted_resources.push(nsg.clone());
    }
    settle(deletions, wait).await?;

    if !delete_virtual_network {
        return Ok(summary);
    }
    if !wait {
        tracing::warn!("not waiting on deletions, leaving the subnet and virtual network in place");
        return Ok(summary);
    }

    let mut networks: BTreeSet<(String, String)> = attached
        .iter()
        .map(|names| (names.virtual_network.clone(), names.subnet.clone()))
        .collect();
    if networks.is_empty() {
        let vnet = &vm_resource.virtual_network;
        networks.insert((vnet.name.clone(), vnet.subnet_name.clone()));
    }
    for (vnet, subnet) in &networks {
        let mut operation = network::delete_subnet(client, resource_group, vnet, subnet).await?;
        operation.result().await?;
        summary.deleted_resources.push(subnet.clone());
    }
    let vnets: BTreeSet<&String> = networks.iter().map(|(vnet, _)| vnet).collect();
    for vnet in vnets {
        let mut operation = network::delete_virtual_network(client, resource_group, vnet).await?;
        operation.result().await?;
        summary.deleted_resources.push(vnet.clone());
    }

    Ok(summary)
}

/// Await submitted deletions, or let them run on their own
async fn settle(operations: Vec<AsyncOperation>, wait: bool) -> Result<()> {
    if !wait {
        return Ok(());
    }
    for mut operation in operations {
        operation.result().await?;
    }
    Ok(())
}
