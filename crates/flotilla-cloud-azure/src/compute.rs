//! Virtual machine provisioning

use crate::client::{ArmClient, COMPUTE_API_VERSION, COMPUTE_PROVIDER};
use crate::models::{
    HardwareProfile, ImageReference, LinuxConfiguration, ManagedDiskParameters, NetworkInterface,
    NetworkInterfaceReference, NetworkInterfaceReferenceProperties, NetworkProfile, OsDisk,
    OsProfile, SshConfiguration, SshPublicKey, StorageProfile, VirtualMachine,
    VirtualMachineIdentity, VirtualMachineProperties,
};
use crate::network::to_body;
use flotilla_cloud::{AsyncOperation, ExistencePolicy, Invocation, Result, not_found_as_none};
use flotilla_config::VmResource;
use flotilla_config::naming;

fn virtual_machine_path(client: &ArmClient, resource_group: &str, name: &str) -> String {
    client.resource_path(resource_group, COMPUTE_PROVIDER, &["virtualMachines", name])
}

/// Look up a virtual machine; `None` when it does not exist
pub async fn get_virtual_machine(
    client: &ArmClient,
    resource_group: &str,
    vm_name: &str,
) -> Result<Option<VirtualMachine>> {
    let path = virtual_machine_path(client, resource_group, vm_name);
    Ok(not_found_as_none(client.get(&path, COMPUTE_API_VERSION).await)?)
}

/// Request body for VM `offset`, wired to `nic`
pub fn virtual_machine_parameters(
    vm_resource: &VmResource,
    nic: &NetworkInterface,
    ssh_public_key: &str,
    offset: u32,
) -> VirtualMachine {
    let vm_name = naming::virtual_machine_name(vm_resource, offset);
    let username = &vm_resource.ssh.username;
    let image = &vm_resource.image;

    VirtualMachine {
        location: vm_resource.location.clone(),
        identity: vm_resource.enable_msi.then(|| VirtualMachineIdentity {
            identity_type: "SystemAssigned".to_string(),
            principal_id: None,
        }),
        properties: VirtualMachineProperties {
            hardware_profile: HardwareProfile {
                vm_size: vm_resource.vm_size.clone(),
            },
            storage_profile: StorageProfile {
                image_reference: Some(ImageReference {
                    publisher: image.publisher.clone(),
                    offer: image.offer.clone(),
                    sku: image.sku.clone(),
                    version: image.version.clone(),
                }),
                os_disk: Some(OsDisk {
                    create_option: "FromImage".to_string(),
                    managed_disk: Some(ManagedDiskParameters {
                        storage_account_type: "Premium_LRS".to_string(),
                    }),
                }),
            },
            os_profile: Some(OsProfile {
                computer_name: vm_name,
                admin_username: username.clone(),
                linux_configuration: Some(LinuxConfiguration {
                    disable_password_authentication: true,
                    ssh: SshConfiguration {
                        public_keys: vec![SshPublicKey {
                            path: format!("/home/{}/.ssh/authorized_keys", username),
                            key_data: ssh_public_key.to_string(),
                        }],
                    },
                }),
            }),
            network_profile: NetworkProfile {
                network_interfaces: vec![NetworkInterfaceReference {
                    id: nic.id.clone(),
                    properties: Some(NetworkInterfaceReferenceProperties { primary: true }),
                }],
            },
            provisioning_state: None,
        },
        ..Default::default()
    }
}

/// Start creating VM `offset`. A 409 reported while polling the operation
/// is retried; a 409 answering the PUT itself is returned as is.
pub async fn create_virtual_machine(
    client: &ArmClient,
    vm_resource: &VmResource,
    nic: &NetworkInterface,
    ssh_public_key: &str,
    offset: u32,
) -> Result<AsyncOperation<VirtualMachine>> {
    let vm_name = naming::virtual_machine_name(vm_resource, offset);
    let existing = get_virtual_machine(client, &vm_resource.resource_group, &vm_name).await?;
    ExistencePolicy::CREATE_ONLY.resolve(&format!("virtual machine {}", vm_name), existing)?;

    tracing::debug!("creating virtual machine: {}", vm_name);
    let body = virtual_machine_parameters(vm_resource, nic, ssh_public_key, offset);
    let invocation = Invocation::new("virtual_machines.create_or_update")
        .arg("resource_group_name", &vm_resource.resource_group)
        .arg("vm_name", &vm_name);
    let path = virtual_machine_path(client, &vm_resource.resource_group, &vm_name);
    let call = client.begin_put(&path, COMPUTE_API_VERSION, to_body(&body)?, invocation);
    let options = client.operation_options().retry_conflict(true);
    AsyncOperation::new(call, options).await
}

pub async fn delete_virtual_machine(
    client: &ArmClient,
    resource_group: &str,
    vm_name: &str,
) -> Result<AsyncOperation> {
    tracing::debug!("deleting virtual machine {}", vm_name);
    let invocation = Invocation::new("virtual_machines.delete")
        .arg("resource_group_name", resource_group)
        .arg("vm_name", vm_name);
    let path = virtual_machine_path(client, resource_group, vm_name);
    let call = client.begin_delete(&path, COMPUTE_API_VERSION, invocation);
    AsyncOperation::new(call, client.operation_options()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_config::Settings;
    use serde_json::json;

    fn vm_resource(enable_msi: bool) -> VmResource {
        let yaml = format!(
            r#"
virtual_machines:
  location: eastus
  resource_group: rg1
  hostname_prefix: pool
  vm_size: Standard_F2s_v2
  enable_msi: {}
  virtual_network:
    name: vnet1
    address_space: 10.0.0.0/16
    subnet_name: default
    subnet_address_prefix: 10.0.0.0/24
  ssh:
    username: admin
    ssh_public_key_data: ssh-rsa AAAA test
"#,
            enable_msi
        );
        Settings::from_yaml(&yaml).unwrap().virtual_machines
    }

    fn nic() -> NetworkInterface {
        NetworkInterface {
            id: "/subscriptions/0000/resourceGroups/rg1/providers/Microsoft.Network/networkInterfaces/pool-ni003".to_string(),
            name: "pool-ni003".to_string(),
            location: "eastus".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_virtual_machine_parameters() {
        let body = virtual_machine_parameters(&vm_resource(false), &nic(), "ssh-rsa AAAA test", 3);
        let value = serde_json::to_value(&body).unwrap();

        assert!(value.get("identity").is_none());
        assert_eq!(value["properties"]["hardwareProfile"]["vmSize"], "Standard_F2s_v2");
        assert_eq!(
            value["properties"]["storageProfile"]["imageReference"],
            json!({
                "publisher": "Canonical",
                "offer": "UbuntuServer",
                "sku": "18.04-LTS",
                "version": "latest"
            })
        );
        let os_profile = &value["properties"]["osProfile"];
        assert_eq!(os_profile["computerName"], "pool-vm003");
        assert_eq!(os_profile["adminUsername"], "admin");
        assert_eq!(os_profile["linuxConfiguration"]["disablePasswordAuthentication"], true);
        assert_eq!(
            os_profile["linuxConfiguration"]["ssh"]["publicKeys"][0]["path"],
            "/home/admin/.ssh/authorized_keys"
        );
        assert_eq!(
            value["properties"]["networkProfile"]["networkInterfaces"][0]["id"],
            nic().id
        );
    }

    #[test]
    fn test_managed_identity() {
        let body = virtual_machine_parameters(&vm_resource(true), &nic(), "ssh-rsa AAAA test", 0);
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["identity"], json!({ "type": "SystemAssigned" }));
    }
}
