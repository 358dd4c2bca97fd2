//! Deterministic resource names
//!
//! Every name is derived from the VM set's `hostname_prefix` and the VM
//! offset, so re-running provisioning finds the resources it created before.

use crate::settings::VmResource;

fn padded(offset: u32) -> String {
    format!("{:03}", offset)
}

pub fn virtual_machine_name(vm_resource: &VmResource, offset: u32) -> String {
    format!("{}-vm{}", vm_resource.hostname_prefix, padded(offset))
}

pub fn network_interface_name(vm_resource: &VmResource, offset: u32) -> String {
    format!("{}-ni{}", vm_resource.hostname_prefix, padded(offset))
}

pub fn public_ip_name(vm_resource: &VmResource, offset: u32) -> String {
    format!("{}-pip{}", vm_resource.hostname_prefix, padded(offset))
}

/// Hostname, also used as the public IP DNS label
pub fn hostname(vm_resource: &VmResource, offset: u32) -> String {
    format!("{}{}", vm_resource.hostname_prefix, padded(offset))
}

pub fn network_security_group_name(vm_resource: &VmResource) -> String {
    format!("{}-nsg", vm_resource.hostname_prefix)
}

pub fn inbound_rule_name(rule: &str, index: u32) -> String {
    format!("{}_in-{}", rule, padded(index))
}

pub fn inbound_rule_description(rule: &str, index: u32) -> String {
    inbound_rule_name(rule, index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    fn vm_resource(prefix: &str) -> VmResource {
        let yaml = format!(
            r#"
virtual_machines:
  location: eastus
  resource_group: rg1
  hostname_prefix: {}
  virtual_network:
    name: vnet1
    address_space: 10.0.0.0/16
    subnet_name: default
    subnet_address_prefix: 10.0.0.0/24
  ssh:
    ssh_public_key_data: ssh-rsa AAAA test
"#,
            prefix
        );
        Settings::from_yaml(&yaml).unwrap().virtual_machines
    }

    #[test]
    fn test_per_vm_names() {
        let vm = vm_resource("gluster");
        assert_eq!(virtual_machine_name(&vm, 0), "gluster-vm000");
        assert_eq!(network_interface_name(&vm, 1), "gluster-ni001");
        assert_eq!(public_ip_name(&vm, 12), "gluster-pip012");
        assert_eq!(hostname(&vm, 7), "gluster007");
    }

    #[test]
    fn test_offsets_beyond_padding() {
        let vm = vm_resource("pool");
        assert_eq!(virtual_machine_name(&vm, 1234), "pool-vm1234");
    }

    #[test]
    fn test_shared_names() {
        let vm = vm_resource("pool");
        assert_eq!(network_security_group_name(&vm), "pool-nsg");
        assert_eq!(inbound_rule_name("ssh", 0), "ssh_in-000");
        assert_eq!(inbound_rule_description("glusterfs", 3), "glusterfs_in-003");
    }
}
