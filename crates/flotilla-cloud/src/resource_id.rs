//! Resource identifier parsing
//!
//! Provider resource ids are path-like strings such as
//! `/subscriptions/<sub>/resourceGroups/<rg>/providers/Microsoft.Network/networkInterfaces/nic1`.
//! The second-to-last segment names the resource type and the last one the
//! resource itself.

use crate::error::ResourceIdError;

pub const NETWORK_INTERFACES: &str = "networkInterfaces";
pub const PUBLIC_IP_ADDRESSES: &str = "publicIPAddresses";
pub const NETWORK_SECURITY_GROUPS: &str = "networkSecurityGroups";
pub const VIRTUAL_NETWORKS: &str = "virtualNetworks";
pub const SUBNETS: &str = "subnets";
pub const VIRTUAL_MACHINES: &str = "virtualMachines";

/// Extract the short name of a resource whose type marker must be `marker`
pub fn resource_name<'a>(id: &'a str, marker: &str) -> Result<&'a str, ResourceIdError> {
    let segments: Vec<&str> = id.split('/').collect();
    match segments.as_slice() {
        [.., kind, name] if *kind == marker && !name.is_empty() => Ok(*name),
        _ => Err(ResourceIdError {
            expected: marker.to_string(),
            id: id.to_string(),
        }),
    }
}

/// Extract `(subnet_name, virtual_network_name)` from a subnet id
pub fn subnet_and_virtual_network_names(id: &str) -> Result<(&str, &str), ResourceIdError> {
    let segments: Vec<&str> = id.split('/').collect();
    match segments.as_slice() {
        [.., vnets, vnet, subnets, subnet]
            if *vnets == VIRTUAL_NETWORKS
                && *subnets == SUBNETS
                && !vnet.is_empty()
                && !subnet.is_empty() =>
        {
            Ok((*subnet, *vnet))
        }
        _ => Err(ResourceIdError {
            expected: SUBNETS.to_string(),
            id: id.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "/subscriptions/0000/resourceGroups/rg1/providers/Microsoft.Network";

    #[test]
    fn test_network_interface_name() {
        let id = format!("{}/networkInterfaces/nic1", PREFIX);
        assert_eq!(resource_name(&id, NETWORK_INTERFACES).unwrap(), "nic1");
    }

    #[test]
    fn test_wrong_marker_is_rejected() {
        let id = format!("{}/publicIPAddresses/nic1", PREFIX);
        let err = resource_name(&id, NETWORK_INTERFACES).unwrap_err();
        assert_eq!(err.expected, NETWORK_INTERFACES);
        assert_eq!(err.id, id);
    }

    #[test]
    fn test_degenerate_ids_are_rejected() {
        assert!(resource_name("", NETWORK_INTERFACES).is_err());
        assert!(resource_name("nic1", NETWORK_INTERFACES).is_err());
        assert!(resource_name("networkInterfaces/", NETWORK_INTERFACES).is_err());
        assert_eq!(
            resource_name("networkInterfaces/nic1", NETWORK_INTERFACES).unwrap(),
            "nic1"
        );
    }

    #[test]
    fn test_marker_is_case_sensitive() {
        let id = format!("{}/publicipaddresses/pip1", PREFIX);
        assert!(resource_name(&id, PUBLIC_IP_ADDRESSES).is_err());
    }

    #[test]
    fn test_subnet_and_vnet_names() {
        let id = format!("{}/virtualNetworks/vnet1/subnets/default", PREFIX);
        assert_eq!(
            subnet_and_virtual_network_names(&id).unwrap(),
            ("default", "vnet1")
        );
    }

    #[test]
    fn test_subnet_requires_both_markers() {
        let id = format!("{}/virtualNetworks/vnet1/subnetz/default", PREFIX);
        assert!(subnet_and_virtual_network_names(&id).is_err());

        let id = format!("{}/networkSecurityGroups/vnet1/subnets/default", PREFIX);
        assert!(subnet_and_virtual_network_names(&id).is_err());

        assert!(subnet_and_virtual_network_names("subnets/default").is_err());
    }
}
