//! Deferred invocation of a remote operation
//!
//! A deferred call is a value describing *what* would be called (an
//! [`Invocation`]) together with a single execution method
//! ([`DeferredCall::invoke`]). The description is kept around so that retry
//! and failure logs can say exactly which call was replayed.

use crate::error::ProviderResult;
use crate::operation::PendingHandle;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

/// Name and ordered keyword arguments of a remote call
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Operation name (e.g. "virtual_networks.create_or_update")
    pub operation: String,

    /// Arguments in the order they were bound
    pub args: Vec<(String, serde_json::Value)>,
}

impl Invocation {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            args: Vec::new(),
        }
    }

    /// Bind an argument. Values that fail to serialize are recorded as null;
    /// the description is only used for logging.
    pub fn arg(mut self, name: impl Into<String>, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
        self.args.push((name.into(), value));
        self
    }

    /// Look up a bound argument by name
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.args.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.operation)?;
        for (i, (name, value)) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        write!(f, ")")
    }
}

/// A zero-argument remote call that can be (re-)issued on demand.
///
/// `invoke` submits the call and returns a handle on the in-flight
/// long-running operation, or `None` when the provider signals there is
/// nothing to do.
#[async_trait]
pub trait DeferredCall: Send + Sync {
    /// Description of the call, for logging
    fn invocation(&self) -> &Invocation;

    /// Submit the call
    async fn invoke(&self) -> ProviderResult<Option<PendingHandle>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invocation_display() {
        let invocation = Invocation::new("subnets.create_or_update")
            .arg("resource_group_name", "rg1")
            .arg("virtual_network_name", "vnet1")
            .arg("subnet_name", "default");

        assert_eq!(
            invocation.to_string(),
            r#"subnets.create_or_update(resource_group_name="rg1", virtual_network_name="vnet1", subnet_name="default")"#
        );
    }

    #[test]
    fn test_invocation_without_args() {
        assert_eq!(Invocation::new("noop").to_string(), "noop()");
    }

    #[test]
    fn test_invocation_keeps_argument_order() {
        let invocation = Invocation::new("public_ip_addresses.create_or_update")
            .arg("public_ip_address_name", "pool-pip000")
            .arg("resource_group_name", "rg1")
            .arg("idle_timeout_in_minutes", 30);

        let names: Vec<&str> = invocation.args.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "public_ip_address_name",
                "resource_group_name",
                "idle_timeout_in_minutes"
            ]
        );
        assert_eq!(invocation.get("idle_timeout_in_minutes"), Some(&json!(30)));
        assert_eq!(invocation.get("missing"), None);
    }
}
