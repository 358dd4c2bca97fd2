//! Flotilla settings model
//!
//! Settings are written in YAML. Only `virtual_machines` is required; every
//! other section has defaults.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Credentials (environment variables are used for anything unset)
    #[serde(default)]
    pub credentials: CredentialsSettings,

    /// Management API endpoint override
    #[serde(default)]
    pub management_endpoint: Option<String>,

    /// Retry behaviour of long-running operations
    #[serde(default)]
    pub retry: RetrySettings,

    /// The virtual machine set to provision
    pub virtual_machines: VmResource,
}

impl Settings {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.retry.max_retries_limit()?;
        self.virtual_machines.validate()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsSettings {
    #[serde(default)]
    pub subscription_id: Option<String>,

    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Maximum retries per operation, -1 for unlimited
    #[serde(default = "default_max_retries")]
    pub max_retries: i64,

    /// Backoff unit in milliseconds; each retry waits 1 to 3 units
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,
}

fn default_max_retries() -> i64 {
    -1
}

fn default_backoff_unit_ms() -> u64 {
    1000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_unit_ms: default_backoff_unit_ms(),
        }
    }
}

impl RetrySettings {
    /// `None` means unlimited
    pub fn max_retries_limit(&self) -> Result<Option<u32>> {
        match self.max_retries {
            -1 => Ok(None),
            n => u32::try_from(n).map(Some).map_err(|_| {
                ConfigError::InvalidSettings(format!(
                    "retry.max_retries は -1 以上である必要があります: {}",
                    n
                ))
            }),
        }
    }

    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }
}

/// A set of identically configured virtual machines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmResource {
    pub location: String,

    pub resource_group: String,

    /// Prefix for every generated resource name
    pub hostname_prefix: String,

    #[serde(default = "default_vm_size")]
    pub vm_size: String,

    #[serde(default = "default_vm_count")]
    pub vm_count: u32,

    #[serde(default)]
    pub accelerated_networking: bool,

    /// Assign a system managed identity
    #[serde(default)]
    pub enable_msi: bool,

    pub virtual_network: VirtualNetworkSettings,

    #[serde(default)]
    pub network_security: NetworkSecuritySettings,

    #[serde(default)]
    pub public_ip: PublicIpSettings,

    /// Static private IPs, one per VM
    #[serde(default)]
    pub private_ips: Option<Vec<String>>,

    pub ssh: SshSettings,

    #[serde(default)]
    pub image: ImageSettings,
}

fn default_vm_size() -> String {
    "Standard_D2s_v3".to_string()
}

fn default_vm_count() -> u32 {
    1
}

impl VmResource {
    pub fn validate(&self) -> Result<()> {
        if self.hostname_prefix.is_empty() {
            return Err(ConfigError::InvalidSettings(
                "virtual_machines.hostname_prefix が空です".to_string(),
            ));
        }
        if self.resource_group.is_empty() {
            return Err(ConfigError::InvalidSettings(
                "virtual_machines.resource_group が空です".to_string(),
            ));
        }
        if self.vm_count == 0 {
            return Err(ConfigError::InvalidSettings(
                "virtual_machines.vm_count は 1 以上である必要があります".to_string(),
            ));
        }
        if let Some(ips) = &self.private_ips {
            if ips.len() != self.vm_count as usize {
                return Err(ConfigError::InvalidSettings(format!(
                    "private_ips の数 ({}) が vm_count ({}) と一致しません",
                    ips.len(),
                    self.vm_count
                )));
            }
        }
        for (name, rule) in &self.network_security.inbound {
            if rule.source_address_prefix.is_empty() {
                return Err(ConfigError::InvalidSettings(format!(
                    "inbound ルール '{}' に source_address_prefix がありません",
                    name
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualNetworkSettings {
    pub name: String,

    pub address_space: String,

    pub subnet_name: String,

    pub subnet_address_prefix: String,

    /// Reuse the virtual network and subnet when they already exist
    #[serde(default)]
    pub existing_ok: bool,

    /// Create the virtual network and subnet when they are missing
    #[serde(default = "default_true")]
    pub create_nonexistent: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkSecuritySettings {
    /// Inbound rules by name
    #[serde(default)]
    pub inbound: BTreeMap<String, InboundNetworkSecurityRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundNetworkSecurityRule {
    pub destination_port_range: PortRange,

    pub source_address_prefix: Vec<String>,

    /// tcp, udp or *
    pub protocol: String,
}

/// A single port (`22`) or a range (`"8000-8100"`, `"*"`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortRange {
    Port(u16),
    Range(String),
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortRange::Port(port) => write!(f, "{}", port),
            PortRange::Range(range) => write!(f, "{}", range),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicIpSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(rename = "static", default)]
    pub static_ip: bool,
}

impl Default for PublicIpSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            static_ip: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSettings {
    #[serde(default = "default_username")]
    pub username: String,

    /// Path to an OpenSSH public key file
    #[serde(default)]
    pub ssh_public_key: Option<PathBuf>,

    /// Inline public key, takes precedence over the file
    #[serde(default)]
    pub ssh_public_key_data: Option<String>,
}

fn default_username() -> String {
    "shipyard".to_string()
}

impl SshSettings {
    pub fn public_key_data(&self) -> Result<String> {
        if let Some(data) = &self.ssh_public_key_data {
            return Ok(data.trim().to_string());
        }
        match &self.ssh_public_key {
            Some(path) => Ok(std::fs::read_to_string(path)?.trim().to_string()),
            None => Err(ConfigError::InvalidSettings(
                "ssh.ssh_public_key または ssh.ssh_public_key_data を指定してください".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSettings {
    pub publisher: String,
    pub offer: String,
    pub sku: String,
    pub version: String,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            publisher: "Canonical".to_string(),
            offer: "UbuntuServer".to_string(),
            sku: "18.04-LTS".to_string(),
            version: "latest".to_string(),
        }
    }
}
