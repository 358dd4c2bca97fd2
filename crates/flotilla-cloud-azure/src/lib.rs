//! Azure provider for Flotilla
//!
//! Talks to Azure Resource Manager over REST and drives every long-running
//! write through [`flotilla_cloud::AsyncOperation`], so transient failures,
//! throttling and allocation failures are retried uniformly.
//!
//! # Requirements
//!
//! - An already-issued bearer token: `credentials.access_token` in the
//!   settings or `AZURE_ACCESS_TOKEN`
//! - A subscription: `credentials.subscription_id` or `AZURE_SUBSCRIPTION_ID`
//!
//! # Example
//!
//! ```ignore
//! use flotilla_cloud_azure::{ArmClient, AzureConfig, deploy, operation_options_from_settings};
//!
//! let settings = flotilla_config::load_settings(&path)?;
//! let client = ArmClient::new(AzureConfig::from_settings(&settings)?)?
//!     .with_operation_options(operation_options_from_settings(&settings)?);
//!
//! let key = settings.virtual_machines.ssh.public_key_data()?;
//! let vms = deploy::provision_virtual_machines(&client, &settings.virtual_machines, &key).await?;
//! ```

pub mod client;
pub mod compute;
pub mod deploy;
pub mod error;
pub mod models;
pub mod network;
pub mod poller;

pub use client::{ArmClient, AzureConfig, DEFAULT_MANAGEMENT_ENDPOINT, operation_options_from_settings};
pub use deploy::{TeardownSummary, VirtualMachineSummary};
pub use error::{AzureError, Result};
pub use poller::{ArmCall, ArmPoller};
