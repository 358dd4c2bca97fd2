//! Flotilla Cloud Core
//!
//! Provider-independent building blocks for provisioning cloud resources
//! through a remote management API whose mutating calls are long-running,
//! poll-based operations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  Flotilla CLI                    │
//! │                 (flotilla up/down)               │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │            flotilla-cloud-azure                  │
//! │   provisioners, ARM client, ARM poller           │
//! └─────────────────┬───────────────────────────────┘
//!                   │ DeferredCall / PendingOperation
//! ┌─────────────────▼───────────────────────────────┐
//! │               flotilla-cloud                     │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │   AsyncOperation (retry engine)           │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │ Resource ids │  │ Exist policy │            │
//! │  └──────────────┘  └──────────────┘            │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use flotilla_cloud::{AsyncOperation, Invocation, OperationOptions};
//!
//! let invocation = Invocation::new("virtual_networks.create_or_update")
//!     .arg("virtual_network_name", "vnet1");
//! let call = client.begin_put(&path, api_version, body, invocation);
//! let mut op: AsyncOperation<VirtualNetwork> =
//!     AsyncOperation::new(call, OperationOptions::new().max_retries(5)).await?;
//! let vnet = op.result().await?;
//! ```

pub mod error;
pub mod invocation;
pub mod operation;
pub mod policy;
pub mod resource_id;

// Re-exports
pub use error::{CloudError, ProviderError, ProviderResult, ResourceIdError, Result};
pub use invocation::{DeferredCall, Invocation};
pub use operation::{
    ALLOCATION_FAILED_MESSAGE, AsyncOperation, FailureKind, MAX_ALLOCATION_FAILURES,
    OperationOptions, PendingHandle, PendingOperation,
};
pub use policy::{Existence, ExistencePolicy, Identified, not_found_as_none};
