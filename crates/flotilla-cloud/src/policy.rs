//! Existence and conflict policy for idempotent provisioning
//!
//! Provisioners look a resource up by its deterministic name before creating
//! it. A 404 means "absent"; any other lookup failure is returned as is.
//! What happens next depends on [`ExistencePolicy`].

use crate::error::{CloudError, ProviderResult, Result};

/// Anything carrying a provider resource id
pub trait Identified {
    fn resource_id(&self) -> &str;
}

/// Outcome of resolving an existence check against a policy
#[derive(Debug, Clone, PartialEq)]
pub enum Existence<T> {
    /// The resource exists and may be used as is
    Reuse(T),
    /// The resource is absent and may be created
    Create,
}

/// Whether an existing resource may be reused and a missing one created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExistencePolicy {
    pub existing_ok: bool,
    pub create_nonexistent: bool,
}

impl ExistencePolicy {
    /// Only ever create; an existing resource is a conflict
    pub const CREATE_ONLY: Self = Self {
        existing_ok: false,
        create_nonexistent: true,
    };

    pub fn new(existing_ok: bool, create_nonexistent: bool) -> Self {
        Self {
            existing_ok,
            create_nonexistent,
        }
    }

    /// Decide what to do with the result of an existence check.
    ///
    /// `description` names the resource in errors, e.g. "virtual network vnet1".
    pub fn resolve<T: Identified>(
        &self,
        description: &str,
        existing: Option<T>,
    ) -> Result<Existence<T>> {
        match existing {
            Some(resource) if self.existing_ok => {
                tracing::debug!("{} already exists: {}", description, resource.resource_id());
                Ok(Existence::Reuse(resource))
            }
            Some(resource) => Err(CloudError::ResourceAlreadyExists(format!(
                "{} ({})",
                description,
                resource.resource_id()
            ))),
            None if self.create_nonexistent => Ok(Existence::Create),
            None => Err(CloudError::PolicyViolation(format!(
                "create_nonexistent setting is false for {}",
                description
            ))),
        }
    }
}

/// Turn a 404 from a lookup into `None`, keeping every other failure
pub fn not_found_as_none<T>(result: ProviderResult<T>) -> ProviderResult<Option<T>> {
    match result {
        Ok(resource) => Ok(Some(resource)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;

    #[derive(Debug, Clone, PartialEq)]
    struct Vnet(String);

    impl Identified for Vnet {
        fn resource_id(&self) -> &str {
            &self.0
        }
    }

    const VNET_ID: &str =
        "/subscriptions/0000/resourceGroups/rg1/providers/Microsoft.Network/virtualNetworks/vnet1";

    #[test]
    fn test_reuse_existing() {
        let policy = ExistencePolicy::new(true, false);
        let existing = Some(Vnet(VNET_ID.to_string()));
        assert_eq!(
            policy.resolve("virtual network vnet1", existing).unwrap(),
            Existence::Reuse(Vnet(VNET_ID.to_string()))
        );
    }

    #[test]
    fn test_existing_without_reuse_is_conflict() {
        let err = ExistencePolicy::CREATE_ONLY
            .resolve("virtual network vnet1", Some(Vnet(VNET_ID.to_string())))
            .unwrap_err();
        match err {
            CloudError::ResourceAlreadyExists(msg) => assert!(msg.contains(VNET_ID)),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_absent_and_creation_allowed() {
        let result = ExistencePolicy::CREATE_ONLY.resolve::<Vnet>("virtual network vnet1", None);
        assert_eq!(result.unwrap(), Existence::Create);
    }

    #[test]
    fn test_absent_and_creation_forbidden() {
        let err = ExistencePolicy::new(true, false)
            .resolve::<Vnet>("virtual network vnet1", None)
            .unwrap_err();
        match err {
            CloudError::PolicyViolation(msg) => assert!(msg.contains("vnet1")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_not_found_as_none() {
        assert_eq!(not_found_as_none(Ok(1)).unwrap(), Some(1));
        assert_eq!(
            not_found_as_none::<i32>(Err(ProviderError::new(404, "missing"))).unwrap(),
            None
        );
        let err = not_found_as_none::<i32>(Err(ProviderError::new(403, "forbidden"))).unwrap_err();
        assert_eq!(err.status_code, Some(403));
    }
}
