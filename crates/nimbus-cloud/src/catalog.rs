//! Per-provider resource type tables

use crate::error::{CloudError, Result};
use crate::fanout::ServiceCall;

/// Resource type name that selects every service of a provider
pub const ALL_RESOURCES: &str = "all";

/// Maps a provider's resource type tags to the services they enumerate
#[derive(Debug, Clone, Copy)]
pub struct ResourceCatalog {
    entries: &'static [(&'static str, &'static [ServiceCall])],
}

impl ResourceCatalog {
    pub const fn new(entries: &'static [(&'static str, &'static [ServiceCall])]) -> Self {
        Self { entries }
    }

    /// Services for a resource type; `"all"` is the union in table order
    pub fn services(&self, resource_type: &str) -> Result<Vec<ServiceCall>> {
        if resource_type == ALL_RESOURCES {
            let mut all: Vec<ServiceCall> = Vec::new();
            for (_, services) in self.entries {
                for service in services.iter() {
                    if !all.iter().any(|s| s.key == service.key) {
                        all.push(*service);
                    }
                }
            }
            return Ok(all);
        }

        self.entries
            .iter()
            .find(|(name, _)| *name == resource_type)
            .map(|(_, services)| services.to_vec())
            .ok_or_else(|| CloudError::UnsupportedResourceType(resource_type.to_string()))
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries
            .iter()
            .map(|(name, _)| *name)
            .chain(std::iter::once(ALL_RESOURCES))
    }

    pub fn supports(&self, resource_type: &str) -> bool {
        self.resource_types().any(|t| t == resource_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VMS: ServiceCall = ServiceCall::regional("vms", "VM");
    const USERS: ServiceCall = ServiceCall::global("users", "Users");
    const ROLES: ServiceCall = ServiceCall::global("roles", "Roles");
    const CATALOG: ResourceCatalog =
        ResourceCatalog::new(&[("vm", &[VMS]), ("iam", &[USERS, ROLES]), ("users", &[USERS])]);

    #[test]
    fn test_all_is_deduplicated_union() {
        let keys: Vec<_> = CATALOG
            .services("all")
            .unwrap()
            .into_iter()
            .map(|s| s.key)
            .collect();
        assert_eq!(keys, vec!["vms", "users", "roles"]);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(matches!(
            CATALOG.services("lambda"),
            Err(CloudError::UnsupportedResourceType(t)) if t == "lambda"
        ));
        assert!(CATALOG.supports("all"));
        assert!(!CATALOG.supports("lambda"));
    }
}
