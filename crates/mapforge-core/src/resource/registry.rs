//! In-memory resource catalog, grouped by platform and resource type.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use super::{Resource, ResourceRef};
use crate::attr::AttributeValue;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// The registry lock was poisoned by a panicking writer.
    #[error("resource registry lock poisoned")]
    LockPoisoned,
}

/// One platform's slice of the catalog: resource-type name to resources,
/// resources keyed by qualified name.
type PlatformCatalog = BTreeMap<String, BTreeMap<String, ResourceRef>>;

/// In-memory catalog of discovered resources.
///
/// A run starts from an empty registry; there is no deletion or versioning.
/// The internal lock exists so that per-platform discovery writers may run
/// in parallel before evaluation starts. Evaluation itself only reads.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    platforms: RwLock<BTreeMap<String, PlatformCatalog>>,
}

impl ResourceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a resource.
    ///
    /// Idempotent upsert: if the qualified name already exists for the
    /// `(platform, type_name)` pair, the given attributes are merged into
    /// the existing instance and the existing handle is returned, so
    /// back-references held elsewhere stay valid. The platform and resource
    /// type entries are created lazily on first insertion.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LockPoisoned`] if a previous writer panicked.
    pub fn add_resource(
        &self,
        platform: &str,
        type_name: &str,
        name: &str,
        qualified_name: &str,
        attributes: BTreeMap<String, AttributeValue>,
    ) -> Result<ResourceRef, RegistryError> {
        let mut platforms = self
            .platforms
            .write()
            .map_err(|_| RegistryError::LockPoisoned)?;
        let resources = platforms
            .entry(platform.to_string())
            .or_default()
            .entry(type_name.to_string())
            .or_default();
        if let Some(existing) = resources.get(qualified_name) {
            existing.merge_attributes(attributes);
            return Ok(Arc::clone(existing));
        }
        let resource = Arc::new(Resource::new(
            platform,
            type_name,
            name,
            qualified_name,
            attributes,
        ));
        resources.insert(qualified_name.to_string(), Arc::clone(&resource));
        Ok(resource)
    }

    /// Look up a single resource by qualified name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LockPoisoned`] if a previous writer panicked.
    pub fn lookup_resource(
        &self,
        platform: &str,
        type_name: &str,
        qualified_name: &str,
    ) -> Result<Option<ResourceRef>, RegistryError> {
        let platforms = self
            .platforms
            .read()
            .map_err(|_| RegistryError::LockPoisoned)?;
        Ok(platforms
            .get(platform)
            .and_then(|catalog| catalog.get(type_name))
            .and_then(|resources| resources.get(qualified_name))
            .map(Arc::clone))
    }

    /// Whether the registry holds the given resource type at all.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LockPoisoned`] if a previous writer panicked.
    pub fn has_resource_type(
        &self,
        platform: &str,
        type_name: &str,
    ) -> Result<bool, RegistryError> {
        let platforms = self
            .platforms
            .read()
            .map_err(|_| RegistryError::LockPoisoned)?;
        Ok(platforms
            .get(platform)
            .is_some_and(|catalog| catalog.contains_key(type_name)))
    }

    /// All resources of a type, in qualified-name order.
    ///
    /// Returns an empty list for an unknown platform or type; predicates
    /// treat an unknown type as "no candidates", not an error.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LockPoisoned`] if a previous writer panicked.
    pub fn resources_of_type(
        &self,
        platform: &str,
        type_name: &str,
    ) -> Result<Vec<ResourceRef>, RegistryError> {
        let platforms = self
            .platforms
            .read()
            .map_err(|_| RegistryError::LockPoisoned)?;
        Ok(platforms
            .get(platform)
            .and_then(|catalog| catalog.get(type_name))
            .map(|resources| resources.values().map(Arc::clone).collect())
            .unwrap_or_default())
    }

    /// Names of the platforms that have at least one resource.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LockPoisoned`] if a previous writer panicked.
    pub fn platform_names(&self) -> Result<Vec<String>, RegistryError> {
        let platforms = self
            .platforms
            .read()
            .map_err(|_| RegistryError::LockPoisoned)?;
        Ok(platforms.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(yaml: &str) -> BTreeMap<String, AttributeValue> {
        match AttributeValue::from_yaml(&serde_yaml::from_str(yaml).unwrap()) {
            AttributeValue::Map(map) => map,
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn test_upsert_merges_attributes_into_one_instance() {
        let registry = ResourceRegistry::new();
        let first = registry
            .add_resource("kubernetes", "namespace", "ns-a", "c1/ns-a", attrs("a: 1\n"))
            .unwrap();
        let second = registry
            .add_resource("kubernetes", "namespace", "ns-a", "c1/ns-a", attrs("b: 2\n"))
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.resources_of_type("kubernetes", "namespace").unwrap().len(), 1);
        // Union of both attribute subsets.
        assert!(first.attribute("a").is_some());
        assert!(first.attribute("b").is_some());
    }

    #[test]
    fn test_upsert_keeps_back_references_valid() {
        let registry = ResourceRegistry::new();
        let namespace = registry
            .add_resource("kubernetes", "namespace", "ns-a", "c1/ns-a", attrs("{}"))
            .unwrap();
        let mut bag = BTreeMap::new();
        bag.insert("namespace".to_string(), AttributeValue::Resource(namespace));
        let workload = registry
            .add_resource("kubernetes", "deployment", "api", "c1/ns-a/api", bag)
            .unwrap();

        // Re-discovery of the namespace merges in place.
        registry
            .add_resource("kubernetes", "namespace", "ns-a", "c1/ns-a", attrs("phase: Active\n"))
            .unwrap();
        let phase = workload.resolve_path("namespace.phase");
        assert_eq!(phase[0].as_str(), Some("Active"));
    }

    #[test]
    fn test_lookup_unknown_is_absent_not_error() {
        let registry = ResourceRegistry::new();
        assert!(registry
            .lookup_resource("kubernetes", "namespace", "nope")
            .unwrap()
            .is_none());
        assert!(!registry.has_resource_type("aws", "bucket").unwrap());
        assert!(registry.resources_of_type("aws", "bucket").unwrap().is_empty());
    }
}
