//! Discovered resources and the in-memory catalog that holds them.
//!
//! Discovery populates the [`ResourceRegistry`] during its own phase; rule
//! evaluation then reads it as a point-in-time snapshot. Resources live for
//! the whole run and are never individually destroyed, so attribute bags may
//! freely hold back-references to other resources.

mod registry;

pub use registry::{RegistryError, ResourceRegistry};

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::attr::{AttributeValue, split_path};

/// Shared handle to a discovered resource.
///
/// Registry upserts merge into the existing instance, so a handle taken
/// before a re-discovery pass keeps observing the merged attributes.
pub type ResourceRef = Arc<Resource>;

/// A single discovered resource.
///
/// The short `name` is not unique; the `qualified_name` is unique within its
/// `(platform, resource_type)` scope. Everything the platform parser scraped
/// beyond the identity fields lives in the attribute bag.
#[derive(Debug)]
pub struct Resource {
    name: String,
    qualified_name: String,
    platform: String,
    resource_type: String,
    attributes: RwLock<BTreeMap<String, AttributeValue>>,
}

impl Resource {
    pub(crate) fn new(
        platform: impl Into<String>,
        resource_type: impl Into<String>,
        name: impl Into<String>,
        qualified_name: impl Into<String>,
        attributes: BTreeMap<String, AttributeValue>,
    ) -> Self {
        Self {
            name: name.into(),
            qualified_name: qualified_name.into(),
            platform: platform.into(),
            resource_type: resource_type.into(),
            attributes: RwLock::new(attributes),
        }
    }

    /// Short name of the resource (e.g. a workload name).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Globally-unique name within the `(platform, resource_type)` scope.
    #[must_use]
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    /// Name of the platform this resource was discovered on.
    #[must_use]
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Name of the resource type within the platform.
    #[must_use]
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Look up a single top-level attribute, cloned out of the bag.
    ///
    /// Returns `None` when the attribute is absent or the bag lock is
    /// poisoned; predicate evaluation treats both as "no value".
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<AttributeValue> {
        self.attributes.read().ok()?.get(key).cloned()
    }

    /// Snapshot of the full attribute bag.
    #[must_use]
    pub fn attributes(&self) -> BTreeMap<String, AttributeValue> {
        self.attributes
            .read()
            .map(|bag| bag.clone())
            .unwrap_or_default()
    }

    /// Merge new attributes into the bag, overwriting existing keys.
    pub(crate) fn merge_attributes(&self, new: BTreeMap<String, AttributeValue>) {
        if let Ok(mut bag) = self.attributes.write() {
            bag.extend(new);
        }
    }

    /// Resolve a dotted/slashed path against this resource.
    ///
    /// The first component is matched against the built-in `name` and
    /// `qualifiedName` fields before falling through to the attribute bag;
    /// the rest of the walk follows [`AttributeValue::resolve`] semantics.
    #[must_use]
    pub fn resolve_path(&self, path: &str) -> Vec<AttributeValue> {
        let components = split_path(path);
        let Some((head, rest)) = components.split_first() else {
            return Vec::new();
        };
        match *head {
            "name" => AttributeValue::String(self.name.clone()).resolve(rest),
            "qualifiedName" | "qualified_name" => {
                AttributeValue::String(self.qualified_name.clone()).resolve(rest)
            }
            _ => self
                .attribute(head)
                .map(|value| value.resolve(rest))
                .unwrap_or_default(),
        }
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
    fn test_resolve_path_builtin_name() {
        let resource = Resource::new("kubernetes", "namespace", "ns-a", "cluster/ns-a", attrs("{}"));
        let found = resource.resolve_path("name");
        assert_eq!(found[0].as_str(), Some("ns-a"));
    }

    #[test]
    fn test_resolve_path_through_back_reference() {
        let namespace = Arc::new(Resource::new(
            "kubernetes",
            "namespace",
            "ns-a",
            "cluster/ns-a",
            attrs("labels:\n  team: payments\n"),
        ));
        let mut bag = attrs("{}");
        bag.insert("namespace".to_string(), AttributeValue::Resource(namespace));
        let workload = Resource::new("kubernetes", "deployment", "api", "cluster/ns-a/api", bag);

        let found = workload.resolve_path("namespace.labels.team");
        assert_eq!(found[0].as_str(), Some("payments"));
        let names = workload.resolve_path("namespace.name");
        assert_eq!(names[0].as_str(), Some("ns-a"));
    }

    #[test]
    fn test_merge_overwrites_and_extends() {
        let resource = Resource::new(
            "kubernetes",
            "namespace",
            "ns-a",
            "cluster/ns-a",
            attrs("phase: Pending\n"),
        );
        resource.merge_attributes(attrs("phase: Active\nowner: core\n"));
        assert_eq!(
            resource.attribute("phase").unwrap().as_str(),
            Some("Active")
        );
        assert_eq!(resource.attribute("owner").unwrap().as_str(), Some("core"));
    }
}
