//! The capability contract each discovery platform implements.
//!
//! The rule engine never special-cases a platform by name: level-of-detail
//! policy, virtual properties (label/tag expansion), and implicit template
//! variables all flow through [`PlatformHandler`]. Handlers are injected
//! into the engine through a [`HandlerRegistry`] at construction time, so
//! tests can substitute fakes.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::attr::AttributeValue;
use crate::resource::{Resource, ResourceRef};

/// How much generated detail a resource should receive.
///
/// Ordered: an output item gated at `Basic` is emitted for resources
/// resolved to `Basic` or `Detailed`, never for `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelOfDetail {
    /// Generate nothing for this resource.
    None,
    /// Generate the basic artifact set.
    Basic,
    /// Generate everything.
    Detailed,
}

/// Identifies a set of candidate resources on one platform.
///
/// Compared structurally; used as a lookup key against handlers and as a
/// cross-resource join target in match predicates. The optional
/// discriminators carry platform-specific addressing for extensible resource
/// kinds (e.g. group/version/kind for custom Kubernetes resources).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTypeSpec {
    /// Platform the resources live on.
    pub platform: String,
    /// Resource-type name within the platform.
    pub resource_type: String,
    /// Optional API group discriminator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Optional API version discriminator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Optional kind discriminator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ResourceTypeSpec {
    /// Spec with no extra discriminators.
    #[must_use]
    pub fn new(platform: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            resource_type: resource_type.into(),
            group: None,
            version: None,
            kind: None,
        }
    }
}

/// Errors raised by platform handlers while enumerating resources.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HandlerError {
    /// The handler does not serve the requested resource type.
    #[error("platform '{platform}' has no resource type '{resource_type}'")]
    UnknownResourceType {
        /// Platform name.
        platform: String,
        /// The unresolvable resource-type name.
        resource_type: String,
    },
    /// The handler failed internally while enumerating resources.
    #[error("resource enumeration failed: {reason}")]
    Enumeration {
        /// Human-readable failure description.
        reason: String,
    },
}

/// Capability contract for one discovery platform.
///
/// Implementations resolve everything platform-specific about a resource;
/// the engine consumes only this interface.
pub trait PlatformHandler: Send + Sync {
    /// Candidate resources for a resource-type spec.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerError`] when the spec cannot be served; the engine
    /// records it as a per-rule warning and moves on.
    fn get_resources(&self, spec: &ResourceTypeSpec) -> Result<Vec<ResourceRef>, HandlerError>;

    /// Level of detail the platform assigns to a resource.
    fn get_level_of_detail(&self, resource: &Resource) -> LevelOfDetail;

    /// Values of a platform-special virtual property (e.g. expanded
    /// label/tag key-value pairs). `None` means the property is not special
    /// on this platform and the caller should fall back to attribute-path
    /// resolution.
    fn get_property_values(&self, resource: &Resource, property: &str) -> Option<Vec<String>>;

    /// Implicit variables always available to templates for this resource
    /// (e.g. cluster and namespace names).
    fn get_standard_template_variables(
        &self,
        resource: &Resource,
    ) -> BTreeMap<String, AttributeValue>;

    /// Resolve a special-cased variable name without template evaluation.
    /// `None` means the name is not special on this platform.
    fn resolve_template_variable_value(
        &self,
        resource: &Resource,
        name: &str,
    ) -> Option<AttributeValue>;
}

/// Platform handlers keyed by platform name.
///
/// Built once before evaluation; the engine holds it immutably afterwards.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Arc<dyn PlatformHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a platform, replacing any previous one.
    pub fn register(&mut self, platform: impl Into<String>, handler: Arc<dyn PlatformHandler>) {
        self.handlers.insert(platform.into(), handler);
    }

    /// Handler for a platform, if registered.
    #[must_use]
    pub fn get(&self, platform: &str) -> Option<Arc<dyn PlatformHandler>> {
        self.handlers.get(platform).map(Arc::clone)
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("platforms", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_of_detail_ordering() {
        assert!(LevelOfDetail::None < LevelOfDetail::Basic);
        assert!(LevelOfDetail::Basic < LevelOfDetail::Detailed);
    }

    #[test]
    fn test_level_of_detail_serde_lowercase() {
        let lod: LevelOfDetail = serde_yaml::from_str("detailed").unwrap();
        assert_eq!(lod, LevelOfDetail::Detailed);
        assert_eq!(serde_yaml::to_string(&LevelOfDetail::None).unwrap().trim(), "none");
    }

    #[test]
    fn test_resource_type_spec_structural_equality() {
        let a = ResourceTypeSpec::new("kubernetes", "namespace");
        let b = ResourceTypeSpec::new("kubernetes", "namespace");
        let mut c = ResourceTypeSpec::new("kubernetes", "namespace");
        c.kind = Some("Namespace".to_string());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
