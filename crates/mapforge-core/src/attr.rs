//! Loosely-typed attribute values attached to discovered resources.
//!
//! Platform parsers hand the engine arbitrary nested data (maps, sequences,
//! scalars) scraped from cluster or cloud APIs. Match predicates then walk
//! that data by dotted path. `AttributeValue` is the variant tree holding it,
//! with one extra variant the generic YAML/JSON value types cannot express:
//! a non-owning back-reference to another discovered [`Resource`], so that a
//! workload can point at its namespace and a predicate path can hop through
//! the reference.
//!
//! # Path resolution
//!
//! [`AttributeValue::resolve`] walks a pre-split path and returns every value
//! reachable through it:
//!
//! - a map consumes one component by key lookup;
//! - a sequence fans the *same* components out over every element (a path
//!   matches a list if it matches any element);
//! - a resource reference consumes one component against the referenced
//!   resource (`name` and `qualifiedName` are built-in, everything else is an
//!   attribute lookup);
//! - a scalar is a terminal: it resolves only when no components remain.
//!   Strings are never traversed as sequences of characters.
//!
//! A path that runs out of structure before running out of components
//! resolves to nothing.

use std::collections::BTreeMap;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::resource::ResourceRef;

/// A single value in a resource attribute bag or template variable map.
#[derive(Debug, Clone)]
pub enum AttributeValue {
    /// Explicit null (YAML `~`).
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Integer(i64),
    /// Floating-point scalar.
    Float(f64),
    /// String scalar.
    String(String),
    /// Ordered sequence of values.
    Sequence(Vec<AttributeValue>),
    /// String-keyed mapping.
    Map(BTreeMap<String, AttributeValue>),
    /// Back-reference to another discovered resource. Non-owning in spirit:
    /// the registry keeps every resource alive for the run, this `Arc` just
    /// shares it.
    Resource(ResourceRef),
}

impl AttributeValue {
    /// Whether this value is `Null`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrow the string payload, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Render this value as the text a match predicate compares against.
    ///
    /// Scalars stringify, a resource reference contributes its short name,
    /// and structured values (and null) have no match text.
    #[must_use]
    pub fn as_match_string(&self) -> Option<String> {
        match self {
            Self::Bool(b) => Some(b.to_string()),
            Self::Integer(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::String(s) => Some(s.clone()),
            Self::Resource(r) => Some(r.name().to_string()),
            Self::Null | Self::Sequence(_) | Self::Map(_) => None,
        }
    }

    /// Resolve a pre-split dotted path against this value.
    ///
    /// Returns every reachable value, cloned. An empty result means the path
    /// could not be fully resolved.
    #[must_use]
    pub fn resolve(&self, components: &[&str]) -> Vec<AttributeValue> {
        let Some((head, rest)) = components.split_first() else {
            return vec![self.clone()];
        };
        match self {
            Self::Map(map) => map
                .get(*head)
                .map(|value| value.resolve(rest))
                .unwrap_or_default(),
            // The whole remaining path applies to each element.
            Self::Sequence(items) => items
                .iter()
                .flat_map(|item| item.resolve(components))
                .collect(),
            Self::Resource(resource) => match *head {
                "name" => Self::String(resource.name().to_string()).resolve(rest),
                "qualifiedName" | "qualified_name" => {
                    Self::String(resource.qualified_name().to_string()).resolve(rest)
                }
                _ => resource
                    .attribute(head)
                    .map(|value| value.resolve(rest))
                    .unwrap_or_default(),
            },
            Self::Null | Self::Bool(_) | Self::Integer(_) | Self::Float(_) | Self::String(_) => {
                Vec::new()
            }
        }
    }

    /// Convert a parsed YAML value into an attribute value.
    ///
    /// Non-string mapping keys are dropped; predicates address attributes by
    /// string key only.
    #[must_use]
    pub fn from_yaml(value: &serde_yaml::Value) -> Self {
        match value {
            serde_yaml::Value::Null => Self::Null,
            serde_yaml::Value::Bool(b) => Self::Bool(*b),
            serde_yaml::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Integer(i)
                } else {
                    n.as_f64().map_or(Self::Null, Self::Float)
                }
            }
            serde_yaml::Value::String(s) => Self::String(s.clone()),
            serde_yaml::Value::Sequence(items) => {
                Self::Sequence(items.iter().map(Self::from_yaml).collect())
            }
            serde_yaml::Value::Mapping(map) => Self::Map(
                map.iter()
                    .filter_map(|(key, value)| {
                        key.as_str()
                            .map(|k| (k.to_string(), Self::from_yaml(value)))
                    })
                    .collect(),
            ),
            serde_yaml::Value::Tagged(tagged) => Self::from_yaml(&tagged.value),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

/// Resource references serialize as their qualified name; everything else
/// serializes structurally. Downstream renderers consume variable maps in
/// this form.
impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Integer(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::String(s) => serializer.serialize_str(s),
            Self::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
            Self::Resource(resource) => serializer.serialize_str(resource.qualified_name()),
        }
    }
}

/// Split a dotted or slashed path into its components.
///
/// Empty components (doubled separators, leading/trailing separators) are
/// dropped.
#[must_use]
pub fn split_path(path: &str) -> Vec<&str> {
    path.split(['.', '/'])
        .filter(|component| !component.is_empty())
        .collect()
}
