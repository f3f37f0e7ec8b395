//! Composable match predicates evaluated against a candidate resource.
//!
//! Evaluation is a recursive tree walk with no side effects except writes to
//! the variable bag: a property match with an explicit resource type binds
//! the matched resource into the bag (a cross-resource join), and later
//! `custom-variable` predicates can condition on what was bound.
//!
//! Vacuous truth follows boolean convention: `and` over no children is
//! true, `or` over no children is false.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Deserialize;

use super::{MatchRuleConfig, RuleConfigError};
use crate::attr::{AttributeValue, split_path};
use crate::platform::{HandlerRegistry, PlatformHandler, ResourceTypeSpec};
use crate::resource::{ResourceRef, ResourceRegistry};

/// How a pattern is applied to a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Anchored match: the pattern must cover the whole value.
    #[default]
    Exact,
    /// Unanchored search anywhere in the value.
    Substring,
}

/// Everything a predicate can see during evaluation.
pub struct MatchContext<'a> {
    /// The candidate resource being matched.
    pub resource: ResourceRef,
    /// Mutable variable bag, seeded per resource and grown by joins.
    pub variables: &'a mut BTreeMap<String, AttributeValue>,
    /// Point-in-time registry snapshot for cross-resource joins.
    pub registry: &'a ResourceRegistry,
    /// Platform handlers for virtual-property resolution.
    pub handlers: &'a HandlerRegistry,
}

/// A node in the match-predicate tree. Immutable after construction.
#[derive(Debug, Clone)]
pub enum MatchPredicate {
    /// True when every child matches; short-circuits on the first miss.
    And(Vec<MatchPredicate>),
    /// True when any child matches; short-circuits on the first hit.
    Or(Vec<MatchPredicate>),
    /// Inverts its single child.
    Not(Box<MatchPredicate>),
    /// Regex over a named resource property.
    ResourceProperty(ResourcePropertyMatcher),
    /// True when a dotted path resolves in the resource's attributes.
    PathExists(PathExistsMatcher),
    /// Regex over a value from the variable bag.
    CustomVariable(CustomVariableMatcher),
}

/// Regex match against one or more properties of a resource.
#[derive(Debug, Clone)]
pub struct ResourcePropertyMatcher {
    properties: Vec<String>,
    regex: Regex,
    /// When set, the match runs over every resource of this type instead of
    /// the candidate, binding the first hit into the variable bag.
    resource_type: Option<ResourceTypeSpec>,
}

/// Existence test for a dotted attribute path.
#[derive(Debug, Clone)]
pub struct PathExistsMatcher {
    path: String,
    /// When set, a resolvable-but-null value still counts as present.
    match_empty: bool,
}

/// Regex match against a value resolved from the variable bag.
#[derive(Debug, Clone)]
pub struct CustomVariableMatcher {
    name: String,
    regex: Regex,
}

impl MatchPredicate {
    /// Combine declared match rules with an implicit AND.
    ///
    /// # Errors
    ///
    /// Returns a [`RuleConfigError`] for an unknown discriminator, a
    /// missing field, or an invalid pattern anywhere in the tree.
    pub(crate) fn all_of(
        configs: &[MatchRuleConfig],
        default_platform: Option<&str>,
    ) -> Result<Self, RuleConfigError> {
        let mut children = configs
            .iter()
            .map(|config| Self::from_config(config, default_platform))
            .collect::<Result<Vec<_>, _>>()?;
        if children.len() == 1 {
            Ok(children.remove(0))
        } else {
            Ok(Self::And(children))
        }
    }

    /// Build one predicate node from its raw configuration.
    pub(crate) fn from_config(
        config: &MatchRuleConfig,
        default_platform: Option<&str>,
    ) -> Result<Self, RuleConfigError> {
        let children = || -> Result<Vec<Self>, RuleConfigError> {
            config
                .matches
                .iter()
                .map(|child| Self::from_config(child, default_platform))
                .collect()
        };
        match config.kind.as_str() {
            "and" => Ok(Self::And(children()?)),
            "or" => Ok(Self::Or(children()?)),
            "not" => {
                let mut children = children()?;
                if children.len() != 1 {
                    return Err(RuleConfigError::NotArity {
                        count: children.len(),
                    });
                }
                Ok(Self::Not(Box::new(children.remove(0))))
            }
            "pattern" => {
                let pattern = require(&config.kind, "pattern", config.pattern.as_deref())?;
                let regex = compile(pattern, config.mode.unwrap_or_default())?;
                let resource_type = match &config.resource_type {
                    Some(entry) => Some(entry.rebuild(default_platform)?),
                    None => None,
                };
                let properties = if config.properties.is_empty() {
                    vec!["name".to_string()]
                } else {
                    config.properties.clone()
                };
                Ok(Self::ResourceProperty(ResourcePropertyMatcher {
                    properties,
                    regex,
                    resource_type,
                }))
            }
            "path-exists" => {
                let path = require(&config.kind, "path", config.path.as_deref())?;
                Ok(Self::PathExists(PathExistsMatcher {
                    path: path.to_string(),
                    match_empty: config.match_empty,
                }))
            }
            "custom-variable" => {
                let name = require(&config.kind, "name", config.name.as_deref())?;
                let pattern = require(&config.kind, "pattern", config.pattern.as_deref())?;
                Ok(Self::CustomVariable(CustomVariableMatcher {
                    name: name.to_string(),
                    regex: compile(pattern, config.mode.unwrap_or_default())?,
                }))
            }
            other => Err(RuleConfigError::UnknownMatchRuleKind {
                kind: other.to_string(),
            }),
        }
    }

    /// Evaluate this predicate against the context's candidate resource.
    pub fn evaluate(&self, ctx: &mut MatchContext<'_>) -> bool {
        match self {
            Self::And(children) => children.iter().all(|child| child.evaluate(ctx)),
            Self::Or(children) => children.iter().any(|child| child.evaluate(ctx)),
            Self::Not(child) => !child.evaluate(ctx),
            Self::ResourceProperty(matcher) => matcher.evaluate(ctx),
            Self::PathExists(matcher) => matcher.evaluate(ctx),
            Self::CustomVariable(matcher) => matcher.evaluate(ctx),
        }
    }
}

impl ResourcePropertyMatcher {
    fn evaluate(&self, ctx: &mut MatchContext<'_>) -> bool {
        if let Some(spec) = &self.resource_type {
            // Cross-resource join: any resource of the named type may
            // satisfy the match, and the first hit is bound into the
            // variable bag under the resource-type name.
            let candidates = ctx
                .registry
                .resources_of_type(&spec.platform, &spec.resource_type)
                .unwrap_or_default();
            for candidate in candidates {
                if self.matches_resource(&candidate, ctx.handlers) {
                    ctx.variables.insert(
                        spec.resource_type.clone(),
                        AttributeValue::Resource(candidate),
                    );
                    return true;
                }
            }
            return false;
        }
        let resource = ctx.resource.clone();
        self.matches_resource(&resource, ctx.handlers)
    }

    fn matches_resource(&self, resource: &ResourceRef, handlers: &HandlerRegistry) -> bool {
        let handler = handlers.get(resource.platform());
        self.properties.iter().any(|property| {
            property_values(resource, property, handler.as_deref())
                .iter()
                .any(|value| self.regex.is_match(value))
        })
    }
}

/// Values of a named property: the built-in `name`, then any
/// platform-special property, then attribute-path fallback.
fn property_values(
    resource: &ResourceRef,
    property: &str,
    handler: Option<&dyn PlatformHandler>,
) -> Vec<String> {
    if property == "name" {
        return vec![resource.name().to_string()];
    }
    if let Some(handler) = handler {
        if let Some(values) = handler.get_property_values(resource, property) {
            return values;
        }
    }
    resource
        .resolve_path(property)
        .iter()
        .filter_map(AttributeValue::as_match_string)
        .collect()
}

impl PathExistsMatcher {
    fn evaluate(&self, ctx: &MatchContext<'_>) -> bool {
        let resolved = ctx.resource.resolve_path(&self.path);
        if self.match_empty {
            !resolved.is_empty()
        } else {
            resolved.iter().any(|value| !value.is_null())
        }
    }
}

impl CustomVariableMatcher {
    fn evaluate(&self, ctx: &MatchContext<'_>) -> bool {
        let components = split_path(&self.name);
        let Some((head, rest)) = components.split_first() else {
            return false;
        };
        let Some(root) = ctx.variables.get(*head) else {
            return false;
        };
        root.resolve(rest)
            .iter()
            .filter_map(AttributeValue::as_match_string)
            .any(|value| self.regex.is_match(&value))
    }
}

fn require<'a>(
    kind: &str,
    field: &str,
    value: Option<&'a str>,
) -> Result<&'a str, RuleConfigError> {
    value.ok_or_else(|| RuleConfigError::MissingField {
        kind: kind.to_string(),
        field: field.to_string(),
    })
}

fn compile(pattern: &str, mode: MatchMode) -> Result<Regex, RuleConfigError> {
    let source = match mode {
        MatchMode::Exact => format!("^(?:{pattern})$"),
        MatchMode::Substring => pattern.to_string(),
    };
    Regex::new(&source).map_err(|e| RuleConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}
