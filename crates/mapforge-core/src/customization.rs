//! Map customization: user-supplied rules that assign artifacts to groups
//! and record relationship edges between artifacts and groups.
//!
//! Customization runs after final names are assigned. Rules are ordered and
//! first-match-wins per artifact. A trailing cleanup pass removes any
//! relationship whose subject or object does not correspond to a retained
//! artifact or group, since artifacts can be dropped after matching.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::engine::SlxInfo;
use crate::rules::RuleConfigError;

/// Directional relationship verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationshipVerb {
    /// The subject depends on the object.
    DependentOn,
    /// The subject is a dependency of the object.
    DependencyOf,
}

/// A named group of artifacts.
#[derive(Debug, Clone, Serialize)]
pub struct Group {
    /// Group name.
    pub name: String,
    /// Final names of member artifacts.
    pub members: BTreeSet<String>,
}

/// A resolved subject/verb/object relationship edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationshipEdge {
    /// Subject artifact or group name.
    pub subject: String,
    /// Edge direction.
    pub verb: RelationshipVerb,
    /// Object artifact or group name.
    pub object: String,
}

/// Pattern match over an artifact's identity.
///
/// All present patterns must match (AND); at least one must be present.
#[derive(Debug, Clone)]
struct SlxMatcher {
    name: Option<Regex>,
    base_name: Option<Regex>,
    qualifier: Option<Regex>,
}

impl SlxMatcher {
    fn matches(&self, slx: &SlxInfo) -> bool {
        if let Some(regex) = &self.name {
            if !regex.is_match(&slx.final_name) {
                return false;
            }
        }
        if let Some(regex) = &self.base_name {
            if !regex.is_match(&slx.spec.base_name) {
                return false;
            }
        }
        if let Some(regex) = &self.qualifier {
            if !slx.qualifier_values.iter().any(|value| regex.is_match(value)) {
                return false;
            }
        }
        true
    }
}

/// Assigns matching artifacts to a group.
#[derive(Debug, Clone)]
pub struct GroupRule {
    matcher: SlxMatcher,
    group: String,
}

/// Records an edge from a fixed subject to every matching artifact.
#[derive(Debug, Clone)]
pub struct SlxRelationshipRule {
    matcher: SlxMatcher,
    subject: String,
    verb: RelationshipVerb,
}

/// Records an edge from a fixed subject to every matching group.
#[derive(Debug, Clone)]
pub struct GroupRelationshipRule {
    group_pattern: Regex,
    subject: String,
    verb: RelationshipVerb,
}

/// A parsed map customization document.
#[derive(Debug, Clone, Default)]
pub struct MapCustomizationRules {
    /// Group rules, first match wins per artifact.
    group_rules: Vec<GroupRule>,
    /// Artifact relationship rules, first match wins per artifact.
    slx_relationship_rules: Vec<SlxRelationshipRule>,
    /// Group relationship rules, first match wins per group.
    group_relationship_rules: Vec<GroupRelationshipRule>,
}

impl MapCustomizationRules {
    /// Assign groups and relationship edges for finalized artifacts.
    ///
    /// The returned edges have already been through the cleanup pass: both
    /// endpoints refer to a retained artifact or group.
    #[must_use]
    pub fn apply(&self, slxs: &[SlxInfo]) -> (BTreeMap<String, Group>, Vec<RelationshipEdge>) {
        let mut groups: BTreeMap<String, Group> = BTreeMap::new();
        for slx in slxs {
            if let Some(rule) = self.group_rules.iter().find(|rule| rule.matcher.matches(slx)) {
                groups
                    .entry(rule.group.clone())
                    .or_insert_with(|| Group {
                        name: rule.group.clone(),
                        members: BTreeSet::new(),
                    })
                    .members
                    .insert(slx.final_name.clone());
            }
        }

        let mut edges = Vec::new();
        for slx in slxs {
            if let Some(rule) = self
                .slx_relationship_rules
                .iter()
                .find(|rule| rule.matcher.matches(slx))
            {
                edges.push(RelationshipEdge {
                    subject: rule.subject.clone(),
                    verb: rule.verb,
                    object: slx.final_name.clone(),
                });
            }
        }
        for group_name in groups.keys() {
            if let Some(rule) = self
                .group_relationship_rules
                .iter()
                .find(|rule| rule.group_pattern.is_match(group_name))
            {
                edges.push(RelationshipEdge {
                    subject: rule.subject.clone(),
                    verb: rule.verb,
                    object: group_name.clone(),
                });
            }
        }

        // Cleanup: drop edges pointing at nothing we retained.
        let mut retained: BTreeSet<&str> =
            slxs.iter().map(|slx| slx.final_name.as_str()).collect();
        retained.extend(groups.keys().map(String::as_str));
        edges.retain(|edge| {
            retained.contains(edge.subject.as_str()) && retained.contains(edge.object.as_str())
        });

        (groups, edges)
    }
}

/// Parse a map customization document from YAML text.
///
/// # Errors
///
/// Returns a [`RuleConfigError`] for malformed YAML, an empty matcher, or
/// an invalid pattern.
pub fn parse_customization_document(yaml: &str) -> Result<MapCustomizationRules, RuleConfigError> {
    let config: CustomizationConfig =
        serde_yaml::from_str(yaml).map_err(|e| RuleConfigError::Document {
            reason: e.to_string(),
        })?;
    config.build()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomizationConfig {
    #[serde(default = "default_verb")]
    default_verb: RelationshipVerb,
    #[serde(default)]
    group_rules: Vec<GroupRuleConfig>,
    #[serde(default)]
    slx_relationship_rules: Vec<RelationshipRuleConfig>,
    #[serde(default)]
    group_relationship_rules: Vec<GroupRelationshipRuleConfig>,
}

fn default_verb() -> RelationshipVerb {
    RelationshipVerb::DependentOn
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlxMatcherConfig {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    base_name: Option<String>,
    #[serde(default)]
    qualifier: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupRuleConfig {
    #[serde(rename = "match")]
    matcher: SlxMatcherConfig,
    group: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelationshipRuleConfig {
    #[serde(rename = "match")]
    matcher: SlxMatcherConfig,
    subject: String,
    #[serde(default)]
    verb: Option<RelationshipVerb>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupRelationshipRuleConfig {
    group: String,
    subject: String,
    #[serde(default)]
    verb: Option<RelationshipVerb>,
}

impl CustomizationConfig {
    fn build(self) -> Result<MapCustomizationRules, RuleConfigError> {
        let default_verb = self.default_verb;
        Ok(MapCustomizationRules {
            group_rules: self
                .group_rules
                .into_iter()
                .map(|rule| {
                    Ok(GroupRule {
                        matcher: build_matcher(rule.matcher)?,
                        group: rule.group,
                    })
                })
                .collect::<Result<_, RuleConfigError>>()?,
            slx_relationship_rules: self
                .slx_relationship_rules
                .into_iter()
                .map(|rule| {
                    Ok(SlxRelationshipRule {
                        matcher: build_matcher(rule.matcher)?,
                        subject: rule.subject,
                        verb: rule.verb.unwrap_or(default_verb),
                    })
                })
                .collect::<Result<_, RuleConfigError>>()?,
            group_relationship_rules: self
                .group_relationship_rules
                .into_iter()
                .map(|rule| {
                    Ok(GroupRelationshipRule {
                        group_pattern: compile_pattern(&rule.group)?,
                        subject: rule.subject,
                        verb: rule.verb.unwrap_or(default_verb),
                    })
                })
                .collect::<Result<_, RuleConfigError>>()?,
        })
    }
}

fn build_matcher(config: SlxMatcherConfig) -> Result<SlxMatcher, RuleConfigError> {
    if config.name.is_none() && config.base_name.is_none() && config.qualifier.is_none() {
        return Err(RuleConfigError::MissingField {
            kind: "match".to_string(),
            field: "name|baseName|qualifier".to_string(),
        });
    }
    Ok(SlxMatcher {
        name: config.name.as_deref().map(compile_pattern).transpose()?,
        base_name: config.base_name.as_deref().map(compile_pattern).transpose()?,
        qualifier: config.qualifier.as_deref().map(compile_pattern).transpose()?,
    })
}

fn compile_pattern(pattern: &str) -> Result<Regex, RuleConfigError> {
    Regex::new(pattern).map_err(|e| RuleConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}
