//! Generation rule documents: parsing, validation, and the compiled rule
//! model the evaluator consumes.
//!
//! A rule document is user-supplied YAML naming a platform, optional base
//! variables, and a list of generation rules. Each rule pairs resource-type
//! specs with a match-rule tree, rule-level output items, and SLX specs.
//! Parsing is strict about discriminators: an unknown match-rule type or a
//! missing required field is a [`RuleConfigError`], which callers record as
//! a run warning and skip the offending document.
//!
//! Multiple declared match rules on one generation rule combine with an
//! implicit AND.

mod predicate;

pub use predicate::{MatchContext, MatchMode, MatchPredicate};

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::attr::AttributeValue;
use crate::platform::{LevelOfDetail, ResourceTypeSpec};

/// Errors raised while parsing rule or customization documents.
///
/// Every variant is a user configuration problem: the document is recorded
/// as a run warning and skipped, never fatal to the run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RuleConfigError {
    /// The document is not valid YAML or does not fit the schema.
    #[error("malformed rule document: {reason}")]
    Document {
        /// Parser failure description.
        reason: String,
    },
    /// A match rule used a discriminator this engine does not know.
    #[error("unknown match rule type '{kind}'")]
    UnknownMatchRuleKind {
        /// The offending discriminator value.
        kind: String,
    },
    /// A match rule is missing a field its discriminator requires.
    #[error("match rule '{kind}' is missing required field '{field}'")]
    MissingField {
        /// Match rule discriminator.
        kind: String,
        /// The missing field name.
        field: String,
    },
    /// A regular expression failed to compile.
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern text.
        pattern: String,
        /// Regex compiler diagnostic.
        reason: String,
    },
    /// A `not` rule must wrap exactly one child.
    #[error("match rule 'not' requires exactly one child, got {count}")]
    NotArity {
        /// Number of children declared.
        count: usize,
    },
    /// A resource-type entry named no platform and the document has no
    /// default.
    #[error("resource type '{resource_type}' has no platform and the document declares none")]
    NoPlatform {
        /// The resource-type name.
        resource_type: String,
    },
}

/// A parsed rule document: one per code bundle.
#[derive(Debug, Clone)]
pub struct RuleDocument {
    /// Default platform for resource-type entries that do not name one.
    pub platform: Option<String>,
    /// Base variables seeded into every per-resource variable bag.
    pub variables: BTreeMap<String, AttributeValue>,
    /// The generation rules, evaluated in order.
    pub rules: Vec<GenerationRule>,
}

/// One compiled generation rule.
#[derive(Debug, Clone)]
pub struct GenerationRule {
    /// Resource types to scan for candidates.
    pub resource_types: Vec<ResourceTypeSpec>,
    /// The composed match predicate (implicit AND over declared rules).
    pub predicate: MatchPredicate,
    /// Output items emitted directly on every match.
    pub output_items: Vec<OutputItemSpec>,
    /// Artifact templates instantiated on match.
    pub slxs: Vec<SlxSpec>,
}

/// Declarative template for one output item.
#[derive(Debug, Clone)]
pub struct OutputItemSpec {
    /// Output type (e.g. `slx`, `sli`, `runbook`).
    pub kind: String,
    /// Emit only when this gate is at or below the resolved level of
    /// detail.
    pub level_of_detail: LevelOfDetail,
    /// Output-path template; defaulted by convention when absent.
    pub path: Option<String>,
    /// Template to render at the path; defaulted by convention when absent.
    pub template_name: Option<String>,
}

impl OutputItemSpec {
    /// Template name, defaulting to `{base}-{kind}.yaml`.
    #[must_use]
    pub fn template_name_or_default(&self, base_name: &str) -> String {
        self.template_name
            .clone()
            .unwrap_or_else(|| format!("{base_name}-{}.yaml", self.kind))
    }
}

/// Declarative template for one artifact (SLX).
#[derive(Debug, Clone)]
pub struct SlxSpec {
    /// Base name for generated artifact names.
    pub base_name: String,
    /// Pre-chosen shortened base name; auto-derived when absent.
    pub shortened_base_name: Option<String>,
    /// Ordered qualifier names (e.g. `cluster`, `namespace`, `resource`).
    pub qualifiers: Vec<String>,
    /// Cap on the artifact's level of detail.
    pub level_of_detail: LevelOfDetail,
    /// Output items generated per artifact.
    pub output_items: Vec<OutputItemSpec>,
    /// Extra template-variable expressions resolved per artifact.
    pub template_variables: BTreeMap<String, String>,
}

impl SlxSpec {
    /// Whether this spec aggregates contributing resource names.
    ///
    /// Aggregation happens exactly when the qualifier list excludes the
    /// `resource` dimension: the artifact then fans in every matching
    /// resource instead of existing once per resource.
    #[must_use]
    pub fn aggregates_resources(&self) -> bool {
        !self.qualifiers.iter().any(|q| q == "resource")
    }
}

/// Parse one rule document from YAML text.
///
/// # Errors
///
/// Returns a [`RuleConfigError`] describing the first problem found.
pub fn parse_rule_document(yaml: &str) -> Result<RuleDocument, RuleConfigError> {
    let config: RuleDocumentConfig =
        serde_yaml::from_str(yaml).map_err(|e| RuleConfigError::Document {
            reason: e.to_string(),
        })?;
    config.build()
}

/// Parse a batch of rule documents, skipping malformed ones.
///
/// Parse errors never fail the batch: each becomes a warning string (also
/// logged) and the offending document is dropped.
#[must_use]
pub fn parse_rule_documents(documents: &[&str]) -> (Vec<RuleDocument>, Vec<String>) {
    let mut parsed = Vec::new();
    let mut warnings = Vec::new();
    for (index, text) in documents.iter().enumerate() {
        match parse_rule_document(text) {
            Ok(document) => parsed.push(document),
            Err(error) => {
                let message = format!("skipping rule document {index}: {error}");
                warn!("{message}");
                warnings.push(message);
            }
        }
    }
    (parsed, warnings)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RuleDocumentConfig {
    #[serde(default)]
    platform: Option<String>,
    #[serde(default)]
    variables: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    generation_rules: Vec<GenerationRuleConfig>,
}

impl RuleDocumentConfig {
    fn build(self) -> Result<RuleDocument, RuleConfigError> {
        let platform = self.platform;
        let rules = self
            .generation_rules
            .into_iter()
            .map(|rule| rule.build(platform.as_deref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RuleDocument {
            platform,
            variables: self
                .variables
                .iter()
                .map(|(key, value)| (key.clone(), AttributeValue::from_yaml(value)))
                .collect(),
            rules,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerationRuleConfig {
    #[serde(default)]
    resource_types: Vec<ResourceTypeEntry>,
    #[serde(default)]
    match_rules: Vec<MatchRuleConfig>,
    #[serde(default)]
    output_items: Vec<OutputItemSpecConfig>,
    #[serde(default)]
    slxs: Vec<SlxSpecConfig>,
}

impl GenerationRuleConfig {
    fn build(self, default_platform: Option<&str>) -> Result<GenerationRule, RuleConfigError> {
        let resource_types = self
            .resource_types
            .into_iter()
            .map(|entry| entry.build(default_platform))
            .collect::<Result<Vec<_>, _>>()?;
        let predicate = MatchPredicate::all_of(&self.match_rules, default_platform)?;
        Ok(GenerationRule {
            resource_types,
            predicate,
            output_items: self.output_items.into_iter().map(OutputItemSpecConfig::build).collect(),
            slxs: self.slxs.into_iter().map(SlxSpecConfig::build).collect(),
        })
    }
}

/// A resource-type entry is either a bare type name (platform inherited
/// from the document) or a full spec.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ResourceTypeEntry {
    Name(String),
    Spec(ResourceTypeEntrySpec),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResourceTypeEntrySpec {
    #[serde(default)]
    platform: Option<String>,
    resource_type: String,
    #[serde(default)]
    group: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    kind: Option<String>,
}

impl ResourceTypeEntry {
    /// By-reference variant of [`ResourceTypeEntry::build`] for entries
    /// embedded in match-rule configs.
    pub(crate) fn rebuild(
        &self,
        default_platform: Option<&str>,
    ) -> Result<ResourceTypeSpec, RuleConfigError> {
        match self {
            Self::Name(resource_type) => {
                let platform = default_platform.ok_or_else(|| RuleConfigError::NoPlatform {
                    resource_type: resource_type.clone(),
                })?;
                Ok(ResourceTypeSpec::new(platform, resource_type.clone()))
            }
            Self::Spec(spec) => {
                let platform = spec
                    .platform
                    .as_deref()
                    .or(default_platform)
                    .ok_or_else(|| RuleConfigError::NoPlatform {
                        resource_type: spec.resource_type.clone(),
                    })?;
                Ok(ResourceTypeSpec {
                    platform: platform.to_string(),
                    resource_type: spec.resource_type.clone(),
                    group: spec.group.clone(),
                    version: spec.version.clone(),
                    kind: spec.kind.clone(),
                })
            }
        }
    }

    pub(crate) fn build(
        self,
        default_platform: Option<&str>,
    ) -> Result<ResourceTypeSpec, RuleConfigError> {
        match self {
            Self::Name(resource_type) => {
                let platform =
                    default_platform.ok_or_else(|| RuleConfigError::NoPlatform {
                        resource_type: resource_type.clone(),
                    })?;
                Ok(ResourceTypeSpec::new(platform, resource_type))
            }
            Self::Spec(spec) => {
                let platform = spec
                    .platform
                    .as_deref()
                    .or(default_platform)
                    .ok_or_else(|| RuleConfigError::NoPlatform {
                        resource_type: spec.resource_type.clone(),
                    })?;
                Ok(ResourceTypeSpec {
                    platform: platform.to_string(),
                    resource_type: spec.resource_type,
                    group: spec.group,
                    version: spec.version,
                    kind: spec.kind,
                })
            }
        }
    }
}

/// Raw match rule as it appears in a document. The discriminator is an
/// explicit string; construction into [`MatchPredicate`] validates it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MatchRuleConfig {
    #[serde(rename = "type")]
    pub(crate) kind: String,
    #[serde(default)]
    pub(crate) matches: Vec<MatchRuleConfig>,
    #[serde(default)]
    pub(crate) pattern: Option<String>,
    #[serde(default)]
    pub(crate) properties: Vec<String>,
    #[serde(default)]
    pub(crate) mode: Option<MatchMode>,
    #[serde(default)]
    pub(crate) resource_type: Option<ResourceTypeEntry>,
    #[serde(default)]
    pub(crate) path: Option<String>,
    #[serde(default)]
    pub(crate) match_empty: bool,
    #[serde(default)]
    pub(crate) name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutputItemSpecConfig {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default = "default_output_gate")]
    level_of_detail: LevelOfDetail,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    template_name: Option<String>,
}

// Output items are emitted for basic and detailed resources unless the rule
// says otherwise; `none` resources get nothing.
fn default_output_gate() -> LevelOfDetail {
    LevelOfDetail::Basic
}

impl OutputItemSpecConfig {
    fn build(self) -> OutputItemSpec {
        OutputItemSpec {
            kind: self.kind,
            level_of_detail: self.level_of_detail,
            path: self.path,
            template_name: self.template_name,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlxSpecConfig {
    base_name: String,
    #[serde(default)]
    shortened_base_name: Option<String>,
    #[serde(default)]
    qualifiers: Vec<String>,
    #[serde(default = "default_slx_lod")]
    level_of_detail: LevelOfDetail,
    #[serde(default)]
    output_items: Vec<OutputItemSpecConfig>,
    #[serde(default)]
    template_variables: BTreeMap<String, String>,
}

fn default_slx_lod() -> LevelOfDetail {
    LevelOfDetail::Detailed
}

impl SlxSpecConfig {
    fn build(self) -> SlxSpec {
        SlxSpec {
            base_name: self.base_name,
            shortened_base_name: self.shortened_base_name,
            qualifiers: self.qualifiers,
            level_of_detail: self.level_of_detail,
            output_items: self.output_items.into_iter().map(OutputItemSpecConfig::build).collect(),
            template_variables: self.template_variables,
        }
    }
}
