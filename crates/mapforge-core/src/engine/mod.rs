//! The generation rule evaluator.
//!
//! Evaluation runs in two phases over a registry snapshot:
//!
//! 1. **Enrich**: each rule resolves its resource-type specs through the
//!    platform handlers, evaluates its match predicate per candidate
//!    resource with a fresh variable bag, emits rule-level output items
//!    (path-deduplicated), and folds matches into named artifacts.
//! 2. **Finalize**: artifact names are settled (collision indices, length
//!    bound), per-artifact output items are generated, and customization
//!    rules assign groups and relationship edges.
//!
//! The invariant throughout is best-effort total progress: a failure while
//! processing one document, rule, resource, or output item degrades to a
//! warning and the run always returns whatever could be computed.

mod output;
mod slx;

pub use output::OutputItem;
pub use slx::SlxInfo;

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::attr::AttributeValue;
use crate::customization::{Group, MapCustomizationRules, RelationshipEdge};
use crate::error::EngineError;
use crate::naming::sanitize;
use crate::platform::{HandlerRegistry, PlatformHandler};
use crate::resource::{ResourceRef, ResourceRegistry};
use crate::rules::{GenerationRule, MatchContext, OutputItemSpec, RuleDocument, SlxSpec};
use crate::template::{TemplateRenderer, unresolved_placeholder};

use output::OutputMap;
use slx::SlxAccumulator;

/// Evaluation state of one generation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleState {
    /// Not yet processed.
    Pending,
    /// Resource-type specs resolved to candidate lists.
    ResourceTypesResolved,
    /// Fully evaluated.
    Evaluated,
}

/// Counters accumulated across one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RunStats {
    /// Rules that reached [`RuleState::Evaluated`].
    pub rules_evaluated: usize,
    /// Rules abandoned during resource-type resolution.
    pub rules_skipped: usize,
    /// Candidate resources examined.
    pub resources_scanned: usize,
    /// Candidates whose match predicate held.
    pub resources_matched: usize,
    /// Output items that claimed a new path.
    pub output_items_emitted: usize,
    /// Output items dropped because their path was already claimed.
    pub output_items_deduplicated: usize,
    /// Artifacts created.
    pub slxs_created: usize,
    /// Matches absorbed by an existing artifact.
    pub slxs_updated: usize,
}

/// Everything a run produces.
#[derive(Debug)]
pub struct RunOutput {
    /// Render instructions keyed by output path.
    pub output_items: BTreeMap<String, OutputItem>,
    /// Finalized artifacts keyed by final name.
    pub slxs: BTreeMap<String, SlxInfo>,
    /// Groups keyed by group name.
    pub groups: BTreeMap<String, Group>,
    /// Artifact/group relationship edges.
    pub relationships: Vec<RelationshipEdge>,
    /// Human-readable warnings accumulated across the run.
    pub warnings: Vec<String>,
    /// Run counters.
    pub stats: RunStats,
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Workspace-scoped prefix counted against the final-name length bound.
    pub workspace_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workspace_name: "workspace".to_string(),
        }
    }
}

/// The generation rule engine.
///
/// Holds the registry snapshot, the injected platform handlers, and the
/// injected renderer. Evaluation is single-threaded: discovery must have
/// completed before [`GenerationEngine::evaluate`] is called.
pub struct GenerationEngine {
    registry: Arc<ResourceRegistry>,
    handlers: HandlerRegistry,
    renderer: Arc<dyn TemplateRenderer>,
    config: EngineConfig,
}

/// Mutable state threaded through one evaluation pass.
#[derive(Default)]
struct RunState {
    output: OutputMap,
    slxs: SlxAccumulator,
    warnings: Vec<String>,
    stats: RunStats,
}

impl RunState {
    fn warn(&mut self, message: String) {
        warn!("{message}");
        self.warnings.push(message);
    }

    fn emit(&mut self, item: OutputItem) {
        if self.output.claim(item) {
            self.stats.output_items_emitted += 1;
        } else {
            self.stats.output_items_deduplicated += 1;
        }
    }
}

impl GenerationEngine {
    /// Create an engine over a populated registry.
    #[must_use]
    pub fn new(
        registry: Arc<ResourceRegistry>,
        handlers: HandlerRegistry,
        renderer: Arc<dyn TemplateRenderer>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            handlers,
            renderer,
            config,
        }
    }

    /// Evaluate rule documents against the registry and produce the output
    /// map.
    ///
    /// Never fails: per-rule and per-item failures degrade to entries in
    /// [`RunOutput::warnings`].
    #[must_use]
    pub fn evaluate(
        &self,
        documents: &[RuleDocument],
        customization: Option<&MapCustomizationRules>,
    ) -> RunOutput {
        let mut state = RunState::default();
        for document in documents {
            for rule in &document.rules {
                match self.evaluate_rule(document, rule, &mut state) {
                    RuleState::Evaluated => state.stats.rules_evaluated += 1,
                    _ => state.stats.rules_skipped += 1,
                }
            }
        }
        self.finalize(state, customization)
    }

    /// Run one rule through its state machine, reporting how far it got.
    fn evaluate_rule(
        &self,
        document: &RuleDocument,
        rule: &GenerationRule,
        state: &mut RunState,
    ) -> RuleState {
        let rule_state = RuleState::Pending;
        let mut batches: Vec<(Arc<dyn PlatformHandler>, Vec<ResourceRef>)> = Vec::new();
        for spec in &rule.resource_types {
            let Some(handler) = self.handlers.get(&spec.platform) else {
                state.warn(
                    EngineError::UnknownPlatform {
                        platform: spec.platform.clone(),
                    }
                    .to_string(),
                );
                return rule_state;
            };
            match handler.get_resources(spec) {
                Ok(resources) => batches.push((handler, resources)),
                Err(error) => {
                    state.warn(
                        EngineError::ResourceTypeResolution {
                            platform: spec.platform.clone(),
                            resource_type: spec.resource_type.clone(),
                            reason: error.to_string(),
                        }
                        .to_string(),
                    );
                    return rule_state;
                }
            }
        }
        let rule_state = RuleState::ResourceTypesResolved;
        debug!(?rule_state, candidates = batches.iter().map(|(_, r)| r.len()).sum::<usize>());

        for (handler, resources) in batches {
            for resource in resources {
                self.process_resource(document, rule, handler.as_ref(), &resource, state);
            }
        }
        RuleState::Evaluated
    }

    /// Match one candidate resource and emit on success.
    fn process_resource(
        &self,
        document: &RuleDocument,
        rule: &GenerationRule,
        handler: &dyn PlatformHandler,
        resource: &ResourceRef,
        state: &mut RunState,
    ) {
        state.stats.resources_scanned += 1;
        let level_of_detail = handler.get_level_of_detail(resource);

        // Fresh bag per resource: rule-global base variables, then the
        // platform's implicit variables, then the candidate itself.
        let mut variables = document.variables.clone();
        variables.extend(handler.get_standard_template_variables(resource));
        variables.insert(
            "resource".to_string(),
            AttributeValue::Resource(resource.clone()),
        );

        let matched = {
            let mut ctx = MatchContext {
                resource: resource.clone(),
                variables: &mut variables,
                registry: &self.registry,
                handlers: &self.handlers,
            };
            rule.predicate.evaluate(&mut ctx)
        };
        if !matched {
            return;
        }
        state.stats.resources_matched += 1;

        for item_spec in &rule.output_items {
            if item_spec.level_of_detail > level_of_detail {
                continue;
            }
            self.emit_rule_item(item_spec, resource, &variables, state);
        }

        for slx_spec in &rule.slxs {
            let resolved = slx_spec.level_of_detail.min(level_of_detail);
            let any_item = slx_spec
                .output_items
                .iter()
                .any(|item| item.level_of_detail <= resolved);
            if !any_item {
                continue;
            }
            match resolve_qualifiers(slx_spec, resource, handler, &variables) {
                Ok(qualifier_values) => {
                    let created = state.slxs.upsert(
                        slx_spec,
                        qualifier_values,
                        resource,
                        resolved,
                        &variables,
                    );
                    if created {
                        state.stats.slxs_created += 1;
                    } else {
                        state.stats.slxs_updated += 1;
                    }
                }
                Err(qualifier) => state.warn(format!(
                    "cannot resolve qualifier '{qualifier}' for slx '{}' on resource '{}'",
                    slx_spec.base_name,
                    resource.qualified_name()
                )),
            }
        }
    }

    /// Emit a rule-level output item, falling back to a synthetic path on
    /// render failure.
    fn emit_rule_item(
        &self,
        spec: &OutputItemSpec,
        resource: &ResourceRef,
        variables: &BTreeMap<String, AttributeValue>,
        state: &mut RunState,
    ) {
        let fallback = format!("{}/{}.yaml", sanitize(resource.name()), spec.kind);
        let path = self.render_path(spec.path.as_deref(), fallback, variables, state);
        state.emit(OutputItem {
            path,
            template_name: spec
                .template_name
                .clone()
                .unwrap_or_else(|| format!("{}.yaml", spec.kind)),
            variables: variables.clone(),
        });
    }

    fn render_path(
        &self,
        template: Option<&str>,
        fallback: String,
        variables: &BTreeMap<String, AttributeValue>,
        state: &mut RunState,
    ) -> String {
        let Some(template) = template else {
            return fallback;
        };
        match self.renderer.render_inline(template, variables) {
            Ok(path) => path,
            Err(error) => {
                state.warn(
                    EngineError::PathRender {
                        template: template.to_string(),
                        source: error,
                    }
                    .to_string(),
                );
                fallback
            }
        }
    }

    /// Assign final names, generate per-artifact output items, and apply
    /// customization.
    fn finalize(
        &self,
        mut state: RunState,
        customization: Option<&MapCustomizationRules>,
    ) -> RunOutput {
        let accumulator = std::mem::take(&mut state.slxs);
        let finalized = accumulator.finalize(&self.config.workspace_name);

        for slx in &finalized {
            let variables = self.slx_variables(slx, &mut state);
            for item_spec in &slx.spec.output_items {
                if item_spec.level_of_detail > slx.level_of_detail {
                    continue;
                }
                let fallback = format!("{}/{}.yaml", slx.final_name, item_spec.kind);
                let path =
                    self.render_path(item_spec.path.as_deref(), fallback, &variables, &mut state);
                state.emit(OutputItem {
                    path,
                    template_name: item_spec.template_name_or_default(&slx.spec.base_name),
                    variables: variables.clone(),
                });
            }
        }

        let (groups, relationships) = customization
            .map(|rules| rules.apply(&finalized))
            .unwrap_or_default();

        RunOutput {
            output_items: state.output.into_inner(),
            slxs: finalized
                .into_iter()
                .map(|slx| (slx.final_name.clone(), slx))
                .collect(),
            groups,
            relationships,
            warnings: state.warnings,
            stats: state.stats,
        }
    }

    /// Variable map for one artifact's output items: the bag captured at
    /// first match plus artifact identity and resolved template variables.
    fn slx_variables(
        &self,
        slx: &SlxInfo,
        state: &mut RunState,
    ) -> BTreeMap<String, AttributeValue> {
        let mut variables = slx.variables.clone();
        variables.insert("slx_name".to_string(), slx.final_name.clone().into());
        variables.insert("full_name".to_string(), slx.full_name.clone().into());
        variables.insert("base_name".to_string(), slx.spec.base_name.clone().into());
        variables.insert(
            "match_resource_name".to_string(),
            slx.resource.name().to_string().into(),
        );
        if !slx.child_resource_names.is_empty() {
            variables.insert(
                "child_resource_names".to_string(),
                AttributeValue::Sequence(
                    slx.child_resource_names
                        .iter()
                        .map(|name| AttributeValue::from(name.clone()))
                        .collect(),
                ),
            );
        }

        let handler = self.handlers.get(slx.resource.platform());
        for (name, expression) in &slx.spec.template_variables {
            // Special-cased names resolve through the handler without
            // template evaluation.
            let special = handler
                .as_ref()
                .and_then(|h| h.resolve_template_variable_value(&slx.resource, name));
            let value = match special {
                Some(value) => value,
                None => match self.renderer.render_inline(expression, &variables) {
                    Ok(text) => AttributeValue::String(text),
                    Err(error) => {
                        state.warn(
                            EngineError::TemplateVariable {
                                name: name.clone(),
                                source: error,
                            }
                            .to_string(),
                        );
                        AttributeValue::String(unresolved_placeholder(name))
                    }
                },
            };
            variables.insert(name.clone(), value);
        }
        variables
    }
}

/// Resolve an SLX spec's qualifier names to values for one match.
///
/// `resource` is the built-in short-name dimension; other names resolve
/// through the handler's special variables first, then the variable bag.
fn resolve_qualifiers(
    spec: &SlxSpec,
    resource: &ResourceRef,
    handler: &dyn PlatformHandler,
    variables: &BTreeMap<String, AttributeValue>,
) -> Result<Vec<String>, String> {
    let mut values = Vec::with_capacity(spec.qualifiers.len());
    for qualifier in &spec.qualifiers {
        if qualifier == "resource" {
            values.push(resource.name().to_string());
            continue;
        }
        if let Some(value) = handler
            .resolve_template_variable_value(resource, qualifier)
            .and_then(|value| value.as_match_string())
        {
            values.push(value);
            continue;
        }
        if let Some(value) = variables
            .get(qualifier)
            .and_then(AttributeValue::as_match_string)
        {
            values.push(value);
            continue;
        }
        return Err(qualifier.clone());
    }
    Ok(values)
}
