//! End-to-end scenarios: registry population, rule evaluation, naming,
//! deduplication, and customization through fake platform handlers and a
//! fake renderer.

use std::collections::BTreeMap;
use std::sync::Arc;

use mapforge_core::{
    AttributeValue, EngineConfig, GenerationEngine, HandlerError, HandlerRegistry, LevelOfDetail,
    PlatformHandler, Resource, ResourceRef, ResourceRegistry, ResourceTypeSpec, RunOutput,
    TemplateError, TemplateRenderer, parse_customization_document, parse_rule_documents,
};

/// Handler that serves resources straight from the registry and reads
/// level-of-detail and template variables from resource attributes.
struct FakeHandler {
    registry: Arc<ResourceRegistry>,
    platform: String,
}

impl PlatformHandler for FakeHandler {
    fn get_resources(&self, spec: &ResourceTypeSpec) -> Result<Vec<ResourceRef>, HandlerError> {
        let resources = self
            .registry
            .resources_of_type(&self.platform, &spec.resource_type)
            .map_err(|e| HandlerError::Enumeration {
                reason: e.to_string(),
            })?;
        if resources.is_empty() {
            return Err(HandlerError::UnknownResourceType {
                platform: self.platform.clone(),
                resource_type: spec.resource_type.clone(),
            });
        }
        Ok(resources)
    }

    fn get_level_of_detail(&self, resource: &Resource) -> LevelOfDetail {
        match resource.attribute("lod").as_ref().and_then(AttributeValue::as_match_string) {
            Some(text) if text == "none" => LevelOfDetail::None,
            Some(text) if text == "basic" => LevelOfDetail::Basic,
            _ => LevelOfDetail::Detailed,
        }
    }

    fn get_property_values(&self, resource: &Resource, property: &str) -> Option<Vec<String>> {
        // Virtual property: "label:<key>" expands through the labels map.
        let key = property.strip_prefix("label:")?;
        Some(
            resource
                .resolve_path(&format!("labels.{key}"))
                .iter()
                .filter_map(AttributeValue::as_match_string)
                .collect(),
        )
    }

    fn get_standard_template_variables(
        &self,
        resource: &Resource,
    ) -> BTreeMap<String, AttributeValue> {
        let mut variables = BTreeMap::new();
        for name in ["cluster", "namespace"] {
            if let Some(value) = resource.attribute(name) {
                variables.insert(name.to_string(), value);
            }
        }
        variables
    }

    fn resolve_template_variable_value(
        &self,
        resource: &Resource,
        name: &str,
    ) -> Option<AttributeValue> {
        match name {
            "cluster" | "namespace" => resource.attribute(name),
            _ => None,
        }
    }
}

/// Renderer that substitutes `{{ name }}` from the variable map and fails
/// on anything it cannot resolve.
struct FakeRenderer;

impl TemplateRenderer for FakeRenderer {
    fn render(
        &self,
        template_name: &str,
        _variables: &BTreeMap<String, AttributeValue>,
    ) -> Result<String, TemplateError> {
        Ok(format!("rendered:{template_name}"))
    }

    fn render_inline(
        &self,
        source: &str,
        variables: &BTreeMap<String, AttributeValue>,
    ) -> Result<String, TemplateError> {
        let mut out = String::new();
        let mut rest = source;
        while let Some(open) = rest.find("{{") {
            out.push_str(&rest[..open]);
            let tail = &rest[open + 2..];
            let close = tail.find("}}").ok_or_else(|| TemplateError::Render {
                reason: format!("unterminated expression in '{source}'"),
            })?;
            let name = tail[..close].trim();
            let value = variables
                .get(name)
                .and_then(AttributeValue::as_match_string)
                .ok_or_else(|| TemplateError::UnresolvedVariable {
                    name: name.to_string(),
                })?;
            out.push_str(&value);
            rest = &tail[close + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

fn add(
    registry: &ResourceRegistry,
    type_name: &str,
    name: &str,
    qualified_name: &str,
    yaml: &str,
) {
    let AttributeValue::Map(attributes) =
        AttributeValue::from_yaml(&serde_yaml::from_str(yaml).unwrap())
    else {
        panic!("fixture attributes must be a map");
    };
    registry
        .add_resource("kubernetes", type_name, name, qualified_name, attributes)
        .unwrap();
}

fn run(registry: Arc<ResourceRegistry>, documents: &[&str], customization: Option<&str>) -> RunOutput {
    let mut handlers = HandlerRegistry::new();
    handlers.register(
        "kubernetes",
        Arc::new(FakeHandler {
            registry: Arc::clone(&registry),
            platform: "kubernetes".to_string(),
        }),
    );
    let engine = GenerationEngine::new(
        registry,
        handlers,
        Arc::new(FakeRenderer),
        EngineConfig::default(),
    );
    let (documents, mut warnings) = parse_rule_documents(documents);
    let customization = customization.map(|yaml| parse_customization_document(yaml).unwrap());
    let mut output = engine.evaluate(&documents, customization.as_ref());
    warnings.append(&mut output.warnings);
    output.warnings = warnings;
    output
}

const NAMESPACE_RULES: &str = r"
platform: kubernetes
generationRules:
  - resourceTypes: [namespace]
    matchRules:
      - type: pattern
        pattern: 'ns-.*'
        properties: [name]
        mode: substring
    slxs:
      - baseName: namespace-health
        qualifiers: [cluster, namespace]
        outputItems:
          - type: slx
          - type: sli
            levelOfDetail: detailed
";

#[test]
fn lod_none_resources_produce_no_output_items() {
    let registry = Arc::new(ResourceRegistry::new());
    add(&registry, "namespace", "ns-a", "c1/ns-a", "cluster: c1\nnamespace: ns-a\nlod: detailed\n");
    add(&registry, "namespace", "ns-b", "c1/ns-b", "cluster: c1\nnamespace: ns-b\nlod: none\n");

    let output = run(Arc::clone(&registry), &[NAMESPACE_RULES], None);

    assert_eq!(output.stats.resources_scanned, 2);
    assert_eq!(output.stats.resources_matched, 2);
    // ns-b matched but its level of detail gates every output item out.
    assert_eq!(output.slxs.len(), 1);
    let slx = output.slxs.values().next().unwrap();
    assert_eq!(slx.resource.name(), "ns-a");
    // Both the basic-gated slx item and the detailed-gated sli item emit.
    assert_eq!(output.output_items.len(), 2);
    assert!(output
        .output_items
        .keys()
        .all(|path| path.starts_with(&slx.final_name)));
}

#[test]
fn basic_lod_gates_detailed_items_only() {
    let registry = Arc::new(ResourceRegistry::new());
    add(&registry, "namespace", "ns-a", "c1/ns-a", "cluster: c1\nnamespace: ns-a\nlod: basic\n");

    let output = run(Arc::clone(&registry), &[NAMESPACE_RULES], None);

    let paths: Vec<&String> = output.output_items.keys().collect();
    assert_eq!(paths.len(), 1, "sli is detailed-gated: {paths:?}");
    assert!(paths[0].ends_with("/slx.yaml"));
}

#[test]
fn unknown_platform_skips_rule_but_not_run() {
    let registry = Arc::new(ResourceRegistry::new());
    add(&registry, "namespace", "ns-a", "c1/ns-a", "cluster: c1\nnamespace: ns-a\n");

    let aws_rules = r"
platform: aws
generationRules:
  - resourceTypes: [bucket]
    slxs:
      - baseName: bucket-health
        qualifiers: [resource]
        outputItems:
          - type: slx
";
    let output = run(Arc::clone(&registry), &[aws_rules, NAMESPACE_RULES], None);

    assert_eq!(output.stats.rules_skipped, 1);
    assert_eq!(output.stats.rules_evaluated, 1);
    assert!(output.warnings.iter().any(|w| w.contains("aws")));
    // The healthy rule still produced its artifact.
    assert_eq!(output.slxs.len(), 1);
}

#[test]
fn malformed_document_becomes_warning() {
    let registry = Arc::new(ResourceRegistry::new());
    add(&registry, "namespace", "ns-a", "c1/ns-a", "cluster: c1\nnamespace: ns-a\n");

    let bad = "generationRules:\n  - matchRules:\n      - type: no-such-kind\n";
    let output = run(Arc::clone(&registry), &[bad, NAMESPACE_RULES], None);

    assert!(output.warnings.iter().any(|w| w.contains("no-such-kind")));
    assert_eq!(output.slxs.len(), 1);
}

#[test]
fn same_output_path_from_many_resources_emits_once() {
    let registry = Arc::new(ResourceRegistry::new());
    for name in ["api", "worker", "scheduler"] {
        add(
            &registry,
            "deployment",
            name,
            &format!("c1/ns-a/{name}"),
            "cluster: c1\nnamespace: ns-a\n",
        );
    }
    let rules = r"
platform: kubernetes
generationRules:
  - resourceTypes: [deployment]
    outputItems:
      - type: workspace
        path: '{{ namespace }}/workspace.yaml'
";
    let output = run(Arc::clone(&registry), &[rules], None);

    assert_eq!(output.output_items.len(), 1);
    assert!(output.output_items.contains_key("ns-a/workspace.yaml"));
    assert_eq!(output.stats.output_items_emitted, 1);
    assert_eq!(output.stats.output_items_deduplicated, 2);
}

#[test]
fn fan_in_aggregates_contributing_resources() {
    let registry = Arc::new(ResourceRegistry::new());
    add(&registry, "deployment", "api", "c1/ns-a/api", "cluster: c1\nnamespace: ns-a\n");
    add(&registry, "deployment", "worker", "c1/ns-a/worker", "cluster: c1\nnamespace: ns-a\n");

    let rules = r"
platform: kubernetes
generationRules:
  - resourceTypes: [deployment]
    slxs:
      - baseName: namespace-health
        qualifiers: [cluster, namespace]
        outputItems:
          - type: slx
";
    let output = run(Arc::clone(&registry), &[rules], None);

    assert_eq!(output.stats.slxs_created, 1);
    assert_eq!(output.stats.slxs_updated, 1);
    let slx = output.slxs.values().next().unwrap();
    assert_eq!(slx.child_resource_names.len(), 2);
    assert!(slx.child_resource_names.contains("api"));
    assert!(slx.child_resource_names.contains("worker"));
}

#[test]
fn path_render_failure_falls_back_to_synthetic_path() {
    let registry = Arc::new(ResourceRegistry::new());
    add(&registry, "namespace", "ns-a", "c1/ns-a", "cluster: c1\nnamespace: ns-a\n");

    let rules = r"
platform: kubernetes
generationRules:
  - resourceTypes: [namespace]
    slxs:
      - baseName: namespace-health
        qualifiers: [namespace]
        outputItems:
          - type: slx
            path: '{{ does_not_exist }}/slx.yaml'
";
    let output = run(Arc::clone(&registry), &[rules], None);

    assert!(output.warnings.iter().any(|w| w.contains("does_not_exist")));
    // The artifact still lands at a deterministic synthetic path.
    let slx = output.slxs.values().next().unwrap();
    assert!(output
        .output_items
        .contains_key(&format!("{}/slx.yaml", slx.final_name)));
}

#[test]
fn unresolved_template_variable_degrades_to_placeholder() {
    let registry = Arc::new(ResourceRegistry::new());
    add(&registry, "namespace", "ns-a", "c1/ns-a", "cluster: c1\nnamespace: ns-a\n");

    let rules = r"
platform: kubernetes
generationRules:
  - resourceTypes: [namespace]
    slxs:
      - baseName: namespace-health
        qualifiers: [namespace]
        templateVariables:
          owner: '{{ missing_owner }}'
        outputItems:
          - type: slx
";
    let output = run(Arc::clone(&registry), &[rules], None);

    let item = output.output_items.values().next().unwrap();
    let owner = item.variables.get("owner").and_then(AttributeValue::as_match_string).unwrap();
    assert!(owner.contains("unresolved variable owner"));
    assert!(output.warnings.iter().any(|w| w.contains("missing_owner")));
}

#[test]
fn customization_assigns_groups_and_relationships() {
    let registry = Arc::new(ResourceRegistry::new());
    add(&registry, "namespace", "ns-a", "c1/ns-a", "cluster: c1\nnamespace: ns-a\n");
    add(&registry, "deployment", "db-primary", "c1/ns-a/db-primary", "cluster: c1\nnamespace: ns-a\n");

    let rules = r"
platform: kubernetes
generationRules:
  - resourceTypes: [namespace]
    slxs:
      - baseName: namespace-health
        qualifiers: [namespace]
        outputItems:
          - type: slx
  - resourceTypes: [deployment]
    slxs:
      - baseName: workload-health
        qualifiers: [namespace, resource]
        outputItems:
          - type: slx
";
    let customization = r"
defaultVerb: dependent-on
groupRules:
  - match:
      baseName: namespace-health
    group: namespaces
  - match:
      baseName: workload-health
    group: workloads
slxRelationshipRules:
  - match:
      baseName: workload-health
    subject: namespaces
    verb: dependency-of
";
    let output = run(Arc::clone(&registry), &[rules], Some(customization));

    assert_eq!(output.groups.len(), 2);
    assert_eq!(output.groups["namespaces"].members.len(), 1);
    assert_eq!(output.groups["workloads"].members.len(), 1);
    assert_eq!(output.relationships.len(), 1);
    let edge = &output.relationships[0];
    assert_eq!(edge.subject, "namespaces");
    assert!(output.groups["workloads"].members.contains(&edge.object));
}

#[test]
fn qualifier_order_is_part_of_identity() {
    let registry = Arc::new(ResourceRegistry::new());
    add(&registry, "namespace", "ns-a", "c1/ns-a", "cluster: c1\nnamespace: ns-a\n");

    let forward = r"
platform: kubernetes
generationRules:
  - resourceTypes: [namespace]
    slxs:
      - baseName: namespace-health
        qualifiers: [cluster, namespace]
        outputItems:
          - type: slx
";
    let reverse = r"
platform: kubernetes
generationRules:
  - resourceTypes: [namespace]
    slxs:
      - baseName: namespace-health
        qualifiers: [namespace, cluster]
        outputItems:
          - type: slx
";
    let output = run(Arc::clone(&registry), &[forward, reverse], None);

    // Same qualifier values in a different order: two distinct artifacts
    // with different digest suffixes.
    assert_eq!(output.slxs.len(), 2);
    let names: Vec<&String> = output.slxs.keys().collect();
    assert_ne!(names[0], names[1]);
}
