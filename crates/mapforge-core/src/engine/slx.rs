//! Runtime artifact records and the name-keyed accumulator.

use std::collections::{BTreeMap, BTreeSet};

use crate::attr::AttributeValue;
use crate::naming::{enforce_target_length, make_qualified_name};
use crate::platform::LevelOfDetail;
use crate::resource::ResourceRef;
use crate::rules::SlxSpec;

/// One artifact (SLX) accumulated during rule evaluation.
///
/// Exists once per distinct qualifier-value combination. When the spec
/// aggregates (no `resource` qualifier), later matches with the same full
/// name fan into `child_resource_names` instead of creating duplicates.
#[derive(Debug, Clone)]
pub struct SlxInfo {
    /// The spec this artifact was instantiated from.
    pub spec: SlxSpec,
    /// Resolved qualifier values, unshortened, in spec order.
    pub qualifier_values: Vec<String>,
    /// Name derived from base + shortened qualifiers + digest.
    pub full_name: String,
    /// Name after collision resolution and length bounding. Assigned by the
    /// finalization pass; empty during accumulation.
    pub final_name: String,
    /// Resolved level of detail (spec cap combined with the resource's).
    pub level_of_detail: LevelOfDetail,
    /// The resource whose match first created this artifact.
    pub resource: ResourceRef,
    /// Short names of every contributing resource (aggregating specs only).
    pub child_resource_names: BTreeSet<String>,
    /// Variable bag captured at first match.
    pub variables: BTreeMap<String, AttributeValue>,
}

/// Artifact store keyed by `(base name, full name)`.
///
/// The base name participates in the key because the digest covers only
/// qualifier values: two specs with different base names that shorten to
/// the same text are distinct artifacts and must survive to the collision
/// pass, while re-matches of one spec merge.
#[derive(Debug, Default)]
pub(crate) struct SlxAccumulator {
    entries: Vec<SlxInfo>,
    index: BTreeMap<(String, String), usize>,
}

impl SlxAccumulator {
    /// Fold a match into the store. Returns `true` when a new artifact was
    /// created, `false` when an existing one absorbed the match.
    pub(crate) fn upsert(
        &mut self,
        spec: &SlxSpec,
        qualifier_values: Vec<String>,
        resource: &ResourceRef,
        level_of_detail: LevelOfDetail,
        variables: &BTreeMap<String, AttributeValue>,
    ) -> bool {
        let full_name = make_qualified_name(
            &spec.base_name,
            spec.shortened_base_name.as_deref(),
            &qualifier_values,
        );
        let key = (spec.base_name.clone(), full_name.clone());
        if let Some(&existing) = self.index.get(&key) {
            let entry = &mut self.entries[existing];
            if spec.aggregates_resources() {
                entry.child_resource_names.insert(resource.name().to_string());
            }
            // A later match may carry more detail than the first.
            entry.level_of_detail = entry.level_of_detail.max(level_of_detail);
            return false;
        }
        let mut child_resource_names = BTreeSet::new();
        if spec.aggregates_resources() {
            child_resource_names.insert(resource.name().to_string());
        }
        self.entries.push(SlxInfo {
            spec: spec.clone(),
            qualifier_values,
            full_name,
            final_name: String::new(),
            level_of_detail,
            resource: resource.clone(),
            child_resource_names,
            variables: variables.clone(),
        });
        self.index.insert(key, self.entries.len() - 1);
        true
    }

    /// Assign final names: disambiguate residual full-name collisions with
    /// 1-based occurrence indices (encounter order), then bound every name
    /// against the workspace prefix.
    pub(crate) fn finalize(self, workspace_prefix: &str) -> Vec<SlxInfo> {
        let mut entries = self.entries;
        let mut by_full_name: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, entry) in entries.iter().enumerate() {
            by_full_name
                .entry(entry.full_name.clone())
                .or_default()
                .push(index);
        }
        for colliding in by_full_name.values().filter(|group| group.len() > 1) {
            for (position, &index) in colliding.iter().enumerate() {
                let occurrence = position + 1;
                let entry = &mut entries[index];
                let base = format!("{}{occurrence}", entry.spec.base_name);
                let shortened = entry
                    .spec
                    .shortened_base_name
                    .as_ref()
                    .map(|short| format!("{short}{occurrence}"));
                entry.full_name =
                    make_qualified_name(&base, shortened.as_deref(), &entry.qualifier_values);
            }
        }
        for entry in &mut entries {
            entry.final_name = enforce_target_length(workspace_prefix, &entry.full_name);
        }
        entries
    }
}
