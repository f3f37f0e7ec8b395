//! Output items and the path-keyed deduplication map.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::attr::AttributeValue;

/// One render target handed to downstream renderers.
#[derive(Debug, Clone, Serialize)]
pub struct OutputItem {
    /// Fully rendered output path; the deduplication key.
    pub path: String,
    /// Name of the template to render at the path.
    pub template_name: String,
    /// Resolved variable map for the template.
    pub variables: BTreeMap<String, AttributeValue>,
}

/// Output items keyed by path. The first item to claim a path wins;
/// later claims are the same logical artifact, already produced.
#[derive(Debug, Default)]
pub(crate) struct OutputMap {
    items: BTreeMap<String, OutputItem>,
}

impl OutputMap {
    /// Insert unless the path is already claimed. Returns whether the item
    /// was inserted.
    pub(crate) fn claim(&mut self, item: OutputItem) -> bool {
        if self.items.contains_key(&item.path) {
            return false;
        }
        self.items.insert(item.path.clone(), item);
        true
    }

    pub(crate) fn into_inner(self) -> BTreeMap<String, OutputItem> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(path: &str) -> OutputItem {
        OutputItem {
            path: path.to_string(),
            template_name: "slx.yaml".to_string(),
            variables: BTreeMap::new(),
        }
    }

    #[test]
    fn test_first_claim_wins() {
        let mut map = OutputMap::default();
        assert!(map.claim(item("a/slx.yaml")));
        let mut duplicate = item("a/slx.yaml");
        duplicate.template_name = "other.yaml".to_string();
        assert!(!map.claim(duplicate));

        let items = map.into_inner();
        assert_eq!(items.len(), 1);
        assert_eq!(items["a/slx.yaml"].template_name, "slx.yaml");
    }
}
