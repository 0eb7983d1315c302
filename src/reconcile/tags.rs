//! Tag index: which remote resources carry which tag

use std::collections::{BTreeMap, BTreeSet};

/// Tag name to resource uris
#[derive(Debug, Clone, Default)]
pub struct TagIndex {
    entries: BTreeMap<String, BTreeSet<String>>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `resource` carries every tag in `tags`
    pub fn merge<'a>(&mut self, resource: &str, tags: impl IntoIterator<Item = &'a str>) {
        for tag in tags {
            self.entries
                .entry(tag.to_string())
                .or_default()
                .insert(resource.to_string());
        }
    }

    /// Make `tags` the only tags recorded for `resource`
    pub fn replace<'a>(&mut self, resource: &str, tags: impl IntoIterator<Item = &'a str>) {
        for set in self.entries.values_mut() {
            set.remove(resource);
        }
        self.entries.retain(|_, set| !set.is_empty());
        self.merge(resource, tags);
    }

    /// Resources carrying a tag
    pub fn resources(&self, tag: &str) -> Vec<String> {
        self.entries
            .get(tag)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Resolve tag names; unknown names map to an empty list
    pub fn resolve(&self, tags: &[String]) -> BTreeMap<String, Vec<String>> {
        tags.iter()
            .map(|tag| (tag.clone(), self.resources(tag)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
