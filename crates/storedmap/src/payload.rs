use indexmap::IndexMap;

use crate::sort_key::SortValue;
use crate::value::MapValue;

/// Sentinel tag value substituted for "no tags" so the persisted tag list
/// is never physically empty. Never shown to callers: [`Payload::tags`]
/// strips it back out, and [`Payload::set_tags`] re-adds it when the caller
/// clears all tags.
const NO_TAGS_SENTINEL: &str = "\u{0}__storedmap_no_tags__";

/// The mutable, in-memory state of a record.
///
/// Held behind a [`crate::holder::Holder`]'s monitor; every mutator here is
/// only ever called while that monitor is locked.
#[derive(Debug, Clone)]
pub struct Payload {
    tree: MapValue,
    sort: SortValue,
    secondary_key: Option<String>,
    tags: Vec<String>,
}

impl Payload {
    pub fn empty() -> Self {
        Self {
            tree: MapValue::empty_map(),
            sort: SortValue::Null,
            secondary_key: None,
            tags: vec![NO_TAGS_SENTINEL.to_string()],
        }
    }

    pub fn tree(&self) -> &MapValue {
        &self.tree
    }

    pub fn map_mut(&mut self) -> &mut IndexMap<String, MapValue> {
        if !matches!(self.tree, MapValue::Map(_)) {
            self.tree = MapValue::empty_map();
        }
        match &mut self.tree {
            MapValue::Map(m) => m,
            _ => unreachable!(),
        }
    }

    pub fn sort(&self) -> &SortValue {
        &self.sort
    }

    pub fn set_sort(&mut self, sort: SortValue) {
        self.sort = sort;
    }

    pub fn secondary_key(&self) -> Option<&str> {
        self.secondary_key.as_deref()
    }

    pub fn set_secondary_key(&mut self, key: Option<String>) {
        self.secondary_key = key;
    }

    /// Tags with the sentinel stripped back out to an empty list.
    pub fn tags(&self) -> Vec<String> {
        if self.tags.len() == 1 && self.tags[0] == NO_TAGS_SENTINEL {
            Vec::new()
        } else {
            self.tags.clone()
        }
    }

    /// Raw tag list as it should be persisted (sentinel included when empty).
    pub fn tags_persisted(&self) -> &[String] {
        &self.tags
    }

    pub fn set_tags(&mut self, tags: Vec<String>) {
        self.tags = if tags.is_empty() {
            vec![NO_TAGS_SENTINEL.to_string()]
        } else {
            tags
        };
    }

    pub(crate) fn from_parts(tree: MapValue, sort: SortValue, secondary_key: Option<String>, tags: Vec<String>) -> Self {
        let tags = if tags.is_empty() {
            vec![NO_TAGS_SENTINEL.to_string()]
        } else {
            tags
        };
        Self { tree, sort, secondary_key, tags }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_reports_no_tags() {
        let payload = Payload::empty();
        assert!(payload.tags().is_empty());
        assert_eq!(payload.tags_persisted().len(), 1);
    }

    #[test]
    fn setting_empty_tags_reinstates_sentinel() {
        let mut payload = Payload::empty();
        payload.set_tags(vec!["a".to_string()]);
        assert_eq!(payload.tags(), vec!["a".to_string()]);
        payload.set_tags(vec![]);
        assert!(payload.tags().is_empty());
        assert_eq!(payload.tags_persisted().len(), 1);
    }

    #[test]
    fn map_mut_initialises_a_map_tree() {
        let mut payload = Payload::empty();
        payload.map_mut().insert("k".to_string(), MapValue::Int(1));
        assert_eq!(payload.tree().as_map().unwrap().get("k"), Some(&MapValue::Int(1)));
    }
}
