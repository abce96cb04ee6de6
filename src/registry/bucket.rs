//! # Buckets, kind caches and the registry.
//!
//! ## Architecture
//! ```text
//! Registry
//!   ├─ [Timeout]      ─► KindCache { root: Bucket, groups: { "g1": Bucket, .. }, index }
//!   ├─ [Interval]     ─► KindCache { .. }
//!   ├─ ...
//!   └─ custom["name"] ─► KindCache { .. }
//!
//! Bucket { labels: Key ─► OperationId, links: OperationId ─► Link }
//! ```
//!
//! ## Rules
//! - A label points at no more than one link per bucket.
//! - Removing a link frees its label slot only if the slot still points at it.
//! - `KindCache::index` knows the group of every live link, so an id can be
//!   resolved without naming its group.

use std::collections::{BTreeMap, HashMap};

use regex::Regex;

use crate::registry::key::{Key, OperationId, OperationKind};
use crate::registry::link::Link;

/// Labeled collection of links for one group (or the ungrouped root).
#[derive(Debug, Default)]
pub(crate) struct Bucket {
    labels: HashMap<Key, OperationId>,
    links: BTreeMap<OperationId, Link>,
}

impl Bucket {
    /// Inserts the link and points its label slot at it.
    pub(crate) fn insert(&mut self, link: Link) {
        if let Some(label) = &link.label {
            self.labels.insert(label.clone(), link.id);
        }
        self.links.insert(link.id, link);
    }

    /// Removes the link and frees its label slot.
    pub(crate) fn remove(&mut self, id: OperationId) -> Option<Link> {
        let link = self.links.remove(&id)?;
        if let Some(label) = &link.label
            && self.labels.get(label) == Some(&id)
        {
            self.labels.remove(label);
        }
        Some(link)
    }

    /// Current occupant of `label`.
    pub(crate) fn resolve_label(&self, label: &Key) -> Option<OperationId> {
        self.labels.get(label).copied()
    }

    pub(crate) fn get(&self, id: OperationId) -> Option<&Link> {
        self.links.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: OperationId) -> Option<&mut Link> {
        self.links.get_mut(&id)
    }

    /// Ids in registration order.
    pub(crate) fn ids(&self) -> Vec<OperationId> {
        self.links.keys().copied().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.links.len()
    }

    /// Ids addressed by an optional id/label pair.
    ///
    /// - label set: its occupant, unless unoccupied or conflicting with `id`
    /// - id set: that id if present
    /// - neither: every link
    pub(crate) fn targets(&self, id: Option<OperationId>, label: Option<&Key>) -> Vec<OperationId> {
        match (id, label) {
            (_, Some(label)) => match (self.resolve_label(label), id) {
                (Some(current), Some(id)) if current != id => Vec::new(),
                (Some(current), _) => vec![current],
                (None, _) => Vec::new(),
            },
            (Some(id), None) if self.links.contains_key(&id) => vec![id],
            (Some(_), None) => Vec::new(),
            (None, None) => self.ids(),
        }
    }
}

/// Buckets of one operation kind.
#[derive(Debug, Default)]
pub(crate) struct KindCache {
    root: Bucket,
    groups: BTreeMap<Key, Bucket>,
    index: HashMap<OperationId, Option<Key>>,
}

impl KindCache {
    pub(crate) fn bucket(&self, group: Option<&Key>) -> Option<&Bucket> {
        match group {
            Some(group) => self.groups.get(group),
            None => Some(&self.root),
        }
    }

    pub(crate) fn bucket_mut(&mut self, group: Option<&Key>) -> Option<&mut Bucket> {
        match group {
            Some(group) => self.groups.get_mut(group),
            None => Some(&mut self.root),
        }
    }

    pub(crate) fn bucket_or_create(&mut self, group: Option<&Key>) -> &mut Bucket {
        match group {
            Some(group) => self.groups.entry(group.clone()).or_default(),
            None => &mut self.root,
        }
    }

    pub(crate) fn insert(&mut self, link: Link) {
        let group = link.group.clone();
        self.index.insert(link.id, group.clone());
        self.bucket_or_create(group.as_ref()).insert(link);
    }

    pub(crate) fn remove(&mut self, id: OperationId) -> Option<Link> {
        let group = self.index.remove(&id)?;
        self.bucket_mut(group.as_ref())?.remove(id)
    }

    /// Removes whatever currently occupies `label` in `group`.
    pub(crate) fn take_labeled(&mut self, group: Option<&Key>, label: &Key) -> Option<Link> {
        let id = self.bucket(group)?.resolve_label(label)?;
        self.remove(id)
    }

    pub(crate) fn contains(&self, id: OperationId) -> bool {
        self.index.contains_key(&id)
    }

    pub(crate) fn get(&self, id: OperationId) -> Option<&Link> {
        let group = self.index.get(&id)?;
        self.bucket(group.as_ref())?.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: OperationId) -> Option<&mut Link> {
        let group = self.index.get(&id)?.clone();
        self.bucket_mut(group.as_ref())?.get_mut(id)
    }

    /// Snapshot of group keys.
    pub(crate) fn group_keys(&self) -> Vec<Key> {
        self.groups.keys().cloned().collect()
    }

    /// Snapshot of named group keys matching `pattern`.
    pub(crate) fn matching_groups(&self, pattern: &Regex) -> Vec<Key> {
        self.groups
            .keys()
            .filter(|key| key.as_str().is_some_and(|name| pattern.is_match(name)))
            .cloned()
            .collect()
    }

    /// Number of live links across all buckets.
    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }
}

/// Per-kind caches owned by one `Async` instance.
pub(crate) struct Registry {
    builtin: [Option<KindCache>; OperationKind::BUILTIN],
    custom: HashMap<std::sync::Arc<str>, KindCache>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            builtin: std::array::from_fn(|_| None),
            custom: HashMap::new(),
        }
    }

    pub(crate) fn cache(&self, kind: &OperationKind) -> Option<&KindCache> {
        match (kind.slot(), kind) {
            (Some(slot), _) => self.builtin[slot].as_ref(),
            (None, OperationKind::Custom(name)) => self.custom.get(name),
            (None, _) => None,
        }
    }

    pub(crate) fn cache_mut(&mut self, kind: &OperationKind) -> Option<&mut KindCache> {
        match (kind.slot(), kind) {
            (Some(slot), _) => self.builtin[slot].as_mut(),
            (None, OperationKind::Custom(name)) => self.custom.get_mut(name),
            (None, _) => None,
        }
    }

    pub(crate) fn cache_or_create(&mut self, kind: &OperationKind) -> &mut KindCache {
        match kind {
            OperationKind::Custom(name) => self.custom.entry(name.clone()).or_default(),
            builtin => {
                let slot = builtin.slot().unwrap_or_default();
                self.builtin[slot].get_or_insert_with(KindCache::default)
            }
        }
    }

    /// Kinds that have a cache, built-ins first.
    pub(crate) fn kinds(&self) -> Vec<OperationKind> {
        let builtin = self
            .builtin
            .iter()
            .enumerate()
            .filter(|(_, cache)| cache.is_some())
            .filter_map(|(slot, _)| OperationKind::from_slot(slot));
        let custom = self.custom.keys().cloned().map(OperationKind::Custom);
        builtin.chain(custom).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::link::Join;

    fn link(label: Option<&str>, group: Option<&str>) -> Link {
        Link::new(
            OperationId::next(),
            OperationKind::Timeout,
            label.map(Key::from),
            group.map(Key::from),
            Join::No,
            false,
        )
    }

    #[test]
    fn removing_a_stale_occupant_keeps_the_current_label_slot() {
        let mut bucket = Bucket::default();
        let first = link(Some("x"), None);
        let first_id = first.id;
        bucket.insert(first);

        let second = link(Some("x"), None);
        let second_id = second.id;
        bucket.insert(second);
        assert_eq!(bucket.resolve_label(&Key::from("x")), Some(second_id));

        bucket.remove(first_id);
        assert_eq!(bucket.resolve_label(&Key::from("x")), Some(second_id));

        bucket.remove(second_id);
        assert_eq!(bucket.resolve_label(&Key::from("x")), None);
    }

    #[test]
    fn targets_follow_label_then_id_then_all() {
        let mut bucket = Bucket::default();
        let a = link(Some("a"), None);
        let b = link(None, None);
        let (a_id, b_id) = (a.id, b.id);
        bucket.insert(a);
        bucket.insert(b);

        assert_eq!(bucket.targets(None, Some(&Key::from("a"))), vec![a_id]);
        assert_eq!(bucket.targets(Some(b_id), Some(&Key::from("a"))), Vec::new());
        assert_eq!(bucket.targets(None, Some(&Key::from("missing"))), Vec::new());
        assert_eq!(bucket.targets(Some(b_id), None), vec![b_id]);
        assert_eq!(bucket.targets(None, None), vec![a_id, b_id]);
    }

    #[test]
    fn kind_cache_resolves_ids_across_groups() {
        let mut cache = KindCache::default();
        let grouped = link(None, Some("g"));
        let id = grouped.id;
        cache.insert(grouped);

        assert!(cache.contains(id));
        assert!(cache.get(id).is_some());
        assert!(cache.bucket(None).is_some_and(|root| root.len() == 0));

        let removed = cache.remove(id).expect("link");
        assert_eq!(removed.group, Some(Key::from("g")));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn matching_groups_skips_anonymous_keys() {
        let mut cache = KindCache::default();
        cache.insert(link(None, Some("net:search")));
        cache.insert(link(None, Some("net:load")));
        cache.insert(link(None, Some("ui")));
        let mut anon = link(None, None);
        anon.group = Some(Key::anonymous());
        cache.insert(anon);

        let pattern = Regex::new("^net:").expect("regex");
        let mut groups = cache.matching_groups(&pattern);
        groups.sort();
        assert_eq!(groups, vec![Key::from("net:load"), Key::from("net:search")]);
        assert_eq!(cache.group_keys().len(), 4);
    }

    #[test]
    fn registry_lists_only_populated_kinds() {
        let mut registry = Registry::new();
        assert!(registry.kinds().is_empty());

        registry.cache_or_create(&OperationKind::Interval);
        registry.cache_or_create(&OperationKind::custom("jobs"));

        assert_eq!(
            registry.kinds(),
            vec![OperationKind::Interval, OperationKind::custom("jobs")]
        );
        assert!(registry.cache(&OperationKind::Timeout).is_none());
    }
}
