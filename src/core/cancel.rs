//! # Cancellation engine.
//!
//! Resolves an [`Address`] to link ids (snapshot first), then removes each
//! link and tears it down through `finalize_clear`. Resolution is shared
//! with the marking engine.
//!
//! ## Rules
//! - Ids are snapshotted before any teardown, so handlers that register or
//!   clear other operations never disturb the iteration.
//! - A link already gone when its turn comes is skipped; clearing twice is a no-op.

use std::collections::BTreeSet;
use std::rc::Rc;

use crate::registry::{ClearReason, Join, OperationId, OperationKind};

use super::handle::Inner;
use super::options::{Address, GroupSelector};

impl Inner {
    /// Ids of `kind` selected by `addr`.
    ///
    /// With `all_groups`, an address without group reaches the root bucket and
    /// every group bucket.
    pub(crate) fn targets(
        &self,
        kind: &OperationKind,
        addr: &Address,
        all_groups: bool,
    ) -> Vec<OperationId> {
        let registry = self.registry.borrow();
        let Some(cache) = registry.cache(kind) else {
            return Vec::new();
        };
        let (id, label) = (addr.id, addr.label.as_ref());

        match &addr.group {
            Some(GroupSelector::Pattern(pattern)) => cache
                .matching_groups(pattern)
                .iter()
                .filter_map(|group| cache.bucket(Some(group)))
                .flat_map(|bucket| bucket.targets(id, label))
                .collect(),
            Some(GroupSelector::Key(group)) => cache
                .bucket(Some(group))
                .map(|bucket| bucket.targets(id, label))
                .unwrap_or_default(),
            None if all_groups => {
                let groups = cache.group_keys();
                let buckets = std::iter::once(None)
                    .chain(groups.iter().map(Some))
                    .filter_map(|group| cache.bucket(group));
                let unique: BTreeSet<OperationId> = buckets
                    .flat_map(|bucket| bucket.targets(id, label))
                    .collect();
                unique.into_iter().collect()
            }
            None => match (id, label) {
                (Some(id), None) if cache.contains(id) => vec![id],
                (Some(_), None) => Vec::new(),
                _ => cache
                    .bucket(None)
                    .map(|root| root.targets(id, label))
                    .unwrap_or_default(),
            },
        }
    }

    /// Clears every link selected by `addr`; returns how many were torn down.
    pub(crate) fn clear_scoped(
        self: &Rc<Self>,
        kind: &OperationKind,
        addr: &Address,
        all_groups: bool,
    ) -> usize {
        let ids = self.targets(kind, addr, all_groups);
        let mut cleared = 0;

        for id in ids {
            let removed = self
                .registry
                .borrow_mut()
                .cache_mut(kind)
                .and_then(|cache| cache.remove(id));
            if let Some(link) = removed {
                self.finalize_clear(link, None, ClearReason::Explicit, Join::No);
                cleared += 1;
            }
        }
        cleared
    }
}
