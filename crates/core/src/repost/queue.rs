//! Pending repost work.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::stock::{BinKey, LedgerStore, PostingKey};

/// A bin to recompute from a posting onwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepostItem {
    /// The bin.
    pub key: BinKey,
    /// First posting to recompute.
    pub from: PostingKey,
}

/// Work queue keyed by bin.
///
/// Each bin keeps only its earliest pending posting; `pop` hands out the
/// globally earliest item first.
#[derive(Debug, Clone, Default)]
pub struct RepostQueue {
    pending: BTreeMap<BinKey, PostingKey>,
}

impl RepostQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `key` from `from`, keeping the earlier posting if one is pending.
    pub fn push(&mut self, key: BinKey, from: PostingKey) {
        self.pending
            .entry(key)
            .and_modify(|pending| *pending = (*pending).min(from))
            .or_insert(from);
    }

    /// Queues `key` from `from` along with every bin fed from that range.
    ///
    /// Entries that derive their rate from an entry at or after `from`
    /// (transfer targets, returns) mark their own bin pending from their
    /// posting, transitively.
    pub fn push_downstream(&mut self, store: &LedgerStore, key: BinKey, from: PostingKey) {
        let mut stack = vec![(key, from)];
        while let Some((key, from)) = stack.pop() {
            if self.pending_from(&key).is_some_and(|pending| pending <= from) {
                continue;
            }
            for entry in store.entries_from(&key, from) {
                stack.extend(
                    store
                        .dependents_of(entry.id)
                        .map(|dependent| (dependent.key(), dependent.posting)),
                );
            }
            self.push(key, from);
        }
    }

    /// Removes and returns the earliest pending item.
    pub fn pop(&mut self) -> Option<RepostItem> {
        let key = self
            .pending
            .iter()
            .min_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)))
            .map(|(key, _)| key.clone())?;
        let from = self.pending.remove(&key)?;
        Some(RepostItem { key, from })
    }

    /// Removes and returns the pending item of one bin.
    pub fn take(&mut self, key: &BinKey) -> Option<RepostItem> {
        self.pending.remove(key).map(|from| RepostItem {
            key: key.clone(),
            from,
        })
    }

    /// Pending posting of a bin.
    #[must_use]
    pub fn pending_from(&self, key: &BinKey) -> Option<PostingKey> {
        self.pending.get(key).copied()
    }

    /// Every pending item, ordered by bin.
    #[must_use]
    pub fn items(&self) -> Vec<RepostItem> {
        self.pending
            .iter()
            .map(|(key, from)| RepostItem {
                key: key.clone(),
                from: *from,
            })
            .collect()
    }

    /// Number of bins waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
