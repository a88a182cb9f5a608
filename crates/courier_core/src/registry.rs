use std::collections::HashMap;

use crate::msg::{FrameId, TabId};

/// Composite key for one pending deferred trigger.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimeoutKey {
    pub tab: TabId,
    pub frame: FrameId,
    pub type_tag: String,
}

impl TimeoutKey {
    pub fn new(tab: TabId, frame: FrameId, type_tag: impl Into<String>) -> Self {
        Self {
            tab,
            frame,
            type_tag: type_tag.into(),
        }
    }
}

/// Flat table of pending trigger handles; at most one entry per key.
///
/// The handle type is opaque here. Callers own cancellation: dropping an
/// entry from the table does not stop whatever the handle refers to.
#[derive(Debug)]
pub struct TimeoutTable<H> {
    entries: HashMap<TimeoutKey, H>,
}

impl<H> Default for TimeoutTable<H> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<H> TimeoutTable<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a handle, returning the displaced one if the key was taken.
    pub fn insert(&mut self, key: TimeoutKey, handle: H) -> Option<H> {
        self.entries.insert(key, handle)
    }

    pub fn remove(&mut self, key: &TimeoutKey) -> Option<H> {
        self.entries.remove(key)
    }

    /// Removes the entry only when `pred` holds for the stored handle.
    ///
    /// Used to re-validate table state after a suspension point: a trigger
    /// that slept through a replacement must not evict its successor.
    pub fn remove_if<F>(&mut self, key: &TimeoutKey, pred: F) -> Option<H>
    where
        F: FnOnce(&H) -> bool,
    {
        if self.entries.get(key).is_some_and(pred) {
            self.entries.remove(key)
        } else {
            None
        }
    }

    /// Drains every entry belonging to `tab`, across all its frames.
    pub fn remove_tab(&mut self, tab: TabId) -> Vec<H> {
        let keys: Vec<TimeoutKey> = self
            .entries
            .keys()
            .filter(|key| key.tab == tab)
            .cloned()
            .collect();
        keys.iter()
            .filter_map(|key| self.entries.remove(key))
            .collect()
    }

    pub fn contains(&self, key: &TimeoutKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
