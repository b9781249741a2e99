//! The read side of the command history.
//!
//! The variable stage special-cases the name `history`; items are indexed 1-based with the most
//! recent item first. Persistence and deduplication are the embedding shell's concern. History
//! may only be consulted from the main thread.

use crate::wchar::prelude::*;
use std::collections::HashMap;

#[derive(Clone, Debug, Default)]
pub struct History {
    /// Items, most recent first.
    items: Vec<WString>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct from a list of items, most recent first.
    pub fn from_items(items: Vec<WString>) -> Self {
        Self { items }
    }

    /// Add a new most-recent item.
    pub fn add(&mut self, item: WString) {
        self.items.insert(0, item);
    }

    /// The number of items.
    pub fn size(&self) -> usize {
        self.items.len()
    }

    /// Return the full item list, most recent first.
    pub fn get_history(&self) -> Vec<WString> {
        self.items.clone()
    }

    /// Map 1-based indexes to item strings. Out-of-bounds indexes produce no entry.
    pub fn items_at_indexes(
        &self,
        indexes: impl IntoIterator<Item = usize>,
    ) -> HashMap<usize, WString> {
        let mut result = HashMap::new();
        for idx in indexes {
            if idx == 0 || idx > self.items.len() {
                continue;
            }
            result.entry(idx).or_insert_with(|| self.items[idx - 1].clone());
        }
        result
    }
}
