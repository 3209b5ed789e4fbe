// MIT License - Copyright (c) 2026 Peter Wright
// Alarm control core

use std::collections::BTreeSet;

/// Set of sensors currently reporting unreadable values.
///
/// `mark` and `clear` return whether membership actually changed; callers
/// emit `trouble_added` / `trouble_removed` only on `true`, so repeated
/// garbage from the same sensor never floods the event log.
#[derive(Debug, Default)]
pub struct TroubleTracker {
    members: BTreeSet<String>,
}

impl TroubleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, id: &str) -> bool {
        if self.members.contains(id) {
            return false;
        }
        self.members.insert(id.to_string())
    }

    pub fn clear(&mut self, id: &str) -> bool {
        self.members.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    /// Aggregate trouble flag.
    pub fn is_active(&self) -> bool {
        !self.members.is_empty()
    }

    /// Troubled sensor ids in sorted order.
    pub fn ids(&self) -> Vec<String> {
        self.members.iter().cloned().collect()
    }
}
