//! Per-tab in-flight bookkeeping.
//!
//! An advisory guard, not a lock: it keeps one OCR run per tab and lets the
//! UI know which tabs are busy. A tab closing mid-request force-clears its
//! entry so the slot cannot leak.

use std::collections::HashSet;

use tokio::sync::RwLock;
use tracing::warn;

/// Tracks which tabs currently have an OCR request in flight.
pub struct TabSessionTracker {
    tabs: RwLock<HashSet<i64>>,
}

impl TabSessionTracker {
    pub fn new() -> Self {
        Self {
            tabs: RwLock::new(HashSet::new()),
        }
    }

    pub async fn is_processing(&self, tab_id: i64) -> bool {
        self.tabs.read().await.contains(&tab_id)
    }

    /// Mark a tab as processing.
    ///
    /// Returns `false` when the tab is already busy; the caller should answer
    /// "busy" rather than start a second concurrent run on the same tab.
    pub async fn begin(&self, tab_id: i64) -> bool {
        let mut tabs = self.tabs.write().await;
        if !tabs.insert(tab_id) {
            warn!("tab {} already has a request in flight", tab_id);
            return false;
        }
        true
    }

    /// Clear the flag on completion or error.
    pub async fn finish(&self, tab_id: i64) {
        self.tabs.write().await.remove(&tab_id);
    }

    /// Force-clear on tab closure, regardless of in-flight state.
    pub async fn remove(&self, tab_id: i64) {
        if self.tabs.write().await.remove(&tab_id) {
            warn!("tab {} closed while processing", tab_id);
        }
    }

    pub async fn active_count(&self) -> usize {
        self.tabs.read().await.len()
    }
}

impl Default for TabSessionTracker {
    fn default() -> Self {
        Self::new()
    }
}
