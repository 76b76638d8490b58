//! Shared holder of the latest market snapshot

use crate::types::{CoinQuote, MarketSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Current cache contents; `None` until the first successful refresh
pub type SnapshotSlot = Option<Arc<MarketSnapshot>>;

/// Latest full market snapshot
///
/// Writes swap the whole `Arc` in one step, so a reader holds either the old
/// snapshot or the new one and never a mix. Only the poller writes; everything
/// else reads.
pub struct PriceSnapshotCache {
    slot: watch::Sender<SnapshotSlot>,
}

impl PriceSnapshotCache {
    /// Creates an empty cache
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self { slot }
    }

    /// Returns the current snapshot, or `None` before the first load
    pub fn get(&self) -> SnapshotSlot {
        self.slot.borrow().clone()
    }

    /// Looks up one coin in the current snapshot
    pub fn get_detail(&self, coin_id: &str) -> Option<CoinQuote> {
        self.slot
            .borrow()
            .as_ref()
            .and_then(|snapshot| snapshot.get(coin_id).cloned())
    }

    /// Replaces the snapshot
    pub fn set(&self, snapshot: MarketSnapshot) -> Arc<MarketSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.slot.send_replace(Some(snapshot.clone()));
        tracing::debug!(
            coins = snapshot.len(),
            source = snapshot.source(),
            "Replaced market snapshot"
        );
        snapshot
    }

    pub fn has_data(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Age of the current snapshot, `None` when empty
    pub fn age(&self) -> Option<Duration> {
        self.slot.borrow().as_ref().map(|snapshot| snapshot.age())
    }

    /// True when empty or older than `threshold_seconds`
    pub fn is_stale(&self, threshold_seconds: u64) -> bool {
        match self.slot.borrow().as_ref() {
            Some(snapshot) => snapshot.is_stale(threshold_seconds),
            None => true,
        }
    }

    /// Receiver notified on every replace
    pub fn subscribe(&self) -> watch::Receiver<SnapshotSlot> {
        self.slot.subscribe()
    }

    /// Resolves once a snapshot is present
    pub async fn wait_for_data(&self) {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|slot| slot.is_some()).await;
    }
}

impl Default for PriceSnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}
