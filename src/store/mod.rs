//! In-memory cache of the latest telemetry.
//!
//! One `StateStore` is created at startup and shared (behind an `Arc`) by the
//! ingestion workers, the broadcaster and the HTTP handlers.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::telemetry::{ObservablesSnapshot, PvtFix};

pub const DEFAULT_HISTORY_CAPACITY: usize = 256;
pub const DEFAULT_LIMIT: usize = 64;

/// How many held snapshots a late datagram may fall behind before it is
/// taken as the first epoch of a restarted receiver.
const REORDER_WINDOW: usize = 8;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ObservablesMeta {
    pub count: usize,
    pub capacity: usize,
    /// Receiver time of the newest snapshot, if any.
    pub last_timestamp: Option<f64>,
    pub last_sequence: Option<u64>,
    pub last_update: Option<DateTime<Utc>>,
    pub total_received: u64,
    pub duplicates_dropped: u64,
    /// Times the history was cleared because the receiver started over.
    pub restarts: u64,
}

/// What `append_observables` did with a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Newer than everything held.
    Appended,
    /// Arrived late and was placed by sequence number.
    Reordered,
    /// From a new receiver run; history was cleared first.
    Restarted,
    /// Same epoch and same contents as a held snapshot.
    Duplicate,
}

impl AppendOutcome {
    pub fn stored(self) -> bool {
        matches!(
            self,
            AppendOutcome::Appended | AppendOutcome::Reordered | AppendOutcome::Restarted
        )
    }
}

#[derive(Debug, Default)]
struct Inner {
    latest_pvt: Option<Arc<PvtFix>>,
    pvt_updated_at: Option<DateTime<Utc>>,
    /// Oldest first.
    history: VecDeque<Arc<ObservablesSnapshot>>,
    obs_updated_at: Option<DateTime<Utc>>,
    total_received: u64,
    duplicates_dropped: u64,
    restarts: u64,
}

#[derive(Debug)]
pub struct StateStore {
    capacity: usize,
    inner: RwLock<Inner>,
}

impl StateStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        StateStore {
            capacity,
            inner: RwLock::new(Inner {
                history: VecDeque::with_capacity(capacity),
                ..Inner::default()
            }),
        }
    }

    pub fn set_latest_pvt(&self, fix: PvtFix) -> Arc<PvtFix> {
        let fix = Arc::new(fix);
        let mut inner = self.inner.write().unwrap();
        inner.latest_pvt = Some(fix.clone());
        inner.pvt_updated_at = Some(Utc::now());
        fix
    }

    /// `None` until the first fix arrives.
    pub fn latest_pvt(&self) -> Option<Arc<PvtFix>> {
        self.inner.read().unwrap().latest_pvt.clone()
    }

    pub fn pvt_updated_at(&self) -> Option<DateTime<Utc>> {
        self.inner.read().unwrap().pvt_updated_at
    }

    pub fn append_observables(
        &self,
        snapshot: ObservablesSnapshot,
    ) -> (AppendOutcome, Arc<ObservablesSnapshot>) {
        let snapshot = Arc::new(snapshot);
        let seq = snapshot.sequence;

        let mut inner = self.inner.write().unwrap();
        inner.total_received += 1;

        let outcome = classify(&inner.history, &snapshot, self.window());
        match outcome {
            AppendOutcome::Appended => inner.history.push_back(snapshot.clone()),
            AppendOutcome::Reordered => {
                let idx = inner.history.partition_point(|s| s.sequence < seq);
                inner.history.insert(idx, snapshot.clone());
            }
            AppendOutcome::Restarted => {
                log::info!(
                    "Observables went back to epoch {} ms, receiver restarted; clearing {} snapshots",
                    seq,
                    inner.history.len()
                );
                inner.history.clear();
                inner.history.push_back(snapshot.clone());
                inner.restarts += 1;
            }
            AppendOutcome::Duplicate => inner.duplicates_dropped += 1,
        }

        while inner.history.len() > self.capacity {
            inner.history.pop_front();
        }
        if outcome.stored() {
            inner.obs_updated_at = Some(Utc::now());
        }

        (outcome, snapshot)
    }

    /// Never reaches the capacity, so a snapshot older than a full history
    /// always counts as a restart.
    fn window(&self) -> usize {
        REORDER_WINDOW.min(self.capacity - 1)
    }

    /// Most recent first. `limit` is clamped to the history capacity.
    pub fn recent_observables(&self, limit: usize) -> Vec<Arc<ObservablesSnapshot>> {
        let limit = limit.min(self.capacity);
        let inner = self.inner.read().unwrap();
        inner.history.iter().rev().take(limit).cloned().collect()
    }

    pub fn observables_meta(&self) -> ObservablesMeta {
        let inner = self.inner.read().unwrap();
        let newest = inner.history.back();
        ObservablesMeta {
            count: inner.history.len(),
            capacity: self.capacity,
            last_timestamp: newest.map(|s| s.rx_time),
            last_sequence: newest.map(|s| s.sequence),
            last_update: inner.obs_updated_at,
            total_received: inner.total_received,
            duplicates_dropped: inner.duplicates_dropped,
            restarts: inner.restarts,
        }
    }
}

/// An epoch more than `window` snapshots behind the newest, or an epoch that
/// is already held with different measurements, belongs to a new receiver run.
fn classify(
    history: &VecDeque<Arc<ObservablesSnapshot>>,
    snapshot: &ObservablesSnapshot,
    window: usize,
) -> AppendOutcome {
    let seq = snapshot.sequence;
    match history.back() {
        None => return AppendOutcome::Appended,
        Some(newest) if seq > newest.sequence => return AppendOutcome::Appended,
        Some(newest) if **newest == *snapshot => return AppendOutcome::Duplicate,
        Some(_) => {}
    }

    let idx = history.partition_point(|s| s.sequence < seq);
    if history.len() - idx > window {
        return AppendOutcome::Restarted;
    }
    match history.get(idx) {
        Some(held) if held.sequence == seq && **held == *snapshot => AppendOutcome::Duplicate,
        Some(held) if held.sequence == seq => AppendOutcome::Restarted,
        _ => AppendOutcome::Reordered,
    }
}

impl Default for StateStore {
    fn default() -> Self {
        StateStore::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::testing::{sample_fix, sample_snapshot};

    fn sequences(snapshots: &[Arc<ObservablesSnapshot>]) -> Vec<u64> {
        snapshots.iter().map(|s| s.sequence).collect()
    }

    #[test]
    fn empty_store_reports_no_data() {
        let store = StateStore::new(8);
        assert!(store.latest_pvt().is_none());
        assert!(store.recent_observables(DEFAULT_LIMIT).is_empty());
        let meta = store.observables_meta();
        assert_eq!(meta.count, 0);
        assert_eq!(meta.capacity, 8);
        assert!(meta.last_timestamp.is_none());
    }

    #[test]
    fn latest_pvt_is_replaced() {
        let store = StateStore::default();
        store.set_latest_pvt(sample_fix());
        let newer = PvtFix {
            tow_ms: sample_fix().tow_ms + 1000,
            ..sample_fix()
        };
        store.set_latest_pvt(newer.clone());
        assert_eq!(*store.latest_pvt().unwrap(), newer);
        assert!(store.pvt_updated_at().is_some());
    }

    #[test]
    fn overflow_keeps_most_recent_in_reverse_arrival_order() {
        let store = StateStore::new(4);
        for seq in 1..=10 {
            let (outcome, _) = store.append_observables(sample_snapshot(seq));
            assert_eq!(outcome, AppendOutcome::Appended);
        }
        assert_eq!(sequences(&store.recent_observables(4)), vec![10, 9, 8, 7]);
        assert_eq!(store.observables_meta().count, 4);
    }

    #[test]
    fn limit_is_clamped() {
        let store = StateStore::new(3);
        for seq in 1..=5 {
            store.append_observables(sample_snapshot(seq));
        }
        assert_eq!(store.recent_observables(100).len(), 3);
        assert!(store.recent_observables(0).is_empty());
        assert_eq!(sequences(&store.recent_observables(2)), vec![5, 4]);
    }

    #[test]
    fn late_snapshot_is_placed_by_sequence() {
        let store = StateStore::new(8);
        for seq in [1, 2, 4, 5] {
            store.append_observables(sample_snapshot(seq));
        }
        let (outcome, _) = store.append_observables(sample_snapshot(3));
        assert_eq!(outcome, AppendOutcome::Reordered);
        assert_eq!(
            sequences(&store.recent_observables(8)),
            vec![5, 4, 3, 2, 1]
        );
        assert_eq!(store.observables_meta().last_sequence, Some(5));
    }

    #[test]
    fn duplicates_are_dropped() {
        let store = StateStore::new(8);
        store.append_observables(sample_snapshot(1));
        store.append_observables(sample_snapshot(2));
        let (outcome, _) = store.append_observables(sample_snapshot(1));
        assert_eq!(outcome, AppendOutcome::Duplicate);
        assert!(!outcome.stored());
        let meta = store.observables_meta();
        assert_eq!(meta.count, 2);
        assert_eq!(meta.duplicates_dropped, 1);
        assert_eq!(meta.total_received, 3);
    }

    #[test]
    fn snapshot_older_than_a_full_window_restarts() {
        let store = StateStore::new(3);
        for seq in [2, 3, 4] {
            store.append_observables(sample_snapshot(seq));
        }
        let (outcome, _) = store.append_observables(sample_snapshot(1));
        assert_eq!(outcome, AppendOutcome::Restarted);
        assert_eq!(sequences(&store.recent_observables(3)), vec![1]);
    }

    #[test]
    fn sequence_reset_clears_history() {
        let store = StateStore::new(32);
        for seq in 100..120 {
            store.append_observables(sample_snapshot(seq));
        }
        let (outcome, _) = store.append_observables(sample_snapshot(0));
        assert_eq!(outcome, AppendOutcome::Restarted);
        assert_eq!(sequences(&store.recent_observables(32)), vec![0]);
        assert_eq!(store.observables_meta().restarts, 1);
    }

    #[test]
    fn rerun_shorter_than_capacity_replaces_old_run() {
        let store = StateStore::new(DEFAULT_HISTORY_CAPACITY);
        for seq in 0..10 {
            store.append_observables(sample_snapshot(seq));
        }

        let outcomes: Vec<AppendOutcome> = (0..5)
            .map(|seq| store.append_observables(sample_snapshot(seq)).0)
            .collect();
        assert_eq!(
            outcomes,
            vec![
                AppendOutcome::Restarted,
                AppendOutcome::Appended,
                AppendOutcome::Appended,
                AppendOutcome::Appended,
                AppendOutcome::Appended,
            ]
        );
        let meta = store.observables_meta();
        assert_eq!(meta.count, 5);
        assert_eq!(meta.last_sequence, Some(4));
        assert_eq!(meta.duplicates_dropped, 0);
        assert_eq!(sequences(&store.recent_observables(3)), vec![4, 3, 2]);
    }

    #[test]
    fn same_epoch_with_new_measurements_restarts() {
        let store = StateStore::new(DEFAULT_HISTORY_CAPACITY);
        for seq in 0..3 {
            store.append_observables(sample_snapshot(seq));
        }
        let mut rerun = sample_snapshot(1);
        rerun.records[0].pseudorange_m += 35.0;

        let (outcome, _) = store.append_observables(rerun.clone());
        assert_eq!(outcome, AppendOutcome::Restarted);
        let recent = store.recent_observables(8);
        assert_eq!(recent.len(), 1);
        assert_eq!(*recent[0], rerun);
    }

    #[test]
    fn late_duplicate_within_window_is_still_a_duplicate() {
        let store = StateStore::new(DEFAULT_HISTORY_CAPACITY);
        for seq in 0..6 {
            store.append_observables(sample_snapshot(seq));
        }
        let (outcome, _) = store.append_observables(sample_snapshot(0));
        assert_eq!(outcome, AppendOutcome::Duplicate);
        assert_eq!(store.observables_meta().count, 6);
    }

    #[test]
    fn single_slot_history_still_drops_duplicates() {
        let store = StateStore::new(1);
        store.append_observables(sample_snapshot(7));
        let (outcome, _) = store.append_observables(sample_snapshot(7));
        assert_eq!(outcome, AppendOutcome::Duplicate);
        let (outcome, _) = store.append_observables(sample_snapshot(6));
        assert_eq!(outcome, AppendOutcome::Restarted);
    }

    #[test]
    fn readers_never_see_more_than_capacity() {
        let store = Arc::new(StateStore::new(16));
        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for seq in 0..2_000 {
                    store.append_observables(sample_snapshot(seq));
                }
            })
        };
        for _ in 0..2_000 {
            let recent = store.recent_observables(usize::MAX);
            assert!(recent.len() <= 16);
            assert!(recent.windows(2).all(|w| w[0].sequence > w[1].sequence));
        }
        writer.join().unwrap();
        assert_eq!(store.observables_meta().last_sequence, Some(1_999));
    }
}
