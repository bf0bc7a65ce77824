// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the reconciliation task, read by the health endpoint.
#[derive(Debug, Default)]
pub struct ReconcileStats {
    pub cycles: AtomicU64,
    pub failed_fetches: AtomicU64,
    pub vehicles_reconciled: AtomicU64,
    pub vehicles_positioned: AtomicU64,
    pub live_timetable_fixes: AtomicU64,
    pub midpoint_fixes: AtomicU64,
    pub static_fallback_fixes: AtomicU64,
    pub static_fallback_misses: AtomicU64,
    pub skipped_records: AtomicU64,
    pub trip_matches: AtomicU64,
    pub last_cycle_epoch: AtomicU64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStatsSnapshot {
    pub cycles: u64,
    pub failed_fetches: u64,
    pub vehicles_reconciled: u64,
    pub vehicles_positioned: u64,
    pub live_timetable_fixes: u64,
    pub midpoint_fixes: u64,
    pub static_fallback_fixes: u64,
    pub static_fallback_misses: u64,
    pub skipped_records: u64,
    pub trip_matches: u64,
    pub last_cycle_epoch: u64,
}

impl ReconcileStats {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn set(counter: &AtomicU64, value: u64) {
        counter.store(value, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ReconcileStatsSnapshot {
        ReconcileStatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            failed_fetches: self.failed_fetches.load(Ordering::Relaxed),
            vehicles_reconciled: self.vehicles_reconciled.load(Ordering::Relaxed),
            vehicles_positioned: self.vehicles_positioned.load(Ordering::Relaxed),
            live_timetable_fixes: self.live_timetable_fixes.load(Ordering::Relaxed),
            midpoint_fixes: self.midpoint_fixes.load(Ordering::Relaxed),
            static_fallback_fixes: self.static_fallback_fixes.load(Ordering::Relaxed),
            static_fallback_misses: self.static_fallback_misses.load(Ordering::Relaxed),
            skipped_records: self.skipped_records.load(Ordering::Relaxed),
            trip_matches: self.trip_matches.load(Ordering::Relaxed),
            last_cycle_epoch: self.last_cycle_epoch.load(Ordering::Relaxed),
        }
    }
}
