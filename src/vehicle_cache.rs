// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use crate::duration_since_unix_epoch;
use crate::models::{Snapshot, Vehicle, VehicleSet};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const DEFAULT_TTL_SECS: u64 = 15;

/// Latest reconciled vehicles per railway.
///
/// Written by the reconciliation task only, read by every subscriber. Each
/// railway's set is an immutable `Arc<[Vehicle]>` swapped in with a single
/// insert, so a reader holds either the old set or the new one.
///
/// `seq` counts reads. `version` counts publications and is what subscribers
/// use to notice new data.
pub struct VehicleCache {
    ttl_secs: u64,
    seq: AtomicU64,
    version: AtomicU64,
    vehicles_by_railway: DashMap<String, VehicleSet>,
    last_seen_by_trip: DashMap<String, u64>,
}

impl VehicleCache {
    pub fn new(ttl_secs: u64) -> Self {
        VehicleCache {
            ttl_secs,
            seq: AtomicU64::new(0),
            version: AtomicU64::new(0),
            vehicles_by_railway: DashMap::new(),
            last_seen_by_trip: DashMap::new(),
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Replaces the whole vehicle set for `railway_key`.
    pub fn publish(&self, railway_key: &str, vehicles: Vec<Vehicle>) {
        let set: VehicleSet = Arc::from(vehicles);
        self.vehicles_by_railway.insert(railway_key.to_string(), set);
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    pub fn snapshot(&self, railway_filter: Option<&str>) -> Snapshot {
        self.snapshot_at(railway_filter, duration_since_unix_epoch().as_secs())
    }

    pub fn snapshot_at(&self, railway_filter: Option<&str>, now: u64) -> Snapshot {
        let seq = self.seq.fetch_add(1, Ordering::AcqRel) + 1;
        let version = self.version.load(Ordering::Acquire);

        let sets: Vec<VehicleSet> = match railway_filter {
            Some(railway) => self
                .vehicles_by_railway
                .get(railway)
                .map(|set| vec![Arc::clone(set.value())])
                .unwrap_or_default(),
            None => {
                let mut keyed: Vec<(String, VehicleSet)> = self
                    .vehicles_by_railway
                    .iter()
                    .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
                    .collect();
                keyed.sort_by(|a, b| a.0.cmp(&b.0));
                keyed.into_iter().map(|(_, set)| set).collect()
            }
        };

        let vehicles = sets
            .iter()
            .flat_map(|set| set.iter())
            .filter(|vehicle| self.is_fresh(vehicle, now))
            .cloned()
            .collect();

        Snapshot {
            ts: now,
            seq,
            version,
            railway_id: railway_filter.map(|railway| railway.to_string()),
            vehicles,
        }
    }

    // vehicles without a timestamp never expire, a vehicle exactly TTL old is still fresh
    fn is_fresh(&self, vehicle: &Vehicle, now: u64) -> bool {
        match vehicle.timestamp {
            None => true,
            Some(timestamp) => now.saturating_sub(timestamp) <= self.ttl_secs,
        }
    }

    /// Vehicles currently held, before TTL filtering.
    pub fn vehicle_count(&self) -> usize {
        self.vehicles_by_railway
            .iter()
            .map(|entry| entry.value().len())
            .sum()
    }

    pub fn railway_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .vehicles_by_railway
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn mark_seen<'a>(&self, trip_ids: impl IntoIterator<Item = &'a str>, now: u64) {
        for trip_id in trip_ids {
            self.last_seen_by_trip.insert(trip_id.to_string(), now);
        }
    }

    pub fn last_seen(&self, trip_id: &str) -> Option<u64> {
        self.last_seen_by_trip.get(trip_id).map(|entry| *entry.value())
    }

    pub fn tracked_trip_count(&self) -> usize {
        self.last_seen_by_trip.len()
    }

    /// Forgets trips not seen since `cutoff`. Returns how many were dropped.
    pub fn prune_last_seen(&self, cutoff: u64) -> usize {
        let before = self.last_seen_by_trip.len();
        self.last_seen_by_trip.retain(|_, last_seen| *last_seen >= cutoff);
        before - self.last_seen_by_trip.len()
    }
}

impl Default for VehicleCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VehicleStatus;

    fn vehicle(trip_id: &str, timestamp: Option<u64>) -> Vehicle {
        Vehicle {
            trip_id: trip_id.to_string(),
            lat: Some(35.0),
            lng: Some(139.0),
            status: VehicleStatus::InTransitTo,
            from_stop_id: None,
            to_stop_id: None,
            progress: 0.5,
            timestamp,
            interpolated: false,
        }
    }

    #[test]
    fn test_republish_replaces_whole_set() {
        let cache = VehicleCache::new(15);
        let now = 1_700_000_000;

        cache.publish(
            "Yamanote",
            (0..5).map(|i| vehicle(&format!("first{}", i), Some(now))).collect(),
        );
        cache.publish(
            "Yamanote",
            (0..3).map(|i| vehicle(&format!("second{}", i), Some(now))).collect(),
        );

        let snapshot = cache.snapshot_at(Some("Yamanote"), now);

        assert_eq!(snapshot.vehicles.len(), 3);
        assert!(snapshot.vehicles.iter().all(|v| v.trip_id.starts_with("second")));
        assert_eq!(snapshot.railway_id.as_deref(), Some("Yamanote"));
    }

    #[test]
    fn test_ttl_boundary() {
        let cache = VehicleCache::new(15);
        let now = 1_700_000_000;

        cache.publish(
            "ChuoRapid",
            vec![
                vehicle("fresh", Some(now - 3)),
                vehicle("boundary", Some(now - 15)),
                vehicle("stale", Some(now - 16)),
                vehicle("untimed", None),
            ],
        );

        let trip_ids: Vec<String> = cache
            .snapshot_at(None, now)
            .vehicles
            .into_iter()
            .map(|v| v.trip_id)
            .collect();

        assert_eq!(trip_ids, vec!["fresh", "boundary", "untimed"]);
    }

    #[test]
    fn test_vehicles_age_out_between_publishes() {
        let cache = VehicleCache::new(15);
        let now = 1_700_000_000;

        cache.publish("Yamanote", vec![vehicle("a", Some(now))]);

        assert_eq!(cache.snapshot_at(None, now + 10).vehicles.len(), 1);
        assert_eq!(cache.snapshot_at(None, now + 20).vehicles.len(), 0);
        assert_eq!(cache.vehicle_count(), 1);
    }

    #[test]
    fn test_union_and_filter() {
        let cache = VehicleCache::new(15);
        let now = 1_700_000_000;

        cache.publish("Yamanote", vec![vehicle("y1", Some(now))]);
        cache.publish("ChuoRapid", vec![vehicle("c1", Some(now)), vehicle("c2", Some(now))]);

        let all = cache.snapshot_at(None, now);
        let trip_ids: Vec<&str> = all.vehicles.iter().map(|v| v.trip_id.as_str()).collect();
        assert_eq!(trip_ids, vec!["c1", "c2", "y1"]);
        assert!(all.railway_id.is_none());

        assert_eq!(cache.snapshot_at(Some("Ginza"), now).vehicles.len(), 0);
        assert_eq!(cache.railway_keys(), vec!["ChuoRapid", "Yamanote"]);
    }

    #[test]
    fn test_seq_counts_reads_version_counts_publishes() {
        let cache = VehicleCache::new(15);

        let first = cache.snapshot_at(None, 0);
        let second = cache.snapshot_at(None, 0);
        assert!(second.seq > first.seq);
        assert_eq!(first.version, second.version);

        cache.publish("Yamanote", vec![]);
        let third = cache.snapshot_at(None, 0);
        assert!(third.seq > second.seq);
        assert_eq!(third.version, second.version + 1);
    }

    #[test]
    fn test_last_seen_bookkeeping() {
        let cache = VehicleCache::new(15);

        cache.mark_seen(["a", "b"], 100);
        cache.mark_seen(["b"], 200);

        assert_eq!(cache.last_seen("a"), Some(100));
        assert_eq!(cache.last_seen("b"), Some(200));
        assert_eq!(cache.prune_last_seen(150), 1);
        assert_eq!(cache.tracked_trip_count(), 1);
    }

    #[test]
    fn test_concurrent_readers_never_see_a_mix() {
        let cache = Arc::new(VehicleCache::new(u64::MAX));

        cache.publish("Yamanote", (0..5).map(|i| vehicle(&format!("gen0-{}", i), None)).collect());

        let writer = {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for generation in 1..200 {
                    let size = if generation % 2 == 0 { 5 } else { 3 };
                    cache.publish(
                        "Yamanote",
                        (0..size)
                            .map(|i| vehicle(&format!("gen{}-{}", generation, i), None))
                            .collect(),
                    );
                }
            })
        };

        for _ in 0..500 {
            let snapshot = cache.snapshot_at(Some("Yamanote"), 0);
            let prefix = snapshot.vehicles[0].trip_id.split('-').next().unwrap().to_string();
            assert!(snapshot.vehicles.iter().all(|v| v.trip_id.starts_with(&format!("{}-", prefix))));
        }

        writer.join().unwrap();
    }
}
