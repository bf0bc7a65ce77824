// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use crate::id_cleanup::{normalize_railway_id, normalize_trip_id};
use crate::models::{LiveTimetable, RealtimeObservation, Station, Vehicle, VehicleStatus};
use crate::position_strategies::{
    live_timetable_position, midpoint_position, static_schedule_position, PositionStrategy,
    SegmentQuery,
};
use crate::schedule::{LiveTimetables, StaticSchedule};
use crate::stats::ReconcileStats;
use crate::stop_matching::{StationIndex, StationMapping};
use crate::timestamp_extraction::observation_timestamp_or;
use crate::trip_matcher::TripMatcher;
use crate::vehicle_cache::VehicleCache;
use chrono::{DateTime, NaiveDate, Timelike};
use chrono_tz::Tz;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Railway key used for vehicles published without a railway.
pub const ALL_RAILWAYS_KEY: &str = "__ALL__";

/// Stations, timetables and the static schedule, loaded once at startup and
/// shared read-only between the reconciliation task and the HTTP handlers.
#[derive(Debug, Default)]
pub struct ReferenceData {
    pub live_stations: StationIndex,
    pub timetables: LiveTimetables,
    pub static_schedule: Option<StaticSchedule>,
    pub mapping: StationMapping,
}

impl ReferenceData {
    pub fn new(
        live_stations: Vec<Station>,
        timetables: Vec<LiveTimetable>,
        static_schedule: Option<StaticSchedule>,
        max_match_distance_km: f64,
    ) -> Self {
        let mapping = match &static_schedule {
            Some(schedule) => StationMapping::build(
                &live_stations,
                &schedule.stations.to_vec(),
                max_match_distance_km,
            ),
            None => StationMapping::default(),
        };

        ReferenceData {
            live_stations: StationIndex::new(live_stations),
            timetables: LiveTimetables::new(timetables),
            static_schedule,
            mapping,
        }
    }

    pub fn static_station_count(&self) -> usize {
        self.static_schedule
            .as_ref()
            .map(|schedule| schedule.stations.len())
            .unwrap_or(0)
    }

    pub fn static_trip_count(&self) -> usize {
        self.static_schedule
            .as_ref()
            .map(|schedule| schedule.trip_count())
            .unwrap_or(0)
    }
}

/// Wall clock for one cycle, in epoch seconds and in service local time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServiceClock {
    pub now_epoch: u64,
    pub service_date: NaiveDate,
    pub seconds_since_midnight: i64,
}

impl ServiceClock {
    pub fn at(now_epoch: u64, service_tz: &Tz) -> Option<Self> {
        let utc = DateTime::from_timestamp(i64::try_from(now_epoch).ok()?, 0)?;
        let local = utc.with_timezone(service_tz);

        Some(ServiceClock {
            now_epoch,
            service_date: local.date_naive(),
            seconds_since_midnight: i64::from(local.num_seconds_from_midnight()),
        })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ReconcileOptions {
    pub service_tz: Tz,
    /// Try the static schedule before falling back to the midpoint.
    pub prefer_static_over_midpoint: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        ReconcileOptions {
            service_tz: chrono_tz::Asia::Tokyo,
            prefer_static_over_midpoint: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlacedVehicle {
    pub railway_id: Option<String>,
    pub vehicle: Vehicle,
    pub source: Option<PositionStrategy>,
    pub delay_sec: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub vehicles: usize,
    pub positioned: usize,
    pub published_keys: Vec<String>,
    pub pruned_trips: usize,
}

/// Turns one poll's observations into published vehicle sets.
///
/// Owns the trip matcher, so only one task may run cycles.
pub struct Reconciler {
    reference: Arc<ReferenceData>,
    matcher: TripMatcher,
    options: ReconcileOptions,
    stats: Arc<ReconcileStats>,
    published_keys: BTreeSet<String>,
}

impl Reconciler {
    pub fn new(
        reference: Arc<ReferenceData>,
        options: ReconcileOptions,
        stats: Arc<ReconcileStats>,
    ) -> Self {
        Reconciler {
            reference,
            matcher: TripMatcher::new(),
            options,
            stats,
            published_keys: BTreeSet::new(),
        }
    }

    pub fn matcher(&self) -> &TripMatcher {
        &self.matcher
    }

    pub fn clock_at(&self, now_epoch: u64) -> Option<ServiceClock> {
        ServiceClock::at(now_epoch, &self.options.service_tz)
    }

    /// Swaps in freshly loaded reference data. Memoized trip matches refer to
    /// the old static schedule, so they are dropped.
    pub fn replace_reference(&mut self, reference: Arc<ReferenceData>) {
        self.reference = reference;
        self.matcher.invalidate();
    }

    pub fn reconcile(
        &mut self,
        observations: &[RealtimeObservation],
        clock: &ServiceClock,
    ) -> Vec<PlacedVehicle> {
        self.matcher.begin_service_day(clock.service_date);

        let mut placed: Vec<PlacedVehicle> = Vec::with_capacity(observations.len());

        for observation in observations {
            match self.place(observation, clock) {
                Some(vehicle) => placed.push(vehicle),
                None => ReconcileStats::bump(&self.stats.skipped_records),
            }
        }

        self.static_fallback_pass(&mut placed, clock);

        if self.options.prefer_static_over_midpoint {
            self.deferred_midpoint_pass(&mut placed);
        }

        for vehicle in &placed {
            match vehicle.source {
                Some(PositionStrategy::LiveTimetable) => {
                    ReconcileStats::bump(&self.stats.live_timetable_fixes)
                }
                Some(PositionStrategy::Midpoint) => ReconcileStats::bump(&self.stats.midpoint_fixes),
                Some(PositionStrategy::StaticSchedule) => {
                    ReconcileStats::bump(&self.stats.static_fallback_fixes)
                }
                None => {}
            }
        }

        ReconcileStats::set(&self.stats.trip_matches, self.matcher.len() as u64);

        placed
    }

    fn place(&self, observation: &RealtimeObservation, clock: &ServiceClock) -> Option<PlacedVehicle> {
        let raw_trip_id = observation
            .raw_trip_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())?;

        let trip_id = normalize_trip_id(raw_trip_id);

        if trip_id.is_empty() {
            return None;
        }

        let from_station_id = observation.from_station_id.as_deref();
        let to_station_id = observation.to_station_id.as_deref();

        let mut vehicle = Vehicle {
            trip_id,
            lat: None,
            lng: None,
            status: VehicleStatus::StoppedAt,
            from_stop_id: observation.from_station_id.clone(),
            to_stop_id: observation.to_station_id.clone(),
            progress: 0.0,
            timestamp: Some(observation_timestamp_or(
                observation.valid_at.as_deref(),
                &self.options.service_tz,
                clock.now_epoch,
            )),
            interpolated: false,
        };

        let mut source = None;

        match (from_station_id, to_station_id) {
            (from, None) => {
                vehicle.set_position(from.and_then(|from| self.reference.live_stations.coordinate(from)));
            }
            (from, Some(to)) => {
                vehicle.status = VehicleStatus::InTransitTo;

                if let Some(from) = from {
                    let query = SegmentQuery {
                        raw_trip_id,
                        trip_id: &vehicle.trip_id,
                        from_station_id: from,
                        to_station_id: to,
                        current_time_sec: clock.seconds_since_midnight,
                        delay_sec: observation.delay_seconds,
                    };

                    let fix = live_timetable_position(
                        &self.reference.timetables,
                        &self.reference.live_stations,
                        &query,
                    )
                    .map(|fix| (fix, PositionStrategy::LiveTimetable))
                    .or_else(|| {
                        if self.options.prefer_static_over_midpoint {
                            None
                        } else {
                            midpoint_position(&self.reference.live_stations, &query)
                                .map(|fix| (fix, PositionStrategy::Midpoint))
                        }
                    });

                    if let Some((fix, strategy)) = fix {
                        vehicle.set_position(Some(fix.position));
                        vehicle.progress = fix.progress;
                        source = Some(strategy);
                    }
                }
            }
        }

        Some(PlacedVehicle {
            railway_id: observation
                .railway_id
                .as_deref()
                .map(normalize_railway_id)
                .filter(|railway| !railway.is_empty()),
            vehicle,
            source,
            delay_sec: observation.delay_seconds,
        })
    }

    // only fills vehicles that have no position yet
    fn static_fallback_pass(&mut self, placed: &mut [PlacedVehicle], clock: &ServiceClock) {
        let reference = &self.reference;
        let matcher = &mut self.matcher;

        let Some(schedule) = reference.static_schedule.as_ref() else {
            return;
        };

        for entry in placed.iter_mut() {
            if entry.vehicle.has_position() {
                continue;
            }

            let (Some(from), Some(to)) = (
                entry.vehicle.from_stop_id.as_deref(),
                entry.vehicle.to_stop_id.as_deref(),
            ) else {
                continue;
            };

            let query = SegmentQuery {
                raw_trip_id: &entry.vehicle.trip_id,
                trip_id: &entry.vehicle.trip_id,
                from_station_id: from,
                to_station_id: to,
                current_time_sec: clock.seconds_since_midnight,
                delay_sec: entry.delay_sec,
            };

            match static_schedule_position(matcher, schedule, &reference.mapping, &query) {
                Ok(fix) => {
                    entry.vehicle.set_position(Some(fix.position));
                    entry.vehicle.progress = fix.progress;
                    entry.vehicle.interpolated = true;
                    entry.source = Some(PositionStrategy::StaticSchedule);
                }
                Err(miss) => {
                    debug!("static fallback for {}: {}", entry.vehicle.trip_id, miss);
                    ReconcileStats::bump(&self.stats.static_fallback_misses);
                }
            }
        }
    }

    fn deferred_midpoint_pass(&self, placed: &mut [PlacedVehicle]) {
        for entry in placed.iter_mut() {
            if entry.vehicle.has_position() || entry.vehicle.status != VehicleStatus::InTransitTo {
                continue;
            }

            let (Some(from), Some(to)) = (
                entry.vehicle.from_stop_id.as_deref(),
                entry.vehicle.to_stop_id.as_deref(),
            ) else {
                continue;
            };

            let query = SegmentQuery {
                raw_trip_id: &entry.vehicle.trip_id,
                trip_id: &entry.vehicle.trip_id,
                from_station_id: from,
                to_station_id: to,
                current_time_sec: 0,
                delay_sec: 0,
            };

            if let Some(fix) = midpoint_position(&self.reference.live_stations, &query) {
                entry.vehicle.set_position(Some(fix.position));
                entry.vehicle.progress = fix.progress;
                entry.source = Some(PositionStrategy::Midpoint);
            }
        }
    }

    /// Reconciles, groups by railway and publishes one poll.
    ///
    /// With `railway_key` set every vehicle lands under that key. Without it,
    /// vehicles are grouped by their own railway, and a key published in an
    /// earlier cycle but missing from this one is republished empty.
    pub fn run_cycle(
        &mut self,
        observations: &[RealtimeObservation],
        clock: &ServiceClock,
        railway_key: Option<&str>,
        cache: &VehicleCache,
    ) -> CycleReport {
        let placed = self.reconcile(observations, clock);

        let vehicle_count = placed.len();
        let positioned = placed.iter().filter(|p| p.vehicle.has_position()).count();

        let trip_ids: Vec<String> = placed.iter().map(|p| p.vehicle.trip_id.clone()).collect();

        let mut groups: BTreeMap<String, Vec<Vehicle>> = BTreeMap::new();

        match railway_key {
            Some(key) => {
                groups.insert(
                    key.to_string(),
                    placed.into_iter().map(|p| p.vehicle).collect(),
                );
            }
            None => {
                for entry in placed {
                    let key = entry
                        .railway_id
                        .unwrap_or_else(|| ALL_RAILWAYS_KEY.to_string());
                    groups.entry(key).or_default().push(entry.vehicle);
                }

                for vanished in self.published_keys.iter() {
                    if !groups.contains_key(vanished) {
                        groups.insert(vanished.clone(), Vec::new());
                    }
                }
            }
        }

        let published_keys: Vec<String> = groups.keys().cloned().collect();

        for (key, vehicles) in groups {
            cache.publish(&key, vehicles);
            self.published_keys.insert(key);
        }

        cache.mark_seen(trip_ids.iter().map(|id| id.as_str()), clock.now_epoch);
        let pruned_trips = cache.prune_last_seen(clock.now_epoch.saturating_sub(cache.ttl_secs()));

        ReconcileStats::bump(&self.stats.cycles);
        ReconcileStats::add(&self.stats.vehicles_reconciled, vehicle_count as u64);
        ReconcileStats::add(&self.stats.vehicles_positioned, positioned as u64);
        ReconcileStats::set(&self.stats.last_cycle_epoch, clock.now_epoch);

        info!(
            "reconciled {} vehicles, {} with positions, published {:?}",
            vehicle_count, positioned, published_keys
        );

        CycleReport {
            vehicles: vehicle_count,
            positioned,
            published_keys,
            pruned_trips,
        }
    }
}
