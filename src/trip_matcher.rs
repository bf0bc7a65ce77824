// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! Resolves live feed trip ids to static schedule trip ids.
//!
//! The two feeds share no trip identifiers, only train numbers embedded in
//! them. Candidates are every static trip whose id contains the live train
//! number, scored by how close their first departure is to now and whether
//! they serve the vehicle's current segment.

use crate::id_cleanup::train_number_token;
use crate::interpolation::{locate_segment, segment_window};
use crate::models::StaticTrip;
use crate::schedule::StaticSchedule;
use crate::stop_matching::StationMapping;
use ahash::AHashMap;
use chrono::NaiveDate;
use tracing::debug;

pub const SERVES_STOP_BONUS: i64 = 10_000;
pub const IN_ORDER_BONUS: i64 = 1_000;
pub const IN_WINDOW_BONUS: i64 = 500;

// base score for a candidate with no usable first departure, two days away
const NO_DEPARTURE_BASE: i64 = -172_800;

/// Score of one static trip as the identity of a live trip. Higher is better.
///
/// `from_stop_id`/`to_stop_id` are already translated to static stop ids.
pub fn score_candidate(
    trip: &StaticTrip,
    current_time_sec: i64,
    from_stop_id: Option<&str>,
    to_stop_id: Option<&str>,
) -> i64 {
    let mut score = match trip.first_departure() {
        Some(first_departure) => -(current_time_sec - first_departure as i64).abs(),
        None => NO_DEPARTURE_BASE,
    };

    if from_stop_id.is_some_and(|id| trip.position_of(id).is_some()) {
        score += SERVES_STOP_BONUS;
    }

    if to_stop_id.is_some_and(|id| trip.position_of(id).is_some()) {
        score += SERVES_STOP_BONUS;
    }

    // same lookup the interpolator uses, so loop lines order on the next visit
    if let (Some(from_stop_id), Some(to_stop_id)) = (from_stop_id, to_stop_id) {
        if locate_segment(&trip.stops, from_stop_id, to_stop_id).is_some() {
            score += IN_ORDER_BONUS;

            if segment_window(&trip.stops, from_stop_id, to_stop_id, 0)
                .is_some_and(|window| window.contains(current_time_sec))
            {
                score += IN_WINDOW_BONUS;
            }
        }
    }

    score
}

/// Memoized live trip id to static trip id resolution.
///
/// A resolved id is never re-scored for the rest of the service day. Changing
/// the service day, or calling [`TripMatcher::invalidate`] after a schedule
/// reload, drops every memoized match.
#[derive(Debug, Default)]
pub struct TripMatcher {
    service_date: Option<NaiveDate>,
    memo: AHashMap<String, String>,
}

impl TripMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the date changed and the memo was cleared.
    pub fn begin_service_day(&mut self, service_date: NaiveDate) -> bool {
        match self.service_date {
            Some(current) if current == service_date => false,
            previous => {
                if previous.is_some() {
                    debug!(
                        "service day rolled to {}, dropping {} trip matches",
                        service_date,
                        self.memo.len()
                    );
                }
                self.memo.clear();
                self.service_date = Some(service_date);
                previous.is_some()
            }
        }
    }

    pub fn invalidate(&mut self) {
        self.memo.clear();
    }

    pub fn cached(&self, live_trip_id: &str) -> Option<&str> {
        self.memo.get(live_trip_id).map(|id| id.as_str())
    }

    pub fn len(&self) -> usize {
        self.memo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memo.is_empty()
    }

    pub fn match_trip(
        &mut self,
        schedule: &StaticSchedule,
        mapping: &StationMapping,
        live_trip_id: &str,
        current_time_sec: i64,
        from_live_station_id: Option<&str>,
        to_live_station_id: Option<&str>,
    ) -> Option<String> {
        if let Some(static_trip_id) = self.memo.get(live_trip_id) {
            return Some(static_trip_id.clone());
        }

        let from_stop_id = from_live_station_id.and_then(|id| mapping.resolve(id));
        let to_stop_id = to_live_station_id.and_then(|id| mapping.resolve(id));

        let best = best_candidate(
            schedule,
            live_trip_id,
            current_time_sec,
            from_stop_id,
            to_stop_id,
        )?;

        debug!("matched live trip {} to static trip {}", live_trip_id, best);

        self.memo.insert(live_trip_id.to_string(), best.clone());

        Some(best)
    }
}

fn best_candidate(
    schedule: &StaticSchedule,
    live_trip_id: &str,
    current_time_sec: i64,
    from_stop_id: Option<&str>,
    to_stop_id: Option<&str>,
) -> Option<String> {
    let token = train_number_token(live_trip_id)?;

    let mut best: Option<(&StaticTrip, i64)> = None;

    for trip in schedule.trips().iter().filter(|trip| trip.id.contains(token)) {
        let score = score_candidate(trip, current_time_sec, from_stop_id, to_stop_id);

        // strictly greater so the first seen candidate keeps a tie
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((trip, score)),
        }
    }

    best.map(|(trip, _)| trip.id.clone())
}
