// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use crate::interpolation::{interpolate, PositionFix};
use crate::schedule::{LiveTimetables, StaticSchedule};
use crate::stop_matching::{StationIndex, StationMapping};
use crate::trip_matcher::TripMatcher;
use serde::Serialize;

/// Ways of placing a vehicle that is between two stations, in the order they are tried.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum PositionStrategy {
    /// Interpolate along the live feed's own timetable for this train.
    LiveTimetable,
    /// Halfway between the two stations.
    Midpoint,
    /// Match the train to a static schedule trip and interpolate along that.
    StaticSchedule,
}

/// Everything a strategy needs to know about one moving vehicle.
#[derive(Clone, Copy, Debug)]
pub struct SegmentQuery<'a> {
    pub raw_trip_id: &'a str,
    pub trip_id: &'a str,
    pub from_station_id: &'a str,
    pub to_station_id: &'a str,
    pub current_time_sec: i64,
    pub delay_sec: i64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StaticFallbackMiss {
    #[error("no static trip matches live trip {0}")]
    NoTripMatch(String),
    #[error("station {0} has no static counterpart")]
    UnmappedStation(String),
    #[error("static trip {trip_id} does not serve {from} -> {to} with usable times and coordinates")]
    SegmentNotServed {
        trip_id: String,
        from: String,
        to: String,
    },
    #[error("matched static trip {0} is missing from the schedule")]
    MissingTrip(String),
}

pub fn live_timetable_position(
    timetables: &LiveTimetables,
    live_stations: &StationIndex,
    query: &SegmentQuery,
) -> Option<PositionFix> {
    let timetable = timetables.lookup(query.raw_trip_id, query.trip_id)?;

    interpolate(
        &timetable.stops,
        query.from_station_id,
        query.to_station_id,
        query.current_time_sec,
        query.delay_sec,
        live_stations,
    )
}

pub fn midpoint_position(live_stations: &StationIndex, query: &SegmentQuery) -> Option<PositionFix> {
    let from = live_stations.coordinate(query.from_station_id)?;
    let to = live_stations.coordinate(query.to_station_id)?;

    Some(PositionFix {
        position: from.midpoint(&to),
        progress: 0.5,
    })
}

/// Static schedule fallback. Every reason for not producing a position is
/// reported so the caller can log it and move on to the next vehicle.
pub fn static_schedule_position(
    matcher: &mut TripMatcher,
    schedule: &StaticSchedule,
    mapping: &StationMapping,
    query: &SegmentQuery,
) -> Result<PositionFix, StaticFallbackMiss> {
    let static_trip_id = matcher
        .match_trip(
            schedule,
            mapping,
            query.trip_id,
            query.current_time_sec,
            Some(query.from_station_id),
            Some(query.to_station_id),
        )
        .ok_or_else(|| StaticFallbackMiss::NoTripMatch(query.trip_id.to_string()))?;

    let trip = schedule
        .trip(&static_trip_id)
        .ok_or_else(|| StaticFallbackMiss::MissingTrip(static_trip_id.clone()))?;

    let from = mapping
        .resolve(query.from_station_id)
        .ok_or_else(|| StaticFallbackMiss::UnmappedStation(query.from_station_id.to_string()))?;
    let to = mapping
        .resolve(query.to_station_id)
        .ok_or_else(|| StaticFallbackMiss::UnmappedStation(query.to_station_id.to_string()))?;

    interpolate(
        &trip.stops,
        from,
        to,
        query.current_time_sec,
        query.delay_sec,
        &schedule.stations,
    )
    .ok_or_else(|| StaticFallbackMiss::SegmentNotServed {
        trip_id: static_trip_id.clone(),
        from: from.to_string(),
        to: to.to_string(),
    })
}
