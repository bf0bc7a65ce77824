// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use crate::models::{Coordinate, ScheduledStop};
use crate::stop_matching::StationIndex;
use serde::Serialize;

pub trait CoordinateLookup {
    fn coordinate_of(&self, stop_id: &str) -> Option<Coordinate>;
}

impl CoordinateLookup for StationIndex {
    fn coordinate_of(&self, stop_id: &str) -> Option<Coordinate> {
        self.coordinate(stop_id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PositionFix {
    pub position: Coordinate,
    pub progress: f64,
}

/// Scheduled segment between two stops, with the delay already applied.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentWindow {
    pub adjusted_departure: i64,
    pub adjusted_arrival: i64,
}

pub const SECONDS_PER_DAY: i64 = 86_400;

impl SegmentWindow {
    /// Brings a wall clock reading onto the timetable's axis. Segments of
    /// trips that run past midnight are timed past 86400, so after midnight
    /// the clock is read one day later when that lands nearer the segment.
    pub fn service_time(&self, current_time_sec: i64) -> i64 {
        if self.adjusted_arrival <= SECONDS_PER_DAY || current_time_sec >= SECONDS_PER_DAY {
            return current_time_sec;
        }

        let midpoint = (self.adjusted_departure + self.adjusted_arrival) / 2;
        let next_day = current_time_sec + SECONDS_PER_DAY;

        if (next_day - midpoint).abs() < (current_time_sec - midpoint).abs() {
            next_day
        } else {
            current_time_sec
        }
    }

    pub fn contains(&self, current_time_sec: i64) -> bool {
        (self.adjusted_departure..=self.adjusted_arrival).contains(&self.service_time(current_time_sec))
    }

    pub fn progress_at(&self, current_time_sec: i64) -> f64 {
        let current_time_sec = self.service_time(current_time_sec);
        let elapsed = (current_time_sec - self.adjusted_departure) as f64;
        let duration = (self.adjusted_arrival - self.adjusted_departure) as f64;

        (elapsed / duration).clamp(0.0, 1.0)
    }
}

/// Finds `from_stop_id` and the first occurrence of `to_stop_id` after it.
/// Loop lines visit their terminal twice, so `to` is searched after `from`.
pub fn locate_segment(
    stops: &[ScheduledStop],
    from_stop_id: &str,
    to_stop_id: &str,
) -> Option<(usize, usize)> {
    let from_idx = stops.iter().position(|stop| stop.stop_id == from_stop_id)?;

    let to_idx = stops[from_idx + 1..]
        .iter()
        .position(|stop| stop.stop_id == to_stop_id)?
        + from_idx
        + 1;

    Some((from_idx, to_idx))
}

pub fn segment_window(
    stops: &[ScheduledStop],
    from_stop_id: &str,
    to_stop_id: &str,
    delay_sec: i64,
) -> Option<SegmentWindow> {
    let (from_idx, to_idx) = locate_segment(stops, from_stop_id, to_stop_id)?;

    let departure = stops[from_idx].leaving_time()? as i64;
    let arrival = stops[to_idx].reaching_time()? as i64;

    if arrival <= departure {
        return None;
    }

    Some(SegmentWindow {
        adjusted_departure: departure + delay_sec,
        adjusted_arrival: arrival + delay_sec,
    })
}

/// Time based position between two stops of a trip.
///
/// Progress is the delay adjusted elapsed fraction of the scheduled running
/// time, clamped to [0, 1]. The coordinate is the straight chord between the
/// two stops, there is no track geometry to follow.
pub fn interpolate<C>(
    stops: &[ScheduledStop],
    from_stop_id: &str,
    to_stop_id: &str,
    current_time_sec: i64,
    delay_sec: i64,
    coordinates: &C,
) -> Option<PositionFix>
where
    C: CoordinateLookup + ?Sized,
{
    let window = segment_window(stops, from_stop_id, to_stop_id, delay_sec)?;

    let from = coordinates.coordinate_of(from_stop_id)?;
    let to = coordinates.coordinate_of(to_stop_id)?;

    let progress = window.progress_at(current_time_sec);

    Some(PositionFix {
        position: from.lerp(&to, progress),
        progress,
    })
}
