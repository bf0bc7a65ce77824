// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Coordinate { lat, lng }
    }

    /// Straight chord between two coordinates, `fraction` in [0, 1].
    pub fn lerp(&self, other: &Coordinate, fraction: f64) -> Coordinate {
        Coordinate {
            lat: self.lat + (other.lat - self.lat) * fraction,
            lng: self.lng + (other.lng - self.lng) * fraction,
        }
    }

    pub fn midpoint(&self, other: &Coordinate) -> Coordinate {
        Coordinate {
            lat: (self.lat + other.lat) / 2.0,
            lng: (self.lng + other.lng) / 2.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    pub name: String,
    #[serde(rename = "railwayId")]
    pub railway_id: Option<String>,
}

impl Station {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng)
    }
}

/// One row of a trip's stop pattern. Times are seconds since local midnight
/// and may run past 86400 for trips that cross midnight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduledStop {
    pub stop_id: String,
    pub arrival: Option<u32>,
    pub departure: Option<u32>,
    pub sequence: u32,
}

impl ScheduledStop {
    /// Time the vehicle leaves this stop, `departure ?? arrival`.
    pub fn leaving_time(&self) -> Option<u32> {
        self.departure.or(self.arrival)
    }

    /// Time the vehicle reaches this stop, `arrival ?? departure`.
    pub fn reaching_time(&self) -> Option<u32> {
        self.arrival.or(self.departure)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StaticTrip {
    pub id: String,
    pub stops: Vec<ScheduledStop>,
}

impl StaticTrip {
    pub fn first_departure(&self) -> Option<u32> {
        self.stops.first().and_then(|stop| stop.leaving_time())
    }

    pub fn position_of(&self, stop_id: &str) -> Option<usize> {
        self.stops.iter().position(|stop| stop.stop_id == stop_id)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LiveTimetable {
    pub trip_id: String,
    pub railway_id: Option<String>,
    pub stops: Vec<ScheduledStop>,
}

/// Raw per-poll record for one vehicle, consumed by a single reconciliation cycle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RealtimeObservation {
    pub raw_trip_id: Option<String>,
    pub railway_id: Option<String>,
    pub from_station_id: Option<String>,
    pub to_station_id: Option<String>,
    pub delay_seconds: i64,
    pub valid_at: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleStatus {
    #[serde(rename = "STOPPED_AT")]
    StoppedAt,
    #[serde(rename = "IN_TRANSIT_TO")]
    InTransitTo,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub trip_id: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub status: VehicleStatus,
    pub from_stop_id: Option<String>,
    pub to_stop_id: Option<String>,
    pub progress: f64,
    pub timestamp: Option<u64>,
    pub interpolated: bool,
}

impl Vehicle {
    pub fn position(&self) -> Option<Coordinate> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(Coordinate::new(lat, lng)),
            _ => None,
        }
    }

    // lat and lng are always written together
    pub fn set_position(&mut self, position: Option<Coordinate>) {
        self.lat = position.map(|p| p.lat);
        self.lng = position.map(|p| p.lng);
    }

    pub fn has_position(&self) -> bool {
        self.lat.is_some() && self.lng.is_some()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub ts: u64,
    pub seq: u64,
    pub version: u64,
    #[serde(rename = "railwayId")]
    pub railway_id: Option<String>,
    pub vehicles: Vec<Vehicle>,
}

/// A published vehicle set. Replaced whole, never edited in place.
pub type VehicleSet = Arc<[Vehicle]>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_is_written_in_pairs() {
        let mut vehicle = Vehicle {
            trip_id: String::from("JR-East.Yamanote.401G"),
            lat: None,
            lng: None,
            status: VehicleStatus::StoppedAt,
            from_stop_id: None,
            to_stop_id: None,
            progress: 0.0,
            timestamp: None,
            interpolated: false,
        };

        vehicle.set_position(Some(Coordinate::new(35.68, 139.76)));
        assert_eq!(vehicle.position(), Some(Coordinate::new(35.68, 139.76)));

        vehicle.set_position(None);
        assert!(vehicle.lat.is_none() && vehicle.lng.is_none());
    }

    #[test]
    fn status_serializes_as_gtfs_rt_names() {
        let json = serde_json::to_string(&VehicleStatus::InTransitTo).unwrap();
        assert_eq!(json, "\"IN_TRANSIT_TO\"");
    }

    #[test]
    fn stop_time_fallbacks() {
        let stop = ScheduledStop {
            stop_id: String::from("A"),
            arrival: Some(100),
            departure: None,
            sequence: 1,
        };
        assert_eq!(stop.leaving_time(), Some(100));
        assert_eq!(stop.reaching_time(), Some(100));
    }
}
