// Copyright Catenary Transit Initiatives
// Spatial matching between the live feed's station ids and the static schedule's stop ids

use crate::models::{Coordinate, Station};
use ahash::AHashMap;

pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const DEFAULT_MAX_MATCH_DISTANCE_KM: f64 = 0.3;

pub fn haversine_distance_km(a: &Coordinate, b: &Coordinate) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Live station id to static stop id, built once at startup.
///
/// A live station maps to the nearest static stop if that stop is strictly
/// closer than the threshold. Stations with nothing close enough stay unmapped.
/// When two static stops are equally close the first one in iteration order
/// wins; callers should not rely on which one that is.
#[derive(Clone, Debug, Default)]
pub struct StationMapping {
    live_to_static: AHashMap<String, String>,
}

impl StationMapping {
    pub fn build(
        live_stations: &[Station],
        static_stations: &[Station],
        max_distance_km: f64,
    ) -> StationMapping {
        let mut live_to_static = AHashMap::with_capacity(live_stations.len());

        for live in live_stations {
            let live_coord = live.coordinate();

            let mut nearest: Option<(&Station, f64)> = None;

            for candidate in static_stations {
                let distance = haversine_distance_km(&live_coord, &candidate.coordinate());

                match nearest {
                    Some((_, best)) if distance >= best => {}
                    _ => nearest = Some((candidate, distance)),
                }
            }

            if let Some((station, distance)) = nearest {
                if distance < max_distance_km {
                    live_to_static.insert(live.id.clone(), station.id.clone());
                }
            }
        }

        StationMapping { live_to_static }
    }

    pub fn resolve(&self, live_station_id: &str) -> Option<&str> {
        self.live_to_static
            .get(live_station_id)
            .map(|static_id| static_id.as_str())
    }

    pub fn len(&self) -> usize {
        self.live_to_static.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live_to_static.is_empty()
    }
}

/// Station coordinates keyed by id, one index per namespace.
#[derive(Clone, Debug, Default)]
pub struct StationIndex {
    stations: AHashMap<String, Station>,
}

impl StationIndex {
    pub fn new(stations: Vec<Station>) -> Self {
        StationIndex {
            stations: stations
                .into_iter()
                .map(|station| (station.id.clone(), station))
                .collect(),
        }
    }

    pub fn coordinate(&self, id: &str) -> Option<Coordinate> {
        self.stations.get(id).map(|station| station.coordinate())
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Station> {
        let mut stations: Vec<Station> = self.stations.values().cloned().collect();
        stations.sort_by(|a, b| a.id.cmp(&b.id));
        stations
    }
}
