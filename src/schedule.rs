// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use crate::id_cleanup::normalize_trip_id;
use crate::models::{LiveTimetable, StaticTrip};
use crate::stop_matching::StationIndex;
use ahash::AHashMap;

/// Static schedule corpus: stops with coordinates and trips with their stop pattern.
///
/// Trips are held in trip id order, which is the iteration order the trip
/// matcher uses to break score ties.
#[derive(Clone, Debug, Default)]
pub struct StaticSchedule {
    pub stations: StationIndex,
    trips: Vec<StaticTrip>,
    trip_index: AHashMap<String, usize>,
}

impl StaticSchedule {
    pub fn new(stations: StationIndex, mut trips: Vec<StaticTrip>) -> Self {
        trips.sort_by(|a, b| a.id.cmp(&b.id));

        for trip in trips.iter_mut() {
            trip.stops.sort_by_key(|stop| stop.sequence);
        }

        let trip_index = trips
            .iter()
            .enumerate()
            .map(|(idx, trip)| (trip.id.clone(), idx))
            .collect();

        StaticSchedule {
            stations,
            trips,
            trip_index,
        }
    }

    pub fn trip(&self, trip_id: &str) -> Option<&StaticTrip> {
        self.trip_index.get(trip_id).map(|idx| &self.trips[*idx])
    }

    pub fn trips(&self) -> &[StaticTrip] {
        &self.trips
    }

    pub fn trip_count(&self) -> usize {
        self.trips.len()
    }
}

/// Live timetables, reachable by both the raw and the normalized trip id.
#[derive(Clone, Debug, Default)]
pub struct LiveTimetables {
    by_trip_id: AHashMap<String, LiveTimetable>,
    normalized_to_raw: AHashMap<String, String>,
}

impl LiveTimetables {
    pub fn new(timetables: Vec<LiveTimetable>) -> Self {
        let mut by_trip_id = AHashMap::with_capacity(timetables.len());
        let mut normalized_to_raw = AHashMap::with_capacity(timetables.len());

        for mut timetable in timetables {
            timetable.stops.sort_by_key(|stop| stop.sequence);

            let normalized = normalize_trip_id(&timetable.trip_id);
            if normalized != timetable.trip_id {
                normalized_to_raw.insert(normalized, timetable.trip_id.clone());
            }

            by_trip_id.insert(timetable.trip_id.clone(), timetable);
        }

        LiveTimetables {
            by_trip_id,
            normalized_to_raw,
        }
    }

    /// Raw id first, then the normalized id.
    pub fn lookup(&self, raw_trip_id: &str, normalized_trip_id: &str) -> Option<&LiveTimetable> {
        self.get(raw_trip_id).or_else(|| self.get(normalized_trip_id))
    }

    pub fn get(&self, trip_id: &str) -> Option<&LiveTimetable> {
        self.by_trip_id.get(trip_id).or_else(|| {
            self.normalized_to_raw
                .get(trip_id)
                .and_then(|raw| self.by_trip_id.get(raw))
        })
    }

    pub fn len(&self) -> usize {
        self.by_trip_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_trip_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LiveTimetable> {
        self.by_trip_id.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScheduledStop;

    fn stop(id: &str, sequence: u32) -> ScheduledStop {
        ScheduledStop {
            stop_id: id.to_string(),
            arrival: None,
            departure: Some(sequence * 60),
            sequence,
        }
    }

    #[test]
    fn timetables_by_raw_and_normalized_id() {
        let timetables = LiveTimetables::new(vec![LiveTimetable {
            trip_id: String::from("odpt.Train:JR-East.Yamanote.401G"),
            railway_id: Some(String::from("JR-East.Yamanote")),
            stops: vec![stop("B", 2), stop("A", 1)],
        }]);

        let by_raw = timetables.get("odpt.Train:JR-East.Yamanote.401G").unwrap();
        let by_normalized = timetables.get("JR-East.Yamanote.401G").unwrap();

        assert_eq!(by_raw, by_normalized);
        assert_eq!(by_raw.stops[0].stop_id, "A");
        assert!(timetables.get("JR-East.Yamanote.999G").is_none());
    }

    #[test]
    fn static_trips_sorted() {
        let schedule = StaticSchedule::new(
            StationIndex::default(),
            vec![
                StaticTrip {
                    id: String::from("b"),
                    stops: vec![stop("Y", 2), stop("X", 1)],
                },
                StaticTrip {
                    id: String::from("a"),
                    stops: vec![],
                },
            ],
        );

        assert_eq!(schedule.trips()[0].id, "a");
        assert_eq!(schedule.trip("b").unwrap().stops[0].stop_id, "X");
    }
}
