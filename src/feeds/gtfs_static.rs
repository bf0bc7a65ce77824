// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use super::FeedError;
use crate::models::{ScheduledStop, StaticTrip, Station};
use crate::schedule::StaticSchedule;
use crate::stop_matching::StationIndex;
use gtfs_structures::Gtfs;
use tracing::info;

/// Reads a GTFS directory or zip into the static schedule used by the
/// position fallback. Blocking, run it off the async runtime.
pub fn load_static_schedule(path: &str) -> Result<StaticSchedule, FeedError> {
    let gtfs = Gtfs::new(path).map_err(|source| FeedError::Schedule {
        path: path.to_string(),
        source,
    })?;

    info!(
        "read {} stops and {} trips from {} in {:?}ms",
        gtfs.stops.len(),
        gtfs.trips.len(),
        path,
        gtfs.read_duration
    );

    Ok(schedule_from_gtfs(&gtfs))
}

pub fn schedule_from_gtfs(gtfs: &Gtfs) -> StaticSchedule {
    let stations: Vec<Station> = gtfs
        .stops
        .values()
        .filter_map(|stop| match (stop.latitude, stop.longitude) {
            (Some(lat), Some(lng)) => Some(Station {
                id: stop.id.clone(),
                lat,
                lng,
                name: stop.name.clone().unwrap_or_default(),
                railway_id: None,
            }),
            _ => None,
        })
        .collect();

    let trips: Vec<StaticTrip> = gtfs
        .trips
        .values()
        .map(|trip| StaticTrip {
            id: trip.id.clone(),
            stops: trip
                .stop_times
                .iter()
                .map(|stop_time| ScheduledStop {
                    stop_id: stop_time.stop.id.clone(),
                    arrival: stop_time.arrival_time,
                    departure: stop_time.departure_time,
                    sequence: stop_time.stop_sequence as u32,
                })
                .collect(),
        })
        .collect();

    StaticSchedule::new(StationIndex::new(stations), trips)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_feed(dir: &std::path::Path) {
        fs::create_dir_all(dir).unwrap();

        fs::write(
            dir.join("agency.txt"),
            "agency_id,agency_name,agency_url,agency_timezone\nJRE,JR East,https://www.jreast.co.jp,Asia/Tokyo\n",
        )
        .unwrap();
        fs::write(
            dir.join("stops.txt"),
            "stop_id,stop_name,stop_lat,stop_lon\nTOKYO,Tokyo,35.681236,139.767125\nKANDA,Kanda,35.69169,139.770883\nOCHA,Ochanomizu,35.699605,139.765025\n",
        )
        .unwrap();
        fs::write(
            dir.join("routes.txt"),
            "route_id,agency_id,route_short_name,route_long_name,route_type\nCHUO,JRE,JC,Chuo Rapid,2\n",
        )
        .unwrap();
        fs::write(
            dir.join("calendar.txt"),
            "service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday,start_date,end_date\nWD,1,1,1,1,1,0,0,20240101,20241231\n",
        )
        .unwrap();
        fs::write(
            dir.join("trips.txt"),
            "route_id,service_id,trip_id\nCHUO,WD,WD_1201T\n",
        )
        .unwrap();
        fs::write(
            dir.join("stop_times.txt"),
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\nWD_1201T,08:10:00,08:11:00,KANDA,2\nWD_1201T,,08:00:00,TOKYO,1\nWD_1201T,08:14:00,,OCHA,3\n",
        )
        .unwrap();
    }

    #[test]
    fn test_load_directory() {
        let dir = std::env::temp_dir().join(format!("nowtrain-gtfs-{}", std::process::id()));
        write_feed(&dir);

        let schedule = load_static_schedule(dir.to_str().unwrap()).unwrap();

        assert_eq!(schedule.stations.len(), 3);
        assert_eq!(schedule.trip_count(), 1);

        let trip = schedule.trip("WD_1201T").unwrap();
        let stop_ids: Vec<&str> = trip.stops.iter().map(|s| s.stop_id.as_str()).collect();
        assert_eq!(stop_ids, vec!["TOKYO", "KANDA", "OCHA"]);

        assert_eq!(trip.stops[0].arrival, None);
        assert_eq!(trip.stops[0].departure, Some(8 * 3600));
        assert_eq!(trip.stops[2].departure, None);
        assert_eq!(trip.first_departure(), Some(8 * 3600));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_path_is_an_error() {
        let result = load_static_schedule("/nonexistent/nowtrain/gtfs");

        assert!(matches!(result, Err(FeedError::Schedule { .. })));
    }
}
