use nowtrain::feeds::gtfs_static::load_static_schedule;
use nowtrain::feeds::{LiveTimetableFeed, StationSource};
use nowtrain::models::LiveTimetable;
use nowtrain::reconcile::ReferenceData;
use nowtrain::schedule::StaticSchedule;
use tracing::{info, warn};

/// Loads stations, timetables and the static schedule once. Nothing here is
/// fatal: a missing piece only disables the positions that depend on it.
pub async fn load_reference_data<S>(
    source: &S,
    railways: &[String],
    gtfs_path: Option<String>,
    station_match_km: f64,
) -> ReferenceData
where
    S: StationSource + LiveTimetableFeed,
{
    println!("Loading station data...");

    let stations = match source.fetch_stations(None).await {
        Ok(stations) => stations,
        Err(e) => {
            warn!("failed to load stations: {}", e);
            vec![]
        }
    };

    info!("loaded {} stations", stations.len());

    let mut timetables: Vec<LiveTimetable> = vec![];

    for railway in railways {
        match source.fetch_timetables(railway).await {
            Ok(loaded) => {
                info!("loaded {} timetables for {}", loaded.len(), railway);
                timetables.extend(loaded);
            }
            Err(e) => warn!("failed to load timetables for {}: {}", railway, e),
        }
    }

    let static_schedule = match gtfs_path {
        Some(path) => load_static_schedule_off_runtime(path).await,
        None => {
            info!("GTFS_PATH not set, static schedule fallback disabled");
            None
        }
    };

    let reference = ReferenceData::new(stations, timetables, static_schedule, station_match_km);

    info!(
        "reference data ready: {} stations, {} timetables, {} static trips, {} stations mapped",
        reference.live_stations.len(),
        reference.timetables.len(),
        reference.static_trip_count(),
        reference.mapping.len()
    );

    reference
}

async fn load_static_schedule_off_runtime(path: String) -> Option<StaticSchedule> {
    match tokio::task::spawn_blocking(move || load_static_schedule(&path)).await {
        Ok(Ok(schedule)) => Some(schedule),
        Ok(Err(e)) => {
            warn!("{}, static schedule fallback disabled", e);
            None
        }
        Err(e) => {
            warn!("static schedule loader panicked: {}", e);
            None
        }
    }
}
