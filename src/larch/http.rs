use actix_web::{web, HttpResponse, Responder};
use nowtrain::broadcast::Broadcaster;
use nowtrain::duration_since_unix_epoch;
use nowtrain::id_cleanup::{normalize_railway_id, seconds_to_clock_time};
use nowtrain::models::Station;
use nowtrain::reconcile::ReferenceData;
use nowtrain::stats::{ReconcileStats, ReconcileStatsSnapshot};
use nowtrain::vehicle_cache::VehicleCache;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<VehicleCache>,
    pub broadcaster: Broadcaster,
    pub reference: Arc<ReferenceData>,
    pub stats: Arc<ReconcileStats>,
}

#[derive(Deserialize, Debug, Default)]
pub struct RailwayQuery {
    #[serde(rename = "railwayId")]
    pub railway_id: Option<String>,
}

impl RailwayQuery {
    pub fn normalized(&self) -> Option<String> {
        self.railway_id
            .as_deref()
            .map(str::trim)
            .filter(|railway| !railway.is_empty())
            .map(normalize_railway_id)
    }
}

#[derive(Serialize, Debug)]
pub struct HealthResponse {
    pub ok: bool,
    pub time: u64,
    pub stations: usize,
    pub static_stations: usize,
    pub mapped_stations: usize,
    pub timetables: usize,
    pub static_trips: usize,
    pub vehicles: usize,
    pub tracked_trips: usize,
    pub subscribers: usize,
    pub stats: ReconcileStatsSnapshot,
}

/// Station as served to clients, which read the name as `title`.
#[derive(Serialize, Debug)]
pub struct StationView {
    pub id: String,
    pub title: String,
    #[serde(rename = "railwayId")]
    pub railway_id: Option<String>,
    pub lat: f64,
    pub lng: f64,
}

impl From<Station> for StationView {
    fn from(station: Station) -> Self {
        StationView {
            id: station.id,
            title: station.name,
            railway_id: station.railway_id,
            lat: station.lat,
            lng: station.lng,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct TimetableStopView {
    pub stop_id: String,
    pub arrival: Option<String>,
    pub departure: Option<String>,
    pub sequence: u32,
}

#[derive(Serialize, Debug)]
pub struct TimetableView {
    pub stops: Vec<TimetableStopView>,
}

#[actix_web::get("/health")]
pub async fn health(state: web::Data<AppState>) -> impl Responder {
    let reference = &state.reference;

    HttpResponse::Ok().json(HealthResponse {
        ok: true,
        time: duration_since_unix_epoch().as_secs(),
        stations: reference.live_stations.len(),
        static_stations: reference.static_station_count(),
        mapped_stations: reference.mapping.len(),
        timetables: reference.timetables.len(),
        static_trips: reference.static_trip_count(),
        vehicles: state.cache.vehicle_count(),
        tracked_trips: state.cache.tracked_trip_count(),
        subscribers: state.broadcaster.active_subscribers(),
        stats: state.stats.snapshot(),
    })
}

#[actix_web::get("/api/stations")]
pub async fn stations(state: web::Data<AppState>, query: web::Query<RailwayQuery>) -> impl Responder {
    let railway = query.normalized();

    let stations: Vec<StationView> = state
        .reference
        .live_stations
        .to_vec()
        .into_iter()
        .filter(|station| match &railway {
            Some(railway) => station.railway_id.as_deref() == Some(railway.as_str()),
            None => true,
        })
        .map(StationView::from)
        .collect();

    HttpResponse::Ok().json(stations)
}

/// Live timetables keyed by trip id. The railway filter is a substring match
/// on the trip id, which embeds the railway.
#[actix_web::get("/api/timetables")]
pub async fn timetables(state: web::Data<AppState>, query: web::Query<RailwayQuery>) -> impl Responder {
    let railway = query.normalized();

    let result: BTreeMap<&str, TimetableView> = state
        .reference
        .timetables
        .iter()
        .filter(|timetable| match &railway {
            Some(railway) => timetable.trip_id.contains(railway.as_str()),
            None => true,
        })
        .map(|timetable| {
            let stops = timetable
                .stops
                .iter()
                .map(|stop| TimetableStopView {
                    stop_id: stop.stop_id.clone(),
                    arrival: stop.arrival.map(seconds_to_clock_time),
                    departure: stop.departure.map(seconds_to_clock_time),
                    sequence: stop.sequence,
                })
                .collect();

            (timetable.trip_id.as_str(), TimetableView { stops })
        })
        .collect();

    HttpResponse::Ok().json(result)
}

#[actix_web::get("/api/trains")]
pub async fn trains(state: web::Data<AppState>, query: web::Query<RailwayQuery>) -> impl Responder {
    HttpResponse::Ok()
        .insert_header(("Cache-Control", "no-cache"))
        .json(state.cache.snapshot(query.normalized().as_deref()))
}

#[actix_web::get("/api/trains/stream")]
pub async fn trains_stream(state: web::Data<AppState>, query: web::Query<RailwayQuery>) -> impl Responder {
    let events = state
        .broadcaster
        .subscribe(query.normalized())
        .map(|event| event.to_sse_frame());

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(events)
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(stations)
        .service(timetables)
        .service(trains)
        .service(trains_stream);
}
