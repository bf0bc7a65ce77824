// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use super::{FeedError, LiveTimetableFeed, LiveTripFeed, StationSource};
use crate::id_cleanup::{clock_time_to_seconds, normalize_railway_id};
use crate::models::{LiveTimetable, RealtimeObservation, ScheduledStop, Station};
use crate::retry::RetryPolicy;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_ODPT_BASE: &str = "https://api-challenge.odpt.org/api/v4";
pub const DEFAULT_CALENDAR: &str = "Weekday";

#[derive(Deserialize, Clone, Debug)]
pub struct OdptStation {
    #[serde(rename = "owl:sameAs")]
    pub same_as: Option<String>,
    #[serde(rename = "geo:lat")]
    pub lat: Option<f64>,
    #[serde(rename = "geo:long")]
    pub long: Option<f64>,
    #[serde(rename = "geo:lon")]
    pub lon: Option<f64>,
    #[serde(rename = "dc:title")]
    pub title: Option<String>,
    #[serde(rename = "odpt:stationTitle")]
    pub station_title: Option<HashMap<String, String>>,
    #[serde(rename = "odpt:railway")]
    pub railway: Option<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct OdptTrain {
    #[serde(rename = "odpt:train")]
    pub train: Option<String>,
    #[serde(rename = "owl:sameAs")]
    pub same_as: Option<String>,
    #[serde(rename = "odpt:railway")]
    pub railway: Option<String>,
    #[serde(rename = "odpt:fromStation")]
    pub from_station: Option<String>,
    #[serde(rename = "odpt:toStation")]
    pub to_station: Option<String>,
    #[serde(rename = "odpt:delay")]
    pub delay: Option<i64>,
    #[serde(rename = "dct:valid")]
    pub valid: Option<String>,
    #[serde(rename = "dc:date")]
    pub date: Option<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct OdptTimetableObject {
    #[serde(rename = "odpt:departureTime")]
    pub departure_time: Option<String>,
    #[serde(rename = "odpt:arrivalTime")]
    pub arrival_time: Option<String>,
    #[serde(rename = "odpt:departureStation")]
    pub departure_station: Option<String>,
    #[serde(rename = "odpt:arrivalStation")]
    pub arrival_station: Option<String>,
    #[serde(rename = "odpt:station")]
    pub station: Option<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct OdptTrainTimetable {
    #[serde(rename = "odpt:train")]
    pub train: Option<String>,
    #[serde(rename = "owl:sameAs")]
    pub same_as: Option<String>,
    #[serde(rename = "odpt:railway")]
    pub railway: Option<String>,
    #[serde(rename = "odpt:trainTimetableObject", default)]
    pub objects: Vec<OdptTimetableObject>,
}

/// Stations without an id or a full coordinate pair are dropped.
pub fn station_from_odpt(record: OdptStation) -> Option<Station> {
    let id = record.same_as.filter(|id| !id.is_empty())?;
    let lat = record.lat?;
    let lng = record.long.or(record.lon)?;

    let name = record
        .title
        .or_else(|| record.station_title.and_then(|mut titles| titles.remove("ja")))
        .unwrap_or_default();

    Some(Station {
        id,
        lat,
        lng,
        name,
        railway_id: record.railway.map(|railway| normalize_railway_id(&railway)),
    })
}

pub fn observation_from_odpt(record: OdptTrain) -> RealtimeObservation {
    RealtimeObservation {
        raw_trip_id: record.train.or(record.same_as).filter(|id| !id.is_empty()),
        railway_id: record.railway,
        from_station_id: record.from_station,
        to_station_id: record.to_station,
        delay_seconds: record.delay.unwrap_or(0),
        valid_at: record.valid.or(record.date),
    }
}

/// Stops are numbered in feed order from 1. Objects naming no station are skipped.
pub fn timetable_from_odpt(record: OdptTrainTimetable) -> Option<LiveTimetable> {
    let trip_id = record.train.or(record.same_as).filter(|id| !id.is_empty())?;

    let stops = record
        .objects
        .into_iter()
        .enumerate()
        .filter_map(|(i, object)| {
            let stop_id = object
                .station
                .or(object.departure_station)
                .or(object.arrival_station)?;

            Some(ScheduledStop {
                stop_id,
                arrival: object.arrival_time.as_deref().and_then(clock_time_to_seconds),
                departure: object.departure_time.as_deref().and_then(clock_time_to_seconds),
                sequence: i as u32 + 1,
            })
        })
        .collect();

    Some(LiveTimetable {
        trip_id,
        railway_id: record.railway.map(|railway| normalize_railway_id(&railway)),
        stops,
    })
}

fn railway_param(railway: &str) -> String {
    if railway.starts_with(crate::id_cleanup::RAILWAY_NAMESPACE) {
        railway.to_string()
    } else {
        format!("{}{}", crate::id_cleanup::RAILWAY_NAMESPACE, railway)
    }
}

#[derive(Clone)]
pub struct OdptClient {
    client: reqwest::Client,
    base: String,
    consumer_key: String,
    calendar: String,
    retry: RetryPolicy,
}

impl OdptClient {
    pub fn new(
        base: &str,
        consumer_key: &str,
        calendar: &str,
        retry: RetryPolicy,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::ClientBuilder::new()
            .deflate(true)
            .gzip(true)
            .brotli(true)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(OdptClient {
            client,
            base: base.trim_end_matches('/').to_string(),
            consumer_key: consumer_key.to_string(),
            calendar: calendar.to_string(),
            retry,
        })
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        resource: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>, FeedError> {
        let url = format!("{}/{}", self.base, resource);

        let response = self
            .client
            .get(&url)
            .query(&[("acl:consumerKey", self.consumer_key.as_str())])
            .query(params)
            .send()
            .await
            .map_err(|source| FeedError::Http {
                resource: resource.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                resource: resource.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|source| FeedError::Http {
            resource: resource.to_string(),
            source,
        })?;

        serde_json::from_slice(&body).map_err(|source| FeedError::Decode {
            resource: resource.to_string(),
            source,
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        resource: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>, FeedError> {
        self.retry
            .run(resource, || self.get_once(resource, params))
            .await
    }
}

impl StationSource for OdptClient {
    async fn fetch_stations(&self, railway: Option<&str>) -> Result<Vec<Station>, FeedError> {
        let params: Vec<(&str, String)> = railway
            .map(|railway| vec![("odpt:railway", railway_param(railway))])
            .unwrap_or_default();

        let records: Vec<OdptStation> = self.get("odpt:Station", &params).await?;
        let total = records.len();

        let stations: Vec<Station> = records.into_iter().filter_map(station_from_odpt).collect();

        debug!("odpt:Station returned {}, kept {} with coordinates", total, stations.len());

        Ok(stations)
    }
}

impl LiveTripFeed for OdptClient {
    async fn fetch_observations(
        &self,
        railway: Option<&str>,
    ) -> Result<Vec<RealtimeObservation>, FeedError> {
        let params: Vec<(&str, String)> = railway
            .map(|railway| vec![("odpt:railway", railway_param(railway))])
            .unwrap_or_default();

        let records: Vec<OdptTrain> = self.get("odpt:Train", &params).await?;

        Ok(records.into_iter().map(observation_from_odpt).collect())
    }
}

impl LiveTimetableFeed for OdptClient {
    async fn fetch_timetables(&self, railway: &str) -> Result<Vec<LiveTimetable>, FeedError> {
        let params = [
            ("odpt:railway", railway_param(railway)),
            ("odpt:calendar", format!("odpt.Calendar:{}", self.calendar)),
        ];

        let records: Vec<OdptTrainTimetable> = self.get("odpt:TrainTimetable", &params).await?;

        Ok(records.into_iter().filter_map(timetable_from_odpt).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_station_records() {
        let records: Vec<OdptStation> = serde_json::from_str(
            r#"[
                {
                    "owl:sameAs": "odpt.Station:JR-East.Yamanote.Tokyo",
                    "geo:lat": 35.681236,
                    "geo:long": 139.767125,
                    "odpt:stationTitle": {"ja": "東京", "en": "Tokyo"},
                    "odpt:railway": "odpt.Railway:JR-East.Yamanote"
                },
                {
                    "owl:sameAs": "odpt.Station:JR-East.Yamanote.Kanda",
                    "geo:lat": 35.69169,
                    "geo:lon": 139.770883,
                    "dc:title": "神田"
                },
                {
                    "owl:sameAs": "odpt.Station:JR-East.Yamanote.Nowhere",
                    "dc:title": "no coordinates"
                }
            ]"#,
        )
        .unwrap();

        let stations: Vec<Station> = records.into_iter().filter_map(station_from_odpt).collect();

        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0].name, "東京");
        assert_eq!(stations[0].railway_id.as_deref(), Some("JR-East.Yamanote"));
        assert_eq!(stations[1].lng, 139.770883);
        assert_eq!(stations[1].name, "神田");
        assert!(stations[1].railway_id.is_none());
    }

    #[test]
    fn test_train_records() {
        let records: Vec<OdptTrain> = serde_json::from_str(
            r#"[
                {
                    "owl:sameAs": "odpt.Train:JR-East.ChuoRapid.1201T",
                    "odpt:railway": "odpt.Railway:JR-East.ChuoRapid",
                    "odpt:fromStation": "odpt.Station:JR-East.ChuoRapid.Tokyo",
                    "odpt:toStation": null,
                    "odpt:delay": 120,
                    "dc:date": "2024-04-01T08:05:00+09:00"
                },
                {
                    "odpt:train": "odpt.Train:JR-East.Yamanote.501G.20240401",
                    "odpt:fromStation": "odpt.Station:JR-East.Yamanote.Tokyo",
                    "odpt:toStation": "odpt.Station:JR-East.Yamanote.Kanda",
                    "dct:valid": "2024-04-01T08:05:30+09:00",
                    "dc:date": "2024-04-01T08:05:00+09:00"
                }
            ]"#,
        )
        .unwrap();

        let observations: Vec<RealtimeObservation> =
            records.into_iter().map(observation_from_odpt).collect();

        assert_eq!(
            observations[0].raw_trip_id.as_deref(),
            Some("odpt.Train:JR-East.ChuoRapid.1201T")
        );
        assert!(observations[0].to_station_id.is_none());
        assert_eq!(observations[0].delay_seconds, 120);
        assert_eq!(observations[0].valid_at.as_deref(), Some("2024-04-01T08:05:00+09:00"));

        assert_eq!(
            observations[1].raw_trip_id.as_deref(),
            Some("odpt.Train:JR-East.Yamanote.501G.20240401")
        );
        assert_eq!(observations[1].delay_seconds, 0);
        assert_eq!(observations[1].valid_at.as_deref(), Some("2024-04-01T08:05:30+09:00"));
    }

    #[test]
    fn test_timetable_records() {
        let records: Vec<OdptTrainTimetable> = serde_json::from_str(
            r#"[
                {
                    "odpt:train": "odpt.Train:JR-East.ChuoRapid.1201T",
                    "odpt:railway": "odpt.Railway:JR-East.ChuoRapid",
                    "odpt:trainTimetableObject": [
                        {"odpt:departureTime": "08:00", "odpt:departureStation": "odpt.Station:JR-East.ChuoRapid.Tokyo"},
                        {"odpt:arrivalTime": "08:10", "odpt:departureTime": "08:11", "odpt:station": "odpt.Station:JR-East.ChuoRapid.Kanda"},
                        {"odpt:arrivalTime": "24:15:30", "odpt:arrivalStation": "odpt.Station:JR-East.ChuoRapid.Takao"},
                        {"odpt:arrivalTime": "24:20"}
                    ]
                },
                {
                    "odpt:railway": "odpt.Railway:JR-East.ChuoRapid"
                }
            ]"#,
        )
        .unwrap();

        let timetables: Vec<LiveTimetable> =
            records.into_iter().filter_map(timetable_from_odpt).collect();

        assert_eq!(timetables.len(), 1);

        let timetable = &timetables[0];
        assert_eq!(timetable.railway_id.as_deref(), Some("JR-East.ChuoRapid"));
        assert_eq!(timetable.stops.len(), 3);

        assert_eq!(timetable.stops[0].arrival, None);
        assert_eq!(timetable.stops[0].departure, Some(8 * 3600));
        assert_eq!(timetable.stops[1].stop_id, "odpt.Station:JR-East.ChuoRapid.Kanda");
        assert_eq!(timetable.stops[1].sequence, 2);
        assert_eq!(timetable.stops[2].arrival, Some(24 * 3600 + 15 * 60 + 30));
    }

    #[test]
    fn test_railway_param() {
        assert_eq!(railway_param("JR-East.Yamanote"), "odpt.Railway:JR-East.Yamanote");
        assert_eq!(
            railway_param("odpt.Railway:JR-East.Yamanote"),
            "odpt.Railway:JR-East.Yamanote"
        );
    }
}
