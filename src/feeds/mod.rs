// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! Upstream data sources: the live ODPT feed and a static GTFS schedule.

pub mod gtfs_static;
pub mod odpt;

use crate::models::{LiveTimetable, RealtimeObservation, Station};
use crate::retry::Transient;
use std::future::Future;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("request to {resource} failed: {source}")]
    Http {
        resource: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{resource} returned status {status}")]
    Status { resource: String, status: u16 },
    #[error("could not decode {resource}: {source}")]
    Decode {
        resource: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not read static schedule at {path}: {source}")]
    Schedule {
        path: String,
        #[source]
        source: gtfs_structures::Error,
    },
}

impl Transient for FeedError {
    fn is_transient(&self) -> bool {
        match self {
            FeedError::Http { .. } => true,
            FeedError::Status { status, .. } => *status == 429 || *status >= 500,
            FeedError::Decode { .. } | FeedError::Schedule { .. } => false,
        }
    }
}

pub trait StationSource {
    fn fetch_stations(
        &self,
        railway: Option<&str>,
    ) -> impl Future<Output = Result<Vec<Station>, FeedError>> + Send;
}

pub trait LiveTripFeed {
    fn fetch_observations(
        &self,
        railway: Option<&str>,
    ) -> impl Future<Output = Result<Vec<RealtimeObservation>, FeedError>> + Send;
}

pub trait LiveTimetableFeed {
    fn fetch_timetables(
        &self,
        railway: &str,
    ) -> impl Future<Output = Result<Vec<LiveTimetable>, FeedError>> + Send;
}
