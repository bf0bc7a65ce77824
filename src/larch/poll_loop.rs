use nowtrain::duration_since_unix_epoch;
use nowtrain::feeds::LiveTripFeed;
use nowtrain::reconcile::{CycleReport, Reconciler};
use nowtrain::stats::ReconcileStats;
use nowtrain::vehicle_cache::VehicleCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

pub struct PollLoop<F> {
    pub feed: F,
    pub reconciler: Reconciler,
    pub cache: Arc<VehicleCache>,
    pub stats: Arc<ReconcileStats>,
    pub interval: Duration,
    /// Live feed filter, also the cache key vehicles are published under.
    pub railway: Option<String>,
}

impl<F: LiveTripFeed> PollLoop<F> {
    /// One fetch and reconcile. A failed fetch leaves the cache as it was.
    pub async fn poll_once(&mut self) -> Option<CycleReport> {
        let observations = match self.feed.fetch_observations(self.railway.as_deref()).await {
            Ok(observations) => observations,
            Err(e) => {
                warn!("live feed fetch failed, keeping last vehicles: {}", e);
                ReconcileStats::bump(&self.stats.failed_fetches);
                return None;
            }
        };

        let Some(clock) = self.reconciler.clock_at(duration_since_unix_epoch().as_secs()) else {
            warn!("system clock out of range, skipping cycle");
            return None;
        };

        Some(self.reconciler.run_cycle(
            &observations,
            &clock,
            self.railway.as_deref(),
            &self.cache,
        ))
    }

    /// Polls until `shutdown` flips to true or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("poll loop started, every {:?}", self.interval);

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.poll_once().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("poll loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nowtrain::feeds::FeedError;
    use nowtrain::models::RealtimeObservation;
    use nowtrain::reconcile::{ReconcileOptions, ReferenceData};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedFeed {
        responses: Mutex<VecDeque<Result<Vec<RealtimeObservation>, FeedError>>>,
    }

    impl LiveTripFeed for ScriptedFeed {
        async fn fetch_observations(
            &self,
            _railway: Option<&str>,
        ) -> Result<Vec<RealtimeObservation>, FeedError> {
            let next = self.responses.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(vec![]))
        }
    }

    fn train(id: &str) -> RealtimeObservation {
        RealtimeObservation {
            raw_trip_id: Some(id.to_string()),
            railway_id: Some(String::from("odpt.Railway:JR-East.Yamanote")),
            ..Default::default()
        }
    }

    fn poll_loop(responses: Vec<Result<Vec<RealtimeObservation>, FeedError>>) -> PollLoop<ScriptedFeed> {
        let stats = Arc::new(ReconcileStats::default());

        PollLoop {
            feed: ScriptedFeed {
                responses: Mutex::new(responses.into()),
            },
            reconciler: Reconciler::new(
                Arc::new(ReferenceData::default()),
                ReconcileOptions::default(),
                Arc::clone(&stats),
            ),
            cache: Arc::new(VehicleCache::new(15)),
            stats,
            interval: Duration::from_secs(3),
            railway: None,
        }
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_vehicles() {
        let mut poll_loop = poll_loop(vec![
            Ok(vec![train("odpt.Train:JR-East.Yamanote.501G")]),
            Err(FeedError::Status {
                resource: String::from("odpt:Train"),
                status: 503,
            }),
        ]);

        let report = poll_loop.poll_once().await.unwrap();
        assert_eq!(report.vehicles, 1);

        assert!(poll_loop.poll_once().await.is_none());
        assert_eq!(poll_loop.stats.snapshot().failed_fetches, 1);
        assert_eq!(poll_loop.cache.snapshot(Some("JR-East.Yamanote")).vehicles.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_shutdown() {
        let poll_loop = poll_loop(vec![]);
        let stats = Arc::clone(&poll_loop.stats);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(poll_loop.run(shutdown_rx));

        tokio::time::sleep(Duration::from_secs(7)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(stats.snapshot().cycles, 3);
    }
}
