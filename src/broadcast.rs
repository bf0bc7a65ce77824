// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use crate::duration_since_unix_epoch;
use crate::models::Snapshot;
use crate::vehicle_cache::VehicleCache;
use bytes::Bytes;
use futures::Stream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::debug;

pub const DEFAULT_TICK: Duration = Duration::from_millis(200);
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(1);

#[derive(Clone, Debug)]
pub enum BroadcastEvent {
    Snapshot(Snapshot),
    /// Epoch seconds at the time of the heartbeat.
    Heartbeat(u64),
}

impl BroadcastEvent {
    /// Server-Sent-Events framing, `snapshot` and `ping` event names.
    pub fn to_sse_frame(&self) -> Result<Bytes, serde_json::Error> {
        let frame = match self {
            BroadcastEvent::Snapshot(snapshot) => {
                format!("event: snapshot\ndata: {}\n\n", serde_json::to_string(snapshot)?)
            }
            BroadcastEvent::Heartbeat(ts) => format!("event: ping\ndata: {}\n\n", ts),
        };

        Ok(Bytes::from(frame))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BroadcastConfig {
    pub tick: Duration,
    pub heartbeat: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        BroadcastConfig {
            tick: DEFAULT_TICK,
            heartbeat: DEFAULT_HEARTBEAT,
        }
    }
}

/// What a subscriber has already been sent. A new publication, or vehicles
/// expiring out of the TTL window, changes the marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChangeMarker {
    pub version: u64,
    pub vehicle_count: usize,
}

impl ChangeMarker {
    pub fn of(snapshot: &Snapshot) -> Self {
        ChangeMarker {
            version: snapshot.version,
            vehicle_count: snapshot.vehicles.len(),
        }
    }
}

/// Per subscriber send state, driven once per tick.
#[derive(Debug)]
pub struct SubscriberState {
    heartbeat: Duration,
    last_marker: Option<ChangeMarker>,
    last_sent_at: Option<Instant>,
}

impl SubscriberState {
    pub fn new(heartbeat: Duration) -> Self {
        SubscriberState {
            heartbeat,
            last_marker: None,
            last_sent_at: None,
        }
    }

    pub fn on_tick(&mut self, snapshot: Snapshot, now: Instant, epoch_secs: u64) -> Option<BroadcastEvent> {
        let marker = ChangeMarker::of(&snapshot);

        if self.last_marker != Some(marker) {
            self.last_marker = Some(marker);
            self.last_sent_at = Some(now);
            return Some(BroadcastEvent::Snapshot(snapshot));
        }

        let quiet_for = match self.last_sent_at {
            Some(last_sent_at) => now.saturating_duration_since(last_sent_at),
            None => self.heartbeat,
        };

        if quiet_for >= self.heartbeat {
            self.last_sent_at = Some(now);
            return Some(BroadcastEvent::Heartbeat(epoch_secs));
        }

        None
    }
}

/// Hands out per subscriber event streams over one shared cache.
#[derive(Clone)]
pub struct Broadcaster {
    cache: Arc<VehicleCache>,
    config: BroadcastConfig,
    active: Arc<AtomicUsize>,
}

struct Subscription {
    cache: Arc<VehicleCache>,
    railway_filter: Option<String>,
    interval: Interval,
    state: SubscriberState,
    active: Arc<AtomicUsize>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let remaining = self.active.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        debug!(
            "subscriber for {:?} closed, {} still streaming",
            self.railway_filter, remaining
        );
    }
}

impl Broadcaster {
    pub fn new(cache: Arc<VehicleCache>, config: BroadcastConfig) -> Self {
        Broadcaster {
            cache,
            config,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn active_subscribers(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Endless stream of snapshot and heartbeat events for one subscriber.
    /// The subscription ends when the transport drops the stream.
    pub fn subscribe(&self, railway_filter: Option<String>) -> impl Stream<Item = BroadcastEvent> + Send + use<> {
        let mut interval = tokio::time::interval(self.config.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.active.fetch_add(1, Ordering::AcqRel);

        let subscription = Subscription {
            cache: Arc::clone(&self.cache),
            railway_filter,
            interval,
            state: SubscriberState::new(self.config.heartbeat),
            active: Arc::clone(&self.active),
        };

        futures::stream::unfold(subscription, |mut sub| async move {
            loop {
                sub.interval.tick().await;

                let snapshot = sub.cache.snapshot(sub.railway_filter.as_deref());

                if let Some(event) = sub.state.on_tick(
                    snapshot,
                    Instant::now(),
                    duration_since_unix_epoch().as_secs(),
                ) {
                    return Some((event, sub));
                }
            }
        })
    }
}
