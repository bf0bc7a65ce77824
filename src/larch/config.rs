use chrono_tz::Tz;
use clap::Parser;
use nowtrain::broadcast::BroadcastConfig;
use nowtrain::feeds::odpt::{DEFAULT_CALENDAR, DEFAULT_ODPT_BASE};
use nowtrain::retry::RetryPolicy;
use std::time::Duration;

/// Every flag can also be set from the environment or a `.env` file.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Live rail vehicle positions over Server-Sent Events", long_about = None)]
pub struct LarchConfig {
    #[arg(long, env = "ODPT_BASE", default_value = DEFAULT_ODPT_BASE)]
    pub odpt_base: String,
    #[arg(long, env = "ODPT_CONSUMER_KEY", default_value = "")]
    pub odpt_consumer_key: String,
    #[arg(long, env = "POLL_INTERVAL_SEC", default_value_t = 3)]
    pub poll_interval_sec: u64,
    /// Live feed railway filter. Unset polls every railway.
    #[arg(long, env = "POLL_RAILWAY")]
    pub poll_railway: Option<String>,
    #[arg(long, env = "SSE_HEARTBEAT_SEC", default_value_t = 1)]
    pub sse_heartbeat_sec: u64,
    #[arg(long, env = "SSE_TICK_MS", default_value_t = 200)]
    pub sse_tick_ms: u64,
    #[arg(long, env = "TTL_SEC", default_value_t = 15)]
    pub ttl_sec: u64,
    #[arg(long, env = "STATION_MATCH_KM", default_value_t = 0.3)]
    pub station_match_km: f64,
    /// GTFS directory or zip for the static schedule fallback.
    #[arg(long, env = "GTFS_PATH")]
    pub gtfs_path: Option<String>,
    /// Railways whose live timetables are loaded at startup.
    #[arg(
        long,
        env = "RAILWAYS",
        value_delimiter = ',',
        default_values = ["JR-East.ChuoSobuLocal", "JR-East.ChuoRapid", "JR-East.Yamanote"]
    )]
    pub railways: Vec<String>,
    #[arg(long, env = "TIMETABLE_CALENDAR", default_value = DEFAULT_CALENDAR)]
    pub timetable_calendar: String,
    #[arg(long, env = "TIMEZONE", default_value = "Asia/Tokyo")]
    pub timezone: String,
    #[arg(long, env = "PREFER_STATIC_OVER_MIDPOINT")]
    pub prefer_static_over_midpoint: bool,
    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,
    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,
    #[arg(long, env = "RETRY_ATTEMPTS", default_value_t = 3)]
    pub retry_attempts: u32,
    #[arg(long, env = "RETRY_BASE_MS", default_value_t = 500)]
    pub retry_base_ms: u64,
    #[arg(long, env = "RETRY_MAX_MS", default_value_t = 5000)]
    pub retry_max_ms: u64,
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: tracing::Level,
}

impl LarchConfig {
    pub fn service_tz(&self) -> anyhow::Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("invalid TIMEZONE {}: {}", self.timezone, e))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            base_delay: Duration::from_millis(self.retry_base_ms),
            max_delay: Duration::from_millis(self.retry_max_ms),
        }
    }

    pub fn broadcast_config(&self) -> BroadcastConfig {
        BroadcastConfig {
            tick: Duration::from_millis(self.sse_tick_ms.max(1)),
            heartbeat: Duration::from_secs(self.sse_heartbeat_sec),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_sec)
    }
}
