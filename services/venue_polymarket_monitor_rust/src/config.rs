//! Configuration constants and environment loading for the Polymarket venue
//! monitor.

use std::env;
use std::time::Duration;

/// Polymarket's REST is lower-throughput than Kalshi's, so the poll
/// fallback cadence defaults slightly slower.
pub const DEFAULT_POLL_INTERVAL_SECS: f64 = 3.0;

/// WS data older than this triggers the REST poll fallback for that token.
pub const DEFAULT_STALE_TTL_SECS: u64 = 10;

pub const DEFAULT_ZMQ_PUB_PORT: u16 = 5556;

/// Venue P's CLOB WS requires a client heartbeat every 5s or the connection
/// is terminated server-side (§4.3). Send it a little faster than the
/// deadline so a slow tick never misses it.
pub const WS_HEARTBEAT_INTERVAL_SECS: u64 = 4;

/// How often, after startup, the egress region is re-verified. A violation
/// here is fatal (`GeoViolation`), same as at startup.
pub const DEFAULT_GEO_RECHECK_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    pub stale_ttl: Duration,
    pub zmq_pub_port: u16,
    pub heartbeat_interval: Duration,
    pub health_check_interval: Duration,
    pub geo_recheck_interval: Duration,
}

impl MonitorConfig {
    pub fn from_env() -> Self {
        let poll_interval_secs = env::var("POLYMARKET_POLL_INTERVAL_SECONDS")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS)
            .clamp(0.5, 30.0);

        let stale_ttl_secs = env::var("POLYMARKET_STALE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_STALE_TTL_SECS);

        let zmq_pub_port = env::var("ZMQ_PUB_PORT_POLYMARKET")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_ZMQ_PUB_PORT);

        let geo_recheck_secs = env::var("POLYMARKET_GEO_RECHECK_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_GEO_RECHECK_INTERVAL_SECS);

        Self {
            poll_interval: Duration::from_secs_f64(poll_interval_secs),
            stale_ttl: Duration::from_secs(stale_ttl_secs),
            zmq_pub_port,
            heartbeat_interval: Duration::from_secs(10),
            health_check_interval: Duration::from_secs(60),
            geo_recheck_interval: Duration::from_secs(geo_recheck_secs),
        }
    }
}

pub fn polymarket_ws_url() -> String {
    env::var("POLYMARKET_WS_URL")
        .unwrap_or_else(|_| "wss://ws-subscriptions-clob.polymarket.com/ws/market".to_string())
}
