//! Configuration constants and environment loading for the Kalshi venue monitor.

use std::env;
use std::time::Duration;

/// Kalshi has no VPN requirement, so its default poll interval mirrors the
/// original service's `KALSHI_POLL_INTERVAL_SECONDS` default.
pub const DEFAULT_POLL_INTERVAL_SECS: f64 = 2.0;

/// WS data older than this triggers the REST poll fallback for that ticker.
pub const DEFAULT_STALE_TTL_SECS: u64 = 10;

pub const DEFAULT_ZMQ_PUB_PORT: u16 = 5555;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    pub stale_ttl: Duration,
    pub zmq_pub_port: u16,
    pub heartbeat_interval: Duration,
    pub health_check_interval: Duration,
}

impl MonitorConfig {
    pub fn from_env() -> Self {
        let poll_interval_secs = env::var("KALSHI_POLL_INTERVAL_SECONDS")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS)
            .clamp(0.5, 30.0);

        let stale_ttl_secs = env::var("KALSHI_STALE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_STALE_TTL_SECS);

        let zmq_pub_port = env::var("ZMQ_PUB_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_ZMQ_PUB_PORT);

        Self {
            poll_interval: Duration::from_secs_f64(poll_interval_secs),
            stale_ttl: Duration::from_secs(stale_ttl_secs),
            zmq_pub_port,
            heartbeat_interval: Duration::from_secs(10),
            health_check_interval: Duration::from_secs(60),
        }
    }
}

/// Kalshi WS endpoint, demo vs prod selected the same way `KalshiClient` picks
/// its REST base URL.
pub fn kalshi_ws_url() -> String {
    let env_type = env::var("KALSHI_ENV").unwrap_or_else(|_| "prod".to_string());
    match env_type.to_lowercase().as_str() {
        "demo" => "wss://demo-api.kalshi.co/trade-api/ws/v2".to_string(),
        _ => env::var("KALSHI_WS_URL")
            .unwrap_or_else(|_| "wss://api.elections.kalshi.com/trade-api/ws/v2".to_string()),
    }
}
