//! Polymarket venue monitor: streams live order book prices for every
//! condition_id the orchestrator has assigned, resolving each outcome to its
//! CLOB token_id and publishing per-team prices on the Redis hot path and,
//! when enabled, the ZMQ side channel.
//!
//! Venue P's terms of service bar trading from certain regions; §4.3 makes
//! verifying egress at startup a hard stop, not a warning — a failed check
//! here exits the process non-zero rather than merely logging.

mod config;
mod ws;

use anyhow::Result;
use arbees_rust_core::clients::polymarket::{
    verify_egress_region, PolymarketClient, POLYMARKET_RESTRICTED_COUNTRIES,
};
use arbees_rust_core::local_order_book::LocalOrderBook;
use arbees_rust_core::models::{channels, TransportMode};
use arbees_rust_core::redis::bus::RedisBus;
use arbees_rust_core::venue_monitor::ActiveSet;
use chrono::Utc;
use config::MonitorConfig;
use dotenv::dotenv;
use futures_util::StreamExt;
use log::{error, info, warn};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use uuid::Uuid;
use ws::{WsCommand, WsContext};
use zeromq::{PubSocket, Socket, SocketSend, ZmqMessage};

const MARKET_TYPE: &str = "moneyline";
const PLATFORM: &str = "polymarket";

#[derive(Debug, Serialize)]
struct OutgoingMarketPrice {
    market_id: String,
    platform: &'static str,
    game_id: String,
    contract_team: Option<String>,
    yes_bid: f64,
    yes_ask: f64,
    mid_price: Option<f64>,
    implied_probability: Option<f64>,
    timestamp: Option<String>,
    yes_bid_size: Option<f64>,
    yes_ask_size: Option<f64>,
    liquidity: Option<f64>,
}

#[derive(Debug, Serialize)]
struct Heartbeat {
    service: String,
    instance_id: String,
    status: String,
    timestamp: String,
    checks: HashMap<String, bool>,
    metrics: HashMap<String, f64>,
}

struct AppState {
    redis: RedisBus,
    polymarket: Arc<PolymarketClient>,
    active: Arc<ActiveSet>,
    /// token_id -> (game_id, condition_id) for mapping REST poll results
    /// back to a market_id Kalshi-style clients elsewhere expect.
    condition_by_token: RwLock<HashMap<String, String>>,
    books: Arc<RwLock<HashMap<String, Arc<LocalOrderBook>>>>,
    subscribed: Arc<RwLock<HashSet<String>>>,
    ws_cmd_tx: mpsc::UnboundedSender<WsCommand>,
    zmq_pub: Option<Arc<Mutex<PubSocket>>>,
    zmq_seq: Arc<AtomicU64>,
    transport_mode: TransportMode,
    config: MonitorConfig,
    instance_id: String,
    egress_ok: AtomicBool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("venue_polymarket_monitor_rust fatal error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = MonitorConfig::from_env();
    let transport_mode = TransportMode::from_env();
    let instance_id = format!("polymarket-monitor-{}", Uuid::new_v4());

    info!(
        "Starting Polymarket venue monitor (instance={}, transport={:?})",
        instance_id, transport_mode
    );

    // Hard stop per §4.3: an egress check failure is fatal, never a warning.
    let (ip, country) = verify_egress_region(POLYMARKET_RESTRICTED_COUNTRIES)
        .await
        .map_err(|e| {
            error!("GeoViolation: refusing to start Polymarket monitor: {}", e);
            e
        })?;
    info!("Egress region verified for Polymarket monitor: {} ({})", country, ip);

    let redis = RedisBus::new().await?;
    let polymarket = Arc::new(PolymarketClient::new());
    let active = Arc::new(ActiveSet::new());
    let books: Arc<RwLock<HashMap<String, Arc<LocalOrderBook>>>> =
        Arc::new(RwLock::new(HashMap::new()));
    let subscribed: Arc<RwLock<HashSet<String>>> = Arc::new(RwLock::new(HashSet::new()));

    let zmq_pub = if transport_mode.use_zmq() {
        let addr = format!("tcp://0.0.0.0:{}", config.zmq_pub_port);
        let mut socket = PubSocket::new();
        socket.bind(&addr).await?;
        info!("Polymarket ZMQ PUB bound on {}", addr);
        Some(Arc::new(Mutex::new(socket)))
    } else {
        None
    };

    let (ws_cmd_tx, ws_cmd_rx) = mpsc::unbounded_channel::<WsCommand>();
    let (price_tx, price_rx) = mpsc::unbounded_channel::<(String, u16, u16, u64, u64)>();

    let ws_ctx = WsContext {
        books: books.clone(),
        subscribed: subscribed.clone(),
    };
    tokio::spawn(ws::run(config.clone(), ws_ctx, ws_cmd_rx, price_tx));

    let state = Arc::new(AppState {
        redis,
        polymarket,
        active,
        condition_by_token: RwLock::new(HashMap::new()),
        books,
        subscribed,
        ws_cmd_tx,
        zmq_pub,
        zmq_seq: Arc::new(AtomicU64::new(0)),
        transport_mode,
        config,
        instance_id,
        egress_ok: AtomicBool::new(true),
    });

    tokio::spawn(price_forwarding_loop(price_rx, state.clone()));
    tokio::spawn(assignment_listener_loop(state.clone()));
    tokio::spawn(rest_poll_loop(state.clone()));
    tokio::spawn(heartbeat_loop(state.clone()));
    tokio::spawn(geo_recheck_loop(state.clone()));

    health_check_loop(state).await
}

/// Resolve each WS-sourced top-of-book change against the active set and
/// publish it; token_ids the orchestrator has since evicted are dropped.
async fn price_forwarding_loop(
    mut price_rx: mpsc::UnboundedReceiver<(String, u16, u16, u64, u64)>,
    state: Arc<AppState>,
) {
    while let Some((token_id, bid, ask, bid_size, ask_size)) = price_rx.recv().await {
        let Some(mapping) = state.active.resolve(&token_id) else {
            continue;
        };

        state.active.mark_updated(&mapping.game_id, &mapping.market_type);

        let market_id = state
            .condition_by_token
            .read()
            .await
            .get(&token_id)
            .cloned()
            .unwrap_or(token_id.clone());

        let price = OutgoingMarketPrice {
            market_id,
            platform: PLATFORM,
            game_id: mapping.game_id,
            contract_team: mapping.contract_team,
            yes_bid: bid as f64 / 100.0,
            yes_ask: ask as f64 / 100.0,
            mid_price: Some((bid as f64 + ask as f64) / 200.0),
            implied_probability: Some((bid as f64 + ask as f64) / 200.0),
            timestamp: Some(Utc::now().to_rfc3339()),
            yes_bid_size: Some(bid_size as f64),
            yes_ask_size: Some(ask_size as f64),
            liquidity: None,
        };

        publish_price(&state, &price).await;
    }
}

async fn publish_price(state: &Arc<AppState>, price: &OutgoingMarketPrice) {
    if state.transport_mode.use_redis() {
        let channel = channels::game_price(&price.game_id);
        if let Err(e) = state.redis.publish_msgpack(&channel, price).await {
            warn!("Failed to publish Polymarket price to Redis: {}", e);
        }
    }

    if state.transport_mode.use_zmq() {
        if let Some(zmq) = &state.zmq_pub {
            let seq = state.zmq_seq.fetch_add(1, Ordering::SeqCst);
            let payload = match serde_json::to_value(price) {
                Ok(v) => v,
                Err(e) => {
                    warn!("Failed to serialize Polymarket price for ZMQ: {}", e);
                    return;
                }
            };
            let envelope = json!({
                "seq": seq,
                "timestamp_ms": Utc::now().timestamp_millis(),
                "source": "polymarket_monitor",
                "payload": payload,
            });
            if let Ok(bytes) = serde_json::to_vec(&envelope) {
                let topic = format!("prices.polymarket.{}", price.market_id);
                let mut msg = ZmqMessage::from(topic.into_bytes());
                msg.push_back(bytes.into());
                let mut socket = zmq.lock().await;
                if let Err(e) = socket.send(msg).await {
                    warn!("Polymarket ZMQ publish error: {}", e);
                }
            }
        }
    }
}

/// Subscribe to the orchestrator's assignment channel; on each
/// `polymarket_assign`, resolve the condition_id's outcomes to CLOB
/// token_ids and replace the active set for that `(game_id, market_type)`.
async fn assignment_listener_loop(state: Arc<AppState>) {
    loop {
        let mut pubsub = match state.redis.subscribe(channels::MARKETS_ASSIGNMENTS).await {
            Ok(p) => p,
            Err(e) => {
                error!("Failed to subscribe to {}: {}", channels::MARKETS_ASSIGNMENTS, e);
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            let payload: String = match msg.get_payload() {
                Ok(p) => p,
                Err(e) => {
                    warn!("Bad assignment payload: {}", e);
                    continue;
                }
            };
            let value: Value = match serde_json::from_str(&payload) {
                Ok(v) => v,
                Err(e) => {
                    warn!("Failed to parse assignment message: {}", e);
                    continue;
                }
            };

            if value.get("type").and_then(|v| v.as_str()) != Some("polymarket_assign") {
                continue;
            }

            handle_assignment(&state, &value).await;
        }

        warn!("Assignment subscription stream ended, resubscribing...");
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
}

async fn handle_assignment(state: &Arc<AppState>, value: &Value) {
    let Some(game_id) = value.get("game_id").and_then(|v| v.as_str()) else {
        return;
    };
    let Some(markets) = value.get("markets").and_then(|v| v.as_array()) else {
        return;
    };

    for market in markets {
        let market_type = market
            .get("market_type")
            .and_then(|v| v.as_str())
            .unwrap_or(MARKET_TYPE);
        let Some(condition_id) = market.get("condition_id").and_then(|v| v.as_str()) else {
            continue;
        };

        let market_data = match state.polymarket.get_market_by_condition(condition_id).await {
            Ok(m) => m,
            Err(e) => {
                warn!(
                    "Failed to resolve Polymarket condition_id {} to outcomes: {}",
                    condition_id, e
                );
                continue;
            }
        };

        let outcomes = market_data
            .get("outcomes")
            .map(PolymarketClient::parse_json_string_or_array)
            .unwrap_or_default();
        let clob_token_ids = market_data
            .get("clobTokenIds")
            .map(PolymarketClient::parse_json_string_or_array)
            .unwrap_or_default();

        if outcomes.len() != clob_token_ids.len() || outcomes.is_empty() {
            warn!(
                "Polymarket condition_id {} outcomes/token_ids length mismatch",
                condition_id
            );
            continue;
        }

        let mappings: Vec<(String, Option<String>)> = clob_token_ids
            .iter()
            .cloned()
            .zip(outcomes.iter().cloned().map(Some))
            .collect();

        state.active.assign(game_id, market_type, mappings.clone());

        {
            let mut by_token = state.condition_by_token.write().await;
            for (token_id, _) in &mappings {
                by_token.insert(token_id.clone(), condition_id.to_string());
            }
        }

        let new_tokens: Vec<String> = mappings.into_iter().map(|(id, _)| id).collect();
        {
            let mut subscribed = state.subscribed.write().await;
            for t in &new_tokens {
                subscribed.insert(t.clone());
            }
        }

        if let Err(e) = state.ws_cmd_tx.send(WsCommand::Subscribe(new_tokens)) {
            error!("WS command channel closed: {}", e);
        }
    }
}

/// Poll the CLOB book endpoint for any `(game_id, market_type)` whose WS
/// feed has gone stale, filling the gap until fresh ticks arrive again.
async fn rest_poll_loop(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(state.config.poll_interval);
    loop {
        interval.tick().await;

        for (game_id, market_type) in state.active.tracked_games() {
            if !state.active.is_stale(&game_id, &market_type, state.config.stale_ttl) {
                continue;
            }

            for token_id in state.active.active_identifiers(&game_id, &market_type) {
                let (bid, ask) = match state.polymarket.get_book(&token_id).await {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("REST poll failed for Polymarket token {}: {}", token_id, e);
                        continue;
                    }
                };

                let Some(mapping) = state.active.resolve(&token_id) else {
                    continue;
                };
                let market_id = state
                    .condition_by_token
                    .read()
                    .await
                    .get(&token_id)
                    .cloned()
                    .unwrap_or_else(|| token_id.clone());

                let price = OutgoingMarketPrice {
                    market_id,
                    platform: PLATFORM,
                    game_id: mapping.game_id.clone(),
                    contract_team: mapping.contract_team.clone(),
                    yes_bid: bid,
                    yes_ask: ask,
                    mid_price: Some((bid + ask) / 2.0),
                    implied_probability: Some((bid + ask) / 2.0),
                    timestamp: Some(Utc::now().to_rfc3339()),
                    yes_bid_size: None,
                    yes_ask_size: None,
                    liquidity: None,
                };

                publish_price(&state, &price).await;
                state.active.mark_updated(&mapping.game_id, &mapping.market_type);
            }
        }
    }
}

async fn heartbeat_loop(state: Arc<AppState>) {
    loop {
        let mut checks = HashMap::new();
        checks.insert(
            "egress_region_ok".to_string(),
            state.egress_ok.load(Ordering::Relaxed),
        );

        let mut metrics = HashMap::new();
        metrics.insert("books_tracked".to_string(), state.books.read().await.len() as f64);
        metrics.insert(
            "tracked_games".to_string(),
            state.active.tracked_games().len() as f64,
        );

        let heartbeat = Heartbeat {
            service: "venue_polymarket_monitor_rust".to_string(),
            instance_id: state.instance_id.clone(),
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            checks,
            metrics,
        };

        if let Err(e) = state.redis.publish(channels::HEALTH_HEARTBEATS, &heartbeat).await {
            warn!("Failed to publish heartbeat: {}", e);
        }

        tokio::time::sleep(state.config.heartbeat_interval).await;
    }
}

/// Periodically re-verify egress region. A violation here is just as fatal
/// as at startup — the process exits non-zero for the supervisor to restart
/// only once the underlying network path is fixed.
async fn geo_recheck_loop(state: Arc<AppState>) -> ! {
    loop {
        tokio::time::sleep(state.config.geo_recheck_interval).await;

        match verify_egress_region(POLYMARKET_RESTRICTED_COUNTRIES).await {
            Ok((ip, country)) => {
                state.egress_ok.store(true, Ordering::Relaxed);
                info!("Egress re-verified: {} ({})", country, ip);
            }
            Err(e) => {
                state.egress_ok.store(false, Ordering::Relaxed);
                error!("GeoViolation on re-check, exiting: {}", e);
                std::process::exit(1);
            }
        }
    }
}

async fn health_check_loop(state: Arc<AppState>) -> Result<()> {
    loop {
        tokio::time::sleep(state.config.health_check_interval).await;

        if !state.egress_ok.load(Ordering::Relaxed) {
            let alert = json!({
                "service": "venue_polymarket_monitor_rust",
                "instance_id": state.instance_id,
                "severity": "critical",
                "message": "Polymarket monitor egress region check failing",
                "timestamp": Utc::now().to_rfc3339(),
            });
            if let Err(e) = state.redis.publish(channels::SYSTEM_ALERTS, &alert).await {
                warn!("Failed to publish system alert: {}", e);
            }
        }
    }
}
