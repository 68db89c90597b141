//! Kalshi venue monitor: streams live order book prices for every ticker the
//! orchestrator has assigned, publishing them on both the Redis hot path and,
//! when enabled, the ZMQ side channel.

mod config;
mod ws;

use anyhow::Result;
use arbees_rust_core::clients::kalshi::{
    complementary_ticker, extract_team_from_ticker, is_multigame_or_parlay_ticker, KalshiClient,
};
use arbees_rust_core::local_order_book::LocalOrderBook;
use arbees_rust_core::models::{channels, TransportMode};
use arbees_rust_core::redis::bus::RedisBus;
use arbees_rust_core::venue_monitor::ActiveSet;
use chrono::Utc;
use config::MonitorConfig;
use dotenv::dotenv;
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use uuid::Uuid;
use ws::{WsCommand, WsContext};
use zeromq::{PubSocket, Socket, SocketSend, ZmqMessage};

const MARKET_TYPE: &str = "moneyline";
const PLATFORM: &str = "kalshi";

/// JSON shape published on `game:{game_id}:price` and, mirrored, on the ZMQ
/// price side channel. Must match `game_shard_rust::price::data::IncomingMarketPrice`.
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
    kalshi: Arc<KalshiClient>,
    active: Arc<ActiveSet>,
    books: Arc<RwLock<HashMap<String, Arc<LocalOrderBook>>>>,
    subscribed: Arc<RwLock<HashSet<String>>>,
    ws_cmd_tx: mpsc::UnboundedSender<WsCommand>,
    zmq_pub: Option<Arc<Mutex<PubSocket>>>,
    zmq_seq: Arc<AtomicU64>,
    transport_mode: TransportMode,
    config: MonitorConfig,
    instance_id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = MonitorConfig::from_env();
    let transport_mode = TransportMode::from_env();
    let instance_id = format!("kalshi-monitor-{}", Uuid::new_v4());

    info!(
        "Starting Kalshi venue monitor (instance={}, transport={:?})",
        instance_id, transport_mode
    );

    let redis = RedisBus::new().await?;
    let kalshi = Arc::new(KalshiClient::from_env()?);
    let active = Arc::new(ActiveSet::new());
    let books: Arc<RwLock<HashMap<String, Arc<LocalOrderBook>>>> =
        Arc::new(RwLock::new(HashMap::new()));
    let subscribed: Arc<RwLock<HashSet<String>>> = Arc::new(RwLock::new(HashSet::new()));

    let zmq_pub = if transport_mode.use_zmq() {
        let addr = format!("tcp://0.0.0.0:{}", config.zmq_pub_port);
        let mut socket = PubSocket::new();
        socket.bind(&addr).await?;
        info!("Kalshi ZMQ PUB bound on {}", addr);
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
    tokio::spawn(ws::run(
        config.clone(),
        kalshi.clone(),
        ws_ctx,
        ws_cmd_rx,
        price_tx,
    ));

    let state = Arc::new(AppState {
        redis,
        kalshi,
        active,
        books,
        subscribed,
        ws_cmd_tx,
        zmq_pub,
        zmq_seq: Arc::new(AtomicU64::new(0)),
        transport_mode,
        config,
        instance_id,
    });

    tokio::spawn(price_forwarding_loop(price_rx, state.clone()));
    tokio::spawn(assignment_listener_loop(state.clone()));
    tokio::spawn(rest_poll_loop(state.clone()));
    tokio::spawn(heartbeat_loop(state.clone()));

    health_check_loop(state).await
}

/// Resolve each WS-sourced top-of-book change against the active set and
/// publish it; identifiers the orchestrator has since evicted are dropped.
async fn price_forwarding_loop(
    mut price_rx: mpsc::UnboundedReceiver<(String, u16, u16, u64, u64)>,
    state: Arc<AppState>,
) {
    while let Some((ticker, bid, ask, bid_size, ask_size)) = price_rx.recv().await {
        let Some(mapping) = state.active.resolve(&ticker) else {
            debug!("Dropping price for inactive Kalshi ticker {}", ticker);
            continue;
        };

        state
            .active
            .mark_updated(&mapping.game_id, &mapping.market_type);

        let price = OutgoingMarketPrice {
            market_id: ticker.clone(),
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
            warn!("Failed to publish Kalshi price to Redis: {}", e);
        }
    }

    if state.transport_mode.use_zmq() {
        if let Some(zmq) = &state.zmq_pub {
            let seq = state.zmq_seq.fetch_add(1, Ordering::SeqCst);
            let payload = match serde_json::to_value(price) {
                Ok(v) => v,
                Err(e) => {
                    warn!("Failed to serialize Kalshi price for ZMQ: {}", e);
                    return;
                }
            };
            let envelope = json!({
                "seq": seq,
                "timestamp_ms": Utc::now().timestamp_millis(),
                "source": "kalshi_monitor",
                "payload": payload,
            });
            if let Ok(bytes) = serde_json::to_vec(&envelope) {
                let topic = format!("prices.kalshi.{}", price.market_id);
                let mut msg = ZmqMessage::from(topic.into_bytes());
                msg.push_back(bytes.into());
                let mut socket = zmq.lock().await;
                if let Err(e) = socket.send(msg).await {
                    warn!("Kalshi ZMQ publish error: {}", e);
                }
            }
        }
    }
}

/// Subscribe to the orchestrator's assignment channel and keep the active
/// set (and the live WS subscription list) in sync with it.
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

            if value.get("type").and_then(|v| v.as_str()) != Some("kalshi_assign") {
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
        let Some(ticker) = market.get("ticker").and_then(|v| v.as_str()) else {
            continue;
        };

        if is_multigame_or_parlay_ticker(ticker) {
            warn!("Refusing to subscribe to multi-game/parlay ticker {}", ticker);
            continue;
        }

        let team_name = market
            .get("team_name")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .or_else(|| extract_team_from_ticker(ticker));

        let mut mappings = vec![(ticker.to_string(), team_name)];

        if let Some(complement) = complementary_ticker(ticker) {
            if !is_multigame_or_parlay_ticker(&complement) {
                let complement_team = extract_team_from_ticker(&complement);
                mappings.push((complement, complement_team));
            }
        }

        state.active.assign(game_id, market_type, mappings.clone());

        let new_tickers: Vec<String> = mappings.into_iter().map(|(id, _)| id).collect();
        {
            let mut subscribed = state.subscribed.write().await;
            for t in &new_tickers {
                subscribed.insert(t.clone());
            }
        }

        if let Err(e) = state.ws_cmd_tx.send(WsCommand::Subscribe(new_tickers)) {
            error!("WS command channel closed: {}", e);
        }
    }
}

/// Poll the REST API for any `(game_id, market_type)` whose WS feed has gone
/// stale, filling the gap until fresh ticks arrive again.
async fn rest_poll_loop(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(state.config.poll_interval);
    loop {
        interval.tick().await;

        for (game_id, market_type) in state.active.tracked_games() {
            if !state.active.is_stale(&game_id, &market_type, state.config.stale_ttl) {
                continue;
            }

            for ticker in state.active.active_identifiers(&game_id, &market_type) {
                let market = match state.kalshi.get_market_by_ticker(&ticker).await {
                    Ok(m) => m,
                    Err(e) => {
                        debug!("REST poll failed for {}: {}", ticker, e);
                        continue;
                    }
                };

                let Some(mapping) = state.active.resolve(&ticker) else {
                    continue;
                };
                let Some(yes_bid) = market.yes_bid else { continue };
                let Some(yes_ask) = market.yes_ask else { continue };

                let bid = yes_bid as f64 / 100.0;
                let ask = yes_ask as f64 / 100.0;

                let price = OutgoingMarketPrice {
                    market_id: ticker,
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
                    liquidity: market.liquidity,
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
        checks.insert("kalshi_api_available".to_string(), state.kalshi.is_available());

        let mut metrics = HashMap::new();
        metrics.insert(
            "books_tracked".to_string(),
            state.books.read().await.len() as f64,
        );
        metrics.insert(
            "tracked_games".to_string(),
            state.active.tracked_games().len() as f64,
        );

        let heartbeat = Heartbeat {
            service: "venue_kalshi_monitor_rust".to_string(),
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

/// Periodic self-check: alert (but never crash, unlike Venue P's startup geo
/// check) when the Kalshi API circuit breaker trips.
async fn health_check_loop(state: Arc<AppState>) -> Result<()> {
    loop {
        tokio::time::sleep(state.config.health_check_interval).await;

        if !state.kalshi.is_available() {
            let alert = json!({
                "service": "venue_kalshi_monitor_rust",
                "instance_id": state.instance_id,
                "severity": "warning",
                "message": "Kalshi API circuit breaker is open",
                "timestamp": Utc::now().to_rfc3339(),
            });
            if let Err(e) = state.redis.publish(channels::SYSTEM_ALERTS, &alert).await {
                warn!("Failed to publish system alert: {}", e);
            }
        }
    }
}
