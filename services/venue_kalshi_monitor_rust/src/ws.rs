//! Kalshi WebSocket client: connect, subscribe, stream order book updates.
//!
//! Reconnects with exponential backoff + jitter (reusing the same math the
//! Redis pubsub reconnector uses) and replays every currently-subscribed
//! ticker on each fresh connection, since Kalshi does not remember
//! subscriptions across a dropped socket.

use crate::config::MonitorConfig;
use anyhow::{Context, Result};
use arbees_rust_core::clients::kalshi::KalshiClient;
use arbees_rust_core::local_order_book::{DeltaSide, LocalOrderBook};
use arbees_rust_core::redis::pubsub_reconnect::ReconnectConfig;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

/// Commands the rest of the service sends into the running WS connection.
pub enum WsCommand {
    Subscribe(Vec<String>),
}

/// A parsed Kalshi market-data event, independent of snapshot vs delta framing.
#[derive(Debug)]
pub enum KalshiWsEvent {
    Snapshot {
        ticker: String,
        yes: Vec<(u16, u64)>,
        no: Vec<(u16, u64)>,
    },
    Delta {
        ticker: String,
        price: u16,
        delta: i64,
        side: DeltaSide,
    },
}

/// Parse one Kalshi WS frame. Unrecognized `type`s (e.g. `"subscribed"` acks,
/// `"error"`) return `None` and are only logged.
pub fn parse_event(value: &Value) -> Option<KalshiWsEvent> {
    let msg_type = value.get("type")?.as_str()?;
    let msg = value.get("msg")?;

    match msg_type {
        "orderbook_snapshot" => {
            let ticker = msg.get("market_ticker")?.as_str()?.to_string();
            let yes = parse_levels(msg.get("yes"));
            let no = parse_levels(msg.get("no"));
            Some(KalshiWsEvent::Snapshot { ticker, yes, no })
        }
        "orderbook_delta" => {
            let ticker = msg.get("market_ticker")?.as_str()?.to_string();
            let price = msg.get("price")?.as_u64()? as u16;
            let delta = msg.get("delta")?.as_i64()?;
            // Kalshi's book only ever carries resting bids per contract side;
            // a "no" delta is folded to its complement YES ask by `apply_delta`.
            let side = match msg.get("side")?.as_str()? {
                "yes" => DeltaSide::YesBid,
                "no" => DeltaSide::NoBid,
                _ => return None,
            };
            Some(KalshiWsEvent::Delta {
                ticker,
                price,
                delta,
                side,
            })
        }
        other => {
            debug!("Ignoring Kalshi WS message type '{}'", other);
            None
        }
    }
}

fn parse_levels(v: Option<&Value>) -> Vec<(u16, u64)> {
    let Some(arr) = v.and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    arr.iter()
        .filter_map(|lvl| {
            let pair = lvl.as_array()?;
            let price = pair.get(0)?.as_u64()? as u16;
            let qty = pair.get(1)?.as_u64()?;
            Some((price, qty))
        })
        .collect()
}

/// Shared state the WS loop mutates as prices arrive.
pub struct WsContext {
    pub books: Arc<RwLock<HashMap<String, Arc<LocalOrderBook>>>>,
    pub subscribed: Arc<RwLock<HashSet<String>>>,
}

pub type PriceSink = mpsc::UnboundedSender<(String, u16, u16, u64, u64)>;

/// Run the reconnecting WS loop forever. `price_tx` receives
/// `(ticker, best_yes_bid, best_yes_ask, bid_size, ask_size)` every time a
/// book mutation changes the top of book; the caller is responsible for
/// resolving the ticker against the active set and publishing.
pub async fn run(
    _config: MonitorConfig,
    kalshi: Arc<KalshiClient>,
    ctx: WsContext,
    mut cmd_rx: mpsc::UnboundedReceiver<WsCommand>,
    price_tx: PriceSink,
) {
    let reconnect_cfg = ReconnectConfig::default();
    let mut attempt: u32 = 0;
    let ws_url = crate::config::kalshi_ws_url();
    let mut request_id: u64 = 1;

    loop {
        attempt += 1;
        info!("Connecting to Kalshi WS at {} (attempt {})", ws_url, attempt);

        let mut request = match ws_url.clone().into_client_request() {
            Ok(r) => r,
            Err(e) => {
                warn!("Invalid Kalshi WS URL: {}", e);
                tokio::time::sleep(reconnect_cfg.calculate_delay(attempt)).await;
                continue;
            }
        };

        if let Some(headers) = kalshi.ws_auth_headers(
            ws_url
                .replace("wss://", "")
                .splitn(2, '/')
                .nth(1)
                .map(|p| format!("/{}", p))
                .unwrap_or_default()
                .as_str(),
        ) {
            for (name, value) in headers {
                if let Ok(val) = value.parse() {
                    request.headers_mut().insert(name, val);
                }
            }
        }

        let connect_result = tokio_tungstenite::connect_async(request).await;

        let (ws_stream, _) = match connect_result {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Kalshi WS connect failed: {}. Retrying...", e);
                tokio::time::sleep(reconnect_cfg.calculate_delay(attempt)).await;
                continue;
            }
        };

        info!("Kalshi WS connected");
        attempt = 0;
        let (mut write, mut read) = ws_stream.split();

        // Replay every ticker we believe we're subscribed to; the socket
        // remembers nothing across a reconnect.
        let replay: Vec<String> = ctx.subscribed.read().await.iter().cloned().collect();
        if !replay.is_empty() {
            if let Err(e) = send_subscribe(&mut write, &mut request_id, &replay).await {
                warn!("Failed to replay subscriptions: {}", e);
            }
        }

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(WsCommand::Subscribe(tickers)) => {
                            if let Err(e) = send_subscribe(&mut write, &mut request_id, &tickers).await {
                                warn!("Failed to send subscribe: {}", e);
                                break;
                            }
                        }
                        None => {
                            info!("WS command channel closed, shutting down Kalshi WS loop");
                            return;
                        }
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(txt))) => {
                            handle_frame(&txt, &ctx, &price_tx).await;
                        }
                        Some(Ok(Message::Binary(bytes))) => {
                            if let Ok(txt) = String::from_utf8(bytes) {
                                handle_frame(&txt, &ctx, &price_tx).await;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            warn!("Kalshi WS closed by server: {:?}", frame);
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("Kalshi WS error: {}. Reconnecting...", e);
                            break;
                        }
                        None => {
                            warn!("Kalshi WS stream ended. Reconnecting...");
                            break;
                        }
                    }
                }
            }
        }
    }
}

async fn send_subscribe(
    write: &mut (impl SinkExt<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin),
    request_id: &mut u64,
    tickers: &[String],
) -> Result<()> {
    let frame = json!({
        "id": *request_id,
        "cmd": "subscribe",
        "params": {
            "channels": ["orderbook_delta"],
            "market_tickers": tickers,
        }
    });
    *request_id += 1;
    write
        .send(Message::Text(frame.to_string()))
        .await
        .context("failed to send Kalshi subscribe frame")?;
    info!("Subscribed to {} Kalshi ticker(s)", tickers.len());
    Ok(())
}

async fn handle_frame(txt: &str, ctx: &WsContext, price_tx: &PriceSink) {
    let value: Value = match serde_json::from_str(txt) {
        Ok(v) => v,
        Err(e) => {
            debug!("Failed to parse Kalshi WS frame: {}", e);
            return;
        }
    };

    let Some(event) = parse_event(&value) else {
        return;
    };

    let ticker = match &event {
        KalshiWsEvent::Snapshot { ticker, .. } => ticker.clone(),
        KalshiWsEvent::Delta { ticker, .. } => ticker.clone(),
    };

    let book = {
        let books = ctx.books.read().await;
        books.get(&ticker).cloned()
    };
    let book = match book {
        Some(b) => b,
        None => {
            let mut books = ctx.books.write().await;
            books
                .entry(ticker.clone())
                .or_insert_with(|| Arc::new(LocalOrderBook::new()))
                .clone()
        }
    };

    match event {
        KalshiWsEvent::Snapshot { yes, no, .. } => {
            book.apply_snapshot(&yes, &[], &no, &[]);
        }
        KalshiWsEvent::Delta {
            price, delta, side, ..
        } => {
            book.apply_delta(price, delta, side);
        }
    }

    if let (Some(bid), Some(ask)) = (book.best_yes_bid(), book.best_yes_ask()) {
        let _ = price_tx.send((
            ticker,
            bid,
            ask,
            book.bid_size_at_best(),
            book.ask_size_at_best(),
        ));
    }
}
