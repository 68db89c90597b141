//! Cross-venue arbitrage leg correlation
//!
//! A cross-market arbitrage `TradingSignal` is split into two independent
//! `ExecutionRequest`s (buy-YES leg and buy-NO leg) that share `signal_id`
//! as an opportunity key. Both legs are submitted concurrently and land
//! back here independently, so this tracker pairs their results up to
//! detect a one-sided fill that needs a best-effort close.

use arbees_rust_core::models::{ExecutionResult, ExecutionStatus};
use chrono::{DateTime, Duration, Utc};
use log::debug;
use std::collections::HashMap;
use std::sync::Mutex;

/// Time-to-live for an unpaired leg (its sibling never showed up)
const ENTRY_TTL_SECS: i64 = 60;

struct LegRecord {
    result: ExecutionResult,
    recorded_at: DateTime<Utc>,
}

fn leg_filled(status: ExecutionStatus) -> bool {
    matches!(status, ExecutionStatus::Filled | ExecutionStatus::Partial)
}

/// Outcome of recording a completed arb leg against its opportunity key.
pub enum LegPairing {
    /// First leg of the opportunity to land; waiting on its sibling.
    AwaitingSibling,
    /// Both legs filled, or both didn't -- arbitrage is intact or void.
    Balanced,
    /// One leg filled and the other didn't -- this leg needs closing.
    NeedsClose(ExecutionResult),
}

/// In-memory tracker pairing the two legs of a cross-venue arbitrage trade.
pub struct ArbLegTracker {
    legs: Mutex<HashMap<String, LegRecord>>,
}

impl ArbLegTracker {
    pub fn new() -> Self {
        Self {
            legs: Mutex::new(HashMap::new()),
        }
    }

    /// Record a completed leg's result under `opportunity_key` (the arb
    /// signal's `signal_id`, shared by both legs) and report the pairing.
    pub fn record(&self, opportunity_key: &str, result: ExecutionResult) -> LegPairing {
        let now = Utc::now();
        let mut legs = self.legs.lock().unwrap();
        legs.retain(|_, rec| now - rec.recorded_at < Duration::seconds(ENTRY_TTL_SECS));

        match legs.remove(opportunity_key) {
            None => {
                legs.insert(
                    opportunity_key.to_string(),
                    LegRecord {
                        result,
                        recorded_at: now,
                    },
                );
                LegPairing::AwaitingSibling
            }
            Some(sibling) => {
                let sibling_filled = leg_filled(sibling.result.status);
                let this_filled = leg_filled(result.status);
                if sibling_filled == this_filled {
                    debug!("Arb opportunity {} balanced (both legs {})", opportunity_key,
                        if this_filled { "filled" } else { "unfilled" });
                    LegPairing::Balanced
                } else if this_filled {
                    LegPairing::NeedsClose(result)
                } else {
                    LegPairing::NeedsClose(sibling.result)
                }
            }
        }
    }
}

impl Default for ArbLegTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbees_rust_core::models::{ExecutionSide, Platform, Sport};

    fn make_result(status: ExecutionStatus, filled_qty: f64) -> ExecutionResult {
        ExecutionResult {
            request_id: "req-1".to_string(),
            idempotency_key: "idem-1".to_string(),
            status,
            rejection_reason: None,
            order_id: None,
            filled_qty,
            avg_price: 0.5,
            fees: 0.0,
            platform: Platform::Kalshi,
            market_id: "market-1".to_string(),
            contract_team: Some("Lakers".to_string()),
            game_id: "game-1".to_string(),
            sport: Sport::NBA,
            signal_id: "opp-1".to_string(),
            signal_type: "CrossMarketArb".to_string(),
            edge_pct: 3.0,
            side: ExecutionSide::Yes,
            requested_at: Utc::now(),
            executed_at: Utc::now(),
            latency_ms: 10.0,
        }
    }

    #[test]
    fn first_leg_awaits_sibling() {
        let tracker = ArbLegTracker::new();
        let outcome = tracker.record("opp-1", make_result(ExecutionStatus::Filled, 10.0));
        assert!(matches!(outcome, LegPairing::AwaitingSibling));
    }

    #[test]
    fn both_filled_is_balanced() {
        let tracker = ArbLegTracker::new();
        tracker.record("opp-1", make_result(ExecutionStatus::Filled, 10.0));
        let outcome = tracker.record("opp-1", make_result(ExecutionStatus::Filled, 10.0));
        assert!(matches!(outcome, LegPairing::Balanced));
    }

    #[test]
    fn both_unfilled_is_balanced() {
        let tracker = ArbLegTracker::new();
        tracker.record("opp-1", make_result(ExecutionStatus::Cancelled, 0.0));
        let outcome = tracker.record("opp-1", make_result(ExecutionStatus::Rejected, 0.0));
        assert!(matches!(outcome, LegPairing::Balanced));
    }

    #[test]
    fn one_sided_fill_needs_close() {
        let tracker = ArbLegTracker::new();
        tracker.record("opp-1", make_result(ExecutionStatus::Filled, 10.0));
        let outcome = tracker.record("opp-1", make_result(ExecutionStatus::Rejected, 0.0));
        assert!(matches!(outcome, LegPairing::NeedsClose(_)));
    }
}
