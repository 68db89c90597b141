//! Per-market level ledger for a single venue's order book.
//!
//! Complements `atomic_orderbook`'s lock-free best-price tracker with the
//! full multi-level ledger venue monitors need to apply snapshots and
//! deltas, including NO-side folding and crossed-book detection.

use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Which side of the book a delta applies to, in venue wire terms. NO-side
/// deltas are folded into the YES book at the complement price before the
/// ledger ever sees them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaSide {
    YesBid,
    YesAsk,
    NoBid,
    NoAsk,
}

/// Price-in-cents -> quantity ledger for one (market_id, platform).
///
/// Bids are kept price-ascending, asks price-ascending; best bid is the
/// last key, best ask is the first key. A level is removed once its
/// quantity reaches zero; levels only ever appear via a positive delta or a
/// snapshot.
#[derive(Debug, Default)]
pub struct LocalOrderBook {
    inner: RwLock<BookState>,
    /// Last applied snapshot/delta sequence number, for gap detection.
    sequence: RwLock<Option<u64>>,
}

#[derive(Debug, Default, Clone)]
struct BookState {
    yes_bids: BTreeMap<u16, u64>,
    yes_asks: BTreeMap<u16, u64>,
}

/// Outcome of applying a sequence number to the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// First message seen, or sequence advanced by exactly one.
    Ok,
    /// A gap was detected; the caller must resubscribe before publishing
    /// the next MarketPrice derived from this book.
    Gap { expected: u64, got: u64 },
}

impl LocalOrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check and record a new sequence number. Returns `Gap` when
    /// `new != prev + 1`; the first observed sequence is always `Ok`.
    pub fn check_sequence(&self, new_seq: u64) -> SequenceCheck {
        let mut seq = self.sequence.write();
        let result = match *seq {
            None => SequenceCheck::Ok,
            Some(prev) if new_seq == prev.wrapping_add(1) => SequenceCheck::Ok,
            Some(prev) => SequenceCheck::Gap {
                expected: prev.wrapping_add(1),
                got: new_seq,
            },
        };
        *seq = Some(new_seq);
        result
    }

    /// Replace the book wholesale. `no_bids`/`no_asks` are folded into the
    /// YES book at the complement price (p_no_cents -> 100 - p_no_cents).
    /// Any entry with non-positive quantity is dropped so the post-condition
    /// "every (price, qty) has qty > 0" always holds.
    pub fn apply_snapshot(
        &self,
        yes_bids: &[(u16, u64)],
        yes_asks: &[(u16, u64)],
        no_bids: &[(u16, u64)],
        no_asks: &[(u16, u64)],
    ) {
        let mut state = BookState::default();
        for &(price, qty) in yes_bids {
            if qty > 0 {
                state.yes_bids.insert(price, qty);
            }
        }
        for &(price, qty) in yes_asks {
            if qty > 0 {
                state.yes_asks.insert(price, qty);
            }
        }
        // A NO bid at price p is economically a YES ask at (100 - p); a NO
        // ask at price p is a YES bid at (100 - p).
        for &(price, qty) in no_bids {
            if qty > 0 && price <= 100 {
                state.yes_asks.insert(100 - price, qty);
            }
        }
        for &(price, qty) in no_asks {
            if qty > 0 && price <= 100 {
                state.yes_bids.insert(100 - price, qty);
            }
        }
        *self.inner.write() = state;
    }

    /// Apply an incremental update. A NO-side delta is translated to the
    /// complement YES-side price before mutation. Resulting quantity ≤ 0
    /// removes the level; a new level only appears when `delta > 0`.
    pub fn apply_delta(&self, price_cents: u16, delta: i64, side: DeltaSide) {
        let (book_side, price) = match side {
            DeltaSide::YesBid => (Side::Bid, price_cents),
            DeltaSide::YesAsk => (Side::Ask, price_cents),
            DeltaSide::NoBid if price_cents <= 100 => (Side::Ask, 100 - price_cents),
            DeltaSide::NoAsk if price_cents <= 100 => (Side::Bid, 100 - price_cents),
            DeltaSide::NoBid | DeltaSide::NoAsk => return,
        };

        let mut state = self.inner.write();
        let map = match book_side {
            Side::Bid => &mut state.yes_bids,
            Side::Ask => &mut state.yes_asks,
        };

        match map.get(&price).copied() {
            Some(existing) => {
                let updated = existing as i64 + delta;
                if updated <= 0 {
                    map.remove(&price);
                } else {
                    map.insert(price, updated as u64);
                }
            }
            None if delta > 0 => {
                map.insert(price, delta as u64);
            }
            None => {}
        }
    }

    /// Set a level to an absolute quantity rather than a relative delta, for
    /// venues (e.g. Polymarket's `price_change` events) that publish the new
    /// resting size at a price rather than the change in it. A `qty` of 0
    /// removes the level.
    pub fn set_level(&self, price_cents: u16, qty: u64, side: DeltaSide) {
        let (book_side, price) = match side {
            DeltaSide::YesBid => (Side::Bid, price_cents),
            DeltaSide::YesAsk => (Side::Ask, price_cents),
            DeltaSide::NoBid if price_cents <= 100 => (Side::Ask, 100 - price_cents),
            DeltaSide::NoAsk if price_cents <= 100 => (Side::Bid, 100 - price_cents),
            DeltaSide::NoBid | DeltaSide::NoAsk => return,
        };

        let mut state = self.inner.write();
        let map = match book_side {
            Side::Bid => &mut state.yes_bids,
            Side::Ask => &mut state.yes_asks,
        };

        if qty == 0 {
            map.remove(&price);
        } else {
            map.insert(price, qty);
        }
    }

    pub fn best_yes_bid(&self) -> Option<u16> {
        self.inner.read().yes_bids.keys().next_back().copied()
    }

    pub fn best_yes_ask(&self) -> Option<u16> {
        self.inner.read().yes_asks.keys().next().copied()
    }

    pub fn bid_size_at_best(&self) -> u64 {
        let state = self.inner.read();
        state
            .yes_bids
            .keys()
            .next_back()
            .and_then(|p| state.yes_bids.get(p))
            .copied()
            .unwrap_or(0)
    }

    pub fn ask_size_at_best(&self) -> u64 {
        let state = self.inner.read();
        state
            .yes_asks
            .keys()
            .next()
            .and_then(|p| state.yes_asks.get(p))
            .copied()
            .unwrap_or(0)
    }

    /// True when bid ≥ ask — unusable for execution even though both sides
    /// are populated. Callers may still report a synthetic ±1 cent quote
    /// around mid for observability, never for execution.
    pub fn is_crossed(&self) -> bool {
        match (self.best_yes_bid(), self.best_yes_ask()) {
            (Some(bid), Some(ask)) => bid >= ask,
            _ => false,
        }
    }

    /// Mid price in cents, or `None` if either side is empty.
    pub fn mid_cents(&self) -> Option<f64> {
        match (self.best_yes_bid(), self.best_yes_ask()) {
            (Some(bid), Some(ask)) => Some((bid as f64 + ask as f64) / 2.0),
            _ => None,
        }
    }

    pub fn spread_cents(&self) -> Option<i32> {
        match (self.best_yes_bid(), self.best_yes_ask()) {
            (Some(bid), Some(ask)) => Some(ask as i32 - bid as i32),
            _ => None,
        }
    }

    pub fn total_bid_liquidity(&self) -> u64 {
        self.inner.read().yes_bids.values().sum()
    }

    pub fn total_ask_liquidity(&self) -> u64 {
        self.inner.read().yes_asks.values().sum()
    }

    /// Number of price levels currently resting on each side.
    pub fn depth(&self) -> (usize, usize) {
        let state = self.inner.read();
        (state.yes_bids.len(), state.yes_asks.len())
    }
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Bid,
    Ask,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_populates_best_bid_ask() {
        let book = LocalOrderBook::new();
        book.apply_snapshot(&[(48, 100), (47, 50)], &[(52, 80), (53, 40)], &[], &[]);
        assert_eq!(book.best_yes_bid(), Some(48));
        assert_eq!(book.best_yes_ask(), Some(52));
        assert_eq!(book.mid_cents(), Some(50.0));
    }

    #[test]
    fn snapshot_folds_no_side_via_complement() {
        let book = LocalOrderBook::new();
        // A NO bid at 40 is a YES ask at 60; a NO ask at 35 is a YES bid at 65.
        book.apply_snapshot(&[], &[], &[(40, 10)], &[(35, 20)]);
        assert_eq!(book.best_yes_ask(), Some(60));
        assert_eq!(book.best_yes_bid(), Some(65));
    }

    #[test]
    fn snapshot_drops_nonpositive_quantity() {
        let book = LocalOrderBook::new();
        book.apply_snapshot(&[(48, 0)], &[(52, 10)], &[], &[]);
        assert_eq!(book.best_yes_bid(), None);
        assert_eq!(book.best_yes_ask(), Some(52));
    }

    #[test]
    fn delta_adds_and_removes_levels() {
        let book = LocalOrderBook::new();
        book.apply_delta(50, 10, DeltaSide::YesBid);
        assert_eq!(book.best_yes_bid(), Some(50));

        book.apply_delta(50, -5, DeltaSide::YesBid);
        assert_eq!(book.bid_size_at_best(), 5);

        book.apply_delta(50, -5, DeltaSide::YesBid);
        assert_eq!(book.best_yes_bid(), None, "zero quantity removes the level");
    }

    #[test]
    fn delta_negative_on_missing_level_is_noop() {
        let book = LocalOrderBook::new();
        book.apply_delta(50, -5, DeltaSide::YesBid);
        assert_eq!(book.best_yes_bid(), None, "new levels only appear with positive delta");
    }

    #[test]
    fn no_side_delta_folds_to_complement() {
        let book = LocalOrderBook::new();
        book.apply_delta(40, 10, DeltaSide::NoBid); // -> YES ask at 60
        assert_eq!(book.best_yes_ask(), Some(60));

        book.apply_delta(40, -10, DeltaSide::NoBid);
        assert_eq!(book.best_yes_ask(), None);
    }

    #[test]
    fn crossed_book_detected() {
        let book = LocalOrderBook::new();
        book.apply_snapshot(&[(55, 10)], &[(50, 10)], &[], &[]);
        assert!(book.is_crossed());
    }

    #[test]
    fn sequence_gap_detection() {
        let book = LocalOrderBook::new();
        assert_eq!(book.check_sequence(1), SequenceCheck::Ok);
        assert_eq!(book.check_sequence(2), SequenceCheck::Ok);
        assert_eq!(
            book.check_sequence(5),
            SequenceCheck::Gap {
                expected: 3,
                got: 5
            }
        );
        // After a gap is observed, the next contiguous sequence is fine again.
        assert_eq!(book.check_sequence(6), SequenceCheck::Ok);
    }

    #[test]
    fn snapshot_then_reapply_is_idempotent_for_best_quotes() {
        let book = LocalOrderBook::new();
        let bids = [(48u16, 100u64), (47, 50)];
        let asks = [(52u16, 80u64), (53, 40)];
        book.apply_snapshot(&bids, &asks, &[], &[]);
        let (best_bid_1, best_ask_1, liq_1) =
            (book.best_yes_bid(), book.best_yes_ask(), book.total_bid_liquidity() + book.total_ask_liquidity());
        book.apply_snapshot(&bids, &asks, &[], &[]);
        let (best_bid_2, best_ask_2, liq_2) =
            (book.best_yes_bid(), book.best_yes_ask(), book.total_bid_liquidity() + book.total_ask_liquidity());
        assert_eq!(best_bid_1, best_bid_2);
        assert_eq!(best_ask_1, best_ask_2);
        assert_eq!(liq_1, liq_2);
    }
}
