//! Shared plumbing for the per-venue monitor binaries (`venue_kalshi_monitor_rust`,
//! `venue_polymarket_monitor_rust`).
//!
//! A Venue Monitor subscribes to the orchestrator's assignment channel and, for
//! each `(game_id, market_type)`, maintains the *active set* of venue-side
//! identifiers it is currently permitted to publish prices for. Anything
//! arriving off an identifier outside that set is a stale assignment and must
//! be dropped — this is what lets the orchestrator correct a mapping mid-game
//! without the monitor briefly publishing prices for the wrong market.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// What a single active venue identifier resolves to.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentifierMapping {
    pub game_id: String,
    pub market_type: String,
    pub contract_team: Option<String>,
}

/// `_active_by_game_type` from the design: single-writer from the assignment
/// listener, read by the price loop. Consistency is eventual by design (§5) —
/// a reader may briefly see the previous assignment while the writer is mid-swap.
#[derive(Default)]
pub struct ActiveSet {
    /// venue identifier (ticker / token_id) -> where it currently routes.
    by_identifier: RwLock<HashMap<String, IdentifierMapping>>,
    /// (game_id, market_type) -> the set of identifiers currently active for it,
    /// so a full replacement can evict everything it no longer covers.
    by_game_type: RwLock<HashMap<(String, String), Vec<String>>>,
    /// last time any identifier for (game_id, market_type) produced a fresh
    /// price, used to decide when the REST poll fallback must fill a gap.
    last_update: RwLock<HashMap<(String, String), Instant>>,
}

impl ActiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active identifiers for `(game_id, market_type)`. Identifiers
    /// previously active for this key but absent from `mappings` are evicted;
    /// messages referencing them are dropped by `resolve` from this point on.
    pub fn assign(
        &self,
        game_id: &str,
        market_type: &str,
        mappings: Vec<(String, Option<String>)>,
    ) {
        let key = (game_id.to_string(), market_type.to_string());

        let mut by_identifier = self.by_identifier.write();
        let mut by_game_type = self.by_game_type.write();

        if let Some(old_ids) = by_game_type.get(&key) {
            for old_id in old_ids {
                if !mappings.iter().any(|(id, _)| id == old_id) {
                    by_identifier.remove(old_id);
                }
            }
        }

        let mut ids = Vec::with_capacity(mappings.len());
        for (identifier, contract_team) in mappings {
            by_identifier.insert(
                identifier.clone(),
                IdentifierMapping {
                    game_id: game_id.to_string(),
                    market_type: market_type.to_string(),
                    contract_team,
                },
            );
            ids.push(identifier);
        }
        by_game_type.insert(key, ids);
    }

    /// Drop every identifier belonging to `game_id` (all market types), e.g. on
    /// `remove_game`.
    pub fn remove_game(&self, game_id: &str) {
        let mut by_identifier = self.by_identifier.write();
        let mut by_game_type = self.by_game_type.write();
        by_game_type.retain(|(g, _), ids| {
            if g == game_id {
                for id in ids.iter() {
                    by_identifier.remove(id);
                }
                false
            } else {
                true
            }
        });
    }

    /// Resolve a venue identifier to where it should route. `None` means the
    /// identifier is not in the current active set — the caller must drop the
    /// inbound message rather than guess.
    pub fn resolve(&self, identifier: &str) -> Option<IdentifierMapping> {
        self.by_identifier.read().get(identifier).cloned()
    }

    pub fn is_active(&self, identifier: &str) -> bool {
        self.by_identifier.read().contains_key(identifier)
    }

    pub fn active_identifiers(&self, game_id: &str, market_type: &str) -> Vec<String> {
        self.by_game_type
            .read()
            .get(&(game_id.to_string(), market_type.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn mark_updated(&self, game_id: &str, market_type: &str) {
        self.last_update
            .write()
            .insert((game_id.to_string(), market_type.to_string()), Instant::now());
    }

    /// Whether WS data for `(game_id, market_type)` is older than `ttl` (or has
    /// never arrived), meaning the REST poll fallback should fill in.
    pub fn is_stale(&self, game_id: &str, market_type: &str, ttl: Duration) -> bool {
        match self
            .last_update
            .read()
            .get(&(game_id.to_string(), market_type.to_string()))
        {
            Some(t) => t.elapsed() > ttl,
            None => true,
        }
    }

    pub fn tracked_games(&self) -> Vec<(String, String)> {
        self.by_game_type.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_then_resolve() {
        let set = ActiveSet::new();
        set.assign(
            "g1",
            "moneyline",
            vec![("TICK-A".into(), Some("Lakers".into()))],
        );
        let m = set.resolve("TICK-A").expect("should resolve");
        assert_eq!(m.game_id, "g1");
        assert_eq!(m.contract_team.as_deref(), Some("Lakers"));
    }

    #[test]
    fn reassignment_evicts_old_identifier() {
        let set = ActiveSet::new();
        set.assign("g1", "moneyline", vec![("OLD".into(), None)]);
        assert!(set.is_active("OLD"));

        set.assign("g1", "moneyline", vec![("NEW".into(), None)]);
        assert!(!set.is_active("OLD"), "stale identifier must be dropped");
        assert!(set.is_active("NEW"));
    }

    #[test]
    fn unknown_identifier_does_not_resolve() {
        let set = ActiveSet::new();
        assert!(set.resolve("GHOST").is_none());
    }

    #[test]
    fn remove_game_clears_all_its_market_types() {
        let set = ActiveSet::new();
        set.assign("g1", "moneyline", vec![("A".into(), None)]);
        set.assign("g1", "spread", vec![("B".into(), None)]);
        set.assign("g2", "moneyline", vec![("C".into(), None)]);

        set.remove_game("g1");

        assert!(!set.is_active("A"));
        assert!(!set.is_active("B"));
        assert!(set.is_active("C"));
    }

    #[test]
    fn staleness_without_any_update_is_stale() {
        let set = ActiveSet::new();
        assert!(set.is_stale("g1", "moneyline", Duration::from_secs(1)));
        set.mark_updated("g1", "moneyline");
        assert!(!set.is_stale("g1", "moneyline", Duration::from_secs(60)));
    }
}
