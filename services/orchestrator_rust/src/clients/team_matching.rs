use anyhow::Result;
use arbees_rust_core::utils::matching::{match_team_in_text, MatchConfidence};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Debug)]
pub struct TeamMatchResult {
    pub is_match: bool,
    pub confidence: f64,
    pub method: String,
    pub reason: String,
}

/// Resolves whether a team name appears in a block of market text.
///
/// Delegates to the shared fuzzy/alias matcher in `arbees_rust_core` rather
/// than round-tripping through an external service - there's only one
/// implementation of this logic and every other caller in the workspace
/// already uses it directly.
#[derive(Clone)]
pub struct TeamMatchingClient {
    cache: Arc<RwLock<HashMap<(String, String, String), TeamMatchResult>>>,
}

impl TeamMatchingClient {
    pub async fn new(_redis_url: &str) -> Result<Self> {
        Ok(Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub async fn match_teams(
        &self,
        target: &str,
        candidate: &str,
        sport: &str,
    ) -> Result<Option<TeamMatchResult>> {
        let key = (
            target.to_lowercase(),
            candidate.to_lowercase(),
            sport.to_lowercase(),
        );

        {
            let cache = self.cache.read().await;
            if let Some(res) = cache.get(&key) {
                return Ok(Some(res.clone()));
            }
        }

        let matched = match_team_in_text(target, candidate, sport);
        let result = TeamMatchResult {
            is_match: matched.confidence > MatchConfidence::None,
            confidence: matched.score,
            method: format!("{:?}", matched.confidence),
            reason: matched.reason,
        };

        let mut cache = self.cache.write().await;
        cache.insert(key, result.clone());
        Ok(Some(result))
    }
}
