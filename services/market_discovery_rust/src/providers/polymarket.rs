use anyhow::Result;
use log::error;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const POLY_API: &str = "https://gamma-api.polymarket.com/markets";

/// Gamma tag slugs -> numeric tag IDs (as returned by
/// https://gamma-api.polymarket.com/tags). Hardcoded to keep discovery
/// low-latency and avoid an extra tags lookup call.
fn tag_id_for_slug(slug: &str) -> Option<u64> {
    match slug.to_lowercase().as_str() {
        "sports" => Some(1),
        "nba" => Some(745),
        "nfl" => Some(450),
        "nhl" => Some(899),
        "ncaab" | "ncaa_basketball" => Some(101952),
        "ncaaf" | "ncaa_football" | "cfb" => Some(101953),
        "mlb" => Some(100094),
        "mls" => Some(100095),
        "soccer" => Some(100090),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct PolymarketClient {
    client: Client,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Market {
    pub id: String,
    pub condition_id: Option<String>,
    pub question: String,
    pub volume: Option<String>,
}

impl PolymarketClient {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Fetch open markets for a sport tag, filtered locally by `query`
    /// (empty query keeps all). Mirrors the core `PolymarketClient` but
    /// skips proxy support, which this read-only discovery path doesn't need.
    pub async fn search_markets(&self, query: &str, sport: &str) -> Result<Vec<Market>> {
        const BATCH_SIZE: usize = 500;
        const MAX_FETCH: usize = 5000;

        let tag_id = tag_id_for_slug(sport).unwrap_or(1);

        let mut all: Vec<Market> = Vec::new();
        let mut offset: usize = 0;

        loop {
            let params = [
                ("limit", BATCH_SIZE.to_string()),
                ("offset", offset.to_string()),
                ("closed", "false".to_string()),
                ("active", "true".to_string()),
                ("tag_id", tag_id.to_string()),
                ("order", "volume".to_string()),
                ("ascending", "false".to_string()),
            ];

            let resp = self.client.get(POLY_API).query(&params).send().await?;

            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                error!("Polymarket API error: {} - {}", status, text);
                break;
            }

            let batch: Vec<Market> = resp.json().await?;
            let count = batch.len();
            if count == 0 {
                break;
            }

            all.extend(batch);
            offset += count;

            if count < BATCH_SIZE || all.len() >= MAX_FETCH {
                break;
            }
        }

        let query_norm = query.to_lowercase();
        let filtered = if query_norm.is_empty() {
            all
        } else {
            all.into_iter()
                .filter(|m| m.question.to_lowercase().contains(&query_norm))
                .collect()
        };

        Ok(filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_sport_falls_back_to_sports_tag() {
        assert_eq!(tag_id_for_slug("curling"), None);
    }

    #[test]
    fn known_league_resolves() {
        assert_eq!(tag_id_for_slug("nba"), Some(745));
    }
}
