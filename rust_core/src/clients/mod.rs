pub mod espn;
pub mod kalshi;
pub mod polymarket;
pub mod polymarket_clob;
