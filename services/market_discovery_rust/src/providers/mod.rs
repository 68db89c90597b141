pub mod espn;
pub mod kalshi;
pub mod polymarket;
