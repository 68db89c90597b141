// Core modules (used by services)
pub mod alerts;
pub mod clients;
pub mod db;
pub mod models;
pub mod redis;
pub mod utils;
pub mod win_prob;

// Advanced modules (from terauss integration)
pub mod atomic_orderbook;
pub mod circuit_breaker;
pub mod execution;
pub mod league_config;
pub mod local_order_book;
pub mod position_tracker;
pub mod simd;
pub mod team_cache;
pub mod types;
pub mod venue_monitor;
