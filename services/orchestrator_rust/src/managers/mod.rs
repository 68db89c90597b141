pub mod game_manager;
pub mod kalshi_discovery;
pub mod service_registry;
pub mod shard_manager;
pub mod system_monitor;
