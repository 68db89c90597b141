//! Game monitoring and state management
//!
//! Modules:
//! - `espn`: ESPN API parsing and game utilities
//! - `game`: Main game monitoring loop (Phase 5)

pub mod espn;

// Phase 5+
// pub mod game;
