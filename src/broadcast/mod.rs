//! Message distribution engine.
//!
//! Builds the shuffled message pool for a broadcast and delivers it
//! with pacing and flood-wait handling.

mod engine;
mod pacing;
mod pool;

pub use engine::{BroadcastReport, Broadcaster};
pub use pacing::{DEFAULT_MAX_DELAY, DEFAULT_MIN_DELAY, Pacer};
pub use pool::{BlockShuffle, MAX_QUANTITY, Quantity, build_pool, render, render_mention};
