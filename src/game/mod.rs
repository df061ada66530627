//! Game Logic Module
//!
//! The round engine and everything it owns. Synchronous and tick-driven;
//! deterministic for a fixed seed and crash point source.
//!
//! ## Module Structure
//!
//! - `state`: Round state, player and round identifiers
//! - `tick`: Engine configuration and the multiplier curve
//! - `timer`: The single armed-timer slot
//! - `crash`: Crash point sources
//! - `wager`: Per-player wagers and cash-out receipts
//! - `history`: Recent crash points
//! - `events`: Engine events for presentation and the transaction log
//! - `engine`: The round state machine and player operations

pub mod crash;
pub mod engine;
pub mod error;
pub mod events;
pub mod history;
pub mod state;
pub mod tick;
pub mod timer;
pub mod wager;

// Re-export key types
pub use crash::{CrashPointSource, ScriptedCrashSource, UniformCrashSource};
pub use engine::{PlayerView, RoundEngine, RoundSnapshot};
pub use error::EngineError;
pub use events::{EngineEvent, EngineEventData};
pub use history::{MultiplierTier, RoundHistory, RoundRecord};
pub use state::{PlayerId, RoundId, RoundPhase, RoundState};
pub use tick::{EngineConfig, TickResult};
pub use timer::TimerSlot;
pub use wager::{CashOut, Wager, WagerStatus};
