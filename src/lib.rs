//! # Crash Engine
//!
//! Round engine for a multiplier crash game: a tick-driven curve, one wager
//! per player per round, cash-outs at the live multiplier and administrator
//! crash point overrides.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       CRASH ENGINE                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                 │
//! │  └── rng.rs      - Xorshift128+ PRNG, seed derivation       │
//! │                                                             │
//! │  game/           - Round engine (synchronous)               │
//! │  ├── state.rs    - Round state and identifiers              │
//! │  ├── tick.rs     - Config and multiplier curve              │
//! │  ├── timer.rs    - Single armed-timer slot                  │
//! │  ├── crash.rs    - Crash point sources                      │
//! │  ├── wager.rs    - Wagers and cash-out receipts             │
//! │  ├── engine.rs   - State machine and player operations      │
//! │  ├── history.rs  - Recent crash points                      │
//! │  └── events.rs   - Engine events                            │
//! │                                                             │
//! │  store/          - Collaborator stores                      │
//! │  ├── balance.rs  - Player balances                          │
//! │  ├── profiles.rs - Player profiles and admin flag           │
//! │  ├── overrides.rs- Admin crash point override               │
//! │  └── ledger.rs   - Transaction log                          │
//! │                                                             │
//! │  service/        - Outer shell (non-deterministic)          │
//! │  ├── driver.rs   - tokio tick loop and broadcasts           │
//! │  ├── auth.rs     - JWT validation                           │
//! │  └── admin.rs    - Capability-gated admin console           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! `core/` and `game/` never read the clock or an ambient RNG. Round ids and
//! crash points come from seeded sources, so a seeded engine ticked the same
//! number of times with the same operations replays identically. History
//! timestamps are the only wall-clock values and never feed back into play.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use crate::core::rng::DeterministicRng;
pub use game::engine::{RoundEngine, RoundSnapshot};
pub use game::error::EngineError;
pub use game::state::{PlayerId, RoundId, RoundPhase};
pub use game::tick::EngineConfig;
pub use service::driver::EngineDriver;
pub use store::{BalanceStore, InMemoryBalanceStore, InMemoryOverrideStore, OverrideStore, ProfileStore};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tick rate (Hz)
pub const TICK_RATE_HZ: u32 = 20;
