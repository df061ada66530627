//! Core deterministic primitives.
//!
//! Everything random in the engine flows from here, so a whole session can be
//! replayed from one seed.

pub mod rng;

// Re-export core types
pub use rng::{DeterministicRng, derive_session_seed};
