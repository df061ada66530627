//! Engine errors.
//!
//! Every variant is a rejected operation. None of them halt the engine and a
//! rejection never mutates state.

use crate::game::state::RoundPhase;
use crate::store::StoreError;

/// Rejected engine operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// Stake exceeds the available balance.
    #[error("insufficient balance: requested {requested:.2}, available {available:.2}")]
    InsufficientBalance {
        /// Requested stake
        requested: f64,
        /// Balance at the time of the request
        available: f64,
    },

    /// Operation not allowed in the current phase.
    #[error("{operation} not allowed while {phase}")]
    InvalidPhase {
        /// Rejected operation
        operation: &'static str,
        /// Phase at the time of the request
        phase: RoundPhase,
    },

    /// Cash-out with no pending wager.
    #[error("no active wager")]
    NoActiveWager,

    /// Player already has a wager this round.
    #[error("a wager is already active for this round")]
    DuplicateWager,

    /// Amount is zero, negative, non-finite, or below a minimum.
    #[error("invalid amount: {0}")]
    InvalidAmount(f64),

    /// Override crash point out of range.
    #[error("invalid crash point: {0}")]
    InvalidCrashPoint(f64),

    /// Collaborator store failed; engine state is unchanged.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
