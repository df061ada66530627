//! Collaborator Stores
//!
//! Balance, profile, override and transaction storage the engine talks to. The
//! in-memory implementations back the binary and the tests; a hosted backend
//! plugs in by implementing the traits.

pub mod balance;
pub mod ledger;
pub mod overrides;
pub mod profiles;

pub use balance::{BalanceStore, InMemoryBalanceStore};
pub use ledger::{Transaction, TransactionFilter, TransactionKind, TransactionLog, TransactionStatus};
pub use overrides::{InMemoryOverrideStore, OverrideSetting, OverrideStore};
pub use profiles::{Profile, ProfileStore};

use crate::game::state::PlayerId;

/// Store failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// No account for this player.
    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),

    /// Backend unreachable or rejected the write.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
