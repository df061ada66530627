//! Player profiles.
//!
//! A profile row carries the balance and the administrator flag. The admin
//! console lists and edits them; the engine only sees the balance through
//! [`BalanceStore`](crate::store::BalanceStore).

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::game::state::PlayerId;
use crate::store::StoreError;

/// One player's profile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Account
    pub player_id: PlayerId,
    /// Display name
    pub name: Option<String>,
    /// Current balance
    pub balance: f64,
    /// Administrator flag
    pub is_admin: bool,
    /// Sign-up time
    pub created_at: DateTime<Utc>,
    /// Last balance or flag change
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Non-admin profile created now.
    pub fn new(player_id: PlayerId, balance: f64) -> Self {
        let now = Utc::now();
        Self {
            player_id,
            name: None,
            balance,
            is_admin: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Mark as administrator.
    pub fn with_admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }
}

/// Profile listing and administrator flag management.
pub trait ProfileStore: Send {
    /// All profiles, newest first.
    fn profiles(&self) -> Result<Vec<Profile>, StoreError>;

    /// One profile.
    fn profile(&self, player: &PlayerId) -> Result<Profile, StoreError>;

    /// Grant or revoke administrator rights.
    fn set_admin(&mut self, player: &PlayerId, is_admin: bool) -> Result<(), StoreError>;
}
