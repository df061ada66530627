//! Player balance store.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::game::state::PlayerId;
use crate::store::profiles::{Profile, ProfileStore};
use crate::store::StoreError;

/// Source of truth for player balances.
///
/// The engine reads before every debit or credit and writes the new value
/// before touching its own state.
pub trait BalanceStore: Send {
    /// Current balance of `player`.
    fn get_balance(&self, player: &PlayerId) -> Result<f64, StoreError>;

    /// Overwrite the balance of `player`.
    fn set_balance(&mut self, player: &PlayerId, amount: f64) -> Result<(), StoreError>;
}

/// BTreeMap of profile rows. Serves balances to the engine and profiles to
/// the admin console.
#[derive(Clone, Debug, Default)]
pub struct InMemoryBalanceStore {
    profiles: BTreeMap<PlayerId, Profile>,
}

impl InMemoryBalanceStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or reset) an account with `initial` balance.
    pub fn open_account(&mut self, player: PlayerId, initial: f64) {
        self.insert_profile(Profile::new(player, initial));
    }

    /// Builder form of [`open_account`](Self::open_account).
    pub fn with_account(mut self, player: PlayerId, initial: f64) -> Self {
        self.open_account(player, initial);
        self
    }

    /// Insert (or replace) a full profile row.
    pub fn insert_profile(&mut self, profile: Profile) {
        self.profiles.insert(profile.player_id, profile);
    }

    /// Builder form of [`insert_profile`](Self::insert_profile).
    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.insert_profile(profile);
        self
    }

    fn row_mut(&mut self, player: &PlayerId) -> Result<&mut Profile, StoreError> {
        self.profiles
            .get_mut(player)
            .ok_or(StoreError::UnknownPlayer(*player))
    }
}

impl BalanceStore for InMemoryBalanceStore {
    fn get_balance(&self, player: &PlayerId) -> Result<f64, StoreError> {
        self.profiles
            .get(player)
            .map(|p| p.balance)
            .ok_or(StoreError::UnknownPlayer(*player))
    }

    fn set_balance(&mut self, player: &PlayerId, amount: f64) -> Result<(), StoreError> {
        let row = self.row_mut(player)?;
        row.balance = amount;
        row.updated_at = Utc::now();
        Ok(())
    }
}

impl ProfileStore for InMemoryBalanceStore {
    fn profiles(&self) -> Result<Vec<Profile>, StoreError> {
        let mut rows: Vec<Profile> = self.profiles.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    fn profile(&self, player: &PlayerId) -> Result<Profile, StoreError> {
        self.profiles
            .get(player)
            .cloned()
            .ok_or(StoreError::UnknownPlayer(*player))
    }

    fn set_admin(&mut self, player: &PlayerId, is_admin: bool) -> Result<(), StoreError> {
        let row = self.row_mut(player)?;
        row.is_admin = is_admin;
        row.updated_at = Utc::now();
        Ok(())
    }
}
