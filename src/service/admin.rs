//! Administrator console.
//!
//! Override scheduling, user management, the dashboard and the transactions
//! view. Every call needs an [`AdminCapability`], which only validated admin
//! claims or a trusted profile flag can produce.

use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::game::engine::RoundEngine;
use crate::game::error::EngineError;
use crate::game::history::RoundRecord;
use crate::game::state::PlayerId;
use crate::service::auth::TokenClaims;
use crate::store::{
    BalanceStore, OverrideStore, Profile, ProfileStore, StoreError, Transaction,
    TransactionFilter, TransactionKind, TransactionLog, TransactionStatus,
};

/// Rounds shown on the dashboard.
pub const DASHBOARD_RECENT_ROUNDS: usize = 5;

/// Proof that the holder is an administrator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdminCapability {
    subject: PlayerId,
}

impl AdminCapability {
    /// Grant from validated token claims.
    pub fn from_claims(claims: &TokenClaims) -> Option<Self> {
        claims.is_admin().then(|| Self {
            subject: claims.player_id(),
        })
    }

    /// Grant from a profile row read with trusted credentials.
    pub fn from_profile(player: PlayerId, is_admin: bool) -> Option<Self> {
        is_admin.then_some(Self { subject: player })
    }

    /// Grant from the profile store's admin flag.
    pub fn from_store<P: ProfileStore>(store: &P, player: &PlayerId) -> Result<Option<Self>, StoreError> {
        let profile = store.profile(player)?;
        Ok(Self::from_profile(profile.player_id, profile.is_admin))
    }

    /// Administrator the capability was granted to.
    pub fn subject(&self) -> PlayerId {
        self.subject
    }
}

/// Admin console errors.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Caller holds no admin capability.
    #[error("administrator rights required")]
    NotAuthorized,

    /// Engine rejected the request.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Profile store rejected the request.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// No transaction with this id.
    #[error("transaction {0} not found")]
    TransactionNotFound(Uuid),
}

/// Dashboard figures.
///
/// `total_payout` is gross winnings credited at cash-out, so `house_profit`
/// is stakes taken minus winnings paid. Only completed rows count.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    /// Profiles
    pub total_users: usize,
    /// Profiles without the admin flag
    pub active_players: usize,
    /// Sum of stakes
    pub total_bets: f64,
    /// Sum of winnings
    pub total_payout: f64,
    /// `total_bets - total_payout`
    pub house_profit: f64,
    /// Latest rounds, newest first
    pub recent_rounds: Vec<RoundRecord>,
}

/// Capability-gated admin operations.
#[derive(Clone, Debug, Default)]
pub struct AdminConsole {
    capability: Option<AdminCapability>,
}

impl AdminConsole {
    /// Console for a caller with or without a capability.
    pub fn new(capability: Option<AdminCapability>) -> Self {
        Self { capability }
    }

    /// Console for the holder of `claims`.
    pub fn for_claims(claims: &TokenClaims) -> Self {
        Self::new(AdminCapability::from_claims(claims))
    }

    /// Whether calls will be accepted.
    pub fn is_authorized(&self) -> bool {
        self.capability.is_some()
    }

    fn require(&self, operation: &'static str) -> Result<AdminCapability, AdminError> {
        self.capability.ok_or_else(|| {
            warn!(operation, "admin operation without capability");
            AdminError::NotAuthorized
        })
    }

    /// Schedule the crash point of the next round.
    pub fn set_crash_point<B, O>(
        &self,
        engine: &mut RoundEngine<B, O>,
        value: f64,
    ) -> Result<(), AdminError>
    where
        B: BalanceStore,
        O: OverrideStore,
    {
        let admin = self.require("set_crash_point")?;
        engine.set_override_crash_point_by(value, Some(admin.subject()))?;
        info!(admin = %admin.subject(), crash_point = value, "admin set crash point");
        Ok(())
    }

    /// Drop any scheduled override.
    pub fn clear_crash_point<B, O>(&self, engine: &mut RoundEngine<B, O>) -> Result<(), AdminError>
    where
        B: BalanceStore,
        O: OverrideStore,
    {
        let admin = self.require("clear_crash_point")?;
        engine.clear_override_crash_point()?;
        info!(admin = %admin.subject(), "admin cleared crash point");
        Ok(())
    }

    /// Override waiting for the next round.
    pub fn active_crash_point<B, O>(&self, engine: &RoundEngine<B, O>) -> Result<Option<f64>, AdminError>
    where
        B: BalanceStore,
        O: OverrideStore,
    {
        self.require("active_crash_point")?;
        Ok(engine.active_override()?)
    }

    /// Every profile, newest first.
    pub fn users<B, O>(&self, engine: &RoundEngine<B, O>) -> Result<Vec<Profile>, AdminError>
    where
        B: BalanceStore + ProfileStore,
        O: OverrideStore,
    {
        self.require("users")?;
        Ok(engine.balances().profiles()?)
    }

    /// Overwrite a player's balance. Returns the new balance.
    pub fn set_balance<B, O>(
        &self,
        engine: &mut RoundEngine<B, O>,
        player: PlayerId,
        balance: f64,
    ) -> Result<f64, AdminError>
    where
        B: BalanceStore,
        O: OverrideStore,
    {
        let admin = self.require("set_balance")?;
        let balance = engine.adjust_balance(player, balance)?;
        info!(admin = %admin.subject(), %player, balance, "admin set balance");
        Ok(balance)
    }

    /// Grant or revoke administrator rights.
    pub fn set_admin<B, O>(
        &self,
        engine: &mut RoundEngine<B, O>,
        player: PlayerId,
        is_admin: bool,
    ) -> Result<(), AdminError>
    where
        B: BalanceStore + ProfileStore,
        O: OverrideStore,
    {
        let admin = self.require("set_admin")?;
        engine.balances_mut().set_admin(&player, is_admin)?;
        info!(admin = %admin.subject(), %player, is_admin, "admin flag changed");
        Ok(())
    }

    /// User counts, money totals and the latest rounds.
    pub fn dashboard<B, O>(
        &self,
        engine: &RoundEngine<B, O>,
        ledger: &TransactionLog,
    ) -> Result<DashboardStats, AdminError>
    where
        B: BalanceStore + ProfileStore,
        O: OverrideStore,
    {
        self.require("dashboard")?;
        let profiles = engine.balances().profiles()?;
        let total_bets = ledger.completed_total(TransactionKind::Bet);
        let total_payout = ledger.completed_total(TransactionKind::Win);

        Ok(DashboardStats {
            total_users: profiles.len(),
            active_players: profiles.iter().filter(|p| !p.is_admin).count(),
            total_bets,
            total_payout,
            house_profit: total_bets - total_payout,
            recent_rounds: engine
                .history()
                .iter()
                .take(DASHBOARD_RECENT_ROUNDS)
                .cloned()
                .collect(),
        })
    }

    /// Filtered transactions, newest first.
    pub fn transactions<'a>(
        &self,
        ledger: &'a TransactionLog,
        filter: &TransactionFilter,
    ) -> Result<Vec<&'a Transaction>, AdminError> {
        self.require("transactions")?;
        Ok(ledger.query(filter))
    }

    /// Change a transaction's status.
    pub fn update_transaction_status(
        &self,
        ledger: &mut TransactionLog,
        id: Uuid,
        status: TransactionStatus,
    ) -> Result<(), AdminError> {
        let admin = self.require("update_transaction_status")?;
        if !ledger.update_status(&id, status) {
            return Err(AdminError::TransactionNotFound(id));
        }
        info!(admin = %admin.subject(), %id, ?status, "transaction status updated");
        Ok(())
    }
}
