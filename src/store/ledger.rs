//! Transaction log.
//!
//! Built from engine events: bets, wins, deposits and admin adjustments each
//! become one row with the balance before and after. Lost wagers produce nothing because the
//! stake was debited when the bet was placed.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::game::events::{EngineEvent, EngineEventData};
use crate::game::state::PlayerId;

/// Kind of balance movement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Credit from the deposit intake
    Deposit,
    /// Stake debited at bet placement
    Bet,
    /// Winnings credited at cash-out
    Win,
    /// Balance overwritten by an administrator
    Adjustment,
}

/// Processing status, editable from the admin console.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Awaiting confirmation
    Pending,
    /// Applied
    Completed,
    /// Rejected by the backend
    Failed,
    /// Voided by an administrator
    Cancelled,
}

/// One balance movement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique id
    pub id: Uuid,
    /// Account
    pub player_id: PlayerId,
    /// Movement kind
    pub kind: TransactionKind,
    /// Absolute amount moved
    pub amount: f64,
    /// Balance before the movement
    pub balance_before: f64,
    /// Balance after the movement
    pub balance_after: f64,
    /// Processing status
    pub status: TransactionStatus,
    /// Free-form note
    pub description: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Completed transaction stamped now.
    pub fn completed(
        player_id: PlayerId,
        kind: TransactionKind,
        amount: f64,
        balance_before: f64,
        balance_after: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            player_id,
            kind,
            amount,
            balance_before,
            balance_after,
            status: TransactionStatus::Completed,
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Query over the log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionFilter {
    /// Only this kind
    pub kind: Option<TransactionKind>,
    /// Only this status
    pub status: Option<TransactionStatus>,
    /// Only this player
    pub player_id: Option<PlayerId>,
    /// Maximum rows returned
    pub limit: usize,
}

impl Default for TransactionFilter {
    fn default() -> Self {
        Self {
            kind: None,
            status: None,
            player_id: None,
            limit: 100,
        }
    }
}

impl TransactionFilter {
    fn matches(&self, tx: &Transaction) -> bool {
        self.kind.map_or(true, |k| tx.kind == k)
            && self.status.map_or(true, |s| tx.status == s)
            && self.player_id.map_or(true, |p| tx.player_id == p)
    }
}

/// Append-only log of balance movements.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TransactionLog {
    entries: Vec<Transaction>,
}

impl TransactionLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transaction.
    pub fn push(&mut self, tx: Transaction) -> &Transaction {
        self.entries.push(tx);
        &self.entries[self.entries.len() - 1]
    }

    /// Record the balance movement carried by `event`, if any.
    pub fn record_event(&mut self, event: &EngineEvent) -> Option<&Transaction> {
        let tx = match &event.data {
            EngineEventData::BetPlaced { player_id, round_id, amount, balance_after } => {
                Transaction::completed(
                    *player_id,
                    TransactionKind::Bet,
                    *amount,
                    balance_after + amount,
                    *balance_after,
                )
                .with_description(format!("bet on round {round_id}"))
            }
            EngineEventData::CashedOut {
                player_id,
                round_id,
                multiplier,
                winnings,
                balance_after,
                ..
            } => Transaction::completed(
                *player_id,
                TransactionKind::Win,
                *winnings,
                balance_after - winnings,
                *balance_after,
            )
            .with_description(format!("cash out at {multiplier:.2}x on round {round_id}")),
            EngineEventData::Deposited { player_id, amount, balance_after } => {
                Transaction::completed(
                    *player_id,
                    TransactionKind::Deposit,
                    *amount,
                    balance_after - amount,
                    *balance_after,
                )
            }
            EngineEventData::BalanceAdjusted { player_id, balance_before, balance_after } => {
                Transaction::completed(
                    *player_id,
                    TransactionKind::Adjustment,
                    (balance_after - balance_before).abs(),
                    *balance_before,
                    *balance_after,
                )
                .with_description("admin balance adjustment")
            }
            _ => return None,
        };
        Some(self.push(tx))
    }

    /// Sum of completed amounts of one kind.
    pub fn completed_total(&self, kind: TransactionKind) -> f64 {
        self.entries
            .iter()
            .filter(|tx| tx.kind == kind && tx.status == TransactionStatus::Completed)
            .map(|tx| tx.amount)
            .sum()
    }

    /// Matching rows, newest first.
    pub fn query(&self, filter: &TransactionFilter) -> Vec<&Transaction> {
        self.entries
            .iter()
            .rev()
            .filter(|tx| filter.matches(tx))
            .take(filter.limit)
            .collect()
    }

    /// Look up by id.
    pub fn get(&self, id: &Uuid) -> Option<&Transaction> {
        self.entries.iter().find(|tx| tx.id == *id)
    }

    /// Change the status of a row. Returns `false` if the id is unknown.
    pub fn update_status(&mut self, id: &Uuid, status: TransactionStatus) -> bool {
        match self.entries.iter_mut().find(|tx| tx.id == *id) {
            Some(tx) => {
                tx.status = status;
                tx.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
