//! Player wagers.
//!
//! A wager is created Pending while the round is Waiting and ends in exactly
//! one of Won or Lost. Terminal wagers are never mutated again.

use serde::{Serialize, Deserialize};

use crate::game::state::{PlayerId, RoundId};

/// Settlement status of a wager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WagerStatus {
    /// Stake is riding on the current round
    Pending,
    /// Cashed out before the crash
    Won,
    /// Still pending when the round crashed
    Lost,
}

impl WagerStatus {
    /// Won and Lost are terminal.
    pub fn is_terminal(self) -> bool {
        !matches!(self, WagerStatus::Pending)
    }
}

/// A player's single active stake for a round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Wager {
    /// Owning player
    pub player_id: PlayerId,
    /// Round the stake was placed for
    pub round_id: RoundId,
    /// Stake, already debited from the balance
    pub amount: f64,
    /// Settlement status
    pub status: WagerStatus,
    /// Multiplier at cash-out (Won only)
    pub cashout_multiplier: Option<f64>,
    /// `amount * cashout_multiplier - amount` (Won only)
    pub profit: Option<f64>,
}

impl Wager {
    /// New pending wager.
    pub fn new(player_id: PlayerId, round_id: RoundId, amount: f64) -> Self {
        Self {
            player_id,
            round_id,
            amount,
            status: WagerStatus::Pending,
            cashout_multiplier: None,
            profit: None,
        }
    }

    /// Whether the wager can still be cashed out or lost.
    pub fn is_pending(&self) -> bool {
        self.status == WagerStatus::Pending
    }

    /// Gross return if cashed out at `multiplier`.
    pub fn winnings_at(&self, multiplier: f64) -> f64 {
        self.amount * multiplier
    }

    /// Settle as Won at `multiplier`. Returns the gross winnings, or `None`
    /// if the wager was already terminal.
    pub fn settle_won(&mut self, multiplier: f64) -> Option<f64> {
        if !self.is_pending() {
            return None;
        }
        let winnings = self.winnings_at(multiplier);
        self.status = WagerStatus::Won;
        self.cashout_multiplier = Some(multiplier);
        self.profit = Some(winnings - self.amount);
        Some(winnings)
    }

    /// Settle as Lost. Returns `false` if the wager was already terminal.
    pub fn settle_lost(&mut self) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = WagerStatus::Lost;
        true
    }
}

/// Receipt returned by a successful cash-out.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CashOut {
    /// Multiplier locked in
    pub multiplier: f64,
    /// Gross amount credited
    pub winnings: f64,
    /// Winnings minus stake
    pub profit: f64,
    /// Balance after the credit
    pub balance_after: f64,
}
