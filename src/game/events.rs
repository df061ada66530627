//! Engine Events
//!
//! Events generated by ticks and operations. The driver fans them out to the
//! presentation layer and the transaction log.

use serde::{Serialize, Deserialize};

use crate::game::history::RoundRecord;
use crate::game::state::{PlayerId, RoundId};

/// Engine event data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEventData {
    /// Waiting -> Running. The crash point stays hidden.
    RoundStarted {
        round_id: RoundId,
        round_number: u64,
        overridden: bool,
    },

    /// Running -> Crashed
    RoundCrashed {
        record: RoundRecord,
        ticks_running: u32,
    },

    /// Crashed -> Waiting with a fresh id
    RoundReset {
        round_id: RoundId,
        round_number: u64,
    },

    /// Stake debited, wager created
    BetPlaced {
        player_id: PlayerId,
        round_id: RoundId,
        amount: f64,
        balance_after: f64,
    },

    /// Wager settled Won
    CashedOut {
        player_id: PlayerId,
        round_id: RoundId,
        multiplier: f64,
        winnings: f64,
        profit: f64,
        balance_after: f64,
    },

    /// Wager settled Lost on crash
    WagerLost {
        player_id: PlayerId,
        round_id: RoundId,
        amount: f64,
    },

    /// Unconditional balance credit
    Deposited {
        player_id: PlayerId,
        amount: f64,
        balance_after: f64,
    },

    /// Administrator overwrote a balance
    BalanceAdjusted {
        player_id: PlayerId,
        balance_before: f64,
        balance_after: f64,
    },

    /// Administrator scheduled a crash point for the next round
    OverrideScheduled {
        crash_point: f64,
        set_by: Option<PlayerId>,
    },

    /// Administrator removed the scheduled crash point
    OverrideCleared,
}

/// An engine event stamped with the engine clock.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
    /// Engine tick when the event occurred
    pub tick: u64,

    /// Event data
    pub data: EngineEventData,
}

impl EngineEvent {
    /// Create a new event.
    pub fn new(tick: u64, data: EngineEventData) -> Self {
        Self { tick, data }
    }

    /// Player involved, if any.
    pub fn player_id(&self) -> Option<PlayerId> {
        match &self.data {
            EngineEventData::BetPlaced { player_id, .. }
            | EngineEventData::CashedOut { player_id, .. }
            | EngineEventData::WagerLost { player_id, .. }
            | EngineEventData::Deposited { player_id, .. }
            | EngineEventData::BalanceAdjusted { player_id, .. } => Some(*player_id),
            _ => None,
        }
    }

    /// Round started event.
    pub fn round_started(tick: u64, round_id: RoundId, round_number: u64, overridden: bool) -> Self {
        Self::new(tick, EngineEventData::RoundStarted { round_id, round_number, overridden })
    }

    /// Round crashed event.
    pub fn round_crashed(tick: u64, record: RoundRecord, ticks_running: u32) -> Self {
        Self::new(tick, EngineEventData::RoundCrashed { record, ticks_running })
    }

    /// Round reset event.
    pub fn round_reset(tick: u64, round_id: RoundId, round_number: u64) -> Self {
        Self::new(tick, EngineEventData::RoundReset { round_id, round_number })
    }

    /// Bet placed event.
    pub fn bet_placed(
        tick: u64,
        player_id: PlayerId,
        round_id: RoundId,
        amount: f64,
        balance_after: f64,
    ) -> Self {
        Self::new(
            tick,
            EngineEventData::BetPlaced {
                player_id,
                round_id,
                amount,
                balance_after,
            },
        )
    }

    /// Cash-out event.
    pub fn cashed_out(
        tick: u64,
        player_id: PlayerId,
        round_id: RoundId,
        multiplier: f64,
        winnings: f64,
        profit: f64,
        balance_after: f64,
    ) -> Self {
        Self::new(
            tick,
            EngineEventData::CashedOut {
                player_id,
                round_id,
                multiplier,
                winnings,
                profit,
                balance_after,
            },
        )
    }

    /// Wager lost event.
    pub fn wager_lost(tick: u64, player_id: PlayerId, round_id: RoundId, amount: f64) -> Self {
        Self::new(tick, EngineEventData::WagerLost { player_id, round_id, amount })
    }

    /// Deposit event.
    pub fn deposited(tick: u64, player_id: PlayerId, amount: f64, balance_after: f64) -> Self {
        Self::new(tick, EngineEventData::Deposited { player_id, amount, balance_after })
    }

    /// Administrative balance overwrite event.
    pub fn balance_adjusted(
        tick: u64,
        player_id: PlayerId,
        balance_before: f64,
        balance_after: f64,
    ) -> Self {
        Self::new(
            tick,
            EngineEventData::BalanceAdjusted { player_id, balance_before, balance_after },
        )
    }
}
