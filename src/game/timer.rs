//! Armed-timer slot.
//!
//! The engine has exactly one timer slot. Waiting and Crashed arm a phase
//! deadline, Running arms the multiplier ticker. Arming always cancels
//! whatever was armed before, so two tick streams can never coexist.

use serde::{Serialize, Deserialize};

/// Identifier of an armed timer. Never reused within an engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimerId(pub u64);

/// What an armed timer does when it fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerKind {
    /// Fires once when the engine clock reaches `fires_at`
    PhaseDeadline {
        /// Engine tick at which the deadline fires
        fires_at: u64,
    },
    /// Fires on every engine tick
    Ticker,
}

/// A timer currently held by the slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmedTimer {
    /// Identifier
    pub id: TimerId,
    /// Behaviour
    pub kind: TimerKind,
}

impl ArmedTimer {
    /// Whether this timer fires at engine tick `now`.
    pub fn fires_at(&self, now: u64) -> bool {
        match self.kind {
            TimerKind::Ticker => true,
            TimerKind::PhaseDeadline { fires_at } => now >= fires_at,
        }
    }
}

/// Single timer slot.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TimerSlot {
    armed: Option<ArmedTimer>,
    next_id: u64,
    tickers_armed: u64,
    cancelled: u64,
}

impl TimerSlot {
    /// Empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently armed timer.
    pub fn armed(&self) -> Option<ArmedTimer> {
        self.armed
    }

    /// Whether the multiplier ticker is armed.
    pub fn is_ticker_armed(&self) -> bool {
        matches!(self.armed, Some(ArmedTimer { kind: TimerKind::Ticker, .. }))
    }

    /// Arm a phase deadline, cancelling anything armed.
    pub fn arm_deadline(&mut self, fires_at: u64) -> TimerId {
        self.arm(TimerKind::PhaseDeadline { fires_at })
    }

    /// Arm the multiplier ticker, cancelling anything armed.
    pub fn arm_ticker(&mut self) -> TimerId {
        self.tickers_armed += 1;
        self.arm(TimerKind::Ticker)
    }

    /// Cancel the armed timer, if any.
    pub fn cancel(&mut self) -> Option<ArmedTimer> {
        let previous = self.armed.take();
        if previous.is_some() {
            self.cancelled += 1;
        }
        previous
    }

    /// Total tickers armed over the slot's lifetime.
    pub fn tickers_armed(&self) -> u64 {
        self.tickers_armed
    }

    /// Total timers cancelled over the slot's lifetime.
    pub fn cancelled(&self) -> u64 {
        self.cancelled
    }

    fn arm(&mut self, kind: TimerKind) -> TimerId {
        self.cancel();
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.armed = Some(ArmedTimer { id, kind });
        id
    }
}
