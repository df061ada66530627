//! Round Engine
//!
//! Owns the round lifecycle, the wagers of every player context and the
//! single timer slot. Fully synchronous: whatever scheduler hosts it calls
//! [`RoundEngine::tick`] once per tick period, and tests call it directly.
//!
//! ```text
//!   Waiting ──(dwell)──> Running ──(m >= crash)──> Crashed ──(dwell)──> Waiting
//!   deadline timer        ticker                    deadline timer
//! ```
//!
//! Balances live in the [`BalanceStore`]. Bets and cash-outs write the store
//! first and only then touch engine state, so a failed write leaves the
//! engine exactly as it was.

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};
use tracing::{debug, info, warn};

use crate::core::rng::DeterministicRng;
use crate::game::crash::{clamp_crash_point, CrashPointSource, UniformCrashSource};
use crate::game::error::EngineError;
use crate::game::events::{EngineEvent, EngineEventData};
use crate::game::history::{RoundHistory, RoundRecord};
use crate::game::state::{PlayerId, RoundId, RoundPhase, RoundState};
use crate::game::tick::{next_multiplier, EngineConfig, TickResult};
use crate::game::timer::{TimerKind, TimerSlot};
use crate::game::wager::{CashOut, Wager};
use crate::store::{BalanceStore, InMemoryBalanceStore, InMemoryOverrideStore, OverrideStore};

/// Read-only view handed to the presentation layer every tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    /// Engine clock
    pub tick: u64,
    /// Current phase
    pub phase: RoundPhase,
    /// Display round id
    pub round_id: RoundId,
    /// Round counter
    pub round_number: u64,
    /// Full-precision multiplier
    pub multiplier: f64,
    /// Multiplier formatted for display
    pub display_multiplier: String,
    /// Crash point, only while Crashed
    pub crash_point: Option<f64>,
    /// Per-player view, when requested
    pub player: Option<PlayerView>,
}

/// One player's slice of a snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    /// Player
    pub player_id: PlayerId,
    /// Balance, if the store answered
    pub balance: Option<f64>,
    /// Wager for the current round
    pub wager: Option<Wager>,
}

/// The round engine.
pub struct RoundEngine<B = InMemoryBalanceStore, O = InMemoryOverrideStore>
where
    B: BalanceStore,
    O: OverrideStore,
{
    config: EngineConfig,
    round: RoundState,
    wagers: BTreeMap<PlayerId, Wager>,
    balances: B,
    overrides: O,
    crash_source: Box<dyn CrashPointSource>,
    /// Round id draws; kept apart from crash points so scripted sources
    /// do not shift ids.
    rng: DeterministicRng,
    timer: TimerSlot,
    clock: u64,
    history: RoundHistory,
    pending_events: Vec<EngineEvent>,
}

impl RoundEngine<InMemoryBalanceStore, InMemoryOverrideStore> {
    /// Engine over in-memory stores with a seeded uniform crash source.
    pub fn in_memory(config: EngineConfig, balances: InMemoryBalanceStore, seed: u64) -> Self {
        let source = UniformCrashSource::with_span(seed, config.crash_span);
        Self::new(
            config,
            balances,
            InMemoryOverrideStore::new(),
            Box::new(source),
            seed.rotate_left(32),
        )
    }
}

impl<B, O> RoundEngine<B, O>
where
    B: BalanceStore,
    O: OverrideStore,
{
    /// Create an engine in Waiting with the waiting dwell armed.
    pub fn new(
        config: EngineConfig,
        balances: B,
        overrides: O,
        crash_source: Box<dyn CrashPointSource>,
        id_seed: u64,
    ) -> Self {
        let mut rng = DeterministicRng::new(id_seed);
        let round = RoundState::new(RoundId::generate(&mut rng), 1);
        let history = RoundHistory::new(config.history_capacity);

        let mut engine = Self {
            config,
            round,
            wagers: BTreeMap::new(),
            balances,
            overrides,
            crash_source,
            rng,
            timer: TimerSlot::new(),
            clock: 0,
            history,
            pending_events: Vec::new(),
        };
        engine.arm_waiting_dwell();
        engine
    }

    // =========================================================================
    // TICK
    // =========================================================================

    /// Advance the engine clock by one tick and fire the armed timer.
    pub fn tick(&mut self) -> TickResult {
        self.clock += 1;
        let mut result = TickResult::default();

        if let Some(timer) = self.timer.armed() {
            if timer.fires_at(self.clock) {
                match (timer.kind, self.round.phase) {
                    (TimerKind::Ticker, RoundPhase::Running) => {
                        result.crashed = self.advance_multiplier();
                    }
                    (TimerKind::PhaseDeadline { .. }, RoundPhase::Waiting) => {
                        result.started = self.start_round();
                    }
                    (TimerKind::PhaseDeadline { .. }, RoundPhase::Crashed) => {
                        self.reset_round();
                        result.reset = true;
                    }
                    (kind, phase) => {
                        warn!(?kind, %phase, "timer armed for another phase, re-arming");
                        self.rearm_for_phase();
                    }
                }
            }
        }

        result.phase = self.round.phase;
        result.multiplier = self.round.multiplier;
        result.events = self.take_events();
        result
    }

    /// Start the round now.
    ///
    /// Only acts from Waiting; returns `false` (and changes nothing) when a
    /// round is already Running or Crashed. Cancels the waiting deadline
    /// before arming the ticker.
    pub fn start_round(&mut self) -> bool {
        if self.round.phase != RoundPhase::Waiting {
            debug!(phase = %self.round.phase, "start_round ignored");
            return false;
        }

        self.timer.cancel();
        let (crash_point, overridden) = self.select_crash_point();

        self.round.phase = RoundPhase::Running;
        self.round.multiplier = 1.0;
        self.round.crash_point = crash_point;
        self.round.overridden = overridden;
        self.round.ticks_running = 0;
        self.timer.arm_ticker();

        info!(
            round = %self.round.round_id,
            number = self.round.round_number,
            bets = self.wagers.len(),
            overridden,
            "round started"
        );
        self.push_event(EngineEvent::round_started(
            self.clock,
            self.round.round_id,
            self.round.round_number,
            overridden,
        ));
        true
    }

    /// One multiplier step. Returns `true` if the round crashed.
    fn advance_multiplier(&mut self) -> bool {
        let next = next_multiplier(self.round.multiplier, &self.config);
        self.round.ticks_running += 1;

        if next >= self.round.crash_point {
            self.crash();
            return true;
        }

        self.round.multiplier = next;
        #[cfg(feature = "debug-tracing")]
        tracing::trace!(multiplier = next, tick = self.clock, "multiplier advanced");
        false
    }

    /// Enter Crashed. Pending wagers are lost in the same call, so no
    /// cash-out can observe Crashed with a wager still pending.
    fn crash(&mut self) {
        self.round.multiplier = self.round.crash_point;
        self.round.phase = RoundPhase::Crashed;

        let record = RoundRecord::new(
            self.round.round_id,
            self.round.round_number,
            self.round.crash_point,
            self.round.overridden,
        );
        self.history.record(record.clone());
        self.push_event(EngineEvent::round_crashed(self.clock, record, self.round.ticks_running));

        let mut lost = Vec::new();
        for (player_id, wager) in self.wagers.iter_mut() {
            if wager.settle_lost() {
                lost.push(EngineEvent::wager_lost(self.clock, *player_id, wager.round_id, wager.amount));
            }
        }

        info!(
            round = %self.round.round_id,
            crash_point = %self.round.display_multiplier(),
            ticks = self.round.ticks_running,
            lost = lost.len(),
            "round crashed"
        );
        self.pending_events.extend(lost);

        self.arm_crashed_dwell();
    }

    /// Crashed -> Waiting: discard wagers, fresh id, multiplier back to 1.0.
    fn reset_round(&mut self) {
        self.wagers.clear();
        let round_id = RoundId::generate(&mut self.rng);
        self.round = RoundState::new(round_id, self.round.round_number + 1);
        self.arm_waiting_dwell();

        debug!(round = %round_id, "waiting for bets");
        self.push_event(EngineEvent::round_reset(self.clock, round_id, self.round.round_number));
    }

    fn arm_waiting_dwell(&mut self) {
        self.timer
            .arm_deadline(self.clock.saturating_add(self.config.waiting_ticks()));
    }

    fn arm_crashed_dwell(&mut self) {
        self.timer
            .arm_deadline(self.clock.saturating_add(self.config.crashed_ticks()));
    }

    /// Arm the timer the current phase expects, replacing whatever is armed.
    fn rearm_for_phase(&mut self) {
        match self.round.phase {
            RoundPhase::Waiting => self.arm_waiting_dwell(),
            RoundPhase::Running => {
                self.timer.arm_ticker();
            }
            RoundPhase::Crashed => self.arm_crashed_dwell(),
        }
    }

    /// Override if one is active (consuming it), otherwise a random draw.
    fn select_crash_point(&mut self) -> (f64, bool) {
        let floor = self.config.min_crash_point;
        match self.overrides.get_active_override() {
            Ok(Some(value)) => {
                if let Err(err) = self.overrides.clear_active_override() {
                    warn!(%err, "failed to clear consumed override");
                }
                (clamp_crash_point(value, floor), true)
            }
            Ok(None) => (clamp_crash_point(self.crash_source.next_crash_point(), floor), false),
            Err(err) => {
                warn!(%err, "override store unavailable, using random crash point");
                (clamp_crash_point(self.crash_source.next_crash_point(), floor), false)
            }
        }
    }

    // =========================================================================
    // PLAYER OPERATIONS
    // =========================================================================

    /// Stake `amount` on the upcoming round.
    ///
    /// Requires Waiting, no wager yet this round, and `0 < amount <= balance`.
    /// On success the balance drops by exactly `amount`.
    pub fn place_bet(&mut self, player: PlayerId, amount: f64) -> Result<Wager, EngineError> {
        if self.round.phase != RoundPhase::Waiting {
            return Err(EngineError::InvalidPhase {
                operation: "place_bet",
                phase: self.round.phase,
            });
        }
        if self.wagers.contains_key(&player) {
            return Err(EngineError::DuplicateWager);
        }
        if !amount.is_finite() || amount <= 0.0 {
            return Err(EngineError::InvalidAmount(amount));
        }

        let available = self.balances.get_balance(&player)?;
        if amount > available {
            return Err(EngineError::InsufficientBalance {
                requested: amount,
                available,
            });
        }

        let balance_after = available - amount;
        self.balances.set_balance(&player, balance_after)?;

        let wager = Wager::new(player, self.round.round_id, amount);
        self.wagers.insert(player, wager.clone());

        debug!(%player, amount, balance_after, round = %self.round.round_id, "bet placed");
        self.push_event(EngineEvent::bet_placed(
            self.clock,
            player,
            self.round.round_id,
            amount,
            balance_after,
        ));
        Ok(wager)
    }

    /// Lock in the current multiplier.
    ///
    /// Requires Running and a Pending wager. Credits `amount * multiplier`.
    pub fn cash_out(&mut self, player: PlayerId) -> Result<CashOut, EngineError> {
        if self.round.phase != RoundPhase::Running {
            return Err(EngineError::InvalidPhase {
                operation: "cash_out",
                phase: self.round.phase,
            });
        }
        let amount = match self.wagers.get(&player) {
            Some(wager) if wager.is_pending() => wager.amount,
            _ => return Err(EngineError::NoActiveWager),
        };

        let multiplier = self.round.multiplier;
        let winnings = amount * multiplier;
        let balance_after = self.balances.get_balance(&player)? + winnings;
        self.balances.set_balance(&player, balance_after)?;

        let profit = winnings - amount;
        if let Some(wager) = self.wagers.get_mut(&player) {
            wager.settle_won(multiplier);
        }

        debug!(%player, multiplier, winnings, balance_after, "cashed out");
        self.push_event(EngineEvent::cashed_out(
            self.clock,
            player,
            self.round.round_id,
            multiplier,
            winnings,
            profit,
            balance_after,
        ));
        Ok(CashOut {
            multiplier,
            winnings,
            profit,
            balance_after,
        })
    }

    /// Unconditional credit. Allowed in any phase.
    pub fn deposit(&mut self, player: PlayerId, amount: f64) -> Result<f64, EngineError> {
        if !amount.is_finite() || amount <= 0.0 || amount < self.config.min_deposit {
            return Err(EngineError::InvalidAmount(amount));
        }

        let balance_after = self.balances.get_balance(&player)? + amount;
        self.balances.set_balance(&player, balance_after)?;

        info!(%player, amount, balance_after, "deposit credited");
        self.push_event(EngineEvent::deposited(self.clock, player, amount, balance_after));
        Ok(balance_after)
    }

    /// Overwrite a balance from the admin console. Allowed in any phase; an
    /// open wager keeps its stake.
    pub fn adjust_balance(&mut self, player: PlayerId, balance: f64) -> Result<f64, EngineError> {
        if !balance.is_finite() || balance < 0.0 {
            return Err(EngineError::InvalidAmount(balance));
        }

        let balance_before = self.balances.get_balance(&player)?;
        self.balances.set_balance(&player, balance)?;

        info!(%player, balance_before, balance_after = balance, "balance adjusted");
        self.push_event(EngineEvent::balance_adjusted(self.clock, player, balance_before, balance));
        Ok(balance)
    }

    // =========================================================================
    // ADMINISTRATION
    // =========================================================================

    /// Force the crash point of the next round to start.
    ///
    /// The running round keeps its crash point. Capability checks are the
    /// caller's job.
    pub fn set_override_crash_point(&mut self, value: f64) -> Result<(), EngineError> {
        self.set_override_crash_point_by(value, None)
    }

    /// [`set_override_crash_point`](Self::set_override_crash_point) recording
    /// the administrator who asked for it.
    pub fn set_override_crash_point_by(
        &mut self,
        value: f64,
        set_by: Option<PlayerId>,
    ) -> Result<(), EngineError> {
        let within_ceiling = self.config.override_ceiling.map_or(true, |max| value <= max);
        if !value.is_finite() || value < self.config.min_crash_point || !within_ceiling {
            return Err(EngineError::InvalidCrashPoint(value));
        }

        self.overrides.set_active_override(value, set_by)?;

        info!(crash_point = value, set_by = ?set_by.map(|id| id.short()), "crash point override scheduled");
        self.push_event(EngineEvent::new(
            self.clock,
            EngineEventData::OverrideScheduled { crash_point: value, set_by },
        ));
        Ok(())
    }

    /// Remove any scheduled override.
    pub fn clear_override_crash_point(&mut self) -> Result<(), EngineError> {
        self.overrides.clear_active_override()?;

        info!("crash point override cleared");
        self.push_event(EngineEvent::new(self.clock, EngineEventData::OverrideCleared));
        Ok(())
    }

    /// Override waiting for the next round.
    pub fn active_override(&self) -> Result<Option<f64>, EngineError> {
        Ok(self.overrides.get_active_override()?)
    }

    // =========================================================================
    // VIEWS
    // =========================================================================

    /// Current round.
    pub fn round(&self) -> &RoundState {
        &self.round
    }

    /// Current phase.
    pub fn phase(&self) -> RoundPhase {
        self.round.phase
    }

    /// Current multiplier.
    pub fn multiplier(&self) -> f64 {
        self.round.multiplier
    }

    /// Engine clock in ticks.
    pub fn clock(&self) -> u64 {
        self.clock
    }

    /// Configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Balance of `player`.
    pub fn balance(&self, player: &PlayerId) -> Result<f64, EngineError> {
        Ok(self.balances.get_balance(player)?)
    }

    /// Wager of `player` in the current round.
    pub fn wager(&self, player: &PlayerId) -> Option<&Wager> {
        self.wagers.get(player)
    }

    /// All wagers of the current round, by player id.
    pub fn wagers(&self) -> impl Iterator<Item = &Wager> {
        self.wagers.values()
    }

    /// Completed rounds, newest first.
    pub fn history(&self) -> &RoundHistory {
        &self.history
    }

    /// Timer slot, for inspection.
    pub fn timers(&self) -> &TimerSlot {
        &self.timer
    }

    /// Balance store.
    pub fn balances(&self) -> &B {
        &self.balances
    }

    /// Balance store, mutably (account management).
    pub fn balances_mut(&mut self) -> &mut B {
        &mut self.balances
    }

    /// Override store.
    pub fn overrides(&self) -> &O {
        &self.overrides
    }

    /// Snapshot for the presentation layer. The crash point is included
    /// only once reached.
    pub fn snapshot(&self, player: Option<&PlayerId>) -> RoundSnapshot {
        RoundSnapshot {
            tick: self.clock,
            phase: self.round.phase,
            round_id: self.round.round_id,
            round_number: self.round.round_number,
            multiplier: self.round.multiplier,
            display_multiplier: self.round.display_multiplier(),
            crash_point: self.round.revealed_crash_point(),
            player: player.map(|id| PlayerView {
                player_id: *id,
                balance: self.balances.get_balance(id).ok(),
                wager: self.wagers.get(id).cloned(),
            }),
        }
    }

    /// Drain pending events.
    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.pending_events)
    }

    fn push_event(&mut self, event: EngineEvent) {
        self.pending_events.push(event);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::crash::ScriptedCrashSource;
    use crate::game::wager::WagerStatus;
    use crate::store::StoreError;
    use proptest::prelude::*;

    const EPS: f64 = 1e-9;

    fn alice() -> PlayerId {
        PlayerId::new([1; 16])
    }

    fn bob() -> PlayerId {
        PlayerId::new([2; 16])
    }

    fn scripted(points: &[f64]) -> RoundEngine {
        let balances = InMemoryBalanceStore::new()
            .with_account(alice(), 1000.0)
            .with_account(bob(), 1000.0);
        RoundEngine::new(
            EngineConfig::default(),
            balances,
            InMemoryOverrideStore::new(),
            Box::new(ScriptedCrashSource::new(points.iter().copied(), 5.0)),
            7,
        )
    }

    fn run_until(engine: &mut RoundEngine, phase: RoundPhase, max_ticks: u32) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        for _ in 0..max_ticks {
            if engine.phase() == phase {
                return events;
            }
            events.extend(engine.tick().events);
        }
        panic!("phase {phase} not reached in {max_ticks} ticks");
    }

    /// Balance store whose writes can be switched off.
    struct FlakyStore {
        inner: InMemoryBalanceStore,
        fail_writes: bool,
    }

    impl BalanceStore for FlakyStore {
        fn get_balance(&self, player: &PlayerId) -> Result<f64, StoreError> {
            self.inner.get_balance(player)
        }

        fn set_balance(&mut self, player: &PlayerId, amount: f64) -> Result<(), StoreError> {
            if self.fail_writes {
                return Err(StoreError::Unavailable("write rejected".into()));
            }
            self.inner.set_balance(player, amount)
        }
    }

    fn flaky_engine() -> RoundEngine<FlakyStore, InMemoryOverrideStore> {
        let store = FlakyStore {
            inner: InMemoryBalanceStore::new().with_account(alice(), 1000.0),
            fail_writes: false,
        };
        RoundEngine::new(
            EngineConfig::default(),
            store,
            InMemoryOverrideStore::new(),
            Box::new(ScriptedCrashSource::constant(3.0)),
            1,
        )
    }

    #[test]
    fn test_starts_waiting_with_dwell_armed() {
        let engine = scripted(&[]);
        assert_eq!(engine.phase(), RoundPhase::Waiting);
        assert_eq!(engine.multiplier(), 1.0);
        assert_eq!(engine.round().round_number, 1);
        assert!(!engine.timers().is_ticker_armed());
    }

    #[test]
    fn test_waiting_dwell_then_running() {
        let mut engine = scripted(&[2.0]);
        for _ in 0..99 {
            let result = engine.tick();
            assert!(!result.started);
            assert_eq!(result.phase, RoundPhase::Waiting);
        }
        let result = engine.tick();
        assert!(result.started);
        assert_eq!(result.phase, RoundPhase::Running);
        assert_eq!(result.multiplier, 1.0);
        assert!(engine.timers().is_ticker_armed());
    }

    #[test]
    fn test_full_cycle_returns_to_waiting() {
        let mut engine = scripted(&[1.3]);
        let first_id = engine.round().round_id;

        run_until(&mut engine, RoundPhase::Running, 200);
        run_until(&mut engine, RoundPhase::Crashed, 200);
        assert_eq!(engine.multiplier(), 1.3);
        assert_eq!(engine.round().revealed_crash_point(), Some(1.3));

        // Crashed dwell is 60 ticks
        for _ in 0..59 {
            engine.tick();
            assert_eq!(engine.phase(), RoundPhase::Crashed);
        }
        let result = engine.tick();
        assert!(result.reset);
        assert_eq!(engine.phase(), RoundPhase::Waiting);
        assert_eq!(engine.multiplier(), 1.0);
        assert_eq!(engine.round().round_number, 2);
        assert_ne!(engine.round().round_id, first_id);
        assert_eq!(engine.history().len(), 1);
    }

    #[test]
    fn test_multiplier_single_increment_per_tick() {
        let mut engine = scripted(&[10.0]);
        assert!(engine.start_round());
        assert!(!engine.start_round());
        assert!(!engine.start_round());
        assert_eq!(engine.timers().tickers_armed(), 1);

        let config = EngineConfig::default();
        let mut expected = 1.0;
        for _ in 0..50 {
            engine.tick();
            expected = next_multiplier(expected, &config);
            assert!((engine.multiplier() - expected).abs() < EPS);
            assert!(!engine.start_round());
        }
        assert_eq!(engine.timers().tickers_armed(), 1);
    }

    #[test]
    fn test_start_round_ignored_while_crashed() {
        let mut engine = scripted(&[1.05]);
        engine.start_round();
        run_until(&mut engine, RoundPhase::Crashed, 100);

        assert!(!engine.start_round());
        assert_eq!(engine.phase(), RoundPhase::Crashed);
        assert_eq!(engine.timers().tickers_armed(), 1);
    }

    #[test]
    fn test_early_start_cancels_waiting_deadline() {
        let mut engine = scripted(&[1.5]);
        engine.tick();
        assert!(engine.start_round());
        assert_eq!(engine.timers().cancelled(), 1);

        // The old waiting deadline must not fire mid-round.
        for _ in 0..150 {
            let result = engine.tick();
            assert!(!result.started);
            if result.crashed {
                break;
            }
        }
        assert_eq!(engine.phase(), RoundPhase::Crashed);
    }

    #[test]
    fn test_crash_point_floor() {
        let mut engine = scripted(&[1.0]);
        engine.start_round();
        assert_eq!(engine.round().crash_point, 1.01);
        let result = engine.tick();
        assert!(result.crashed);
        assert_eq!(engine.multiplier(), 1.01);
    }

    #[test]
    fn test_place_bet_debits_balance() {
        let mut engine = scripted(&[]);
        let wager = engine.place_bet(alice(), 100.0).unwrap();

        assert_eq!(wager.amount, 100.0);
        assert_eq!(wager.status, WagerStatus::Pending);
        assert_eq!(engine.balance(&alice()), Ok(900.0));
        assert_eq!(engine.wager(&alice()), Some(&wager));
        assert_eq!(engine.wagers().count(), 1);
    }

    #[test]
    fn test_place_bet_rejections_leave_state_untouched() {
        let mut engine = scripted(&[]);

        assert_eq!(
            engine.place_bet(alice(), 1000.01),
            Err(EngineError::InsufficientBalance { requested: 1000.01, available: 1000.0 })
        );
        assert_eq!(engine.place_bet(alice(), 0.0), Err(EngineError::InvalidAmount(0.0)));
        assert!(matches!(engine.place_bet(alice(), f64::NAN), Err(EngineError::InvalidAmount(_))));
        assert_eq!(engine.balance(&alice()), Ok(1000.0));
        assert!(engine.wager(&alice()).is_none());

        engine.place_bet(alice(), 1000.0).unwrap();
        assert_eq!(engine.place_bet(alice(), 1.0), Err(EngineError::DuplicateWager));
        assert_eq!(engine.balance(&alice()), Ok(0.0));

        let stranger = PlayerId::new([9; 16]);
        assert_eq!(
            engine.place_bet(stranger, 10.0),
            Err(EngineError::Store(StoreError::UnknownPlayer(stranger)))
        );
    }

    #[test]
    fn test_place_bet_outside_waiting() {
        let mut engine = scripted(&[1.05]);
        engine.start_round();
        assert_eq!(
            engine.place_bet(alice(), 10.0),
            Err(EngineError::InvalidPhase { operation: "place_bet", phase: RoundPhase::Running })
        );

        run_until(&mut engine, RoundPhase::Crashed, 100);
        assert!(matches!(
            engine.place_bet(alice(), 10.0),
            Err(EngineError::InvalidPhase { phase: RoundPhase::Crashed, .. })
        ));
        assert_eq!(engine.balance(&alice()), Ok(1000.0));
    }

    #[test]
    fn test_cash_out_scenario() {
        // Bet 100 from 1000, override to 2.0, cash out at 1.5.
        let mut engine = scripted(&[]);
        engine.place_bet(alice(), 100.0).unwrap();
        assert_eq!(engine.balance(&alice()), Ok(900.0));

        engine.set_override_crash_point(2.0).unwrap();
        engine.start_round();
        assert_eq!(engine.round().crash_point, 2.0);

        engine.round.multiplier = 1.5;
        let receipt = engine.cash_out(alice()).unwrap();
        assert_eq!(receipt.winnings, 150.0);
        assert_eq!(receipt.profit, 50.0);
        assert_eq!(receipt.balance_after, 1050.0);
        assert_eq!(engine.balance(&alice()), Ok(1050.0));

        let wager = engine.wager(&alice()).unwrap().clone();
        assert_eq!(wager.status, WagerStatus::Won);
        assert_eq!(wager.cashout_multiplier, Some(1.5));
        assert_eq!(wager.profit, Some(50.0));

        let events = run_until(&mut engine, RoundPhase::Crashed, 200);
        assert_eq!(engine.multiplier(), 2.0);
        assert_eq!(engine.wager(&alice()), Some(&wager));
        assert_eq!(engine.balance(&alice()), Ok(1050.0));
        assert!(!events.iter().any(|e| matches!(e.data, EngineEventData::WagerLost { .. })));
    }

    #[test]
    fn test_cash_out_at_live_multiplier() {
        let mut engine = scripted(&[3.0]);
        engine.place_bet(alice(), 100.0).unwrap();
        engine.start_round();
        while engine.multiplier() < 1.5 {
            engine.tick();
        }

        let m = engine.multiplier();
        let receipt = engine.cash_out(alice()).unwrap();
        assert_eq!(receipt.multiplier, m);
        assert!((engine.balance(&alice()).unwrap() - (900.0 + 100.0 * m)).abs() < EPS);
        assert!((receipt.profit - (100.0 * m - 100.0)).abs() < EPS);

        assert_eq!(engine.cash_out(alice()), Err(EngineError::NoActiveWager));
    }

    #[test]
    fn test_loss_on_crash_without_cash_out() {
        // Bet 50 from 1000, crash at 1.3: balance stays 950.
        let mut engine = scripted(&[1.3]);
        engine.place_bet(alice(), 50.0).unwrap();

        let events = run_until(&mut engine, RoundPhase::Crashed, 500);
        assert_eq!(engine.wager(&alice()).map(|w| w.status), Some(WagerStatus::Lost));
        assert_eq!(engine.balance(&alice()), Ok(950.0));

        let lost: Vec<_> = events
            .iter()
            .filter(|e| matches!(e.data, EngineEventData::WagerLost { .. }))
            .collect();
        assert_eq!(lost.len(), 1);

        // Crash events come before the losses they cause.
        let crash_idx = events
            .iter()
            .position(|e| matches!(e.data, EngineEventData::RoundCrashed { .. }))
            .unwrap();
        let lost_idx = events
            .iter()
            .position(|e| matches!(e.data, EngineEventData::WagerLost { .. }))
            .unwrap();
        assert!(crash_idx < lost_idx);

        run_until(&mut engine, RoundPhase::Waiting, 100);
        assert!(engine.wager(&alice()).is_none());
        assert_eq!(engine.balance(&alice()), Ok(950.0));
    }

    #[test]
    fn test_cash_out_after_crash_cannot_win() {
        let mut engine = scripted(&[1.05]);
        engine.place_bet(alice(), 100.0).unwrap();
        engine.start_round();

        loop {
            if engine.tick().crashed {
                break;
            }
        }
        assert_eq!(
            engine.cash_out(alice()),
            Err(EngineError::InvalidPhase { operation: "cash_out", phase: RoundPhase::Crashed })
        );
        assert_eq!(engine.wager(&alice()).map(|w| w.status), Some(WagerStatus::Lost));
        assert_eq!(engine.balance(&alice()), Ok(900.0));
    }

    #[test]
    fn test_cash_out_preconditions() {
        let mut engine = scripted(&[2.0]);
        engine.place_bet(alice(), 100.0).unwrap();
        assert_eq!(
            engine.cash_out(alice()),
            Err(EngineError::InvalidPhase { operation: "cash_out", phase: RoundPhase::Waiting })
        );

        engine.start_round();
        assert_eq!(engine.cash_out(bob()), Err(EngineError::NoActiveWager));
        assert_eq!(engine.balance(&bob()), Ok(1000.0));
    }

    #[test]
    fn test_independent_player_contexts() {
        let mut engine = scripted(&[2.0]);
        engine.place_bet(alice(), 100.0).unwrap();
        engine.place_bet(bob(), 200.0).unwrap();
        engine.start_round();

        while engine.multiplier() < 1.2 {
            engine.tick();
        }
        engine.cash_out(alice()).unwrap();
        run_until(&mut engine, RoundPhase::Crashed, 500);

        assert_eq!(engine.wager(&alice()).map(|w| w.status), Some(WagerStatus::Won));
        assert_eq!(engine.wager(&bob()).map(|w| w.status), Some(WagerStatus::Lost));
        assert_eq!(engine.balance(&bob()), Ok(800.0));
    }

    #[test]
    fn test_override_applies_to_next_round_only() {
        let mut engine = scripted(&[4.0, 6.0]);
        engine.start_round();
        assert_eq!(engine.round().crash_point, 4.0);

        engine.set_override_crash_point(1.5).unwrap();
        assert_eq!(engine.round().crash_point, 4.0, "running round keeps its crash point");
        assert_eq!(engine.active_override(), Ok(Some(1.5)));

        run_until(&mut engine, RoundPhase::Crashed, 2_000);
        assert_eq!(engine.multiplier(), 4.0);
        run_until(&mut engine, RoundPhase::Running, 200);
        assert_eq!(engine.round().crash_point, 1.5);
        assert!(engine.round().overridden);
        assert_eq!(engine.active_override(), Ok(None));

        run_until(&mut engine, RoundPhase::Crashed, 500);
        run_until(&mut engine, RoundPhase::Running, 200);
        assert_eq!(engine.round().crash_point, 6.0);
        assert!(!engine.round().overridden);
    }

    #[test]
    fn test_override_validation() {
        let mut engine = scripted(&[]);
        assert_eq!(engine.set_override_crash_point(1.0), Err(EngineError::InvalidCrashPoint(1.0)));
        assert!(engine.set_override_crash_point(f64::NAN).is_err());
        assert!(engine.set_override_crash_point(1.01).is_ok());

        engine.config.override_ceiling = Some(100.0);
        assert_eq!(
            engine.set_override_crash_point(100.5),
            Err(EngineError::InvalidCrashPoint(100.5))
        );
        assert_eq!(engine.active_override(), Ok(Some(1.01)));

        engine.clear_override_crash_point().unwrap();
        assert_eq!(engine.active_override(), Ok(None));
    }

    #[test]
    fn test_deposit() {
        let mut engine = scripted(&[]);
        assert_eq!(engine.deposit(alice(), 250.0), Ok(1250.0));
        assert_eq!(engine.deposit(alice(), 5.0), Err(EngineError::InvalidAmount(5.0)));
        assert_eq!(engine.deposit(alice(), -20.0), Err(EngineError::InvalidAmount(-20.0)));
        assert_eq!(engine.balance(&alice()), Ok(1250.0));

        engine.start_round();
        assert_eq!(engine.deposit(alice(), 10.0), Ok(1260.0));
    }

    #[test]
    fn test_failed_store_write_creates_no_wager() {
        let mut engine = flaky_engine();
        engine.balances_mut().fail_writes = true;

        assert!(matches!(engine.place_bet(alice(), 100.0), Err(EngineError::Store(_))));
        assert!(engine.wager(&alice()).is_none());
        assert_eq!(engine.balance(&alice()), Ok(1000.0));
        assert!(engine.take_events().is_empty());

        engine.balances_mut().fail_writes = false;
        assert!(engine.place_bet(alice(), 100.0).is_ok());
    }

    #[test]
    fn test_failed_store_write_keeps_wager_pending() {
        let mut engine = flaky_engine();
        engine.place_bet(alice(), 100.0).unwrap();
        engine.start_round();
        for _ in 0..10 {
            engine.tick();
        }

        engine.balances_mut().fail_writes = true;
        assert!(matches!(engine.cash_out(alice()), Err(EngineError::Store(_))));
        assert_eq!(engine.wager(&alice()).map(|w| w.status), Some(WagerStatus::Pending));
        assert_eq!(engine.balance(&alice()), Ok(900.0));

        engine.balances_mut().fail_writes = false;
        assert!(engine.cash_out(alice()).is_ok());
    }

    #[test]
    fn test_history_capped_at_twenty() {
        let mut engine = scripted(&[]);
        for _ in 0..25 {
            engine.set_override_crash_point(1.02).unwrap();
            engine.start_round();
            run_until(&mut engine, RoundPhase::Crashed, 50);
            run_until(&mut engine, RoundPhase::Waiting, 100);
        }
        assert_eq!(engine.history().len(), 20);
        assert_eq!(engine.history().latest().map(|r| r.round_number), Some(25));
        assert!(engine.history().iter().all(|r| r.overridden));
    }

    #[test]
    fn test_snapshot_hides_crash_point() {
        let mut engine = scripted(&[1.2]);
        engine.place_bet(alice(), 10.0).unwrap();
        engine.start_round();

        let running = engine.snapshot(Some(&alice()));
        assert_eq!(running.crash_point, None);
        assert_eq!(running.display_multiplier, "1.00x");
        let view = running.player.unwrap();
        assert_eq!(view.balance, Some(990.0));
        assert_eq!(view.wager.map(|w| w.amount), Some(10.0));

        run_until(&mut engine, RoundPhase::Crashed, 100);
        let crashed = engine.snapshot(None);
        assert_eq!(crashed.crash_point, Some(1.2));
        assert!(crashed.player.is_none());

        let json = serde_json::to_value(&crashed).unwrap();
        assert_eq!(json["phase"], "crashed");
    }

    #[test]
    fn test_tick_drains_operation_events() {
        let mut engine = scripted(&[]);
        engine.place_bet(alice(), 10.0).unwrap();
        let result = engine.tick();
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].player_id(), Some(alice()));
        assert!(engine.tick().events.is_empty());
    }

    #[test]
    fn test_seeded_engines_replay_identically() {
        let run = |seed| {
            let mut engine = RoundEngine::in_memory(
                EngineConfig::default(),
                InMemoryBalanceStore::new(),
                seed,
            );
            for _ in 0..5_000 {
                engine.tick();
            }
            engine
                .history()
                .iter()
                .map(|r| (r.round_id, r.crash_point))
                .collect::<Vec<_>>()
        };
        let a = run(99);
        assert!(!a.is_empty());
        assert_eq!(a, run(99));
        assert_ne!(a, run(100));
    }

    #[test]
    fn test_random_seeds_stay_in_support() {
        use rand::Rng;
        let mut seeds = rand::thread_rng();
        for _ in 0..20 {
            let mut engine = RoundEngine::in_memory(
                EngineConfig::default(),
                InMemoryBalanceStore::new(),
                seeds.gen(),
            );
            for _ in 0..3_000 {
                engine.tick();
            }
            for record in engine.history().iter() {
                assert!(record.crash_point >= 1.01 && record.crash_point < 11.0);
            }
        }
    }

    fn with_config(config: EngineConfig, points: &[f64]) -> RoundEngine {
        assert!(config.validate().is_ok());
        RoundEngine::new(
            config,
            InMemoryBalanceStore::new().with_account(alice(), 1000.0),
            InMemoryOverrideStore::new(),
            Box::new(ScriptedCrashSource::new(points.iter().copied(), 5.0)),
            11,
        )
    }

    #[test]
    fn test_unbounded_crashed_dwell_saturates() {
        let config = EngineConfig {
            tick_interval_ms: 1,
            crashed_dwell_ms: u64::MAX,
            ..Default::default()
        };
        let mut engine = with_config(config, &[1.05]);

        engine.start_round();
        run_until(&mut engine, RoundPhase::Crashed, 50);
        for _ in 0..100 {
            assert_eq!(engine.tick().phase, RoundPhase::Crashed);
        }
        assert!(engine.timers().armed().is_some());
    }

    #[test]
    fn test_unbounded_waiting_dwell_saturates() {
        let config = EngineConfig {
            tick_interval_ms: 1,
            waiting_dwell_ms: u64::MAX,
            crashed_dwell_ms: 1,
            ..Default::default()
        };
        let mut engine = with_config(config, &[1.05]);

        for _ in 0..100 {
            assert_eq!(engine.tick().phase, RoundPhase::Waiting);
        }

        assert!(engine.start_round());
        run_until(&mut engine, RoundPhase::Crashed, 50);
        run_until(&mut engine, RoundPhase::Waiting, 5);
        for _ in 0..100 {
            assert_eq!(engine.tick().phase, RoundPhase::Waiting);
        }
    }

    #[test]
    fn test_stray_deadline_while_running_rearms_ticker() {
        let mut engine = scripted(&[1.2]);
        engine.start_round();
        engine.tick();

        engine.timer.arm_deadline(engine.clock() + 1);
        assert!(!engine.timers().is_ticker_armed());

        let result = engine.tick();
        assert_eq!(result.phase, RoundPhase::Running);
        assert!(engine.timers().is_ticker_armed());

        run_until(&mut engine, RoundPhase::Crashed, 100);
        assert_eq!(engine.history().latest().map(|r| r.crash_point), Some(1.2));
    }

    #[test]
    fn test_stray_ticker_while_waiting_rearms_deadline() {
        let mut engine = scripted(&[2.0]);
        engine.timer.arm_ticker();

        let result = engine.tick();
        assert_eq!(result.phase, RoundPhase::Waiting);
        assert_eq!(result.multiplier, 1.0);
        assert!(!engine.timers().is_ticker_armed());
        assert!(engine.timers().armed().is_some());

        run_until(&mut engine, RoundPhase::Running, 101);
    }

    #[test]
    fn test_override_records_administrator() {
        let mut engine = scripted(&[]);
        let admin = bob();

        engine.set_override_crash_point_by(4.0, Some(admin)).unwrap();
        assert_eq!(engine.overrides().active_setting().and_then(|s| s.set_by), Some(admin));

        let events = engine.take_events();
        assert!(matches!(
            events.last().map(|e| &e.data),
            Some(EngineEventData::OverrideScheduled { crash_point, set_by: Some(by) })
                if *crash_point == 4.0 && *by == admin
        ));
    }

    #[test]
    fn test_adjust_balance() {
        let mut engine = scripted(&[]);
        engine.place_bet(alice(), 100.0).unwrap();

        assert_eq!(engine.adjust_balance(alice(), 42.5), Ok(42.5));
        assert_eq!(engine.balance(&alice()), Ok(42.5));
        assert_eq!(engine.wager(&alice()).map(|w| w.amount), Some(100.0));

        let events = engine.take_events();
        assert!(matches!(
            events.last().map(|e| &e.data),
            Some(EngineEventData::BalanceAdjusted { balance_before, balance_after, .. })
                if *balance_before == 900.0 && *balance_after == 42.5
        ));

        assert_eq!(engine.adjust_balance(alice(), -1.0), Err(EngineError::InvalidAmount(-1.0)));
        assert!(engine.adjust_balance(alice(), f64::INFINITY).is_err());
        assert!(engine.adjust_balance(PlayerId::new([9; 16]), 10.0).is_err());
        assert_eq!(engine.balance(&alice()), Ok(42.5));
    }

    proptest! {
        #[test]
        fn prop_multiplier_monotonic_within_round(seed in any::<u64>(), ticks in 1usize..3_000) {
            let mut engine = RoundEngine::in_memory(
                EngineConfig::default(),
                InMemoryBalanceStore::new(),
                seed,
            );
            let mut last = (engine.round().round_number, engine.multiplier());
            for _ in 0..ticks {
                engine.tick();
                let m = engine.multiplier();
                prop_assert!(m >= 1.0);
                if engine.phase() != RoundPhase::Waiting
                    && engine.round().round_number == last.0
                {
                    prop_assert!(m >= last.1);
                }
                last = (engine.round().round_number, m);
            }
        }

        #[test]
        fn prop_place_bet_succeeds_iff_preconditions(
            amount in -50.0f64..1500.0,
            balance in 0.0f64..1000.0,
            already_bet in any::<bool>(),
            running in any::<bool>(),
        ) {
            let balances = InMemoryBalanceStore::new()
                .with_account(alice(), balance + 10.0);
            let mut engine = RoundEngine::new(
                EngineConfig::default(),
                balances,
                InMemoryOverrideStore::new(),
                Box::new(ScriptedCrashSource::constant(5.0)),
                3,
            );
            if already_bet {
                engine.place_bet(alice(), 10.0).unwrap();
            }
            if running {
                engine.start_round();
            }
            let before = engine.balance(&alice()).unwrap();
            let wagers_before = engine.wagers().count();

            let expected_ok = !running && !already_bet && amount > 0.0 && amount <= before;
            let result = engine.place_bet(alice(), amount);
            prop_assert_eq!(result.is_ok(), expected_ok);

            let after = engine.balance(&alice()).unwrap();
            if expected_ok {
                prop_assert!((before - after - amount).abs() < EPS);
                prop_assert_eq!(engine.wagers().count(), wagers_before + 1);
                prop_assert_eq!(engine.wager(&alice()).map(|w| w.status), Some(WagerStatus::Pending));
            } else {
                prop_assert_eq!(after, before);
                prop_assert_eq!(engine.wagers().count(), wagers_before);
            }
        }
    }
}
