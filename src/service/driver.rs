//! Engine Driver
//!
//! Async shell around the synchronous [`RoundEngine`]. Calls `tick()` on a
//! tokio interval and publishes a snapshot plus the tick's events on
//! broadcast channels. Player calls go through the same mutex, so every
//! operation is serialized against the tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument};

use crate::game::engine::{RoundEngine, RoundSnapshot};
use crate::game::error::EngineError;
use crate::game::events::EngineEvent;
use crate::game::state::PlayerId;
use crate::game::wager::{CashOut, Wager};
use crate::store::{BalanceStore, InMemoryBalanceStore, InMemoryOverrideStore, OverrideStore};

/// Snapshots buffered per subscriber.
pub const SNAPSHOT_CHANNEL_CAPACITY: usize = 64;
/// Events buffered per subscriber.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;
/// Simulated payment confirmation before a deposit is credited.
pub const DEFAULT_CONFIRMATION_DELAY: Duration = Duration::from_secs(2);

/// Drives a [`RoundEngine`] in real time.
pub struct EngineDriver<B = InMemoryBalanceStore, O = InMemoryOverrideStore>
where
    B: BalanceStore,
    O: OverrideStore,
{
    engine: Arc<Mutex<RoundEngine<B, O>>>,
    tick_interval: Duration,
    confirmation_delay: Duration,
    snapshot_tx: broadcast::Sender<RoundSnapshot>,
    event_tx: broadcast::Sender<EngineEvent>,
    shutdown_tx: watch::Sender<bool>,
}

impl<B, O> EngineDriver<B, O>
where
    B: BalanceStore,
    O: OverrideStore,
{
    /// Wrap an engine. The tick period comes from the engine's config.
    pub fn new(engine: RoundEngine<B, O>) -> Self {
        let tick_interval = engine.config().tick_interval();
        let (snapshot_tx, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            engine: Arc::new(Mutex::new(engine)),
            tick_interval,
            confirmation_delay: DEFAULT_CONFIRMATION_DELAY,
            snapshot_tx,
            event_tx,
            shutdown_tx,
        }
    }

    /// Override the deposit confirmation delay.
    pub fn with_confirmation_delay(mut self, delay: Duration) -> Self {
        self.confirmation_delay = delay;
        self
    }

    /// Shared handle to the engine.
    pub fn engine(&self) -> Arc<Mutex<RoundEngine<B, O>>> {
        self.engine.clone()
    }

    /// Receive a snapshot after every tick.
    pub fn subscribe_snapshots(&self) -> broadcast::Receiver<RoundSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Receive every engine event.
    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// Run the tick loop until [`shutdown`](Self::shutdown). Returns the
    /// number of ticks driven.
    #[instrument(skip(self))]
    pub async fn run(&self) -> u64 {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if *shutdown_rx.borrow_and_update() {
            info!("shutdown requested before start");
            return 0;
        }

        let mut tick_interval = interval(self.tick_interval);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(tick_ms = self.tick_interval.as_millis() as u64, "engine driver started");

        let mut ticks = 0u64;
        loop {
            tokio::select! {
                _ = tick_interval.tick() => {}
                _ = shutdown_rx.changed() => {
                    info!(ticks, "shutdown signal received");
                    break;
                }
            }

            let (result, snapshot) = {
                let mut engine = self.engine.lock().await;
                let result = engine.tick();
                (result, engine.snapshot(None))
            };
            ticks += 1;

            // No subscribers is fine
            for event in result.events {
                let _ = self.event_tx.send(event);
            }
            let _ = self.snapshot_tx.send(snapshot);
        }

        ticks
    }

    /// Stop the tick loop. Sticky: a later [`run`](Self::run) returns at once.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Place a bet on the upcoming round.
    pub async fn place_bet(&self, player: PlayerId, amount: f64) -> Result<Wager, EngineError> {
        self.engine.lock().await.place_bet(player, amount)
    }

    /// Cash out at the current multiplier.
    pub async fn cash_out(&self, player: PlayerId) -> Result<CashOut, EngineError> {
        self.engine.lock().await.cash_out(player)
    }

    /// Current balance.
    pub async fn balance(&self, player: &PlayerId) -> Result<f64, EngineError> {
        self.engine.lock().await.balance(player)
    }

    /// Snapshot on demand, optionally with one player's view.
    pub async fn snapshot(&self, player: Option<&PlayerId>) -> RoundSnapshot {
        self.engine.lock().await.snapshot(player)
    }

    /// Wait for the payment confirmation, then credit the deposit.
    pub async fn deposit_after_confirmation(
        &self,
        player: PlayerId,
        amount: f64,
    ) -> Result<f64, EngineError> {
        debug!(%player, amount, "deposit awaiting confirmation");
        tokio::time::sleep(self.confirmation_delay).await;
        self.engine.lock().await.deposit(player, amount)
    }
}
