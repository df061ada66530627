//! Crash Engine
//!
//! Runs the round engine in real time with one demo player and an
//! auto-bettor, then prints the round history and the transaction log.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crash_engine::{
    core::rng::{derive_session_seed, DeterministicRng},
    game::{
        crash::UniformCrashSource,
        engine::{RoundEngine, RoundSnapshot},
        error::EngineError,
        events::EngineEventData,
        state::{format_multiplier, PlayerId, RoundPhase},
        tick::EngineConfig,
    },
    service::{
        admin::{AdminCapability, AdminConsole},
        auth::{validate_token, AuthConfig},
        driver::EngineDriver,
    },
    store::{
        InMemoryBalanceStore, InMemoryOverrideStore, Profile, TransactionFilter, TransactionLog,
    },
    TICK_RATE_HZ, VERSION,
};

/// Starting balance of the demo player.
const DEMO_BALANCE: f64 = 1000.0;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = EngineConfig::from_env();
    config
        .validate()
        .map_err(|reason| anyhow!("invalid engine config: {reason}"))?;

    let rounds: u64 = env_or("CRASH_DEMO_ROUNDS", 3);
    let stake: f64 = env_or("CRASH_DEMO_STAKE", 100.0);
    let target: f64 = env_or("CRASH_DEMO_TARGET", 1.5);

    info!("Crash Engine v{}", VERSION);
    info!(
        tick_ms = config.tick_interval_ms,
        default_rate_hz = TICK_RATE_HZ,
        waiting_ms = config.waiting_dwell_ms,
        crashed_ms = config.crashed_dwell_ms,
        "engine config loaded"
    );

    // Fresh session secret per run
    let mut secret = [0u8; 32];
    secret[..16].copy_from_slice(uuid::Uuid::new_v4().as_bytes());
    secret[16..].copy_from_slice(uuid::Uuid::new_v4().as_bytes());
    let id_seed = derive_session_seed(&secret, b"round-ids");

    let player = PlayerId::random();
    let operator = PlayerId::random();
    let balances = InMemoryBalanceStore::new()
        .with_profile(Profile::new(player, DEMO_BALANCE).with_name("demo player"))
        .with_profile(Profile::new(operator, 0.0).with_name("operator").with_admin(true));
    let source = UniformCrashSource::from_rng(
        DeterministicRng::from_secret(&secret, b"crash-points"),
        config.crash_span,
    );
    let mut engine = RoundEngine::new(
        config,
        balances,
        InMemoryOverrideStore::new(),
        Box::new(source),
        id_seed,
    );

    let console = admin_console(engine.balances(), &operator)?;
    if let Some(value) = std::env::var("CRASH_DEMO_OVERRIDE")
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
    {
        console
            .set_crash_point(&mut engine, value)
            .context("scheduling crash point override")?;
    }

    info!(player = %player, balance = DEMO_BALANCE, stake, target, rounds, "demo player ready");

    let driver = Arc::new(EngineDriver::new(engine));
    let mut snapshots = driver.subscribe_snapshots();
    let mut events = driver.subscribe_events();

    let runner = driver.clone();
    let run_handle = tokio::spawn(async move { runner.run().await });

    let depositor = driver.clone();
    let deposit_handle = tokio::spawn(async move {
        depositor.deposit_after_confirmation(player, stake).await
    });

    let mut bettor = AutoBettor::new(player, stake, target);
    let mut ledger = TransactionLog::new();
    let mut completed = 0u64;

    while completed < rounds {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if let EngineEventData::RoundCrashed { record, ticks_running } = &event.data {
                        completed += 1;
                        info!(
                            round = %record.round_id,
                            crash = %record.badge(),
                            tier = ?record.tier(),
                            ticks = ticks_running,
                            "round {}/{} complete",
                            completed,
                            rounds
                        );
                    }
                    ledger.record_event(&event);
                }
                Err(RecvError::Lagged(missed)) => warn!(missed, "event subscriber lagged"),
                Err(RecvError::Closed) => break,
            },
            snapshot = snapshots.recv() => match snapshot {
                Ok(snapshot) => bettor.on_snapshot(&driver, &snapshot).await,
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    driver.shutdown();
    let ticks = run_handle.await.context("driver task failed")?;
    match deposit_handle.await.context("deposit task failed")? {
        Ok(balance) => info!(amount = stake, balance, "deposit confirmed"),
        Err(err) => warn!(%err, "deposit rejected"),
    }

    // Events published after the last crash
    while let Ok(event) = events.try_recv() {
        ledger.record_event(&event);
    }

    let engine = driver.engine();
    let engine = engine.lock().await;

    info!("=== Round History ({} ticks) ===", ticks);
    for record in engine.history().iter() {
        info!(
            "#{} {} {}{}",
            record.round_number,
            record.round_id,
            record.badge(),
            if record.overridden { " (override)" } else { "" }
        );
    }

    info!("=== Transactions ===");
    for tx in ledger.query(&TransactionFilter::default()) {
        info!(
            "{} {:?} {:.2} ({:.2} -> {:.2}) {}",
            tx.created_at.format("%H:%M:%S%.3f"),
            tx.kind,
            tx.amount,
            tx.balance_before,
            tx.balance_after,
            tx.description.as_deref().unwrap_or("")
        );
    }

    let balance = engine.balance(&player)?;
    info!(balance, start = DEMO_BALANCE, "final balance");

    let stats = console.dashboard(&*engine, &ledger)?;
    info!(
        users = stats.total_users,
        players = stats.active_players,
        bets = stats.total_bets,
        payout = stats.total_payout,
        profit = stats.house_profit,
        "=== Dashboard ==="
    );
    for profile in console.users(&*engine)? {
        info!(
            "{} {} {:.2}{}",
            profile.player_id,
            profile.name.as_deref().unwrap_or("-"),
            profile.balance,
            if profile.is_admin { " (admin)" } else { "" }
        );
    }

    Ok(())
}

/// Admin console from `CRASH_ADMIN_TOKEN` when set, otherwise the local
/// operator profile.
fn admin_console(profiles: &InMemoryBalanceStore, operator: &PlayerId) -> Result<AdminConsole> {
    match std::env::var("CRASH_ADMIN_TOKEN") {
        Ok(token) => {
            let claims = validate_token(&token, &AuthConfig::from_env())
                .context("validating admin token")?;
            let console = AdminConsole::for_claims(&claims);
            if !console.is_authorized() {
                return Err(anyhow!("token for {} carries no admin rights", claims.sub));
            }
            Ok(console)
        }
        Err(_) => {
            let capability = AdminCapability::from_store(profiles, operator)
                .context("reading operator profile")?;
            Ok(AdminConsole::new(capability))
        }
    }
}

/// Bets once per Waiting phase, cashes out at a fixed target.
struct AutoBettor {
    player: PlayerId,
    stake: f64,
    target: f64,
    last_bet_round: Option<u64>,
}

impl AutoBettor {
    fn new(player: PlayerId, stake: f64, target: f64) -> Self {
        Self {
            player,
            stake,
            target,
            last_bet_round: None,
        }
    }

    async fn on_snapshot(&mut self, driver: &EngineDriver, snapshot: &RoundSnapshot) {
        match snapshot.phase {
            RoundPhase::Waiting if self.last_bet_round != Some(snapshot.round_number) => {
                self.last_bet_round = Some(snapshot.round_number);
                match driver.place_bet(self.player, self.stake).await {
                    Ok(wager) => info!(round = %wager.round_id, amount = wager.amount, "auto-bet placed"),
                    Err(err) => warn!(%err, "auto-bet rejected"),
                }
            }
            RoundPhase::Running if snapshot.multiplier >= self.target => {
                match driver.cash_out(self.player).await {
                    Ok(receipt) => info!(
                        multiplier = %format_multiplier(receipt.multiplier),
                        winnings = receipt.winnings,
                        balance = receipt.balance_after,
                        "auto cash-out"
                    ),
                    Err(EngineError::NoActiveWager) => {}
                    Err(err) => warn!(%err, "cash-out rejected"),
                }
            }
            _ => {}
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
