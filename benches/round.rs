use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use crash_engine::game::crash::ScriptedCrashSource;
use crash_engine::{
    EngineConfig, InMemoryBalanceStore, InMemoryOverrideStore, PlayerId, RoundEngine, RoundPhase,
};

fn setup_engine(players: usize) -> RoundEngine {
    let mut balances = InMemoryBalanceStore::new();
    let ids: Vec<PlayerId> = (0..players)
        .map(|i| {
            let mut bytes = [0u8; 16];
            bytes[..8].copy_from_slice(&(i as u64).to_le_bytes());
            PlayerId::new(bytes)
        })
        .collect();
    for id in &ids {
        balances.open_account(*id, 1_000.0);
    }

    let mut engine = RoundEngine::new(
        EngineConfig::default(),
        balances,
        InMemoryOverrideStore::new(),
        Box::new(ScriptedCrashSource::constant(5.0)),
        42,
    );
    for id in &ids {
        engine.place_bet(*id, 10.0).expect("bet");
    }
    engine.start_round();
    engine
}

fn round_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("round_engine");
    for players in [1usize, 100, 1_000] {
        group.bench_function(BenchmarkId::new("running_tick", players), |b| {
            let mut engine = setup_engine(players);
            b.iter(|| {
                if engine.phase() != RoundPhase::Running {
                    engine = setup_engine(players);
                }
                black_box(engine.tick())
            })
        });

        group.bench_function(BenchmarkId::new("round_to_crash", players), |b| {
            b.iter_batched(
                || setup_engine(players),
                |mut engine| {
                    while engine.phase() == RoundPhase::Running {
                        black_box(engine.tick());
                    }
                    engine
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, round_engine);
criterion_main!(benches);
