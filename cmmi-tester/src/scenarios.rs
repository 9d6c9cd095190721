//! Classroom scenarios run against in-memory persistence.
//!
//! Each scenario returns the number of checks it made, or the first failed
//! check as an error.
use anyhow::{Context, Result, bail, ensure};
use chrono::{TimeZone, Utc};
use cmmi_game::{
    AdminError, Clock, GatingPolicy, IdentityError, ManualClock, MaturityLevel,
    MemoryDocumentBackend, MemoryStorage, Persistence, ScoreDraft, ScoreRecord, Suite,
    SuiteConfig, compare_records, overall_ranking, top3,
};
use futures::executor::block_on;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

pub struct ScenarioCtx {
    pub seed: u64,
    pub players: usize,
    pub verbose: bool,
}

pub type ScenarioFn = fn(&ScenarioCtx) -> Result<usize>;

pub struct Scenario {
    pub key: &'static str,
    pub description: &'static str,
    pub run: ScenarioFn,
}

pub const SCENARIOS: &[Scenario] = &[
    Scenario {
        key: "smoke",
        description: "Register, record one quiz result, read it back",
        run: smoke,
    },
    Scenario {
        key: "progression",
        description: "Random play never lowers a level; locks follow the level",
        run: progression,
    },
    Scenario {
        key: "leaderboard",
        description: "Per-level top 3 and overall ranking ordering",
        run: leaderboard,
    },
    Scenario {
        key: "identity",
        description: "Case-insensitive name uniqueness across sessions",
        run: identity,
    },
    Scenario {
        key: "offline",
        description: "Unreachable durable backend degrades to local storage",
        run: offline,
    },
    Scenario {
        key: "clear",
        description: "Admin bulk clear removes scores and keeps identities",
        run: clear,
    },
    Scenario {
        key: "timer",
        description: "Timed-out attempts are recorded with the configured limit",
        run: timer,
    },
    Scenario {
        key: "polling",
        description: "Writes from another tab arrive within one poll",
        run: polling,
    },
];

pub fn list_scenarios() -> impl Iterator<Item = (&'static str, &'static str)> {
    SCENARIOS.iter().map(|s| (s.key, s.description))
}

pub fn get_scenario(key: &str) -> Option<&'static Scenario> {
    SCENARIOS.iter().find(|s| s.key == key)
}

/// One simulated classroom: a shared origin storage, a clock and an
/// optional durable backend that every session connects to.
struct Classroom {
    shared: MemoryStorage,
    clock: Rc<ManualClock>,
    backend: Option<MemoryDocumentBackend>,
    seed: u64,
    sessions: u64,
}

impl Classroom {
    fn local(seed: u64) -> Self {
        Self {
            shared: MemoryStorage::new(),
            clock: Rc::new(ManualClock::new(
                Utc.timestamp_opt(1_714_000_000, 0).single().unwrap_or_default(),
            )),
            backend: None,
            seed,
            sessions: 0,
        }
    }

    fn with_backend(seed: u64, backend: MemoryDocumentBackend) -> Self {
        Self {
            backend: Some(backend),
            ..Self::local(seed)
        }
    }

    /// A new browser tab with its own session keys.
    fn session(&mut self, policy: GatingPolicy) -> Suite {
        self.session_with(SuiteConfig {
            gating_policy: policy,
            ..SuiteConfig::default()
        })
    }

    fn session_with(&mut self, config: SuiteConfig) -> Suite {
        self.sessions += 1;
        let mut builder = Persistence::builder(Rc::new(self.shared.clone()))
            .session_storage(Rc::new(MemoryStorage::new()))
            .clock(Rc::clone(&self.clock) as Rc<dyn Clock>)
            .id_seed(self.seed.wrapping_mul(31).wrapping_add(self.sessions));
        if let Some(backend) = &self.backend {
            builder = builder.durable(Rc::new(backend.clone()));
        }
        Suite::new(config, builder.build())
    }

    fn tick(&self) {
        self.clock.advance_secs(7);
    }
}

fn random_attempt(rng: &mut ChaCha20Rng, level: MaturityLevel) -> (u32, u32) {
    let max = level.spec().items;
    (rng.gen_range(0..=max), max)
}

fn random_level(rng: &mut ChaCha20Rng) -> Result<MaturityLevel> {
    MaturityLevel::from_number(rng.gen_range(1..=5)).context("level out of range")
}

fn smoke(ctx: &ScenarioCtx) -> Result<usize> {
    let mut room = Classroom::local(ctx.seed);
    let suite = room.session(GatingPolicy::AttemptOnly);
    let name = format!("Student{}", ctx.seed % 1000);

    block_on(suite.identities().register(&name))?;
    ensure!(suite.identities().current_name() == name, "active name not stored");

    let record =
        block_on(suite.record_for_current_player(MaturityLevel::Initial.game(), 5, 7, 42))?;
    ensure!(record.percentage == 71, "5/7 stored as {}%", record.percentage);

    let listed = block_on(suite.scores().list());
    ensure!(listed == vec![record], "list does not return the recorded score");
    ensure!(
        !block_on(suite.is_locked(MaturityLevel::Managed.game(), None)),
        "level 2 still locked after a level 1 attempt"
    );
    Ok(4)
}

fn progression(ctx: &ScenarioCtx) -> Result<usize> {
    let mut rng = ChaCha20Rng::seed_from_u64(ctx.seed);
    let mut checks = 0;

    for policy in [GatingPolicy::AttemptOnly, GatingPolicy::Threshold] {
        let mut room = Classroom::local(ctx.seed);
        let suite = room.session(policy);
        for p in 0..ctx.players {
            let player = format!("P{p}");
            let mut previous = 0;
            for _ in 0..15 {
                let level = if rng.gen_bool(0.7) {
                    MaturityLevel::from_number((previous + 1).min(5))
                        .context("level out of range")?
                } else {
                    random_level(&mut rng)?
                };
                let (score, max) = random_attempt(&mut rng, level);
                room.tick();
                block_on(suite.scores().record(ScoreDraft::new(&player, level.game(), score, max)))?;

                let current = block_on(suite.player_level(&player));
                ensure!(
                    current >= previous,
                    "{policy:?}: {player} dropped from level {previous} to {current}"
                );
                for maturity in MaturityLevel::ALL {
                    let i = maturity.number();
                    let expected = i > 1 && current < i - 1;
                    let locked = block_on(suite.is_locked(maturity.game(), Some(&player)));
                    ensure!(
                        locked == expected,
                        "{policy:?}: {player} at level {current} sees level {i} locked={locked}"
                    );
                    checks += 1;
                }
                previous = current;
                checks += 1;
            }
            if ctx.verbose {
                println!("     {policy:?} {player} finished at level {previous}");
            }
        }
    }
    Ok(checks)
}

fn leaderboard(ctx: &ScenarioCtx) -> Result<usize> {
    let mut rng = ChaCha20Rng::seed_from_u64(ctx.seed);
    let mut room = Classroom::local(ctx.seed);
    let suite = room.session(GatingPolicy::AttemptOnly);
    let mut checks = 0;

    for p in 0..ctx.players {
        for _ in 0..rng.gen_range(1..=6) {
            let level = random_level(&mut rng)?;
            let (score, max) = random_attempt(&mut rng, level);
            room.tick();
            let draft = ScoreDraft::new(format!("P{p}"), level.game(), score, max)
                .with_time_spent(rng.gen_range(10..=300));
            block_on(suite.scores().record(draft))?;
        }
    }
    let scores = block_on(suite.scores().list());

    for level in MaturityLevel::ALL {
        let game = level.game();
        let top = top3(&scores, Some(game));
        ensure!(top.len() <= 3, "{game}: {} entries in top 3", top.len());
        ensure!(top.iter().all(|r| r.game_name == game), "{game}: foreign record in board");
        ensure!(
            top.windows(2)
                .all(|w| compare_records(&w[0], &w[1]) != Ordering::Greater),
            "{game}: board out of order"
        );
        let best = scores
            .iter()
            .filter(|r| r.game_name == game)
            .min_by(|a, b| compare_records(a, b));
        ensure!(
            best.map(|b| compare_records(b, &top[0]) == Ordering::Equal)
                .unwrap_or(top.is_empty()),
            "{game}: best attempt missing from board"
        );
        checks += 4;
    }

    let ranking = overall_ranking(&scores);
    let games: usize = ranking.iter().map(|a| a.games_played).sum();
    ensure!(games == scores.len(), "ranking counts {games} of {} games", scores.len());
    for aggregate in &ranking {
        let total: u64 = scores
            .iter()
            .filter(|r| r.player_name == aggregate.player_name)
            .map(|r| u64::from(r.score))
            .sum();
        ensure!(total == aggregate.total_score, "{} total mismatch", aggregate.player_name);
        checks += 1;
    }
    ensure!(
        ranking.windows(2).all(|w| {
            (w[0].total_score, w[0].average_percentage, w[0].games_played)
                >= (w[1].total_score, w[1].average_percentage, w[1].games_played)
        }),
        "overall ranking out of order"
    );

    let worked = [("Alice", 8, 10), ("Alice", 6, 10), ("Bob", 5, 5)];
    let mut example_room = Classroom::local(ctx.seed);
    let example = example_room.session(GatingPolicy::AttemptOnly);
    for (player, score, max) in worked {
        example_room.tick();
        block_on(example.scores().record(ScoreDraft::new(player, "Quiz CMMI", score, max)))?;
    }
    let ranked = block_on(example.overall_ranking());
    ensure!(
        ranked.first().is_some_and(|a| a.player_name == "Alice" && a.total_score == 14),
        "total score must outrank Bob's perfect average"
    );
    Ok(checks + 3)
}

fn identity(ctx: &ScenarioCtx) -> Result<usize> {
    let rooms = [
        Classroom::local(ctx.seed),
        Classroom::with_backend(ctx.seed, MemoryDocumentBackend::new()),
    ];
    let mut checks = 0;

    for mut room in rooms {
        let first = room.session(GatingPolicy::AttemptOnly);
        let second = room.session(GatingPolicy::AttemptOnly);
        for p in 0..ctx.players {
            let name = format!("Student{p}");
            let created = block_on(first.identities().register(&name))?;
            room.tick();

            match block_on(second.identities().register(&format!(" {} ", name.to_uppercase()))) {
                Err(IdentityError::NameTaken(_)) => {}
                other => bail!("second session claimed {name}: {other:?}"),
            }
            let again = block_on(first.identities().register(&name.to_lowercase()))?;
            ensure!(again.id == created.id, "{name} re-registered as a new identity");
            ensure!(again.last_active >= created.last_active, "{name} last active went back");
            checks += 3;
        }
        let players = block_on(first.identities().players())?;
        ensure!(
            players.len() == ctx.players,
            "{} identities for {} players",
            players.len(),
            ctx.players
        );
        ensure!(
            matches!(block_on(second.identities().register("  ")), Err(IdentityError::EmptyName)),
            "blank name accepted"
        );
        ensure!(
            matches!(
                block_on(second.identities().register("ThisNameIsWayTooLong1")),
                Err(IdentityError::NameTooLong { .. })
            ),
            "overlong name accepted"
        );
        checks += 3;
    }
    Ok(checks)
}

fn offline(ctx: &ScenarioCtx) -> Result<usize> {
    let mut rng = ChaCha20Rng::seed_from_u64(ctx.seed);
    let backend = MemoryDocumentBackend::offline();
    let mut room = Classroom::with_backend(ctx.seed, backend.clone());
    let suite = room.session(GatingPolicy::AttemptOnly);

    let deliveries = Rc::new(RefCell::new(0usize));
    let sink = Rc::clone(&deliveries);
    let subscription = block_on(suite.scores().subscribe(move |_| *sink.borrow_mut() += 1));
    ensure!(!subscription.is_live(), "offline backend accepted a change stream");

    block_on(suite.identities().register("Offline"))?;
    let mut recorded: Vec<ScoreRecord> = Vec::new();
    for _ in 0..ctx.players.max(1) {
        let level = random_level(&mut rng)?;
        let (score, max) = random_attempt(&mut rng, level);
        room.tick();
        recorded.push(block_on(
            suite.record_for_current_player(level.game(), score, max, 60),
        )?);
    }

    let listed = block_on(suite.scores().list());
    ensure!(listed.len() == recorded.len(), "local fallback lost records");
    ensure!(
        recorded.iter().all(|r| listed.contains(r)),
        "listed records differ from recorded ones"
    );
    ensure!(backend.stored_scores() == 0, "offline backend stored records");
    ensure!(
        *deliveries.borrow() == recorded.len() + 1,
        "expected {} notifications, saw {}",
        recorded.len() + 1,
        deliveries.borrow()
    );
    Ok(5)
}

fn clear(ctx: &ScenarioCtx) -> Result<usize> {
    let mut room = Classroom::local(ctx.seed);
    let players = ctx.players.max(1);
    let mut last = None;
    for p in 0..players {
        let suite = room.session(GatingPolicy::AttemptOnly);
        block_on(suite.identities().register(&format!("Student{p}")))?;
        room.tick();
        block_on(suite.record_for_current_player(MaturityLevel::Initial.game(), 4, 7, 90))?;
        last = Some(suite);
    }
    let suite = last.context("no sessions created")?;

    let latest = Rc::new(RefCell::new(usize::MAX));
    let sink = Rc::clone(&latest);
    let _subscription = block_on(suite.scores().subscribe(move |scores| {
        *sink.borrow_mut() = scores.len();
    }));
    ensure!(*latest.borrow() == players, "subscriber saw {} scores", latest.borrow());

    let mut admin = suite.admin_console();
    ensure!(
        block_on(admin.clear_scores()) == Err(AdminError::NotAuthenticated),
        "clear allowed without login"
    );
    ensure!(
        admin.authenticate("not-the-secret") == Err(AdminError::WrongSecret),
        "wrong secret accepted"
    );
    admin.authenticate(&suite.config().admin_secret)?;
    block_on(admin.clear_scores())?;

    ensure!(block_on(suite.scores().list()).is_empty(), "scores survived clear");
    ensure!(*latest.borrow() == 0, "subscriber not told about clear");
    let identities = block_on(suite.identities().players())?;
    ensure!(identities.len() == players, "clear removed identities");
    Ok(6)
}

fn timer(ctx: &ScenarioCtx) -> Result<usize> {
    let mut rng = ChaCha20Rng::seed_from_u64(ctx.seed);
    let mut room = Classroom::local(ctx.seed);
    let mut checks = 0;

    for p in 0..ctx.players {
        let limit = rng.gen_range(3..=30);
        let suite = room.session_with(SuiteConfig {
            time_limit_secs: limit,
            ..SuiteConfig::default()
        });
        let player = format!("Timed{p}");
        block_on(suite.identities().register(&player))?;

        let level = random_level(&mut rng)?;
        let mut session = suite.start_session(level)?;
        let (score, max) = random_attempt(&mut rng, level);
        session.set_score(score);

        let mut ticks = 0;
        let draft = loop {
            ticks += 1;
            if let Some(draft) = session.tick() {
                break draft;
            }
            ensure!(ticks < limit, "{player}: no draft after {ticks} of {limit} seconds");
        };
        ensure!(ticks == limit, "{player}: expired after {ticks}s, limit {limit}s");
        ensure!(session.tick().is_none(), "{player}: expired session ticked again");

        let record = block_on(suite.scores().record(draft))?;
        ensure!(
            record.time_spent == limit && record.score == score && record.max_score == max,
            "{player}: stored {}/{} in {}s, expected {score}/{max} in {limit}s",
            record.score,
            record.max_score,
            record.time_spent
        );
        ensure!(
            record.game_name == level.game(),
            "{player}: timed out on {} but stored {}",
            level.game(),
            record.game_name
        );
        if ctx.verbose {
            println!("     {player} timed out on {} after {limit}s", level.game());
        }
        checks += 4;
    }
    Ok(checks)
}

fn polling(ctx: &ScenarioCtx) -> Result<usize> {
    let mut room = Classroom::local(ctx.seed);
    let viewer = room.session(GatingPolicy::AttemptOnly);
    let writer = room.session(GatingPolicy::AttemptOnly);

    let seen = Rc::new(RefCell::new(Vec::<usize>::new()));
    let sink = Rc::clone(&seen);
    let subscription = block_on(viewer.scores().subscribe(move |scores| {
        sink.borrow_mut().push(scores.len());
    }));

    let writes = ctx.players.max(1);
    for p in 0..writes {
        room.tick();
        block_on(writer.scores().record(ScoreDraft::new(
            format!("P{p}"),
            MaturityLevel::Optimizing.game(),
            5,
            5,
        )))?;
    }
    ensure!(seen.borrow().len() == 1, "viewer notified before polling");
    ensure!(block_on(viewer.scores().poll()), "poll missed the other tab's writes");
    ensure!(seen.borrow().last() == Some(&writes), "viewer saw a stale snapshot");
    ensure!(!block_on(viewer.scores().poll()), "unchanged storage notified again");

    subscription.unsubscribe();
    room.tick();
    block_on(writer.scores().record(ScoreDraft::new("Late", "OrderLevels", 1, 5)))?;
    block_on(viewer.scores().poll());
    ensure!(seen.borrow().len() == 2, "unsubscribed viewer still notified");
    Ok(5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_keys_are_unique_and_resolvable() {
        for (key, _) in list_scenarios() {
            assert_eq!(get_scenario(key).map(|s| s.key), Some(key));
        }
        assert!(get_scenario("missing").is_none());
        assert_eq!(SCENARIOS.len(), 8);
    }

    #[test]
    fn every_scenario_passes_for_a_few_seeds() {
        for seed in [1, 7, 1337] {
            let ctx = ScenarioCtx {
                seed,
                players: 4,
                verbose: false,
            };
            for scenario in SCENARIOS {
                let checks = (scenario.run)(&ctx)
                    .unwrap_or_else(|err| panic!("{} seed {seed}: {err:#}", scenario.key));
                assert!(checks > 0);
            }
        }
    }
}
