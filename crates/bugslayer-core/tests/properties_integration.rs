//! Property tests for the bookkeeping the engine leans on: ammo bounds,
//! the vote ledger, pausable countdowns and whole sessions driven by
//! arbitrary input.

use std::sync::Arc;

use proptest::prelude::*;

use bugslayer_core::content::{GridSize, Reward, MAX_AMMO};
use bugslayer_core::timer::PausableTimer;
use bugslayer_core::{
    AdversaryKind, Catalog, Cell, Engine, LevelConfig, ManualClock, MemoryLedger, PlacementMode,
    Player, RecordingNarrator, SessionState, Weapon,
};

#[derive(Debug, Clone)]
enum AmmoOp {
    Consume(Weapon),
    Refund(Weapon, u32),
    Reward(Weapon, u32),
}

fn ammo_weapon() -> impl Strategy<Value = Weapon> {
    prop::sample::select(Weapon::AMMO.to_vec())
}

fn ammo_op() -> impl Strategy<Value = AmmoOp> {
    prop_oneof![
        ammo_weapon().prop_map(AmmoOp::Consume),
        (ammo_weapon(), 0u32..40).prop_map(|(w, n)| AmmoOp::Refund(w, n)),
        (ammo_weapon(), 0u32..5).prop_map(|(w, n)| AmmoOp::Reward(w, n)),
    ]
}

fn kind() -> impl Strategy<Value = AdversaryKind> {
    prop::sample::select(vec![AdversaryKind::K1, AdversaryKind::K2, AdversaryKind::K3])
}

#[derive(Debug, Clone)]
enum Input {
    Tick(u64),
    Move(i32, i32),
    Select(Weapon),
    Attack,
    Concede,
    Scan,
}

fn input() -> impl Strategy<Value = Input> {
    prop_oneof![
        4 => (1u64..2_000).prop_map(Input::Tick),
        2 => (-1i32..=1, -1i32..=1).prop_map(|(dx, dy)| Input::Move(dx, dy)),
        1 => prop::sample::select(vec![
            Weapon::Fire,
            Weapon::Spray,
            Weapon::Slipper,
            Weapon::Bait,
            Weapon::Vote,
        ])
        .prop_map(Input::Select),
        2 => Just(Input::Attack),
        1 => Just(Input::Concede),
        1 => Just(Input::Scan),
    ]
}

fn small_level() -> LevelConfig {
    LevelConfig {
        id: 9,
        name: "the test kitchen".into(),
        mode: PlacementMode::Grid,
        grid: GridSize { cols: 3, rows: 3 },
        allowed_kinds: vec![AdversaryKind::K1, AdversaryKind::K2, AdversaryKind::K3],
        targets: [(AdversaryKind::K1, 4), (AdversaryKind::K2, 4)]
            .into_iter()
            .collect(),
        ..LevelConfig::default()
    }
}

proptest! {
    #[test]
    fn test_ammo_stays_within_bounds(ops in prop::collection::vec(ammo_op(), 0..60)) {
        let mut state = SessionState::new(1, Player::default(), Cell::new(0, 0));
        for op in ops {
            match op {
                AmmoOp::Consume(w) => {
                    let before = state.player.ammo(w);
                    let took = state.consume_ammo(w);
                    prop_assert_eq!(took, before > 0);
                    prop_assert_eq!(state.player.ammo(w), before.saturating_sub(1));
                }
                AmmoOp::Refund(w, n) => state.refund_ammo(w, n),
                AmmoOp::Reward(w, n) => {
                    let reward = Reward {
                        ammo: [(w, n)].into_iter().collect(),
                        ..Reward::default()
                    };
                    state.apply_reward(&reward, w);
                }
            }
            for w in Weapon::AMMO {
                prop_assert!(state.player.ammo(w) <= MAX_AMMO);
            }
        }
    }

    #[test]
    fn test_vote_ledger_only_grows(
        ops in prop::collection::vec((kind(), 1u32..5, 0u32..8), 0..50)
    ) {
        let mut state = SessionState::new(1, Player::default(), Cell::new(0, 0));
        for (kind, tickets, spend) in ops {
            let votes = state.player.votes;
            let bought = state.player.vote_bought.clone();

            state.spend(spend);
            state.record_concession(kind, tickets);

            prop_assert_eq!(state.player.votes, votes + tickets);
            for (k, n) in &bought {
                prop_assert!(state.player.bought(*k) >= *n);
            }
            prop_assert_eq!(
                state.player.bought(kind),
                bought.get(&kind).copied().unwrap_or(0) + 1
            );
        }
    }

    #[test]
    fn test_paused_time_never_counts_against_a_countdown(
        delay in 1u64..20_000,
        windows in prop::collection::vec((0u64..3_000, 0u64..10_000), 0..8)
    ) {
        let mut timer = PausableTimer::arm(0, delay);
        let mut now = 0;
        let mut running = 0;
        for (run, paused) in windows {
            let run = run.min(delay.saturating_sub(running));
            now += run;
            running += run;
            timer.pause(now);
            prop_assert_eq!(timer.remaining_ms(now), delay - running);
            now += paused;
            prop_assert!(!timer.is_due(now));
            timer.resume(now);
        }
        let left = delay - running;
        prop_assert_eq!(timer.remaining_ms(now), left);
        if left > 0 {
            prop_assert!(!timer.is_due(now + left - 1));
        }
        prop_assert!(timer.is_due(now + left));
    }

    #[test]
    fn test_sessions_keep_their_invariants_under_any_input(
        seed in any::<u64>(),
        inputs in prop::collection::vec(input(), 1..80)
    ) {
        let clock = Arc::new(ManualClock::new(0));
        let ledger = MemoryLedger::new();
        let mut engine = Engine::builder(small_level())
            .clock(clock.clone())
            .narrator(Box::new(RecordingNarrator::new()))
            .ledger(Box::new(ledger.clone()))
            .seed(seed)
            .build()
            .unwrap();
        engine.start();
        engine.tick();

        let catalog = Catalog::builtin();
        let mut now = 0;
        let mut votes = 0;
        for input in inputs {
            match input {
                Input::Tick(ms) => {
                    now += ms;
                    clock.set(now);
                    engine.tick();
                }
                Input::Move(dx, dy) => { engine.move_by(dx, dy); }
                Input::Select(w) => { engine.select_weapon(w); }
                Input::Attack => { engine.attack(); }
                Input::Concede => { engine.buy_concession(); }
                Input::Scan => { engine.scan(); }
            }

            let state = engine.state();
            prop_assert_eq!(state.resolving, engine.gate_held());
            prop_assert!(state.player.votes >= votes);
            votes = state.player.votes;
            for w in Weapon::AMMO {
                prop_assert!(state.player.ammo(w) <= MAX_AMMO);
            }
            if let Some(encounter) = state.encounter.as_ref() {
                prop_assert!(engine.level().allowed_kinds.contains(&encounter.kind));
                prop_assert!(engine.board().in_bounds(encounter.position));
                prop_assert!(!catalog.get(encounter.kind).boss);
            }
        }
    }
}
