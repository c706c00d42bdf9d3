//! Encounter scheduler.
//!
//! Owns the spawn -> warn -> expire timeline of the active encounter.
//!
//! ## Timeline
//!
//! ```text
//! spawn ──(ttl - warn offset)──> Warn ──(warn offset)──> Expire ──(respawn delay)──> Spawn
//!   │                                                      │
//!   └──────────── retire (resolved / withdrawn) ───────────┘
//! ```
//!
//! Timers are keyed by encounter id. A timer whose id no longer matches the
//! session's encounter is discarded at fire time, so a superseded encounter
//! is never touched by a stale countdown.

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};

use super::deadline::PausableTimer;
use crate::board::Board;
use crate::content::{AdversaryKind, Catalog};
use crate::session::{Encounter, EncounterId, EncounterPhase, Resolution, SessionState};

/// Spawn attempts before falling back to an unconstrained placement.

/// Extension points around the encounter lifecycle.
pub trait EncounterHook {
    fn before_spawn(&mut self, _kind: AdversaryKind, _now_ms: u64) {}

    fn after_resolve(&mut self, _encounter: &Encounter, _resolution: Resolution) {}
}

/// What the caller needs to know to spawn on the current level.
#[derive(Debug, Clone, Copy)]
pub struct SpawnRules<'a> {
    pub pool: &'a [AdversaryKind],
    /// `None` disables the escape countdown.
    pub ttl_ms: Option<u64>,
    pub warn_offset_ms: u64,
    pub catalog: &'a Catalog,
    pub board: &'a Board,
}

/// A timer that fell due during [`EncounterScheduler::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerFire {
    Warn { id: EncounterId, remaining_ms: u64 },
    Expire { id: EncounterId },
    Spawn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscapeOutcome {
    pub encounter: Encounter,
    pub lost: bool,
}

pub struct EncounterScheduler {
    warn: Option<(EncounterId, PausableTimer)>,
    expiry: Option<(EncounterId, PausableTimer)>,
    next_spawn: Option<PausableTimer>,
    paused: bool,
    next_id: u64,
    hooks: Vec<Box<dyn EncounterHook>>,
}

impl EncounterScheduler {
    pub fn new(hooks: Vec<Box<dyn EncounterHook>>) -> Self {
        Self {
            warn: None,
            expiry: None,
            next_spawn: None,
            paused: false,
            next_id: 0,
            hooks,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn spawn_pending(&self) -> bool {
        self.next_spawn.is_some()
    }

    pub fn remaining_ttl_ms(&self, now_ms: u64) -> Option<u64> {
        self.expiry.as_ref().map(|(_, t)| t.remaining_ms(now_ms))
    }

    pub fn remaining_warn_ms(&self, now_ms: u64) -> Option<u64> {
        self.warn.as_ref().map(|(_, t)| t.remaining_ms(now_ms))
    }

    pub fn next_spawn_in_ms(&self, now_ms: u64) -> Option<u64> {
        self.next_spawn.as_ref().map(|t| t.remaining_ms(now_ms))
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Spawn a new encounter into the session. Returns `None` when one is
    /// already active or the pool is empty.
    pub fn spawn<R: Rng + ?Sized>(
        &mut self,
        state: &mut SessionState,
        rules: &SpawnRules<'_>,
        rng: &mut R,
        now_ms: u64,
    ) -> Option<Encounter> {
        if state.encounter.is_some() {
            debug!("spawn skipped: an encounter is already active");
            return None;
        }
        let kind = *rules.pool.choose(rng)?;
        for hook in &mut self.hooks {
            hook.before_spawn(kind, now_ms);
        }

        let position = rules.board.random_free_cell(rng, &state.occupied_cells());
        let def = rules.catalog.get(kind);
        let ttl_ms = rules
            .ttl_ms
            .map(|ttl| ttl.max(def.min_ttl_ms.unwrap_or(0)));

        self.next_id += 1;
        let id = EncounterId(self.next_id);
        let mut encounter = Encounter {
            id,
            kind,
            position,
            created_at_ms: now_ms,
            ttl_due_at_ms: None,
            warn_due_at_ms: None,
            attack_count: 0,
            phase: EncounterPhase::Spawned,
            removed: false,
        };

        self.warn = None;
        self.expiry = None;
        if let Some(ttl) = ttl_ms {
            let mut expiry = PausableTimer::arm(now_ms, ttl);
            encounter.ttl_due_at_ms = expiry.due_at_ms();
            if ttl > rules.warn_offset_ms {
                let mut warn = PausableTimer::arm(now_ms, ttl - rules.warn_offset_ms);
                encounter.warn_due_at_ms = warn.due_at_ms();
                if self.paused {
                    warn.pause(now_ms);
                }
                self.warn = Some((id, warn));
            }
            if self.paused {
                expiry.pause(now_ms);
            }
            self.expiry = Some((id, expiry));
        }
        self.next_spawn = None;

        info!(id = id.0, kind = %kind, x = position.x, y = position.y, ttl_ms = ?ttl_ms, "encounter spawned");
        state.encounter = Some(encounter.clone());
        Some(encounter)
    }

    pub fn schedule_spawn(&mut self, now_ms: u64, delay_ms: u64) {
        let mut timer = PausableTimer::arm(now_ms, delay_ms);
        if self.paused {
            timer.pause(now_ms);
        }
        self.next_spawn = Some(timer);
    }

    pub fn cancel_spawn(&mut self) {
        self.next_spawn = None;
    }

    /// Capture every remaining duration. Idempotent.
    pub fn pause(&mut self, now_ms: u64) {
        if self.paused {
            return;
        }
        self.paused = true;
        for (_, timer) in self.warn.iter_mut().chain(self.expiry.iter_mut()) {
            timer.pause(now_ms);
        }
        if let Some(timer) = &mut self.next_spawn {
            timer.pause(now_ms);
        }
        debug!("encounter timers paused");
    }

    /// Reschedule from the captured remainders. With no active encounter the
    /// encounter remainders are dropped; a pending spawn still resumes.
    pub fn resume(&mut self, now_ms: u64, state: &mut SessionState) {
        if !self.paused {
            return;
        }
        self.paused = false;
        if let Some(timer) = &mut self.next_spawn {
            timer.resume(now_ms);
        }
        let Some(encounter) = state.encounter.as_mut() else {
            self.warn = None;
            self.expiry = None;
            return;
        };
        if let Some((id, timer)) = &mut self.warn {
            timer.resume(now_ms);
            if *id == encounter.id {
                encounter.warn_due_at_ms = timer.due_at_ms();
            }
        }
        if let Some((id, timer)) = &mut self.expiry {
            timer.resume(now_ms);
            if *id == encounter.id {
                encounter.ttl_due_at_ms = timer.due_at_ms();
            }
        }
        debug!("encounter timers resumed");
    }

    /// Collect due timers, warn strictly before expiry. Expiry is deferred
    /// while a resolution holds the gate.
    pub fn poll(
        &mut self,
        now_ms: u64,
        state: &mut SessionState,
        gate_held: bool,
    ) -> Vec<SchedulerFire> {
        let mut fires = Vec::new();
        if self.paused {
            return fires;
        }
        let current = state.encounter.as_ref().map(|e| e.id);

        if let Some((id, timer)) = self.warn {
            if Some(id) != current {
                debug!(id = id.0, "stale warn timer dropped");
                self.warn = None;
            } else if timer.is_due(now_ms) {
                self.warn = None;
                if let Some(encounter) = state.encounter.as_mut() {
                    encounter.phase = EncounterPhase::Warned;
                }
                let remaining_ms = self.remaining_ttl_ms(now_ms).unwrap_or(0);
                fires.push(SchedulerFire::Warn { id, remaining_ms });
            }
        }

        if let Some((id, timer)) = self.expiry {
            if Some(id) != current {
                debug!(id = id.0, "stale expiry timer dropped");
                self.expiry = None;
            } else if timer.is_due(now_ms) && self.warn.is_none() && !gate_held {
                self.expiry = None;
                fires.push(SchedulerFire::Expire { id });
            }
        }

        if let Some(timer) = self.next_spawn {
            if timer.is_due(now_ms) {
                self.next_spawn = None;
                fires.push(SchedulerFire::Spawn);
            }
        }
        fires
    }

    /// Single terminal path: cancel the encounter's timers, remove it from
    /// the session and run the after-resolve hooks.
    pub fn retire(&mut self, state: &mut SessionState, resolution: Resolution) -> Option<Encounter> {
        self.warn = None;
        self.expiry = None;
        let mut encounter = state.encounter.take()?;
        encounter.removed = true;
        for hook in &mut self.hooks {
            hook.after_resolve(&encounter, resolution);
        }
        info!(id = encounter.id.0, kind = %encounter.kind, ?resolution, "encounter retired");
        Some(encounter)
    }

    /// Expiry: the adversary bites, leaves, and a replacement is scheduled
    /// unless the bite was fatal.
    pub fn escape(
        &mut self,
        state: &mut SessionState,
        catalog: &Catalog,
        now_ms: u64,
        respawn_delay_ms: u64,
    ) -> Option<EscapeOutcome> {
        let kind = state.encounter.as_ref()?.kind;
        let lost = state.apply_penalty(catalog.get(kind).damage);
        let encounter = self.retire(state, Resolution::Escaped)?;
        if !lost {
            self.schedule_spawn(now_ms, respawn_delay_ms);
        }
        Some(EscapeOutcome { encounter, lost })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Cell, PlacementMode, Rect};
    use crate::session::{Hazard, HazardId, Player, TrapState};
    use rand::SeedableRng;
    use rand_pcg::Pcg64;
    use std::sync::{Arc, Mutex};

    struct Fixture {
        catalog: Catalog,
        board: Board,
        state: SessionState,
        rng: Pcg64,
    }

    fn fixture() -> Fixture {
        Fixture {
            catalog: Catalog::builtin(),
            board: Board::new(PlacementMode::Grid, 3, 3, Vec::new()),
            state: SessionState::new(1, Player::default(), Cell::new(1, 1)),
            rng: Pcg64::seed_from_u64(11),
        }
    }

    fn spawn(s: &mut EncounterScheduler, f: &mut Fixture, pool: &[AdversaryKind], ttl: Option<u64>, now: u64) -> Option<Encounter> {
        let rules = SpawnRules {
            pool,
            ttl_ms: ttl,
            warn_offset_ms: 5_000,
            catalog: &f.catalog,
            board: &f.board,
        };
        s.spawn(&mut f.state, &rules, &mut f.rng, now)
    }

    #[test]
    fn spawn_arms_warn_and_expiry() {
        let mut f = fixture();
        let mut s = EncounterScheduler::new(Vec::new());
        let e = spawn(&mut s, &mut f, &[AdversaryKind::K1], Some(15_000), 0).unwrap();
        assert_eq!(e.ttl_due_at_ms, Some(15_000));
        assert_eq!(e.warn_due_at_ms, Some(10_000));
        assert_ne!(e.position, f.state.player_pos);
    }

    #[test]
    fn short_ttl_has_no_warning() {
        let mut f = fixture();
        let mut s = EncounterScheduler::new(Vec::new());
        let e = spawn(&mut s, &mut f, &[AdversaryKind::K1], Some(5_000), 0).unwrap();
        assert_eq!(e.warn_due_at_ms, None);
        assert_eq!(s.poll(5_000, &mut f.state, false), vec![SchedulerFire::Expire { id: e.id }]);
    }

    #[test]
    fn quiz_kind_gets_minimum_ttl() {
        let mut f = fixture();
        let mut s = EncounterScheduler::new(Vec::new());
        let e = spawn(&mut s, &mut f, &[AdversaryKind::K4], Some(15_000), 0).unwrap();
        assert_eq!(e.ttl_due_at_ms, Some(60_000));
    }

    #[test]
    fn no_ttl_means_no_timers() {
        let mut f = fixture();
        let mut s = EncounterScheduler::new(Vec::new());
        spawn(&mut s, &mut f, &[AdversaryKind::K1], None, 0).unwrap();
        assert!(s.poll(1_000_000, &mut f.state, false).is_empty());
    }

    #[test]
    fn spawn_avoids_obstacles_the_player_and_live_hazards() {
        let mut f = fixture();
        f.board = Board::new(
            PlacementMode::Grid,
            3,
            3,
            vec![Rect { x1: 0, y1: 0, x2: 0, y2: 2, label: Some("sofa".into()) }],
        );
        f.state.hazards = vec![
            Hazard::Patrol { id: HazardId(1), position: Cell::new(2, 0), direction: 1 },
            Hazard::Trap {
                id: HazardId(2),
                position: Cell::new(1, 0),
                state: TrapState::Armed,
                hp_loss: 1,
                arm_ms: 0,
                respawn_ms: 0,
            },
        ];
        let occupied = f.state.occupied_cells();
        assert_eq!(occupied.len(), 3);

        let mut s = EncounterScheduler::new(Vec::new());
        for _ in 0..100 {
            let e = spawn(&mut s, &mut f, &[AdversaryKind::K1], None, 0).unwrap();
            assert!(!f.board.is_blocked(e.position));
            assert!(!occupied.contains(&e.position));
            s.retire(&mut f.state, Resolution::Resolved);
        }
    }

    #[test]
    fn only_one_encounter_at_a_time() {
        let mut f = fixture();
        let mut s = EncounterScheduler::new(Vec::new());
        assert!(spawn(&mut s, &mut f, &[AdversaryKind::K1], None, 0).is_some());
        assert!(spawn(&mut s, &mut f, &[AdversaryKind::K1], None, 0).is_none());
    }

    #[test]
    fn warn_fires_before_expiry_even_in_the_same_poll() {
        let mut f = fixture();
        let mut s = EncounterScheduler::new(Vec::new());
        let e = spawn(&mut s, &mut f, &[AdversaryKind::K1], Some(15_000), 0).unwrap();
        let fires = s.poll(20_000, &mut f.state, false);
        assert_eq!(
            fires,
            vec![
                SchedulerFire::Warn { id: e.id, remaining_ms: 0 },
                SchedulerFire::Expire { id: e.id }
            ]
        );
    }

    #[test]
    fn expiry_waits_for_the_gate() {
        let mut f = fixture();
        let mut s = EncounterScheduler::new(Vec::new());
        let e = spawn(&mut s, &mut f, &[AdversaryKind::K1], Some(5_000), 0).unwrap();
        assert!(s.poll(5_000, &mut f.state, true).is_empty());
        assert_eq!(s.poll(5_100, &mut f.state, false), vec![SchedulerFire::Expire { id: e.id }]);
    }

    #[test]
    fn paused_time_does_not_count() {
        let mut f = fixture();
        let mut s = EncounterScheduler::new(Vec::new());
        spawn(&mut s, &mut f, &[AdversaryKind::K1], Some(15_000), 0).unwrap();
        s.pause(8_800);
        assert_eq!(s.remaining_warn_ms(20_000), Some(1_200));
        s.resume(12_800, &mut f.state);
        assert_eq!(f.state.encounter.as_ref().unwrap().warn_due_at_ms, Some(14_000));
        assert!(s.poll(13_999, &mut f.state, false).is_empty());
        assert!(matches!(s.poll(14_000, &mut f.state, false)[..], [SchedulerFire::Warn { .. }]));
    }

    #[test]
    fn resume_without_encounter_keeps_pending_spawn() {
        let mut f = fixture();
        let mut s = EncounterScheduler::new(Vec::new());
        spawn(&mut s, &mut f, &[AdversaryKind::K1], Some(15_000), 0).unwrap();
        s.pause(1_000);
        s.retire(&mut f.state, Resolution::Withdrawn);
        s.schedule_spawn(1_000, 500);
        s.resume(4_000, &mut f.state);
        assert_eq!(s.remaining_ttl_ms(4_000), None);
        assert_eq!(s.next_spawn_in_ms(4_000), Some(500));
    }

    #[test]
    fn escape_applies_damage_and_schedules_respawn() {
        let mut f = fixture();
        let mut s = EncounterScheduler::new(Vec::new());
        spawn(&mut s, &mut f, &[AdversaryKind::K2], Some(15_000), 0).unwrap();
        let hp = f.state.player.hp;
        let out = s.escape(&mut f.state, &f.catalog, 15_000, 2_000).unwrap();
        assert!(!out.lost);
        assert!(out.encounter.removed);
        assert_eq!(f.state.player.hp, hp - 1);
        assert!(f.state.encounter.is_none());
        assert_eq!(s.next_spawn_in_ms(15_000), Some(2_000));
    }

    #[test]
    fn fatal_escape_schedules_nothing() {
        let mut f = fixture();
        f.state.player.hp = 1;
        let mut s = EncounterScheduler::new(Vec::new());
        spawn(&mut s, &mut f, &[AdversaryKind::K1], Some(15_000), 0).unwrap();
        let out = s.escape(&mut f.state, &f.catalog, 15_000, 2_000).unwrap();
        assert!(out.lost);
        assert!(!s.spawn_pending());
    }

    #[derive(Clone, Default)]
    struct Trace(Arc<Mutex<Vec<String>>>);

    impl EncounterHook for Trace {
        fn before_spawn(&mut self, kind: AdversaryKind, now_ms: u64) {
            self.0.lock().unwrap().push(format!("spawn {kind} @{now_ms}"));
        }

        fn after_resolve(&mut self, encounter: &Encounter, resolution: Resolution) {
            self.0.lock().unwrap().push(format!("{} {resolution:?}", encounter.kind));
        }
    }

    #[test]
    fn hooks_see_spawn_and_resolution_once() {
        let mut f = fixture();
        let trace = Trace::default();
        let mut s = EncounterScheduler::new(vec![Box::new(trace.clone())]);
        spawn(&mut s, &mut f, &[AdversaryKind::K3], None, 7).unwrap();
        s.retire(&mut f.state, Resolution::Resolved);
        assert!(s.retire(&mut f.state, Resolution::Resolved).is_none());
        assert_eq!(
            *trace.0.lock().unwrap(),
            vec!["spawn k3 @7".to_string(), "k3 Resolved".to_string()]
        );
    }

    #[test]
    fn stale_timers_are_dropped() {
        let mut f = fixture();
        let mut s = EncounterScheduler::new(Vec::new());
        spawn(&mut s, &mut f, &[AdversaryKind::K1], Some(15_000), 0).unwrap();
        // Encounter replaced behind the scheduler's back.
        f.state.encounter.as_mut().unwrap().id = EncounterId(999);
        assert!(s.poll(20_000, &mut f.state, false).is_empty());
        assert_eq!(s.remaining_ttl_ms(0), None);
    }
}
