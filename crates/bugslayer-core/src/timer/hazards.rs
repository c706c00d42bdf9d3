//! Hazard ticker: patrols and traps.
//!
//! Runs beside the encounter scheduler and pauses with it, but keeps its own
//! timers. While a resolution holds the gate the ticker does nothing; due
//! timers simply fire on the first tick after release.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::deadline::PausableTimer;
use crate::board::{Board, Cell};
use crate::content::{Damage, HazardDef};
use crate::session::{Hazard, HazardId, SessionState, TrapState};

/// Preferred rows for a patrol, tried in order.
const PATROL_ROWS: [i32; 6] = [3, 6, 2, 7, 1, 8];
/// A patrol row needs at least this many free cells.
const PATROL_MIN_FREE: usize = 6;

pub const PATROL_DAMAGE: Damage = Damage { hp: 1, coins: 1 };

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HazardTimings {
    pub patrol_interval_ms: u64,
}

impl Default for HazardTimings {
    fn default() -> Self {
        Self {
            patrol_interval_ms: 580,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HazardFire {
    PatrolHit {
        hazard: HazardId,
        position: Cell,
        pushed_to: Option<Cell>,
        lost: bool,
    },
    TrapTriggered {
        hazard: HazardId,
        position: Cell,
        hp_loss: u32,
        lost: bool,
    },
    TrapRespawned {
        hazard: HazardId,
        position: Cell,
    },
}

#[derive(Debug, Clone)]
pub struct HazardTicker {
    timings: HazardTimings,
    patrol: Option<PausableTimer>,
    arming: BTreeMap<HazardId, PausableTimer>,
    respawning: BTreeMap<HazardId, PausableTimer>,
    paused: bool,
}

impl HazardTicker {
    pub fn new(timings: HazardTimings) -> Self {
        Self {
            timings,
            patrol: None,
            arming: BTreeMap::new(),
            respawning: BTreeMap::new(),
            paused: false,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Place the level's hazards into the session.
    pub fn install<R: Rng + ?Sized>(
        &mut self,
        state: &mut SessionState,
        defs: &[HazardDef],
        board: &Board,
        rng: &mut R,
        now_ms: u64,
    ) {
        state.hazards.clear();
        self.arming.clear();
        self.respawning.clear();
        self.patrol = None;

        let mut next_id = 0u32;
        for def in defs {
            match *def {
                HazardDef::Soap {
                    count,
                    hp_loss,
                    arm_ms,
                    respawn_ms,
                } => {
                    for _ in 0..count {
                        next_id += 1;
                        let position = board.random_free_cell(rng, &state.occupied_cells());
                        state.hazards.push(Hazard::Trap {
                            id: HazardId(next_id),
                            position,
                            state: TrapState::Idle,
                            hp_loss,
                            arm_ms,
                            respawn_ms,
                        });
                    }
                }
                HazardDef::Cart { row } => {
                    next_id += 1;
                    let row = row.unwrap_or_else(|| patrol_row(board));
                    let start = (0..board.cols())
                        .map(|x| Cell::new(x, row))
                        .find(|c| !board.is_blocked(*c) && *c != state.player_pos)
                        .unwrap_or(Cell::new(0, row));
                    state.hazards.push(Hazard::Patrol {
                        id: HazardId(next_id),
                        position: start,
                        direction: 1,
                    });
                    self.patrol = Some(PausableTimer::arm(now_ms, self.timings.patrol_interval_ms));
                }
            }
        }
        if self.paused {
            self.pause_timers(now_ms);
        }
    }

    /// Arm traps under the player; disarm, silently, traps they stepped off.
    pub fn on_player_moved(&mut self, state: &mut SessionState, now_ms: u64) {
        let player = state.player_pos;
        for hazard in &mut state.hazards {
            let Hazard::Trap {
                id,
                position,
                state: trap,
                arm_ms,
                ..
            } = hazard
            else {
                continue;
            };
            match *trap {
                TrapState::Idle if *position == player => {
                    *trap = TrapState::Armed;
                    let mut timer = PausableTimer::arm(now_ms, *arm_ms);
                    if self.paused {
                        timer.pause(now_ms);
                    }
                    self.arming.insert(*id, timer);
                    debug!(hazard = id.0, "trap armed");
                }
                TrapState::Armed if *position != player => {
                    *trap = TrapState::Idle;
                    self.arming.remove(id);
                }
                _ => {}
            }
        }
    }

    pub fn pause(&mut self, now_ms: u64) {
        if self.paused {
            return;
        }
        self.paused = true;
        self.pause_timers(now_ms);
    }

    fn pause_timers(&mut self, now_ms: u64) {
        for timer in self
            .patrol
            .iter_mut()
            .chain(self.arming.values_mut())
            .chain(self.respawning.values_mut())
        {
            timer.pause(now_ms);
        }
    }

    pub fn resume(&mut self, now_ms: u64) {
        if !self.paused {
            return;
        }
        self.paused = false;
        for timer in self
            .patrol
            .iter_mut()
            .chain(self.arming.values_mut())
            .chain(self.respawning.values_mut())
        {
            timer.resume(now_ms);
        }
    }

    pub fn poll<R: Rng + ?Sized>(
        &mut self,
        state: &mut SessionState,
        board: &Board,
        rng: &mut R,
        now_ms: u64,
        gate_held: bool,
    ) -> Vec<HazardFire> {
        let mut fires = Vec::new();
        if self.paused || gate_held {
            return fires;
        }

        if self.patrol.is_some_and(|t| t.is_due(now_ms)) {
            self.patrol = Some(PausableTimer::arm(now_ms, self.timings.patrol_interval_ms));
            self.step_patrols(state, board, now_ms, &mut fires);
        }

        let due: Vec<HazardId> = self
            .arming
            .iter()
            .filter(|(_, t)| t.is_due(now_ms))
            .map(|(id, _)| *id)
            .collect();
        for id in due {
            self.arming.remove(&id);
            self.trigger_trap(state, id, now_ms, &mut fires);
        }

        let due: Vec<HazardId> = self
            .respawning
            .iter()
            .filter(|(_, t)| t.is_due(now_ms))
            .map(|(id, _)| *id)
            .collect();
        for id in due {
            self.respawning.remove(&id);
            respawn_trap(state, board, rng, id, &mut fires);
        }
        fires
    }

    fn step_patrols(
        &mut self,
        state: &mut SessionState,
        board: &Board,
        now_ms: u64,
        fires: &mut Vec<HazardFire>,
    ) {
        let mut hits = Vec::new();
        for hazard in &mut state.hazards {
            let Hazard::Patrol {
                id,
                position,
                direction,
            } = hazard
            else {
                continue;
            };
            let (next, dir) = patrol_step(board, *position, *direction);
            *direction = dir;
            if next == *position {
                continue;
            }
            *position = next;
            if next == state.player_pos {
                hits.push((*id, next, dir));
            }
        }

        for (id, position, dir) in hits {
            let lost = state.apply_penalty(PATROL_DAMAGE);
            let push = state.player_pos.offset(dir, 0);
            let pushed_to = (!board.is_blocked(push)).then_some(push);
            if let Some(cell) = pushed_to {
                state.player_pos = cell;
                self.on_player_moved(state, now_ms);
            }
            fires.push(HazardFire::PatrolHit {
                hazard: id,
                position,
                pushed_to,
                lost,
            });
        }
    }

    fn trigger_trap(
        &mut self,
        state: &mut SessionState,
        id: HazardId,
        now_ms: u64,
        fires: &mut Vec<HazardFire>,
    ) {
        let player = state.player_pos;
        let Some(Hazard::Trap {
            position,
            state: trap,
            hp_loss,
            respawn_ms,
            ..
        }) = state.hazards.iter_mut().find(|h| h.id() == id)
        else {
            return;
        };
        if *trap != TrapState::Armed {
            return;
        }
        if *position != player {
            *trap = TrapState::Idle;
            return;
        }
        *trap = TrapState::Down;
        let (position, hp_loss) = (*position, *hp_loss);
        self.respawning
            .insert(id, PausableTimer::arm(now_ms, *respawn_ms));
        let lost = state.apply_penalty(Damage { hp: hp_loss, coins: 0 });
        fires.push(HazardFire::TrapTriggered {
            hazard: id,
            position,
            hp_loss,
            lost,
        });
    }
}

fn respawn_trap<R: Rng + ?Sized>(
    state: &mut SessionState,
    board: &Board,
    rng: &mut R,
    id: HazardId,
    fires: &mut Vec<HazardFire>,
) {
    let mut exclude = state.occupied_cells();
    exclude.extend(state.encounter.as_ref().map(|e| e.position));
    let Some(old) = state.hazards.iter().find(|h| h.id() == id).map(Hazard::position) else {
        return;
    };
    exclude.push(old);
    let fresh = board.random_free_cell(rng, &exclude);

    if let Some(Hazard::Trap {
        position,
        state: trap,
        ..
    }) = state.hazards.iter_mut().find(|h| h.id() == id)
    {
        *position = fresh;
        *trap = TrapState::Idle;
        fires.push(HazardFire::TrapRespawned {
            hazard: id,
            position: fresh,
        });
    }
}

/// Try the current direction, reverse and retry once, else stay.
fn patrol_step(board: &Board, from: Cell, direction: i32) -> (Cell, i32) {
    let next = from.offset(direction, 0);
    if !board.is_blocked(next) {
        return (next, direction);
    }
    let reversed = -direction;
    let next = from.offset(reversed, 0);
    if !board.is_blocked(next) {
        (next, reversed)
    } else {
        (from, reversed)
    }
}

fn patrol_row(board: &Board) -> i32 {
    PATROL_ROWS
        .iter()
        .copied()
        .find(|&row| row < board.rows() && board.free_cells_in_row(row) >= PATROL_MIN_FREE)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{PlacementMode, Rect};
    use crate::session::Player;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    fn kitchen() -> Board {
        Board::new(
            PlacementMode::Grid,
            10,
            10,
            vec![Rect { x1: 3, y1: 4, x2: 6, y2: 5, label: Some("table".into()) }],
        )
    }

    fn trap_at(state: &mut SessionState, cell: Cell) {
        state.hazards.push(Hazard::Trap {
            id: HazardId(1),
            position: cell,
            state: TrapState::Idle,
            hp_loss: 3,
            arm_ms: 2_000,
            respawn_ms: 6_000,
        });
    }

    #[test]
    fn patrol_reverses_at_walls() {
        let board = Board::new(PlacementMode::Grid, 3, 1, Vec::new());
        assert_eq!(patrol_step(&board, Cell::new(2, 0), 1), (Cell::new(1, 0), -1));
        let single = Board::new(PlacementMode::Grid, 1, 1, Vec::new());
        assert_eq!(patrol_step(&single, Cell::new(0, 0), 1), (Cell::new(0, 0), -1));
    }

    #[test]
    fn cart_prefers_row_three() {
        let board = kitchen();
        assert_eq!(patrol_row(&board), 3);
        let small = Board::new(PlacementMode::Grid, 3, 3, Vec::new());
        assert_eq!(patrol_row(&small), 0);
    }

    #[test]
    fn patrol_hit_costs_and_pushes() {
        let board = kitchen();
        let mut rng = Pcg64::seed_from_u64(1);
        let mut state = SessionState::new(5, Player::default(), Cell::new(1, 3));
        let mut ticker = HazardTicker::new(HazardTimings::default());
        ticker.install(&mut state, &[HazardDef::Cart { row: None }], &board, &mut rng, 0);
        assert_eq!(state.hazards[0].position(), Cell::new(0, 3));

        let fires = ticker.poll(&mut state, &board, &mut rng, 580, false);
        assert_eq!(
            fires,
            vec![HazardFire::PatrolHit {
                hazard: HazardId(1),
                position: Cell::new(1, 3),
                pushed_to: Some(Cell::new(2, 3)),
                lost: false,
            }]
        );
        assert_eq!(state.player.hp, 9);
        assert_eq!(state.player.coins, 9);
        assert_eq!(state.player_pos, Cell::new(2, 3));
    }

    #[test]
    fn trap_triggers_only_if_player_stays() {
        let board = Board::new(PlacementMode::Grid, 6, 3, Vec::new());
        let mut rng = Pcg64::seed_from_u64(2);
        let mut state = SessionState::new(3, Player::default(), Cell::new(0, 0));
        trap_at(&mut state, Cell::new(1, 1));
        let mut ticker = HazardTicker::new(HazardTimings::default());

        state.player_pos = Cell::new(1, 1);
        ticker.on_player_moved(&mut state, 0);
        state.player_pos = Cell::new(2, 1);
        ticker.on_player_moved(&mut state, 500);
        assert!(ticker.poll(&mut state, &board, &mut rng, 5_000, false).is_empty());
        assert_eq!(state.player.hp, 10);

        state.player_pos = Cell::new(1, 1);
        ticker.on_player_moved(&mut state, 6_000);
        let fires = ticker.poll(&mut state, &board, &mut rng, 8_000, false);
        assert!(matches!(fires[..], [HazardFire::TrapTriggered { hp_loss: 3, lost: false, .. }]));
        assert_eq!(state.player.hp, 7);
        assert!(!state.hazards[0].is_live());

        let fires = ticker.poll(&mut state, &board, &mut rng, 14_000, false);
        let [HazardFire::TrapRespawned { position, .. }] = fires[..] else {
            panic!("expected a respawn, got {fires:?}");
        };
        assert_ne!(position, Cell::new(1, 1));
        assert!(state.hazards[0].is_live());
    }

    #[test]
    fn paused_ticker_keeps_remaining_arm_time() {
        let board = Board::new(PlacementMode::Grid, 6, 3, Vec::new());
        let mut rng = Pcg64::seed_from_u64(3);
        let mut state = SessionState::new(3, Player::default(), Cell::new(1, 1));
        trap_at(&mut state, Cell::new(1, 1));
        let mut ticker = HazardTicker::new(HazardTimings::default());
        ticker.on_player_moved(&mut state, 0);
        ticker.pause(1_500);
        assert!(ticker.poll(&mut state, &board, &mut rng, 9_000, false).is_empty());
        ticker.resume(9_000);
        assert!(ticker.poll(&mut state, &board, &mut rng, 9_499, false).is_empty());
        assert_eq!(ticker.poll(&mut state, &board, &mut rng, 9_500, false).len(), 1);
    }

    #[test]
    fn held_gate_skips_work() {
        let board = kitchen();
        let mut rng = Pcg64::seed_from_u64(4);
        let mut state = SessionState::new(5, Player::default(), Cell::new(9, 9));
        let mut ticker = HazardTicker::new(HazardTimings::default());
        ticker.install(&mut state, &[HazardDef::Cart { row: Some(3) }], &board, &mut rng, 0);
        assert!(ticker.poll(&mut state, &board, &mut rng, 1_000, true).is_empty());
        assert_eq!(state.hazards[0].position(), Cell::new(0, 3));
        ticker.poll(&mut state, &board, &mut rng, 1_000, false);
        assert_eq!(state.hazards[0].position(), Cell::new(1, 3));
    }
}
