//! Player actions that are not resolutions: movement, scanning, weapon
//! selection, status and the cat adoption dialog.

use chrono::Utc;
use tracing::debug;

use super::{Admission, Engine};
use crate::audio::Cue;
use crate::board::Step;
use crate::content::{AdversaryKind, Damage, Weapon, CAT_ADOPT_COST};
use crate::events::Event;
use crate::session::{Hazard, TrapState};
use crate::timer::PauseReason;

/// Bumps into the same obstacle before it starts to hurt.
const BUMPS_BEFORE_PENALTY: u32 = 2;
const BUMP_PENALTY: Damage = Damage { hp: 1, coins: 1 };
const DEFAULT_CAT_NAME: &str = "Mochi";

impl Engine {
    /// The host saw a real input event; audio cues may play from now on.
    pub fn note_user_interaction(&mut self) {
        self.state.user_interacted = true;
    }

    /// Move one step. Walls and furniture stop the player, the patrolling
    /// cart refuses the move, and a second bump into the same piece of
    /// furniture costs health and coins.
    pub fn move_by(&mut self, dx: i32, dy: i32) -> Admission {
        if let Some(refused) = self.refuse() {
            return refused;
        }
        let now = self.now_ms();
        match self.board.step(self.state.player_pos, dx, dy) {
            Step::Wall => {
                self.cue(Cue::Deny);
                self.say("Wall.", now);
            }
            Step::Obstacle(index) => self.bump(index, now),
            Step::Moved(cell) => {
                if self.state.patrol_at(cell) {
                    self.cue(Cue::Warn);
                    self.say("The cart is in the way.", now);
                    return Admission::Accepted;
                }
                self.state.player_pos = cell;
                self.hazards.on_player_moved(&mut self.state, now);
                self.cue(Cue::Move);

                let on_soap = self.state.hazards.iter().any(|h| {
                    matches!(h, Hazard::Trap { position, state: TrapState::Armed, .. } if *position == cell)
                });
                let here = self
                    .state
                    .encounter
                    .as_ref()
                    .filter(|e| self.board.mode().same_cell(cell, e.position))
                    .map(|e| e.kind);
                if on_soap {
                    self.cue(Cue::Warn);
                    self.say("Careful, soap on the floor!", now);
                } else if let Some(kind) = here {
                    let text = format!("The {} is right here!", self.name_of(kind));
                    self.say(&text, now);
                } else {
                    let text = self.board.describe(cell);
                    self.speech.request_status(text, now);
                }
            }
        }
        self.persist();
        Admission::Accepted
    }

    fn bump(&mut self, index: usize, now: u64) {
        let label = self
            .board
            .obstacles()
            .get(index)
            .and_then(|r| r.label.clone())
            .unwrap_or_else(|| "furniture".to_string());
        self.cue(Cue::Deny);

        let bumps = {
            let n = self.state.bumps.entry(index).or_insert(0);
            *n += 1;
            *n
        };
        if bumps < BUMPS_BEFORE_PENALTY {
            self.say(&format!("The {label} is in the way."), now);
            return;
        }

        let lost = self
            .gate
            .run_gated(&mut self.state, now, |s| s.apply_penalty(BUMP_PENALTY));
        match lost {
            Some(lost) => {
                self.state.bumps.insert(index, 0);
                let text = format!(
                    "You crashed into the {label}! Lost {} health and {} coin.",
                    BUMP_PENALTY.hp, BUMP_PENALTY.coins
                );
                self.say(&text, now);
                if lost {
                    self.lose(now);
                }
            }
            None => {
                debug!(obstacle = index, "bump penalty deferred: gate busy");
                self.say(&format!("The {label} is in the way."), now);
            }
        }
    }

    /// Say where the current adversary is and how long it will stay.
    pub fn scan(&mut self) -> Admission {
        if let Some(refused) = self.refuse() {
            return refused;
        }
        let now = self.now_ms();
        let text = match self.state.encounter.as_ref() {
            None => "No cockroaches in sight.".to_string(),
            Some(encounter) => {
                let name = &self.catalog.get(encounter.kind).name;
                let hint = self
                    .board
                    .direction_hint(self.state.player_pos, encounter.position);
                let mut text = format!(
                    "The {name} is at {}, {hint}.",
                    self.board.describe(encounter.position)
                );
                if let Some(ms) = self.scheduler.remaining_ttl_ms(now) {
                    text.push_str(&format!(" It escapes in {} seconds.", ms.div_ceil(1_000)));
                }
                text
            }
        };
        self.say(&text, now);
        Admission::Accepted
    }

    pub fn select_weapon(&mut self, weapon: Weapon) -> Admission {
        if let Some(refused) = self.refuse() {
            return refused;
        }
        let now = self.now_ms();
        if weapon == Weapon::Cat && !self.state.boss.cat_owned {
            self.say("You have no cat yet.", now);
            self.open_adoption(now);
            return Admission::Accepted;
        }

        self.state.weapon = weapon;
        self.cue(Cue::Select(weapon));
        let text = match weapon {
            Weapon::Fire | Weapon::Spray | Weapon::Slipper | Weapon::Bait => {
                format!("{}, {} left.", weapon.label(), self.state.player.ammo(weapon))
            }
            Weapon::Vote => {
                let prices = [AdversaryKind::K1, AdversaryKind::K2, AdversaryKind::K3]
                    .iter()
                    .map(|kind| {
                        let def = self.catalog.get(*kind);
                        let price = def.vote_cost.unwrap_or(self.level.ticket_price);
                        format!("{} {price}", def.name)
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "{}. Prices: {prices}. You have {} votes.",
                    weapon.label(),
                    self.state.player.votes
                )
            }
            Weapon::Cat => {
                let name = self
                    .state
                    .boss
                    .cat_name
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CAT_NAME.to_string());
                format!("{name} is ready to pounce.")
            }
            Weapon::Recall => {
                if self.state.recall_ready() {
                    format!("{}. It is ready.", weapon.label())
                } else {
                    format!("{}. Still needed: {}.", weapon.label(), self.state.recall_shortfall())
                }
            }
        };
        self.say(&text, now);
        Admission::Accepted
    }

    /// Speak the full player status at once.
    pub fn announce_status(&mut self) -> Admission {
        let now = self.now_ms();
        let player = &self.state.player;
        let ammo = Weapon::AMMO
            .iter()
            .map(|w| format!("{} {}", w.label(), player.ammo(*w)))
            .collect::<Vec<_>>()
            .join(", ");
        let mut text = format!(
            "{} Weapon: {}. Ammo: {ammo}. Votes: {}.",
            self.status_line(),
            self.state.weapon.label(),
            player.votes
        );
        if self.level.allowed_kinds.contains(&AdversaryKind::K5) {
            text.push_str(&format!(" The cockroach king has {} health.", self.state.boss.hp));
        }
        self.say(&text, now);
        Admission::Accepted
    }

    /// Short status used after each resolution.
    pub(super) fn status_line(&self) -> String {
        let remaining = self
            .state
            .remaining_targets(&self.level.targets)
            .iter()
            .map(|(kind, n)| format!("{n} {}", self.catalog.get(*kind).name))
            .collect::<Vec<_>>()
            .join(", ");
        let mut line = format!(
            "Health {}, coins {}.",
            self.state.player.hp, self.state.player.coins
        );
        if !remaining.is_empty() {
            line.push_str(&format!(" Still to go: {remaining}."));
        }
        line
    }

    /// Suspend every countdown while the host shows a dialog of its own.
    pub fn pause_for_modal(&mut self) {
        let now = self.now_ms();
        self.pause_timers(PauseReason::Modal, now);
    }

    pub fn resume_from_modal(&mut self) {
        let now = self.now_ms();
        self.resume_timers(PauseReason::Modal, now);
    }

    pub(super) fn open_adoption(&mut self, now: u64) {
        if self.state.boss.cat_owned {
            self.say("You already have a cat.", now);
            return;
        }
        if self.adoption_open {
            return;
        }
        self.adoption_open = true;
        self.pause_timers(PauseReason::Dialog, now);
        let text = format!(
            "Adopt a cat for {CAT_ADOPT_COST} coins? Give it a name to adopt, or cancel."
        );
        self.say(&text, now);
    }

    /// Answer the adoption dialog with a name. An empty name picks a default.
    pub fn adopt_cat(&mut self, name: &str) -> Admission {
        if self.state.is_over() {
            return Admission::Halted;
        }
        if !self.adoption_open {
            return Admission::Ignored;
        }
        let now = self.now_ms();
        let name = match name.trim() {
            "" => DEFAULT_CAT_NAME.to_string(),
            trimmed => trimmed.to_string(),
        };

        let adopted = self.gate.run_gated(&mut self.state, now, |s| {
            if !s.spend(CAT_ADOPT_COST) {
                return false;
            }
            s.boss.cat_owned = true;
            s.boss.cat_name = Some(name.clone());
            s.weapon = Weapon::Cat;
            true
        });
        match adopted {
            None => return Admission::Busy,
            Some(false) => {
                self.cue(Cue::Deny);
                let text = format!("Not enough coins. A cat costs {CAT_ADOPT_COST}.");
                self.say(&text, now);
            }
            Some(true) => {
                self.cue(Cue::Select(Weapon::Cat));
                self.say(&format!("{name} joins the hunt!"), now);
                self.emit(Event::CatAdopted {
                    name,
                    at: Utc::now(),
                });
            }
        }
        self.close_adoption(now);
        self.persist();
        Admission::Accepted
    }

    pub fn cancel_adoption(&mut self) -> Admission {
        if !self.adoption_open {
            return Admission::Ignored;
        }
        let now = self.now_ms();
        self.close_adoption(now);
        self.say("Maybe later.", now);
        Admission::Accepted
    }

    fn close_adoption(&mut self, now: u64) {
        self.adoption_open = false;
        self.resume_timers(PauseReason::Dialog, now);
    }
}
