//! Resolutions: strikes, concessions, boss weapons and quiz outcomes.
//!
//! Each one enters the gate, applies all of its mutations, then keeps the
//! gate across its narration. Refusals (nothing here, out of ammo, wrong
//! weapon) release the gate at once and change nothing.

use chrono::Utc;
use tracing::{debug, info};

use super::{Admission, Engine};
use crate::audio::Cue;
use crate::content::{AdversaryKind, Damage, Weapon, CAT_HIT};
use crate::events::Event;
use crate::quiz::QuizOutcome;
use crate::session::{EncounterId, Resolution};
use crate::timer::PauseReason;

/// Weapons that only work on the boss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BossAction {
    Cat,
    Recall,
}

const NOTHING_HERE: &str = "There is no cockroach around.";

impl Engine {
    /// Use the selected weapon on the current encounter.
    pub fn attack(&mut self) -> Admission {
        if let Some(refused) = self.refuse() {
            return refused;
        }
        let admission = match self.state.weapon {
            Weapon::Vote => self.concede(),
            Weapon::Cat => self.boss_weapon(BossAction::Cat),
            Weapon::Recall => self.boss_weapon(BossAction::Recall),
            weapon => self.strike(weapon),
        };
        self.persist();
        admission
    }

    fn strike(&mut self, weapon: Weapon) -> Admission {
        let now = self.now_ms();
        let Some(mut scope) = self.gate.scoped(&mut self.state, now) else {
            return Admission::Busy;
        };
        let Some(encounter) = scope.encounter.clone() else {
            drop(scope);
            self.say(NOTHING_HERE, now);
            return Admission::Accepted;
        };
        let def = self.catalog.get(encounter.kind).clone();
        let same_cell = self
            .board
            .mode()
            .same_cell(scope.player_pos, encounter.position);

        if same_cell && !def.is_weak_to(weapon) {
            drop(scope);
            let text = format!("The {} does nothing to the {}.", weapon.label(), def.name);
            self.say(&text, now);
            return Admission::Accepted;
        }
        if !scope.consume_ammo(weapon) {
            drop(scope);
            self.cue(Cue::Deny);
            self.say(&format!("The {} is used up.", weapon.label()), now);
            return Admission::Accepted;
        }

        if same_cell {
            scope.apply_reward(&def.reward, weapon);
            scope.note_kill(encounter.kind);
            self.scheduler.retire(&mut scope, Resolution::Resolved);
            let pass = scope.keep();
            self.quiz.cancel_prompt();

            self.cue(Cue::Hit);
            let text = if def.reward.coins > 0 {
                format!("Got it! The {} is down. Plus {} coins.", def.name, def.reward.coins)
            } else {
                format!("Got it! The {} is down.", def.name)
            };
            let ticket = self.speech.speak_async(&text, now);
            self.hold(pass, ticket);
            self.emit_resolved(encounter.id, encounter.kind, Resolution::Resolved);
            self.after_kill(now);
            return Admission::Accepted;
        }

        let attacks = match scope.encounter.as_mut() {
            Some(current) => {
                current.attack_count += 1;
                current.attack_count
            }
            None => 0,
        };
        let out_of_hp = scope.apply_penalty(def.damage);
        let overrun = def.loss_after_attacks.is_some_and(|limit| attacks >= limit);
        let hint = self
            .board
            .direction_hint(scope.player_pos, encounter.position);
        let pass = scope.keep();
        debug!(kind = %encounter.kind, attacks, "strike missed");

        self.cue(Cue::Miss);
        let text = format!(
            "Missed! The {} strikes back: lost {} health and {} coins. It is {hint}.",
            def.name, def.damage.hp, def.damage.coins
        );
        let ticket = self.speech.speak_async(&text, now);
        self.hold(pass, ticket);
        if out_of_hp || overrun {
            self.lose(now);
        }
        Admission::Accepted
    }

    /// Buy the current adversary off with coins. Grants recall votes and
    /// grows the per-kind ledger; the encounter withdraws without counting
    /// as a kill.
    pub fn buy_concession(&mut self) -> Admission {
        if let Some(refused) = self.refuse() {
            return refused;
        }
        let admission = self.concede();
        self.persist();
        admission
    }

    fn concede(&mut self) -> Admission {
        let now = self.now_ms();
        let Some(mut scope) = self.gate.scoped(&mut self.state, now) else {
            return Admission::Busy;
        };
        let Some(encounter) = scope.encounter.clone() else {
            drop(scope);
            self.say(NOTHING_HERE, now);
            return Admission::Accepted;
        };
        let def = self.catalog.get(encounter.kind).clone();
        let same_cell = self
            .board
            .mode()
            .same_cell(scope.player_pos, encounter.position);

        if self.level.concession_needs_same_cell && !same_cell {
            drop(scope);
            let text = format!("Step up to the {} to hand it a petition.", def.name);
            self.say(&text, now);
            return Admission::Accepted;
        }
        if !def.can_concede() {
            drop(scope);
            self.say(&format!("The {} will not sign a petition.", def.name), now);
            return Admission::Accepted;
        }
        let price = def.vote_cost.unwrap_or(self.level.ticket_price);
        if !scope.spend(price) {
            drop(scope);
            self.cue(Cue::Deny);
            let text = format!("Not enough coins. The {} wants {price}.", def.name);
            self.say(&text, now);
            return Admission::Accepted;
        }

        let tickets = def.vote_tickets.max(1);
        scope.record_concession(encounter.kind, tickets);
        scope.note_weapon_use(Weapon::Vote);
        self.scheduler.retire(&mut scope, Resolution::Withdrawn);
        let votes = scope.player.votes;
        let pass = scope.keep();
        self.quiz.cancel_prompt();
        info!(kind = %encounter.kind, price, tickets, votes, "concession bought");

        self.cue(Cue::VoteOk);
        let text = format!(
            "The {} took {price} coins and signed. You have {votes} recall votes.",
            def.name
        );
        let ticket = self.speech.speak_async(&text, now);
        self.hold(pass, ticket);
        self.emit_resolved(encounter.id, encounter.kind, Resolution::Withdrawn);
        self.check_recall_ready(now);
        self.orchestrate_spawn(now);
        Admission::Accepted
    }

    /// Cat strike or recall against the boss. Both need the player on the
    /// boss's cell.
    pub fn use_boss_weapon(&mut self, action: BossAction) -> Admission {
        if let Some(refused) = self.refuse() {
            return refused;
        }
        let admission = self.boss_weapon(action);
        self.persist();
        admission
    }

    fn boss_weapon(&mut self, action: BossAction) -> Admission {
        let now = self.now_ms();
        if action == BossAction::Cat && !self.state.boss.cat_owned {
            self.say("You have no cat yet.", now);
            self.open_adoption(now);
            return Admission::Accepted;
        }

        let Some(mut scope) = self.gate.scoped(&mut self.state, now) else {
            return Admission::Busy;
        };
        let Some(encounter) = scope.encounter.clone() else {
            drop(scope);
            self.say(NOTHING_HERE, now);
            return Admission::Accepted;
        };
        let def = self.catalog.get(encounter.kind).clone();
        let player_pos = scope.player_pos;
        if !self.board.mode().same_cell(player_pos, encounter.position) {
            drop(scope);
            let hint = self.board.direction_hint(player_pos, encounter.position);
            self.say(&format!("Out of reach. The {} is {hint}.", def.name), now);
            return Admission::Accepted;
        }
        if !def.boss {
            drop(scope);
            self.say("Save that for the cockroach king.", now);
            return Admission::Accepted;
        }

        let (text, cue, defeated) = match action {
            BossAction::Cat => {
                scope.boss.hp = scope.boss.hp.saturating_sub(CAT_HIT);
                scope.note_weapon_use(Weapon::Cat);
                let hp = scope.boss.hp;
                let cat = scope
                    .boss
                    .cat_name
                    .clone()
                    .unwrap_or_else(|| "Your cat".to_string());
                if hp == 0 {
                    (format!("{cat} pounces! The {} is finished.", def.name), Cue::Hit, true)
                } else {
                    let text = format!(
                        "{cat} pounces for {CAT_HIT} damage. The {} has {hp} health left.",
                        def.name
                    );
                    (text, Cue::Hit, false)
                }
            }
            BossAction::Recall => {
                if !scope.recall_ready() {
                    let shortfall = scope.recall_shortfall();
                    drop(scope);
                    self.cue(Cue::Deny);
                    self.say(&format!("Not enough petitions yet: {shortfall}."), now);
                    return Admission::Accepted;
                }
                scope.boss.hp = 0;
                scope.note_weapon_use(Weapon::Recall);
                let text = format!(
                    "The recall passes! The {} is removed from office.",
                    def.name
                );
                (text, Cue::RecallSuccess, true)
            }
        };

        if defeated {
            scope.note_kill(encounter.kind);
            self.scheduler.retire(&mut scope, Resolution::Resolved);
        }
        let pass = scope.keep();
        self.cue(cue);
        let ticket = self.speech.speak_async(&text, now);
        self.hold(pass, ticket);
        if defeated {
            self.emit_resolved(encounter.id, encounter.kind, Resolution::Resolved);
            self.win(now);
        }
        Admission::Accepted
    }

    /// Apply a quiz result supplied by the host. The open dialog, if any, is
    /// closed first so its own answer can never be applied as well.
    pub fn submit_quiz_outcome(&mut self, outcome: QuizOutcome) -> Admission {
        if self.state.is_over() {
            return Admission::Halted;
        }
        if self.gate.is_held() {
            return Admission::Busy;
        }
        let target = self.quiz.open_for().or_else(|| {
            self.state
                .encounter
                .as_ref()
                .filter(|e| self.catalog.get(e.kind).quiz)
                .map(|e| e.id)
        });
        let Some(id) = target else {
            return Admission::Ignored;
        };
        self.quiz.close();
        self.quiz.cancel_prompt();
        self.deferred_quiz = None;
        let now = self.now_ms();
        let admission = self.settle_quiz(id, outcome, now);
        self.persist();
        admission
    }

    /// Apply a quiz outcome exactly once. A busy gate defers it to the next
    /// tick.
    pub(super) fn settle_quiz(
        &mut self,
        id: EncounterId,
        outcome: QuizOutcome,
        now: u64,
    ) -> Admission {
        let Some(mut scope) = self.gate.scoped(&mut self.state, now) else {
            self.deferred_quiz = Some((id, outcome));
            return Admission::Busy;
        };
        let Some(kind) = scope
            .encounter
            .as_ref()
            .filter(|e| e.id == id)
            .map(|e| e.kind)
        else {
            drop(scope);
            debug!(encounter = id.0, "quiz outcome for a retired encounter ignored");
            self.resume_timers(PauseReason::Dialog, now);
            return Admission::Ignored;
        };
        let def = self.catalog.get(kind).clone();

        if outcome.correct {
            scope.add_coins(outcome.points);
            scope.note_kill(kind);
            self.scheduler.retire(&mut scope, Resolution::Resolved);
            let pass = scope.keep();

            self.cue(Cue::Hit);
            let text = format!(
                "Correct! The {} leaves in peace. Plus {} coins.",
                def.name, outcome.points
            );
            let ticket = self.speech.speak_async(&text, now);
            self.hold(pass, ticket);
            self.emit(Event::QuizSettled {
                encounter: id,
                correct: true,
                at: Utc::now(),
            });
            self.emit_resolved(id, kind, Resolution::Resolved);
            // The narration pause goes on before the dialog one comes off, so
            // the timers never run in between.
            self.after_kill(now);
            self.resume_timers(PauseReason::Dialog, now);
            return Admission::Accepted;
        }

        let penalty = if outcome.penalty == Damage::default() {
            def.damage
        } else {
            outcome.penalty
        };
        let out_of_hp = scope.apply_penalty(penalty);
        let pass = scope.keep();

        self.cue(Cue::Miss);
        let text = format!(
            "Wrong answer! The {} bites: lost {} health and {} coins. Use bait to finish it.",
            def.name, penalty.hp, penalty.coins
        );
        let ticket = self.speech.speak_async(&text, now);
        self.hold(pass, ticket);
        self.emit(Event::QuizSettled {
            encounter: id,
            correct: false,
            at: Utc::now(),
        });
        if out_of_hp {
            self.lose(now);
        } else {
            self.resume_timers(PauseReason::Dialog, now);
        }
        Admission::Accepted
    }

    fn emit_resolved(&mut self, id: EncounterId, kind: AdversaryKind, resolution: Resolution) {
        self.emit(Event::EncounterResolved {
            id,
            kind,
            resolution,
            level: self.level.id,
            at: Utc::now(),
        });
    }

    /// Clear the level or hand the replacement to the spawn conductor.
    fn after_kill(&mut self, now: u64) {
        if self.state.targets_met(&self.level.targets) {
            self.clear_level(now);
            return;
        }
        self.orchestrate_spawn(now);
    }

    fn orchestrate_spawn(&mut self, now: u64) {
        let status = self.status_line();
        self.speech.request_status(status, now);
        self.conductor.begin(now);
        self.pause_timers(PauseReason::Narration, now);
    }

    fn check_recall_ready(&mut self, now: u64) {
        if self.state.boss.recall_announced || !self.state.recall_ready() {
            return;
        }
        self.state.boss.recall_announced = true;
        self.cue(Cue::Warn);
        self.speech.speak_queued(
            "You have enough petitions. Recall is ready against the cockroach king.",
            now,
        );
        self.emit(Event::RecallReady { at: Utc::now() });
    }
}
