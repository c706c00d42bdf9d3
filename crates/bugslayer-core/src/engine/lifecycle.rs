//! Session start, the tick loop and the terminal outcomes.

use chrono::Utc;
use tracing::{debug, info, warn};

use super::Engine;
use crate::audio::Cue;
use crate::events::Event;
use crate::quiz::QuizPoll;
use crate::session::{EncounterId, SessionOutcome};
use crate::timer::{HazardFire, PauseReason, SchedulerFire, SpawnRules};

impl Engine {
    /// Apply the level's starter pack (once per level, ever), place hazards
    /// and narrate the level intro. The first adversary spawns when the intro
    /// has been spoken. Calling it twice is a no-op.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        let now = self.now_ms();

        match self.ledger.pack_applied(self.level.id) {
            Ok(true) => debug!(level = self.level.id, "starter pack already applied"),
            Ok(false) => {
                self.state.apply_pack(&self.level.pack, &self.level.base_ammo);
                if let Err(e) = self.ledger.mark_pack_applied(self.level.id) {
                    warn!(error = %e, level = self.level.id, "failed to record starter pack");
                }
                info!(level = self.level.id, "starter pack applied");
            }
            Err(e) => warn!(error = %e, "could not read starter pack flags; skipping pack"),
        }

        self.hazards.install(
            &mut self.state,
            &self.level.hazards,
            &self.board,
            &mut self.rng,
            now,
        );

        let targets = self
            .level
            .targets
            .iter()
            .map(|(kind, n)| format!("{n} {}", self.catalog.get(*kind).name))
            .collect::<Vec<_>>()
            .join(", ");
        let intro = if targets.is_empty() {
            format!("Level {}: {}.", self.level.id, self.level.name)
        } else {
            format!(
                "Level {}: {}. Defeat {targets}.",
                self.level.id, self.level.name
            )
        };
        self.intro = Some(self.speech.speak_async(&intro, now));
        if self.level.allowed_kinds.is_empty() {
            warn!(level = self.level.id, "level has no adversaries to spawn");
        }
        self.persist();
    }

    /// Advance every timer to the current clock reading.
    pub fn tick(&mut self) {
        let now = self.now_ms();
        self.speech.poll(now);

        if let Some(held_ms) = self.gate.poll_watchdog(&mut self.state, now) {
            self.held = None;
            self.emit(Event::GateWatchdogTripped {
                held_ms,
                at: Utc::now(),
            });
        }
        self.settle_held();

        if !self.state.is_over() {
            self.poll_intro(now);
            self.drive_quiz(now);
            if self.conductor.poll(now, &self.speech) {
                self.resume_timers(PauseReason::Narration, now);
                self.spawn_next(now);
            }
            self.poll_scheduler(now);
            self.poll_hazards(now);
        }

        self.persist();
    }

    fn settle_held(&mut self) {
        let settled = match self.held.as_mut() {
            Some(held) => held.ticket.try_outcome().is_some(),
            None => false,
        };
        if !settled {
            return;
        }
        if let Some(held) = self.held.take() {
            self.gate.release(&mut self.state, held.pass);
        }
    }

    fn poll_intro(&mut self, now: u64) {
        let done = match self.intro.as_mut() {
            Some(ticket) => ticket.try_outcome().is_some(),
            None => false,
        };
        if done {
            self.intro = None;
            self.spawn_next(now);
        }
    }

    fn poll_scheduler(&mut self, now: u64) {
        let fires = self
            .scheduler
            .poll(now, &mut self.state, self.gate.is_held());
        for fire in fires {
            if self.state.is_over() {
                break;
            }
            match fire {
                SchedulerFire::Warn { id, remaining_ms } => {
                    let Some(kind) = self.state.encounter.as_ref().map(|e| e.kind) else {
                        continue;
                    };
                    self.cue(Cue::Warn);
                    let secs = remaining_ms.div_ceil(1_000);
                    let text = format!("Hurry, the {} escapes in {secs} seconds!", self.name_of(kind));
                    self.say(&text, now);
                    self.emit(Event::EncounterWarned {
                        id,
                        kind,
                        remaining_ms,
                        at: Utc::now(),
                    });
                }
                SchedulerFire::Expire { .. } => self.escape_current(now),
                SchedulerFire::Spawn => self.spawn_next(now),
            }
        }
    }

    fn escape_current(&mut self, now: u64) {
        let Some(outcome) = self.scheduler.escape(
            &mut self.state,
            &self.catalog,
            now,
            self.level.spawn_delay_ms,
        ) else {
            return;
        };
        self.quiz.cancel_prompt();
        let encounter = outcome.encounter;
        let def = self.catalog.get(encounter.kind);
        let text = format!(
            "The {} bit you and ran off! You lost {} health and {} coins.",
            def.name, def.damage.hp, def.damage.coins
        );
        self.cue(Cue::Bite);
        self.say(&text, now);
        self.emit(Event::EncounterEscaped {
            id: encounter.id,
            kind: encounter.kind,
            level: self.level.id,
            at: Utc::now(),
        });
        if outcome.lost {
            self.lose(now);
        }
    }

    fn poll_hazards(&mut self, now: u64) {
        let fires = self.hazards.poll(
            &mut self.state,
            &self.board,
            &mut self.rng,
            now,
            self.gate.is_held(),
        );
        for fire in fires {
            match fire {
                HazardFire::PatrolHit {
                    hazard,
                    position,
                    pushed_to,
                    lost,
                } => {
                    self.cue(Cue::Bite);
                    let text = match pushed_to {
                        Some(cell) => format!(
                            "The cart ran into you! Lost 1 health and 1 coin. You were pushed to {}.",
                            self.board.describe(cell)
                        ),
                        None => "The cart ran into you! Lost 1 health and 1 coin.".to_string(),
                    };
                    self.say(&text, now);
                    self.emit(Event::HazardTriggered {
                        hazard,
                        position,
                        at: Utc::now(),
                    });
                    if lost {
                        self.lose(now);
                    }
                }
                HazardFire::TrapTriggered {
                    hazard,
                    position,
                    hp_loss,
                    lost,
                } => {
                    self.cue(Cue::Slip);
                    self.say(&format!("You slipped on soap! Lost {hp_loss} health."), now);
                    self.emit(Event::HazardTriggered {
                        hazard,
                        position,
                        at: Utc::now(),
                    });
                    if lost {
                        self.lose(now);
                    }
                }
                HazardFire::TrapRespawned { hazard, position } => {
                    debug!(hazard = hazard.0, x = position.x, y = position.y, "soap back on the floor");
                }
            }
            if self.state.is_over() {
                break;
            }
        }
    }

    /// Open a scheduled quiz, apply a deferred outcome or pick up the
    /// provider's answer.
    fn drive_quiz(&mut self, now: u64) {
        if let Some((id, outcome)) = self.deferred_quiz {
            if self.gate.is_held() {
                return;
            }
            self.deferred_quiz = None;
            self.settle_quiz(id, outcome, now);
            return;
        }

        if !self.quiz.is_open()
            && !self.pauses.contains(PauseReason::Modal)
            && !self.pauses.contains(PauseReason::Dialog)
            && !self.gate.is_held()
        {
            if let Some(id) = self.quiz.prompt_due(now) {
                self.open_quiz(id, now);
            }
        }

        match self.quiz.poll() {
            Some(QuizPoll::Answered { encounter, outcome }) => {
                if self.gate.is_held() {
                    self.deferred_quiz = Some((encounter, outcome));
                } else {
                    self.settle_quiz(encounter, outcome, now);
                }
            }
            Some(QuizPoll::Dismissed { encounter }) => {
                info!(encounter = encounter.0, "quiz dismissed");
                self.resume_timers(PauseReason::Dialog, now);
                let name = self
                    .state
                    .encounter
                    .as_ref()
                    .filter(|e| e.id == encounter)
                    .map(|e| self.name_of(e.kind));
                if let Some(name) = name {
                    self.say(&format!("No answer. Use bait on the {name}."), now);
                }
            }
            None => {}
        }
    }

    fn open_quiz(&mut self, id: EncounterId, now: u64) {
        let Some(kind) = self
            .state
            .encounter
            .as_ref()
            .filter(|e| e.id == id)
            .map(|e| e.kind)
        else {
            debug!(encounter = id.0, "quiz prompt outlived its encounter");
            return;
        };
        self.pause_timers(PauseReason::Dialog, now);
        match self
            .quiz
            .open(&mut self.state, id, self.level.id, &mut self.rng)
        {
            Ok(question) => {
                self.used_dirty = true;
                let key = question.key(self.quiz.key_prefix());
                let text = format!("The {} asks: {}", self.name_of(kind), question.spoken());
                self.say(&text, now);
                self.emit(Event::QuizOpened {
                    encounter: id,
                    question_key: key,
                    at: Utc::now(),
                });
            }
            Err(e) => {
                warn!(error = %e, "could not open quiz");
                self.resume_timers(PauseReason::Dialog, now);
                let text = format!("The {} has nothing to ask. Use bait.", self.name_of(kind));
                self.say(&text, now);
            }
        }
    }

    /// Spawn a replacement unless the session is over or one is active.
    pub(super) fn spawn_next(&mut self, now: u64) {
        if self.state.is_over() || self.state.encounter.is_some() {
            return;
        }
        let rules = SpawnRules {
            pool: &self.level.allowed_kinds,
            ttl_ms: self.level.ttl_ms(),
            warn_offset_ms: self.level.warn_offset_ms,
            catalog: &self.catalog,
            board: &self.board,
        };
        let Some(encounter) = self
            .scheduler
            .spawn(&mut self.state, &rules, &mut self.rng, now)
        else {
            return;
        };

        self.speech.note_spawn_event(now);
        self.cue(Cue::Intro(encounter.kind));
        self.emit(Event::EncounterSpawned {
            id: encounter.id,
            kind: encounter.kind,
            position: encounter.position,
            level: self.level.id,
            at: Utc::now(),
        });

        let def = self.catalog.get(encounter.kind);
        let place = self.board.describe(encounter.position);
        if def.quiz {
            if self.quiz.has_provider()
                && self
                    .quiz
                    .may_ask(&self.state, self.level.id, self.level.max_questions)
            {
                self.quiz.schedule_prompt(encounter.id, now);
            } else {
                let text = format!(
                    "A {} appears at {place}. No more questions; use bait.",
                    def.name
                );
                self.say(&text, now);
            }
        } else if def.boss {
            let text = format!(
                "The {} appears at {place}, with {} health.",
                def.name, self.state.boss.hp
            );
            self.say(&text, now);
        } else {
            let text = format!("A {} appears at {place}.", def.name);
            self.say(&text, now);
        }
    }

    /// Every level target met.
    pub(super) fn clear_level(&mut self, now: u64) {
        self.state.outcome = SessionOutcome::Cleared;
        self.halt(now);
        info!(level = self.level.id, "level cleared");
        self.speech
            .speak_queued(&format!("Level {} cleared! Well done.", self.level.id), now);
        self.emit(Event::LevelCleared {
            level: self.level.id,
            at: Utc::now(),
        });
    }

    pub(super) fn win(&mut self, now: u64) {
        self.state.outcome = SessionOutcome::Won;
        self.halt(now);
        info!(level = self.level.id, "boss defeated");
        self.speech
            .speak_queued("The cockroach king has fallen. Your home is safe!", now);
        self.emit(Event::SessionWon {
            level: self.level.id,
            at: Utc::now(),
        });
    }

    pub(super) fn lose(&mut self, now: u64) {
        if self.state.outcome == SessionOutcome::Lost {
            return;
        }
        self.state.outcome = SessionOutcome::Lost;
        self.halt(now);
        info!(level = self.level.id, "player lost");
        self.speech
            .speak_queued("You have no strength left. The cockroaches win this time.", now);
        self.emit(Event::SessionLost {
            level: self.level.id,
            at: Utc::now(),
        });
    }

    /// Stop everything that could still fire after the session ended.
    fn halt(&mut self, now: u64) {
        self.scheduler.cancel_spawn();
        self.scheduler.pause(now);
        self.hazards.pause(now);
        self.conductor.cancel();
        self.quiz.cancel_prompt();
        self.quiz.close();
        self.deferred_quiz = None;
        self.intro = None;
        self.adoption_open = false;
    }
}
