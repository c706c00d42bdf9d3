//! Engine facade.
//!
//! Wires every component together and exposes the input actions a host
//! drives. Like the rest of the crate it is tick-driven: the host calls
//! [`Engine::tick`] periodically (every 50 ms is plenty) and feeds player
//! input through the action methods in between.
//!
//! ## Tick order
//!
//! ```text
//! narration poll -> gate watchdog -> settle held resolution -> intro
//!   -> quiz prompt / outcome -> spawn conductor -> scheduler fires
//!   -> hazard ticker -> persistence
//! ```
//!
//! ## Resolutions
//!
//! A resolution enters the gate, applies every mutation at once, retires
//! the encounter if it ended, then narrates. The gate stays held until that
//! narration settles, so a second attack during it is turned away as
//! [`Admission::Busy`]. The replacement spawn is held by the
//! [`SpawnConductor`] until the speech channel goes quiet.

mod actions;
mod lifecycle;
mod resolution;

use std::sync::Arc;

use chrono::Utc;
use rand::SeedableRng;
use rand_pcg::Pcg64;
use tracing::{info, warn};

pub use resolution::BossAction;

use crate::audio::{Cue, CueBoard, CuePlayer, LogCuePlayer};
use crate::board::Board;
use crate::clock::{Clock, MonotonicClock};
use crate::content::{AdversaryKind, Catalog, LevelConfig};
use crate::error::{ConfigError, Result};
use crate::events::Event;
use crate::quiz::{QuizDesk, QuizOutcome, QuizProvider};
use crate::session::{EncounterId, Player, SessionOutcome, SessionState, STARTING_HP};
use crate::speech::{LogNarrator, NarrationTicket, Narrator, SpawnConductor, SpeechArbiter};
use crate::storage::{Config, LedgerStore, MemoryLedger};
use crate::timer::{
    EncounterHook, EncounterScheduler, GatePass, HazardTicker, PauseReason, PauseSet,
    ResolutionGate,
};

/// Answer to a player action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The action ran. Its result, good or bad, was narrated.
    Accepted,
    /// Another resolution or a dialog is in progress. Nothing changed.
    Busy,
    /// The session is over. Nothing changed.
    Halted,
    /// There was nothing for the action to act on. Nothing changed.
    Ignored,
}

/// A resolution whose narration is still playing. Dropping the pass
/// without releasing it is fine: the watchdog frees the gate.
struct Held {
    pass: GatePass,
    ticket: NarrationTicket,
}

pub struct EngineBuilder {
    level: LevelConfig,
    config: Config,
    catalog: Catalog,
    clock: Option<Arc<dyn Clock>>,
    narrator: Option<Box<dyn Narrator>>,
    cue_player: Option<Box<dyn CuePlayer>>,
    quiz: Option<Box<dyn QuizProvider>>,
    ledger: Option<Box<dyn LedgerStore>>,
    hooks: Vec<Box<dyn EncounterHook>>,
    seed: Option<u64>,
}

impl EngineBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn narrator(mut self, narrator: Box<dyn Narrator>) -> Self {
        self.narrator = Some(narrator);
        self
    }

    pub fn cue_player(mut self, player: Box<dyn CuePlayer>) -> Self {
        self.cue_player = Some(player);
        self
    }

    pub fn quiz(mut self, provider: Box<dyn QuizProvider>) -> Self {
        self.quiz = Some(provider);
        self
    }

    pub fn ledger(mut self, ledger: Box<dyn LedgerStore>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn hook(mut self, hook: Box<dyn EncounterHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Fix the RNG seed for reproducible placement.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::MissingQuizProvider`] when the level spawns quiz
    /// adversaries and no provider was supplied.
    pub fn build(self) -> Result<Engine> {
        let EngineBuilder {
            level,
            config,
            catalog,
            clock,
            narrator,
            cue_player,
            quiz,
            ledger,
            hooks,
            seed,
        } = self;

        if quiz.is_none() && level.has_quiz_kinds(&catalog) {
            return Err(ConfigError::MissingQuizProvider { level: level.id }.into());
        }

        let ledger = ledger.unwrap_or_else(|| Box::new(MemoryLedger::new()));
        let mut player = match ledger.load_player() {
            Ok(Some(player)) => player,
            Ok(None) => Player::named(config.player.name.clone()),
            Err(e) => {
                warn!(error = %e, "could not read player ledger; starting fresh");
                Player::named(config.player.name.clone())
            }
        };
        if player.hp == 0 {
            info!(name = %player.name, "player was out of health; restoring for a retry");
            player.hp = STARTING_HP;
        }

        let board = Board::new(
            level.mode,
            level.grid.cols,
            level.grid.rows,
            level.obstacles.clone(),
        );
        let mut state = SessionState::new(level.id, player, board.start_cell());
        match ledger.used_question_keys() {
            Ok(keys) => state.used_questions = keys,
            Err(e) => warn!(error = %e, "could not read used question log"),
        }
        // Reaching the threshold in an earlier session is not news.
        state.boss.recall_announced = state.recall_ready();

        let seed = seed.unwrap_or_else(rand::random);
        info!(level = level.id, name = %level.name, seed, "engine ready");

        Ok(Engine {
            clock: clock.unwrap_or_else(|| Arc::new(MonotonicClock::new())),
            rng: Pcg64::seed_from_u64(seed),
            scheduler: EncounterScheduler::new(hooks),
            hazards: HazardTicker::new(config.hazards),
            gate: ResolutionGate::new(config.gate),
            speech: SpeechArbiter::new(
                narrator.unwrap_or_else(|| Box::new(LogNarrator)),
                config.speech,
            ),
            conductor: SpawnConductor::new(config.conductor),
            cues: CueBoard::new(
                cue_player.unwrap_or_else(|| Box::new(LogCuePlayer)),
                &config.audio,
            ),
            quiz: QuizDesk::new(quiz, config.quiz.clone()),
            ledger,
            config,
            level,
            catalog,
            board,
            state,
            pauses: PauseSet::default(),
            events: Vec::new(),
            held: None,
            intro: None,
            deferred_quiz: None,
            started: false,
            adoption_open: false,
            used_dirty: false,
        })
    }
}

pub struct Engine {
    clock: Arc<dyn Clock>,
    rng: Pcg64,
    config: Config,
    level: LevelConfig,
    catalog: Catalog,
    board: Board,
    state: SessionState,
    scheduler: EncounterScheduler,
    hazards: HazardTicker,
    gate: ResolutionGate,
    speech: SpeechArbiter,
    conductor: SpawnConductor,
    cues: CueBoard,
    quiz: QuizDesk,
    ledger: Box<dyn LedgerStore>,
    pauses: PauseSet,
    events: Vec<Event>,
    held: Option<Held>,
    intro: Option<NarrationTicket>,
    deferred_quiz: Option<(EncounterId, QuizOutcome)>,
    started: bool,
    adoption_open: bool,
    used_dirty: bool,
}

impl Engine {
    pub fn builder(level: LevelConfig) -> EngineBuilder {
        EngineBuilder {
            level,
            config: Config::default(),
            catalog: Catalog::builtin(),
            clock: None,
            narrator: None,
            cue_player: None,
            quiz: None,
            ledger: None,
            hooks: Vec::new(),
            seed: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn level(&self) -> &LevelConfig {
        &self.level
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn outcome(&self) -> SessionOutcome {
        self.state.outcome
    }

    pub fn is_over(&self) -> bool {
        self.state.is_over()
    }

    pub fn is_paused(&self) -> bool {
        !self.pauses.is_empty()
    }

    pub fn is_paused_for(&self, reason: PauseReason) -> bool {
        self.pauses.contains(reason)
    }

    pub fn gate_held(&self) -> bool {
        self.gate.is_held()
    }

    pub fn quiz_open(&self) -> bool {
        self.quiz.is_open()
    }

    pub fn adoption_open(&self) -> bool {
        self.adoption_open
    }

    pub fn spawn_on_hold(&self) -> bool {
        self.conductor.is_holding()
    }

    pub fn speech_busy(&self) -> bool {
        self.speech.is_busy()
    }

    pub fn remaining_ttl_ms(&self) -> Option<u64> {
        self.scheduler.remaining_ttl_ms(self.now_ms())
    }

    pub fn remaining_warn_ms(&self) -> Option<u64> {
        self.scheduler.remaining_warn_ms(self.now_ms())
    }

    pub fn next_spawn_in_ms(&self) -> Option<u64> {
        self.scheduler.next_spawn_in_ms(self.now_ms())
    }

    /// Take every event produced since the last call.
    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    // ── Shared plumbing ──────────────────────────────────────────────

    fn emit(&mut self, event: Event) {
        info!(event = event.name(), "engine event");
        self.events.push(event);
    }

    fn say(&mut self, text: &str, now_ms: u64) {
        self.speech.speak(text, now_ms);
    }

    fn cue(&mut self, cue: Cue) {
        self.cues.play(cue, self.state.user_interacted);
    }

    fn name_of(&self, kind: AdversaryKind) -> String {
        self.catalog.get(kind).name.clone()
    }

    /// Gate pass stays taken until `ticket` settles. The narration ceiling
    /// settles every ticket, so the watchdog window covers it.
    fn hold(&mut self, pass: GatePass, ticket: NarrationTicket) {
        self.gate.extend(&pass, self.speech.timings().ceiling_ms);
        self.held = Some(Held { pass, ticket });
    }

    fn pause_timers(&mut self, reason: PauseReason, now_ms: u64) {
        if !self.pauses.add(reason) {
            return;
        }
        self.scheduler.pause(now_ms);
        self.hazards.pause(now_ms);
        self.state.paused = true;
        self.emit(Event::TimersPaused {
            reason,
            at: Utc::now(),
        });
    }

    /// No-op once the session is over: halted timers stay stopped.
    fn resume_timers(&mut self, reason: PauseReason, now_ms: u64) {
        if self.state.is_over() || !self.pauses.remove(reason) {
            return;
        }
        self.scheduler.resume(now_ms, &mut self.state);
        self.hazards.resume(now_ms);
        self.state.paused = false;
        self.emit(Event::TimersResumed { at: Utc::now() });
    }

    /// Checks shared by every player action.
    fn refuse(&self) -> Option<Admission> {
        if self.state.is_over() {
            return Some(Admission::Halted);
        }
        if self.pauses.contains(PauseReason::Modal)
            || self.pauses.contains(PauseReason::Dialog)
        {
            return Some(Admission::Busy);
        }
        None
    }

    /// Write the ledger if anything changed. Failures are logged, never
    /// surfaced: a session keeps running on a read-only disk.
    fn persist(&mut self) {
        if self.state.ledger_dirty {
            self.state.ledger_dirty = false;
            if let Err(e) = self.ledger.save_player(&self.state.player) {
                warn!(error = %e, "failed to save player ledger");
            }
        }
        if self.used_dirty {
            self.used_dirty = false;
            if let Err(e) = self.ledger.save_used_question_keys(&self.state.used_questions) {
                warn!(error = %e, "failed to save used question log");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::content::{AdversaryKind, LevelBook};
    use crate::error::CoreError;
    use crate::quiz::{builtin_bank, ManualQuiz};
    use crate::speech::RecordingNarrator;

    #[test]
    fn quiz_levels_need_a_provider() {
        let level = LevelBook::builtin().get(4);
        assert!(level.allowed_kinds.contains(&AdversaryKind::K4));
        match Engine::builder(level.clone()).build() {
            Err(CoreError::Config(ConfigError::MissingQuizProvider { level: 4 })) => {}
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("built without a quiz provider"),
        }

        let quiz = ManualQuiz::new(builtin_bank(), Default::default());
        assert!(Engine::builder(level).quiz(Box::new(quiz)).build().is_ok());
    }

    #[test]
    fn saved_player_is_loaded_and_revived() {
        let mut saved = Player::named("Eve");
        saved.hp = 0;
        saved.coins = 33;
        let ledger = MemoryLedger::with_player(saved);
        let engine = Engine::builder(LevelBook::builtin().get(1))
            .ledger(Box::new(ledger))
            .clock(Arc::new(ManualClock::new(0)))
            .narrator(Box::new(RecordingNarrator::new()))
            .seed(1)
            .build()
            .unwrap();
        assert_eq!(engine.state().player.name, "Eve");
        assert_eq!(engine.state().player.coins, 33);
        assert_eq!(engine.state().player.hp, STARTING_HP);
    }

    #[test]
    fn fresh_player_takes_the_configured_name() {
        let mut config = Config::default();
        config.player.name = "Zed".into();
        let engine = Engine::builder(LevelBook::builtin().get(1))
            .config(config)
            .seed(1)
            .build()
            .unwrap();
        assert_eq!(engine.state().player.name, "Zed");
        assert_eq!(engine.outcome(), SessionOutcome::Playing);
    }
}
