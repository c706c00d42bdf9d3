//! # Bug Slayer Core Library
//!
//! Game logic for Bug Slayer, an audio-first grid game where the player
//! hunts cockroaches through a house by ear. Every host (the terminal CLI,
//! a browser shell, a test) drives the same engine.
//!
//! ## Architecture
//!
//! - **Engine**: a tick-driven facade. The host calls `tick()` periodically
//!   and forwards player input; nothing in the core owns a thread.
//! - **Timers**: the encounter scheduler, the resolution gate and the hazard
//!   ticker, all pausable and keyed by encounter id.
//! - **Speech**: one arbiter for every utterance, a merge announcer for
//!   passive status text and a conductor that holds replacement spawns until
//!   the channel is quiet.
//! - **Storage**: SQLite-backed ledger and TOML-based configuration.
//!
//! ## Key Components
//!
//! - [`Engine`]: the facade hosts talk to
//! - [`EncounterScheduler`]: spawn, warn and escape countdowns
//! - [`ResolutionGate`]: single-holder lock around resolving an encounter
//! - [`SpeechArbiter`]: narration ownership and completion
//! - [`Config`]: application configuration management

pub mod audio;
pub mod board;
pub mod clock;
pub mod content;
pub mod engine;
pub mod error;
pub mod events;
pub mod quiz;
pub mod session;
pub mod speech;
pub mod storage;
pub mod timer;

pub use audio::{AudioConfig, Cue, CueBoard, CuePlayer, LogCuePlayer, RecordingCuePlayer};
pub use board::{Board, Cell, PlacementMode, Rect, Step};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use content::{AdversaryDef, AdversaryKind, Catalog, LevelBook, LevelConfig, Weapon};
pub use engine::{Admission, BossAction, Engine, EngineBuilder};
pub use error::{ConfigError, CoreError, QuizError, StorageError};
pub use events::Event;
pub use quiz::{ManualQuiz, Question, QuizOutcome, QuizProvider};
pub use session::{Encounter, EncounterId, Player, Resolution, SessionOutcome, SessionState};
pub use speech::{LogNarrator, NarrationEnd, Narrator, RecordingNarrator, SpeechArbiter};
pub use storage::{Config, Database, LedgerStore, MemoryLedger, SqliteLedger};
pub use timer::{EncounterHook, EncounterScheduler, PauseReason, ResolutionGate};
