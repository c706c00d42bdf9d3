//! TOML-based application configuration.
//!
//! Stores host preferences including:
//! - Default player name
//! - Narration and spawn-orchestration timings
//! - Gate watchdog and hazard patrol intervals
//! - The sound cue library
//! - Question bank and level book locations
//!
//! Configuration is stored at `~/.config/bugslayer/config.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::audio::AudioConfig;
use crate::content::LevelBook;
use crate::error::ConfigError;
use crate::quiz::{builtin_bank, load_bank, Question, QuizConfig};
use crate::session::DEFAULT_PLAYER_NAME;
use crate::speech::{ConductorTimings, SpeechTimings};
use crate::timer::{GateTimings, HazardTimings};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Name used when the ledger has none.
    pub name: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_PLAYER_NAME.into(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// TOML level book replacing the built-in levels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub levels_file: Option<PathBuf>,
    pub player: PlayerConfig,
    pub speech: SpeechTimings,
    pub conductor: ConductorTimings,
    pub gate: GateTimings,
    pub hazards: HazardTimings,
    pub audio: AudioConfig,
    pub quiz: QuizConfig,
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        if key.is_empty() {
            return Err(invalid("config key is empty".into()));
        }

        let mut parts = key.split('.').peekable();
        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_some() {
                current = current
                    .get_mut(part)
                    .ok_or_else(|| invalid("unknown config key".into()))?;
                continue;
            }

            let obj = current
                .as_object_mut()
                .ok_or_else(|| invalid("unknown config key".into()))?;
            // Optional paths serialize as null or are absent entirely.
            let existing = obj.get(part).cloned().unwrap_or(serde_json::Value::Null);
            if existing.is_null() && !Self::is_optional_key(key) {
                return Err(invalid("unknown config key".into()));
            }

            let new_value = match existing {
                serde_json::Value::Bool(_) => serde_json::Value::Bool(
                    value
                        .parse::<bool>()
                        .map_err(|e| invalid(e.to_string()))?,
                ),
                serde_json::Value::Number(_) => {
                    let n = value
                        .parse::<u64>()
                        .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?;
                    serde_json::Value::Number(n.into())
                }
                serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                    serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                }
                _ => serde_json::Value::String(value.into()),
            };

            obj.insert(part.to_string(), new_value);
            return Ok(());
        }

        Err(invalid("unknown config key".into()))
    }

    fn is_optional_key(key: &str) -> bool {
        matches!(key, "levels_file" | "quiz.bank_path") || key.starts_with("audio.library.")
    }

    fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("config.toml"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from the data directory, writing defaults when the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from an explicit path, writing defaults when the file is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Update a value in memory without saving.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not fit its type.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self)
            .map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Set a config value by key and persist. Returns error if key is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.apply(key, value)?;
        self.save()
    }

    /// Every leaf key with its current value, sorted by key.
    pub fn list(&self) -> Vec<(String, String)> {
        fn walk(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
            match value {
                serde_json::Value::Object(map) => {
                    for (k, v) in map {
                        let key = if prefix.is_empty() {
                            k.clone()
                        } else {
                            format!("{prefix}.{k}")
                        };
                        walk(&key, v, out);
                    }
                }
                serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
                serde_json::Value::Null => {}
                other => out.push((prefix.to_string(), other.to_string())),
            }
        }

        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            walk("", &json, &mut out);
        }
        out.sort();
        out
    }

    /// The configured level book, or the built-in one.
    pub fn level_book(&self) -> Result<LevelBook, ConfigError> {
        match &self.levels_file {
            Some(path) => LevelBook::load(path),
            None => Ok(LevelBook::builtin()),
        }
    }

    /// The configured question bank, or the built-in one.
    pub fn question_bank(&self) -> Result<Vec<Question>, ConfigError> {
        match &self.quiz.bank_path {
            Some(path) => load_bank(path),
            None => Ok(builtin_bank()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
        assert_eq!(parsed.gate.watchdog_ms, 3_000);
        assert_eq!(parsed.hazards.patrol_interval_ms, 580);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str("[speech]\ncooldown_ms = 900\n").unwrap();
        assert_eq!(parsed.speech.cooldown_ms, 900);
        assert_eq!(parsed.speech.ceiling_ms, 12_000);
        assert_eq!(parsed.player.name, DEFAULT_PLAYER_NAME);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("speech.interrupt").as_deref(), Some("true"));
        assert_eq!(cfg.get("quiz.key_prefix").as_deref(), Some("k4"));
        assert_eq!(cfg.get("nope.nothing"), None);
        assert_eq!(cfg.get(""), None);
    }

    #[test]
    fn apply_updates_typed_values() {
        let mut cfg = Config::default();
        cfg.apply("conductor.quiet_ms", "450").unwrap();
        cfg.apply("speech.interrupt", "false").unwrap();
        cfg.apply("player.name", "Ada").unwrap();
        assert_eq!(cfg.conductor.quiet_ms, 450);
        assert!(!cfg.speech.interrupt);
        assert_eq!(cfg.player.name, "Ada");
    }

    #[test]
    fn apply_accepts_optional_paths() {
        let mut cfg = Config::default();
        cfg.apply("levels_file", "/tmp/levels.toml").unwrap();
        assert_eq!(cfg.levels_file, Some(PathBuf::from("/tmp/levels.toml")));
        cfg.apply("audio.library.hit", "custom/hit.ogg").unwrap();
        assert_eq!(cfg.audio.library["hit"], "custom/hit.ogg");
    }

    #[test]
    fn apply_rejects_unknown_key() {
        let mut cfg = Config::default();
        let err = cfg.apply("speech.volume", "3").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn apply_rejects_invalid_type() {
        let mut cfg = Config::default();
        assert!(cfg.apply("gate.watchdog_ms", "soon").is_err());
        assert!(cfg.apply("speech.interrupt", "maybe").is_err());
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn list_is_sorted_and_flat() {
        let list = Config::default().list();
        let keys: Vec<&str> = list.iter().map(|(k, _)| k.as_str()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert!(keys.contains(&"gate.watchdog_ms"));
        assert!(!keys.contains(&"levels_file"));
    }

    #[test]
    fn load_from_writes_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(path.exists());

        std::fs::write(&path, "[gate]\nwatchdog_ms = 5000\n").unwrap();
        assert_eq!(Config::load_from(&path).unwrap().gate.watchdog_ms, 5_000);
    }

    #[test]
    fn broken_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[gate\n").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::ParseFailed(_))
        ));
    }
}
