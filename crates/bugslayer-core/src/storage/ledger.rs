//! Persisted ledger: the player record, the used-question log and the
//! per-level pack flags.
//!
//! The engine talks to [`LedgerStore`]; hosts pick [`SqliteLedger`] for real
//! sessions and [`MemoryLedger`] for tests and throwaway runs.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use tracing::warn;

use super::database::Database;
use crate::error::StorageError;
use crate::session::Player;

pub const PLAYER_KEY: &str = "player_ledger";
pub const USED_QUESTIONS_KEY: &str = "used_question_keys";
pub const PACK_LEVELS_KEY: &str = "pack_applied_levels";

pub trait LedgerStore {
    /// `None` when nothing was saved yet. Damaged fields are defaulted one by one.
    fn load_player(&self) -> Result<Option<Player>, StorageError>;

    fn save_player(&self, player: &Player) -> Result<(), StorageError>;

    fn used_question_keys(&self) -> Result<BTreeSet<String>, StorageError>;

    fn save_used_question_keys(&self, keys: &BTreeSet<String>) -> Result<(), StorageError>;

    fn pack_applied(&self, level: u32) -> Result<bool, StorageError>;

    fn mark_pack_applied(&self, level: u32) -> Result<(), StorageError>;
}

pub struct SqliteLedger {
    db: Database,
}

impl SqliteLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Ledger in the default data directory.
    pub fn open() -> Result<Self, StorageError> {
        Ok(Self::new(Database::open()?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Forget the player record and every pack flag.
    pub fn reset_player(&self) -> Result<(), StorageError> {
        self.db.kv_delete(PLAYER_KEY)?;
        self.db.kv_delete(PACK_LEVELS_KEY)?;
        Ok(())
    }

    /// Explicit operator reset of the vote ledger. Returns `false` when
    /// there is no saved player.
    pub fn reset_votes(&self) -> Result<bool, StorageError> {
        let Some(mut player) = self.load_player()? else {
            return Ok(false);
        };
        player.votes = 0;
        player.vote_bought.clear();
        self.save_player(&player)?;
        Ok(true)
    }

    pub fn clear_used_question_keys(&self) -> Result<usize, StorageError> {
        let n = self.used_question_keys()?.len();
        self.db.kv_delete(USED_QUESTIONS_KEY)?;
        Ok(n)
    }

    fn json_array(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError> {
        let Some(raw) = self.db.kv_get(key)? else {
            return Ok(None);
        };
        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(value @ serde_json::Value::Array(_)) => Ok(Some(value)),
            Ok(_) | Err(_) => {
                warn!(key, "ignoring malformed stored value");
                Ok(None)
            }
        }
    }

    fn put_json(&self, key: &str, value: &serde_json::Value) -> Result<(), StorageError> {
        self.db.kv_set(key, &value.to_string())?;
        Ok(())
    }
}

impl LedgerStore for SqliteLedger {
    fn load_player(&self) -> Result<Option<Player>, StorageError> {
        let Some(raw) = self.db.kv_get(PLAYER_KEY)? else {
            return Ok(None);
        };
        let value = serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "player ledger is not valid JSON; using defaults");
            serde_json::Value::Null
        });
        Ok(Some(Player::from_json_lenient(&value)))
    }

    fn save_player(&self, player: &Player) -> Result<(), StorageError> {
        let value =
            serde_json::to_value(player).map_err(|e| StorageError::QueryFailed(e.to_string()))?;
        self.put_json(PLAYER_KEY, &value)
    }

    fn used_question_keys(&self) -> Result<BTreeSet<String>, StorageError> {
        let Some(value) = self.json_array(USED_QUESTIONS_KEY)? else {
            return Ok(BTreeSet::new());
        };
        Ok(value
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect())
    }

    fn save_used_question_keys(&self, keys: &BTreeSet<String>) -> Result<(), StorageError> {
        self.put_json(USED_QUESTIONS_KEY, &serde_json::json!(keys))
    }

    fn pack_applied(&self, level: u32) -> Result<bool, StorageError> {
        let Some(value) = self.json_array(PACK_LEVELS_KEY)? else {
            return Ok(false);
        };
        Ok(value
            .as_array()
            .into_iter()
            .flatten()
            .any(|v| v.as_u64() == Some(u64::from(level))))
    }

    fn mark_pack_applied(&self, level: u32) -> Result<(), StorageError> {
        let mut levels: BTreeSet<u64> = self
            .json_array(PACK_LEVELS_KEY)?
            .as_ref()
            .and_then(serde_json::Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(serde_json::Value::as_u64)
            .collect();
        levels.insert(u64::from(level));
        self.put_json(PACK_LEVELS_KEY, &serde_json::json!(levels))
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    player: Option<Player>,
    used: BTreeSet<String>,
    packs: BTreeSet<u32>,
    saves: usize,
    fail_writes: bool,
}

/// In-memory ledger. Cloned handles share the same contents.
#[derive(Debug, Default, Clone)]
pub struct MemoryLedger {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_player(player: Player) -> Self {
        let ledger = Self::default();
        ledger.lock().player = Some(player);
        ledger
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn player(&self) -> Option<Player> {
        self.lock().player.clone()
    }

    /// Number of successful player saves.
    pub fn save_count(&self) -> usize {
        self.lock().saves
    }

    pub fn used(&self) -> BTreeSet<String> {
        self.lock().used.clone()
    }

    /// Make every write fail, to exercise error paths.
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    fn check_writable(inner: &MemoryInner) -> Result<(), StorageError> {
        if inner.fail_writes {
            return Err(StorageError::QueryFailed("memory ledger is read-only".into()));
        }
        Ok(())
    }
}

impl LedgerStore for MemoryLedger {
    fn load_player(&self) -> Result<Option<Player>, StorageError> {
        Ok(self.lock().player.clone())
    }

    fn save_player(&self, player: &Player) -> Result<(), StorageError> {
        let mut inner = self.lock();
        Self::check_writable(&inner)?;
        inner.player = Some(player.clone());
        inner.saves += 1;
        Ok(())
    }

    fn used_question_keys(&self) -> Result<BTreeSet<String>, StorageError> {
        Ok(self.lock().used.clone())
    }

    fn save_used_question_keys(&self, keys: &BTreeSet<String>) -> Result<(), StorageError> {
        let mut inner = self.lock();
        Self::check_writable(&inner)?;
        inner.used = keys.clone();
        Ok(())
    }

    fn pack_applied(&self, level: u32) -> Result<bool, StorageError> {
        Ok(self.lock().packs.contains(&level))
    }

    fn mark_pack_applied(&self, level: u32) -> Result<(), StorageError> {
        let mut inner = self.lock();
        Self::check_writable(&inner)?;
        inner.packs.insert(level);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{AdversaryKind, Weapon};

    fn ledger() -> SqliteLedger {
        SqliteLedger::new(Database::open_memory().unwrap())
    }

    #[test]
    fn player_roundtrip_uses_flat_shape() {
        let ledger = ledger();
        assert!(ledger.load_player().unwrap().is_none());

        let mut player = Player::named("Ada");
        player.weapon_usage.insert(Weapon::Fire, 7);
        player.vote_bought.insert(AdversaryKind::K2, 3);
        ledger.save_player(&player).unwrap();

        let raw = ledger.database().kv_get(PLAYER_KEY).unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["weaponUsage"]["fire"], 7);
        assert_eq!(json["voteBought"]["k2"], 3);
        assert_eq!(ledger.load_player().unwrap(), Some(player));
    }

    #[test]
    fn damaged_player_record_is_defaulted() {
        let ledger = ledger();
        ledger
            .database()
            .kv_set(PLAYER_KEY, r#"{"name":"Bo","hp":"lots","coins":4}"#)
            .unwrap();
        let player = ledger.load_player().unwrap().unwrap();
        assert_eq!(player.name, "Bo");
        assert_eq!(player.hp, Player::default().hp);
        assert_eq!(player.coins, 4);

        ledger.database().kv_set(PLAYER_KEY, "{not json").unwrap();
        assert_eq!(ledger.load_player().unwrap(), Some(Player::default()));
    }

    #[test]
    fn pack_flags_are_per_level() {
        let ledger = ledger();
        assert!(!ledger.pack_applied(2).unwrap());
        ledger.mark_pack_applied(2).unwrap();
        ledger.mark_pack_applied(2).unwrap();
        assert!(ledger.pack_applied(2).unwrap());
        assert!(!ledger.pack_applied(3).unwrap());
    }

    #[test]
    fn used_keys_persist_and_clear() {
        let ledger = ledger();
        let keys: BTreeSet<String> = ["k4:legs", "k4:bins"].iter().map(|s| s.to_string()).collect();
        ledger.save_used_question_keys(&keys).unwrap();
        assert_eq!(ledger.used_question_keys().unwrap(), keys);
        assert_eq!(ledger.clear_used_question_keys().unwrap(), 2);
        assert!(ledger.used_question_keys().unwrap().is_empty());
    }

    #[test]
    fn reset_votes_keeps_everything_else() {
        let ledger = ledger();
        assert!(!ledger.reset_votes().unwrap());
        let mut player = Player::named("Cy");
        player.votes = 9;
        player.coins = 42;
        player.vote_bought.insert(AdversaryKind::K1, 20);
        ledger.save_player(&player).unwrap();

        assert!(ledger.reset_votes().unwrap());
        let after = ledger.load_player().unwrap().unwrap();
        assert_eq!(after.votes, 0);
        assert!(after.vote_bought.is_empty());
        assert_eq!(after.coins, 42);
    }

    #[test]
    fn memory_ledger_handles_share_state() {
        let ledger = MemoryLedger::new();
        let handle = ledger.clone();
        ledger.save_player(&Player::named("Di")).unwrap();
        assert_eq!(handle.player().unwrap().name, "Di");
        assert_eq!(handle.save_count(), 1);

        handle.fail_writes(true);
        assert!(ledger.save_player(&Player::default()).is_err());
        assert_eq!(handle.save_count(), 1);
    }
}
