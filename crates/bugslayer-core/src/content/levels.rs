//! Level book: per-level configuration with documented defaults.
//!
//! Every field is optional in the input; a missing field takes its default,
//! so a partial TOML level book is always usable.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::catalog::{AdversaryKind, Weapon};
use crate::board::{PlacementMode, Rect};
use crate::error::ConfigError;

pub const DEFAULT_ESCAPE_AFTER_MS: u64 = 15_000;
pub const DEFAULT_WARN_OFFSET_MS: u64 = 5_000;
pub const DEFAULT_SPAWN_DELAY_MS: u64 = 1_000;
pub const DEFAULT_TICKET_PRICE: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSize {
    pub cols: u32,
    pub rows: u32,
}

impl Default for GridSize {
    fn default() -> Self {
        Self { cols: 3, rows: 3 }
    }
}

/// Resources granted once when a level is first entered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pack {
    pub hp: u32,
    pub coins: u32,
    pub ammo: BTreeMap<Weapon, u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HazardDef {
    /// Static trap: arms when the player steps on it, triggers if they stay.
    Soap {
        #[serde(default = "default_soap_count")]
        count: u32,
        #[serde(default = "default_soap_hp_loss")]
        hp_loss: u32,
        #[serde(default = "default_soap_arm_ms")]
        arm_ms: u64,
        #[serde(default = "default_soap_respawn_ms")]
        respawn_ms: u64,
    },
    /// Dynamic patrol that walks a row back and forth.
    Cart {
        #[serde(default)]
        row: Option<i32>,
    },
}

fn default_soap_count() -> u32 {
    2
}

fn default_soap_hp_loss() -> u32 {
    3
}

fn default_soap_arm_ms() -> u64 {
    2_000
}

fn default_soap_respawn_ms() -> u64 {
    6_000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    pub id: u32,
    pub name: String,
    pub mode: PlacementMode,
    pub grid: GridSize,
    pub allowed_kinds: Vec<AdversaryKind>,
    pub targets: BTreeMap<AdversaryKind, u32>,
    pub hazards: Vec<HazardDef>,
    pub obstacles: Vec<Rect>,
    /// `0` disables the escape countdown.
    pub escape_after_ms: u64,
    pub warn_offset_ms: u64,
    /// Delay before a replacement spawns after an escape.
    pub spawn_delay_ms: u64,
    pub base_ammo: BTreeMap<Weapon, u32>,
    pub pack: Pack,
    pub ticket_price: u32,
    pub max_questions: Option<u32>,
    pub concession_needs_same_cell: bool,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            id: 1,
            name: String::new(),
            mode: PlacementMode::Grid,
            grid: GridSize::default(),
            allowed_kinds: Vec::new(),
            targets: BTreeMap::new(),
            hazards: Vec::new(),
            obstacles: Vec::new(),
            escape_after_ms: DEFAULT_ESCAPE_AFTER_MS,
            warn_offset_ms: DEFAULT_WARN_OFFSET_MS,
            spawn_delay_ms: DEFAULT_SPAWN_DELAY_MS,
            base_ammo: ammo(10, 10, 10, 5),
            pack: Pack::default(),
            ticket_price: DEFAULT_TICKET_PRICE,
            max_questions: None,
            concession_needs_same_cell: true,
        }
    }
}

impl LevelConfig {
    /// Escape countdown for this level, `None` when disabled.
    pub fn ttl_ms(&self) -> Option<u64> {
        (self.escape_after_ms > 0).then_some(self.escape_after_ms)
    }

    pub fn has_quiz_kinds(&self, catalog: &super::Catalog) -> bool {
        self.allowed_kinds.iter().any(|k| catalog.get(*k).quiz)
    }

    /// Spoken target list, e.g. "k1 10, k2 5".
    pub fn targets_text(&self) -> String {
        self.targets
            .iter()
            .map(|(kind, n)| format!("{kind} {n}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn ammo(fire: u32, spray: u32, slipper: u32, bait: u32) -> BTreeMap<Weapon, u32> {
    [
        (Weapon::Fire, fire),
        (Weapon::Spray, spray),
        (Weapon::Slipper, slipper),
        (Weapon::Bait, bait),
    ]
    .into_iter()
    .filter(|(_, n)| *n > 0)
    .collect()
}

fn targets(pairs: &[(AdversaryKind, u32)]) -> BTreeMap<AdversaryKind, u32> {
    pairs.iter().copied().collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LevelBookFile {
    #[serde(default)]
    levels: Vec<LevelConfig>,
}

#[derive(Debug, Clone)]
pub struct LevelBook {
    levels: BTreeMap<u32, LevelConfig>,
}

impl LevelBook {
    pub fn builtin() -> Self {
        use AdversaryKind::*;

        let levels = vec![
            LevelConfig {
                id: 1,
                name: "the storage room".into(),
                mode: PlacementMode::Lane,
                grid: GridSize { cols: 7, rows: 1 },
                allowed_kinds: vec![K1],
                targets: targets(&[(K1, 10)]),
                pack: Pack {
                    hp: 10,
                    coins: 10,
                    ammo: ammo(10, 10, 10, 0),
                },
                spawn_delay_ms: 1_200,
                ..LevelConfig::default()
            },
            LevelConfig {
                id: 2,
                name: "something is crawling on the bed, and it can fly".into(),
                allowed_kinds: vec![K1, K2],
                targets: targets(&[(K1, 7), (K2, 5)]),
                pack: Pack {
                    hp: 10,
                    ..Pack::default()
                },
                ..LevelConfig::default()
            },
            LevelConfig {
                id: 3,
                name: "the bathroom has been taken over".into(),
                grid: GridSize { cols: 6, rows: 3 },
                allowed_kinds: vec![K1, K2, K3],
                targets: targets(&[(K1, 10), (K2, 7), (K3, 3)]),
                hazards: vec![HazardDef::Soap {
                    count: 2,
                    hp_loss: 3,
                    arm_ms: 2_000,
                    respawn_ms: 6_000,
                }],
                pack: Pack {
                    hp: 10,
                    coins: 0,
                    ammo: ammo(0, 0, 0, 5),
                },
                ..LevelConfig::default()
            },
            LevelConfig {
                id: 4,
                name: "the treacherous living room".into(),
                grid: GridSize { cols: 7, rows: 7 },
                allowed_kinds: vec![K1, K2, K3, K4],
                targets: targets(&[(K1, 12), (K2, 10), (K3, 6), (K4, 3)]),
                obstacles: vec![
                    Rect { x1: 2, y1: 2, x2: 4, y2: 3, label: Some("sofa".into()) },
                    Rect { x1: 2, y1: 6, x2: 4, y2: 6, label: Some("tv".into()) },
                ],
                pack: Pack {
                    hp: 10,
                    coins: 0,
                    ammo: ammo(0, 0, 0, 5),
                },
                spawn_delay_ms: 900,
                max_questions: Some(10),
                ..LevelConfig::default()
            },
            LevelConfig {
                id: 5,
                name: "the kitchen is the last line of defence".into(),
                grid: GridSize { cols: 10, rows: 10 },
                allowed_kinds: vec![K1, K2, K3, K4, K5],
                targets: targets(&[(K1, 15), (K2, 10), (K3, 7), (K4, 5)]),
                hazards: vec![HazardDef::Cart { row: None }],
                obstacles: vec![Rect {
                    x1: 3,
                    y1: 4,
                    x2: 6,
                    y2: 5,
                    label: Some("table".into()),
                }],
                pack: Pack {
                    hp: 10,
                    coins: 0,
                    ammo: ammo(0, 0, 0, 5),
                },
                spawn_delay_ms: 900,
                max_questions: Some(10),
                ..LevelConfig::default()
            },
        ];

        Self::from_levels(levels)
    }

    fn from_levels(levels: Vec<LevelConfig>) -> Self {
        Self {
            levels: levels.into_iter().map(|l| (l.id, l)).collect(),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: LevelBookFile = toml::from_str(content)?;
        if file.levels.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "levels".into(),
                message: "level book contains no levels".into(),
            });
        }
        Ok(Self::from_levels(file.levels))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Owned copy of a level. Unknown ids fall back to level 1, then to the
    /// first level in the book.
    pub fn get(&self, id: u32) -> LevelConfig {
        self.levels
            .get(&id)
            .or_else(|| self.levels.get(&1))
            .or_else(|| self.levels.values().next())
            .cloned()
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LevelConfig> {
        self.levels.values()
    }
}

impl Default for LevelBook {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_book_has_five_levels() {
        let book = LevelBook::builtin();
        assert_eq!(book.iter().count(), 5);
        assert_eq!(book.get(1).mode, PlacementMode::Lane);
        assert_eq!(book.get(4).max_questions, Some(10));
        assert_eq!(book.get(5).obstacles.len(), 1);
    }

    #[test]
    fn unknown_level_falls_back_to_first() {
        let book = LevelBook::builtin();
        assert_eq!(book.get(42).id, 1);
    }

    #[test]
    fn partial_toml_level_takes_defaults() {
        let book = LevelBook::from_toml_str(
            r#"
            [[levels]]
            id = 9
            name = "attic"
            allowed_kinds = ["k1"]
            targets = { k1 = 2 }
            "#,
        )
        .unwrap();
        let level = book.get(9);
        assert_eq!(level.name, "attic");
        assert_eq!(level.grid, GridSize { cols: 3, rows: 3 });
        assert_eq!(level.escape_after_ms, DEFAULT_ESCAPE_AFTER_MS);
        assert_eq!(level.warn_offset_ms, DEFAULT_WARN_OFFSET_MS);
        assert_eq!(level.ticket_price, DEFAULT_TICKET_PRICE);
        assert_eq!(level.targets.get(&AdversaryKind::K1), Some(&2));
        assert!(level.concession_needs_same_cell);
    }

    #[test]
    fn zero_escape_disables_ttl() {
        let level = LevelConfig {
            escape_after_ms: 0,
            ..LevelConfig::default()
        };
        assert_eq!(level.ttl_ms(), None);
        assert_eq!(LevelConfig::default().ttl_ms(), Some(15_000));
    }

    #[test]
    fn hazards_parse_with_defaults() {
        let book = LevelBook::from_toml_str(
            r#"
            [[levels]]
            id = 3
            hazards = [{ type = "soap" }, { type = "cart", row = 2 }]
            "#,
        )
        .unwrap();
        let level = book.get(3);
        assert_eq!(
            level.hazards,
            vec![
                HazardDef::Soap { count: 2, hp_loss: 3, arm_ms: 2_000, respawn_ms: 6_000 },
                HazardDef::Cart { row: Some(2) },
            ]
        );
    }

    #[test]
    fn empty_book_is_rejected() {
        assert!(LevelBook::from_toml_str("").is_err());
    }
}
