//! Static game content: adversaries, weapons and levels.

pub mod catalog;
pub mod levels;

pub use catalog::{
    AdversaryDef, AdversaryKind, Catalog, Damage, Reward, Weapon, BOSS_BASE_HP, CAT_ADOPT_COST,
    CAT_HIT, MAX_AMMO,
};
pub use levels::{GridSize, HazardDef, LevelBook, LevelConfig, Pack};
