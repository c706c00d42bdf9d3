pub mod config;
pub mod ledger;
pub mod levels;
pub mod play;
pub mod quiz;
