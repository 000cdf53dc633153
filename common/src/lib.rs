pub mod grid;
pub mod id_generator;
pub mod identifiers;
pub mod logger;
pub mod npc;
pub mod powerup;
pub mod rng;
pub mod simulation;
pub mod watchdog;

pub use identifiers::*;
