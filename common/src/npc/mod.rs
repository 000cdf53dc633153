pub mod engine;
pub mod tuning;

pub use engine::{decide, NpcState};
pub use tuning::{Bias, Difficulty, Profile, Tuning};
