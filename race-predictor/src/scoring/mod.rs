// Scoring: answer keys, normalization, input tables, and the points engine.

pub mod engine;
pub mod event;
pub mod guesses;
pub mod normalize;

pub use engine::{score_all, ScoredEntry, ScoringError};
