// Lucky-draw state and winner selection.
//
// Each prize category moves through Empty / SinglePool / MultiPool / Resolved.
// Only `trigger` and `settle_single` mutate the DrawState, and a category that
// already has a winner is never re-rolled.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// How a winner was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawMethod {
    /// Uniform random pick from a pool of two or more.
    Random,
    /// The pool held exactly one participant.
    Single,
}

impl DrawMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrawMethod::Random => "random",
            DrawMethod::Single => "single",
        }
    }

    pub fn from_str_method(s: &str) -> Option<Self> {
        match s {
            "random" => Some(DrawMethod::Random),
            "single" => Some(DrawMethod::Single),
            _ => None,
        }
    }
}

/// A settled draw for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawRecord {
    pub category: String,
    pub winner: String,
    /// The eligible pool at the moment of the draw.
    pub pool: Vec<String>,
    pub method: DrawMethod,
    pub drawn_at: DateTime<Utc>,
}

/// Draw results for the current session.
///
/// `winners` holds the current run's declared winners and is cleared by
/// `begin_run`. `all_time_winners` keeps every participant ever drawn in the
/// session and only `reset` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawState {
    winners: BTreeMap<String, DrawRecord>,
    all_time_winners: BTreeSet<String>,
}

impl DrawState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild state from persisted records.
    pub fn restore(records: Vec<DrawRecord>, all_time_winners: impl IntoIterator<Item = String>) -> Self {
        let mut all_time: BTreeSet<String> = all_time_winners.into_iter().collect();
        let mut winners = BTreeMap::new();
        for record in records {
            all_time.insert(record.winner.clone());
            winners.insert(record.category.clone(), record);
        }
        DrawState {
            winners,
            all_time_winners: all_time,
        }
    }

    pub fn winner(&self, category: &str) -> Option<&str> {
        self.winners.get(category).map(|r| r.winner.as_str())
    }

    pub fn record(&self, category: &str) -> Option<&DrawRecord> {
        self.winners.get(category)
    }

    /// Current-run winners keyed by category.
    pub fn winners(&self) -> impl Iterator<Item = &DrawRecord> {
        self.winners.values()
    }

    pub fn all_time_winners(&self) -> &BTreeSet<String> {
        &self.all_time_winners
    }

    pub fn has_won(&self, name: &str) -> bool {
        self.all_time_winners.contains(name)
    }

    /// Start a fresh scoring run: forget this run's winners but keep the
    /// all-time exclusion list.
    pub fn begin_run(&mut self) {
        if !self.winners.is_empty() {
            debug!("clearing {} run winners for a fresh scoring run", self.winners.len());
        }
        self.winners.clear();
    }

    /// End the session: forget everything.
    pub fn reset(&mut self) {
        self.winners.clear();
        self.all_time_winners.clear();
    }

    fn settle(&mut self, record: DrawRecord) {
        self.all_time_winners.insert(record.winner.clone());
        self.winners.insert(record.category.clone(), record);
    }
}

/// Where a category stands given its current eligible pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawPhase<'a> {
    Empty,
    SinglePool(&'a str),
    MultiPool(&'a [String]),
    Resolved(&'a str),
}

/// A resolved category stays resolved regardless of how the pool looks now.
pub fn phase<'a>(state: &'a DrawState, category: &str, pool: &'a [String]) -> DrawPhase<'a> {
    if let Some(winner) = state.winner(category) {
        return DrawPhase::Resolved(winner);
    }
    match pool {
        [] => DrawPhase::Empty,
        [only] => DrawPhase::SinglePool(only),
        many => DrawPhase::MultiPool(many),
    }
}

/// What a trigger did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawOutcome {
    /// Nobody is eligible; nothing happened.
    NoPool,
    /// Exactly one eligible participant; no randomness used.
    SingleWinner(String),
    /// A winner was drawn from the pool and recorded.
    Drawn(DrawRecord),
    /// The category already had a winner; the stored one is returned.
    AlreadyResolved(String),
}

impl DrawOutcome {
    pub fn winner(&self) -> Option<&str> {
        match self {
            DrawOutcome::NoPool => None,
            DrawOutcome::SingleWinner(w) | DrawOutcome::AlreadyResolved(w) => Some(w),
            DrawOutcome::Drawn(r) => Some(&r.winner),
        }
    }
}

/// Settle a category whose pool holds exactly one participant. No RNG is
/// involved. Returns `None` for any other phase.
pub fn settle_single(state: &mut DrawState, category: &str, pool: &[String]) -> Option<DrawRecord> {
    let DrawPhase::SinglePool(only) = phase(state, category, pool) else {
        return None;
    };
    info!("single eligible participant for '{}': {}", category, only);
    let record = DrawRecord {
        category: category.to_string(),
        winner: only.to_string(),
        pool: pool.to_vec(),
        method: DrawMethod::Single,
        drawn_at: Utc::now(),
    };
    state.settle(record.clone());
    Some(record)
}

/// Run the draw for `category` over `pool`.
///
/// A single-participant pool is reported without touching the RNG; it is
/// written into the state only when `record_single` is set.
pub fn trigger<R: Rng + ?Sized>(
    state: &mut DrawState,
    category: &str,
    pool: &[String],
    rng: &mut R,
    record_single: bool,
) -> DrawOutcome {
    match phase(state, category, pool) {
        DrawPhase::Resolved(winner) => {
            debug!("draw for '{}' already resolved: {}", category, winner);
            DrawOutcome::AlreadyResolved(winner.to_string())
        }
        DrawPhase::Empty => DrawOutcome::NoPool,
        DrawPhase::SinglePool(only) if !record_single => {
            debug!("single eligible participant for '{}': {} (not recorded)", category, only);
            DrawOutcome::SingleWinner(only.to_string())
        }
        DrawPhase::SinglePool(only) => {
            let only = only.to_string();
            settle_single(state, category, pool);
            DrawOutcome::SingleWinner(only)
        }
        DrawPhase::MultiPool(candidates) => {
            // The pool is non-empty here, so `choose` always yields a value.
            let Some(winner) = candidates.choose(rng).cloned() else {
                return DrawOutcome::NoPool;
            };
            info!(
                "lucky draw for '{}': {} drawn from {} eligible",
                category,
                winner,
                candidates.len()
            );
            let record = DrawRecord {
                category: category.to_string(),
                winner,
                pool: candidates.to_vec(),
                method: DrawMethod::Random,
                drawn_at: Utc::now(),
            };
            state.settle(record.clone());
            DrawOutcome::Drawn(record)
        }
    }
}
