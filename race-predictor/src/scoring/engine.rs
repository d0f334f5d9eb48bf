// Scoring engine: compares each participant's guesses with the official
// results and produces one ScoredEntry per scored event.

use serde::Serialize;
use tracing::info;

use crate::config::{DisplayConfig, ScheduleConfig, ScoringWeights};

use super::event::{AnswerKey, EventId, Place};
use super::guesses::{GuessRow, OfficialOutcomes};
use super::normalize::is_unset;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScoringError {
    #[error(
        "no valid race results entered; input at least one non-zero value for any race or option"
    )]
    NoValidEvents,
}

// ---------------------------------------------------------------------------
// Scored records
// ---------------------------------------------------------------------------

/// One compared slot: what was guessed, what happened, and whether they match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotResult {
    pub guess: String,
    pub actual: String,
    pub correct: bool,
}

impl SlotResult {
    /// An unset official value never counts as a match.
    fn compare(guess: String, actual: String) -> Self {
        let correct = !is_unset(&actual) && guess == actual;
        SlotResult {
            guess,
            actual,
            correct,
        }
    }

    /// Placeholder for the unused 2nd/3rd slots of an option entry.
    fn unused() -> Self {
        SlotResult {
            guess: String::new(),
            actual: String::new(),
            correct: false,
        }
    }
}

/// The result of scoring one participant on one event.
///
/// For a race, `slots` holds 1st/2nd/3rd. For an option only `slots[0]` is
/// meaningful; the other two are empty and never correct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoredEntry {
    pub name: String,
    pub event: EventId,
    pub slots: [SlotResult; 3],
    pub points: u32,
}

impl ScoredEntry {
    pub fn slot(&self, place: Place) -> &SlotResult {
        &self.slots[place.index()]
    }

    pub fn correct_count(&self) -> u32 {
        self.slots.iter().filter(|s| s.correct).count() as u32
    }
}

// ---------------------------------------------------------------------------
// Core computation
// ---------------------------------------------------------------------------

/// Points for one race given which places were called correctly.
/// Each place contributes its weight independently.
pub fn race_points(weights: &ScoringWeights, correct: [bool; 3]) -> u32 {
    Place::ALL
        .iter()
        .zip(correct)
        .filter(|(_, hit)| *hit)
        .map(|(&place, _)| weights.for_place(place))
        .sum()
}

fn score_race(
    row: &GuessRow,
    outcomes: &OfficialOutcomes,
    race: u8,
    weights: &ScoringWeights,
) -> Option<ScoredEntry> {
    let event = EventId::Race(race);
    if !outcomes.is_entered(event) {
        return None;
    }

    let slots = Place::ALL.map(|place| {
        let key = AnswerKey::Race(race, place);
        SlotResult::compare(row.get(key), outcomes.get(key))
    });
    let points = race_points(weights, slots.each_ref().map(|s| s.correct));

    Some(ScoredEntry {
        name: row.name.clone(),
        event,
        slots,
        points,
    })
}

fn score_option(
    row: &GuessRow,
    outcomes: &OfficialOutcomes,
    opt: u8,
    weights: &ScoringWeights,
) -> Option<ScoredEntry> {
    let key = AnswerKey::Opt(opt);
    let actual = outcomes.get(key);
    if is_unset(&actual) {
        return None;
    }

    let result = SlotResult::compare(row.get(key), actual);
    let points = if result.correct { weights.option } else { 0 };

    Some(ScoredEntry {
        name: row.name.clone(),
        event: EventId::Opt(opt),
        slots: [result, SlotResult::unused(), SlotResult::unused()],
        points,
    })
}

/// Score one participant against every entered event on the schedule.
///
/// Races whose three official places are all "0" and options whose official
/// value is "0" produce no entry.
pub fn score_participant(
    row: &GuessRow,
    outcomes: &OfficialOutcomes,
    schedule: &ScheduleConfig,
    weights: &ScoringWeights,
) -> Vec<ScoredEntry> {
    schedule
        .events()
        .filter_map(|event| match event {
            EventId::Race(n) => score_race(row, outcomes, n, weights),
            EventId::Opt(n) => score_option(row, outcomes, n, weights),
        })
        .collect()
}

/// Score every participant. Fails with `NoValidEvents` when nothing on the
/// schedule has an official result yet.
pub fn score_all(
    rows: &[GuessRow],
    outcomes: &OfficialOutcomes,
    schedule: &ScheduleConfig,
    weights: &ScoringWeights,
) -> Result<Vec<ScoredEntry>, ScoringError> {
    if valid_event_count(outcomes, schedule) == 0 {
        return Err(ScoringError::NoValidEvents);
    }

    let entries: Vec<ScoredEntry> = rows
        .iter()
        .flat_map(|row| score_participant(row, outcomes, schedule, weights))
        .collect();

    info!(
        "scored {} participants into {} entries",
        rows.len(),
        entries.len()
    );
    Ok(entries)
}

/// Number of races with any official place entered, plus one if any option
/// has been entered (the options count as a single block).
pub fn valid_event_count(outcomes: &OfficialOutcomes, schedule: &ScheduleConfig) -> usize {
    let races = schedule
        .races
        .iter()
        .filter(|&&n| outcomes.is_entered(EventId::Race(n)))
        .count();
    let options_entered = schedule
        .options
        .iter()
        .any(|&n| outcomes.is_entered(EventId::Opt(n)));
    races + usize::from(options_entered)
}

/// Display bound for a participant's total. Uses the configured per-race
/// figure for every race on the card, plus the option block once any option
/// has a result.
pub fn max_total_points(
    outcomes: &OfficialOutcomes,
    schedule: &ScheduleConfig,
    weights: &ScoringWeights,
    display: &DisplayConfig,
) -> u32 {
    let races = display.max_points_per_race * schedule.races.len() as u32;
    let options_entered = schedule
        .options
        .iter()
        .any(|&n| outcomes.is_entered(EventId::Opt(n)));
    if options_entered {
        races + weights.option * schedule.options.len() as u32
    } else {
        races
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
