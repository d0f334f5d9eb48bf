// Aggregation of scored entries into per-participant and per-category totals.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::PrizeCategory;
use crate::scoring::event::Place;
use crate::scoring::ScoredEntry;

/// Totals across every scored event for one participant.
///
/// The place counters sum the slot flags of all entries. An option's single
/// value sits in the first slot, so correct options count towards
/// `first_correct`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParticipantSummary {
    pub name: String,
    pub first_correct: u32,
    pub second_correct: u32,
    pub third_correct: u32,
    pub points: u32,
}

/// One participant's points within one prize category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorySubtotal {
    pub name: String,
    pub category: String,
    pub points: u32,
}

/// Everything known about a single participant for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantBreakdown {
    pub name: String,
    pub entries: Vec<ScoredEntry>,
    pub total_correct: u32,
    pub total_points: u32,
}

impl ParticipantBreakdown {
    pub fn has_correct_guesses(&self) -> bool {
        self.total_correct > 0
    }
}

/// Group entries by participant, sorted by name.
pub fn summarize(entries: &[ScoredEntry]) -> Vec<ParticipantSummary> {
    let mut by_name: BTreeMap<&str, ParticipantSummary> = BTreeMap::new();
    for entry in entries {
        let summary = by_name
            .entry(entry.name.as_str())
            .or_insert_with(|| ParticipantSummary {
                name: entry.name.clone(),
                ..Default::default()
            });
        summary.first_correct += u32::from(entry.slot(Place::First).correct);
        summary.second_correct += u32::from(entry.slot(Place::Second).correct);
        summary.third_correct += u32::from(entry.slot(Place::Third).correct);
        summary.points += entry.points;
    }
    by_name.into_values().collect()
}

/// Sum points per participant over the category's member events only.
///
/// Participants with no entry in the category do not appear, so a category
/// whose events have not been scored yields an empty list.
pub fn category_subtotals(entries: &[ScoredEntry], category: &PrizeCategory) -> Vec<CategorySubtotal> {
    let mut by_name: BTreeMap<&str, u32> = BTreeMap::new();
    for entry in entries.iter().filter(|e| category.includes(e.event)) {
        *by_name.entry(entry.name.as_str()).or_insert(0) += entry.points;
    }
    by_name
        .into_iter()
        .map(|(name, points)| CategorySubtotal {
            name: name.to_string(),
            category: category.name.clone(),
            points,
        })
        .collect()
}

/// Collect one participant's entries. Returns `None` for an unknown name.
pub fn participant_breakdown(entries: &[ScoredEntry], name: &str) -> Option<ParticipantBreakdown> {
    let mine: Vec<ScoredEntry> = entries.iter().filter(|e| e.name == name).cloned().collect();
    if mine.is_empty() {
        return None;
    }
    let total_correct = mine.iter().map(ScoredEntry::correct_count).sum();
    let total_points = mine.iter().map(|e| e.points).sum();
    Some(ParticipantBreakdown {
        name: name.to_string(),
        entries: mine,
        total_correct,
        total_points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PrizeRule, ScheduleConfig, ScoringWeights};
    use crate::scoring::engine::score_all;
    use crate::scoring::event::{AnswerKey, EventId};
    use crate::scoring::guesses::{GuessRow, OfficialOutcomes};
    use proptest::prelude::*;

    fn schedule() -> ScheduleConfig {
        ScheduleConfig {
            races: vec![2, 3, 4],
            options: vec![2, 3],
        }
    }

    fn official() -> OfficialOutcomes {
        OfficialOutcomes::new()
            .with(AnswerKey::Race(2, Place::First), "5")
            .with(AnswerKey::Race(2, Place::Second), "3")
            .with(AnswerKey::Race(2, Place::Third), "8")
            .with(AnswerKey::Race(3, Place::First), "1")
            .with(AnswerKey::Race(3, Place::Second), "2")
            .with(AnswerKey::Race(3, Place::Third), "4")
            .with(AnswerKey::Opt(2), "6")
            .with(AnswerKey::Opt(3), "9")
    }

    fn entries() -> Vec<ScoredEntry> {
        let rows = vec![
            GuessRow::new("Alice")
                .with(AnswerKey::Race(2, Place::First), "5")
                .with(AnswerKey::Race(2, Place::Second), "3")
                .with(AnswerKey::Race(3, Place::First), "1")
                .with(AnswerKey::Opt(2), "6"),
            GuessRow::new("Bob")
                .with(AnswerKey::Race(2, Place::Third), "8")
                .with(AnswerKey::Opt(3), "9"),
        ];
        score_all(&rows, &official(), &schedule(), &ScoringWeights::default()).unwrap()
    }

    fn category(name: &str, events: Vec<EventId>) -> PrizeCategory {
        PrizeCategory {
            name: name.into(),
            events,
            rule: PrizeRule::Maximum,
        }
    }

    #[test]
    fn summary_counts_and_points() {
        let summary = summarize(&entries());
        assert_eq!(summary.len(), 2);

        let alice = &summary[0];
        assert_eq!(alice.name, "Alice");
        // Race 2 1st, Race 3 1st, OPT2
        assert_eq!(alice.first_correct, 3);
        assert_eq!(alice.second_correct, 1);
        assert_eq!(alice.third_correct, 0);
        assert_eq!(alice.points, 12 + 6 + 12 + 1);

        let bob = &summary[1];
        assert_eq!(bob.first_correct, 1);
        assert_eq!(bob.third_correct, 1);
        assert_eq!(bob.points, 2 + 1);
    }

    #[test]
    fn summary_sorted_by_name() {
        let mut e = entries();
        e.reverse();
        let names: Vec<String> = summarize(&e).into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Alice", "Bob"]);
    }

    #[test]
    fn category_subtotals_restrict_to_members() {
        let races = category("Races 2 & 3", vec![EventId::Race(2), EventId::Race(3)]);
        let subtotals = category_subtotals(&entries(), &races);
        assert_eq!(subtotals.len(), 2);
        assert_eq!(subtotals[0].name, "Alice");
        assert_eq!(subtotals[0].points, 30);
        assert_eq!(subtotals[0].category, "Races 2 & 3");
        assert_eq!(subtotals[1].points, 2);

        let opts = category("Opt Six", vec![EventId::Opt(2), EventId::Opt(3)]);
        let subtotals = category_subtotals(&entries(), &opts);
        assert_eq!(subtotals.iter().map(|s| s.points).collect::<Vec<_>>(), vec![1, 1]);
    }

    #[test]
    fn unscored_category_is_empty() {
        let later = category("Race 4", vec![EventId::Race(4)]);
        assert!(category_subtotals(&entries(), &later).is_empty());
    }

    #[test]
    fn breakdown_for_known_participant() {
        let b = participant_breakdown(&entries(), "Bob").unwrap();
        assert_eq!(b.entries.len(), 4);
        assert_eq!(b.total_correct, 2);
        assert_eq!(b.total_points, 3);
        assert!(b.has_correct_guesses());
    }

    #[test]
    fn breakdown_flags_no_correct_guesses() {
        let rows = vec![GuessRow::new("Zed").with(AnswerKey::Opt(2), "1")];
        let e = score_all(&rows, &official(), &schedule(), &ScoringWeights::default()).unwrap();
        let b = participant_breakdown(&e, "Zed").unwrap();
        assert!(!b.has_correct_guesses());
        assert!(participant_breakdown(&e, "Nobody").is_none());
    }

    proptest! {
        #[test]
        fn summary_points_equal_entry_sum(picks in proptest::collection::vec(0u8..10, 8)) {
            let keys = [
                AnswerKey::Race(2, Place::First),
                AnswerKey::Race(2, Place::Second),
                AnswerKey::Race(2, Place::Third),
                AnswerKey::Race(3, Place::First),
                AnswerKey::Race(3, Place::Second),
                AnswerKey::Race(3, Place::Third),
                AnswerKey::Opt(2),
                AnswerKey::Opt(3),
            ];
            let mut row = GuessRow::new("P");
            for (key, pick) in keys.iter().zip(&picks) {
                row = row.with(*key, &pick.to_string());
            }
            let e = score_all(&[row], &official(), &schedule(), &ScoringWeights::default()).unwrap();
            let summary = summarize(&e);
            let total: u32 = e.iter().map(|x| x.points).sum();
            prop_assert_eq!(summary.len(), 1);
            prop_assert_eq!(summary[0].points, total);
        }
    }
}
