// Report assembly and output sinks.
//
// `build_report` flattens a finished scoring run into plain rows and labelled
// sections. Sinks only format; they never recompute anything.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::config::PrizeCategory;
use crate::prize::aggregate::ParticipantSummary;
use crate::prize::draw::DrawState;
use crate::prize::eligibility::{CategoryEligibility, EligibilitySet};
use crate::scoring::event::Place;
use crate::scoring::ScoredEntry;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report to {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write report: {0}")]
    Write(#[from] io::Error),
}

// ---------------------------------------------------------------------------
// Report structure
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WinnerLine {
    pub category: String,
    pub winner: String,
}

/// Column headers plus one row of cells per scored entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetailedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub title: String,
    pub generated_at: DateTime<Utc>,
    pub summary: Vec<ParticipantSummary>,
    pub top_performers: Vec<CategoryEligibility>,
    pub winners: Vec<WinnerLine>,
    pub detailed: DetailedTable,
}

fn detailed_headers() -> Vec<String> {
    let mut headers = vec!["Name".to_string(), "Race".to_string()];
    for place in Place::ALL {
        let label = place.suffix();
        headers.push(format!("{label} Place Guess"));
        headers.push(format!("{label} Place Actual"));
        headers.push(format!("{label} Place Correct"));
    }
    headers.push("Points".to_string());
    headers
}

fn detailed_row(entry: &ScoredEntry) -> Vec<String> {
    let mut row = vec![entry.name.clone(), entry.event.to_string()];
    for slot in &entry.slots {
        row.push(slot.guess.clone());
        row.push(slot.actual.clone());
        row.push(slot.correct.to_string());
    }
    row.push(entry.points.to_string());
    row
}

/// Assemble the report for one scoring run. Winners follow the prize
/// configuration order; categories without a winner are left out.
pub fn build_report(
    title: &str,
    summary: &[ParticipantSummary],
    eligibility: &EligibilitySet,
    draw_state: &DrawState,
    prizes: &[PrizeCategory],
    entries: &[ScoredEntry],
) -> Report {
    let winners = prizes
        .iter()
        .filter_map(|prize| {
            draw_state.winner(&prize.name).map(|winner| WinnerLine {
                category: prize.name.clone(),
                winner: winner.to_string(),
            })
        })
        .collect();

    Report {
        title: title.to_string(),
        generated_at: Utc::now(),
        summary: summary.to_vec(),
        top_performers: eligibility.iter().cloned().collect(),
        winners,
        detailed: DetailedTable {
            headers: detailed_headers(),
            rows: entries.iter().map(detailed_row).collect(),
        },
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Something that accepts a finished report.
pub trait ReportSink {
    fn write_report(&mut self, report: &Report) -> Result<(), ReportError>;
}

/// Writes the report as pretty-printed JSON, creating parent directories.
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ReportSink for JsonFileSink {
    fn write_report(&mut self, report: &Report) -> Result<(), ReportError> {
        let json = serde_json::to_string_pretty(report)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ReportError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&self.path, json).map_err(|source| ReportError::Io {
            path: self.path.clone(),
            source,
        })?;
        info!("report written to {}", self.path.display());
        Ok(())
    }
}

/// Sectioned plain text over any writer.
pub struct TextSink<W: Write> {
    out: W,
}

impl<W: Write> TextSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportSink for TextSink<W> {
    fn write_report(&mut self, report: &Report) -> Result<(), ReportError> {
        let out = &mut self.out;
        writeln!(out, "{} - Detailed Report", report.title)?;
        writeln!(out, "Generated: {}", report.generated_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
        writeln!(out)?;

        writeln!(out, "Summary of Participant Performance:")?;
        for row in &report.summary {
            writeln!(
                out,
                "{}: {} Points | 1st Place Correct: {} | 2nd Place Correct: {} | 3rd Place Correct: {}",
                row.name, row.points, row.first_correct, row.second_correct, row.third_correct
            )?;
        }

        if !report.top_performers.is_empty() {
            writeln!(out)?;
            writeln!(out, "Top Performers:")?;
            for category in &report.top_performers {
                writeln!(out, "{}:", category.category)?;
                for name in &category.eligible {
                    writeln!(out, "  - {name}")?;
                }
            }
        }

        if !report.winners.is_empty() {
            writeln!(out)?;
            writeln!(out, "Lucky Draw Winners:")?;
            for line in &report.winners {
                writeln!(out, "{}: {}", line.category, line.winner)?;
            }
        }

        writeln!(out)?;
        writeln!(out, "Detailed Results:")?;
        writeln!(out, "{}", report.detailed.headers.join(" | "))?;
        for row in &report.detailed.rows {
            writeln!(out, "{}", row.join(" | "))?;
        }
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PrizeRule, ScheduleConfig, ScoringWeights};
    use crate::prize::aggregate::summarize;
    use crate::prize::draw::trigger;
    use crate::prize::eligibility::resolve_eligibility;
    use crate::scoring::engine::score_all;
    use crate::scoring::event::{AnswerKey, EventId};
    use crate::scoring::guesses::{GuessRow, OfficialOutcomes};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn prizes() -> Vec<PrizeCategory> {
        vec![
            PrizeCategory {
                name: "Race 2".into(),
                events: vec![EventId::Race(2)],
                rule: PrizeRule::Maximum,
            },
            PrizeCategory {
                name: "Opt Six".into(),
                events: vec![EventId::Opt(3)],
                rule: PrizeRule::Threshold { min_points: 1 },
            },
        ]
    }

    fn run() -> (Vec<ScoredEntry>, DrawState) {
        let schedule = ScheduleConfig {
            races: vec![2],
            options: vec![3],
        };
        let official = OfficialOutcomes::new()
            .with(AnswerKey::Race(2, Place::First), "5")
            .with(AnswerKey::Race(2, Place::Second), "3")
            .with(AnswerKey::Race(2, Place::Third), "8")
            .with(AnswerKey::Opt(3), "7");
        let rows = vec![
            GuessRow::new("Alice")
                .with(AnswerKey::Race(2, Place::First), "5")
                .with(AnswerKey::Race(2, Place::Second), "9")
                .with(AnswerKey::Race(2, Place::Third), "8")
                .with(AnswerKey::Opt(3), "7"),
            GuessRow::new("Bob")
                .with(AnswerKey::Race(2, Place::First), "5")
                .with(AnswerKey::Race(2, Place::Second), "9")
                .with(AnswerKey::Race(2, Place::Third), "8")
                .with(AnswerKey::Opt(3), "1"),
        ];
        let entries = score_all(&rows, &official, &schedule, &ScoringWeights::default()).unwrap();
        (entries, DrawState::new())
    }

    fn report_for(entries: &[ScoredEntry], state: &DrawState) -> Report {
        let eligibility = resolve_eligibility(entries, &prizes(), state);
        build_report(
            "Race Guess Analyzer",
            &summarize(entries),
            &eligibility,
            state,
            &prizes(),
            entries,
        )
    }

    #[test]
    fn detailed_table_has_one_row_per_entry() {
        let (entries, state) = run();
        let report = report_for(&entries, &state);

        assert_eq!(report.detailed.headers.len(), 12);
        assert_eq!(report.detailed.headers[2], "1st Place Guess");
        assert_eq!(report.detailed.rows.len(), entries.len());
        assert_eq!(
            report.detailed.rows[0],
            vec!["Alice", "Race 2", "5", "5", "true", "9", "3", "false", "8", "8", "true", "14"]
        );
        let opt = &report.detailed.rows[1];
        assert_eq!(opt[1], "OPT3");
        assert_eq!(opt[5], "");
    }

    #[test]
    fn winners_follow_prize_order() {
        let (entries, mut state) = run();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let eligibility = resolve_eligibility(&entries, &prizes(), &state);
        trigger(&mut state, "Race 2", eligibility.get("Race 2").unwrap(), &mut rng, false);

        let report = report_for(&entries, &state);
        assert_eq!(report.winners.len(), 1);
        assert_eq!(report.winners[0].category, "Race 2");
        assert!(report.winners.iter().all(|w| w.category != "Opt Six"));
    }

    #[test]
    fn text_sink_sections() {
        let (entries, state) = run();
        let report = report_for(&entries, &state);
        let mut sink = TextSink::new(Vec::new());
        sink.write_report(&report).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();

        assert!(text.starts_with("Race Guess Analyzer - Detailed Report\n"));
        assert!(text.contains(
            "Alice: 15 Points | 1st Place Correct: 2 | 2nd Place Correct: 0 | 3rd Place Correct: 1"
        ));
        assert!(text.contains("Top Performers:\nRace 2:\n  - Alice\n  - Bob\n"));
        assert!(!text.contains("Lucky Draw Winners:"));
        assert!(text.contains("Detailed Results:\nName | Race | 1st Place Guess"));
    }

    #[test]
    fn json_sink_writes_file() {
        let (entries, state) = run();
        let report = report_for(&entries, &state);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("report.json");

        let mut sink = JsonFileSink::new(&path);
        sink.write_report(&report).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["title"], "Race Guess Analyzer");
        assert_eq!(value["summary"][0]["name"], "Alice");
        assert_eq!(value["top_performers"][0]["eligible"][1], "Bob");
    }
}
