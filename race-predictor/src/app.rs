// Application state and orchestration logic.
//
// Owns the session: loaded guesses, official answers, the draw state and
// the latest scoring run. Every user command goes through `handle_command`,
// which returns the lines to show. The interactive loop in `run` is generic
// over its reader and writer so tests can drive it with byte buffers.

use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::Context;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::config::{Config, PrizeCategory};
use crate::db::Database;
use crate::prize::aggregate::{participant_breakdown, summarize, ParticipantSummary};
use crate::prize::draw::{phase, settle_single, trigger, DrawMethod, DrawOutcome, DrawPhase, DrawState};
use crate::prize::eligibility::{resolve_eligibility, EligibilitySet};
use crate::protocol::{parse_command, UserCommand, HELP};
use crate::report::{build_report, JsonFileSink, Report, ReportSink, TextSink};
use crate::scoring::engine::{max_total_points, valid_event_count};
use crate::scoring::event::{AnswerKey, Place};
use crate::scoring::guesses::{
    answers_to_toml, load_answers, load_guesses, parse_answers, GuessRow, OfficialOutcomes,
};
use crate::scoring::{score_all, ScoredEntry, ScoringError};

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// Everything derived from one pass of scoring.
#[derive(Debug, Clone)]
pub struct ScoringRun {
    pub entries: Vec<ScoredEntry>,
    pub summary: Vec<ParticipantSummary>,
    pub eligibility: EligibilitySet,
    pub valid_events: usize,
    pub max_total_points: u32,
}

/// Text produced by a command, and whether the loop should stop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub lines: Vec<String>,
    pub quit: bool,
}

impl CommandOutput {
    fn lines(lines: Vec<String>) -> Self {
        CommandOutput { lines, quit: false }
    }

    fn line(line: impl Into<String>) -> Self {
        Self::lines(vec![line.into()])
    }
}

/// Build the draw RNG from a fixed seed, or from OS entropy.
pub fn make_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => ChaCha8Rng::from_entropy(),
    }
}

fn answers_state_key(session_id: &str) -> String {
    format!("answers:{session_id}")
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// The complete application state.
pub struct AppState {
    pub config: Config,
    pub db: Database,
    /// Draw results are stored under this ID so a restart picks up the
    /// same session's winners.
    pub session_id: String,
    pub guesses: Vec<GuessRow>,
    pub answers: OfficialOutcomes,
    pub draw_state: DrawState,
    /// The latest scoring run, or why there is none.
    pub run: Result<ScoringRun, ScoringError>,
    rng: ChaCha8Rng,
}

impl AppState {
    pub fn new(
        config: Config,
        db: Database,
        session_id: String,
        guesses: Vec<GuessRow>,
        answers: OfficialOutcomes,
        rng: ChaCha8Rng,
    ) -> Self {
        AppState {
            config,
            db,
            session_id,
            guesses,
            answers,
            draw_state: DrawState::new(),
            run: Err(ScoringError::NoValidEvents),
            rng,
        }
    }

    // ------------------------------------------------------------------
    // Scoring runs
    // ------------------------------------------------------------------

    /// Recompute the scoring run from the current guesses, answers and draw
    /// state. Winners already drawn are kept, and single-participant pools
    /// are settled.
    pub fn rescore(&mut self) -> anyhow::Result<()> {
        let schedule = &self.config.schedule;
        self.run = score_all(&self.guesses, &self.answers, schedule, &self.config.scoring).map(
            |entries| {
                let summary = summarize(&entries);
                let eligibility =
                    resolve_eligibility(&entries, &self.config.prizes, &self.draw_state);
                ScoringRun {
                    valid_events: valid_event_count(&self.answers, schedule),
                    max_total_points: max_total_points(
                        &self.answers,
                        schedule,
                        &self.config.scoring,
                        &self.config.display,
                    ),
                    summary,
                    eligibility,
                    entries,
                }
            },
        );
        match &self.run {
            Ok(run) => debug!(
                "run: {} entries, {} valid events, {} categories with a pool",
                run.entries.len(),
                run.valid_events,
                run.eligibility.len()
            ),
            Err(e) => warn!("scoring skipped: {}", e),
        }
        self.settle_single_pools()
    }

    /// Begin a fresh scoring run: the current run's winners are forgotten
    /// (in memory and in the database) and everything is recomputed.
    /// Previous winners stay excluded from every pool.
    pub fn start_run(&mut self) -> anyhow::Result<()> {
        self.draw_state.begin_run();
        self.db
            .clear_run_winners(&self.session_id)
            .context("failed to clear run winners")?;
        self.persist_answers()?;
        self.rescore()?;
        info!(
            "fresh scoring run: {} participants, {} answers entered",
            self.guesses.len(),
            self.answers.entered().count()
        );
        Ok(())
    }

    fn persist_answers(&self) -> anyhow::Result<()> {
        let text = answers_to_toml(&self.answers).context("failed to serialize answers")?;
        self.db
            .save_state(
                &answers_state_key(&self.session_id),
                &serde_json::Value::String(text),
            )
            .context("failed to persist answers")
    }

    fn recompute_eligibility(&mut self) {
        if let Ok(run) = &mut self.run {
            run.eligibility =
                resolve_eligibility(&run.entries, &self.config.prizes, &self.draw_state);
        }
    }

    /// Recompute pools after a winner was settled, then settle any pool that
    /// shrank to one participant.
    fn refresh_eligibility(&mut self) -> anyhow::Result<()> {
        self.recompute_eligibility();
        self.settle_single_pools()
    }

    /// Settle every category whose pool holds exactly one participant, in
    /// prize order. Each winner leaves the other pools, which can leave
    /// another single, so this repeats until no pool changes.
    fn settle_single_pools(&mut self) -> anyhow::Result<()> {
        if !self.config.draw.record_single_winners {
            return Ok(());
        }
        loop {
            let Ok(run) = &self.run else {
                return Ok(());
            };
            let next = self.config.prizes.iter().find_map(|prize| {
                let pool = run.eligibility.get(&prize.name)?;
                match phase(&self.draw_state, &prize.name, pool) {
                    DrawPhase::SinglePool(_) => Some((prize.name.clone(), pool.to_vec())),
                    _ => None,
                }
            });
            let Some((category, pool)) = next else {
                return Ok(());
            };
            let Some(record) = settle_single(&mut self.draw_state, &category, &pool) else {
                return Ok(());
            };
            self.db
                .record_draw(&record, &self.session_id)
                .context("failed to persist single winner")?;
            self.recompute_eligibility();
        }
    }

    fn find_prize(&self, name: &str) -> Option<&PrizeCategory> {
        self.config
            .prizes
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name.trim()))
    }

    // ------------------------------------------------------------------
    // Draws
    // ------------------------------------------------------------------

    /// Trigger the lucky draw for a category and persist the outcome.
    pub fn draw(&mut self, category: &str) -> anyhow::Result<DrawOutcome> {
        let pool: Vec<String> = match &self.run {
            Ok(run) => run.eligibility.get(category).unwrap_or_default().to_vec(),
            Err(_) => Vec::new(),
        };
        let record_single = self.config.draw.record_single_winners;
        let outcome = trigger(
            &mut self.draw_state,
            category,
            &pool,
            &mut self.rng,
            record_single,
        );

        let settled = match &outcome {
            DrawOutcome::Drawn(record) => Some(record.clone()),
            DrawOutcome::SingleWinner(_) if record_single => {
                self.draw_state.record(category).cloned()
            }
            _ => None,
        };
        if let Some(record) = settled {
            self.db
                .record_draw(&record, &self.session_id)
                .context("failed to persist draw result")?;
            self.refresh_eligibility()?;
        }
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    /// Start a new session: new ID, empty draw state, fresh run. The old
    /// session's rows are removed from the database.
    pub fn reset_session(&mut self) -> anyhow::Result<()> {
        let old = std::mem::replace(&mut self.session_id, Database::generate_session_id());
        self.db
            .set_session_id(&self.session_id)
            .context("failed to store new session id")?;
        self.db
            .clear_session(&old)
            .context("failed to clear previous session")?;
        self.db
            .delete_state(&answers_state_key(&old))
            .context("failed to clear previous session answers")?;
        self.draw_state.reset();
        info!("session reset: {} -> {}", old, self.session_id);
        self.start_run()
    }

    pub fn build_report(&self) -> Option<Report> {
        let run = self.run.as_ref().ok()?;
        Some(build_report(
            &self.config.display.title,
            &run.summary,
            &run.eligibility,
            &self.draw_state,
            &self.config.prizes,
            &run.entries,
        ))
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Execute one command. User-level problems (bad file, unknown name) come
    /// back as output lines; only persistence failures are errors.
    pub fn handle_command(&mut self, cmd: UserCommand) -> anyhow::Result<CommandOutput> {
        debug!("command: {:?}", cmd);
        match cmd {
            UserCommand::Score => {
                self.start_run()?;
                Ok(CommandOutput::lines(self.run_overview()))
            }
            UserCommand::SetAnswer { key, value } => self.set_answer(key, &value),
            UserCommand::LoadAnswers(path) => match load_answers(&path) {
                Ok(answers) => {
                    self.answers = answers;
                    info!("answers loaded from {}", path.display());
                    self.start_run()?;
                    Ok(CommandOutput::lines(self.run_overview()))
                }
                Err(e) => {
                    warn!("failed to load answers: {}", e);
                    Ok(CommandOutput::line(format!("Could not load answers: {e}")))
                }
            },
            UserCommand::LoadGuesses(path) => match load_guesses(&path) {
                Ok(rows) => {
                    self.guesses = rows;
                    info!("{} guess rows loaded from {}", self.guesses.len(), path.display());
                    self.start_run()?;
                    Ok(CommandOutput::lines(self.run_overview()))
                }
                Err(e) => {
                    warn!("failed to load guesses: {}", e);
                    Ok(CommandOutput::line(format!("Could not load guesses: {e}")))
                }
            },
            UserCommand::Draw(name) => self.draw_command(&name),
            UserCommand::Show(name) => Ok(CommandOutput::lines(self.show_participant(&name))),
            UserCommand::Status => Ok(CommandOutput::lines(self.status_lines())),
            UserCommand::Report(path) => self.report_command(path.as_deref()),
            UserCommand::Reset => {
                self.reset_session()?;
                Ok(CommandOutput::line(format!(
                    "New session {} started; all draw winners cleared.",
                    self.session_id
                )))
            }
            UserCommand::Help => Ok(CommandOutput::line(HELP)),
            UserCommand::Quit => Ok(CommandOutput {
                lines: Vec::new(),
                quit: true,
            }),
        }
    }

    fn set_answer(&mut self, key: AnswerKey, value: &str) -> anyhow::Result<CommandOutput> {
        if !self.config.schedule.contains(key.event()) {
            return Ok(CommandOutput::line(format!(
                "{} is not on the schedule.",
                key.event()
            )));
        }
        self.answers.set(key, value);
        info!("answer {} set to {}", key, self.answers.get(key));
        self.start_run()?;
        let mut lines = vec![format!("{} = {}", key, self.answers.get(key))];
        lines.extend(self.run_overview());
        Ok(CommandOutput::lines(lines))
    }

    fn draw_command(&mut self, name: &str) -> anyhow::Result<CommandOutput> {
        let Some(prize) = self.find_prize(name) else {
            let known: Vec<&str> = self.config.prizes.iter().map(|p| p.name.as_str()).collect();
            return Ok(CommandOutput::line(format!(
                "Unknown prize category '{}'. Categories: {}",
                name.trim(),
                known.join(", ")
            )));
        };
        let category = prize.name.clone();
        if let Err(e) = &self.run {
            return Ok(CommandOutput::line(e.to_string()));
        }

        let line = match self.draw(&category)? {
            DrawOutcome::NoPool => format!("No eligible participants for {category}."),
            DrawOutcome::SingleWinner(winner) => format!("Single Winner for {category}: {winner}"),
            DrawOutcome::Drawn(record) => format!(
                "Lucky Draw Winner for {category}: {} (drawn from {} eligible)",
                record.winner,
                record.pool.len()
            ),
            DrawOutcome::AlreadyResolved(winner) if self.settled_single(&category) => {
                format!("Single Winner for {category}: {winner}")
            }
            DrawOutcome::AlreadyResolved(winner) => {
                format!("Lucky Draw Winner for {category}: {winner} (already drawn)")
            }
        };
        Ok(CommandOutput::line(line))
    }

    fn settled_single(&self, category: &str) -> bool {
        self.draw_state
            .record(category)
            .is_some_and(|r| r.method == DrawMethod::Single)
    }

    fn report_command(&self, path: Option<&Path>) -> anyhow::Result<CommandOutput> {
        let Some(report) = self.build_report() else {
            return Ok(CommandOutput::line(ScoringError::NoValidEvents.to_string()));
        };

        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.report_path.clone().into());
        let mut json = JsonFileSink::new(&path);
        let mut lines = match json.write_report(&report) {
            Ok(()) => vec![format!("Report written to {}", path.display())],
            Err(e) => {
                warn!("report not written: {}", e);
                vec![format!("Could not write report: {e}")]
            }
        };

        let mut text = TextSink::new(Vec::new());
        text.write_report(&report).context("failed to render text report")?;
        let rendered = String::from_utf8_lossy(&text.into_inner()).into_owned();
        lines.push(String::new());
        lines.extend(rendered.lines().map(str::to_string));
        Ok(CommandOutput::lines(lines))
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    /// Summary lines plus each category's pool, shown after every run.
    fn run_overview(&self) -> Vec<String> {
        let run = match &self.run {
            Ok(run) => run,
            Err(e) => return vec![e.to_string()],
        };
        let mut lines = vec![format!(
            "Scored {} participants across {} events.",
            run.summary.len(),
            run.valid_events
        )];
        for row in &run.summary {
            lines.push(format!(
                "  {}: {} / {} Points | 1st: {} | 2nd: {} | 3rd: {}",
                row.name,
                row.points,
                run.max_total_points,
                row.first_correct,
                row.second_correct,
                row.third_correct
            ));
        }
        lines.extend(self.category_lines());
        lines
    }

    fn category_lines(&self) -> Vec<String> {
        let pools = self.run.as_ref().map(|run| &run.eligibility).ok();
        let mut lines = Vec::new();
        for prize in &self.config.prizes {
            let pool = pools.and_then(|p| p.get(&prize.name)).unwrap_or_default();
            let line = match phase(&self.draw_state, &prize.name, pool) {
                DrawPhase::Resolved(winner) if self.settled_single(&prize.name) => {
                    format!("Single Winner: {winner}")
                }
                DrawPhase::Resolved(winner) => format!("Lucky Draw Winner: {winner}"),
                DrawPhase::Empty => "no eligible participants".to_string(),
                DrawPhase::SinglePool(only) => format!("Single Winner: {only}"),
                DrawPhase::MultiPool(many) => {
                    format!("{} tied, run 'draw {}': {}", many.len(), prize.name, many.join(", "))
                }
            };
            lines.push(format!("{}: {}", prize.name, line));
        }
        lines
    }

    fn show_participant(&self, name: &str) -> Vec<String> {
        let run = match &self.run {
            Ok(run) => run,
            Err(e) => return vec![e.to_string()],
        };
        let name = name.trim();
        let found = run
            .summary
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .and_then(|s| participant_breakdown(&run.entries, &s.name));
        let Some(breakdown) = found else {
            return vec![format!("No participant named '{name}'.")];
        };

        let mut lines = vec![format!(
            "{}: {} / {} Points",
            breakdown.name, breakdown.total_points, run.max_total_points
        )];
        for entry in &breakdown.entries {
            let slots: Vec<String> = if entry.event.is_race() {
                Place::ALL
                    .iter()
                    .map(|&place| {
                        let s = entry.slot(place);
                        let mark = if s.correct { "ok" } else { "x" };
                        format!("{} {} vs {} {}", place.suffix(), s.guess, s.actual, mark)
                    })
                    .collect()
            } else {
                let s = entry.slot(Place::First);
                let mark = if s.correct { "ok" } else { "x" };
                vec![format!("{} vs {} {}", s.guess, s.actual, mark)]
            };
            lines.push(format!(
                "  {}: {} | {} pts",
                entry.event,
                slots.join(" | "),
                entry.points
            ));
        }
        if !breakdown.has_correct_guesses() {
            lines.push(format!("{} has no correct guesses.", breakdown.name));
        }
        if self.draw_state.has_won(&breakdown.name) {
            lines.push(format!(
                "{} has already won a prize and is excluded from further draws.",
                breakdown.name
            ));
        }
        lines
    }

    fn status_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Session: {}", self.session_id),
            format!("Participants loaded: {}", self.guesses.len()),
        ];
        if self.answers.is_empty() {
            lines.push("Answers: none entered".to_string());
        } else {
            let entered: Vec<String> = self
                .answers
                .entered()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            lines.push(format!("Answers: {}", entered.join(" ")));
        }
        match &self.run {
            Ok(run) => lines.push(format!("Valid events: {}", run.valid_events)),
            Err(e) => lines.push(e.to_string()),
        }
        lines.extend(self.category_lines());
        let all_time = self.draw_state.all_time_winners();
        if !all_time.is_empty() {
            let names: Vec<&str> = all_time.iter().map(String::as_str).collect();
            lines.push(format!("Previous winners (excluded): {}", names.join(", ")));
        }
        lines
    }
}

// ---------------------------------------------------------------------------
// Interactive loop
// ---------------------------------------------------------------------------

/// Read commands from `input` until EOF or `quit`, writing results to
/// `output`.
pub fn run<R: BufRead, W: Write>(
    state: &mut AppState,
    input: R,
    mut output: W,
) -> anyhow::Result<()> {
    writeln!(output, "{} (type 'help' for commands)", state.config.display.title)?;
    for line in state.run_overview() {
        writeln!(output, "{line}")?;
    }
    write!(output, "> ")?;
    output.flush()?;

    for line in input.lines() {
        let line = line.context("failed to read command")?;
        match parse_command(&line) {
            Ok(None) => {}
            Ok(Some(cmd)) => match state.handle_command(cmd) {
                Ok(out) => {
                    for l in &out.lines {
                        writeln!(output, "{l}")?;
                    }
                    if out.quit {
                        break;
                    }
                }
                Err(e) => {
                    warn!("command failed: {:#}", e);
                    writeln!(output, "error: {e:#}")?;
                }
            },
            Err(e) => writeln!(output, "{e}")?,
        }
        write!(output, "> ")?;
        output.flush()?;
    }
    info!("interactive loop finished");
    Ok(())
}

// ---------------------------------------------------------------------------
// Crash recovery
// ---------------------------------------------------------------------------

/// Restore the session's draw state and edited answers from the database.
///
/// Returns `true` when anything was restored. The caller should `rescore`
/// afterwards rather than `start_run`, which would drop restored winners.
/// `resume_session` does both.
pub fn recover_from_db(state: &mut AppState) -> anyhow::Result<bool> {
    let mut restored = false;

    if let Some(value) = state.db.load_state(&answers_state_key(&state.session_id))? {
        if let Some(text) = value.as_str() {
            state.answers = parse_answers(text, "session state")
                .context("failed to restore session answers")?;
            restored = true;
        }
    }

    let draw_state = state.db.load_draw_state(&state.session_id)?;
    if draw_state != DrawState::new() {
        info!(
            "restored {} run winners, {} all-time winners for session {}",
            draw_state.winners().count(),
            draw_state.all_time_winners().len(),
            state.session_id
        );
        state.draw_state = draw_state;
        restored = true;
    }

    if !restored {
        info!("nothing to restore for session {}", state.session_id);
    }
    Ok(restored)
}

/// Restore the session and score it. Answers passed explicitly at startup
/// replace the restored ones and begin a fresh run, so winners drawn against
/// the old answers are dropped and the new answers are persisted.
pub fn resume_session(
    state: &mut AppState,
    explicit_answers: Option<OfficialOutcomes>,
) -> anyhow::Result<bool> {
    let restored = recover_from_db(state)?;
    match explicit_answers {
        Some(answers) => {
            info!("answers given at startup replace the session's answers");
            state.answers = answers;
            state.start_run()?;
        }
        None => state.rescore()?,
    }
    Ok(restored)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
