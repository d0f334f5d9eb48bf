// Configuration loading and parsing (event.toml, app.toml).

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::scoring::event::{EventId, Place};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub schedule: ScheduleConfig,
    pub scoring: ScoringWeights,
    pub prizes: Vec<PrizeCategory>,
    pub display: DisplayConfig,
    pub draw: DrawConfig,
    pub db_path: String,
    pub data_paths: DataPaths,
    pub report_path: String,
}

// ---------------------------------------------------------------------------
// event.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire event.toml file.
#[derive(Debug, Clone, Deserialize)]
struct EventFile {
    schedule: ScheduleConfig,
    #[serde(default)]
    scoring: ScoringWeights,
    #[serde(rename = "prize", default)]
    prizes: Vec<PrizeCategory>,
    #[serde(default)]
    display: DisplayConfig,
    #[serde(default)]
    draw: DrawSection,
}

/// Which races and option slots are on the card. Race `n` reads the
/// `Race{n}_1st/2nd/3rd` columns, option `n` reads `OPT{n}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScheduleConfig {
    pub races: Vec<u8>,
    #[serde(default)]
    pub options: Vec<u8>,
}

impl ScheduleConfig {
    /// All events in scoring order: races first, then options.
    pub fn events(&self) -> impl Iterator<Item = EventId> + '_ {
        self.races
            .iter()
            .map(|&n| EventId::Race(n))
            .chain(self.options.iter().map(|&n| EventId::Opt(n)))
    }

    pub fn contains(&self, event: EventId) -> bool {
        match event {
            EventId::Race(n) => self.races.contains(&n),
            EventId::Opt(n) => self.options.contains(&n),
        }
    }
}

/// Points awarded per correct slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ScoringWeights {
    pub first: u32,
    pub second: u32,
    pub third: u32,
    pub option: u32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        ScoringWeights {
            first: 12,
            second: 6,
            third: 2,
            option: 1,
        }
    }
}

impl ScoringWeights {
    pub fn for_place(&self, place: Place) -> u32 {
        match place {
            Place::First => self.first,
            Place::Second => self.second,
            Place::Third => self.third,
        }
    }

    /// Highest score a single race can actually yield.
    pub fn race_max(&self) -> u32 {
        self.first + self.second + self.third
    }
}

/// One prize category: a named group of events sharing a single rule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PrizeCategory {
    pub name: String,
    pub events: Vec<EventId>,
    #[serde(flatten)]
    pub rule: PrizeRule,
}

impl PrizeCategory {
    pub fn includes(&self, event: EventId) -> bool {
        self.events.contains(&event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum PrizeRule {
    /// Everyone at or above `min_points` in the category.
    Threshold { min_points: u32 },
    /// Everyone tied on the category's highest subtotal.
    Maximum,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_title")]
    pub title: String,
    /// Upper bound used when presenting a participant's total. Not used for
    /// scoring; the true per-race maximum is `ScoringWeights::race_max`.
    #[serde(default = "default_max_points_per_race")]
    pub max_points_per_race: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            title: default_title(),
            max_points_per_race: default_max_points_per_race(),
        }
    }
}

fn default_title() -> String {
    "Race Guess Analyzer".to_string()
}

fn default_max_points_per_race() -> u32 {
    21
}

#[derive(Debug, Clone, Deserialize)]
struct DrawSection {
    #[serde(default = "default_record_single_winners")]
    record_single_winners: bool,
}

impl Default for DrawSection {
    fn default() -> Self {
        DrawSection {
            record_single_winners: default_record_single_winners(),
        }
    }
}

fn default_record_single_winners() -> bool {
    true
}

/// Draw behaviour assembled from event.toml and app.toml.
#[derive(Debug, Clone, Default)]
pub struct DrawConfig {
    /// When true (the default), a category whose pool holds one participant
    /// is settled on every rescore and that winner is excluded from later
    /// pools. When false, single winners are only announced.
    pub record_single_winners: bool,
    /// Fixed RNG seed; `None` seeds from entropy.
    pub seed: Option<u64>,
}

// ---------------------------------------------------------------------------
// app.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct AppFile {
    database: DatabaseSection,
    data: DataPaths,
    #[serde(default)]
    report: ReportSection,
    #[serde(default)]
    draw: AppDrawSection,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    path: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ReportSection {
    #[serde(default = "default_report_path")]
    json_path: String,
}

impl Default for ReportSection {
    fn default() -> Self {
        ReportSection {
            json_path: default_report_path(),
        }
    }
}

fn default_report_path() -> String {
    "detailed_results.json".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
struct AppDrawSection {
    seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataPaths {
    pub guesses: String,
    pub answers: String,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/event.toml` and
/// `config/app.toml`, both relative to the given `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy defaults.
/// Prefer `load_config()` which handles default initialization automatically.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    let event_path = config_dir.join("event.toml");
    let event_text = read_file(&event_path)?;
    let event_file = parse_event_toml(&event_text).map_err(|e| ConfigError::ParseError {
        path: event_path.clone(),
        source: e,
    })?;

    let app_path = config_dir.join("app.toml");
    let app_text = read_file(&app_path)?;
    let app_file: AppFile = toml::from_str(&app_text).map_err(|e| ConfigError::ParseError {
        path: app_path.clone(),
        source: e,
    })?;

    let config = Config {
        schedule: event_file.schedule,
        scoring: event_file.scoring,
        prizes: event_file.prizes,
        display: event_file.display,
        draw: DrawConfig {
            record_single_winners: event_file.draw.record_single_winners,
            seed: app_file.draw.seed,
        },
        db_path: app_file.database.path,
        data_paths: app_file.data,
        report_path: app_file.report.json_path,
    };

    validate(&config)?;
    if config.display.max_points_per_race != config.scoring.race_max() {
        debug!(
            "display bound of {} points per race differs from the scoring maximum of {}",
            config.display.max_points_per_race,
            config.scoring.race_max()
        );
    }

    Ok(config)
}

fn parse_event_toml(text: &str) -> Result<EventFile, toml::de::Error> {
    toml::from_str(text)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Convenience wrapper: loads config relative to `base_dir`, copying default
/// config files first.
pub fn load_config(base_dir: &Path) -> Result<Config, ConfigError> {
    ensure_config_files(base_dir)?;
    load_config_from(base_dir)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let schedule = &config.schedule;
    if schedule.races.is_empty() && schedule.options.is_empty() {
        return Err(invalid("schedule", "must list at least one race or option"));
    }
    for (field, numbers) in [("schedule.races", &schedule.races), ("schedule.options", &schedule.options)] {
        let mut seen = HashSet::new();
        for n in numbers {
            if !seen.insert(n) {
                return Err(invalid(field, format!("duplicate event number {n}")));
            }
        }
    }

    let w = &config.scoring;
    if w.first == 0 && w.second == 0 && w.third == 0 && w.option == 0 {
        return Err(invalid("scoring", "at least one weight must be > 0"));
    }

    let mut names = HashSet::new();
    for (idx, prize) in config.prizes.iter().enumerate() {
        let field = format!("prize[{idx}]");
        if prize.name.trim().is_empty() {
            return Err(invalid(format!("{field}.name"), "must not be empty"));
        }
        if !names.insert(prize.name.as_str()) {
            return Err(invalid(
                format!("{field}.name"),
                format!("duplicate prize name '{}'", prize.name),
            ));
        }
        if prize.events.is_empty() {
            return Err(invalid(format!("{field}.events"), "must list at least one event"));
        }
        if let Some(missing) = prize.events.iter().find(|e| !schedule.contains(**e)) {
            return Err(invalid(
                format!("{field}.events"),
                format!("event '{missing}' is not on the schedule"),
            ));
        }
        if let PrizeRule::Threshold { min_points: 0 } = prize.rule {
            return Err(invalid(format!("{field}.min_points"), "must be > 0"));
        }
    }

    if config.display.max_points_per_race == 0 {
        return Err(invalid("display.max_points_per_race", "must be > 0"));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
