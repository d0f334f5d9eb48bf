// Participant guesses and official answers.
//
// Guesses come from a CSV with a `Name` column plus one column per answer key
// (`Race2_1st`, ..., `OPT7`). Official answers come from a flat TOML table
// with the same keys. Both tolerate missing columns: any absent value reads
// back as the "0" sentinel.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;

use tracing::{debug, warn};

use super::event::{AnswerKey, EventId};
use super::normalize::{is_unset, normalize};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum GuessError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("failed to parse answers file {path}: {source}")]
    Answers {
        path: String,
        source: toml::de::Error,
    },

    #[error("invalid official answer for `{key}`: {message}")]
    InvalidAnswer { key: String, message: String },

    #[error("validation error: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// GuessRow
// ---------------------------------------------------------------------------

/// One participant's row from the guesses table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuessRow {
    pub name: String,
    values: HashMap<AnswerKey, String>,
}

impl GuessRow {
    pub fn new(name: impl Into<String>) -> Self {
        GuessRow {
            name: name.into(),
            values: HashMap::new(),
        }
    }

    /// Builder-style setter, mostly for tests and fixtures.
    pub fn with(mut self, key: AnswerKey, value: &str) -> Self {
        self.values.insert(key, value.to_string());
        self
    }

    /// The normalized guess for `key`; "0" when the column was absent.
    pub fn get(&self, key: AnswerKey) -> String {
        normalize(self.values.get(&key).map(String::as_str))
    }
}

// ---------------------------------------------------------------------------
// OfficialOutcomes
// ---------------------------------------------------------------------------

/// The operator-entered results for one scoring run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfficialOutcomes {
    values: BTreeMap<AnswerKey, String>,
}

impl OfficialOutcomes {
    pub fn new() -> Self {
        Self::default()
    }

    /// The normalized official value for `key`; "0" when not entered.
    pub fn get(&self, key: AnswerKey) -> String {
        normalize(self.values.get(&key).map(String::as_str))
    }

    /// Set (or clear, with "0") a single official value.
    pub fn set(&mut self, key: AnswerKey, value: &str) {
        let value = normalize(Some(value));
        if is_unset(&value) {
            self.values.remove(&key);
        } else {
            self.values.insert(key, value);
        }
    }

    pub fn with(mut self, key: AnswerKey, value: &str) -> Self {
        self.set(key, value);
        self
    }

    /// True when at least one slot of `event` has a non-sentinel answer.
    pub fn is_entered(&self, event: EventId) -> bool {
        event.keys().into_iter().any(|k| !is_unset(&self.get(k)))
    }

    /// Entered values in key order, for display and persistence.
    pub fn entered(&self) -> impl Iterator<Item = (AnswerKey, &str)> {
        self.values.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Reader-based loaders (private, enable testing without temp files)
// ---------------------------------------------------------------------------

fn load_guesses_from_reader<R: Read>(rdr: R) -> Result<Vec<GuessRow>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(rdr);

    let headers = reader.headers()?.clone();
    let name_idx = headers.iter().position(|h| h == "Name");
    let key_columns: Vec<(usize, AnswerKey)> = headers
        .iter()
        .enumerate()
        .filter_map(|(idx, h)| h.parse::<AnswerKey>().ok().map(|k| (idx, k)))
        .collect();
    debug!(
        "guesses header: {} columns, {} answer columns",
        headers.len(),
        key_columns.len()
    );

    let Some(name_idx) = name_idx else {
        warn!("guesses table has no Name column; no rows can be scored");
        return Ok(Vec::new());
    };

    let mut rows = Vec::new();
    for (line, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("skipping malformed guesses row {}: {}", line + 1, e);
                continue;
            }
        };
        let name = record.get(name_idx).map(str::trim).unwrap_or_default();
        if name.is_empty() {
            warn!("skipping guesses row {}: empty Name", line + 1);
            continue;
        }
        let mut row = GuessRow::new(name);
        for &(idx, key) in &key_columns {
            if let Some(value) = record.get(idx) {
                row.values.insert(key, value.to_string());
            }
        }
        rows.push(row);
    }

    let mut seen = HashMap::new();
    for row in &rows {
        let count = seen.entry(row.name.as_str()).or_insert(0u32);
        *count += 1;
        if *count == 2 {
            warn!("participant '{}' appears more than once; rows will be summed", row.name);
        }
    }

    Ok(rows)
}

/// Parse answers TOML text. `origin` names the source in error messages.
pub fn parse_answers(text: &str, origin: &str) -> Result<OfficialOutcomes, GuessError> {
    let table: toml::Table = toml::from_str(text).map_err(|e| GuessError::Answers {
        path: origin.to_string(),
        source: e,
    })?;
    answers_from_table(&table)
}

fn answers_from_table(table: &toml::Table) -> Result<OfficialOutcomes, GuessError> {
    let mut outcomes = OfficialOutcomes::new();
    for (raw_key, value) in table {
        let Ok(key) = raw_key.parse::<AnswerKey>() else {
            warn!("ignoring unknown answer key '{}'", raw_key);
            continue;
        };
        let text = match value {
            toml::Value::String(s) => s.clone(),
            toml::Value::Integer(i) => i.to_string(),
            toml::Value::Float(f) => f.to_string(),
            other => {
                return Err(GuessError::InvalidAnswer {
                    key: raw_key.clone(),
                    message: format!("expected a string or number, got {}", other.type_str()),
                })
            }
        };
        outcomes.set(key, &text);
    }
    Ok(outcomes)
}

// ---------------------------------------------------------------------------
// Public path-based loaders
// ---------------------------------------------------------------------------

/// Load participant guesses from a CSV file.
pub fn load_guesses(path: &Path) -> Result<Vec<GuessRow>, GuessError> {
    let file = std::fs::File::open(path).map_err(|e| GuessError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let rows = load_guesses_from_reader(file).map_err(|e| GuessError::Csv {
        path: path.display().to_string(),
        source: e,
    })?;
    if rows.is_empty() {
        return Err(GuessError::Validation(format!(
            "{} produced zero participant rows",
            path.display()
        )));
    }
    Ok(rows)
}

/// Load official answers from a TOML file of `KEY = value` pairs.
pub fn load_answers(path: &Path) -> Result<OfficialOutcomes, GuessError> {
    let text = std::fs::read_to_string(path).map_err(|e| GuessError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_answers(&text, &path.display().to_string())
}

/// Serialize official answers back to the TOML format `load_answers` reads.
pub fn answers_to_toml(outcomes: &OfficialOutcomes) -> Result<String, toml::ser::Error> {
    let mut table = toml::Table::new();
    for (key, value) in outcomes.entered() {
        table.insert(key.column(), toml::Value::String(value.to_string()));
    }
    toml::to_string(&table)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::event::Place;

    #[test]
    fn guesses_csv_basic() {
        let csv_data = "\
Name,Race2_1st,Race2_2nd,Race2_3rd,OPT2
Alice,5,3,8,7
Bob, 4 ,3,1,2";

        let rows = load_guesses_from_reader(csv_data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Alice");
        assert_eq!(rows[0].get(AnswerKey::Race(2, Place::First)), "5");
        assert_eq!(rows[0].get(AnswerKey::Opt(2)), "7");
        assert_eq!(rows[1].get(AnswerKey::Race(2, Place::First)), "4");
    }

    #[test]
    fn missing_columns_read_as_sentinel() {
        let csv_data = "\
Name,Race2_1st
Alice,5";

        let rows = load_guesses_from_reader(csv_data.as_bytes()).unwrap();
        assert_eq!(rows[0].get(AnswerKey::Race(2, Place::Second)), "0");
        assert_eq!(rows[0].get(AnswerKey::Opt(4)), "0");
    }

    #[test]
    fn blank_cells_read_as_sentinel() {
        let csv_data = "\
Name,Race2_1st,Race2_2nd
Alice,,3";

        let rows = load_guesses_from_reader(csv_data.as_bytes()).unwrap();
        assert_eq!(rows[0].get(AnswerKey::Race(2, Place::First)), "0");
        assert_eq!(rows[0].get(AnswerKey::Race(2, Place::Second)), "3");
    }

    #[test]
    fn extra_columns_ignored() {
        let csv_data = "\
Timestamp,Name,Email,OPT3
2024-01-01,Carol,c@example.com,9";

        let rows = load_guesses_from_reader(csv_data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Carol");
        assert_eq!(rows[0].get(AnswerKey::Opt(3)), "9");
    }

    #[test]
    fn rows_without_name_skipped() {
        let csv_data = "\
Name,OPT2
,4
Dave,5";

        let rows = load_guesses_from_reader(csv_data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Dave");
    }

    #[test]
    fn short_rows_tolerated() {
        let csv_data = "\
Name,Race2_1st,Race2_2nd,Race2_3rd
Erin,1";

        let rows = load_guesses_from_reader(csv_data.as_bytes()).unwrap();
        assert_eq!(rows[0].get(AnswerKey::Race(2, Place::First)), "1");
        assert_eq!(rows[0].get(AnswerKey::Race(2, Place::Third)), "0");
    }

    #[test]
    fn no_name_column_yields_no_rows() {
        let csv_data = "\
Player,OPT2
Alice,4";

        let rows = load_guesses_from_reader(csv_data.as_bytes()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn answers_accept_strings_and_integers() {
        let text = r#"
Race2_1st = "5"
Race2_2nd = 3
OPT3 = " 7 "
"#;
        let outcomes = parse_answers(text, "test").unwrap();
        assert_eq!(outcomes.get(AnswerKey::Race(2, Place::First)), "5");
        assert_eq!(outcomes.get(AnswerKey::Race(2, Place::Second)), "3");
        assert_eq!(outcomes.get(AnswerKey::Race(2, Place::Third)), "0");
        assert_eq!(outcomes.get(AnswerKey::Opt(3)), "7");
    }

    #[test]
    fn answers_reject_non_scalar_values() {
        match parse_answers("OPT2 = [1, 2]", "test").unwrap_err() {
            GuessError::InvalidAnswer { key, .. } => assert_eq!(key, "OPT2"),
            other => panic!("expected InvalidAnswer, got {other:?}"),
        }
    }

    #[test]
    fn answers_ignore_unknown_keys() {
        let outcomes = parse_answers("Notes = \"wet track\"\nOPT2 = 4", "test").unwrap();
        assert_eq!(outcomes.entered().count(), 1);
    }

    #[test]
    fn setting_sentinel_clears_value() {
        let mut outcomes = OfficialOutcomes::new().with(AnswerKey::Opt(2), "4");
        assert!(outcomes.is_entered(EventId::Opt(2)));
        outcomes.set(AnswerKey::Opt(2), "0");
        assert!(!outcomes.is_entered(EventId::Opt(2)));
        assert!(outcomes.is_empty());
    }

    #[test]
    fn race_entered_when_any_place_set() {
        let outcomes = OfficialOutcomes::new().with(AnswerKey::Race(4, Place::Third), "6");
        assert!(outcomes.is_entered(EventId::Race(4)));
        assert!(!outcomes.is_entered(EventId::Race(5)));
    }

    #[test]
    fn answers_toml_round_trip() {
        let outcomes = OfficialOutcomes::new()
            .with(AnswerKey::Race(2, Place::First), "5")
            .with(AnswerKey::Opt(3), "7");
        let text = answers_to_toml(&outcomes).unwrap();
        let back = parse_answers(&text, "test").unwrap();
        assert_eq!(back, outcomes);
    }
}
