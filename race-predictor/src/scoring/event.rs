// Event identifiers and answer-column keys.
//
// Guesses and official answers arrive keyed by column names such as
// `Race4_2nd` or `OPT3`. These types give those columns a typed shape so the
// scoring engine never builds key strings by hand.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized event or answer key '{0}'")]
pub struct ParseKeyError(pub String);

// ---------------------------------------------------------------------------
// EventId
// ---------------------------------------------------------------------------

/// One scored competition on the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EventId {
    /// A three-place race (1st/2nd/3rd).
    Race(u8),
    /// A single-value option slot.
    Opt(u8),
}

impl EventId {
    /// The answer keys this event is scored on, in slot order.
    pub fn keys(self) -> Vec<AnswerKey> {
        match self {
            EventId::Race(n) => Place::ALL.iter().map(|&p| AnswerKey::Race(n, p)).collect(),
            EventId::Opt(n) => vec![AnswerKey::Opt(n)],
        }
    }

    pub fn is_race(self) -> bool {
        matches!(self, EventId::Race(_))
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventId::Race(n) => write!(f, "Race {n}"),
            EventId::Opt(n) => write!(f, "OPT{n}"),
        }
    }
}

impl FromStr for EventId {
    type Err = ParseKeyError;

    /// Accepts `Race 2`, `Race2`, `OPT3` and `Opt 3` (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.split_whitespace().collect::<String>().to_ascii_lowercase();
        let err = || ParseKeyError(s.to_string());
        if let Some(num) = compact.strip_prefix("race") {
            num.parse().map(EventId::Race).map_err(|_| err())
        } else if let Some(num) = compact.strip_prefix("opt") {
            num.parse().map(EventId::Opt).map_err(|_| err())
        } else {
            Err(err())
        }
    }
}

impl TryFrom<String> for EventId {
    type Error = ParseKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EventId> for String {
    fn from(value: EventId) -> Self {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// Place
// ---------------------------------------------------------------------------

/// Finishing position within a race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Place {
    First,
    Second,
    Third,
}

impl Place {
    pub const ALL: [Place; 3] = [Place::First, Place::Second, Place::Third];

    /// Column suffix (`1st`, `2nd`, `3rd`).
    pub fn suffix(self) -> &'static str {
        match self {
            Place::First => "1st",
            Place::Second => "2nd",
            Place::Third => "3rd",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Place::First => 0,
            Place::Second => 1,
            Place::Third => 2,
        }
    }

    fn from_suffix(s: &str) -> Option<Self> {
        match s {
            "1st" => Some(Place::First),
            "2nd" => Some(Place::Second),
            "3rd" => Some(Place::Third),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// AnswerKey
// ---------------------------------------------------------------------------

/// A single answer column: one place of a race, or one option slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnswerKey {
    Race(u8, Place),
    Opt(u8),
}

impl AnswerKey {
    pub fn event(self) -> EventId {
        match self {
            AnswerKey::Race(n, _) => EventId::Race(n),
            AnswerKey::Opt(n) => EventId::Opt(n),
        }
    }

    /// The tabular column name, e.g. `Race2_1st` or `OPT5`.
    pub fn column(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for AnswerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerKey::Race(n, place) => write!(f, "Race{n}_{}", place.suffix()),
            AnswerKey::Opt(n) => write!(f, "OPT{n}"),
        }
    }
}

impl FromStr for AnswerKey {
    type Err = ParseKeyError;

    /// Parses column names exactly as they appear in the guesses header
    /// (`Race2_1st`, `OPT3`), ignoring surrounding whitespace and case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let err = || ParseKeyError(s.to_string());
        if let Some(rest) = lower.strip_prefix("race") {
            let (num, suffix) = rest.split_once('_').ok_or_else(err)?;
            let n = num.parse().map_err(|_| err())?;
            let place = Place::from_suffix(suffix).ok_or_else(err)?;
            Ok(AnswerKey::Race(n, place))
        } else if let Some(num) = lower.strip_prefix("opt") {
            num.parse().map(AnswerKey::Opt).map_err(|_| err())
        } else {
            Err(err())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_labels() {
        assert_eq!(EventId::Race(2).to_string(), "Race 2");
        assert_eq!(EventId::Opt(7).to_string(), "OPT7");
    }

    #[test]
    fn event_parse_accepts_label_variants() {
        assert_eq!("Race 4".parse::<EventId>().unwrap(), EventId::Race(4));
        assert_eq!("race4".parse::<EventId>().unwrap(), EventId::Race(4));
        assert_eq!("OPT3".parse::<EventId>().unwrap(), EventId::Opt(3));
        assert_eq!("Opt 3".parse::<EventId>().unwrap(), EventId::Opt(3));
        assert!("Race Three".parse::<EventId>().is_err());
        assert!("Heat 1".parse::<EventId>().is_err());
    }

    #[test]
    fn answer_key_columns() {
        assert_eq!(AnswerKey::Race(2, Place::First).column(), "Race2_1st");
        assert_eq!(AnswerKey::Race(7, Place::Third).column(), "Race7_3rd");
        assert_eq!(AnswerKey::Opt(5).column(), "OPT5");
    }

    #[test]
    fn answer_key_parse() {
        assert_eq!(
            "Race3_2nd".parse::<AnswerKey>().unwrap(),
            AnswerKey::Race(3, Place::Second)
        );
        assert_eq!(" opt6 ".parse::<AnswerKey>().unwrap(), AnswerKey::Opt(6));
        assert!("Race3".parse::<AnswerKey>().is_err());
        assert!("Race3_4th".parse::<AnswerKey>().is_err());
        assert!("Name".parse::<AnswerKey>().is_err());
    }

    #[test]
    fn race_has_three_keys_option_has_one() {
        assert_eq!(
            EventId::Race(2).keys(),
            vec![
                AnswerKey::Race(2, Place::First),
                AnswerKey::Race(2, Place::Second),
                AnswerKey::Race(2, Place::Third),
            ]
        );
        assert_eq!(EventId::Opt(2).keys(), vec![AnswerKey::Opt(2)]);
    }

    #[test]
    fn event_serde_uses_label() {
        let json = serde_json::to_string(&EventId::Race(5)).unwrap();
        assert_eq!(json, "\"Race 5\"");
        let back: EventId = serde_json::from_str("\"OPT4\"").unwrap();
        assert_eq!(back, EventId::Opt(4));
    }
}
