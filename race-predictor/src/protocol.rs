// Interactive command vocabulary.
//
// One command per input line. Parsing is purely syntactic; the app decides
// whether a key, category, or participant actually exists.

use std::path::PathBuf;

use thiserror::Error;

use crate::scoring::event::AnswerKey;

/// Commands accepted by the interactive loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    /// Rerun scoring with the current guesses and answers.
    Score,
    /// Set one official answer, then rescore. A value of "0" clears it.
    SetAnswer { key: AnswerKey, value: String },
    /// Replace the official answers from a TOML file, then rescore.
    LoadAnswers(PathBuf),
    /// Replace the guesses table from a CSV file, then rescore.
    LoadGuesses(PathBuf),
    /// Trigger the lucky draw for a prize category.
    Draw(String),
    /// Per-event breakdown for one participant.
    Show(String),
    /// Current answers, eligibility, and winners.
    Status,
    /// Write the report. Without a path the configured one is used.
    Report(Option<PathBuf>),
    /// Start a new session with an empty draw state.
    Reset,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}' (type 'help' for a list)")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("invalid answer key '{0}' (expected e.g. Race2_1st or OPT3)")]
    BadKey(String),
}

pub const HELP: &str = "\
Commands:
  score                 rerun scoring with the current answers
  set KEY VALUE         set an official answer (e.g. set Race2_1st 5); 0 clears it
  answers PATH          load official answers from a TOML file
  guesses PATH          load participant guesses from a CSV file
  draw CATEGORY         run the lucky draw for a prize category
  show NAME             per-event breakdown for one participant
  status                current answers, eligible pools, and winners
  report [PATH]         write the JSON report and print the text report
  reset                 start a new session (forgets all draw winners)
  help                  show this list
  quit                  exit";

/// Parse one input line. Blank lines yield `Ok(None)`.
///
/// The command word is case-insensitive. Everything after it is kept
/// verbatim (trimmed) so category and participant names may contain spaces.
pub fn parse_command(line: &str) -> Result<Option<UserCommand>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let cmd = match word.to_ascii_lowercase().as_str() {
        "score" => UserCommand::Score,
        "set" => {
            let (key, value) = rest
                .split_once(char::is_whitespace)
                .map(|(k, v)| (k, v.trim()))
                .filter(|(_, v)| !v.is_empty())
                .ok_or(CommandError::Usage("set KEY VALUE"))?;
            let key: AnswerKey = key
                .parse()
                .map_err(|_| CommandError::BadKey(key.to_string()))?;
            UserCommand::SetAnswer {
                key,
                value: value.to_string(),
            }
        }
        "answers" => UserCommand::LoadAnswers(required_path(rest, "answers PATH")?),
        "guesses" => UserCommand::LoadGuesses(required_path(rest, "guesses PATH")?),
        "draw" => UserCommand::Draw(required(rest, "draw CATEGORY")?.to_string()),
        "show" => UserCommand::Show(required(rest, "show NAME")?.to_string()),
        "status" => UserCommand::Status,
        "report" => UserCommand::Report((!rest.is_empty()).then(|| PathBuf::from(rest))),
        "reset" => UserCommand::Reset,
        "help" | "?" => UserCommand::Help,
        "quit" | "exit" | "q" => UserCommand::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(cmd))
}

fn required<'a>(rest: &'a str, usage: &'static str) -> Result<&'a str, CommandError> {
    if rest.is_empty() {
        Err(CommandError::Usage(usage))
    } else {
        Ok(rest)
    }
}

fn required_path(rest: &str, usage: &'static str) -> Result<PathBuf, CommandError> {
    required(rest, usage).map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::event::Place;

    #[test]
    fn blank_line_is_nothing() {
        assert_eq!(parse_command("   "), Ok(None));
    }

    #[test]
    fn simple_commands() {
        assert_eq!(parse_command("score"), Ok(Some(UserCommand::Score)));
        assert_eq!(parse_command("STATUS"), Ok(Some(UserCommand::Status)));
        assert_eq!(parse_command("reset"), Ok(Some(UserCommand::Reset)));
        assert_eq!(parse_command("?"), Ok(Some(UserCommand::Help)));
        assert_eq!(parse_command("exit"), Ok(Some(UserCommand::Quit)));
    }

    #[test]
    fn set_parses_key_and_value() {
        assert_eq!(
            parse_command("set Race2_1st  5"),
            Ok(Some(UserCommand::SetAnswer {
                key: AnswerKey::Race(2, Place::First),
                value: "5".into()
            }))
        );
        assert_eq!(
            parse_command("set opt3 7"),
            Ok(Some(UserCommand::SetAnswer {
                key: AnswerKey::Opt(3),
                value: "7".into()
            }))
        );
    }

    #[test]
    fn set_rejects_bad_input() {
        assert_eq!(parse_command("set"), Err(CommandError::Usage("set KEY VALUE")));
        assert_eq!(parse_command("set Race2_1st"), Err(CommandError::Usage("set KEY VALUE")));
        assert_eq!(
            parse_command("set Race2_4th 5"),
            Err(CommandError::BadKey("Race2_4th".into()))
        );
    }

    #[test]
    fn names_keep_spaces() {
        assert_eq!(
            parse_command("draw Races 2 & 3"),
            Ok(Some(UserCommand::Draw("Races 2 & 3".into())))
        );
        assert_eq!(
            parse_command("show  Mary Ann "),
            Ok(Some(UserCommand::Show("Mary Ann".into())))
        );
        assert_eq!(parse_command("draw"), Err(CommandError::Usage("draw CATEGORY")));
    }

    #[test]
    fn report_path_is_optional() {
        assert_eq!(parse_command("report"), Ok(Some(UserCommand::Report(None))));
        assert_eq!(
            parse_command("report out/r.json"),
            Ok(Some(UserCommand::Report(Some(PathBuf::from("out/r.json")))))
        );
    }

    #[test]
    fn file_commands_need_a_path() {
        assert_eq!(
            parse_command("guesses data/guesses.csv"),
            Ok(Some(UserCommand::LoadGuesses(PathBuf::from("data/guesses.csv"))))
        );
        assert_eq!(parse_command("answers"), Err(CommandError::Usage("answers PATH")));
    }

    #[test]
    fn unknown_command() {
        assert_eq!(parse_command("dance"), Err(CommandError::Unknown("dance".into())));
    }
}
