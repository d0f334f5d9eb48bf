// Race predictor entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, not terminal)
// 2. Load config
// 3. Open database, resolve the session and restore its draw state
// 4. Load guesses and official answers
// 5. Score once (settling single-participant pools), then either write the
//    report (--batch) or run the interactive command loop on stdin/stdout

use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use race_predictor::app::{self, AppState};
use race_predictor::config;
use race_predictor::db::Database;
use race_predictor::protocol::UserCommand;
use race_predictor::scoring::guesses::{load_answers, load_guesses, OfficialOutcomes};

#[derive(Parser, Debug)]
#[command(name = "race-predictor", version, about = "Score race guesses and run prize draws")]
struct Args {
    /// Guesses CSV (overrides config/app.toml)
    #[arg(long)]
    guesses: Option<PathBuf>,

    /// Official answers TOML (overrides config/app.toml)
    #[arg(long)]
    answers: Option<PathBuf>,

    /// Fixed seed for the lucky draw
    #[arg(long)]
    seed: Option<u64>,

    /// JSON report path (overrides config/app.toml)
    #[arg(long)]
    report: Option<PathBuf>,

    /// Score once, write the report and exit
    #[arg(long)]
    batch: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 1. Initialize tracing (log to file, not the terminal)
    init_tracing()?;
    info!("Race predictor starting up");

    // 2. Load config
    let base_dir = std::env::current_dir().context("failed to resolve working directory")?;
    let mut config = config::load_config(&base_dir).context("failed to load configuration")?;
    info!(
        "Config loaded: {} races, {} options, {} prize categories",
        config.schedule.races.len(),
        config.schedule.options.len(),
        config.prizes.len()
    );
    if let Some(path) = &args.report {
        config.report_path = path.display().to_string();
    }
    let seed = args.seed.or(config.draw.seed);

    // 3. Open database and resolve the session
    let db = Database::open(&config.db_path).context("failed to open database")?;
    info!("Database opened at {}", config.db_path);

    let session_id = match db.get_session_id()? {
        Some(id) => id,
        None => {
            let id = Database::generate_session_id();
            db.set_session_id(&id)?;
            id
        }
    };
    info!("Session: {}", session_id);

    // 4. Load inputs. Missing files are not fatal; they can be loaded later.
    let guesses_path = args
        .guesses
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.data_paths.guesses));
    let guesses = match load_guesses(&guesses_path) {
        Ok(rows) => rows,
        Err(e) => {
            warn!("no guesses loaded: {}", e);
            eprintln!("warning: {e}");
            Vec::new()
        }
    };
    let answers_path = args
        .answers
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.data_paths.answers));
    let answers = load_initial_answers(&answers_path);

    let mut state = AppState::new(
        config,
        db,
        session_id,
        guesses,
        answers,
        app::make_rng(seed),
    );

    // Session answers edited interactively take precedence over the file,
    // unless the operator passed --answers explicitly, which starts a fresh run.
    let explicit_answers = args.answers.is_some().then(|| state.answers.clone());
    match app::resume_session(&mut state, explicit_answers) {
        Ok(true) => info!("Draw state restored from previous session"),
        Ok(false) => info!("Starting fresh session"),
        Err(e) => {
            error!("Crash recovery failed: {}", e);
            return Err(e.context("crash recovery failed"));
        }
    }

    if args.batch {
        let out = state.handle_command(UserCommand::Report(None))?;
        for line in &out.lines {
            println!("{line}");
        }
    } else {
        let stdin = io::stdin();
        app::run(&mut state, stdin.lock(), io::stdout().lock())?;
    }

    info!("Race predictor shut down cleanly");
    Ok(())
}

fn load_initial_answers(path: &Path) -> OfficialOutcomes {
    if !path.exists() {
        info!("no answers file at {}; starting with none entered", path.display());
        return OfficialOutcomes::new();
    }
    match load_answers(path) {
        Ok(answers) => answers,
        Err(e) => {
            warn!("answers not loaded: {}", e);
            eprintln!("warning: {e}");
            OfficialOutcomes::new()
        }
    }
}

/// Initialize tracing to log to a file so the command loop's output stays clean.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("race-predictor.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("race_predictor=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
