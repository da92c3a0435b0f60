//! retrace - record a GUI session and replay it later
//!
//! Supported: Windows (recording and replay), macOS (hooks only; the
//! provider reports NOT_IMPLEMENTED). Dry-run replays work everywhere.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use retrace_core::inspect::{self, TreeNode};
use retrace_core::platform;
use retrace_core::prelude::*;
use retrace_core::stub::{MemoryClipboard, ScriptedProvider};
use retrace_recorder::capture::Hotkey;
use retrace_recorder::prelude::*;
use retrace_recorder::{Outcome, StepReport};

const DEFAULT_WINDOW: &str = "WhatsApp";

#[derive(Parser)]
#[command(name = "retrace")]
#[command(about = "retrace - record GUI interactions and replay them with element-aware fallback")]
#[command(version)]
struct Cli {
    /// Storage directory for recordings and history
    #[arg(long, global = true, env = "RETRACE_HOME")]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a session against a window (Ctrl+R saves, Esc discards)
    Record {
        #[arg(short, long, default_value = DEFAULT_WINDOW)]
        window: String,
        /// Key that captures the current text selection
        #[arg(long, default_value = "f8")]
        capture_key: String,
        /// Shortest selection kept by a capture, in characters
        #[arg(long, default_value = "3")]
        min_capture: usize,
    },
    /// Replay a .retrace artifact or a .jsonl data file
    Replay {
        file: PathBuf,
        /// Run against an in-memory desktop instead of the real one
        #[arg(long)]
        dry_run: bool,
        /// Skip the delays between steps
        #[arg(long)]
        fast: bool,
    },
    /// Dump a live window's control tree and look up elements by name.
    /// With a FILE, show what a recording contains instead.
    Inspect {
        file: Option<PathBuf>,
        #[arg(short, long, default_value = DEFAULT_WINDOW)]
        window: String,
        /// Levels of the control tree to print below the window
        #[arg(short, long, default_value_t = inspect::DEFAULT_DEPTH)]
        depth: usize,
        /// Print elements whose name contains this text and exit
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Show the most recent session
    Last,
    /// List recent sessions, newest first
    History {
        #[arg(short, long, default_value = "5")]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Interactive menu (default)
    Menu,
}

#[derive(Serialize)]
struct Output<T: Serialize> {
    success: bool,
    data: T,
}

impl<T: Serialize> Output<T> {
    fn ok(data: T) -> Self {
        Self { success: true, data }
    }
}

fn print_json<T: Serialize>(output: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(output)?);
    Ok(())
}

/// Raised by Ctrl+C. During a recording it cancels the session; anywhere
/// else it ends the process.
struct Interrupt {
    raised: Arc<AtomicBool>,
    recording: Arc<AtomicBool>,
}

impl Interrupt {
    fn install() -> Result<Self> {
        let raised = Arc::new(AtomicBool::new(false));
        let recording = Arc::new(AtomicBool::new(false));
        let (r, rec) = (Arc::clone(&raised), Arc::clone(&recording));
        ctrlc::set_handler(move || {
            if rec.load(Ordering::SeqCst) {
                r.store(true, Ordering::SeqCst);
            } else {
                std::process::exit(130);
            }
        })?;
        Ok(Self { raised, recording })
    }
}

// ── Main ────────────────────────────────────────────────────────────────────

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let store = match &cli.dir {
        Some(dir) => SessionStore::with_dir(dir)?,
        None => SessionStore::new()?,
    };
    debug!(dir = %store.dir().display(), "storage directory");
    let interrupt = Interrupt::install()?;

    match cli.command.unwrap_or(Commands::Menu) {
        Commands::Record { window, capture_key, min_capture } => {
            let config = RecorderConfig {
                capture_hotkey: Hotkey::parse(&capture_key),
                min_capture_len: min_capture,
                ..RecorderConfig::default()
            };
            record(&store, &window, config, &interrupt)
        }
        Commands::Replay { file, dry_run, fast } => replay(&store, &file, dry_run, fast),
        Commands::Inspect { file: Some(file), .. } => inspect_file(&store, &file),
        Commands::Inspect { file: None, window, depth, search } => {
            inspect_live(&window, depth, search.as_deref())
        }
        Commands::Last => last(&store),
        Commands::History { limit, json } => history(&store, limit, json),
        Commands::Menu => menu(&store, &interrupt),
    }
}

// ── Recording ───────────────────────────────────────────────────────────────

fn record(store: &SessionStore, window: &str, config: RecorderConfig, interrupt: &Interrupt) -> Result<()> {
    let provider = Arc::new(platform::provider()?);
    let capture_key = config.capture_hotkey.clone();
    let recorder = ActionRecorder::new(provider, SystemClipboard::new(), config);
    let capture_config = CaptureConfig::default();

    println!("Recording '{}'", window);
    println!(
        "  {} captures selected text, {} saves, {} discards",
        capture_key, capture_config.stop_hotkey, capture_config.cancel_hotkey
    );
    let mut capture = EventCapture::new(system_source(), capture_config);

    interrupt.raised.store(false, Ordering::SeqCst);
    interrupt.recording.store(true, Ordering::SeqCst);
    let outcome = run_recording(recorder, &mut capture, window, &interrupt.raised, |feedback| {
        match feedback {
            Feedback::Recorded(line) => println!("  + {}", line),
            Feedback::Capture(outcome) => println!("  {}", outcome.message()),
        }
    });
    interrupt.recording.store(false, Ordering::SeqCst);

    match outcome? {
        SessionOutcome::Saved(session) => save_with_retry(store, &session),
        SessionOutcome::Discarded { actions } => {
            println!("Recording discarded ({} actions)", actions);
            Ok(())
        }
    }
}

fn save_with_retry(store: &SessionStore, session: &RecordedSession) -> Result<()> {
    loop {
        match store.save(session) {
            Ok(record) => {
                println!("\nSaved {} actions", record.action_count);
                print_record(&record);
                return Ok(());
            }
            Err(e) => {
                eprintln!("Save failed: {:#}", e);
                if !confirm("Retry? [y/N] ")? {
                    println!("Session not saved ({} actions lost)", session.log.len());
                    return Ok(());
                }
            }
        }
    }
}

// ── Replay ──────────────────────────────────────────────────────────────────

fn is_data_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "jsonl")
}

fn load_procedure(store: &SessionStore, path: &Path) -> Result<Procedure> {
    if is_data_file(path) {
        let session = store.load_session(path)?;
        Ok(Procedure::from_session(&session, &Pacing::default()))
    } else {
        store.load_procedure(path)
    }
}

fn print_step(report: &StepReport) {
    let mark = match &report.outcome {
        Outcome::Failed { .. } => "FAIL",
        o if o.is_warning() => "WARN",
        _ => " ok ",
    };
    print!("[{}] {:>3}. {} -> {}", mark, report.step, report.description, report.outcome.label());
    match &report.outcome {
        Outcome::FallbackSucceeded { reason }
        | Outcome::ClipboardMismatch { reason }
        | Outcome::Failed { reason } => println!(" ({})", reason),
        _ => println!(),
    }
}

fn replay(store: &SessionStore, path: &Path, dry_run: bool, fast: bool) -> Result<()> {
    let mut procedure = load_procedure(store, path)?;
    if fast || dry_run {
        procedure = procedure.with_pacing(&Pacing::none());
    }
    println!("Replaying {} steps against '{}'", procedure.steps.len(), procedure.target);

    let report = if dry_run {
        let provider = Arc::new(ScriptedProvider::permissive());
        ReplayEngine::new(provider, MemoryClipboard::new()).play_with(&procedure, print_step)?
    } else {
        let provider = Arc::new(platform::provider()?);
        println!("Starting in 2 seconds...");
        std::thread::sleep(Duration::from_secs(2));
        ReplayEngine::new(provider, SystemClipboard::new()).play_with(&procedure, print_step)?
    };

    println!("\n{}", report.summary());
    if !report.passed() {
        bail!("{} of {} steps failed", report.failed(), report.steps.len());
    }
    Ok(())
}

// ── Inspection ──────────────────────────────────────────────────────────────

fn inspect_file(store: &SessionStore, path: &Path) -> Result<()> {
    if is_data_file(path) {
        let session = store.load_session(path)?;
        println!("Target:   {}", session.target);
        println!("Started:  {}", session.started_at.format("%Y-%m-%d %H:%M:%S"));
        println!("Duration: {:.1}s", session.duration().num_milliseconds() as f64 / 1000.0);
        println!(
            "Actions:  {} ({} messages, {} captures)",
            session.log.len(),
            session.log.message_count(),
            session.log.selected_count()
        );
        println!();
        for (i, action) in session.log.iter().enumerate() {
            println!("{:>3}. {}", i + 1, action.describe());
        }
    } else {
        let procedure = store.load_procedure(path)?;
        println!("Target: {}", procedure.target);
        println!("Steps:  {}", procedure.steps.len());
        println!();
        for (i, step) in procedure.steps.iter().enumerate() {
            println!("{:>3}. {} (wait {}ms)", i + 1, step.action.describe(), step.delay.as_millis());
        }
    }
    Ok(())
}

/// Connect to `window`, print its control tree, then either run one name
/// search or keep prompting for names until an empty line.
fn inspect_live(window: &str, depth: usize, search: Option<&str>) -> Result<()> {
    let provider = platform::provider()?;
    let root = provider.connect(window)?;
    println!("Connected to '{}'", window);
    println!("\nControl tree (depth {}):", depth);
    for node in inspect::dump_tree(&provider, &root, depth)? {
        println!("  {}", node.line());
    }

    if let Some(needle) = search {
        let found = inspect::search_by_name(&provider, &root, needle, inspect::SEARCH_DEPTH)?;
        print_matches(needle, &found);
        return Ok(());
    }

    loop {
        let Some(needle) = prompt("\nElement name to find (empty to finish): ")? else {
            return Ok(());
        };
        if needle.is_empty() || needle.eq_ignore_ascii_case("quit") {
            return Ok(());
        }
        match inspect::search_by_name(&provider, &root, &needle, inspect::SEARCH_DEPTH) {
            Ok(found) => print_matches(&needle, &found),
            Err(e) => eprintln!("Search failed: {}", e),
        }
    }
}

fn print_matches(needle: &str, found: &[TreeNode]) {
    if found.is_empty() {
        println!("No elements named like '{}'", needle);
        return;
    }
    println!("{} element(s) named like '{}':", found.len(), needle);
    for (i, node) in found.iter().enumerate() {
        let d = &node.descriptor;
        println!(
            "  {:>2}. {} '{}' (depth {}, id: {})",
            i + 1,
            d.control_type,
            d.name,
            node.depth,
            d.automation_id.as_deref().unwrap_or("-")
        );
    }
}

fn print_record(record: &SessionRecord) {
    let mark = |exists: bool| if exists { "" } else { " (missing)" };
    println!("  When:     {}", record.start_time.format("%Y-%m-%d %H:%M:%S"));
    println!("  Duration: {:.1}s", record.duration.as_secs_f64());
    println!(
        "  Actions:  {} ({} messages, {} captures)",
        record.action_count, record.message_count, record.selected_count
    );
    println!("  Replay:   {}{}", record.artifact_ref.display(), mark(record.artifact_exists()));
    println!("  Data:     {}{}", record.data_ref.display(), mark(record.data_exists()));
    for line in &record.summary {
        println!("    - {}", line);
    }
    let more = record.unsummarized();
    if more > 0 {
        println!("    ... and {} more", more);
    }
}

fn last(store: &SessionStore) -> Result<()> {
    match store.last() {
        Some(record) => {
            println!("Last session:");
            print_record(&record);
        }
        None => println!("No recordings yet."),
    }
    Ok(())
}

fn history(store: &SessionStore, limit: usize, json: bool) -> Result<()> {
    let history = store.load_history();
    let records: Vec<&SessionRecord> = history.recent(limit).collect();
    if json {
        return print_json(&Output::ok(records));
    }
    if records.is_empty() {
        println!("No recordings yet.");
        return Ok(());
    }
    println!("{} of {} sessions:", records.len(), history.len());
    for record in records {
        println!(
            "  {}  {:>6.1}s  {:>4} actions  {}",
            record.start_time.format("%Y-%m-%d %H:%M:%S"),
            record.duration.as_secs_f64(),
            record.action_count,
            record.artifact_ref.display()
        );
    }
    Ok(())
}

// ── Interactive menu ────────────────────────────────────────────────────────

fn prompt(label: &str) -> Result<Option<String>> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn confirm(label: &str) -> Result<bool> {
    Ok(prompt(label)?.is_some_and(|answer| answer.eq_ignore_ascii_case("y")))
}

fn menu(store: &SessionStore, interrupt: &Interrupt) -> Result<()> {
    loop {
        println!();
        println!("retrace");
        println!("  1) Record a session");
        println!("  2) Inspect the live window");
        println!("  3) Inspect a recording");
        println!("  4) View last session");
        println!("  5) View history");
        println!("  6) Exit");

        let Some(choice) = prompt("> ")? else {
            return Ok(());
        };
        let result = match choice.as_str() {
            "1" => {
                let window = prompt(&format!("Window title [{}]: ", DEFAULT_WINDOW))?.unwrap_or_default();
                let window = if window.is_empty() { DEFAULT_WINDOW.to_string() } else { window };
                record(store, &window, RecorderConfig::default(), interrupt)
            }
            "2" => {
                let window = prompt(&format!("Window title [{}]: ", DEFAULT_WINDOW))?.unwrap_or_default();
                let window = if window.is_empty() { DEFAULT_WINDOW.to_string() } else { window };
                inspect_live(&window, inspect::DEFAULT_DEPTH, None)
            }
            "3" => {
                let default = store.last().map(|r| r.data_ref);
                let hint = default.as_ref().map(|p| p.display().to_string()).unwrap_or_default();
                let input = prompt(&format!("File [{}]: ", hint))?.unwrap_or_default();
                match (input.is_empty(), default) {
                    (false, _) => inspect_file(store, Path::new(&input)),
                    (true, Some(path)) => inspect_file(store, &path),
                    (true, None) => {
                        println!("No recordings yet.");
                        Ok(())
                    }
                }
            }
            "4" => last(store),
            "5" => history(store, 10, false),
            "6" | "q" | "exit" => return Ok(()),
            other => {
                println!("Unknown choice: {}", other);
                Ok(())
            }
        };
        // Menu actions report and keep going
        if let Err(e) = result {
            eprintln!("Error: {:#}", e);
        }
    }
}
