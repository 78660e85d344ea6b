// src/main.rs
// Margin - terminal harness for the text-analysis core

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use margin::config::Settings;
use margin::{Analyzer, CorrectionObserver, EditorSurface, Host, LineId, Status, StatusSink};
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "margin")]
#[command(about = "Inline solving and streamed corrections for plain text")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve every line ending in `=` and print the updated document
    Solve {
        /// Text file to read
        file: PathBuf,
    },

    /// Stream a correction of the whole file to stdout
    Correct {
        /// Text file to read
        file: PathBuf,

        /// Correction instruction (overrides config)
        #[arg(short, long)]
        prompt: Option<String>,
    },

    /// Validate and print the resolved configuration
    Config,
}

/// Document kept in memory; answers are appended, annotations reported on stderr
struct TerminalSurface {
    lines: Mutex<Vec<String>>,
}

impl EditorSurface for TerminalSurface {
    fn insert_text_at_line_end(&self, line: LineId, text: &str) {
        if let Ok(mut lines) = self.lines.lock()
            && let Some(target) = lines.get_mut(line.index())
        {
            target.push_str(text);
        }
    }

    fn set_line_annotation(&self, line: LineId, range: Range<usize>, message: &str) {
        eprintln!("line {} [{}..{}]: {}", line.index() + 1, range.start, range.end, message);
    }

    fn clear_line_annotation(&self, _line: LineId) {}
}

/// Prints status transitions and streamed text
struct TerminalOutput {
    printed: Mutex<usize>,
    finished: Notify,
}

impl StatusSink for TerminalOutput {
    fn on_status(&self, status: &Status) {
        info!(status = %status, "Status");
    }
}

impl CorrectionObserver for TerminalOutput {
    fn on_delta(&self, text: &str) {
        let Ok(mut printed) = self.printed.lock() else {
            return;
        };
        if let Some(fresh) = text.get(*printed..) {
            print!("{}", fresh);
            let _ = std::io::stdout().flush();
            *printed = text.len();
        }
    }

    fn on_done(&self, text: &str) {
        self.on_delta(text);
        println!();
        self.finished.notify_one();
    }

    fn on_error(&self, error: &str) {
        eprintln!("error: {}", error);
        self.finished.notify_one();
    }

    fn on_cleared(&self) {
        self.finished.notify_one();
    }
}

fn read_document(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

async fn run_solve(settings: &Settings, path: &Path) -> Result<()> {
    let document = read_document(path)?;
    let surface = Arc::new(TerminalSurface {
        lines: Mutex::new(document.lines().map(str::to_string).collect()),
    });
    let output = Arc::new(TerminalOutput {
        printed: Mutex::new(0),
        finished: Notify::new(),
    });
    let analyzer = Analyzer::from_settings(
        settings,
        Host {
            surface: surface.clone(),
            status: output.clone(),
            observer: output,
        },
    );

    let line_count = document.lines().count();
    for index in 0..line_count {
        // re-read so earlier answers are visible to later bindings
        let (text, current) = {
            let lines = surface
                .lines
                .lock()
                .map_err(|_| anyhow::anyhow!("document lock poisoned"))?;
            (lines[index].clone(), lines.join("\n"))
        };
        analyzer
            .on_line_changed(LineId(index), &text, &current)
            .await;
    }

    let lines = surface
        .lines
        .lock()
        .map_err(|_| anyhow::anyhow!("document lock poisoned"))?;
    println!("{}", lines.join("\n"));
    Ok(())
}

async fn run_correct(settings: &Settings, path: &Path, prompt: Option<String>) -> Result<()> {
    let document = read_document(path)?;
    let mut settings = settings.clone();
    if let Some(prompt) = prompt {
        settings.correction_prompt = prompt;
    }

    let output = Arc::new(TerminalOutput {
        printed: Mutex::new(0),
        finished: Notify::new(),
    });
    let analyzer = Analyzer::from_settings(
        &settings,
        Host {
            surface: Arc::new(TerminalSurface {
                lines: Mutex::new(Vec::new()),
            }),
            status: output.clone(),
            observer: output.clone(),
        },
    );

    analyzer.on_document_changed(&document, LineId(0));
    if analyzer.correction_state() == margin::correction::SchedulerState::Idle {
        eprintln!("nothing to correct");
        return Ok(());
    }
    output.finished.notified().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env files (global first, then local - local overrides)
    if let Some(home) = dirs::home_dir() {
        let _ = dotenvy::from_path(home.join(".margin/.env"));
    }
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("margin=info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let settings = Settings::load();

    match cli.command {
        Commands::Solve { file } => run_solve(&settings, &file).await?,
        Commands::Correct { file, prompt } => run_correct(&settings, &file, prompt).await?,
        Commands::Config => {
            println!("solver: {}", settings.solver);
            println!("model: {}", settings.model);
            println!("quiet period: {}ms", settings.quiet_period.as_millis());
            println!("corrections: {}", if settings.has_llm() { "enabled" } else { "disabled" });
            println!("{}", settings.validate().report());
        }
    }

    Ok(())
}
