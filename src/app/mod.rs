mod printer;

pub use printer::{format_config_fields, format_help, format_status, LineStyle, Printer};

use crate::commands::{parse_command, Command};
use crate::config::{change_summary, Config, ConfigField};
use crate::state::{History, SessionController, SessionUpdate, TurnOutcome};
use crate::tools::FileOperations;
use anyhow::{Context, Result};
use chrono::Utc;
use std::io;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const TIMEOUT_HINT: &str =
    "The model took too long to answer. Raise the limit with /config timeout_seconds";

/// Line-oriented chat front end over one [`SessionController`].
pub struct App {
    controller: SessionController,
    printer: Printer<io::Stdout>,
    config_path: PathBuf,
    should_quit: bool,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let printer = Printer::stdout(config.ui.enable_emoji);
        let controller = SessionController::new(config)?;
        Ok(Self {
            controller,
            printer,
            config_path: Config::config_path(),
            should_quit: false,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        self.print_banner()?;

        while !self.should_quit {
            self.printer.print_prompt()?;
            let line = tokio::select! {
                line = lines.next_line() => line.context("Failed to read input")?,
                result = tokio::signal::ctrl_c() => {
                    result.context("Failed to listen for Ctrl+C")?;
                    None
                }
            };
            let Some(line) = line else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }

            if let Err(error) = self.handle_input(&line).await {
                self.printer.print_error(&format!("{error:#}"))?;
            }
        }

        tracing::info!("session ended");
        Ok(())
    }

    fn print_banner(&mut self) -> Result<()> {
        let config = self.controller.config();
        let banner = format!(
            "* Riptide ready ({} @ {})",
            config.api.model, config.api.base_url
        );
        self.printer.line(LineStyle::Event, &banner)?;
        self.printer
            .line(LineStyle::Event, "  └ /help lists commands, Ctrl+C cancels a response")
    }

    async fn handle_input(&mut self, line: &str) -> Result<()> {
        match parse_command(line) {
            Command::Chat(input) => self.run_turn(input).await,
            Command::Add(path) => {
                let message = self.add_to_context(&path)?;
                self.printer.line(LineStyle::Success, &message)
            }
            Command::Clear => {
                self.controller.history().clear();
                self.printer.line(LineStyle::Event, "* Cleared conversation history")
            }
            Command::Config(None) => {
                let listing = format_config_fields(self.controller.config());
                self.printer.line(LineStyle::Normal, &listing)
            }
            Command::Config(Some(field)) => self.cycle_config(field),
            Command::Help => self.printer.line(LineStyle::Normal, &format_help()),
            Command::Status => {
                let stats = self.controller.history().stats();
                let status = format_status(self.controller.config(), &stats, Utc::now());
                self.printer.line(LineStyle::Normal, &status)
            }
            Command::Quit => {
                self.should_quit = true;
                Ok(())
            }
            Command::Invalid(message) => self.printer.print_error(&message),
        }
    }

    fn add_to_context(&self, path: &str) -> Result<String> {
        let config = self.controller.config();
        let files = FileOperations::new(
            config.working_dir.clone(),
            config.file_operations.max_file_size_mb,
        );
        add_path_to_context(&files, &self.controller.history(), path)
    }

    fn cycle_config(&mut self, field: ConfigField) -> Result<()> {
        let before = self.controller.config().clone();
        let mut after = before.clone();
        let value = field.cycle(&mut after);
        after.validate()?;
        after
            .save(&self.config_path)
            .with_context(|| format!("Failed to save {}", self.config_path.display()))?;
        self.controller.reconfigure(after.clone())?;
        self.printer.set_emoji_enabled(after.ui.enable_emoji);
        tracing::info!(field = field.key(), %value, "config updated");

        let summary = change_summary(&before, &after).unwrap_or_else(|| "No changes made".into());
        self.printer.line(LineStyle::Success, &summary)
    }

    /// Streams one turn while rendering its updates. Ctrl+C cancels the turn, not the app.
    async fn run_turn(&mut self, input: String) -> Result<()> {
        let cancel = CancellationToken::new();
        let (update_tx, mut update_rx) = mpsc::unbounded_channel::<SessionUpdate>();
        self.printer.begin_turn();

        let outcome = {
            let printer = &mut self.printer;
            let turn = self
                .controller
                .submit(input, cancel.clone(), Some(&update_tx));
            tokio::pin!(turn);

            loop {
                tokio::select! {
                    outcome = &mut turn => break outcome,
                    Some(update) = update_rx.recv() => printer.render(&update)?,
                    result = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                        result.context("Failed to listen for Ctrl+C")?;
                        tracing::info!("cancel requested");
                        cancel.cancel();
                    }
                }
            }
        };

        while let Ok(update) = update_rx.try_recv() {
            self.printer.render(&update)?;
        }

        match outcome {
            TurnOutcome::Completed { tool_rounds, .. } => {
                tracing::debug!(tool_rounds, "turn completed");
            }
            TurnOutcome::Failed {
                is_timeout: true, ..
            } => self.printer.line(LineStyle::Event, TIMEOUT_HINT)?,
            TurnOutcome::Failed { .. } | TurnOutcome::Cancelled => {}
        }
        Ok(())
    }
}

const LISTED_CONTEXT_FILES: usize = 10;

fn add_path_to_context(files: &FileOperations, history: &History, path: &str) -> Result<String> {
    if files.is_directory(path)? {
        add_directory_to_context(files, history, path)
    } else {
        add_file_to_context(files, history, path)
    }
}

/// Injects every eligible file under a directory, one system message per file.
fn add_directory_to_context(
    files: &FileOperations,
    history: &History,
    path: &str,
) -> Result<String> {
    let shown = match files.context_path(path)? {
        shown if shown.is_empty() => ".".to_string(),
        shown => shown,
    };
    let scan = files.scan_directory(path)?;

    let mut added = Vec::new();
    let mut already_present = 0usize;
    let mut failures = Vec::new();
    for file in &scan.added {
        let relative = file.to_string_lossy();
        if history.file_already_in_context(&relative) {
            already_present += 1;
            continue;
        }
        match files.read_file_for_context(&relative) {
            Ok(content) => {
                history.add_system_message(content);
                added.push(relative.to_string());
            }
            Err(error) => failures.push(format!("{relative}: {error:#}")),
        }
    }
    tracing::info!(
        path = %shown,
        added = added.len(),
        skipped = scan.skipped.len(),
        "directory added to context"
    );

    let mut lines = vec![
        format!("* Added folder '{shown}' to context"),
        format!(
            "  └ {} added, {already_present} already in context, {} skipped",
            added.len(),
            scan.skipped.len()
        ),
    ];
    lines.extend(
        added
            .iter()
            .take(LISTED_CONTEXT_FILES)
            .map(|file| format!("    {file}")),
    );
    if added.len() > LISTED_CONTEXT_FILES {
        lines.push(format!("    ... and {} more", added.len() - LISTED_CONTEXT_FILES));
    }
    lines.extend(failures.iter().chain(&scan.errors).map(|e| format!("  ✗ {e}")));
    Ok(lines.join("\n"))
}

/// Injects a file as a system message unless it is already in context.
fn add_file_to_context(files: &FileOperations, history: &History, path: &str) -> Result<String> {
    let shown = files.context_path(path)?;
    if history.file_already_in_context(&shown) {
        return Ok(format!("* '{shown}' is already in context"));
    }

    let content = files.read_file_for_context(path)?;
    history.add_system_message(content);
    tracing::info!(path = %shown, "file added to context");
    Ok(format!("* Added '{shown}' to context"))
}
