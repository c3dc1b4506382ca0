use crate::commands::COMMANDS;
use crate::config::{Config, ConfigField};
use crate::state::usage::{
    time_until_off_peak, CACHED_PRICE_PER_MILLION, INPUT_PRICE_PER_MILLION,
    OFF_PEAK_MULTIPLIER, OUTPUT_PRICE_PER_MILLION,
};
use crate::state::{estimate_cost, ConversationStats, SessionUpdate};
use crate::types::ToolCall;
use crate::util::{parse_bool_str, text_stats};
use anyhow::Result;
use chrono::{DateTime, Utc};
use crossterm::style::{Color, Stylize};
use std::io::{self, IsTerminal, Write};

const TOOL_ARGS_PREVIEW_CHARS: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    Normal,
    Thinking,
    Tool,
    Event,
    Error,
    Success,
}

impl LineStyle {
    fn color(self) -> Option<Color> {
        match self {
            LineStyle::Normal => None,
            LineStyle::Thinking => Some(Color::DarkGrey),
            LineStyle::Tool => Some(Color::Yellow),
            LineStyle::Event => Some(Color::Cyan),
            LineStyle::Error => Some(Color::Red),
            LineStyle::Success => Some(Color::Green),
        }
    }
}

/// Renders controller updates as a scrolling transcript.
///
/// Updates carry whole buffers, so the printer remembers how much of each buffer is already
/// on screen and writes only the new tail.
pub struct Printer<W: Write> {
    out: W,
    colors_enabled: bool,
    emoji_enabled: bool,
    reasoning_shown: usize,
    content_shown: usize,
    at_line_start: bool,
}

impl Printer<io::Stdout> {
    pub fn stdout(emoji_enabled: bool) -> Self {
        Self::new(io::stdout(), detect_color_support(), emoji_enabled)
    }
}

impl<W: Write> Printer<W> {
    pub fn new(out: W, colors_enabled: bool, emoji_enabled: bool) -> Self {
        Self {
            out,
            colors_enabled,
            emoji_enabled,
            reasoning_shown: 0,
            content_shown: 0,
            at_line_start: true,
        }
    }

    pub fn set_emoji_enabled(&mut self, enabled: bool) {
        self.emoji_enabled = enabled;
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    fn paint(&self, style: LineStyle, text: &str) -> String {
        match style.color() {
            Some(color) if self.colors_enabled => text.with(color).to_string(),
            _ => text.to_string(),
        }
    }

    fn write_styled(&mut self, style: LineStyle, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let painted = self.paint(style, text);
        write!(self.out, "{painted}")?;
        self.at_line_start = text.ends_with('\n');
        self.out.flush()?;
        Ok(())
    }

    fn ensure_newline(&mut self) -> Result<()> {
        if !self.at_line_start {
            writeln!(self.out)?;
            self.at_line_start = true;
        }
        Ok(())
    }

    pub fn line(&mut self, style: LineStyle, text: &str) -> Result<()> {
        self.ensure_newline()?;
        self.write_styled(style, &format!("{text}\n"))
    }

    pub fn print_prompt(&mut self) -> Result<()> {
        self.ensure_newline()?;
        let marker = if self.emoji_enabled { "🌊 > " } else { "> " };
        write!(self.out, "{marker}")?;
        self.out.flush()?;
        // The user's Enter key ends the line.
        Ok(())
    }

    pub fn print_error(&mut self, message: &str) -> Result<()> {
        self.line(LineStyle::Error, &format!("* Error: {message}"))
    }

    pub fn begin_turn(&mut self) {
        self.reasoning_shown = 0;
        self.content_shown = 0;
    }

    pub fn render(&mut self, update: &SessionUpdate) -> Result<()> {
        match update {
            SessionUpdate::ReasoningStarted => {
                let header = if self.emoji_enabled { "💭 Thinking" } else { "* Thinking" };
                self.line(LineStyle::Thinking, header)?;
            }
            SessionUpdate::Reasoning(buffer) => {
                let tail = unseen_tail(buffer, &mut self.reasoning_shown).to_string();
                self.write_styled(LineStyle::Thinking, &tail)?;
            }
            SessionUpdate::ReasoningFinished => {
                self.ensure_newline()?;
                writeln!(self.out)?;
            }
            SessionUpdate::Content(buffer) => {
                let tail = unseen_tail(buffer, &mut self.content_shown).to_string();
                self.write_styled(LineStyle::Normal, &tail)?;
            }
            SessionUpdate::ToolCallsReady(_) => {}
            SessionUpdate::ToolStarted { index, total, call } => {
                self.line(
                    LineStyle::Tool,
                    &format!("* Tool {}/{}: {}", index + 1, total, tool_call_label(call)),
                )?;
            }
            SessionUpdate::ToolFinished {
                output, success, ..
            } => {
                if *success {
                    let (chars, lines) = text_stats(output);
                    self.line(
                        LineStyle::Success,
                        &format!("  └ done ({chars} chars, {lines} lines)"),
                    )?;
                } else {
                    self.line(LineStyle::Error, &format!("  └ {}", first_line(output)))?;
                }
            }
            SessionUpdate::FollowUp => {
                // A follow-up request starts with empty buffers.
                self.begin_turn();
                self.ensure_newline()?;
            }
            SessionUpdate::Usage(_) => {}
            SessionUpdate::Error { message, .. } => self.print_error(message)?,
            SessionUpdate::Cancelled => {
                self.line(LineStyle::Event, "* Prompt")?;
                self.line(LineStyle::Event, "  └ cancelled current response")?;
            }
            SessionUpdate::TurnComplete => self.ensure_newline()?,
        }
        Ok(())
    }
}

/// Slice of `buffer` past `shown`, advancing `shown` to the end.
fn unseen_tail<'a>(buffer: &'a str, shown: &mut usize) -> &'a str {
    let tail = buffer.get(*shown..).unwrap_or(buffer);
    *shown = buffer.len();
    tail
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

fn tool_call_label(call: &ToolCall) -> String {
    let args = call.function.arguments.trim();
    let preview: String = args.chars().take(TOOL_ARGS_PREVIEW_CHARS).collect();
    let ellipsis = if args.chars().count() > TOOL_ARGS_PREVIEW_CHARS {
        "..."
    } else {
        ""
    };
    format!("{}({preview}{ellipsis})", call.function.name)
}

pub fn format_help() -> String {
    let mut lines = vec!["* Commands".to_string()];
    for spec in COMMANDS {
        lines.push(format!("  {:<18} {}", spec.usage, spec.description));
    }
    lines.push("  exit, quit         Leave the session".to_string());
    lines.push("  Ctrl+C             Cancel the current response".to_string());
    lines.join("\n")
}

pub fn format_config_fields(config: &Config) -> String {
    let mut lines = vec!["* Config".to_string()];
    for field in ConfigField::ALL {
        lines.push(format!(
            "  {:<22} {:<18} {}",
            field.key(),
            field.current(config).to_string(),
            field.description()
        ));
    }
    lines.push("  └ /config <field> cycles to the next value".to_string());
    lines.join("\n")
}

pub fn format_status(config: &Config, stats: &ConversationStats, now: DateTime<Utc>) -> String {
    let usage = stats.usage.total;
    let pricing = match time_until_off_peak(now) {
        None => format!(
            "off-peak ({}% of list price) until 00:30 UTC",
            (OFF_PEAK_MULTIPLIER * 100.0).round()
        ),
        Some(wait) => format!(
            "regular; off-peak starts in {}h {:02}m",
            wait.num_hours(),
            wait.num_minutes() % 60
        ),
    };

    [
        "* Status".to_string(),
        format!("  model      {}", config.api.model),
        format!("  endpoint   {}", config.api.base_url),
        format!(
            "  messages   {} total ({} system, {} user, {} assistant, {} tool)",
            stats.total_messages,
            stats.system_messages,
            stats.user_messages,
            stats.assistant_messages,
            stats.tool_messages
        ),
        format!(
            "  tokens     {} input, {} output, {} cached",
            usage.input_tokens, usage.output_tokens, usage.cached_tokens
        ),
        format!("  cost       ${:.4}", estimate_cost(&stats.usage)),
        format!(
            "  prices     ${INPUT_PRICE_PER_MILLION}/M input, ${OUTPUT_PRICE_PER_MILLION}/M output, ${CACHED_PRICE_PER_MILLION}/M cached"
        ),
        format!("  pricing    {pricing}"),
    ]
    .join("\n")
}

fn detect_color_support() -> bool {
    if std::env::var("RIPTIDE_FORCE_COLOR")
        .ok()
        .and_then(|value| parse_bool_str(&value))
        .unwrap_or(false)
    {
        return true;
    }

    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }

    io::stdout().is_terminal()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::UsageCounters;
    use crate::types::TokenUsage;
    use chrono::TimeZone;

    fn rendered(updates: &[SessionUpdate]) -> String {
        let mut printer = Printer::new(Vec::new(), false, false);
        printer.begin_turn();
        for update in updates {
            printer.render(update).unwrap();
        }
        String::from_utf8(printer.into_inner()).unwrap()
    }

    #[test]
    fn test_cumulative_updates_print_each_fragment_once() {
        let output = rendered(&[
            SessionUpdate::ReasoningStarted,
            SessionUpdate::Reasoning("Let me".into()),
            SessionUpdate::Reasoning("Let me think".into()),
            SessionUpdate::ReasoningFinished,
            SessionUpdate::Content("Hel".into()),
            SessionUpdate::Content("Hello".into()),
            SessionUpdate::TurnComplete,
        ]);
        assert_eq!(output, "* Thinking\nLet me think\n\nHello\n");
    }

    #[test]
    fn test_follow_up_restarts_content_offsets() {
        let output = rendered(&[
            SessionUpdate::Content("Reading".into()),
            SessionUpdate::ToolStarted {
                index: 0,
                total: 1,
                call: ToolCall::function("c1", "read_file", r#"{"file_path":"a.rs"}"#),
            },
            SessionUpdate::ToolFinished {
                call_id: "c1".into(),
                name: "read_file".into(),
                output: "line one\nline two".into(),
                success: true,
            },
            SessionUpdate::FollowUp,
            SessionUpdate::Content("Done".into()),
            SessionUpdate::TurnComplete,
        ]);
        assert_eq!(
            output,
            "Reading\n* Tool 1/1: read_file({\"file_path\":\"a.rs\"})\n  └ done (17 chars, 2 lines)\nDone\n"
        );
    }

    #[test]
    fn test_failed_tool_shows_first_error_line() {
        let output = rendered(&[SessionUpdate::ToolFinished {
            call_id: "c1".into(),
            name: "edit_file".into(),
            output: "Error: original snippet not found in file\ncontext".into(),
            success: false,
        }]);
        assert_eq!(output, "  └ Error: original snippet not found in file\n");
    }

    #[test]
    fn test_error_and_cancel_rendering() {
        let output = rendered(&[
            SessionUpdate::Content("partial".into()),
            SessionUpdate::Error {
                message: "request timed out after 5s".into(),
                is_timeout: true,
            },
        ]);
        assert_eq!(output, "partial\n* Error: request timed out after 5s\n");

        let output = rendered(&[SessionUpdate::Cancelled]);
        assert!(output.contains("cancelled current response"));
    }

    #[test]
    fn test_tool_label_truncates_long_arguments() {
        let args = format!(r#"{{"content":"{}"}}"#, "x".repeat(200));
        let label = tool_call_label(&ToolCall::function("c", "create_file", &args));
        assert!(label.starts_with("create_file({\"content\":\"xxx"));
        assert!(label.ends_with("...)"));
    }

    #[test]
    fn test_help_lists_every_command() {
        let help = format_help();
        for spec in COMMANDS {
            assert!(help.contains(spec.usage));
            assert!(help.contains(spec.description));
        }
    }

    #[test]
    fn test_status_reports_counts_cost_and_pricing_window() {
        let mut usage = UsageCounters::default();
        usage.record(
            TokenUsage {
                input_tokens: 1_000_000,
                output_tokens: 0,
                cached_tokens: 0,
            },
            Utc.with_ymd_and_hms(2025, 3, 14, 10, 0, 0).unwrap(),
        );
        let stats = ConversationStats {
            total_messages: 3,
            system_messages: 1,
            user_messages: 1,
            assistant_messages: 1,
            tool_messages: 0,
            usage,
        };

        let regular = format_status(
            &Config::default(),
            &stats,
            Utc.with_ymd_and_hms(2025, 3, 14, 14, 15, 0).unwrap(),
        );
        assert!(regular.contains("deepseek-reasoner"));
        assert!(regular.contains("3 total (1 system, 1 user, 1 assistant, 0 tool)"));
        assert!(regular.contains("$0.5500"));
        assert!(regular.contains("off-peak starts in 2h 15m"));

        let off_peak = format_status(
            &Config::default(),
            &stats,
            Utc.with_ymd_and_hms(2025, 3, 14, 20, 0, 0).unwrap(),
        );
        assert!(off_peak.contains("off-peak (25% of list price)"));
    }

    #[test]
    fn test_config_listing_shows_current_values() {
        let listing = format_config_fields(&Config::default());
        assert!(listing.contains("timeout_seconds"));
        assert!(listing.contains("300"));
        assert!(listing.contains("Maximum file size to read"));
    }
}
