use super::Config;
use std::fmt;

/// A user-adjustable setting with a closed domain of legal values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigField {
    Model,
    Theme,
    EnableEmoji,
    MaxHistoryMessages,
    MaxCompletionTokens,
    TimeoutSeconds,
    MaxFileSizeMb,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Flag(bool),
    Number(u64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(text) => f.write_str(text),
            FieldValue::Flag(flag) => write!(f, "{flag}"),
            FieldValue::Number(number) => write!(f, "{number}"),
        }
    }
}

const MODELS: [&str; 2] = ["deepseek-reasoner", "deepseek-chat"];
const THEMES: [&str; 3] = ["default", "dark", "light"];
const HISTORY_SIZES: [u64; 5] = [10, 15, 20, 30, 50];
const COMPLETION_TOKENS: [u64; 3] = [32_000, 64_000, 128_000];
const TIMEOUTS: [u64; 3] = [120, 300, 600];
const FILE_SIZES_MB: [u64; 4] = [1, 5, 10, 20];

impl ConfigField {
    pub const ALL: [ConfigField; 7] = [
        ConfigField::Model,
        ConfigField::Theme,
        ConfigField::EnableEmoji,
        ConfigField::MaxHistoryMessages,
        ConfigField::MaxCompletionTokens,
        ConfigField::TimeoutSeconds,
        ConfigField::MaxFileSizeMb,
    ];

    pub fn key(self) -> &'static str {
        match self {
            ConfigField::Model => "model",
            ConfigField::Theme => "theme",
            ConfigField::EnableEmoji => "enable_emoji",
            ConfigField::MaxHistoryMessages => "max_history_messages",
            ConfigField::MaxCompletionTokens => "max_completion_tokens",
            ConfigField::TimeoutSeconds => "timeout_seconds",
            ConfigField::MaxFileSizeMb => "max_file_size_mb",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ConfigField::Model => "Model",
            ConfigField::Theme => "Theme",
            ConfigField::EnableEmoji => "Enable Emoji",
            ConfigField::MaxHistoryMessages => "Max History Messages",
            ConfigField::MaxCompletionTokens => "Max Completion Tokens",
            ConfigField::TimeoutSeconds => "Timeout (seconds)",
            ConfigField::MaxFileSizeMb => "Max File Size (MB)",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ConfigField::Model => "DeepSeek model to use",
            ConfigField::Theme => "UI theme",
            ConfigField::EnableEmoji => "Show emoji in UI",
            ConfigField::MaxHistoryMessages => "Maximum messages to keep in history",
            ConfigField::MaxCompletionTokens => "Maximum tokens for completion",
            ConfigField::TimeoutSeconds => "API timeout in seconds",
            ConfigField::MaxFileSizeMb => "Maximum file size to read",
        }
    }

    /// Looks a field up by its key, with `-` accepted in place of `_`.
    pub fn from_key(key: &str) -> Option<Self> {
        let normalized = key.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL.into_iter().find(|field| field.key() == normalized)
    }

    pub fn domain(self) -> Vec<FieldValue> {
        let text = |values: &[&str]| {
            values
                .iter()
                .map(|v| FieldValue::Text(v.to_string()))
                .collect()
        };
        let numbers = |values: &[u64]| values.iter().copied().map(FieldValue::Number).collect();
        match self {
            ConfigField::Model => text(&MODELS),
            ConfigField::Theme => text(&THEMES),
            ConfigField::EnableEmoji => vec![FieldValue::Flag(true), FieldValue::Flag(false)],
            ConfigField::MaxHistoryMessages => numbers(&HISTORY_SIZES),
            ConfigField::MaxCompletionTokens => numbers(&COMPLETION_TOKENS),
            ConfigField::TimeoutSeconds => numbers(&TIMEOUTS),
            ConfigField::MaxFileSizeMb => numbers(&FILE_SIZES_MB),
        }
    }

    pub fn current(self, config: &Config) -> FieldValue {
        match self {
            ConfigField::Model => FieldValue::Text(config.api.model.clone()),
            ConfigField::Theme => FieldValue::Text(config.ui.theme.clone()),
            ConfigField::EnableEmoji => FieldValue::Flag(config.ui.enable_emoji),
            ConfigField::MaxHistoryMessages => {
                FieldValue::Number(config.ui.max_history_messages as u64)
            }
            ConfigField::MaxCompletionTokens => {
                FieldValue::Number(u64::from(config.api.max_completion_tokens))
            }
            ConfigField::TimeoutSeconds => FieldValue::Number(config.api.timeout_seconds),
            ConfigField::MaxFileSizeMb => FieldValue::Number(config.file_operations.max_file_size_mb),
        }
    }

    fn apply(self, config: &mut Config, value: FieldValue) {
        match (self, value) {
            (ConfigField::Model, FieldValue::Text(model)) => config.api.model = model,
            (ConfigField::Theme, FieldValue::Text(theme)) => config.ui.theme = theme,
            (ConfigField::EnableEmoji, FieldValue::Flag(flag)) => config.ui.enable_emoji = flag,
            (ConfigField::MaxHistoryMessages, FieldValue::Number(n)) => {
                config.ui.max_history_messages = n as usize
            }
            (ConfigField::MaxCompletionTokens, FieldValue::Number(n)) => {
                config.api.max_completion_tokens = u32::try_from(n).unwrap_or(u32::MAX)
            }
            (ConfigField::TimeoutSeconds, FieldValue::Number(n)) => config.api.timeout_seconds = n,
            (ConfigField::MaxFileSizeMb, FieldValue::Number(n)) => {
                config.file_operations.max_file_size_mb = n
            }
            (field, value) => {
                tracing::warn!(field = field.key(), %value, "config value of the wrong kind ignored")
            }
        }
    }

    /// Advances to the next legal value, wrapping at the end. A current value outside the
    /// domain moves to the first entry.
    pub fn cycle(self, config: &mut Config) -> FieldValue {
        let domain = self.domain();
        let current = self.current(config);
        let next_index = domain
            .iter()
            .position(|value| *value == current)
            .map_or(0, |index| (index + 1) % domain.len());
        let next = domain[next_index].clone();
        self.apply(config, next.clone());
        next
    }

    fn change_line(self, value: &FieldValue) -> String {
        match (self, value) {
            (ConfigField::EnableEmoji, FieldValue::Flag(true)) => "Enabled emoji".to_string(),
            (ConfigField::EnableEmoji, _) => "Disabled emoji".to_string(),
            (ConfigField::Theme, value) => format!("Changed theme to {value}"),
            (ConfigField::Model, value) => format!("Changed model to {value}"),
            (ConfigField::MaxHistoryMessages, value) => {
                format!("Set max history to {value} messages")
            }
            (ConfigField::MaxCompletionTokens, value) => format!("Set max tokens to {value}"),
            (ConfigField::TimeoutSeconds, value) => format!("Set timeout to {value} seconds"),
            (ConfigField::MaxFileSizeMb, value) => format!("Set max file size to {value} MB"),
        }
    }
}

/// Human-readable list of field changes between two configs; `None` when nothing changed.
pub fn change_summary(before: &Config, after: &Config) -> Option<String> {
    let changes: Vec<String> = ConfigField::ALL
        .into_iter()
        .filter_map(|field| {
            let value = field.current(after);
            (field.current(before) != value).then(|| field.change_line(&value))
        })
        .collect();

    if changes.is_empty() {
        return None;
    }
    Some(format!("⎿  {}", changes.join("\n   ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_wraps_around_domain() {
        let mut config = Config::default();
        assert_eq!(
            ConfigField::Model.cycle(&mut config),
            FieldValue::Text("deepseek-chat".to_string())
        );
        assert_eq!(
            ConfigField::Model.cycle(&mut config),
            FieldValue::Text("deepseek-reasoner".to_string())
        );
        assert_eq!(config.api.model, "deepseek-reasoner");
    }

    #[test]
    fn test_cycle_from_off_domain_value_starts_at_first_entry() {
        let mut config = Config::default();
        config.ui.max_history_messages = 7;
        assert_eq!(
            ConfigField::MaxHistoryMessages.cycle(&mut config),
            FieldValue::Number(10)
        );
        assert_eq!(config.ui.max_history_messages, 10);
    }

    #[test]
    fn test_every_default_value_is_in_its_domain() {
        let config = Config::default();
        for field in ConfigField::ALL {
            assert!(
                field.domain().contains(&field.current(&config)),
                "{} default outside domain",
                field.key()
            );
        }
    }

    #[test]
    fn test_cycle_updates_typed_fields() {
        let mut config = Config::default();
        ConfigField::EnableEmoji.cycle(&mut config);
        ConfigField::TimeoutSeconds.cycle(&mut config);
        ConfigField::MaxCompletionTokens.cycle(&mut config);
        ConfigField::MaxFileSizeMb.cycle(&mut config);
        assert!(!config.ui.enable_emoji);
        assert_eq!(config.api.timeout_seconds, 600);
        assert_eq!(config.api.max_completion_tokens, 128_000);
        assert_eq!(config.file_operations.max_file_size_mb, 10);
    }

    #[test]
    fn test_from_key_accepts_dashes() {
        assert_eq!(
            ConfigField::from_key("max-history-messages"),
            Some(ConfigField::MaxHistoryMessages)
        );
        assert_eq!(ConfigField::from_key(" Model "), Some(ConfigField::Model));
        assert_eq!(ConfigField::from_key("colour"), None);
    }

    #[test]
    fn test_change_summary() {
        let before = Config::default();
        assert_eq!(change_summary(&before, &before), None);

        let mut after = before.clone();
        ConfigField::Model.cycle(&mut after);
        assert_eq!(
            change_summary(&before, &after).as_deref(),
            Some("⎿  Changed model to deepseek-chat")
        );

        ConfigField::EnableEmoji.cycle(&mut after);
        ConfigField::TimeoutSeconds.cycle(&mut after);
        assert_eq!(
            change_summary(&before, &after).as_deref(),
            Some("⎿  Changed model to deepseek-chat\n   Disabled emoji\n   Set timeout to 600 seconds")
        );
    }
}
