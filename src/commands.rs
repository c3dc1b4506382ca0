use crate::config::ConfigField;

/// One entry of the slash-command table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub usage: &'static str,
}

pub const COMMANDS: [CommandSpec; 6] = [
    CommandSpec {
        name: "/add",
        description: "Add file or directory to context",
        usage: "/add <path>",
    },
    CommandSpec {
        name: "/clear",
        description: "Clear conversation history",
        usage: "/clear",
    },
    CommandSpec {
        name: "/config",
        description: "Configure settings",
        usage: "/config [field]",
    },
    CommandSpec {
        name: "/help",
        description: "Show help information",
        usage: "/help",
    },
    CommandSpec {
        name: "/status",
        description: "Show current configuration and pricing",
        usage: "/status",
    },
    CommandSpec {
        name: "/quit",
        description: "Quit the application",
        usage: "/quit",
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add(String),
    Clear,
    /// `None` lists the fields; `Some` cycles that field to its next value.
    Config(Option<ConfigField>),
    Help,
    Status,
    Quit,
    /// Input that is not a command goes to the model as a chat turn.
    Chat(String),
    Invalid(String),
}

/// Classifies a trimmed input line.
pub fn parse_command(input: &str) -> Command {
    let input = input.trim();
    if is_exit_command(input) {
        return Command::Quit;
    }
    if !input.starts_with('/') {
        return Command::Chat(input.to_string());
    }

    let (name, rest) = match input.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (input, ""),
    };

    match name {
        "/add" if rest.is_empty() => Command::Invalid("Usage: /add <path>".to_string()),
        "/add" => Command::Add(rest.to_string()),
        "/clear" => Command::Clear,
        "/config" if rest.is_empty() => Command::Config(None),
        "/config" => match ConfigField::from_key(rest) {
            Some(field) => Command::Config(Some(field)),
            None => Command::Invalid(format!("Unknown config field: {rest}")),
        },
        "/help" => Command::Help,
        "/status" => Command::Status,
        "/quit" | "/exit" => Command::Quit,
        _ => Command::Invalid(format!(
            "Unknown command: {name}. Type /help for available commands"
        )),
    }
}

/// Bare words that end the session without a slash.
pub fn is_exit_command(input: &str) -> bool {
    matches!(input.trim(), "exit" | "quit")
}

/// Commands whose name starts with `prefix`. An empty or slash-less prefix matches nothing.
pub fn complete(prefix: &str) -> Vec<&'static CommandSpec> {
    let prefix = prefix.trim_start();
    if !prefix.starts_with('/') || prefix.contains(char::is_whitespace) {
        return Vec::new();
    }
    COMMANDS
        .iter()
        .filter(|spec| spec.name.starts_with(prefix))
        .collect()
}
