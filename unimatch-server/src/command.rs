//! Parsing of user input: slash commands, inline-button tokens and the
//! Like/Skip reply keyboard.

use std::fmt;

use crate::profile::UserId;

/// Callback token of the "Done" button in the university selector.
pub const CONFIRM_TOKEN: &str = "__done__";

/// Callback token prefix of the buttons in the match list.
pub const CHAT_WITH_PREFIX: &str = "chatwith:";

/// A slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Browse,
    Profile,
    Matches,
    StopChat,
    Confess,
    Cancel,
    Help,
    /// Any other `/command`; holds the name without the slash.
    Unknown(String),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Start => write!(f, "/start"),
            Command::Browse => write!(f, "/browse"),
            Command::Profile => write!(f, "/profile"),
            Command::Matches => write!(f, "/matches"),
            Command::StopChat => write!(f, "/stopchat"),
            Command::Confess => write!(f, "/confess"),
            Command::Cancel => write!(f, "/cancel"),
            Command::Help => write!(f, "/help"),
            Command::Unknown(name) => write!(f, "/{}", name),
        }
    }
}

/// Parse a message as a command.
///
/// Returns None unless the text starts with `/`. Accepts the `/cmd@BotName`
/// form Telegram uses in groups and ignores anything after the first word.
pub fn parse_command(text: &str) -> Option<Command> {
    let word = text.trim_start().strip_prefix('/')?.split_whitespace().next()?;
    let name = word.split('@').next().unwrap_or(word);
    if name.is_empty() {
        return None;
    }

    let command = match name.to_ascii_lowercase().as_str() {
        "start" => Command::Start,
        "browse" => Command::Browse,
        "profile" => Command::Profile,
        "matches" => Command::Matches,
        "stopchat" => Command::StopChat,
        "confess" => Command::Confess,
        "cancel" => Command::Cancel,
        "help" => Command::Help,
        _ => Command::Unknown(name.to_string()),
    };
    Some(command)
}

/// A tap on an inline button, classified from its callback token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Toggle an option of the university selector.
    Toggle(String),
    /// The selector's "Done" button.
    Confirm,
    /// Start chatting with a match.
    ChatWith(UserId),
    /// A token this bot never issues.
    Unknown(String),
}

impl Selection {
    pub fn parse(token: &str) -> Self {
        if token == CONFIRM_TOKEN {
            return Selection::Confirm;
        }
        if let Some(id) = token.strip_prefix(CHAT_WITH_PREFIX) {
            return match id.parse::<i64>() {
                Ok(id) => Selection::ChatWith(UserId(id)),
                Err(_) => Selection::Unknown(token.to_string()),
            };
        }
        if crate::catalog::is_selection_option(token) {
            Selection::Toggle(token.to_string())
        } else {
            Selection::Unknown(token.to_string())
        }
    }

    /// The callback token that parses back to this selection.
    pub fn token(&self) -> String {
        match self {
            Selection::Toggle(option) => option.clone(),
            Selection::Confirm => CONFIRM_TOKEN.to_string(),
            Selection::ChatWith(id) => format!("{}{}", CHAT_WITH_PREFIX, id),
            Selection::Unknown(raw) => raw.clone(),
        }
    }
}

/// Response to a previewed profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Like,
    Skip,
}

impl Decision {
    pub fn label(self) -> &'static str {
        match self {
            Decision::Like => "👍 Like",
            Decision::Skip => "⏭️ Skip",
        }
    }

    /// Recognise the exact reply-keyboard labels.
    pub fn from_label(text: &str) -> Option<Self> {
        [Decision::Like, Decision::Skip]
            .into_iter()
            .find(|d| d.label() == text)
    }
}
