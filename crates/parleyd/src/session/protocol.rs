//! Line classification and the reply each line earns.
//!
//! Everything here is a pure function of the raw line and the clock reading
//! handed in by the caller; the session applies the resulting [`Action`].

use time::OffsetDateTime;
use time::UtcOffset;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

/// Longest accepted raw line, delimiter included.
pub const MAX_LINE_BYTES: usize = 1024;

pub(crate) const TOO_LONG_REPLY: &str = "Message too long. Maximum allowed length is 1024 bytes.\n";
pub(crate) const EMPTY_PROMPT_REPLY: &str = "Say something...\n";
pub(crate) const GREETING_REPLY: &str = "Hi there!\n";
pub(crate) const FAREWELL_REPLY: &str = "Goodbye!\n";
pub(crate) const ECHO_USAGE_REPLY: &str = "Usage: /echo [message]\n";
pub(crate) const UNKNOWN_COMMAND_REPLY: &str = "Unknown command.\n";

const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] UTC"
);

/// Slash commands understood by the server. Names are case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    /// `/time`: report the server clock.
    Time,
    /// `/quit`: say goodbye and close.
    Quit,
    /// `/echo`: repeat the arguments, joined by single spaces.
    Echo(String),
    /// Any other `/name`.
    Unknown(String),
}

impl Command {
    /// Parses a trimmed line. Returns `None` unless it starts with `/`.
    pub(crate) fn parse(trimmed: &str) -> Option<Self> {
        if !trimmed.starts_with('/') {
            return None;
        }
        let mut tokens = trimmed.split_whitespace();
        let name = tokens.next()?;
        let command = match name {
            "/time" => Self::Time,
            "/quit" => Self::Quit,
            "/echo" => Self::Echo(tokens.collect::<Vec<_>>().join(" ")),
            other => Self::Unknown(other.to_owned()),
        };
        Some(command)
    }
}

/// Category a trimmed line falls into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Classification {
    Greeting,
    EmptyPrompt,
    Farewell,
    Command(Command),
    /// Ordinary text, original casing preserved.
    PlainText(String),
}

/// What the session must do with one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Action {
    Reply(String),
    ReplyAndClose(String),
    /// Append the text to the transcript, then echo it with a newline.
    ReplyAndLog(String),
    RejectTooLong,
}

/// Classifies a line that has already been decoded and trimmed.
pub(crate) fn classify(trimmed: &str) -> Classification {
    if trimmed.is_empty() {
        return Classification::EmptyPrompt;
    }
    if trimmed.eq_ignore_ascii_case("hello") {
        return Classification::Greeting;
    }
    if trimmed.eq_ignore_ascii_case("bye") {
        return Classification::Farewell;
    }
    match Command::parse(trimmed) {
        Some(command) => Classification::Command(command),
        None => Classification::PlainText(trimmed.to_owned()),
    }
}

/// Decides the action for one raw line, delimiter included. Bytes that are
/// not valid UTF-8 are replaced with U+FFFD so every line still gets a reply.
pub(crate) fn classify_and_respond(raw: &[u8], now: OffsetDateTime) -> Action {
    if raw.len() > MAX_LINE_BYTES {
        return Action::RejectTooLong;
    }
    let text = String::from_utf8_lossy(raw);
    respond(classify(text.trim()), now)
}

fn respond(classification: Classification, now: OffsetDateTime) -> Action {
    match classification {
        Classification::EmptyPrompt => Action::Reply(EMPTY_PROMPT_REPLY.to_owned()),
        Classification::Greeting => Action::Reply(GREETING_REPLY.to_owned()),
        Classification::Farewell => Action::ReplyAndClose(FAREWELL_REPLY.to_owned()),
        Classification::Command(command) => run_command(command, now),
        Classification::PlainText(text) => Action::ReplyAndLog(text),
    }
}

fn run_command(command: Command, now: OffsetDateTime) -> Action {
    match command {
        Command::Time => Action::Reply(format!(
            "Current server time: {}\n",
            format_timestamp(now)
        )),
        Command::Quit => Action::ReplyAndClose(FAREWELL_REPLY.to_owned()),
        Command::Echo(args) if args.is_empty() => Action::Reply(ECHO_USAGE_REPLY.to_owned()),
        Command::Echo(args) => Action::Reply(format!("{args}\n")),
        Command::Unknown(_) => Action::Reply(UNKNOWN_COMMAND_REPLY.to_owned()),
    }
}

/// Renders `at` as `Mon, 02 Jan 2006 15:04:05 UTC`.
pub(crate) fn format_timestamp(at: OffsetDateTime) -> String {
    let utc = at.to_offset(UtcOffset::UTC);
    utc.format(TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| utc.unix_timestamp().to_string())
}
