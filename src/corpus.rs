//! IRCCloud log filtering for building training corpora.
//!
//! Log lines look like `[2021-03-04 18:22:01] <nick> message text`.
//! Lines without a `<nick>` part (joins, parts, topic changes) are not
//! chat and are always dropped.

use chrono::NaiveDateTime;

use crate::{MarkovError, Result};

/// Timestamp format used in IRCCloud logs and on the command line.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a `YYYY-MM-DD HH:MM:SS` timestamp.
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
        .map_err(|e| MarkovError::Configuration(format!("invalid timestamp '{s}': {e}")))
}

/// Whether the line is a chat message.
pub fn is_message(line: &str) -> bool {
    line.contains('<')
}

/// The nick that wrote the line.
pub fn line_user(line: &str) -> Option<&str> {
    let (_, rest) = line.split_once('<')?;
    let (nick, _) = rest.split_once('>')?;
    Some(nick)
}

/// The timestamp at the start of the line.
pub fn line_timestamp(line: &str) -> Option<NaiveDateTime> {
    let stamp = line.get(1..20)?;
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()
}

/// The message text with the timestamp and nick removed.
pub fn strip_metadata(line: &str) -> Option<&str> {
    let (_, text) = line.split_once('>')?;
    Some(text.strip_prefix(' ').unwrap_or(text))
}

/// Which log lines to keep.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    /// Only lines written by this nick.
    pub user: Option<String>,
    /// Only the last N lines remaining after the user filter.
    pub last_lines: Option<usize>,
    /// Only lines stamped strictly after this time.
    pub after: Option<NaiveDateTime>,
}

impl LogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn last_lines(mut self, n: usize) -> Self {
        self.last_lines = Some(n);
        self
    }

    pub fn after(mut self, when: NaiveDateTime) -> Self {
        self.after = Some(when);
        self
    }

    /// Filter `lines` and return the bare message texts, oldest first.
    pub fn apply<'a, I>(&self, lines: I) -> Vec<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut kept: Vec<&str> = lines
            .into_iter()
            .map(str::trim)
            .filter(|line| is_message(line))
            .filter(|line| match &self.user {
                Some(user) => line_user(line) == Some(user.as_str()),
                None => true,
            })
            .collect();

        if let Some(n) = self.last_lines {
            let skip = kept.len().saturating_sub(n);
            kept.drain(..skip);
        }

        if let Some(after) = self.after {
            kept.retain(|line| line_timestamp(line).is_some_and(|t| t > after));
        }

        kept.into_iter().filter_map(strip_metadata).collect()
    }
}
