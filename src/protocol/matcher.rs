//! Command/response matching.
//!
//! An exchange writes one command line and then waits for one of three
//! tokens: a primary success token, an optional alternative success token
//! (firmware revisions disagree on the wording), or an error token. The
//! first token to complete in the stream decides the outcome.

use std::time::Duration;

/// Tokens that end a wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub primary: String,
    pub secondary: Option<String>,
    pub error: String,
}

impl Reply {
    /// Success on `primary`, failure on `error`
    pub fn new(primary: impl Into<String>, error: impl Into<String>) -> Self {
        Reply {
            primary: primary.into(),
            secondary: None,
            error: error.into(),
        }
    }

    /// Also accepts `secondary` as success
    pub fn or(mut self, secondary: impl Into<String>) -> Self {
        self.secondary = Some(secondary.into());
        self
    }

    /// Checks the scan region after a new byte arrived.
    ///
    /// Every byte is checked as it arrives, so testing the suffix finds the
    /// first token completed since the wait began. A success token completing
    /// on the same byte as the error token wins.
    pub fn scan(&self, region: &[u8]) -> Scan {
        if ends_with(region, &self.primary) {
            Scan::Primary
        } else if self
            .secondary
            .as_deref()
            .is_some_and(|token| ends_with(region, token))
        {
            Scan::Secondary
        } else if ends_with(region, &self.error) {
            Scan::Error
        } else {
            Scan::Pending
        }
    }
}

fn ends_with(region: &[u8], token: &str) -> bool {
    !token.is_empty() && region.ends_with(token.as_bytes())
}

/// Result of scanning after one byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    Primary,
    Secondary,
    Error,
    Pending,
}

/// Which success token ended an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenMatch {
    Primary,
    Secondary,
}

/// How an exchange ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// A success token arrived
    Matched(TokenMatch),
    /// No token before the deadline
    TimedOut,
    /// The error token arrived first
    ProtocolError,
}

impl ExchangeOutcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, ExchangeOutcome::Matched(_))
    }
}

/// One command line plus the reply it waits for
#[derive(Debug, Clone)]
pub struct Exchange {
    /// Command text without the line ending
    pub command: String,
    pub reply: Reply,
    pub timeout: Duration,
    /// Name used in logs instead of the command, which may hold secrets
    pub label: &'static str,
}

impl Exchange {
    /// Creates an exchange with a generic log label
    pub fn new(command: impl Into<String>, reply: Reply, timeout: Duration) -> Self {
        Exchange {
            command: command.into(),
            reply,
            timeout,
            label: "command",
        }
    }

    /// Sets the log label
    pub fn labelled(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }
}
