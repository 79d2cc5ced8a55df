use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// Literal strings the module firmware emits or expects.
///
/// Defaults follow the common ESP-AT firmware. Revisions disagree on some of
/// these, so every one of them can be overridden from configuration. Link
/// notifications are one example: ESP-AT writes `<id>,CONNECT`, while other
/// builds and some datasheets write `<id> CONNECT`, which needs
/// `link_connect = " CONNECT"` and `link_closed = " CLOSED"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenSet {
    /// Two-byte command terminator
    pub line_ending: String,
    /// Plain acknowledgement
    pub ok: String,
    /// Generic command failure
    pub error: String,
    /// Join failure
    pub fail: String,
    /// Join success reported before the acknowledgement
    pub join_done: String,
    /// Banner after a factory restore
    pub restore_done: String,
    /// Server already running
    pub no_change: String,
    /// Ready prompt of the send handshake
    pub send_prompt: String,
    /// Send completed
    pub send_ok: String,
    /// Send failed after the payload was accepted
    pub send_fail: String,
    /// Suffix after `<id>` announcing a new peer (`,CONNECT` or ` CONNECT`)
    pub link_connect: String,
    /// Suffix after `<id>` announcing a closed peer (`,CLOSED` or ` CLOSED`)
    pub link_closed: String,
    /// Marker that opens an inbound data frame
    pub frame_marker: String,
}

impl Default for TokenSet {
    fn default() -> Self {
        TokenSet {
            line_ending: "\r\n".to_string(),
            ok: "OK".to_string(),
            error: "ERROR".to_string(),
            fail: "FAIL".to_string(),
            join_done: "WIFI GOT IP".to_string(),
            restore_done: "ready".to_string(),
            no_change: "no change".to_string(),
            send_prompt: ">".to_string(),
            send_ok: "SEND OK".to_string(),
            send_fail: "SEND FAIL".to_string(),
            link_connect: ",CONNECT".to_string(),
            link_closed: ",CLOSED".to_string(),
            frame_marker: "+IPD".to_string(),
        }
    }
}

impl TokenSet {
    fn all(&self) -> [(&'static str, &str); 13] {
        [
            ("line_ending", self.line_ending.as_str()),
            ("ok", self.ok.as_str()),
            ("error", self.error.as_str()),
            ("fail", self.fail.as_str()),
            ("join_done", self.join_done.as_str()),
            ("restore_done", self.restore_done.as_str()),
            ("no_change", self.no_change.as_str()),
            ("send_prompt", self.send_prompt.as_str()),
            ("send_ok", self.send_ok.as_str()),
            ("send_fail", self.send_fail.as_str()),
            ("link_connect", self.link_connect.as_str()),
            ("link_closed", self.link_closed.as_str()),
            ("frame_marker", self.frame_marker.as_str()),
        ]
    }

    /// Length of the longest token in bytes
    pub fn longest(&self) -> usize {
        self.all().iter().map(|(_, t)| t.len()).max().unwrap_or(0)
    }

    /// Rejects empty tokens and a line ending that is not two bytes
    pub fn validate(&self) -> Result<()> {
        if let Some((name, _)) = self.all().iter().find(|(_, t)| t.is_empty()) {
            return Err(Error::config(format!("token `{}` is empty", name)));
        }
        if self.line_ending.len() != 2 {
            return Err(Error::config("line ending must be two bytes"));
        }
        if self.link_connect == self.link_closed {
            return Err(Error::config("connect and close notifications must differ"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let tokens = TokenSet::default();
        tokens.validate().unwrap();
        assert_eq!(tokens.longest(), "WIFI GOT IP".len());
    }

    #[test]
    fn test_override_from_json() {
        let tokens: TokenSet =
            serde_json::from_str(r#"{ "join_done": "WIFI CONNECTED", "frame_marker": "+PKT" }"#)
                .unwrap();
        assert_eq!(tokens.join_done, "WIFI CONNECTED");
        assert_eq!(tokens.frame_marker, "+PKT");
        assert_eq!(tokens.ok, "OK");
    }

    #[test]
    fn test_empty_token_rejected() {
        let tokens = TokenSet {
            send_ok: String::new(),
            ..TokenSet::default()
        };
        let err = tokens.validate().unwrap_err();
        assert!(err.to_string().contains("send_ok"));
    }

    #[test]
    fn test_line_ending_length() {
        let tokens = TokenSet {
            line_ending: "\n".to_string(),
            ..TokenSet::default()
        };
        assert!(tokens.validate().is_err());
    }
}
