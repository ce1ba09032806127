//! Redaction of configured endpoints from user-facing messages.
//!
//! Error messages from the gateway can embed the API base URL or the
//! event-channel URL. Both are deployment secrets; every message that
//! reaches a user or a persisted history entry goes through
//! [`Redactor::redact`] first.

/// Replacement text for redacted secrets.
pub const REDACTED: &str = "[redacted]";

/// Replaces configured secret strings in arbitrary text.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    secrets: Vec<String>,
}

impl Redactor {
    /// Build a redactor from endpoint strings.
    ///
    /// Trailing slashes are trimmed so both `http://host/` and
    /// `http://host` forms are caught; empty entries are dropped.
    pub fn new<I>(secrets: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let secrets = secrets
            .into_iter()
            .map(|s| s.trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Self { secrets }
    }

    /// Replace every occurrence of each secret with [`REDACTED`].
    pub fn redact(&self, message: &str) -> String {
        let mut out = message.to_string();
        for secret in &self.secrets {
            out = out.replace(secret, REDACTED);
        }
        out
    }
}
