#![forbid(unsafe_code)]

//! Double-submit token check for UIDL and upload requests.
//!
//! Each session has one random token, generated on first use. The client
//! receives it in the response to its `init` payload and must echo it as the
//! first segment of every later payload.

use core::fmt;

use csync_codec::ConnectorId;
use uuid::Uuid;

/// Payload marker of the very first request.
pub const INIT_MARKER: &str = "init";
/// Response field carrying the token.
pub const SECURITY_KEY_FIELD: &str = "Security-Key";

/// Token or secret mismatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityError {
    TokenMismatch,
    UploadSecretMismatch {
        connector: ConnectorId,
        variable: String,
    },
    UnknownStreamVariable {
        connector: ConnectorId,
        variable: String,
    },
}

impl fmt::Display for SecurityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokenMismatch => f.write_str("Security key mismatch"),
            Self::UploadSecretMismatch {
                connector,
                variable,
            } => write!(
                f,
                "Security key in upload post did not match for {connector}/{variable}"
            ),
            Self::UnknownStreamVariable {
                connector,
                variable,
            } => write!(f, "no stream variable {variable} registered for {connector}"),
        }
    }
}

impl std::error::Error for SecurityError {}

/// Result of checking a payload's first segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCheck {
    /// The payload was the bare `init` marker: dispatch nothing, send the token.
    Init,
    /// Token matched; bursts may be dispatched.
    Verified,
    /// Protection is off; the first segment was not inspected.
    Disabled,
}

/// Per-session token holder.
#[derive(Debug, Clone, Default)]
pub struct SecurityGuard {
    enabled: bool,
    token: Option<String>,
}

impl SecurityGuard {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            token: None,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The session token, generated on first call.
    pub fn token(&mut self) -> &str {
        self.token.get_or_insert_with(new_secret)
    }

    /// Check the payload segments before anything is dispatched.
    ///
    /// # Errors
    ///
    /// [`SecurityError::TokenMismatch`] if protection is on and the first
    /// segment is neither the lone `init` marker nor the stored token.
    pub fn check(&self, segments: &[&str]) -> Result<TokenCheck, SecurityError> {
        if !self.enabled {
            return Ok(TokenCheck::Disabled);
        }
        if segments == [INIT_MARKER] {
            return Ok(TokenCheck::Init);
        }
        match (&self.token, segments.first()) {
            (Some(token), Some(first)) if token == first => Ok(TokenCheck::Verified),
            _ => Err(SecurityError::TokenMismatch),
        }
    }

    /// The `"Security-Key":"<token>",` response prefix, or nothing when
    /// protection is off.
    pub fn key_field(&mut self) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let token = self.token();
        Some(format!("\"{SECURITY_KEY_FIELD}\":\"{token}\","))
    }
}

/// A fresh unguessable secret.
#[must_use]
pub fn new_secret() -> String {
    Uuid::new_v4().to_string()
}
