//! AWS credentials used for request signing.

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Environment variable holding the access key id
pub const ACCESS_KEY_ID_ENV: &str = "AWS_ACCESS_KEY_ID";
/// Environment variable holding the secret access key
pub const SECRET_ACCESS_KEY_ENV: &str = "AWS_SECRET_ACCESS_KEY";
/// Environment variable holding the session token of temporary credentials
pub const SESSION_TOKEN_ENV: &str = "AWS_SESSION_TOKEN";

/// Static or temporary AWS credentials
///
/// Secret material is wiped from memory on drop and never printed by `Debug`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    /// Attach the session token of temporary credentials
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Read credentials from the standard environment variables
    ///
    /// Returns `None` unless both the access key id and the secret are set.
    /// Function runtimes always provide them; local emulators accept
    /// unsigned requests.
    pub fn from_env() -> Option<Self> {
        let access_key_id = non_empty_var(ACCESS_KEY_ID_ENV)?;
        let secret_access_key = non_empty_var(SECRET_ACCESS_KEY_ENV)?;

        let credentials = Self::new(access_key_id, secret_access_key);
        Some(match non_empty_var(SESSION_TOKEN_ENV) {
            Some(token) => credentials.with_session_token(token),
            None => credentials,
        })
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// Get the secret key (only for immediate use in signing)
    pub(crate) fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
