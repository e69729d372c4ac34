use std::fmt;

use super::errors::GatewayError;

pub const ENV_USERNAME: &str = "GATEWAY_USERNAME";
pub const ENV_PASSWORD: &str = "GATEWAY_PASSWORD";
pub const ENV_HMAC_USER: &str = "HMAC_USER";
pub const ENV_HMAC_KEY: &str = "HMAC_KEY";

/// A value that must never reach logs or `Debug` output in clear text.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret<T>(T);

impl<T> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// One `*` per character, so the length is visible but not the content.
    pub fn masked(&self) -> String {
        mask(&self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret<String> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({})", self.masked())
    }
}

impl fmt::Display for Secret<String> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

impl From<String> for Secret<String> {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Secret<String> {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

pub fn mask(value: &str) -> String {
    "*".repeat(value.chars().count())
}

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: Secret<String>,
    pub hmac_user: String,
    pub hmac_key: Secret<String>,
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<Secret<String>>,
        hmac_user: impl Into<String>,
        hmac_key: impl Into<Secret<String>>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            hmac_user: hmac_user.into(),
            hmac_key: hmac_key.into(),
        }
    }

    /// Reads whichever credential fields are set in the process environment.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).unwrap_or_default();
        Self {
            username: var(ENV_USERNAME),
            password: Secret::new(var(ENV_PASSWORD)),
            hmac_user: var(ENV_HMAC_USER),
            hmac_key: Secret::new(var(ENV_HMAC_KEY)),
        }
    }

    /// Fills empty fields from `fallback`.
    pub fn or(mut self, fallback: Credentials) -> Self {
        if self.username.is_empty() {
            self.username = fallback.username;
        }
        if self.password.is_empty() {
            self.password = fallback.password;
        }
        if self.hmac_user.is_empty() {
            self.hmac_user = fallback.hmac_user;
        }
        if self.hmac_key.is_empty() {
            self.hmac_key = fallback.hmac_key;
        }
        self
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.username.trim().is_empty() {
            return Err(GatewayError::MissingCredential("username"));
        }
        if self.password.is_empty() {
            return Err(GatewayError::MissingCredential("password"));
        }
        if self.hmac_user.trim().is_empty() {
            return Err(GatewayError::MissingCredential("HMAC user"));
        }
        if self.hmac_key.is_empty() {
            return Err(GatewayError::MissingCredential("HMAC key"));
        }
        Ok(())
    }

    /// One-line summary safe to write to the debug log.
    pub fn masked_summary(&self) -> String {
        format!(
            "username={} password={} hmac_user={} hmac_key={}",
            self.username,
            self.password.masked(),
            self.hmac_user,
            self.hmac_key.masked()
        )
    }
}
