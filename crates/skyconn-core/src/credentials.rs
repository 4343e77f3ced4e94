//! Credential types accepted by the auth providers.

use std::fmt;

use crate::error::{Error, InvalidInputError};

/// Username/password login credentials.
///
/// The username may be a service username or a Microsoft account email
/// address.
///
/// # Security
///
/// The password is never exposed in Debug output.
///
/// # Example
///
/// ```
/// use skyconn_core::Credentials;
///
/// let creds = Credentials::new("alice@example.com", "hunter2");
/// assert_eq!(creds.username(), "alice@example.com");
/// assert!(creds.is_email());
/// ```
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Create new credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns the username or email address.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the password.
    ///
    /// # Security
    ///
    /// Use this only when constructing authentication requests.
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Whether the username looks like an email address.
    pub fn is_email(&self) -> bool {
        self.username.contains('@')
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// A public conversation join code plus the display name to join under.
#[derive(Debug, Clone)]
pub struct GuestInvite {
    short_id: String,
    display_name: String,
}

impl GuestInvite {
    /// Build an invite from a join URL (`https://join.skype.com/AbCdEf`) or its bare code.
    pub fn new(join: impl AsRef<str>, display_name: impl Into<String>) -> Result<Self, Error> {
        let join = join.as_ref();
        let short_id = join
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();

        if short_id.is_empty() || !short_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(InvalidInputError::JoinCode {
                value: join.to_string(),
                reason: "expected a join URL or alphanumeric code".to_string(),
            }
            .into());
        }

        Ok(Self {
            short_id,
            display_name: display_name.into(),
        })
    }

    /// The short public join code.
    pub fn short_id(&self) -> &str {
        &self.short_id
    }

    /// Name shown to other participants.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}
