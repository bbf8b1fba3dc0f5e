//! Signed preview cookie.
//!
//! Editors enter preview mode through an endpoint that sets a cookie whose
//! value is `<issued_at>.<mac>`, where `mac` is a BLAKE3 keyed hash of the
//! issue timestamp. Every request derives its [`EditingModeSignal`] from
//! that cookie exactly once via [`PreviewVerifier`].

use std::fmt;

use chrono::{DateTime, Duration, Utc};

use crate::perspective::EditingModeSignal;
use crate::{Error, Result};

const KEY_CONTEXT: &str = "vitrine 2024-06-01 preview cookie v1";

/// Default name of the preview cookie.
pub const DEFAULT_COOKIE_NAME: &str = "__vitrine_preview";

/// Secret shared by the preview endpoint and the request verifier.
#[derive(Clone)]
pub struct PreviewSecret {
    key: [u8; 32],
}

impl PreviewSecret {
    /// Derive the signing key from a configured secret.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the secret is blank.
    pub fn new(secret: &str) -> Result<Self> {
        if secret.trim().is_empty() {
            return Err(Error::config("preview secret must not be empty"));
        }
        Ok(Self {
            key: blake3::derive_key(KEY_CONTEXT, secret.as_bytes()),
        })
    }

    fn mac(&self, issued_at: i64) -> blake3::Hash {
        blake3::keyed_hash(&self.key, issued_at.to_string().as_bytes())
    }
}

impl fmt::Debug for PreviewSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PreviewSecret(<redacted>)")
    }
}

/// A parsed or freshly issued preview cookie value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewCookie {
    issued_at: i64,
    mac: blake3::Hash,
}

impl PreviewCookie {
    /// Issue a cookie stamped with `now`.
    pub fn issue(secret: &PreviewSecret, now: DateTime<Utc>) -> Self {
        let issued_at = now.timestamp();
        Self {
            issued_at,
            mac: secret.mac(issued_at),
        }
    }

    /// Parse a raw cookie value. Returns `None` for anything malformed.
    pub fn parse(value: &str) -> Option<Self> {
        let (issued_at, mac) = value.trim().split_once('.')?;
        Some(Self {
            issued_at: issued_at.parse().ok()?,
            mac: blake3::Hash::from_hex(mac).ok()?,
        })
    }

    /// Unix timestamp the cookie was issued at.
    pub fn issued_at(&self) -> i64 {
        self.issued_at
    }

    /// Check the MAC (constant-time) and the age window.
    pub fn verify(&self, secret: &PreviewSecret, now: DateTime<Utc>, max_age: Duration) -> bool {
        let Some(age) = now.timestamp().checked_sub(self.issued_at) else {
            return false;
        };
        if age < 0 || age > max_age.num_seconds() {
            return false;
        }
        secret.mac(self.issued_at) == self.mac
    }

    /// The value to store in the cookie.
    pub fn to_cookie_value(&self) -> String {
        format!("{}.{}", self.issued_at, self.mac.to_hex())
    }
}

/// Turns inbound cookie headers into an [`EditingModeSignal`].
#[derive(Debug, Clone)]
pub struct PreviewVerifier {
    secret: PreviewSecret,
    cookie_name: String,
    max_age: Duration,
}

impl PreviewVerifier {
    /// Create a verifier for cookies named `cookie_name`, valid for `max_age`.
    pub fn new(secret: PreviewSecret, cookie_name: impl Into<String>, max_age: Duration) -> Self {
        Self {
            secret,
            cookie_name: cookie_name.into(),
            max_age,
        }
    }

    /// Name of the cookie this verifier reads.
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Derive the editing-mode signal from a `Cookie` request header.
    ///
    /// A missing header, a missing cookie, a bad MAC or an expired value all
    /// yield an inactive signal; none of them is an error.
    pub fn signal_from_cookie_header(
        &self,
        header: Option<&str>,
        now: DateTime<Utc>,
    ) -> EditingModeSignal {
        let active = header
            .and_then(|h| cookie_value(h, &self.cookie_name))
            .and_then(PreviewCookie::parse)
            .is_some_and(|cookie| cookie.verify(&self.secret, now, self.max_age));
        EditingModeSignal::from(active)
    }

    /// Issue a fresh cookie and render the matching `Set-Cookie` header.
    pub fn issue_set_cookie(&self, now: DateTime<Utc>) -> String {
        let cookie = PreviewCookie::issue(&self.secret, now);
        format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly; Secure; SameSite=None",
            self.cookie_name,
            cookie.to_cookie_value(),
            self.max_age.num_seconds()
        )
    }

    /// The `Set-Cookie` header that leaves preview mode.
    pub fn clear_set_cookie(&self) -> String {
        format!(
            "{}=; Path=/; Max-Age=0; HttpOnly; Secure; SameSite=None",
            self.cookie_name
        )
    }
}

fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k.trim() == name).then_some(v.trim())
    })
}
