//! Connection settings for the content store.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default per-request timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection identity and transport settings.
///
/// Identity fields are optional here so the struct can be deserialized
/// from partial sources; [`ContentClient::new`](crate::ContentClient::new)
/// rejects a config that lacks them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Content store project identifier.
    pub project_id: Option<String>,

    /// Dataset name (e.g. `production`).
    pub dataset: Option<String>,

    /// API version date (e.g. `2024-06-01`).
    pub api_version: Option<String>,

    /// Override for the API host, e.g. a local stack.
    pub api_host: Option<String>,

    /// Use the edge cache for token-less published reads.
    #[serde(deserialize_with = "vitrine_core::env_value::parse")]
    pub use_cdn: bool,

    /// Per-request timeout in seconds.
    #[serde(deserialize_with = "vitrine_core::env_value::parse")]
    pub timeout_secs: u64,

    /// Refuse to start a server-side client without a read token.
    #[serde(deserialize_with = "vitrine_core::env_value::parse")]
    pub require_token: bool,

    /// Privileged read token. Never serialized back out.
    #[serde(skip_serializing)]
    pub read_token: Option<ReadToken>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            dataset: None,
            api_version: None,
            api_host: None,
            use_cdn: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            require_token: false,
            read_token: None,
        }
    }
}

impl ClientConfig {
    /// Config with the three identity fields set.
    pub fn new(
        project_id: impl Into<String>,
        dataset: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            project_id: Some(project_id.into()),
            dataset: Some(dataset.into()),
            api_version: Some(api_version.into()),
            ..Default::default()
        }
    }

    /// Sets the API host override.
    pub fn with_api_host(mut self, host: impl Into<String>) -> Self {
        self.api_host = Some(host.into());
        self
    }

    /// Sets the read token.
    pub fn with_read_token(mut self, token: impl Into<String>) -> Self {
        self.read_token = Some(ReadToken::new(token));
        self
    }

    /// Enables the edge cache for published reads.
    pub fn with_cdn(mut self, use_cdn: bool) -> Self {
        self.use_cdn = use_cdn;
        self
    }
}

/// Privileged read token.
///
/// Its value is only reachable inside this crate; everything else goes
/// through [`ContentClient::read_token`](crate::ContentClient::read_token),
/// which checks the execution context.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct ReadToken(String);

impl ReadToken {
    /// Wrap a token value.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }

    pub(crate) fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ReadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReadToken(<redacted>)")
    }
}
