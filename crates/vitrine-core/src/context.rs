//! Execution context.
//!
//! Whether code runs as part of a server render or inside a hydrated
//! client view is passed explicitly to every component that cares, never
//! inferred from global runtime state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Where the calling code is executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionContext {
    /// Server-side rendering, build tooling, or any trusted process.
    Server,
    /// A hydrated client view running in the visitor's browser.
    Client,
}

impl ExecutionContext {
    /// Returns `true` for the server context.
    pub fn is_server(self) -> bool {
        matches!(self, Self::Server)
    }

    /// Returns `true` for the client context.
    pub fn is_client(self) -> bool {
        matches!(self, Self::Client)
    }

    /// Fails with [`Error::EnvironmentViolation`] unless this is the server
    /// context.
    pub fn ensure_server(self, operation: &str) -> Result<()> {
        if self.is_server() {
            Ok(())
        } else {
            Err(Error::environment_violation(operation, self))
        }
    }

    /// Fails with [`Error::EnvironmentViolation`] unless this is the client
    /// context.
    pub fn ensure_client(self, operation: &str) -> Result<()> {
        if self.is_client() {
            Ok(())
        } else {
            Err(Error::environment_violation(operation, self))
        }
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => f.write_str("server"),
            Self::Client => f.write_str("client"),
        }
    }
}
