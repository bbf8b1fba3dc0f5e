//! Vitrine Core: shared types, traits and errors.
//!
//! This crate provides the foundational types used across all Vitrine crates.
//! It has no internal Vitrine dependencies (dependency level 0).
//!
//! # Modules
//!
//! - [`error`]: Error taxonomy and Result alias
//! - [`context`]: Server/client execution context
//! - [`env_value`]: Lenient deserializers for env-overlaid config fields
//! - [`perspective`]: Published/draft perspective and the per-request context
//! - [`preview`]: Signed preview cookie and the editing-mode signal it yields
//! - [`query`]: Named, parameterized content queries and their signal payload
//! - [`traits`]: The [`ContentStore`] abstraction

pub mod context;
pub mod env_value;
pub mod error;
pub mod perspective;
pub mod preview;
pub mod query;
pub mod traits;

// Re-export key types at crate root for convenience
pub use context::ExecutionContext;
pub use error::{Error, Result};
pub use perspective::{EditingModeSignal, Perspective, RequestContext};
pub use preview::{PreviewCookie, PreviewSecret, PreviewVerifier};
pub use query::{ContentQuery, Importance, ParamValue, QueryParams, QuerySignal};
pub use traits::{ChangeStream, ContentDocument, ContentStore};
