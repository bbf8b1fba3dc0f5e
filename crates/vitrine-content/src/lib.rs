//! Vitrine Content: reading typed content from the content store.
//!
//! # Key Abstractions
//!
//! - [`ContentClient`]: HTTP client for the store's query and listen APIs
//! - [`RetryingStore`]: exponential-backoff wrapper around any store
//! - [`MockContentStore`]: in-memory store for tests and local previews
//! - [`QueryCatalog`]: named query templates for the site
//! - [`QueryLoader`]: the entry point page routes call for content
//! - [`SlugGenerator`]: build-time enumeration of detail-page slugs

pub mod catalog;
pub mod client;
pub mod config;
pub mod documents;
pub mod loader;
pub mod mock;
pub mod retry;
pub mod slugs;
pub mod sse;

pub use catalog::{QueryCatalog, QueryTemplate};
pub use client::ContentClient;
pub use config::{ClientConfig, ReadToken};
pub use loader::{Loaded, PageContent, QueryLoader};
pub use mock::MockContentStore;
pub use retry::RetryingStore;
pub use slugs::{Slug, SlugGenerator, SlugStream};
