//! Core traits for content access.
//!
//! [`ContentStore`] is the seam between the loading layer and the remote
//! content service. The HTTP client, the retry wrapper and the in-memory
//! mock all implement it, so loaders and live stores never know which one
//! they are talking to.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::perspective::Perspective;
use crate::query::ContentQuery;
use crate::Result;

/// A resolved document tree. The loading layer assumes no fixed shape.
pub type ContentDocument = serde_json::Value;

/// Stream of document-replacement events for one subscription.
///
/// `Ok(None)` means the query now resolves to nothing. An `Err` item means
/// the connection failed; the stream should be considered finished.
pub type ChangeStream = BoxStream<'static, Result<Option<ContentDocument>>>;

/// Abstraction over the remote content store.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Resolve `query` at `perspective`.
    ///
    /// Returns `Ok(None)` when the query resolves to no document.
    async fn fetch(
        &self,
        query: &ContentQuery,
        perspective: Perspective,
    ) -> Result<Option<ContentDocument>>;

    /// Open a change stream for `query` at `perspective`.
    async fn listen(&self, query: &ContentQuery, perspective: Perspective) -> Result<ChangeStream>;
}
