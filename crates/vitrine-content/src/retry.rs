//! Retry wrapper for content stores.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use tracing::warn;

use vitrine_core::{
    ChangeStream, ContentDocument, ContentQuery, ContentStore, Error, Perspective, Result,
};

/// Wraps a content store with retry logic for fetches.
///
/// Only errors reporting [`Error::is_retryable`] are retried: transport
/// failures, 429 and 5xx. Configuration problems and malformed responses
/// fail on the first attempt.
pub struct RetryingStore {
    inner: Arc<dyn ContentStore>,
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl RetryingStore {
    /// Creates a new retry wrapper with default settings.
    ///
    /// Default settings:
    /// - Max attempts: 3
    /// - Initial delay: 200 milliseconds
    /// - Max delay: 2 seconds
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self {
            inner: store,
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }

    /// Sets the maximum number of retries.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the initial delay between retries.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay between retries.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    fn should_retry(error: &Error) -> bool {
        error.is_retryable()
    }
}

#[async_trait]
impl ContentStore for RetryingStore {
    async fn fetch(
        &self,
        query: &ContentQuery,
        perspective: Perspective,
    ) -> Result<Option<ContentDocument>> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts as usize);

        let store = &self.inner;
        (|| async move { store.fetch(query, perspective).await })
            .retry(backoff)
            .when(Self::should_retry)
            .notify(|err: &Error, delay: Duration| {
                warn!(query = %query.name(), error = %err, ?delay, "retrying content fetch");
            })
            .await
    }

    async fn listen(&self, query: &ContentQuery, perspective: Perspective) -> Result<ChangeStream> {
        // Reconnection policy belongs to the subscriber.
        self.inner.listen(query, perspective).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::MockContentStore;
    use serde_json::json;

    fn query() -> ContentQuery {
        ContentQuery::new("homePage", "*[_type == \"home\"][0]")
    }

    #[tokio::test]
    async fn test_retry_success() {
        let mock = MockContentStore::new()
            .with_document("homePage", Perspective::Published, json!({ "title": "Accueil" }));
        let retry = RetryingStore::new(Arc::new(mock));

        let doc = retry.fetch(&query(), Perspective::Published).await.unwrap();
        assert_eq!(doc.unwrap()["title"], "Accueil");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_from_transient_failures() {
        let mock = MockContentStore::new()
            .with_document("homePage", Perspective::Published, json!({ "title": "Accueil" }));
        mock.fail_next_fetches("homePage", 2);
        let retry = RetryingStore::new(Arc::new(mock.clone()));

        let doc = retry.fetch(&query(), Perspective::Published).await.unwrap();
        assert_eq!(doc.unwrap()["title"], "Accueil");
        assert_eq!(mock.fetch_calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up() {
        let mock = MockContentStore::new();
        mock.fail_query("homePage");
        let retry = RetryingStore::new(Arc::new(mock.clone())).with_max_attempts(2);

        let err = retry.fetch(&query(), Perspective::Published).await.unwrap_err();
        assert!(err.is_content_fetch());
        // First attempt plus two retries
        assert_eq!(mock.fetch_calls().len(), 3);
    }

    #[test]
    fn test_retry_builder() {
        let mock = Arc::new(MockContentStore::new());
        let retry = RetryingStore::new(mock)
            .with_max_attempts(5)
            .with_initial_delay(Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(30));

        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.initial_delay, Duration::from_millis(500));
        assert_eq!(retry.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_should_retry() {
        assert!(RetryingStore::should_retry(&Error::fetch_status("q", 502, "bad gateway")));
        assert!(!RetryingStore::should_retry(&Error::config("missing dataset")));
        assert!(!RetryingStore::should_retry(&Error::fetch("q", "malformed")));
    }
}
