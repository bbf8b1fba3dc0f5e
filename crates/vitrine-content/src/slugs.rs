//! Build-time slug enumeration.
//!
//! Static generation asks for every slug of a document type and
//! pre-renders one page per slug. The listing query is only issued when
//! the stream is first polled, and the stream cannot be restarted.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use vitrine_core::{ContentQuery, ContentStore, Error, Perspective, Result};

/// One pre-renderable identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slug {
    /// The slug.
    pub slug: String,
}

/// Lazy, finite stream of slugs.
pub type SlugStream = BoxStream<'static, Result<Slug>>;

/// Enumerates slugs of a document type.
#[derive(Clone)]
pub struct SlugGenerator {
    store: Arc<dyn ContentStore>,
}

impl SlugGenerator {
    /// Creates a generator reading from `store`.
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// The listing query for `document_type`.
    pub fn listing_query(document_type: &str) -> ContentQuery {
        ContentQuery::new(
            format!("{document_type}Slugs"),
            r#"*[_type == $type && defined(slug.current)]{"slug": slug.current}"#,
        )
        .with_param("type", document_type)
    }

    /// Streams every published slug of `document_type`.
    ///
    /// An empty document set yields an empty stream. Blank slugs are
    /// skipped and duplicates are yielded once.
    pub fn generate(&self, document_type: &str) -> SlugStream {
        let store = Arc::clone(&self.store);
        let query = Self::listing_query(document_type);
        let document_type = document_type.to_string();

        stream::once(async move { list_slugs(store, query, document_type).await })
            .map(|listed| match listed {
                Ok(slugs) => stream::iter(slugs.into_iter().map(Ok)).left_stream(),
                Err(err) => stream::iter(vec![Err(err)]).right_stream(),
            })
            .flatten()
            .boxed()
    }

    /// Collects [`SlugGenerator::generate`] into a vector.
    pub async fn collect(&self, document_type: &str) -> Result<Vec<Slug>> {
        self.generate(document_type).try_collect().await
    }
}

async fn list_slugs(
    store: Arc<dyn ContentStore>,
    query: ContentQuery,
    document_type: String,
) -> Result<Vec<Slug>> {
    let entries = match store.fetch(&query, Perspective::Published).await? {
        None => Vec::new(),
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            return Err(Error::fetch(
                query.name(),
                format!("expected a list of slugs, got {}", json_kind(&other)),
            ));
        }
    };

    let mut seen = HashSet::new();
    let mut slugs = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry.get("slug").and_then(Value::as_str).map(str::trim) {
            Some(slug) if !slug.is_empty() => {
                if seen.insert(slug.to_string()) {
                    slugs.push(Slug {
                        slug: slug.to_string(),
                    });
                }
            }
            _ => debug!(document_type = %document_type, entry = %entry, "skipping entry without slug"),
        }
    }

    info!(document_type = %document_type, count = slugs.len(), "enumerated slugs");
    Ok(slugs)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::MockContentStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_generate_slugs() {
        let mock = MockContentStore::new().with_document(
            "capsuleSlugs",
            Perspective::Published,
            json!([{ "slug": "respirer" }, { "slug": "dormir" }]),
        );
        let slugs = SlugGenerator::new(Arc::new(mock)).collect("capsule").await.unwrap();
        let slugs: Vec<_> = slugs.into_iter().map(|s| s.slug).collect();
        assert_eq!(slugs, vec!["respirer", "dormir"]);
    }

    #[tokio::test]
    async fn test_empty_set_is_empty_stream() {
        let mock = MockContentStore::new()
            .with_document("pageSlugs", Perspective::Published, json!([]));
        let slugs = SlugGenerator::new(Arc::new(mock)).collect("page").await.unwrap();
        assert!(slugs.is_empty());
    }

    #[tokio::test]
    async fn test_null_result_is_empty_stream() {
        let slugs = SlugGenerator::new(Arc::new(MockContentStore::new()))
            .collect("page")
            .await
            .unwrap();
        assert!(slugs.is_empty());
    }

    #[tokio::test]
    async fn test_lazy_single_query() {
        let mock = MockContentStore::new().with_document(
            "capsuleSlugs",
            Perspective::Published,
            json!([{ "slug": "a" }, { "slug": "b" }, { "slug": "c" }]),
        );
        let generator = SlugGenerator::new(Arc::new(mock.clone()));

        let mut stream = generator.generate("capsule");
        assert!(mock.fetch_calls().is_empty());

        assert_eq!(stream.next().await.unwrap().unwrap().slug, "a");
        assert_eq!(stream.next().await.unwrap().unwrap().slug, "b");
        assert_eq!(stream.next().await.unwrap().unwrap().slug, "c");
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
        assert_eq!(
            mock.fetch_calls(),
            vec![("capsuleSlugs".to_string(), Perspective::Published)]
        );
    }

    #[tokio::test]
    async fn test_blank_and_duplicate_slugs() {
        let mock = MockContentStore::new().with_document(
            "pageSlugs",
            Perspective::Published,
            json!([
                { "slug": "tarifs" },
                { "slug": "  " },
                { "title": "no slug" },
                { "slug": "tarifs" },
                { "slug": "coaching" }
            ]),
        );
        let slugs = SlugGenerator::new(Arc::new(mock)).collect("page").await.unwrap();
        let slugs: Vec<_> = slugs.into_iter().map(|s| s.slug).collect();
        assert_eq!(slugs, vec!["tarifs", "coaching"]);
    }

    #[tokio::test]
    async fn test_fetch_failure_surfaces() {
        let mock = MockContentStore::new();
        mock.fail_query("pageSlugs");
        let err = SlugGenerator::new(Arc::new(mock)).collect("page").await.unwrap_err();
        assert!(err.is_content_fetch());
    }

    #[tokio::test]
    async fn test_unexpected_shape() {
        let mock = MockContentStore::new()
            .with_document("pageSlugs", Perspective::Published, json!({ "slug": "x" }));
        let err = SlugGenerator::new(Arc::new(mock)).collect("page").await.unwrap_err();
        assert!(err.to_string().contains("an object"));
    }

    #[test]
    fn test_listing_query() {
        let query = SlugGenerator::listing_query("capsule");
        assert_eq!(query.name(), "capsuleSlugs");
        assert_eq!(
            query.params().get("type"),
            Some(&vitrine_core::ParamValue::from("capsule"))
        );
    }
}
