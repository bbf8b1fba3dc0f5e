//! Query loader.
//!
//! The single entry point page routes call to obtain content. The loader
//! takes its perspective from the [`RequestContext`] and hands back, with
//! every result, the [`QuerySignal`] a client view needs to re-subscribe to
//! exactly the same query.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use vitrine_core::{
    ContentDocument, ContentQuery, ContentStore, Error, Importance, QueryParams, QuerySignal,
    RequestContext, Result,
};

use crate::catalog::{names, QueryCatalog};
use crate::documents::Settings;

/// A loaded query result.
///
/// `data` is `None` when the document does not exist (render a 404), or
/// when a secondary query failed and the caller should use defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loaded<T> {
    /// The decoded document.
    pub data: Option<T>,
    /// What a client view re-subscribes with.
    pub signal: QuerySignal,
}

impl<T> Loaded<T> {
    /// Whether a document was found.
    pub fn is_found(&self) -> bool {
        self.data.is_some()
    }

    /// Splits into data and signal.
    pub fn into_parts(self) -> (Option<T>, QuerySignal) {
        (self.data, self.signal)
    }
}

/// A page document loaded together with the site settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PageContent<D> {
    /// The route's primary document.
    pub page: Loaded<D>,
    /// Site settings, or their defaults when unavailable.
    pub settings: Settings,
    /// Signal for re-subscribing to the settings.
    pub settings_signal: QuerySignal,
}

/// Loads typed content for page routes.
#[derive(Clone)]
pub struct QueryLoader {
    store: Arc<dyn ContentStore>,
    catalog: Arc<QueryCatalog>,
}

impl QueryLoader {
    /// Creates a loader over `store` using `catalog` for query names.
    pub fn new(store: Arc<dyn ContentStore>, catalog: QueryCatalog) -> Self {
        Self {
            store,
            catalog: Arc::new(catalog),
        }
    }

    /// The catalog query names resolve against.
    pub fn catalog(&self) -> &QueryCatalog {
        &self.catalog
    }

    /// Loads the catalog query `name` with `params`.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownQuery`] for unregistered names.
    /// - [`Error::ContentFetch`] when a primary query fails or returns a
    ///   document that does not decode into `T`.
    /// - Configuration and environment errors, whatever the importance.
    pub async fn load<T: DeserializeOwned>(
        &self,
        name: &str,
        params: QueryParams,
        request: &RequestContext,
    ) -> Result<Loaded<T>> {
        let query = self.catalog.build(name, params)?;
        self.load_query(query, request).await
    }

    /// Loads an ad hoc query. Same contract as [`QueryLoader::load`].
    pub async fn load_query<T: DeserializeOwned>(
        &self,
        query: ContentQuery,
        request: &RequestContext,
    ) -> Result<Loaded<T>> {
        let perspective = request.perspective();
        let name = query.name().to_string();
        let importance = query.importance();

        debug!(query = %name, perspective = %perspective, "loading content");

        let outcome = match self.store.fetch(&query, perspective).await {
            Ok(doc) => decode::<T>(&name, doc),
            Err(err) => Err(err),
        };
        let signal = QuerySignal::new(query, perspective);

        match outcome {
            Ok(data) => {
                debug!(query = %name, found = data.is_some(), "content loaded");
                Ok(Loaded { data, signal })
            }
            Err(err) if importance == Importance::Secondary && !err.is_fatal() => {
                warn!(query = %name, error = %err, "secondary query failed, falling back to defaults");
                Ok(Loaded { data: None, signal })
            }
            Err(err) => Err(err),
        }
    }

    /// Loads the catalog query `name` and the site settings concurrently.
    ///
    /// Settings fall back to [`Settings::default`] when they are missing or
    /// fail to load.
    pub async fn load_with_settings<D: DeserializeOwned>(
        &self,
        name: &str,
        params: QueryParams,
        request: &RequestContext,
    ) -> Result<PageContent<D>> {
        let (page, settings) = tokio::join!(
            self.load::<D>(name, params, request),
            self.load::<Settings>(names::SETTINGS, QueryParams::new(), request),
        );
        let page = page?;
        let (settings, settings_signal) = settings?.into_parts();

        Ok(PageContent {
            page,
            settings: settings.unwrap_or_default(),
            settings_signal,
        })
    }
}

fn decode<T: DeserializeOwned>(name: &str, doc: Option<ContentDocument>) -> Result<Option<T>> {
    doc.map(serde_json::from_value::<T>)
        .transpose()
        .map_err(|e| Error::fetch(name, format!("malformed document: {e}")))
}
