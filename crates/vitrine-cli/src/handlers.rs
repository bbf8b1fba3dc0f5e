//! Handler functions for content commands.
//!
//! Each handler takes the store and an output sink so it can run against
//! the mock store in tests.

use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, info};

use vitrine_content::{ContentClient, QueryCatalog, QueryLoader, RetryingStore, SlugGenerator};
use vitrine_core::{
    ContentStore, EditingModeSignal, Error, ExecutionContext, ParamValue, QueryParams,
    RequestContext, Result,
};

use crate::config::VitrineConfig;

/// Builds the server-side store from config, with retries.
pub fn content_store(config: &VitrineConfig) -> Result<Arc<dyn ContentStore>> {
    let client = ContentClient::new(config.content.clone(), ExecutionContext::Server)?;
    debug!(
        project_id = client.project_id(),
        dataset = client.dataset(),
        "content client ready"
    );
    Ok(Arc::new(RetryingStore::new(Arc::new(client))))
}

/// Writes every slug of `document_type` as one JSON object per line.
/// Returns how many were written.
pub async fn handle_slugs(
    store: Arc<dyn ContentStore>,
    document_type: &str,
    out: &mut impl Write,
) -> Result<usize> {
    let mut slugs = SlugGenerator::new(store).generate(document_type);
    let mut count = 0;
    while let Some(slug) = slugs.next().await {
        writeln!(out, "{}", serde_json::to_string(&slug?)?)?;
        count += 1;
    }
    info!(document_type, count, "slugs written");
    Ok(count)
}

/// Loads the catalog query `name` and writes the result with its signal.
pub async fn handle_fetch(
    store: Arc<dyn ContentStore>,
    name: &str,
    raw_params: &[String],
    draft: bool,
    out: &mut impl Write,
) -> Result<()> {
    let params = parse_params(raw_params)?;
    let request = RequestContext::new(EditingModeSignal::from(draft));
    let loader = QueryLoader::new(store, QueryCatalog::site());

    let loaded = loader.load::<Value>(name, params, &request).await?;
    if !loaded.is_found() {
        info!(query = name, "no document");
    }
    writeln!(out, "{}", serde_json::to_string_pretty(&loaded)?)?;
    Ok(())
}

/// Writes a `Set-Cookie` header that enters (or leaves) preview mode.
pub fn handle_preview_cookie(
    config: &VitrineConfig,
    clear: bool,
    now: DateTime<Utc>,
    out: &mut impl Write,
) -> Result<()> {
    let verifier = config.preview_verifier()?;
    let header = if clear {
        verifier.clear_set_cookie()
    } else {
        verifier.issue_set_cookie(now)
    };
    writeln!(out, "Set-Cookie: {header}")?;
    Ok(())
}

/// Parses `key=value` pairs. Values are read as JSON scalars when they
/// parse as such, otherwise as strings.
pub fn parse_params(raw: &[String]) -> Result<QueryParams> {
    raw.iter()
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| Error::config(format!("parameter `{pair}` is not key=value")))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(Error::config(format!("parameter `{pair}` has an empty key")));
            }
            Ok((key.to_string(), ParamValue::parse_lenient(value)))
        })
        .collect()
}
