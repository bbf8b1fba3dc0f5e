//! HTTP client for the content store.
//!
//! Speaks the store's query API (`/v{version}/data/query/{dataset}`) and its
//! server-sent-event listen API (`/v{version}/data/listen/{dataset}`).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, trace, warn};

use vitrine_core::{
    ChangeStream, ContentDocument, ContentQuery, ContentStore, Error, ExecutionContext,
    Perspective, Result,
};

use crate::config::{ClientConfig, ReadToken};
use crate::sse::{EventStreamDecoder, SseEvent};

const API_DOMAIN: &str = "api.sanity.io";
const CDN_DOMAIN: &str = "apicdn.sanity.io";
const LISTEN_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ERROR_BODY: usize = 512;

/// Configured handle to the remote content store.
///
/// Cheap to clone; clones share the connection pool. Identity is validated
/// once, at construction.
#[derive(Clone)]
pub struct ContentClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    project_id: String,
    dataset: String,
    api_version: String,
    api_host: Option<String>,
    use_cdn: bool,
    read_token: Option<ReadToken>,
    context: ExecutionContext,
    http: reqwest::Client,
    listen_http: reqwest::Client,
}

#[derive(Deserialize)]
struct QueryEnvelope {
    result: ContentDocument,
}

impl ContentClient {
    /// Creates a client for `context`.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] when project id, dataset or API version is
    ///   missing or malformed, or when `require_token` is set for a server
    ///   client without a token.
    /// - [`Error::EnvironmentViolation`] when a read token is configured for
    ///   a client-context handle.
    pub fn new(config: ClientConfig, context: ExecutionContext) -> Result<Self> {
        let project_id = required(config.project_id.as_deref(), "content.project_id")?;
        let dataset = required(config.dataset.as_deref(), "content.dataset")?;
        let api_version = required(config.api_version.as_deref(), "content.api_version")?;
        let api_version = api_version.trim_start_matches('v').to_string();

        if !project_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(Error::config(format!(
                "content.project_id `{}` may only contain letters, digits and dashes",
                project_id
            )));
        }
        if !dataset
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::config(format!(
                "content.dataset `{}` may only contain letters, digits, dashes and underscores",
                dataset
            )));
        }

        let read_token = config.read_token.filter(|t| !t.is_blank());
        if read_token.is_some() && context.is_client() {
            return Err(Error::environment_violation(
                "configuring a read token",
                context,
            ));
        }
        if config.require_token && context.is_server() && read_token.is_none() {
            return Err(Error::config(
                "content.read_token is required but not set",
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("http client: {e}")))?;
        let listen_http = reqwest::Client::builder()
            .connect_timeout(LISTEN_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("http client: {e}")))?;

        debug!(
            project_id = %project_id,
            dataset = %dataset,
            api_version = %api_version,
            context = %context,
            "content client ready"
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                project_id,
                dataset,
                api_version,
                api_host: config.api_host,
                use_cdn: config.use_cdn,
                read_token,
                context,
                http,
                listen_http,
            }),
        })
    }

    /// The execution context this client was built for.
    pub fn context(&self) -> ExecutionContext {
        self.inner.context
    }

    /// Project identifier.
    pub fn project_id(&self) -> &str {
        &self.inner.project_id
    }

    /// Dataset name.
    pub fn dataset(&self) -> &str {
        &self.inner.dataset
    }

    /// API version, without the leading `v`.
    pub fn api_version(&self) -> &str {
        &self.inner.api_version
    }

    /// The privileged read token.
    ///
    /// # Errors
    ///
    /// [`Error::EnvironmentViolation`] outside the server context, before
    /// anything else is checked; [`Error::Configuration`] when no token is
    /// configured.
    pub fn read_token(&self) -> Result<&str> {
        self.inner.context.ensure_server("reading the read token")?;
        self.inner
            .read_token
            .as_ref()
            .map(ReadToken::expose)
            .ok_or_else(|| Error::config("content.read_token is not set"))
    }

    /// Token to attach to a request, if any.
    fn auth_token(&self, query: &ContentQuery, perspective: Perspective) -> Result<Option<&str>> {
        if self.inner.context.is_client() {
            return Ok(None);
        }
        match (&self.inner.read_token, perspective) {
            (Some(token), _) => Ok(Some(token.expose())),
            (None, Perspective::Draft) => Err(Error::config(format!(
                "query `{}` needs draft content but content.read_token is not set",
                query.name()
            ))),
            (None, Perspective::Published) => Ok(None),
        }
    }

    fn base_url(&self, cdn: bool) -> String {
        match &self.inner.api_host {
            Some(host) => host.trim_end_matches('/').to_string(),
            None => format!(
                "https://{}.{}",
                self.inner.project_id,
                if cdn { CDN_DOMAIN } else { API_DOMAIN }
            ),
        }
    }

    fn endpoint(&self, kind: &str, cdn: bool) -> String {
        format!(
            "{}/v{}/data/{}/{}",
            self.base_url(cdn),
            self.inner.api_version,
            kind,
            self.inner.dataset
        )
    }

    fn query_pairs(
        query: &ContentQuery,
        text: &str,
        perspective: Perspective,
    ) -> Result<Vec<(String, String)>> {
        let mut pairs = vec![
            ("query".to_string(), text.to_string()),
            (
                "perspective".to_string(),
                perspective.as_api_str().to_string(),
            ),
        ];
        for (key, value) in query.params() {
            pairs.push((format!("${key}"), value.to_json()?));
        }
        Ok(pairs)
    }

    async fn check_status(name: &str, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let mut body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Err(Error::fetch_status(
            name,
            status.as_u16(),
            format!("content store returned {}: {}", status, body),
        ))
    }
}

#[async_trait]
impl ContentStore for ContentClient {
    async fn fetch(
        &self,
        query: &ContentQuery,
        perspective: Perspective,
    ) -> Result<Option<ContentDocument>> {
        let token = self.auth_token(query, perspective)?;
        let cdn = self.inner.use_cdn && token.is_none() && perspective == Perspective::Published;
        let url = self.endpoint("query", cdn);
        let pairs = Self::query_pairs(query, query.text(), perspective)?;

        debug!(query = %query.name(), perspective = %perspective, cdn, "fetching content");

        let mut request = self.inner.http.get(&url).query(&pairs);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::fetch_transport(query.name(), "request to content store failed", e))?;
        let response = Self::check_status(query.name(), response).await?;

        let envelope: QueryEnvelope = response.json().await.map_err(|e| {
            Error::fetch(query.name(), format!("malformed query response: {e}"))
        })?;

        Ok(match envelope.result {
            ContentDocument::Null => None,
            doc => Some(doc),
        })
    }

    async fn listen(&self, query: &ContentQuery, perspective: Perspective) -> Result<ChangeStream> {
        let token = self.auth_token(query, perspective)?;
        let url = self.endpoint("listen", false);
        let mut pairs = Self::query_pairs(query, query.listen_filter(), perspective)?;
        pairs.push(("includeResult".to_string(), "false".to_string()));
        pairs.push((
            "events".to_string(),
            "welcome,mutation,reconnect".to_string(),
        ));

        debug!(query = %query.name(), perspective = %perspective, "opening change stream");

        let mut request = self
            .inner
            .listen_http
            .get(&url)
            .query(&pairs)
            .header(reqwest::header::ACCEPT, "text/event-stream");
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::fetch_transport(query.name(), "could not open change stream", e))?;
        let response = Self::check_status(query.name(), response).await?;

        let state = ListenState {
            bytes: response
                .bytes_stream()
                .map(|chunk| chunk.map(|b| b.to_vec()))
                .boxed(),
            decoder: EventStreamDecoder::new(),
            pending: VecDeque::new(),
            client: self.clone(),
            query: query.clone(),
            perspective,
            done: false,
        };

        Ok(futures::stream::unfold(state, next_change).boxed())
    }
}

struct ListenState {
    bytes: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: EventStreamDecoder,
    pending: VecDeque<SseEvent>,
    client: ContentClient,
    query: ContentQuery,
    perspective: Perspective,
    done: bool,
}

/// Turns raw listen events into document replacements.
///
/// Mutation events carry no result; each one triggers a re-fetch of the
/// full query at the subscription's perspective.
async fn next_change(
    mut state: ListenState,
) -> Option<(Result<Option<ContentDocument>>, ListenState)> {
    if state.done {
        return None;
    }
    loop {
        while let Some(event) = state.pending.pop_front() {
            match event.event.as_deref() {
                Some("mutation") => {
                    let item = state.client.fetch(&state.query, state.perspective).await;
                    if item.is_err() {
                        state.done = true;
                    }
                    return Some((item, state));
                }
                Some("channelError") | Some("disconnect") => {
                    warn!(query = %state.query.name(), data = %event.data, "change stream closed by store");
                    state.done = true;
                    let err = Error::subscription(format!(
                        "{} from content store: {}",
                        event.event.as_deref().unwrap_or_default(),
                        event.data
                    ));
                    return Some((Err(err), state));
                }
                other => {
                    trace!(query = %state.query.name(), event = ?other, "ignoring listen event");
                }
            }
        }

        match state.bytes.next().await {
            Some(Ok(chunk)) => match state.decoder.push(&chunk) {
                Ok(events) => state.pending.extend(events),
                Err(err) => {
                    warn!(query = %state.query.name(), error = %err, "dropping change stream");
                    state.done = true;
                    return Some((Err(err), state));
                }
            },
            Some(Err(e)) => {
                state.done = true;
                let err = Error::subscription(format!("change stream interrupted: {e}"));
                return Some((Err(err), state));
            }
            None => return None,
        }
    }
}

fn required(value: Option<&str>, key: &str) -> Result<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(Error::config(format!("{key} is required"))),
    }
}
