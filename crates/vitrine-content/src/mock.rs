//! In-memory content store for testing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;

use vitrine_core::{
    ChangeStream, ContentDocument, ContentQuery, ContentStore, Error, Perspective, Result,
};

/// Mock store that serves canned documents keyed by query name.
///
/// Draft reads fall back to the published document when no draft exists,
/// mirroring how the real store overlays drafts. Change streams are driven
/// by [`MockContentStore::push`]. Clones share state.
#[derive(Clone, Default)]
pub struct MockContentStore {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    documents: HashMap<(String, Perspective), ContentDocument>,
    failing: HashMap<String, Failure>,
    failing_listens: usize,
    listeners: Vec<Listener>,
    fetch_log: Vec<(String, Perspective)>,
    listen_log: Vec<(String, Perspective)>,
}

enum Failure {
    Always,
    Times(usize),
}

struct Listener {
    name: String,
    perspective: Perspective,
    tx: mpsc::UnboundedSender<Result<Option<ContentDocument>>>,
}

impl MockContentStore {
    /// Creates an empty mock store.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Builder form of [`MockContentStore::set_document`].
    pub fn with_document(
        self,
        name: impl Into<String>,
        perspective: Perspective,
        doc: ContentDocument,
    ) -> Self {
        self.set_document(name, perspective, doc);
        self
    }

    /// Sets what `name` resolves to at `perspective`.
    pub fn set_document(&self, name: impl Into<String>, perspective: Perspective, doc: ContentDocument) {
        self.state().documents.insert((name.into(), perspective), doc);
    }

    /// Removes the document for `name` at `perspective`.
    pub fn remove_document(&self, name: &str, perspective: Perspective) {
        self.state()
            .documents
            .remove(&(name.to_string(), perspective));
    }

    /// Every fetch of `name` fails with a transport error.
    pub fn fail_query(&self, name: impl Into<String>) {
        self.state().failing.insert(name.into(), Failure::Always);
    }

    /// The next `times` fetches of `name` fail with a transport error.
    pub fn fail_next_fetches(&self, name: impl Into<String>, times: usize) {
        self.state().failing.insert(name.into(), Failure::Times(times));
    }

    /// Stops failing fetches of `name`.
    pub fn recover_query(&self, name: &str) {
        self.state().failing.remove(name);
    }

    /// The next `times` listen calls fail.
    pub fn fail_next_listens(&self, times: usize) {
        self.state().failing_listens = times;
    }

    /// Pushes a replacement document to every open listener of
    /// `name`/`perspective`. Returns how many listeners received it.
    pub fn push(&self, name: &str, perspective: Perspective, doc: Option<ContentDocument>) -> usize {
        self.broadcast(name, perspective, || Ok(doc.clone()))
    }

    /// Pushes an error to every open listener of `name`/`perspective`.
    pub fn push_error(&self, name: &str, perspective: Perspective, msg: &str) -> usize {
        self.broadcast(name, perspective, || Err(Error::subscription(msg)))
    }

    /// Closes every open change stream.
    pub fn close_listeners(&self) {
        self.state().listeners.clear();
    }

    /// Number of change streams still held by a subscriber.
    pub fn active_listeners(&self) -> usize {
        let mut state = self.state();
        state.listeners.retain(|l| !l.tx.is_closed());
        state.listeners.len()
    }

    /// Every fetch made so far, in order.
    pub fn fetch_calls(&self) -> Vec<(String, Perspective)> {
        self.state().fetch_log.clone()
    }

    /// Every listen made so far, in order.
    pub fn listen_calls(&self) -> Vec<(String, Perspective)> {
        self.state().listen_log.clone()
    }

    fn broadcast(
        &self,
        name: &str,
        perspective: Perspective,
        item: impl Fn() -> Result<Option<ContentDocument>>,
    ) -> usize {
        let mut state = self.state();
        state.listeners.retain(|l| !l.tx.is_closed());
        state
            .listeners
            .iter()
            .filter(|l| l.name == name && l.perspective == perspective)
            .filter(|l| l.tx.unbounded_send(item()).is_ok())
            .count()
    }
}

#[async_trait]
impl ContentStore for MockContentStore {
    async fn fetch(
        &self,
        query: &ContentQuery,
        perspective: Perspective,
    ) -> Result<Option<ContentDocument>> {
        let mut state = self.state();
        let name = query.name().to_string();
        state.fetch_log.push((name.clone(), perspective));

        let fail = match state.failing.get_mut(&name) {
            Some(Failure::Always) => true,
            Some(Failure::Times(n)) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        };
        if fail {
            return Err(Error::fetch_transport(
                name,
                "request to content store failed",
                std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused"),
            ));
        }

        let doc = match perspective {
            Perspective::Published => state.documents.get(&(name, Perspective::Published)),
            Perspective::Draft => state
                .documents
                .get(&(name.clone(), Perspective::Draft))
                .or_else(|| state.documents.get(&(name, Perspective::Published))),
        };
        Ok(doc.cloned())
    }

    async fn listen(&self, query: &ContentQuery, perspective: Perspective) -> Result<ChangeStream> {
        let mut state = self.state();
        state
            .listen_log
            .push((query.name().to_string(), perspective));

        if state.failing_listens > 0 {
            state.failing_listens -= 1;
            return Err(Error::subscription("listen refused"));
        }

        let (tx, rx) = mpsc::unbounded();
        state.listeners.push(Listener {
            name: query.name().to_string(),
            perspective,
            tx,
        });
        Ok(rx.boxed())
    }
}
