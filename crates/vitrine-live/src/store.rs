//! Live query store.
//!
//! A [`LiveQueryStore`] is built once per page view and owns every
//! subscription it starts. Each [`LiveQuery`] is seeded with the value the
//! server rendered, re-issues the same query at the same perspective on
//! mount, then applies change-stream pushes in arrival order.
//!
//! Subscription errors never reach the page: the task reconnects with
//! exponential backoff and keeps showing the last good document. Once the
//! reconnect budget is spent the state turns [`LiveStatus::Failed`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use vitrine_content::Loaded;
use vitrine_core::{
    ContentDocument, ContentStore, Error, ExecutionContext, Perspective, QuerySignal, Result,
};

/// Reconnect policy for live subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveConfig {
    /// Reconnect attempts before giving up (0 = fail on first error).
    pub max_reconnect_attempts: u32,
    /// Delay before the first reconnect.
    pub initial_delay: Duration,
    /// Upper bound for the reconnect delay.
    pub max_delay: Duration,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl LiveConfig {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_reconnect_attempts as usize)
            .build()
    }
}

/// Connection status of a live subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum LiveStatus {
    /// Mounted, waiting for the first fetch.
    Loading,
    /// Following the change stream.
    Live,
    /// Waiting to reconnect after an error.
    Reconnecting {
        /// 1-based reconnect attempt.
        attempt: u32,
    },
    /// Gave up; the last value stays displayed.
    Failed,
    /// Server context: never connects.
    Inert,
}

/// What a subscribed view renders.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveState<T> {
    /// Current document, `None` when absent.
    pub data: Option<T>,
    /// Connection status.
    pub status: LiveStatus,
    /// Last error, cleared by the next good document.
    pub error: Option<String>,
}

impl<T> LiveState<T> {
    fn seeded(data: Option<T>, status: LiveStatus) -> Self {
        Self {
            data,
            status,
            error: None,
        }
    }

    /// Whether the first fetch is still pending.
    pub fn is_loading(&self) -> bool {
        self.status == LiveStatus::Loading
    }

    /// Whether the subscription is following the change stream.
    pub fn is_live(&self) -> bool {
        self.status == LiveStatus::Live
    }
}

/// Owner of the live subscriptions of one page view.
///
/// Dropping the store, or calling [`LiveQueryStore::shutdown`], cancels
/// every subscription it started.
pub struct LiveQueryStore {
    store: Arc<dyn ContentStore>,
    context: ExecutionContext,
    config: LiveConfig,
    tasks: Mutex<Vec<AbortHandle>>,
    closed: AtomicBool,
}

impl LiveQueryStore {
    /// Creates a store. In [`ExecutionContext::Server`] every subscription
    /// is inert.
    pub fn new(store: Arc<dyn ContentStore>, context: ExecutionContext, config: LiveConfig) -> Self {
        Self {
            store,
            context,
            config,
            tasks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// The execution context this store was built for.
    pub fn context(&self) -> ExecutionContext {
        self.context
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<AbortHandle>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribes to the query named by `signal`, showing `initial` until
    /// the first fetch completes.
    ///
    /// Must be called from within a tokio runtime in the client context.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] after [`LiveQueryStore::shutdown`].
    pub fn subscribe<T>(&self, signal: QuerySignal, initial: Option<T>) -> Result<LiveQuery<T>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::invalid_state("live query store has been shut down"));
        }

        if self.context.is_server() {
            debug!(query = %signal.query().name(), "server context, subscription is inert");
            let (_tx, rx) = watch::channel(LiveState::seeded(initial, LiveStatus::Inert));
            return Ok(LiveQuery {
                signal,
                state: rx,
                task: None,
            });
        }

        debug!(
            query = %signal.query().name(),
            perspective = %signal.perspective(),
            "starting live subscription"
        );
        let (tx, rx) = watch::channel(LiveState::seeded(initial, LiveStatus::Loading));
        let task = tokio::spawn(run_subscription(
            Arc::clone(&self.store),
            signal.clone(),
            self.config.clone(),
            tx,
        ));

        let mut tasks = self.tasks();
        tasks.retain(|handle| !handle.is_finished());
        tasks.push(task.abort_handle());

        Ok(LiveQuery {
            signal,
            state: rx,
            task: Some(task),
        })
    }

    /// Subscribes with a loader result, keeping its query, parameters and
    /// perspective.
    pub fn subscribe_loaded<T>(&self, loaded: Loaded<T>) -> Result<LiveQuery<T>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let (data, signal) = loaded.into_parts();
        self.subscribe(signal, data)
    }

    /// Subscriptions whose task is still running.
    pub fn active_subscriptions(&self) -> usize {
        let mut tasks = self.tasks();
        tasks.retain(|handle| !handle.is_finished());
        tasks.len()
    }

    /// Cancels every subscription and refuses new ones.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        let tasks = std::mem::take(&mut *self.tasks());
        for handle in &tasks {
            handle.abort();
        }
        info!(cancelled = tasks.len(), "live query store shut down");
    }
}

impl Drop for LiveQueryStore {
    fn drop(&mut self) {
        for handle in self.tasks().drain(..) {
            handle.abort();
        }
    }
}

/// A live subscription owned by one view.
///
/// Dropping it cancels the subscription; [`LiveQuery::unsubscribe`] also
/// waits for the task to stop.
pub struct LiveQuery<T> {
    signal: QuerySignal,
    state: watch::Receiver<LiveState<T>>,
    task: Option<JoinHandle<()>>,
}

impl<T> LiveQuery<T> {
    /// The query and perspective this subscription follows.
    pub fn signal(&self) -> &QuerySignal {
        &self.signal
    }

    /// Shorthand for `signal().perspective()`.
    pub fn perspective(&self) -> Perspective {
        self.signal.perspective()
    }

    /// Borrows the current state.
    pub fn borrow(&self) -> watch::Ref<'_, LiveState<T>> {
        self.state.borrow()
    }

    /// Current connection status.
    pub fn status(&self) -> LiveStatus {
        self.state.borrow().status.clone()
    }

    /// Waits for the next state change.
    pub async fn changed(&mut self) -> Result<()> {
        self.state
            .changed()
            .await
            .map_err(|_| Error::subscription("live subscription ended"))
    }

    /// Waits until the state satisfies `predicate`, checking the current
    /// state first.
    pub async fn wait_for(&mut self, mut predicate: impl FnMut(&LiveState<T>) -> bool) -> Result<()> {
        self.state
            .wait_for(|state| predicate(state))
            .await
            .map(|_| ())
            .map_err(|_| Error::subscription("live subscription ended"))
    }

    /// Cancels the subscription and waits for its task to stop. Nothing is
    /// applied after this returns.
    pub async fn unsubscribe(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
            debug!(query = %self.signal.query().name(), "live subscription released");
        }
    }
}

impl<T: Clone> LiveQuery<T> {
    /// Snapshot of the current state.
    pub fn current(&self) -> LiveState<T> {
        self.state.borrow().clone()
    }

    /// Snapshot of the current document.
    pub fn data(&self) -> Option<T> {
        self.state.borrow().data.clone()
    }
}

impl<T> Drop for LiveQuery<T> {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

async fn run_subscription<T>(
    store: Arc<dyn ContentStore>,
    signal: QuerySignal,
    config: LiveConfig,
    tx: watch::Sender<LiveState<T>>,
) where
    T: DeserializeOwned,
{
    let name = signal.query().name().to_string();
    let mut backoff = config.backoff();
    let mut attempt = 0u32;

    loop {
        let err = follow(store.as_ref(), &signal, &tx).await;
        if tx.is_closed() {
            return;
        }

        if err.is_fatal() {
            warn!(query = %name, error = %err, "live subscription failed");
            tx.send_modify(|state| {
                state.status = LiveStatus::Failed;
                state.error = Some(err.to_string());
            });
            return;
        }

        // A subscription that reached the live state earns a fresh budget.
        let connected = tx.borrow().is_live();
        if connected {
            attempt = 0;
            backoff = config.backoff();
        }
        attempt += 1;

        let Some(delay) = backoff.next() else {
            warn!(
                query = %name,
                attempts = attempt - 1,
                error = %err,
                "live subscription giving up"
            );
            tx.send_modify(|state| {
                state.status = LiveStatus::Failed;
                state.error = Some(err.to_string());
            });
            return;
        };

        warn!(
            query = %name,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "live subscription interrupted, reconnecting"
        );
        tx.send_modify(|state| {
            state.status = LiveStatus::Reconnecting { attempt };
            state.error = Some(err.to_string());
        });
        tokio::time::sleep(delay).await;
    }
}

/// Opens the change stream, re-fetches, then applies pushes until the
/// stream fails. Always ends with the error that interrupted it.
async fn follow<T: DeserializeOwned>(
    store: &dyn ContentStore,
    signal: &QuerySignal,
    tx: &watch::Sender<LiveState<T>>,
) -> Error {
    let query = signal.query();
    let perspective = signal.perspective();

    let mut changes = match store.listen(query, perspective).await {
        Ok(changes) => changes,
        Err(err) => return err,
    };
    match store.fetch(query, perspective).await {
        Ok(doc) => apply(tx, query.name(), doc),
        Err(err) => return err,
    }

    while let Some(change) = changes.next().await {
        match change {
            Ok(doc) => apply(tx, query.name(), doc),
            Err(err) => return err,
        }
    }
    Error::subscription("change stream closed")
}

fn apply<T: DeserializeOwned>(
    tx: &watch::Sender<LiveState<T>>,
    name: &str,
    doc: Option<ContentDocument>,
) {
    match doc.map(serde_json::from_value::<T>).transpose() {
        Ok(data) => {
            debug!(query = %name, found = data.is_some(), "live document replaced");
            tx.send_modify(|state| {
                state.data = data;
                state.status = LiveStatus::Live;
                state.error = None;
            });
        }
        Err(e) => {
            warn!(query = %name, error = %e, "keeping previous document, push did not decode");
            tx.send_modify(|state| {
                state.status = LiveStatus::Live;
                state.error = Some(format!("malformed document: {e}"));
            });
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use vitrine_content::MockContentStore;
    use vitrine_core::ContentQuery;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Doc {
        title: String,
    }

    fn doc(title: &str) -> Doc {
        Doc {
            title: title.to_string(),
        }
    }

    fn signal(perspective: Perspective) -> QuerySignal {
        QuerySignal::new(
            ContentQuery::new("homePage", r#"*[_type == "home"][0]"#),
            perspective,
        )
    }

    fn client_store(mock: &MockContentStore, config: LiveConfig) -> LiveQueryStore {
        LiveQueryStore::new(Arc::new(mock.clone()), ExecutionContext::Client, config)
    }

    #[tokio::test]
    async fn test_server_context_is_inert() {
        let mock = MockContentStore::new();
        let store = LiveQueryStore::new(
            Arc::new(mock.clone()),
            ExecutionContext::Server,
            LiveConfig::default(),
        );

        let live = store
            .subscribe(signal(Perspective::Draft), Some(doc("Accueil")))
            .unwrap();
        assert_eq!(live.status(), LiveStatus::Inert);
        assert_eq!(live.data(), Some(doc("Accueil")));

        tokio::task::yield_now().await;
        assert!(mock.fetch_calls().is_empty());
        assert!(mock.listen_calls().is_empty());
        assert_eq!(store.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_mount_refetches_same_query() {
        let mock = MockContentStore::new()
            .with_document("homePage", Perspective::Draft, json!({ "title": "Accueil (brouillon)" }));
        let store = client_store(&mock, LiveConfig::default());

        let mut live = store
            .subscribe(signal(Perspective::Draft), Some(doc("Accueil")))
            .unwrap();
        assert!(live.current().is_loading());
        assert_eq!(live.data(), Some(doc("Accueil")));

        live.wait_for(LiveState::is_live).await.unwrap();
        assert_eq!(live.data(), Some(doc("Accueil (brouillon)")));
        assert_eq!(
            mock.fetch_calls(),
            vec![("homePage".to_string(), Perspective::Draft)]
        );
        assert_eq!(
            mock.listen_calls(),
            vec![("homePage".to_string(), Perspective::Draft)]
        );
    }

    #[tokio::test]
    async fn test_pushes_apply_in_order() {
        let mock = MockContentStore::new()
            .with_document("homePage", Perspective::Published, json!({ "title": "v0" }));
        let store = client_store(&mock, LiveConfig::default());
        let mut live = store.subscribe::<Doc>(signal(Perspective::Published), None).unwrap();
        live.wait_for(LiveState::is_live).await.unwrap();

        for v in 1..=3 {
            mock.push(
                "homePage",
                Perspective::Published,
                Some(json!({ "title": format!("v{v}") })),
            );
        }
        live.wait_for(|s| s.data == Some(doc("v3"))).await.unwrap();

        mock.push("homePage", Perspective::Published, None);
        live.wait_for(|s| s.data.is_none()).await.unwrap();
    }

    #[tokio::test]
    async fn test_pushes_for_other_perspective_are_ignored() {
        let mock = MockContentStore::new()
            .with_document("homePage", Perspective::Published, json!({ "title": "Accueil" }));
        let store = client_store(&mock, LiveConfig::default());
        let mut live = store.subscribe::<Doc>(signal(Perspective::Published), None).unwrap();
        live.wait_for(LiveState::is_live).await.unwrap();

        assert_eq!(
            mock.push("homePage", Perspective::Draft, Some(json!({ "title": "Brouillon" }))),
            0
        );
        assert_eq!(live.data(), Some(doc("Accueil")));
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_updates() {
        let mock = MockContentStore::new()
            .with_document("homePage", Perspective::Published, json!({ "title": "Accueil" }));
        let store = client_store(&mock, LiveConfig::default());
        let mut live = store.subscribe::<Doc>(signal(Perspective::Published), None).unwrap();
        live.wait_for(LiveState::is_live).await.unwrap();
        assert_eq!(mock.active_listeners(), 1);

        live.unsubscribe().await;
        assert_eq!(mock.active_listeners(), 0);
        assert_eq!(
            mock.push("homePage", Perspective::Published, Some(json!({ "title": "late" }))),
            0
        );
        assert_eq!(store.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_push_keeps_previous_document() {
        let mock = MockContentStore::new()
            .with_document("homePage", Perspective::Published, json!({ "title": "Accueil" }));
        let store = client_store(&mock, LiveConfig::default());
        let mut live = store.subscribe::<Doc>(signal(Perspective::Published), None).unwrap();
        live.wait_for(LiveState::is_live).await.unwrap();

        mock.push("homePage", Perspective::Published, Some(json!({ "title": 7 })));
        live.wait_for(|s| s.error.is_some()).await.unwrap();
        let state = live.current();
        assert_eq!(state.data, Some(doc("Accueil")));
        assert!(state.error.unwrap().contains("malformed"));
        assert!(state.status == LiveStatus::Live);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_stream_error() {
        let mock = MockContentStore::new()
            .with_document("homePage", Perspective::Published, json!({ "title": "Accueil" }));
        let store = client_store(&mock, LiveConfig::default());
        let mut live = store.subscribe::<Doc>(signal(Perspective::Published), None).unwrap();
        live.wait_for(LiveState::is_live).await.unwrap();

        mock.set_document("homePage", Perspective::Published, json!({ "title": "Accueil v2" }));
        mock.push_error("homePage", Perspective::Published, "channel error");

        live.wait_for(|s| matches!(s.status, LiveStatus::Reconnecting { attempt: 1 }))
            .await
            .unwrap();
        assert_eq!(live.data(), Some(doc("Accueil")));

        live.wait_for(LiveState::is_live).await.unwrap();
        assert_eq!(live.data(), Some(doc("Accueil v2")));
        assert_eq!(mock.listen_calls().len(), 2);
        assert!(live.current().error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_after_exhausting_attempts() {
        let mock = MockContentStore::new();
        mock.fail_next_listens(10);
        let config = LiveConfig {
            max_reconnect_attempts: 2,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        };
        let store = client_store(&mock, config);
        let mut live = store
            .subscribe(signal(Perspective::Published), Some(doc("Accueil")))
            .unwrap();

        live.wait_for(|s| s.status == LiveStatus::Failed).await.unwrap();
        assert_eq!(live.data(), Some(doc("Accueil")));
        assert_eq!(mock.listen_calls().len(), 3);
        assert!(live.current().error.is_some());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_and_refuses() {
        let mock = MockContentStore::new()
            .with_document("homePage", Perspective::Published, json!({ "title": "Accueil" }));
        let store = client_store(&mock, LiveConfig::default());
        let mut live = store.subscribe::<Doc>(signal(Perspective::Published), None).unwrap();
        live.wait_for(LiveState::is_live).await.unwrap();

        store.shutdown();
        assert!(live.changed().await.is_err());
        assert_eq!(mock.active_listeners(), 0);

        let err = store
            .subscribe::<Doc>(signal(Perspective::Published), None)
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_subscribe_loaded_keeps_signal() {
        let mock = MockContentStore::new();
        let store = client_store(&mock, LiveConfig::default());
        let loaded = Loaded {
            data: Some(doc("Accueil")),
            signal: signal(Perspective::Draft),
        };

        let live = store.subscribe_loaded(loaded).unwrap();
        assert_eq!(live.signal(), &signal(Perspective::Draft));
        assert_eq!(live.perspective(), Perspective::Draft);
        assert_eq!(live.data(), Some(doc("Accueil")));
    }

    #[test]
    fn test_backoff_respects_attempts() {
        let config = LiveConfig {
            max_reconnect_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(25),
        };
        let delays: Vec<_> = config.backoff().collect();
        assert_eq!(delays.len(), 3);
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(25)));
    }
}
