//! Query Runner Module
//!
//! Drives one named, repeatable fetch: read-through over the shared cache,
//! retry with exponential backoff, interval and focus refetches, and a
//! reactive [`QueryState`].

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::cache::{system_clock, SharedCache, SharedClock};
use crate::query::{HostEnvironment, QueryOptions, QueryState, QueryStatus};

/// Boxed future returned by a query fetcher.
pub type FetchFuture<T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send>>;

type Fetcher<T> = Arc<dyn Fn() -> FetchFuture<T> + Send + Sync>;

/// Values a query can produce and cache.
pub trait QueryData: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> QueryData for T where T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

// == Fetch Mode ==
/// Whether a fetch is visible to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Sets `Loading`; a terminal failure becomes `Error`.
    Foreground,
    /// Leaves `status` alone; failures are only logged.
    Background,
}

// == Builder ==
/// Assembles a [`QueryRunner`].
pub struct QueryBuilder<T> {
    key: String,
    fetcher: Fetcher<T>,
    options: QueryOptions,
    cache: Option<SharedCache>,
    host: HostEnvironment,
    clock: SharedClock,
}

impl<T: QueryData> QueryBuilder<T> {
    pub fn options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    /// Reads through and writes back to `cache`.
    pub fn cache(mut self, cache: SharedCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn host(mut self, host: HostEnvironment) -> Self {
        self.host = host;
        self
    }

    /// Time source for `last_fetched_at` and staleness. Should match the
    /// cache's clock when a cache is attached.
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> QueryRunner<T> {
        let (state, _) = watch::channel(QueryState::default());
        QueryRunner {
            inner: Arc::new(Inner {
                key: self.key,
                fetcher: self.fetcher,
                options: self.options,
                cache: self.cache,
                host: self.host,
                clock: self.clock,
                state,
                latest_seq: AtomicU64::new(0),
                in_flight: AtomicUsize::new(0),
                mount: Arc::new(MountState::new()),
            }),
        }
    }
}

// == Query Runner ==
/// Handle to one query. Clones drive the same query and share its state.
pub struct QueryRunner<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for QueryRunner<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<T> {
    key: String,
    fetcher: Fetcher<T>,
    options: QueryOptions,
    cache: Option<SharedCache>,
    host: HostEnvironment,
    clock: SharedClock,
    state: watch::Sender<QueryState<T>>,
    /// Sequence number of the most recently issued fetch. Only that fetch may
    /// publish a result.
    latest_seq: AtomicU64,
    in_flight: AtomicUsize,
    mount: Arc<MountState>,
}

// Tracks which `start()` currently owns the query's state. Each start takes a
// new generation; disposing a subscription detaches only if its generation is
// still the current one.
#[derive(Debug)]
struct MountState {
    next: AtomicU64,
    current: AtomicU64,
}

const DETACHED: u64 = 0;

impl MountState {
    // A freshly built runner is attached under generation 1 until its first
    // start() or dispose.
    fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            current: AtomicU64::new(1),
        }
    }

    fn attach(&self) -> u64 {
        let generation = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        self.current.store(generation, Ordering::SeqCst);
        generation
    }

    fn detach(&self, generation: u64) {
        let _ = self.current.compare_exchange(
            generation,
            DETACHED,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    fn is_attached(&self) -> bool {
        self.current.load(Ordering::SeqCst) != DETACHED
    }

    fn is_current(&self, generation: u64) -> bool {
        self.current.load(Ordering::SeqCst) == generation
    }
}

impl<T: QueryData> QueryRunner<T> {
    // == Constructor ==
    /// Starts building a query for `key` backed by `fetcher`.
    pub fn builder<F, Fut>(key: impl Into<String>, fetcher: F) -> QueryBuilder<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        QueryBuilder {
            key: key.into(),
            fetcher: Arc::new(move || Box::pin(fetcher()) as FetchFuture<T>),
            options: QueryOptions::default(),
            cache: None,
            host: HostEnvironment::new(),
            clock: system_clock(),
        }
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn options(&self) -> &QueryOptions {
        &self.inner.options
    }

    /// Receiver that observes every published state change.
    pub fn subscribe(&self) -> watch::Receiver<QueryState<T>> {
        self.inner.state.subscribe()
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> QueryState<T> {
        self.inner.state.borrow().clone()
    }

    /// Whether the current data is older than `stale_time` (or missing).
    pub fn is_stale(&self) -> bool {
        self.inner
            .state
            .borrow()
            .is_stale(self.inner.options.stale_time, self.inner.clock.now_ms())
    }

    // == Start ==
    /// Mounts the query.
    ///
    /// A cache hit is published as `Success` before this returns, and a stale
    /// hit additionally starts a background refresh. A miss starts a
    /// foreground fetch. Interval and focus triggers live until the returned
    /// subscription is disposed.
    pub async fn start(&self) -> QuerySubscription {
        let inner = &self.inner;
        let generation = inner.mount.attach();

        // Completions that landed while detached never published their
        // in-flight count.
        let fetching = inner.in_flight.load(Ordering::SeqCst) > 0;
        inner.publish(None, |state| state.is_fetching = fetching);

        if inner.options.enabled {
            match self.read_cached().await {
                Some((data, stored_at)) => {
                    let stale = {
                        let now = inner.clock.now_ms();
                        now.saturating_sub(stored_at) > inner.options.stale_time.as_millis() as u64
                    };
                    inner.publish(None, |state| {
                        state.data = Some(data);
                        state.status = QueryStatus::Success;
                        state.error = None;
                        state.last_fetched_at = Some(stored_at);
                        state.retry_count = 0;
                    });
                    debug!(key = %inner.key, stale, "served query from cache");
                    if stale {
                        self.execute(FetchMode::Background);
                    }
                }
                None => {
                    self.execute(FetchMode::Foreground);
                }
            }
        } else {
            debug!(key = %inner.key, "query disabled, not fetching");
        }

        let mut tasks = Vec::new();
        if let Some(period) = inner.options.refetch_interval {
            tasks.push(self.spawn_interval(period));
        }
        if inner.options.refetch_on_window_focus {
            tasks.push(self.spawn_focus_listener(inner.host.subscribe_focus()));
        }

        QuerySubscription {
            tasks,
            generation,
            mount: Arc::clone(&inner.mount),
        }
    }

    // == Execute ==
    /// Runs one fetch (with retries) on a spawned task.
    ///
    /// Returns `None` when the query is disabled, or for a background fetch
    /// when another fetch for this query is already in flight.
    pub fn execute(&self, mode: FetchMode) -> Option<JoinHandle<()>> {
        let inner = &self.inner;
        if !inner.options.enabled {
            return None;
        }

        match mode {
            FetchMode::Foreground => {
                inner.in_flight.fetch_add(1, Ordering::SeqCst);
            }
            FetchMode::Background => {
                if inner
                    .in_flight
                    .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    debug!(key = %inner.key, "fetch already in flight, skipping background refresh");
                    return None;
                }
            }
        }

        let seq = inner.latest_seq.fetch_add(1, Ordering::SeqCst) + 1;
        inner.publish(None, |state| {
            if mode == FetchMode::Foreground {
                state.status = QueryStatus::Loading;
                state.error = None;
                state.retry_count = 0;
            }
            state.is_fetching = true;
        });

        let inner = Arc::clone(inner);
        Some(tokio::spawn(async move {
            inner.fetch_with_retry(mode, seq).await;
            let remaining = inner.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
            inner.publish(None, |state| state.is_fetching = remaining > 0);
        }))
    }

    /// Forced foreground fetch that ignores freshness.
    pub fn refetch(&self) -> Option<JoinHandle<()>> {
        self.execute(FetchMode::Foreground)
    }

    // == Invalidate ==
    /// Drops this query's cache entry and data without fetching.
    ///
    /// Any fetch still in flight is superseded and its result discarded.
    pub async fn invalidate(&self) {
        let inner = &self.inner;
        inner.latest_seq.fetch_add(1, Ordering::SeqCst);

        if let Some(cache) = &inner.cache {
            cache.write().await.invalidate(&inner.key);
        }

        // Applies even while detached so the next mount starts from idle.
        inner.state.send_modify(|state| {
            state.data = None;
            state.status = QueryStatus::Idle;
            state.error = None;
            state.last_fetched_at = None;
            state.retry_count = 0;
        });
        debug!(key = %inner.key, "query invalidated");
    }

    async fn read_cached(&self) -> Option<(T, u64)> {
        let cache = self.inner.cache.as_ref()?;
        let mut store = cache.write().await;
        let entry = store.get_entry(&self.inner.key)?;

        match serde_json::from_value::<T>(entry.value.clone()) {
            Ok(data) => Some((data, entry.stored_at)),
            Err(err) => {
                warn!(key = %self.inner.key, error = %err, "cached value does not match query type");
                None
            }
        }
    }

    fn spawn_interval(&self, period: Duration) -> JoinHandle<()> {
        let runner = self.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if runner.inner.host.is_visible() {
                    runner.execute(FetchMode::Background);
                } else {
                    debug!(key = %runner.inner.key, "host hidden, skipping interval refetch");
                }
            }
        })
    }

    fn spawn_focus_listener(&self, mut focus: broadcast::Receiver<()>) -> JoinHandle<()> {
        let runner = self.clone();
        tokio::spawn(async move {
            loop {
                match focus.recv().await {
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        if runner.is_stale() {
                            runner.execute(FetchMode::Background);
                        } else {
                            debug!(key = %runner.inner.key, "data fresh, ignoring focus");
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl<T: QueryData> Inner<T> {
    fn is_current(&self, seq: u64) -> bool {
        self.latest_seq.load(Ordering::SeqCst) == seq
    }

    // Applies `update` to the state unless the consumer has detached or, when
    // `seq` is given, a newer fetch has been issued. Returns whether it applied.
    fn publish(&self, seq: Option<u64>, update: impl FnOnce(&mut QueryState<T>)) -> bool {
        if !self.mount.is_attached() {
            return false;
        }
        self.state.send_if_modified(|state| {
            if seq.is_some_and(|seq| !self.is_current(seq)) {
                return false;
            }
            update(state);
            true
        })
    }

    async fn fetch_with_retry(&self, mode: FetchMode, seq: u64) {
        let mut retries: u32 = 0;

        loop {
            let err = match (self.fetcher)().await {
                Ok(data) => {
                    self.store_result(mode, seq, data).await;
                    return;
                }
                Err(err) => err,
            };

            if !self.is_current(seq) {
                debug!(key = %self.key, ?mode, "superseded fetch failed, dropping error");
                return;
            }

            if retries < self.options.retry_limit {
                retries += 1;
                let delay = self.options.retry_delay(retries);
                debug!(
                    key = %self.key,
                    ?mode,
                    retry = retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "fetch failed, retrying"
                );
                if mode == FetchMode::Foreground {
                    self.publish(Some(seq), |state| state.retry_count = retries);
                }
                time::sleep(delay).await;
                if !self.is_current(seq) {
                    debug!(key = %self.key, ?mode, "fetch superseded while backing off");
                    return;
                }
                continue;
            }

            match mode {
                FetchMode::Foreground => {
                    warn!(key = %self.key, retries, error = %err, "fetch failed, giving up");
                    self.publish(Some(seq), |state| {
                        state.status = QueryStatus::Error;
                        state.error = Some(Arc::new(err));
                    });
                }
                FetchMode::Background => {
                    warn!(key = %self.key, retries, error = %err, "background refresh failed");
                }
            }
            return;
        }
    }

    async fn store_result(&self, mode: FetchMode, seq: u64, data: T) {
        // Held until the state is published so cache and state agree on the winner.
        let mut store = match &self.cache {
            Some(cache) => Some(cache.write().await),
            None => None,
        };

        if !self.is_current(seq) {
            debug!(key = %self.key, ?mode, "discarding superseded fetch result");
            return;
        }

        if let Some(store) = store.as_mut() {
            match serde_json::to_value(&data) {
                Ok(value) => store.set(self.key.clone(), value, self.options.cache_ttl),
                Err(err) => warn!(key = %self.key, error = %err, "could not cache fetch result"),
            }
        }

        let now = self.clock.now_ms();
        let published = self.publish(Some(seq), |state| {
            state.data = Some(data);
            state.status = QueryStatus::Success;
            state.error = None;
            state.last_fetched_at = Some(now);
            state.retry_count = 0;
        });

        if !published {
            debug!(key = %self.key, ?mode, "query detached, result kept in cache only");
        }
    }
}

// == Subscription ==
/// Keeps a started query's interval and focus triggers alive.
///
/// Dropping the handle has the same effect as [`QuerySubscription::dispose`].
/// A handle from an earlier `start()` only stops its own triggers; it cannot
/// detach a newer mount.
#[derive(Debug)]
pub struct QuerySubscription {
    tasks: Vec<JoinHandle<()>>,
    generation: u64,
    mount: Arc<MountState>,
}

impl QuerySubscription {
    /// Stops the triggers and detaches the query's state.
    ///
    /// Fetches already in flight still finish and still write to the cache.
    pub fn dispose(self) {}

    pub fn is_active(&self) -> bool {
        self.mount.is_current(self.generation)
    }
}

impl Drop for QuerySubscription {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.mount.detach(self.generation);
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, ManualClock};
    use anyhow::anyhow;
    use serde_json::json;
    use std::sync::Mutex;

    const STALE_MS: u64 = 30_000;

    fn options() -> QueryOptions {
        QueryOptions {
            stale_time: Duration::from_millis(STALE_MS),
            cache_ttl: Duration::from_millis(120_000),
            ..QueryOptions::default()
        }
    }

    fn shared_cache(clock: &ManualClock) -> SharedCache {
        CacheStore::with_clock(10, Duration::from_secs(600), Arc::new(clock.clone())).into_shared()
    }

    /// Fetcher that fails `failures` times, then returns `value`, recording
    /// the instant of every attempt.
    fn flaky_fetcher(
        failures: usize,
        value: u32,
        attempts: Arc<Mutex<Vec<Instant>>>,
    ) -> impl Fn() -> FetchFuture<u32> + Send + Sync + 'static {
        move || {
            let attempts = Arc::clone(&attempts);
            Box::pin(async move {
                let attempt = {
                    let mut log = attempts.lock().unwrap();
                    log.push(Instant::now());
                    log.len()
                };
                if attempt <= failures {
                    Err(anyhow!("attempt {} failed", attempt))
                } else {
                    Ok(value)
                }
            })
        }
    }

    async fn wait_for_status(runner: &QueryRunner<u32>, status: QueryStatus) {
        let mut rx = runner.subscribe();
        rx.wait_for(|state| state.status == status).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_miss_fetches_in_foreground_and_writes_back() {
        let clock = ManualClock::new(1_000);
        let cache = shared_cache(&clock);
        let attempts = Arc::new(Mutex::new(Vec::new()));

        let runner = QueryRunner::builder("user-stats-42", flaky_fetcher(0, 3, attempts.clone()))
            .options(options())
            .cache(cache.clone())
            .clock(Arc::new(clock.clone()))
            .build();

        let _sub = runner.start().await;
        assert_eq!(runner.snapshot().status, QueryStatus::Loading);

        wait_for_status(&runner, QueryStatus::Success).await;
        let state = runner.snapshot();
        assert_eq!(state.data, Some(3));
        assert_eq!(state.last_fetched_at, Some(1_000));
        assert_eq!(cache.write().await.get("user-stats-42"), Some(json!(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_back_off_exponentially() {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let runner = QueryRunner::builder("plans", flaky_fetcher(2, 9, attempts.clone()))
            .options(options())
            .build();

        let handle = runner.refetch().unwrap();
        handle.await.unwrap();

        let state = runner.snapshot();
        assert_eq!(state.status, QueryStatus::Success);
        assert_eq!(state.data, Some(9));
        assert_eq!(state.retry_count, 0);

        let log = attempts.lock().unwrap();
        assert_eq!(log.len(), 3);
        let first_gap = log[1] - log[0];
        let second_gap = log[2] - log[1];
        assert_eq!(first_gap, Duration::from_millis(1000));
        assert_eq!(second_gap, Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_stays_loading_while_retrying() {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let runner = QueryRunner::builder("plans", flaky_fetcher(1, 1, attempts.clone()))
            .options(options())
            .build();

        runner.refetch();
        let mut rx = runner.subscribe();
        let state = rx.wait_for(|state| state.retry_count == 1).await.unwrap().clone();

        assert_eq!(state.status, QueryStatus::Loading);
        assert!(state.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_surface_error_and_stop() {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let runner = QueryRunner::builder("plans", flaky_fetcher(usize::MAX, 0, attempts.clone()))
            .options(options())
            .build();

        runner.refetch().unwrap().await.unwrap();

        let state = runner.snapshot();
        assert_eq!(state.status, QueryStatus::Error);
        assert_eq!(state.retry_count, 3);
        assert_eq!(state.error.as_ref().unwrap().to_string(), "attempt 4 failed");
        assert_eq!(attempts.lock().unwrap().len(), 4);

        time::sleep(Duration::from_secs(600)).await;
        assert_eq!(attempts.lock().unwrap().len(), 4, "no attempts without refetch");
    }

    #[tokio::test(start_paused = true)]
    async fn test_refetch_recovers_from_error() {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let runner = QueryRunner::builder(
            "plans",
            flaky_fetcher(1, 5, attempts.clone()),
        )
        .options(QueryOptions {
            retry_limit: 0,
            ..options()
        })
        .build();

        runner.refetch().unwrap().await.unwrap();
        assert_eq!(runner.snapshot().status, QueryStatus::Error);

        let handle = runner.refetch().unwrap();
        assert_eq!(runner.snapshot().status, QueryStatus::Loading);
        assert!(runner.snapshot().error.is_none());
        handle.await.unwrap();

        assert_eq!(runner.snapshot().data, Some(5));
        assert_eq!(runner.snapshot().status, QueryStatus::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_cache_hit_skips_network() {
        let clock = ManualClock::new(0);
        let cache = shared_cache(&clock);
        cache.write().await.set("k", json!(11), Duration::from_secs(120));
        clock.advance(1_000);

        let attempts = Arc::new(Mutex::new(Vec::new()));
        let runner = QueryRunner::builder("k", flaky_fetcher(0, 99, attempts.clone()))
            .options(options())
            .cache(cache)
            .clock(Arc::new(clock.clone()))
            .build();

        let _sub = runner.start().await;
        let state = runner.snapshot();
        assert_eq!(state.status, QueryStatus::Success);
        assert_eq!(state.data, Some(11));
        assert_eq!(state.last_fetched_at, Some(0));

        time::sleep(Duration::from_secs(5)).await;
        assert!(attempts.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_hit_revalidates_without_loading() {
        let clock = ManualClock::new(0);
        let cache = shared_cache(&clock);
        cache.write().await.set("k", json!(1), Duration::from_secs(120));
        clock.set(60_000);

        let attempts = Arc::new(Mutex::new(Vec::new()));
        let runner = QueryRunner::builder("k", flaky_fetcher(0, 2, attempts.clone()))
            .options(options())
            .cache(cache.clone())
            .clock(Arc::new(clock.clone()))
            .build();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut rx = runner.subscribe();
        let recorder = {
            let seen = Arc::clone(&seen);
            tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    seen.lock().unwrap().push(rx.borrow_and_update().status);
                }
            })
        };

        let _sub = runner.start().await;
        let state = runner.snapshot();
        assert_eq!(state.status, QueryStatus::Success);
        assert_eq!(state.data, Some(1));

        runner
            .subscribe()
            .wait_for(|state| state.data == Some(2) && !state.is_fetching)
            .await
            .unwrap();

        assert_eq!(runner.snapshot().last_fetched_at, Some(60_000));
        assert_eq!(cache.write().await.get("k"), Some(json!(2)));
        recorder.abort();
        assert!(!seen.lock().unwrap().contains(&QueryStatus::Loading));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_failure_is_swallowed() {
        let clock = ManualClock::new(0);
        let cache = shared_cache(&clock);
        cache.write().await.set("k", json!(1), Duration::from_secs(120));
        clock.set(60_000);

        let attempts = Arc::new(Mutex::new(Vec::new()));
        let runner = QueryRunner::builder("k", flaky_fetcher(usize::MAX, 0, attempts.clone()))
            .options(options())
            .cache(cache)
            .clock(Arc::new(clock.clone()))
            .build();

        let _sub = runner.start().await;
        runner
            .subscribe()
            .wait_for(|state| !state.is_fetching)
            .await
            .unwrap();

        let state = runner.snapshot();
        assert_eq!(attempts.lock().unwrap().len(), 4);
        assert_eq!(state.status, QueryStatus::Success);
        assert_eq!(state.data, Some(1));
        assert!(state.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_latest_issued_fetch_wins() {
        let clock = ManualClock::new(0);
        let cache = shared_cache(&clock);
        cache.write().await.set("k", json!("cached"), Duration::from_secs(120));
        clock.set(60_000);

        // First call is a slow background refresh, second a fast refetch.
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = {
            let calls = Arc::clone(&calls);
            move || {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call == 0 {
                        time::sleep(Duration::from_secs(5)).await;
                        Ok::<_, anyhow::Error>("background".to_string())
                    } else {
                        Ok::<_, anyhow::Error>("refetch".to_string())
                    }
                }
            }
        };

        let runner = QueryRunner::builder("k", fetcher)
            .options(options())
            .cache(cache.clone())
            .clock(Arc::new(clock.clone()))
            .build();

        let _sub = runner.start().await;
        // Let the background refresh claim the first call.
        tokio::task::yield_now().await;
        runner.refetch().unwrap().await.unwrap();
        assert_eq!(runner.snapshot().data.as_deref(), Some("refetch"));

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(runner.snapshot().data.as_deref(), Some("refetch"));
        assert_eq!(cache.write().await.get("k"), Some(json!("refetch")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_clears_state_and_cache() {
        let clock = ManualClock::new(0);
        let cache = shared_cache(&clock);
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let runner = QueryRunner::builder("k", flaky_fetcher(0, 4, attempts.clone()))
            .options(options())
            .cache(cache.clone())
            .clock(Arc::new(clock.clone()))
            .build();

        runner.refetch().unwrap().await.unwrap();
        assert!(cache.read().await.contains_key("k"));

        runner.invalidate().await;
        let state = runner.snapshot();
        assert_eq!(state.status, QueryStatus::Idle);
        assert!(state.data.is_none());
        assert!(!cache.read().await.contains_key("k"));
        assert_eq!(attempts.lock().unwrap().len(), 1, "invalidate must not fetch");

        // Next mount is a miss
        let _sub = runner.start().await;
        assert_eq!(runner.snapshot().status, QueryStatus::Loading);
        wait_for_status(&runner, QueryStatus::Success).await;
        assert_eq!(attempts.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_query_is_inert() {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let runner = QueryRunner::builder("k", flaky_fetcher(0, 1, attempts.clone()))
            .options(QueryOptions {
                enabled: false,
                refetch_interval: Some(Duration::from_secs(1)),
                ..options()
            })
            .build();

        let _sub = runner.start().await;
        assert!(runner.refetch().is_none());
        time::sleep(Duration::from_secs(10)).await;

        assert_eq!(runner.snapshot().status, QueryStatus::Idle);
        assert!(attempts.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_refetch_only_while_visible() {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let host = HostEnvironment::new();
        let runner = QueryRunner::builder("k", flaky_fetcher(0, 1, attempts.clone()))
            .options(QueryOptions {
                refetch_interval: Some(Duration::from_secs(10)),
                ..options()
            })
            .host(host.clone())
            .build();

        let sub = runner.start().await;
        time::sleep(Duration::from_millis(35_000)).await;
        assert_eq!(attempts.lock().unwrap().len(), 4, "mount plus three ticks");

        host.set_visible(false);
        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(attempts.lock().unwrap().len(), 4);

        host.set_visible(true);
        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(attempts.lock().unwrap().len(), 5);

        sub.dispose();
        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(attempts.lock().unwrap().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_focus_refetches_only_stale_data() {
        let clock = ManualClock::new(0);
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let host = HostEnvironment::new();
        let runner = QueryRunner::builder("k", flaky_fetcher(0, 1, attempts.clone()))
            .options(QueryOptions {
                refetch_on_window_focus: true,
                ..options()
            })
            .host(host.clone())
            .clock(Arc::new(clock.clone()))
            .build();

        let _sub = runner.start().await;
        wait_for_status(&runner, QueryStatus::Success).await;
        assert_eq!(attempts.lock().unwrap().len(), 1);

        host.notify_focus();
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(attempts.lock().unwrap().len(), 1, "fresh data ignores focus");

        clock.advance(STALE_MS + 1);
        host.notify_focus();
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(attempts.lock().unwrap().len(), 2);
        assert_eq!(runner.snapshot().last_fetched_at, Some(STALE_MS + 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disposed_query_still_writes_cache() {
        let clock = ManualClock::new(0);
        let cache = shared_cache(&clock);
        let fetcher = || async {
            time::sleep(Duration::from_secs(2)).await;
            Ok::<_, anyhow::Error>(7u32)
        };
        let runner = QueryRunner::builder("late", fetcher)
            .options(options())
            .cache(cache.clone())
            .clock(Arc::new(clock.clone()))
            .build();

        let sub = runner.start().await;
        assert!(sub.is_active());
        sub.dispose();

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(cache.write().await.get("late"), Some(json!(7)));
        assert_eq!(runner.snapshot().status, QueryStatus::Loading);
        assert!(runner.snapshot().data.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remount_by_reassignment_stays_attached() {
        let fetcher = || async {
            time::sleep(Duration::from_secs(1)).await;
            Ok::<_, anyhow::Error>(1u32)
        };
        let runner = QueryRunner::builder("remount", fetcher).options(options()).build();

        let mut sub = runner.start().await;
        assert!(sub.is_active());
        // The new handle exists before the old one is dropped
        sub = runner.start().await;
        assert!(sub.is_active());

        time::sleep(Duration::from_secs(5)).await;
        let state = runner.snapshot();
        assert_eq!(state.status, QueryStatus::Success);
        assert_eq!(state.data, Some(1));
        assert!(sub.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_handle_cannot_detach_newer_mount() {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let runner = QueryRunner::builder("k", flaky_fetcher(0, 2, attempts.clone()))
            .options(options())
            .build();

        let first = runner.start().await;
        let second = runner.start().await;
        assert!(!first.is_active());
        drop(first);
        assert!(second.is_active());

        runner.refetch().unwrap().await.unwrap();
        assert_eq!(runner.snapshot().data, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_after_dispose_resets_state() {
        let clock = ManualClock::new(0);
        let cache = shared_cache(&clock);
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let runner = QueryRunner::builder("k", flaky_fetcher(0, 1, attempts.clone()))
            .options(options())
            .cache(cache.clone())
            .clock(Arc::new(clock.clone()))
            .build();

        let sub = runner.start().await;
        wait_for_status(&runner, QueryStatus::Success).await;
        sub.dispose();

        runner.invalidate().await;
        let state = runner.snapshot();
        assert_eq!(state.status, QueryStatus::Idle);
        assert!(state.data.is_none());
        assert!(state.last_fetched_at.is_none());
        assert!(!cache.read().await.contains_key("k"));

        // Remount is a plain miss without leftover data
        let _sub = runner.start().await;
        let state = runner.snapshot();
        assert_eq!(state.status, QueryStatus::Loading);
        assert!(state.data.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remount_clears_fetching_flag_of_detached_fetch() {
        let clock = ManualClock::new(0);
        let cache = shared_cache(&clock);
        let fetcher = || async {
            time::sleep(Duration::from_secs(1)).await;
            Ok::<_, anyhow::Error>(1u32)
        };
        let runner = QueryRunner::builder("k", fetcher)
            .options(options())
            .cache(cache.clone())
            .clock(Arc::new(clock.clone()))
            .build();

        let sub = runner.start().await;
        assert!(runner.snapshot().is_fetching);
        sub.dispose();
        time::sleep(Duration::from_secs(5)).await;

        // Fresh hit, nothing in flight
        let _sub = runner.start().await;
        let state = runner.snapshot();
        assert_eq!(state.status, QueryStatus::Success);
        assert_eq!(state.data, Some(1));
        assert!(!state.is_fetching);
    }
}
