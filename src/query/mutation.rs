//! Mutation Module
//!
//! Wraps a write operation with loading state and post-success cache
//! invalidation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use regex::Regex;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::cache::SharedCache;
use crate::error::Result;

type MutationFuture<R> = Pin<Box<dyn Future<Output = anyhow::Result<R>> + Send>>;
type MutationFn<V, R> = Arc<dyn Fn(V) -> MutationFuture<R> + Send + Sync>;
type SuccessCallback<V, R> = Box<dyn Fn(&R, &V) + Send + Sync>;
type ErrorCallback<V> = Box<dyn Fn(&anyhow::Error, &V) + Send + Sync>;

// == Mutation ==
/// A write operation whose success invalidates dependent cache keys.
pub struct Mutation<V, R> {
    mutation_fn: MutationFn<V, R>,
    on_success: Option<SuccessCallback<V, R>>,
    on_error: Option<ErrorCallback<V>>,
    invalidate: Vec<Regex>,
    cache: Option<SharedCache>,
    loading: watch::Sender<bool>,
}

impl<V, R> Mutation<V, R>
where
    V: Clone + Send + 'static,
    R: Send + 'static,
{
    // == Constructor ==
    pub fn new<F, Fut>(mutation_fn: F) -> Self
    where
        F: Fn(V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let (loading, _) = watch::channel(false);
        Self {
            mutation_fn: Arc::new(move |variables| {
                Box::pin(mutation_fn(variables)) as MutationFuture<R>
            }),
            on_success: None,
            on_error: None,
            invalidate: Vec::new(),
            cache: None,
            loading,
        }
    }

    /// Cache whose keys are invalidated after a successful mutation.
    pub fn cache(mut self, cache: SharedCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn on_success(mut self, callback: impl Fn(&R, &V) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&anyhow::Error, &V) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    /// Adds key patterns to invalidate on success.
    ///
    /// Fails with `CacheError::InvalidPattern` if any pattern does not compile.
    pub fn invalidates<I, S>(mut self, patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for pattern in patterns {
            self.invalidate.push(Regex::new(pattern.as_ref())?);
        }
        Ok(self)
    }

    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    pub fn subscribe_loading(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }

    // == Mutate ==
    /// Runs the mutation.
    ///
    /// On success the `on_success` callback runs, then every cache key matching
    /// a configured pattern is removed. On failure `on_error` runs, the cache
    /// is left alone and the error is returned unchanged. `loading` is cleared
    /// on every path.
    pub async fn mutate(&self, variables: V) -> anyhow::Result<R> {
        let _loading = LoadingGuard::engage(&self.loading);

        match (self.mutation_fn)(variables.clone()).await {
            Ok(result) => {
                if let Some(callback) = &self.on_success {
                    callback(&result, &variables);
                }
                self.invalidate_dependents().await;
                Ok(result)
            }
            Err(err) => {
                warn!(error = %err, "mutation failed");
                if let Some(callback) = &self.on_error {
                    callback(&err, &variables);
                }
                Err(err)
            }
        }
    }

    async fn invalidate_dependents(&self) {
        let Some(cache) = &self.cache else {
            return;
        };
        if self.invalidate.is_empty() {
            return;
        }

        let mut store = cache.write().await;
        let removed: usize = self
            .invalidate
            .iter()
            .map(|pattern| store.invalidate_pattern(pattern))
            .sum();
        debug!(removed, "mutation invalidated dependent queries");
    }
}

// Clears the loading flag when dropped, including when the mutate future is
// cancelled mid-flight.
struct LoadingGuard<'a>(&'a watch::Sender<bool>);

impl<'a> LoadingGuard<'a> {
    fn engage(flag: &'a watch::Sender<bool>) -> Self {
        flag.send_replace(true);
        Self(flag)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}
