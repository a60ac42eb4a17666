//! Composition root wiring the client into the three caches.

use std::sync::Arc;

use crate::client::{ThreadsClient, TokenProvider};
use crate::error::ThreadsError;
use crate::list::ThreadListCache;
use crate::stats::ThreadStatsCache;
use crate::thread::SingleThreadCache;

/// The full cache stack for one API endpoint, sharing a single client.
///
/// The list cache is shared into the single-thread cache so mutations can
/// bridge their results over. Owned by whatever composes the UI and passed
/// around by reference; there are no implicit globals.
pub struct ThreadStores {
    client: Arc<ThreadsClient>,
    pub list: Arc<ThreadListCache>,
    pub thread: Arc<SingleThreadCache>,
    pub stats: Arc<ThreadStatsCache>,
}

impl std::fmt::Debug for ThreadStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadStores").finish_non_exhaustive()
    }
}

impl ThreadStores {
    /// Start building a store stack.
    pub fn builder() -> ThreadStoresBuilder {
        ThreadStoresBuilder::default()
    }

    /// Build the stack around an existing client.
    pub fn new(client: Arc<ThreadsClient>) -> Self {
        let list = Arc::new(ThreadListCache::new(Arc::clone(&client)));
        let thread = Arc::new(SingleThreadCache::new(
            Arc::clone(&client),
            Arc::clone(&list),
        ));
        let stats = Arc::new(ThreadStatsCache::new(Arc::clone(&client)));
        Self {
            client,
            list,
            thread,
            stats,
        }
    }

    /// The shared API client.
    pub fn client(&self) -> &Arc<ThreadsClient> {
        &self.client
    }
}

/// Builder for [`ThreadStores`].
///
/// Fails fast at build time when a required dependency is missing, instead
/// of surfacing the gap on first use.
#[derive(Default)]
pub struct ThreadStoresBuilder {
    base_url: Option<String>,
    tokens: Option<Arc<dyn TokenProvider>>,
}

impl ThreadStoresBuilder {
    /// Set the threads API base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the bearer token provider.
    pub fn token_provider(mut self, tokens: Arc<dyn TokenProvider>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Build the store stack.
    pub fn build(self) -> Result<ThreadStores, ThreadsError> {
        let base_url = self.base_url.ok_or_else(|| {
            ThreadsError::Invariant("threads API base URL not configured".to_string())
        })?;
        let tokens = self.tokens.ok_or_else(|| {
            ThreadsError::Invariant("token provider not configured".to_string())
        })?;
        Ok(ThreadStores::new(Arc::new(ThreadsClient::new(
            base_url, tokens,
        ))))
    }
}
