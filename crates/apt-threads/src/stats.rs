//! Aggregate thread statistics cache.
//!
//! The set of documents needing stats is established once (a dashboard
//! listing several ATBDs), then every mutation elsewhere calls [`refresh`]
//! without re-deriving the set. That remembered context is the one piece of
//! hidden state this crate keeps, traded for call-site simplicity.
//!
//! [`refresh`]: ThreadStatsCache::refresh

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::client::ThreadsClient;
use crate::error::ThreadsError;
use crate::slice::{SliceState, SliceStore};
use crate::types::{DocumentRef, ThreadStats};

/// Singleton cache of per-document thread counts.
///
/// Not auto-invalidated: mutations performed through the other caches are
/// expected to call [`ThreadStatsCache::refresh`] explicitly.
pub struct ThreadStatsCache {
    client: Arc<ThreadsClient>,
    store: SliceStore<(), Vec<ThreadStats>>,
    /// Documents the last fetch was computed for.
    context: RwLock<Option<Vec<DocumentRef>>>,
}

impl ThreadStatsCache {
    pub fn new(client: Arc<ThreadsClient>) -> Self {
        Self {
            client,
            store: SliceStore::new(),
            context: RwLock::new(None),
        }
    }

    /// Current cached batch state.
    pub async fn state(&self) -> SliceState<Vec<ThreadStats>> {
        self.store.state(&()).await
    }

    /// Fetch stats for exactly this document set and remember it for
    /// later [`refresh`](Self::refresh) calls.
    pub async fn fetch_stats_for(
        &self,
        docs: Vec<DocumentRef>,
    ) -> Result<Vec<ThreadStats>, ThreadsError> {
        *self.context.write().await = Some(docs.clone());
        self.store
            .run_fetch(&(), self.client.thread_stats(&docs))
            .await
    }

    /// Re-fetch using the remembered document set.
    ///
    /// No-op when no set has been remembered yet.
    pub async fn refresh(&self) -> Result<(), ThreadsError> {
        let docs = self.context.read().await.clone();
        let Some(docs) = docs else {
            debug!("no remembered document set, skipping stats refresh");
            return Ok(());
        };
        self.store
            .run_fetch(&(), self.client.thread_stats(&docs))
            .await?;
        Ok(())
    }

    /// Cached aggregate for one document out of the batch.
    ///
    /// `None` unless the batch has loaded successfully and contains the
    /// pair.
    pub async fn stats_for(&self, doc: &DocumentRef) -> Option<ThreadStats> {
        let state = self.store.state(&()).await;
        if !state.status.is_succeeded() {
            return None;
        }
        state
            .data?
            .into_iter()
            .find(|s| s.atbd_id == doc.atbd_id && s.version == doc.version)
    }

    /// Drop the cached batch and the remembered document set.
    pub async fn invalidate(&self) {
        self.store.invalidate(&()).await;
        *self.context.write().await = None;
    }
}
