//! Generic keyed cache of async request/mutation state.
//!
//! A [`SliceStore`] holds one [`SliceState`] per key: the read lifecycle
//! (`Idle -> Loading -> Succeeded | Failed`), the last successfully loaded
//! data, and an independent mutation lifecycle so a slice can be written
//! while already holding data.
//!
//! Every fetch and mutation is stamped from a process-wide monotonic
//! counter at issue time. A completion older than the last one applied for
//! its key *within the same lifecycle* is dropped instead of overwriting
//! newer data, so a slow refetch cannot clobber the response of a faster
//! one issued after it, while a fetch and a mutation in flight together
//! both land. There is no cancellation and no coalescing; callers needing
//! strict ordering must serialize calls themselves.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::ThreadsError;

/// Lifecycle of one async read or write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchStatus {
    /// Never attempted (or reset by invalidation).
    #[default]
    Idle,
    /// Request in flight.
    Loading,
    /// Last attempt completed successfully.
    Succeeded,
    /// Last attempt failed.
    Failed,
}

impl FetchStatus {
    pub fn is_loading(&self) -> bool {
        matches!(self, FetchStatus::Loading)
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, FetchStatus::Succeeded)
    }
}

/// Cached state for one key.
///
/// `data` survives failed fetches (stale-while-error) and is never touched
/// by failed mutations. `error` is set only by failed fetches.
#[derive(Debug, Clone)]
pub struct SliceState<T> {
    pub status: FetchStatus,
    pub data: Option<T>,
    pub error: Option<String>,
    pub mutation_status: FetchStatus,
}

impl<T> Default for SliceState<T> {
    fn default() -> Self {
        Self {
            status: FetchStatus::Idle,
            data: None,
            error: None,
            mutation_status: FetchStatus::Idle,
        }
    }
}

/// A keyed entry plus the sequence numbers of the last applied completions.
///
/// The fetch and mutation lifecycles are guarded independently: the
/// staleness check exists to stop an older read's data overwriting a newer
/// read's, and a mutation (which merges into data rather than replacing it)
/// must never supersede a read, or a slow fetch outlived by a fast mutation
/// would stay `Loading` forever with nothing in flight.
#[derive(Debug)]
struct Entry<T> {
    state: SliceState<T>,
    applied_fetch_seq: u64,
    applied_mutation_seq: u64,
}

impl<T> Default for Entry<T> {
    fn default() -> Self {
        Self {
            state: SliceState::default(),
            applied_fetch_seq: 0,
            applied_mutation_seq: 0,
        }
    }
}

/// Keyed cache of async operation state.
///
/// Shared process-wide behind `Arc`; all access goes through the internal
/// `RwLock`, held only across state transitions, never across awaits of the
/// underlying network future.
pub struct SliceStore<K, T> {
    entries: RwLock<HashMap<K, Entry<T>>>,
    seq: AtomicU64,
}

impl<K, T> Default for SliceStore<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> SliceStore<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            seq: AtomicU64::new(0),
        }
    }

    /// Next issue-time sequence number.
    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Current state for a key, or the idle default if never accessed.
    ///
    /// Pure read: never creates an entry, never triggers a fetch.
    pub async fn state(&self, key: &K) -> SliceState<T> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .map(|e| e.state.clone())
            .unwrap_or_default()
    }

    /// Reset a key to the idle default, freeing its data.
    ///
    /// An in-flight operation on the key will find its entry gone on
    /// completion and drop its result instead of resurrecting it.
    pub async fn invalidate(&self, key: &K) {
        let mut entries = self.entries.write().await;
        entries.remove(key);
    }

    /// Run a fetch for a key.
    ///
    /// Sets `status = Loading`, awaits `fut`, and applies the outcome unless
    /// a newer fetch completion has already been applied for the key (or
    /// the key was invalidated mid-flight). Success replaces `data` and
    /// clears `error`; failure sets `error` and leaves prior `data`
    /// untouched. The result is returned to the caller either way.
    pub async fn run_fetch<F>(&self, key: &K, fut: F) -> Result<T, ThreadsError>
    where
        F: Future<Output = Result<T, ThreadsError>>,
    {
        let seq = self.next_seq();
        {
            let mut entries = self.entries.write().await;
            let entry = entries.entry(key.clone()).or_default();
            entry.state.status = FetchStatus::Loading;
        }

        let result = fut.await;

        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(key) else {
            debug!(seq, "slice invalidated mid-fetch, dropping completion");
            return result;
        };
        if seq < entry.applied_fetch_seq {
            debug!(
                seq,
                applied_seq = entry.applied_fetch_seq,
                "stale fetch completion, dropping"
            );
            return result;
        }
        entry.applied_fetch_seq = seq;
        match &result {
            Ok(data) => {
                entry.state.status = FetchStatus::Succeeded;
                entry.state.data = Some(data.clone());
                entry.state.error = None;
            }
            Err(e) => {
                entry.state.status = FetchStatus::Failed;
                entry.state.error = Some(e.to_string());
            }
        }
        result
    }

    /// Run a mutation for a key.
    ///
    /// Unlike a fetch, a mutation does not require the slice to hold data:
    /// on success, `merge` receives the response and the current cached
    /// value and produces the new one (returning the input unchanged
    /// expresses "no local merge"). Failure sets `mutation_status = Failed`
    /// and leaves `data` and `error` alone. Stale completions are dropped
    /// under a sequence guard of their own; mutations never supersede
    /// fetches or vice versa.
    pub async fn run_mutation<R, F, M>(
        &self,
        key: &K,
        fut: F,
        merge: M,
    ) -> Result<R, ThreadsError>
    where
        F: Future<Output = Result<R, ThreadsError>>,
        M: FnOnce(&R, Option<T>) -> Option<T>,
    {
        let seq = self.next_seq();
        {
            let mut entries = self.entries.write().await;
            let entry = entries.entry(key.clone()).or_default();
            entry.state.mutation_status = FetchStatus::Loading;
        }

        let result = fut.await;

        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(key) else {
            debug!(seq, "slice invalidated mid-mutation, dropping completion");
            return result;
        };
        if seq < entry.applied_mutation_seq {
            debug!(
                seq,
                applied_seq = entry.applied_mutation_seq,
                "stale mutation completion, dropping"
            );
            return result;
        }
        entry.applied_mutation_seq = seq;
        match &result {
            Ok(response) => {
                entry.state.mutation_status = FetchStatus::Succeeded;
                entry.state.data = merge(response, entry.state.data.take());
            }
            Err(_) => {
                entry.state.mutation_status = FetchStatus::Failed;
            }
        }
        result
    }

    /// Apply an out-of-band update to a key's loaded data.
    ///
    /// No-op unless the key has `status == Succeeded` with data present, so
    /// side-channel updates can never create a partial entry for a key that
    /// was never fetched. Returns whether the update was applied.
    pub async fn update_loaded<F>(&self, key: &K, f: F) -> bool
    where
        F: FnOnce(&mut T),
    {
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry)
                if entry.state.status == FetchStatus::Succeeded
                    && entry.state.data.is_some() =>
            {
                if let Some(data) = entry.state.data.as_mut() {
                    f(data);
                }
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::sync::oneshot;

    fn store() -> SliceStore<String, Vec<i64>> {
        SliceStore::new()
    }

    #[tokio::test]
    async fn test_state_defaults_to_idle() {
        let s = store();
        let state = s.state(&"k".to_string()).await;
        assert_eq!(state.status, FetchStatus::Idle);
        assert_eq!(state.mutation_status, FetchStatus::Idle);
        assert!(state.data.is_none());
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_state_read_is_idempotent() {
        let s = store();
        let key = "k".to_string();
        s.run_fetch(&key, async { Ok(vec![1, 2]) }).await.unwrap();

        let a = s.state(&key).await;
        let b = s.state(&key).await;
        assert_eq!(a.status, b.status);
        assert_eq!(a.data, b.data);
    }

    #[tokio::test]
    async fn test_fetch_success_transitions() {
        let s = store();
        let key = "k".to_string();
        let out = s.run_fetch(&key, async { Ok(vec![7]) }).await.unwrap();
        assert_eq!(out, vec![7]);

        let state = s.state(&key).await;
        assert_eq!(state.status, FetchStatus::Succeeded);
        assert_eq!(state.data, Some(vec![7]));
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_prior_data() {
        let s = store();
        let key = "k".to_string();
        s.run_fetch(&key, async { Ok(vec![7]) }).await.unwrap();

        let err = s
            .run_fetch(&key, async {
                Err(ThreadsError::Api {
                    status: 500,
                    message: "boom".to_string(),
                })
            })
            .await
            .unwrap_err();
        assert!(err.is_api_error());

        let state = s.state(&key).await;
        assert_eq!(state.status, FetchStatus::Failed);
        // Stale-while-error: old data survives for the UI to show.
        assert_eq!(state.data, Some(vec![7]));
        assert!(state.error.is_some());
    }

    #[tokio::test]
    async fn test_invalidate_resets_to_idle() {
        let s = store();
        let key = "k".to_string();
        s.run_fetch(&key, async { Ok(vec![7]) }).await.unwrap();

        s.invalidate(&key).await;
        let state = s.state(&key).await;
        assert_eq!(state.status, FetchStatus::Idle);
        assert!(state.data.is_none());

        // A subsequent fetch starts the lifecycle over.
        s.run_fetch(&key, async { Ok(vec![8]) }).await.unwrap();
        assert_eq!(s.state(&key).await.data, Some(vec![8]));
    }

    #[tokio::test]
    async fn test_stale_fetch_completion_dropped() {
        let s = std::sync::Arc::new(store());
        let key = "k".to_string();

        let (tx, rx) = oneshot::channel::<()>();
        let slow = {
            let s = std::sync::Arc::clone(&s);
            let key = key.clone();
            tokio::spawn(async move {
                s.run_fetch(&key, async {
                    rx.await.ok();
                    Ok(vec![1])
                })
                .await
            })
        };

        // Let the slow fetch register its sequence number first.
        tokio::task::yield_now().await;

        // A later fetch completes immediately.
        s.run_fetch(&key, async { Ok(vec![2]) }).await.unwrap();

        // Now the older fetch completes; its result must not apply.
        tx.send(()).unwrap();
        slow.await.unwrap().unwrap();

        let state = s.state(&key).await;
        assert_eq!(state.status, FetchStatus::Succeeded);
        assert_eq!(state.data, Some(vec![2]));
    }

    #[tokio::test]
    async fn test_fetch_completion_survives_faster_mutation() {
        let s = std::sync::Arc::new(store());
        let key = "k".to_string();

        let (tx, rx) = oneshot::channel::<()>();
        let slow_fetch = {
            let s = std::sync::Arc::clone(&s);
            let key = key.clone();
            tokio::spawn(async move {
                s.run_fetch(&key, async {
                    rx.await.ok();
                    Ok(vec![1])
                })
                .await
            })
        };

        tokio::task::yield_now().await;

        // A mutation issued after the fetch completes first. It merges into
        // data; it must not supersede the in-flight read.
        s.run_mutation(&key, async { Ok(5i64) }, |resp, data| {
            let mut data = data.unwrap_or_default();
            data.push(*resp);
            Some(data)
        })
        .await
        .unwrap();

        tx.send(()).unwrap();
        slow_fetch.await.unwrap().unwrap();

        let state = s.state(&key).await;
        // The read lifecycle completes and its data lands; no permanent
        // Loading with nothing in flight.
        assert_eq!(state.status, FetchStatus::Succeeded);
        assert_eq!(state.mutation_status, FetchStatus::Succeeded);
        assert_eq!(state.data, Some(vec![1]));
    }

    #[tokio::test]
    async fn test_stale_mutation_completion_dropped() {
        let s = std::sync::Arc::new(store());
        let key = "k".to_string();
        s.run_fetch(&key, async { Ok(vec![0]) }).await.unwrap();

        let (tx, rx) = oneshot::channel::<()>();
        let slow = {
            let s = std::sync::Arc::clone(&s);
            let key = key.clone();
            tokio::spawn(async move {
                s.run_mutation(
                    &key,
                    async {
                        rx.await.ok();
                        Ok(1i64)
                    },
                    |resp, data| {
                        data.map(|mut d| {
                            d.push(*resp);
                            d
                        })
                    },
                )
                .await
            })
        };

        tokio::task::yield_now().await;

        s.run_mutation(&key, async { Ok(2i64) }, |resp, data| {
            data.map(|mut d| {
                d.push(*resp);
                d
            })
        })
        .await
        .unwrap();

        tx.send(()).unwrap();
        slow.await.unwrap().unwrap();

        // The older mutation's merge never applies.
        assert_eq!(s.state(&key).await.data, Some(vec![0, 2]));
    }

    #[tokio::test]
    async fn test_mutation_merges_into_data() {
        let s = store();
        let key = "k".to_string();
        s.run_fetch(&key, async { Ok(vec![1]) }).await.unwrap();

        s.run_mutation(&key, async { Ok(2i64) }, |resp, data| {
            let mut data = data.unwrap_or_default();
            data.push(*resp);
            Some(data)
        })
        .await
        .unwrap();

        let state = s.state(&key).await;
        assert_eq!(state.data, Some(vec![1, 2]));
        assert_eq!(state.mutation_status, FetchStatus::Succeeded);
        assert_eq!(state.status, FetchStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_mutation_without_data_leaves_data_absent() {
        let s = store();
        let key = "k".to_string();

        s.run_mutation(&key, async { Ok(9i64) }, |_, data| data)
            .await
            .unwrap();

        let state = s.state(&key).await;
        assert_eq!(state.mutation_status, FetchStatus::Succeeded);
        assert!(state.data.is_none());
        // Read status is untouched by mutations.
        assert_eq!(state.status, FetchStatus::Idle);
    }

    #[tokio::test]
    async fn test_failed_mutation_leaves_data_untouched() {
        let s = store();
        let key = "k".to_string();
        s.run_fetch(&key, async { Ok(vec![1]) }).await.unwrap();

        let err = s
            .run_mutation(
                &key,
                async {
                    Err::<i64, _>(ThreadsError::Api {
                        status: 422,
                        message: "rejected".to_string(),
                    })
                },
                |_, _| Some(vec![999]),
            )
            .await
            .unwrap_err();
        assert!(err.is_api_error());

        let state = s.state(&key).await;
        assert_eq!(state.mutation_status, FetchStatus::Failed);
        assert_eq!(state.data, Some(vec![1]));
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_update_loaded_noop_when_idle() {
        let s = store();
        let key = "k".to_string();
        let applied = s.update_loaded(&key, |d| d.push(1)).await;
        assert!(!applied);
        assert_eq!(s.state(&key).await.status, FetchStatus::Idle);
    }

    #[tokio::test]
    async fn test_update_loaded_applies_when_succeeded() {
        let s = store();
        let key = "k".to_string();
        s.run_fetch(&key, async { Ok(vec![1]) }).await.unwrap();

        let applied = s.update_loaded(&key, |d| d.push(2)).await;
        assert!(applied);
        assert_eq!(s.state(&key).await.data, Some(vec![1, 2]));
    }

    #[tokio::test]
    async fn test_completion_after_invalidate_dropped() {
        let s = std::sync::Arc::new(store());
        let key = "k".to_string();

        let (tx, rx) = oneshot::channel::<()>();
        let pending = {
            let s = std::sync::Arc::clone(&s);
            let key = key.clone();
            tokio::spawn(async move {
                s.run_fetch(&key, async {
                    rx.await.ok();
                    Ok(vec![1])
                })
                .await
            })
        };

        tokio::task::yield_now().await;
        s.invalidate(&key).await;

        tx.send(()).unwrap();
        pending.await.unwrap().unwrap();

        // The unmount-style invalidation wins; no entry is resurrected.
        assert_eq!(s.state(&key).await.status, FetchStatus::Idle);
    }
}
