//! Per-document thread list cache.

use std::sync::Arc;

use tracing::debug;

use crate::client::ThreadsClient;
use crate::error::ThreadsError;
use crate::normalize::{compute_thread, merge_anchor_comment};
use crate::slice::{SliceState, SliceStore};
use crate::types::{Comment, DocumentRef, Thread, ThreadFilter, ThreadPatch};

/// An update pushed into the list cache from a single-thread mutation.
///
/// Both caches can display overlapping views of the same thread within one
/// session, so single-thread mutations bridge their result over explicitly.
/// The closed set of variants replaces the source of these updates being
/// stringly-typed: an unhandled variant is a compile error, not a silent
/// no-op.
#[derive(Debug, Clone)]
pub enum ListUpdate {
    /// Merge updated thread-row fields into the matching list item.
    UpdateItem(ThreadPatch),
    /// Remove the thread from the list.
    DeleteItem { thread_id: i64 },
    /// A comment was edited. Only touches the list item when the comment is
    /// its anchor, since the list view only ever shows the anchor body.
    UpdateItemComment { thread_id: i64, comment: Comment },
}

/// Cache of filtered thread lists, keyed by document.
///
/// The cached list and its filter parameters are coupled: every filter
/// change refetches, and the response replaces the previous list wholesale.
pub struct ThreadListCache {
    client: Arc<ThreadsClient>,
    store: SliceStore<DocumentRef, Vec<Thread>>,
}

impl ThreadListCache {
    pub fn new(client: Arc<ThreadsClient>) -> Self {
        Self {
            client,
            store: SliceStore::new(),
        }
    }

    /// Current cached state for a document.
    pub async fn state(&self, doc: &DocumentRef) -> SliceState<Vec<Thread>> {
        self.store.state(doc).await
    }

    /// Reset a document's list, normally on panel unmount or document change.
    pub async fn invalidate(&self, doc: &DocumentRef) {
        self.store.invalidate(doc).await;
    }

    /// Fetch the thread list for a document with the given filter.
    ///
    /// Every element is normalized; server order (most-recent-first) is
    /// preserved.
    pub async fn fetch_threads(
        &self,
        doc: &DocumentRef,
        filter: &ThreadFilter,
    ) -> Result<Vec<Thread>, ThreadsError> {
        self.store
            .run_fetch(doc, async {
                let raw = self.client.list_threads(doc, filter).await?;
                raw.into_iter().map(compute_thread).collect()
            })
            .await
    }

    /// Create a new thread with a single anchor comment.
    ///
    /// On success the normalized thread is prepended to the cached list so
    /// new activity sorts first regardless of timestamps. With no list
    /// loaded for the key, the response is returned to the caller and the
    /// cache is left alone.
    pub async fn create_thread(
        &self,
        doc: &DocumentRef,
        section: &str,
        comment: &str,
    ) -> Result<Thread, ThreadsError> {
        self.store
            .run_mutation(
                doc,
                async {
                    let raw = self.client.create_thread(doc, section, comment).await?;
                    compute_thread(raw)
                },
                |thread, data| {
                    data.map(|mut list| {
                        list.insert(0, thread.clone());
                        list
                    })
                },
            )
            .await
    }

    /// Apply a cross-cache update from a single-thread mutation.
    ///
    /// No-op unless the document's list has loaded successfully, so a
    /// side-channel update can never seed a partial list entry.
    pub async fn apply_update(&self, doc: &DocumentRef, update: ListUpdate) {
        let applied = self
            .store
            .update_loaded(doc, |list| match update {
                ListUpdate::UpdateItem(patch) => {
                    if let Some(item) = list.iter_mut().find(|t| t.id == patch.id) {
                        item.status = patch.status;
                        item.last_updated_at = patch.last_updated_at;
                        item.last_updated_by = patch.last_updated_by;
                    }
                }
                ListUpdate::DeleteItem { thread_id } => {
                    list.retain(|t| t.id != thread_id);
                }
                ListUpdate::UpdateItemComment { thread_id, comment } => {
                    if let Some(item) = list.iter_mut().find(|t| t.id == thread_id) {
                        if comment.id == item.thread_comment_id {
                            merge_anchor_comment(item, &comment);
                        }
                    }
                }
            })
            .await;

        if !applied {
            debug!(%doc, "list not loaded, dropping cross-cache update");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::StaticTokenProvider;
    use crate::slice::FetchStatus;
    use crate::types::{SectionFilter, StatusFilter, ThreadStatus};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cache(server: &MockServer) -> ThreadListCache {
        ThreadListCache::new(Arc::new(ThreadsClient::new(
            server.uri(),
            Arc::new(StaticTokenProvider::new("t")),
        )))
    }

    fn thread_json(id: i64, status: &str, body: &str) -> serde_json::Value {
        json!({
            "id": id,
            "atbd_id": 42,
            "version": "v1.0",
            "status": status,
            "section": "introduction",
            "comments": [{
                "id": id * 10,
                "thread_id": id,
                "body": body,
                "created_by": "alice",
                "created_at": "2024-01-01T00:00:00Z",
                "last_updated_by": "alice",
                "last_updated_at": "2024-01-01T00:00:00Z"
            }],
            "comment_count": 1,
            "created_by": "alice",
            "created_at": "2024-01-01T00:00:00Z",
            "last_updated_by": "alice",
            "last_updated_at": "2024-01-01T00:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_fetch_normalizes_and_preserves_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/threads"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                thread_json(2, "OPEN", "newer"),
                thread_json(1, "CLOSED", "older"),
            ])))
            .mount(&server)
            .await;

        let cache = cache(&server);
        let doc = DocumentRef::new(42, "v1.0");
        let threads = cache
            .fetch_threads(&doc, &ThreadFilter::default())
            .await
            .unwrap();

        assert_eq!(threads.iter().map(|t| t.id).collect::<Vec<_>>(), vec![2, 1]);
        assert_eq!(threads[0].body, "newer");
        assert_eq!(threads[0].comment_count, 0);
        assert_eq!(cache.state(&doc).await.status, FetchStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_refetch_with_new_filter_replaces_wholesale() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/threads"))
            .and(query_param("status", "CLOSED"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([thread_json(1, "CLOSED", "a")])),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/threads"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                thread_json(1, "OPEN", "a"),
                thread_json(2, "OPEN", "b"),
            ])))
            .mount(&server)
            .await;

        let cache = cache(&server);
        let doc = DocumentRef::new(42, "v1.0");

        cache
            .fetch_threads(&doc, &ThreadFilter::default())
            .await
            .unwrap();
        let closed_only = ThreadFilter {
            status: StatusFilter::Only(ThreadStatus::Closed),
            section: SectionFilter::All,
        };
        cache.fetch_threads(&doc, &closed_only).await.unwrap();

        let state = cache.state(&doc).await;
        let data = state.data.unwrap();
        // No merged/stale entries from the first filter remain.
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].id, 1);
        assert_eq!(data[0].status, ThreadStatus::Closed);
    }

    #[tokio::test]
    async fn test_create_thread_prepends_to_loaded_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/threads"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([thread_json(1, "OPEN", "old")])),
            )
            .mount(&server)
            .await;
        // Fresh threads come back without a comment_count.
        let mut created = thread_json(9, "OPEN", "brand new");
        created.as_object_mut().unwrap().remove("comment_count");
        Mock::given(method("POST"))
            .and(path("/threads"))
            .respond_with(ResponseTemplate::new(201).set_body_json(created))
            .mount(&server)
            .await;

        let cache = cache(&server);
        let doc = DocumentRef::new(42, "v1.0");
        cache
            .fetch_threads(&doc, &ThreadFilter::default())
            .await
            .unwrap();

        let thread = cache
            .create_thread(&doc, "introduction", "brand new")
            .await
            .unwrap();
        assert_eq!(thread.comment_count, 0);

        let data = cache.state(&doc).await.data.unwrap();
        assert_eq!(data.iter().map(|t| t.id).collect::<Vec<_>>(), vec![9, 1]);
    }

    #[tokio::test]
    async fn test_create_thread_without_loaded_list_leaves_cache_empty() {
        let server = MockServer::start().await;
        let mut created = thread_json(9, "OPEN", "hello");
        created.as_object_mut().unwrap().remove("comment_count");
        Mock::given(method("POST"))
            .and(path("/threads"))
            .respond_with(ResponseTemplate::new(201).set_body_json(created))
            .mount(&server)
            .await;

        let cache = cache(&server);
        let doc = DocumentRef::new(42, "v1.0");
        let thread = cache.create_thread(&doc, "introduction", "hello").await.unwrap();
        assert_eq!(thread.id, 9);

        let state = cache.state(&doc).await;
        assert!(state.data.is_none());
        assert_eq!(state.mutation_status, FetchStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_apply_update_noop_when_never_loaded() {
        let server = MockServer::start().await;
        let cache = cache(&server);
        let doc = DocumentRef::new(42, "v1.0");

        cache
            .apply_update(&doc, ListUpdate::DeleteItem { thread_id: 1 })
            .await;

        assert_eq!(cache.state(&doc).await.status, FetchStatus::Idle);
    }
}
