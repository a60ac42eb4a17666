//! Single-thread cache: one thread with its ordered replies.

use std::sync::Arc;

use tracing::debug;

use crate::client::ThreadsClient;
use crate::error::ThreadsError;
use crate::list::{ListUpdate, ThreadListCache};
use crate::normalize::{compute_thread, merge_anchor_comment};
use crate::slice::{SliceState, SliceStore};
use crate::types::{Comment, DocumentRef, Thread, ThreadPatch, ThreadStatus};

/// Cache of individual threads, keyed by thread id.
///
/// Mutations that also affect the list view (status toggles, deletion,
/// anchor-comment edits) take an optional target document and bridge their
/// result into the [`ThreadListCache`] after their own merge, before the
/// returned future resolves. A caller that refreshes statistics after
/// awaiting a mutation therefore always observes consistent list state
/// first.
pub struct SingleThreadCache {
    client: Arc<ThreadsClient>,
    list: Arc<ThreadListCache>,
    store: SliceStore<i64, Thread>,
}

impl SingleThreadCache {
    pub fn new(client: Arc<ThreadsClient>, list: Arc<ThreadListCache>) -> Self {
        Self {
            client,
            list,
            store: SliceStore::new(),
        }
    }

    /// Current cached state for a thread.
    pub async fn state(&self, thread_id: i64) -> SliceState<Thread> {
        self.store.state(&thread_id).await
    }

    /// Reset a thread's slice, normally on panel unmount.
    pub async fn invalidate(&self, thread_id: i64) {
        self.store.invalidate(&thread_id).await;
    }

    /// Fetch one thread with its full reply list.
    pub async fn fetch_thread(&self, thread_id: i64) -> Result<Thread, ThreadsError> {
        self.store
            .run_fetch(&thread_id, async {
                let raw = self.client.get_thread(thread_id).await?;
                compute_thread(raw)
            })
            .await
    }

    /// Toggle a thread's open/closed status.
    ///
    /// Merges the returned row fields into cached data when present, then
    /// bridges the patch into the list cache for `target`.
    pub async fn update_thread_status(
        &self,
        thread_id: i64,
        status: ThreadStatus,
        target: Option<&DocumentRef>,
    ) -> Result<ThreadPatch, ThreadsError> {
        let patch = self
            .store
            .run_mutation(
                &thread_id,
                self.client.update_thread_status(thread_id, status),
                |patch: &ThreadPatch, data| {
                    data.map(|mut thread| {
                        thread.status = patch.status;
                        thread.last_updated_at = patch.last_updated_at;
                        thread.last_updated_by = patch.last_updated_by.clone();
                        thread
                    })
                },
            )
            .await?;

        if let Some(doc) = target {
            self.list
                .apply_update(doc, ListUpdate::UpdateItem(patch.clone()))
                .await;
        }
        Ok(patch)
    }

    /// Delete a thread and all of its replies.
    ///
    /// On success the slice is invalidated and the thread is removed from
    /// the list cache for `target`.
    pub async fn delete_thread(
        &self,
        thread_id: i64,
        target: Option<&DocumentRef>,
    ) -> Result<(), ThreadsError> {
        self.store
            .run_mutation(&thread_id, self.client.delete_thread(thread_id), |_, data| {
                data
            })
            .await?;

        self.store.invalidate(&thread_id).await;
        if let Some(doc) = target {
            self.list
                .apply_update(doc, ListUpdate::DeleteItem { thread_id })
                .await;
        }
        Ok(())
    }

    /// Append a reply to a thread.
    pub async fn create_thread_comment(
        &self,
        thread_id: i64,
        comment: &str,
    ) -> Result<Comment, ThreadsError> {
        self.store
            .run_mutation(
                &thread_id,
                self.client.create_comment(thread_id, comment),
                |reply: &Comment, data| {
                    data.map(|mut thread| {
                        thread.comments.push(reply.clone());
                        thread.comment_count += 1;
                        thread
                    })
                },
            )
            .await
    }

    /// Remove a reply by id.
    pub async fn delete_thread_comment(
        &self,
        thread_id: i64,
        comment_id: i64,
    ) -> Result<(), ThreadsError> {
        self.store
            .run_mutation(
                &thread_id,
                self.client.delete_comment(thread_id, comment_id),
                |_, data| {
                    data.map(|mut thread| {
                        let before = thread.comments.len();
                        thread.comments.retain(|c| c.id != comment_id);
                        if thread.comments.len() < before {
                            thread.comment_count -= 1;
                        }
                        thread
                    })
                },
            )
            .await
    }

    /// Edit a comment's body.
    ///
    /// When the edited comment is the thread's anchor, the cached thread's
    /// `body` and derived last-updated fields are merged under the strict
    /// tie-break; a reply is replaced in place. The slice may hold no thread
    /// at all (the edit came from the list panel): the network call still
    /// runs and the response flows to the list dispatch while local data
    /// stays absent.
    pub async fn update_thread_comment(
        &self,
        thread_id: i64,
        comment_id: i64,
        comment: &str,
        target: Option<&DocumentRef>,
    ) -> Result<Comment, ThreadsError> {
        let updated = self
            .store
            .run_mutation(
                &thread_id,
                self.client.update_comment(thread_id, comment_id, comment),
                |updated: &Comment, data| {
                    let Some(mut thread) = data else {
                        debug!(thread_id, comment_id, "no cached thread, skipping local merge");
                        return None;
                    };
                    if updated.id == thread.thread_comment_id {
                        merge_anchor_comment(&mut thread, updated);
                    } else if let Some(slot) =
                        thread.comments.iter_mut().find(|c| c.id == updated.id)
                    {
                        *slot = updated.clone();
                    }
                    Some(thread)
                },
            )
            .await?;

        if let Some(doc) = target {
            // The list side decides whether the comment is the anchor; this
            // cache may not hold the thread to tell.
            self.list
                .apply_update(
                    doc,
                    ListUpdate::UpdateItemComment {
                        thread_id,
                        comment: updated.clone(),
                    },
                )
                .await;
        }
        Ok(updated)
    }
}
