//! Thread shape normalization.
//!
//! The API returns a thread as a flat comment array whose first element is
//! the anchor comment (the thread "body"). `compute_thread` converts that
//! into the normalized [`Thread`] shape: anchor split out, reply count
//! derived, and the thread's last-updated fields merged with the anchor's.

use crate::error::ThreadsError;
use crate::types::{Comment, RawThread, Thread};

/// Normalize a raw API thread into the cached [`Thread`] shape.
///
/// The anchor comment becomes `body`/`thread_comment_id`; the remaining
/// comments become the reply list. When the server supplies `comment_count`
/// it includes the anchor, so one is subtracted; otherwise the count is
/// derived from the reply list.
///
/// The derived `last_updated_at`/`last_updated_by` take the anchor's values
/// only when the anchor is strictly newer than the thread record. On equal
/// timestamps the thread record wins.
pub fn compute_thread(raw: RawThread) -> Result<Thread, ThreadsError> {
    let mut comments = raw.comments.into_iter();
    let anchor = comments.next().ok_or_else(|| {
        ThreadsError::Invariant(format!("thread {} has no comments", raw.id))
    })?;
    let replies: Vec<Comment> = comments.collect();

    let comment_count = match raw.comment_count {
        Some(count) => count.saturating_sub(1),
        None => replies.len(),
    };

    let anchor_is_newer = anchor.last_updated_at > raw.last_updated_at;
    let (last_updated_at, last_updated_by) = if anchor_is_newer {
        (anchor.last_updated_at, anchor.last_updated_by.clone())
    } else {
        (raw.last_updated_at, raw.last_updated_by)
    };

    Ok(Thread {
        id: raw.id,
        atbd_id: raw.atbd_id,
        version: raw.version,
        status: raw.status,
        section: raw.section,
        body: anchor.body.clone(),
        thread_comment_id: anchor.id,
        comment_count,
        comments: replies,
        created_by: raw.created_by,
        created_at: raw.created_at,
        last_updated_by,
        last_updated_at,
    })
}

/// Merge an edited anchor comment into a normalized thread.
///
/// Applies the same strict tie-break as [`compute_thread`]: the comment's
/// last-updated fields win only when strictly newer than the thread's
/// current values.
pub fn merge_anchor_comment(thread: &mut Thread, comment: &Comment) {
    thread.body = comment.body.clone();
    if comment.last_updated_at > thread.last_updated_at {
        thread.last_updated_at = comment.last_updated_at;
        thread.last_updated_by = comment.last_updated_by.clone();
    }
}
