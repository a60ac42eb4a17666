//! Wire and normalized types for threads, comments, and statistics.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A document (ATBD) version that threads attach to.
///
/// Used as the cache key for the thread list and as the lookup key for
/// per-document statistics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Server-assigned ATBD id.
    pub atbd_id: i64,
    /// Version label (e.g. "v1.0").
    pub version: String,
}

impl DocumentRef {
    pub fn new(atbd_id: i64, version: impl Into<String>) -> Self {
        Self {
            atbd_id,
            version: version.into(),
        }
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.atbd_id, self.version)
    }
}

/// Lifecycle status of a thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThreadStatus {
    /// Thread is open for discussion.
    #[default]
    Open,
    /// Thread has been resolved.
    Closed,
}

/// Status filter for thread listing.
///
/// `All` is omitted from the request query; the server treats absence as
/// "no filter".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Only(ThreadStatus),
}

impl StatusFilter {
    /// Query parameter value, or `None` when the filter is a no-op.
    pub fn as_query_value(&self) -> Option<&'static str> {
        match self {
            StatusFilter::All => None,
            StatusFilter::Only(ThreadStatus::Open) => Some("OPEN"),
            StatusFilter::Only(ThreadStatus::Closed) => Some("CLOSED"),
        }
    }
}

/// Section filter for thread listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SectionFilter {
    #[default]
    All,
    Section(String),
}

impl SectionFilter {
    /// Query parameter value, or `None` when the filter is a no-op.
    pub fn as_query_value(&self) -> Option<&str> {
        match self {
            SectionFilter::All => None,
            SectionFilter::Section(s) => Some(s),
        }
    }
}

/// Combined listing filter. Changing either field replaces the cached list
/// wholesale on the next fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadFilter {
    pub status: StatusFilter,
    pub section: SectionFilter,
}

/// A comment as it appears on the wire.
///
/// The first comment of a thread is its anchor (the thread "body"); the
/// normalizer strips it out of the reply list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub thread_id: i64,
    pub body: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub last_updated_by: String,
    pub last_updated_at: DateTime<Utc>,
}

/// A thread record as returned by the API.
///
/// `comments` is never empty on a well-formed record: the first element is
/// the anchor comment. `comment_count` includes the anchor when present and
/// is absent on freshly created threads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawThread {
    pub id: i64,
    pub atbd_id: i64,
    pub version: String,
    pub status: ThreadStatus,
    pub section: String,
    pub comments: Vec<Comment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_count: Option<usize>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub last_updated_by: String,
    pub last_updated_at: DateTime<Utc>,
}

/// The normalized thread shape the caches hold.
///
/// `body` and `thread_comment_id` come from the anchor comment; `comments`
/// holds replies only, in chronological order; `comment_count` counts
/// replies and never includes the anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: i64,
    pub atbd_id: i64,
    pub version: String,
    pub status: ThreadStatus,
    pub section: String,
    pub body: String,
    /// Id of the anchor comment, needed to edit it distinctly from replies.
    pub thread_comment_id: i64,
    pub comment_count: usize,
    pub comments: Vec<Comment>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub last_updated_by: String,
    pub last_updated_at: DateTime<Utc>,
}

/// Response of a thread record update (status toggle).
///
/// The update endpoint returns the thread row without the comments join, so
/// consumers merge these fields by id instead of replacing cached items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadPatch {
    pub id: i64,
    pub status: ThreadStatus,
    pub last_updated_by: String,
    pub last_updated_at: DateTime<Utc>,
}

/// Aggregate per-document thread counts, computed server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadStats {
    pub atbd_id: i64,
    pub version: String,
    #[serde(rename = "status_open")]
    pub open: u32,
    #[serde(rename = "status_closed")]
    pub closed: u32,
}

impl ThreadStats {
    /// The document this entry belongs to.
    pub fn document(&self) -> DocumentRef {
        DocumentRef::new(self.atbd_id, self.version.clone())
    }
}
