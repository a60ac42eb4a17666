//! Normalized client-side cache for APT discussion threads and comments.
//!
//! Threads attach to an ATBD document version and consist of an anchor
//! comment (the thread "body") plus ordered replies. This crate sits
//! between UI code and the remote threads API and owns:
//!
//! - **Client**: bearer-authenticated REST client for the threads API
//! - **Normalization**: raw comment arrays into the canonical thread shape
//! - **Slice store**: generic keyed cache of async request/mutation state
//! - **Caches**: thread list, single thread, and aggregate statistics
//! - **Synchronization**: single-thread mutations bridged into the list
//!
//! Rendering, rich-text editing, and authentication are external
//! collaborators; comment bodies are opaque strings and tokens come from an
//! injected [`TokenProvider`].

mod client;
mod error;
mod list;
mod normalize;
mod slice;
mod stats;
mod stores;
mod thread;
mod types;

pub use client::{StaticTokenProvider, ThreadsClient, TokenProvider};
pub use error::ThreadsError;
pub use list::{ListUpdate, ThreadListCache};
pub use normalize::{compute_thread, merge_anchor_comment};
pub use slice::{FetchStatus, SliceState, SliceStore};
pub use stats::ThreadStatsCache;
pub use stores::{ThreadStores, ThreadStoresBuilder};
pub use thread::SingleThreadCache;
pub use types::{
    Comment, DocumentRef, RawThread, SectionFilter, StatusFilter, Thread, ThreadFilter,
    ThreadPatch, ThreadStats, ThreadStatus,
};
