//! HTTP client for the threads/comments REST API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::ThreadsError;
use crate::types::{
    Comment, DocumentRef, RawThread, ThreadFilter, ThreadPatch, ThreadStats, ThreadStatus,
};

/// Supplies the bearer token attached to every request.
///
/// Authentication itself is owned by an external identity provider; the
/// client only asks for the current token at request time.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, ThreadsError>;
}

/// Token provider holding a fixed token. Useful for tests and scripts.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String, ThreadsError> {
        Ok(self.token.clone())
    }
}

/// Client for the threads API.
pub struct ThreadsClient {
    http: Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl ThreadsClient {
    /// Create a new client for the given API base URL.
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn TokenProvider>) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            base_url: base_url.into(),
            tokens,
        }
    }

    /// The API base URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn bearer(&self) -> Result<String, ThreadsError> {
        let token = self.tokens.access_token().await?;
        Ok(format!("Bearer {}", token))
    }

    /// List threads for a document, optionally filtered by status/section.
    ///
    /// `All` filter values are omitted from the query; the server treats
    /// absence as "no filter". Server order (most-recent-first) is kept.
    pub async fn list_threads(
        &self,
        doc: &DocumentRef,
        filter: &ThreadFilter,
    ) -> Result<Vec<RawThread>, ThreadsError> {
        let url = format!("{}/threads", self.base_url);
        let atbd_id = doc.atbd_id.to_string();

        let mut query: Vec<(&str, &str)> = vec![("atbd_id", &atbd_id), ("version", &doc.version)];
        if let Some(status) = filter.status.as_query_value() {
            query.push(("status", status));
        }
        if let Some(section) = filter.section.as_query_value() {
            query.push(("section", section));
        }

        debug!(%doc, ?query, "listing threads");
        let response = self
            .http
            .get(&url)
            .header("Authorization", self.bearer().await?)
            .query(&query)
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Fetch one thread with its full comment array.
    pub async fn get_thread(&self, thread_id: i64) -> Result<RawThread, ThreadsError> {
        let url = format!("{}/threads/{}", self.base_url, thread_id);
        let response = self
            .http
            .get(&url)
            .header("Authorization", self.bearer().await?)
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Create a thread with a single anchor comment.
    pub async fn create_thread(
        &self,
        doc: &DocumentRef,
        section: &str,
        comment_body: &str,
    ) -> Result<RawThread, ThreadsError> {
        #[derive(Serialize)]
        struct NewComment<'a> {
            body: &'a str,
        }

        #[derive(Serialize)]
        struct NewThread<'a> {
            atbd_id: i64,
            version: &'a str,
            section: &'a str,
            comment: NewComment<'a>,
        }

        let url = format!("{}/threads", self.base_url);
        debug!(%doc, section, "creating thread");
        let response = self
            .http
            .post(&url)
            .header("Authorization", self.bearer().await?)
            .json(&NewThread {
                atbd_id: doc.atbd_id,
                version: &doc.version,
                section,
                comment: NewComment { body: comment_body },
            })
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Toggle a thread's open/closed status.
    ///
    /// Returns the updated thread row without its comments join.
    pub async fn update_thread_status(
        &self,
        thread_id: i64,
        status: ThreadStatus,
    ) -> Result<ThreadPatch, ThreadsError> {
        #[derive(Serialize)]
        struct StatusUpdate {
            status: ThreadStatus,
        }

        let url = format!("{}/threads/{}", self.base_url, thread_id);
        debug!(thread_id, ?status, "updating thread status");
        let response = self
            .http
            .post(&url)
            .header("Authorization", self.bearer().await?)
            .json(&StatusUpdate { status })
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Delete a thread and, server-side, all of its comments.
    pub async fn delete_thread(&self, thread_id: i64) -> Result<(), ThreadsError> {
        let url = format!("{}/threads/{}", self.base_url, thread_id);
        debug!(thread_id, "deleting thread");
        let response = self
            .http
            .delete(&url)
            .header("Authorization", self.bearer().await?)
            .send()
            .await?;
        self.handle_empty_response(response).await
    }

    /// Append a reply to a thread.
    pub async fn create_comment(
        &self,
        thread_id: i64,
        body: &str,
    ) -> Result<Comment, ThreadsError> {
        #[derive(Serialize)]
        struct NewComment<'a> {
            body: &'a str,
        }

        let url = format!("{}/threads/{}/comments", self.base_url, thread_id);
        debug!(thread_id, "creating comment");
        let response = self
            .http
            .post(&url)
            .header("Authorization", self.bearer().await?)
            .json(&NewComment { body })
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Edit a comment's body (anchor or reply).
    pub async fn update_comment(
        &self,
        thread_id: i64,
        comment_id: i64,
        body: &str,
    ) -> Result<Comment, ThreadsError> {
        #[derive(Serialize)]
        struct CommentUpdate<'a> {
            body: &'a str,
        }

        let url = format!(
            "{}/threads/{}/comments/{}",
            self.base_url, thread_id, comment_id
        );
        debug!(thread_id, comment_id, "updating comment");
        let response = self
            .http
            .post(&url)
            .header("Authorization", self.bearer().await?)
            .json(&CommentUpdate { body })
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Delete a single reply.
    pub async fn delete_comment(
        &self,
        thread_id: i64,
        comment_id: i64,
    ) -> Result<(), ThreadsError> {
        let url = format!(
            "{}/threads/{}/comments/{}",
            self.base_url, thread_id, comment_id
        );
        debug!(thread_id, comment_id, "deleting comment");
        let response = self
            .http
            .delete(&url)
            .header("Authorization", self.bearer().await?)
            .send()
            .await?;
        self.handle_empty_response(response).await
    }

    /// Fetch aggregate thread counts for a batch of documents.
    ///
    /// Documents are passed as repeated `atbds` parameters in
    /// `<id>_<version>` form.
    pub async fn thread_stats(
        &self,
        docs: &[DocumentRef],
    ) -> Result<Vec<ThreadStats>, ThreadsError> {
        let url = format!("{}/threads/stats", self.base_url);
        let query: Vec<(&str, String)> = docs
            .iter()
            .map(|d| ("atbds", format!("{}_{}", d.atbd_id, d.version)))
            .collect();

        debug!(count = docs.len(), "fetching thread stats");
        let response = self
            .http
            .get(&url)
            .header("Authorization", self.bearer().await?)
            .query(&query)
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Deserialize a 2xx response body, or map the failure to an API error.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ThreadsError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        Err(self.api_error(status, response).await)
    }

    /// Like `handle_response` for endpoints that return no body.
    async fn handle_empty_response(
        &self,
        response: reqwest::Response,
    ) -> Result<(), ThreadsError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(self.api_error(status, response).await)
    }

    async fn api_error(
        &self,
        status: reqwest::StatusCode,
        response: reqwest::Response,
    ) -> ThreadsError {
        let body = response.text().await.unwrap_or_default();
        // The API reports failures as {"detail": "..."}; fall back to the
        // raw body for anything else.
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(String::from))
            .unwrap_or(body);
        warn!(status = status.as_u16(), %message, "API request failed");
        ThreadsError::Api {
            status: status.as_u16(),
            message,
        }
    }
}
