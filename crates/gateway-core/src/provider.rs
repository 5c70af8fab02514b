//! Upstream traits.
//!
//! `ResearchProvider` is the blocking SDK seam: every method may block the
//! calling thread on network I/O, so the gateway only ever invokes it from
//! its worker pool. `UsageSource` is the async account endpoint.

use crate::error::GatewayResult;
use crate::response::{ExtractResult, ResearchResult, SearchResult};
use crate::streaming::ResearchChunk;
use crate::types::{ContextRequest, ExtractRequest, QnaRequest, ResearchRequest, SearchRequest};
use crate::usage::UsageSnapshot;
use async_trait::async_trait;

/// Lazily produced research chunks; ends on exhaustion or the first error
pub type ChunkIter = Box<dyn Iterator<Item = GatewayResult<ResearchChunk>> + Send + 'static>;

/// Blocking research API client
///
/// Implementations report connectivity and timeout failures as
/// `GatewayError::Provider { retryable: true, .. }` and everything else as
/// non-retryable.
pub trait ResearchProvider: Send + Sync + 'static {
    /// Provider identifier (used in logs and errors)
    fn id(&self) -> &str;

    /// Run a deep research task to completion
    ///
    /// # Errors
    /// Returns `GatewayError::Provider` on upstream failure
    fn research(&self, request: &ResearchRequest) -> GatewayResult<ResearchResult>;

    /// Start a streaming research task
    ///
    /// # Errors
    /// Returns `GatewayError::Provider` if the stream cannot be opened
    fn research_stream(&self, request: &ResearchRequest) -> GatewayResult<ChunkIter>;

    /// Run a web search
    ///
    /// # Errors
    /// Returns `GatewayError::Provider` on upstream failure
    fn search(&self, request: &SearchRequest) -> GatewayResult<SearchResult>;

    /// Extract content from URLs
    ///
    /// # Errors
    /// Returns `GatewayError::Provider` on upstream failure
    fn extract(&self, request: &ExtractRequest) -> GatewayResult<ExtractResult>;

    /// Answer a question
    ///
    /// # Errors
    /// Returns `GatewayError::Provider` on upstream failure
    fn qna(&self, request: &QnaRequest) -> GatewayResult<String>;

    /// Build a search context string for retrieval-augmented generation
    ///
    /// # Errors
    /// Returns `GatewayError::Provider` on upstream failure
    fn get_context(&self, request: &ContextRequest) -> GatewayResult<String>;
}

/// Source of account usage snapshots
#[async_trait]
pub trait UsageSource: Send + Sync + 'static {
    /// Fetch a fresh usage snapshot
    ///
    /// # Errors
    /// Returns `GatewayError::Provider` if the usage endpoint fails
    async fn fetch_usage(&self) -> GatewayResult<UsageSnapshot>;
}
