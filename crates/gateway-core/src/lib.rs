//! # Gateway Core
//!
//! Shared vocabulary for the research gateway:
//! - Error hierarchy with HTTP mappings
//! - Validated request types for each public operation
//! - Response, streaming and usage types
//! - Upstream provider traits

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod provider;
pub mod response;
pub mod streaming;
pub mod types;
pub mod usage;

// Re-export main types
pub use error::{ApiError, ApiErrorResponse, GatewayError, GatewayResult};
pub use provider::{ChunkIter, ResearchProvider, UsageSource};
pub use response::{
    ExtractResult, ExtractedPage, FailedExtraction, ResearchResult, SearchHit, SearchResult,
    Source,
};
pub use streaming::ResearchChunk;
pub use types::{
    CallerContext, ContextRequest, ExtractRequest, Operation, QnaRequest, ResearchModel,
    ResearchRequest, SearchDepth, SearchRequest, ValidationError,
};
pub use usage::{
    AccountUsage, KeyUsage, OperationBreakdown, RemainingCredits, UsageBreakdown, UsageSnapshot,
};
