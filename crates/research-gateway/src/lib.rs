//! # Research Gateway
//!
//! Resilient access to a rate-limited, sometimes unreliable research API.
//! [`ResearchGateway`] composes per-caller rate limiting, a circuit breaker,
//! a TTL result cache, bounded retry with backoff and a bridge that runs the
//! blocking upstream client on a small worker pool, plus a single-flight view
//! of the account's credit usage.
//!
//! ```no_run
//! use gateway_core::{CallerContext, ResearchModel, ResearchRequest};
//! use research_gateway::ResearchGateway;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = gateway_config::load_config().await?;
//! let gateway = tokio::task::spawn_blocking(move || ResearchGateway::from_config(&config)).await??;
//!
//! let caller = CallerContext::new("user-1", "session-1");
//! let report = gateway
//!     .research(ResearchRequest::new("state of Rust async").with_model(ResearchModel::Pro), &caller)
//!     .await?;
//! println!("{} ({} sources)", report.content, report.source_count());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod builder;
pub mod gateway;

pub use builder::{init_tracing, GatewayBuilder};
pub use gateway::{CachedResponse, ResearchGateway, ResearchStream};

pub use gateway_core::{
    CallerContext, ContextRequest, ExtractRequest, ExtractResult, GatewayError, GatewayResult,
    QnaRequest, RemainingCredits, ResearchChunk, ResearchModel, ResearchRequest, ResearchResult,
    SearchDepth, SearchRequest, SearchResult, UsageBreakdown, UsageSnapshot,
};
