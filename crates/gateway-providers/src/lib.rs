//! # Gateway Providers
//!
//! Upstream clients for the research gateway:
//! - Blocking Tavily research/search/extract provider
//! - Async Tavily usage client

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod tavily;
pub mod usage;

pub use tavily::{TavilyConfig, TavilyProvider, DEFAULT_BASE_URL};
pub use usage::TavilyUsageClient;
