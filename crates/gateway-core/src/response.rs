//! Response types for the gateway operations.

use serde::{Deserialize, Serialize};

/// A source cited by a research report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Source URL
    pub url: String,
    /// Page title
    #[serde(default)]
    pub title: String,
    /// Favicon URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}

/// Result of a deep research call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    /// Upstream request identifier
    pub request_id: String,
    /// Terminal status reported by the upstream
    pub status: String,
    /// Research report
    pub content: String,
    /// Cited sources
    #[serde(default)]
    pub sources: Vec<Source>,
    /// Model tier that produced the report
    pub model: String,
    /// Whether this result was served from the gateway cache
    #[serde(default)]
    pub cached: bool,
}

impl ResearchResult {
    /// Number of cited sources
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }
}

/// A single web search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Page title
    #[serde(default)]
    pub title: String,
    /// Page URL
    pub url: String,
    /// Relevant snippet
    #[serde(default)]
    pub content: String,
    /// Relevance score
    #[serde(default)]
    pub score: f64,
    /// Raw page content (if requested)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<String>,
}

/// Result of a web search call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Query as understood by the upstream
    pub query: String,
    /// Synthesized answer (if requested)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    /// Search hits
    #[serde(default)]
    pub results: Vec<SearchHit>,
    /// Upstream response time in seconds
    #[serde(default)]
    pub response_time: f64,
    /// Whether this result was served from the gateway cache
    #[serde(default)]
    pub cached: bool,
}

/// A successfully extracted page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPage {
    /// Page URL
    pub url: String,
    /// Extracted content
    #[serde(default)]
    pub raw_content: String,
    /// Image URLs (if requested)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

/// A page the upstream could not extract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedExtraction {
    /// Page URL
    pub url: String,
    /// Failure reason
    #[serde(default)]
    pub error: String,
}

/// Result of an extract call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractResult {
    /// Extracted pages
    #[serde(default)]
    pub results: Vec<ExtractedPage>,
    /// Pages that failed
    #[serde(default)]
    pub failed_results: Vec<FailedExtraction>,
}
