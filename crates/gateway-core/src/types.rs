//! Request types for the public gateway operations.
//!
//! Requests carry raw caller input; `validate` checks the shape and
//! `normalized` produces the canonical form used for cache keys and upstream
//! calls.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Validation error for request shapes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Query is empty or whitespace only
    #[error("query cannot be empty")]
    EmptyQuery,

    /// Query exceeds the maximum length
    #[error("query too long: {length} characters exceeds limit of {max}")]
    QueryTooLong {
        /// Length of the provided query
        length: usize,
        /// Maximum allowed length
        max: usize,
    },

    /// max_results out of range
    #[error("Invalid max_results {value}: must be between {min} and {max}")]
    InvalidMaxResults {
        /// The invalid value provided
        value: u32,
        /// Minimum allowed value
        min: u32,
        /// Maximum allowed value
        max: u32,
    },

    /// Too many entries in a domain filter list
    #[error("{field} has {count} entries, limit is {max}")]
    TooManyDomains {
        /// Which domain list overflowed
        field: &'static str,
        /// Number of entries provided
        count: usize,
        /// Maximum allowed entries
        max: usize,
    },

    /// Wrong number of URLs for extraction
    #[error("urls must contain between {min} and {max} entries, got {count}")]
    InvalidUrlCount {
        /// Number of URLs provided
        count: usize,
        /// Minimum allowed
        min: usize,
        /// Maximum allowed
        max: usize,
    },

    /// URL is not http or https
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The offending URL
        url: String,
    },

    /// max_tokens out of range
    #[error("Invalid max_tokens {value}: must be between {min} and {max}")]
    InvalidMaxTokens {
        /// The invalid value provided
        value: u32,
        /// Minimum allowed value
        min: u32,
        /// Maximum allowed value
        max: u32,
    },

    /// Research model name not recognised
    #[error("unknown research model: {value}")]
    UnknownModel {
        /// The unrecognised value
        value: String,
    },

    /// Search depth not recognised
    #[error("unknown search depth: {value}")]
    UnknownSearchDepth {
        /// The unrecognised value
        value: String,
    },
}

/// Maximum query length in characters
pub const MAX_QUERY_LENGTH: usize = 10_000;
/// Smallest accepted `max_results`
pub const MIN_RESULTS: u32 = 1;
/// Largest accepted `max_results`
pub const MAX_RESULTS: u32 = 50;
/// Default `max_results`
pub const DEFAULT_MAX_RESULTS: u32 = 10;
/// Maximum entries per include/exclude domain list
pub const MAX_DOMAINS: usize = 100;
/// Maximum URLs per extract call
pub const MAX_EXTRACT_URLS: usize = 20;
/// Largest accepted `max_tokens` for context retrieval
pub const MAX_CONTEXT_TOKENS: u32 = 128_000;
/// Default `max_tokens` for context retrieval
pub const DEFAULT_CONTEXT_TOKENS: u32 = 4_000;

fn validate_query(query: &str) -> Result<(), ValidationError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyQuery);
    }
    let length = trimmed.chars().count();
    if length > MAX_QUERY_LENGTH {
        return Err(ValidationError::QueryTooLong {
            length,
            max: MAX_QUERY_LENGTH,
        });
    }
    Ok(())
}

fn validate_max_results(value: u32) -> Result<(), ValidationError> {
    if (MIN_RESULTS..=MAX_RESULTS).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidMaxResults {
            value,
            min: MIN_RESULTS,
            max: MAX_RESULTS,
        })
    }
}

fn validate_domains(field: &'static str, domains: &[String]) -> Result<(), ValidationError> {
    if domains.len() > MAX_DOMAINS {
        return Err(ValidationError::TooManyDomains {
            field,
            count: domains.len(),
            max: MAX_DOMAINS,
        });
    }
    Ok(())
}

/// Lowercase, drop blanks, sort and dedupe so that filter order never
/// changes the cache key.
fn normalize_domains(domains: Vec<String>) -> Vec<String> {
    let mut normalized: Vec<String> = domains
        .into_iter()
        .map(|d| d.trim().to_lowercase())
        .filter(|d| !d.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}

/// Research model tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResearchModel {
    /// Fast, shallow research
    Mini,
    /// Thorough research
    #[default]
    Pro,
    /// Let the upstream pick
    Auto,
}

impl ResearchModel {
    /// Wire name of the model
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mini => "mini",
            Self::Pro => "pro",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for ResearchModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResearchModel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mini" => Ok(Self::Mini),
            "pro" => Ok(Self::Pro),
            "auto" => Ok(Self::Auto),
            _ => Err(ValidationError::UnknownModel {
                value: s.to_string(),
            }),
        }
    }
}

/// Search depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    /// Cheaper, shallower search
    Basic,
    /// Deeper search
    #[default]
    Advanced,
}

impl SearchDepth {
    /// Wire name of the depth
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Advanced => "advanced",
        }
    }
}

impl fmt::Display for SearchDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchDepth {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "advanced" => Ok(Self::Advanced),
            _ => Err(ValidationError::UnknownSearchDepth {
                value: s.to_string(),
            }),
        }
    }
}

/// Public gateway operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Deep research
    Research,
    /// Streaming deep research
    ResearchStream,
    /// Web search
    Search,
    /// Content extraction from URLs
    Extract,
    /// Question answering
    Qna,
    /// Search context for RAG
    GetContext,
}

impl Operation {
    /// Stable name used in cache keys, logs and metric labels
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::ResearchStream => "research_stream",
            Self::Search => "search",
            Self::Extract => "extract",
            Self::Qna => "qna",
            Self::GetContext => "get_context",
        }
    }

    /// Whether results of this operation may be served from cache
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Self::Research | Self::Search)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller identity, used for limiter keying and logging only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    /// User identifier (rate limit key)
    pub user_id: String,
    /// Session identifier
    pub session_id: String,
}

impl CallerContext {
    /// Create a caller context
    #[must_use]
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }

    /// Anonymous caller sharing a single rate limit bucket
    #[must_use]
    pub fn anonymous() -> Self {
        Self::new("anonymous", "default")
    }
}

impl Default for CallerContext {
    fn default() -> Self {
        Self::anonymous()
    }
}

/// Deep research request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchRequest {
    /// Research question
    pub query: String,
    /// Model tier
    #[serde(default)]
    pub model: ResearchModel,
    /// Maximum number of sources
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    /// Only use these domains
    #[serde(default)]
    pub include_domains: Vec<String>,
    /// Never use these domains
    #[serde(default)]
    pub exclude_domains: Vec<String>,
}

fn default_max_results() -> u32 {
    DEFAULT_MAX_RESULTS
}

impl ResearchRequest {
    /// Create a request with default options
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            model: ResearchModel::default(),
            max_results: DEFAULT_MAX_RESULTS,
            include_domains: Vec::new(),
            exclude_domains: Vec::new(),
        }
    }

    /// Set the model tier
    #[must_use]
    pub fn with_model(mut self, model: ResearchModel) -> Self {
        self.model = model;
        self
    }

    /// Set the maximum number of sources
    #[must_use]
    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    /// Restrict to these domains
    #[must_use]
    pub fn with_include_domains(mut self, domains: Vec<String>) -> Self {
        self.include_domains = domains;
        self
    }

    /// Exclude these domains
    #[must_use]
    pub fn with_exclude_domains(mut self, domains: Vec<String>) -> Self {
        self.exclude_domains = domains;
        self
    }

    /// Validate the request shape
    ///
    /// # Errors
    /// Returns the first violated constraint
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_query(&self.query)?;
        validate_max_results(self.max_results)?;
        validate_domains("include_domains", &self.include_domains)?;
        validate_domains("exclude_domains", &self.exclude_domains)
    }

    /// Canonical form: trimmed query, sorted lowercase domain lists
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            query: self.query.trim().to_string(),
            model: self.model,
            max_results: self.max_results,
            include_domains: normalize_domains(self.include_domains),
            exclude_domains: normalize_domains(self.exclude_domains),
        }
    }
}

/// Web search request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Search query
    pub query: String,
    /// Search depth
    #[serde(default)]
    pub search_depth: SearchDepth,
    /// Maximum number of results
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    /// Only use these domains
    #[serde(default)]
    pub include_domains: Vec<String>,
    /// Never use these domains
    #[serde(default)]
    pub exclude_domains: Vec<String>,
    /// Ask the upstream for a synthesized answer
    #[serde(default = "default_true")]
    pub include_answer: bool,
    /// Include raw page content in results
    #[serde(default)]
    pub include_raw_content: bool,
}

fn default_true() -> bool {
    true
}

impl SearchRequest {
    /// Create a request with default options
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            search_depth: SearchDepth::default(),
            max_results: DEFAULT_MAX_RESULTS,
            include_domains: Vec::new(),
            exclude_domains: Vec::new(),
            include_answer: true,
            include_raw_content: false,
        }
    }

    /// Set the search depth
    #[must_use]
    pub fn with_depth(mut self, depth: SearchDepth) -> Self {
        self.search_depth = depth;
        self
    }

    /// Set the maximum number of results
    #[must_use]
    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    /// Restrict to these domains
    #[must_use]
    pub fn with_include_domains(mut self, domains: Vec<String>) -> Self {
        self.include_domains = domains;
        self
    }

    /// Exclude these domains
    #[must_use]
    pub fn with_exclude_domains(mut self, domains: Vec<String>) -> Self {
        self.exclude_domains = domains;
        self
    }

    /// Toggle the synthesized answer
    #[must_use]
    pub fn with_answer(mut self, include_answer: bool) -> Self {
        self.include_answer = include_answer;
        self
    }

    /// Toggle raw content
    #[must_use]
    pub fn with_raw_content(mut self, include_raw_content: bool) -> Self {
        self.include_raw_content = include_raw_content;
        self
    }

    /// Validate the request shape
    ///
    /// # Errors
    /// Returns the first violated constraint
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_query(&self.query)?;
        validate_max_results(self.max_results)?;
        validate_domains("include_domains", &self.include_domains)?;
        validate_domains("exclude_domains", &self.exclude_domains)
    }

    /// Canonical form: trimmed query, sorted lowercase domain lists
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            query: self.query.trim().to_string(),
            include_domains: normalize_domains(self.include_domains),
            exclude_domains: normalize_domains(self.exclude_domains),
            ..self
        }
    }
}

/// Content extraction request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractRequest {
    /// URLs to extract (1 to 20, http or https)
    pub urls: Vec<String>,
    /// Include images found on the pages
    #[serde(default)]
    pub include_images: bool,
}

impl ExtractRequest {
    /// Create a request for the given URLs
    #[must_use]
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls,
            include_images: false,
        }
    }

    /// Toggle image extraction
    #[must_use]
    pub fn with_images(mut self, include_images: bool) -> Self {
        self.include_images = include_images;
        self
    }

    /// Validate the request shape
    ///
    /// # Errors
    /// Returns the first violated constraint
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.urls.is_empty() || self.urls.len() > MAX_EXTRACT_URLS {
            return Err(ValidationError::InvalidUrlCount {
                count: self.urls.len(),
                min: 1,
                max: MAX_EXTRACT_URLS,
            });
        }
        for url in &self.urls {
            if !is_http_url(url) {
                return Err(ValidationError::InvalidUrl { url: url.clone() });
            }
        }
        Ok(())
    }

    /// Canonical form: trimmed URLs
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            urls: self.urls.into_iter().map(|u| u.trim().to_string()).collect(),
            include_images: self.include_images,
        }
    }
}

fn is_http_url(url: &str) -> bool {
    let url = url.trim();
    let lower = url.to_ascii_lowercase();
    ["http://", "https://"].iter().any(|scheme| {
        lower.starts_with(scheme) && url.len() > scheme.len()
    })
}

/// Question answering request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QnaRequest {
    /// Question
    pub query: String,
}

impl QnaRequest {
    /// Create a request
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }

    /// Validate the request shape
    ///
    /// # Errors
    /// Returns an error if the query is empty or too long
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_query(&self.query)
    }

    /// Canonical form: trimmed query
    #[must_use]
    pub fn normalized(self) -> Self {
        Self::new(self.query.trim())
    }
}

/// Search context request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRequest {
    /// Query
    pub query: String,
    /// Approximate token budget for the returned context
    #[serde(default = "default_context_tokens")]
    pub max_tokens: u32,
}

fn default_context_tokens() -> u32 {
    DEFAULT_CONTEXT_TOKENS
}

impl ContextRequest {
    /// Create a request with the default token budget
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_tokens: DEFAULT_CONTEXT_TOKENS,
        }
    }

    /// Set the token budget
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Validate the request shape
    ///
    /// # Errors
    /// Returns the first violated constraint
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_query(&self.query)?;
        if !(1..=MAX_CONTEXT_TOKENS).contains(&self.max_tokens) {
            return Err(ValidationError::InvalidMaxTokens {
                value: self.max_tokens,
                min: 1,
                max: MAX_CONTEXT_TOKENS,
            });
        }
        Ok(())
    }

    /// Canonical form: trimmed query
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            query: self.query.trim().to_string(),
            max_tokens: self.max_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_validation() {
        assert_eq!(
            ResearchRequest::new("   ").validate(),
            Err(ValidationError::EmptyQuery)
        );
        assert!(ResearchRequest::new("rust async runtimes").validate().is_ok());

        let long = "x".repeat(MAX_QUERY_LENGTH + 1);
        assert!(matches!(
            SearchRequest::new(long).validate(),
            Err(ValidationError::QueryTooLong { .. })
        ));
    }

    #[test]
    fn test_max_results_bounds() {
        assert!(SearchRequest::new("q").with_max_results(50).validate().is_ok());
        assert!(matches!(
            SearchRequest::new("q").with_max_results(51).validate(),
            Err(ValidationError::InvalidMaxResults { value: 51, .. })
        ));
        assert!(ResearchRequest::new("q").with_max_results(0).validate().is_err());
    }

    #[test]
    fn test_domain_limit() {
        let domains: Vec<String> = (0..=MAX_DOMAINS).map(|i| format!("d{i}.com")).collect();
        let err = ResearchRequest::new("q")
            .with_exclude_domains(domains)
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::TooManyDomains {
                field: "exclude_domains",
                ..
            }
        ));
    }

    #[test]
    fn test_extract_urls() {
        assert!(ExtractRequest::new(vec!["https://example.com".into()])
            .validate()
            .is_ok());
        assert!(ExtractRequest::new(vec!["HTTP://EXAMPLE.COM/a".into()])
            .validate()
            .is_ok());
        assert_eq!(
            ExtractRequest::new(vec!["ftp://bad".into()]).validate(),
            Err(ValidationError::InvalidUrl {
                url: "ftp://bad".to_string()
            })
        );
        assert!(ExtractRequest::new(vec!["https://".into()]).validate().is_err());
        assert!(matches!(
            ExtractRequest::new(vec![]).validate(),
            Err(ValidationError::InvalidUrlCount { count: 0, .. })
        ));

        let too_many: Vec<String> = (0..21).map(|i| format!("https://e.com/{i}")).collect();
        assert!(ExtractRequest::new(too_many).validate().is_err());
    }

    #[test]
    fn test_context_max_tokens() {
        assert!(ContextRequest::new("q").validate().is_ok());
        assert!(ContextRequest::new("q").with_max_tokens(0).validate().is_err());
        assert!(ContextRequest::new("q")
            .with_max_tokens(MAX_CONTEXT_TOKENS + 1)
            .validate()
            .is_err());
    }

    #[test]
    fn test_normalization_is_order_insensitive() {
        let a = ResearchRequest::new("  quantum computing ")
            .with_include_domains(vec!["B.org".into(), "a.com".into()])
            .normalized();
        let b = ResearchRequest::new("quantum computing")
            .with_include_domains(vec!["a.com".into(), "b.org".into(), "a.com".into()])
            .normalized();
        assert_eq!(a, b);
        assert_eq!(a.query, "quantum computing");
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("PRO".parse::<ResearchModel>(), Ok(ResearchModel::Pro));
        assert!("turbo".parse::<ResearchModel>().is_err());
        assert_eq!("basic".parse::<SearchDepth>(), Ok(SearchDepth::Basic));
        assert!("deep".parse::<SearchDepth>().is_err());
    }

    #[test]
    fn test_operation_cacheability() {
        assert!(Operation::Research.is_cacheable());
        assert!(Operation::Search.is_cacheable());
        assert!(!Operation::Extract.is_cacheable());
        assert!(!Operation::Qna.is_cacheable());
        assert!(!Operation::GetContext.is_cacheable());
        assert!(!Operation::ResearchStream.is_cacheable());
    }
}
