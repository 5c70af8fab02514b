//! Tavily provider implementation.
//!
//! Blocking client for the Tavily research, search and extract endpoints.
//! Every method blocks the calling thread; run it from the gateway's worker
//! pool, never from an async task.

use gateway_core::{
    ChunkIter, ContextRequest, ExtractRequest, ExtractResult, ExtractedPage, FailedExtraction,
    GatewayError, GatewayResult, QnaRequest, ResearchChunk, ResearchProvider, ResearchRequest,
    ResearchResult, SearchDepth, SearchHit, SearchRequest, SearchResult, Source,
};
use reqwest::blocking::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Lines};
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// Default Tavily API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.tavily.com";

/// Characters per token used to size `get_context` output
const CHARS_PER_TOKEN: usize = 4;

/// Tavily provider configuration
#[derive(Debug, Clone)]
pub struct TavilyConfig {
    /// Provider instance ID
    pub id: String,
    /// API key
    pub api_key: SecretString,
    /// Base URL (default: https://api.tavily.com)
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Delay between research status polls
    pub poll_interval: Duration,
    /// Maximum research status polls before giving up
    pub max_polls: u32,
}

impl TavilyConfig {
    /// Create a new Tavily configuration
    #[must_use]
    pub fn new(id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_secret(id, SecretString::new(api_key.into()))
    }

    /// Create a configuration from an already-wrapped key
    #[must_use]
    pub fn with_secret(id: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            id: id.into(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(2),
            max_polls: 150,
        }
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set research polling behaviour
    #[must_use]
    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }
}

/// Tavily provider implementation
pub struct TavilyProvider {
    config: TavilyConfig,
    client: Client,
}

impl TavilyProvider {
    /// Create a new Tavily provider
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created
    pub fn new(config: TavilyConfig) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header(
                "Authorization",
                format!("Bearer {}", self.config.api_key.expose_secret()),
            )
            .header("Content-Type", "application/json")
    }

    /// Send a request and check the status
    fn send(&self, builder: RequestBuilder) -> GatewayResult<Response> {
        let response = self.authorized(builder).send().map_err(|e| {
            GatewayError::provider(
                &self.config.id,
                format!("Request failed: {e}"),
                None,
                e.is_timeout() || e.is_connect(),
            )
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().unwrap_or_default();
            error!(
                provider = %self.config.id,
                status = %status,
                error = %error_body,
                "Tavily API error"
            );
            return Err(GatewayError::provider(
                &self.config.id,
                error_body,
                Some(status.as_u16()),
                false,
            ));
        }

        Ok(response)
    }

    fn decode<T: for<'de> Deserialize<'de>>(&self, response: Response) -> GatewayResult<T> {
        response.json().map_err(|e| {
            GatewayError::provider(
                &self.config.id,
                format!("Failed to parse response: {e}"),
                None,
                e.is_timeout(),
            )
        })
    }

    fn post_search(&self, body: &TavilySearchBody<'_>) -> GatewayResult<TavilySearchResponse> {
        let response = self.send(self.client.post(self.url("/search")).json(body))?;
        self.decode(response)
    }

    fn poll_research(&self, request_id: &str) -> GatewayResult<TavilyResearchStatus> {
        let url = self.url(&format!("/research/{request_id}"));

        for poll in 1..=self.config.max_polls.max(1) {
            let status: TavilyResearchStatus = self.decode(self.send(self.client.get(&url))?)?;
            match status.status.as_str() {
                "completed" => return Ok(status),
                "failed" => {
                    return Err(GatewayError::provider(
                        &self.config.id,
                        format!("Research task {request_id} failed"),
                        None,
                        false,
                    ));
                }
                other => {
                    trace!(
                        provider = %self.config.id,
                        request_id,
                        poll,
                        status = other,
                        "Research still running"
                    );
                    std::thread::sleep(self.config.poll_interval);
                }
            }
        }

        Err(GatewayError::provider(
            &self.config.id,
            format!(
                "Research task {request_id} did not finish after {} polls",
                self.config.max_polls
            ),
            None,
            false,
        ))
    }
}

impl ResearchProvider for TavilyProvider {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn research(&self, request: &ResearchRequest) -> GatewayResult<ResearchResult> {
        debug!(
            provider = %self.config.id,
            model = %request.model,
            "Starting Tavily research task"
        );

        let body = TavilyResearchBody::from_request(request, false);
        let started: TavilyResearchStarted =
            self.decode(self.send(self.client.post(self.url("/research")).json(&body))?)?;

        let finished = self.poll_research(&started.request_id)?;

        Ok(ResearchResult {
            request_id: started.request_id,
            status: finished.status,
            content: finished.content.unwrap_or_default(),
            sources: finished.sources,
            model: request.model.as_str().to_string(),
            cached: false,
        })
    }

    fn research_stream(&self, request: &ResearchRequest) -> GatewayResult<ChunkIter> {
        debug!(
            provider = %self.config.id,
            model = %request.model,
            "Starting streaming Tavily research"
        );

        let body = TavilyResearchBody::from_request(request, true);
        let response = self.send(
            self.client
                .post(self.url("/research"))
                .header("Accept", "text/event-stream")
                .json(&body),
        )?;

        Ok(Box::new(SseChunks {
            provider_id: self.config.id.clone(),
            lines: BufReader::new(response).lines(),
            next_index: 0,
            done: false,
        }))
    }

    fn search(&self, request: &SearchRequest) -> GatewayResult<SearchResult> {
        debug!(
            provider = %self.config.id,
            depth = %request.search_depth,
            max_results = request.max_results,
            "Sending Tavily search"
        );

        let body = TavilySearchBody {
            query: &request.query,
            search_depth: request.search_depth,
            max_results: request.max_results,
            include_domains: &request.include_domains,
            exclude_domains: &request.exclude_domains,
            include_answer: request.include_answer,
            include_raw_content: request.include_raw_content,
        };
        let response = self.post_search(&body)?;

        Ok(SearchResult {
            query: response.query.unwrap_or_else(|| request.query.clone()),
            answer: response.answer,
            results: response.results,
            response_time: response.response_time,
            cached: false,
        })
    }

    fn extract(&self, request: &ExtractRequest) -> GatewayResult<ExtractResult> {
        debug!(
            provider = %self.config.id,
            urls = request.urls.len(),
            "Sending Tavily extract"
        );

        let response: TavilyExtractResponse = self.decode(
            self.send(self.client.post(self.url("/extract")).json(&TavilyExtractBody {
                urls: &request.urls,
                include_images: request.include_images,
            }))?,
        )?;

        Ok(ExtractResult {
            results: response.results,
            failed_results: response
                .failed_results
                .into_iter()
                .map(WireFailure::into_failure)
                .collect(),
        })
    }

    fn qna(&self, request: &QnaRequest) -> GatewayResult<String> {
        let response = self.post_search(&TavilySearchBody {
            query: &request.query,
            search_depth: SearchDepth::Advanced,
            max_results: 5,
            include_domains: &[],
            exclude_domains: &[],
            include_answer: true,
            include_raw_content: false,
        })?;

        match response.answer {
            Some(answer) => Ok(answer),
            None => {
                warn!(provider = %self.config.id, "Tavily returned no answer");
                Ok(String::new())
            }
        }
    }

    fn get_context(&self, request: &ContextRequest) -> GatewayResult<String> {
        let response = self.post_search(&TavilySearchBody {
            query: &request.query,
            search_depth: SearchDepth::Advanced,
            max_results: 5,
            include_domains: &[],
            exclude_domains: &[],
            include_answer: false,
            include_raw_content: false,
        })?;

        let budget = (request.max_tokens as usize).saturating_mul(CHARS_PER_TOKEN);
        pack_context(&response.results, budget).map_err(|e| {
            GatewayError::internal(format!("Failed to serialize search context: {e}"))
        })
    }
}

#[derive(Serialize)]
struct ContextEntry<'a> {
    url: &'a str,
    content: &'a str,
}

/// Pack hits into a JSON array of `{url, content}`, in relevance order, until
/// the next hit would push the serialized form past `budget` characters
fn pack_context(hits: &[SearchHit], budget: usize) -> Result<String, serde_json::Error> {
    let mut packed: Vec<ContextEntry<'_>> = Vec::with_capacity(hits.len());
    let mut size = 2;

    for hit in hits {
        let entry = ContextEntry {
            url: &hit.url,
            content: &hit.content,
        };
        let entry_size = serde_json::to_string(&entry)?.len() + usize::from(!packed.is_empty());
        if size + entry_size > budget {
            break;
        }
        size += entry_size;
        packed.push(entry);
    }

    serde_json::to_string(&packed)
}

/// Iterator over a server-sent event body
struct SseChunks {
    provider_id: String,
    lines: Lines<BufReader<Response>>,
    next_index: u64,
    done: bool,
}

impl Iterator for SseChunks {
    type Item = GatewayResult<ResearchChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(GatewayError::provider(
                        &self.provider_id,
                        format!("Stream read failed: {e}"),
                        None,
                        true,
                    )));
                }
                None => {
                    self.done = true;
                    return None;
                }
            };

            let line = line.trim_end();
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            if line.starts_with("event:") || line.starts_with("id:") || line.starts_with("retry:")
            {
                continue;
            }

            let data = line.strip_prefix("data:").map_or(line, str::trim_start);
            if data == "[DONE]" {
                trace!(provider = %self.provider_id, "SSE stream done");
                self.done = true;
                return None;
            }

            let chunk = ResearchChunk::new(self.next_index, data);
            self.next_index += 1;
            return Some(Ok(chunk));
        }
    }
}

// Wire types

#[derive(Serialize)]
struct TavilyResearchBody<'a> {
    input: &'a str,
    model: &'static str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    max_results: u32,
    #[serde(skip_serializing_if = "no_domains")]
    include_domains: &'a [String],
    #[serde(skip_serializing_if = "no_domains")]
    exclude_domains: &'a [String],
}

impl<'a> TavilyResearchBody<'a> {
    fn from_request(request: &'a ResearchRequest, stream: bool) -> Self {
        Self {
            input: &request.query,
            model: request.model.as_str(),
            stream,
            max_results: request.max_results,
            include_domains: &request.include_domains,
            exclude_domains: &request.exclude_domains,
        }
    }
}

#[derive(Deserialize)]
struct TavilyResearchStarted {
    request_id: String,
}

#[derive(Deserialize)]
struct TavilyResearchStatus {
    #[serde(default = "unknown_status")]
    status: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    sources: Vec<Source>,
}

fn no_domains(domains: &&[String]) -> bool {
    domains.is_empty()
}

fn unknown_status() -> String {
    "unknown".to_string()
}

#[derive(Serialize)]
struct TavilySearchBody<'a> {
    query: &'a str,
    search_depth: SearchDepth,
    max_results: u32,
    #[serde(skip_serializing_if = "no_domains")]
    include_domains: &'a [String],
    #[serde(skip_serializing_if = "no_domains")]
    exclude_domains: &'a [String],
    include_answer: bool,
    include_raw_content: bool,
}

#[derive(Deserialize)]
struct TavilySearchResponse {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<SearchHit>,
    #[serde(default)]
    response_time: f64,
}

#[derive(Serialize)]
struct TavilyExtractBody<'a> {
    urls: &'a [String],
    include_images: bool,
}

#[derive(Deserialize)]
struct TavilyExtractResponse {
    #[serde(default)]
    results: Vec<ExtractedPage>,
    #[serde(default)]
    failed_results: Vec<WireFailure>,
}

/// Tavily reports failures either as bare URLs or as `{url, error}`
#[derive(Deserialize)]
#[serde(untagged)]
enum WireFailure {
    Url(String),
    Detailed(FailedExtraction),
}

impl WireFailure {
    fn into_failure(self) -> FailedExtraction {
        match self {
            Self::Url(url) => FailedExtraction {
                url,
                error: String::new(),
            },
            Self::Detailed(failure) => failure,
        }
    }
}
