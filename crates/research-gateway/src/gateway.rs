//! The gateway facade.
//!
//! Every public operation runs the same pipeline: validate, admit through
//! the circuit breaker and then the per-caller rate limiter, consult the
//! result cache (research and search only), and dispatch the blocking
//! upstream call through the bridge under the retry policy. A call that
//! reaches the upstream records exactly one breaker outcome.

use futures::stream::{BoxStream, StreamExt};
use gateway_core::{
    CallerContext, ContextRequest, ExtractRequest, ExtractResult, GatewayError, GatewayResult,
    Operation, QnaRequest, RemainingCredits, ResearchChunk, ResearchProvider, ResearchRequest,
    ResearchResult, SearchRequest, SearchResult, UsageBreakdown, UsageSnapshot, ValidationError,
};
use gateway_resilience::{
    BlockingBridge, CacheKey, CacheLookupResult, CacheStats, CircuitBreaker, CircuitBreakerStats,
    CircuitState, RateLimiter, ResponseCache, RetryPolicy, UsageTracker,
};
use gateway_telemetry::{CallOutcome, LogContext, Metrics};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::builder::GatewayBuilder;

/// Value stored in the result cache
#[derive(Debug, Clone)]
pub enum CachedResponse {
    /// A research report
    Research(ResearchResult),
    /// A search result page
    Search(SearchResult),
}

/// Stream of research chunks returned by [`ResearchGateway::research_stream`]
pub type ResearchStream = BoxStream<'static, GatewayResult<ResearchChunk>>;

/// Resilient front for a rate-limited research upstream
pub struct ResearchGateway {
    pub(crate) provider: Arc<dyn ResearchProvider>,
    pub(crate) limiter: RateLimiter,
    pub(crate) breaker: Arc<CircuitBreaker>,
    pub(crate) cache: ResponseCache<CachedResponse>,
    pub(crate) retry: RetryPolicy,
    pub(crate) bridge: BlockingBridge,
    pub(crate) usage: Arc<UsageTracker>,
    pub(crate) metrics: Option<Arc<Metrics>>,
}

impl ResearchGateway {
    /// Start building a gateway
    #[must_use]
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    /// Run a deep research task
    ///
    /// Results are cached; a repeated structurally-equal request within the
    /// TTL returns the cached report with `cached = true`.
    ///
    /// # Errors
    /// Returns `Validation`, `CircuitBreakerOpen` or `RateLimit` before any
    /// upstream call, and `Upstream` if the call failed
    pub async fn research(
        &self,
        request: ResearchRequest,
        caller: &CallerContext,
    ) -> GatewayResult<ResearchResult> {
        let op = Operation::Research;
        async move {
            self.validate(op, request.validate())?;
            let request = request.normalized();
            self.admit(op, caller).await?;

            let key = self.cache_key(op, &request)?;
            if let Some(CachedResponse::Research(mut hit)) = self.lookup(op, &key).await {
                hit.cached = true;
                return Ok(hit);
            }

            let mut result = self
                .dispatch(op, move |p: &dyn ResearchProvider| p.research(&request))
                .await?;
            result.cached = false;
            self.cache
                .put(key, CachedResponse::Research(result.clone()))
                .await;

            info!(
                request_id = %result.request_id,
                sources = result.source_count(),
                "Research completed"
            );
            Ok(result)
        }
        .instrument(self.span(op, caller))
        .await
    }

    /// Stream a research report as it is produced
    ///
    /// Streams are never cached or retried. The breaker records one outcome
    /// when the stream finishes or fails; a stream dropped early records
    /// nothing.
    ///
    /// # Errors
    /// Returns admission errors up front; upstream failures arrive as the
    /// last stream item
    pub async fn research_stream(
        &self,
        request: ResearchRequest,
        caller: &CallerContext,
    ) -> GatewayResult<ResearchStream> {
        let op = Operation::ResearchStream;
        let span = self.span(op, caller);
        let stream_span = span.clone();

        async move {
            self.validate(op, request.validate())?;
            let request = request.normalized();
            self.admit(op, caller).await?;

            let provider = Arc::clone(&self.provider);
            let mut chunks = self
                .bridge
                .submit_stream(move || provider.research_stream(&request))?;

            let breaker = Arc::clone(&self.breaker);
            let usage = Arc::clone(&self.usage);
            let metrics = self.metrics.clone();
            let started = Instant::now();
            debug!("Research stream opened");

            let stream = async_stream::stream! {
                let mut failure = None;
                let mut forwarded: u32 = 0;

                while let Some(item) = chunks.next().await {
                    match item {
                        Ok(chunk) => {
                            forwarded += 1;
                            if let Some(ref metrics) = metrics {
                                metrics.record_stream_chunk(op.as_str());
                            }
                            yield Ok(chunk);
                        }
                        Err(err) => {
                            failure = Some(err);
                            break;
                        }
                    }
                }

                match failure {
                    None => {
                        breaker.record_success();
                        usage.clear_cache();
                        if let Some(ref metrics) = metrics {
                            metrics.record_call(op.as_str(), CallOutcome::Success);
                            metrics.record_upstream(op.as_str(), started.elapsed(), 1);
                            metrics.update_circuit_breaker(breaker.name(), breaker.state().as_gauge());
                        }
                        info!(chunks = forwarded, "Research stream completed");
                    }
                    Some(err) => {
                        breaker.record_failure();
                        if let Some(ref metrics) = metrics {
                            metrics.record_call(op.as_str(), CallOutcome::UpstreamError);
                            metrics.update_circuit_breaker(breaker.name(), breaker.state().as_gauge());
                        }
                        error!(chunks = forwarded, error = %err, "Research stream failed");
                        yield Err(GatewayError::upstream(op.as_str(), 1, err));
                    }
                }
            };

            Ok(in_span(stream.boxed(), stream_span))
        }
        .instrument(span)
        .await
    }

    /// Web search
    ///
    /// # Errors
    /// Same as [`Self::research`]
    pub async fn search(
        &self,
        request: SearchRequest,
        caller: &CallerContext,
    ) -> GatewayResult<SearchResult> {
        let op = Operation::Search;
        async move {
            self.validate(op, request.validate())?;
            let request = request.normalized();
            self.admit(op, caller).await?;

            let key = self.cache_key(op, &request)?;
            if let Some(CachedResponse::Search(mut hit)) = self.lookup(op, &key).await {
                hit.cached = true;
                return Ok(hit);
            }

            let mut result = self
                .dispatch(op, move |p: &dyn ResearchProvider| p.search(&request))
                .await?;
            result.cached = false;
            self.cache.put(key, CachedResponse::Search(result.clone())).await;

            info!(results = result.results.len(), "Search completed");
            Ok(result)
        }
        .instrument(self.span(op, caller))
        .await
    }

    /// Extract page content from 1 to 20 http(s) URLs
    ///
    /// # Errors
    /// Same as [`Self::research`]
    pub async fn extract(
        &self,
        request: ExtractRequest,
        caller: &CallerContext,
    ) -> GatewayResult<ExtractResult> {
        let op = Operation::Extract;
        async move {
            self.validate(op, request.validate())?;
            let request = request.normalized();
            self.admit(op, caller).await?;

            let result = self
                .dispatch(op, move |p: &dyn ResearchProvider| p.extract(&request))
                .await?;

            info!(
                extracted = result.results.len(),
                failed = result.failed_results.len(),
                "Extract completed"
            );
            Ok(result)
        }
        .instrument(self.span(op, caller))
        .await
    }

    /// Answer a question in one string
    ///
    /// # Errors
    /// Same as [`Self::research`]
    pub async fn qna(&self, request: QnaRequest, caller: &CallerContext) -> GatewayResult<String> {
        let op = Operation::Qna;
        async move {
            self.validate(op, request.validate())?;
            let request = request.normalized();
            self.admit(op, caller).await?;

            let answer = self
                .dispatch(op, move |p: &dyn ResearchProvider| p.qna(&request))
                .await?;

            info!(answer_len = answer.len(), "Q&A completed");
            Ok(answer)
        }
        .instrument(self.span(op, caller))
        .await
    }

    /// Search context sized to a token budget, for RAG prompts
    ///
    /// # Errors
    /// Same as [`Self::research`]
    pub async fn get_context(
        &self,
        request: ContextRequest,
        caller: &CallerContext,
    ) -> GatewayResult<String> {
        let op = Operation::GetContext;
        async move {
            self.validate(op, request.validate())?;
            let request = request.normalized();
            self.admit(op, caller).await?;

            let context = self
                .dispatch(op, move |p: &dyn ResearchProvider| p.get_context(&request))
                .await?;

            info!(context_len = context.len(), "Context retrieved");
            Ok(context)
        }
        .instrument(self.span(op, caller))
        .await
    }

    /// Account usage snapshot; `force` bypasses the cached copy
    ///
    /// # Errors
    /// Returns the usage endpoint's error if a fetch was needed and failed
    pub async fn get_usage(&self, force: bool) -> GatewayResult<Arc<UsageSnapshot>> {
        self.usage.fetch(force).await
    }

    /// Credits left on the key, the plan and pay-as-you-go
    ///
    /// # Errors
    /// See [`Self::get_usage`]
    pub async fn get_remaining_credits(&self) -> GatewayResult<RemainingCredits> {
        self.usage.get_remaining().await
    }

    /// Per-operation usage for the key and the account
    ///
    /// # Errors
    /// See [`Self::get_usage`]
    pub async fn get_usage_breakdown(&self) -> GatewayResult<UsageBreakdown> {
        self.usage.get_breakdown().await
    }

    /// Whether `count` more calls of `operation` fit in the key's credits
    ///
    /// # Errors
    /// See [`Self::get_usage`]
    pub async fn can_use(&self, operation: &str, count: u64) -> GatewayResult<bool> {
        self.usage.can_use(operation, count).await
    }

    /// Current circuit breaker state
    #[must_use]
    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Circuit breaker statistics
    #[must_use]
    pub fn circuit_stats(&self) -> CircuitBreakerStats {
        self.breaker.stats()
    }

    /// Calls `user_id` may still make in the current window
    pub async fn limiter_remaining(&self, user_id: &str) -> u32 {
        self.limiter.remaining(user_id).await
    }

    /// Callers the rate limiter currently holds a window for
    pub async fn tracked_callers(&self) -> usize {
        self.limiter.key_count().await
    }

    /// Result cache statistics
    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Metrics registry, if metrics are enabled
    #[must_use]
    pub fn metrics(&self) -> Option<&Metrics> {
        self.metrics.as_deref()
    }

    /// Stop accepting upstream work
    ///
    /// In-flight calls run to completion; later calls fail with `Internal`.
    pub fn shutdown(&self) {
        self.bridge.shutdown();
    }

    fn span(&self, op: Operation, caller: &CallerContext) -> tracing::Span {
        LogContext::new()
            .with_request_id(Uuid::new_v4().to_string())
            .with_operation(op.as_str())
            .with_caller(caller.user_id.as_str(), caller.session_id.as_str())
            .span()
    }

    fn record(&self, op: Operation, outcome: CallOutcome) {
        if let Some(ref metrics) = self.metrics {
            metrics.record_call(op.as_str(), outcome);
        }
    }

    fn record_breaker_state(&self) {
        if let Some(ref metrics) = self.metrics {
            metrics.update_circuit_breaker(self.breaker.name(), self.breaker.state().as_gauge());
        }
    }

    fn validate(&self, op: Operation, checked: Result<(), ValidationError>) -> GatewayResult<()> {
        checked.map_err(|err| {
            debug!(error = %err, "Request rejected by validation");
            self.record(op, CallOutcome::Invalid);
            GatewayError::from(err)
        })
    }

    /// Breaker first, then the caller's rate limit
    async fn admit(&self, op: Operation, caller: &CallerContext) -> GatewayResult<()> {
        if self.bridge.is_shutdown() {
            self.record(op, CallOutcome::InternalError);
            return Err(GatewayError::internal("gateway is shut down"));
        }

        let admitted = self.breaker.can_execute();
        self.record_breaker_state();
        if !admitted {
            warn!(upstream = %self.breaker.name(), "Circuit breaker open, rejecting call");
            self.record(op, CallOutcome::CircuitOpen);
            return Err(GatewayError::circuit_breaker_open(self.breaker.name()));
        }

        if let Err(err) = self.limiter.acquire(&caller.user_id).await {
            if let Some(ref metrics) = self.metrics {
                metrics.record_rate_limit_hit(op.as_str());
            }
            self.record(op, CallOutcome::RateLimited);
            return Err(err);
        }

        Ok(())
    }

    fn cache_key<T: serde::Serialize>(&self, op: Operation, request: &T) -> GatewayResult<CacheKey> {
        CacheKey::for_request(op.as_str(), request)
            .map_err(|e| GatewayError::internal(format!("Failed to build cache key: {e}")))
    }

    async fn lookup(&self, op: Operation, key: &CacheKey) -> Option<CachedResponse> {
        let (hit, result) = if self.cache.is_enabled() {
            match self.cache.get(key).await {
                Some(hit) => (Some(hit), CacheLookupResult::Hit),
                None => (None, CacheLookupResult::Miss),
            }
        } else {
            (None, CacheLookupResult::Disabled)
        };

        debug!(cache = result.as_str(), "Cache lookup");
        if let Some(ref metrics) = self.metrics {
            metrics.record_cache_lookup(op.as_str(), result.as_str());
            if hit.is_some() {
                metrics.record_call(op.as_str(), CallOutcome::Cached);
            }
        }
        hit
    }

    /// Run `call` on the bridge under the retry policy and settle the
    /// breaker once for the whole call
    async fn dispatch<T, F>(&self, op: Operation, call: F) -> GatewayResult<T>
    where
        T: Send + 'static,
        F: Fn(&dyn ResearchProvider) -> GatewayResult<T> + Send + Sync + 'static,
    {
        let call = Arc::new(call);
        let started = Instant::now();
        let active = self.metrics.as_ref().map(|m| m.track_active(op.as_str()));

        let outcome = self
            .retry
            .execute(op.as_str(), |attempt| {
                let provider = Arc::clone(&self.provider);
                let call = Arc::clone(&call);
                debug!(attempt, "Dispatching upstream call");
                let submitted = self.bridge.submit(move || call(provider.as_ref()));
                async move { submitted?.await }
            })
            .await;

        let elapsed = started.elapsed();
        drop(active);
        if let Some(ref metrics) = self.metrics {
            metrics.record_upstream(op.as_str(), elapsed, outcome.attempts);
        }

        match outcome.result {
            // Shut down while this call was between attempts or queued for a worker
            Err(err @ GatewayError::Internal { .. }) if self.bridge.is_shutdown() => {
                warn!(attempts = outcome.attempts, "Gateway shut down during upstream call");
                self.record(op, CallOutcome::InternalError);
                Err(err)
            }
            Ok(value) => {
                self.breaker.record_success();
                self.usage.clear_cache();
                self.record_breaker_state();
                self.record(op, CallOutcome::Success);
                debug!(
                    attempts = outcome.attempts,
                    duration_ms = elapsed.as_millis() as u64,
                    "Upstream call succeeded"
                );
                Ok(value)
            }
            Err(err) => {
                self.breaker.record_failure();
                self.record_breaker_state();
                self.record(op, CallOutcome::UpstreamError);
                error!(
                    attempts = outcome.attempts,
                    duration_ms = elapsed.as_millis() as u64,
                    error = %err,
                    "Upstream call failed"
                );
                Err(GatewayError::upstream(op.as_str(), outcome.attempts, err))
            }
        }
    }
}

/// Poll `stream` with `span` entered, so events logged while producing
/// items carry the call's identity
fn in_span<T: Send + 'static>(
    mut stream: BoxStream<'static, T>,
    span: tracing::Span,
) -> BoxStream<'static, T> {
    futures::stream::poll_fn(move |cx| {
        let _entered = span.enter();
        stream.poll_next_unpin(cx)
    })
    .boxed()
}

impl Drop for ResearchGateway {
    fn drop(&mut self) {
        self.bridge.shutdown();
    }
}

impl std::fmt::Debug for ResearchGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResearchGateway")
            .field("provider", &self.provider.id())
            .field("circuit_state", &self.breaker.state())
            .field("bridge", &self.bridge)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_is_polled_inside_its_span() {
        let _subscriber = tracing::subscriber::set_default(tracing_subscriber::registry());
        let span = tracing::info_span!("gateway_call", operation = "research_stream");
        assert!(span.id().is_some());

        let items = futures::stream::iter(0..3)
            .map(|i| (i, tracing::Span::current().id()))
            .boxed();
        let seen: Vec<_> = in_span(items, span.clone()).collect().await;

        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|(_, id)| *id == span.id()));
        assert!(tracing::Span::current().id().is_none());
    }
}
