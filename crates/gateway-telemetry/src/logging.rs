//! Structured logging.
//!
//! One `fmt` layer in JSON, pretty or compact form behind an `EnvFilter`.
//! A non-empty `RUST_LOG` replaces the configured directives entirely.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format
    pub format: LogFormat,
    /// Extra directives appended to the level (e.g. "reqwest=warn")
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            filter: None,
        }
    }
}

impl LoggingConfig {
    /// Create a new logging configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the log level
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Set the output format
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set filter directives
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    fn directives(&self) -> String {
        match self.filter {
            Some(ref extra) if !extra.trim().is_empty() => format!("{},{extra}", self.level),
            _ => self.level.clone(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event, with the current call span
    Json,
    /// Multi-line, human-readable
    #[default]
    Pretty,
    /// Single line per event
    Compact,
}

/// Install the global subscriber
///
/// # Errors
/// Returns error if the directives do not parse or a subscriber is already
/// installed
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(config, rust_log.as_deref())?;

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))
}

fn build_filter(config: &LoggingConfig, rust_log: Option<&str>) -> Result<EnvFilter, LoggingError> {
    let directives = match rust_log {
        Some(env) if !env.trim().is_empty() => env.to_string(),
        _ => config.directives(),
    };

    EnvFilter::try_new(&directives).map_err(|e| LoggingError::FilterParse(format!("{directives}: {e}")))
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// Failed to initialize logging
    #[error("Failed to initialize logging: {0}")]
    Init(String),
    /// Failed to parse filter
    #[error("Failed to parse log filter: {0}")]
    FilterParse(String),
}

/// Identity of a single gateway call, recorded on its span
#[derive(Debug, Clone, Default)]
pub struct LogContext {
    /// Request ID
    pub request_id: Option<String>,
    /// Gateway operation
    pub operation: Option<String>,
    /// Caller user ID
    pub user_id: Option<String>,
    /// Caller session ID
    pub session_id: Option<String>,
}

impl LogContext {
    /// Create an empty context
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set request ID
    #[must_use]
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Set operation
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Set caller identity
    #[must_use]
    pub fn with_caller(mut self, user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self.session_id = Some(session_id.into());
        self
    }

    /// Open an `info` span carrying this context
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "gateway_call",
            request_id = self.request_id.as_deref().unwrap_or(""),
            operation = self.operation.as_deref().unwrap_or(""),
            user_id = self.user_id.as_deref().unwrap_or(""),
            session_id = self.session_id.as_deref().unwrap_or(""),
        )
    }
}
