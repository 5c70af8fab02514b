//! Streaming research types.
//!
//! A streaming research call yields a finite sequence of text chunks as the
//! upstream produces them.

use serde::{Deserialize, Serialize};

/// One chunk of a streamed research report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchChunk {
    /// Zero-based position of this chunk in the stream
    pub index: u64,
    /// Chunk payload as sent by the upstream
    pub chunk: String,
}

impl ResearchChunk {
    /// Create a chunk
    #[must_use]
    pub fn new(index: u64, chunk: impl Into<String>) -> Self {
        Self {
            index,
            chunk: chunk.into(),
        }
    }

    /// Convert to SSE data format
    #[must_use]
    pub fn to_sse_data(&self) -> String {
        format!(
            "data: {}\n\n",
            serde_json::to_string(self).unwrap_or_default()
        )
    }
}
