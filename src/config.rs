//! Tunable parameters of the retrieval pipeline.
//!
//! Every knob has a documented default; the CLI exposes each one as a flag
//! with an environment variable fallback and resolves them into a
//! [`RagConfig`] before any model is loaded.

use std::time::Duration;

use crate::error::{Error, Result};

/// Number of non-empty lines grouped into one chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// Number of chunks retrieved per query.
pub const DEFAULT_TOP_K: usize = 6;

/// Number of past exchanges injected into the QA context.
pub const DEFAULT_CONTEXT_TURNS: usize = 3;

/// Number of past exchanges returned to clients as chat history.
pub const DEFAULT_HISTORY_TURNS: usize = 5;

/// Upper bound on a single query embedding call.
pub const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on a single QA model invocation.
pub const DEFAULT_QA_TIMEOUT: Duration = Duration::from_secs(60);

/// Number of chunks embedded per model call while building the corpus.
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 32;

/// Address the HTTP API listens on.
pub const DEFAULT_BIND: &str = "127.0.0.1:5000";

/// Pipeline configuration shared by corpus construction and answering.
///
/// # Examples
///
/// ```
/// use docqa::config::RagConfig;
///
/// let config = RagConfig::default();
/// assert_eq!(config.chunk_size, 10);
/// assert_eq!(config.top_k, 6);
/// assert_eq!(config.memory_capacity(), 5);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct RagConfig {
    pub chunk_size: usize,
    pub top_k: usize,
    pub context_turns: usize,
    pub history_turns: usize,
    pub embed_timeout: Duration,
    pub qa_timeout: Duration,
    pub embed_batch_size: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            top_k: DEFAULT_TOP_K,
            context_turns: DEFAULT_CONTEXT_TURNS,
            history_turns: DEFAULT_HISTORY_TURNS,
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
            qa_timeout: DEFAULT_QA_TIMEOUT,
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
        }
    }
}

impl RagConfig {
    /// Reject settings that would make the pipeline degenerate.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("chunk size", self.chunk_size),
            ("top-k", self.top_k),
            ("history turns", self.history_turns),
            ("embedding batch size", self.embed_batch_size),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(Error::Config(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        if self.embed_timeout.is_zero() || self.qa_timeout.is_zero() {
            return Err(Error::Config(
                "model call timeouts must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Capacity of the conversation ring buffer: large enough to serve
    /// both the context window and the history window.
    pub fn memory_capacity(&self) -> usize {
        self.context_turns.max(self.history_turns).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RagConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.context_turns, 3);
        assert_eq!(config.history_turns, 5);
        assert_eq!(config.embed_timeout, Duration::from_secs(30));
        assert_eq!(config.qa_timeout, Duration::from_secs(60));
    }

    #[test]
    fn zero_top_k_is_rejected() {
        let config = RagConfig {
            top_k: 0,
            ..RagConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("top-k"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = RagConfig {
            qa_timeout: Duration::ZERO,
            ..RagConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_context_turns_is_allowed() {
        let config = RagConfig {
            context_turns: 0,
            ..RagConfig::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.memory_capacity(), 5);
    }

    #[test]
    fn memory_capacity_covers_larger_window() {
        let config = RagConfig {
            context_turns: 8,
            ..RagConfig::default()
        };
        assert_eq!(config.memory_capacity(), 8);
    }
}
