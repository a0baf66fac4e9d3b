#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reasoning stage: turns per-city analytics and regional expansion
//! patterns into ranked, explained predictions.
//!
//! The orchestrator only sees the [`reasoning::ReasoningStage`] trait.
//! The LLM-backed implementation talks to Anthropic Claude, `OpenAI`, or
//! any `OpenAI`-compatible local/self-hosted server (Ollama, vLLM,
//! llama.cpp, LM Studio) via the `AI_BASE_URL` environment variable.

pub mod providers;
pub mod reasoning;

use thiserror::Error;

/// Errors that can occur during AI operations.
#[derive(Debug, Error)]
pub enum AiError {
    /// HTTP request to LLM provider failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Provider-specific error.
    #[error("Provider error: {message}")]
    Provider {
        /// HTTP status returned by the provider, if any.
        status: Option<u16>,
        /// Description of what went wrong.
        message: String,
    },

    /// The model answered, but not with usable predictions.
    #[error("Invalid reasoning response: {message}")]
    InvalidResponse {
        /// Description of what went wrong.
        message: String,
    },

    /// The provider did not answer in time.
    #[error("Timed out: {message}")]
    Timeout {
        /// Description.
        message: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Description.
        message: String,
    },
}

impl AiError {
    /// Returns `true` if asking again may succeed.
    ///
    /// Configuration problems and client errors other than 429 are
    /// permanent.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() || e.is_request()
            }
            Self::Provider { status, .. } => {
                status.is_none_or(|s| s == 429 || (500..600).contains(&s))
            }
            Self::Json(_) | Self::InvalidResponse { .. } | Self::Timeout { .. } => true,
            Self::Config { .. } => false,
        }
    }

    /// Returns `true` for errors caused by the provider not answering in
    /// time.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Http(e) => e.is_timeout(),
            _ => false,
        }
    }
}
