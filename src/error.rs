// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for auto-feedback

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for auto-feedback operations
pub type Result<T> = std::result::Result<T, FeedbackError>;

/// auto-feedback error types
#[derive(Error, Debug)]
pub enum FeedbackError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("Model not found at {}. Set LLAMA_MODEL_PATH env or download a GGUF file.", .0.display())]
    ModelNotFound(PathBuf),

    #[error("Model error: {0}")]
    Model(#[from] candle_core::Error),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("API error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("Ollama not available: {0}")]
    OllamaUnavailable(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Essay text is empty")]
    EmptyEssay,

    #[error("Invalid manifest path: {0}")]
    InvalidManifest(String),
}
