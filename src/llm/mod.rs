// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Text generation backends for local quantized models

pub mod gguf;
pub mod ollama;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{AppConfig, Backend};
use crate::Result;

/// Sampling parameters for a single completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Maximum number of new tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    /// Generation stops at the first of these
    #[serde(default = "default_stop")]
    pub stop: Vec<String>,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_max_tokens() -> usize { 400 }
fn default_temperature() -> f64 { 0.7 }
fn default_top_p() -> f64 { 0.9 }
fn default_seed() -> u64 { 299_792_458 }

fn default_stop() -> Vec<String> {
    vec!["```".to_string(), "</s>".to_string()]
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            stop: default_stop(),
            seed: default_seed(),
        }
    }
}

/// A model that turns a prompt into text
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Name of this backend
    fn name(&self) -> &'static str;

    /// Verify the backend can serve requests
    async fn check(&self) -> Result<()>;

    /// Run one completion
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String>;
}

/// Build the generator selected by the configuration
pub fn build_generator(config: &AppConfig) -> Result<Box<dyn TextGenerator>> {
    match config.engine.backend {
        Backend::Gguf => Ok(Box::new(gguf::GgufGenerator::new(config.model.clone()))),
        Backend::Ollama => Ok(Box::new(ollama::OllamaClient::new(
            &config.engine.ollama_url,
            &config.engine.ollama_model,
            &config.model,
            config.engine.timeout_secs,
        )?)),
    }
}

/// Cut `text` at the earliest stop sequence
pub fn truncate_at_stop<'a>(text: &'a str, stop: &[String]) -> &'a str {
    let end = stop
        .iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| text.find(s.as_str()))
        .min()
        .unwrap_or(text.len());
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params() {
        let params = GenerationParams::default();
        assert_eq!(params.max_tokens, 400);
        assert_eq!(params.temperature, 0.7);
        assert_eq!(params.top_p, 0.9);
        assert_eq!(params.stop, vec!["```", "</s>"]);
    }

    #[test]
    fn test_truncate_at_earliest_stop() {
        let stop = default_stop();
        assert_eq!(truncate_at_stop("{\"a\": 1}</s>junk", &stop), "{\"a\": 1}");
        assert_eq!(truncate_at_stop("text ``` more </s>", &stop), "text ");
        assert_eq!(truncate_at_stop("no stop here", &stop), "no stop here");
    }

    #[test]
    fn test_truncate_ignores_empty_stop() {
        let stop = vec![String::new()];
        assert_eq!(truncate_at_stop("keep all", &stop), "keep all");
    }

    #[test]
    fn test_build_generator_selects_backend() {
        let mut config = AppConfig::default();
        assert_eq!(build_generator(&config).unwrap().name(), "gguf");

        config.engine.backend = Backend::Ollama;
        assert_eq!(build_generator(&config).unwrap().name(), "ollama");
    }
}
