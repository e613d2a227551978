// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Ollama API client for running the quantized model behind a local server

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{GenerationParams, TextGenerator};
use crate::config::ModelSettings;
use crate::{FeedbackError, Result};

/// Ollama API client
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    threads: usize,
    gpu_layers: i32,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    /// Send the prompt verbatim, no chat template
    raw: bool,
    options: GenerateOptions<'a>,
}

#[derive(Serialize)]
struct GenerateOptions<'a> {
    num_predict: usize,
    temperature: f64,
    top_p: f64,
    stop: &'a [String],
    seed: u64,
    num_thread: usize,
    num_gpu: i32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Deserialize)]
struct ModelInfo {
    name: String,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(
        base_url: &str,
        model: &str,
        settings: &ModelSettings,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: normalize_url(base_url),
            model: model.to_string(),
            threads: settings.threads,
            gpu_layers: settings.gpu_layers,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Check if Ollama is available
    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}/api/tags", self.base_url);

        self.client
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| {
                FeedbackError::OllamaUnavailable(format!(
                    "Cannot connect to Ollama at {}: {}",
                    self.base_url, e
                ))
            })?;

        Ok(())
    }

    /// List available models
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await?;

        let tags: TagsResponse = response.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Check if the configured model has been pulled
    pub async fn model_available(&self) -> Result<bool> {
        let models = self.list_models().await?;
        Ok(model_matches(&models, &self.model))
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn check(&self) -> Result<()> {
        self.health_check().await?;
        if !self.model_available().await? {
            return Err(FeedbackError::OllamaUnavailable(format!(
                "Model '{}' is not pulled. Try: ollama pull {}",
                self.model, self.model
            )));
        }
        Ok(())
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            raw: true,
            options: GenerateOptions {
                num_predict: params.max_tokens,
                temperature: params.temperature,
                top_p: params.top_p,
                stop: &params.stop,
                seed: params.seed,
                num_thread: self.threads,
                num_gpu: self.gpu_layers,
            },
        };

        debug!("Sending request to Ollama: model={}", self.model);

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(FeedbackError::OllamaUnavailable(format!(
                "Ollama returned status {}",
                response.status()
            )));
        }

        let result: GenerateResponse = response.json().await?;
        Ok(result.response)
    }
}

fn normalize_url(base_url: &str) -> String {
    base_url
        .trim_end_matches('/')
        .replace("/api/generate", "")
        .replace("/api/chat", "")
}

fn model_matches(models: &[String], wanted: &str) -> bool {
    models
        .iter()
        .any(|m| m == wanted || m == &format!("{}:latest", wanted) || m.starts_with(wanted))
}
