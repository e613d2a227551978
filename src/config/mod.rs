// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for auto-feedback
//!
//! Values come from three layers: built-in defaults, an optional JSON file,
//! and the `LLAMA_*` / `FEEDBACK_*` environment variables, which win.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::llm::GenerationParams;
use crate::{FeedbackError, Result};

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    /// Inference backend settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// GGUF model settings
    #[serde(default)]
    pub model: ModelSettings,

    /// Sampling parameters for feedback generation
    #[serde(default)]
    pub generation: GenerationParams,

    /// Project scaffolder settings
    #[serde(default)]
    pub scaffold: ScaffoldConfig,
}

/// Which runtime executes the model
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-process GGUF inference
    #[default]
    Gguf,
    /// A local Ollama server
    Ollama,
}

impl FromStr for Backend {
    type Err = FeedbackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "gguf" | "local" => Ok(Self::Gguf),
            "ollama" => Ok(Self::Ollama),
            other => Err(FeedbackError::Config(format!("Unknown backend '{}'", other))),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gguf => write!(f, "gguf"),
            Self::Ollama => write!(f, "ollama"),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EngineConfig {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,
    #[serde(default = "default_ollama_model")]
    pub ollama_model: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Where the GGUF model lives and how to run it
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelSettings {
    #[serde(default = "default_model_path")]
    pub path: PathBuf,
    /// Defaults to `tokenizer.json` next to the model file
    #[serde(default)]
    pub tokenizer: Option<PathBuf>,
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Any non-zero value moves the model onto an accelerator when one
    /// exists; `-1` is the usual spelling of "all layers"
    #[serde(default)]
    pub gpu_layers: i32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScaffoldConfig {
    #[serde(default = "default_scaffold_root")]
    pub root: PathBuf,
}

// Default value functions
fn default_ollama_url() -> String { "http://localhost:11434".to_string() }
fn default_ollama_model() -> String { "mistral:7b-instruct-v0.2-q2_K".to_string() }
fn default_timeout() -> u64 { 120 }
fn default_model_path() -> PathBuf { PathBuf::from("../agents/mistral-7b-instruct-v0.2.Q2_K.gguf") }
fn default_scaffold_root() -> PathBuf { PathBuf::from("./auto_feedback_agent") }

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            ollama_url: default_ollama_url(),
            ollama_model: default_ollama_model(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            tokenizer: None,
            threads: default_threads(),
            gpu_layers: 0,
        }
    }
}

impl Default for ScaffoldConfig {
    fn default() -> Self {
        Self {
            root: default_scaffold_root(),
        }
    }
}

impl ModelSettings {
    /// Model path with a leading `~` resolved to the home directory
    pub fn resolved_path(&self) -> PathBuf {
        expand_home(&self.path)
    }

    /// Tokenizer path, falling back to `tokenizer.json` beside the model
    pub fn resolved_tokenizer(&self) -> PathBuf {
        match &self.tokenizer {
            Some(p) => expand_home(p),
            None => self
                .resolved_path()
                .parent()
                .map(|dir| dir.join("tokenizer.json"))
                .unwrap_or_else(|| PathBuf::from("tokenizer.json")),
        }
    }
}

/// Resolve a leading `~` against the user's home directory
pub fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| FeedbackError::Config(format!("Failed to parse config: {}", e)))?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Overlay environment variables read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("LLAMA_MODEL_PATH") {
            self.model.path = PathBuf::from(path);
        }
        if let Some(path) = lookup("LLAMA_TOKENIZER_PATH") {
            self.model.tokenizer = Some(PathBuf::from(path));
        }
        if let Some(threads) = lookup("LLAMA_THREADS") {
            self.model.threads = parse_env("LLAMA_THREADS", &threads)?;
        }
        if let Some(layers) = lookup("LLAMA_GPU_LAYERS") {
            self.model.gpu_layers = parse_env("LLAMA_GPU_LAYERS", &layers)?;
        }
        if let Some(backend) = lookup("FEEDBACK_BACKEND") {
            self.engine.backend = backend.parse()?;
        }
        if let Some(url) = lookup("OLLAMA_URL") {
            self.engine.ollama_url = url;
        }
        Ok(())
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.model.threads == 0 {
            return Err(FeedbackError::Config("Thread count must be at least 1".to_string()));
        }
        if self.generation.max_tokens == 0 {
            return Err(FeedbackError::Config("max_tokens must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.generation.top_p) {
            return Err(FeedbackError::Config("top_p must be within 0.0-1.0".to_string()));
        }
        if self.generation.temperature < 0.0 {
            return Err(FeedbackError::Config("temperature cannot be negative".to_string()));
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        FeedbackError::Config(format!("{} must be an integer, got '{}'", key, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(
            config.model.path,
            PathBuf::from("../agents/mistral-7b-instruct-v0.2.Q2_K.gguf")
        );
        assert_eq!(config.model.gpu_layers, 0);
        assert!(config.model.threads >= 1);
        assert_eq!(config.engine.backend, Backend::Gguf);
        assert_eq!(config.generation.max_tokens, 400);
        assert_eq!(config.scaffold.root, PathBuf::from("./auto_feedback_agent"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_env(lookup_from(&[
                ("LLAMA_MODEL_PATH", "/models/m.gguf"),
                ("LLAMA_THREADS", "6"),
                ("LLAMA_GPU_LAYERS", "35"),
                ("FEEDBACK_BACKEND", "ollama"),
            ]))
            .unwrap();

        assert_eq!(config.model.path, PathBuf::from("/models/m.gguf"));
        assert_eq!(config.model.threads, 6);
        assert_eq!(config.model.gpu_layers, 35);
        assert_eq!(config.engine.backend, Backend::Ollama);
    }

    #[test]
    fn test_env_accepts_all_gpu_layers() {
        let mut config = AppConfig::default();
        config
            .apply_env(lookup_from(&[("LLAMA_GPU_LAYERS", "-1")]))
            .unwrap();
        assert_eq!(config.model.gpu_layers, -1);
    }

    #[test]
    fn test_env_rejects_garbage() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(lookup_from(&[("LLAMA_THREADS", "lots")]))
            .unwrap_err();
        assert!(matches!(err, FeedbackError::Config(_)));
    }

    #[test]
    fn test_tokenizer_defaults_next_to_model() {
        let settings = ModelSettings {
            path: PathBuf::from("/models/mistral.gguf"),
            ..ModelSettings::default()
        };
        assert_eq!(settings.resolved_tokenizer(), PathBuf::from("/models/tokenizer.json"));
    }

    #[test]
    fn test_expand_home() {
        let plain = Path::new("/abs/model.gguf");
        assert_eq!(expand_home(plain), PathBuf::from("/abs/model.gguf"));

        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home(Path::new("~/m.gguf")), home.join("m.gguf"));
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback.json");

        let mut config = AppConfig::default();
        config.model.gpu_layers = 12;
        config.engine.backend = Backend::Ollama;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.model.gpu_layers, 12);
        assert_eq!(loaded.engine.backend, Backend::Ollama);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback.json");
        std::fs::write(&path, r#"{"model": {"path": "x.gguf"}}"#).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.model.path, PathBuf::from("x.gguf"));
        assert_eq!(loaded.generation.top_p, 0.9);
        assert_eq!(loaded.engine.ollama_url, "http://localhost:11434");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let loaded = AppConfig::load(Path::new("/nonexistent/feedback.json")).unwrap();
        assert_eq!(loaded.model.gpu_layers, 0);
    }
}
