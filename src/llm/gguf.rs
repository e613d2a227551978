// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! In-process inference over a GGUF quantized model
//!
//! The model is loaded once per process on first use and shared by every
//! [`GgufGenerator`] afterwards. Loading and sampling are CPU bound, so both
//! run on tokio's blocking pool.

use async_trait::async_trait;
use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::quantized_llama::ModelWeights;
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use super::{truncate_at_stop, GenerationParams, TextGenerator};
use crate::config::ModelSettings;
use crate::{FeedbackError, Result};

static SHARED_MODEL: OnceCell<Arc<Mutex<LoadedModel>>> = OnceCell::new();

/// Weights, tokenizer and device of a loaded GGUF model
pub struct LoadedModel {
    weights: ModelWeights,
    tokenizer: Tokenizer,
    device: Device,
    path: PathBuf,
    eos_token: Option<u32>,
}

impl LoadedModel {
    /// Load the model described by `settings`
    ///
    /// Fails with [`FeedbackError::ModelNotFound`] before touching anything
    /// else when the model file is missing.
    pub fn load(settings: &ModelSettings) -> Result<Self> {
        let path = settings.resolved_path();
        if !path.exists() {
            return Err(FeedbackError::ModelNotFound(path));
        }

        let tokenizer_path = settings.resolved_tokenizer();
        if !tokenizer_path.exists() {
            return Err(FeedbackError::Config(format!(
                "Tokenizer not found at {:?}. Set LLAMA_TOKENIZER_PATH or place tokenizer.json next to the model.",
                tokenizer_path
            )));
        }

        let device = select_device(settings.gpu_layers);
        debug!(
            "Loading {:?} on {:?} with {} threads",
            path, device, settings.threads
        );

        let mut file = std::fs::File::open(&path)?;
        let content = gguf_file::Content::read(&mut file).map_err(|e| e.with_path(&path))?;
        info!("GGUF file has {} tensors", content.tensor_infos.len());

        let weights = ModelWeights::from_gguf(content, &mut file, &device)?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| FeedbackError::Inference(format!("Failed to load tokenizer: {}", e)))?;
        let eos_token = tokenizer.get_vocab(true).get("</s>").copied();

        Ok(Self {
            weights,
            tokenizer,
            device,
            path,
            eos_token,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sample a completion for `prompt`
    pub fn generate(&mut self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let prompt_tokens = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| FeedbackError::Inference(format!("Tokenization failed: {}", e)))?
            .get_ids()
            .to_vec();

        if prompt_tokens.is_empty() || params.max_tokens == 0 {
            return Ok(String::new());
        }

        let mut sampler =
            LogitsProcessor::new(params.seed, Some(params.temperature), Some(params.top_p));

        // index_pos 0 resets the kv cache left over from a previous call
        let input = Tensor::new(prompt_tokens.as_slice(), &self.device)?.unsqueeze(0)?;
        let logits = self.weights.forward(&input, 0)?.squeeze(0)?;
        let mut next = sampler.sample(&logits)?;

        let mut generated: Vec<u32> = Vec::with_capacity(params.max_tokens);
        let mut text = String::new();

        for index in 0..params.max_tokens {
            if Some(next) == self.eos_token {
                break;
            }
            generated.push(next);
            text = self.decode(&generated)?;

            let stopped = params
                .stop
                .iter()
                .any(|s| !s.is_empty() && text.contains(s.as_str()));
            if stopped || index + 1 == params.max_tokens {
                break;
            }

            let input = Tensor::new(&[next], &self.device)?.unsqueeze(0)?;
            let logits = self
                .weights
                .forward(&input, prompt_tokens.len() + index)?
                .squeeze(0)?;
            next = sampler.sample(&logits)?;
        }

        debug!(
            "Generated {} tokens from a {} token prompt",
            generated.len(),
            prompt_tokens.len()
        );

        Ok(truncate_at_stop(&text, &params.stop).to_string())
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(tokens, true)
            .map_err(|e| FeedbackError::Inference(format!("Detokenization failed: {}", e)))
    }
}

/// Accelerator when GPU layers are requested and available, CPU otherwise
fn select_device(gpu_layers: i32) -> Device {
    if gpu_layers == 0 {
        return Device::Cpu;
    }

    #[cfg(target_os = "macos")]
    let device = Device::new_metal(0);
    #[cfg(not(target_os = "macos"))]
    let device = Device::new_cuda(0);

    match device {
        Ok(d) => d,
        Err(e) => {
            warn!("GPU requested (gpu_layers={}) but unavailable: {}. Using CPU.", gpu_layers, e);
            Device::Cpu
        }
    }
}

/// The process-wide model, loading it on first call
pub fn shared_model(settings: &ModelSettings) -> Result<Arc<Mutex<LoadedModel>>> {
    let model = SHARED_MODEL.get_or_try_init(|| {
        info!("Loading GGUF model from {:?}", settings.resolved_path());
        LoadedModel::load(settings).map(|m| Arc::new(Mutex::new(m)))
    })?;
    Ok(Arc::clone(model))
}

/// Whether a model has been loaded in this process
pub fn is_loaded() -> bool {
    SHARED_MODEL.get().is_some()
}

/// Generator backed by the shared in-process model
pub struct GgufGenerator {
    settings: ModelSettings,
}

impl GgufGenerator {
    pub fn new(settings: ModelSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }
}

#[async_trait]
impl TextGenerator for GgufGenerator {
    fn name(&self) -> &'static str {
        "gguf"
    }

    async fn check(&self) -> Result<()> {
        let path = self.settings.resolved_path();
        if !path.exists() {
            return Err(FeedbackError::ModelNotFound(path));
        }
        let tokenizer = self.settings.resolved_tokenizer();
        if !tokenizer.exists() {
            return Err(FeedbackError::Config(format!(
                "Tokenizer not found at {:?}",
                tokenizer
            )));
        }
        Ok(())
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let settings = self.settings.clone();
        let prompt = prompt.to_string();
        let params = params.clone();

        tokio::task::spawn_blocking(move || {
            let model = shared_model(&settings)?;
            let mut guard = model
                .lock()
                .map_err(|_| FeedbackError::Inference("Model lock poisoned".to_string()))?;

            let requested = settings.resolved_path();
            if guard.path() != requested {
                warn!(
                    "Model {:?} already loaded; ignoring request for {:?}",
                    guard.path(),
                    requested
                );
            }

            guard.generate(&prompt, &params)
        })
        .await
        .map_err(|e| FeedbackError::Inference(format!("Generation task failed: {}", e)))?
    }
}
