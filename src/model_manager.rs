use std::{
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config, XLMRobertaModel};
use tokenizers::{
    PaddingParams,
    PaddingStrategy,
    Tokenizer,
    TruncationParams,
    TruncationStrategy,
};
use tracing::info;

use crate::{
    embedding::{Embedder, normalize},
    error::{Error, Result},
};

pub const DEFAULT_MODEL_ID: &str = "intfloat/multilingual-e5-large";
pub const MODEL_ENV_VAR: &str = "DOCQA_MODEL";

/// Longest input the encoder accepts, in tokens.
const MAX_SEQUENCE_TOKENS: usize = 512;

/// Select the best available compute device.
///
/// Uses CUDA when compiled with the `cuda` feature, Metal when compiled with
/// the `metal` feature, and falls back to CPU otherwise.
pub(crate) fn default_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            return device;
        }
    }

    #[cfg(feature = "metal")]
    {
        if let Ok(device) = Device::new_metal(0) {
            return device;
        }
    }

    Device::Cpu
}

/// Paths of the files needed to instantiate a transformer checkpoint.
#[derive(Debug, Clone)]
pub(crate) struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
}

impl ModelFiles {
    /// Locate model files in a local directory, or download them from the
    /// Hugging Face Hub when `model_id` is not a directory.
    ///
    /// Safetensors weights are preferred; PyTorch pickles are the fallback.
    pub fn resolve(model_id: &str) -> Result<Self> {
        let local = Path::new(model_id);
        if local.is_dir() {
            return Self::from_dir(local);
        }

        let api = hf_hub::api::sync::Api::new()?;
        let repo = api.model(model_id.to_string());
        let config = repo.get("config.json")?;
        let tokenizer = repo.get("tokenizer.json")?;
        let weights = match repo.get("model.safetensors") {
            Ok(path) => path,
            Err(_) => repo.get("pytorch_model.bin")?,
        };

        Ok(Self {
            config,
            tokenizer,
            weights,
        })
    }

    fn from_dir(dir: &Path) -> Result<Self> {
        let require = |name: &str| -> Result<PathBuf> {
            let path = dir.join(name);
            if path.is_file() {
                Ok(path)
            } else {
                Err(Error::Model(format!(
                    "missing {name} in model directory {}",
                    dir.display()
                )))
            }
        };

        let weights = require("model.safetensors")
            .or_else(|_| require("pytorch_model.bin"))?;

        Ok(Self {
            config: require("config.json")?,
            tokenizer: require("tokenizer.json")?,
            weights,
        })
    }

    pub fn load_config(&self) -> Result<Config> {
        let contents = std::fs::read_to_string(&self.config)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn load_tokenizer(&self) -> Result<Tokenizer> {
        Tokenizer::from_file(&self.tokenizer).map_err(|e| {
            Error::Model(format!(
                "failed to load tokenizer {}: {e}",
                self.tokenizer.display()
            ))
        })
    }

    pub fn var_builder(&self, device: &Device) -> Result<VarBuilder<'static>> {
        let is_safetensors = self
            .weights
            .extension()
            .is_some_and(|ext| ext == "safetensors");

        let vb = if is_safetensors {
            // SAFETY: the weights file is not modified while mapped.
            unsafe {
                VarBuilder::from_mmaped_safetensors(
                    &[&self.weights],
                    DType::F32,
                    device,
                )?
            }
        } else {
            VarBuilder::from_pth(&self.weights, DType::F32, device)?
        };
        Ok(vb)
    }
}

pub(crate) fn tokenizer_error(e: impl std::fmt::Display) -> Error {
    Error::Model(format!("tokenization failed: {e}"))
}

/// Batch-longest padding with the checkpoint's pad token.
///
/// The token string is looked up in the vocabulary; XLM-RoBERTa's `<pad>`
/// is used when the id is unknown.
fn padding_params(tokenizer: &Tokenizer, pad_id: u32) -> PaddingParams {
    let pad_token = tokenizer
        .id_to_token(pad_id)
        .unwrap_or_else(|| "<pad>".to_string());
    PaddingParams {
        strategy: PaddingStrategy::BatchLongest,
        pad_id,
        pad_token,
        ..PaddingParams::default()
    }
}

struct LoadedEncoder {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl LoadedEncoder {
    fn load(model_id: &str) -> Result<Self> {
        let device = default_device();
        let files = ModelFiles::resolve(model_id)?;
        let config = files.load_config()?;

        let mut tokenizer = files.load_tokenizer()?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQUENCE_TOKENS,
                strategy: TruncationStrategy::LongestFirst,
                ..TruncationParams::default()
            }))
            .map_err(tokenizer_error)?;
        let padding = padding_params(&tokenizer, config.pad_token_id);
        tokenizer.with_padding(Some(padding));

        let model = XLMRobertaModel::new(&config, files.var_builder(&device)?)?;

        Ok(Self {
            model,
            tokenizer,
            device,
        })
    }

    /// Mean-pool the last hidden state over real tokens, then normalize.
    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(tokenizer_error)?;

        let batch = encodings.len();
        let seq_len = encodings.first().map_or(0, |e| e.len());
        let mut ids = Vec::with_capacity(batch * seq_len);
        let mut mask = Vec::with_capacity(batch * seq_len);
        for encoding in &encodings {
            ids.extend_from_slice(encoding.get_ids());
            mask.extend_from_slice(encoding.get_attention_mask());
        }

        let input_ids = Tensor::from_vec(ids, (batch, seq_len), &self.device)?;
        let attention_mask =
            Tensor::from_vec(mask, (batch, seq_len), &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;

        let hidden = self.model.forward(
            &input_ids,
            &attention_mask,
            &token_type_ids,
            None,
            None,
            None,
        )?;

        let weights = attention_mask.to_dtype(DType::F32)?.unsqueeze(2)?;
        let summed = hidden.broadcast_mul(&weights)?.sum(1)?;
        let counts = weights.sum(1)?.clamp(1e-9f32, f32::MAX)?;
        let pooled = summed.broadcast_div(&counts)?;

        let mut vectors = pooled.to_vec2::<f32>()?;
        vectors.iter_mut().for_each(|v| normalize(v));
        Ok(vectors)
    }
}

/// Manages the sentence-embedding model lifecycle, supporting lazy loading
/// on first use.
///
/// The encoder is an XLM-RoBERTa checkpoint (multilingual E5 by default);
/// each text is mean-pooled into one L2-normalized vector.
pub struct ModelManager {
    model: Mutex<Option<LoadedEncoder>>,
    model_id: String,
}

impl Default for ModelManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelManager {
    /// Creates a new `ModelManager`. The model ID is resolved from:
    /// 1. The `DOCQA_MODEL` environment variable, if set
    /// 2. Otherwise, the default model (`intfloat/multilingual-e5-large`)
    ///
    /// The model is not loaded until the first call to `embed` or `preload`.
    pub fn new() -> Self {
        let model_id = std::env::var(MODEL_ENV_VAR)
            .unwrap_or_else(|_| DEFAULT_MODEL_ID.to_string());
        Self::with_model_id(model_id)
    }

    /// Creates a `ModelManager` with an explicit model ID or local model
    /// directory, bypassing environment variable resolution.
    pub fn with_model_id(model_id: String) -> Self {
        Self {
            model: Mutex::new(None),
            model_id,
        }
    }

    /// Returns the model ID that will be (or has been) loaded.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Returns `true` if the model has already been loaded into memory.
    pub fn is_loaded(&self) -> bool {
        self.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// Load the model now instead of on first use.
    pub fn preload(&self) -> Result<()> {
        self.with_model(|_| Ok(()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<LoadedEncoder>>> {
        self.model
            .lock()
            .map_err(|_| Error::Embedding("model lock poisoned".to_string()))
    }

    /// Ensures the model is loaded, downloading from HuggingFace Hub if
    /// needed, and runs `f` with exclusive access to it.
    fn with_model<R>(
        &self,
        f: impl FnOnce(&LoadedEncoder) -> Result<R>,
    ) -> Result<R> {
        let mut slot = self.lock()?;
        if slot.is_none() {
            info!(model = %self.model_id, "loading embedding model");
            *slot = Some(LoadedEncoder::load(&self.model_id)?);
        }
        match slot.as_ref() {
            Some(model) => f(model),
            None => Err(Error::Embedding("model not loaded".to_string())),
        }
    }
}

impl Embedder for ModelManager {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.with_model(|model| model.encode(texts))
    }
}
