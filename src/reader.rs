//! Local extractive QA with an XLM-RoBERTa question-answering checkpoint.
//!
//! Long contexts are split into overlapping windows of at most
//! `MAX_SEQUENCE_TOKENS` tokens (question included) that advance by
//! `DOC_STRIDE` tokens of overlap. Every window is scored and the best span
//! across all windows wins.

use std::sync::{Mutex, MutexGuard};

use candle_core::{Device, Tensor};
use candle_nn::{Linear, Module};
use candle_transformers::models::xlm_roberta::XLMRobertaModel;
use tokenizers::{Encoding, Tokenizer, TruncationParams, TruncationStrategy};
use tracing::{debug, info};

use crate::{
    error::{Error, Result},
    model_manager::{ModelFiles, default_device, tokenizer_error},
    qa::{DEFAULT_MAX_ANSWER_TOKENS, QaAnswer, QaModel, SpanCandidate, best_span},
};

pub const DEFAULT_QA_MODEL_ID: &str = "deepset/xlm-roberta-base-squad2";
pub const QA_MODEL_ENV_VAR: &str = "DOCQA_QA_MODEL";

const MAX_SEQUENCE_TOKENS: usize = 384;
const DOC_STRIDE: usize = 128;

struct LoadedReader {
    model: XLMRobertaModel,
    qa_outputs: Linear,
    tokenizer: Tokenizer,
    device: Device,
}

impl LoadedReader {
    fn load(model_id: &str) -> Result<Self> {
        let device = default_device();
        let files = ModelFiles::resolve(model_id)?;
        let config = files.load_config()?;

        let mut tokenizer = files.load_tokenizer()?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQUENCE_TOKENS,
                strategy: TruncationStrategy::OnlySecond,
                stride: DOC_STRIDE,
                ..TruncationParams::default()
            }))
            .map_err(tokenizer_error)?;
        tokenizer.with_padding(None);

        let vb = files.var_builder(&device)?;
        let model = XLMRobertaModel::new(&config, vb.pp("roberta"))?;
        let qa_outputs =
            candle_nn::linear(config.hidden_size, 2, vb.pp("qa_outputs"))?;

        Ok(Self {
            model,
            qa_outputs,
            tokenizer,
            device,
        })
    }

    fn logits(&self, window: &Encoding) -> Result<(Vec<f32>, Vec<f32>)> {
        let input_ids =
            Tensor::new(window.get_ids(), &self.device)?.unsqueeze(0)?;
        let attention_mask =
            Tensor::new(window.get_attention_mask(), &self.device)?
                .unsqueeze(0)?;
        let token_type_ids = input_ids.zeros_like()?;

        let hidden = self.model.forward(
            &input_ids,
            &attention_mask,
            &token_type_ids,
            None,
            None,
            None,
        )?;

        // [1, seq, 2] -> [seq, 2]
        let logits = self.qa_outputs.forward(&hidden)?.squeeze(0)?;
        let start = logits.narrow(1, 0, 1)?.squeeze(1)?.to_vec1::<f32>()?;
        let end = logits.narrow(1, 1, 1)?.squeeze(1)?.to_vec1::<f32>()?;
        Ok((start, end))
    }

    fn answer(&self, question: &str, context: &str) -> Result<QaAnswer> {
        let mut encoding = self
            .tokenizer
            .encode((question, context), true)
            .map_err(tokenizer_error)?;
        let overflow = encoding.take_overflowing();
        let windows: Vec<Encoding> =
            std::iter::once(encoding).chain(overflow).collect();
        debug!(windows = windows.len(), "scoring context windows");

        let mut best: Option<(SpanCandidate, usize, usize)> = None;
        for window in &windows {
            let allowed: Vec<bool> = window
                .get_sequence_ids()
                .iter()
                .map(|seq| *seq == Some(1))
                .collect();
            if !allowed.contains(&true) {
                continue;
            }

            let (start_logits, end_logits) = self.logits(window)?;
            let Some(span) = best_span(
                &start_logits,
                &end_logits,
                &allowed,
                DEFAULT_MAX_ANSWER_TOKENS,
            ) else {
                continue;
            };

            if best.is_none_or(|(b, _, _)| span.score > b.score) {
                let offsets = window.get_offsets();
                best = Some((span, offsets[span.start].0, offsets[span.end].1));
            }
        }

        let (span, start, end) = best.ok_or_else(|| {
            Error::Inference("no answer span found in context".to_string())
        })?;
        let answer = context.get(start..end).ok_or_else(|| {
            Error::Inference(format!(
                "answer offsets {start}..{end} fall outside the context"
            ))
        })?;

        Ok(QaAnswer {
            answer: answer.to_string(),
            score: span.score,
            start,
            end,
        })
    }
}

/// Extractive QA model running in-process, loaded lazily on first use.
pub struct ExtractiveReader {
    model: Mutex<Option<LoadedReader>>,
    model_id: String,
}

impl Default for ExtractiveReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractiveReader {
    /// Resolves the model ID from `DOCQA_QA_MODEL`, falling back to
    /// `deepset/xlm-roberta-base-squad2`.
    pub fn new() -> Self {
        let model_id = std::env::var(QA_MODEL_ENV_VAR)
            .unwrap_or_else(|_| DEFAULT_QA_MODEL_ID.to_string());
        Self::with_model_id(model_id)
    }

    pub fn with_model_id(model_id: String) -> Self {
        Self {
            model: Mutex::new(None),
            model_id,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn is_loaded(&self) -> bool {
        self.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// Load the model now instead of on the first question.
    pub fn preload(&self) -> Result<()> {
        self.with_model(|_| Ok(()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<LoadedReader>>> {
        self.model
            .lock()
            .map_err(|_| Error::Inference("model lock poisoned".to_string()))
    }

    fn with_model<R>(
        &self,
        f: impl FnOnce(&LoadedReader) -> Result<R>,
    ) -> Result<R> {
        let mut slot = self.lock()?;
        if slot.is_none() {
            info!(model = %self.model_id, "loading QA model");
            *slot = Some(LoadedReader::load(&self.model_id)?);
        }
        match slot.as_ref() {
            Some(model) => f(model),
            None => Err(Error::Inference("model not loaded".to_string())),
        }
    }
}

impl QaModel for ExtractiveReader {
    fn infer(&self, question: &str, context: &str) -> Result<QaAnswer> {
        if context.trim().is_empty() {
            return Err(Error::Inference("context is empty".to_string()));
        }
        self.with_model(|model| model.answer(question, context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_model_id_is_not_loaded() {
        let reader = ExtractiveReader::with_model_id("custom/qa".to_string());
        assert_eq!(reader.model_id(), "custom/qa");
        assert!(!reader.is_loaded());
    }

    #[test]
    fn empty_context_fails_without_loading() {
        let reader = ExtractiveReader::with_model_id("custom/qa".to_string());
        let err = reader.infer("question?", " \n ").unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
        assert!(!reader.is_loaded());
    }

    #[test]
    #[ignore = "downloads the QA model"]
    fn answers_from_context() {
        let reader = ExtractiveReader::new();
        let answer = reader
            .infer(
                "What is the capital of France?",
                "Paris is the capital and largest city of France.",
            )
            .unwrap();
        assert_eq!(answer.answer, "Paris");
    }
}
