//! Local BERT encoder using candle + tokenizers.

use super::encoder::Encoder;
use crate::error::{EvalError, Result};
use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use hf_hub::{Repo, RepoType, api::sync::Api};
use std::fmt::Display;
use std::path::Path;
use tokenizers::Tokenizer;

fn embed_err(context: &str, err: impl Display) -> EvalError {
    EvalError::Embedding(format!("{}: {}", context, err))
}

/// BERT-family encoder that embeds a window as its `[CLS]` hidden state.
pub struct BertEncoder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    cls_id: u32,
    sep_id: u32,
    /// Content tokens that fit alongside `[CLS]` and `[SEP]`.
    max_content: usize,
    budget: usize,
}

impl BertEncoder {
    /// Load a BERT model by Hugging Face Hub name.
    ///
    /// The repository must ship `config.json` and `tokenizer.json`, plus
    /// either `model.safetensors` or `pytorch_model.bin`.
    pub fn load(model_id: &str, budget: usize) -> Result<Self> {
        let device = Device::Cpu;

        let api = Api::new().map_err(|e| embed_err("Failed to create HF Hub API", e))?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

        let config_path = repo
            .get("config.json")
            .map_err(|e| embed_err("Failed to get config.json", e))?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .map_err(|e| embed_err("Failed to get tokenizer.json", e))?;
        let weights_path = repo
            .get("model.safetensors")
            .or_else(|_| repo.get("pytorch_model.bin"))
            .map_err(|e| embed_err("Failed to get model weights", e))?;

        let config_text =
            std::fs::read_to_string(&config_path).map_err(|e| EvalError::io(&config_path, e))?;
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| embed_err("Failed to load tokenizer", e))?;
        let vb = load_weights(&weights_path, &device)?;

        Self::from_parts(vb, &config_text, tokenizer, budget)
    }

    /// Assemble an encoder from weights, a `config.json` body and a tokenizer.
    ///
    /// Padding and truncation stored in the tokenizer are removed so that
    /// `tokenize` returns every token of the text.
    pub fn from_parts(
        vb: VarBuilder<'_>,
        config_text: &str,
        mut tokenizer: Tokenizer,
        budget: usize,
    ) -> Result<Self> {
        let device = vb.device().clone();

        let config: BertConfig = serde_json::from_str(config_text)
            .map_err(|e| embed_err("Failed to parse config", e))?;
        let max_positions = serde_json::from_str::<serde_json::Value>(config_text)?
            .get("max_position_embeddings")
            .and_then(|v| v.as_u64())
            .unwrap_or(512) as usize;

        tokenizer
            .with_padding(None)
            .with_truncation(None)
            .map_err(|e| embed_err("Failed to reset tokenizer truncation", e))?;
        let cls_id = special_token(&tokenizer, &["[CLS]", "<s>"])?;
        let sep_id = special_token(&tokenizer, &["[SEP]", "</s>"])?;

        let model = BertModel::load(vb, &config).map_err(|e| embed_err("Failed to load BERT model", e))?;

        let max_content = max_positions.saturating_sub(2).max(1);

        Ok(Self {
            model,
            tokenizer,
            device,
            cls_id,
            sep_id,
            max_content,
            // Windows must fit next to [CLS] and [SEP].
            budget: budget.min(max_content),
        })
    }
}

fn load_weights(path: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let is_pth = path.extension().and_then(|e| e.to_str()) == Some("bin");
    if is_pth {
        VarBuilder::from_pth(path, DTYPE, device).map_err(|e| embed_err("Failed to load model weights", e))
    } else {
        unsafe {
            VarBuilder::from_mmaped_safetensors(&[path], DTYPE, device)
                .map_err(|e| embed_err("Failed to load model weights", e))
        }
    }
}

fn special_token(tokenizer: &Tokenizer, candidates: &[&str]) -> Result<u32> {
    candidates
        .iter()
        .find_map(|t| tokenizer.token_to_id(t))
        .ok_or_else(|| {
            EvalError::Embedding(format!("tokenizer has none of {:?}", candidates))
        })
}

impl Encoder for BertEncoder {
    fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| embed_err("Tokenization failed", e))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn encode(&self, tokens: &[u32]) -> Result<Vec<f32>> {
        // Only reachable when called directly with an oversized window.
        let content = &tokens[..tokens.len().min(self.max_content)];

        let mut ids = Vec::with_capacity(content.len() + 2);
        ids.push(self.cls_id);
        ids.extend_from_slice(content);
        ids.push(self.sep_id);
        let len = ids.len();

        let run = || -> candle_core::Result<Vec<f32>> {
            let input_ids = Tensor::from_vec(ids.clone(), (1, len), &self.device)?;
            let token_type_ids = Tensor::zeros((1, len), DType::U32, &self.device)?;
            let attention_mask = Tensor::ones((1, len), DType::U32, &self.device)?;

            let output = self
                .model
                .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

            output.i((0, 0))?.to_dtype(DType::F32)?.to_vec1::<f32>()
        };

        run().map_err(|e| embed_err("Encoding failed", e))
    }

    fn token_budget(&self) -> usize {
        self.budget
    }
}
