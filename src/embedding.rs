//! # Embedding provider
//!
//! Turns lyric text into fixed-length vectors. The rest of the crate sees only
//! the [`Embedder`] trait; [`MiniLmEmbedder`] runs
//! `sentence-transformers/all-MiniLM-L6-v2` through Candle (pure Rust, no
//! Python) and yields L2-normalized 384-d vectors.
//!
//! Model files are fetched from the Hugging Face Hub on first use and cached by
//! `hf-hub` afterwards.

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::{Repo, RepoType, api::sync::Api};
use rayon::prelude::*;
use tokenizers::Tokenizer;
use tracing::info;

use crate::error::{LyricRecError, Result};

/// Opaque `text -> vector[D]` capability.
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder produces.
    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts; row `i` of the output belongs to `texts[i]`.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Sentence embeddings model using Candle (pure Rust)
pub struct MiniLmEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimension: usize,
}

impl MiniLmEmbedder {
    /// Load `model_id` from the Hugging Face Hub.
    pub fn load(model_id: &str) -> Result<Self> {
        let device = Device::Cpu;
        let repo = Repo::with_revision(model_id.to_string(), RepoType::Model, "main".to_string());
        let api = Api::new().map_err(LyricRecError::embedder)?;
        let api_repo = api.repo(repo);

        let config_filename = api_repo.get("config.json").map_err(LyricRecError::embedder)?;
        let tokenizer_filename = api_repo
            .get("tokenizer.json")
            .map_err(LyricRecError::embedder)?;
        let weights_filename = api_repo
            .get("model.safetensors")
            .map_err(LyricRecError::embedder)?;

        let config = std::fs::read_to_string(config_filename)?;
        let raw: serde_json::Value = serde_json::from_str(&config)
            .map_err(|e| LyricRecError::embedder(format!("model config: {e}")))?;
        let dimension = raw["hidden_size"]
            .as_u64()
            .ok_or_else(|| LyricRecError::embedder("model config has no hidden_size"))?
            as usize;
        let config: Config = serde_json::from_value(raw)
            .map_err(|e| LyricRecError::embedder(format!("model config: {e}")))?;

        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| LyricRecError::embedder(format!("Failed to load tokenizer: {e}")))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_filename], DTYPE, &device)
                .map_err(LyricRecError::embedder)?
        };
        let model = BertModel::load(vb, &config).map_err(LyricRecError::embedder)?;
        info!("Loaded embedding model {} ({}-d)", model_id, dimension);

        Ok(Self {
            model,
            tokenizer,
            device,
            dimension,
        })
    }

    fn encode(&self, text: &str) -> candle_core::Result<Vec<f32>> {
        // Truncation at 512 tokens is configured in tokenizer.json.
        let tokens = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| candle_core::Error::Msg(format!("Tokenization error: {e}")))?;

        let token_ids = Tensor::new(tokens.get_ids(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(tokens.get_type_ids(), &self.device)?.unsqueeze(0)?;

        let output = self.model.forward(&token_ids, &token_type_ids, None)?;
        let embedding = self.mean_pooling(&output, tokens.get_attention_mask())?;
        self.normalize(&embedding)?.to_vec1::<f32>()
    }

    /// Mean pooling over token embeddings, considering attention mask
    fn mean_pooling(&self, embeddings: &Tensor, attention_mask: &[u32]) -> candle_core::Result<Tensor> {
        // [1, seq_len, hidden] * [1, seq_len, 1]
        let mask = Tensor::new(attention_mask, &self.device)?
            .to_dtype(DType::F32)?
            .unsqueeze(0)?
            .unsqueeze(2)?;

        let sum = embeddings.broadcast_mul(&mask)?.sum(1)?;
        let count = mask.sum(1)?.clamp(1f32, f32::INFINITY)?;
        sum.broadcast_div(&count)?.squeeze(0)
    }

    /// L2 normalize the embedding vector
    fn normalize(&self, tensor: &Tensor) -> candle_core::Result<Tensor> {
        let norm = tensor.sqr()?.sum_all()?.sqrt()?;
        tensor.broadcast_div(&norm)
    }
}

impl Embedder for MiniLmEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.encode(text).map_err(LyricRecError::embedder)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.par_iter().map(|text| self.embed(text)).collect()
    }
}

/// Euclidean distance between two equal-length vectors.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}


#[cfg(test)]
mod tests {
    use super::testing::HashingEmbedder;
    use super::*;

    #[test]
    fn euclidean_distance_matches_hand_computation() {
        assert_eq!(euclidean_distance(&[0.0, 3.0], &[4.0, 0.0]), 5.0);
        assert_eq!(euclidean_distance(&[1.0, 1.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn identical_text_embeds_identically() {
        let e = HashingEmbedder::new(64);
        let a = e.embed("love and loss").unwrap();
        let b = e.embed("Love and Loss").unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(euclidean_distance(&a, &b), 0.0);
    }

    #[test]
    fn default_batch_preserves_row_order() {
        let e = HashingEmbedder::new(64);
        let batch = e.embed_batch(&["dancing all night", "love and loss"]).unwrap();
        assert_eq!(batch[0], e.embed("dancing all night").unwrap());
        assert_eq!(batch[1], e.embed("love and loss").unwrap());
    }

    #[test]
    #[ignore = "downloads all-MiniLM-L6-v2 from the Hugging Face Hub"]
    fn minilm_produces_unit_vectors() {
        let model = MiniLmEmbedder::load("sentence-transformers/all-MiniLM-L6-v2").unwrap();
        let v = model.embed("Rust is cool.").unwrap();
        assert_eq!(v.len(), 384);
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
    }
}
