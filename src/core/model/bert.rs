//! BERT-family binding: a candle forward pass over a Hugging Face model
//! directory (`config.json`, `tokenizer.json`, `model.safetensors`) that
//! keeps the per-layer attention probabilities instead of discarding them
//! after the weighted sum.

use std::fs;
use std::path::Path;

use candle_core::{DType, Device, Tensor, D};
use candle_nn::ops::softmax;
use candle_nn::{
    embedding, layer_norm, linear, Embedding, LayerNorm, LayerNormConfig, Linear, Module,
    VarBuilder,
};
use serde::Deserialize;
use tokenizers::Tokenizer;

use crate::core::model::{EmbeddingMatrix, ForwardPass, LanguageModel, LayerAttention};
use crate::error::ModelError;

#[derive(Debug, Clone, Deserialize)]
pub struct BertConfig {
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub intermediate_size: usize,
    pub vocab_size: usize,
    pub max_position_embeddings: usize,
    #[serde(default = "default_type_vocab_size")]
    pub type_vocab_size: usize,
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f64,
}

fn default_type_vocab_size() -> usize {
    2
}

fn default_layer_norm_eps() -> f64 {
    1e-12
}

struct BertEmbeddings {
    word: Embedding,
    position: Embedding,
    token_type: Embedding,
    norm: LayerNorm,
}

impl BertEmbeddings {
    fn load(cfg: &BertConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        Ok(Self {
            word: embedding(cfg.vocab_size, cfg.hidden_size, vb.pp("word_embeddings"))?,
            position: embedding(
                cfg.max_position_embeddings,
                cfg.hidden_size,
                vb.pp("position_embeddings"),
            )?,
            token_type: embedding(
                cfg.type_vocab_size,
                cfg.hidden_size,
                vb.pp("token_type_embeddings"),
            )?,
            norm: layer_norm(
                cfg.hidden_size,
                LayerNormConfig::from(cfg.layer_norm_eps),
                vb.pp("LayerNorm"),
            )?,
        })
    }

    fn forward(
        &self,
        ids: &Tensor,
        type_ids: &Tensor,
        positions: &Tensor,
    ) -> candle_core::Result<Tensor> {
        let summed = (self.word.forward(ids)?
            + self.position.forward(positions)?)?
            .add(&self.token_type.forward(type_ids)?)?;
        self.norm.forward(&summed)
    }
}

struct BertSelfAttention {
    query: Linear,
    key: Linear,
    value: Linear,
    output: Linear,
    norm: LayerNorm,
    heads: usize,
    head_dim: usize,
}

impl BertSelfAttention {
    fn load(cfg: &BertConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let h = cfg.hidden_size;
        Ok(Self {
            query: linear(h, h, vb.pp("self.query"))?,
            key: linear(h, h, vb.pp("self.key"))?,
            value: linear(h, h, vb.pp("self.value"))?,
            output: linear(h, h, vb.pp("output.dense"))?,
            norm: layer_norm(
                h,
                LayerNormConfig::from(cfg.layer_norm_eps),
                vb.pp("output.LayerNorm"),
            )?,
            heads: cfg.num_attention_heads,
            head_dim: h / cfg.num_attention_heads,
        })
    }

    /// Returns the attended hidden states and the `[heads, L, L]`
    /// probability tensor the weighted sum was taken with.
    fn forward(&self, hidden: &Tensor) -> candle_core::Result<(Tensor, Tensor)> {
        let (batch, seq_len, width) = hidden.dims3()?;

        let split = |t: Tensor| -> candle_core::Result<Tensor> {
            t.reshape((batch, seq_len, self.heads, self.head_dim))?
                .transpose(1, 2)?
                .contiguous()
        };

        let q = split(self.query.forward(hidden)?)?;
        let k = split(self.key.forward(hidden)?)?;
        let v = split(self.value.forward(hidden)?)?;

        let scores = (q.matmul(&k.transpose(2, 3)?.contiguous()?)? / (self.head_dim as f64).sqrt())?;
        let probs = softmax(&scores, D::Minus1)?;

        let context = probs
            .matmul(&v)?
            .transpose(1, 2)?
            .contiguous()?
            .reshape((batch, seq_len, width))?;
        let attended = self.output.forward(&context)?;
        let out = self.norm.forward(&(hidden + attended)?)?;
        Ok((out, probs))
    }
}

struct BertFeedForward {
    intermediate: Linear,
    output: Linear,
    norm: LayerNorm,
}

impl BertFeedForward {
    fn load(cfg: &BertConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        Ok(Self {
            intermediate: linear(
                cfg.hidden_size,
                cfg.intermediate_size,
                vb.pp("intermediate.dense"),
            )?,
            output: linear(cfg.intermediate_size, cfg.hidden_size, vb.pp("output.dense"))?,
            norm: layer_norm(
                cfg.hidden_size,
                LayerNormConfig::from(cfg.layer_norm_eps),
                vb.pp("output.LayerNorm"),
            )?,
        })
    }

    fn forward(&self, hidden: &Tensor) -> candle_core::Result<Tensor> {
        let inner = self.intermediate.forward(hidden)?.gelu_erf()?;
        self.norm.forward(&(hidden + self.output.forward(&inner)?)?)
    }
}

struct BertLayer {
    attention: BertSelfAttention,
    ffn: BertFeedForward,
}

impl BertLayer {
    fn load(cfg: &BertConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        Ok(Self {
            attention: BertSelfAttention::load(cfg, vb.pp("attention"))?,
            ffn: BertFeedForward::load(cfg, vb)?,
        })
    }

    fn forward(&self, hidden: &Tensor) -> candle_core::Result<(Tensor, Tensor)> {
        let (attended, probs) = self.attention.forward(hidden)?;
        Ok((self.ffn.forward(&attended)?, probs))
    }
}

impl std::fmt::Debug for BertEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BertEncoder")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

pub struct BertEncoder {
    name: String,
    tokenizer: Tokenizer,
    embeddings: BertEmbeddings,
    layers: Vec<BertLayer>,
    config: BertConfig,
    device: Device,
}

impl BertEncoder {
    /// Loads the tokenizer and weights as a unit; any failure surfaces as
    /// a `ModelError::Load` and leaves nothing behind.
    pub fn load(dir: &Path, name: &str) -> Result<Self, ModelError> {
        let config_path = dir.join("config.json");
        let raw = fs::read_to_string(&config_path)
            .map_err(|e| ModelError::load(name, format!("{}: {}", config_path.display(), e)))?;
        let config: BertConfig = serde_json::from_str(&raw)
            .map_err(|e| ModelError::load(name, format!("invalid config.json: {}", e)))?;
        if config.hidden_size % config.num_attention_heads != 0 {
            return Err(ModelError::load(
                name,
                format!(
                    "hidden size {} not divisible by {} heads",
                    config.hidden_size, config.num_attention_heads
                ),
            ));
        }

        let tokenizer_path = dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| ModelError::load(name, format!("{}: {}", tokenizer_path.display(), e)))?;

        let device = default_device();
        let weights_path = dir.join("model.safetensors");
        let tensors = candle_core::safetensors::load(&weights_path, &device)
            .map_err(|e| ModelError::load(name, format!("{}: {}", weights_path.display(), e)))?;
        let prefixed = tensors.keys().any(|k| k.starts_with("bert."));
        let vb = VarBuilder::from_tensors(tensors, DType::F32, &device);
        let vb = if prefixed { vb.pp("bert") } else { vb };

        let build = || -> candle_core::Result<(BertEmbeddings, Vec<BertLayer>)> {
            let embeddings = BertEmbeddings::load(&config, vb.pp("embeddings"))?;
            let layers = (0..config.num_hidden_layers)
                .map(|i| BertLayer::load(&config, vb.pp(format!("encoder.layer.{}", i))))
                .collect::<candle_core::Result<Vec<_>>>()?;
            Ok((embeddings, layers))
        };
        let (embeddings, layers) =
            build().map_err(|e| ModelError::load(name, format!("weights: {}", e)))?;

        Ok(Self {
            name: name.to_string(),
            tokenizer,
            embeddings,
            layers,
            config,
            device,
        })
    }

    fn empty_pass(&self) -> ForwardPass {
        let attentions = (0..self.layers.len())
            .map(|_| (0..self.config.num_attention_heads).map(|_| Vec::new()).collect())
            .collect();
        ForwardPass {
            tokens: Vec::new(),
            hidden_states: EmbeddingMatrix::empty(self.config.hidden_size),
            attentions,
        }
    }
}

impl LanguageModel for BertEncoder {
    fn encode(&self, text: &str, with_markers: bool) -> Result<Vec<String>, ModelError> {
        let encoding = self
            .tokenizer
            .encode(text, with_markers)
            .map_err(|e| ModelError::inference(&self.name, "tokenize", e))?;
        Ok(encoding.get_tokens().to_vec())
    }

    fn forward_with_attention(&self, text: &str) -> Result<ForwardPass, ModelError> {
        let err = |op, e: candle_core::Error| ModelError::inference(&self.name, op, e);

        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| ModelError::inference(&self.name, "tokenize", e))?;

        // Single unpadded sequence, capped at the position-embedding table.
        let seq_len = encoding.get_ids().len().min(self.config.max_position_embeddings);
        if seq_len == 0 {
            return Ok(self.empty_pass());
        }
        let ids = encoding.get_ids()[..seq_len].to_vec();
        let type_ids = encoding.get_type_ids()[..seq_len].to_vec();
        let tokens = encoding.get_tokens()[..seq_len].to_vec();

        let input = Tensor::new(ids, &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(|e| err("forward", e))?;
        let token_types = Tensor::new(type_ids, &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(|e| err("forward", e))?;
        let positions = Tensor::arange(0, seq_len as u32, &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(|e| err("forward", e))?;

        let mut hidden = self
            .embeddings
            .forward(&input, &token_types, &positions)
            .map_err(|e| err("embed", e))?;

        let mut attentions: Vec<LayerAttention> = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let (next, probs) = layer.forward(&hidden).map_err(|e| err("forward", e))?;
            hidden = next;
            let slice = probs
                .squeeze(0)
                .and_then(|p| p.to_dtype(DType::F32))
                .and_then(|p| p.to_vec3::<f32>())
                .map_err(|e| err("attention", e))?;
            attentions.push(slice);
        }

        let rows = hidden
            .squeeze(0)
            .and_then(|h| h.to_dtype(DType::F32))
            .and_then(|h| h.to_vec2::<f32>())
            .map_err(|e| err("hidden_states", e))?;

        Ok(ForwardPass {
            tokens,
            hidden_states: EmbeddingMatrix::from_rows(rows),
            attentions,
        })
    }

    fn hidden_size(&self) -> usize {
        self.config.hidden_size
    }

    fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn head_count(&self) -> usize {
        self.config.num_attention_heads
    }
}

fn default_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            return device;
        }
    }
    Device::Cpu
}
