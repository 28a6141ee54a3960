pub mod bert;
pub mod factory;
pub mod traits;

pub use bert::BertEncoder;
pub use traits::LanguageModel;

/// Dense `[rows, width]` matrix of final-layer hidden states, one row per
/// token. Row order matches the token sequence it was produced with.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    rows: usize,
    width: usize,
    data: Vec<f32>,
}

impl EmbeddingMatrix {
    pub fn empty(width: usize) -> Self {
        Self {
            rows: 0,
            width,
            data: Vec::new(),
        }
    }

    /// Builds a matrix from row vectors. All rows must share one width.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Self {
        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        assert!(
            rows.iter().all(|r| r.len() == width),
            "ragged embedding rows"
        );
        let count = rows.len();
        let mut data = Vec::with_capacity(count * width);
        for row in rows {
            data.extend(row);
        }
        Self {
            rows: count,
            width,
            data,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.width..(i + 1) * self.width]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.width.max(1)).take(self.rows)
    }

    /// Nested representation for wire serialization.
    pub fn to_rows(&self) -> Vec<Vec<f32>> {
        self.iter_rows().map(|r| r.to_vec()).collect()
    }
}

/// Per-layer attention probabilities, indexed `[head][row][col]`. Every row
/// of a head slice is a distribution over attended positions (sums to 1).
pub type LayerAttention = Vec<Vec<Vec<f32>>>;

/// Everything one forward pass yields: the marker-inclusive token sequence,
/// the final-layer hidden states aligned with it, and the attention
/// probabilities for every layer. `tokens.len()` always equals
/// `hidden_states.rows()` and both extents of every head slice.
#[derive(Debug, Clone)]
pub struct ForwardPass {
    pub tokens: Vec<String>,
    pub hidden_states: EmbeddingMatrix,
    pub attentions: Vec<LayerAttention>,
}

#[cfg(test)]
pub(crate) mod testing {
    use super::traits::LanguageModel;
    use super::{EmbeddingMatrix, ForwardPass, LayerAttention};
    use crate::error::ModelError;
    use crate::rng::SeededRng;

    /// Start-of-sequence marker the stub inserts on the forward path,
    /// mirroring a BOS-style convention: "Hello world" encodes to two
    /// tokens bare and three with markers.
    pub const STUB_MARKER: &str = "<s>";

    /// Deterministic in-memory model: whitespace tokenization, hashed
    /// pseudo-embeddings, softmax attention. Lets service/manager tests run
    /// without weight files.
    #[derive(Debug)]
    pub struct StubModel {
        hidden: usize,
        layers: usize,
        heads: usize,
    }

    impl StubModel {
        pub fn new() -> Self {
            Self {
                hidden: 8,
                layers: 2,
                heads: 2,
            }
        }
    }

    fn hash(s: &str) -> u64 {
        // FNV-1a
        let mut h = 0xcbf29ce484222325u64;
        for b in s.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        h
    }

    impl LanguageModel for StubModel {
        fn encode(&self, text: &str, with_markers: bool) -> Result<Vec<String>, ModelError> {
            let mut tokens: Vec<String> = if with_markers {
                vec![STUB_MARKER.to_string()]
            } else {
                Vec::new()
            };
            tokens.extend(text.split_whitespace().map(str::to_string));
            Ok(tokens)
        }

        fn forward_with_attention(&self, text: &str) -> Result<ForwardPass, ModelError> {
            let tokens = self.encode(text, true)?;
            let l = tokens.len();

            let rows: Vec<Vec<f32>> = tokens
                .iter()
                .enumerate()
                .map(|(pos, tok)| {
                    let mut rng = SeededRng::new(hash(tok) ^ pos as u64);
                    (0..self.hidden)
                        .map(|_| rng.gen_range(-1.0..1.0) as f32)
                        .collect()
                })
                .collect();

            let attentions: Vec<LayerAttention> = (0..self.layers)
                .map(|layer| {
                    (0..self.heads)
                        .map(|head| {
                            (0..l)
                                .map(|i| {
                                    let scores: Vec<f32> = (0..l)
                                        .map(|j| {
                                            let mut rng = SeededRng::new(
                                                (layer as u64) << 48
                                                    | (head as u64) << 32
                                                    | (i as u64) << 16
                                                    | j as u64,
                                            );
                                            rng.gen_range(0.0..1.0) as f32
                                        })
                                        .collect();
                                    let max = scores.iter().cloned().fold(f32::MIN, f32::max);
                                    let exp: Vec<f32> =
                                        scores.iter().map(|s| (s - max).exp()).collect();
                                    let sum: f32 = exp.iter().sum();
                                    exp.iter().map(|e| e / sum).collect()
                                })
                                .collect()
                        })
                        .collect()
                })
                .collect();

            Ok(ForwardPass {
                tokens,
                hidden_states: EmbeddingMatrix::from_rows(rows),
                attentions,
            })
        }

        fn hidden_size(&self) -> usize {
            self.hidden
        }

        fn layer_count(&self) -> usize {
            self.layers
        }

        fn head_count(&self) -> usize {
            self.heads
        }
    }
}
