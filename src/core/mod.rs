pub mod model;
pub mod reduce;

pub use model::{EmbeddingMatrix, ForwardPass, LanguageModel, LayerAttention};
pub use reduce::{ReductionEngine, ReductionMethod};
