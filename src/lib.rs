pub mod cmd;
pub mod core;
pub mod envconfig;
pub mod error;
pub mod manager;
pub mod rng;
pub mod server;
pub mod service;

pub use crate::core::model::{
    BertEncoder, EmbeddingMatrix, ForwardPass, LanguageModel, LayerAttention,
};
pub use crate::core::reduce::{ReductionEngine, ReductionMethod};
pub use error::{ModelError, ReductionError};
pub use manager::ModelManager;
pub use rng::SeededRng;
pub use service::ModelService;
