//! Error types surfaced by the core.
//!
//! Two failure kinds cross the call boundary: model loading/inference
//! failures and reduction parameter failures. Everything names the
//! offending input so the serving layer can report it verbatim.

use thiserror::Error;

/// Failures tied to a model key: the key does not resolve to a loadable
/// tokenizer/model pair, or an operation on a loaded pair failed.
#[derive(Error, Debug)]
pub enum ModelError {
    /// The key does not name a loadable tokenizer/model pair.
    #[error("failed to load model '{name}': {reason}")]
    Load { name: String, reason: String },

    /// Unclassified failure inside tokenization or a forward pass.
    /// Carries the model and operation for diagnosis; never downgraded
    /// to a partial result.
    #[error("model '{name}' failed during {op}: {reason}")]
    Inference {
        name: String,
        op: &'static str,
        reason: String,
    },
}

impl ModelError {
    pub fn load(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::Load {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn inference(name: impl Into<String>, op: &'static str, reason: impl ToString) -> Self {
        Self::Inference {
            name: name.into(),
            op,
            reason: reason.to_string(),
        }
    }
}

/// Invalid reduction parameters or an embedding matrix too small for the
/// requested projection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReductionError {
    #[error("unsupported dimensionality reduction method: {0}")]
    UnknownMethod(String),

    #[error("invalid component count {0}: must be between 1 and 3")]
    InvalidComponents(usize),

    #[error("cannot reduce {rows} tokens to {components} dimensions: not enough tokens")]
    TooFewRows { rows: usize, components: usize },
}
