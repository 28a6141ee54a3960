use crate::core::model::ForwardPass;
use crate::error::ModelError;

/// A loaded tokenizer/model pair, treated as one capability.
///
/// Implementations are immutable after construction and safe to share
/// across threads. Model families plug in by implementing this trait; the
/// manager and service never look past it.
pub trait LanguageModel: Send + Sync + std::fmt::Debug {
    /// Token strings for `text`. `with_markers` controls whether the
    /// model's boundary markers (class/begin/end tokens) are inserted.
    fn encode(&self, text: &str, with_markers: bool) -> Result<Vec<String>, ModelError>;

    /// One forward pass with attention capture. The returned token
    /// sequence is marker-inclusive and aligns 1:1 with the rows of the
    /// hidden-state matrix and both extents of every attention slice.
    ///
    /// An input that encodes to zero tokens yields an empty pass (no rows,
    /// layers of 0-by-0 slices) rather than an error.
    fn forward_with_attention(&self, text: &str) -> Result<ForwardPass, ModelError>;

    /// Width of one hidden-state row.
    fn hidden_size(&self) -> usize;

    fn layer_count(&self) -> usize;

    fn head_count(&self) -> usize;
}
