//! One loaded model behind a narrow two-operation surface.

use parking_lot::Mutex;

use crate::core::model::{ForwardPass, LanguageModel};
use crate::error::ModelError;

/// Wraps exactly one bound tokenizer/model pair.
///
/// The two paths deliberately disagree about boundary markers, matching the
/// upstream contract: `tokenize` never inserts them, `embed_and_attend`
/// follows the model's default convention and includes them. "Hello world"
/// can therefore tokenize to fewer tokens than the forward pass reports.
pub struct ModelService {
    name: String,
    model: Box<dyn LanguageModel>,
    // Some backends are not safe for concurrent forward passes; serialize
    // them per instance. Tokenization stays lock-free.
    forward_gate: Mutex<()>,
}

impl std::fmt::Debug for ModelService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelService")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl ModelService {
    pub fn new(name: impl Into<String>, model: Box<dyn LanguageModel>) -> Self {
        Self {
            name: name.into(),
            model,
            forward_gate: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hidden_size(&self) -> usize {
        self.model.hidden_size()
    }

    pub fn layer_count(&self) -> usize {
        self.model.layer_count()
    }

    pub fn head_count(&self) -> usize {
        self.model.head_count()
    }

    /// Token strings without boundary markers. Deterministic for a fixed
    /// model and input; empty input yields an empty sequence.
    pub fn tokenize(&self, text: &str) -> Result<Vec<String>, ModelError> {
        self.model.encode(text, false)
    }

    /// One forward pass: marker-inclusive tokens, final-layer hidden
    /// states, and per-layer attention. The token count, the embedding row
    /// count, and both extents of every attention slice always agree.
    pub fn embed_and_attend(&self, text: &str) -> Result<ForwardPass, ModelError> {
        let _guard = self.forward_gate.lock();
        let pass = self.model.forward_with_attention(text)?;
        debug_assert_eq!(pass.tokens.len(), pass.hidden_states.rows());
        Ok(pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::testing::{StubModel, STUB_MARKER};

    fn service() -> ModelService {
        ModelService::new("stub", Box::new(StubModel::new()))
    }

    #[test]
    fn tokenize_excludes_markers() {
        let svc = service();
        assert_eq!(svc.tokenize("Hello world").unwrap(), vec!["Hello", "world"]);
    }

    #[test]
    fn embed_includes_markers_and_aligns() {
        let svc = service();
        let pass = svc.embed_and_attend("Hello world").unwrap();

        assert_eq!(pass.tokens.len(), 3);
        assert_eq!(pass.tokens[0], STUB_MARKER);
        assert_eq!(pass.hidden_states.rows(), 3);
        assert_eq!(pass.attentions.len(), svc.layer_count());
        for layer in &pass.attentions {
            assert_eq!(layer.len(), svc.head_count());
            for head in layer {
                assert_eq!(head.len(), 3);
                for row in head {
                    assert_eq!(row.len(), 3);
                }
            }
        }
    }

    #[test]
    fn attention_rows_are_distributions() {
        let svc = service();
        let pass = svc.embed_and_attend("one two three four").unwrap();
        for layer in &pass.attentions {
            for head in layer {
                for row in head {
                    let sum: f32 = row.iter().sum();
                    assert!((sum - 1.0).abs() < 1e-5, "row sums to {}", sum);
                    assert!(row.iter().all(|w| *w >= 0.0));
                }
            }
        }
    }

    #[test]
    fn repeated_calls_are_identical() {
        let svc = service();
        let a = svc.embed_and_attend("the same text").unwrap();
        let b = svc.embed_and_attend("the same text").unwrap();
        assert_eq!(a.tokens, b.tokens);
        assert_eq!(a.hidden_states, b.hidden_states);
        assert_eq!(a.attentions, b.attentions);

        assert_eq!(
            svc.tokenize("the same text").unwrap(),
            svc.tokenize("the same text").unwrap()
        );
    }

    #[test]
    fn empty_input_is_defined() {
        let svc = service();
        assert!(svc.tokenize("").unwrap().is_empty());

        // Boundary-only sequence on the forward path.
        let pass = svc.embed_and_attend("").unwrap();
        assert_eq!(pass.tokens, vec![STUB_MARKER]);
        assert_eq!(pass.hidden_states.rows(), 1);
    }
}
