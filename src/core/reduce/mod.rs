//! Projects an embedding matrix `[L, H]` down to `[L, k]`, k in {2, 3},
//! for visualization.
//!
//! Both methods standardize feature columns first and rescale the final
//! coordinates into `[-1, 1]`. The rescale is one affine map over the whole
//! matrix, not per column, so the variance ordering the PCA path guarantees
//! survives it.

pub mod neighbor;
pub mod pca;

use std::fmt;
use std::str::FromStr;

use crate::core::model::EmbeddingMatrix;
use crate::error::ReductionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReductionMethod {
    /// Linear variance-maximizing projection.
    Pca,
    /// Non-linear neighborhood-preserving layout.
    Umap,
}

impl FromStr for ReductionMethod {
    type Err = ReductionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pca" => Ok(Self::Pca),
            "umap" => Ok(Self::Umap),
            other => Err(ReductionError::UnknownMethod(other.to_string())),
        }
    }
}

impl fmt::Display for ReductionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pca => write!(f, "pca"),
            Self::Umap => write!(f, "umap"),
        }
    }
}

/// Stateless per call apart from the pinned seed. The seed lives here, not
/// in library defaults, so the stochastic method reproduces exactly across
/// runs of the same engine.
#[derive(Debug, Clone, Copy)]
pub struct ReductionEngine {
    seed: u64,
}

impl ReductionEngine {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Projects `embeddings` to `n_components` columns. The output always
    /// has exactly as many rows as the input.
    ///
    /// Fails when `n_components` is outside `1..=3`, or when there are
    /// fewer rows than requested components; a row count equal to
    /// `n_components` is accepted (trailing components may then carry
    /// near-zero variance).
    pub fn reduce(
        &self,
        embeddings: &EmbeddingMatrix,
        method: ReductionMethod,
        n_components: usize,
    ) -> Result<Vec<Vec<f32>>, ReductionError> {
        if n_components == 0 || n_components > 3 {
            return Err(ReductionError::InvalidComponents(n_components));
        }
        let rows = embeddings.rows();
        if rows < n_components {
            return Err(ReductionError::TooFewRows {
                rows,
                components: n_components,
            });
        }

        let standardized = standardize(embeddings);
        let projected = match method {
            ReductionMethod::Pca => pca::project(&standardized, n_components),
            ReductionMethod::Umap => neighbor::project(&standardized, n_components, self.seed),
        };
        debug_assert_eq!(projected.len(), rows);
        Ok(rescale(projected))
    }
}

/// Zero mean, unit variance per feature column. Columns with no variance
/// are left at zero rather than divided by a zero deviation.
fn standardize(embeddings: &EmbeddingMatrix) -> Vec<Vec<f32>> {
    let rows = embeddings.rows();
    let width = embeddings.width();
    let mut out: Vec<Vec<f32>> = embeddings.iter_rows().map(|r| r.to_vec()).collect();
    if rows == 0 {
        return out;
    }

    for col in 0..width {
        let mean = out.iter().map(|r| r[col] as f64).sum::<f64>() / rows as f64;
        let var = out
            .iter()
            .map(|r| {
                let d = r[col] as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / rows as f64;
        let std = var.sqrt();
        for row in out.iter_mut() {
            row[col] = if std > 1e-12 {
                ((row[col] as f64 - mean) / std) as f32
            } else {
                0.0
            };
        }
    }
    out
}

/// One shared affine map onto `[-1, 1]`. A constant matrix maps to zeros.
fn rescale(mut coords: Vec<Vec<f32>>) -> Vec<Vec<f32>> {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for row in &coords {
        for &v in row {
            min = min.min(v);
            max = max.max(v);
        }
    }
    let range = max - min;
    for row in coords.iter_mut() {
        for v in row.iter_mut() {
            *v = if range > 0.0 {
                2.0 * (*v - min) / range - 1.0
            } else {
                0.0
            };
        }
    }
    coords
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SeededRng;

    fn fixture(rows: usize, width: usize) -> EmbeddingMatrix {
        let mut rng = SeededRng::new(123);
        EmbeddingMatrix::from_rows(
            (0..rows)
                .map(|_| (0..width).map(|_| rng.gen_range(-2.0..2.0) as f32).collect())
                .collect(),
        )
    }

    fn column_variance(coords: &[Vec<f32>], col: usize) -> f64 {
        let n = coords.len() as f64;
        let mean = coords.iter().map(|r| r[col] as f64).sum::<f64>() / n;
        coords
            .iter()
            .map(|r| {
                let d = r[col] as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n
    }

    #[test]
    fn method_parsing() {
        assert_eq!("pca".parse::<ReductionMethod>().unwrap(), ReductionMethod::Pca);
        assert_eq!("umap".parse::<ReductionMethod>().unwrap(), ReductionMethod::Umap);
        assert_eq!(
            "tsne".parse::<ReductionMethod>().unwrap_err(),
            ReductionError::UnknownMethod("tsne".to_string())
        );
    }

    #[test]
    fn rejects_bad_component_counts() {
        let engine = ReductionEngine::new(42);
        let embeddings = fixture(5, 8);
        for k in [0, 4, 7] {
            assert_eq!(
                engine
                    .reduce(&embeddings, ReductionMethod::Pca, k)
                    .unwrap_err(),
                ReductionError::InvalidComponents(k)
            );
        }
    }

    #[test]
    fn too_few_rows_is_an_error_every_time() {
        let engine = ReductionEngine::new(42);
        let embeddings = fixture(2, 8);
        for _ in 0..3 {
            assert_eq!(
                engine
                    .reduce(&embeddings, ReductionMethod::Pca, 3)
                    .unwrap_err(),
                ReductionError::TooFewRows {
                    rows: 2,
                    components: 3
                }
            );
        }
    }

    #[test]
    fn row_count_always_preserved() {
        let engine = ReductionEngine::new(42);
        for rows in [2, 5, 17] {
            for k in [2, 3] {
                if rows < k {
                    continue;
                }
                let embeddings = fixture(rows, 12);
                for method in [ReductionMethod::Pca, ReductionMethod::Umap] {
                    let reduced = engine.reduce(&embeddings, method, k).unwrap();
                    assert_eq!(reduced.len(), rows);
                    assert!(reduced.iter().all(|r| r.len() == k));
                }
            }
        }
    }

    #[test]
    fn output_is_bounded() {
        let engine = ReductionEngine::new(42);
        let embeddings = fixture(10, 16);
        for method in [ReductionMethod::Pca, ReductionMethod::Umap] {
            let reduced = engine.reduce(&embeddings, method, 2).unwrap();
            for row in &reduced {
                for &v in row {
                    assert!((-1.001..=1.001).contains(&v), "{} out of range", v);
                }
            }
        }
    }

    #[test]
    fn pca_is_idempotent() {
        let engine = ReductionEngine::new(42);
        let embeddings = fixture(7, 24);
        let a = engine.reduce(&embeddings, ReductionMethod::Pca, 2).unwrap();
        let b = engine.reduce(&embeddings, ReductionMethod::Pca, 2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn pca_variance_is_non_increasing() {
        let engine = ReductionEngine::new(42);
        let embeddings = fixture(5, 32);
        let reduced = engine.reduce(&embeddings, ReductionMethod::Pca, 2).unwrap();
        assert_eq!(reduced.len(), 5);
        let (v0, v1) = (column_variance(&reduced, 0), column_variance(&reduced, 1));
        assert!(v0 >= v1 - 1e-9, "variance increased: {} < {}", v0, v1);
    }

    #[test]
    fn umap_is_deterministic_for_a_fixed_seed() {
        let embeddings = fixture(12, 16);
        let a = ReductionEngine::new(7)
            .reduce(&embeddings, ReductionMethod::Umap, 2)
            .unwrap();
        let b = ReductionEngine::new(7)
            .reduce(&embeddings, ReductionMethod::Umap, 2)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rows_equal_components_is_accepted() {
        let engine = ReductionEngine::new(42);
        let embeddings = fixture(3, 16);
        let reduced = engine.reduce(&embeddings, ReductionMethod::Pca, 3).unwrap();
        assert_eq!(reduced.len(), 3);
        assert!(reduced.iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn constant_input_yields_finite_zeros() {
        let engine = ReductionEngine::new(42);
        let embeddings = EmbeddingMatrix::from_rows(vec![vec![3.5; 8]; 4]);
        let reduced = engine.reduce(&embeddings, ReductionMethod::Pca, 2).unwrap();
        assert_eq!(reduced.len(), 4);
        assert!(reduced.iter().flatten().all(|v| *v == 0.0));
    }

    #[test]
    fn single_row_single_component() {
        let engine = ReductionEngine::new(42);
        let embeddings = fixture(1, 8);
        let reduced = engine.reduce(&embeddings, ReductionMethod::Pca, 1).unwrap();
        assert_eq!(reduced, vec![vec![0.0]]);
    }
}
