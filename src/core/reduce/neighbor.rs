//! Neighborhood-preserving layout in the UMAP family: a k-nearest-neighbor
//! graph pulls related tokens together while negative sampling pushes
//! unrelated ones apart. Initialization comes from the deterministic PCA
//! projection and all sampling goes through the engine-seeded generator,
//! so a fixed seed reproduces the layout exactly.

use crate::core::reduce::pca;
use crate::rng::SeededRng;

const N_NEIGHBORS: usize = 15;
const EPOCHS: usize = 200;
const NEGATIVE_SAMPLES: usize = 2;
const INITIAL_LEARNING_RATE: f64 = 0.1;
const REPULSION_STRENGTH: f64 = 0.1;

/// Projects standardized rows to `k` coordinates.
/// Caller guarantees `1 <= k <= rows.len()`.
pub fn project(rows: &[Vec<f32>], k: usize, seed: u64) -> Vec<Vec<f32>> {
    let l = rows.len();
    if l == 1 {
        return vec![vec![0.0; k]];
    }

    let neighbors = nearest_neighbors(rows, N_NEIGHBORS.min(l - 1));
    let mut coords: Vec<Vec<f64>> = pca::project(rows, k)
        .into_iter()
        .map(|row| row.into_iter().map(f64::from).collect())
        .collect();

    let mut rng = SeededRng::new(seed);
    for epoch in 0..EPOCHS {
        let lr = INITIAL_LEARNING_RATE * (1.0 - epoch as f64 / EPOCHS as f64);
        for i in 0..l {
            for &j in &neighbors[i] {
                attract(&mut coords, i, j, lr);
                for _ in 0..NEGATIVE_SAMPLES {
                    let u = rng.gen_index(l);
                    if u != i {
                        repel(&mut coords, i, u, lr);
                    }
                }
            }
        }
    }

    coords
        .into_iter()
        .map(|row| row.into_iter().map(|v| v as f32).collect())
        .collect()
}

fn nearest_neighbors(rows: &[Vec<f32>], n: usize) -> Vec<Vec<usize>> {
    let l = rows.len();
    (0..l)
        .map(|i| {
            let mut candidates: Vec<(f64, usize)> = (0..l)
                .filter(|&j| j != i)
                .map(|j| (squared_distance(&rows[i], &rows[j]), j))
                .collect();
            // Ties broken by index so the graph is stable.
            candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            candidates.into_iter().take(n).map(|(_, j)| j).collect()
        })
        .collect()
}

fn squared_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum()
}

fn attract(coords: &mut [Vec<f64>], i: usize, j: usize, lr: f64) {
    let k = coords[i].len();
    let d2: f64 = (0..k)
        .map(|m| {
            let d = coords[j][m] - coords[i][m];
            d * d
        })
        .sum();
    let scale = lr / (1.0 + d2);
    for c in 0..k {
        let delta = coords[j][c] - coords[i][c];
        coords[i][c] += scale * delta;
        coords[j][c] -= scale * delta;
    }
}

fn repel(coords: &mut [Vec<f64>], i: usize, u: usize, lr: f64) {
    let k = coords[i].len();
    let d2: f64 = (0..k)
        .map(|m| {
            let d = coords[u][m] - coords[i][m];
            d * d
        })
        .sum();
    let scale = lr * REPULSION_STRENGTH / (1.0 + d2);
    for c in 0..k {
        let delta = coords[u][c] - coords[i][c];
        coords[i][c] -= scale * delta;
    }
}
