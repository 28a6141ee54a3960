//! Variance-maximizing projection via the Gram matrix.
//!
//! Token sequences are short and wide (L of tens, H of hundreds), so the
//! eigenproblem is solved on the L-by-L Gram matrix of the centered data
//! instead of the H-by-H covariance. For `G = X Xt = U S^2 Ut`, the
//! principal-component scores are `U S`: each output column is an
//! eigenvector scaled by the square root of its eigenvalue. Everything is
//! ordered, swept, and sign-fixed deterministically, so identical input
//! produces identical output.

use rayon::prelude::*;

const MAX_SWEEPS: usize = 64;
const OFF_DIAG_TOLERANCE: f64 = 1e-12;

/// Projects standardized rows onto their top `k` principal components.
/// Caller guarantees `1 <= k <= rows.len()`.
pub fn project(rows: &[Vec<f32>], k: usize) -> Vec<Vec<f32>> {
    let l = rows.len();
    let gram = gram_matrix(rows);
    let (eigenvalues, vectors) = jacobi_eigen(gram, l);

    let mut order: Vec<usize> = (0..l).collect();
    order.sort_by(|&a, &b| eigenvalues[b].total_cmp(&eigenvalues[a]));

    let mut scores = vec![vec![0.0f32; k]; l];
    for (c, &idx) in order.iter().take(k).enumerate() {
        let scale = eigenvalues[idx].max(0.0).sqrt();
        let flip = column_sign(&vectors, idx, l);
        for (i, row) in scores.iter_mut().enumerate() {
            row[c] = (vectors[i][idx] * flip * scale) as f32;
        }
    }
    scores
}

fn gram_matrix(rows: &[Vec<f32>]) -> Vec<Vec<f64>> {
    rows.par_iter()
        .map(|a| {
            rows.iter()
                .map(|b| {
                    a.iter()
                        .zip(b.iter())
                        .map(|(&x, &y)| x as f64 * y as f64)
                        .sum()
                })
                .collect()
        })
        .collect()
}

/// Cyclic Jacobi rotations on a symmetric matrix. Returns the eigenvalues
/// (diagonal after convergence) and the accumulated rotation matrix whose
/// columns are the eigenvectors.
fn jacobi_eigen(mut a: Vec<Vec<f64>>, n: usize) -> (Vec<f64>, Vec<Vec<f64>>) {
    let mut v = vec![vec![0.0f64; n]; n];
    for (i, row) in v.iter_mut().enumerate() {
        row[i] = 1.0;
    }

    for _ in 0..MAX_SWEEPS {
        let off: f64 = (0..n)
            .map(|p| ((p + 1)..n).map(|q| a[p][q] * a[p][q]).sum::<f64>())
            .sum();
        if off < OFF_DIAG_TOLERANCE {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                if a[p][q].abs() < OFF_DIAG_TOLERANCE {
                    continue;
                }
                let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for i in 0..n {
                    let aip = a[i][p];
                    let aiq = a[i][q];
                    a[i][p] = c * aip - s * aiq;
                    a[i][q] = s * aip + c * aiq;
                }
                for j in 0..n {
                    let apj = a[p][j];
                    let aqj = a[q][j];
                    a[p][j] = c * apj - s * aqj;
                    a[q][j] = s * apj + c * aqj;
                }
                for row in v.iter_mut() {
                    let vip = row[p];
                    let viq = row[q];
                    row[p] = c * vip - s * viq;
                    row[q] = s * vip + c * viq;
                }
            }
        }
    }

    let eigenvalues = (0..n).map(|i| a[i][i]).collect();
    (eigenvalues, v)
}

/// Eigenvector signs are arbitrary; make the dominant entry positive so
/// repeated runs agree exactly.
fn column_sign(vectors: &[Vec<f64>], col: usize, n: usize) -> f64 {
    let mut dominant = 0.0f64;
    for i in 0..n {
        if vectors[i][col].abs() > dominant.abs() {
            dominant = vectors[i][col];
        }
    }
    if dominant < 0.0 {
        -1.0
    } else {
        1.0
    }
}
