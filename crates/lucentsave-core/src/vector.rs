//! Fixed-length vector primitives.
//!
//! Stored embeddings are always unit length, so ranking by inner product is
//! equivalent to ranking by cosine similarity.
//!
//! Also provides the BLOB encoding used by the SQLite store:
//! - [`vec_to_blob`]: encode a `Vec<f32>` as little-endian bytes
//! - [`blob_to_vec`]: decode a BLOB back into a `Vec<f32>`

/// Errors from vector combination and normalization.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VectorError {
    #[error("cannot normalize a vector with zero norm")]
    ZeroNorm,

    #[error("vector has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("{vectors} vectors but {weights} weights")]
    WeightCount { vectors: usize, weights: usize },

    #[error("no vectors to combine")]
    Empty,
}

/// Euclidean (L2) norm.
pub fn norm(vec: &[f32]) -> f32 {
    vec.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Divide every component by the vector's L2 norm.
///
/// Fails with [`VectorError::ZeroNorm`] for an all-zero (or empty) vector
/// instead of producing NaNs.
pub fn normalize(vec: &[f32]) -> Result<Vec<f32>, VectorError> {
    let n = norm(vec);
    if n == 0.0 || !n.is_finite() {
        return Err(VectorError::ZeroNorm);
    }
    Ok(vec.iter().map(|x| x / n).collect())
}

/// Componentwise weighted sum.
///
/// All vectors must share one length and there must be exactly one weight
/// per vector. Weights need not sum to 1; normalize afterwards.
pub fn combine(vectors: &[&[f32]], weights: &[f32]) -> Result<Vec<f32>, VectorError> {
    if vectors.len() != weights.len() {
        return Err(VectorError::WeightCount {
            vectors: vectors.len(),
            weights: weights.len(),
        });
    }
    let first = vectors.first().ok_or(VectorError::Empty)?;
    let dims = first.len();

    let mut out = vec![0.0f32; dims];
    for (vec, weight) in vectors.iter().zip(weights) {
        if vec.len() != dims {
            return Err(VectorError::DimensionMismatch {
                expected: dims,
                actual: vec.len(),
            });
        }
        for (acc, x) in out.iter_mut().zip(vec.iter()) {
            *acc += weight * x;
        }
    }
    Ok(out)
}

/// Add `other` into `acc` componentwise.
pub fn add_assign(acc: &mut [f32], other: &[f32]) -> Result<(), VectorError> {
    if acc.len() != other.len() {
        return Err(VectorError::DimensionMismatch {
            expected: acc.len(),
            actual: other.len(),
        });
    }
    for (a, b) in acc.iter_mut().zip(other) {
        *a += b;
    }
    Ok(())
}

/// Dot product. Returns `None` when the lengths differ.
pub fn inner_product(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    Some(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use lucentsave_core::vector::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_normalize_unit_length() {
        let v = normalize(&[3.0, 4.0]).unwrap();
        assert!(approx(v[0], 0.6));
        assert!(approx(v[1], 0.8));
        assert!(approx(norm(&v), 1.0));
    }

    #[test]
    fn test_normalize_many_shapes() {
        let inputs: [&[f32]; 4] = [
            &[1.0],
            &[-2.0, 0.5, 7.25],
            &[1e-3, 1e-3, 1e-3, 1e-3],
            &[0.0, 0.0, -9.0],
        ];
        for v in inputs {
            assert!(approx(norm(&normalize(v).unwrap()), 1.0), "input {:?}", v);
        }
    }

    #[test]
    fn test_normalize_zero_vector_errors() {
        assert_eq!(normalize(&[0.0, 0.0, 0.0]), Err(VectorError::ZeroNorm));
        assert_eq!(normalize(&[]), Err(VectorError::ZeroNorm));
    }

    #[test]
    fn test_combine_weighted_sum() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        let out = combine(&[&a, &b], &[0.25, 0.75]).unwrap();
        assert_eq!(out, vec![0.25, 0.75]);
    }

    #[test]
    fn test_combine_pairs_travel_together() {
        let a = [1.0, 2.0];
        let b = [3.0, -1.0];
        let c = [0.5, 0.5];
        let forward = combine(&[&a, &b, &c], &[0.25, 0.15, 0.6]).unwrap();
        let shuffled = combine(&[&c, &a, &b], &[0.6, 0.25, 0.15]).unwrap();
        for (x, y) in forward.iter().zip(&shuffled) {
            assert!(approx(*x, *y));
        }
    }

    #[test]
    fn test_combine_weight_permutation_changes_result() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        let c = [0.0, 0.0];
        let one = combine(&[&a, &b, &c], &[0.25, 0.15, 0.6]).unwrap();
        let two = combine(&[&a, &b, &c], &[0.6, 0.15, 0.25]).unwrap();
        assert_ne!(one, two);
    }

    #[test]
    fn test_combine_mismatches() {
        let a = [1.0, 0.0];
        let short = [1.0];
        assert_eq!(
            combine(&[&a, &short], &[0.5, 0.5]),
            Err(VectorError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        );
        assert_eq!(
            combine(&[&a], &[0.5, 0.5]),
            Err(VectorError::WeightCount {
                vectors: 1,
                weights: 2
            })
        );
        assert_eq!(combine(&[], &[]), Err(VectorError::Empty));
    }

    #[test]
    fn test_inner_product() {
        assert_eq!(inner_product(&[1.0, 2.0], &[3.0, 4.0]), Some(11.0));
        assert_eq!(inner_product(&[1.0], &[1.0, 2.0]), None);
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }
}
