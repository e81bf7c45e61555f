//! Unit-length normalization for embedding vectors.

use super::types::NormalizeError;

/// Euclidean norm, accumulated in `f64` to keep long vectors stable.
pub fn l2_norm(vector: &[f32]) -> f64 {
    vector
        .iter()
        .map(|value| f64::from(*value) * f64::from(*value))
        .sum::<f64>()
        .sqrt()
}

/// Rescale `vector` to unit Euclidean norm.
///
/// Zero, empty, and non-finite vectors cannot be normalized and fail with
/// [`NormalizeError::Degenerate`]; passing them through would corrupt cosine ranking.
pub fn normalize(vector: &[f32]) -> Result<Vec<f32>, NormalizeError> {
    let norm = l2_norm(vector);
    if vector.is_empty() || norm == 0.0 || !norm.is_finite() {
        return Err(NormalizeError::Degenerate {
            dimension: vector.len(),
        });
    }
    Ok(vector
        .iter()
        .map(|value| (f64::from(*value) / norm) as f32)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-6;

    #[test]
    fn produces_unit_vectors() {
        let normalized = normalize(&[3.0, 4.0]).expect("non-zero");
        assert!((normalized[0] - 0.6).abs() < 1e-6);
        assert!((normalized[1] - 0.8).abs() < 1e-6);
        assert!((l2_norm(&normalized) - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn is_idempotent() {
        let samples: [&[f32]; 4] = [
            &[1.0, 2.0, 3.0],
            &[-0.5, 0.25, 1e-3, 7.0],
            &[1e-20, 0.0, 0.0],
            &[1e20, -1e20],
        ];
        for sample in samples {
            let once = normalize(sample).expect("non-zero");
            let twice = normalize(&once).expect("non-zero");
            assert!((l2_norm(&once) - 1.0).abs() < TOLERANCE);
            for (a, b) in once.iter().zip(&twice) {
                assert!((a - b).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn rejects_zero_vectors() {
        let error = normalize(&[0.0; 1536]).unwrap_err();
        assert!(matches!(error, NormalizeError::Degenerate { dimension: 1536 }));
        assert!(normalize(&[]).is_err());
        assert!(normalize(&[f32::NAN, 1.0]).is_err());
        assert!(normalize(&[f32::INFINITY]).is_err());
    }
}
