//! Cosine-distance ranking shared by every store.
//!
//! Stores that rank natively must agree with [`cosine_distance`]; stores without a native index
//! call [`rank_chunks`] directly.

use crate::store::{RankedChunk, StoredChunk};
use std::cmp::Ordering;

/// `1 - cos(a, b)`. Ranges over `[0, 2]`; zero-length or zero-norm inputs are maximally
/// distant.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 2.0;
    }

    let (dot, norm_a, norm_b) = a.iter().zip(b).fold(
        (0.0_f64, 0.0_f64, 0.0_f64),
        |(dot, norm_a, norm_b), (x, y)| {
            let (x, y) = (f64::from(*x), f64::from(*y));
            (dot + x * y, norm_a + x * x, norm_b + y * y)
        },
    );

    if norm_a == 0.0 || norm_b == 0.0 {
        return 2.0;
    }

    let similarity = (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0);
    (1.0 - similarity) as f32
}

/// Order by ascending distance, breaking ties by insertion order.
pub fn compare_ranked(a: &RankedChunk, b: &RankedChunk) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.chunk.ordinal.cmp(&b.chunk.ordinal))
}

/// Rank `chunks` against `query` by linear scan and keep the `top_k` closest.
pub fn rank_chunks(
    chunks: impl IntoIterator<Item = StoredChunk>,
    query: &[f32],
    top_k: usize,
) -> Vec<RankedChunk> {
    let mut ranked: Vec<RankedChunk> = chunks
        .into_iter()
        .map(|chunk| RankedChunk {
            distance: cosine_distance(query, &chunk.vector),
            chunk,
        })
        .collect();
    ranked.sort_by(compare_ranked);
    ranked.truncate(top_k);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn chunk(ordinal: u64, vector: Vec<f32>) -> StoredChunk {
        StoredChunk {
            id: Uuid::new_v4(),
            profile_id: Uuid::nil(),
            ordinal,
            document_index: 0,
            file_name: "doc.txt".into(),
            text: format!("chunk {ordinal}"),
            chunk_hash: String::new(),
            vector,
        }
    }

    #[test]
    fn distance_bounds() {
        assert!(cosine_distance(&[1.0, 0.0], &[2.0, 0.0]).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
        assert_eq!(cosine_distance(&[1.0], &[1.0, 0.0]), 2.0);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 2.0);
    }

    #[test]
    fn ranks_ascending_and_truncates() {
        let chunks = vec![
            chunk(0, vec![0.0, 1.0]),
            chunk(1, vec![1.0, 0.0]),
            chunk(2, vec![0.7, 0.7]),
        ];
        let ranked = rank_chunks(chunks, &[1.0, 0.0], 2);
        let ordinals: Vec<u64> = ranked.iter().map(|hit| hit.chunk.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2]);
        assert!(ranked[0].distance <= ranked[1].distance);
    }

    #[test]
    fn ties_prefer_earlier_chunks() {
        let chunks = vec![
            chunk(5, vec![1.0, 0.0]),
            chunk(2, vec![1.0, 0.0]),
            chunk(9, vec![1.0, 0.0]),
        ];
        let ranked = rank_chunks(chunks, &[1.0, 0.0], 3);
        let ordinals: Vec<u64> = ranked.iter().map(|hit| hit.chunk.ordinal).collect();
        assert_eq!(ordinals, vec![2, 5, 9]);
    }

    #[test]
    fn top_result_matches_brute_force_minimum() {
        let vectors: Vec<Vec<f32>> = (0..40)
            .map(|i| {
                let angle = i as f32 * 0.37;
                vec![angle.cos(), angle.sin(), (i % 7) as f32 * 0.1]
            })
            .collect();
        let chunks: Vec<StoredChunk> = vectors
            .iter()
            .enumerate()
            .map(|(i, vector)| chunk(i as u64, vector.clone()))
            .collect();
        let query = [0.3_f32, -0.8, 0.2];

        let ranked = rank_chunks(chunks, &query, 10);

        assert!(ranked.windows(2).all(|pair| pair[0].distance <= pair[1].distance));
        let (best, _) = vectors
            .iter()
            .enumerate()
            .map(|(i, vector)| (i, cosine_distance(&query, vector)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .expect("non-empty");
        assert_eq!(ranked[0].chunk.ordinal, best as u64);
    }
}
