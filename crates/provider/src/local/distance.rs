//! Cosine distance for the local provider.
//!
//! The local provider reports distances the way the server backend does with
//! `hnsw:space = cosine`: `distance = 1 − cosine_similarity`, so the store's
//! `similarity = 1 − distance` means the same thing for every provider.
//! No implicit normalization; vectors are used as-is.

use std::cmp::Ordering;

/// Cosine distance: `1 − dot(a,b) / (‖a‖·‖b‖)`
///
/// Range: [0, 2]. A zero-norm vector has distance 1 to everything.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Dimension mismatch in distance computation");
    1.0 - cosine_similarity(a, b)
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot = dot_product(a, b);
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Sort `(id, distance)` pairs nearest first, ties broken by id ascending
pub fn sort_nearest<K: Ord>(results: &mut [(K, f32)]) {
    results.sort_by(|(id_a, dist_a), (id_b, dist_b)| {
        dist_a
            .partial_cmp(dist_b)
            .unwrap_or(Ordering::Equal)
            .then_with(|| id_a.cmp(id_b))
    });
}
