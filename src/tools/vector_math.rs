use ndarray::{Array2, ArrayView1, Axis};

/// Cosine similarity in f64, clamped to [-1, 1]. Mismatched or empty
/// vectors score 0.
pub fn cosine_similarity(query: &[f32], candidate: &[f32]) -> f64 {
    if query.is_empty() || query.len() != candidate.len() {
        return 0.0;
    }

    let dot: f64 = query
        .iter()
        .zip(candidate)
        .map(|(a, b)| f64::from(*a) * f64::from(*b))
        .sum();
    let query_norm = l2_norm(query);
    let candidate_norm = l2_norm(candidate);
    let denom = query_norm * candidate_norm;
    if denom <= f64::EPSILON {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0)
}

pub fn l2_norm(vector: &[f32]) -> f64 {
    vector
        .iter()
        .map(|v| f64::from(*v).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Returns a unit-length copy, or `None` for a zero vector.
pub fn normalized(vector: &[f32]) -> Option<Vec<f32>> {
    let norm = l2_norm(vector);
    if norm <= f64::EPSILON {
        return None;
    }
    Some(vector.iter().map(|v| (f64::from(*v) / norm) as f32).collect())
}

/// Normalises each row in place. Zero rows stay zero so they score 0
/// against every query.
pub fn normalize_rows(matrix: &mut Array2<f32>) {
    for mut row in matrix.axis_iter_mut(Axis(0)) {
        let norm = row_norm(row.view());
        if norm > f64::EPSILON {
            row.mapv_inplace(|v| (f64::from(v) / norm) as f32);
        }
    }
}

fn row_norm(row: ArrayView1<'_, f32>) -> f64 {
    row.iter().map(|v| f64::from(*v).powi(2)).sum::<f64>().sqrt()
}
