use crate::{RecommendError, Result};

/// Vectors shorter than this have no usable direction.
const MIN_MAGNITUDE: f32 = 0.001;

pub fn magnitude(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// True when the vector has finite components and a direction to compare against.
pub fn is_searchable(vector: &[f32]) -> bool {
    vector.iter().all(|x| x.is_finite()) && magnitude(vector) >= MIN_MAGNITUDE
}

/// Calculate cosine similarity directly between two vectors
///
/// # Arguments
/// * `vec1` - First vector
/// * `vec2` - Second vector
///
/// # Returns
/// * `Result<f32>` - The cosine similarity or an error
pub fn calculate_direct_similarity(vec1: &[f32], vec2: &[f32]) -> Result<f32> {
    if vec1.len() != vec2.len() {
        return Err(RecommendError::InvalidInput(format!(
            "Vector dimensions don't match: {} vs {}",
            vec1.len(),
            vec2.len()
        )));
    }

    let mag1 = magnitude(vec1);
    let mag2 = magnitude(vec2);

    if mag1 < MIN_MAGNITUDE || mag2 < MIN_MAGNITUDE {
        return Err(RecommendError::InvalidInput(
            "Zero magnitude vector detected".into(),
        ));
    }

    let dot_product: f32 = vec1.iter().zip(vec2.iter()).map(|(a, b)| a * b).sum();
    Ok(dot_product / (mag1 * mag2))
}

/// Cosine distance in `[0, 2]`, the scale every index reports.
pub fn cosine_distance(vec1: &[f32], vec2: &[f32]) -> Result<f32> {
    let similarity = calculate_direct_similarity(vec1, vec2)?;
    Ok(similarity_to_distance(similarity))
}

/// Converts a cosine similarity score into a distance, clamped to `[0, 2]`.
pub fn similarity_to_distance(similarity: f32) -> f32 {
    (1.0 - similarity).clamp(0.0, 2.0)
}
