//! Token windows, pooling and cosine similarity.

use super::encoder::Encoder;
use crate::error::{EvalError, Result};

/// Split `tokens` into consecutive, non-overlapping windows of at most
/// `budget` tokens. Concatenating the windows gives back `tokens`.
pub fn chunk_tokens(tokens: &[u32], budget: usize) -> Vec<&[u32]> {
    let budget = budget.max(1);
    tokens.chunks(budget).collect()
}

/// Element-wise mean of the window embeddings.
pub fn mean_pool(vectors: &[Vec<f32>]) -> Result<Vec<f32>> {
    let first = vectors
        .first()
        .ok_or_else(|| EvalError::Embedding("no windows to pool".to_string()))?;
    let dim = first.len();

    let mut sum = vec![0.0f64; dim];
    for vector in vectors {
        if vector.len() != dim {
            return Err(EvalError::Embedding(format!(
                "window embeddings disagree in size ({} vs {})",
                vector.len(),
                dim
            )));
        }
        for (acc, x) in sum.iter_mut().zip(vector) {
            *acc += f64::from(*x);
        }
    }

    let n = vectors.len() as f64;
    Ok(sum.into_iter().map(|x| (x / n) as f32).collect())
}

/// Pooled embedding of a whole text: tokenize, window, encode each window,
/// average.
pub fn embed_text<E: Encoder + ?Sized>(encoder: &E, text: &str) -> Result<Vec<f32>> {
    let tokens = encoder.tokenize(text)?;
    let windows = chunk_tokens(&tokens, encoder.token_budget());
    let mut embeddings = Vec::with_capacity(windows.len());
    for window in windows {
        embeddings.push(encoder.encode(window)?);
    }
    mean_pool(&embeddings)
}

/// Cosine similarity of two vectors.
///
/// NaN when the vectors differ in length or either has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return f64::NAN;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        f64::NAN
    } else {
        dot / (norm_a.sqrt() * norm_b.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunking_is_lossless() {
        for len in [0usize, 1, 511, 512, 513, 1024, 1100] {
            let tokens: Vec<u32> = (0..len as u32).collect();
            let windows = chunk_tokens(&tokens, 512);

            assert_eq!(windows.len(), len.div_ceil(512));
            assert!(windows.iter().all(|w| !w.is_empty() && w.len() <= 512));

            let rebuilt: Vec<u32> = windows.concat();
            assert_eq!(rebuilt, tokens, "length {}", len);
        }
    }

    #[test]
    fn test_mean_pool() {
        let pooled = mean_pool(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(pooled, vec![2.0, 3.0]);

        assert!(mean_pool(&[]).is_err());
        assert!(mean_pool(&[vec![1.0], vec![1.0, 2.0]]).is_err());
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-9);

        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 1e-9);

        let d = vec![-2.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_is_symmetric() {
        let pairs = [
            (vec![0.3, -1.2, 4.0], vec![2.5, 0.1, -0.7]),
            (vec![1e-3, 5.0, 5.0], vec![7.0, 7.0, 0.5]),
            (vec![-1.0, -2.0, -3.0], vec![3.0, 2.0, 1.0]),
        ];
        for (a, b) in &pairs {
            assert_eq!(cosine_similarity(a, b), cosine_similarity(b, a));
        }
    }

    #[test]
    fn test_cosine_degenerate_is_nan() {
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]).is_nan());
        assert!(cosine_similarity(&[1.0], &[1.0, 2.0]).is_nan());
    }
}
