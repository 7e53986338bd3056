// This file is part of Facetrack, a multi-stream face re-identification service.
// See AUTHORS and LICENSE.

//! 512-dimensional embedding math: L2 normalization and cosine similarity
//! (expressed as a plain inner product, since every embedding the registry
//! stores is kept unit-norm).

pub const EMBEDDING_DIM: usize = 512;

pub type Embedding = [f32; EMBEDDING_DIM];

/// Returns a unit-norm copy of `raw`, or a zero vector if `raw` has zero norm.
pub fn normalize(raw: &[f32; EMBEDDING_DIM]) -> Embedding {
    let norm = l2_norm(raw);
    if norm == 0.0 {
        return [0.0; EMBEDDING_DIM];
    }
    let mut out = [0.0f32; EMBEDDING_DIM];
    for i in 0..EMBEDDING_DIM {
        out[i] = raw[i] / norm;
    }
    out
}

pub fn l2_norm(v: &[f32; EMBEDDING_DIM]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Inner product of two vectors. On unit-norm inputs this is cosine similarity.
pub fn inner_product(a: &[f32; EMBEDDING_DIM], b: &[f32; EMBEDDING_DIM]) -> f32 {
    let mut sum = 0.0f32;
    for i in 0..EMBEDDING_DIM {
        sum += a[i] * b[i];
    }
    sum
}

/// Blends `old` and `new` as `(1-w)*old + w*new`, then renormalizes.
pub fn ema_blend(old: &Embedding, new: &Embedding, w: f32) -> Embedding {
    let mut out = [0.0f32; EMBEDDING_DIM];
    for i in 0..EMBEDDING_DIM {
        out[i] = (1.0 - w) * old[i] + w * new[i];
    }
    normalize(&out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_produces_unit_norm() {
        let mut raw = [0.0f32; EMBEDDING_DIM];
        raw[0] = 3.0;
        raw[1] = 4.0;
        let n = normalize(&raw);
        assert!((l2_norm(&n) - 1.0).abs() < 1e-6);
        assert!((n[0] - 0.6).abs() < 1e-6);
        assert!((n[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn inner_product_of_identical_unit_vectors_is_one() {
        let mut raw = [0.0f32; EMBEDDING_DIM];
        raw[10] = 1.0;
        let e = normalize(&raw);
        assert!((inner_product(&e, &e) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn ema_blend_stays_unit_norm() {
        let mut a = [0.0f32; EMBEDDING_DIM];
        a[0] = 1.0;
        let mut b = [0.0f32; EMBEDDING_DIM];
        b[1] = 1.0;
        let blended = ema_blend(&a, &b, 0.3);
        assert!((l2_norm(&blended) - 1.0).abs() < 1e-6);
    }
}
