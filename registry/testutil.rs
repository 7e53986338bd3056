// This file is part of Facetrack, a multi-stream face re-identification service.
// See AUTHORS and LICENSE.

//! Fixture helpers shared by this crate's `#[cfg(test)]` modules and
//! available to the binary crate's own tests under the `testutil` feature.

use jiff::{SignedDuration, Timestamp};

use crate::geometry::BBox;
use crate::vector::{normalize, Embedding, EMBEDDING_DIM};

/// A deterministic unit-norm embedding, distinct for each `seed`.
pub fn fixture_embedding(seed: usize) -> Embedding {
    let mut raw = [0.0f32; EMBEDDING_DIM];
    raw[seed % EMBEDDING_DIM] = 1.0;
    normalize(&raw)
}

/// A second embedding whose cosine similarity to `base` is roughly `cos`, by
/// blending in an orthogonal unit component. Useful for exercising
/// threshold-adjacent behavior without hand-deriving the exact blend factor.
pub fn fixture_embedding_at_cosine(base: &Embedding, seed: usize, cos: f32) -> Embedding {
    let k = ((1.0 / (cos * cos)) - 1.0).sqrt();
    let mut raw = *base;
    raw[seed % EMBEDDING_DIM] += k;
    normalize(&raw)
}

/// A square bbox of the given side length centered at `(cx, cy)`.
pub fn fixture_bbox(cx: i32, cy: i32, side: i32) -> BBox {
    let half = side / 2;
    BBox::new(cx - half, cy - half, cx + half, cy + half)
}

/// The Unix epoch offset by `secs` seconds, for building deterministic test
/// timelines without touching the wall clock.
pub fn fixture_time(secs: f64) -> Timestamp {
    Timestamp::UNIX_EPOCH
        .checked_add(SignedDuration::try_from(std::time::Duration::from_secs_f64(secs)).unwrap())
        .unwrap()
}
