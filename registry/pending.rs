// This file is part of Facetrack, a multi-stream face re-identification service.
// See AUTHORS and LICENSE.

//! Pending tracks: unpromoted clusters of observations in one (stream,
//! spatial cell), accumulated until they're confident enough to become a
//! full `Identity` (§4.3 Step E).

use jiff::Timestamp;

use crate::geometry::BBox;
use crate::vector::{ema_blend, Embedding};

pub type CellKey = (i32, i32);

#[derive(Clone, Debug)]
pub struct PendingTrack {
    pub stream_id: String,
    pub cell: CellKey,
    pub count: u32,
    pub first_ts: Timestamp,
    pub last_ts: Timestamp,
    pub embedding: Embedding,
    pub last_bbox: BBox,
}

impl PendingTrack {
    pub fn new(stream_id: &str, cell: CellKey, embedding: Embedding, bbox: BBox, now: Timestamp) -> Self {
        PendingTrack {
            stream_id: stream_id.to_owned(),
            cell,
            count: 1,
            first_ts: now,
            last_ts: now,
            embedding,
            last_bbox: bbox,
        }
    }

    /// Folds a new observation in: running average embedding `0.7*old + 0.3*new`,
    /// renormalized, plus bbox/timestamp/count updates.
    pub fn update(&mut self, embedding: &Embedding, bbox: BBox, now: Timestamp) {
        self.embedding = ema_blend(&self.embedding, embedding, 0.3);
        self.last_bbox = bbox;
        self.last_ts = now;
        self.count += 1;
    }

    pub fn expired(&self, now: Timestamp, pending_timeout_s: f64) -> bool {
        now.duration_since(self.last_ts).as_secs_f64() > pending_timeout_s
    }
}
