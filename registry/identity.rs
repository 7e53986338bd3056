// This file is part of Facetrack, a multi-stream face re-identification service.
// See AUTHORS and LICENSE.

//! The `Identity` record: everything the registry knows about one tracked
//! person, kept in a single owning map rather than the parallel per-field
//! maps the original service used. One map means an update to one field can
//! never drift out of sync with another.

use jiff::Timestamp;

use crate::geometry::BBox;
use crate::vector::Embedding;
use crate::watchlist::WatchlistMatch;

#[derive(Clone, Debug)]
pub struct Identity {
    pub id: u64,
    pub embedding: Embedding,
    pub last_bbox: BBox,
    pub last_seen: Timestamp,
    pub owning_stream: String,
    pub checked_in_db: bool,
    pub suspicious: bool,
    pub watchlist_match: Option<WatchlistMatch>,
    pub created_at: Timestamp,
}

impl Identity {
    pub fn new(id: u64, embedding: Embedding, bbox: BBox, stream_id: &str, now: Timestamp) -> Self {
        Identity {
            id,
            embedding,
            last_bbox: bbox,
            last_seen: now,
            owning_stream: stream_id.to_owned(),
            checked_in_db: false,
            suspicious: false,
            watchlist_match: None,
            created_at: now,
        }
    }

    pub fn seconds_since_seen(&self, now: Timestamp) -> f64 {
        now.duration_since(self.last_seen).as_secs_f64()
    }
}
