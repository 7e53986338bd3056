// This file is part of Facetrack, a multi-stream face re-identification service.
// See AUTHORS and LICENSE.

//! Every numeric constant the tracker's decision pipeline consults, collected
//! in one place so a deployment can retune without touching the algorithm.

/// Tunables for the identity tracker. `TrackerConfig::default()` is the single
/// source of truth for the values named throughout the tracker's decision
/// pipeline; every instance the binary constructs starts from it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackerConfig {
    /// Step A: reject observations smaller than this in either dimension.
    pub min_face_size: i32,

    /// Step C / Step F: how recently an identity must have been seen in the
    /// same stream to qualify for spatial-temporal reuse.
    pub reuse_time_window_s: f64,

    /// Step C / Step F: how close (pixels) an observation's center must be to
    /// a candidate identity's last-bbox center to qualify for reuse.
    pub reuse_distance_px: f32,

    /// Step D: similarity floor for "strong spatial + ok similarity".
    pub tracking_threshold: f32,

    /// Step D: IoU floor for "strong spatial + ok similarity".
    pub tracking_iou_threshold: f32,

    /// Step D: similarity floor for "very high similarity unconditional".
    pub tracking_unconditional_threshold: f32,

    /// Step D / Step G: a re-link probation must last this long before it can
    /// commit to an assignment.
    pub relink_duration_s: f64,

    /// Step D / Step G: minimum best-seen similarity for a probation to commit.
    pub relink_min_confidence: f32,

    /// Step D: how many nearest identities to pull from the vector index.
    pub vector_index_search_k: usize,

    /// Step E: observation count at which a pending track is promoted to a
    /// new identity.
    pub min_appearances_for_id: u32,

    /// Step E: broadcast-cosine floor for reusing an existing identity instead
    /// of accumulating a pending track.
    pub broadcast_reuse_threshold: f32,

    /// Step F: IoU floor for occlusion reuse.
    pub occlusion_iou_threshold: f32,

    /// Step F: nominal similarity recorded for an occlusion-reuse assignment,
    /// used only by Step H's EMA weight.
    pub occlusion_nominal_sim: f32,

    /// Step C: nominal similarity recorded for a same-stream spatial-temporal
    /// reuse assignment, used only by Step H's EMA weight. The source's fixed
    /// embedding blend factor of 0.3 corresponds to this value.
    pub spatial_reuse_nominal_sim: f32,

    /// Step G: broadcast-cosine floor below which a brand new identity is
    /// created (above it, a re-link probation is recorded/consulted instead).
    pub similarity_reuse_threshold: f32,

    /// Step G: maximum number of simultaneously active identities.
    pub max_identities: usize,

    /// Step J: new-identity creations between consolidation passes.
    pub consolidation_check_interval: u32,

    /// Step J: new-identity creations between full maintenance cycles
    /// (cleanup + consolidation + index rebuild).
    pub rebuild_interval: u32,

    /// §4.4: cosine floor for a co-activity-gated merge.
    pub immediate_merge_threshold: f32,

    /// §4.4: the two identities must have been seen within this many seconds
    /// of each other for the co-activity-gated merge to apply.
    pub immediate_merge_time_window_s: f64,

    /// §4.4: IoU floor for a merge, ungated by recency.
    pub immediate_merge_iou: f32,

    /// §4.4: cosine floor for an ungated merge.
    pub consolidation_threshold: f32,

    /// §4.5: identities unseen longer than this are evicted on cleanup.
    pub face_timeout_s: f64,

    /// §4.5: pending tracks and re-link probations unseen longer than this
    /// are dropped on cleanup.
    pub pending_timeout_s: f64,

    /// §4.2: number of top watchlist matches the classifier considers.
    pub watchlist_top_k: usize,

    /// §4.2: cosine floor for a watchlist match to mark an identity suspicious.
    pub watchlist_threshold: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            min_face_size: 24,
            reuse_time_window_s: 3.0,
            reuse_distance_px: 120.0,
            tracking_threshold: 0.50,
            tracking_iou_threshold: 0.3,
            tracking_unconditional_threshold: 0.8,
            relink_duration_s: 3.0,
            relink_min_confidence: 0.35,
            vector_index_search_k: 10,
            min_appearances_for_id: 3,
            broadcast_reuse_threshold: 0.80,
            occlusion_iou_threshold: 0.2,
            occlusion_nominal_sim: 0.6,
            spatial_reuse_nominal_sim: 1.0,
            similarity_reuse_threshold: 0.65,
            max_identities: 1000,
            consolidation_check_interval: 20,
            rebuild_interval: 100,
            immediate_merge_threshold: 0.80,
            immediate_merge_time_window_s: 2.0,
            immediate_merge_iou: 0.45,
            consolidation_threshold: 0.65,
            face_timeout_s: 30.0,
            pending_timeout_s: 3.0,
            watchlist_top_k: 1,
            watchlist_threshold: 0.45,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_literals() {
        let c = TrackerConfig::default();
        assert_eq!(c.min_face_size, 24);
        assert_eq!(c.max_identities, 1000);
        assert_eq!(c.rebuild_interval, 100);
    }
}
