// This file is part of Facetrack, a multi-stream face re-identification service.
// See AUTHORS and LICENSE.

//! Re-link probation: a candidate identity is not reused off a single strong
//! hit. Sustained evidence over `relink_duration_s` must accumulate first
//! (§4.3 Step D / Step G).

use jiff::Timestamp;

#[derive(Clone, Copy, Debug)]
pub struct ReLinkProbation {
    pub start_ts: Timestamp,
    pub last_ts: Timestamp,
    pub best_sim: f32,
}

impl ReLinkProbation {
    pub fn new(now: Timestamp, sim: f32) -> Self {
        ReLinkProbation {
            start_ts: now,
            last_ts: now,
            best_sim: sim,
        }
    }

    /// Records another hit against this candidate; only a new observation
    /// advances probation, never the mere passage of time.
    pub fn record_hit(&mut self, now: Timestamp, sim: f32) {
        self.last_ts = now;
        self.best_sim = self.best_sim.max(sim);
    }

    /// Whether sustained evidence now meets the bar to commit the assignment.
    pub fn ready(&self, now: Timestamp, relink_duration_s: f64, relink_min_confidence: f32) -> bool {
        now.duration_since(self.start_ts).as_secs_f64() >= relink_duration_s
            && self.best_sim >= relink_min_confidence
    }

    pub fn expired(&self, now: Timestamp, pending_timeout_s: f64) -> bool {
        now.duration_since(self.last_ts).as_secs_f64() > pending_timeout_s
    }
}
