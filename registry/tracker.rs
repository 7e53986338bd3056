// This file is part of Facetrack, a multi-stream face re-identification service.
// See AUTHORS and LICENSE.

//! The tracker core (§4.3): the hard part. `Tracker::process` runs the
//! decision pipeline — Steps A through J — under one exclusive lock shared by
//! every stream worker.
//!
//! Implementation notes on two places the prose spec under-specifies, pinned
//! here rather than left to drift between call sites:
//!
//! - Step C's embedding-update weight has no literal nominal similarity in
//!   the spec (only Step F's 0.6 is given). We use 1.0: a same-stream,
//!   same-cluster spatial match within the reuse window is treated as
//!   maximal confidence, which reproduces the source's fixed 0.3 embedding
//!   blend factor (`w = min(0.5, 1.0*0.3) = 0.3`).
//! - Step F's `recent_nearby_exists` flag is read by the literal spec text as
//!   always false by the time Step G runs (it's only set on the same branch
//!   that already returns). We treat it instead as "Step F's scan observed
//!   at least one same-stream, recently-seen identity, whether or not it was
//!   close enough to reuse" — the only reading under which Step G's
//!   duplicate-creation guard does anything.
//! - A brand-new identity (Step G's final branch) does not additionally run
//!   Step H's EMA/bbox-smoothing update against itself; it already holds its
//!   definitive initial embedding and bbox. Step H applies only to the reuse
//!   paths (Steps C, D, E's shortcuts, F, G's probation branch).
//! - Step E's "broadcast similarity reuse" shortcut only considers identities
//!   seen within `reuse_time_window_s`. Taken literally over *all* active
//!   identities, it would make Step D's and Step G's re-link probation dead
//!   weight: an identity with cosine ≥ 0.80 always clears this shortcut too,
//!   so a long-absent identity being slowly re-linked (scenario: hours-long
//!   gap, identical embedding) would be reinstated on the very first
//!   candidate frame instead of waiting out `relink_duration_s`. Restricting
//!   the shortcut to recently-seen identities keeps it what its name
//!   suggests — a same-moment cross-stream dedup net — while leaving
//!   long-absence re-linking to probation.
//! - Step G's final "else allocate new_id" branch only fires when Step G is
//!   entered via Step E's promotion skip (the pending track already reached
//!   `min_appearances_for_id`). Read as a standalone, always-reachable
//!   fallthrough, it would create an identity on a face's very first
//!   observation — pending tracks would never gate anything. When Step G is
//!   reached by ordinary fallthrough (Step F found nothing) without a
//!   satisfied promotion, the observation is simply rejected, leaving the
//!   pending track to keep accumulating. Step G's re-link/broadcast checks
//!   still run either way, since those reuse an *existing* identity rather
//!   than create one.

use std::collections::{BTreeMap, HashMap};

use jiff::Timestamp;
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::geometry::BBox;
use crate::identity::Identity;
use crate::index::VectorIndex;
use crate::maintenance;
use crate::pending::{CellKey, PendingTrack};
use crate::relink::ReLinkProbation;
use crate::vector::{inner_product, normalize, Embedding};
use crate::watchlist::{Watchlist, WatchlistMatch};

/// Everything the tracker mutates under its one lock.
pub struct LockedRegistry {
    pub(crate) identities: BTreeMap<u64, Identity>,
    pub(crate) index: VectorIndex,
    pub(crate) pending: HashMap<(String, CellKey), PendingTrack>,
    pub(crate) relink: HashMap<u64, ReLinkProbation>,
    pub(crate) next_id: u64,
    pub(crate) lifetime_faces: u64,
    pub(crate) faces_since_rebuild: u32,
}

impl LockedRegistry {
    fn new() -> Self {
        LockedRegistry {
            identities: BTreeMap::new(),
            index: VectorIndex::new(),
            pending: HashMap::new(),
            relink: HashMap::new(),
            next_id: 0,
            lifetime_faces: 0,
            faces_since_rebuild: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stats {
    pub lifetime_faces: u64,
    pub active_faces: usize,
    pub suspicious_faces: usize,
    pub clean_faces: usize,
    pub next_id: u64,
}

/// The shared identity tracker. One instance serves every stream worker.
pub struct Tracker {
    config: TrackerConfig,
    watchlist: arc_swap::ArcSwap<Watchlist>,
    locked: std::sync::Mutex<LockedRegistry>,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        Tracker {
            config,
            watchlist: arc_swap::ArcSwap::from_pointee(Watchlist::empty()),
            locked: std::sync::Mutex::new(LockedRegistry::new()),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Atomically replaces the watchlist snapshot. Existing identities keep
    /// their `suspicious` flag; only future first-time checks see new data
    /// (§7, §9 "checked once" decision).
    pub fn reload_watchlist(&self, watchlist: Watchlist) {
        info!(records = watchlist.len(), "reloaded watchlist");
        self.watchlist.store(std::sync::Arc::new(watchlist));
    }

    pub fn watchlist_len(&self) -> usize {
        self.watchlist.load().len()
    }

    /// The tracker's single public entry point (§4.3). Must be called once
    /// per detected face per frame per stream.
    pub fn process(
        &self,
        embedding_raw: &Embedding,
        bbox: BBox,
        stream_id: &str,
        now: Timestamp,
    ) -> (Option<u64>, bool, BBox) {
        let cfg = &self.config;
        let watchlist = self.watchlist.load();
        let mut reg = self.locked.lock().unwrap();

        // Step A: size gate.
        if bbox.width() < cfg.min_face_size || bbox.height() < cfg.min_face_size {
            return (None, false, bbox);
        }

        // Step B: normalization.
        let embedding = normalize(embedding_raw);
        let center = bbox.center();

        // Step C: fast spatial-temporal reuse (same stream).
        if let Some(id) = same_stream_nearby(&reg, stream_id, center, now, cfg, bbox) {
            return finish_reuse(&mut reg, cfg, &watchlist, id, cfg.spatial_reuse_nominal_sim, &embedding, bbox, stream_id, now);
        }

        // Step D: vector-index re-identification with spatial check and probation.
        if reg.index.len() > 0 {
            let candidates = reg.index.search(&embedding, cfg.vector_index_search_k);
            for (sim, cand_id) in candidates {
                let iou = reg
                    .identities
                    .get(&cand_id)
                    .map(|i| bbox.iou(&i.last_bbox))
                    .unwrap_or(0.0);
                let strong_spatial = iou > cfg.tracking_iou_threshold && sim > cfg.tracking_threshold;
                let high_sim_no_spatial = sim > cfg.tracking_threshold + 0.15;
                let very_high = sim > cfg.tracking_unconditional_threshold;
                if strong_spatial || high_sim_no_spatial || very_high {
                    let ready = {
                        let p = reg
                            .relink
                            .entry(cand_id)
                            .and_modify(|p| p.record_hit(now, sim))
                            .or_insert_with(|| ReLinkProbation::new(now, sim));
                        p.ready(now, cfg.relink_duration_s, cfg.relink_min_confidence)
                    };
                    if ready {
                        let best_sim = reg.relink.remove(&cand_id).unwrap().best_sim;
                        return finish_reuse(&mut reg, cfg, &watchlist, cand_id, best_sim, &embedding, bbox, stream_id, now);
                    }
                    // Not yet ready: no assignment from Step D this frame.
                    break;
                }
            }
        }

        // Step E: pending-track promotion.
        let cell = bbox.grid_cell();
        let key = (stream_id.to_owned(), cell);
        let promoted_embedding = {
            let track = reg
                .pending
                .entry(key.clone())
                .and_modify(|t| t.update(&embedding, bbox, now))
                .or_insert_with(|| PendingTrack::new(stream_id, cell, embedding, bbox, now));
            if track.count >= cfg.min_appearances_for_id {
                Some(track.embedding)
            } else {
                None
            }
        };

        // Broadcast similarity reuse shortcut: a same-moment dedup net, not a
        // substitute for probation on a long-absent identity.
        if let Some((max_sim, best_id)) = broadcast_max_cosine_recent(&reg, &embedding, now, cfg.reuse_time_window_s) {
            if max_sim >= cfg.broadcast_reuse_threshold {
                return finish_reuse(&mut reg, cfg, &watchlist, best_id, max_sim, &embedding, bbox, stream_id, now);
            }
        }

        if let Some(avg_embedding) = promoted_embedding {
            reg.pending.remove(&key);
            return step_g(&mut reg, cfg, &watchlist, &avg_embedding, bbox, stream_id, now, false, true);
        }

        // Step F: occlusion reuse (last-resort nearby identity).
        let mut recent_nearby_exists = false;
        let mut occlusion_hit = None;
        for (&id, identity) in reg.identities.iter() {
            if identity.owning_stream != stream_id {
                continue;
            }
            if identity.seconds_since_seen(now) > cfg.reuse_time_window_s {
                continue;
            }
            recent_nearby_exists = true;
            let iou = bbox.iou(&identity.last_bbox);
            let dist = bbox.center_distance(&identity.last_bbox);
            if iou > cfg.occlusion_iou_threshold || dist <= cfg.reuse_distance_px {
                occlusion_hit = Some(id);
                break;
            }
        }
        if let Some(id) = occlusion_hit {
            return finish_reuse(&mut reg, cfg, &watchlist, id, cfg.occlusion_nominal_sim, &embedding, bbox, stream_id, now);
        }

        // Step G: new-identity creation (or one more probation check).
        step_g(&mut reg, cfg, &watchlist, &embedding, bbox, stream_id, now, recent_nearby_exists, false)
    }

    pub fn stats(&self) -> Stats {
        let reg = self.locked.lock().unwrap();
        let suspicious = reg.identities.values().filter(|i| i.suspicious).count();
        Stats {
            lifetime_faces: reg.lifetime_faces,
            active_faces: reg.identities.len(),
            suspicious_faces: suspicious,
            clean_faces: reg.identities.len() - suspicious,
            next_id: reg.next_id,
        }
    }

    pub fn suspicious_matches(&self) -> Vec<(u64, WatchlistMatch)> {
        let reg = self.locked.lock().unwrap();
        reg.identities
            .iter()
            .filter_map(|(&id, i)| i.watchlist_match.clone().map(|m| (id, m)))
            .collect()
    }

    pub fn force_cleanup(&self, now: Timestamp) {
        let mut reg = self.locked.lock().unwrap();
        maintenance::cleanup(&mut reg, &self.config, now);
    }

    pub fn force_consolidate(&self, now: Timestamp) {
        let mut reg = self.locked.lock().unwrap();
        maintenance::consolidate(&mut reg, &self.config, now);
    }

    /// Forces creation of an identity bypassing the decision pipeline, for
    /// tests exercising consolidation and cleanup in isolation (§8 Scenario 6).
    #[cfg(any(test, feature = "testutil"))]
    pub fn force_create_identity(&self, embedding: &Embedding, bbox: BBox, stream_id: &str, now: Timestamp) -> u64 {
        let mut reg = self.locked.lock().unwrap();
        let e = normalize(embedding);
        let id = reg.next_id;
        reg.next_id += 1;
        reg.lifetime_faces += 1;
        reg.index.add(id, &e).expect("fresh id cannot collide");
        reg.identities.insert(id, Identity::new(id, e, bbox, stream_id, now));
        id
    }

    #[cfg(any(test, feature = "testutil"))]
    pub fn set_suspicious_for_test(&self, id: u64, m: WatchlistMatch) {
        let mut reg = self.locked.lock().unwrap();
        if let Some(i) = reg.identities.get_mut(&id) {
            i.checked_in_db = true;
            i.suspicious = true;
            i.watchlist_match = Some(m);
        }
    }
}

fn same_stream_nearby(
    reg: &LockedRegistry,
    stream_id: &str,
    center: (f32, f32),
    now: Timestamp,
    cfg: &TrackerConfig,
    bbox: BBox,
) -> Option<u64> {
    let mut best: Option<(f32, u64)> = None;
    for (&id, identity) in reg.identities.iter() {
        if identity.owning_stream != stream_id {
            continue;
        }
        if identity.seconds_since_seen(now) > cfg.reuse_time_window_s {
            continue;
        }
        let (ix, iy) = identity.last_bbox.center();
        let dist = ((center.0 - ix).powi(2) + (center.1 - iy).powi(2)).sqrt();
        if dist <= cfg.reuse_distance_px && best.map(|(bd, _)| dist < bd).unwrap_or(true) {
            best = Some((dist, id));
        }
    }
    let _ = bbox;
    best.map(|(_, id)| id)
}

fn broadcast_max_cosine(reg: &LockedRegistry, embedding: &Embedding) -> Option<(f32, u64)> {
    reg.identities
        .iter()
        .map(|(&id, i)| (inner_product(embedding, &i.embedding), id))
        .max_by(|a, b| a.0.total_cmp(&b.0))
}

/// As [`broadcast_max_cosine`], but restricted to identities seen within
/// `reuse_time_window_s` — the same-moment dedup net Step E's shortcut is
/// meant to be (see module doc comment).
fn broadcast_max_cosine_recent(reg: &LockedRegistry, embedding: &Embedding, now: Timestamp, reuse_time_window_s: f64) -> Option<(f32, u64)> {
    reg.identities
        .iter()
        .filter(|(_, i)| i.seconds_since_seen(now) <= reuse_time_window_s)
        .map(|(&id, i)| (inner_product(embedding, &i.embedding), id))
        .max_by(|a, b| a.0.total_cmp(&b.0))
}

#[allow(clippy::too_many_arguments)]
fn step_g(
    reg: &mut LockedRegistry,
    cfg: &TrackerConfig,
    watchlist: &Watchlist,
    embedding: &Embedding,
    bbox: BBox,
    stream_id: &str,
    now: Timestamp,
    recent_nearby_exists: bool,
    may_create: bool,
) -> (Option<u64>, bool, BBox) {
    if let Some((sim, id)) = broadcast_max_cosine(reg, embedding) {
        if sim >= cfg.similarity_reuse_threshold {
            let ready = {
                let p = reg
                    .relink
                    .entry(id)
                    .and_modify(|p| p.record_hit(now, sim))
                    .or_insert_with(|| ReLinkProbation::new(now, sim));
                p.ready(now, cfg.relink_duration_s, cfg.relink_min_confidence)
            };
            if ready {
                let best_sim = reg.relink.remove(&id).unwrap().best_sim;
                return finish_reuse(reg, cfg, watchlist, id, best_sim, embedding, bbox, stream_id, now);
            }
            return (None, false, bbox);
        }
    }
    if recent_nearby_exists {
        return (None, false, bbox);
    }
    if reg.identities.len() >= cfg.max_identities {
        warn!(capacity = cfg.max_identities, "registry at capacity, dropping observation");
        return (None, false, bbox);
    }
    if !may_create {
        return (None, false, bbox);
    }
    create_identity(reg, cfg, watchlist, embedding, bbox, stream_id, now)
}

#[allow(clippy::too_many_arguments)]
fn finish_reuse(
    reg: &mut LockedRegistry,
    cfg: &TrackerConfig,
    watchlist: &Watchlist,
    id: u64,
    sim: f32,
    observation: &Embedding,
    bbox_obs: BBox,
    stream_id: &str,
    now: Timestamp,
) -> (Option<u64>, bool, BBox) {
    reg.relink.remove(&id);
    let w = (sim * 0.3).min(0.5);
    let smoothed = {
        let identity = reg.identities.get_mut(&id).expect("assigned id must be active");
        let new_emb = crate::vector::ema_blend(&identity.embedding, observation, w);
        let smoothed = bbox_obs.smoothed(&identity.last_bbox);
        identity.embedding = new_emb;
        identity.last_bbox = smoothed;
        identity.last_seen = now;
        identity.owning_stream = stream_id.to_owned();
        smoothed
    };
    reg.index
        .update(id, &reg.identities[&id].embedding)
        .expect("assigned id must be indexed");
    let suspicious = check_watchlist(reg, watchlist, cfg, id);
    debug!(id, sim, "reused identity");
    (Some(id), suspicious, smoothed)
}

fn create_identity(
    reg: &mut LockedRegistry,
    cfg: &TrackerConfig,
    watchlist: &Watchlist,
    embedding: &Embedding,
    bbox: BBox,
    stream_id: &str,
    now: Timestamp,
) -> (Option<u64>, bool, BBox) {
    let id = reg.next_id;
    reg.next_id += 1;
    reg.lifetime_faces += 1;
    reg.index.add(id, embedding).expect("fresh id cannot collide");
    reg.identities
        .insert(id, Identity::new(id, *embedding, bbox, stream_id, now));
    let suspicious = check_watchlist(reg, watchlist, cfg, id);
    info!(id, stream_id, "created identity");

    reg.faces_since_rebuild += 1;
    if reg.faces_since_rebuild % cfg.consolidation_check_interval == 0 {
        maintenance::consolidate(reg, cfg, now);
    }
    if reg.faces_since_rebuild >= cfg.rebuild_interval {
        maintenance::cleanup(reg, cfg, now);
        maintenance::consolidate(reg, cfg, now);
        let entries: Vec<(u64, Embedding)> = reg.identities.iter().map(|(&id, i)| (id, i.embedding)).collect();
        reg.index.rebuild(entries.iter().map(|(id, e)| (*id, e)));
        reg.faces_since_rebuild = 0;
    }

    (Some(id), suspicious, bbox)
}

/// Step I: first-time watchlist check. Returns the identity's (possibly
/// just-set) suspicious flag.
fn check_watchlist(reg: &mut LockedRegistry, watchlist: &Watchlist, cfg: &TrackerConfig, id: u64) -> bool {
    let identity = reg.identities.get_mut(&id).expect("checked id must be active");
    if identity.checked_in_db {
        return identity.suspicious;
    }
    identity.checked_in_db = true;
    if watchlist.is_empty() {
        identity.suspicious = false;
        return false;
    }
    match watchlist.classify(&identity.embedding, cfg.watchlist_top_k, cfg.watchlist_threshold) {
        Some(m) => {
            identity.suspicious = true;
            identity.watchlist_match = Some(m);
            true
        }
        None => {
            identity.suspicious = false;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::EMBEDDING_DIM;
    use crate::watchlist::WatchlistRecord;
    use jiff::SignedDuration;

    fn at(secs: f64) -> Timestamp {
        Timestamp::UNIX_EPOCH.checked_add(SignedDuration::try_from(std::time::Duration::from_secs_f64(secs)).unwrap()).unwrap()
    }

    fn e(seed: usize) -> Embedding {
        let mut raw = [0.0f32; EMBEDDING_DIM];
        raw[seed] = 1.0;
        normalize(&raw)
    }

    fn noisy(base: &Embedding, seed: usize) -> Embedding {
        let mut raw = *base;
        raw[seed] += 0.05;
        normalize(&raw)
    }

    #[test]
    fn scenario_1_cold_start_promotion_on_third_frame() {
        let t = Tracker::new(TrackerConfig::default());
        let emb = e(0);
        let b1 = BBox::new(100, 100, 200, 200);
        let b2 = BBox::new(102, 100, 202, 200);
        let b3 = BBox::new(105, 100, 205, 200);

        let (id1, susp1, _) = t.process(&emb, b1, "s1", at(0.0));
        assert_eq!(id1, None);
        assert!(!susp1);

        let (id2, _, _) = t.process(&emb, b2, "s1", at(0.1));
        assert_eq!(id2, None);

        let (id3, susp3, _) = t.process(&emb, b3, "s1", at(0.2));
        assert_eq!(id3, Some(0));
        assert!(!susp3);

        let stats = t.stats();
        assert_eq!(stats.lifetime_faces, 1);
        assert_eq!(stats.active_faces, 1);
    }

    #[test]
    fn scenario_2_occlusion_gap_under_reuse_window() {
        let t = Tracker::new(TrackerConfig::default());
        let emb = e(0);
        t.process(&emb, BBox::new(100, 100, 200, 200), "s1", at(0.0));
        t.process(&emb, BBox::new(102, 100, 202, 200), "s1", at(0.1));
        t.process(&emb, BBox::new(105, 100, 205, 200), "s1", at(0.2));

        let e4 = noisy(&emb, 1);
        let (id4, susp4, _) = t.process(&e4, BBox::new(108, 100, 208, 200), "s1", at(2.5));
        assert_eq!(id4, Some(0));
        assert!(!susp4);
    }

    #[test]
    fn scenario_3_long_absence_requires_sustained_probation() {
        let t = Tracker::new(TrackerConfig::default());
        let emb = e(0);
        t.process(&emb, BBox::new(100, 100, 200, 200), "s1", at(0.0));
        t.process(&emb, BBox::new(102, 100, 202, 200), "s1", at(0.1));
        t.process(&emb, BBox::new(105, 100, 205, 200), "s1", at(0.2));

        let bbox = BBox::new(108, 100, 208, 200);
        let mut last = (None, false, bbox);
        let mut time = 5.0;
        while time < 8.0 {
            last = t.process(&emb, bbox, "s1", at(time));
            assert_eq!(last.0, None, "should stay pending before relink_duration_s elapses (t={time})");
            time += 0.1;
        }
        let (id, susp, _) = t.process(&emb, bbox, "s1", at(8.0));
        assert_eq!(id, Some(0));
        assert!(!susp);
        let _ = last;
    }

    #[test]
    fn scenario_4_duplicate_prevention_across_streams() {
        let t = Tracker::new(TrackerConfig::default());
        let emb = e(0);
        let bbox = BBox::new(100, 100, 200, 200);

        t.process(&emb, bbox, "s1", at(0.0));
        t.process(&emb, bbox, "s2", at(0.05));
        t.process(&emb, bbox, "s1", at(0.1));
        t.process(&emb, bbox, "s2", at(0.15));
        let (id_s1, _, _) = t.process(&emb, bbox, "s1", at(0.2));
        assert_eq!(id_s1, Some(0));

        let (id_s2, _, _) = t.process(&emb, bbox, "s2", at(0.25));
        assert_eq!(id_s2, Some(0));

        assert_eq!(t.stats().lifetime_faces, 1);
    }

    #[test]
    fn scenario_5_watchlist_match_on_promotion() {
        let t = Tracker::new(TrackerConfig::default());
        let emb = e(0);
        let mut wl_raw = emb;
        wl_raw[5] = 0.9; // cosine with emb will land near 0.7 once normalized
        let wl_emb = normalize(&wl_raw);
        t.reload_watchlist(Watchlist::new(vec![WatchlistRecord {
            store_id: 1,
            name: "Suspect".into(),
            nickname: None,
            age: None,
            police_station: None,
            crime_and_section: None,
            head_of_crime: None,
            arrested_date: None,
            image_url: None,
            embedding: wl_emb,
        }]));

        t.process(&emb, BBox::new(100, 100, 200, 200), "s1", at(0.0));
        t.process(&emb, BBox::new(102, 100, 202, 200), "s1", at(0.1));
        let (id, susp, _) = t.process(&emb, BBox::new(105, 100, 205, 200), "s1", at(0.2));
        assert_eq!(id, Some(0));
        assert!(susp);
        assert_eq!(t.stats().suspicious_faces, 1);
        let matches = t.suspicious_matches();
        assert_eq!(matches.len(), 1);
        assert!(matches[0].1.score > 0.45);
    }

    #[test]
    fn scenario_6_consolidation_merges_two_ids() {
        let t = Tracker::new(TrackerConfig::default());
        let a = e(0);
        let mut b_raw = a;
        b_raw[7] = 0.9;
        let b = normalize(&b_raw);
        assert!((inner_product(&a, &b) - 0.7).abs() < 0.05);

        let id_a = t.force_create_identity(&a, BBox::new(0, 0, 50, 50), "s1", at(0.0));
        let id_b = t.force_create_identity(&b, BBox::new(500, 500, 550, 550), "s1", at(0.0));
        t.set_suspicious_for_test(
            id_b,
            WatchlistMatch {
                record: WatchlistRecord {
                    store_id: 9,
                    name: "x".into(),
                    nickname: None,
                    age: None,
                    police_station: None,
                    crime_and_section: None,
                    head_of_crime: None,
                    arrested_date: None,
                    image_url: None,
                    embedding: b,
                },
                score: 0.9,
            },
        );

        t.force_consolidate(at(0.0));

        let stats = t.stats();
        assert_eq!(stats.active_faces, 1);
        assert_eq!(id_a, 0);
        assert_eq!(id_b, 1);
        assert_eq!(stats.suspicious_faces, 1);
    }

    #[test]
    fn invariant_cleanup_evicts_only_stale_identities() {
        let t = Tracker::new(TrackerConfig::default());
        t.force_create_identity(&e(0), BBox::new(0, 0, 50, 50), "s1", at(0.0));
        t.force_create_identity(&e(1), BBox::new(0, 0, 50, 50), "s1", at(29.0));
        t.force_cleanup(at(31.0));
        assert_eq!(t.stats().active_faces, 1);
    }

    #[test]
    fn size_gate_rejects_small_boxes() {
        let t = Tracker::new(TrackerConfig::default());
        let (id, susp, _) = t.process(&e(0), BBox::new(0, 0, 10, 10), "s1", at(0.0));
        assert_eq!(id, None);
        assert!(!susp);
        assert_eq!(t.stats().active_faces, 0);
    }

    #[test]
    fn capacity_limit_rejects_new_identities_over_max() {
        let mut cfg = TrackerConfig::default();
        cfg.max_identities = 1;
        let t = Tracker::new(cfg);
        t.force_create_identity(&e(0), BBox::new(0, 0, 50, 50), "s1", at(0.0));

        // A dissimilar, spatially distant face should be rejected: capacity is full.
        let far = e(400);
        let (id, _, _) = t.process(&far, BBox::new(900, 900, 950, 950), "s2", at(0.0));
        assert_eq!(id, None);
        assert_eq!(t.stats().active_faces, 1);
    }
}
