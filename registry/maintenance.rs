// This file is part of Facetrack, a multi-stream face re-identification service.
// See AUTHORS and LICENSE.

//! Periodic maintenance (§4.4 consolidation, §4.5 cleanup), triggered off the
//! new-identity counter in the tracker's decision pipeline (§4.3 Step J).

use std::collections::HashSet;

use jiff::Timestamp;
use tracing::info;

use crate::config::TrackerConfig;
use crate::tracker::LockedRegistry;
use crate::vector::{ema_blend, inner_product};
use crate::watchlist::WatchlistMatch;

/// Merges identities that plausibly represent the same person.
///
/// The co-activity-gated (`immediate_merge_threshold`) and ungated
/// (`consolidation_threshold`) conditions are intentionally asymmetric —
/// preserved from the source as documented (spec design notes), not a bug.
pub fn consolidate(reg: &mut LockedRegistry, cfg: &TrackerConfig, _now: Timestamp) {
    let ids: Vec<u64> = reg.identities.keys().copied().collect();
    let mut consumed: HashSet<u64> = HashSet::new();

    for &a in &ids {
        if consumed.contains(&a) || !reg.identities.contains_key(&a) {
            continue;
        }
        let mut merged_any = false;
        for &b in &ids {
            if b <= a || consumed.contains(&b) {
                continue;
            }
            let Some(b_snapshot) = reg.identities.get(&b).cloned() else {
                continue;
            };
            let (a_embedding, a_bbox, a_seen) = {
                let a_identity = &reg.identities[&a];
                (a_identity.embedding, a_identity.last_bbox, a_identity.last_seen)
            };

            let cos = inner_product(&a_embedding, &b_snapshot.embedding);
            let gap_s = a_seen.duration_since(b_snapshot.last_seen).abs().as_secs_f64();
            let co_active = gap_s <= cfg.immediate_merge_time_window_s;
            let iou = a_bbox.iou(&b_snapshot.last_bbox);

            let should_merge = (cos >= cfg.immediate_merge_threshold && co_active)
                || iou >= cfg.immediate_merge_iou
                || cos > cfg.consolidation_threshold;
            if !should_merge {
                continue;
            }

            let a_identity = reg.identities.get_mut(&a).unwrap();
            a_identity.embedding = ema_blend(&a_identity.embedding, &b_snapshot.embedding, 0.3);
            if b_snapshot.suspicious {
                let prefer_b = match &a_identity.watchlist_match {
                    Some(existing) => higher_score(&b_snapshot.watchlist_match, existing),
                    None => true,
                };
                a_identity.suspicious = true;
                if prefer_b {
                    if let Some(m) = b_snapshot.watchlist_match.clone() {
                        a_identity.watchlist_match = Some(m);
                    }
                }
            }

            consumed.insert(b);
            merged_any = true;
            reg.identities.remove(&b);
            reg.relink.remove(&b);
            let _ = reg.index.remove(b);
        }
        if merged_any {
            let merged_embedding = reg.identities[&a].embedding;
            reg.index
                .update(a, &merged_embedding)
                .expect("primary identity must remain indexed across a merge");
            info!(primary = a, "consolidated duplicate identities");
        }
    }
}

fn higher_score(candidate: &Option<WatchlistMatch>, existing: &WatchlistMatch) -> bool {
    candidate.as_ref().map(|m| m.score > existing.score).unwrap_or(false)
}

/// Evicts identities unseen for longer than `face_timeout_s`, and expires
/// pending tracks / re-link probations unseen for longer than
/// `pending_timeout_s` (§4.5).
pub fn cleanup(reg: &mut LockedRegistry, cfg: &TrackerConfig, now: Timestamp) {
    let stale: Vec<u64> = reg
        .identities
        .iter()
        .filter(|(_, i)| i.seconds_since_seen(now) > cfg.face_timeout_s)
        .map(|(&id, _)| id)
        .collect();
    for id in &stale {
        reg.identities.remove(id);
        reg.relink.remove(id);
        let _ = reg.index.remove(*id);
    }
    if !stale.is_empty() {
        info!(count = stale.len(), "evicted stale identities");
    }
    reg.pending.retain(|_, t| !t.expired(now, cfg.pending_timeout_s));
    reg.relink.retain(|_, p| !p.expired(now, cfg.pending_timeout_s));
}
