// This file is part of Facetrack, a multi-stream face re-identification service.
// See AUTHORS and LICENSE.

//! The watchlist classifier (§4.2): cosine an identity's embedding against a
//! snapshot of known-suspect records, loaded en bloc from the relational
//! watchlist store and replaced wholesale on reload.

use crate::vector::{inner_product, Embedding};

#[derive(Clone, Debug)]
pub struct WatchlistRecord {
    pub store_id: i64,
    pub name: String,
    pub nickname: Option<String>,
    pub age: Option<i32>,
    pub police_station: Option<String>,
    pub crime_and_section: Option<String>,
    pub head_of_crime: Option<String>,
    pub arrested_date: Option<String>,
    pub image_url: Option<String>,
    pub embedding: Embedding,
}

/// A record a matched identity is pinned to, plus the score that matched it.
/// Sticky for the identity's lifetime once set (§3 global invariants).
#[derive(Clone, Debug)]
pub struct WatchlistMatch {
    pub record: WatchlistRecord,
    pub score: f32,
}

/// An immutable snapshot of the watchlist. Replacing `Tracker`'s snapshot
/// pointer on reload is how §5 "atomic reload" is satisfied without taking
/// the registry lock.
#[derive(Clone, Debug, Default)]
pub struct Watchlist {
    records: Vec<WatchlistRecord>,
}

impl Watchlist {
    pub fn new(records: Vec<WatchlistRecord>) -> Self {
        Watchlist { records }
    }

    pub fn empty() -> Self {
        Watchlist { records: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[WatchlistRecord] {
        &self.records
    }

    /// Returns the best match against `embedding`, if any record scores at
    /// least `threshold`. Only the top-1 candidate is considered when
    /// `top_k == 1` (the default); for `top_k > 1` the strongest of the top-k
    /// is still what decides the match, matching the source's "top match"
    /// semantics while keeping the parameter for future tuning.
    pub fn classify(&self, embedding: &Embedding, top_k: usize, threshold: f32) -> Option<WatchlistMatch> {
        if self.records.is_empty() || top_k == 0 {
            return None;
        }
        let mut scored: Vec<(f32, usize)> = self
            .records
            .iter()
            .enumerate()
            .map(|(i, r)| (inner_product(embedding, &r.embedding), i))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(top_k);
        let (best_score, best_i) = *scored.first()?;
        if best_score > threshold {
            Some(WatchlistMatch {
                record: self.records[best_i].clone(),
                score: best_score,
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, embedding: Embedding) -> WatchlistRecord {
        WatchlistRecord {
            store_id: id,
            name: format!("record-{id}"),
            nickname: None,
            age: None,
            police_station: None,
            crime_and_section: None,
            head_of_crime: None,
            arrested_date: None,
            image_url: None,
            embedding,
        }
    }

    #[test]
    fn empty_watchlist_never_matches() {
        let w = Watchlist::empty();
        let e = crate::vector::normalize(&[1.0; 512]);
        assert!(w.classify(&e, 1, 0.45).is_none());
    }

    #[test]
    fn match_above_threshold_returned() {
        let mut raw = [0.0f32; 512];
        raw[0] = 1.0;
        let e = crate::vector::normalize(&raw);
        let w = Watchlist::new(vec![record(1, e)]);
        let m = w.classify(&e, 1, 0.45).unwrap();
        assert_eq!(m.record.store_id, 1);
        assert!((m.score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn match_at_or_below_threshold_is_clean() {
        let mut a = [0.0f32; 512];
        a[0] = 1.0;
        let mut b = [0.0f32; 512];
        b[0] = 1.0;
        b[1] = 1.0;
        let a = crate::vector::normalize(&a);
        let b = crate::vector::normalize(&b);
        // cos(a,b) = 1/sqrt(2) ~= 0.707, above 0.45 -> should match; use a
        // near-orthogonal pair to stay under threshold instead.
        let mut c = [0.0f32; 512];
        c[2] = 1.0;
        let c = crate::vector::normalize(&c);
        let w = Watchlist::new(vec![record(1, c)]);
        assert!(w.classify(&a, 1, 0.45).is_none());
        let _ = b;
    }
}
