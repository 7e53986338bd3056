// This file is part of Facetrack, a multi-stream face re-identification service.
// See AUTHORS and LICENSE.

//! The vector index (§4.1): a flat inner-product scan over identity
//! embeddings. At the expected scale (≤ ~1000 active identities) this beats
//! the complexity of a real ANN library, and makes "remove actually prunes
//! subsequent search results" trivially true rather than a property to audit.

use base::{bail, Error, ErrorKind};

use crate::vector::{inner_product, Embedding, EMBEDDING_DIM};

pub struct VectorIndex {
    ids: Vec<u64>,
    // Row-major N*EMBEDDING_DIM; row i corresponds to ids[i].
    data: Vec<f32>,
}

impl VectorIndex {
    pub fn new() -> Self {
        VectorIndex {
            ids: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.ids.contains(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.ids.iter().copied()
    }

    fn row(&self, i: usize) -> &[f32] {
        &self.data[i * EMBEDDING_DIM..(i + 1) * EMBEDDING_DIM]
    }

    /// Returns up to `k` nearest identities by descending inner product.
    pub fn search(&self, query: &Embedding, k: usize) -> Vec<(f32, u64)> {
        let mut scored: Vec<(f32, u64)> = self
            .ids
            .iter()
            .enumerate()
            .map(|(i, &id)| {
                let row: &Embedding = self.row(i).try_into().expect("row has EMBEDDING_DIM elements");
                (inner_product(query, row), id)
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(k);
        scored
    }

    /// Adds a new id. The id must not already be present.
    pub fn add(&mut self, id: u64, emb: &Embedding) -> Result<(), Error> {
        if self.ids.contains(&id) {
            bail!(Internal, "vector index: id {id} already present");
        }
        self.ids.push(id);
        self.data.extend_from_slice(emb);
        Ok(())
    }

    /// Removes an id by swapping it with the last row, keeping the backing
    /// storage contiguous without shifting every later row.
    pub fn remove(&mut self, id: u64) -> Result<(), Error> {
        let Some(i) = self.ids.iter().position(|&x| x == id) else {
            bail!(Internal, "vector index: remove of absent id {id}");
        };
        let last = self.ids.len() - 1;
        self.ids.swap(i, last);
        self.ids.pop();
        for d in 0..EMBEDDING_DIM {
            self.data.swap(i * EMBEDDING_DIM + d, last * EMBEDDING_DIM + d);
        }
        self.data.truncate(last * EMBEDDING_DIM);
        Ok(())
    }

    /// Replaces an existing id's embedding in place.
    pub fn update(&mut self, id: u64, emb: &Embedding) -> Result<(), Error> {
        let Some(i) = self.ids.iter().position(|&x| x == id) else {
            bail!(Internal, "vector index: update of absent id {id}");
        };
        self.data[i * EMBEDDING_DIM..(i + 1) * EMBEDDING_DIM].copy_from_slice(emb);
        Ok(())
    }

    /// Replaces the entire backing structure with exactly the provided entries.
    pub fn rebuild<'a, I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (u64, &'a Embedding)>,
    {
        self.ids.clear();
        self.data.clear();
        for (id, emb) in entries {
            self.ids.push(id);
            self.data.extend_from_slice(emb);
        }
    }
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e(i: usize) -> Embedding {
        let mut raw = [0.0f32; EMBEDDING_DIM];
        raw[i] = 1.0;
        raw
    }

    #[test]
    fn search_orders_by_descending_similarity() {
        let mut idx = VectorIndex::new();
        idx.add(1, &e(0)).unwrap();
        idx.add(2, &e(1)).unwrap();
        let mut query = e(0);
        query[1] = 0.1;
        let results = idx.search(&query, 2);
        assert_eq!(results[0].1, 1);
        assert_eq!(results[1].1, 2);
    }

    #[test]
    fn remove_prunes_from_search() {
        let mut idx = VectorIndex::new();
        idx.add(1, &e(0)).unwrap();
        idx.add(2, &e(1)).unwrap();
        idx.remove(1).unwrap();
        assert!(!idx.contains(1));
        let results = idx.search(&e(0), 2);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].1, 2);
    }

    #[test]
    fn remove_of_absent_id_is_an_internal_error() {
        let mut idx = VectorIndex::new();
        idx.add(1, &e(0)).unwrap();
        assert_eq!(idx.remove(2).unwrap_err().kind(), ErrorKind::Internal);
    }

    #[test]
    fn rebuild_replaces_backing_entirely() {
        let mut idx = VectorIndex::new();
        idx.add(1, &e(0)).unwrap();
        idx.add(2, &e(1)).unwrap();
        let e3 = e(2);
        idx.rebuild([(3u64, &e3)]);
        assert_eq!(idx.len(), 1);
        assert!(idx.contains(3));
        assert!(!idx.contains(1));
    }
}
