pub mod distance;
pub mod flat;

use crate::error::{IndexError, Result};

/// Nearest neighbours of one query, closest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResult {
    pub ids: Vec<u64>,
    pub distances: Vec<f32>,
}

impl SearchResult {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

pub trait VectorIndex {
    fn dimension(&self) -> usize;

    fn count(&self) -> usize;

    /// Adds entries. Without `ids`, assigns `[count, count + vectors.len())`.
    fn insert(&mut self, vectors: &[Vec<f32>], ids: Option<&[u64]>, allow_overwrite: bool) -> Result<Vec<u64>>;

    /// Deletes entries by id; unknown ids are ignored. Returns how many went.
    fn remove(&mut self, ids: &[u64]) -> usize;

    /// Exact k nearest neighbours (squared L2) for every query.
    fn search(&self, queries: &[Vec<f32>], k: usize) -> Result<Vec<SearchResult>>;

    /// Replaces the vectors stored under `ids`.
    ///
    /// Everything is validated before the remove phase, so a rejected update
    /// leaves the index untouched.
    fn update(&mut self, vectors: &[Vec<f32>], ids: Option<&[u64]>) -> Result<Vec<u64>> {
        let ids = match ids {
            Some(ids) if !ids.is_empty() => ids,
            _ => return Err(IndexError::MissingIds),
        };
        if ids.len() != vectors.len() {
            return Err(IndexError::DimensionMismatch { vectors: vectors.len(), ids: ids.len() });
        }
        check_dimensions(self.dimension(), vectors)?;
        check_unique(ids)?;

        self.remove(ids);
        self.insert(vectors, Some(ids), true)
    }
}

/// Fails with `DimensionError` on the first vector whose length is not `dimension`.
pub fn check_dimensions(dimension: usize, vectors: &[Vec<f32>]) -> Result<()> {
    match vectors.iter().find(|v| v.len() != dimension) {
        Some(v) => Err(IndexError::DimensionError { expected: dimension, got: v.len() }),
        None => Ok(()),
    }
}

/// Fails with `IdCollision` when a batch names the same id twice.
pub fn check_unique(ids: &[u64]) -> Result<()> {
    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    for &id in ids {
        if !seen.insert(id) {
            return Err(IndexError::IdCollision { id });
        }
    }
    Ok(())
}
