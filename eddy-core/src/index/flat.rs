use crate::error::{IndexError, Result};
use crate::index::distance::l2_distance;
use crate::index::{check_dimensions, check_unique, SearchResult, VectorIndex};
use log::{debug, info};
use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{BinaryHeap, HashMap};

/// A scanned row and its distance to the query.
///
/// Ordered by distance, then by row, so the max-heap top is always the entry
/// to evict and equal distances keep scan order.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f32,
    row: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.row.cmp(&other.row))
    }
}

/// Exact brute-force index over a contiguous vector arena.
///
/// Rows are stored back to back in `arena`; `ids[row]` is the external id of
/// a row and `map` is its inverse. Removal compacts the arena and keeps the
/// surviving rows in their original order.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimension: usize,
    arena: Vec<f32>,
    ids: Vec<u64>,
    map: HashMap<u64, usize>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(IndexError::InvalidArgument("dimension must be positive".into()));
        }
        info!("Initializing flat index (Dim: {})", dimension);
        Ok(Self {
            dimension,
            arena: Vec::new(),
            ids: Vec::new(),
            map: HashMap::new(),
        })
    }

    /// Rebuilds an index from its raw parts, e.g. after reading a snapshot.
    pub fn from_parts(dimension: usize, ids: Vec<u64>, arena: Vec<f32>) -> Result<Self> {
        if dimension == 0 {
            return Err(IndexError::InvalidArgument("dimension must be positive".into()));
        }
        if arena.len() != ids.len() * dimension {
            return Err(IndexError::DimensionMismatch {
                vectors: arena.len() / dimension,
                ids: ids.len(),
            });
        }

        let mut map = HashMap::with_capacity(ids.len());
        for (row, &id) in ids.iter().enumerate() {
            if map.insert(id, row).is_some() {
                return Err(IndexError::IdCollision { id });
            }
        }

        Ok(Self { dimension, arena, ids, map })
    }

    /// Ids in scan order, and the matching row-major arena.
    pub fn as_parts(&self) -> (&[u64], &[f32]) {
        (&self.ids, &self.arena)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.map.contains_key(&id)
    }

    /// The vector stored under `id`.
    pub fn get(&self, id: u64) -> Option<&[f32]> {
        self.map.get(&id).map(|&row| self.row(row))
    }

    /// Entries in scan order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &[f32])> + '_ {
        self.ids.iter().copied().zip(self.arena.chunks_exact(self.dimension))
    }

    #[inline(always)]
    fn row(&self, row: usize) -> &[f32] {
        &self.arena[row * self.dimension..(row + 1) * self.dimension]
    }

    fn push(&mut self, id: u64, vector: &[f32]) {
        let row = self.ids.len();
        self.arena.extend_from_slice(vector);
        self.ids.push(id);
        self.map.insert(id, row);
    }

    fn search_one(&self, query: &[f32], k: usize) -> SearchResult {
        let mut heap = BinaryHeap::with_capacity(k.min(self.ids.len()) + 1);

        for (row, vector) in self.arena.chunks_exact(self.dimension).enumerate() {
            let candidate = Candidate { distance: l2_distance(query, vector), row };
            if heap.len() < k {
                heap.push(candidate);
            } else if let Some(mut worst) = heap.peek_mut() {
                if candidate < *worst {
                    *worst = candidate;
                }
            }
        }

        let mut result = SearchResult {
            ids: Vec::with_capacity(heap.len()),
            distances: Vec::with_capacity(heap.len()),
        };
        for c in heap.into_sorted_vec() {
            result.ids.push(self.ids[c.row]);
            result.distances.push(c.distance);
        }
        result
    }
}

impl VectorIndex for FlatIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn count(&self) -> usize {
        self.ids.len()
    }

    fn insert(&mut self, vectors: &[Vec<f32>], ids: Option<&[u64]>, allow_overwrite: bool) -> Result<Vec<u64>> {
        let size = self.ids.len() as u64;
        let auto_assigned = ids.is_none();
        let ids: Vec<u64> = match ids {
            Some(ids) => ids.to_vec(),
            None => (size..size + vectors.len() as u64).collect(),
        };

        if ids.len() != vectors.len() {
            return Err(IndexError::DimensionMismatch { vectors: vectors.len(), ids: ids.len() });
        }
        check_dimensions(self.dimension, vectors)?;
        check_unique(&ids)?;
        if !allow_overwrite {
            // Ids below the current size are reserved for existing entries;
            // anything else must not already be present either.
            // An explicitly inserted id inside [size, size + n) keeps
            // colliding with the auto range until the store grows past it.
            if let Some(&id) = ids.iter().find(|&&id| id < size || self.map.contains_key(&id)) {
                return Err(if auto_assigned {
                    IndexError::AutoIdCollision { id }
                } else {
                    IndexError::IdCollision { id }
                });
            }
        }

        if allow_overwrite {
            self.remove(&ids);
        }

        self.arena.reserve(vectors.len() * self.dimension);
        self.ids.reserve(vectors.len());
        for (&id, vector) in ids.iter().zip(vectors) {
            self.push(id, vector);
        }

        debug!("Inserted {} vectors (total {})", ids.len(), self.ids.len());
        Ok(ids)
    }

    fn remove(&mut self, ids: &[u64]) -> usize {
        let mut doomed = vec![false; self.ids.len()];
        let mut removed = 0;
        for id in ids {
            if let Entry::Occupied(slot) = self.map.entry(*id) {
                doomed[slot.remove()] = true;
                removed += 1;
            }
        }
        if removed == 0 {
            return 0;
        }

        // Compact in place, preserving the order of surviving rows.
        let dim = self.dimension;
        let mut write = 0;
        for read in 0..self.ids.len() {
            if doomed[read] {
                continue;
            }
            if write != read {
                self.arena.copy_within(read * dim..(read + 1) * dim, write * dim);
                let id = self.ids[read];
                self.ids[write] = id;
                self.map.insert(id, write);
            }
            write += 1;
        }
        self.ids.truncate(write);
        self.arena.truncate(write * dim);

        debug!("Removed {} vectors (total {})", removed, self.ids.len());
        removed
    }

    fn search(&self, queries: &[Vec<f32>], k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Err(IndexError::InvalidArgument("k must be positive".into()));
        }
        check_dimensions(self.dimension, queries)?;

        Ok(queries.iter().map(|q| self.search_one(q, k)).collect())
    }
}
