//! Vector index
//!
//! `VectorIndex` is the query surface the recommendation service needs:
//! reconstruction of a stored vector by position and k-NN search.
//! `FlatIndex` answers both exactly by scanning a memory-mapped
//! [`VectorStore`].
//!
//! Search results follow the convention of the offline indexing job: the
//! result list always has `k` slots in ranking order, and slots that could
//! not be filled carry the [`NO_RESULT`] position.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::Path;

use rayon::prelude::*;
use thiserror::Error;

use crate::simd::Metric;
use crate::store::{StoreError, VectorStore};

/// Position reported in result slots that hold no vector
pub const NO_RESULT: i64 = -1;

/// Stores at least this large are scanned on the rayon pool.
const PARALLEL_SCAN_THRESHOLD: usize = 32_768;

/// Vectors per rayon task when scanning in parallel
const SCAN_CHUNK: usize = 4_096;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Query dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Position {position} out of range for index of {count} vectors")]
    PositionOutOfRange { position: usize, count: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One ranked search slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index position, or [`NO_RESULT`]
    pub position: i64,
    /// Native metric value (squared L2 or inner product)
    pub distance: f32,
}

impl Neighbor {
    /// Position as an index, `None` for empty slots
    pub fn position(&self) -> Option<usize> {
        usize::try_from(self.position).ok()
    }
}

/// Read-only vector index shared by all request handlers
pub trait VectorIndex: Send + Sync {
    /// Number of stored vectors
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dim(&self) -> usize;

    fn metric(&self) -> Metric;

    /// Copy of the vector stored at `position`.
    fn reconstruct(&self, position: usize) -> Result<Vec<f32>, IndexError>;

    /// The `k` nearest vectors to `query` in ranking order, padded with
    /// [`NO_RESULT`] slots when the index holds fewer than `k` vectors.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError>;
}

/// Exact brute-force index over a memory-mapped store
pub struct FlatIndex {
    store: VectorStore,
}

impl FlatIndex {
    pub fn new(store: VectorStore) -> Self {
        Self { store }
    }

    /// Open and map an index file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, IndexError> {
        let store = VectorStore::open(path.as_ref())?;
        tracing::debug!(
            "Mapped {:?}: {} vectors, dim {}, {} bytes",
            path.as_ref(),
            store.count,
            store.dim,
            store.memory_bytes()
        );
        Ok(Self::new(store))
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    fn scan_range(
        &self,
        query: &[f32],
        k: usize,
        range: std::ops::Range<usize>,
    ) -> Result<TopK, IndexError> {
        let metric = self.store.metric();
        let mut top = TopK::new(k, metric);
        for position in range {
            let vector = self.store.try_get(position)?;
            top.offer(position, metric.distance(query, vector));
        }
        Ok(top)
    }
}

impl VectorIndex for FlatIndex {
    fn len(&self) -> usize {
        self.store.count
    }

    fn dim(&self) -> usize {
        self.store.dim
    }

    fn metric(&self) -> Metric {
        self.store.metric()
    }

    fn reconstruct(&self, position: usize) -> Result<Vec<f32>, IndexError> {
        match self.store.try_get(position) {
            Ok(vector) => Ok(vector.to_vec()),
            Err(StoreError::PositionOutOfBounds { position, count }) => {
                Err(IndexError::PositionOutOfRange { position, count })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if query.len() != self.store.dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.store.dim,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let count = self.store.count;
        let top = if count >= PARALLEL_SCAN_THRESHOLD {
            let chunks = count.div_ceil(SCAN_CHUNK);
            (0..chunks)
                .into_par_iter()
                .map(|chunk| {
                    let start = chunk * SCAN_CHUNK;
                    self.scan_range(query, k, start..(start + SCAN_CHUNK).min(count))
                })
                .try_reduce(
                    || TopK::new(k, self.store.metric()),
                    |mut acc, other| {
                        acc.merge(other);
                        Ok(acc)
                    },
                )?
        } else {
            self.scan_range(query, k, 0..count)?
        };

        Ok(top.into_ranked())
    }
}

/// Heap entry ordered so the worst-ranked candidate sits on top.
#[derive(Clone, Copy)]
struct Scored {
    position: usize,
    distance: f32,
    metric: Metric,
}

impl Scored {
    fn rank_cmp(&self, other: &Self) -> Ordering {
        self.metric
            .compare(self.distance, other.distance)
            .then(self.position.cmp(&other.position))
    }
}

impl PartialEq for Scored {
    fn eq(&self, other: &Self) -> bool {
        self.rank_cmp(other) == Ordering::Equal
    }
}

impl Eq for Scored {}

impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank_cmp(other)
    }
}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded top-k selection
struct TopK {
    k: usize,
    metric: Metric,
    heap: BinaryHeap<Scored>,
}

impl TopK {
    fn new(k: usize, metric: Metric) -> Self {
        Self {
            k,
            metric,
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(4_096)),
        }
    }

    #[inline]
    fn offer(&mut self, position: usize, distance: f32) {
        let candidate = Scored {
            position,
            distance,
            metric: self.metric,
        };
        if self.heap.len() < self.k {
            self.heap.push(candidate);
        } else if let Some(worst) = self.heap.peek() {
            if candidate < *worst {
                self.heap.pop();
                self.heap.push(candidate);
            }
        }
    }

    fn merge(&mut self, other: TopK) {
        for scored in other.heap {
            self.offer(scored.position, scored.distance);
        }
    }

    fn into_ranked(self) -> Vec<Neighbor> {
        let (k, metric) = (self.k, self.metric);
        let mut ranked: Vec<Neighbor> = self
            .heap
            .into_sorted_vec()
            .into_iter()
            .map(|s| Neighbor {
                position: s.position as i64,
                distance: s.distance,
            })
            .collect();
        ranked.resize(
            k,
            Neighbor {
                position: NO_RESULT,
                distance: metric.worst_score(),
            },
        );
        ranked
    }
}
