//! Memory-mapped vector storage
//!
//! Zero-copy access to the vectors of an index file through the OS page
//! cache. `bytemuck::try_cast_slice` performs the byte-to-float conversion
//! with an alignment check instead of a raw pointer cast.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use thiserror::Error;

use crate::format::{FormatError, IndexHeader};
use crate::simd::Metric;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Position out of bounds: {position} >= {count}")]
    PositionOutOfBounds { position: usize, count: usize },

    #[error("Alignment error: byte slice not aligned to f32 (4 bytes)")]
    AlignmentError,
}

/// Read-only, memory-mapped view of an index file
pub struct VectorStore {
    mmap: Mmap,
    header: IndexHeader,
    /// Number of vectors in the store
    pub count: usize,
    /// Dimensionality of each vector
    pub dim: usize,
}

impl VectorStore {
    /// Open an index file for reading.
    ///
    /// # Safety
    ///
    /// Memory mapping is inherently unsafe: the file must not be truncated or
    /// modified while the store is open. Index files are written once by the
    /// offline job and treated as immutable afterwards.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        let header = IndexHeader::from_bytes(&mmap)?;

        let expected = header.file_size()?;
        if mmap.len() < expected {
            return Err(StoreError::Truncated {
                expected,
                actual: mmap.len(),
            });
        }

        Ok(Self {
            mmap,
            header,
            count: header.count as usize,
            dim: header.dimensions as usize,
        })
    }

    pub fn metric(&self) -> Metric {
        self.header.metric
    }

    /// Vector stored at `position`, borrowed straight from the mapping.
    #[inline]
    pub fn try_get(&self, position: usize) -> Result<&[f32], StoreError> {
        if position >= self.count {
            return Err(StoreError::PositionOutOfBounds {
                position,
                count: self.count,
            });
        }

        let start = self.header.offset(position);
        let end = start + self.header.vector_bytes();
        bytemuck::try_cast_slice(&self.mmap[start..end]).map_err(|_| StoreError::AlignmentError)
    }

    /// Total size of the mapped file in bytes
    pub fn memory_bytes(&self) -> usize {
        self.mmap.len()
    }
}
