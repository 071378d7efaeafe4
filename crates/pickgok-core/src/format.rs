//! Vector index file format
//!
//! # File Structure
//!
//! ```text
//! Offset   Size    Type        Description
//! ─────────────────────────────────────────────
//! 0x00     8       [u8; 8]     Magic: "PGKVEC01"
//! 0x08     4       u32 LE      N: Number of vectors
//! 0x0C     4       u32 LE      D: Dimensions
//! 0x10     4       u32 LE      Metric (0 = squared L2, 1 = inner product)
//! 0x14     4       u32 LE      Reserved (0)
//! 0x18     N*D*4   [f32]       Vector data (Little Endian), position-major
//! ```
//!
//! Position `p` of the index is the `p`-th vector in the data section.
//!
//! # Example
//!
//! ```ignore
//! let mut writer = IndexWriter::new("music.index", 128, Metric::L2)?;
//! writer.write_vector(&vec![0.1f32; 128])?;
//! writer.finish()?;
//! ```

use std::fs::File;
use std::io::{self, BufWriter, Seek, Write};
use std::path::Path;

use thiserror::Error;

use crate::simd::Metric;

/// Magic bytes identifying an index file: "PGKVEC01"
pub const MAGIC: [u8; 8] = *b"PGKVEC01";

/// Header size in bytes. A multiple of 4 so the data section stays f32-aligned
/// inside a page-aligned mapping.
pub const HEADER_SIZE: usize = 24;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Invalid magic bytes: expected PGKVEC01")]
    InvalidMagic,

    #[error("Unknown metric code {0}")]
    UnknownMetric(u32),

    #[error("Index dimensions must be greater than zero")]
    ZeroDimensions,

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Too many vectors for a single index file")]
    TooManyVectors,

    #[error("Header describes {count} vectors of {dimensions} dimensions, too large to address")]
    TooLarge { count: u32, dimensions: u32 },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Parsed index file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    pub count: u32,
    pub dimensions: u32,
    pub metric: Metric,
}

impl IndexHeader {
    /// Parse header from the first `HEADER_SIZE` bytes of a file.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FormatError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "File too small for header",
            )));
        }

        if bytes[0..8] != MAGIC {
            return Err(FormatError::InvalidMagic);
        }

        let count = read_u32(bytes, 8);
        let dimensions = read_u32(bytes, 12);
        let metric_code = read_u32(bytes, 16);

        if dimensions == 0 {
            return Err(FormatError::ZeroDimensions);
        }
        let metric = Metric::from_code(metric_code).ok_or(FormatError::UnknownMetric(metric_code))?;

        Ok(Self {
            count,
            dimensions,
            metric,
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(&MAGIC);
        buf[8..12].copy_from_slice(&self.count.to_le_bytes());
        buf[12..16].copy_from_slice(&self.dimensions.to_le_bytes());
        buf[16..20].copy_from_slice(&self.metric.code().to_le_bytes());
        buf
    }

    /// Byte offset of the vector stored at `position`. Only meaningful for
    /// positions below `count` of a header whose `file_size` succeeded.
    #[inline(always)]
    pub fn offset(&self, position: usize) -> usize {
        HEADER_SIZE + position * self.vector_bytes()
    }

    #[inline(always)]
    pub fn vector_bytes(&self) -> usize {
        self.dimensions as usize * std::mem::size_of::<f32>()
    }

    /// Expected total file size. Header fields come straight from disk, so
    /// the product is checked.
    pub fn file_size(&self) -> Result<usize, FormatError> {
        (self.dimensions as usize)
            .checked_mul(std::mem::size_of::<f32>())
            .and_then(|vector_bytes| vector_bytes.checked_mul(self.count as usize))
            .and_then(|data| data.checked_add(HEADER_SIZE))
            .ok_or(FormatError::TooLarge {
                count: self.count,
                dimensions: self.dimensions,
            })
    }
}

#[inline]
fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Writer for index files
pub struct IndexWriter {
    writer: BufWriter<File>,
    dimensions: usize,
    count: u32,
}

impl IndexWriter {
    pub fn new<P: AsRef<Path>>(
        path: P,
        dimensions: usize,
        metric: Metric,
    ) -> Result<Self, FormatError> {
        if dimensions == 0 {
            return Err(FormatError::ZeroDimensions);
        }
        let dims = u32::try_from(dimensions).map_err(|_| FormatError::DimensionMismatch {
            expected: u32::MAX as usize,
            actual: dimensions,
        })?;

        let mut writer = BufWriter::new(File::create(path)?);

        // Count is patched in finish()
        let header = IndexHeader {
            count: 0,
            dimensions: dims,
            metric,
        };
        writer.write_all(&header.to_bytes())?;

        Ok(Self {
            writer,
            dimensions,
            count: 0,
        })
    }

    pub fn write_vector(&mut self, vector: &[f32]) -> Result<(), FormatError> {
        if vector.len() != self.dimensions {
            return Err(FormatError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        if self.count == u32::MAX {
            return Err(FormatError::TooManyVectors);
        }

        for &val in vector {
            self.writer.write_all(&val.to_le_bytes())?;
        }

        self.count += 1;
        Ok(())
    }

    /// Finalize the file, patching the header with the actual count.
    pub fn finish(mut self) -> Result<u32, FormatError> {
        self.writer.flush()?;

        let file = self.writer.get_mut();
        file.seek(io::SeekFrom::Start(8))?;
        file.write_all(&self.count.to_le_bytes())?;
        file.sync_all()?;

        Ok(self.count)
    }
}
