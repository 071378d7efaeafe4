//! PickGok Core – vector file format, mmap storage, exact k-NN index and
//! track id mapping
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │        IdMapping (track id <-> index position)              │
//! ├─────────────────────────────────────────────────────────────┤
//! │     VectorIndex trait · FlatIndex (exact, rayon scan)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │        VectorStore (mmap zero-copy index file)              │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod format;
pub mod idmap;
pub mod index;
pub mod simd;
pub mod store;

pub use format::{IndexHeader, IndexWriter};
pub use idmap::{IdMapping, MetadataRecord, TrackId};
pub use index::{FlatIndex, IndexError, Neighbor, VectorIndex, NO_RESULT};
pub use simd::{dot_product, l2_distance_squared, Metric};
pub use store::VectorStore;
