//! Resource loader
//!
//! Reads the vector index and the metadata list produced by the offline
//! indexing job and builds the immutable [`Resources`] snapshot the
//! recommendation service serves from.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pickgok_core::idmap::MetadataParseError;
use pickgok_core::{FlatIndex, IdMapping, IndexError, VectorIndex};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePaths {
    pub index: PathBuf,
    pub metadata: PathBuf,
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("resources unavailable: {} not found", path.display())]
    Unavailable { path: PathBuf },

    #[error("failed to load index {}: {source}", path.display())]
    Index {
        path: PathBuf,
        #[source]
        source: IndexError,
    },

    #[error("failed to read metadata {}: {source}", path.display())]
    MetadataIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load metadata {}: {source}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: MetadataParseError,
    },
}

/// Loaded index plus its identifier mapping; never mutated after load.
pub struct Resources {
    index: Arc<dyn VectorIndex>,
    mapping: IdMapping,
}

impl Resources {
    pub fn new(index: Arc<dyn VectorIndex>, mapping: IdMapping) -> Self {
        Self { index, mapping }
    }

    pub fn index(&self) -> &dyn VectorIndex {
        self.index.as_ref()
    }

    pub fn mapping(&self) -> &IdMapping {
        &self.mapping
    }
}

impl std::fmt::Debug for Resources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resources")
            .field("vectors", &self.index.len())
            .field("dim", &self.index.dim())
            .field("tracks", &self.mapping.len())
            .finish()
    }
}

/// Load both artifacts. Either file missing is reported before any parsing.
pub fn load(paths: &ResourcePaths) -> Result<Resources, LoadError> {
    for path in [&paths.index, &paths.metadata] {
        if !path.exists() {
            tracing::error!("Model file not found: {}", path.display());
            return Err(LoadError::Unavailable { path: path.clone() });
        }
    }

    let index = FlatIndex::open(&paths.index).map_err(|source| LoadError::Index {
        path: paths.index.clone(),
        source,
    })?;
    let mapping = load_mapping(&paths.metadata, index.len())?;

    tracing::info!(
        "Resources loaded. Total Tracks: {} ({} vectors, dim {}, metric {})",
        mapping.len(),
        index.len(),
        index.dim(),
        index.metric()
    );

    Ok(Resources::new(Arc::new(index), mapping))
}

/// Parse a metadata file against an index holding `index_len` vectors.
pub fn load_mapping(path: &Path, index_len: usize) -> Result<IdMapping, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::MetadataIo {
        path: path.to_path_buf(),
        source,
    })?;

    IdMapping::from_json_reader(BufReader::new(file), index_len).map_err(|source| {
        LoadError::Metadata {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pickgok_core::{IndexHeader, IndexWriter, Metric};
    use tempfile::tempdir;

    fn write_index(path: &Path, vectors: &[Vec<f32>]) {
        let mut writer = IndexWriter::new(path, vectors[0].len(), Metric::L2).unwrap();
        for v in vectors {
            writer.write_vector(v).unwrap();
        }
        writer.finish().unwrap();
    }

    fn paths(dir: &Path) -> ResourcePaths {
        ResourcePaths {
            index: dir.join("music.index"),
            metadata: dir.join("metadata.json"),
        }
    }

    #[test]
    fn test_load_success() {
        let dir = tempdir().unwrap();
        let paths = paths(dir.path());
        write_index(&paths.index, &[vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 1.0]]);
        std::fs::write(
            &paths.metadata,
            r#"[{"track_id": 101, "faiss_id": 0},
                {"track_id": 202, "faiss_id": 1},
                {"track_id": 303, "faiss_id": 2}]"#,
        )
        .unwrap();

        let resources = load(&paths).unwrap();
        assert_eq!(resources.mapping().len(), 3);
        assert_eq!(resources.index().len(), 3);
        assert_eq!(resources.index().dim(), 2);
        assert_eq!(resources.mapping().position_of(202), Some(1));
    }

    #[test]
    fn test_missing_files_are_unavailable() {
        let dir = tempdir().unwrap();
        let paths = paths(dir.path());

        let err = load(&paths).unwrap_err();
        assert!(matches!(err, LoadError::Unavailable { ref path } if path == &paths.index));

        write_index(&paths.index, &[vec![0.0]]);
        let err = load(&paths).unwrap_err();
        assert!(matches!(err, LoadError::Unavailable { ref path } if path == &paths.metadata));
    }

    #[test]
    fn test_corrupt_index() {
        let dir = tempdir().unwrap();
        let paths = paths(dir.path());
        std::fs::write(&paths.index, b"IXF2 not ours").unwrap();
        std::fs::write(&paths.metadata, "[]").unwrap();

        assert!(matches!(load(&paths), Err(LoadError::Index { .. })));
    }

    #[test]
    fn test_oversized_header_fails_load() {
        let dir = tempdir().unwrap();
        let paths = paths(dir.path());
        let header = IndexHeader {
            count: 1 << 31,
            dimensions: 1 << 31,
            metric: Metric::L2,
        };
        std::fs::write(&paths.index, header.to_bytes()).unwrap();
        std::fs::write(&paths.metadata, "[]").unwrap();

        assert!(matches!(load(&paths), Err(LoadError::Index { .. })));
    }

    #[test]
    fn test_corrupt_metadata() {
        let dir = tempdir().unwrap();
        let paths = paths(dir.path());
        write_index(&paths.index, &[vec![0.0, 1.0]]);

        std::fs::write(&paths.metadata, "{not json").unwrap();
        assert!(matches!(load(&paths), Err(LoadError::Metadata { .. })));

        // Position beyond the index
        std::fs::write(&paths.metadata, r#"[{"track_id": 1, "faiss_id": 5}]"#).unwrap();
        assert!(matches!(load(&paths), Err(LoadError::Metadata { .. })));
    }
}
