//! Track identifier mapping
//!
//! Bidirectional mapping between external track ids and index positions,
//! built from the metadata list the indexing job writes next to the index:
//!
//! ```json
//! [{"track_id": 101, "faiss_id": 0}, {"track_id": "202", "faiss_id": 1}]
//! ```
//!
//! Both directions are filled together, so every entry is mirrored.

use std::collections::HashMap;
use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use thiserror::Error;

/// External catalog identifier of a track
pub type TrackId = i64;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MappingError {
    #[error("Track ID {track_id} appears more than once (positions {first} and {second})")]
    DuplicateTrack {
        track_id: TrackId,
        first: usize,
        second: usize,
    },

    #[error("Position {position} is assigned to both track {first} and track {second}")]
    DuplicatePosition {
        position: usize,
        first: TrackId,
        second: TrackId,
    },

    #[error("Track ID {track_id} has negative position {position}")]
    NegativePosition { track_id: TrackId, position: i64 },

    #[error("Track ID {track_id} maps to position {position}, but the index holds {count} vectors")]
    PositionOutOfRange {
        track_id: TrackId,
        position: i64,
        count: usize,
    },
}

/// One metadata record. Identifiers are accepted as JSON integers, integral
/// floats or strings holding an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct MetadataRecord {
    #[serde(deserialize_with = "deserialize_int")]
    pub track_id: TrackId,
    #[serde(deserialize_with = "deserialize_int")]
    pub faiss_id: i64,
}

/// Immutable track id <-> position mapping
#[derive(Debug, Clone, Default)]
pub struct IdMapping {
    track_to_position: HashMap<TrackId, usize>,
    position_to_track: Vec<Option<TrackId>>,
}

impl IdMapping {
    /// Build the mapping for an index holding `index_len` vectors.
    pub fn from_records<I>(records: I, index_len: usize) -> Result<Self, MappingError>
    where
        I: IntoIterator<Item = MetadataRecord>,
    {
        let records = records.into_iter();
        let mut track_to_position = HashMap::with_capacity(records.size_hint().0);
        let mut position_to_track = vec![None; index_len];

        for MetadataRecord { track_id, faiss_id } in records {
            let position = usize::try_from(faiss_id).map_err(|_| MappingError::NegativePosition {
                track_id,
                position: faiss_id,
            })?;
            let slot = position_to_track.get_mut(position).ok_or(
                MappingError::PositionOutOfRange {
                    track_id,
                    position: faiss_id,
                    count: index_len,
                },
            )?;
            if let Some(first) = *slot {
                return Err(MappingError::DuplicatePosition {
                    position,
                    first,
                    second: track_id,
                });
            }
            if let Some(&first) = track_to_position.get(&track_id) {
                return Err(MappingError::DuplicateTrack {
                    track_id,
                    first,
                    second: position,
                });
            }

            *slot = Some(track_id);
            track_to_position.insert(track_id, position);
        }

        Ok(Self {
            track_to_position,
            position_to_track,
        })
    }

    /// Parse a JSON metadata list and build the mapping.
    pub fn from_json_reader<R: std::io::Read>(
        reader: R,
        index_len: usize,
    ) -> Result<Self, MetadataParseError> {
        let records: Vec<MetadataRecord> = serde_json::from_reader(reader)?;
        Ok(Self::from_records(records, index_len)?)
    }

    #[inline]
    pub fn position_of(&self, track_id: TrackId) -> Option<usize> {
        self.track_to_position.get(&track_id).copied()
    }

    #[inline]
    pub fn track_at(&self, position: usize) -> Option<TrackId> {
        self.position_to_track.get(position).copied().flatten()
    }

    /// Number of mapped tracks
    pub fn len(&self) -> usize {
        self.track_to_position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.track_to_position.is_empty()
    }

    /// `(track_id, position)` pairs in position order
    pub fn iter(&self) -> impl Iterator<Item = (TrackId, usize)> + '_ {
        self.position_to_track
            .iter()
            .enumerate()
            .filter_map(|(position, track)| track.map(|t| (t, position)))
    }
}

#[derive(Error, Debug)]
pub enum MetadataParseError {
    #[error("Invalid metadata JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Mapping(#[from] MappingError),
}

fn deserialize_int<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    struct IntVisitor;

    impl<'de> Visitor<'de> for IntVisitor {
        type Value = i64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an integer or a string holding an integer")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
            i64::try_from(v).map_err(|_| E::custom(format!("integer {v} out of range")))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<i64, E> {
            if v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
                Ok(v as i64)
            } else {
                Err(E::custom(format!("{v} is not an integer")))
            }
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<i64, E> {
            v.trim()
                .parse()
                .map_err(|_| E::custom(format!("'{v}' is not an integer")))
        }
    }

    deserializer.deserialize_any(IntVisitor)
}
