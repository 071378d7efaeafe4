//! Recommendation service
//!
//! Given a seed track, reconstructs its embedding from the index, searches
//! for its nearest neighbors and translates the hits back to track ids.
//!
//! # Concurrency Model
//!
//! The loaded [`Resources`] are published once through an `ArcSwapOption`.
//! Each request takes its own `Arc` snapshot, so searches never hold a lock
//! and never observe a half-built index. An empty slot means the service is
//! not ready.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use pickgok_core::TrackId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Limits;
use crate::error::RecommendError;
use crate::loader::Resources;

/// Wire form of a recommendation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendRequest {
    pub track_id: TrackId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<usize>,
}

/// A validated request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecommendQuery {
    pub track_id: TrackId,
    pub k: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub track_id: TrackId,
    /// Native index metric, not normalized
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendResponse {
    pub status: String,
    pub seed: TrackId,
    pub recommendations: Vec<Recommendation>,
}

impl RecommendResponse {
    pub fn success(seed: TrackId, recommendations: Vec<Recommendation>) -> Self {
        Self {
            status: "success".to_string(),
            seed,
            recommendations,
        }
    }
}

/// Service context shared by all request handlers
pub struct RecommendService {
    resources: ArcSwapOption<Resources>,
    limits: Limits,
}

impl RecommendService {
    /// A service with nothing loaded yet; every request is `NotReady` until
    /// [`publish`](Self::publish) is called.
    pub fn new(limits: Limits) -> Self {
        Self {
            resources: ArcSwapOption::empty(),
            limits,
        }
    }

    pub fn with_resources(resources: Resources, limits: Limits) -> Self {
        let service = Self::new(limits);
        service.publish(resources);
        service
    }

    /// Make fully built resources visible to requests.
    pub fn publish(&self, resources: Resources) {
        self.resources.store(Some(Arc::new(resources)));
    }

    pub fn is_ready(&self) -> bool {
        self.resources.load().is_some()
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Current resources, or `NotReady`.
    pub fn snapshot(&self) -> Result<Arc<Resources>, RecommendError> {
        self.resources.load_full().ok_or(RecommendError::NotReady)
    }

    /// Recommend up to `k` tracks similar to `track_id`.
    pub fn recommend(
        &self,
        track_id: TrackId,
        k: usize,
    ) -> Result<Vec<Recommendation>, RecommendError> {
        let resources = self.snapshot()?;
        if k == 0 || k > self.limits.max_k {
            return Err(k_out_of_range(self.limits));
        }
        nearest_tracks(&resources, track_id, k)
    }

    /// Full request path for a raw JSON body: readiness first, then
    /// validation, then the search on a blocking worker.
    pub async fn handle(&self, body: &[u8]) -> Result<RecommendResponse, RecommendError> {
        let resources = self.snapshot()?;
        let RecommendQuery { track_id, k } = parse_request(body, self.limits)?;

        let recommendations =
            tokio::task::spawn_blocking(move || nearest_tracks(&resources, track_id, k))
                .await
                .map_err(|e| RecommendError::Internal(format!("search worker failed: {e}")))??;

        Ok(RecommendResponse::success(track_id, recommendations))
    }
}

/// Validate a JSON request body.
pub fn parse_request(body: &[u8], limits: Limits) -> Result<RecommendQuery, RecommendError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| RecommendError::InvalidBody(e.to_string()))?;
    let Value::Object(fields) = value else {
        return Err(RecommendError::InvalidBody(
            "expected a JSON object".to_string(),
        ));
    };

    let track_id = match fields.get("track_id") {
        None | Some(Value::Null) => return Err(RecommendError::MissingTrackId),
        Some(raw) => {
            as_integer(raw).ok_or_else(|| RecommendError::InvalidTrackId(raw.to_string()))?
        }
    };

    let k = match fields.get("k") {
        None | Some(Value::Null) => limits.default_k,
        Some(raw) => as_integer(raw)
            .and_then(|k| usize::try_from(k).ok())
            .filter(|&k| (1..=limits.max_k).contains(&k))
            .ok_or_else(|| k_out_of_range(limits))?,
    };

    Ok(RecommendQuery { track_id, k })
}

fn k_out_of_range(limits: Limits) -> RecommendError {
    RecommendError::InvalidK(format!(
        "must be an integer between 1 and {}",
        limits.max_k
    ))
}

/// JSON integer, integral float, or string holding an integer
fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Core lookup: seed position, reconstruction, `k + 1` search, then
/// self-exclusion and id translation in the index's ranking order.
pub fn nearest_tracks(
    resources: &Resources,
    seed: TrackId,
    k: usize,
) -> Result<Vec<Recommendation>, RecommendError> {
    let mapping = resources.mapping();
    let index = resources.index();

    let seed_position = mapping
        .position_of(seed)
        .ok_or(RecommendError::NotFound(seed))?;

    let query = index
        .reconstruct(seed_position)
        .map_err(|e| RecommendError::Internal(e.to_string()))?;
    // One extra slot because the seed normally matches itself
    let neighbors = index
        .search(&query, k.saturating_add(1))
        .map_err(|e| RecommendError::Internal(e.to_string()))?;

    let recommendations = neighbors
        .into_iter()
        .filter_map(|neighbor| {
            let position = neighbor.position()?;
            if position == seed_position {
                return None;
            }
            let track_id = mapping.track_at(position)?;
            Some(Recommendation {
                track_id,
                distance: neighbor.distance,
            })
        })
        .take(k)
        .collect();

    Ok(recommendations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pickgok_core::{IdMapping, IndexError, Metric, MetadataRecord, Neighbor, VectorIndex};

    /// In-memory index with the same ranking contract as `FlatIndex`.
    struct MemoryIndex {
        vectors: Vec<Vec<f32>>,
        fail_search: bool,
    }

    impl VectorIndex for MemoryIndex {
        fn len(&self) -> usize {
            self.vectors.len()
        }

        fn dim(&self) -> usize {
            self.vectors.first().map_or(0, Vec::len)
        }

        fn metric(&self) -> Metric {
            Metric::L2
        }

        fn reconstruct(&self, position: usize) -> Result<Vec<f32>, IndexError> {
            self.vectors
                .get(position)
                .cloned()
                .ok_or(IndexError::PositionOutOfRange {
                    position,
                    count: self.vectors.len(),
                })
        }

        fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
            if self.fail_search {
                return Err(IndexError::DimensionMismatch {
                    expected: 0,
                    actual: query.len(),
                });
            }
            let mut scored: Vec<Neighbor> = self
                .vectors
                .iter()
                .enumerate()
                .map(|(i, v)| Neighbor {
                    position: i as i64,
                    distance: Metric::L2.distance(query, v),
                })
                .collect();
            scored.sort_by(|a, b| {
                Metric::L2
                    .compare(a.distance, b.distance)
                    .then(a.position.cmp(&b.position))
            });
            scored.resize(
                k,
                Neighbor {
                    position: pickgok_core::NO_RESULT,
                    distance: f32::INFINITY,
                },
            );
            Ok(scored)
        }
    }

    fn identical_resources() -> Resources {
        let index = MemoryIndex {
            vectors: vec![vec![1.0, 1.0]; 4],
            fail_search: false,
        };
        let mapping = IdMapping::from_records(
            (0..4).map(|position| MetadataRecord {
                track_id: position + 1,
                faiss_id: position,
            }),
            4,
        )
        .unwrap();
        Resources::new(Arc::new(index), mapping)
    }

    fn resources(fail_search: bool) -> Resources {
        let index = MemoryIndex {
            vectors: vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![3.0, 0.0]],
            fail_search,
        };
        let mapping = IdMapping::from_records(
            [(101, 0), (202, 1), (303, 2)].map(|(track_id, faiss_id)| MetadataRecord {
                track_id,
                faiss_id,
            }),
            3,
        )
        .unwrap();
        Resources::new(Arc::new(index), mapping)
    }

    fn service() -> RecommendService {
        RecommendService::with_resources(resources(false), Limits::default())
    }

    #[test]
    fn test_recommend_excludes_seed_and_orders() {
        let recs = service().recommend(101, 2).unwrap();
        assert_eq!(
            recs,
            vec![
                Recommendation {
                    track_id: 202,
                    distance: 1.0
                },
                Recommendation {
                    track_id: 303,
                    distance: 9.0
                },
            ]
        );
    }

    #[test]
    fn test_recommend_returns_at_most_available() {
        // 3 vectors, seed excluded, padding slots skipped
        let recs = service().recommend(202, 10).unwrap();
        assert_eq!(recs.len(), 2);
        assert!(recs.iter().all(|r| r.track_id != 202));
    }

    #[test]
    fn test_recommend_k_one() {
        let recs = service().recommend(303, 1).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].track_id, 202);
    }

    #[test]
    fn test_duplicates_crowding_out_seed_still_cut_to_k() {
        // Ties rank by position, so the seed at position 3 falls outside
        // the k + 1 search and all three hits are candidates.
        let service = RecommendService::with_resources(identical_resources(), Limits::default());
        let recs = service.recommend(4, 2).unwrap();
        assert_eq!(
            recs,
            vec![
                Recommendation {
                    track_id: 1,
                    distance: 0.0
                },
                Recommendation {
                    track_id: 2,
                    distance: 0.0
                },
            ]
        );
    }

    #[test]
    fn test_unknown_track_is_not_found() {
        assert_eq!(
            service().recommend(999, 2),
            Err(RecommendError::NotFound(999))
        );
    }

    #[test]
    fn test_not_ready_before_publish() {
        let service = RecommendService::new(Limits::default());
        assert!(!service.is_ready());
        assert_eq!(service.recommend(101, 2), Err(RecommendError::NotReady));
        assert_eq!(service.recommend(999, 0), Err(RecommendError::NotReady));

        service.publish(resources(false));
        assert!(service.is_ready());
        assert!(service.recommend(101, 2).is_ok());
    }

    #[test]
    fn test_search_failure_is_internal() {
        let service = RecommendService::with_resources(resources(true), Limits::default());
        assert!(matches!(
            service.recommend(101, 2),
            Err(RecommendError::Internal(_))
        ));
        // Lookup happens before the index is touched
        assert_eq!(
            service.recommend(999, 2),
            Err(RecommendError::NotFound(999))
        );
    }

    #[test]
    fn test_parse_request_defaults_and_casts() {
        let limits = Limits::default();
        assert_eq!(
            parse_request(br#"{"track_id": 101}"#, limits).unwrap(),
            RecommendQuery {
                track_id: 101,
                k: 5
            }
        );
        assert_eq!(
            parse_request(br#"{"track_id": "202", "k": 3}"#, limits).unwrap(),
            RecommendQuery {
                track_id: 202,
                k: 3
            }
        );
        assert_eq!(
            parse_request(br#"{"track_id": 7.0, "k": null}"#, limits).unwrap(),
            RecommendQuery { track_id: 7, k: 5 }
        );
    }

    #[test]
    fn test_parse_request_errors() {
        let limits = Limits::new(5, 50).unwrap();
        assert_eq!(
            parse_request(br#"{"k": 3}"#, limits),
            Err(RecommendError::MissingTrackId)
        );
        assert_eq!(
            parse_request(br#"{"track_id": null}"#, limits),
            Err(RecommendError::MissingTrackId)
        );
        assert!(matches!(
            parse_request(br#"{"track_id": "abc"}"#, limits),
            Err(RecommendError::InvalidTrackId(_))
        ));
        assert!(matches!(
            parse_request(br#"{"track_id": 1.5}"#, limits),
            Err(RecommendError::InvalidTrackId(_))
        ));
        assert!(matches!(
            parse_request(br#"{"track_id": true}"#, limits),
            Err(RecommendError::InvalidTrackId(_))
        ));
        for body in [
            r#"{"track_id": 1, "k": 0}"#,
            r#"{"track_id": 1, "k": -2}"#,
            r#"{"track_id": 1, "k": 51}"#,
            r#"{"track_id": 1, "k": "many"}"#,
        ] {
            assert!(matches!(
                parse_request(body.as_bytes(), limits),
                Err(RecommendError::InvalidK(_))
            ));
        }
        assert!(matches!(
            parse_request(b"[1, 2]", limits),
            Err(RecommendError::InvalidBody(_))
        ));
        assert!(matches!(
            parse_request(b"", limits),
            Err(RecommendError::InvalidBody(_))
        ));
    }

    #[tokio::test]
    async fn test_handle_checks_readiness_before_body() {
        let service = RecommendService::new(Limits::default());
        assert_eq!(
            service.handle(b"not even json").await,
            Err(RecommendError::NotReady)
        );
    }

    #[tokio::test]
    async fn test_handle_success() {
        let response = service()
            .handle(br#"{"track_id": 101, "k": 1}"#)
            .await
            .unwrap();
        assert_eq!(response.status, "success");
        assert_eq!(response.seed, 101);
        assert_eq!(response.recommendations.len(), 1);
        assert_eq!(response.recommendations[0].track_id, 202);
    }
}
