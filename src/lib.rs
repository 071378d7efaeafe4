//! PickGok AI: track recommendations from a precomputed embedding index
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP API (axum)                        │
//! │                POST /recommend, GET /health                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  RecommendService                           │
//! │   seed lookup · reconstruct · k+1 search · self-exclusion   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │        Resources (FlatIndex over mmap + IdMapping)          │
//! │        loaded once at startup, published atomically         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod loader;
pub mod preflight;
pub mod server;
pub mod service;

pub use config::{Limits, ServeArgs, ServerConfig};
pub use error::RecommendError;
pub use loader::{load, LoadError, ResourcePaths, Resources};
pub use server::{create_router, serve, AppState};
pub use service::{RecommendService, Recommendation};

pub use pickgok_core::{format, idmap, index, simd, store};
