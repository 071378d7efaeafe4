//! Server configuration
//!
//! Flags for `pickgok-ai serve`, each with an environment fallback, and the
//! resolved [`ServerConfig`] the rest of the crate consumes.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

use clap::Args;
use thiserror::Error;

use crate::loader::ResourcePaths;
use crate::preflight::{PreflightConfig, StartupPolicy};

pub const DEFAULT_K: usize = 5;
pub const DEFAULT_MAX_K: usize = 100;
pub const DEFAULT_PORT: u16 = 5000;
/// Upper bound accepted for `max_k`
pub const MAX_K_CEILING: usize = 10_000;

const INDEX_FILE_NAME: &str = "music.index";
const METADATA_FILE_NAME: &str = "metadata.json";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("default k must be at least 1")]
    ZeroDefaultK,

    #[error("default k ({default_k}) exceeds max k ({max_k})")]
    DefaultAboveMax { default_k: usize, max_k: usize },

    #[error("max k ({0}) exceeds the ceiling of {}", MAX_K_CEILING)]
    MaxKTooLarge(usize),

    #[error("invalid bind address {0}")]
    BindAddress(String),
}

/// Per-request bounds on the neighbor count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Used when the request omits `k`
    pub default_k: usize,
    /// Largest accepted `k`; bounds the cost of a single search
    pub max_k: usize,
}

impl Limits {
    pub fn new(default_k: usize, max_k: usize) -> Result<Self, ConfigError> {
        if default_k == 0 {
            return Err(ConfigError::ZeroDefaultK);
        }
        if max_k > MAX_K_CEILING {
            return Err(ConfigError::MaxKTooLarge(max_k));
        }
        if default_k > max_k {
            return Err(ConfigError::DefaultAboveMax { default_k, max_k });
        }
        Ok(Self { default_k, max_k })
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            default_k: DEFAULT_K,
            max_k: DEFAULT_MAX_K,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Directory holding music.index and metadata.json
    #[arg(long, default_value = "models", env = "PICKGOK_MODEL_DIR")]
    pub model_dir: PathBuf,

    /// Vector index file (defaults to <model-dir>/music.index)
    #[arg(long, env = "PICKGOK_INDEX_PATH")]
    pub index: Option<PathBuf>,

    /// Metadata JSON file (defaults to <model-dir>/metadata.json)
    #[arg(long, env = "PICKGOK_METADATA_PATH")]
    pub metadata: Option<PathBuf>,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0", env = "PICKGOK_HOST")]
    pub host: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "PICKGOK_PORT")]
    pub port: u16,

    /// Neighbors returned when a request omits `k`
    #[arg(long, default_value_t = DEFAULT_K, env = "PICKGOK_DEFAULT_K")]
    pub default_k: usize,

    /// Largest `k` a request may ask for
    #[arg(long, default_value_t = DEFAULT_MAX_K, env = "PICKGOK_MAX_K")]
    pub max_k: usize,

    /// What to do before loading resources
    #[arg(long, value_enum, default_value_t = StartupPolicy::Skip, env = "PICKGOK_STARTUP_POLICY")]
    pub startup_policy: StartupPolicy,

    /// Health check script run by the fail-fast and auto-repair policies
    #[arg(
        long,
        default_value = "scripts/diagnose_system.py",
        env = "PICKGOK_DIAGNOSE_SCRIPT"
    )]
    pub diagnose_script: PathBuf,

    /// Initialization script run by the auto-repair policy
    #[arg(
        long,
        default_value = "scripts/initialize_system.py",
        env = "PICKGOK_INIT_SCRIPT"
    )]
    pub init_script: PathBuf,

    /// Interpreter used to launch the scripts; empty runs them directly
    #[arg(long, default_value = "python3", env = "PICKGOK_SCRIPT_INTERPRETER")]
    pub script_interpreter: String,
}

/// Fully resolved server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub resources: ResourcePaths,
    pub bind_addr: SocketAddr,
    pub limits: Limits,
    pub preflight: PreflightConfig,
}

impl TryFrom<ServeArgs> for ServerConfig {
    type Error = ConfigError;

    fn try_from(args: ServeArgs) -> Result<Self, Self::Error> {
        let limits = Limits::new(args.default_k, args.max_k)?;

        let bind_addr = resolve_bind_addr(&args.host, args.port)?;

        let resources = ResourcePaths {
            index: args
                .index
                .unwrap_or_else(|| args.model_dir.join(INDEX_FILE_NAME)),
            metadata: args
                .metadata
                .unwrap_or_else(|| args.model_dir.join(METADATA_FILE_NAME)),
        };

        let interpreter = Some(args.script_interpreter).filter(|s| !s.trim().is_empty());

        Ok(Self {
            resources,
            bind_addr,
            limits,
            preflight: PreflightConfig {
                policy: args.startup_policy,
                interpreter,
                diagnose_script: args.diagnose_script,
                init_script: args.init_script,
            },
        })
    }
}

/// IP literals (including bare IPv6 such as `::1`) or resolvable host names
fn resolve_bind_addr(host: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    (host, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ConfigError::BindAddress(format!("{host}:{port}")))
}
