//! Pipeline configuration.

use std::path::PathBuf;
use std::str::FromStr;

/// Shortest clip chunk the chunker will plan, in seconds.
pub const MIN_CLIP_SECONDS: f64 = 0.1;

/// Parse an environment variable, falling back to `default` when unset or invalid.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Memory guard configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardConfig {
    /// When false the guard always reports "within limits"
    pub enabled: bool,
    /// Absolute memory ceiling in MB
    pub max_memory_mb: f64,
    /// Fraction of system memory that triggers a warning
    pub warning_ratio: f64,
    /// Fraction of system memory that triggers reclamation
    pub critical_ratio: f64,
    /// Items processed between guard checks
    pub batch_size: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_memory_mb: 450.0,
            warning_ratio: 0.8,
            critical_ratio: 0.9,
            batch_size: 3,
        }
    }
}

impl GuardConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let enabled = std::env::var("VSPLICE_MEMORY_GUARD")
            .map(|v| !matches!(v.trim().to_lowercase().as_str(), "off" | "false" | "0"))
            .unwrap_or(defaults.enabled);

        Self {
            enabled,
            max_memory_mb: env_or("VSPLICE_MAX_MEMORY_MB", defaults.max_memory_mb),
            warning_ratio: env_or("VSPLICE_MEMORY_WARNING", defaults.warning_ratio),
            critical_ratio: env_or("VSPLICE_MEMORY_CRITICAL", defaults.critical_ratio),
            batch_size: env_or("VSPLICE_BATCH_SIZE", defaults.batch_size).max(1),
        }
    }

    /// Disabled guard, for hosts whose memory reporting is unreliable.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Derivation pipeline configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Directory under which run workspaces are created
    pub runs_dir: PathBuf,
    /// Target sampling rate in frames per second
    pub frame_rate: f64,
    /// Native fps substituted when the container reports ~0
    pub fps_fallback: f64,
    /// Maximum clip chunk length in seconds
    pub clip_max_seconds: f64,
    /// Seed for the dimensionality reduction
    pub seed: u64,
    /// Target dimensions of the reduction
    pub reduced_dims: usize,
    /// Lower bound of the minimum cluster size
    pub min_cluster_floor: usize,
    /// Frame count divisor of the minimum cluster size
    pub min_cluster_divisor: usize,
    /// Maximum accepted input size in MB
    pub max_video_mb: u64,
    /// Embedding model label recorded in metadata
    pub embedding_model: String,
    /// Maximum concurrently running jobs
    pub max_concurrent_jobs: usize,
    pub guard: GuardConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            runs_dir: PathBuf::from("runs"),
            frame_rate: 0.5,
            fps_fallback: 30.0,
            clip_max_seconds: 240.0,
            seed: 42,
            reduced_dims: 10,
            min_cluster_floor: 3,
            min_cluster_divisor: 20,
            max_video_mb: 50,
            embedding_model: "rgb-histogram-512".to_string(),
            max_concurrent_jobs: 2,
            guard: GuardConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            runs_dir: std::env::var("VSPLICE_RUNS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.runs_dir),
            frame_rate: env_or("VSPLICE_FRAME_RATE", defaults.frame_rate),
            fps_fallback: env_or("VSPLICE_FPS_FALLBACK", defaults.fps_fallback),
            clip_max_seconds: clip_max_or(
                env_or("VSPLICE_CLIP_MAX_SECONDS", defaults.clip_max_seconds),
                defaults.clip_max_seconds,
            ),
            seed: env_or("VSPLICE_SEED", defaults.seed),
            reduced_dims: env_or("VSPLICE_REDUCED_DIMS", defaults.reduced_dims),
            min_cluster_floor: env_or("VSPLICE_MIN_CLUSTER_FLOOR", defaults.min_cluster_floor),
            min_cluster_divisor: env_or("VSPLICE_MIN_CLUSTER_DIVISOR", defaults.min_cluster_divisor),
            max_video_mb: env_or("VSPLICE_MAX_VIDEO_MB", defaults.max_video_mb),
            embedding_model: std::env::var("VSPLICE_EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            max_concurrent_jobs: env_or("VSPLICE_MAX_JOBS", defaults.max_concurrent_jobs).max(1),
            guard: GuardConfig::from_env(),
        }
    }

    /// Minimum cluster size for `frame_count` frames: `max(floor, n / divisor)`.
    pub fn min_cluster_size(&self, frame_count: usize) -> usize {
        let scaled = frame_count
            .checked_div(self.min_cluster_divisor)
            .unwrap_or(0);
        self.min_cluster_floor.max(scaled).max(1)
    }

    /// Maximum accepted input size in bytes.
    pub fn max_video_bytes(&self) -> u64 {
        self.max_video_mb.saturating_mul(1024 * 1024)
    }
}

/// Reject clip maxima below [`MIN_CLIP_SECONDS`] or non-finite.
fn clip_max_or(value: f64, default: f64) -> f64 {
    if value.is_finite() && value >= MIN_CLIP_SECONDS {
        value
    } else {
        default
    }
}
