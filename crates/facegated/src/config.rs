use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Where labeled reference images are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// `labels_dir/<label>/<sample>` on local disk.
    Fs,
    /// `bucket/prefix/<label>/<sample>` in an S3-compatible bucket.
    S3,
}

impl std::str::FromStr for StoreKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fs" | "file" | "local" => Ok(StoreKind::Fs),
            "s3" | "object" => Ok(StoreKind::S3),
            other => Err(ConfigError::Invalid(format!("unknown store kind {other:?}"))),
        }
    }
}

/// Daemon configuration.
///
/// Built from defaults, then an optional TOML file named by
/// `FACEGATE_CONFIG`, then `FACEGATE_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen address (default: 0.0.0.0:3000, or 0.0.0.0:$PORT).
    pub bind: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Override for the SCRFD model path.
    pub detector_model: Option<PathBuf>,
    /// Override for the ArcFace model path.
    pub recognizer_model: Option<PathBuf>,
    /// Number of inference threads, each with its own model sessions.
    pub engine_workers: usize,
    /// Euclidean distance at or below which a face is a match.
    pub match_threshold: f32,
    /// Per-sample budget for decode plus detection, in seconds.
    pub sample_timeout_secs: u64,
    /// Request body limit in megabytes.
    pub max_upload_mb: usize,
    pub store: StoreKind,
    /// Root of the filesystem store.
    pub labels_dir: PathBuf,
    pub bucket: Option<String>,
    /// Key prefix inside the bucket.
    pub prefix: String,
    pub s3_endpoint: Option<String>,
    pub s3_region: Option<String>,
    /// Permit plain-HTTP endpoints (local MinIO and the like).
    pub s3_allow_http: bool,
}

impl Default for Config {
    fn default() -> Self {
        let port = std::env::var("PORT").ok().and_then(|v| v.parse::<u16>().ok()).unwrap_or(3000);
        Self {
            bind: format!("0.0.0.0:{port}"),
            model_dir: default_model_dir(),
            detector_model: None,
            recognizer_model: None,
            engine_workers: 1,
            match_threshold: facegate_core::DEFAULT_MATCH_THRESHOLD,
            sample_timeout_secs: 10,
            max_upload_mb: 10,
            store: StoreKind::Fs,
            labels_dir: PathBuf::from("labels"),
            bucket: None,
            prefix: "labels".to_string(),
            s3_endpoint: None,
            s3_region: None,
            s3_allow_http: false,
        }
    }
}

impl Config {
    /// Load the optional TOML file, then apply `FACEGATE_*` overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config = match std::env::var_os("FACEGATE_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        let config = config.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Apply `FACEGATE_*` environment variables on top of `self`.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(bind) = std::env::var("FACEGATE_BIND") {
            self.bind = bind;
        }
        if let Ok(dir) = std::env::var("FACEGATE_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("FACEGATE_DETECTOR_MODEL") {
            self.detector_model = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("FACEGATE_RECOGNIZER_MODEL") {
            self.recognizer_model = Some(PathBuf::from(path));
        }
        self.engine_workers = env_usize("FACEGATE_ENGINE_WORKERS", self.engine_workers);
        self.match_threshold = env_f32("FACEGATE_MATCH_THRESHOLD", self.match_threshold);
        self.sample_timeout_secs = env_u64("FACEGATE_SAMPLE_TIMEOUT_SECS", self.sample_timeout_secs);
        self.max_upload_mb = env_usize("FACEGATE_MAX_UPLOAD_MB", self.max_upload_mb);
        if let Ok(kind) = std::env::var("FACEGATE_STORE") {
            self.store = kind.parse()?;
        }
        if let Ok(dir) = std::env::var("FACEGATE_LABELS_DIR") {
            self.labels_dir = PathBuf::from(dir);
        }
        if let Ok(bucket) = std::env::var("FACEGATE_BUCKET") {
            self.bucket = Some(bucket);
        }
        if let Ok(prefix) = std::env::var("FACEGATE_PREFIX") {
            self.prefix = prefix;
        }
        if let Ok(endpoint) = std::env::var("FACEGATE_S3_ENDPOINT") {
            self.s3_endpoint = Some(endpoint);
        }
        if let Ok(region) = std::env::var("FACEGATE_S3_REGION") {
            self.s3_region = Some(region);
        }
        if let Ok(v) = std::env::var("FACEGATE_S3_ALLOW_HTTP") {
            self.s3_allow_http = v != "0" && !v.eq_ignore_ascii_case("false");
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        if !self.match_threshold.is_finite() || self.match_threshold < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "match_threshold must be a non-negative number, got {}",
                self.match_threshold
            )));
        }
        if self.sample_timeout_secs == 0 {
            return Err(ConfigError::Invalid("sample_timeout_secs must be at least 1".into()));
        }
        if self.store == StoreKind::S3 && self.bucket.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::Invalid("store = \"s3\" requires a bucket".into()));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("bind address {:?}: {e}", self.bind)))
    }

    pub fn sample_timeout(&self) -> Duration {
        Duration::from_secs(self.sample_timeout_secs)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> PathBuf {
        self.detector_model
            .clone()
            .unwrap_or_else(|| self.model_dir.join("det_10g.onnx"))
    }

    /// Path to the ArcFace recognition model.
    pub fn recognizer_model_path(&self) -> PathBuf {
        self.recognizer_model
            .clone()
            .unwrap_or_else(|| self.model_dir.join("w600k_r50.onnx"))
    }
}

fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facegate/models")
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
