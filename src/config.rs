//! Configuration loaded from `opsdiag.toml`.

use crate::cluster::SERVICE_ACCOUNT_DIR;
use crate::stacks::{BufferLimits, CaptureDestination};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Top-level configuration loaded from opsdiag.toml.
#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct DiagConfig {
    pub dump: DumpConfig,
    pub watch: WatchConfig,
    pub cluster: ClusterConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DumpConfig {
    /// Directory for dump files. Empty means stderr.
    pub dir: PathBuf,
    pub initial_buffer_bytes: usize,
    pub max_buffer_bytes: usize,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct WatchConfig {
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterMode {
    None,
    InCluster,
    Kubeconfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub mode: ClusterMode,
    /// Kubeconfig path; falls back to `$KUBECONFIG`, then `~/.kube/config`.
    pub kubeconfig: Option<PathBuf>,
    /// Abort startup when credentials cannot be loaded.
    pub required: bool,
}

/// Errors loading the config file.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "invalid config {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

impl DiagConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Files whose rotation should be noticed: configured paths plus the
    /// credential source in use.
    pub fn rotation_paths(&self) -> Vec<PathBuf> {
        let mut paths = self.watch.paths.clone();
        match self.cluster.mode {
            ClusterMode::None => {}
            ClusterMode::InCluster => paths.push(PathBuf::from(SERVICE_ACCOUNT_DIR)),
            ClusterMode::Kubeconfig => paths.push(self.cluster.kubeconfig_path()),
        }
        let mut unique: Vec<PathBuf> = Vec::with_capacity(paths.len());
        for path in paths {
            if !unique.contains(&path) {
                unique.push(path);
            }
        }
        unique
    }
}

impl DumpConfig {
    pub fn destination(&self) -> CaptureDestination {
        CaptureDestination::from_dir(&self.dir)
    }

    pub fn limits(&self) -> BufferLimits {
        BufferLimits {
            initial: self.initial_buffer_bytes,
            max: self.max_buffer_bytes,
        }
    }
}

impl ClusterConfig {
    pub fn kubeconfig_path(&self) -> PathBuf {
        if let Some(path) = &self.kubeconfig {
            return path.clone();
        }
        if let Some(env) = std::env::var_os("KUBECONFIG").filter(|v| !v.is_empty()) {
            return PathBuf::from(env);
        }
        let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
        home.join(".kube").join("config")
    }
}

// --- Default implementations ---

impl Default for DumpConfig {
    fn default() -> Self {
        let limits = BufferLimits::default();
        Self {
            dir: PathBuf::from("/var/log"),
            initial_buffer_bytes: limits.initial,
            max_buffer_bytes: limits.max,
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            mode: ClusterMode::None,
            kubeconfig: None,
            required: false,
        }
    }
}
