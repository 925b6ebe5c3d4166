use crate::paths::AppPaths;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml error in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("toml serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub ssh: SshDefaults,
    pub operations: OperationConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct AppConfigLayer {
    pub ssh: Option<SshDefaultsLayer>,
    pub operations: Option<OperationConfigLayer>,
    pub logging: Option<LoggingConfigLayer>,
}

impl AppConfigLayer {
    pub fn apply_to(self, cfg: &mut AppConfig) {
        if let Some(layer) = self.ssh {
            cfg.ssh.apply(layer);
        }
        if let Some(layer) = self.operations {
            cfg.operations.apply(layer);
        }
        if let Some(layer) = self.logging {
            cfg.logging.apply(layer);
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyMode {
    Strict,
    AcceptNew,
    InsecureAcceptAny,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SshDefaults {
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub keepalive_interval_secs: u64,
    pub host_key_policy: HostKeyMode,
    pub known_hosts_path: Option<PathBuf>,
}

impl Default for SshDefaults {
    fn default() -> Self {
        Self {
            port: 22,
            connect_timeout_ms: 10_000,
            keepalive_interval_secs: 15,
            host_key_policy: HostKeyMode::AcceptNew,
            known_hosts_path: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct SshDefaultsLayer {
    pub port: Option<u16>,
    pub connect_timeout_ms: Option<u64>,
    pub keepalive_interval_secs: Option<u64>,
    pub host_key_policy: Option<HostKeyMode>,
    pub known_hosts_path: Option<PathBuf>,
}

impl SshDefaults {
    fn apply(&mut self, layer: SshDefaultsLayer) {
        if let Some(v) = layer.port {
            self.port = v;
        }
        if let Some(v) = layer.connect_timeout_ms {
            self.connect_timeout_ms = v;
        }
        if let Some(v) = layer.keepalive_interval_secs {
            self.keepalive_interval_secs = v;
        }
        if let Some(v) = layer.host_key_policy {
            self.host_key_policy = v;
        }
        if layer.known_hosts_path.is_some() {
            self.known_hosts_path = layer.known_hosts_path;
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperationConfig {
    pub timeout_ms: u64,
    pub evict_on_failure: bool,
    pub require_atomic_move: bool,
    pub buffer_size: usize,
    pub staging_dir: Option<PathBuf>,
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 120_000,
            evict_on_failure: true,
            require_atomic_move: true,
            buffer_size: 1024 * 64,
            staging_dir: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct OperationConfigLayer {
    pub timeout_ms: Option<u64>,
    pub evict_on_failure: Option<bool>,
    pub require_atomic_move: Option<bool>,
    pub buffer_size: Option<usize>,
    pub staging_dir: Option<PathBuf>,
}

impl OperationConfig {
    fn apply(&mut self, layer: OperationConfigLayer) {
        if let Some(v) = layer.timeout_ms {
            self.timeout_ms = v;
        }
        if let Some(v) = layer.evict_on_failure {
            self.evict_on_failure = v;
        }
        if let Some(v) = layer.require_atomic_move {
            self.require_atomic_move = v;
        }
        if let Some(v) = layer.buffer_size {
            self.buffer_size = v;
        }
        if layer.staging_dir.is_some() {
            self.staging_dir = layer.staging_dir;
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    pub stderr: bool,
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            stderr: true,
            file: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct LoggingConfigLayer {
    pub level: Option<String>,
    pub json: Option<bool>,
    pub stderr: Option<bool>,
    pub file: Option<bool>,
}

impl LoggingConfig {
    fn apply(&mut self, layer: LoggingConfigLayer) {
        if let Some(v) = layer.level {
            self.level = v;
        }
        if let Some(v) = layer.json {
            self.json = v;
        }
        if let Some(v) = layer.stderr {
            self.stderr = v;
        }
        if let Some(v) = layer.file {
            self.file = v;
        }
    }
}

pub fn to_toml(cfg: &AppConfig) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(cfg)?)
}

#[derive(Clone, Debug)]
pub struct ConfigManager {
    pub paths: AppPaths,
}

impl ConfigManager {
    pub fn new(paths: AppPaths) -> Self {
        Self { paths }
    }

    pub fn load(
        &self,
        cwd: Option<&Path>,
        explicit: Option<&Path>,
        overrides: Option<AppConfigLayer>,
    ) -> Result<AppConfig, ConfigError> {
        let mut cfg = AppConfig::default();

        if self.paths.config_file.exists() {
            Self::load_layer(&self.paths.config_file)?.apply_to(&mut cfg);
        }

        if let Some(dir) = cwd {
            let project_path = AppPaths::project_config_path(dir);
            if project_path.exists() {
                Self::load_layer(&project_path)?.apply_to(&mut cfg);
            }
        }

        if let Some(path) = explicit {
            Self::load_layer(path)?.apply_to(&mut cfg);
        }

        if let Some(layer) = overrides {
            layer.apply_to(&mut cfg);
        }

        Ok(cfg)
    }

    pub fn load_layer(path: &Path) -> Result<AppConfigLayer, ConfigError> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_default(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.paths.config_file.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = to_toml(&AppConfig::default())?;
        fs::write(&self.paths.config_file, content)?;
        Ok(())
    }
}
