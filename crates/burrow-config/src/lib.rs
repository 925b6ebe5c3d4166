pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, AppConfigLayer, ConfigError, ConfigManager, HostKeyMode, LoggingConfig,
    LoggingConfigLayer, OperationConfig, OperationConfigLayer, SshDefaults, SshDefaultsLayer,
};
pub use settings::to_toml;
