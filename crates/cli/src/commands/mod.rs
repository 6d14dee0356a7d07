pub mod config_cmd;
pub mod plan_file;
pub mod run;
pub mod validate;

use ragloom_config::{AppConfig, ConfigError};
use std::path::{Path, PathBuf};

/// Default config location, or the `--config` override.
pub fn config_file(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

/// Load config: file, then `RAGLOOM_*` env overrides, then validation.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut config = AppConfig::load_from(&config_file(explicit))?;
    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}
