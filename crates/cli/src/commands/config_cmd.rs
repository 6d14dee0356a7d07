//! `ragloom config`: Configuration inspection.

use super::{config_file, load_config};
use ragloom_config::AppConfig;
use std::path::Path;

pub async fn show(explicit: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(explicit).map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn defaults() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", AppConfig::default_toml());
    Ok(())
}

pub async fn path(explicit: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", config_file(explicit).display());
    Ok(())
}
