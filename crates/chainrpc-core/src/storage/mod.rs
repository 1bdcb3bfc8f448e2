pub mod config;

pub use config::ConfigStorage;

use crate::{Error, Result};
use std::path::PathBuf;

pub fn get_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("chainrpc"))
        .ok_or_else(|| Error::NotFound("Could not find data directory".to_string()))
}

pub fn get_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("chainrpc"))
        .ok_or_else(|| Error::NotFound("Could not find config directory".to_string()))
}

pub fn init_data_dir() -> Result<PathBuf> {
    let data_dir = get_data_dir()?;
    std::fs::create_dir_all(&data_dir)?;
    Ok(data_dir)
}

pub fn init_config_dir() -> Result<PathBuf> {
    let config_dir = get_config_dir()?;
    std::fs::create_dir_all(&config_dir)?;
    Ok(config_dir)
}
