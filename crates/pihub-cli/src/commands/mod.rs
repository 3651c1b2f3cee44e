//! Command implementations for the PiHub CLI.

pub mod config;
pub mod start;
pub mod version;

use anyhow::{Context, Result};
use pihub_config::HubConfig;

/// Loads the configuration from an explicit path or the default
/// discovery chain.
pub(crate) fn load_config(path: Option<&str>) -> Result<HubConfig> {
    match path {
        Some(path) => HubConfig::load_from(path),
        None => HubConfig::load(),
    }
    .context("Failed to load configuration")
}
