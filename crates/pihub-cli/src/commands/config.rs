//! Config commands - inspect and validate the merged configuration.

use anyhow::{Context, Result};

pub fn show(config_path: Option<&str>) -> Result<()> {
    let config = super::load_config(config_path)?;
    let rendered =
        toml::to_string_pretty(&config).context("Failed to render configuration")?;
    print!("{rendered}");
    Ok(())
}

pub fn validate(config_path: Option<&str>) -> Result<()> {
    // The loader validates after merging; reaching this point means
    // the configuration is usable.
    let config = super::load_config(config_path)?;
    println!(
        "Configuration OK (port {}, {} sensor(s)).",
        config.server.port,
        config.hardware.sensors.len()
    );
    Ok(())
}
