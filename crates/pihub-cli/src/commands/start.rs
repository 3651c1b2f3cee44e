//! Start command - runs the hub daemon.

use anyhow::{Context, Result};
use pihub_app::App;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::info;

pub fn run(config_path: Option<&str>, port: Option<u16>) -> Result<()> {
    let mut config = super::load_config(config_path)?;
    if let Some(port) = port {
        config.server.port = port;
    }

    println!();
    println!("PiHub - home-automation command server");
    println!();
    println!("  Port:          {}", config.server.port);
    println!("  Max clients:   {}", config.server.max_clients);
    println!("  Net interface: {}", config.server.net_interface);
    println!("  Sensors:       {}", config.hardware.sensors.len());

    let app = App::init(config).context("Failed to initialize the hub")?;
    app.run().context("Failed to start the hub")?;

    println!();
    println!("Hub is ready on {}. Press Ctrl+C to stop.", app.local_addr());
    println!();

    // Block until a termination signal arrives.
    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("Failed to install signal handlers")?;
    if let Some(signal) = signals.forever().next() {
        info!(signal, "termination signal received");
    }

    app.stop().context("Failed to stop the hub")?;
    app.deinit().context("Failed to deinitialize the hub")?;

    println!();
    println!("Hub stopped gracefully.");

    Ok(())
}
