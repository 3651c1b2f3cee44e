//! # pihub-app: the PiHub application controller
//!
//! Glue between the connection server, the command dispatcher and the
//! board peripherals. [`App::init`] wires everything together from a
//! [`HubConfig`]; [`App::run`] starts serving; handlers registered in
//! the dispatcher implement the hub's command set:
//!
//! ```text
//! gpio set <line> <0|1>     sensor list                server status
//! gpio get <line>           sensor get <id> <kind>     server uptime
//!                                                      server net
//!                                                      server disconnect
//!                                                      server help
//! ```
//!
//! Responses are newline-terminated lines prefixed with `"> "`
//! (informational) or `"> err: "` (errors).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use pihub_config::{BusKind, DispatcherSection, HubConfig, SensorDef};
use pihub_dispatch::{CommandSpec, Dispatcher, DispatcherConfig};
use pihub_hw::{Bme280, Gpio, I2cBus, RegisterBus};
use pihub_server::{ClientHandle, Server, ServerConfig, ServerEvents};
use tracing::{error, info, warn};

mod error;
mod events;
mod handlers;
mod reply;
pub mod sysstat;

pub use error::{AppError, AppResult};
pub use reply::{ERROR_PREFIX, INFO_PREFIX};

use events::HubEvents;
use sysstat::HostStats;

/// One configured sensor and its live driver.
pub struct HubSensor {
    def: SensorDef,
    /// The driver, generic over the shared bus.
    pub device: Bme280<Arc<dyn RegisterBus>>,
}

impl HubSensor {
    /// The sensor's device address.
    pub fn addr(&self) -> u8 {
        self.def.addr
    }

    /// Human-readable name of the transport the sensor sits on.
    pub fn bus_name(&self) -> &'static str {
        match self.def.bus {
            BusKind::I2c => "I2C",
            BusKind::Spi => "SPI",
        }
    }
}

/// Shared hub state threaded through every command handler.
pub struct HubState {
    pub gpio: Gpio,
    pub sensors: Vec<HubSensor>,
    pub stats: HostStats,
    pub net_interface: String,
}

/// Execution context handed to command handlers: the originating
/// client, the server façade for replies, and the hub state.
pub struct CommandContext {
    pub server: Server,
    pub client: Arc<ClientHandle>,
    pub hub: Arc<HubState>,
}

pub(crate) struct AppInner {
    config: HubConfig,
    events: Arc<HubEvents>,
    server: Mutex<Server>,
    running: AtomicBool,
}

/// The app controller: owns the server, the dispatcher and the
/// peripherals, and sequences their lifecycles.
///
/// Cheap to clone; all clones drive the same hub.
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

impl App {
    /// Builds the full hub from configuration: peripherals, command
    /// table, and a bound (not yet listening) server.
    pub fn init(config: HubConfig) -> AppResult<Self> {
        config.validate()?;

        let hub = Arc::new(build_hub(&config)?);
        let dispatcher = build_dispatcher(&config.dispatcher)?;
        let events = Arc::new(HubEvents::new(
            dispatcher,
            Arc::clone(&hub),
            config.server.recv_buffer,
        ));
        let server = Server::init(
            server_config(&config),
            Arc::clone(&events) as Arc<dyn ServerEvents>,
        )?;

        let inner = Arc::new(AppInner {
            config,
            events: Arc::clone(&events),
            server: Mutex::new(server),
            running: AtomicBool::new(false),
        });
        events.attach(Arc::downgrade(&inner));

        info!("hub initialized");
        Ok(Self { inner })
    }

    pub(crate) fn from_inner(inner: Arc<AppInner>) -> Self {
        Self { inner }
    }

    /// Starts serving clients.
    pub fn run(&self) -> AppResult<()> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(AppError::AlreadyRunning);
        }
        if let Err(e) = self.server().run() {
            self.inner.running.store(false, Ordering::SeqCst);
            return Err(e.into());
        }
        info!(addr = %self.local_addr(), "hub running");
        Ok(())
    }

    /// Disconnects every client and stops the listener.
    pub fn stop(&self) -> AppResult<()> {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return Err(AppError::NotStarted);
        }
        self.server().shutdown()?;
        info!("hub stopped");
        Ok(())
    }

    /// Waits for the serving tasks to exit and releases the server.
    pub fn deinit(&self) -> AppResult<()> {
        if self.inner.running.load(Ordering::SeqCst) {
            return Err(AppError::AlreadyRunning);
        }
        self.server().deinit()?;
        info!("hub deinitialized");
        Ok(())
    }

    /// The address the hub is bound to; useful with a configured
    /// port of 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.server().local_addr()
    }

    /// Whether `run` has been called without a matching `stop`.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Full recovery cycle after a server failure: stop, deinit,
    /// rebuild the server, run. Called from the recovery thread.
    pub(crate) fn restart(&self) {
        info!("attempting to restart the hub");

        if let Err(e) = self.stop() {
            warn!(error = %e, "stop during restart failed");
        }
        if let Err(e) = self.deinit() {
            warn!(error = %e, "deinit during restart failed");
        }

        let rebuilt = Server::init(
            server_config(&self.inner.config),
            Arc::clone(&self.inner.events) as Arc<dyn ServerEvents>,
        );
        match rebuilt {
            Ok(server) => {
                *self
                    .inner
                    .server
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = server;
                match self.run() {
                    Ok(()) => info!("hub restarted"),
                    Err(e) => error!(error = %e, "restart run failed"),
                }
            }
            Err(e) => error!(error = %e, "restart init failed"),
        }
    }

    fn server(&self) -> Server {
        self.inner
            .server
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn server_config(config: &HubConfig) -> ServerConfig {
    ServerConfig::new(config.server.bind_addr())
        .with_max_clients(config.server.max_clients)
        .with_max_pending(config.server.max_pending)
}

/// Opens the peripherals the configuration asks for. The I2C adapter
/// is opened once and shared by every sensor on it.
fn build_hub(config: &HubConfig) -> AppResult<HubState> {
    let gpio = match &config.hardware.gpio_base {
        Some(base) => Gpio::with_base(base),
        None => Gpio::new(),
    };

    let mut sensors = Vec::new();
    let mut i2c: Option<Arc<dyn RegisterBus>> = None;
    for def in &config.hardware.sensors {
        match def.bus {
            BusKind::I2c => {
                let bus = match &i2c {
                    Some(bus) => Arc::clone(bus),
                    None => {
                        let bus: Arc<dyn RegisterBus> =
                            Arc::new(I2cBus::open(config.hardware.i2c_adapter)?);
                        i2c = Some(Arc::clone(&bus));
                        bus
                    }
                };
                let device = Bme280::new(def.addr, bus)?;
                sensors.push(HubSensor { def: *def, device });
            }
            BusKind::Spi => {
                warn!(addr = def.addr, "SPI sensors are not supported yet, skipping");
            }
        }
    }

    Ok(HubState {
        gpio,
        sensors,
        stats: HostStats::new(),
        net_interface: config.server.net_interface.clone(),
    })
}

/// Registers the hub's command table; registration order defines
/// lookup priority.
fn build_dispatcher(section: &DispatcherSection) -> AppResult<Dispatcher<CommandContext>> {
    let dispatcher = Dispatcher::new(DispatcherConfig {
        delimiter: section.delimiter.clone(),
    })?;

    type Handler = fn(&[&str], &CommandContext);
    let commands: [(&str, &str, Handler); 9] = [
        ("gpio", "set", handlers::gpio_set),
        ("gpio", "get", handlers::gpio_get),
        ("sensor", "list", handlers::sensor_list),
        ("sensor", "get", handlers::sensor_get),
        ("server", "status", handlers::server_status),
        ("server", "uptime", handlers::server_uptime),
        ("server", "net", handlers::server_net),
        ("server", "disconnect", handlers::server_disconnect),
        ("server", "help", handlers::server_help),
    ];

    for (id, (target, action, handler)) in commands.into_iter().enumerate() {
        dispatcher.register(id, CommandSpec::new(target, action, handler))?;
    }
    Ok(dispatcher)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatcher_holds_the_full_command_table() {
        let dispatcher = build_dispatcher(&DispatcherSection::default()).unwrap();
        assert_eq!(dispatcher.len(), 9);
    }

    #[test]
    fn dispatcher_respects_configured_delimiter() {
        let section = DispatcherSection {
            delimiter: ",".to_string(),
        };
        let dispatcher = build_dispatcher(&section).unwrap();
        assert_eq!(dispatcher.len(), 9);
    }

    #[test]
    fn server_config_mirrors_hub_config() {
        let mut config = HubConfig::default();
        config.server.port = 7500;
        config.server.max_clients = 3;
        config.server.max_pending = 7;

        let sc = server_config(&config);
        assert_eq!(sc.bind_addr.port(), 7500);
        assert_eq!(sc.max_clients, 3);
        assert_eq!(sc.max_pending, 7);
    }
}
