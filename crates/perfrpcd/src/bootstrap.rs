//! Daemon bootstrap orchestration.
//!
//! Bootstrap loads configuration, installs telemetry, assembles the component
//! graph and starts the scheduler runtime. The resulting [`Daemon`] owns every
//! component; the listener is started separately by [`Daemon::serve`] so tests
//! can drive the components without a socket.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use perfrpc_config::Config;

use crate::broker::{CapabilityRefused, InterfaceBroker, InterfaceHandle, InterfaceId};
use crate::dispatch::{
    DispatchConnectionHandler, MethodDispatcher, MethodRegistry, Notifier, Service, performance,
};
use crate::exchange::{BinaryExchangeChannel, Performance};
use crate::geometry::GeometryStore;
use crate::health::HealthReporter;
use crate::scheduler::{Clock, Scheduler, SchedulerError, SchedulerHandle};
use crate::telemetry::{self, TelemetryError, TelemetryHandle};
use crate::transport::{ListenerError, ListenerHandle, SocketListener};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    ///
    /// # Errors
    ///
    /// Returns the loader's error when no configuration can be produced.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader returning a fixed configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already resolved configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The scheduler runtime could not start.
    #[error("failed to start scheduler: {source}")]
    Scheduler {
        /// Underlying scheduler error.
        #[source]
        source: SchedulerError,
    },
}

/// Errors raised while serving or stopping a bootstrapped daemon.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The listener failed to bind, start or stop.
    #[error("listener failure: {source}")]
    Listener {
        /// Underlying listener error.
        #[from]
        source: ListenerError,
    },
    /// The scheduler runtime failed to stop cleanly.
    #[error("scheduler failure: {source}")]
    Scheduler {
        /// Underlying scheduler error.
        #[from]
        source: SchedulerError,
    },
}

/// Components shared by the request path, the scheduler and the broker.
struct Components {
    geometry: Arc<GeometryStore>,
    notifier: Arc<Notifier>,
    scheduler: Scheduler,
    service: Arc<Service>,
    dispatcher: Arc<MethodDispatcher>,
    broker: Arc<InterfaceBroker>,
}

impl Components {
    fn assemble(clock: Arc<dyn Clock>) -> Self {
        let geometry = Arc::new(GeometryStore::new());
        let notifier = Arc::new(Notifier::new());
        let scheduler = Scheduler::new(clock);
        let channel: Arc<dyn Performance> = Arc::new(BinaryExchangeChannel::new());
        let service = Arc::new(Service::new(
            Arc::clone(&geometry),
            Arc::clone(&notifier),
            scheduler.clone(),
        ));

        let mut registry = MethodRegistry::new();
        service.register(&mut registry);
        performance::register(&mut registry, &channel);
        let dispatcher = Arc::new(MethodDispatcher::new(registry, Arc::clone(&notifier)));
        let broker = Arc::new(InterfaceBroker::new(channel));

        Self {
            geometry,
            notifier,
            scheduler,
            service,
            dispatcher,
            broker,
        }
    }
}

/// Result of a successful bootstrap invocation.
pub struct Daemon {
    config: Config,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
    components: Components,
    scheduler_runtime: Option<SchedulerHandle>,
    listener: Option<ListenerHandle>,
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Dispatcher serving the request/response channel.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<MethodDispatcher> {
        &self.components.dispatcher
    }

    /// Shared window geometry.
    #[must_use]
    pub fn geometry(&self) -> &Arc<GeometryStore> {
        &self.components.geometry
    }

    /// Connection and subscription registry.
    #[must_use]
    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.components.notifier
    }

    /// Job scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.components.scheduler
    }

    /// Service operations and their notification timer.
    #[must_use]
    pub fn service(&self) -> &Arc<Service> {
        &self.components.service
    }

    /// Capability broker for out-of-band binary access.
    #[must_use]
    pub fn broker(&self) -> &Arc<InterfaceBroker> {
        &self.components.broker
    }

    /// Requests the binary exchange interface from the broker.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityRefused`] when the identity or version is not
    /// served or the daemon is shutting down.
    pub fn acquire_interface(
        &self,
        interface: InterfaceId,
        version: u32,
    ) -> Result<InterfaceHandle, CapabilityRefused> {
        self.components.broker.try_acquire(interface, version)
    }

    /// Address the listener is bound to, once serving.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(ListenerHandle::local_addr)
    }

    /// Binds the configured endpoint and starts accepting connections.
    ///
    /// Calling `serve` while already serving returns the bound address.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Listener`] when the endpoint cannot be bound.
    pub fn serve(&mut self) -> Result<Option<SocketAddr>, RuntimeError> {
        if self.listener.is_some() {
            return Ok(self.local_addr());
        }
        let listener = SocketListener::bind(self.config.listen())?;
        let handler = Arc::new(DispatchConnectionHandler::new(Arc::clone(
            &self.components.dispatcher,
        )));
        let handle = listener.start(handler)?;
        if let Some(addr) = handle.local_addr() {
            self.reporter.listener_ready(addr);
        }
        self.listener = Some(handle);
        Ok(self.local_addr())
    }

    /// Stops the listener, releases the broker's reference, drops every
    /// scheduled job and joins the background threads.
    ///
    /// # Errors
    ///
    /// Returns an error when a background thread panicked.
    pub fn shutdown(mut self) -> Result<(), RuntimeError> {
        self.reporter.shutdown_starting();
        let listener = self.listener.take().map(|handle| {
            handle.shutdown();
            handle.join()
        });
        self.components.broker.shutdown();
        self.components.service.start_notifications(0);
        self.components.scheduler.clear();
        let scheduler = self.scheduler_runtime.take().map(|handle| {
            handle.shutdown();
            handle.join()
        });
        listener.transpose()?;
        scheduler.transpose()?;
        self.reporter.shutdown_completed();
        Ok(())
    }
}

impl fmt::Debug for Daemon {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Daemon")
            .field("config", &self.config)
            .field("listening", &self.local_addr())
            .finish_non_exhaustive()
    }
}

/// Bootstraps the daemon using the supplied collaborators.
///
/// # Errors
///
/// Returns a [`BootstrapError`] when configuration, telemetry or the
/// scheduler runtime fail; the failure is also reported to `reporter`.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    clock: Arc<dyn Clock>,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let error = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let telemetry = match telemetry::initialise(&config) {
        Ok(handle) => handle,
        Err(source) => {
            let error = BootstrapError::Telemetry { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let components = Components::assemble(clock);
    let scheduler_runtime = match components.scheduler.start() {
        Ok(handle) => handle,
        Err(source) => {
            let error = BootstrapError::Scheduler { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    if let Some(interval) = config.notification_interval() {
        components.service.timer().arm(interval);
    }

    reporter.bootstrap_succeeded(&config);

    Ok(Daemon {
        config,
        telemetry,
        reporter,
        components,
        scheduler_runtime: Some(scheduler_runtime),
        listener: None,
    })
}
