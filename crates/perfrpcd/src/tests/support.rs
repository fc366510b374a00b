//! Test harness utilities for the daemon lifecycle suites.

use std::cell::RefCell;
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ortho_config::{OrthoConfig, OrthoError};
use serde_json::Value;

use perfrpc_config::{Config, ListenAddress};

use crate::bootstrap::{BootstrapError, ConfigLoader, Daemon, bootstrap_with};
use crate::broker::{CapabilityRefused, InterfaceBroker, InterfaceHandle, InterfaceId};
use crate::health::HealthReporter;
use crate::process::{ShutdownError, ShutdownSignal};
use crate::scheduler::ManualClock;

/// Builds a fresh scenario world.
pub fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}

/// Configuration bound to an ephemeral loopback port.
pub fn loopback_config() -> Config {
    Config {
        listen: ListenAddress::new("127.0.0.1", 0),
        ..Config::default()
    }
}

/// Scenario world shared across BDD steps.
pub struct TestWorld {
    loader: Box<dyn ConfigLoader>,
    pub reporter: Arc<RecordingHealthReporter>,
    pub clock: Arc<ManualClock>,
    daemon: Option<Daemon>,
    broker: Option<Arc<InterfaceBroker>>,
    bootstrap_error: Option<BootstrapError>,
    interface: Option<Result<InterfaceHandle, CapabilityRefused>>,
    shutdown_result: Option<Result<(), String>>,
}

impl TestWorld {
    /// Builds a world with a successful configuration loader.
    pub fn new() -> Self {
        Self {
            loader: Box::new(TestConfigLoader::new(loopback_config())),
            reporter: Arc::new(RecordingHealthReporter::default()),
            clock: Arc::new(ManualClock::default()),
            daemon: None,
            broker: None,
            bootstrap_error: None,
            interface: None,
            shutdown_result: None,
        }
    }

    /// Installs a loader that always fails.
    pub fn use_failing_loader(&mut self) {
        self.loader = Box::new(FailingConfigLoader);
        self.reset_results();
    }

    /// Installs a loader that succeeds with `config`.
    pub fn use_loader_with(&mut self, config: Config) {
        self.loader = Box::new(TestConfigLoader::new(config));
        self.reset_results();
    }

    /// Runs the bootstrap sequence once.
    pub fn bootstrap(&mut self) {
        if self.daemon.is_some() || self.bootstrap_error.is_some() {
            return;
        }
        match bootstrap_with(&*self.loader, self.reporter.clone(), self.clock.clone()) {
            Ok(daemon) => {
                self.broker = Some(Arc::clone(daemon.broker()));
                self.daemon = Some(daemon);
            }
            Err(error) => self.bootstrap_error = Some(error),
        }
    }

    /// Returns whether bootstrap produced an error.
    pub fn bootstrap_error(&self) -> Option<&BootstrapError> {
        self.bootstrap_error.as_ref()
    }

    /// Returns the bootstrapped daemon, if any.
    pub fn daemon(&self) -> Option<&Daemon> {
        self.daemon.as_ref()
    }

    /// Broker of the last bootstrapped daemon; outlives shutdown.
    pub fn broker(&self) -> Option<&Arc<InterfaceBroker>> {
        self.broker.as_ref()
    }

    /// Requests the binary exchange interface from the running daemon.
    pub fn acquire_interface(&mut self, interface: InterfaceId, version: u32) {
        if let Some(daemon) = self.daemon.as_ref() {
            self.interface = Some(daemon.acquire_interface(interface, version));
        }
    }

    /// Last broker outcome, if an interface was requested.
    pub fn interface(&self) -> Option<&Result<InterfaceHandle, CapabilityRefused>> {
        self.interface.as_ref()
    }

    /// Drops the held interface handle.
    pub fn release_interface(&mut self) {
        self.interface = None;
    }

    /// Shuts the daemon down and records the outcome.
    pub fn shutdown(&mut self) {
        if let Some(daemon) = self.daemon.take() {
            self.shutdown_result = Some(daemon.shutdown().map_err(|error| error.to_string()));
        }
    }

    /// Outcome of the last shutdown, if one ran.
    pub fn shutdown_result(&self) -> Option<&Result<(), String>> {
        self.shutdown_result.as_ref()
    }

    fn reset_results(&mut self) {
        self.shutdown();
        self.daemon = None;
        self.broker = None;
        self.bootstrap_error = None;
        self.interface = None;
        self.shutdown_result = None;
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestWorld {
    fn drop(&mut self) {
        self.interface = None;
        if let Some(daemon) = self.daemon.take() {
            let _ = daemon.shutdown();
        }
    }
}

/// Loader returning a fixed configuration.
pub struct TestConfigLoader {
    config: Config,
}

impl TestConfigLoader {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Loader that intentionally fails by passing invalid CLI arguments.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("perfrpcd"),
            OsString::from("--listen"),
            OsString::from("invalid://listener"),
        ];
        Config::load_from_iter(args)
    }
}

/// Shutdown signal that returns immediately.
pub struct ImmediateShutdown;

impl ShutdownSignal for ImmediateShutdown {
    fn wait(&self) -> Result<(), ShutdownError> {
        Ok(())
    }
}

/// Records health events for assertions.
#[derive(Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn listener_ready(&self, addr: SocketAddr) {
        self.record(HealthEvent::ListenerReady(addr));
    }

    fn shutdown_starting(&self) {
        self.record(HealthEvent::ShutdownStarting);
    }

    fn shutdown_completed(&self) {
        self.record(HealthEvent::ShutdownCompleted);
    }
}

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    /// Bootstrap started.
    BootstrapStarting,
    /// Bootstrap completed successfully.
    BootstrapSucceeded,
    /// Bootstrap failed with an error description.
    BootstrapFailed(String),
    /// Listener bound to the address.
    ListenerReady(SocketAddr),
    /// Shutdown began.
    ShutdownStarting,
    /// Shutdown finished.
    ShutdownCompleted,
}

/// Line-oriented JSONL client for a served daemon.
pub struct JsonlClient {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl JsonlClient {
    /// Connects to `addr` with a bounded read timeout.
    pub fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .expect("set read timeout");
        let reader = BufReader::new(stream.try_clone().expect("clone stream"));
        Self { stream, reader }
    }

    /// Writes one request line.
    pub fn send(&mut self, request: &str) {
        self.stream.write_all(request.as_bytes()).expect("write request");
        self.stream.write_all(b"\n").expect("write newline");
        self.stream.flush().expect("flush");
    }

    /// Reads the next message from the daemon.
    pub fn next_message(&mut self) -> Value {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).expect("read message");
        assert!(read > 0, "daemon closed the connection");
        serde_json::from_str(line.trim()).expect("message is json")
    }

    /// Sends `request` and reads the next message.
    pub fn call(&mut self, request: &str) -> Value {
        self.send(request);
        self.next_message()
    }
}
