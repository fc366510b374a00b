//! Accept loop for the TCP endpoint.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use perfrpc_config::ListenAddress;

use super::{ConnectionHandler, LISTENER_TARGET, ListenerError};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Listener bound to the configured endpoint.
#[derive(Debug)]
pub struct SocketListener {
    endpoint: ListenAddress,
    listener: TcpListener,
}

impl SocketListener {
    /// Resolves and binds `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error when the host does not resolve or the bind fails.
    pub fn bind(endpoint: &ListenAddress) -> Result<Self, ListenerError> {
        let listener = bind_tcp(endpoint)?;
        Ok(Self {
            endpoint: endpoint.clone(),
            listener,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }

    /// Starts the accept loop on a background thread.
    ///
    /// # Errors
    ///
    /// Returns an error when the socket cannot be made non-blocking or the
    /// thread cannot be spawned.
    pub fn start(
        self,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<ListenerHandle, ListenerError> {
        self.listener
            .set_nonblocking(true)
            .map_err(ListenerError::NonBlocking)?;
        let local_addr = self.local_addr();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name(concat!(env!("CARGO_PKG_NAME"), "-listener").to_owned())
            .spawn(move || run_accept_loop(&self, &shutdown_flag, &handler))
            .map_err(ListenerError::Spawn)?;
        Ok(ListenerHandle {
            shutdown,
            local_addr,
            handle: Some(handle),
        })
    }
}

/// Handle to the background listener thread.
#[derive(Debug)]
pub struct ListenerHandle {
    shutdown: Arc<AtomicBool>,
    local_addr: Option<SocketAddr>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Asks the accept loop to stop.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Waits for the accept loop to exit.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::ThreadPanic`] if the thread panicked.
    pub fn join(mut self) -> Result<(), ListenerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| ListenerError::ThreadPanic),
            None => Ok(()),
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

fn run_accept_loop(
    listener: &SocketListener,
    shutdown: &AtomicBool,
    handler: &Arc<dyn ConnectionHandler>,
) {
    info!(
        target: LISTENER_TARGET,
        endpoint = %listener.endpoint,
        "socket listener active"
    );
    let mut last_error = None::<io::ErrorKind>;
    while !shutdown.load(Ordering::SeqCst) {
        match accept_connection(&listener.listener) {
            Ok(Some(stream)) => {
                last_error = None;
                let handler = Arc::clone(handler);
                thread::spawn(move || handler.handle(stream));
            }
            Ok(None) => {
                thread::sleep(ACCEPT_BACKOFF);
            }
            Err(error) => {
                let kind = error.kind();
                if last_error != Some(kind) {
                    warn!(
                        target: LISTENER_TARGET,
                        error = %error,
                        "socket accept error"
                    );
                }
                last_error = Some(kind);
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }
    info!(target: LISTENER_TARGET, "socket listener stopped");
}

fn accept_connection(listener: &TcpListener) -> Result<Option<TcpStream>, io::Error> {
    match listener.accept() {
        Ok((stream, _)) => {
            stream.set_nonblocking(false)?;
            Ok(Some(stream))
        }
        Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(error) => Err(error),
    }
}

fn bind_tcp(endpoint: &ListenAddress) -> Result<TcpListener, ListenerError> {
    let addrs: Vec<SocketAddr> = (endpoint.host(), endpoint.port())
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            endpoint: endpoint.clone(),
            source: Some(source),
        })?
        .collect();

    let mut last_error = None;
    for addr in &addrs {
        match TcpListener::bind(addr) {
            Ok(listener) => return Ok(listener),
            Err(error) => {
                debug!(target: LISTENER_TARGET, %addr, %error, "bind attempt failed");
                last_error = Some(error);
            }
        }
    }
    Err(match last_error {
        Some(source) => ListenerError::Bind {
            endpoint: endpoint.clone(),
            attempts: addrs.len(),
            source,
        },
        None => ListenerError::Resolve {
            endpoint: endpoint.clone(),
            source: None,
        },
    })
}
