//! Capability negotiation for out-of-band binary access.
//!
//! A separate process asks for an interface by identity and version. When the
//! request matches, the broker hands out another shared reference to the one
//! [`Performance`] implementation owned by the daemon. The broker never creates
//! implementations and never destroys one while handles are outstanding: the
//! implementation is released once the daemon has shut the broker down and
//! the last handle is dropped.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing::{debug, info};

use crate::exchange::Performance;

/// Tracing target for broker operations.
pub(crate) const BROKER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::broker");

/// Identity of a behavioural contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceId(pub u32);

impl InterfaceId {
    /// Generic base capability every implementation answers to.
    pub const UNKNOWN: Self = Self(0x0000_0000);
    /// The binary exchange contract.
    pub const PERFORMANCE: Self = Self(0x0000_0402);
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{:#010x}", self.0)
    }
}

/// Revision of the performance contract this broker supports.
pub const SUPPORTED_VERSION: u32 = 1;

/// Version sentinel accepted in place of a specific revision.
pub const ANY_VERSION: u32 = u32::MAX;

/// Raised by [`InterfaceBroker::try_acquire`] when the request is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("interface {interface} version {version} is not available")]
pub struct CapabilityRefused {
    /// Requested interface.
    pub interface: InterfaceId,
    /// Requested version.
    pub version: u32,
}

/// Whether any handle is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerState {
    /// No handle outstanding.
    Idle,
    /// At least one handle outstanding.
    Granted,
}

/// Shared reference to the brokered implementation.
///
/// Dropping the handle releases it.
pub struct InterfaceHandle {
    implementation: Arc<dyn Performance>,
    outstanding: Arc<AtomicUsize>,
}

impl Deref for InterfaceHandle {
    type Target = dyn Performance;

    fn deref(&self) -> &Self::Target {
        self.implementation.as_ref()
    }
}

impl fmt::Debug for InterfaceHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("InterfaceHandle")
            .field("outstanding", &self.outstanding.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Drop for InterfaceHandle {
    fn drop(&mut self) {
        let previous = self.outstanding.fetch_sub(1, Ordering::SeqCst);
        debug!(
            target: BROKER_TARGET,
            outstanding = previous.saturating_sub(1),
            "interface handle released"
        );
    }
}

/// Hands out shared references to a single implementation.
pub struct InterfaceBroker {
    implementation: Mutex<Option<Arc<dyn Performance>>>,
    outstanding: Arc<AtomicUsize>,
}

impl InterfaceBroker {
    /// Creates a broker fronting `implementation`.
    pub fn new(implementation: Arc<dyn Performance>) -> Self {
        Self {
            implementation: Mutex::new(Some(implementation)),
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns true when a request for `interface` at `version` is acceptable.
    #[must_use]
    pub fn accepts(interface: InterfaceId, version: u32) -> bool {
        (version == SUPPORTED_VERSION || version == ANY_VERSION)
            && (interface == InterfaceId::PERFORMANCE || interface == InterfaceId::UNKNOWN)
    }

    /// Grants a handle, or returns `None` when the request is refused.
    pub fn acquire(&self, interface: InterfaceId, version: u32) -> Option<InterfaceHandle> {
        self.try_acquire(interface, version).ok()
    }

    /// Grants a handle or reports why the request was refused.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityRefused`] when the identity or version does not
    /// match, or the broker has been shut down.
    pub fn try_acquire(
        &self,
        interface: InterfaceId,
        version: u32,
    ) -> Result<InterfaceHandle, CapabilityRefused> {
        let refused = CapabilityRefused { interface, version };
        if !Self::accepts(interface, version) {
            debug!(
                target: BROKER_TARGET,
                %interface,
                version,
                "interface request refused"
            );
            return Err(refused);
        }

        let guard = self
            .implementation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(implementation) = guard.as_ref() else {
            debug!(target: BROKER_TARGET, %interface, "broker is shut down");
            return Err(refused);
        };
        let outstanding = self.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = InterfaceHandle {
            implementation: Arc::clone(implementation),
            outstanding: Arc::clone(&self.outstanding),
        };
        drop(guard);

        info!(
            target: BROKER_TARGET,
            %interface,
            version,
            outstanding,
            "interface granted"
        );
        Ok(handle)
    }

    /// Releases a previously granted handle.
    pub fn release(&self, handle: InterfaceHandle) {
        drop(handle);
    }

    /// Number of handles currently outstanding.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Current state, derived from the outstanding count.
    #[must_use]
    pub fn state(&self) -> BrokerState {
        if self.outstanding() == 0 {
            BrokerState::Idle
        } else {
            BrokerState::Granted
        }
    }

    /// Drops the broker's own reference; later requests are refused.
    ///
    /// Outstanding handles stay valid and keep the implementation alive.
    pub fn shutdown(&self) {
        let released = self
            .implementation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if released.is_some() {
            info!(
                target: BROKER_TARGET,
                outstanding = self.outstanding(),
                "broker shut down"
            );
        }
    }
}

impl fmt::Debug for InterfaceBroker {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("InterfaceBroker")
            .field("outstanding", &self.outstanding())
            .finish_non_exhaustive()
    }
}
