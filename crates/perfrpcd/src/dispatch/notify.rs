//! Event subscriptions and notification delivery.
//!
//! Connections attach a sink when they open and detach when they close.
//! Subscriptions pair an event with a connection and a caller-chosen client
//! id, which `postmessage` style notifications use to pick recipients.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::{debug, warn};

use crate::connection::ConnectionId;

use super::errors::DispatchError;
use super::response::DaemonMessage;
use super::DISPATCH_TARGET;

/// Destination for messages pushed to a connection.
pub trait NotificationSink: Send + Sync {
    /// Writes one message to the connection.
    ///
    /// # Errors
    ///
    /// Returns an error when the connection can no longer be written to.
    fn deliver(&self, message: &DaemonMessage) -> Result<(), DispatchError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Subscription {
    event: String,
    connection: ConnectionId,
    client: String,
}

#[derive(Default)]
struct Registry {
    connections: HashMap<ConnectionId, Arc<dyn NotificationSink>>,
    subscriptions: Vec<Subscription>,
}

/// Tracks live connections and their event subscriptions.
#[derive(Default)]
pub struct Notifier {
    registry: Mutex<Registry>,
}

impl Notifier {
    /// Creates a notifier with no connections.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers the sink for a newly opened connection.
    pub fn attach(&self, connection: ConnectionId, sink: Arc<dyn NotificationSink>) {
        self.lock().connections.insert(connection, sink);
        debug!(target: DISPATCH_TARGET, %connection, "connection attached");
    }

    /// Forgets a closed connection and drops its subscriptions.
    pub fn detach(&self, connection: ConnectionId) -> usize {
        let mut registry = self.lock();
        registry.connections.remove(&connection);
        let before = registry.subscriptions.len();
        registry
            .subscriptions
            .retain(|subscription| subscription.connection != connection);
        let dropped = before - registry.subscriptions.len();
        debug!(
            target: DISPATCH_TARGET,
            %connection,
            dropped,
            "connection detached"
        );
        dropped
    }

    /// Subscribes `connection` to `event` under `client`. Returns false if
    /// the same subscription already exists.
    pub fn subscribe(&self, event: &str, connection: ConnectionId, client: &str) -> bool {
        let subscription = Subscription {
            event: event.to_owned(),
            connection,
            client: client.to_owned(),
        };
        let mut registry = self.lock();
        if registry.subscriptions.contains(&subscription) {
            return false;
        }
        registry.subscriptions.push(subscription);
        true
    }

    /// Removes a subscription. Returns false if it did not exist.
    pub fn unsubscribe(&self, event: &str, connection: ConnectionId, client: &str) -> bool {
        let mut registry = self.lock();
        let before = registry.subscriptions.len();
        registry.subscriptions.retain(|subscription| {
            !(subscription.event == event
                && subscription.connection == connection
                && subscription.client == client)
        });
        before != registry.subscriptions.len()
    }

    /// Delivers `event` to every subscribed connection, restricted to
    /// subscriptions made under `designator` when one is given. Returns the
    /// number of successful deliveries.
    pub fn notify(&self, event: &str, params: &Value, designator: Option<&str>) -> usize {
        let targets: Vec<(ConnectionId, Arc<dyn NotificationSink>)> = {
            let registry = self.lock();
            registry
                .subscriptions
                .iter()
                .filter(|subscription| subscription.event == event)
                .filter(|subscription| designator.is_none_or(|client| subscription.client == client))
                .filter_map(|subscription| {
                    registry
                        .connections
                        .get(&subscription.connection)
                        .map(|sink| (subscription.connection, Arc::clone(sink)))
                })
                .collect()
        };
        let message = DaemonMessage::notification(event, params.clone());
        targets
            .iter()
            .filter(|(connection, sink)| deliver(*connection, sink.as_ref(), &message))
            .count()
    }

    /// Delivers `event` to one connection regardless of subscriptions.
    pub fn notify_connection(&self, connection: ConnectionId, event: &str, params: Value) -> bool {
        let sink = self.lock().connections.get(&connection).map(Arc::clone);
        let Some(sink) = sink else {
            debug!(
                target: DISPATCH_TARGET,
                %connection,
                event,
                "connection gone; notification dropped"
            );
            return false;
        };
        deliver(
            connection,
            sink.as_ref(),
            &DaemonMessage::notification(event, params),
        )
    }

    /// Number of attached connections.
    pub fn connections(&self) -> usize {
        self.lock().connections.len()
    }
}

fn deliver(connection: ConnectionId, sink: &dyn NotificationSink, message: &DaemonMessage) -> bool {
    match sink.deliver(message) {
        Ok(()) => true,
        Err(error) => {
            warn!(
                target: DISPATCH_TARGET,
                %connection,
                %error,
                "notification delivery failed"
            );
            false
        }
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.lock();
        formatter
            .debug_struct("Notifier")
            .field("connections", &registry.connections.len())
            .field("subscriptions", &registry.subscriptions.len())
            .finish()
    }
}

/// Sink that records delivered messages, for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

#[cfg(test)]
impl RecordingSink {
    pub(crate) fn messages(&self) -> Vec<String> {
        self.messages.lock().expect("recording lock").clone()
    }
}

#[cfg(test)]
impl NotificationSink for RecordingSink {
    fn deliver(&self, message: &DaemonMessage) -> Result<(), DispatchError> {
        let line = serde_json::to_string(message)?;
        self.messages.lock().expect("recording lock").push(line);
        Ok(())
    }
}
