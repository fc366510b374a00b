//! Service operations exposed on the request/response channel.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc2822;
use tracing::info;

use crate::connection::ConnectionId;
use crate::geometry::{GeometryStore, GeometryUpdate, Rectangle};
use crate::loose::LooseObject;
use crate::scheduler::{JobId, Scheduler};

use super::errors::DispatchError;
use super::notify::Notifier;
use super::params::{
    Availability, ExtendedParams, ExtendedResponse, MessageParams, NotificationParams,
};
use super::registry::MethodRegistry;
use super::timer::{NotificationTimer, TIME_EVENT};
use super::DISPATCH_TARGET;

/// Event name used by `postmessage`.
pub const MESSAGE_EVENT: &str = "message";

/// Offset applied by `extended` when local time is requested.
const LOCAL_OFFSET: Duration = Duration::from_millis(360_000);

/// Location name that reports [`Availability::Inactive`].
const BAD_DAY: &str = "BadDay";

/// Current UTC time in RFC 2822 form.
pub(crate) fn current_time() -> Result<String, DispatchError> {
    OffsetDateTime::now_utc()
        .format(&Rfc2822)
        .map_err(|error| DispatchError::internal(error.to_string()))
}

/// State shared by the service operations.
#[derive(Debug)]
pub struct Service {
    geometry: Arc<GeometryStore>,
    data: Mutex<String>,
    notifier: Arc<Notifier>,
    scheduler: Scheduler,
    timer: NotificationTimer,
}

impl Service {
    /// Creates the service over shared components.
    pub fn new(geometry: Arc<GeometryStore>, notifier: Arc<Notifier>, scheduler: Scheduler) -> Self {
        let timer = NotificationTimer::new(scheduler.clone(), Arc::clone(&notifier));
        Self {
            geometry,
            data: Mutex::new(String::new()),
            notifier,
            scheduler,
            timer,
        }
    }

    /// Registers every service operation.
    pub fn register(self: &Arc<Self>, registry: &mut MethodRegistry) {
        registry.register_output("time", |_| current_time());

        let service = Arc::clone(self);
        registry.register_input("postmessage", move |_, params: MessageParams| {
            service.post_message(&params);
            Ok(())
        });

        registry.register_action("clueless", |_| {
            info!(target: DISPATCH_TARGET, "parameterless operation triggered");
            Ok(())
        });

        registry.register_input("input", |_, text: String| {
            info!(target: DISPATCH_TARGET, text = %text, "received text");
            Ok(())
        });

        registry.register("extended", |_, params: ExtendedParams| {
            Ok(Self::extended(&params))
        });

        self.register_geometry(registry);

        let service = Arc::clone(self);
        registry.register_output("get_data", move |_| Ok(service.data()));
        let service = Arc::clone(self);
        registry.register_input("set_data", move |_, data: String| {
            service.set_data(data);
            Ok(())
        });

        let service = Arc::clone(self);
        registry.register_input("async_callback", move |context, seconds: u8| {
            service.schedule_callback(context.connection, seconds);
            Ok(())
        });

        let service = Arc::clone(self);
        registry.register_input("start_notifications", move |_, params: NotificationParams| {
            service.start_notifications(params.interval);
            Ok(())
        });
    }

    fn register_geometry(&self, registry: &mut MethodRegistry) {
        let store = Arc::clone(&self.geometry);
        registry.register_output("get_geometry", move |_| Ok(store.get()));

        let store = Arc::clone(&self.geometry);
        registry.register_input("set_geometry", move |_, update: GeometryUpdate| {
            store.set(&update);
            Ok(())
        });

        let store = Arc::clone(&self.geometry);
        registry.register_output("get_opaque_geometry", move |_| {
            Ok(Value::Object(store.get().to_object()))
        });

        let store = Arc::clone(&self.geometry);
        registry.register_input("set_opaque_geometry", move |_, object: LooseObject| {
            store.set(&GeometryUpdate::from_loose(&object));
            Ok(())
        });

        let store = Arc::clone(&self.geometry);
        registry.register("swap", move |_, object: LooseObject| {
            let previous: Rectangle = store.swap(&GeometryUpdate::from_loose(&object));
            Ok(Value::Object(previous.to_object()))
        });
    }

    /// Delivers `message` to the connections subscribed under `recipient`.
    pub fn post_message(&self, params: &MessageParams) -> usize {
        let delivered = self.notifier.notify(
            MESSAGE_EVENT,
            &Value::String(params.message.clone()),
            Some(&params.recipient),
        );
        info!(
            target: DISPATCH_TARGET,
            recipient = %params.recipient,
            delivered,
            "message posted"
        );
        delivered
    }

    /// Reports the time and availability for a location.
    pub fn extended(params: &ExtendedParams) -> ExtendedResponse {
        let mut now = OffsetDateTime::now_utc();
        if !params.utc {
            now += LOCAL_OFFSET;
        }
        let micros = now.unix_timestamp_nanos() / 1_000;
        let state = if params.location == BAD_DAY {
            Availability::Inactive
        } else {
            Availability::Idle
        };
        ExtendedResponse {
            time: u64::try_from(micros).unwrap_or_default(),
            state,
        }
    }

    /// Current value of the shared string property.
    pub fn data(&self) -> String {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the shared string property.
    pub fn set_data(&self, data: String) {
        *self.data.lock().unwrap_or_else(PoisonError::into_inner) = data;
    }

    /// Sends the time to `connection` once, `seconds` from now.
    pub fn schedule_callback(&self, connection: ConnectionId, seconds: u8) -> JobId {
        let notifier = Arc::clone(&self.notifier);
        let job = self.scheduler.submit_once(
            Duration::from_secs(u64::from(seconds)),
            connection,
            move |target| {
                if let Ok(now) = current_time() {
                    notifier.notify_connection(target, TIME_EVENT, Value::String(now));
                }
            },
        );
        info!(
            target: DISPATCH_TARGET,
            %connection,
            job = %job,
            seconds,
            "callback scheduled"
        );
        job
    }

    /// Re-arms the periodic time broadcast; zero stops it.
    pub fn start_notifications(&self, interval_secs: u8) -> Option<JobId> {
        self.timer.arm(Duration::from_secs(u64::from(interval_secs)))
    }

    /// Timer backing the periodic broadcast.
    pub fn timer(&self) -> &NotificationTimer {
        &self.timer
    }
}
