//! Invocation entry point combining built-in and registered operations.
//!
//! The built-ins manage the calling connection's subscriptions and answer
//! name lookups. Everything else is routed to the [`MethodRegistry`].

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::errors::DispatchError;
use super::notify::Notifier;
use super::params::SubscriptionParams;
use super::registry::{CallContext, MethodRegistry, decode_params};
use super::DISPATCH_TARGET;

/// Operation names handled by the dispatcher itself.
pub const BUILTIN_OPERATIONS: &[&str] = &["exists", "register", "unregister"];

/// Routes invocations to built-ins or registered handlers.
#[derive(Debug)]
pub struct MethodDispatcher {
    registry: MethodRegistry,
    notifier: Arc<Notifier>,
}

impl MethodDispatcher {
    /// Creates a dispatcher over a populated registry.
    pub fn new(registry: MethodRegistry, notifier: Arc<Notifier>) -> Self {
        Self { registry, notifier }
    }

    /// Whether `name` can be invoked.
    pub fn exists(&self, name: &str) -> bool {
        BUILTIN_OPERATIONS.contains(&name) || self.registry.contains(name)
    }

    /// Notifier shared with the registered operations.
    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    /// Invokes `name` on behalf of `context`.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::UnknownOperation` when nothing is registered
    /// under `name`, `DispatchError::MalformedParameters` when the parameters
    /// do not decode, or the handler's own error.
    pub fn invoke(
        &self,
        name: &str,
        context: &CallContext,
        params: Option<Value>,
    ) -> Result<Value, DispatchError> {
        debug!(
            target: DISPATCH_TARGET,
            operation = name,
            connection = %context.connection,
            "invoking operation"
        );
        match name {
            "exists" => {
                let operation: String = decode_params(name, params)?;
                Ok(Value::Bool(self.exists(&operation)))
            }
            "register" => {
                let subscription: SubscriptionParams = decode_params(name, params)?;
                self.notifier.subscribe(
                    &subscription.event,
                    context.connection,
                    &subscription.id,
                );
                Ok(Value::Null)
            }
            "unregister" => {
                let subscription: SubscriptionParams = decode_params(name, params)?;
                self.notifier.unsubscribe(
                    &subscription.event,
                    context.connection,
                    &subscription.id,
                );
                Ok(Value::Null)
            }
            _ => self.registry.invoke(name, context, params),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use serde_json::json;

    use super::*;
    use crate::connection::ConnectionId;
    use crate::dispatch::notify::{NotificationSink, RecordingSink};

    const CALLER: ConnectionId = ConnectionId::new(3);

    struct Setup {
        dispatcher: MethodDispatcher,
        sink: Arc<RecordingSink>,
    }

    #[fixture]
    fn setup() -> Setup {
        let notifier = Arc::new(Notifier::new());
        let sink = Arc::new(RecordingSink::default());
        notifier.attach(CALLER, Arc::clone(&sink) as Arc<dyn NotificationSink>);
        let mut registry = MethodRegistry::new();
        registry.register_action("clueless", |_| Ok(()));
        Setup {
            dispatcher: MethodDispatcher::new(registry, notifier),
            sink,
        }
    }

    fn context() -> CallContext {
        CallContext::new(CALLER)
    }

    #[rstest]
    #[case::registered("clueless", true)]
    #[case::builtin("register", true)]
    #[case::missing("nothing", false)]
    fn exists_reports_known_names(setup: Setup, #[case] name: &str, #[case] expected: bool) {
        let result = setup
            .dispatcher
            .invoke("exists", &context(), Some(json!(name)))
            .expect("exists");
        assert_eq!(result, Value::Bool(expected));
    }

    #[rstest]
    fn register_subscribes_the_caller(setup: Setup) {
        setup
            .dispatcher
            .invoke(
                "register",
                &context(),
                Some(json!({"event": "message", "id": "me"})),
            )
            .expect("register");
        let delivered = setup
            .dispatcher
            .notifier()
            .notify("message", &json!("hello"), Some("me"));
        assert_eq!(delivered, 1);
        assert_eq!(setup.sink.messages().len(), 1);

        setup
            .dispatcher
            .invoke(
                "unregister",
                &context(),
                Some(json!({"event": "message", "id": "me"})),
            )
            .expect("unregister");
        assert_eq!(
            setup
                .dispatcher
                .notifier()
                .notify("message", &json!("again"), Some("me")),
            0
        );
    }

    #[rstest]
    fn register_requires_event_and_id(setup: Setup) {
        let error = setup
            .dispatcher
            .invoke("register", &context(), Some(json!({"event": "time"})))
            .expect_err("missing id");
        assert!(matches!(error, DispatchError::MalformedParameters { .. }));
    }

    #[rstest]
    fn unknown_names_fall_through_to_the_registry(setup: Setup) {
        let error = setup
            .dispatcher
            .invoke("frobnicate", &context(), None)
            .expect_err("unknown");
        assert!(matches!(error, DispatchError::UnknownOperation { .. }));
        assert!(setup.sink.messages().is_empty());
    }
}
