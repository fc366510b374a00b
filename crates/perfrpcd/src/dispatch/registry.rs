//! Named operation registry.
//!
//! Operations are registered under a name with one of four shapes: no input
//! and no output, input only, output only, or input and output. Parameters
//! arrive as raw JSON and are decoded into the handler's input type before it
//! runs; a decode failure is reported as malformed parameters without calling
//! the handler.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::connection::ConnectionId;

use super::errors::DispatchError;
use super::DISPATCH_TARGET;

/// Per-invocation context handed to handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    /// Connection the request arrived on.
    pub connection: ConnectionId,
}

impl CallContext {
    /// Creates a context for `connection`.
    pub const fn new(connection: ConnectionId) -> Self {
        Self { connection }
    }
}

type Handler = Box<dyn Fn(&CallContext, Option<Value>) -> Result<Value, DispatchError> + Send + Sync>;

/// Maps operation names to handlers.
#[derive(Default)]
pub struct MethodRegistry {
    handlers: BTreeMap<String, Handler>,
}

impl MethodRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, name: &str, handler: Handler) {
        if self.handlers.insert(name.to_owned(), handler).is_some() {
            debug!(target: DISPATCH_TARGET, operation = name, "operation replaced");
        }
    }

    /// Registers an operation taking no parameters and returning nothing.
    pub fn register_action<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&CallContext) -> Result<(), DispatchError> + Send + Sync + 'static,
    {
        self.insert(
            name,
            Box::new(move |context, _params| handler(context).map(|()| Value::Null)),
        );
    }

    /// Registers an operation taking parameters and returning nothing.
    pub fn register_input<P, F>(&mut self, name: &str, handler: F)
    where
        P: DeserializeOwned,
        F: Fn(&CallContext, P) -> Result<(), DispatchError> + Send + Sync + 'static,
    {
        let operation = name.to_owned();
        self.insert(
            name,
            Box::new(move |context, params| {
                let input = decode_params::<P>(&operation, params)?;
                handler(context, input).map(|()| Value::Null)
            }),
        );
    }

    /// Registers an operation taking no parameters and returning a result.
    pub fn register_output<R, F>(&mut self, name: &str, handler: F)
    where
        R: Serialize,
        F: Fn(&CallContext) -> Result<R, DispatchError> + Send + Sync + 'static,
    {
        self.insert(
            name,
            Box::new(move |context, _params| {
                let output = handler(context)?;
                Ok(serde_json::to_value(output)?)
            }),
        );
    }

    /// Registers an operation taking parameters and returning a result.
    pub fn register<P, R, F>(&mut self, name: &str, handler: F)
    where
        P: DeserializeOwned,
        R: Serialize,
        F: Fn(&CallContext, P) -> Result<R, DispatchError> + Send + Sync + 'static,
    {
        let operation = name.to_owned();
        self.insert(
            name,
            Box::new(move |context, params| {
                let input = decode_params::<P>(&operation, params)?;
                let output = handler(context, input)?;
                Ok(serde_json::to_value(output)?)
            }),
        );
    }

    /// Removes an operation. Returns false if it was not registered.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.handlers.remove(name).is_some()
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Invokes `name` with raw parameters.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::UnknownOperation` without side effects when the
    /// name is not registered, or whatever the handler reports.
    pub fn invoke(
        &self,
        name: &str,
        context: &CallContext,
        params: Option<Value>,
    ) -> Result<Value, DispatchError> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| DispatchError::unknown_operation(name))?;
        handler(context, params)
    }
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("MethodRegistry")
            .field("operations", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Decodes raw parameters, treating absent or `null` parameters as an empty
/// object for types that only accept objects.
pub(super) fn decode_params<P: DeserializeOwned>(
    operation: &str,
    params: Option<Value>,
) -> Result<P, DispatchError> {
    let value = params.unwrap_or(Value::Null);
    if value.is_null() {
        return serde_json::from_value(Value::Null)
            .or_else(|_| serde_json::from_value(Value::Object(Map::new())))
            .map_err(|error| DispatchError::malformed_parameters(operation, error));
    }
    serde_json::from_value(value).map_err(|error| DispatchError::malformed_parameters(operation, error))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rstest::{fixture, rstest};
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Pair {
        left: i64,
        right: i64,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    struct Optional {
        value: Option<u8>,
    }

    struct Setup {
        registry: MethodRegistry,
        calls: Arc<AtomicUsize>,
    }

    #[fixture]
    fn setup() -> Setup {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = MethodRegistry::new();
        let counter = Arc::clone(&calls);
        registry.register_action("ping", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        registry.register("add", |_, pair: Pair| Ok(pair.left + pair.right));
        registry.register_output("who", |context| Ok(context.connection.get()));
        registry.register_input("optional", |_, input: Optional| {
            assert!(input.value.is_none());
            Ok(())
        });
        Setup { registry, calls }
    }

    fn context() -> CallContext {
        CallContext::new(ConnectionId::new(42))
    }

    #[rstest]
    fn action_returns_null(setup: Setup) {
        let result = setup.registry.invoke("ping", &context(), None).expect("ping");
        assert_eq!(result, Value::Null);
        assert_eq!(setup.calls.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    fn typed_input_and_output(setup: Setup) {
        let result = setup
            .registry
            .invoke("add", &context(), Some(json!({"left": 2, "right": 3})))
            .expect("add");
        assert_eq!(result, json!(5));
    }

    #[rstest]
    fn output_sees_the_calling_connection(setup: Setup) {
        let result = setup.registry.invoke("who", &context(), None).expect("who");
        assert_eq!(result, json!(42));
    }

    #[rstest]
    #[case::missing_field(Some(json!({"left": 2})))]
    #[case::wrong_type(Some(json!("two")))]
    #[case::absent(None)]
    fn undecodable_params_are_malformed(setup: Setup, #[case] params: Option<Value>) {
        let error = setup
            .registry
            .invoke("add", &context(), params)
            .expect_err("malformed");
        assert!(matches!(error, DispatchError::MalformedParameters { .. }));
    }

    #[rstest]
    fn absent_params_decode_as_empty_object(setup: Setup) {
        setup
            .registry
            .invoke("optional", &context(), None)
            .expect("defaults apply");
    }

    #[rstest]
    fn unknown_operation_has_no_side_effect(setup: Setup) {
        let error = setup
            .registry
            .invoke("pong", &context(), None)
            .expect_err("unknown");
        assert!(matches!(error, DispatchError::UnknownOperation { .. }));
        assert_eq!(setup.calls.load(Ordering::SeqCst), 0);
    }

    #[rstest]
    fn unregister_removes_the_name(mut setup: Setup) {
        assert!(setup.registry.unregister("ping"));
        assert!(!setup.registry.contains("ping"));
        assert!(!setup.registry.unregister("ping"));
        assert_eq!(setup.registry.names().collect::<Vec<_>>(), ["add", "optional", "who"]);
    }
}
