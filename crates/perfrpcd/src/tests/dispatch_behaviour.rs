//! Behavioural tests for the JSONL dispatch loop of a served daemon.

use std::cell::RefCell;
use std::sync::Arc;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::{Value, json};

use crate::bootstrap::{Daemon, bootstrap_with};
use crate::scheduler::ManualClock;

use super::support::{JsonlClient, RecordingHealthReporter, TestConfigLoader, loopback_config};

struct DispatchWorld {
    daemon: Option<Daemon>,
    client: Option<JsonlClient>,
    replies: Vec<Value>,
}

impl DispatchWorld {
    fn new() -> Self {
        Self {
            daemon: None,
            client: None,
            replies: Vec::new(),
        }
    }

    fn start(&mut self) {
        let mut daemon = bootstrap_with(
            &TestConfigLoader::new(loopback_config()),
            Arc::new(RecordingHealthReporter::default()),
            Arc::new(ManualClock::default()),
        )
        .expect("bootstrap");
        let addr = daemon.serve().expect("serve").expect("address");
        self.client = Some(JsonlClient::connect(addr));
        self.daemon = Some(daemon);
    }

    fn call(&mut self, request: &str) {
        let client = self.client.as_mut().expect("connection established");
        let reply = client.call(request);
        self.replies.push(reply);
    }

    fn last(&self) -> &Value {
        self.replies.last().expect("a reply was received")
    }
}

impl Drop for DispatchWorld {
    fn drop(&mut self) {
        self.client = None;
        if let Some(daemon) = self.daemon.take() {
            let _ = daemon.shutdown();
        }
    }
}

#[fixture]
fn world() -> RefCell<DispatchWorld> {
    RefCell::new(DispatchWorld::new())
}

#[given("a daemon connection is established")]
fn given_connection(world: &RefCell<DispatchWorld>) {
    world.borrow_mut().start();
}

#[when("the client sends {request}")]
fn when_client_sends(world: &RefCell<DispatchWorld>, request: String) {
    let request = strip_quotes(&request).replace('\'', "\"");
    world.borrow_mut().call(&request);
}

#[when("a malformed JSONL request is sent")]
fn when_malformed(world: &RefCell<DispatchWorld>) {
    world.borrow_mut().call("not valid json");
}

#[then("the reply is a result")]
fn then_result(world: &RefCell<DispatchWorld>) {
    let world = world.borrow();
    assert_eq!(world.last()["kind"], json!("result"), "reply: {}", world.last());
}

#[then("the reply has status {status}")]
fn then_status(world: &RefCell<DispatchWorld>, status: String) {
    let world = world.borrow();
    let reply = world.last();
    assert_eq!(reply["kind"], json!("error"), "reply: {reply}");
    assert_eq!(reply["status"], json!(strip_quotes(&status)), "reply: {reply}");
}

#[then("the result field {field} equals {value}")]
fn then_result_field(world: &RefCell<DispatchWorld>, field: String, value: i64) {
    let world = world.borrow();
    let reply = world.last();
    assert_eq!(reply["result"][strip_quotes(&field)], json!(value), "reply: {reply}");
}

#[then("the result is {value}")]
fn then_result_is(world: &RefCell<DispatchWorld>, value: String) {
    let world = world.borrow();
    let expected: Value =
        serde_json::from_str(&strip_quotes(&value).replace('\'', "\"")).expect("expected json");
    assert_eq!(world.last()["result"], expected);
}

#[scenario(path = "tests/features/dispatch.feature")]
fn dispatch(world: RefCell<DispatchWorld>) {
    let _ = world;
}

fn strip_quotes(value: &str) -> String {
    value.trim_matches('"').to_owned()
}
