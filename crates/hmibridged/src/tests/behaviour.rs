//! Behavioural tests running the bridge over an in-memory link.

use std::cell::RefCell;
use std::sync::{Arc, Mutex, PoisonError};

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::json;

use hmibridge_engine::{CorrelationId, Envelope, MessageType, Origin};
use hmibridge_rpc_plugins::SET_INTERIOR_VEHICLE_DATA;

use super::support::{
    SharedBuffer, frame_line, object, permissive_discovery, permissive_reporter, plan,
};
use crate::health::MockHealthReporter;
use crate::link::{OutboundFrame, Peer};
use crate::process::run_bridge_with;

#[derive(Default)]
struct BridgeWorld {
    lines: Vec<String>,
    output: SharedBuffer,
    cancelled: Arc<Mutex<Option<usize>>>,
}

impl BridgeWorld {
    fn frame_for(&self, peer: Peer, raw: u32) -> OutboundFrame {
        self.output
            .frames()
            .into_iter()
            .find(|frame| {
                frame.peer == peer && frame.envelope.correlation_id() == Some(id(raw))
            })
            .expect("frame written")
    }

    fn reporter(&self) -> MockHealthReporter {
        let slot = Arc::clone(&self.cancelled);
        let mut reporter = MockHealthReporter::new();
        reporter.expect_bootstrap_starting().return_const(());
        reporter.expect_bootstrap_succeeded().return_const(());
        reporter.expect_bootstrap_failed().return_const(());
        reporter.expect_bridge_ready().return_const(());
        reporter
            .expect_shutdown_completed()
            .returning(move |cancelled| {
                *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(cancelled);
            });
        reporter
    }
}

fn id(raw: u32) -> CorrelationId {
    CorrelationId::new(raw).expect("non-zero id")
}

fn module_data(module: &str) -> serde_json::Value {
    json!({"moduleData": {"moduleType": module}})
}

#[fixture]
fn world() -> RefCell<BridgeWorld> {
    RefCell::new(BridgeWorld::default())
}

#[given("the head unit sends {verb} with correlation id {raw}")]
fn given_head_unit_request(world: &RefCell<BridgeWorld>, verb: String, raw: u32) {
    let request = Envelope::request(Origin::FromHmi, verb, id(raw), object(json!({})));
    world.borrow_mut().lines.push(frame_line(0, &request));
}

#[given("application session {session} sets {module} module data with correlation id {raw}")]
fn given_application_request(world: &RefCell<BridgeWorld>, session: u32, module: String, raw: u32) {
    let request = Envelope::request(
        Origin::FromApplication,
        SET_INTERIOR_VEHICLE_DATA,
        id(raw),
        object(module_data(&module)),
    );
    world.borrow_mut().lines.push(frame_line(session, &request));
}

#[given("the head unit answers correlation id {raw} with {module} module data")]
fn given_head_unit_answer(world: &RefCell<BridgeWorld>, raw: u32, module: String) {
    let forwarded = Envelope::request(
        Origin::FromApplication,
        SET_INTERIOR_VEHICLE_DATA,
        id(raw),
        object(json!({})),
    );
    let answer = forwarded.response_to(object(module_data(&module)));
    world.borrow_mut().lines.push(frame_line(0, &answer));
}

#[given("a malformed line")]
fn given_malformed_line(world: &RefCell<BridgeWorld>) {
    world.borrow_mut().lines.push("{\"session\": ".to_owned());
}

#[when("the bridge runs until its input closes")]
fn when_bridge_runs(world: &RefCell<BridgeWorld>) {
    let world = world.borrow();
    let launch = plan(
        world.reporter(),
        permissive_discovery(),
        &world.lines,
        &world.output,
    );
    run_bridge_with(launch).expect("bridge runs");
}

#[then("the head unit receives a {code} error for correlation id {raw}")]
fn then_head_unit_error(world: &RefCell<BridgeWorld>, code: String, raw: u32) {
    let frame = world.borrow().frame_for(Peer::Hmi, raw);
    let (received, _) = frame.envelope.error_details().expect("error reply");
    assert_eq!(received.as_str(), code);
}

#[then("the head unit receives request {raw}")]
fn then_head_unit_request(world: &RefCell<BridgeWorld>, raw: u32) {
    let frame = world.borrow().frame_for(Peer::Hmi, raw);
    assert_eq!(frame.envelope.message_type(), MessageType::Request);
}

#[then("the application receives {module} module data for correlation id {raw}")]
fn then_application_response(world: &RefCell<BridgeWorld>, module: String, raw: u32) {
    let frame = world.borrow().frame_for(Peer::Application, raw);
    assert_eq!(frame.envelope.message_type(), MessageType::Response);
    assert_eq!(
        frame.envelope.param("moduleData"),
        Some(&json!({"moduleType": module}))
    );
}

#[then("the application hears nothing for correlation id {raw}")]
fn then_application_silent(world: &RefCell<BridgeWorld>, raw: u32) {
    let world = world.borrow();
    assert!(!world.output.frames().iter().any(|frame| {
        frame.peer == Peer::Application && frame.envelope.correlation_id() == Some(id(raw))
    }));
}

#[then("{count} requests were cancelled at shutdown")]
fn then_cancelled(world: &RefCell<BridgeWorld>, count: usize) {
    let world = world.borrow();
    let cancelled = *world
        .cancelled
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    assert_eq!(cancelled, Some(count));
}

#[scenario(path = "tests/features/bridge.feature")]
fn bridge(world: RefCell<BridgeWorld>) {
    let _ = world;
}

#[test]
fn permissive_doubles_accept_a_full_run() {
    let output = SharedBuffer::default();
    run_bridge_with(plan(permissive_reporter(), permissive_discovery(), &[], &output))
        .expect("bridge runs");
    assert!(output.frames().is_empty());
}
