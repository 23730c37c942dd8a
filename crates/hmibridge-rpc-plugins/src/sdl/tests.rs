//! Permission queries answered through a mocked policy layer.

use std::sync::Arc;

use mockall::predicate::eq;
use rstest::rstest;
use serde_json::{Value, json};

use hmibridge_engine::{
    CorrelationId, Dispatched, Engine, Envelope, ErrorKind, EventDispatcher, MessageType, Origin,
    Payload, RecordingTransport, ResultCode, SessionId,
};

use super::{
    GET_LIST_OF_PERMISSIONS, MockPolicyHandler, PermissionItem, PolicyHandler, SdlCorePlugin,
    StaticPolicyHandler,
};

fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

fn id(raw: u32) -> CorrelationId {
    CorrelationId::new(raw).expect("non-zero id")
}

fn bridge(policy: impl PolicyHandler + 'static) -> (EventDispatcher, Arc<RecordingTransport>) {
    let hmi = Arc::new(RecordingTransport::new());
    let engine = Engine::builder(hmi.clone())
        .plugin(Arc::new(SdlCorePlugin::new(Arc::new(policy))))
        .expect("plugin registers")
        .build();
    (EventDispatcher::new(engine), hmi)
}

fn query(dispatcher: &EventDispatcher, raw_id: u32, body: Value) -> Dispatched {
    let request = Envelope::request(
        Origin::FromHmi,
        GET_LIST_OF_PERMISSIONS,
        id(raw_id),
        payload(body),
    );
    dispatcher.dispatch(SessionId::HMI, request)
}

#[rstest]
#[case(json!({"appID": 65537}), 65537)]
#[case(json!({}), 0)]
fn asks_policy_for_the_requested_application(#[case] body: Value, #[case] key: u32) {
    let mut policy = MockPolicyHandler::new();
    policy
        .expect_list_of_permissions()
        .with(eq(key), eq(Some(id(40))))
        .times(1)
        .return_const(vec![PermissionItem::new("Location", 7)]);
    let (dispatcher, hmi) = bridge(policy);

    assert_eq!(query(&dispatcher, 40, body), Dispatched::Executed);

    let reply = hmi.sent().pop().expect("HMI answered");
    assert_eq!(reply.message_type(), MessageType::Response);
    assert_eq!(reply.correlation_id(), Some(id(40)));
    assert_eq!(
        reply.param("allowedFunctions"),
        Some(&json!([{"name": "Location", "id": 7}]))
    );
}

#[rstest]
fn malformed_app_id_never_reaches_policy() {
    let mut policy = MockPolicyHandler::new();
    policy.expect_list_of_permissions().never();
    let (dispatcher, hmi) = bridge(policy);

    let dispatched = query(&dispatcher, 41, json!({"appID": "navigation"}));

    assert_eq!(dispatched, Dispatched::Rejected(ErrorKind::Validation));
    let reply = hmi.sent().pop().expect("HMI answered");
    assert_eq!(reply.correlation_id(), Some(id(41)));
    assert_eq!(
        reply.error_details().map(|(code, _)| code),
        Some(ResultCode::InvalidData)
    );
}

#[rstest]
fn empty_permission_list_is_still_a_response() {
    let mut policy = MockPolicyHandler::new();
    policy
        .expect_list_of_permissions()
        .return_const(Vec::<PermissionItem>::new());
    let (dispatcher, hmi) = bridge(policy);

    query(&dispatcher, 42, json!({"appID": 3}));

    let reply = hmi.sent().pop().expect("HMI answered");
    assert_eq!(reply.message_type(), MessageType::Response);
    assert_eq!(reply.param("allowedFunctions"), Some(&json!([])));
}

#[test]
fn static_handler_merges_every_application_for_key_zero() {
    let policy = StaticPolicyHandler::new()
        .with_permissions(9, vec![PermissionItem::new("Notifications", 2)])
        .with_permissions(4, vec![PermissionItem::new("Location", 1)]);

    let all: Vec<String> = policy
        .list_of_permissions(0, None)
        .into_iter()
        .map(|item| item.name)
        .collect();

    assert_eq!(all, ["Location", "Notifications"]);
    assert_eq!(policy.list_of_permissions(9, None).len(), 1);
    assert!(policy.list_of_permissions(5, None).is_empty());
}
