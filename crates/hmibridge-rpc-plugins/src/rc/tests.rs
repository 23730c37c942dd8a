//! Remote control commands driven through the dispatcher.

use std::sync::Arc;

use rstest::{fixture, rstest};
use serde_json::{Value, json};

use hmibridge_engine::{
    CorrelationId, Dispatched, Engine, Envelope, ErrorKind, EventDispatcher, MessageType, Origin,
    Payload, RecordingTransport, ResultCode, SessionId,
};

use super::{GET_INTERIOR_VEHICLE_DATA, RemoteControlPlugin, SET_INTERIOR_VEHICLE_DATA};

const APP_SESSION: SessionId = SessionId::new(3);

fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

fn id(raw: u32) -> CorrelationId {
    CorrelationId::new(raw).expect("non-zero id")
}

struct Bridge {
    dispatcher: EventDispatcher,
    engine: Engine,
    hmi: Arc<RecordingTransport>,
    app: Arc<RecordingTransport>,
}

impl Bridge {
    fn app_request(&self, verb: &str, raw_id: u32, body: Value) -> Dispatched {
        let request = Envelope::request(Origin::FromApplication, verb, id(raw_id), payload(body));
        self.dispatcher.dispatch(APP_SESSION, request)
    }

    fn hmi_answer(&self, verb: &str, body: Value) -> Dispatched {
        let forwarded = self
            .hmi
            .last_request(verb)
            .expect("request forwarded to HMI");
        self.dispatcher
            .dispatch(SessionId::HMI, forwarded.response_to(payload(body)))
    }

    fn app_reply(&self) -> Envelope {
        self.app.sent().pop().expect("application answered")
    }
}

#[fixture]
fn bridge() -> Bridge {
    let hmi = Arc::new(RecordingTransport::new());
    let app = Arc::new(RecordingTransport::new());
    let engine = Engine::builder(hmi.clone())
        .plugin(Arc::new(RemoteControlPlugin))
        .expect("plugin registers")
        .build();
    let dispatcher = EventDispatcher::new(engine.clone()).with_application_link(app.clone());
    Bridge {
        dispatcher,
        engine,
        hmi,
        app,
    }
}

#[rstest]
fn set_relays_module_data_from_hmi(bridge: Bridge) {
    let module = json!({"moduleType": "CLIMATE", "climateControlData": {"fanSpeed": 40}});
    let dispatched =
        bridge.app_request(SET_INTERIOR_VEHICLE_DATA, 5, json!({"moduleData": module}));
    assert_eq!(dispatched, Dispatched::Executed);

    let forwarded = bridge
        .hmi
        .last_request(SET_INTERIOR_VEHICLE_DATA)
        .expect("request forwarded to HMI");
    assert_eq!(forwarded.param("moduleData"), Some(&module));
    assert_eq!(bridge.engine.pending_requests(), 1);

    let resolved = bridge.hmi_answer(SET_INTERIOR_VEHICLE_DATA, json!({"moduleData": module}));
    assert!(matches!(resolved, Dispatched::Resolved(_)));

    let reply = bridge.app_reply();
    assert_eq!(reply.message_type(), MessageType::Response);
    assert_eq!(reply.correlation_id(), Some(id(5)));
    assert_eq!(reply.param("moduleData"), Some(&module));
    assert_eq!(bridge.engine.live_commands(), 0);
}

#[rstest]
#[case(json!({}))]
#[case(json!({"moduleData": "CLIMATE"}))]
#[case(json!({"moduleData": {"climateControlData": {}}}))]
fn set_rejects_malformed_module_data(bridge: Bridge, #[case] body: Value) {
    let dispatched = bridge.app_request(SET_INTERIOR_VEHICLE_DATA, 6, body);

    assert_eq!(dispatched, Dispatched::Rejected(ErrorKind::Validation));
    assert!(bridge.hmi.sent().is_empty(), "nothing reaches the HMI");
    let reply = bridge.app_reply();
    assert_eq!(
        reply.error_details().map(|(code, _)| code),
        Some(ResultCode::InvalidData)
    );
}

#[rstest]
fn set_fails_when_hmi_omits_module_data(bridge: Bridge) {
    bridge.app_request(
        SET_INTERIOR_VEHICLE_DATA,
        7,
        json!({"moduleData": {"moduleType": "RADIO"}}),
    );
    bridge.hmi_answer(SET_INTERIOR_VEHICLE_DATA, json!({}));

    let reply = bridge.app_reply();
    assert_eq!(
        reply.error_details().map(|(code, _)| code),
        Some(ResultCode::GenericError)
    );
}

#[rstest]
fn set_reports_hmi_rejection(bridge: Bridge) {
    bridge.app_request(
        SET_INTERIOR_VEHICLE_DATA,
        8,
        json!({"moduleData": {"moduleType": "SEAT"}}),
    );
    let forwarded = bridge
        .hmi
        .last_request(SET_INTERIOR_VEHICLE_DATA)
        .expect("request forwarded to HMI");
    bridge.dispatcher.dispatch(
        SessionId::HMI,
        forwarded.error_to(ResultCode::Rejected, "seat is occupied"),
    );

    let (code, info) = bridge.app_reply().error_details().expect("error reply");
    assert_eq!(code, ResultCode::Rejected);
    assert!(info.contains("seat is occupied"));
}

#[rstest]
fn refused_send_answers_application_with_generic_error(bridge: Bridge) {
    bridge.hmi.refuse_sends(true);
    bridge.app_request(
        SET_INTERIOR_VEHICLE_DATA,
        9,
        json!({"moduleData": {"moduleType": "AUDIO"}}),
    );

    assert_eq!(bridge.engine.pending_requests(), 0);
    let reply = bridge.app_reply();
    assert_eq!(reply.correlation_id(), Some(id(9)));
    assert_eq!(
        reply.error_details().map(|(code, _)| code),
        Some(ResultCode::GenericError)
    );
}

#[rstest]
#[case(json!({"moduleType": "CLIMATE"}), json!({"moduleData": {"moduleType": "CLIMATE"}}), None)]
#[case(
    json!({"moduleType": "CLIMATE", "subscribe": true}),
    json!({"moduleData": {"moduleType": "CLIMATE"}, "isSubscribed": true}),
    Some(true)
)]
#[case(
    json!({"moduleType": "RADIO", "subscribe": true}),
    json!({"moduleData": {"moduleType": "RADIO"}}),
    Some(false)
)]
#[case(
    json!({"moduleType": "RADIO", "subscribe": false}),
    json!({"moduleData": {"moduleType": "RADIO"}, "isSubscribed": false}),
    Some(false)
)]
fn get_reports_subscription_only_when_asked(
    bridge: Bridge,
    #[case] request: Value,
    #[case] hmi_reply: Value,
    #[case] expected: Option<bool>,
) {
    bridge.app_request(GET_INTERIOR_VEHICLE_DATA, 12, request);
    bridge.hmi_answer(GET_INTERIOR_VEHICLE_DATA, hmi_reply);

    let reply = bridge.app_reply();
    assert_eq!(reply.message_type(), MessageType::Response);
    assert!(reply.param("moduleData").is_some());
    assert_eq!(
        reply.param("isSubscribed").and_then(Value::as_bool),
        expected
    );
}

#[rstest]
#[case(json!({}))]
#[case(json!({"moduleType": ""}))]
#[case(json!({"moduleType": "CLIMATE", "subscribe": "yes"}))]
fn get_rejects_invalid_parameters(bridge: Bridge, #[case] body: Value) {
    let dispatched = bridge.app_request(GET_INTERIOR_VEHICLE_DATA, 13, body);

    assert_eq!(dispatched, Dispatched::Rejected(ErrorKind::Validation));
    assert!(bridge.hmi.sent().is_empty());
}
