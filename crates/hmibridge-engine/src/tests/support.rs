//! Operations and fixtures shared by the engine test suites.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};

use crate::params;
use crate::{
    CommandConstructor, CommandError, CommandHandle, CommandOutcome, CorrelationId, Engine,
    EngineError, Envelope, ManualClock, MessageType, Operation, OperationContext, Origin, Payload,
    RecordingTransport, Replies, Reply, ResultCode, SessionId, Step, TimeoutPolicy,
    ValidationError,
};

pub(super) const FORWARD: &str = "Test.Forward";
pub(super) const FAN_OUT: &str = "Test.FanOut";
pub(super) const WATCH: &str = "Test.Watch";
pub(super) const IDLE: &str = "Test.Idle";
pub(super) const ANSWER: &str = "Test.Answer";
pub(super) const SLOW: &str = "HMI.Slow";
pub(super) const SLOW_DEADLINE: Duration = Duration::from_millis(500);

pub(super) fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

pub(super) fn id(raw: u32) -> CorrelationId {
    CorrelationId::new(raw).expect("non-zero id")
}

fn send_or_fail(ctx: &mut OperationContext<'_>, verb: &str, body: Payload) -> Option<Step> {
    match ctx.send(verb, body) {
        Ok(_) => None,
        Err(error) => Some(Step::fail(CommandError::failed(
            ResultCode::GenericError,
            error.to_string(),
        ))),
    }
}

/// Forwards its payload to the verb named by `target`.
struct Forward;

impl Operation for Forward {
    fn validate(&self, request: &Envelope) -> Result<(), ValidationError> {
        params::required_str(request.payload(), "target").map(|_| ())
    }

    fn start(&mut self, request: &Envelope, ctx: &mut OperationContext<'_>) -> Step {
        let Ok(target) = params::required_str(request.payload(), "target") else {
            return Step::fail(ValidationError::missing("target").into());
        };
        send_or_fail(ctx, target, request.payload().clone()).unwrap_or(Step::Wait)
    }

    fn on_reply(&mut self, reply: Reply, _ctx: &mut OperationContext<'_>) -> Step {
        Step::Complete(reply.into_payload())
    }
}

/// Sends one request per entry of `targets` and merges the replies.
#[derive(Default)]
struct FanOut {
    replies: Replies,
}

impl Operation for FanOut {
    fn validate(&self, request: &Envelope) -> Result<(), ValidationError> {
        request
            .param("targets")
            .and_then(Value::as_array)
            .filter(|targets| targets.iter().all(Value::is_string))
            .map(|_| ())
            .ok_or_else(|| ValidationError::invalid("targets", "an array of strings"))
    }

    fn start(&mut self, request: &Envelope, ctx: &mut OperationContext<'_>) -> Step {
        let targets: Vec<String> = request
            .param("targets")
            .and_then(Value::as_array)
            .map(|targets| {
                targets
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        for target in targets {
            match ctx.send(target.as_str(), Payload::new()) {
                Ok(sent) => self.replies.expect(sent),
                Err(error) => {
                    return Step::fail(CommandError::failed(
                        ResultCode::GenericError,
                        error.to_string(),
                    ));
                }
            }
        }
        Step::Wait
    }

    fn on_reply(&mut self, reply: Reply, _ctx: &mut OperationContext<'_>) -> Step {
        if let Err(error) = self.replies.record(reply) {
            return Step::fail(error);
        }
        if self.replies.is_complete() {
            Step::done(std::mem::take(&mut self.replies).into_payload())
        } else {
            Step::Wait
        }
    }
}

/// Completes with the first notification named by `notification`.
struct Watch;

impl Operation for Watch {
    fn validate(&self, request: &Envelope) -> Result<(), ValidationError> {
        params::required_str(request.payload(), "notification").map(|_| ())
    }

    fn start(&mut self, request: &Envelope, ctx: &mut OperationContext<'_>) -> Step {
        if let Ok(verb) = params::required_str(request.payload(), "notification") {
            ctx.subscribe(verb);
        }
        Step::Wait
    }

    fn on_reply(&mut self, _reply: Reply, _ctx: &mut OperationContext<'_>) -> Step {
        Step::Wait
    }

    fn on_notification(
        &mut self,
        notification: &Envelope,
        _ctx: &mut OperationContext<'_>,
    ) -> Step {
        Step::done(notification.payload().clone())
    }
}

/// Waits without sending anything.
struct Idle;

impl Operation for Idle {
    fn validate(&self, _request: &Envelope) -> Result<(), ValidationError> {
        Ok(())
    }

    fn start(&mut self, _request: &Envelope, _ctx: &mut OperationContext<'_>) -> Step {
        Step::Wait
    }

    fn on_reply(&mut self, _reply: Reply, _ctx: &mut OperationContext<'_>) -> Step {
        Step::Wait
    }
}

/// Answers head-unit requests immediately.
struct Answer;

impl Operation for Answer {
    fn validate(&self, _request: &Envelope) -> Result<(), ValidationError> {
        Ok(())
    }

    fn start(&mut self, _request: &Envelope, _ctx: &mut OperationContext<'_>) -> Step {
        Step::done(payload(json!({"answered": true})))
    }

    fn on_reply(&mut self, _reply: Reply, _ctx: &mut OperationContext<'_>) -> Step {
        Step::Wait
    }
}

/// Engine wired to a recording transport and a manual clock.
pub(super) struct Harness {
    pub(super) engine: Engine,
    pub(super) transport: Arc<RecordingTransport>,
    pub(super) clock: Arc<ManualClock>,
    outcomes: Arc<Mutex<Vec<CommandOutcome>>>,
}

impl Harness {
    pub(super) fn new() -> Self {
        Self::starting_at(1)
    }

    pub(super) fn starting_at(first_id: u32) -> Self {
        let transport = Arc::new(RecordingTransport::new());
        let clock = Arc::new(ManualClock::new());
        let timeouts = TimeoutPolicy::new(Duration::from_secs(10)).with_verb_timeout(
            Origin::FromApplication,
            SLOW,
            SLOW_DEADLINE,
        );
        let app = |verb: &'static str, constructor| (Origin::FromApplication, verb, constructor);
        let registrations = [
            app(FORWARD, CommandConstructor::outbound(|_| Forward)),
            app(FAN_OUT, CommandConstructor::outbound(|_| FanOut::default())),
            app(WATCH, CommandConstructor::outbound(|_| Watch)),
            app(IDLE, CommandConstructor::outbound(|_| Idle)),
            (Origin::FromHmi, ANSWER, CommandConstructor::inbound(|_| Answer)),
        ];
        let engine = registrations
            .into_iter()
            .fold(
                Engine::builder(transport.clone())
                    .timeouts(timeouts)
                    .clock(clock.clone())
                    .first_correlation_id(id(first_id)),
                |builder, (origin, verb, constructor)| {
                    builder.command(origin, verb, MessageType::Request, constructor)
                },
            )
            .build();
        Self {
            engine,
            transport,
            clock,
            outcomes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(super) fn app_request(verb: &str, params: Value) -> Envelope {
        Envelope::request(Origin::FromApplication, verb, id(1), payload(params))
    }

    pub(super) fn hmi_request(verb: &str, correlation_id: u32) -> Envelope {
        Envelope::request(Origin::FromHmi, verb, id(correlation_id), Payload::new())
    }

    pub(super) fn submit(
        &self,
        session: u32,
        verb: &str,
        params: Value,
    ) -> Result<CommandHandle, EngineError> {
        let outcomes = Arc::clone(&self.outcomes);
        self.engine.submit(
            SessionId::new(session),
            &Self::app_request(verb, params),
            Some(Box::new(move |outcome| {
                outcomes.lock().expect("outcomes lock").push(outcome);
            })),
        )
    }

    pub(super) fn outcomes(&self) -> Vec<CommandOutcome> {
        self.outcomes.lock().expect("outcomes lock").clone()
    }

    pub(super) fn single_outcome(&self) -> CommandOutcome {
        let outcomes = self.outcomes();
        assert_eq!(outcomes.len(), 1, "expected one outcome, got {outcomes:?}");
        outcomes.into_iter().next().expect("one outcome")
    }

    /// Outbound request previously sent with `correlation_id`.
    pub(super) fn sent_request(&self, correlation_id: u32) -> Envelope {
        self.transport
            .sent()
            .into_iter()
            .find(|envelope| {
                envelope.message_type() == MessageType::Request
                    && envelope.correlation_id() == Some(id(correlation_id))
            })
            .unwrap_or_else(|| panic!("no request sent with id {correlation_id}"))
    }

    pub(super) fn response(&self, correlation_id: u32, params: Value) -> Envelope {
        self.sent_request(correlation_id)
            .response_to(payload(params))
    }

    pub(super) fn reply(&self, correlation_id: u32, params: Value) -> bool {
        self.engine
            .resolve(id(correlation_id), self.response(correlation_id, params))
    }
}
