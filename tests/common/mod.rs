#![allow(dead_code)]

use async_trait::async_trait;
use jobcontext::application::engine::JobContextManager;
use jobcontext::domain::cancel::CancelSignal;
use jobcontext::domain::envelope::{EnvelopeMapper, WireMessage};
use jobcontext::domain::message::{JobContextMessage, JobId, Topic};
use jobcontext::domain::ports::{
    Auditor, JobStatusTracker, MessageProperties, PayloadMapper, QueuePublisher, StageHandler,
};
use jobcontext::error::{JobContextError, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;

/// Every collaborator call made by the engine, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    AuditStart(JobContextMessage),
    AuditEnd(JobContextMessage),
    AuditJobFail(JobContextMessage),
    JobStarted(JobId),
    JobFinished(JobId),
    JobAwaitingAction(JobId),
    Handler(usize),
    Publish {
        message: JobContextMessage,
        properties: Option<MessageProperties>,
        target: Option<String>,
    },
}

impl Call {
    pub fn name(&self) -> &'static str {
        match self {
            Call::AuditStart(_) => "audit_start",
            Call::AuditEnd(_) => "audit_end",
            Call::AuditJobFail(_) => "audit_job_fail",
            Call::JobStarted(_) => "job_started",
            Call::JobFinished(_) => "job_finished",
            Call::JobAwaitingAction(_) => "job_awaiting_action",
            Call::Handler(_) => "handler",
            Call::Publish { .. } => "publish",
        }
    }
}

#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.calls().iter().map(Call::name).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.names().iter().filter(|n| **n == name).count()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    pub fn published(&self) -> Vec<(JobContextMessage, Option<String>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Publish {
                    message, target, ..
                } => Some((message, target)),
                _ => None,
            })
            .collect()
    }
}

/// Which collaborator calls should fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct Faults {
    pub audit_start: bool,
    pub audit_job_fail: bool,
    pub status: bool,
    pub map_to: bool,
    pub map_from: bool,
    pub publish: bool,
}

pub struct RecordingAuditor {
    log: CallLog,
    fail_start: bool,
    fail_job_fail: bool,
}

#[async_trait]
impl Auditor for RecordingAuditor {
    async fn audit_start(&self, message: &JobContextMessage) -> Result<()> {
        self.log.push(Call::AuditStart(message.clone()));
        if self.fail_start {
            return Err(JobContextError::Audit("audit store offline".into()));
        }
        Ok(())
    }

    async fn audit_end(&self, message: &JobContextMessage) -> Result<()> {
        self.log.push(Call::AuditEnd(message.clone()));
        Ok(())
    }

    async fn audit_job_fail(&self, message: &JobContextMessage) -> Result<()> {
        self.log.push(Call::AuditJobFail(message.clone()));
        if self.fail_job_fail {
            return Err(JobContextError::Audit("audit store offline".into()));
        }
        Ok(())
    }
}

pub struct RecordingStatus {
    log: CallLog,
    fail: bool,
}

impl RecordingStatus {
    fn record(&self, call: Call) -> Result<()> {
        self.log.push(call);
        if self.fail {
            return Err(JobContextError::Status("status service unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl JobStatusTracker for RecordingStatus {
    async fn job_started(&self, job_id: JobId) -> Result<()> {
        self.record(Call::JobStarted(job_id))
    }

    async fn job_finished(&self, job_id: JobId) -> Result<()> {
        self.record(Call::JobFinished(job_id))
    }

    async fn job_awaiting_action(&self, job_id: JobId) -> Result<()> {
        self.record(Call::JobAwaitingAction(job_id))
    }
}

pub struct RecordingPublisher {
    log: CallLog,
    fail: bool,
}

#[async_trait]
impl QueuePublisher for RecordingPublisher {
    async fn publish(
        &self,
        wire: WireMessage,
        properties: Option<MessageProperties>,
        target: Option<&str>,
    ) -> Result<()> {
        if self.fail {
            return Err(JobContextError::Publish("broker refused connection".into()));
        }
        let message = EnvelopeMapper::new().decode(&wire)?;
        self.log.push(Call::Publish {
            message,
            properties,
            target: target.map(str::to_string),
        });
        Ok(())
    }
}

pub struct CheckedMapper {
    fail_to: bool,
    fail_from: bool,
}

impl PayloadMapper<JobContextMessage> for CheckedMapper {
    fn map_to(&self, message: JobContextMessage) -> Result<JobContextMessage> {
        if self.fail_to {
            return Err(JobContextError::Mapping("payload schema mismatch".into()));
        }
        Ok(message)
    }

    fn map_from(&self, payload: JobContextMessage) -> Result<JobContextMessage> {
        if self.fail_from {
            return Err(JobContextError::Mapping("payload schema mismatch".into()));
        }
        Ok(payload)
    }
}

/// What the stage handler does when invoked.
#[derive(Debug, Clone)]
pub enum Stage {
    Accept,
    SetAttribute(&'static str, Value),
    Reject,
    Fail,
    /// Checks the cancel signal and fails if it was already cancelled.
    CheckCancel,
    /// Waits for cancellation before returning.
    WaitForCancel,
    /// Applies an arbitrary change to the message, then accepts.
    Rewrite(fn(&mut JobContextMessage)),
}

pub struct ScriptedStage {
    log: CallLog,
    stage: Stage,
}

#[async_trait]
impl StageHandler<JobContextMessage> for ScriptedStage {
    async fn handle(&self, payload: &mut JobContextMessage, cancel: CancelSignal) -> Result<bool> {
        self.log.push(Call::Handler(payload.topic_pointer));
        match &self.stage {
            Stage::Accept => Ok(true),
            Stage::SetAttribute(key, value) => {
                payload.attributes.insert(key.to_string(), value.clone());
                Ok(true)
            }
            Stage::Reject => Ok(false),
            Stage::Fail => Err(JobContextError::Stage("validation crashed".into())),
            Stage::CheckCancel => {
                cancel.check()?;
                Ok(true)
            }
            Stage::WaitForCancel => {
                cancel.cancelled().await;
                cancel.check()?;
                Ok(true)
            }
            Stage::Rewrite(change) => {
                change(payload);
                Ok(true)
            }
        }
    }
}

pub struct Fixture {
    pub log: CallLog,
    pub manager: JobContextManager<JobContextMessage>,
}

fn parts(
    log: &CallLog,
    stage: Stage,
    faults: Faults,
) -> (
    Arc<RecordingPublisher>,
    Arc<RecordingAuditor>,
    Arc<CheckedMapper>,
    Arc<ScriptedStage>,
) {
    (
        Arc::new(RecordingPublisher {
            log: log.clone(),
            fail: faults.publish,
        }),
        Arc::new(RecordingAuditor {
            log: log.clone(),
            fail_start: faults.audit_start,
            fail_job_fail: faults.audit_job_fail,
        }),
        Arc::new(CheckedMapper {
            fail_to: faults.map_to,
            fail_from: faults.map_from,
        }),
        Arc::new(ScriptedStage {
            log: log.clone(),
            stage,
        }),
    )
}

/// An engine wired for multi-topic routing with recording collaborators.
pub fn topic_fixture(stage: Stage, faults: Faults) -> Fixture {
    let log = CallLog::default();
    let (publisher, auditor, mapper, handler) = parts(&log, stage, faults);
    let status = Arc::new(RecordingStatus {
        log: log.clone(),
        fail: faults.status,
    });
    let manager = JobContextManager::<JobContextMessage>::with_topic_routing(
        publisher, auditor, mapper, handler, status,
    );
    Fixture { log, manager }
}

/// An engine wired for single-queue requeue with recording collaborators.
pub fn requeue_fixture(stage: Stage, faults: Faults) -> Fixture {
    let log = CallLog::default();
    let (publisher, auditor, mapper, handler) = parts(&log, stage, faults);
    let manager =
        JobContextManager::<JobContextMessage>::with_requeue(publisher, auditor, mapper, handler);
    Fixture { log, manager }
}

/// A job over topics `A`, `B`, `C` at the given pointer.
pub fn job(job_id: i64, pointer: usize) -> JobContextMessage {
    JobContextMessage::new(
        job_id,
        vec![Topic::new("A"), Topic::new("B"), Topic::new("C")],
    )
    .with_pointer(pointer)
}

pub fn wire(message: &JobContextMessage) -> WireMessage {
    EnvelopeMapper::new().encode(message).unwrap()
}

#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub fields: BTreeMap<String, String>,
}

#[derive(Default)]
struct FieldVisitor(BTreeMap<String, String>);

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}

/// A tracing layer that keeps every event it sees.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CapturedLogs {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.level == Level::ERROR)
            .collect()
    }
}

impl<S: Subscriber> Layer<S> for CapturedLogs {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            fields: visitor.0,
        });
    }
}

/// Captures tracing events emitted on the current thread while the guard lives.
pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::registry().with(logs.clone());
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}
