use super::cancel::CancelSignal;
use super::envelope::WireMessage;
use super::message::{JobContextMessage, JobId};
use super::outcome::CallbackResult;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Transport-level properties of a delivered or published message.
pub type MessageProperties = BTreeMap<String, Value>;

/// Records stage lifecycle events. Always called with the message as it was
/// received, never with the copy the stage handler returned.
#[async_trait]
pub trait Auditor: Send + Sync {
    async fn audit_start(&self, message: &JobContextMessage) -> Result<()>;
    async fn audit_end(&self, message: &JobContextMessage) -> Result<()>;
    async fn audit_job_fail(&self, message: &JobContextMessage) -> Result<()>;
}

/// Job-level status transitions.
#[async_trait]
pub trait JobStatusTracker: Send + Sync {
    async fn job_started(&self, job_id: JobId) -> Result<()>;
    async fn job_finished(&self, job_id: JobId) -> Result<()>;
    async fn job_awaiting_action(&self, job_id: JobId) -> Result<()>;
}

/// Converts between the canonical message and a stage-specific payload.
pub trait PayloadMapper<T>: Send + Sync {
    fn map_to(&self, message: JobContextMessage) -> Result<T>;
    fn map_from(&self, payload: T) -> Result<JobContextMessage>;
}

/// The unit of work performed by one stage.
///
/// Returns `Ok(true)` to accept and advance the job, `Ok(false)` to reject it.
/// Cancellation is reported as `Err(JobContextError::Cancelled)`, for example
/// through [`CancelSignal::check`].
///
/// A message that failed may be delivered again with the same topic pointer,
/// so implementations must be idempotent for a given pointer value.
#[async_trait]
pub trait StageHandler<T>: Send + Sync {
    async fn handle(&self, payload: &mut T, cancel: CancelSignal) -> Result<bool>;
}

/// Receives inbound messages from a transport subscription.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(
        &self,
        wire: WireMessage,
        properties: MessageProperties,
        cancel: CancelSignal,
    ) -> CallbackResult;
}

/// Inbound side of a transport.
#[async_trait]
pub trait QueueSubscriber: Send + Sync {
    async fn subscribe(&self, handler: Arc<dyn MessageHandler>) -> Result<()>;
}

/// Outbound side of a transport. Callers assume at-least-once delivery.
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    async fn publish(
        &self,
        wire: WireMessage,
        properties: Option<MessageProperties>,
        target: Option<&str>,
    ) -> Result<()>;
}

pub type AuditorRef = Arc<dyn Auditor>;
pub type JobStatusRef = Arc<dyn JobStatusTracker>;
pub type PublisherRef = Arc<dyn QueuePublisher>;
