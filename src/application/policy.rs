//! Completion and routing policies.
//!
//! The stage engine runs the same state machine for every deployment; a policy
//! decides what "job started", "job completed" and "publish the next stage"
//! mean for a given transport layout.

use crate::domain::message::{JobContextMessage, JobId};
use crate::domain::ports::{JobStatusRef, MessageProperties};
use crate::error::{JobContextError, Result};
use async_trait::async_trait;
use serde_json::Value;

/// Routing property naming the subscription an outbound message is for.
pub const TO_PROPERTY: &str = "To";

/// Where the next hop of a job is published.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Route {
    pub properties: Option<MessageProperties>,
    pub target: Option<String>,
}

#[async_trait]
pub trait CompletionPolicy: Send + Sync {
    /// Called once, when a job enters its first stage.
    async fn job_started(&self, job_id: JobId) -> Result<()>;

    /// Called once the advanced message has no stages left.
    async fn job_completed(&self, message: &JobContextMessage) -> Result<()>;

    /// Routing for an advanced message that still has stages to run.
    fn route(&self, message: &JobContextMessage) -> Result<Route>;
}

/// Multi-topic routing: each stage has its own subscription and job status is
/// reported to a [`JobStatusTracker`](crate::domain::ports::JobStatusTracker).
pub struct TopicRoutingPolicy {
    job_status: JobStatusRef,
}

impl TopicRoutingPolicy {
    pub fn new(job_status: JobStatusRef) -> Self {
        Self { job_status }
    }
}

#[async_trait]
impl CompletionPolicy for TopicRoutingPolicy {
    async fn job_started(&self, job_id: JobId) -> Result<()> {
        self.job_status.job_started(job_id).await
    }

    async fn job_completed(&self, message: &JobContextMessage) -> Result<()> {
        if message.pause_when_finished() {
            self.job_status.job_awaiting_action(message.job_id).await
        } else {
            self.job_status.job_finished(message.job_id).await
        }
    }

    fn route(&self, message: &JobContextMessage) -> Result<Route> {
        let subscription = message
            .current_topic()
            .map(|topic| topic.subscription_name.clone())
            .ok_or_else(|| {
                JobContextError::Publish(format!(
                    "job {} has no topic at pointer {}",
                    message.job_id, message.topic_pointer
                ))
            })?;

        let mut properties = MessageProperties::new();
        properties.insert(TO_PROPERTY.to_string(), Value::String(subscription.clone()));

        Ok(Route {
            properties: Some(properties),
            target: Some(subscription),
        })
    }
}

/// Single-queue requeue: every stage consumes the same queue, so the message
/// is published back to it unrouted. Completion is visible only through the
/// stage-end audit.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequeuePolicy;

impl RequeuePolicy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CompletionPolicy for RequeuePolicy {
    async fn job_started(&self, _job_id: JobId) -> Result<()> {
        Ok(())
    }

    async fn job_completed(&self, message: &JobContextMessage) -> Result<()> {
        tracing::debug!(job_id = %message.job_id, "job completed on requeue pipeline");
        Ok(())
    }

    fn route(&self, _message: &JobContextMessage) -> Result<Route> {
        Ok(Route::default())
    }
}
