use crate::application::policy::{CompletionPolicy, RequeuePolicy, TopicRoutingPolicy};
use crate::domain::cancel::CancelSignal;
use crate::domain::envelope::{EnvelopeMapper, WireMessage};
use crate::domain::message::JobContextMessage;
use crate::domain::outcome::CallbackResult;
use crate::domain::ports::{
    AuditorRef, JobStatusRef, MessageHandler, MessageProperties, PayloadMapper, PublisherRef,
    QueueSubscriber, StageHandler,
};
use crate::error::{DecodeError, JobContextError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// How a successfully handled stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageOutcome {
    Rejected,
    Completed,
    Published,
}

/// The stage advancement engine.
///
/// `JobContextManager` handles one delivered job message per call: it audits
/// the stage, runs the stage handler on the mapped payload, then either
/// publishes the advanced message to the next stage or reports completion
/// through its [`CompletionPolicy`]. It keeps no state between calls, so one
/// instance can serve many concurrent deliveries.
pub struct JobContextManager<T> {
    publisher: PublisherRef,
    auditor: AuditorRef,
    mapper: Arc<dyn PayloadMapper<T>>,
    handler: Arc<dyn StageHandler<T>>,
    policy: Arc<dyn CompletionPolicy>,
    envelope: EnvelopeMapper,
}

impl<T: Send + 'static> JobContextManager<T> {
    /// Creates a new `JobContextManager`.
    ///
    /// # Arguments
    ///
    /// * `publisher` - Outbound transport for the next stage.
    /// * `auditor` - Sink for stage start, end and failure audits.
    /// * `mapper` - Converts job messages to and from the stage payload.
    /// * `handler` - The work performed by this stage.
    /// * `policy` - Completion and routing behaviour of the deployment.
    pub fn new(
        publisher: PublisherRef,
        auditor: AuditorRef,
        mapper: Arc<dyn PayloadMapper<T>>,
        handler: Arc<dyn StageHandler<T>>,
        policy: Arc<dyn CompletionPolicy>,
    ) -> Self {
        Self {
            publisher,
            auditor,
            mapper,
            handler,
            policy,
            envelope: EnvelopeMapper::new(),
        }
    }

    /// Engine for a multi-topic deployment reporting to a job status tracker.
    pub fn with_topic_routing(
        publisher: PublisherRef,
        auditor: AuditorRef,
        mapper: Arc<dyn PayloadMapper<T>>,
        handler: Arc<dyn StageHandler<T>>,
        job_status: JobStatusRef,
    ) -> Self {
        Self::new(
            publisher,
            auditor,
            mapper,
            handler,
            Arc::new(TopicRoutingPolicy::new(job_status)),
        )
    }

    /// Engine for a single-queue deployment that republishes to its own queue.
    pub fn with_requeue(
        publisher: PublisherRef,
        auditor: AuditorRef,
        mapper: Arc<dyn PayloadMapper<T>>,
        handler: Arc<dyn StageHandler<T>>,
    ) -> Self {
        Self::new(
            publisher,
            auditor,
            mapper,
            handler,
            Arc::new(RequeuePolicy::new()),
        )
    }

    /// Registers this engine as the handler of an inbound subscription.
    pub async fn subscribe_to(self: Arc<Self>, subscriber: &dyn QueueSubscriber) -> Result<()> {
        subscriber.subscribe(self).await
    }

    /// Audits a job that was finished outside the stage flow.
    pub async fn finish_successfully(&self, message: &JobContextMessage) -> Result<()> {
        self.auditor.audit_end(message).await
    }

    /// Audits a job that failed outside the stage flow.
    pub async fn finish_error(&self, message: &JobContextMessage) -> Result<()> {
        self.auditor.audit_job_fail(message).await
    }

    /// Processes one delivered job message.
    ///
    /// Every error raised after decoding is caught here exactly once: it is
    /// logged with the job id, the received message is audited as a job
    /// failure and the error is returned in the result. Nothing is retried;
    /// redelivery is up to the transport.
    ///
    /// A message with no stage left to run is refused before any audit.
    pub async fn advance(
        &self,
        wire: WireMessage,
        properties: MessageProperties,
        cancel: CancelSignal,
    ) -> CallbackResult {
        let before = match self.envelope.decode(&wire) {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(error = %e, "Rejected malformed job message");
                return CallbackResult::failed(e.into());
            }
        };

        if before.is_complete() {
            let e = DecodeError::NothingToRun {
                job_id: before.job_id.0,
                topics: before.topics.len(),
            };
            tracing::error!(job_id = %before.job_id, error = %e, "Rejected completed job message");
            return CallbackResult::failed(e.into());
        }

        tracing::debug!(
            job_id = %before.job_id,
            topic_pointer = before.topic_pointer,
            properties = ?properties.keys().collect::<Vec<_>>(),
            "Received job message"
        );

        match self.run_stage(&before, cancel).await {
            Ok(StageOutcome::Rejected) => {
                self.report_job_fail(&before).await;
                CallbackResult::rejected()
            }
            Ok(outcome) => {
                tracing::debug!(job_id = %before.job_id, ?outcome, "Stage succeeded");
                CallbackResult::succeeded()
            }
            Err(e) => {
                tracing::error!(
                    job_id = %before.job_id,
                    topic_pointer = before.topic_pointer,
                    error = %e,
                    "Exception thrown in job context manager callback"
                );
                self.report_job_fail(&before).await;
                CallbackResult::failed(e)
            }
        }
    }

    async fn report_job_fail(&self, before: &JobContextMessage) {
        if let Err(e) = self.auditor.audit_job_fail(before).await {
            tracing::warn!(job_id = %before.job_id, error = %e, "Failed to audit job failure");
        }
    }

    async fn run_stage(
        &self,
        before: &JobContextMessage,
        cancel: CancelSignal,
    ) -> Result<StageOutcome> {
        self.auditor.audit_start(before).await?;
        if before.is_first_stage() {
            self.policy.job_started(before.job_id).await?;
        }

        let mut payload = self.mapper.map_to(before.clone())?;
        if !self.handler.handle(&mut payload, cancel).await? {
            return Ok(StageOutcome::Rejected);
        }

        // Only attributes are taken from the handled copy; the job id, topics
        // and pointer always come from the received message.
        let handled = self.mapper.map_from(payload)?;
        self.auditor.audit_end(before).await?;
        let after = JobContextMessage {
            attributes: handled.attributes,
            ..before.clone()
        }
        .advanced()
        .ok_or_else(|| {
            JobContextError::Stage(format!(
                "job {} topic pointer {} cannot be advanced",
                before.job_id, before.topic_pointer
            ))
        })?;

        if after.is_complete() {
            self.policy.job_completed(&after).await?;
            return Ok(StageOutcome::Completed);
        }

        let route = self.policy.route(&after)?;
        let wire = self.envelope.encode(&after)?;
        self.publisher
            .publish(wire, route.properties, route.target.as_deref())
            .await?;

        tracing::debug!(
            job_id = %after.job_id,
            topic_pointer = after.topic_pointer,
            target = ?route.target,
            "Published job to next stage"
        );
        Ok(StageOutcome::Published)
    }
}

#[async_trait]
impl<T: Send + 'static> MessageHandler for JobContextManager<T> {
    async fn handle(
        &self,
        wire: WireMessage,
        properties: MessageProperties,
        cancel: CancelSignal,
    ) -> CallbackResult {
        self.advance(wire, properties, cancel).await
    }
}
