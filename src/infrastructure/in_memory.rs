use crate::application::policy::TO_PROPERTY;
use crate::domain::cancel::CancelSignal;
use crate::domain::envelope::WireMessage;
use crate::domain::message::{JobContextMessage, JobId};
use crate::domain::outcome::CallbackResult;
use crate::domain::ports::{
    Auditor, JobStatusTracker, MessageHandler, MessageProperties, PayloadMapper, QueuePublisher,
    QueueSubscriber,
};
use crate::error::{JobContextError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditKind {
    Start,
    End,
    JobFail,
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditKind::Start => write!(f, "audit_start"),
            AuditKind::End => write!(f, "audit_end"),
            AuditKind::JobFail => write!(f, "audit_job_fail"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub kind: AuditKind,
    pub message: JobContextMessage,
}

/// An auditor that keeps every audit in memory, in call order.
///
/// Uses `Arc<RwLock<Vec<AuditRecord>>>` so clones share the same records.
#[derive(Default, Clone)]
pub struct InMemoryAuditor {
    records: Arc<RwLock<Vec<AuditRecord>>>,
}

impl InMemoryAuditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.read().await.clone()
    }

    async fn push(&self, kind: AuditKind, message: &JobContextMessage) {
        self.records.write().await.push(AuditRecord {
            kind,
            message: message.clone(),
        });
    }
}

#[async_trait]
impl Auditor for InMemoryAuditor {
    async fn audit_start(&self, message: &JobContextMessage) -> Result<()> {
        self.push(AuditKind::Start, message).await;
        Ok(())
    }

    async fn audit_end(&self, message: &JobContextMessage) -> Result<()> {
        self.push(AuditKind::End, message).await;
        Ok(())
    }

    async fn audit_job_fail(&self, message: &JobContextMessage) -> Result<()> {
        self.push(AuditKind::JobFail, message).await;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatusEvent {
    Started(JobId),
    Finished(JobId),
    AwaitingAction(JobId),
}

impl fmt::Display for JobStatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatusEvent::Started(_) => write!(f, "job_started"),
            JobStatusEvent::Finished(_) => write!(f, "job_finished"),
            JobStatusEvent::AwaitingAction(_) => write!(f, "job_awaiting_action"),
        }
    }
}

impl JobStatusEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            JobStatusEvent::Started(id)
            | JobStatusEvent::Finished(id)
            | JobStatusEvent::AwaitingAction(id) => *id,
        }
    }
}

/// A job status tracker that records transitions in memory.
#[derive(Default, Clone)]
pub struct InMemoryJobStatus {
    events: Arc<RwLock<Vec<JobStatusEvent>>>,
}

impl InMemoryJobStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<JobStatusEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl JobStatusTracker for InMemoryJobStatus {
    async fn job_started(&self, job_id: JobId) -> Result<()> {
        self.events.write().await.push(JobStatusEvent::Started(job_id));
        Ok(())
    }

    async fn job_finished(&self, job_id: JobId) -> Result<()> {
        self.events.write().await.push(JobStatusEvent::Finished(job_id));
        Ok(())
    }

    async fn job_awaiting_action(&self, job_id: JobId) -> Result<()> {
        self.events
            .write()
            .await
            .push(JobStatusEvent::AwaitingAction(job_id));
        Ok(())
    }
}

/// Payload mapper for stages that work on the job message itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityMapper;

impl PayloadMapper<JobContextMessage> for IdentityMapper {
    fn map_to(&self, message: JobContextMessage) -> Result<JobContextMessage> {
        Ok(message)
    }

    fn map_from(&self, payload: JobContextMessage) -> Result<JobContextMessage> {
        Ok(payload)
    }
}

/// A message as it was handed to [`InMemoryBus::publish`].
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub wire: WireMessage,
    pub properties: Option<MessageProperties>,
    pub target: Option<String>,
}

struct Delivery {
    wire: WireMessage,
    properties: MessageProperties,
    subscription: String,
}

struct BusState {
    queue_name: String,
    subscriptions: RwLock<HashMap<String, Arc<dyn MessageHandler>>>,
    pending: Mutex<VecDeque<Delivery>>,
    published: RwLock<Vec<PublishedMessage>>,
}

/// An in-process transport holding one queue and any number of topic
/// subscriptions.
///
/// Unrouted messages go to the queue; routed messages go to the subscription
/// named by the publish target, or by the `To` property when no target is
/// given. Messages are delivered one at a time by [`InMemoryBus::deliver_next`]
/// and are not redelivered after a failed callback.
#[derive(Clone)]
pub struct InMemoryBus {
    state: Arc<BusState>,
}

impl InMemoryBus {
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            state: Arc::new(BusState {
                queue_name: queue_name.into(),
                subscriptions: RwLock::new(HashMap::new()),
                pending: Mutex::new(VecDeque::new()),
                published: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.state.queue_name
    }

    /// The inbound side of one named subscription.
    pub fn subscription(&self, name: impl Into<String>) -> InMemorySubscription {
        InMemorySubscription {
            bus: self.clone(),
            name: name.into(),
        }
    }

    /// Puts a message on the bus without recording it as published.
    pub async fn enqueue(
        &self,
        wire: WireMessage,
        properties: MessageProperties,
        target: Option<&str>,
    ) {
        let subscription = self.resolve(&properties, target);
        self.state.pending.lock().await.push_back(Delivery {
            wire,
            properties,
            subscription,
        });
    }

    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.state.published.read().await.clone()
    }

    pub async fn pending(&self) -> usize {
        self.state.pending.lock().await.len()
    }

    /// Delivers the oldest pending message to its subscriber.
    ///
    /// Returns `Ok(None)` when nothing is pending. A message whose subscription
    /// has no handler stays on the bus and an error is returned.
    pub async fn deliver_next(&self, cancel: CancelSignal) -> Result<Option<CallbackResult>> {
        let Some(delivery) = self.state.pending.lock().await.pop_front() else {
            return Ok(None);
        };

        let handler = self
            .state
            .subscriptions
            .read()
            .await
            .get(&delivery.subscription)
            .cloned();

        let Some(handler) = handler else {
            let name = delivery.subscription.clone();
            self.state.pending.lock().await.push_front(delivery);
            return Err(JobContextError::Publish(format!(
                "no subscriber for '{name}'"
            )));
        };

        let result = handler
            .handle(delivery.wire, delivery.properties, cancel)
            .await;
        Ok(Some(result))
    }

    /// Delivers messages until none are pending, including the ones published
    /// by the handlers along the way.
    pub async fn run_until_idle(&self, cancel: CancelSignal) -> Result<Vec<CallbackResult>> {
        let mut results = Vec::new();
        while let Some(result) = self.deliver_next(cancel.clone()).await? {
            results.push(result);
        }
        Ok(results)
    }

    fn resolve(&self, properties: &MessageProperties, target: Option<&str>) -> String {
        target
            .or_else(|| properties.get(TO_PROPERTY).and_then(|value| value.as_str()))
            .unwrap_or(self.state.queue_name.as_str())
            .to_string()
    }
}

#[async_trait]
impl QueuePublisher for InMemoryBus {
    async fn publish(
        &self,
        wire: WireMessage,
        properties: Option<MessageProperties>,
        target: Option<&str>,
    ) -> Result<()> {
        self.state.published.write().await.push(PublishedMessage {
            wire: wire.clone(),
            properties: properties.clone(),
            target: target.map(str::to_string),
        });
        self.enqueue(wire, properties.unwrap_or_default(), target)
            .await;
        Ok(())
    }
}

/// A named subscription on an [`InMemoryBus`].
#[derive(Clone)]
pub struct InMemorySubscription {
    bus: InMemoryBus,
    name: String,
}

impl InMemorySubscription {
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl QueueSubscriber for InMemorySubscription {
    async fn subscribe(&self, handler: Arc<dyn MessageHandler>) -> Result<()> {
        self.bus
            .state
            .subscriptions
            .write()
            .await
            .insert(self.name.clone(), handler);
        Ok(())
    }
}
