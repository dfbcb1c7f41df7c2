use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Attribute key whose presence at completion time reports the job as
/// awaiting action instead of finished.
pub const PAUSE_WHEN_FINISHED: &str = "PauseWhenFinished";

/// Stable identifier of a job for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for JobId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A group of task names executed by the consumer of a topic.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskItem {
    pub tasks: Vec<String>,
    pub supports_parallel_execution: bool,
}

/// One stage of the pipeline and the subscription that consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub subscription_name: String,
    #[serde(default)]
    pub tasks: Vec<TaskItem>,
}

impl Topic {
    pub fn new(subscription_name: impl Into<String>) -> Self {
        Self {
            subscription_name: subscription_name.into(),
            tasks: Vec::new(),
        }
    }

    pub fn with_tasks(mut self, tasks: Vec<TaskItem>) -> Self {
        self.tasks = tasks;
        self
    }
}

/// The canonical job message carried from stage to stage.
///
/// All progress lives here: `topic_pointer` is the index of the next stage to
/// run, and `topic_pointer == topics.len()` means the pipeline is complete.
/// Values are treated as immutable by the engine; advancing produces a new
/// message through [`JobContextMessage::advanced`].
#[derive(Debug, Clone, PartialEq)]
pub struct JobContextMessage {
    pub job_id: JobId,
    pub topics: Vec<Topic>,
    pub topic_pointer: usize,
    pub attributes: BTreeMap<String, Value>,
    pub submitted_at: DateTime<Utc>,
}

impl JobContextMessage {
    pub fn new(job_id: impl Into<JobId>, topics: Vec<Topic>) -> Self {
        Self {
            job_id: job_id.into(),
            topics,
            topic_pointer: 0,
            attributes: BTreeMap::new(),
            submitted_at: Utc::now(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_pointer(mut self, topic_pointer: usize) -> Self {
        self.topic_pointer = topic_pointer;
        self
    }

    /// Returns this message moved on to the next stage, `None` if the pointer
    /// cannot be incremented.
    pub fn advanced(self) -> Option<Self> {
        let topic_pointer = self.topic_pointer.checked_add(1)?;
        Some(Self {
            topic_pointer,
            ..self
        })
    }

    pub fn is_first_stage(&self) -> bool {
        self.topic_pointer == 0
    }

    pub fn is_complete(&self) -> bool {
        self.topic_pointer >= self.topics.len()
    }

    /// The stage `topic_pointer` refers to, `None` once the pipeline is complete.
    pub fn current_topic(&self) -> Option<&Topic> {
        self.topics.get(self.topic_pointer)
    }

    pub fn pause_when_finished(&self) -> bool {
        self.attributes.contains_key(PAUSE_WHEN_FINISHED)
    }
}
