//! Wire-level representation of a job message.
//!
//! Transports carry [`WireMessage`] bodies; only [`EnvelopeMapper`] knows the
//! serialized schema. Decoding validates the message invariants so the engine
//! never sees a job with no topics or a pointer past the end of its topics.

use super::message::{JobContextMessage, JobId, TaskItem, Topic};
use crate::error::{DecodeError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A serialized job message as delivered by, or handed to, a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    body: Vec<u8>,
}

impl WireMessage {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self { body: body.into() }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskItemDto {
    tasks: Vec<String>,
    #[serde(default)]
    supports_parallel_execution: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopicItemDto {
    subscription_name: String,
    #[serde(default)]
    tasks: Vec<TaskItemDto>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobContextDto {
    job_id: i64,
    submission_date_time_utc: DateTime<Utc>,
    topics: Vec<TopicItemDto>,
    topic_pointer: usize,
    #[serde(default)]
    key_value_pairs: BTreeMap<String, Value>,
}

impl From<TaskItemDto> for TaskItem {
    fn from(dto: TaskItemDto) -> Self {
        Self {
            tasks: dto.tasks,
            supports_parallel_execution: dto.supports_parallel_execution,
        }
    }
}

impl From<&TaskItem> for TaskItemDto {
    fn from(item: &TaskItem) -> Self {
        Self {
            tasks: item.tasks.clone(),
            supports_parallel_execution: item.supports_parallel_execution,
        }
    }
}

/// Stateless converter between [`WireMessage`] and [`JobContextMessage`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeMapper;

impl EnvelopeMapper {
    pub fn new() -> Self {
        Self
    }

    pub fn decode(&self, wire: &WireMessage) -> std::result::Result<JobContextMessage, DecodeError> {
        let dto: JobContextDto = serde_json::from_slice(wire.body())?;

        if dto.topics.is_empty() {
            return Err(DecodeError::NoTopics { job_id: dto.job_id });
        }
        if dto.topic_pointer > dto.topics.len() {
            return Err(DecodeError::PointerOutOfRange {
                job_id: dto.job_id,
                pointer: dto.topic_pointer,
                topics: dto.topics.len(),
            });
        }

        let topics = dto
            .topics
            .into_iter()
            .map(|topic| Topic {
                subscription_name: topic.subscription_name,
                tasks: topic.tasks.into_iter().map(TaskItem::from).collect(),
            })
            .collect();

        Ok(JobContextMessage {
            job_id: JobId(dto.job_id),
            topics,
            topic_pointer: dto.topic_pointer,
            attributes: dto.key_value_pairs,
            submitted_at: dto.submission_date_time_utc,
        })
    }

    pub fn encode(&self, message: &JobContextMessage) -> Result<WireMessage> {
        let dto = JobContextDto {
            job_id: message.job_id.0,
            submission_date_time_utc: message.submitted_at,
            topics: message
                .topics
                .iter()
                .map(|topic| TopicItemDto {
                    subscription_name: topic.subscription_name.clone(),
                    tasks: topic.tasks.iter().map(TaskItemDto::from).collect(),
                })
                .collect(),
            topic_pointer: message.topic_pointer,
            key_value_pairs: message.attributes.clone(),
        };

        Ok(WireMessage::new(serde_json::to_vec(&dto)?))
    }
}
