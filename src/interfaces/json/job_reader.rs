use crate::domain::message::{JobContextMessage, TaskItem, Topic};
use crate::error::Result;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Read;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TopicDefinition {
    Name(String),
    Full {
        #[serde(rename = "subscriptionName")]
        subscription_name: String,
        #[serde(default)]
        tasks: Vec<Vec<String>>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobDefinition {
    job_id: i64,
    topics: Vec<TopicDefinition>,
    #[serde(default)]
    attributes: BTreeMap<String, Value>,
}

impl From<TopicDefinition> for Topic {
    fn from(definition: TopicDefinition) -> Self {
        match definition {
            TopicDefinition::Name(name) => Topic::new(name),
            TopicDefinition::Full {
                subscription_name,
                tasks,
            } => Topic::new(subscription_name).with_tasks(
                tasks
                    .into_iter()
                    .map(|tasks| TaskItem {
                        tasks,
                        supports_parallel_execution: false,
                    })
                    .collect(),
            ),
        }
    }
}

/// Reads a job definition and builds the message for its first stage.
///
/// Topics are either plain subscription names or objects with a
/// `subscriptionName` and a list of task groups:
///
/// ```json
/// {"jobId": 1, "topics": ["Validation", {"subscriptionName": "Reports", "tasks": [["Summary"]]}]}
/// ```
pub struct JobReader<R: Read> {
    source: R,
}

impl<R: Read> JobReader<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    pub fn read_job(self) -> Result<JobContextMessage> {
        let definition: JobDefinition = serde_json::from_reader(self.source)?;
        let mut message = JobContextMessage::new(
            definition.job_id,
            definition.topics.into_iter().map(Topic::from).collect(),
        );
        message.attributes = definition.attributes;
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::JobId;

    #[test]
    fn test_reader_plain_and_full_topics() {
        let data = r#"{
            "jobId": 3,
            "topics": ["A", {"subscriptionName": "B", "tasks": [["T1", "T2"]]}],
            "attributes": {"PauseWhenFinished": true}
        }"#;

        let job = JobReader::new(data.as_bytes()).read_job().unwrap();

        assert_eq!(job.job_id, JobId(3));
        assert_eq!(job.topic_pointer, 0);
        assert_eq!(job.topics[0], Topic::new("A"));
        assert_eq!(job.topics[1].tasks[0].tasks, vec!["T1", "T2"]);
        assert!(job.pause_when_finished());
    }

    #[test]
    fn test_reader_malformed_job() {
        let data = r#"{"topics": ["A"]}"#;
        assert!(JobReader::new(data.as_bytes()).read_job().is_err());
    }
}
