use thiserror::Error;

/// A wire message that does not match the job message schema.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("job {job_id} has no topics")]
    NoTopics { job_id: i64 },
    #[error("job {job_id} topic pointer {pointer} is past the end of {topics} topics")]
    PointerOutOfRange {
        job_id: i64,
        pointer: usize,
        topics: usize,
    },
    #[error("job {job_id} has already run all {topics} topics")]
    NothingToRun { job_id: i64, topics: usize },
}

#[derive(Error, Debug)]
pub enum JobContextError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("Payload mapping error: {0}")]
    Mapping(String),
    #[error("Stage error: {0}")]
    Stage(String),
    #[error("Stage cancelled")]
    Cancelled,
    #[error("Audit error: {0}")]
    Audit(String),
    #[error("Job status error: {0}")]
    Status(String),
    #[error("Publish error: {0}")]
    Publish(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, JobContextError>;
