use crate::domain::outcome::CallbackResult;
use crate::error::Result;
use crate::infrastructure::in_memory::{AuditRecord, JobStatusEvent};
use serde_json::json;
use std::io::Write;

/// Writes what happened to a job as JSON lines, one event per line.
pub struct TrailWriter<W: Write> {
    writer: W,
}

impl<W: Write> TrailWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write_audits(&mut self, records: &[AuditRecord]) -> Result<()> {
        for record in records {
            let line = json!({
                "event": record.kind.to_string(),
                "jobId": record.message.job_id,
                "topicPointer": record.message.topic_pointer,
            });
            writeln!(self.writer, "{line}")?;
        }
        Ok(())
    }

    pub fn write_status(&mut self, events: &[JobStatusEvent]) -> Result<()> {
        for event in events {
            let line = json!({
                "event": event.to_string(),
                "jobId": event.job_id(),
            });
            writeln!(self.writer, "{line}")?;
        }
        Ok(())
    }

    pub fn write_results(&mut self, results: &[CallbackResult]) -> Result<()> {
        for result in results {
            let line = json!({
                "event": "result",
                "success": result.success,
                "failure": result.failure_kind().map(|kind| kind.to_string()),
                "error": result.error.as_ref().map(|e| e.to_string()),
            });
            writeln!(self.writer, "{line}")?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
