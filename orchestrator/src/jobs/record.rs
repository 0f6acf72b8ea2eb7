//! Job record state machine

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// No job was ever started for the key
    Absent,

    /// Action executing in the background
    Running,

    /// Finished successfully
    Success,

    /// Finished with an operational failure
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Error)
    }
}

/// Job event
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// A new job was accepted for the key
    Start(Uuid),

    /// The running job reported a phase change
    Progress(String),

    /// The running job finished
    Succeed(String),

    /// The running job failed
    Fail(String),
}

/// Status record for one service key
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub service_key: String,
    pub status: JobStatus,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Record for a key that never ran
    pub fn absent(service_key: &str) -> Self {
        Self {
            service_key: service_key.to_string(),
            status: JobStatus::Absent,
            message: String::new(),
            job_id: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: JobEvent) -> Result<(), String> {
        match (self.status, event) {
            // (re-)arm
            (JobStatus::Absent | JobStatus::Success | JobStatus::Error, JobEvent::Start(id)) => {
                self.status = JobStatus::Running;
                self.message = "Started".to_string();
                self.job_id = Some(id);
                self.started_at = Some(Utc::now());
                self.finished_at = None;
            }

            (JobStatus::Running, JobEvent::Progress(message)) => {
                self.message = message;
            }

            (JobStatus::Running, JobEvent::Succeed(message)) => {
                self.status = JobStatus::Success;
                self.message = message;
                self.finished_at = Some(Utc::now());
            }
            (JobStatus::Running, JobEvent::Fail(message)) => {
                self.status = JobStatus::Error;
                self.message = message;
                self.finished_at = Some(Utc::now());
            }

            (status, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", status, event));
            }
        }
        Ok(())
    }
}
