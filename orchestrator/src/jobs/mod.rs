//! Background job runner
//!
//! One record per service key. `start` is atomic per key: a key whose job
//! is still running rejects new work with a conflict and is left untouched.
//! Unrelated keys never contend on the same lock.

pub mod record;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use futures::future::BoxFuture;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::errors::OrchestratorError;
pub use record::{JobEvent, JobRecord, JobStatus};

/// The work a job performs; resolves to its success message
pub type JobAction = BoxFuture<'static, Result<String, OrchestratorError>>;

type Slot = Arc<Mutex<JobRecord>>;

/// Keyed job table
#[derive(Debug, Default)]
pub struct JobRunner {
    records: RwLock<HashMap<String, Slot>>,
}

impl JobRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a job for `service_key` without waiting for it
    ///
    /// `build` receives the job's handle and returns the action to run.
    /// It is only called once the key has been claimed.
    pub fn start<F>(&self, service_key: &str, build: F) -> Result<Uuid, OrchestratorError>
    where
        F: FnOnce(JobHandle) -> JobAction,
    {
        let slot = self.slot(service_key);
        let job_id = Uuid::new_v4();

        {
            let mut record = slot.lock().unwrap_or_else(|e| e.into_inner());
            if record.status == JobStatus::Running {
                return Err(OrchestratorError::Conflict(format!(
                    "a job for '{}' is already running",
                    service_key
                )));
            }
            record
                .process(JobEvent::Start(job_id))
                .map_err(OrchestratorError::Internal)?;
        }

        let handle = JobHandle {
            service_key: service_key.to_string(),
            job_id,
            slot,
        };
        let action = build(handle.clone());
        let span = info_span!("job", service_key = %service_key, job_id = %job_id);

        tokio::spawn(
            async move {
                info!("Job started");
                // a panicking action still reaches a terminal state
                let outcome = match tokio::spawn(action).await {
                    Ok(outcome) => outcome,
                    Err(e) => Err(OrchestratorError::Internal(format!("job aborted: {}", e))),
                };
                handle.complete(outcome);
            }
            .instrument(span),
        );

        Ok(job_id)
    }

    /// Current record for `service_key`; `Absent` if it never ran
    pub fn poll(&self, service_key: &str) -> JobRecord {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        match records.get(service_key) {
            Some(slot) => slot.lock().unwrap_or_else(|e| e.into_inner()).clone(),
            None => JobRecord::absent(service_key),
        }
    }

    /// Every record ever created, sorted by key
    pub fn list(&self) -> Vec<JobRecord> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<JobRecord> = records
            .values()
            .map(|slot| slot.lock().unwrap_or_else(|e| e.into_inner()).clone())
            .collect();
        all.sort_by(|a, b| a.service_key.cmp(&b.service_key));
        all
    }

    /// Finish job `job_id` of `service_key`
    ///
    /// Ignored when the key has since been re-armed by another job.
    pub fn complete(
        &self,
        service_key: &str,
        job_id: Uuid,
        outcome: Result<String, OrchestratorError>,
    ) {
        let slot = {
            let records = self.records.read().unwrap_or_else(|e| e.into_inner());
            records.get(service_key).cloned()
        };
        match slot {
            Some(slot) => finish(&slot, job_id, outcome),
            None => warn!("Completion for unknown job key {}", service_key),
        }
    }

    fn slot(&self, service_key: &str) -> Slot {
        if let Some(slot) = self
            .records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(service_key)
        {
            return slot.clone();
        }
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records
            .entry(service_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(JobRecord::absent(service_key))))
            .clone()
    }
}

fn finish(slot: &Slot, job_id: Uuid, outcome: Result<String, OrchestratorError>) {
    let mut record = slot.lock().unwrap_or_else(|e| e.into_inner());
    if record.job_id != Some(job_id) {
        warn!("Dropping completion of superseded job {}", job_id);
        return;
    }

    let event = match outcome {
        Ok(message) => {
            info!("Job succeeded: {}", message);
            JobEvent::Succeed(message)
        }
        Err(e) => {
            error!("Job failed: {}", e);
            JobEvent::Fail(e.to_string())
        }
    };
    if let Err(e) = record.process(event) {
        warn!("Job {} completion ignored: {}", job_id, e);
    }
}

/// Passed to a running action so it can report progress
#[derive(Debug, Clone)]
pub struct JobHandle {
    service_key: String,
    job_id: Uuid,
    slot: Slot,
}

impl JobHandle {
    pub fn service_key(&self) -> &str {
        &self.service_key
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Replace the message shown to polling clients
    pub fn progress(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        let mut record = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if record.job_id == Some(self.job_id) {
            let _ = record.process(JobEvent::Progress(message));
        }
    }

    fn complete(&self, outcome: Result<String, OrchestratorError>) {
        finish(&self.slot, self.job_id, outcome);
    }
}
