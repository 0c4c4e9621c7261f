//! Job tracking for background task runs.
//!
//! Every task started through the registry gets a job: its arguments, a
//! progress log, a terminal status with the task's JSON result, and a
//! cancellation token the caller can fire while the job runs.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A single log entry with timestamp and message.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LogEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

/// One task run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Job {
    pub job_id: String,
    pub task: String,
    pub args: HashMap<String, String>,
    pub status: JobStatus,
    pub logs: Vec<LogEntry>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Value returned by the task handler (run report, counters)
    pub result: Option<serde_json::Value>,
}

/// In-memory job tracker. Clones share state.
#[derive(Clone, Default)]
pub struct JobTracker {
    jobs: Arc<RwLock<HashMap<String, Job>>>,
    tokens: Arc<RwLock<HashMap<String, CancellationToken>>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a running job for `task` and return its ID with the token
    /// that cancels it.
    pub fn create_job(
        &self,
        task: &str,
        args: &HashMap<String, String>,
    ) -> (String, CancellationToken) {
        let job_id = Uuid::new_v4().to_string();
        let token = CancellationToken::new();
        let job = Job {
            job_id: job_id.clone(),
            task: task.to_string(),
            args: args.clone(),
            status: JobStatus::Running,
            logs: vec![],
            created_at: chrono::Utc::now(),
            completed_at: None,
            result: None,
        };
        self.jobs.write().insert(job_id.clone(), job);
        self.tokens.write().insert(job_id.clone(), token.clone());
        (job_id, token)
    }

    /// Add a log entry to a job.
    pub fn log(&self, job_id: &str, level: LogLevel, message: impl Into<String>) {
        if let Some(job) = self.jobs.write().get_mut(job_id) {
            job.logs.push(LogEntry {
                timestamp: chrono::Utc::now(),
                level,
                message: message.into(),
            });
        }
    }

    /// Mark a job as completed with optional result.
    pub fn complete_job(&self, job_id: &str, result: Option<serde_json::Value>) {
        self.finish(job_id, JobStatus::Completed, |job| job.result = result);
    }

    /// Mark a job as failed, logging the error.
    pub fn fail_job(&self, job_id: &str, error_message: impl Into<String>) {
        let message = error_message.into();
        self.finish(job_id, JobStatus::Failed, |job| {
            job.logs.push(LogEntry {
                timestamp: chrono::Utc::now(),
                level: LogLevel::Error,
                message,
            })
        });
    }

    /// Fire the job's cancellation token.
    ///
    /// Returns false when the job is unknown or already finished. The status
    /// turns `Cancelled` once the task acknowledges through [`Self::mark_cancelled`].
    pub fn cancel_job(&self, job_id: &str) -> bool {
        let running = self
            .jobs
            .read()
            .get(job_id)
            .map_or(false, |job| job.status == JobStatus::Running);
        if !running {
            return false;
        }
        match self.tokens.read().get(job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn mark_cancelled(&self, job_id: &str, result: Option<serde_json::Value>) {
        self.finish(job_id, JobStatus::Cancelled, |job| job.result = result);
    }

    /// Get a job by ID.
    pub fn get_job(&self, job_id: &str) -> Option<Job> {
        self.jobs.read().get(job_id).cloned()
    }

    /// Get all logs for a job.
    pub fn get_logs(&self, job_id: &str) -> Vec<LogEntry> {
        self.jobs
            .read()
            .get(job_id)
            .map(|job| job.logs.clone())
            .unwrap_or_default()
    }

    /// All jobs, oldest first.
    pub fn list_jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    pub fn running_count(&self) -> usize {
        self.jobs
            .read()
            .values()
            .filter(|j| j.status == JobStatus::Running)
            .count()
    }

    fn finish(&self, job_id: &str, status: JobStatus, update: impl FnOnce(&mut Job)) {
        if let Some(job) = self.jobs.write().get_mut(job_id) {
            job.status = status;
            job.completed_at = Some(chrono::Utc::now());
            update(job);
        }
        self.tokens.write().remove(job_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_lifecycle() {
        let tracker = JobTracker::new();
        let args = HashMap::from([("faces".to_string(), "6".to_string())]);
        let (id, _token) = tracker.create_job("generate_tiles", &args);
        tracker.log(&id, LogLevel::Info, "started");
        tracker.complete_job(&id, Some(serde_json::json!({ "tiles": 4 })));

        let job = tracker.get_job(&id).unwrap();
        assert_eq!(job.task, "generate_tiles");
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result, Some(serde_json::json!({ "tiles": 4 })));
        assert_eq!(tracker.get_logs(&id).len(), 1);
        assert!(!tracker.cancel_job(&id));
    }

    #[test]
    fn test_cancel_fires_token() {
        let tracker = JobTracker::new();
        let (id, token) = tracker.create_job("compute_visibilities", &HashMap::new());
        assert_eq!(tracker.running_count(), 1);
        assert!(tracker.cancel_job(&id));
        assert!(token.is_cancelled());
        tracker.mark_cancelled(&id, None);
        assert_eq!(tracker.get_job(&id).unwrap().status, JobStatus::Cancelled);
        assert_eq!(tracker.running_count(), 0);
    }

    #[test]
    fn test_failure_is_logged() {
        let tracker = JobTracker::new();
        let (id, _) = tracker.create_job("celestrack_tle_upload", &HashMap::new());
        tracker.fail_job(&id, "HTTP 503");
        let logs = tracker.get_logs(&id);
        assert_eq!(logs.last().unwrap().level, LogLevel::Error);
        assert_eq!(tracker.get_job(&id).unwrap().status, JobStatus::Failed);
    }
}
