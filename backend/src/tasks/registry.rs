//! Name to handler dispatch with background job tracking.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use super::{TaskArgs, TaskDefinition, TaskHandler};
use crate::error::{ServiceError, ServiceResult};
use crate::services::job_tracker::{JobTracker, LogLevel};

#[derive(Clone, Default)]
pub struct TaskRegistry {
    handlers: BTreeMap<String, Arc<dyn TaskHandler>>,
    jobs: JobTracker,
}

impl TaskRegistry {
    pub fn new(jobs: JobTracker) -> Self {
        Self {
            handlers: BTreeMap::new(),
            jobs,
        }
    }

    /// Register a handler under its definition name, replacing any previous one.
    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) {
        let name = handler.definition().name.to_string();
        if self.handlers.insert(name.clone(), handler).is_some() {
            warn!("Task {} registered twice, keeping the last handler", name);
        }
    }

    pub fn with(mut self, handler: Arc<dyn TaskHandler>) -> Self {
        self.register(handler);
        self
    }

    pub fn definitions(&self) -> Vec<TaskDefinition> {
        self.handlers.values().map(|h| h.definition()).collect()
    }

    pub fn jobs(&self) -> &JobTracker {
        &self.jobs
    }

    /// Look up a handler by task name.
    pub fn handler(&self, name: &str) -> ServiceResult<Arc<dyn TaskHandler>> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("task not found: [{}]", name)))
    }

    /// Validate the arguments and run the task in the caller's task.
    pub async fn process(
        &self,
        name: &str,
        args: &TaskArgs,
        cancel: CancellationToken,
    ) -> ServiceResult<serde_json::Value> {
        let handler = self.handler(name)?;
        handler.definition().validate_args(args)?;
        info!("Running task {}", name);
        handler.run(cancel, args).await
    }

    /// Validate the arguments and run the task in the background.
    ///
    /// Lookup and argument errors are returned immediately; the outcome of
    /// the run itself is recorded in the job tracker.
    ///
    /// # Returns
    /// * `Ok(job_id)` - ID of the job tracking the run
    pub fn spawn(&self, name: &str, args: TaskArgs) -> ServiceResult<String> {
        let handler = self.handler(name)?;
        handler.definition().validate_args(&args)?;

        let (job_id, cancel) = self.jobs.create_job(name, &args);
        let jobs = self.jobs.clone();
        let id = job_id.clone();
        let task = name.to_string();
        jobs.log(&job_id, LogLevel::Info, format!("Task {} started", task));

        tokio::spawn(async move {
            let run = {
                let cancel = cancel.clone();
                tokio::spawn(async move { handler.run(cancel, &args).await })
            };
            let outcome = match run.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Task {} aborted: {}", task, e);
                    jobs.log(&id, LogLevel::Error, format!("Task {} aborted: {}", task, e));
                    jobs.fail_job(&id, format!("task aborted: {}", e));
                    return;
                }
            };
            match outcome {
                Ok(result) if cancel.is_cancelled() => {
                    jobs.log(&id, LogLevel::Warning, format!("Task {} cancelled", task));
                    jobs.mark_cancelled(&id, Some(result));
                }
                Ok(result) => {
                    jobs.log(&id, LogLevel::Success, format!("Task {} completed", task));
                    jobs.complete_job(&id, Some(result));
                }
                Err(ServiceError::Cancelled) => {
                    jobs.log(&id, LogLevel::Warning, format!("Task {} cancelled", task));
                    jobs.mark_cancelled(&id, None);
                }
                Err(e) => {
                    error!("Task {} failed: {}", task, e);
                    jobs.fail_job(&id, e.to_string());
                }
            }
        });
        Ok(job_id)
    }
}
