use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{parse_required, TaskArgs, TaskDefinition, TaskHandler};
use crate::error::{ServiceError, ServiceResult};
use crate::services::realtime_visibility::RealtimeVisibilityService;

/// Serves visibility requests from the bus until cancelled.
pub struct ComputeVisibilitiesTask {
    service: RealtimeVisibilityService,
}

impl ComputeVisibilitiesTask {
    pub fn new(service: RealtimeVisibilityService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl TaskHandler for ComputeVisibilitiesTask {
    fn definition(&self) -> TaskDefinition {
        TaskDefinition {
            name: "compute_visibilities",
            description: "Answer location-based visibility requests from the message bus",
            required_args: &["defaultHorizon"],
        }
    }

    async fn run(&self, cancel: CancellationToken, args: &TaskArgs) -> ServiceResult<serde_json::Value> {
        let horizon: f64 = parse_required(args, "defaultHorizon")?;
        if !(0.0..=90.0).contains(&horizon) {
            return Err(ServiceError::validation(format!(
                "defaultHorizon must be within [0, 90], got {}",
                horizon
            )));
        }

        let stats = self
            .service
            .clone()
            .with_default_horizon(horizon)
            .run(cancel)
            .await?;
        serde_json::to_value(stats)
            .map_err(|e| ServiceError::Persistence(format!("Failed to encode listener stats: {}", e)))
    }
}
