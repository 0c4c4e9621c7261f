//! Service layer for visibility computation and orchestration.
//!
//! Services sit between the task layer and the storage/cache contracts. They
//! take every collaborator as a constructor argument; the composition root in
//! [`crate::app`] wires them together.

pub mod catalogue;
pub mod job_tracker;
pub mod mapping_pipeline;
pub mod realtime_visibility;
pub mod tle_store;
pub mod visibility_engine;

pub use catalogue::{parse_three_line_elements, CatalogueClient, CatalogueEntry, CelestrakClient};
pub use job_tracker::{Job, JobStatus, JobTracker, LogLevel};
pub use mapping_pipeline::{
    MappingBatcher, MappingJob, MappingPipeline, MappingRunReport, PipelineConfig, TimeStepPolicy,
};
pub use realtime_visibility::{RealtimeStats, RealtimeVisibilityService};
pub use tle_store::TleStore;
pub use visibility_engine::{PassOutcome, ScanState, TileTarget, VisibilityEngine, VisibilityWindow};
