//! Repository traits for the satellite visibility store.
//!
//! The storage contract is split per aggregate; [`FullRepository`] bundles
//! them for components that need the whole store.

pub mod error;
pub mod mapping;
pub mod satellite;
pub mod tile;
pub mod tle;

use async_trait::async_trait;

pub use error::{ErrorContext, RepositoryError, RepositoryResult};
pub use mapping::MappingRepository;
pub use satellite::SatelliteRepository;
pub use tile::TileRepository;
pub use tle::TleRepository;

/// Every repository trait plus a health check.
#[async_trait]
pub trait FullRepository:
    SatelliteRepository + TleRepository + TileRepository + MappingRepository
{
    /// Check that the backend is reachable.
    async fn health_check(&self) -> RepositoryResult<bool>;
}
