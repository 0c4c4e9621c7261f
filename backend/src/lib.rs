//! # Satellite Visibility Backend
//!
//! Works out which satellites can be seen from which ground tiles, both as
//! precomputed batches and on demand for a user location.
//!
//! ## Architecture
//!
//! The crate is organized into several logical modules:
//!
//! - [`models`]: Tiles, TLEs, satellites, mappings and request/record types
//! - [`algorithms`]: Geodesy, polygons and the global tile grid
//! - [`propagation`]: SGP4 adapter and horizon geometry
//! - [`db`]: Repository traits and the in-memory backend
//! - [`cache`]: Key/value and pub/sub contract with an in-memory bus
//! - [`services`]: Visibility engine, mapping pipeline, TLE store, real-time service
//! - [`tasks`]: Named task handlers and the registry that runs them
//! - [`config`] / [`app`]: TOML configuration and the composition root
//!
//! ```text
//! generate_tiles ──► tiles ─┐
//!                           ├─► mapping pipeline ──► tile/satellite mappings
//! celestrack_tle_upload ──► TLE store ─┘                     │
//!                                                           ▼
//! visibility_requests ──► real-time service ──► user_visibilities_event:<uid>
//! ```

// Allow large error types - RepositoryError contains rich context for debugging
#![allow(clippy::result_large_err)]

pub mod algorithms;
pub mod app;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod propagation;
pub mod services;
pub mod tasks;
