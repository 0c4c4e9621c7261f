//! Repository implementations module.
//!
//! - `local`: In-memory implementation for unit testing, local development
//!   and the standalone worker
pub mod local;

pub use local::LocalRepository;
