//! Domain model for multi-stage image upscaling jobs.
//!
//! Pure types and validation only: no I/O and no async. The
//! `upscale-client` crate drives these types through the backend.

pub mod asset;
pub mod descriptor;
pub mod error;
pub mod job;
pub mod naming;
pub mod stages;
pub mod types;
