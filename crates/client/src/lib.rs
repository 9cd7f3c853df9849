//! Client library for the image upscaling backend.
//!
//! Provides the REST wrappers, the per-job WebSocket progress channel,
//! deferred server-side cleanup and the orchestrator that ties them into
//! the submit / track / retrieve / dispose protocol.

pub mod api;
pub mod channel;
pub mod cleanup;
pub mod config;
pub mod events;
pub mod messages;
pub mod orchestrator;
