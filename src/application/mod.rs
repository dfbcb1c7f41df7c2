//! Application layer containing the stage advancement engine.
//!
//! [`engine::JobContextManager`] handles one delivered job message per call and
//! is parameterized by a [`policy::CompletionPolicy`] that selects between the
//! multi-topic and single-queue deployments.

pub mod engine;
pub mod policy;
