//! Data Transfer Objects
//!
//! Request and response bodies exchanged between the orchestrator and its
//! clients. `job` covers the runner-facing endpoints, `task` the
//! browser-facing submission and polling endpoints.

pub mod job;
pub mod task;
