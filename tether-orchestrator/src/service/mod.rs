//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services orchestrate between repositories and contain domain logic.

pub mod finalize;
pub mod job;
pub mod sweeper;
pub mod task;

// Re-export for convenience
pub use job as job_service;
pub use task as task_service;
