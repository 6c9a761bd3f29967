//! Core domain types
//!
//! These types are shared between the orchestrator (which persists them) and
//! the clients that submit, poll, or execute jobs.

pub mod job;
pub mod output;
pub mod task;
