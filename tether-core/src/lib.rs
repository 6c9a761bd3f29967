//! Tether Core
//!
//! Core types shared by the Tether orchestrator and its clients.
//!
//! This crate contains:
//! - Domain types: jobs, output chunks, task ownership and cursor state
//! - DTOs: request/response bodies for the task polling and runner APIs

pub mod domain;
pub mod dto;
