//! Security Module
//!
//! Cursor token signing and session identity helpers used by the task
//! polling protocol.

pub mod cursor_token;
pub mod session;

pub use cursor_token::{CursorClaims, CursorSigner, SigningError};
