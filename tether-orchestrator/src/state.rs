//! Shared application state
//!
//! Handed to every handler and service call. Cloning is cheap: every field is
//! reference counted.

use std::sync::Arc;

use crate::config::Config;
use crate::repository::Stores;
use crate::security::{CursorSigner, SigningError};

#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub signer: Arc<CursorSigner>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Builds the state, failing if the signing secret is unusable
    pub fn new(stores: Stores, config: Config) -> Result<Self, SigningError> {
        let signer = CursorSigner::new(&config.signing_secret, config.cursor_token_ttl)?;
        Ok(Self {
            stores,
            signer: Arc::new(signer),
            config: Arc::new(config),
        })
    }
}

#[cfg(test)]
pub(crate) const TEST_RUNNER_TOKEN: &str = "test-runner-token";

#[cfg(test)]
impl AppState {
    /// In-memory state with a fixed test secret
    pub(crate) fn for_tests() -> Self {
        let mut config = Config::new("test-signing-secret".to_string());
        config.runner_token = Some(TEST_RUNNER_TOKEN.to_string());
        match Self::new(Stores::in_memory(), config) {
            Ok(state) => state,
            Err(err) => panic!("test state: {}", err),
        }
    }
}
