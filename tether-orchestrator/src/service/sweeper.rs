//! Expiry sweeper
//!
//! Periodically deletes expired ownership and cursor records. Reads already
//! ignore expired rows, so this only keeps the tables from growing.

use tokio::time::{self, MissedTickBehavior};

use crate::repository::bounded;
use crate::state::AppState;

/// Spawns the sweep loop on the current runtime
pub fn spawn_sweeper(state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(
            "Starting expiry sweeper (interval: {:?})",
            state.config.sweep_interval
        );

        let mut interval = time::interval(state.config.sweep_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            sweep_once(&state).await;
        }
    })
}

/// Runs one sweep, returning how many (ownership, cursor) records were removed
pub async fn sweep_once(state: &AppState) -> (u64, u64) {
    let timeout = state.config.store_timeout;

    let owners = match bounded(timeout, "ownership purge", state.stores.owners.purge_expired()).await {
        Ok(count) => count,
        Err(err) => {
            tracing::error!("Failed to purge expired ownership records: {}", err);
            0
        }
    };

    let cursors = match bounded(timeout, "cursor purge", state.stores.cursors.purge_expired()).await {
        Ok(count) => count,
        Err(err) => {
            tracing::error!("Failed to purge expired cursor states: {}", err);
            0
        }
    };

    if owners > 0 || cursors > 0 {
        tracing::info!(
            "Purged {} ownership record(s) and {} cursor state(s)",
            owners,
            cursors
        );
    } else {
        tracing::debug!("Nothing to purge");
    }

    (owners, cursors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tether_core::dto::task::SubmitTask;

    use crate::config::Config;
    use crate::repository::Stores;
    use crate::service::task_service;

    #[tokio::test]
    async fn test_sweep_removes_only_expired_records() {
        let mut config = Config::new("test-signing-secret".to_string());
        config.owner_ttl = Duration::from_millis(50);
        let state = AppState::new(Stores::in_memory(), config).unwrap();

        task_service::submit_task(&state, "user-1", "session-a", SubmitTask::default())
            .await
            .unwrap();
        assert_eq!(sweep_once(&state).await, (0, 0));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sweep_once(&state).await, (1, 1));
        assert_eq!(sweep_once(&state).await, (0, 0));
    }
}
