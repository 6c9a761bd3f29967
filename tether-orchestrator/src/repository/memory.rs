//! In-memory stores
//!
//! Process-local implementation of every repository trait, used by the
//! `memory` store backend and by tests. Each map sits behind its own mutex,
//! and every operation (the cursor CAS included) completes under a single
//! guard, so each one is atomic.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tether_core::domain::job::{Job, JobResult, JobStatus};
use tether_core::domain::output::{FinalOutput, OutputSlice};
use tether_core::domain::task::{CursorState, OwnershipRecord};
use tether_core::dto::job::CreateJob;
use uuid::Uuid;

use super::{
    CursorRepository, JobRepository, OwnershipRepository, ResultRepository, StoreResult,
    expiry_from_now,
};

type Expiring<T> = (T, chrono::DateTime<chrono::Utc>);

struct StoredJob {
    job: Job,
    output: Vec<serde_json::Value>,
}

#[derive(Default)]
pub struct MemoryStore {
    owners: Mutex<HashMap<Uuid, Expiring<OwnershipRecord>>>,
    cursors: Mutex<HashMap<(Uuid, String), Expiring<CursorState>>>,
    jobs: Mutex<HashMap<Uuid, StoredJob>>,
    results: Mutex<HashMap<Uuid, FinalOutput>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn is_live(expires_at: &chrono::DateTime<chrono::Utc>) -> bool {
    *expires_at > chrono::Utc::now()
}

#[async_trait]
impl OwnershipRepository for MemoryStore {
    async fn record(&self, record: &OwnershipRecord, ttl: Duration) -> StoreResult<()> {
        lock(&self.owners).insert(record.job_id, (record.clone(), expiry_from_now(ttl)));
        Ok(())
    }

    async fn find(&self, job_id: Uuid) -> StoreResult<Option<OwnershipRecord>> {
        Ok(lock(&self.owners)
            .get(&job_id)
            .filter(|(_, expires_at)| is_live(expires_at))
            .map(|(record, _)| record.clone()))
    }

    async fn purge_expired(&self) -> StoreResult<u64> {
        let mut owners = lock(&self.owners);
        let before = owners.len();
        owners.retain(|_, (_, expires_at)| is_live(expires_at));
        Ok((before - owners.len()) as u64)
    }
}

#[async_trait]
impl CursorRepository for MemoryStore {
    async fn initialize(
        &self,
        job_id: Uuid,
        session_hash: &str,
        state: &CursorState,
        ttl: Duration,
    ) -> StoreResult<()> {
        lock(&self.cursors).insert(
            (job_id, session_hash.to_string()),
            (state.clone(), expiry_from_now(ttl)),
        );
        Ok(())
    }

    async fn read(&self, job_id: Uuid, session_hash: &str) -> StoreResult<Option<CursorState>> {
        Ok(lock(&self.cursors)
            .get(&(job_id, session_hash.to_string()))
            .filter(|(_, expires_at)| is_live(expires_at))
            .map(|(state, _)| state.clone()))
    }

    async fn compare_and_swap(
        &self,
        job_id: Uuid,
        session_hash: &str,
        expected: &CursorState,
        next: &CursorState,
        ttl: Duration,
    ) -> StoreResult<bool> {
        let mut cursors = lock(&self.cursors);
        let Some(entry) = cursors.get_mut(&(job_id, session_hash.to_string())) else {
            return Ok(false);
        };

        if !is_live(&entry.1) || entry.0 != *expected {
            return Ok(false);
        }

        *entry = (next.clone(), expiry_from_now(ttl));
        Ok(true)
    }

    async fn purge_expired(&self) -> StoreResult<u64> {
        let mut cursors = lock(&self.cursors);
        let before = cursors.len();
        cursors.retain(|_, (_, expires_at)| is_live(expires_at));
        Ok((before - cursors.len()) as u64)
    }
}

#[async_trait]
impl JobRepository for MemoryStore {
    async fn submit(&self, req: CreateJob) -> StoreResult<Job> {
        let job = Job {
            id: Uuid::new_v4(),
            caller_id: req.caller_id,
            status: JobStatus::Queued,
            requested_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
            runner_id: None,
            parameters: req.parameters,
            result: None,
        };

        lock(&self.jobs).insert(
            job.id,
            StoredJob {
                job: job.clone(),
                output: Vec::new(),
            },
        );

        Ok(job)
    }

    async fn find(&self, job_id: Uuid) -> StoreResult<Option<Job>> {
        Ok(lock(&self.jobs).get(&job_id).map(|stored| stored.job.clone()))
    }

    async fn list_by_status(&self, status: JobStatus) -> StoreResult<Vec<Job>> {
        let mut jobs: Vec<Job> = lock(&self.jobs)
            .values()
            .filter(|stored| stored.job.status == status)
            .map(|stored| stored.job.clone())
            .collect();
        jobs.sort_by_key(|job| job.requested_at);
        Ok(jobs)
    }

    async fn mark_running(&self, job_id: Uuid, runner_id: &str) -> StoreResult<bool> {
        let mut jobs = lock(&self.jobs);
        match jobs.get_mut(&job_id) {
            Some(stored) if stored.job.status == JobStatus::Queued => {
                stored.job.status = JobStatus::Running;
                stored.job.started_at = Some(chrono::Utc::now());
                stored.job.runner_id = Some(runner_id.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete(
        &self,
        job_id: Uuid,
        status: JobStatus,
        result: Option<JobResult>,
    ) -> StoreResult<bool> {
        let mut jobs = lock(&self.jobs);
        let Some(stored) = jobs.get_mut(&job_id) else {
            return Ok(false);
        };
        if stored.job.status.is_terminal() {
            return Ok(false);
        }

        stored.job.status = status;
        stored.job.completed_at = Some(chrono::Utc::now());
        stored.job.result = result;
        Ok(true)
    }

    async fn append_output(
        &self,
        job_id: Uuid,
        chunks: Vec<serde_json::Value>,
    ) -> StoreResult<Option<u64>> {
        let mut jobs = lock(&self.jobs);
        let Some(stored) = jobs.get_mut(&job_id) else {
            return Ok(None);
        };
        if stored.job.status.is_terminal() {
            return Ok(None);
        }

        stored.output.extend(chunks);
        Ok(Some(stored.output.len() as u64))
    }

    async fn read_output(
        &self,
        job_id: Uuid,
        since: u64,
        limit: usize,
    ) -> StoreResult<OutputSlice> {
        let jobs = lock(&self.jobs);
        let Some(stored) = jobs.get(&job_id) else {
            return Ok(OutputSlice::empty(since));
        };

        let start = usize::try_from(since).unwrap_or(usize::MAX);
        let units: Vec<serde_json::Value> = stored
            .output
            .iter()
            .skip(start)
            .take(limit)
            .cloned()
            .collect();
        let next_cursor = since + units.len() as u64;

        Ok(OutputSlice { units, next_cursor })
    }
}

#[async_trait]
impl ResultRepository for MemoryStore {
    async fn insert_if_absent(
        &self,
        job_id: Uuid,
        output: &FinalOutput,
    ) -> StoreResult<FinalOutput> {
        Ok(lock(&self.results)
            .entry(job_id)
            .or_insert_with(|| output.clone())
            .clone())
    }

    async fn find(&self, job_id: Uuid) -> StoreResult<Option<FinalOutput>> {
        Ok(lock(&self.results).get(&job_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TTL: Duration = Duration::from_secs(60);

    fn state(cursor: u64, signature: &str) -> CursorState {
        CursorState {
            cursor,
            signature: signature.to_string(),
        }
    }

    fn owner(job_id: Uuid) -> OwnershipRecord {
        OwnershipRecord {
            job_id,
            caller_id: "user-1".to_string(),
            session_hash: "hash-1".to_string(),
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_ownership_record_and_find() {
        let store = MemoryStore::new();
        let job_id = Uuid::new_v4();

        assert!(OwnershipRepository::find(&store, job_id).await.unwrap().is_none());

        let record = owner(job_id);
        store.record(&record, TTL).await.unwrap();

        let found = OwnershipRepository::find(&store, job_id).await.unwrap();
        assert_eq!(found, Some(record));
    }

    #[tokio::test]
    async fn test_expired_ownership_reads_as_absent_and_is_purged() {
        let store = MemoryStore::new();
        let job_id = Uuid::new_v4();

        store.record(&owner(job_id), Duration::ZERO).await.unwrap();

        assert!(OwnershipRepository::find(&store, job_id).await.unwrap().is_none());
        assert_eq!(OwnershipRepository::purge_expired(&store).await.unwrap(), 1);
        assert_eq!(OwnershipRepository::purge_expired(&store).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cas_swaps_on_exact_match() {
        let store = MemoryStore::new();
        let job_id = Uuid::new_v4();
        store.initialize(job_id, "s", &state(0, "t0"), TTL).await.unwrap();

        let swapped = store
            .compare_and_swap(job_id, "s", &state(0, "t0"), &state(3, "t1"), TTL)
            .await
            .unwrap();

        assert!(swapped);
        assert_eq!(store.read(job_id, "s").await.unwrap(), Some(state(3, "t1")));
    }

    #[tokio::test]
    async fn test_cas_requires_cursor_and_signature() {
        let store = MemoryStore::new();
        let job_id = Uuid::new_v4();
        store.initialize(job_id, "s", &state(0, "t0"), TTL).await.unwrap();

        // Same cursor, different signature
        assert!(
            !store
                .compare_and_swap(job_id, "s", &state(0, "old"), &state(3, "t1"), TTL)
                .await
                .unwrap()
        );
        // Same signature, different cursor
        assert!(
            !store
                .compare_and_swap(job_id, "s", &state(1, "t0"), &state(3, "t1"), TTL)
                .await
                .unwrap()
        );
        assert_eq!(store.read(job_id, "s").await.unwrap(), Some(state(0, "t0")));
    }

    #[tokio::test]
    async fn test_cas_on_absent_or_expired_state_fails() {
        let store = MemoryStore::new();
        let job_id = Uuid::new_v4();

        assert!(
            !store
                .compare_and_swap(job_id, "s", &state(0, "t0"), &state(1, "t1"), TTL)
                .await
                .unwrap()
        );

        store
            .initialize(job_id, "s", &state(0, "t0"), Duration::ZERO)
            .await
            .unwrap();
        assert!(store.read(job_id, "s").await.unwrap().is_none());
        assert!(
            !store
                .compare_and_swap(job_id, "s", &state(0, "t0"), &state(1, "t1"), TTL)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_cursor_state_is_per_session() {
        let store = MemoryStore::new();
        let job_id = Uuid::new_v4();
        store.initialize(job_id, "a", &state(0, "ta"), TTL).await.unwrap();
        store.initialize(job_id, "b", &state(0, "tb"), TTL).await.unwrap();

        store
            .compare_and_swap(job_id, "a", &state(0, "ta"), &state(5, "ta2"), TTL)
            .await
            .unwrap();

        assert_eq!(store.read(job_id, "b").await.unwrap(), Some(state(0, "tb")));
    }

    #[tokio::test]
    async fn test_output_log_reads_past_cursor() {
        let store = MemoryStore::new();
        let job = store
            .submit(CreateJob {
                caller_id: "user-1".to_string(),
                parameters: Default::default(),
            })
            .await
            .unwrap();

        let len = store
            .append_output(job.id, vec![json!(1), json!(2), json!(3)])
            .await
            .unwrap();
        assert_eq!(len, Some(3));

        let slice = store.read_output(job.id, 1, 10).await.unwrap();
        assert_eq!(slice.units, vec![json!(2), json!(3)]);
        assert_eq!(slice.next_cursor, 3);

        let limited = store.read_output(job.id, 0, 2).await.unwrap();
        assert_eq!(limited.next_cursor, 2);

        let drained = store.read_output(job.id, 3, 10).await.unwrap();
        assert!(drained.units.is_empty());
        assert_eq!(drained.next_cursor, 3);
    }

    #[tokio::test]
    async fn test_append_to_missing_job() {
        let store = MemoryStore::new();
        assert_eq!(
            store.append_output(Uuid::new_v4(), vec![json!(1)]).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_mark_running_only_from_queued() {
        let store = MemoryStore::new();
        let job = store
            .submit(CreateJob {
                caller_id: "user-1".to_string(),
                parameters: Default::default(),
            })
            .await
            .unwrap();

        assert!(store.mark_running(job.id, "runner-1").await.unwrap());
        assert!(!store.mark_running(job.id, "runner-2").await.unwrap());

        let job = JobRepository::find(&store, job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.runner_id.as_deref(), Some("runner-1"));
    }

    #[tokio::test]
    async fn test_finished_job_is_closed() {
        let store = MemoryStore::new();
        let job = store
            .submit(CreateJob {
                caller_id: "user-1".to_string(),
                parameters: Default::default(),
            })
            .await
            .unwrap();
        store.append_output(job.id, vec![json!(1)]).await.unwrap();

        assert!(store.complete(job.id, JobStatus::Succeeded, None).await.unwrap());
        assert!(!store.complete(job.id, JobStatus::Failed, None).await.unwrap());
        assert_eq!(store.append_output(job.id, vec![json!(2)]).await.unwrap(), None);

        let job = JobRepository::find(&store, job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
        let slice = store.read_output(job.id, 0, 10).await.unwrap();
        assert_eq!(slice.units, vec![json!(1)]);
    }

    #[tokio::test]
    async fn test_result_first_write_wins() {
        let store = MemoryStore::new();
        let job_id = Uuid::new_v4();
        let first = FinalOutput {
            text: "first".to_string(),
            artifacts: vec![],
        };
        let second = FinalOutput {
            text: "second".to_string(),
            artifacts: vec![],
        };

        assert_eq!(store.insert_if_absent(job_id, &first).await.unwrap(), first);
        assert_eq!(store.insert_if_absent(job_id, &second).await.unwrap(), first);
    }
}
