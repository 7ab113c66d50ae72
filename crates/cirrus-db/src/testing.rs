// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use cirrus_profiles::Platform;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::error::{DbError, Result};
use crate::job::JobStore;
use crate::lock::JobLockStore;
use crate::schema::run_migrations;
use crate::store::Store;
use crate::types::{Cluster, ClusterId, ClusterStatus, Job, JobId, JobLock, JobType};

/// An in-memory pool with the schema applied.
///
/// A single connection, because each `:memory:` connection is its own database.
pub async fn create_test_pool() -> SqlitePool {
	let pool = SqlitePoolOptions::new()
		.max_connections(1)
		.idle_timeout(None)
		.max_lifetime(None)
		.connect("sqlite::memory:")
		.await
		.unwrap();
	run_migrations(&pool).await.unwrap();
	pool
}

/// A file-backed WAL pool for tests that need several connections at once.
pub async fn create_file_test_pool(path: &Path) -> SqlitePool {
	let options = SqliteConnectOptions::new()
		.filename(path)
		.create_if_missing(true)
		.journal_mode(SqliteJournalMode::Wal);
	let pool = SqlitePoolOptions::new()
		.max_connections(4)
		.connect_with(options)
		.await
		.unwrap();
	run_migrations(&pool).await.unwrap();
	pool
}

/// SQLite stores over a fresh in-memory database.
pub async fn create_test_store() -> Store {
	Store::sqlite(create_test_pool().await)
}

pub fn make_cluster(name: &str, now: DateTime<Utc>) -> Cluster {
	Cluster {
		id: ClusterId::new(),
		name: name.to_string(),
		platform: Platform::Aws,
		version: "4.20.3".to_string(),
		profile: "aws-minimal-test".to_string(),
		region: "us-east-1".to_string(),
		base_domain: "example.com".to_string(),
		owner: "alice".to_string(),
		team: "platform".to_string(),
		cost_center: "cc-100".to_string(),
		status: ClusterStatus::Pending,
		ttl_hours: 24,
		destroy_at: Some(now + Duration::hours(24)),
		request_tags: BTreeMap::new(),
		effective_tags: BTreeMap::from([("ManagedBy".to_string(), "cirrus".to_string())]),
		offhours_opt_in: false,
		created_at: now,
		updated_at: now,
	}
}

pub fn make_job(cluster_id: ClusterId, job_type: JobType, now: DateTime<Utc>) -> Job {
	Job::new(cluster_id, job_type, 3, serde_json::json!({}), now)
}

fn outage() -> DbError {
	DbError::Query(sqlx::Error::PoolTimedOut)
}

fn take_failure(remaining: &AtomicUsize) -> bool {
	remaining
		.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
		.is_ok()
}

/// Wraps a lock store so that the first `failures` releases return an error.
pub struct FlakyLocks {
	inner: Arc<dyn JobLockStore>,
	release_failures: AtomicUsize,
}

impl FlakyLocks {
	pub fn wrap(store: &mut Store, failures: usize) {
		store.locks = Arc::new(Self {
			inner: Arc::clone(&store.locks),
			release_failures: AtomicUsize::new(failures),
		});
	}
}

#[async_trait]
impl JobLockStore for FlakyLocks {
	async fn acquire(
		&self,
		cluster_id: ClusterId,
		job_id: JobId,
		worker_id: &str,
		lease: Duration,
		now: DateTime<Utc>,
	) -> Result<bool> {
		self.inner.acquire(cluster_id, job_id, worker_id, lease, now).await
	}

	async fn release(&self, cluster_id: ClusterId, job_id: JobId) -> Result<bool> {
		if take_failure(&self.release_failures) {
			return Err(outage());
		}
		self.inner.release(cluster_id, job_id).await
	}

	async fn renew(
		&self,
		cluster_id: ClusterId,
		job_id: JobId,
		worker_id: &str,
		lease: Duration,
		now: DateTime<Utc>,
	) -> Result<bool> {
		self.inner.renew(cluster_id, job_id, worker_id, lease, now).await
	}

	async fn get(&self, cluster_id: ClusterId) -> Result<Option<JobLock>> {
		self.inner.get(cluster_id).await
	}

	async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64> {
		self.inner.cleanup_expired(now).await
	}
}

/// Wraps a job store so that the first `failures` calls to `mark_running`
/// return an error without touching the database.
pub struct FlakyJobs {
	inner: Arc<dyn JobStore>,
	mark_running_failures: AtomicUsize,
}

impl FlakyJobs {
	pub fn wrap(store: &mut Store, failures: usize) {
		store.jobs = Arc::new(Self {
			inner: Arc::clone(&store.jobs),
			mark_running_failures: AtomicUsize::new(failures),
		});
	}
}

#[async_trait]
impl JobStore for FlakyJobs {
	async fn create(&self, job: &Job) -> Result<()> {
		self.inner.create(job).await
	}

	async fn get(&self, id: JobId) -> Result<Option<Job>> {
		self.inner.get(id).await
	}

	async fn list_by_cluster_id(&self, cluster_id: ClusterId) -> Result<Vec<Job>> {
		self.inner.list_by_cluster_id(cluster_id).await
	}

	async fn list_claimable(&self, limit: u32, now: DateTime<Utc>) -> Result<Vec<Job>> {
		self.inner.list_claimable(limit, now).await
	}

	async fn mark_running(&self, id: JobId, worker_id: &str, now: DateTime<Utc>) -> Result<bool> {
		if take_failure(&self.mark_running_failures) {
			return Err(outage());
		}
		self.inner.mark_running(id, worker_id, now).await
	}

	async fn mark_succeeded(
		&self,
		id: JobId,
		metadata: &serde_json::Value,
		now: DateTime<Utc>,
	) -> Result<bool> {
		self.inner.mark_succeeded(id, metadata, now).await
	}

	async fn mark_retrying(
		&self,
		id: JobId,
		attempt: u32,
		code: &str,
		message: &str,
		retry_after: DateTime<Utc>,
		now: DateTime<Utc>,
	) -> Result<bool> {
		self
			.inner
			.mark_retrying(id, attempt, code, message, retry_after, now)
			.await
	}

	async fn mark_failed(
		&self,
		id: JobId,
		attempt: Option<u32>,
		code: &str,
		message: &str,
		now: DateTime<Utc>,
	) -> Result<bool> {
		self.inner.mark_failed(id, attempt, code, message, now).await
	}

	async fn requeue_due(&self, now: DateTime<Utc>) -> Result<u64> {
		self.inner.requeue_due(now).await
	}

	async fn get_stuck_jobs(&self, threshold: Duration, now: DateTime<Utc>) -> Result<Vec<Job>> {
		self.inner.get_stuck_jobs(threshold, now).await
	}

	async fn has_active_job(&self, cluster_id: ClusterId, types: &[JobType]) -> Result<bool> {
		self.inner.has_active_job(cluster_id, types).await
	}

	async fn find_active_job(
		&self,
		cluster_id: ClusterId,
		types: &[JobType],
	) -> Result<Option<Job>> {
		self.inner.find_active_job(cluster_id, types).await
	}
}
