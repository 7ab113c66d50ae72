// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-cluster job leases.
//!
//! A cluster has at most one row in `job_locks`. A row whose `expires_at` has
//! passed is dead and may be taken over by the next `acquire`; live rows can
//! only be touched by their holder.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use crate::error::{DbError, Result};
use crate::types::{decode_ts, encode_ts, parse_column, ClusterId, JobId, JobLock};

#[derive(Clone)]
pub struct JobLockRepository {
	pool: SqlitePool,
}

impl JobLockRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Takes the lease on `cluster_id` if nobody holds a live one.
	///
	/// A single upsert: the insert succeeds when no row exists, and the
	/// conflict branch only fires on an expired row. Two callers racing for
	/// the same cluster cannot both see `true`.
	#[tracing::instrument(skip(self), fields(cluster_id = %cluster_id, job_id = %job_id))]
	pub async fn acquire(
		&self,
		cluster_id: ClusterId,
		job_id: JobId,
		worker_id: &str,
		lease: Duration,
		now: DateTime<Utc>,
	) -> Result<bool> {
		let result = sqlx::query(
			r#"
			INSERT INTO job_locks (cluster_id, job_id, locked_by, locked_at, expires_at)
			VALUES (?, ?, ?, ?, ?)
			ON CONFLICT(cluster_id) DO UPDATE SET
				job_id = excluded.job_id,
				locked_by = excluded.locked_by,
				locked_at = excluded.locked_at,
				expires_at = excluded.expires_at
			WHERE job_locks.expires_at <= excluded.locked_at
			"#,
		)
		.bind(cluster_id.to_string())
		.bind(job_id.to_string())
		.bind(worker_id)
		.bind(encode_ts(now))
		.bind(encode_ts(now + lease))
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() == 1)
	}

	/// Drops the lease, but only if `job_id` still holds it.
	#[tracing::instrument(skip(self), fields(cluster_id = %cluster_id, job_id = %job_id))]
	pub async fn release(&self, cluster_id: ClusterId, job_id: JobId) -> Result<bool> {
		let result = sqlx::query("DELETE FROM job_locks WHERE cluster_id = ? AND job_id = ?")
			.bind(cluster_id.to_string())
			.bind(job_id.to_string())
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected() == 1)
	}

	/// Pushes `expires_at` out to `now + lease` for a live lease held by this
	/// worker and job. Returns `false` if the lease was lost.
	#[tracing::instrument(skip(self), fields(cluster_id = %cluster_id, job_id = %job_id))]
	pub async fn renew(
		&self,
		cluster_id: ClusterId,
		job_id: JobId,
		worker_id: &str,
		lease: Duration,
		now: DateTime<Utc>,
	) -> Result<bool> {
		let result = sqlx::query(
			r#"
			UPDATE job_locks SET expires_at = ?
			WHERE cluster_id = ? AND job_id = ? AND locked_by = ? AND expires_at > ?
			"#,
		)
		.bind(encode_ts(now + lease))
		.bind(cluster_id.to_string())
		.bind(job_id.to_string())
		.bind(worker_id)
		.bind(encode_ts(now))
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() == 1)
	}

	/// The current row for the cluster, live or not.
	#[tracing::instrument(skip(self), fields(cluster_id = %cluster_id))]
	pub async fn get(&self, cluster_id: ClusterId) -> Result<Option<JobLock>> {
		let row = sqlx::query_as::<_, (String, String, String, String, String)>(
			"SELECT cluster_id, job_id, locked_by, locked_at, expires_at FROM job_locks WHERE cluster_id = ?",
		)
		.bind(cluster_id.to_string())
		.fetch_optional(&self.pool)
		.await?;

		row
			.map(|(cluster_id, job_id, locked_by, locked_at, expires_at)| {
				Ok::<_, DbError>(JobLock {
					cluster_id: parse_column("cluster id", &cluster_id)?,
					job_id: parse_column("job id", &job_id)?,
					locked_by,
					locked_at: decode_ts("locked_at", &locked_at)?,
					expires_at: decode_ts("expires_at", &expires_at)?,
				})
			})
			.transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64> {
		let result = sqlx::query("DELETE FROM job_locks WHERE expires_at <= ?")
			.bind(encode_ts(now))
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}
}

#[async_trait]
pub trait JobLockStore: Send + Sync {
	async fn acquire(
		&self,
		cluster_id: ClusterId,
		job_id: JobId,
		worker_id: &str,
		lease: Duration,
		now: DateTime<Utc>,
	) -> Result<bool>;
	async fn release(&self, cluster_id: ClusterId, job_id: JobId) -> Result<bool>;
	async fn renew(
		&self,
		cluster_id: ClusterId,
		job_id: JobId,
		worker_id: &str,
		lease: Duration,
		now: DateTime<Utc>,
	) -> Result<bool>;
	async fn get(&self, cluster_id: ClusterId) -> Result<Option<JobLock>>;
	async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
impl JobLockStore for JobLockRepository {
	async fn acquire(
		&self,
		cluster_id: ClusterId,
		job_id: JobId,
		worker_id: &str,
		lease: Duration,
		now: DateTime<Utc>,
	) -> Result<bool> {
		self.acquire(cluster_id, job_id, worker_id, lease, now).await
	}

	async fn release(&self, cluster_id: ClusterId, job_id: JobId) -> Result<bool> {
		self.release(cluster_id, job_id).await
	}

	async fn renew(
		&self,
		cluster_id: ClusterId,
		job_id: JobId,
		worker_id: &str,
		lease: Duration,
		now: DateTime<Utc>,
	) -> Result<bool> {
		self.renew(cluster_id, job_id, worker_id, lease, now).await
	}

	async fn get(&self, cluster_id: ClusterId) -> Result<Option<JobLock>> {
		self.get(cluster_id).await
	}

	async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64> {
		self.cleanup_expired(now).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{create_file_test_pool, create_test_pool};
	use chrono::TimeZone;

	fn t0() -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
	}

	fn lease() -> Duration {
		Duration::minutes(60)
	}

	#[tokio::test]
	async fn test_acquire_blocks_second_holder() {
		let repo = JobLockRepository::new(create_test_pool().await);
		let cluster = ClusterId::new();
		let (job_a, job_b) = (JobId::new(), JobId::new());

		assert!(repo.acquire(cluster, job_a, "w1", lease(), t0()).await.unwrap());
		assert!(!repo.acquire(cluster, job_b, "w2", lease(), t0()).await.unwrap());

		let lock = repo.get(cluster).await.unwrap().unwrap();
		assert_eq!(lock.job_id, job_a);
		assert_eq!(lock.locked_by, "w1");
		assert_eq!(lock.expires_at, t0() + lease());
	}

	#[tokio::test]
	async fn test_expired_lease_can_be_taken_over() {
		let repo = JobLockRepository::new(create_test_pool().await);
		let cluster = ClusterId::new();
		let (job_a, job_b) = (JobId::new(), JobId::new());

		repo.acquire(cluster, job_a, "w1", lease(), t0()).await.unwrap();
		let later = t0() + lease();
		assert!(repo.acquire(cluster, job_b, "w2", lease(), later).await.unwrap());

		let lock = repo.get(cluster).await.unwrap().unwrap();
		assert_eq!(lock.job_id, job_b);
		assert_eq!(lock.locked_at, later);

		// The previous holder can no longer release or renew.
		assert!(!repo.release(cluster, job_a).await.unwrap());
		assert!(!repo
			.renew(cluster, job_a, "w1", lease(), later)
			.await
			.unwrap());
	}

	#[tokio::test]
	async fn test_release_only_by_holder() {
		let repo = JobLockRepository::new(create_test_pool().await);
		let cluster = ClusterId::new();
		let job = JobId::new();

		repo.acquire(cluster, job, "w1", lease(), t0()).await.unwrap();
		assert!(!repo.release(cluster, JobId::new()).await.unwrap());
		assert!(repo.release(cluster, job).await.unwrap());
		assert!(repo.get(cluster).await.unwrap().is_none());
		assert!(!repo.release(cluster, job).await.unwrap());
	}

	#[tokio::test]
	async fn test_renew_extends_live_lease() {
		let repo = JobLockRepository::new(create_test_pool().await);
		let cluster = ClusterId::new();
		let job = JobId::new();

		repo.acquire(cluster, job, "w1", lease(), t0()).await.unwrap();
		let later = t0() + Duration::minutes(20);
		assert!(repo.renew(cluster, job, "w1", lease(), later).await.unwrap());
		assert_eq!(
			repo.get(cluster).await.unwrap().unwrap().expires_at,
			later + lease()
		);

		assert!(!repo.renew(cluster, job, "w2", lease(), later).await.unwrap());
		let too_late = later + lease() + Duration::seconds(1);
		assert!(!repo
			.renew(cluster, job, "w1", lease(), too_late)
			.await
			.unwrap());
	}

	#[tokio::test]
	async fn test_cleanup_expired() {
		let repo = JobLockRepository::new(create_test_pool().await);
		let live = ClusterId::new();
		let dead = ClusterId::new();

		repo
			.acquire(dead, JobId::new(), "w1", Duration::minutes(5), t0())
			.await
			.unwrap();
		repo
			.acquire(live, JobId::new(), "w1", lease(), t0())
			.await
			.unwrap();

		let removed = repo
			.cleanup_expired(t0() + Duration::minutes(10))
			.await
			.unwrap();
		assert_eq!(removed, 1);
		assert!(repo.get(dead).await.unwrap().is_none());
		assert!(repo.get(live).await.unwrap().is_some());
	}

	#[tokio::test]
	async fn test_concurrent_acquire_has_one_winner() {
		let dir = tempfile::tempdir().unwrap();
		let pool = create_file_test_pool(&dir.path().join("locks.db")).await;
		let repo = JobLockRepository::new(pool);

		for _ in 0..10 {
			let cluster = ClusterId::new();
			let (a, b) = tokio::join!(
				repo.acquire(cluster, JobId::new(), "w1", lease(), t0()),
				repo.acquire(cluster, JobId::new(), "w2", lease(), t0()),
			);
			let wins = [a.unwrap(), b.unwrap()].iter().filter(|w| **w).count();
			assert_eq!(wins, 1);
		}
	}
}
