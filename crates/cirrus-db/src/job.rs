// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use crate::error::{DbError, Result};
use crate::types::{
	decode_opt_ts, decode_ts, encode_ts, parse_column, ClusterId, Job, JobId, JobType,
};

const JOB_COLUMNS: &str = "id, cluster_id, job_type, status, attempt, max_attempts, error_code, error_message, metadata, locked_by, created_at, started_at, ended_at, retry_after";

/// Every write below is conditional on the current status, so a transition
/// the state machine forbids updates nothing and reports `false`.
#[derive(Clone)]
pub struct JobRepository {
	pool: SqlitePool,
}

impl JobRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, job), fields(job_id = %job.id, cluster_id = %job.cluster_id, job_type = %job.job_type))]
	pub async fn create(&self, job: &Job) -> Result<()> {
		if job.attempt > job.max_attempts {
			return Err(DbError::Conflict(format!(
				"attempt {} exceeds max_attempts {}",
				job.attempt, job.max_attempts
			)));
		}

		sqlx::query(
			r#"
			INSERT INTO jobs (id, cluster_id, job_type, status, attempt, max_attempts, error_code, error_message,
				metadata, locked_by, created_at, started_at, ended_at, retry_after)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(job.id.to_string())
		.bind(job.cluster_id.to_string())
		.bind(job.job_type.as_str())
		.bind(job.status.as_str())
		.bind(job.attempt as i64)
		.bind(job.max_attempts as i64)
		.bind(&job.error_code)
		.bind(&job.error_message)
		.bind(job.metadata.to_string())
		.bind(&job.locked_by)
		.bind(encode_ts(job.created_at))
		.bind(job.started_at.map(encode_ts))
		.bind(job.ended_at.map(encode_ts))
		.bind(job.retry_after.map(encode_ts))
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self), fields(job_id = %id))]
	pub async fn get(&self, id: JobId) -> Result<Option<Job>> {
		let row = sqlx::query_as::<_, JobRow>(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"))
			.bind(id.to_string())
			.fetch_optional(&self.pool)
			.await?;

		row.map(Job::try_from).transpose()
	}

	#[tracing::instrument(skip(self), fields(cluster_id = %cluster_id))]
	pub async fn list_by_cluster_id(&self, cluster_id: ClusterId) -> Result<Vec<Job>> {
		let rows = sqlx::query_as::<_, JobRow>(&format!(
			"SELECT {JOB_COLUMNS} FROM jobs WHERE cluster_id = ? ORDER BY created_at, id"
		))
		.bind(cluster_id.to_string())
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(Job::try_from).collect()
	}

	/// PENDING jobs a worker could take right now, oldest first.
	///
	/// Only the oldest PENDING job of each cluster is listed, and clusters
	/// with a live lease are left out, so locked clusters never crowd out
	/// claimable work elsewhere.
	#[tracing::instrument(skip(self))]
	pub async fn list_claimable(&self, limit: u32, now: DateTime<Utc>) -> Result<Vec<Job>> {
		let rows = sqlx::query_as::<_, JobRow>(&format!(
			r#"
			SELECT {JOB_COLUMNS} FROM jobs j
			WHERE j.status = 'PENDING'
			  AND NOT EXISTS (
				SELECT 1 FROM job_locks l
				WHERE l.cluster_id = j.cluster_id AND l.expires_at > ?
			  )
			  AND NOT EXISTS (
				SELECT 1 FROM jobs o
				WHERE o.cluster_id = j.cluster_id
				  AND o.status = 'PENDING'
				  AND (o.created_at < j.created_at OR (o.created_at = j.created_at AND o.id < j.id))
			  )
			ORDER BY j.created_at, j.id
			LIMIT ?
			"#
		))
		.bind(encode_ts(now))
		.bind(limit as i64)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(Job::try_from).collect()
	}

	/// PENDING -> RUNNING. Returns `false` if another worker got there first.
	#[tracing::instrument(skip(self), fields(job_id = %id))]
	pub async fn mark_running(&self, id: JobId, worker_id: &str, now: DateTime<Utc>) -> Result<bool> {
		let result = sqlx::query(
			r#"
			UPDATE jobs
			SET status = 'RUNNING', locked_by = ?, started_at = ?, ended_at = NULL, retry_after = NULL
			WHERE id = ? AND status = 'PENDING'
			"#,
		)
		.bind(worker_id)
		.bind(encode_ts(now))
		.bind(id.to_string())
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() == 1)
	}

	/// RUNNING -> SUCCEEDED, replacing the job metadata.
	#[tracing::instrument(skip(self, metadata), fields(job_id = %id))]
	pub async fn mark_succeeded(
		&self,
		id: JobId,
		metadata: &serde_json::Value,
		now: DateTime<Utc>,
	) -> Result<bool> {
		let result = sqlx::query(
			r#"
			UPDATE jobs
			SET status = 'SUCCEEDED', metadata = ?, error_code = NULL, error_message = NULL, ended_at = ?
			WHERE id = ? AND status = 'RUNNING'
			"#,
		)
		.bind(metadata.to_string())
		.bind(encode_ts(now))
		.bind(id.to_string())
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() == 1)
	}

	/// RUNNING -> RETRYING with the attempt count reached so far.
	#[tracing::instrument(skip(self, message), fields(job_id = %id))]
	pub async fn mark_retrying(
		&self,
		id: JobId,
		attempt: u32,
		code: &str,
		message: &str,
		retry_after: DateTime<Utc>,
		now: DateTime<Utc>,
	) -> Result<bool> {
		let result = sqlx::query(
			r#"
			UPDATE jobs
			SET status = 'RETRYING', attempt = ?, error_code = ?, error_message = ?, retry_after = ?, ended_at = ?
			WHERE id = ? AND status = 'RUNNING' AND ? < max_attempts
			"#,
		)
		.bind(attempt as i64)
		.bind(code)
		.bind(message)
		.bind(encode_ts(retry_after))
		.bind(encode_ts(now))
		.bind(id.to_string())
		.bind(attempt as i64)
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() == 1)
	}

	/// Moves a non-terminal job to FAILED. `attempt`, when given, is clamped
	/// to `max_attempts`.
	#[tracing::instrument(skip(self, message), fields(job_id = %id))]
	pub async fn mark_failed(
		&self,
		id: JobId,
		attempt: Option<u32>,
		code: &str,
		message: &str,
		now: DateTime<Utc>,
	) -> Result<bool> {
		let result = sqlx::query(
			r#"
			UPDATE jobs
			SET status = 'FAILED',
				attempt = MIN(COALESCE(?, attempt), max_attempts),
				error_code = ?,
				error_message = ?,
				ended_at = ?,
				retry_after = NULL
			WHERE id = ? AND status IN ('PENDING', 'RUNNING', 'RETRYING')
			"#,
		)
		.bind(attempt.map(i64::from))
		.bind(code)
		.bind(message)
		.bind(encode_ts(now))
		.bind(id.to_string())
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() == 1)
	}

	/// RETRYING -> PENDING for every job whose backoff has elapsed.
	#[tracing::instrument(skip(self))]
	pub async fn requeue_due(&self, now: DateTime<Utc>) -> Result<u64> {
		let result = sqlx::query(
			r#"
			UPDATE jobs
			SET status = 'PENDING', retry_after = NULL
			WHERE status = 'RETRYING' AND (retry_after IS NULL OR retry_after <= ?)
			"#,
		)
		.bind(encode_ts(now))
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected())
	}

	/// RUNNING jobs whose `started_at` is older than `now - threshold`.
	#[tracing::instrument(skip(self))]
	pub async fn get_stuck_jobs(&self, threshold: Duration, now: DateTime<Utc>) -> Result<Vec<Job>> {
		let cutoff = now - threshold;
		let rows = sqlx::query_as::<_, JobRow>(&format!(
			r#"
			SELECT {JOB_COLUMNS} FROM jobs
			WHERE status = 'RUNNING' AND started_at IS NOT NULL AND started_at < ?
			ORDER BY started_at
			"#
		))
		.bind(encode_ts(cutoff))
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(Job::try_from).collect()
	}

	/// Whether the cluster has a PENDING or RUNNING job of one of `types`.
	#[tracing::instrument(skip(self), fields(cluster_id = %cluster_id))]
	pub async fn has_active_job(&self, cluster_id: ClusterId, types: &[JobType]) -> Result<bool> {
		Ok(self.find_active_job(cluster_id, types).await?.is_some())
	}

	/// The oldest PENDING or RUNNING job of one of `types` on the cluster.
	#[tracing::instrument(skip(self), fields(cluster_id = %cluster_id))]
	pub async fn find_active_job(
		&self,
		cluster_id: ClusterId,
		types: &[JobType],
	) -> Result<Option<Job>> {
		if types.is_empty() {
			return Ok(None);
		}

		let placeholders = vec!["?"; types.len()].join(", ");
		let sql = format!(
			r#"
			SELECT {JOB_COLUMNS} FROM jobs
			WHERE cluster_id = ? AND status IN ('PENDING', 'RUNNING') AND job_type IN ({placeholders})
			ORDER BY created_at, id
			LIMIT 1
			"#
		);

		let mut query = sqlx::query_as::<_, JobRow>(&sql).bind(cluster_id.to_string());
		for job_type in types {
			query = query.bind(job_type.as_str());
		}
		let row = query.fetch_optional(&self.pool).await?;

		row.map(Job::try_from).transpose()
	}
}

#[async_trait]
pub trait JobStore: Send + Sync {
	async fn create(&self, job: &Job) -> Result<()>;
	async fn get(&self, id: JobId) -> Result<Option<Job>>;
	async fn list_by_cluster_id(&self, cluster_id: ClusterId) -> Result<Vec<Job>>;
	async fn list_claimable(&self, limit: u32, now: DateTime<Utc>) -> Result<Vec<Job>>;
	async fn mark_running(&self, id: JobId, worker_id: &str, now: DateTime<Utc>) -> Result<bool>;
	async fn mark_succeeded(
		&self,
		id: JobId,
		metadata: &serde_json::Value,
		now: DateTime<Utc>,
	) -> Result<bool>;
	async fn mark_retrying(
		&self,
		id: JobId,
		attempt: u32,
		code: &str,
		message: &str,
		retry_after: DateTime<Utc>,
		now: DateTime<Utc>,
	) -> Result<bool>;
	async fn mark_failed(
		&self,
		id: JobId,
		attempt: Option<u32>,
		code: &str,
		message: &str,
		now: DateTime<Utc>,
	) -> Result<bool>;
	async fn requeue_due(&self, now: DateTime<Utc>) -> Result<u64>;
	async fn get_stuck_jobs(&self, threshold: Duration, now: DateTime<Utc>) -> Result<Vec<Job>>;
	async fn has_active_job(&self, cluster_id: ClusterId, types: &[JobType]) -> Result<bool>;
	async fn find_active_job(&self, cluster_id: ClusterId, types: &[JobType])
		-> Result<Option<Job>>;
}

#[async_trait]
impl JobStore for JobRepository {
	async fn create(&self, job: &Job) -> Result<()> {
		self.create(job).await
	}

	async fn get(&self, id: JobId) -> Result<Option<Job>> {
		self.get(id).await
	}

	async fn list_by_cluster_id(&self, cluster_id: ClusterId) -> Result<Vec<Job>> {
		self.list_by_cluster_id(cluster_id).await
	}

	async fn list_claimable(&self, limit: u32, now: DateTime<Utc>) -> Result<Vec<Job>> {
		self.list_claimable(limit, now).await
	}

	async fn mark_running(&self, id: JobId, worker_id: &str, now: DateTime<Utc>) -> Result<bool> {
		self.mark_running(id, worker_id, now).await
	}

	async fn mark_succeeded(
		&self,
		id: JobId,
		metadata: &serde_json::Value,
		now: DateTime<Utc>,
	) -> Result<bool> {
		self.mark_succeeded(id, metadata, now).await
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
		self.mark_failed(id, attempt, code, message, now).await
	}

	async fn requeue_due(&self, now: DateTime<Utc>) -> Result<u64> {
		self.requeue_due(now).await
	}

	async fn get_stuck_jobs(&self, threshold: Duration, now: DateTime<Utc>) -> Result<Vec<Job>> {
		self.get_stuck_jobs(threshold, now).await
	}

	async fn has_active_job(&self, cluster_id: ClusterId, types: &[JobType]) -> Result<bool> {
		self.has_active_job(cluster_id, types).await
	}

	async fn find_active_job(
		&self,
		cluster_id: ClusterId,
		types: &[JobType],
	) -> Result<Option<Job>> {
		self.find_active_job(cluster_id, types).await
	}
}

#[derive(sqlx::FromRow)]
struct JobRow {
	id: String,
	cluster_id: String,
	job_type: String,
	status: String,
	attempt: i64,
	max_attempts: i64,
	error_code: Option<String>,
	error_message: Option<String>,
	metadata: String,
	locked_by: Option<String>,
	created_at: String,
	started_at: Option<String>,
	ended_at: Option<String>,
	retry_after: Option<String>,
}

impl TryFrom<JobRow> for Job {
	type Error = DbError;

	fn try_from(row: JobRow) -> Result<Self> {
		Ok(Job {
			id: parse_column("job id", &row.id)?,
			cluster_id: parse_column("cluster id", &row.cluster_id)?,
			job_type: parse_column("job type", &row.job_type)?,
			status: parse_column("job status", &row.status)?,
			attempt: row.attempt as u32,
			max_attempts: row.max_attempts as u32,
			error_code: row.error_code,
			error_message: row.error_message,
			metadata: serde_json::from_str(&row.metadata)?,
			locked_by: row.locked_by,
			created_at: decode_ts("created_at", &row.created_at)?,
			started_at: decode_opt_ts("started_at", row.started_at)?,
			ended_at: decode_opt_ts("ended_at", row.ended_at)?,
			retry_after: decode_opt_ts("retry_after", row.retry_after)?,
		})
	}
}
