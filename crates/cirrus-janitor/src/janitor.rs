// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use cirrus_common_core::SharedClock;
use cirrus_db::{Cluster, ClusterStatus, Job, JobType, Store};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::JanitorConfig;
use crate::error::Result;

/// Metadata `reason` on destroy jobs created by the TTL sweep.
pub const TTL_EXPIRED_REASON: &str = "TTL_EXPIRED";

pub const STUCK_JOB_CODE: &str = "STUCK_JOB_TIMEOUT";

/// Rows affected by one janitor run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct JanitorReport {
	pub ttl_destroys_scheduled: u64,
	pub stuck_jobs_failed: u64,
	pub expired_locks_removed: u64,
	pub expired_idempotency_keys_removed: u64,
	/// Names of passes that returned an error.
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub failed_passes: Vec<&'static str>,
}

impl JanitorReport {
	pub fn is_empty(&self) -> bool {
		self.ttl_destroys_scheduled == 0
			&& self.stuck_jobs_failed == 0
			&& self.expired_locks_removed == 0
			&& self.expired_idempotency_keys_removed == 0
	}
}

pub struct Janitor {
	store: Store,
	clock: SharedClock,
	config: JanitorConfig,
}

impl Janitor {
	pub fn new(store: Store, clock: SharedClock, config: JanitorConfig) -> Self {
		Self {
			store,
			clock,
			config,
		}
	}

	/// Runs immediately, then every `check_interval` until cancelled.
	pub async fn run(&self, cancel: CancellationToken) {
		info!(
			check_interval_secs = self.config.check_interval.as_secs(),
			stuck_job_threshold_secs = self.config.stuck_job_threshold.as_secs(),
			"janitor started"
		);

		loop {
			self.run_once().await;

			tokio::select! {
				_ = cancel.cancelled() => break,
				_ = tokio::time::sleep(self.config.check_interval) => {}
			}
		}

		info!("janitor stopped");
	}

	/// Runs every pass once. A failing pass is logged and does not stop the
	/// others.
	#[instrument(skip(self))]
	pub async fn run_once(&self) -> JanitorReport {
		let mut report = JanitorReport::default();

		match self.sweep_expired_clusters().await {
			Ok(n) => report.ttl_destroys_scheduled = n,
			Err(e) => {
				error!(error = %e, "TTL sweep failed");
				report.failed_passes.push("ttl_sweep");
			}
		}

		match self.fail_stuck_jobs().await {
			Ok(n) => report.stuck_jobs_failed = n,
			Err(e) => {
				error!(error = %e, "stuck job sweep failed");
				report.failed_passes.push("stuck_jobs");
			}
		}

		match self.store.locks.cleanup_expired(self.clock.now()).await {
			Ok(n) => report.expired_locks_removed = n,
			Err(e) => {
				error!(error = %e, "expired lock cleanup failed");
				report.failed_passes.push("expired_locks");
			}
		}

		match self.store.idempotency.cleanup_expired(self.clock.now()).await {
			Ok(n) => report.expired_idempotency_keys_removed = n,
			Err(e) => {
				error!(error = %e, "expired idempotency key cleanup failed");
				report.failed_passes.push("expired_idempotency_keys");
			}
		}

		if !report.is_empty() {
			info!(
				ttl_destroys_scheduled = report.ttl_destroys_scheduled,
				stuck_jobs_failed = report.stuck_jobs_failed,
				expired_locks_removed = report.expired_locks_removed,
				expired_idempotency_keys_removed = report.expired_idempotency_keys_removed,
				"janitor run complete"
			);
		}

		report
	}

	/// Creates a JANITOR_DESTROY job for every cluster past its `destroy_at`
	/// that has no destroy already queued or running, and marks it
	/// DESTROYING. Returns the number of jobs created.
	///
	/// A cluster that fails is logged and skipped; the first error is
	/// returned once every cluster has been tried.
	#[instrument(skip(self))]
	pub async fn sweep_expired_clusters(&self) -> Result<u64> {
		let now = self.clock.now();
		let expired = self.store.clusters.get_expired_clusters(now).await?;
		let mut scheduled = 0;
		let mut first_error = None;

		for cluster in expired {
			match self.expire_cluster(&cluster, now).await {
				Ok(true) => scheduled += 1,
				Ok(false) => {}
				Err(e) => {
					error!(cluster_id = %cluster.id, error = %e, "failed to expire cluster");
					first_error.get_or_insert(e);
				}
			}
		}

		match first_error {
			Some(e) => Err(e),
			None => Ok(scheduled),
		}
	}

	async fn expire_cluster(&self, cluster: &Cluster, now: DateTime<Utc>) -> Result<bool> {
		let existing = self
			.store
			.jobs
			.has_active_job(cluster.id, JobType::DESTROYING)
			.await?;

		let job = if existing {
			debug!(cluster_id = %cluster.id, "destroy already scheduled");
			None
		} else {
			let job = Job::new(
				cluster.id,
				JobType::JanitorDestroy,
				self.config.max_attempts,
				serde_json::json!({ "reason": TTL_EXPIRED_REASON }),
				now,
			);
			self.store.jobs.create(&job).await?;
			Some(job)
		};

		// Also repairs a cluster whose destroy job was queued by an earlier
		// pass that failed before this update.
		self
			.store
			.clusters
			.update_status(cluster.id, ClusterStatus::Destroying, now)
			.await?;

		let Some(job) = job else {
			return Ok(false);
		};
		info!(
			cluster_id = %cluster.id,
			cluster_name = %cluster.name,
			owner = %cluster.owner,
			destroy_at = ?cluster.destroy_at,
			job_id = %job.id,
			"cluster TTL expired, destroy scheduled"
		);
		Ok(true)
	}

	/// Fails RUNNING jobs older than the stuck threshold, releases their lock
	/// and marks their cluster FAILED.
	///
	/// The job is marked FAILED last, so a pass that breaks off halfway
	/// still finds it stuck next time and finishes the cleanup.
	#[instrument(skip(self))]
	pub async fn fail_stuck_jobs(&self) -> Result<u64> {
		let now = self.clock.now();
		let threshold_secs = self.config.stuck_job_threshold.as_secs().min(u64::from(u32::MAX));
		let threshold = chrono::Duration::seconds(threshold_secs as i64);
		let stuck = self.store.jobs.get_stuck_jobs(threshold, now).await?;
		let mut failed = 0;
		let mut first_error = None;

		for job in stuck {
			match self.fail_stuck_job(&job, threshold, now).await {
				Ok(true) => failed += 1,
				Ok(false) => {}
				Err(e) => {
					error!(job_id = %job.id, cluster_id = %job.cluster_id, error = %e, "failed to clean up stuck job");
					first_error.get_or_insert(e);
				}
			}
		}

		match first_error {
			Some(e) => Err(e),
			None => Ok(failed),
		}
	}

	async fn fail_stuck_job(
		&self,
		job: &Job,
		threshold: chrono::Duration,
		now: DateTime<Utc>,
	) -> Result<bool> {
		self
			.store
			.clusters
			.update_status(job.cluster_id, ClusterStatus::Failed, now)
			.await?;
		self.store.locks.release(job.cluster_id, job.id).await?;

		let message = format!(
			"job ran for more than {}s without finishing",
			threshold.num_seconds()
		);
		if !self
			.store
			.jobs
			.mark_failed(job.id, None, STUCK_JOB_CODE, &message, now)
			.await?
		{
			return Ok(false);
		}

		warn!(
			job_id = %job.id,
			cluster_id = %job.cluster_id,
			job_type = %job.job_type,
			locked_by = ?job.locked_by,
			started_at = ?job.started_at,
			"failed stuck job"
		);
		Ok(true)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{DateTime, Duration, TimeZone, Utc};
	use cirrus_common_core::ManualClock;
	use cirrus_db::testing::{create_test_store, make_cluster, make_job, FlakyLocks};
	use cirrus_db::{ClusterId, IdempotencyKey, JobId, JobStatus};
	use std::sync::Arc;

	fn t0() -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
	}

	async fn janitor() -> (Janitor, Store, Arc<ManualClock>) {
		let store = create_test_store().await;
		let clock = Arc::new(ManualClock::new(t0()));
		let janitor = Janitor::new(store.clone(), clock.clone(), JanitorConfig::default());
		(janitor, store, clock)
	}

	#[tokio::test]
	async fn test_ttl_sweep_schedules_destroy() {
		let (janitor, store, clock) = janitor().await;
		let cluster = make_cluster("expiring", t0());
		store.clusters.create(&cluster).await.unwrap();
		store
			.clusters
			.update_status(cluster.id, ClusterStatus::Ready, t0())
			.await
			.unwrap();

		assert_eq!(janitor.sweep_expired_clusters().await.unwrap(), 0);

		clock.advance(Duration::hours(25));
		assert_eq!(janitor.sweep_expired_clusters().await.unwrap(), 1);

		let jobs = store.jobs.list_by_cluster_id(cluster.id).await.unwrap();
		assert_eq!(jobs.len(), 1);
		assert_eq!(jobs[0].job_type, JobType::JanitorDestroy);
		assert_eq!(jobs[0].status, JobStatus::Pending);
		assert_eq!(jobs[0].metadata, serde_json::json!({"reason": "TTL_EXPIRED"}));
		assert_eq!(
			store.clusters.get(cluster.id).await.unwrap().unwrap().status,
			ClusterStatus::Destroying
		);
	}

	#[tokio::test]
	async fn test_ttl_sweep_is_idempotent() {
		let (janitor, store, clock) = janitor().await;
		let cluster = make_cluster("expiring", t0());
		store.clusters.create(&cluster).await.unwrap();
		clock.advance(Duration::hours(25));

		assert_eq!(janitor.sweep_expired_clusters().await.unwrap(), 1);
		assert_eq!(janitor.sweep_expired_clusters().await.unwrap(), 0);
		assert_eq!(store.jobs.list_by_cluster_id(cluster.id).await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_ttl_sweep_respects_user_destroy() {
		let (janitor, store, clock) = janitor().await;
		let cluster = make_cluster("expiring", t0());
		store.clusters.create(&cluster).await.unwrap();
		store
			.jobs
			.create(&make_job(cluster.id, JobType::Destroy, t0()))
			.await
			.unwrap();
		clock.advance(Duration::hours(25));

		assert_eq!(janitor.sweep_expired_clusters().await.unwrap(), 0);
		let jobs = store.jobs.list_by_cluster_id(cluster.id).await.unwrap();
		assert_eq!(jobs.len(), 1);
		assert_eq!(jobs[0].job_type, JobType::Destroy);
	}

	#[tokio::test]
	async fn test_ttl_sweep_marks_destroying_when_job_already_queued() {
		let (janitor, store, clock) = janitor().await;
		let cluster = make_cluster("expiring", t0());
		store.clusters.create(&cluster).await.unwrap();
		store
			.clusters
			.update_status(cluster.id, ClusterStatus::Ready, t0())
			.await
			.unwrap();
		store
			.jobs
			.create(&make_job(cluster.id, JobType::JanitorDestroy, t0()))
			.await
			.unwrap();
		clock.advance(Duration::hours(25));

		assert_eq!(janitor.sweep_expired_clusters().await.unwrap(), 0);
		assert_eq!(
			store.clusters.get(cluster.id).await.unwrap().unwrap().status,
			ClusterStatus::Destroying
		);
		assert_eq!(store.jobs.list_by_cluster_id(cluster.id).await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_stuck_job_is_failed() {
		let (janitor, store, clock) = janitor().await;
		let cluster = make_cluster("stuck", t0());
		store.clusters.create(&cluster).await.unwrap();
		let job = make_job(cluster.id, JobType::Create, t0());
		store.jobs.create(&job).await.unwrap();
		store.jobs.mark_running(job.id, "worker-a", t0()).await.unwrap();
		store
			.locks
			.acquire(cluster.id, job.id, "worker-a", Duration::hours(4), t0())
			.await
			.unwrap();

		clock.advance(Duration::hours(1));
		assert_eq!(janitor.fail_stuck_jobs().await.unwrap(), 0);

		clock.advance(Duration::hours(2));
		assert_eq!(janitor.fail_stuck_jobs().await.unwrap(), 1);

		let job = store.jobs.get(job.id).await.unwrap().unwrap();
		assert_eq!(job.status, JobStatus::Failed);
		assert_eq!(job.error_code.as_deref(), Some(STUCK_JOB_CODE));
		assert!(store.locks.get(cluster.id).await.unwrap().is_none());
		assert_eq!(
			store.clusters.get(cluster.id).await.unwrap().unwrap().status,
			ClusterStatus::Failed
		);

		assert_eq!(janitor.fail_stuck_jobs().await.unwrap(), 0);
	}

	async fn running_job(store: &Store, name: &str) -> (ClusterId, JobId) {
		let cluster = make_cluster(name, t0());
		store.clusters.create(&cluster).await.unwrap();
		let job = make_job(cluster.id, JobType::Create, t0());
		store.jobs.create(&job).await.unwrap();
		store.jobs.mark_running(job.id, "worker-a", t0()).await.unwrap();
		store
			.locks
			.acquire(cluster.id, job.id, "worker-a", Duration::hours(4), t0())
			.await
			.unwrap();
		(cluster.id, job.id)
	}

	#[tokio::test]
	async fn test_stuck_job_cleanup_finishes_after_lock_error() {
		let mut store = create_test_store().await;
		FlakyLocks::wrap(&mut store, 1);
		let clock = Arc::new(ManualClock::new(t0()));
		let janitor = Janitor::new(store.clone(), clock.clone(), JanitorConfig::default());
		let (cluster_id, job_id) = running_job(&store, "stuck").await;

		clock.advance(Duration::hours(3));
		let report = janitor.run_once().await;
		assert_eq!(report.failed_passes, vec!["stuck_jobs"]);
		assert_eq!(
			store.jobs.get(job_id).await.unwrap().unwrap().status,
			JobStatus::Running
		);

		let report = janitor.run_once().await;
		assert!(report.failed_passes.is_empty());
		assert_eq!(report.stuck_jobs_failed, 1);

		let job = store.jobs.get(job_id).await.unwrap().unwrap();
		assert_eq!(job.status, JobStatus::Failed);
		assert_eq!(job.error_code.as_deref(), Some(STUCK_JOB_CODE));
		assert!(store.locks.get(cluster_id).await.unwrap().is_none());
		assert_eq!(
			store.clusters.get(cluster_id).await.unwrap().unwrap().status,
			ClusterStatus::Failed
		);
	}

	#[tokio::test]
	async fn test_stuck_job_error_does_not_block_the_rest() {
		let mut store = create_test_store().await;
		FlakyLocks::wrap(&mut store, 1);
		let clock = Arc::new(ManualClock::new(t0()));
		let janitor = Janitor::new(store.clone(), clock.clone(), JanitorConfig::default());
		let (_, first) = running_job(&store, "stuck-a").await;
		let (_, second) = running_job(&store, "stuck-b").await;

		clock.advance(Duration::hours(3));
		assert!(janitor.fail_stuck_jobs().await.is_err());

		let mut failed = 0;
		for id in [first, second] {
			if store.jobs.get(id).await.unwrap().unwrap().status == JobStatus::Failed {
				failed += 1;
			}
		}
		assert_eq!(failed, 1);

		assert_eq!(janitor.fail_stuck_jobs().await.unwrap(), 1);
		assert_eq!(janitor.fail_stuck_jobs().await.unwrap(), 0);
	}

	#[tokio::test]
	async fn test_run_once_reports_every_pass() {
		let (janitor, store, clock) = janitor().await;
		let cluster = make_cluster("expiring", t0());
		store.clusters.create(&cluster).await.unwrap();
		store
			.locks
			.acquire(
				make_cluster("other", t0()).id,
				cirrus_db::JobId::new(),
				"worker-a",
				Duration::minutes(10),
				t0(),
			)
			.await
			.unwrap();
		store
			.idempotency
			.put(&IdempotencyKey::new(
				"key-1",
				"hash",
				201,
				serde_json::json!({}),
				t0(),
				Duration::hours(24),
			))
			.await
			.unwrap();

		assert!(janitor.run_once().await.is_empty());

		clock.advance(Duration::hours(25));
		let report = janitor.run_once().await;
		assert_eq!(
			report,
			JanitorReport {
				ttl_destroys_scheduled: 1,
				stuck_jobs_failed: 0,
				expired_locks_removed: 1,
				expired_idempotency_keys_removed: 1,
				failed_passes: vec![],
			}
		);
	}

	#[tokio::test]
	async fn test_run_stops_on_cancel() {
		let (janitor, _store, _clock) = janitor().await;
		let cancel = CancellationToken::new();
		cancel.cancel();
		tokio::time::timeout(std::time::Duration::from_secs(5), janitor.run(cancel))
			.await
			.unwrap();
	}

	#[test]
	fn test_report_serializes_without_empty_failures() {
		let report = JanitorReport {
			ttl_destroys_scheduled: 2,
			..JanitorReport::default()
		};
		let value = serde_json::to_value(&report).unwrap();
		assert_eq!(value["ttl_destroys_scheduled"], 2);
		assert!(value.get("failed_passes").is_none());
	}
}
