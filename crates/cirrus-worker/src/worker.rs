// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cirrus_common_core::SharedClock;
use cirrus_db::{ClusterStatus, Job, JobStatus, JobType, Store};
use cirrus_provisioner::{ProvisionError, ProvisionRequest, Provisioner};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::calculate_backoff_delay;
use crate::config::WorkerConfig;
use crate::error::Result;

const CLUSTER_TERMINAL_CODE: &str = "CLUSTER_TERMINAL";

/// What a single poll iteration did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
	/// RETRYING jobs moved back to PENDING.
	pub requeued: u64,
	/// Jobs claimed and handed to the provisioner.
	pub claimed: usize,
	/// Listed jobs another worker took between listing and claiming.
	pub skipped: usize,
}

struct Shared {
	store: Store,
	provisioner: Arc<dyn Provisioner>,
	clock: SharedClock,
	config: WorkerConfig,
	lease: chrono::Duration,
}

pub struct Worker {
	shared: Arc<Shared>,
	slots: Arc<Semaphore>,
	tasks: Mutex<JoinSet<()>>,
}

impl Worker {
	pub fn new(
		store: Store,
		provisioner: Arc<dyn Provisioner>,
		clock: SharedClock,
		config: WorkerConfig,
	) -> Self {
		let lease = to_chrono(config.lease_duration);
		let slots = Arc::new(Semaphore::new(config.concurrency.max(1)));
		Self {
			shared: Arc::new(Shared {
				store,
				provisioner,
				clock,
				config,
				lease,
			}),
			slots,
			tasks: Mutex::new(JoinSet::new()),
		}
	}

	pub fn worker_id(&self) -> &str {
		&self.shared.config.worker_id
	}

	/// Jobs currently executing.
	pub fn in_flight(&self) -> usize {
		self.shared.config.concurrency.max(1) - self.slots.available_permits()
	}

	/// Polls until `cancel` fires, then waits up to the drain timeout for
	/// in-flight jobs. Jobs still running after that are left to the janitor.
	pub async fn run(&self, cancel: CancellationToken) {
		let config = &self.shared.config;
		info!(
			worker_id = %config.worker_id,
			concurrency = config.concurrency,
			provisioner = self.shared.provisioner.name(),
			"worker started"
		);

		while !cancel.is_cancelled() {
			match self.poll_once().await {
				Ok(report) if report.claimed > 0 || report.requeued > 0 => {
					debug!(
						claimed = report.claimed,
						requeued = report.requeued,
						skipped = report.skipped,
						"poll complete"
					);
				}
				Ok(_) => {}
				Err(e) => warn!(error = %e, "worker poll failed"),
			}

			tokio::select! {
				_ = cancel.cancelled() => break,
				_ = tokio::time::sleep(config.poll_interval) => {}
			}
		}

		info!(in_flight = self.in_flight(), "worker stopping");
		if self.drain(config.drain_timeout).await {
			info!("worker stopped");
		}
	}

	/// One iteration: requeue due retries, then claim as many jobs as there
	/// are free slots and start them in the background.
	#[tracing::instrument(skip(self), fields(worker_id = %self.shared.config.worker_id))]
	pub async fn poll_once(&self) -> Result<PollReport> {
		self.reap_finished();
		let store = &self.shared.store;
		let mut report = PollReport {
			requeued: store.jobs.requeue_due(self.shared.clock.now()).await?,
			..PollReport::default()
		};

		let free = self.slots.available_permits();
		if free == 0 {
			return Ok(report);
		}

		let limit = u32::try_from(free).unwrap_or(u32::MAX);
		let claimable = store.jobs.list_claimable(limit, self.shared.clock.now()).await?;
		for job in claimable {
			let Ok(permit) = Arc::clone(&self.slots).try_acquire_owned() else {
				break;
			};
			match self.claim(job).await? {
				Some(job) => {
					report.claimed += 1;
					self.spawn(job, permit);
				}
				None => report.skipped += 1,
			}
		}

		Ok(report)
	}

	/// Waits for every job started so far.
	pub async fn wait_idle(&self) {
		let mut tasks = std::mem::take(&mut *self.tasks.lock());
		join_all(&mut tasks).await;
	}

	/// Waits up to `timeout` for in-flight jobs. Returns `false` if some were
	/// still running; those are detached, not aborted.
	pub async fn drain(&self, timeout: Duration) -> bool {
		let mut tasks = std::mem::take(&mut *self.tasks.lock());
		if tokio::time::timeout(timeout, join_all(&mut tasks)).await.is_ok() {
			return true;
		}

		warn!(
			remaining = tasks.len(),
			"drain timed out, leaving in-flight jobs to the janitor"
		);
		tasks.detach_all();
		false
	}

	/// Takes the cluster lease, then moves the job to RUNNING. Returns `None`
	/// when either step loses to someone else.
	async fn claim(&self, mut job: Job) -> Result<Option<Job>> {
		let shared = &self.shared;
		let worker_id = shared.config.worker_id.as_str();
		let now = shared.clock.now();

		let acquired = shared
			.store
			.locks
			.acquire(job.cluster_id, job.id, worker_id, shared.lease, now)
			.await?;
		if !acquired {
			debug!(job_id = %job.id, cluster_id = %job.cluster_id, "cluster locked, skipping job");
			return Ok(None);
		}

		let marked = match shared.store.jobs.mark_running(job.id, worker_id, now).await {
			Ok(marked) => marked,
			Err(e) => {
				if let Err(release) = shared.store.locks.release(job.cluster_id, job.id).await {
					warn!(job_id = %job.id, error = %release, "failed to release lease after claim error");
				}
				return Err(e.into());
			}
		};
		if !marked {
			shared.store.locks.release(job.cluster_id, job.id).await?;
			debug!(job_id = %job.id, "job claimed elsewhere, skipping");
			return Ok(None);
		}

		job.status = JobStatus::Running;
		job.locked_by = Some(worker_id.to_string());
		job.started_at = Some(now);
		job.retry_after = None;
		Ok(Some(job))
	}

	fn spawn(&self, job: Job, permit: OwnedSemaphorePermit) {
		let shared = Arc::clone(&self.shared);
		self.tasks.lock().spawn(async move {
			let _permit = permit;
			let job_id = job.id;
			if let Err(e) = shared.execute(job).await {
				error!(job_id = %job_id, error = %e, "failed to record job outcome");
			}
		});
	}

	fn reap_finished(&self) {
		let mut tasks = self.tasks.lock();
		while let Some(result) = tasks.try_join_next() {
			log_join_error(result);
		}
	}
}

impl Shared {
	#[tracing::instrument(
		skip(self, job),
		fields(job_id = %job.id, cluster_id = %job.cluster_id, job_type = %job.job_type)
	)]
	async fn execute(&self, job: Job) -> Result<()> {
		let Some(mut cluster) = self.store.clusters.get(job.cluster_id).await? else {
			warn!("cluster record missing, failing job");
			return self
				.abandon(&job, "CLUSTER_NOT_FOUND", "cluster record is missing")
				.await;
		};

		if !can_act_on(job.job_type, cluster.status) {
			warn!(cluster_status = %cluster.status, "cluster already finished, failing job");
			return self
				.abandon(&job, CLUSTER_TERMINAL_CODE, "cluster reached a terminal state")
				.await;
		}

		if let Some(status) = status_on_start(job.job_type) {
			let moved = self
				.store
				.clusters
				.update_status(cluster.id, status, self.clock.now())
				.await?;
			if !moved {
				warn!("cluster destroyed before job started, failing job");
				return self
					.abandon(&job, CLUSTER_TERMINAL_CODE, "cluster reached a terminal state")
					.await;
			}
			cluster.status = status;
		}

		info!(
			attempt = job.attempt + 1,
			max_attempts = job.max_attempts,
			"executing job"
		);
		let request = ProvisionRequest::for_job(&job, cluster);

		let execution = self.provisioner.execute(&request);
		let renewal = self.renew_lease(&job);
		tokio::pin!(execution);
		tokio::pin!(renewal);
		let mut renewing = true;
		let result = loop {
			tokio::select! {
				result = &mut execution => break result,
				_ = &mut renewal, if renewing => renewing = false,
			}
		};

		let now = self.clock.now();
		match result {
			Ok(outcome) => {
				let metadata = merge_artifacts(&job.metadata, outcome.artifacts);
				let recorded = self.store.jobs.mark_succeeded(job.id, &metadata, now).await?;
				self.store.locks.release(job.cluster_id, job.id).await?;
				if !recorded {
					warn!("job left RUNNING before it finished, discarding success");
					return Ok(());
				}
				if let Some(status) = status_on_success(job.job_type) {
					self
						.store
						.clusters
						.update_status(job.cluster_id, status, now)
						.await?;
				}
				info!("job succeeded");
			}
			Err(err) => self.record_failure(&job, err, now).await?,
		}

		Ok(())
	}

	/// Fails a claimed job without calling the provisioner. The cluster is
	/// left as it is.
	async fn abandon(&self, job: &Job, code: &str, message: &str) -> Result<()> {
		let now = self.clock.now();
		self.store.jobs.mark_failed(job.id, None, code, message, now).await?;
		self.store.locks.release(job.cluster_id, job.id).await?;
		Ok(())
	}

	async fn record_failure(&self, job: &Job, err: ProvisionError, now: DateTime<Utc>) -> Result<()> {
		let attempt = job.attempt + 1;

		if err.retryable && attempt < job.max_attempts {
			let retry_after = now + calculate_backoff_delay(attempt);
			let recorded = self
				.store
				.jobs
				.mark_retrying(job.id, attempt, &err.code, &err.message, retry_after, now)
				.await?;
			self.store.locks.release(job.cluster_id, job.id).await?;
			if recorded {
				warn!(
					attempt,
					max_attempts = job.max_attempts,
					code = %err.code,
					error = %err.message,
					%retry_after,
					"job failed, will retry"
				);
			}
			return Ok(());
		}

		let recorded = self
			.store
			.jobs
			.mark_failed(job.id, Some(attempt), &err.code, &err.message, now)
			.await?;
		self.store.locks.release(job.cluster_id, job.id).await?;
		if !recorded {
			warn!("job left RUNNING before it failed, discarding failure");
			return Ok(());
		}

		self
			.store
			.clusters
			.update_status(job.cluster_id, ClusterStatus::Failed, now)
			.await?;
		error!(
			attempt,
			retryable = err.retryable,
			code = %err.code,
			error = %err.message,
			"job failed permanently"
		);
		Ok(())
	}

	/// Extends the lease every `renew_interval` until it is lost. Never
	/// returns while the lease is held.
	async fn renew_lease(&self, job: &Job) {
		let interval = self.config.renew_interval();
		loop {
			tokio::time::sleep(interval).await;
			let renewed = self
				.store
				.locks
				.renew(
					job.cluster_id,
					job.id,
					&self.config.worker_id,
					self.lease,
					self.clock.now(),
				)
				.await;
			match renewed {
				Ok(true) => debug!("lease renewed"),
				Ok(false) => {
					warn!("lease lost while job was running");
					return;
				}
				Err(e) => warn!(error = %e, "lease renewal failed"),
			}
		}
	}
}

/// Whether a job of this type may still run against a cluster in `status`.
/// Destroys retry a FAILED cluster but stop once it is DESTROYED. Orphan
/// sweeps only clean up leftovers, so they run regardless.
fn can_act_on(job_type: JobType, status: ClusterStatus) -> bool {
	match job_type {
		JobType::Create | JobType::ScaleWorkers => !status.is_terminal(),
		JobType::Destroy | JobType::JanitorDestroy => status != ClusterStatus::Destroyed,
		JobType::OrphanSweep => true,
	}
}

fn status_on_start(job_type: JobType) -> Option<ClusterStatus> {
	match job_type {
		JobType::Create => Some(ClusterStatus::Creating),
		JobType::Destroy | JobType::JanitorDestroy => Some(ClusterStatus::Destroying),
		JobType::ScaleWorkers | JobType::OrphanSweep => None,
	}
}

fn status_on_success(job_type: JobType) -> Option<ClusterStatus> {
	match job_type {
		JobType::Create | JobType::ScaleWorkers => Some(ClusterStatus::Ready),
		JobType::Destroy | JobType::JanitorDestroy => Some(ClusterStatus::Destroyed),
		JobType::OrphanSweep => None,
	}
}

fn merge_artifacts(metadata: &Value, artifacts: Value) -> Value {
	let mut merged = match metadata {
		Value::Object(map) => map.clone(),
		Value::Null => Map::new(),
		other => Map::from_iter([("input".to_string(), other.clone())]),
	};
	merged.insert("artifacts".to_string(), artifacts);
	Value::Object(merged)
}

fn to_chrono(duration: Duration) -> chrono::Duration {
	let millis = duration.as_millis().min(u128::from(u32::MAX));
	chrono::Duration::milliseconds(millis as i64)
}

async fn join_all(tasks: &mut JoinSet<()>) {
	while let Some(result) = tasks.join_next().await {
		log_join_error(result);
	}
}

fn log_join_error(result: std::result::Result<(), tokio::task::JoinError>) {
	if let Err(e) = result {
		if e.is_panic() {
			error!(error = %e, "job task panicked");
		}
	}
}
