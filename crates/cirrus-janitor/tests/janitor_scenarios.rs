// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Janitor passes together with the worker that consumes their jobs.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use cirrus_common_core::ManualClock;
use cirrus_db::testing::{create_test_store, make_cluster, make_job};
use cirrus_db::{ClusterStatus, JobStatus, JobType};
use cirrus_janitor::{Janitor, JanitorConfig};
use cirrus_provisioner::testing::ScriptedProvisioner;
use cirrus_worker::{Worker, WorkerConfig};

#[tokio::test]
async fn job_running_three_hours_is_failed_with_two_hour_threshold() {
	let store = create_test_store().await;
	let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
	let clock = Arc::new(ManualClock::new(t0));
	let janitor = Janitor::new(
		store.clone(),
		clock.clone(),
		JanitorConfig {
			stuck_job_threshold: std::time::Duration::from_secs(2 * 60 * 60),
			..JanitorConfig::default()
		},
	);

	let cluster = make_cluster("stuck-cluster", t0);
	store.clusters.create(&cluster).await.unwrap();
	store
		.clusters
		.update_status(cluster.id, ClusterStatus::Creating, t0)
		.await
		.unwrap();
	let job = make_job(cluster.id, JobType::Create, t0);
	store.jobs.create(&job).await.unwrap();
	assert!(store.jobs.mark_running(job.id, "worker-gone", t0).await.unwrap());
	assert!(store
		.locks
		.acquire(cluster.id, job.id, "worker-gone", Duration::hours(6), t0)
		.await
		.unwrap());

	clock.advance(Duration::hours(3));
	let report = janitor.run_once().await;
	assert_eq!(report.stuck_jobs_failed, 1);
	assert!(report.failed_passes.is_empty());

	let job = store.jobs.get(job.id).await.unwrap().unwrap();
	assert_eq!(job.status, JobStatus::Failed);
	assert_eq!(job.error_code.as_deref(), Some("STUCK_JOB_TIMEOUT"));
	assert!(store.locks.get(cluster.id).await.unwrap().is_none());
	assert_eq!(
		store.clusters.get(cluster.id).await.unwrap().unwrap().status,
		ClusterStatus::Failed
	);
}

#[tokio::test]
async fn expired_cluster_is_destroyed_exactly_once() {
	let store = create_test_store().await;
	let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
	let clock = Arc::new(ManualClock::new(t0));
	let janitor = Janitor::new(store.clone(), clock.clone(), JanitorConfig::default());
	let provisioner = Arc::new(ScriptedProvisioner::succeeding());
	let worker = Worker::new(
		store.clone(),
		provisioner.clone(),
		clock.clone(),
		WorkerConfig::default().with_worker_id("worker-a"),
	);

	let cluster = make_cluster("short-lived", t0);
	store.clusters.create(&cluster).await.unwrap();
	store
		.jobs
		.create(&make_job(cluster.id, JobType::Create, t0))
		.await
		.unwrap();
	worker.poll_once().await.unwrap();
	worker.wait_idle().await;
	assert_eq!(
		store.clusters.get(cluster.id).await.unwrap().unwrap().status,
		ClusterStatus::Ready
	);

	clock.advance(Duration::hours(24) + Duration::minutes(1));
	assert_eq!(janitor.run_once().await.ttl_destroys_scheduled, 1);
	assert_eq!(janitor.run_once().await.ttl_destroys_scheduled, 0);

	worker.poll_once().await.unwrap();
	worker.wait_idle().await;

	assert_eq!(
		store.clusters.get(cluster.id).await.unwrap().unwrap().status,
		ClusterStatus::Destroyed
	);
	assert_eq!(janitor.run_once().await.ttl_destroys_scheduled, 0);

	let jobs = store.jobs.list_by_cluster_id(cluster.id).await.unwrap();
	let destroys: Vec<_> = jobs
		.iter()
		.filter(|job| job.job_type == JobType::JanitorDestroy)
		.collect();
	assert_eq!(destroys.len(), 1);
	assert_eq!(destroys[0].status, JobStatus::Succeeded);
	assert_eq!(destroys[0].metadata["reason"], "TTL_EXPIRED");
	assert_eq!(provisioner.call_count(), 2);
}
