// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use cirrus_common_core::SharedClock;
use cirrus_db::{
	Cluster, ClusterId, ClusterStatus, IdempotencyKey, Job, JobType, Store,
};
use cirrus_policy::{CreateClusterRequest, PolicyEngine, ResolvedRequest, ValidationError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::error::{IntakeError, Result};
use crate::types::{CreateOutcome, CreatedCluster, IntakeConfig};

const STATUS_CREATED: u16 = 201;
const STATUS_REJECTED: u16 = 422;

#[derive(Serialize, Deserialize)]
struct RejectedBody {
	errors: Vec<ValidationError>,
}

/// Hex SHA-256 of the request's canonical JSON.
pub fn hash_request(req: &CreateClusterRequest) -> Result<String> {
	let canonical = serde_json::to_vec(req)?;
	Ok(hex::encode(Sha256::digest(&canonical)))
}

pub struct IntakeService {
	policy: Arc<PolicyEngine>,
	store: Store,
	clock: SharedClock,
	config: IntakeConfig,
}

impl IntakeService {
	pub fn new(
		policy: Arc<PolicyEngine>,
		store: Store,
		clock: SharedClock,
		config: IntakeConfig,
	) -> Self {
		Self {
			policy,
			store,
			clock,
			config,
		}
	}

	/// Validates and persists a new cluster with its CREATE job.
	///
	/// With an idempotency key, a repeat of the same request returns the
	/// cached answer and a different request under the same key is refused.
	#[instrument(skip(self, req), fields(cluster_name = %req.name, profile = %req.profile))]
	pub async fn request_create(
		&self,
		req: &CreateClusterRequest,
		idempotency_key: Option<&str>,
	) -> Result<CreateOutcome> {
		let now = self.clock.now();
		let request_hash = hash_request(req)?;

		if let Some(key) = idempotency_key {
			if let Some(cached) = self.store.idempotency.get(key, now).await? {
				if cached.request_hash != request_hash {
					return Err(IntakeError::IdempotencyMismatch(key.to_string()));
				}
				debug!(key, "replaying cached response");
				return replay(cached);
			}
		}

		let outcome = self.create(req, now).await?;

		if let Some(key) = idempotency_key {
			self.remember(key, &request_hash, &outcome, now).await?;
		}

		Ok(outcome)
	}

	/// Queues a DESTROY job, or returns the destroy already queued.
	#[instrument(skip(self), fields(cluster_id = %cluster_id))]
	pub async fn request_destroy(&self, cluster_id: ClusterId) -> Result<Job> {
		let cluster = self.cluster(cluster_id).await?;
		if cluster.status.is_terminal() {
			return Err(IntakeError::ClusterTerminal {
				id: cluster.id,
				status: cluster.status,
			});
		}

		if let Some(existing) = self
			.store
			.jobs
			.find_active_job(cluster.id, JobType::DESTROYING)
			.await?
		{
			debug!(job_id = %existing.id, "destroy already queued");
			return Ok(existing);
		}

		let job = Job::new(
			cluster.id,
			JobType::Destroy,
			self.config.max_attempts,
			serde_json::json!({}),
			self.clock.now(),
		);
		self.store.jobs.create(&job).await?;
		info!(job_id = %job.id, cluster_name = %cluster.name, "destroy requested");
		Ok(job)
	}

	/// Queues a SCALE_WORKERS job. The cluster must be READY and `workers`
	/// within its profile's bounds.
	#[instrument(skip(self), fields(cluster_id = %cluster_id))]
	pub async fn request_scale(&self, cluster_id: ClusterId, workers: u32) -> Result<Job> {
		let cluster = self.cluster(cluster_id).await?;
		if cluster.status != ClusterStatus::Ready {
			return Err(IntakeError::ClusterNotReady {
				id: cluster.id,
				status: cluster.status,
			});
		}

		let profile = self
			.policy
			.registry()
			.get(&cluster.profile)
			.map_err(cirrus_policy::PolicyError::from)?;
		if !profile.workers_in_bounds(workers) {
			return Err(IntakeError::WorkerCountOutOfBounds {
				requested: workers,
				min: profile.compute.workers.min,
				max: profile.compute.workers.max,
			});
		}

		let job = Job::new(
			cluster.id,
			JobType::ScaleWorkers,
			self.config.max_attempts,
			serde_json::json!({ "worker_replicas": workers }),
			self.clock.now(),
		);
		self.store.jobs.create(&job).await?;
		info!(job_id = %job.id, workers, "scale requested");
		Ok(job)
	}

	pub async fn get_cluster(&self, cluster_id: ClusterId) -> Result<Cluster> {
		self.cluster(cluster_id).await
	}

	pub async fn list_jobs(&self, cluster_id: ClusterId) -> Result<Vec<Job>> {
		Ok(self.store.jobs.list_by_cluster_id(cluster_id).await?)
	}

	async fn cluster(&self, cluster_id: ClusterId) -> Result<Cluster> {
		self
			.store
			.clusters
			.get(cluster_id)
			.await?
			.ok_or(IntakeError::ClusterNotFound(cluster_id))
	}

	async fn create(&self, req: &CreateClusterRequest, now: DateTime<Utc>) -> Result<CreateOutcome> {
		let validation = self.policy.validate_create_request(req)?;
		let resolved = match validation.resolved {
			Some(resolved) if validation.valid => resolved,
			_ => return Ok(CreateOutcome::Rejected(validation.errors)),
		};

		if let Some(existing) = self.store.clusters.get_by_name(&resolved.name).await? {
			if !existing.status.is_terminal() {
				return Ok(CreateOutcome::Rejected(vec![ValidationError::new(
					"name",
					format!("cluster name {} is already in use", resolved.name),
				)]));
			}
		}

		let cluster = new_cluster(resolved, now);
		let job = Job::new(
			cluster.id,
			JobType::Create,
			self.config.max_attempts,
			serde_json::json!({}),
			now,
		);
		self.store.clusters.create(&cluster).await?;
		self.store.jobs.create(&job).await?;

		info!(
			cluster_id = %cluster.id,
			job_id = %job.id,
			owner = %cluster.owner,
			destroy_at = ?cluster.destroy_at,
			"cluster requested"
		);
		Ok(CreateOutcome::Created(CreatedCluster { cluster, job }))
	}

	async fn remember(
		&self,
		key: &str,
		request_hash: &str,
		outcome: &CreateOutcome,
		now: DateTime<Utc>,
	) -> Result<()> {
		let (status, body) = match outcome {
			CreateOutcome::Created(created) | CreateOutcome::Replayed(created) => {
				(STATUS_CREATED, serde_json::to_value(created)?)
			}
			CreateOutcome::Rejected(errors) => (
				STATUS_REJECTED,
				serde_json::to_value(RejectedBody {
					errors: errors.clone(),
				})?,
			),
		};

		let ttl = chrono::Duration::seconds(
			self.config.idempotency_ttl.as_secs().min(u64::from(u32::MAX)) as i64,
		);
		let record = IdempotencyKey::new(key, request_hash, status, body, now, ttl);
		if !self.store.idempotency.put(&record).await? {
			warn!(key, "idempotency key stored concurrently by another request");
		}
		Ok(())
	}
}

fn replay(cached: IdempotencyKey) -> Result<CreateOutcome> {
	if cached.response_status == STATUS_CREATED {
		return Ok(CreateOutcome::Replayed(serde_json::from_value(
			cached.response_body,
		)?));
	}
	let body: RejectedBody = serde_json::from_value(cached.response_body)?;
	Ok(CreateOutcome::Rejected(body.errors))
}

/// A PENDING cluster for a validated request. Stamps the `ClusterId` and
/// `TTLExpiry` tags, which only exist once the cluster does.
fn new_cluster(resolved: ResolvedRequest, now: DateTime<Utc>) -> Cluster {
	let id = ClusterId::new();
	let mut effective_tags = resolved.effective_tags;
	effective_tags.insert("ClusterId".to_string(), id.to_string());
	effective_tags.insert(
		"TTLExpiry".to_string(),
		resolved.destroy_at.to_rfc3339_opts(SecondsFormat::Secs, true),
	);

	Cluster {
		id,
		name: resolved.name,
		platform: resolved.platform,
		version: resolved.version,
		profile: resolved.profile,
		region: resolved.region,
		base_domain: resolved.base_domain,
		owner: resolved.owner,
		team: resolved.team,
		cost_center: resolved.cost_center,
		status: ClusterStatus::Pending,
		ttl_hours: resolved.ttl_hours,
		destroy_at: Some(resolved.destroy_at),
		request_tags: resolved.request_tags,
		effective_tags,
		offhours_opt_in: resolved.offhours_opt_in,
		created_at: now,
		updated_at: now,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{Duration, TimeZone};
	use cirrus_common_core::ManualClock;
	use cirrus_db::testing::create_test_store;
	use cirrus_db::JobStatus;
	use cirrus_profiles::testing::minimal_from_toml;
	use cirrus_profiles::{ProfileRegistry, StaticSource};

	fn t0() -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
	}

	async fn service() -> (IntakeService, Store, Arc<ManualClock>) {
		let store = create_test_store().await;
		let clock = Arc::new(ManualClock::new(t0()));
		let registry =
			Arc::new(ProfileRegistry::load(StaticSource::new(vec![minimal_from_toml()])).unwrap());
		let policy = Arc::new(PolicyEngine::new(registry, clock.clone()));
		let service = IntakeService::new(
			policy,
			store.clone(),
			clock.clone(),
			IntakeConfig::default(),
		);
		(service, store, clock)
	}

	fn request(name: &str) -> CreateClusterRequest {
		CreateClusterRequest {
			name: name.to_string(),
			profile: "aws-minimal-test".to_string(),
			version: Some("4.20.3".to_string()),
			region: Some("us-east-1".to_string()),
			owner: "alice".to_string(),
			team: "platform".to_string(),
			cost_center: "cc-100".to_string(),
			ttl_hours: Some(24),
			..CreateClusterRequest::default()
		}
	}

	async fn ready_cluster(service: &IntakeService, store: &Store, name: &str) -> Cluster {
		let outcome = service.request_create(&request(name), None).await.unwrap();
		let cluster = outcome.created().unwrap().cluster.clone();
		store
			.clusters
			.update_status(cluster.id, ClusterStatus::Ready, t0())
			.await
			.unwrap();
		cluster
	}

	#[tokio::test]
	async fn test_create_persists_cluster_and_job() {
		let (service, store, _clock) = service().await;

		let outcome = service
			.request_create(&request("test-cluster-01"), None)
			.await
			.unwrap();
		let CreateOutcome::Created(created) = outcome else {
			panic!("expected Created, got {outcome:?}");
		};

		assert_eq!(created.cluster.status, ClusterStatus::Pending);
		assert_eq!(created.cluster.destroy_at, Some(t0() + Duration::hours(24)));
		assert_eq!(created.cluster.effective_tags["ManagedBy"], "cirrus");
		assert_eq!(created.cluster.effective_tags["Environment"], "ephemeral");
		assert_eq!(
			created.cluster.effective_tags["ClusterId"],
			created.cluster.id.to_string()
		);
		assert_eq!(
			created.cluster.effective_tags["TTLExpiry"],
			"2025-06-02T12:00:00Z"
		);
		assert_eq!(created.job.job_type, JobType::Create);
		assert_eq!(created.job.status, JobStatus::Pending);
		assert_eq!(created.job.max_attempts, 3);

		let stored = store.clusters.get(created.cluster.id).await.unwrap().unwrap();
		assert_eq!(stored, created.cluster);
		assert_eq!(
			store.jobs.get(created.job.id).await.unwrap().unwrap().cluster_id,
			created.cluster.id
		);
	}

	#[tokio::test]
	async fn test_invalid_request_is_rejected_without_writes() {
		let (service, store, _clock) = service().await;
		let req = CreateClusterRequest {
			version: Some("4.19.0".to_string()),
			..request("test-cluster-01")
		};

		let outcome = service.request_create(&req, None).await.unwrap();
		assert_eq!(outcome.errors().len(), 1);
		assert_eq!(outcome.errors()[0].field, "version");
		assert!(store.clusters.list().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_duplicate_live_name_is_rejected() {
		let (service, store, _clock) = service().await;
		let first = service
			.request_create(&request("test-cluster-01"), None)
			.await
			.unwrap();
		let second = service
			.request_create(&request("test-cluster-01"), None)
			.await
			.unwrap();
		assert_eq!(second.errors()[0].field, "name");
		assert!(second.errors()[0].message.contains("already in use"));

		let first_id = first.created().unwrap().cluster.id;
		store
			.clusters
			.update_status(first_id, ClusterStatus::Destroyed, t0())
			.await
			.unwrap();
		let third = service
			.request_create(&request("test-cluster-01"), None)
			.await
			.unwrap();
		assert!(matches!(third, CreateOutcome::Created(_)));
	}

	#[tokio::test]
	async fn test_idempotent_replay() {
		let (service, store, _clock) = service().await;
		let req = request("test-cluster-01");

		let first = service.request_create(&req, Some("key-1")).await.unwrap();
		let replayed = service.request_create(&req, Some("key-1")).await.unwrap();

		let CreateOutcome::Replayed(again) = replayed else {
			panic!("expected Replayed, got {replayed:?}");
		};
		assert_eq!(&again, first.created().unwrap());
		assert_eq!(store.clusters.list().await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_idempotency_key_reuse_with_other_body() {
		let (service, _store, _clock) = service().await;
		service
			.request_create(&request("test-cluster-01"), Some("key-1"))
			.await
			.unwrap();

		let err = service
			.request_create(&request("test-cluster-02"), Some("key-1"))
			.await
			.unwrap_err();
		assert!(matches!(err, IntakeError::IdempotencyMismatch(key) if key == "key-1"));
	}

	#[tokio::test]
	async fn test_rejection_is_replayed() {
		let (service, _store, _clock) = service().await;
		let req = CreateClusterRequest {
			ttl_hours: Some(1000),
			..request("test-cluster-01")
		};

		let first = service.request_create(&req, Some("key-1")).await.unwrap();
		let again = service.request_create(&req, Some("key-1")).await.unwrap();
		assert_eq!(first.errors(), again.errors());
		assert_eq!(again.errors()[0].field, "ttlHours");
	}

	#[tokio::test]
	async fn test_idempotency_key_expires() {
		let (service, store, clock) = service().await;
		service
			.request_create(&request("test-cluster-01"), Some("key-1"))
			.await
			.unwrap();

		clock.advance(Duration::hours(25));
		let outcome = service
			.request_create(&request("test-cluster-02"), Some("key-1"))
			.await
			.unwrap();
		assert!(matches!(outcome, CreateOutcome::Created(_)));
		assert_eq!(store.clusters.list().await.unwrap().len(), 2);
	}

	#[test]
	fn test_hash_is_stable_and_sensitive() {
		let a = hash_request(&request("test-cluster-01")).unwrap();
		assert_eq!(a, hash_request(&request("test-cluster-01")).unwrap());
		assert_eq!(a.len(), 64);
		assert_ne!(a, hash_request(&request("test-cluster-02")).unwrap());
	}

	#[tokio::test]
	async fn test_destroy_queues_one_job() {
		let (service, store, _clock) = service().await;
		let cluster = ready_cluster(&service, &store, "test-cluster-01").await;

		let first = service.request_destroy(cluster.id).await.unwrap();
		assert_eq!(first.job_type, JobType::Destroy);
		let second = service.request_destroy(cluster.id).await.unwrap();
		assert_eq!(first.id, second.id);
	}

	#[tokio::test]
	async fn test_destroy_refuses_terminal_and_unknown() {
		let (service, store, _clock) = service().await;
		let cluster = ready_cluster(&service, &store, "test-cluster-01").await;
		store
			.clusters
			.update_status(cluster.id, ClusterStatus::Destroyed, t0())
			.await
			.unwrap();

		assert!(matches!(
			service.request_destroy(cluster.id).await,
			Err(IntakeError::ClusterTerminal { .. })
		));
		assert!(matches!(
			service.request_destroy(ClusterId::new()).await,
			Err(IntakeError::ClusterNotFound(_))
		));
	}

	#[tokio::test]
	async fn test_scale_within_bounds() {
		let (service, store, _clock) = service().await;
		let cluster = ready_cluster(&service, &store, "test-cluster-01").await;

		let job = service.request_scale(cluster.id, 4).await.unwrap();
		assert_eq!(job.job_type, JobType::ScaleWorkers);
		assert_eq!(job.metadata, serde_json::json!({"worker_replicas": 4}));

		let err = service.request_scale(cluster.id, 6).await.unwrap_err();
		assert!(matches!(
			err,
			IntakeError::WorkerCountOutOfBounds {
				requested: 6,
				min: 2,
				max: 5
			}
		));
		assert!(service.request_scale(cluster.id, 1).await.is_err());
	}

	#[tokio::test]
	async fn test_scale_requires_ready_cluster() {
		let (service, _store, _clock) = service().await;
		let outcome = service
			.request_create(&request("test-cluster-01"), None)
			.await
			.unwrap();
		let cluster_id = outcome.created().unwrap().cluster.id;

		assert!(matches!(
			service.request_scale(cluster_id, 3).await,
			Err(IntakeError::ClusterNotReady {
				status: ClusterStatus::Pending,
				..
			})
		));
	}
}
