// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use std::time::Duration;

use cirrus_clusters::{CreateOutcome, IntakeConfig, IntakeService};
use cirrus_common_core::{SharedClock, SystemClock};
use cirrus_config::{CirrusConfig, ProvisionerConfig, ProvisionerMode};
use cirrus_db::{create_pool, run_migrations, Store};
use cirrus_janitor::{Janitor, JanitorConfig};
use cirrus_policy::PolicyEngine;
use cirrus_profiles::{DirectorySource, ProfileRegistry};
use cirrus_provisioner::{CommandProvisioner, DryRunProvisioner, Provisioner};
use cirrus_worker::{Worker, WorkerConfig};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Result, ServerError};

/// Everything the daemon and the one-shot commands share.
pub struct App {
	pub config: CirrusConfig,
	pub store: Store,
	pub registry: Arc<ProfileRegistry>,
	pub intake: IntakeService,
	clock: SharedClock,
}

impl App {
	pub async fn build(config: CirrusConfig) -> Result<Self> {
		Self::build_with_clock(config, SystemClock::shared()).await
	}

	pub async fn build_with_clock(config: CirrusConfig, clock: SharedClock) -> Result<Self> {
		let registry = Arc::new(ProfileRegistry::load(DirectorySource::new(
			config.profiles.dir.clone(),
		))?);

		let pool = create_pool(&config.database.url).await?;
		run_migrations(&pool).await?;
		let store = Store::sqlite(pool);

		let policy = Arc::new(PolicyEngine::new(Arc::clone(&registry), Arc::clone(&clock)));
		let intake = IntakeService::new(
			policy,
			store.clone(),
			Arc::clone(&clock),
			intake_config(&config),
		);

		Ok(Self {
			config,
			store,
			registry,
			intake,
			clock,
		})
	}

	pub fn worker(&self) -> Result<Worker> {
		Ok(Worker::new(
			self.store.clone(),
			build_provisioner(&self.config.provisioner)?,
			Arc::clone(&self.clock),
			worker_config(&self.config),
		))
	}

	pub fn janitor(&self) -> Janitor {
		Janitor::new(
			self.store.clone(),
			Arc::clone(&self.clock),
			janitor_config(&self.config),
		)
	}

	/// Runs the worker, the janitor (when enabled) and the profile reload
	/// watcher until `cancel` fires and the worker has drained.
	pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
		let worker = self.worker()?;
		let janitor = self.janitor();
		let janitor_enabled = self.config.janitor.enabled;

		info!(
			worker_id = worker.worker_id(),
			provisioner = %self.config.provisioner.mode,
			profiles = self.registry.list(false).len(),
			janitor_enabled,
			"cirrus control plane running"
		);

		tokio::join!(
			worker.run(cancel.clone()),
			async {
				if janitor_enabled {
					janitor.run(cancel.clone()).await;
				}
			},
			watch_profiles(Arc::clone(&self.registry), cancel.clone()),
		);

		Ok(())
	}
}

pub fn build_provisioner(config: &ProvisionerConfig) -> Result<Arc<dyn Provisioner>> {
	match config.mode {
		ProvisionerMode::DryRun => Ok(Arc::new(DryRunProvisioner::new())),
		ProvisionerMode::Command => {
			let program = config
				.command
				.clone()
				.ok_or(ServerError::MissingProvisionerCommand)?;
			Ok(Arc::new(CommandProvisioner::new(program, config.timeout())))
		}
	}
}

pub fn worker_config(config: &CirrusConfig) -> WorkerConfig {
	WorkerConfig {
		worker_id: config.worker.id.clone(),
		concurrency: config.worker.concurrency,
		poll_interval: config.worker.poll_interval(),
		lease_duration: config.worker.lease_duration(),
		drain_timeout: config.worker.drain_timeout(),
	}
}

pub fn janitor_config(config: &CirrusConfig) -> JanitorConfig {
	JanitorConfig {
		check_interval: config.janitor.check_interval(),
		stuck_job_threshold: config.janitor.stuck_job_threshold(),
		max_attempts: config.worker.max_attempts,
	}
}

pub fn intake_config(config: &CirrusConfig) -> IntakeConfig {
	IntakeConfig {
		idempotency_ttl: Duration::from_secs(config.intake.idempotency_ttl_secs),
		max_attempts: config.worker.max_attempts,
	}
}

/// JSON printed by `cirrus-server submit`.
pub fn outcome_json(outcome: &CreateOutcome) -> Value {
	match outcome {
		CreateOutcome::Created(created) | CreateOutcome::Replayed(created) => json!({
			"replayed": matches!(outcome, CreateOutcome::Replayed(_)),
			"cluster": created.cluster,
			"job": created.job,
		}),
		CreateOutcome::Rejected(errors) => json!({
			"valid": false,
			"errors": errors,
		}),
	}
}

#[cfg(unix)]
async fn watch_profiles(registry: Arc<ProfileRegistry>, cancel: CancellationToken) {
	use tokio::signal::unix::{signal, SignalKind};

	let mut hangup = match signal(SignalKind::hangup()) {
		Ok(hangup) => hangup,
		Err(e) => {
			warn!(error = %e, "cannot listen for SIGHUP, profile reload disabled");
			return;
		}
	};

	loop {
		tokio::select! {
			_ = cancel.cancelled() => break,
			received = hangup.recv() => {
				if received.is_none() {
					break;
				}
				match registry.reload() {
					Ok(count) => info!(count, "profiles reloaded on SIGHUP"),
					Err(e) => warn!(error = %e, "profile reload failed, keeping previous profiles"),
				}
			}
		}
	}
}

#[cfg(not(unix))]
async fn watch_profiles(_registry: Arc<ProfileRegistry>, cancel: CancellationToken) {
	cancel.cancelled().await;
}
