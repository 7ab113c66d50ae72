// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::cluster::{ClusterRepository, ClusterStore};
use crate::idempotency::{IdempotencyRepository, IdempotencyStore};
use crate::job::{JobRepository, JobStore};
use crate::lock::{JobLockRepository, JobLockStore};

/// The four stores, shared by the worker, the janitor and the intake service.
#[derive(Clone)]
pub struct Store {
	pub clusters: Arc<dyn ClusterStore>,
	pub jobs: Arc<dyn JobStore>,
	pub locks: Arc<dyn JobLockStore>,
	pub idempotency: Arc<dyn IdempotencyStore>,
}

impl Store {
	/// SQLite-backed stores over one pool.
	pub fn sqlite(pool: SqlitePool) -> Self {
		Self {
			clusters: Arc::new(ClusterRepository::new(pool.clone())),
			jobs: Arc::new(JobRepository::new(pool.clone())),
			locks: Arc::new(JobLockRepository::new(pool.clone())),
			idempotency: Arc::new(IdempotencyRepository::new(pool)),
		}
	}
}
