// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Resource store for Cirrus.
//!
//! Clusters, jobs, per-cluster locks and idempotency keys live in SQLite.
//! Each record type has a repository over a [`sqlx::SqlitePool`] and an
//! `async_trait` store trait the worker, janitor and intake service depend
//! on. Every method that compares against the current time takes `now`
//! explicitly.

pub mod cluster;
pub mod error;
pub mod idempotency;
pub mod job;
pub mod lock;
pub mod pool;
pub mod schema;
pub mod store;
pub mod testing;
pub mod types;

pub use cluster::{ClusterRepository, ClusterStore};
pub use error::{DbError, Result};
pub use idempotency::{IdempotencyRepository, IdempotencyStore};
pub use job::{JobRepository, JobStore};
pub use lock::{JobLockRepository, JobLockStore};
pub use pool::create_pool;
pub use schema::run_migrations;
pub use store::Store;
pub use types::{
	Cluster, ClusterId, ClusterStatus, IdempotencyKey, Job, JobId, JobLock, JobStatus, JobType,
};

pub use sqlx::SqlitePool;
