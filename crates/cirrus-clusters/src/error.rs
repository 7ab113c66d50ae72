// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use cirrus_db::{ClusterId, ClusterStatus, DbError};
use cirrus_policy::PolicyError;

pub type Result<T> = std::result::Result<T, IntakeError>;

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
	#[error("idempotency key {0} was already used with a different request")]
	IdempotencyMismatch(String),

	#[error("cluster not found: {0}")]
	ClusterNotFound(ClusterId),

	#[error("cluster {id} is {status} and cannot be changed")]
	ClusterTerminal { id: ClusterId, status: ClusterStatus },

	#[error("cluster {id} is {status}, expected READY")]
	ClusterNotReady { id: ClusterId, status: ClusterStatus },

	#[error("worker count {requested} outside profile bounds [{min}, {max}]")]
	WorkerCountOutOfBounds { requested: u32, min: u32, max: u32 },

	#[error("policy error: {0}")]
	Policy(#[from] PolicyError),

	#[error("database error: {0}")]
	Db(#[from] DbError),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}
