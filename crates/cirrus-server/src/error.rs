// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
	#[error("configuration error: {0}")]
	Config(#[from] cirrus_config::ConfigError),

	#[error("profile error: {0}")]
	Profiles(#[from] cirrus_profiles::ProfileError),

	#[error("database error: {0}")]
	Db(#[from] cirrus_db::DbError),

	#[error("intake error: {0}")]
	Intake(#[from] cirrus_clusters::IntakeError),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("invalid JSON: {0}")]
	Json(#[from] serde_json::Error),

	#[error("command provisioner requires provisioner.command")]
	MissingProvisionerCommand,
}
