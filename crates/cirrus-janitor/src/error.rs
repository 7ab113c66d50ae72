// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use cirrus_db::DbError;

pub type Result<T> = std::result::Result<T, JanitorError>;

#[derive(Debug, thiserror::Error)]
pub enum JanitorError {
	#[error("Database error: {0}")]
	Db(#[from] DbError),
}
