// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

/// Failures from the resource store.
///
/// Conditional writes that lose a race are not errors; they report `false`.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
	/// SQLite rejected the query or could not be reached.
	#[error("store query failed: {0}")]
	Query(#[from] sqlx::Error),

	#[error("invalid database url: {0}")]
	InvalidUrl(String),

	/// A write that would break a record invariant, refused before it reached SQL.
	#[error("rejected write: {0}")]
	Conflict(String),

	/// A stored column that no longer parses as its Rust type.
	#[error("corrupt {column} value {value:?}: {reason}")]
	Corrupt {
		column: &'static str,
		value: String,
		reason: String,
	},

	#[error("malformed JSON column: {0}")]
	Json(#[from] serde_json::Error),
}

impl DbError {
	pub(crate) fn corrupt(column: &'static str, value: impl Into<String>, reason: impl ToString) -> Self {
		Self::Corrupt {
			column,
			value: value.into(),
			reason: reason.to_string(),
		}
	}
}

pub type Result<T> = std::result::Result<T, DbError>;
