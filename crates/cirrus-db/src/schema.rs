// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::SqlitePool;

use crate::error::Result;

const SCHEMA: &[&str] = &[
	r#"
	CREATE TABLE IF NOT EXISTS clusters (
		id TEXT PRIMARY KEY,
		name TEXT NOT NULL,
		platform TEXT NOT NULL,
		version TEXT NOT NULL,
		profile TEXT NOT NULL,
		region TEXT NOT NULL,
		base_domain TEXT NOT NULL,
		owner TEXT NOT NULL,
		team TEXT NOT NULL,
		cost_center TEXT NOT NULL,
		status TEXT NOT NULL,
		ttl_hours INTEGER NOT NULL,
		destroy_at TEXT,
		request_tags TEXT NOT NULL,
		effective_tags TEXT NOT NULL,
		offhours_opt_in INTEGER NOT NULL DEFAULT 0,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_clusters_name ON clusters(name)",
	"CREATE INDEX IF NOT EXISTS idx_clusters_status_destroy_at ON clusters(status, destroy_at)",
	r#"
	CREATE TABLE IF NOT EXISTS jobs (
		id TEXT PRIMARY KEY,
		cluster_id TEXT NOT NULL,
		job_type TEXT NOT NULL,
		status TEXT NOT NULL,
		attempt INTEGER NOT NULL DEFAULT 0,
		max_attempts INTEGER NOT NULL,
		error_code TEXT,
		error_message TEXT,
		metadata TEXT NOT NULL DEFAULT '{}',
		locked_by TEXT,
		created_at TEXT NOT NULL,
		started_at TEXT,
		ended_at TEXT,
		retry_after TEXT
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_jobs_status_created_at ON jobs(status, created_at)",
	"CREATE INDEX IF NOT EXISTS idx_jobs_cluster_id ON jobs(cluster_id)",
	r#"
	CREATE TABLE IF NOT EXISTS job_locks (
		cluster_id TEXT PRIMARY KEY,
		job_id TEXT NOT NULL,
		locked_by TEXT NOT NULL,
		locked_at TEXT NOT NULL,
		expires_at TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS idempotency_keys (
		key TEXT PRIMARY KEY,
		request_hash TEXT NOT NULL,
		response_status INTEGER NOT NULL,
		response_body TEXT NOT NULL,
		created_at TEXT NOT NULL,
		expires_at TEXT NOT NULL
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_idempotency_keys_expires_at ON idempotency_keys(expires_at)",
];

/// Creates every table and index. Safe to run on every start.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
	for statement in SCHEMA {
		sqlx::query(statement).execute(pool).await?;
	}
	tracing::debug!(statements = SCHEMA.len(), "schema applied");
	Ok(())
}
