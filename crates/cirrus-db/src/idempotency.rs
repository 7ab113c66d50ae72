// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::{DbError, Result};
use crate::types::{decode_ts, encode_ts, IdempotencyKey};

#[derive(Clone)]
pub struct IdempotencyRepository {
	pool: SqlitePool,
}

impl IdempotencyRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Returns the record for `key` unless it has expired.
	#[tracing::instrument(skip(self))]
	pub async fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<IdempotencyKey>> {
		let row = sqlx::query_as::<_, (String, String, i64, String, String, String)>(
			r#"
			SELECT key, request_hash, response_status, response_body, created_at, expires_at
			FROM idempotency_keys
			WHERE key = ? AND expires_at > ?
			"#,
		)
		.bind(key)
		.bind(encode_ts(now))
		.fetch_optional(&self.pool)
		.await?;

		row
			.map(
				|(key, request_hash, response_status, response_body, created_at, expires_at)| {
					Ok::<_, DbError>(IdempotencyKey {
						key,
						request_hash,
						response_status: u16::try_from(response_status).map_err(|_| {
							DbError::corrupt("response_status", response_status.to_string(), "not an HTTP status")
						})?,
						response_body: serde_json::from_str(&response_body)?,
						created_at: decode_ts("created_at", &created_at)?,
						expires_at: decode_ts("expires_at", &expires_at)?,
					})
				},
			)
			.transpose()
	}

	/// Stores the record. The first writer wins: returns `false` when a live
	/// record for the key already exists. An expired record is replaced.
	#[tracing::instrument(skip(self, record), fields(key = %record.key))]
	pub async fn put(&self, record: &IdempotencyKey) -> Result<bool> {
		let result = sqlx::query(
			r#"
			INSERT INTO idempotency_keys (key, request_hash, response_status, response_body, created_at, expires_at)
			VALUES (?, ?, ?, ?, ?, ?)
			ON CONFLICT(key) DO UPDATE SET
				request_hash = excluded.request_hash,
				response_status = excluded.response_status,
				response_body = excluded.response_body,
				created_at = excluded.created_at,
				expires_at = excluded.expires_at
			WHERE idempotency_keys.expires_at <= excluded.created_at
			"#,
		)
		.bind(&record.key)
		.bind(&record.request_hash)
		.bind(i64::from(record.response_status))
		.bind(record.response_body.to_string())
		.bind(encode_ts(record.created_at))
		.bind(encode_ts(record.expires_at))
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() == 1)
	}

	#[tracing::instrument(skip(self))]
	pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64> {
		let result = sqlx::query("DELETE FROM idempotency_keys WHERE expires_at <= ?")
			.bind(encode_ts(now))
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
	async fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<IdempotencyKey>>;
	async fn put(&self, record: &IdempotencyKey) -> Result<bool>;
	async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
impl IdempotencyStore for IdempotencyRepository {
	async fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<IdempotencyKey>> {
		self.get(key, now).await
	}

	async fn put(&self, record: &IdempotencyKey) -> Result<bool> {
		self.put(record).await
	}

	async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64> {
		self.cleanup_expired(now).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_pool;
	use chrono::{Duration, TimeZone};
	use serde_json::json;

	fn t0() -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
	}

	fn record(key: &str, hash: &str, now: DateTime<Utc>) -> IdempotencyKey {
		IdempotencyKey::new(
			key,
			hash,
			201,
			json!({"cluster_id": "abc"}),
			now,
			Duration::hours(24),
		)
	}

	#[tokio::test]
	async fn test_put_and_get() {
		let repo = IdempotencyRepository::new(create_test_pool().await);
		let rec = record("k1", "hash-a", t0());
		assert!(repo.put(&rec).await.unwrap());

		let fetched = repo.get("k1", t0()).await.unwrap().unwrap();
		assert_eq!(fetched, rec);
		assert!(repo.get("missing", t0()).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_first_writer_wins() {
		let repo = IdempotencyRepository::new(create_test_pool().await);
		assert!(repo.put(&record("k1", "hash-a", t0())).await.unwrap());
		assert!(!repo.put(&record("k1", "hash-b", t0())).await.unwrap());

		let fetched = repo.get("k1", t0()).await.unwrap().unwrap();
		assert_eq!(fetched.request_hash, "hash-a");
	}

	#[tokio::test]
	async fn test_expired_record_is_invisible_and_replaceable() {
		let repo = IdempotencyRepository::new(create_test_pool().await);
		repo.put(&record("k1", "hash-a", t0())).await.unwrap();

		let later = t0() + Duration::hours(25);
		assert!(repo.get("k1", later).await.unwrap().is_none());
		assert!(repo.put(&record("k1", "hash-b", later)).await.unwrap());
		assert_eq!(
			repo.get("k1", later).await.unwrap().unwrap().request_hash,
			"hash-b"
		);
	}

	#[tokio::test]
	async fn test_cleanup_expired() {
		let repo = IdempotencyRepository::new(create_test_pool().await);
		repo.put(&record("old", "h", t0())).await.unwrap();
		repo
			.put(&record("new", "h", t0() + Duration::hours(20)))
			.await
			.unwrap();

		let removed = repo
			.cleanup_expired(t0() + Duration::hours(24))
			.await
			.unwrap();
		assert_eq!(removed, 1);
		assert_eq!(repo.cleanup_expired(t0() + Duration::hours(24)).await.unwrap(), 0);
	}
}
