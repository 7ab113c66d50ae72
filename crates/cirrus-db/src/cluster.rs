// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::Result;
use crate::types::{
	decode_opt_ts, decode_ts, encode_ts, parse_column, Cluster, ClusterId, ClusterStatus,
};

const CLUSTER_COLUMNS: &str = "id, name, platform, version, profile, region, base_domain, owner, team, cost_center, status, ttl_hours, destroy_at, request_tags, effective_tags, offhours_opt_in, created_at, updated_at";

#[derive(Clone)]
pub struct ClusterRepository {
	pool: SqlitePool,
}

impl ClusterRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, cluster), fields(cluster_id = %cluster.id, name = %cluster.name))]
	pub async fn create(&self, cluster: &Cluster) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO clusters (id, name, platform, version, profile, region, base_domain, owner, team, cost_center,
				status, ttl_hours, destroy_at, request_tags, effective_tags, offhours_opt_in, created_at, updated_at)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(cluster.id.to_string())
		.bind(&cluster.name)
		.bind(cluster.platform.as_str())
		.bind(&cluster.version)
		.bind(&cluster.profile)
		.bind(&cluster.region)
		.bind(&cluster.base_domain)
		.bind(&cluster.owner)
		.bind(&cluster.team)
		.bind(&cluster.cost_center)
		.bind(cluster.status.as_str())
		.bind(cluster.ttl_hours as i64)
		.bind(cluster.destroy_at.map(encode_ts))
		.bind(serde_json::to_string(&cluster.request_tags)?)
		.bind(serde_json::to_string(&cluster.effective_tags)?)
		.bind(cluster.offhours_opt_in)
		.bind(encode_ts(cluster.created_at))
		.bind(encode_ts(cluster.updated_at))
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self), fields(cluster_id = %id))]
	pub async fn get(&self, id: ClusterId) -> Result<Option<Cluster>> {
		let row = sqlx::query_as::<_, ClusterRow>(&format!(
			"SELECT {CLUSTER_COLUMNS} FROM clusters WHERE id = ?"
		))
		.bind(id.to_string())
		.fetch_optional(&self.pool)
		.await?;

		row.map(Cluster::try_from).transpose()
	}

	/// Most recently created cluster with this name.
	#[tracing::instrument(skip(self))]
	pub async fn get_by_name(&self, name: &str) -> Result<Option<Cluster>> {
		let row = sqlx::query_as::<_, ClusterRow>(&format!(
			"SELECT {CLUSTER_COLUMNS} FROM clusters WHERE name = ? ORDER BY created_at DESC LIMIT 1"
		))
		.bind(name)
		.fetch_optional(&self.pool)
		.await?;

		row.map(Cluster::try_from).transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn list(&self) -> Result<Vec<Cluster>> {
		let rows = sqlx::query_as::<_, ClusterRow>(&format!(
			"SELECT {CLUSTER_COLUMNS} FROM clusters ORDER BY created_at, id"
		))
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(Cluster::try_from).collect()
	}

	/// Clusters past their `destroy_at` that are not already being torn down
	/// or finished.
	#[tracing::instrument(skip(self))]
	pub async fn get_expired_clusters(&self, now: DateTime<Utc>) -> Result<Vec<Cluster>> {
		let rows = sqlx::query_as::<_, ClusterRow>(&format!(
			r#"
			SELECT {CLUSTER_COLUMNS} FROM clusters
			WHERE destroy_at IS NOT NULL
			  AND destroy_at < ?
			  AND status NOT IN ('DESTROYING', 'DESTROYED', 'FAILED')
			ORDER BY destroy_at
			"#
		))
		.bind(encode_ts(now))
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(Cluster::try_from).collect()
	}

	/// Sets the cluster status. `DESTROYED` is final: returns `false` and
	/// changes nothing once a cluster has been destroyed or does not exist.
	#[tracing::instrument(skip(self), fields(cluster_id = %id, status = %status))]
	pub async fn update_status(
		&self,
		id: ClusterId,
		status: ClusterStatus,
		now: DateTime<Utc>,
	) -> Result<bool> {
		let result = sqlx::query(
			"UPDATE clusters SET status = ?, updated_at = ? WHERE id = ? AND status != 'DESTROYED'",
		)
		.bind(status.as_str())
		.bind(encode_ts(now))
		.bind(id.to_string())
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() == 1)
	}
}

#[async_trait]
pub trait ClusterStore: Send + Sync {
	async fn create(&self, cluster: &Cluster) -> Result<()>;
	async fn get(&self, id: ClusterId) -> Result<Option<Cluster>>;
	async fn get_by_name(&self, name: &str) -> Result<Option<Cluster>>;
	async fn list(&self) -> Result<Vec<Cluster>>;
	async fn get_expired_clusters(&self, now: DateTime<Utc>) -> Result<Vec<Cluster>>;
	async fn update_status(
		&self,
		id: ClusterId,
		status: ClusterStatus,
		now: DateTime<Utc>,
	) -> Result<bool>;
}

#[async_trait]
impl ClusterStore for ClusterRepository {
	async fn create(&self, cluster: &Cluster) -> Result<()> {
		self.create(cluster).await
	}

	async fn get(&self, id: ClusterId) -> Result<Option<Cluster>> {
		self.get(id).await
	}

	async fn get_by_name(&self, name: &str) -> Result<Option<Cluster>> {
		self.get_by_name(name).await
	}

	async fn list(&self) -> Result<Vec<Cluster>> {
		self.list().await
	}

	async fn get_expired_clusters(&self, now: DateTime<Utc>) -> Result<Vec<Cluster>> {
		self.get_expired_clusters(now).await
	}

	async fn update_status(
		&self,
		id: ClusterId,
		status: ClusterStatus,
		now: DateTime<Utc>,
	) -> Result<bool> {
		self.update_status(id, status, now).await
	}
}

#[derive(sqlx::FromRow)]
struct ClusterRow {
	id: String,
	name: String,
	platform: String,
	version: String,
	profile: String,
	region: String,
	base_domain: String,
	owner: String,
	team: String,
	cost_center: String,
	status: String,
	ttl_hours: i64,
	destroy_at: Option<String>,
	request_tags: String,
	effective_tags: String,
	offhours_opt_in: bool,
	created_at: String,
	updated_at: String,
}

impl TryFrom<ClusterRow> for Cluster {
	type Error = crate::error::DbError;

	fn try_from(row: ClusterRow) -> Result<Self> {
		Ok(Cluster {
			id: parse_column("cluster id", &row.id)?,
			name: row.name,
			platform: parse_column("platform", &row.platform)?,
			version: row.version,
			profile: row.profile,
			region: row.region,
			base_domain: row.base_domain,
			owner: row.owner,
			team: row.team,
			cost_center: row.cost_center,
			status: parse_column("cluster status", &row.status)?,
			ttl_hours: row.ttl_hours as u32,
			destroy_at: decode_opt_ts("destroy_at", row.destroy_at)?,
			request_tags: serde_json::from_str(&row.request_tags)?,
			effective_tags: serde_json::from_str(&row.effective_tags)?,
			offhours_opt_in: row.offhours_opt_in,
			created_at: decode_ts("created_at", &row.created_at)?,
			updated_at: decode_ts("updated_at", &row.updated_at)?,
		})
	}
}
