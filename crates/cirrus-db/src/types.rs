// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Resource records and their status enums.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use cirrus_profiles::Platform;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DbError, Result};

macro_rules! uuid_id {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(pub Uuid);

		impl $name {
			pub fn new() -> Self {
				Self(Uuid::new_v4())
			}
		}

		impl Default for $name {
			fn default() -> Self {
				Self::new()
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl FromStr for $name {
			type Err = uuid::Error;

			fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
				Ok(Self(Uuid::parse_str(s)?))
			}
		}
	};
}

uuid_id!(
	/// Cluster identifier.
	ClusterId
);
uuid_id!(
	/// Job identifier.
	JobId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterStatus {
	Pending,
	Creating,
	Ready,
	Destroying,
	Destroyed,
	Failed,
}

impl ClusterStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			ClusterStatus::Pending => "PENDING",
			ClusterStatus::Creating => "CREATING",
			ClusterStatus::Ready => "READY",
			ClusterStatus::Destroying => "DESTROYING",
			ClusterStatus::Destroyed => "DESTROYED",
			ClusterStatus::Failed => "FAILED",
		}
	}

	pub fn is_terminal(&self) -> bool {
		matches!(self, ClusterStatus::Destroyed | ClusterStatus::Failed)
	}
}

impl fmt::Display for ClusterStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ClusterStatus {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"PENDING" => Ok(ClusterStatus::Pending),
			"CREATING" => Ok(ClusterStatus::Creating),
			"READY" => Ok(ClusterStatus::Ready),
			"DESTROYING" => Ok(ClusterStatus::Destroying),
			"DESTROYED" => Ok(ClusterStatus::Destroyed),
			"FAILED" => Ok(ClusterStatus::Failed),
			_ => Err(format!("unknown cluster status: {s}")),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
	Create,
	Destroy,
	ScaleWorkers,
	JanitorDestroy,
	OrphanSweep,
}

impl JobType {
	pub fn as_str(&self) -> &'static str {
		match self {
			JobType::Create => "CREATE",
			JobType::Destroy => "DESTROY",
			JobType::ScaleWorkers => "SCALE_WORKERS",
			JobType::JanitorDestroy => "JANITOR_DESTROY",
			JobType::OrphanSweep => "ORPHAN_SWEEP",
		}
	}

	/// Job types that tear a cluster down.
	pub const DESTROYING: &'static [JobType] = &[JobType::Destroy, JobType::JanitorDestroy];

	pub fn is_destroy(&self) -> bool {
		matches!(self, JobType::Destroy | JobType::JanitorDestroy)
	}
}

impl fmt::Display for JobType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for JobType {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"CREATE" => Ok(JobType::Create),
			"DESTROY" => Ok(JobType::Destroy),
			"SCALE_WORKERS" => Ok(JobType::ScaleWorkers),
			"JANITOR_DESTROY" => Ok(JobType::JanitorDestroy),
			"ORPHAN_SWEEP" => Ok(JobType::OrphanSweep),
			_ => Err(format!("unknown job type: {s}")),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
	Pending,
	Running,
	Succeeded,
	Failed,
	Retrying,
}

impl JobStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			JobStatus::Pending => "PENDING",
			JobStatus::Running => "RUNNING",
			JobStatus::Succeeded => "SUCCEEDED",
			JobStatus::Failed => "FAILED",
			JobStatus::Retrying => "RETRYING",
		}
	}

	pub fn is_terminal(&self) -> bool {
		matches!(self, JobStatus::Succeeded | JobStatus::Failed)
	}

	/// Whether a job is still competing for its cluster.
	pub fn is_active(&self) -> bool {
		matches!(self, JobStatus::Pending | JobStatus::Running)
	}

	/// The job state machine. `Failed` is also reachable from `Pending` and
	/// `Retrying` so an operator or the janitor can force a job out.
	pub fn can_transition_to(&self, next: JobStatus) -> bool {
		use JobStatus::*;
		matches!(
			(self, next),
			(Pending, Running)
				| (Pending, Failed)
				| (Running, Succeeded)
				| (Running, Retrying)
				| (Running, Failed)
				| (Retrying, Pending)
				| (Retrying, Failed)
		)
	}
}

impl fmt::Display for JobStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for JobStatus {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"PENDING" => Ok(JobStatus::Pending),
			"RUNNING" => Ok(JobStatus::Running),
			"SUCCEEDED" => Ok(JobStatus::Succeeded),
			"FAILED" => Ok(JobStatus::Failed),
			"RETRYING" => Ok(JobStatus::Retrying),
			_ => Err(format!("unknown job status: {s}")),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
	pub id: ClusterId,
	pub name: String,
	pub platform: Platform,
	pub version: String,
	pub profile: String,
	pub region: String,
	pub base_domain: String,
	pub owner: String,
	pub team: String,
	pub cost_center: String,
	pub status: ClusterStatus,
	pub ttl_hours: u32,
	pub destroy_at: Option<DateTime<Utc>>,
	pub request_tags: BTreeMap<String, String>,
	pub effective_tags: BTreeMap<String, String>,
	pub offhours_opt_in: bool,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
	pub id: JobId,
	pub cluster_id: ClusterId,
	pub job_type: JobType,
	pub status: JobStatus,
	pub attempt: u32,
	pub max_attempts: u32,
	pub error_code: Option<String>,
	pub error_message: Option<String>,
	pub metadata: serde_json::Value,
	pub locked_by: Option<String>,
	pub created_at: DateTime<Utc>,
	pub started_at: Option<DateTime<Utc>>,
	pub ended_at: Option<DateTime<Utc>>,
	pub retry_after: Option<DateTime<Utc>>,
}

impl Job {
	/// A fresh PENDING job.
	pub fn new(
		cluster_id: ClusterId,
		job_type: JobType,
		max_attempts: u32,
		metadata: serde_json::Value,
		now: DateTime<Utc>,
	) -> Self {
		Self {
			id: JobId::new(),
			cluster_id,
			job_type,
			status: JobStatus::Pending,
			attempt: 0,
			max_attempts,
			error_code: None,
			error_message: None,
			metadata,
			locked_by: None,
			created_at: now,
			started_at: None,
			ended_at: None,
			retry_after: None,
		}
	}
}

/// Lease on a cluster held by one worker for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobLock {
	pub cluster_id: ClusterId,
	pub job_id: JobId,
	pub locked_by: String,
	pub locked_at: DateTime<Utc>,
	pub expires_at: DateTime<Utc>,
}

impl JobLock {
	pub fn is_live(&self, now: DateTime<Utc>) -> bool {
		self.expires_at > now
	}
}

/// A cached response for a client-supplied idempotency key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyKey {
	pub key: String,
	pub request_hash: String,
	pub response_status: u16,
	pub response_body: serde_json::Value,
	pub created_at: DateTime<Utc>,
	pub expires_at: DateTime<Utc>,
}

impl IdempotencyKey {
	pub fn new(
		key: impl Into<String>,
		request_hash: impl Into<String>,
		response_status: u16,
		response_body: serde_json::Value,
		now: DateTime<Utc>,
		ttl: Duration,
	) -> Self {
		Self {
			key: key.into(),
			request_hash: request_hash.into(),
			response_status,
			response_body,
			created_at: now,
			expires_at: now + ttl,
		}
	}
}

// Fixed-width so that string comparison in SQL orders chronologically.
pub(crate) fn encode_ts(ts: DateTime<Utc>) -> String {
	ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_ts(column: &'static str, value: &str) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(value)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| DbError::corrupt(column, value, e))
}

pub(crate) fn decode_opt_ts(column: &'static str, value: Option<String>) -> Result<Option<DateTime<Utc>>> {
	value.map(|v| decode_ts(column, &v)).transpose()
}

pub(crate) fn parse_column<T: FromStr>(column: &'static str, value: &str) -> Result<T>
where
	T::Err: fmt::Display,
{
	value
		.parse()
		.map_err(|e: T::Err| DbError::corrupt(column, value, e))
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	#[test]
	fn test_enum_roundtrips() {
		for status in [
			ClusterStatus::Pending,
			ClusterStatus::Creating,
			ClusterStatus::Ready,
			ClusterStatus::Destroying,
			ClusterStatus::Destroyed,
			ClusterStatus::Failed,
		] {
			assert_eq!(status.as_str().parse::<ClusterStatus>().unwrap(), status);
		}
		for job_type in [
			JobType::Create,
			JobType::Destroy,
			JobType::ScaleWorkers,
			JobType::JanitorDestroy,
			JobType::OrphanSweep,
		] {
			assert_eq!(job_type.as_str().parse::<JobType>().unwrap(), job_type);
			assert_eq!(
				serde_json::to_value(job_type).unwrap(),
				serde_json::Value::String(job_type.as_str().to_string())
			);
		}
		assert!("running".parse::<JobStatus>().is_err());
	}

	#[test]
	fn test_terminal_job_states_are_absorbing() {
		let all = [
			JobStatus::Pending,
			JobStatus::Running,
			JobStatus::Succeeded,
			JobStatus::Failed,
			JobStatus::Retrying,
		];
		for from in [JobStatus::Succeeded, JobStatus::Failed] {
			for to in all {
				assert!(!from.can_transition_to(to), "{from} -> {to}");
			}
		}
		assert!(JobStatus::Pending.can_transition_to(JobStatus::Running));
		assert!(JobStatus::Retrying.can_transition_to(JobStatus::Pending));
		assert!(!JobStatus::Retrying.can_transition_to(JobStatus::Running));
		assert!(!JobStatus::Pending.can_transition_to(JobStatus::Succeeded));
	}

	#[test]
	fn test_timestamp_encoding_is_fixed_width() {
		let whole = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
		let fractional = whole + Duration::microseconds(1);
		let a = encode_ts(whole);
		let b = encode_ts(fractional);
		assert_eq!(a.len(), b.len());
		assert!(a < b);
		assert_eq!(decode_ts("t", &a).unwrap(), whole);
	}

	#[test]
	fn test_ids_parse() {
		let id = ClusterId::new();
		assert_eq!(id.to_string().parse::<ClusterId>().unwrap(), id);
		assert!("not-a-uuid".parse::<JobId>().is_err());
	}

	#[test]
	fn test_lock_liveness() {
		let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
		let lock = JobLock {
			cluster_id: ClusterId::new(),
			job_id: JobId::new(),
			locked_by: "w1".to_string(),
			locked_at: now,
			expires_at: now + Duration::minutes(5),
		};
		assert!(lock.is_live(now));
		assert!(!lock.is_live(now + Duration::minutes(5)));
	}
}
