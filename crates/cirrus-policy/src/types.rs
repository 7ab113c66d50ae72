// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use cirrus_profiles::Platform;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A user's request for a new cluster.
///
/// Optional fields fall back to the profile's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClusterRequest {
	pub name: String,
	pub profile: String,
	#[serde(default)]
	pub platform: Option<Platform>,
	#[serde(default)]
	pub version: Option<String>,
	#[serde(default)]
	pub region: Option<String>,
	#[serde(default)]
	pub base_domain: Option<String>,
	#[serde(default)]
	pub owner: String,
	#[serde(default)]
	pub team: String,
	#[serde(default)]
	pub cost_center: String,
	#[serde(default)]
	pub ttl_hours: Option<u32>,
	#[serde(default)]
	pub extra_tags: BTreeMap<String, String>,
	#[serde(default)]
	pub offhours_opt_in: bool,
}

/// A single field-level problem with a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
	pub field: String,
	pub message: String,
}

impl ValidationError {
	pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			field: field.into(),
			message: message.into(),
		}
	}
}

impl std::fmt::Display for ValidationError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}: {}", self.field, self.message)
	}
}

/// A request with every default filled in, ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRequest {
	pub name: String,
	pub profile: String,
	pub platform: Platform,
	pub version: String,
	pub region: String,
	pub base_domain: String,
	pub owner: String,
	pub team: String,
	pub cost_center: String,
	pub ttl_hours: u32,
	pub destroy_at: DateTime<Utc>,
	pub request_tags: BTreeMap<String, String>,
	pub effective_tags: BTreeMap<String, String>,
	pub offhours_opt_in: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
	pub valid: bool,
	pub errors: Vec<ValidationError>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub resolved: Option<ResolvedRequest>,
}

impl ValidationResult {
	pub fn accepted(resolved: ResolvedRequest) -> Self {
		Self {
			valid: true,
			errors: Vec::new(),
			resolved: Some(resolved),
		}
	}

	pub fn rejected(errors: Vec<ValidationError>) -> Self {
		Self {
			valid: false,
			errors,
			resolved: None,
		}
	}

	pub fn errors_for(&self, field: &str) -> impl Iterator<Item = &ValidationError> {
		let field = field.to_string();
		self.errors.iter().filter(move |e| e.field == field)
	}
}
