// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Profile data model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Cloud platform a profile provisions onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
	Aws,
	Azure,
	Gcp,
}

impl Platform {
	pub fn as_str(&self) -> &'static str {
		match self {
			Platform::Aws => "aws",
			Platform::Azure => "azure",
			Platform::Gcp => "gcp",
		}
	}
}

impl fmt::Display for Platform {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Platform {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"aws" => Ok(Platform::Aws),
			"azure" => Ok(Platform::Azure),
			"gcp" => Ok(Platform::Gcp),
			_ => Err(format!("unknown platform: {s}")),
		}
	}
}

/// An allow-list plus the default picked when a request omits the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowList {
	pub allowed: Vec<String>,
	pub default: String,
}

impl AllowList {
	pub fn contains(&self, value: &str) -> bool {
		self.allowed.iter().any(|v| v == value)
	}

	/// Renders the allow-list the way validation messages quote it: `[a, b]`.
	pub fn display(&self) -> String {
		format!("[{}]", self.allowed.join(", "))
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlPlaneShape {
	pub replicas: u32,
	pub instance_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerShape {
	pub replicas: u32,
	pub instance_type: String,
	/// Lower bound for autoscaling and scale requests.
	pub min: u32,
	/// Upper bound for autoscaling and scale requests.
	pub max: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeShape {
	pub control_plane: ControlPlaneShape,
	pub workers: WorkerShape,
}

/// TTL limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
	pub max_ttl_hours: u32,
	pub default_ttl_hours: u32,
	#[serde(default = "default_true")]
	pub allow_custom_ttl: bool,
}

/// A tag the profile always stamps on clusters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredTag {
	pub value: String,
	/// Values this tag is permitted to take. Empty means unconstrained.
	#[serde(default)]
	pub allowed: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagPolicy {
	#[serde(default)]
	pub required: BTreeMap<String, RequiredTag>,
	#[serde(default)]
	pub defaults: BTreeMap<String, String>,
	#[serde(default = "default_true")]
	pub allow_user_tags: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Features {
	#[serde(default)]
	pub offhours_scaling: bool,
	#[serde(default)]
	pub fips: bool,
	#[serde(default)]
	pub private: bool,
}

/// A named cluster template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
	pub name: String,
	#[serde(default)]
	pub display_name: String,
	#[serde(default)]
	pub description: String,
	#[serde(default = "default_true")]
	pub enabled: bool,
	pub platform: Platform,
	pub versions: AllowList,
	pub regions: AllowList,
	pub base_domains: AllowList,
	pub compute: ComputeShape,
	pub lifecycle: Lifecycle,
	#[serde(default)]
	pub tags: TagPolicy,
	#[serde(default)]
	pub features: Features,
}

fn default_true() -> bool {
	true
}

impl Profile {
	/// Returns every structural problem with this profile. Empty means valid.
	pub fn problems(&self) -> Vec<String> {
		let mut problems = Vec::new();

		if self.name.trim().is_empty() {
			problems.push("name must not be empty".to_string());
		}

		for (field, list) in [
			("versions", &self.versions),
			("regions", &self.regions),
			("base_domains", &self.base_domains),
		] {
			if list.allowed.is_empty() {
				problems.push(format!("{field}.allowed must not be empty"));
			} else if !list.contains(&list.default) {
				problems.push(format!(
					"{field}.default {} not in allowlist {}",
					list.default,
					list.display()
				));
			}
		}

		let cp = &self.compute.control_plane;
		if cp.replicas == 0 || cp.replicas % 2 == 0 {
			problems.push(format!(
				"compute.control_plane.replicas must be odd, got {}",
				cp.replicas
			));
		}

		let workers = &self.compute.workers;
		if workers.min > workers.max {
			problems.push(format!(
				"compute.workers.min {} exceeds max {}",
				workers.min, workers.max
			));
		} else if workers.replicas < workers.min || workers.replicas > workers.max {
			problems.push(format!(
				"compute.workers.replicas {} outside [{}, {}]",
				workers.replicas, workers.min, workers.max
			));
		}

		let lifecycle = &self.lifecycle;
		if lifecycle.default_ttl_hours == 0 {
			problems.push("lifecycle.default_ttl_hours must be positive".to_string());
		}
		if lifecycle.default_ttl_hours > lifecycle.max_ttl_hours {
			problems.push(format!(
				"lifecycle.default_ttl_hours {} exceeds max_ttl_hours {}",
				lifecycle.default_ttl_hours, lifecycle.max_ttl_hours
			));
		}

		for (key, tag) in &self.tags.required {
			if !tag.allowed.is_empty() && !tag.allowed.contains(&tag.value) {
				problems.push(format!(
					"tags.required.{key} value {} not in [{}]",
					tag.value,
					tag.allowed.join(", ")
				));
			}
		}

		problems
	}

	pub fn ttl_in_bounds(&self, ttl_hours: u32) -> bool {
		ttl_hours > 0 && ttl_hours <= self.lifecycle.max_ttl_hours
	}

	pub fn workers_in_bounds(&self, replicas: u32) -> bool {
		replicas >= self.compute.workers.min && replicas <= self.compute.workers.max
	}
}
