// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tag merging.
//!
//! Tags are layered in a fixed order, each layer overwriting the previous:
//!
//! 1. profile `defaults`
//! 2. profile `required` (fixed values)
//! 3. user `extra_tags`, only when the profile allows user tags
//! 4. system tags derived from the request
//!
//! User tags can never set a reserved key or replace a required one.

use std::collections::BTreeMap;

use cirrus_profiles::Profile;

/// Value of the `ManagedBy` system tag.
pub const MANAGED_BY: &str = "cirrus";

/// Keys users may not set through `extra_tags`.
pub const RESERVED_TAG_KEYS: &[&str] = &[
	"ManagedBy",
	"ClusterId",
	"ClusterName",
	"Owner",
	"Team",
	"CostCenter",
	"Environment",
	"TTLExpiry",
	"RequestId",
	"Profile",
	"Platform",
];

/// Keys stamped from the request on every cluster.
pub const SYSTEM_TAG_KEYS: &[&str] = &[
	"ManagedBy",
	"ClusterName",
	"Owner",
	"Team",
	"CostCenter",
	"Profile",
	"Platform",
];

pub fn is_reserved_tag(key: &str) -> bool {
	RESERVED_TAG_KEYS.contains(&key)
}

/// Inputs for the system tag layer.
#[derive(Debug, Clone, Copy)]
pub struct SystemTagInputs<'a> {
	pub cluster_name: &'a str,
	pub owner: &'a str,
	pub team: &'a str,
	pub cost_center: &'a str,
	pub profile: &'a str,
	pub platform: &'a str,
}

impl SystemTagInputs<'_> {
	pub fn to_tags(&self) -> BTreeMap<String, String> {
		[
			("ManagedBy", MANAGED_BY),
			("ClusterName", self.cluster_name),
			("Owner", self.owner),
			("Team", self.team),
			("CostCenter", self.cost_center),
			("Profile", self.profile),
			("Platform", self.platform),
		]
		.into_iter()
		.map(|(k, v)| (k.to_string(), v.to_string()))
		.collect()
	}
}

pub fn merge_tags(
	profile: &Profile,
	user_tags: &BTreeMap<String, String>,
	system: SystemTagInputs<'_>,
) -> BTreeMap<String, String> {
	let mut merged = profile.tags.defaults.clone();

	for (key, tag) in &profile.tags.required {
		merged.insert(key.clone(), tag.value.clone());
	}

	if profile.tags.allow_user_tags {
		for (key, value) in user_tags {
			if is_reserved_tag(key) || profile.tags.required.contains_key(key) {
				continue;
			}
			merged.insert(key.clone(), value.clone());
		}
	}

	merged.extend(system.to_tags());
	merged
}
