// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::{Arc, LazyLock};

use chrono::Duration;
use cirrus_common_core::SharedClock;
use cirrus_profiles::{Profile, ProfileError, ProfileRegistry};
use regex::Regex;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::tags::{is_reserved_tag, merge_tags, SystemTagInputs};
use crate::types::{CreateClusterRequest, ResolvedRequest, ValidationError, ValidationResult};

static CLUSTER_NAME_REGEX: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$").unwrap());

const NAME_MIN_LEN: usize = 3;
const NAME_MAX_LEN: usize = 63;

pub fn is_valid_cluster_name(name: &str) -> bool {
	(NAME_MIN_LEN..=NAME_MAX_LEN).contains(&name.len()) && CLUSTER_NAME_REGEX.is_match(name)
}

pub struct PolicyEngine {
	registry: Arc<ProfileRegistry>,
	clock: SharedClock,
}

impl PolicyEngine {
	pub fn new(registry: Arc<ProfileRegistry>, clock: SharedClock) -> Self {
		Self { registry, clock }
	}

	pub fn registry(&self) -> &Arc<ProfileRegistry> {
		&self.registry
	}

	/// Validates a creation request against its profile.
	///
	/// All checks run independently so a caller sees every problem at once.
	#[instrument(skip(self, req), fields(cluster_name = %req.name, profile = %req.profile))]
	pub fn validate_create_request(&self, req: &CreateClusterRequest) -> Result<ValidationResult> {
		let profile = match self.registry.get(&req.profile) {
			Ok(profile) => profile,
			Err(ProfileError::NotFound(name)) => {
				return Ok(ValidationResult::rejected(vec![ValidationError::new(
					"profile",
					format!("profile {name} not found"),
				)]));
			}
			Err(e) => return Err(e.into()),
		};

		if !profile.enabled {
			return Ok(ValidationResult::rejected(vec![ValidationError::new(
				"profile",
				format!("profile {} is disabled", profile.name),
			)]));
		}

		let version = req
			.version
			.clone()
			.unwrap_or_else(|| profile.versions.default.clone());
		let region = req
			.region
			.clone()
			.unwrap_or_else(|| profile.regions.default.clone());
		let base_domain = req
			.base_domain
			.clone()
			.unwrap_or_else(|| profile.base_domains.default.clone());
		let ttl_hours = req.ttl_hours.unwrap_or(profile.lifecycle.default_ttl_hours);

		let mut errors = Vec::new();

		if !is_valid_cluster_name(&req.name) {
			errors.push(ValidationError::new(
				"name",
				format!(
					"name {:?} must be {NAME_MIN_LEN}-{NAME_MAX_LEN} lowercase alphanumerics or hyphens, starting and ending with an alphanumeric",
					req.name
				),
			));
		}

		if let Some(platform) = req.platform {
			if platform != profile.platform {
				errors.push(ValidationError::new(
					"platform",
					format!(
						"platform {platform} does not match profile platform {}",
						profile.platform
					),
				));
			}
		}

		for (field, value, list) in [
			("version", &version, &profile.versions),
			("region", &region, &profile.regions),
			("baseDomain", &base_domain, &profile.base_domains),
		] {
			if !list.contains(value) {
				errors.push(ValidationError::new(
					field,
					format!("{field} {value} not in profile allowlist: {}", list.display()),
				));
			}
		}

		errors.extend(check_ttl(&profile, ttl_hours));
		errors.extend(check_extra_tags(&profile, req));

		if req.offhours_opt_in && !profile.features.offhours_scaling {
			errors.push(ValidationError::new(
				"offhoursOptIn",
				format!(
					"profile {} does not support off-hours scaling",
					profile.name
				),
			));
		}

		if !errors.is_empty() {
			debug!(error_count = errors.len(), "request rejected");
			return Ok(ValidationResult::rejected(errors));
		}

		let platform = profile.platform;
		let effective_tags = merge_tags(
			&profile,
			&req.extra_tags,
			SystemTagInputs {
				cluster_name: &req.name,
				owner: &req.owner,
				team: &req.team,
				cost_center: &req.cost_center,
				profile: &profile.name,
				platform: platform.as_str(),
			},
		);

		let destroy_at = self.clock.now() + Duration::hours(i64::from(ttl_hours));

		Ok(ValidationResult::accepted(ResolvedRequest {
			name: req.name.clone(),
			profile: profile.name.clone(),
			platform,
			version,
			region,
			base_domain,
			owner: req.owner.clone(),
			team: req.team.clone(),
			cost_center: req.cost_center.clone(),
			ttl_hours,
			destroy_at,
			request_tags: req.extra_tags.clone(),
			effective_tags,
			offhours_opt_in: req.offhours_opt_in,
		}))
	}

	pub fn default_version(&self, profile: &str) -> Result<String> {
		Ok(self.registry.get(profile)?.versions.default.clone())
	}

	pub fn default_region(&self, profile: &str) -> Result<String> {
		Ok(self.registry.get(profile)?.regions.default.clone())
	}

	pub fn default_ttl(&self, profile: &str) -> Result<u32> {
		Ok(self.registry.get(profile)?.lifecycle.default_ttl_hours)
	}
}

fn check_ttl(profile: &Profile, ttl_hours: u32) -> Option<ValidationError> {
	let lifecycle = &profile.lifecycle;
	if ttl_hours == 0 {
		return Some(ValidationError::new(
			"ttlHours",
			"ttlHours must be greater than 0",
		));
	}
	if ttl_hours > lifecycle.max_ttl_hours {
		return Some(ValidationError::new(
			"ttlHours",
			format!(
				"ttlHours {ttl_hours} exceeds profile maximum of {}",
				lifecycle.max_ttl_hours
			),
		));
	}
	if !lifecycle.allow_custom_ttl && ttl_hours != lifecycle.default_ttl_hours {
		return Some(ValidationError::new(
			"ttlHours",
			format!(
				"profile {} does not allow custom TTLs; ttlHours must be {}",
				profile.name, lifecycle.default_ttl_hours
			),
		));
	}
	None
}

fn check_extra_tags(profile: &Profile, req: &CreateClusterRequest) -> Vec<ValidationError> {
	let mut errors: Vec<_> = req
		.extra_tags
		.keys()
		.filter(|key| is_reserved_tag(key))
		.map(|key| ValidationError::new("extraTags", format!("tag key {key} is reserved")))
		.collect();

	if !profile.tags.allow_user_tags && !req.extra_tags.is_empty() {
		errors.push(ValidationError::new(
			"extraTags",
			format!("profile {} does not allow user tags", profile.name),
		));
	}
	errors
}
