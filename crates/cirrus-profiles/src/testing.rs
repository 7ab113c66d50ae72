// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::types::{
	AllowList, ComputeShape, ControlPlaneShape, Features, Lifecycle, Platform, Profile, TagPolicy,
	WorkerShape,
};

/// Builds an allow-list whose default is the first value.
pub fn list(values: &[&str]) -> AllowList {
	AllowList {
		allowed: values.iter().map(|v| v.to_string()).collect(),
		default: values.first().map(|v| v.to_string()).unwrap_or_default(),
	}
}

/// A valid single-region AWS profile with workers in `[2, 6]` and a 72h TTL cap.
pub fn minimal(name: &str) -> Profile {
	Profile {
		name: name.to_string(),
		display_name: "Minimal".to_string(),
		description: String::new(),
		enabled: true,
		platform: Platform::Aws,
		versions: list(&["4.20.3"]),
		regions: list(&["us-east-1"]),
		base_domains: list(&["example.com"]),
		compute: ComputeShape {
			control_plane: ControlPlaneShape {
				replicas: 3,
				instance_type: "m6i.xlarge".to_string(),
			},
			workers: WorkerShape {
				replicas: 2,
				instance_type: "m6i.large".to_string(),
				min: 2,
				max: 6,
			},
		},
		lifecycle: Lifecycle {
			max_ttl_hours: 72,
			default_ttl_hours: 24,
			allow_custom_ttl: true,
		},
		tags: TagPolicy::default(),
		features: Features::default(),
	}
}

pub const MINIMAL_TOML: &str = r#"
name = "aws-minimal-test"
display_name = "AWS minimal (test)"
platform = "aws"

[versions]
allowed = ["4.20.3"]
default = "4.20.3"

[regions]
allowed = ["us-east-1"]
default = "us-east-1"

[base_domains]
allowed = ["example.com"]
default = "example.com"

[compute.control_plane]
replicas = 3
instance_type = "m6i.xlarge"

[compute.workers]
replicas = 2
instance_type = "m6i.large"
min = 2
max = 5

[lifecycle]
max_ttl_hours = 72
default_ttl_hours = 24

[tags.required.Environment]
value = "ephemeral"

[tags.defaults]
Department = "engineering"

[features]
offhours_scaling = true
"#;

/// Parses [`MINIMAL_TOML`].
pub fn minimal_from_toml() -> Profile {
	toml::from_str(MINIMAL_TOML).unwrap()
}
