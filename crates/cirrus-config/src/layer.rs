// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::Deserialize;

use crate::sections::{
	DatabaseConfigLayer, IntakeConfigLayer, JanitorConfigLayer, LoggingConfigLayer,
	ProfilesConfigLayer, ProvisionerConfigLayer, WorkerConfigLayer,
};

/// One source's view of the configuration. Every field is optional so
/// layers can be stacked.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CirrusConfigLayer {
	#[serde(default)]
	pub database: Option<DatabaseConfigLayer>,
	#[serde(default)]
	pub profiles: Option<ProfilesConfigLayer>,
	#[serde(default)]
	pub worker: Option<WorkerConfigLayer>,
	#[serde(default)]
	pub janitor: Option<JanitorConfigLayer>,
	#[serde(default)]
	pub intake: Option<IntakeConfigLayer>,
	#[serde(default)]
	pub provisioner: Option<ProvisionerConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

fn merge_section<T>(base: &mut Option<T>, other: Option<T>, merge: impl FnOnce(&mut T, T)) {
	let Some(other) = other else {
		return;
	};
	if let Some(existing) = base.as_mut() {
		merge(existing, other);
	} else {
		*base = Some(other);
	}
}

impl CirrusConfigLayer {
	/// Overlays `other` on top of `self`; set fields in `other` win.
	pub fn merge(&mut self, other: CirrusConfigLayer) {
		merge_section(&mut self.database, other.database, DatabaseConfigLayer::merge);
		merge_section(&mut self.profiles, other.profiles, ProfilesConfigLayer::merge);
		merge_section(&mut self.worker, other.worker, WorkerConfigLayer::merge);
		merge_section(&mut self.janitor, other.janitor, JanitorConfigLayer::merge);
		merge_section(&mut self.intake, other.intake, IntakeConfigLayer::merge);
		merge_section(
			&mut self.provisioner,
			other.provisioner,
			ProvisionerConfigLayer::merge,
		);
		merge_section(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}
