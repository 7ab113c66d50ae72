// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory profile registry with atomic reload.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, instrument, warn};

use crate::error::{ProfileError, Result};
use crate::loader::ProfileSource;
use crate::types::{Platform, Profile};

/// An immutable, validated set of profiles keyed by name.
#[derive(Debug, Default)]
pub struct ProfileSet {
	profiles: BTreeMap<String, Arc<Profile>>,
}

impl ProfileSet {
	/// Validates every profile and rejects the whole set on the first bad one.
	pub fn from_profiles(profiles: Vec<Profile>) -> Result<Self> {
		let mut map = BTreeMap::new();
		for profile in profiles {
			let problems = profile.problems();
			if !problems.is_empty() {
				return Err(ProfileError::Invalid {
					name: profile.name.clone(),
					problems,
				});
			}
			if map.contains_key(&profile.name) {
				return Err(ProfileError::Duplicate(profile.name));
			}
			map.insert(profile.name.clone(), Arc::new(profile));
		}
		Ok(Self { profiles: map })
	}

	pub fn get(&self, name: &str) -> Option<Arc<Profile>> {
		self.profiles.get(name).cloned()
	}

	pub fn list(&self, enabled_only: bool) -> Vec<Arc<Profile>> {
		self
			.profiles
			.values()
			.filter(|p| !enabled_only || p.enabled)
			.cloned()
			.collect()
	}

	pub fn list_by_platform(&self, platform: Platform) -> Vec<Arc<Profile>> {
		self
			.profiles
			.values()
			.filter(|p| p.platform == platform)
			.cloned()
			.collect()
	}

	pub fn len(&self) -> usize {
		self.profiles.len()
	}

	pub fn is_empty(&self) -> bool {
		self.profiles.is_empty()
	}
}

/// Concurrently readable profile cache.
///
/// Readers clone an `Arc<ProfileSet>` under a short read lock and never see a
/// partially loaded set. `reload` reads and validates outside the lock and
/// only takes the write lock to swap the pointer.
pub struct ProfileRegistry {
	source: Box<dyn ProfileSource>,
	current: RwLock<Arc<ProfileSet>>,
}

impl ProfileRegistry {
	/// Builds a registry and performs the initial load, which must succeed.
	pub fn load(source: impl ProfileSource + 'static) -> Result<Self> {
		let registry = Self::empty(source);
		registry.reload()?;
		Ok(registry)
	}

	/// Builds a registry with nothing loaded yet.
	pub fn empty(source: impl ProfileSource + 'static) -> Self {
		Self {
			source: Box::new(source),
			current: RwLock::new(Arc::new(ProfileSet::default())),
		}
	}

	pub fn snapshot(&self) -> Arc<ProfileSet> {
		Arc::clone(&self.current.read())
	}

	pub fn get(&self, name: &str) -> Result<Arc<Profile>> {
		self
			.snapshot()
			.get(name)
			.ok_or_else(|| ProfileError::NotFound(name.to_string()))
	}

	pub fn list(&self, enabled_only: bool) -> Vec<Arc<Profile>> {
		self.snapshot().list(enabled_only)
	}

	pub fn list_by_platform(&self, platform: Platform) -> Vec<Arc<Profile>> {
		self.snapshot().list_by_platform(platform)
	}

	pub fn exists(&self, name: &str) -> bool {
		self.snapshot().get(name).is_some()
	}

	/// Re-reads the source and swaps in the new set. On any failure the
	/// previous set stays authoritative. Returns the number of profiles loaded.
	#[instrument(skip(self), fields(source = self.source.name()))]
	pub fn reload(&self) -> Result<usize> {
		let loaded = self
			.source
			.load()
			.and_then(ProfileSet::from_profiles)
			.inspect_err(|e| warn!(error = %e, "profile reload rejected"))?;

		let count = loaded.len();
		*self.current.write() = Arc::new(loaded);

		info!(count, "profiles loaded");
		Ok(count)
	}
}
