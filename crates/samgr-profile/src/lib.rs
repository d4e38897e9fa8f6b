//! # samgr profile
//!
//! Static per-ability metadata: hosting process, library, dependencies,
//! boot phase and capability flags. Profiles are read-only input to both the
//! registry (which needs to know where an on-demand ability lives) and the
//! per-process manager (which needs to know what to start and when).
//!
//! Profiles are YAML documents, one per hosting process:
//!
//! ```yaml
//! process: media_service
//! systemabilities:
//!   - id: 1201
//!     lib_path: libmedia.z.so
//!     depends: [1101]
//!     depend_timeout: 6000ms
//!     run_on_create: true
//!     boot_phase: CoreStartPhase
//! ```

mod types;
mod validation;

pub use types::{
    BootPhase, ProcessProfile, SaProfile, DEFAULT_DEPEND_TIMEOUT, MAX_DEPEND_TIMEOUT,
    MIN_DEPEND_TIMEOUT,
};

use anyhow::{anyhow, Context, Result};
use samgr_common::AbilityId;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

impl ProcessProfile {
    /// Load a process document from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).with_context(|| {
            format!("Failed to read profile file: {}", path.as_ref().display())
        })?;

        Self::load_from_string(&content)
            .with_context(|| format!("Invalid profile file: {}", path.as_ref().display()))
    }

    /// Load a process document from a YAML string
    pub fn load_from_string(content: &str) -> Result<Self> {
        let mut profile: ProcessProfile =
            serde_yaml::from_str(content).context("Failed to parse YAML profile")?;

        for sa in &mut profile.systemabilities {
            if sa.process.is_empty() {
                sa.process = profile.process.clone();
            }
            sa.normalize();
        }

        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<()> {
        validation::validate_process_profile(self)
    }
}

/// All known ability profiles, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ProfileSet {
    profiles: BTreeMap<AbilityId, SaProfile>,
}

impl ProfileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from individual profiles, rejecting duplicate ids.
    pub fn from_profiles(profiles: impl IntoIterator<Item = SaProfile>) -> Result<Self> {
        let mut set = Self::new();
        for profile in profiles {
            set.insert(profile)?;
        }
        Ok(set)
    }

    /// Loads and merges several process documents.
    pub fn load_from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut set = Self::new();
        for path in paths {
            let doc = ProcessProfile::load_from_file(path)?;
            debug!(
                "Loaded {} profiles for process {} from {}",
                doc.systemabilities.len(),
                doc.process,
                path.as_ref().display()
            );
            set.merge(doc)?;
        }
        info!("Loaded {} ability profiles", set.len());
        Ok(set)
    }

    /// Adds every ability of a process document.
    pub fn merge(&mut self, doc: ProcessProfile) -> Result<()> {
        for sa in doc.systemabilities {
            self.insert(sa)?;
        }
        Ok(())
    }

    pub fn insert(&mut self, profile: SaProfile) -> Result<()> {
        validation::validate_sa_profile(&profile)?;
        if let Some(existing) = self.profiles.get(&profile.id) {
            return Err(anyhow!(
                "Ability {} declared by both {} and {}",
                profile.id,
                existing.process,
                profile.process
            ));
        }
        self.profiles.insert(profile.id, profile);
        Ok(())
    }

    pub fn get(&self, id: AbilityId) -> Option<&SaProfile> {
        self.profiles.get(&id)
    }

    pub fn contains(&self, id: AbilityId) -> bool {
        self.profiles.contains_key(&id)
    }

    /// Profiles in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &SaProfile> {
        self.profiles.values()
    }

    /// Profiles hosted by `process`.
    pub fn for_process<'a>(&'a self, process: &'a str) -> impl Iterator<Item = &'a SaProfile> + 'a {
        self.profiles.values().filter(move |p| p.process == process)
    }

    /// Abilities that are only started on demand.
    pub fn on_demand(&self) -> impl Iterator<Item = &SaProfile> {
        self.profiles.values().filter(|p| !p.run_on_create)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
