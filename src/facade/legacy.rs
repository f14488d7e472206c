// src/facade/legacy.rs

//! The deprecated backend variant
//!
//! Kept for hosts still running the old engine. Instead of holds it
//! carries name+constraint locks: a lock pins every catalog version the
//! condition matches, and `get_locked_versions` reports the matched
//! set. Hold operations are rejected so callers fall back cleanly.

use crate::catalog::{BackendKind, Digest, PackageVersion};
use crate::channel::Channel;
use crate::error::{Error, Result};
use crate::facade::core::{FacadeConfig, FacadeCore};
use crate::facade::{CommitOutcome, MarkQueue, PackageFacade};
use crate::resolver::DepSolver;
use crate::skeleton::PackageSkeleton;
use crate::state::LockEntry;
use crate::version::{satisfies, VersionOp};

pub struct LegacyFacade {
    core: FacadeCore,
}

impl LegacyFacade {
    pub fn open(config: FacadeConfig) -> Result<Self> {
        Ok(Self {
            core: FacadeCore::open(BackendKind::Legacy, config)?,
        })
    }

    pub fn with_solver(mut self, solver: Box<dyn DepSolver>) -> Self {
        self.core.set_solver(solver);
        self
    }

    pub fn installed_packages(&self) -> Result<Vec<(String, String)>> {
        self.core.state().installed()
    }

    pub fn last_reload(&self) -> Result<Option<String>> {
        self.core.state().last_reload()
    }

    fn lock_matches(lock: &LockEntry, version: &PackageVersion) -> bool {
        if lock.name != version.name {
            return false;
        }
        if lock.relation.is_empty() {
            return true;
        }
        match VersionOp::parse(&lock.relation) {
            Some(op) => satisfies(&version.version, op, &lock.version),
            // An unreadable stored relation pins nothing.
            None => false,
        }
    }
}

impl PackageFacade for LegacyFacade {
    fn kind(&self) -> BackendKind {
        BackendKind::Legacy
    }

    fn supports_holds(&self) -> bool {
        false
    }

    fn supports_locks(&self) -> bool {
        true
    }

    fn reload_channels(&mut self, force: bool) -> Result<()> {
        self.core.reload_channels(force)
    }

    fn ensure_channels_reloaded(&mut self) -> Result<()> {
        self.core.ensure_channels_reloaded()
    }

    fn add_deb_channel(&mut self, url: &str, distribution: &str, components: &[String]) -> Result<()> {
        self.core.add_deb_channel(url, distribution, components)
    }

    fn add_dir_channel(&mut self, path: &str) -> Result<()> {
        self.core.add_dir_channel(path)
    }

    fn clear_channels(&mut self) -> Result<()> {
        self.core.clear_channels()
    }

    fn reset_channels(&mut self) -> Result<()> {
        self.core.reset_channels()
    }

    fn list_channels(&self) -> Vec<Channel> {
        self.core.list_channels()
    }

    fn get_packages(&self) -> Vec<PackageVersion> {
        self.core.get_packages()
    }

    fn get_packages_by_name(&self, name: &str) -> Vec<PackageVersion> {
        self.core.get_packages_by_name(name)
    }

    fn is_installed(&self, version: &PackageVersion) -> bool {
        self.core.is_installed(version)
    }

    fn is_available(&self, version: &PackageVersion) -> bool {
        self.core.is_available(version)
    }

    fn is_upgrade(&self, version: &PackageVersion) -> bool {
        self.core.is_upgrade(version)
    }

    fn get_locked_versions(&self) -> Vec<PackageVersion> {
        let locks = match self.core.state().locks() {
            Ok(locks) => locks,
            Err(_) => return Vec::new(),
        };
        self.core
            .get_packages()
            .into_iter()
            .filter(|version| locks.iter().any(|lock| Self::lock_matches(lock, version)))
            .collect()
    }

    fn get_package_skeleton(&self, version: &PackageVersion, with_info: bool) -> Option<PackageSkeleton> {
        self.core.get_package_skeleton(version, with_info)
    }

    fn get_package_hash(&self, version: &PackageVersion) -> Option<Digest> {
        self.core.get_package_hash(version)
    }

    fn get_package_by_hash(&self, digest: &Digest) -> Option<PackageVersion> {
        self.core.get_package_by_hash(digest)
    }

    fn get_package_hashes(&self) -> Vec<Digest> {
        self.core.get_package_hashes()
    }

    fn set_hold(&mut self, _version: &PackageVersion) -> Result<()> {
        Err(Error::NotSupported("set_hold"))
    }

    fn remove_hold(&mut self, _version: &PackageVersion) -> Result<()> {
        Err(Error::NotSupported("remove_hold"))
    }

    fn get_package_holds(&self) -> Result<Vec<String>> {
        Err(Error::NotSupported("get_package_holds"))
    }

    fn set_lock(&mut self, name: &str, condition: Option<(VersionOp, &str)>) -> Result<()> {
        match condition {
            Some((op, version)) => self.core.state().set_lock(name, &op.to_string(), version),
            None => self.core.state().set_lock(name, "", ""),
        }
    }

    fn remove_lock(&mut self, name: &str, condition: Option<(VersionOp, &str)>) -> Result<()> {
        match condition {
            Some((op, version)) => self.core.state().remove_lock(name, &op.to_string(), version),
            None => self.core.state().remove_lock(name, "", ""),
        }
    }

    fn get_package_locks(&self) -> Result<Vec<LockEntry>> {
        self.core.state().locks()
    }

    fn mark_install(&mut self, version: &PackageVersion) {
        self.core.marks_mut().push_install(version.clone());
    }

    fn mark_remove(&mut self, version: &PackageVersion) {
        self.core.marks_mut().push_removal(version.clone());
    }

    fn mark_global_upgrade(&mut self) {
        self.core.marks_mut().set_global_upgrade();
    }

    fn mark_create_hold(&mut self, _version: &PackageVersion) -> Result<()> {
        Err(Error::NotSupported("mark_create_hold"))
    }

    fn mark_remove_hold(&mut self, _version: &PackageVersion) -> Result<()> {
        Err(Error::NotSupported("mark_remove_hold"))
    }

    fn get_pending_marks(&self) -> &MarkQueue {
        self.core.marks()
    }

    fn reset_marks(&mut self) {
        self.core.reset_marks()
    }

    fn perform_changes(&mut self) -> Result<CommitOutcome> {
        self.core.perform_changes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn facade() -> (TempDir, LegacyFacade) {
        let dir = TempDir::new().unwrap();
        let facade = LegacyFacade::open(FacadeConfig::new(dir.path())).unwrap();
        (dir, facade)
    }

    #[test]
    fn test_holds_are_rejected() {
        let (_dir, mut facade) = facade();
        let v = PackageVersion::new("pkg", "1.0", BackendKind::Legacy);
        assert!(matches!(
            facade.set_hold(&v),
            Err(Error::NotSupported("set_hold"))
        ));
        assert!(matches!(
            facade.mark_create_hold(&v),
            Err(Error::NotSupported("mark_create_hold"))
        ));
        assert!(matches!(
            facade.get_package_holds(),
            Err(Error::NotSupported("get_package_holds"))
        ));
    }

    #[test]
    fn test_lock_round_trip() {
        let (_dir, mut facade) = facade();
        facade
            .set_lock("pkg", Some((VersionOp::StrictlyLater, "1.0")))
            .unwrap();
        facade.set_lock("other", None).unwrap();

        let locks = facade.get_package_locks().unwrap();
        assert_eq!(locks.len(), 2);
        assert!(locks.contains(&LockEntry {
            name: "pkg".to_string(),
            relation: ">>".to_string(),
            version: "1.0".to_string(),
        }));

        facade
            .remove_lock("pkg", Some((VersionOp::StrictlyLater, "1.0")))
            .unwrap();
        facade.remove_lock("other", None).unwrap();
        assert!(facade.get_package_locks().unwrap().is_empty());
    }

    #[test]
    fn test_lock_condition_matching() {
        let versioned = LockEntry {
            name: "pkg".to_string(),
            relation: ">=".to_string(),
            version: "2.0".to_string(),
        };
        let bare = LockEntry {
            name: "pkg".to_string(),
            relation: String::new(),
            version: String::new(),
        };
        let old = PackageVersion::new("pkg", "1.0", BackendKind::Legacy);
        let new = PackageVersion::new("pkg", "2.5", BackendKind::Legacy);

        assert!(!LegacyFacade::lock_matches(&versioned, &old));
        assert!(LegacyFacade::lock_matches(&versioned, &new));
        assert!(LegacyFacade::lock_matches(&bare, &old));
        assert!(!LegacyFacade::lock_matches(
            &bare,
            &PackageVersion::new("unrelated", "1.0", BackendKind::Legacy)
        ));
    }
}
