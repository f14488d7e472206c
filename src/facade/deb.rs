// src/facade/deb.rs

//! The modern backend variant
//!
//! Holds are first-class (they map to the host's package selection
//! state); name+constraint locks are the legacy engine's concept and
//! are rejected here.

use crate::catalog::{BackendKind, Digest, PackageVersion};
use crate::channel::Channel;
use crate::error::{Error, Result};
use crate::facade::core::{FacadeConfig, FacadeCore};
use crate::facade::{CommitOutcome, MarkQueue, PackageFacade};
use crate::resolver::DepSolver;
use crate::skeleton::PackageSkeleton;
use crate::state::LockEntry;
use crate::version::VersionOp;

pub struct DebFacade {
    core: FacadeCore,
}

impl DebFacade {
    pub fn open(config: FacadeConfig) -> Result<Self> {
        Ok(Self {
            core: FacadeCore::open(BackendKind::Deb, config)?,
        })
    }

    /// Replace the bundled resolution engine.
    pub fn with_solver(mut self, solver: Box<dyn DepSolver>) -> Self {
        self.core.set_solver(solver);
        self
    }

    /// Name and version of every installed package.
    pub fn installed_packages(&self) -> Result<Vec<(String, String)>> {
        self.core.state().installed()
    }

    /// RFC 3339 timestamp of the last channel reload, if any.
    pub fn last_reload(&self) -> Result<Option<String>> {
        self.core.state().last_reload()
    }
}

impl PackageFacade for DebFacade {
    fn kind(&self) -> BackendKind {
        BackendKind::Deb
    }

    fn supports_holds(&self) -> bool {
        true
    }

    fn supports_locks(&self) -> bool {
        false
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
        // On this variant "locked" means held.
        self.core.held_versions()
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

    fn set_hold(&mut self, version: &PackageVersion) -> Result<()> {
        self.core.set_hold(version)
    }

    fn remove_hold(&mut self, version: &PackageVersion) -> Result<()> {
        self.core.remove_hold(version)
    }

    fn get_package_holds(&self) -> Result<Vec<String>> {
        self.core.holds()
    }

    fn set_lock(&mut self, _name: &str, _condition: Option<(VersionOp, &str)>) -> Result<()> {
        Err(Error::NotSupported("set_lock"))
    }

    fn remove_lock(&mut self, _name: &str, _condition: Option<(VersionOp, &str)>) -> Result<()> {
        Err(Error::NotSupported("remove_lock"))
    }

    fn get_package_locks(&self) -> Result<Vec<LockEntry>> {
        Ok(Vec::new())
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

    fn mark_create_hold(&mut self, version: &PackageVersion) -> Result<()> {
        self.core.marks_mut().push_hold_creation(version.clone());
        Ok(())
    }

    fn mark_remove_hold(&mut self, version: &PackageVersion) -> Result<()> {
        self.core.marks_mut().push_hold_removal(version.clone());
        Ok(())
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
    use crate::facade::HOLDS_CHANGED_MESSAGE;
    use tempfile::TempDir;

    fn facade() -> (TempDir, DebFacade) {
        let dir = TempDir::new().unwrap();
        let facade = DebFacade::open(FacadeConfig::new(dir.path())).unwrap();
        (dir, facade)
    }

    #[test]
    fn test_empty_queue_commits_nothing() {
        let (_dir, mut facade) = facade();
        assert_eq!(facade.perform_changes().unwrap(), CommitOutcome::NoOp);
    }

    #[test]
    fn test_hold_creation_requires_installed_package() {
        let (_dir, mut facade) = facade();
        let ghost = PackageVersion::new("ghost", "1.0", BackendKind::Deb);
        facade.mark_create_hold(&ghost).unwrap();

        let err = facade.perform_changes().unwrap_err();
        assert!(matches!(err, Error::Transaction(_)));
        assert!(err.to_string().contains("ghost"));
        // The queue survives a rejected transaction.
        assert_eq!(facade.get_pending_marks().hold_creations().len(), 1);
    }

    #[test]
    fn test_holds_only_transaction_reports_hold_message() {
        let (_dir, mut facade) = facade();
        facade.core.state().set_installed("pkg", "1.0").unwrap();
        let v = PackageVersion::new("pkg", "1.0", BackendKind::Deb);

        facade.mark_create_hold(&v).unwrap();
        let outcome = facade.perform_changes().unwrap();
        assert_eq!(
            outcome,
            CommitOutcome::Committed(HOLDS_CHANGED_MESSAGE.to_string())
        );
        assert_eq!(facade.get_package_holds().unwrap(), vec!["pkg".to_string()]);
    }

    #[test]
    fn test_remove_hold_is_noop_for_unheld_package() {
        let (_dir, mut facade) = facade();
        facade.core.state().set_installed("pkg", "1.0").unwrap();
        let v = PackageVersion::new("pkg", "1.0", BackendKind::Deb);

        facade.mark_remove_hold(&v).unwrap();
        let outcome = facade.perform_changes().unwrap();
        assert_eq!(
            outcome,
            CommitOutcome::Committed(HOLDS_CHANGED_MESSAGE.to_string())
        );
        assert!(facade.get_package_holds().unwrap().is_empty());
    }

    #[test]
    fn test_locks_are_rejected() {
        let (_dir, mut facade) = facade();
        assert!(matches!(
            facade.set_lock("pkg", None),
            Err(Error::NotSupported("set_lock"))
        ));
        assert!(matches!(
            facade.remove_lock("pkg", None),
            Err(Error::NotSupported("remove_lock"))
        ));
        assert!(facade.get_package_locks().unwrap().is_empty());
    }
}
