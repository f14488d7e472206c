// src/facade/mod.rs

//! Backend facades: the capability interface over the package engines
//!
//! `PackageFacade` is the polymorphic surface the rest of the system
//! programs against. It has exactly two implementations, selected once
//! at construction: `DebFacade` (the modern engine, with OS-level
//! holds) and `LegacyFacade` (the deprecated engine, with
//! name+constraint locks and no hold support). Call sites depend only
//! on the trait, never on variant-specific state.
//!
//! The facade is single-writer: at most one `perform_changes` may be in
//! flight per instance, and callers serialize commits through their own
//! mutual-exclusion boundary. Marking is cheap and synchronous; channel
//! reload and commit are blocking and potentially long-running.

mod core;
mod deb;
mod diagnostics;
mod legacy;

pub use self::core::FacadeConfig;
pub use deb::DebFacade;
pub use legacy::LegacyFacade;

use crate::catalog::{BackendKind, Digest, PackageVersion};
use crate::channel::Channel;
use crate::error::Result;
use crate::skeleton::PackageSkeleton;
use crate::state::LockEntry;
use crate::version::VersionOp;

/// Tagged result of a commit attempt. The rejection arm is the `Err`
/// side of `Result<CommitOutcome>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Nothing was queued, or the computed plan was a strict no-op.
    NoOp,
    /// The transaction committed; carries the captured operation log.
    Committed(String),
}

/// Confirmation text for a transaction that only changed holds.
pub const HOLDS_CHANGED_MESSAGE: &str = "Package holds successfully changed.";

/// The caller's pending intent, accumulated between commits.
///
/// Pure accumulator: nothing is validated at mark time, because only
/// the resolver can determine feasibility. Owned exclusively by the
/// facade instance.
#[derive(Debug, Default, Clone)]
pub struct MarkQueue {
    installs: Vec<PackageVersion>,
    removals: Vec<PackageVersion>,
    hold_creations: Vec<PackageVersion>,
    hold_removals: Vec<PackageVersion>,
    global_upgrade: bool,
}

impl MarkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_install(&mut self, version: PackageVersion) {
        self.installs.push(version);
    }

    pub fn push_removal(&mut self, version: PackageVersion) {
        self.removals.push(version);
    }

    pub fn push_hold_creation(&mut self, version: PackageVersion) {
        self.hold_creations.push(version);
    }

    pub fn push_hold_removal(&mut self, version: PackageVersion) {
        self.hold_removals.push(version);
    }

    pub fn set_global_upgrade(&mut self) {
        self.global_upgrade = true;
    }

    pub fn installs(&self) -> &[PackageVersion] {
        &self.installs
    }

    pub fn removals(&self) -> &[PackageVersion] {
        &self.removals
    }

    pub fn hold_creations(&self) -> &[PackageVersion] {
        &self.hold_creations
    }

    pub fn hold_removals(&self) -> &[PackageVersion] {
        &self.hold_removals
    }

    pub fn global_upgrade(&self) -> bool {
        self.global_upgrade
    }

    pub fn has_version_changes(&self) -> bool {
        !self.installs.is_empty() || !self.removals.is_empty() || self.global_upgrade
    }

    pub fn has_hold_changes(&self) -> bool {
        !self.hold_creations.is_empty() || !self.hold_removals.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_version_changes() && !self.has_hold_changes()
    }

    /// Clear every collection and the global-upgrade flag.
    pub fn reset(&mut self) {
        self.installs.clear();
        self.removals.clear();
        self.hold_creations.clear();
        self.hold_removals.clear();
        self.global_upgrade = false;
    }
}

/// Capability interface over the two backend variants.
pub trait PackageFacade {
    fn kind(&self) -> BackendKind;
    fn supports_holds(&self) -> bool;
    fn supports_locks(&self) -> bool;

    // Channels

    /// Refresh the package lists from every configured channel and
    /// rebuild the catalog index. With `force` the indexes are
    /// refetched even if a previous load is still cached.
    fn reload_channels(&mut self, force: bool) -> Result<()>;

    /// Reload only if no load has happened yet.
    fn ensure_channels_reloaded(&mut self) -> Result<()>;

    fn add_deb_channel(&mut self, url: &str, distribution: &str, components: &[String]) -> Result<()>;
    fn add_dir_channel(&mut self, path: &str) -> Result<()>;
    fn clear_channels(&mut self) -> Result<()>;
    fn reset_channels(&mut self) -> Result<()>;
    fn list_channels(&self) -> Vec<Channel>;

    // Catalog

    fn get_packages(&self) -> Vec<PackageVersion>;
    fn get_packages_by_name(&self, name: &str) -> Vec<PackageVersion>;
    fn is_installed(&self, version: &PackageVersion) -> bool;
    fn is_available(&self, version: &PackageVersion) -> bool;
    fn is_upgrade(&self, version: &PackageVersion) -> bool;

    /// Packages currently prevented from changing: held packages on the
    /// modern variant, lock-matched packages on the legacy variant.
    fn get_locked_versions(&self) -> Vec<PackageVersion>;

    // Identity

    fn get_package_skeleton(&self, version: &PackageVersion, with_info: bool) -> Option<PackageSkeleton>;
    fn get_package_hash(&self, version: &PackageVersion) -> Option<Digest>;
    fn get_package_by_hash(&self, digest: &Digest) -> Option<PackageVersion>;
    fn get_package_hashes(&self) -> Vec<Digest>;

    // Holds and locks

    fn set_hold(&mut self, version: &PackageVersion) -> Result<()>;
    fn remove_hold(&mut self, version: &PackageVersion) -> Result<()>;
    fn get_package_holds(&self) -> Result<Vec<String>>;
    fn set_lock(&mut self, name: &str, condition: Option<(VersionOp, &str)>) -> Result<()>;
    fn remove_lock(&mut self, name: &str, condition: Option<(VersionOp, &str)>) -> Result<()>;
    fn get_package_locks(&self) -> Result<Vec<LockEntry>>;

    // Marks and commit

    fn mark_install(&mut self, version: &PackageVersion);
    fn mark_remove(&mut self, version: &PackageVersion);
    fn mark_global_upgrade(&mut self);
    fn mark_create_hold(&mut self, version: &PackageVersion) -> Result<()>;
    fn mark_remove_hold(&mut self, version: &PackageVersion) -> Result<()>;
    fn get_pending_marks(&self) -> &MarkQueue;

    /// Clear all pending marks and the backend's speculative selection.
    fn reset_marks(&mut self);

    /// Run the pending package operations through the resolver, validate
    /// the plan against the marks, and commit.
    fn perform_changes(&mut self) -> Result<CommitOutcome>;
}
