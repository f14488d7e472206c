// src/facade/core.rs

//! Shared machinery behind both facade variants
//!
//! Owns the channel store, the loaded catalog and its digest index, the
//! host state database, the speculative selection, and the mark queue,
//! and implements the commit state machine
//! (Idle -> Planning -> Validating -> Committing -> Done/Rejected).
//! The variant-specific wrappers in `deb.rs` and `legacy.rs` delegate
//! here and differ only in hold/lock capability.

use crate::catalog::{BackendKind, CatalogIndex, Digest, PackageVersion, RecordStore};
use crate::channel::{Channel, ChannelLoader, ChannelStore};
use crate::error::{Error, Result};
use crate::facade::diagnostics::unmet_dependency_report;
use crate::facade::{CommitOutcome, MarkQueue, HOLDS_CHANGED_MESSAGE};
use crate::resolver::{
    broken_packages, planned_changes, upgrade_all, ChangeKind, ClosureSolver, DepSolver,
    PlannedChange, Selection,
};
use crate::skeleton::{build_skeleton, PackageSkeleton};
use crate::state::HostState;
use crate::version::compare_versions;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// Construction-time settings shared by both facade variants.
#[derive(Debug, Clone)]
pub struct FacadeConfig {
    /// Directory holding the channel store and host state database.
    pub data_dir: PathBuf,
    /// Architecture used to build channel index URLs.
    pub architecture: String,
    /// Optional external installer command. When set, the commit step
    /// feeds it the change plan on stdin and captures its combined
    /// output; when unset, the commit mutates the host state directly.
    pub installer_hook: Option<Vec<String>>,
}

impl FacadeConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            architecture: "amd64".to_string(),
            installer_hook: None,
        }
    }

    pub fn architecture(mut self, architecture: impl Into<String>) -> Self {
        self.architecture = architecture.into();
        self
    }

    pub fn installer_hook(mut self, command: Vec<String>) -> Self {
        self.installer_hook = Some(command);
        self
    }
}

pub(crate) struct FacadeCore {
    kind: BackendKind,
    channels: ChannelStore,
    loader: ChannelLoader,
    records: RecordStore,
    index: CatalogIndex,
    state: HostState,
    selection: Selection,
    marks: MarkQueue,
    solver: Box<dyn DepSolver>,
    installer_hook: Option<Vec<String>>,
    channels_loaded: bool,
}

impl FacadeCore {
    pub(crate) fn open(kind: BackendKind, config: FacadeConfig) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;
        let channels = ChannelStore::open(config.data_dir.join("channels.json"))?;
        let state = HostState::open(&config.data_dir.join("state.db"))?;
        let loader = ChannelLoader::new(config.architecture)?;
        Ok(Self {
            kind,
            channels,
            loader,
            records: RecordStore::default(),
            index: CatalogIndex::new(),
            state,
            selection: Selection::new(),
            marks: MarkQueue::new(),
            solver: Box::new(ClosureSolver),
            installer_hook: config.installer_hook,
            channels_loaded: false,
        })
    }

    /// Swap in a different resolution engine.
    pub(crate) fn set_solver(&mut self, solver: Box<dyn DepSolver>) {
        self.solver = solver;
    }

    pub(crate) fn kind(&self) -> BackendKind {
        self.kind
    }

    pub(crate) fn state(&self) -> &HostState {
        &self.state
    }

    // Channels

    pub(crate) fn reload_channels(&mut self, force: bool) -> Result<()> {
        if self.channels_loaded && !force {
            debug!("Channels already loaded, skipping refetch");
            return Ok(());
        }
        let records = self.loader.load(self.channels.list()).map_err(|e| match e {
            Error::Channel(message) => Error::Channel(format!(
                "{} (channels: {})",
                message,
                self.channels
                    .list()
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
            other => other,
        })?;
        self.records = RecordStore::rebuild(records);

        // The index is rebuilt wholesale; entries from the previous
        // load are never consulted again.
        self.index.clear();
        for record in self.records.iter() {
            let digest = build_skeleton(record, false).hash();
            self.index.insert(digest, record.identity(self.kind));
        }
        self.state.record_reload()?;
        self.channels_loaded = true;
        info!("Catalog rebuilt with {} package versions", self.index.len());
        Ok(())
    }

    pub(crate) fn ensure_channels_reloaded(&mut self) -> Result<()> {
        if self.channels_loaded {
            return Ok(());
        }
        self.reload_channels(false)
    }

    pub(crate) fn add_deb_channel(
        &mut self,
        url: &str,
        distribution: &str,
        components: &[String],
    ) -> Result<()> {
        let channel = Channel::apt_deb(url, distribution, components.to_vec());
        if self.channels.add(channel)? {
            self.channels_loaded = false;
        }
        Ok(())
    }

    pub(crate) fn add_dir_channel(&mut self, path: &str) -> Result<()> {
        if self.channels.add(Channel::deb_dir(path))? {
            self.channels_loaded = false;
        }
        Ok(())
    }

    pub(crate) fn clear_channels(&mut self) -> Result<()> {
        self.channels.clear()?;
        self.channels_loaded = false;
        Ok(())
    }

    /// Drop the channel list and the catalog built from it.
    pub(crate) fn reset_channels(&mut self) -> Result<()> {
        self.channels.clear()?;
        self.records = RecordStore::default();
        self.index.clear();
        self.channels_loaded = false;
        Ok(())
    }

    pub(crate) fn list_channels(&self) -> Vec<Channel> {
        self.channels.list().to_vec()
    }

    // Catalog

    pub(crate) fn get_packages(&self) -> Vec<PackageVersion> {
        self.records
            .iter()
            .map(|record| record.identity(self.kind))
            .collect()
    }

    pub(crate) fn get_packages_by_name(&self, name: &str) -> Vec<PackageVersion> {
        self.records
            .versions_of(name)
            .iter()
            .map(|record| record.identity(self.kind))
            .collect()
    }

    pub(crate) fn is_installed(&self, version: &PackageVersion) -> bool {
        self.state
            .is_installed(&version.name, &version.version)
            .unwrap_or(false)
    }

    pub(crate) fn is_available(&self, version: &PackageVersion) -> bool {
        self.records.get(&version.name, &version.version).is_some()
    }

    pub(crate) fn is_upgrade(&self, version: &PackageVersion) -> bool {
        match self.state.installed_version(&version.name) {
            Ok(Some(installed)) => {
                compare_versions(&version.version, &installed) == std::cmp::Ordering::Greater
                    && self.is_available(version)
            }
            _ => false,
        }
    }

    // Identity

    pub(crate) fn get_package_skeleton(
        &self,
        version: &PackageVersion,
        with_info: bool,
    ) -> Option<PackageSkeleton> {
        self.records
            .get(&version.name, &version.version)
            .map(|record| build_skeleton(record, with_info))
    }

    pub(crate) fn get_package_hash(&self, version: &PackageVersion) -> Option<Digest> {
        self.index.digest_for(version)
    }

    pub(crate) fn get_package_by_hash(&self, digest: &Digest) -> Option<PackageVersion> {
        self.index.version_for(digest).cloned()
    }

    pub(crate) fn get_package_hashes(&self) -> Vec<Digest> {
        self.index.digests().copied().collect()
    }

    // Holds

    pub(crate) fn set_hold(&mut self, version: &PackageVersion) -> Result<()> {
        self.state.set_hold(&version.name)
    }

    /// Remove a hold; a no-op when the version is not installed or not
    /// held, mirroring the selection-database semantics.
    pub(crate) fn remove_hold(&mut self, version: &PackageVersion) -> Result<()> {
        if !self.is_installed(version) || !self.state.is_held(&version.name)? {
            return Ok(());
        }
        self.state.remove_hold(&version.name)
    }

    pub(crate) fn holds(&self) -> Result<Vec<String>> {
        self.state.holds()
    }

    /// Installed catalog versions that are held.
    pub(crate) fn held_versions(&self) -> Vec<PackageVersion> {
        self.records
            .iter()
            .filter(|record| {
                self.state
                    .is_installed(&record.name, &record.version)
                    .unwrap_or(false)
                    && self.state.is_held(&record.name).unwrap_or(false)
            })
            .map(|record| record.identity(self.kind))
            .collect()
    }

    // Marks

    pub(crate) fn marks(&self) -> &MarkQueue {
        &self.marks
    }

    pub(crate) fn marks_mut(&mut self) -> &mut MarkQueue {
        &mut self.marks
    }

    pub(crate) fn reset_marks(&mut self) {
        self.marks.reset();
        self.selection.clear();
    }

    // Transaction reconciliation

    /// Commit state machine. See the module docs for the state diagram;
    /// every rejection path leaves the mark queue exactly as it was.
    pub(crate) fn perform_changes(&mut self) -> Result<CommitOutcome> {
        // Idle -> short-circuit: an empty queue never touches the backend.
        if self.marks.is_empty() {
            return Ok(CommitOutcome::NoOp);
        }

        // Planning: hold changes are side-channel and are not run
        // through the resolver.
        if self.marks.has_hold_changes() {
            self.apply_hold_changes()?;
        }
        if !self.marks.has_version_changes() {
            return Ok(CommitOutcome::Committed(HOLDS_CHANGED_MESSAGE.to_string()));
        }

        let installed = self.installed_map()?;

        // The host may already carry unrelated breakage; snapshot it
        // before marking so it is never attributed to this transaction.
        self.selection.clear();
        let already_broken = broken_packages(&self.records, &installed, &self.selection);

        let requested = self.apply_marks_to_selection(&installed)?;

        // Validating
        let now_broken = broken_packages(&self.records, &installed, &self.selection);
        if now_broken != already_broken {
            if let Err(message) =
                self.solver
                    .fix(&self.records, &installed, &mut self.selection)
            {
                let report = unmet_dependency_report(&self.records, &installed, &self.selection);
                return Err(Error::Transaction(format!("{}\n{}", message, report)));
            }
        }

        let plan = planned_changes(&installed, &self.selection, self.kind);
        let unrequested: Vec<String> = plan
            .iter()
            .filter(|change| !requested.contains(&change.version))
            .map(|change| change.version.to_string())
            .collect();
        if !unrequested.is_empty() {
            return Err(Error::Dependency(unrequested));
        }
        if plan.is_empty() {
            debug!("Plan is a strict no-op, nothing to commit");
            return Ok(CommitOutcome::NoOp);
        }

        // Committing
        let log = self.execute_commit(&plan)?;
        info!("Committed {} changes", plan.len());
        Ok(CommitOutcome::Committed(log))
    }

    /// Validate and apply queued hold changes. Creations must target
    /// installed versions; the error names every offender.
    fn apply_hold_changes(&mut self) -> Result<()> {
        let mut not_installed: Vec<String> = self
            .marks
            .hold_creations()
            .iter()
            .filter(|version| !self.is_installed(version))
            .map(|version| version.name.clone())
            .collect();
        if !not_installed.is_empty() {
            not_installed.sort();
            not_installed.dedup();
            return Err(Error::Transaction(format!(
                "Cannot perform the changes, since the following packages are not installed: {}",
                not_installed.join(", ")
            )));
        }
        for version in self.marks.hold_creations().to_vec() {
            self.set_hold(&version)?;
        }
        for version in self.marks.hold_removals().to_vec() {
            self.remove_hold(&version)?;
        }
        Ok(())
    }

    /// Apply the queued version changes to the speculative selection.
    ///
    /// Returns the requested set the plan is validated against: every
    /// explicitly marked version plus the closure selected by the
    /// global-upgrade path. Fails when a queued removal targets a held
    /// package, holds take precedence.
    fn apply_marks_to_selection(
        &mut self,
        installed: &BTreeMap<String, String>,
    ) -> Result<BTreeSet<PackageVersion>> {
        for version in self.marks.installs() {
            self.selection.mark_install(&version.name, &version.version);
            self.selection.protect(&version.name);
        }
        if self.marks.global_upgrade() {
            let blocked: BTreeSet<String> = self.state.holds()?.into_iter().collect();
            upgrade_all(&self.records, installed, &blocked, &mut self.selection);
        }

        // Everything selected so far was asked for: explicit installs
        // plus the upgrade closure (with the old versions they displace).
        let mut requested: BTreeSet<PackageVersion> = BTreeSet::new();
        for (name, candidate) in self.selection.installs() {
            requested.insert(PackageVersion::new(name, candidate, self.kind));
            if let Some(current) = installed.get(name) {
                if current != candidate {
                    requested.insert(PackageVersion::new(name, current, self.kind));
                }
            }
        }

        let install_names: BTreeSet<&str> = self
            .marks
            .installs()
            .iter()
            .map(|version| version.name.as_str())
            .collect();
        let mut held_blockers: BTreeSet<String> = BTreeSet::new();
        for version in self.marks.removals() {
            requested.insert(version.clone());
            if self.state.is_held(&version.name)? {
                held_blockers.insert(version.name.clone());
            }
            // An install of the same name makes this the old half of an
            // upgrade; the selection diff already renders it.
            if install_names.contains(version.name.as_str()) {
                continue;
            }
            self.selection.mark_remove(&version.name);
            self.selection.protect(&version.name);
        }
        if !held_blockers.is_empty() {
            return Err(Error::Transaction(format!(
                "Can't perform the changes, since the following packages are held: {}",
                held_blockers.into_iter().collect::<Vec<_>>().join(", ")
            )));
        }
        Ok(requested)
    }

    /// Execute the fetch+apply step, returning the captured log.
    fn execute_commit(&mut self, plan: &[PlannedChange]) -> Result<String> {
        let mut log = String::new();
        for change in plan {
            match change.kind {
                ChangeKind::Install => log.push_str(&format!("Installing {}\n", change.version)),
                ChangeKind::Remove => log.push_str(&format!("Removing {}\n", change.version)),
            }
        }

        if let Some(hook) = self.installer_hook.clone() {
            self.run_installer_hook(&hook, plan, &mut log)?;
        }

        for change in plan {
            match change.kind {
                ChangeKind::Remove => self.state.remove_installed(&change.version.name)?,
                ChangeKind::Install => self
                    .state
                    .set_installed(&change.version.name, &change.version.version)?,
            }
        }
        Ok(log)
    }

    /// Run the external installer with the plan on stdin, capturing its
    /// combined stdout/stderr into the log. A hook that terminates on a
    /// signal is promoted to an explicit failure even though no I/O
    /// error surfaced.
    fn run_installer_hook(
        &self,
        hook: &[String],
        plan: &[PlannedChange],
        log: &mut String,
    ) -> Result<()> {
        let capture = tempfile::NamedTempFile::new()?;
        let stdout = capture.reopen()?;
        let stderr = stdout.try_clone()?;

        let mut child = Command::new(&hook[0])
            .args(&hook[1..])
            .stdin(Stdio::piped())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|e| Error::Transaction(format!("Failed to run installer {}: {}", hook[0], e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            for change in plan {
                let verb = match change.kind {
                    ChangeKind::Install => "install",
                    ChangeKind::Remove => "remove",
                };
                if let Err(e) =
                    writeln!(stdin, "{} {} {}", verb, change.version.name, change.version.version)
                {
                    // An installer that exits without draining stdin
                    // closes the pipe; its exit status is the verdict.
                    if e.kind() == std::io::ErrorKind::BrokenPipe {
                        break;
                    }
                    return Err(Error::Transaction(format!("Failed to feed installer: {}", e)));
                }
            }
        }
        let status = child
            .wait()
            .map_err(|e| Error::Transaction(format!("Failed to wait for installer: {}", e)))?;
        let captured = fs::read_to_string(capture.path())?;
        log.push_str(&captured);

        if status.code().is_none() {
            warn!("Installer terminated without exiting cleanly");
            return Err(Error::Transaction(format!(
                "Installer did not exit cleanly.\n\nPackage operation log:\n{}",
                log
            )));
        }
        if !status.success() {
            return Err(Error::Transaction(format!(
                "Installer exited with status {}.\n\nPackage operation log:\n{}",
                status.code().unwrap_or(-1),
                log
            )));
        }
        Ok(())
    }

    pub(crate) fn installed_map(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.state.installed()?.into_iter().collect())
    }

    pub(crate) fn records(&self) -> &RecordStore {
        &self.records
    }
}
