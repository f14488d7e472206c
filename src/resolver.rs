// src/resolver.rs

//! Speculative selection state and the opaque dependency solver seam
//!
//! The reconciler never searches for a dependency solution itself: it
//! applies the caller's marks to a `Selection`, asks the solver to fix
//! whatever that breaks, and then diffs the selection against the
//! installed set to get the full change plan. `DepSolver` is the narrow
//! contract a real resolution engine plugs into; the bundled
//! `ClosureSolver` is a deliberately minimal engine that walks
//! requirement closures and refuses anything that would touch a
//! protected package.

use crate::catalog::{BackendKind, DepAtom, PackageRecord, PackageVersion, RecordStore};
use crate::version::satisfies;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Upper bound on fix passes before the solver reports non-convergence.
const MAX_FIX_PASSES: usize = 64;

/// Direction of one planned change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChangeKind {
    Install,
    Remove,
}

/// One entry in the resolver's full change plan.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PlannedChange {
    pub kind: ChangeKind,
    pub version: PackageVersion,
}

/// The backend's speculative working state: what the next transaction
/// would install, remove, and refuse to touch. Owned by the backend and
/// never aliased with the caller's mark queue.
#[derive(Debug, Default, Clone)]
pub struct Selection {
    install: BTreeMap<String, String>,
    remove: BTreeSet<String>,
    protected: BTreeSet<String>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select `version` as the candidate to install for its name,
    /// clearing any removal mark on that name.
    pub fn mark_install(&mut self, name: &str, version: &str) {
        self.remove.remove(name);
        self.install.insert(name.to_string(), version.to_string());
    }

    pub fn mark_remove(&mut self, name: &str) {
        if !self.install.contains_key(name) {
            self.remove.insert(name.to_string());
        }
    }

    /// Shield a name from the solver: its selected state must survive
    /// fixing unchanged.
    pub fn protect(&mut self, name: &str) {
        self.protected.insert(name.to_string());
    }

    pub fn is_protected(&self, name: &str) -> bool {
        self.protected.contains(name)
    }

    pub fn installs(&self) -> impl Iterator<Item = (&String, &String)> {
        self.install.iter()
    }

    pub fn removals(&self) -> impl Iterator<Item = &String> {
        self.remove.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.install.is_empty() && self.remove.is_empty()
    }

    pub fn clear(&mut self) {
        self.install.clear();
        self.remove.clear();
        self.protected.clear();
    }

    /// Version of `name` once this selection is applied on top of
    /// `installed`: the selected candidate, nothing if marked for
    /// removal, otherwise whatever is installed today.
    pub fn end_version<'a>(
        &'a self,
        installed: &'a BTreeMap<String, String>,
        name: &str,
    ) -> Option<&'a str> {
        if let Some(version) = self.install.get(name) {
            return Some(version);
        }
        if self.remove.contains(name) {
            return None;
        }
        installed.get(name).map(String::as_str)
    }
}

/// Whether one alternative is satisfied in the end state described by
/// `installed` + `selection`. A versioned atom must be matched by the
/// real package of that name; an unversioned atom may also be matched
/// by any end-installed provider of the name.
pub(crate) fn atom_satisfied(
    store: &RecordStore,
    installed: &BTreeMap<String, String>,
    selection: &Selection,
    atom: &DepAtom,
) -> bool {
    if let Some(end) = selection.end_version(installed, &atom.name) {
        match &atom.constraint {
            Some((op, bound)) => {
                if satisfies(end, *op, bound) {
                    return true;
                }
            }
            None => return true,
        }
    }
    if atom.constraint.is_none() {
        for provider in store.providers_of(&atom.name) {
            if selection.end_version(installed, &provider.name) == Some(provider.version.as_str()) {
                return true;
            }
        }
    }
    false
}

/// Whether `record` (assumed end-installed) has all positive groups
/// satisfied and no negative group violated.
fn record_satisfied(
    store: &RecordStore,
    installed: &BTreeMap<String, String>,
    selection: &Selection,
    record: &PackageRecord,
) -> bool {
    for group in record.pre_depends.iter().chain(&record.depends) {
        if !group
            .alternatives()
            .iter()
            .any(|atom| atom_satisfied(store, installed, selection, atom))
        {
            return false;
        }
    }
    for group in record.conflicts.iter().chain(&record.breaks) {
        for atom in group.alternatives() {
            // A package never conflicts with itself.
            if atom.name == record.name {
                continue;
            }
            if atom_satisfied(store, installed, selection, atom) {
                return false;
            }
        }
    }
    true
}

/// Names whose end state violates their own dependency facts.
///
/// Packages installed today but absent from the catalog are skipped:
/// nothing is known about their relations.
pub fn broken_packages(
    store: &RecordStore,
    installed: &BTreeMap<String, String>,
    selection: &Selection,
) -> BTreeSet<String> {
    let mut broken = BTreeSet::new();
    let mut end_names: BTreeSet<&str> = installed.keys().map(String::as_str).collect();
    for (name, _) in selection.installs() {
        end_names.insert(name.as_str());
    }
    for name in end_names {
        let Some(end) = selection.end_version(installed, name) else {
            continue;
        };
        let Some(record) = store.get(name, end) else {
            continue;
        };
        if !record_satisfied(store, installed, selection, record) {
            broken.insert(name.to_string());
        }
    }
    broken
}

/// Diff the selection against the installed set into the full change
/// plan. An upgrade or downgrade appears as the removal of the old
/// version plus the install of the new one.
pub fn planned_changes(
    installed: &BTreeMap<String, String>,
    selection: &Selection,
    kind: BackendKind,
) -> Vec<PlannedChange> {
    let mut plan = Vec::new();
    for (name, candidate) in selection.installs() {
        match installed.get(name) {
            Some(current) if current == candidate => {}
            Some(current) => {
                plan.push(PlannedChange {
                    kind: ChangeKind::Remove,
                    version: PackageVersion::new(name, current, kind),
                });
                plan.push(PlannedChange {
                    kind: ChangeKind::Install,
                    version: PackageVersion::new(name, candidate, kind),
                });
            }
            None => plan.push(PlannedChange {
                kind: ChangeKind::Install,
                version: PackageVersion::new(name, candidate, kind),
            }),
        }
    }
    for name in selection.removals() {
        if let Some(current) = installed.get(name) {
            plan.push(PlannedChange {
                kind: ChangeKind::Remove,
                version: PackageVersion::new(name, current, kind),
            });
        }
    }
    plan
}

/// Select an upgrade to the highest candidate for every installed
/// package that has one, skipping `blocked` names (holds).
pub fn upgrade_all(
    store: &RecordStore,
    installed: &BTreeMap<String, String>,
    blocked: &BTreeSet<String>,
    selection: &mut Selection,
) {
    for (name, current) in installed {
        if blocked.contains(name) {
            continue;
        }
        if let Some(candidate) = store.candidate(name) {
            if crate::version::compare_versions(&candidate.version, current)
                == std::cmp::Ordering::Greater
            {
                selection.mark_install(name, &candidate.version);
            }
        }
    }
}

/// The opaque dependency-resolution engine contract.
///
/// Given the catalog, the installed set, and a selection whose marked
/// entries are protected, extend the selection until nothing is broken,
/// or explain (as text) why that is impossible. Implementations must
/// never alter a protected name's selected state.
pub trait DepSolver {
    fn fix(
        &self,
        store: &RecordStore,
        installed: &BTreeMap<String, String>,
        selection: &mut Selection,
    ) -> std::result::Result<(), String>;
}

/// Minimal bundled engine: greedy requirement closure.
///
/// Installs the highest candidate satisfying each unsatisfied positive
/// group and removes conflict targets, refusing whenever the only way
/// forward would change a protected package.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClosureSolver;

impl ClosureSolver {
    fn fix_record(
        &self,
        store: &RecordStore,
        installed: &BTreeMap<String, String>,
        selection: &mut Selection,
        record: &PackageRecord,
    ) -> std::result::Result<bool, String> {
        let mut progressed = false;
        for group in record.pre_depends.iter().chain(&record.depends) {
            if group
                .alternatives()
                .iter()
                .any(|atom| atom_satisfied(store, installed, selection, atom))
            {
                continue;
            }
            let mut fixed = false;
            for atom in group.alternatives() {
                if selection.is_protected(&atom.name) {
                    continue;
                }
                let candidate = store.versions_of(&atom.name).iter().find(|r| {
                    match &atom.constraint {
                        Some((op, bound)) => satisfies(&r.version, *op, bound),
                        None => true,
                    }
                });
                if let Some(candidate) = candidate {
                    debug!(
                        "Resolver pulls in {} {} for {}",
                        candidate.name, candidate.version, record.name
                    );
                    selection.mark_install(&candidate.name, &candidate.version);
                    fixed = true;
                    progressed = true;
                    break;
                }
            }
            if !fixed {
                return Err(format!(
                    "Unable to satisfy the dependency {} of {} {}",
                    group, record.name, record.version
                ));
            }
        }
        for group in record.conflicts.iter().chain(&record.breaks) {
            for atom in group.alternatives() {
                if atom.name == record.name {
                    continue;
                }
                if !atom_satisfied(store, installed, selection, atom) {
                    continue;
                }
                if selection.is_protected(&atom.name) {
                    return Err(format!(
                        "Unable to resolve the conflict between {} {} and {}",
                        record.name, record.version, atom.name
                    ));
                }
                debug!("Resolver removes {} conflicting with {}", atom.name, record.name);
                selection.mark_remove(&atom.name);
                progressed = true;
            }
        }
        Ok(progressed)
    }
}

impl DepSolver for ClosureSolver {
    fn fix(
        &self,
        store: &RecordStore,
        installed: &BTreeMap<String, String>,
        selection: &mut Selection,
    ) -> std::result::Result<(), String> {
        for _ in 0..MAX_FIX_PASSES {
            let broken = broken_packages(store, installed, selection);
            if broken.is_empty() {
                return Ok(());
            }
            let mut progressed = false;
            for name in &broken {
                let Some(end) = selection.end_version(installed, name) else {
                    continue;
                };
                let Some(record) = store.get(name, end).cloned() else {
                    continue;
                };
                match self.fix_record(store, installed, selection, &record) {
                    Ok(p) => progressed |= p,
                    // An unsatisfiable package that nothing protects is
                    // dropped instead of failing the whole resolution.
                    Err(message) => {
                        if selection.is_protected(name) {
                            return Err(message);
                        }
                        debug!("Resolver drops unsatisfiable package {}", name);
                        selection.mark_remove(name);
                        progressed = true;
                    }
                }
            }
            if !progressed {
                return Err(format!(
                    "Unable to resolve the following broken packages: {}",
                    broken.into_iter().collect::<Vec<_>>().join(", ")
                ));
            }
        }
        Err("Dependency resolution did not converge".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::parse_depends;

    fn record(name: &str, version: &str) -> PackageRecord {
        PackageRecord::new(name, version)
    }

    fn record_with_depends(name: &str, version: &str, depends: &str) -> PackageRecord {
        let mut r = record(name, version);
        r.depends = parse_depends(depends);
        r
    }

    fn installed(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_no_breakage_for_satisfied_world() {
        let store = RecordStore::rebuild(vec![
            record_with_depends("app", "1.0", "lib (>= 1.0)"),
            record("lib", "1.0"),
        ]);
        let installed = installed(&[("app", "1.0"), ("lib", "1.0")]);
        let selection = Selection::new();
        assert!(broken_packages(&store, &installed, &selection).is_empty());
    }

    #[test]
    fn test_marking_install_without_dependency_breaks() {
        let store = RecordStore::rebuild(vec![
            record_with_depends("app", "1.0", "lib"),
            record("lib", "1.0"),
        ]);
        let installed = installed(&[]);
        let mut selection = Selection::new();
        selection.mark_install("app", "1.0");

        let broken = broken_packages(&store, &installed, &selection);
        assert_eq!(broken, ["app".to_string()].into_iter().collect());
    }

    #[test]
    fn test_closure_solver_pulls_in_dependency() {
        let store = RecordStore::rebuild(vec![
            record_with_depends("app", "1.0", "lib (>= 1.0)"),
            record("lib", "0.9"),
            record("lib", "1.2"),
        ]);
        let installed = installed(&[]);
        let mut selection = Selection::new();
        selection.mark_install("app", "1.0");
        selection.protect("app");

        ClosureSolver.fix(&store, &installed, &mut selection).unwrap();
        assert_eq!(
            selection.end_version(&installed, "lib"),
            Some("1.2"),
            "solver should pick the highest satisfying candidate"
        );
        assert!(broken_packages(&store, &installed, &selection).is_empty());
    }

    #[test]
    fn test_closure_solver_fails_on_unsatisfiable() {
        let store = RecordStore::rebuild(vec![record_with_depends("app", "1.0", "ghost (>= 2.0)")]);
        let installed = installed(&[]);
        let mut selection = Selection::new();
        selection.mark_install("app", "1.0");
        selection.protect("app");

        let err = ClosureSolver.fix(&store, &installed, &mut selection).unwrap_err();
        assert!(err.contains("ghost"), "message should name the target: {}", err);
    }

    #[test]
    fn test_closure_solver_respects_protected_removals() {
        // Removing lib breaks app; app is protected so the solver cannot
        // silently drop it to satisfy the removal.
        let store = RecordStore::rebuild(vec![
            record_with_depends("app", "1.0", "lib"),
            record("lib", "1.0"),
        ]);
        let installed = installed(&[("app", "1.0"), ("lib", "1.0")]);
        let mut selection = Selection::new();
        selection.mark_remove("lib");
        selection.protect("lib");
        selection.protect("app");

        let result = ClosureSolver.fix(&store, &installed, &mut selection);
        assert!(result.is_err());
    }

    #[test]
    fn test_closure_solver_removes_unprotected_dependent() {
        let store = RecordStore::rebuild(vec![
            record_with_depends("app", "1.0", "lib"),
            record("lib", "1.0"),
        ]);
        let installed = installed(&[("app", "1.0"), ("lib", "1.0")]);
        let mut selection = Selection::new();
        selection.mark_remove("lib");
        selection.protect("lib");

        ClosureSolver.fix(&store, &installed, &mut selection).unwrap();
        assert_eq!(selection.end_version(&installed, "app"), None);
    }

    #[test]
    fn test_virtual_provides_satisfies_unversioned_atom() {
        let mut nano = record("nano", "7.2");
        nano.provides = vec!["editor".to_string()];
        let store = RecordStore::rebuild(vec![record_with_depends("mail", "1.0", "editor"), nano]);
        let installed = installed(&[("mail", "1.0"), ("nano", "7.2")]);
        let selection = Selection::new();
        assert!(broken_packages(&store, &installed, &selection).is_empty());
    }

    #[test]
    fn test_conflict_breaks_end_state() {
        let mut holdout = record("holdout", "1.0");
        holdout.conflicts = parse_depends("rival");
        let store = RecordStore::rebuild(vec![holdout, record("rival", "1.0")]);
        let installed = installed(&[("rival", "1.0")]);
        let mut selection = Selection::new();
        selection.mark_install("holdout", "1.0");

        let broken = broken_packages(&store, &installed, &selection);
        assert!(broken.contains("holdout"));
    }

    #[test]
    fn test_planned_changes_renders_upgrade_as_remove_plus_install() {
        let installed = installed(&[("app", "1.0"), ("gone", "0.5")]);
        let mut selection = Selection::new();
        selection.mark_install("app", "2.0");
        selection.mark_install("new", "1.0");
        selection.mark_remove("gone");

        let plan = planned_changes(&installed, &selection, BackendKind::Deb);
        assert_eq!(plan.len(), 4);
        assert!(plan.contains(&PlannedChange {
            kind: ChangeKind::Remove,
            version: PackageVersion::new("app", "1.0", BackendKind::Deb),
        }));
        assert!(plan.contains(&PlannedChange {
            kind: ChangeKind::Install,
            version: PackageVersion::new("app", "2.0", BackendKind::Deb),
        }));
        assert!(plan.contains(&PlannedChange {
            kind: ChangeKind::Install,
            version: PackageVersion::new("new", "1.0", BackendKind::Deb),
        }));
        assert!(plan.contains(&PlannedChange {
            kind: ChangeKind::Remove,
            version: PackageVersion::new("gone", "0.5", BackendKind::Deb),
        }));
    }

    #[test]
    fn test_planned_changes_skips_already_installed_candidate() {
        let installed = installed(&[("app", "1.0")]);
        let mut selection = Selection::new();
        selection.mark_install("app", "1.0");
        assert!(planned_changes(&installed, &selection, BackendKind::Deb).is_empty());
    }

    #[test]
    fn test_upgrade_all_skips_blocked_names() {
        let store = RecordStore::rebuild(vec![
            record("app", "1.0"),
            record("app", "2.0"),
            record("held", "1.0"),
            record("held", "3.0"),
        ]);
        let installed = installed(&[("app", "1.0"), ("held", "1.0")]);
        let blocked = ["held".to_string()].into_iter().collect();
        let mut selection = Selection::new();
        upgrade_all(&store, &installed, &blocked, &mut selection);

        assert_eq!(selection.end_version(&installed, "app"), Some("2.0"));
        assert_eq!(selection.end_version(&installed, "held"), Some("1.0"));
    }
}
