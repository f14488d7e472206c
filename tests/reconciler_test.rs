// tests/reconciler_test.rs

//! Integration tests for the transaction engine
//!
//! These drive the public facade surface end-to-end: dir channels on
//! disk, a real host state database, and full mark/commit cycles.

use std::fs;
use std::path::Path;
use tempfile::TempDir;

use steward::catalog::{BackendKind, PackageVersion};
use steward::facade::{
    CommitOutcome, DebFacade, FacadeConfig, PackageFacade, HOLDS_CHANGED_MESSAGE,
};
use steward::Error;

fn write_index(dir: &Path, stanzas: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("Packages"), stanzas).unwrap();
}

/// A facade over a scratch data dir with one dir channel already
/// loaded.
fn facade_with_index(stanzas: &str) -> (TempDir, DebFacade) {
    let dir = TempDir::new().unwrap();
    let channel_dir = dir.path().join("channel");
    write_index(&channel_dir, stanzas);

    let mut facade = DebFacade::open(FacadeConfig::new(dir.path().join("data"))).unwrap();
    facade
        .add_dir_channel(channel_dir.to_str().unwrap())
        .unwrap();
    facade.reload_channels(true).unwrap();
    (dir, facade)
}

fn deb(name: &str, version: &str) -> PackageVersion {
    PackageVersion::new(name, version, BackendKind::Deb)
}

fn install(facade: &mut DebFacade, name: &str, version: &str) {
    facade.mark_install(&deb(name, version));
    let outcome = facade.perform_changes().unwrap();
    assert!(matches!(outcome, CommitOutcome::Committed(_)));
    facade.reset_marks();
}

const BASIC_INDEX: &str = "\
Package: pkg
Version: 1.0
Description: A plain package

Package: helper
Version: 2.0
Description: Another plain package
";

#[test]
fn test_hash_is_stable_across_reloads() {
    let index = "\
Package: editor
Version: 1.5-2
Description: Editor with relations
Provides: text-editor
Depends: libfoo (>= 1.0), libbar | libbaz
Conflicts: rival
";
    let (_dir, mut facade) = facade_with_index(index);
    let version = deb("editor", "1.5-2");
    let first = facade.get_package_hash(&version).unwrap();

    facade.reload_channels(true).unwrap();
    let second = facade.get_package_hash(&version).unwrap();
    assert_eq!(first, second);

    // The digest maps back to the same version.
    assert_eq!(facade.get_package_by_hash(&first), Some(version));
}

#[test]
fn test_hashes_cover_every_catalog_version() {
    let (_dir, facade) = facade_with_index(BASIC_INDEX);
    assert_eq!(facade.get_packages().len(), 2);
    assert_eq!(facade.get_package_hashes().len(), 2);

    let a = facade.get_package_hash(&deb("pkg", "1.0")).unwrap();
    let b = facade.get_package_hash(&deb("helper", "2.0")).unwrap();
    assert_ne!(a, b);
}

#[test]
fn test_install_commits_to_host_state() {
    let (_dir, mut facade) = facade_with_index(BASIC_INDEX);
    let version = deb("pkg", "1.0");
    assert!(!facade.is_installed(&version));

    facade.mark_install(&version);
    let outcome = facade.perform_changes().unwrap();
    match outcome {
        CommitOutcome::Committed(log) => assert!(log.contains("Installing pkg 1.0")),
        other => panic!("expected commit, got {:?}", other),
    }
    assert!(facade.is_installed(&version));

    // Marks survive the commit; replaying them is now a strict no-op.
    assert_eq!(facade.get_pending_marks().installs().len(), 1);
    assert_eq!(facade.perform_changes().unwrap(), CommitOutcome::NoOp);
}

#[test]
fn test_unrequested_dependency_is_rejected() {
    let index = "\
Package: a
Version: 1.0
Description: Standalone

Package: b
Version: 1.0
Description: Needs c
Depends: c

Package: c
Version: 1.0
Description: The dependency
";
    let (_dir, mut facade) = facade_with_index(index);
    facade.mark_install(&deb("a", "1.0"));
    facade.mark_install(&deb("b", "1.0"));

    let err = facade.perform_changes().unwrap_err();
    match err {
        Error::Dependency(versions) => assert_eq!(versions, vec!["c 1.0".to_string()]),
        other => panic!("expected dependency error, got {:?}", other),
    }

    // Nothing was committed and the queue is intact.
    assert!(!facade.is_installed(&deb("a", "1.0")));
    assert_eq!(facade.get_pending_marks().installs().len(), 2);
}

#[test]
fn test_install_with_dependency_both_marked() {
    let index = "\
Package: b
Version: 1.0
Description: Needs c
Depends: c

Package: c
Version: 1.0
Description: The dependency
";
    let (_dir, mut facade) = facade_with_index(index);
    facade.mark_install(&deb("b", "1.0"));
    facade.mark_install(&deb("c", "1.0"));

    let outcome = facade.perform_changes().unwrap();
    assert!(matches!(outcome, CommitOutcome::Committed(_)));
    assert!(facade.is_installed(&deb("b", "1.0")));
    assert!(facade.is_installed(&deb("c", "1.0")));
}

#[test]
fn test_missing_dependency_reports_unmet() {
    let index = "\
Package: b
Version: 1.0
Description: Needs something unavailable
Depends: libmissing
";
    let (_dir, mut facade) = facade_with_index(index);
    facade.mark_install(&deb("b", "1.0"));

    let err = facade.perform_changes().unwrap_err();
    let message = err.to_string();
    assert!(matches!(err, Error::Transaction(_)));
    assert!(message.contains("The following packages have unmet dependencies:"));
    assert!(message.contains("b: Depends: libmissing but is not installable"));
    assert!(!facade.is_installed(&deb("b", "1.0")));
}

#[test]
fn test_held_package_blocks_removal() {
    let (_dir, mut facade) = facade_with_index(BASIC_INDEX);
    install(&mut facade, "pkg", "1.0");

    facade.mark_create_hold(&deb("pkg", "1.0")).unwrap();
    assert_eq!(
        facade.perform_changes().unwrap(),
        CommitOutcome::Committed(HOLDS_CHANGED_MESSAGE.to_string())
    );
    facade.reset_marks();
    assert_eq!(facade.get_locked_versions(), vec![deb("pkg", "1.0")]);

    facade.mark_remove(&deb("pkg", "1.0"));
    let err = facade.perform_changes().unwrap_err();
    assert!(err.to_string().contains("held: pkg"));
    assert!(facade.is_installed(&deb("pkg", "1.0")));
    facade.reset_marks();

    // Releasing the hold unblocks the removal.
    facade.mark_remove_hold(&deb("pkg", "1.0")).unwrap();
    facade.perform_changes().unwrap();
    facade.reset_marks();

    facade.mark_remove(&deb("pkg", "1.0"));
    let outcome = facade.perform_changes().unwrap();
    match outcome {
        CommitOutcome::Committed(log) => assert!(log.contains("Removing pkg 1.0")),
        other => panic!("expected commit, got {:?}", other),
    }
    assert!(!facade.is_installed(&deb("pkg", "1.0")));
}

#[test]
fn test_upgrade_renders_remove_and_install() {
    let index = "\
Package: pkg
Version: 1.0
Description: Old

Package: pkg
Version: 2.0
Description: New
";
    let (_dir, mut facade) = facade_with_index(index);
    install(&mut facade, "pkg", "1.0");

    facade.mark_install(&deb("pkg", "2.0"));
    facade.mark_remove(&deb("pkg", "1.0"));
    let outcome = facade.perform_changes().unwrap();
    match outcome {
        CommitOutcome::Committed(log) => {
            assert!(log.contains("Removing pkg 1.0"));
            assert!(log.contains("Installing pkg 2.0"));
        }
        other => panic!("expected commit, got {:?}", other),
    }
    assert!(facade.is_installed(&deb("pkg", "2.0")));
    assert!(!facade.is_installed(&deb("pkg", "1.0")));
}

#[test]
fn test_global_upgrade_skips_held_packages() {
    let index = "\
Package: foo
Version: 1.0
Description: Old foo

Package: foo
Version: 2.0
Description: New foo

Package: bar
Version: 1.0
Description: Old bar

Package: bar
Version: 2.0
Description: New bar
";
    let (_dir, mut facade) = facade_with_index(index);
    install(&mut facade, "foo", "1.0");
    install(&mut facade, "bar", "1.0");

    facade.mark_create_hold(&deb("foo", "1.0")).unwrap();
    facade.perform_changes().unwrap();
    facade.reset_marks();

    facade.mark_global_upgrade();
    let outcome = facade.perform_changes().unwrap();
    assert!(matches!(outcome, CommitOutcome::Committed(_)));

    assert!(facade.is_installed(&deb("foo", "1.0")));
    assert!(facade.is_installed(&deb("bar", "2.0")));
    assert!(!facade.is_installed(&deb("bar", "1.0")));
}

#[test]
fn test_installer_hook_failure_preserves_queue() {
    let dir = TempDir::new().unwrap();
    let channel_dir = dir.path().join("channel");
    write_index(&channel_dir, BASIC_INDEX);

    let config = FacadeConfig::new(dir.path().join("data"))
        .installer_hook(vec!["false".to_string()]);
    let mut facade = DebFacade::open(config).unwrap();
    facade
        .add_dir_channel(channel_dir.to_str().unwrap())
        .unwrap();
    facade.reload_channels(true).unwrap();

    facade.mark_install(&deb("pkg", "1.0"));
    let err = facade.perform_changes().unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Package operation log:"));
    assert!(message.contains("Installing pkg 1.0"));

    assert!(!facade.is_installed(&deb("pkg", "1.0")));
    assert_eq!(facade.get_pending_marks().installs().len(), 1);
}

#[test]
fn test_installer_hook_receives_plan_and_feeds_log() {
    let dir = TempDir::new().unwrap();
    let channel_dir = dir.path().join("channel");
    write_index(&channel_dir, BASIC_INDEX);

    let plan_file = dir.path().join("plan.txt");
    let script = dir.path().join("installer.sh");
    fs::write(
        &script,
        format!("cat > {}\necho applied\n", plan_file.display()),
    )
    .unwrap();

    let config = FacadeConfig::new(dir.path().join("data")).installer_hook(vec![
        "sh".to_string(),
        script.to_str().unwrap().to_string(),
    ]);
    let mut facade = DebFacade::open(config).unwrap();
    facade
        .add_dir_channel(channel_dir.to_str().unwrap())
        .unwrap();
    facade.reload_channels(true).unwrap();

    facade.mark_install(&deb("pkg", "1.0"));
    let outcome = facade.perform_changes().unwrap();
    match outcome {
        CommitOutcome::Committed(log) => {
            assert!(log.contains("Installing pkg 1.0"));
            assert!(log.contains("applied"));
        }
        other => panic!("expected commit, got {:?}", other),
    }

    let plan = fs::read_to_string(&plan_file).unwrap();
    assert_eq!(plan, "install pkg 1.0\n");
    assert!(facade.is_installed(&deb("pkg", "1.0")));
}

#[test]
fn test_channel_add_is_idempotent() {
    let (dir, mut facade) = facade_with_index(BASIC_INDEX);
    let channel_dir = dir.path().join("channel");
    facade
        .add_dir_channel(channel_dir.to_str().unwrap())
        .unwrap();
    assert_eq!(facade.list_channels().len(), 1);
}

#[test]
fn test_channel_list_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("data");
    {
        let mut facade = DebFacade::open(FacadeConfig::new(&data_dir)).unwrap();
        facade
            .add_deb_channel("http://example.com/repo", "stable", &["main".to_string()])
            .unwrap();
    }
    let facade = DebFacade::open(FacadeConfig::new(&data_dir)).unwrap();
    assert_eq!(facade.list_channels().len(), 1);
}

#[test]
fn test_reset_channels_drops_catalog() {
    let (_dir, mut facade) = facade_with_index(BASIC_INDEX);
    assert!(!facade.get_packages().is_empty());

    facade.reset_channels().unwrap();
    assert!(facade.list_channels().is_empty());
    assert!(facade.get_packages().is_empty());
    assert!(facade.get_package_hashes().is_empty());
}

#[test]
fn test_reload_failure_leaves_channel_error() {
    let dir = TempDir::new().unwrap();
    let mut facade = DebFacade::open(FacadeConfig::new(dir.path().join("data"))).unwrap();
    facade
        .add_dir_channel(dir.path().join("no-such-dir").to_str().unwrap())
        .unwrap();

    let err = facade.reload_channels(true).unwrap_err();
    assert!(matches!(err, Error::Channel(_)));
}
