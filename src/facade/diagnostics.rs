// src/facade/diagnostics.rs

//! Human-readable unmet-dependency reporting
//!
//! Renders the broken set into the advisory text attached to
//! transaction failures. The wording mirrors the native tools so that
//! operators reading the error can act on it directly; nothing here is
//! parsed back by the engine.

use crate::catalog::{DepAtom, DepGroup, PackageRecord, RecordStore};
use crate::resolver::{atom_satisfied, broken_packages, Selection};
use std::collections::BTreeMap;

/// Render the unmet-dependency report for the current end state.
///
/// For every broken package, each unsatisfied positive relation and
/// each violated negative relation becomes one entry, alternatives
/// joined with `or` and aligned under the first. Category order is
/// fixed: Pre-Depends, Depends, Conflicts, Breaks.
pub(crate) fn unmet_dependency_report(
    store: &RecordStore,
    installed: &BTreeMap<String, String>,
    selection: &Selection,
) -> String {
    let mut out = String::from("The following packages have unmet dependencies:");
    for name in broken_packages(store, installed, selection) {
        let Some(end) = selection.end_version(installed, &name) else {
            continue;
        };
        let Some(record) = store.get(&name, end) else {
            continue;
        };
        render_record(store, installed, selection, record, &mut out);
    }
    out
}

/// Relationship-field rendering, `name (op version)`, as operators read
/// it in the stanza rather than the canonical skeleton form.
fn render_atom(atom: &DepAtom) -> String {
    match &atom.constraint {
        Some((op, version)) => format!("{} ({} {})", atom.name, op, version),
        None => atom.name.clone(),
    }
}

fn render_record(
    store: &RecordStore,
    installed: &BTreeMap<String, String>,
    selection: &Selection,
    record: &PackageRecord,
    out: &mut String,
) {
    let categories: [(&str, &[DepGroup], bool); 4] = [
        ("Pre-Depends", &record.pre_depends, false),
        ("Depends", &record.depends, false),
        ("Conflicts", &record.conflicts, true),
        ("Breaks", &record.breaks, true),
    ];
    for (label, groups, negative) in categories {
        for group in groups {
            if negative {
                render_violated_conflicts(store, installed, selection, record, label, group, out);
            } else if !group
                .alternatives()
                .iter()
                .any(|atom| atom_satisfied(store, installed, selection, atom))
            {
                render_unsatisfied_group(installed, selection, record, label, group, out);
            }
        }
    }
}

/// One entry for a positive relation none of whose alternatives holds
/// in the end state.
fn render_unsatisfied_group(
    installed: &BTreeMap<String, String>,
    selection: &Selection,
    record: &PackageRecord,
    label: &str,
    group: &DepGroup,
    out: &mut String,
) {
    let prefix = format!("  {}: {}: ", record.name, label);
    let indent = " ".repeat(prefix.len());
    out.push('\n');
    out.push_str(&prefix);
    for (i, atom) in group.alternatives().iter().enumerate() {
        if i > 0 {
            out.push_str(" or\n");
            out.push_str(&indent);
        }
        out.push_str(&render_atom(atom));
        match selection.end_version(installed, &atom.name) {
            Some(end) => out.push_str(&format!(" but {} is to be installed", end)),
            None => out.push_str(" but is not installable"),
        }
    }
}

/// One entry per negative-relation target that ends up installed
/// anyway.
fn render_violated_conflicts(
    store: &RecordStore,
    installed: &BTreeMap<String, String>,
    selection: &Selection,
    record: &PackageRecord,
    label: &str,
    group: &DepGroup,
    out: &mut String,
) {
    for atom in group.alternatives() {
        if atom.name == record.name {
            continue;
        }
        if !atom_satisfied(store, installed, selection, atom) {
            continue;
        }
        if let Some(end) = selection.end_version(installed, &atom.name) {
            out.push_str(&format!(
                "\n  {}: {}: {} but {} is to be installed",
                record.name,
                label,
                render_atom(atom),
                end
            ));
        }
    }
}
