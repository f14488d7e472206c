// src/skeleton/mod.rs

//! Canonical package skeletons and identity hashing
//!
//! A skeleton is the canonical structural projection of one package
//! version: its name, version string, and the sorted set of relation
//! facts derived from its relationship fields. The SHA-1 digest over the
//! skeleton's canonical serialization is the sole identifier a remote
//! controller uses to recognize a package version, so the encoding here
//! is a wire contract: both backend variants must produce byte-identical
//! serializations for equal skeletons.

use crate::catalog::{Digest, PackageRecord};
use sha1::{Digest as _, Sha1};
use std::collections::BTreeSet;
use std::fmt;

// Base facts a relation can express.
const PACKAGE: u32 = 1 << 0;
const PROVIDES: u32 = 1 << 1;
const REQUIRES: u32 = 1 << 2;
const UPGRADES: u32 = 1 << 3;
const CONFLICTS: u32 = 1 << 4;

/// Wire code for the Debian package unit kind.
pub const DEB_PACKAGE: u32 = 1 << 16 | PACKAGE;

/// Kind of a relation fact attached to a skeleton.
///
/// The wire codes combine a kind discriminant in the high half with the
/// base fact bits in the low half; they are part of the hash contract
/// and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    Provides,
    NameProvides,
    Requires,
    OrRequires,
    Upgrades,
    Conflicts,
}

impl RelationKind {
    /// Stable numeric code used in the canonical serialization.
    pub fn wire_code(self) -> u32 {
        match self {
            Self::Provides => 2 << 16 | PROVIDES,
            Self::NameProvides => 3 << 16 | PROVIDES,
            Self::Requires => 4 << 16 | REQUIRES,
            Self::OrRequires => 5 << 16 | REQUIRES,
            Self::Upgrades => 6 << 16 | UPGRADES,
            Self::Conflicts => 7 << 16 | CONFLICTS,
        }
    }
}

impl PartialOrd for RelationKind {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RelationKind {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.wire_code().cmp(&other.wire_code())
    }
}

/// A directed fact about a package version's dependency graph.
///
/// `spec` is the canonical textual rendering of the target constraint,
/// e.g. `"libc6 >= 2.34"` or `"a | b"` for an or-group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Relation {
    pub kind: RelationKind,
    pub spec: String,
}

impl Relation {
    pub fn new(kind: RelationKind, spec: impl Into<String>) -> Self {
        Self {
            kind,
            spec: spec.into(),
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {}]", self.kind.wire_code(), self.spec)
    }
}

/// Optional descriptive fields carried alongside a skeleton.
///
/// Populated only on request; never part of the hash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkeletonInfo {
    pub section: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub size: Option<u64>,
    pub installed_size: Option<u64>,
}

/// Canonical structural fingerprint of one package version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSkeleton {
    type_code: u32,
    name: String,
    version: String,
    relations: Vec<Relation>,
    info: Option<SkeletonInfo>,
}

impl PackageSkeleton {
    /// Create a skeleton with no relations yet.
    pub fn new(type_code: u32, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            type_code,
            name: name.into(),
            version: version.into(),
            relations: Vec::new(),
            info: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Relations in canonical (sorted) order.
    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn info(&self) -> Option<&SkeletonInfo> {
        self.info.as_ref()
    }

    /// Replace the relation set. Duplicates collapse and the sequence is
    /// materialized in sorted `(kind, spec)` order, which is what makes
    /// the hash independent of discovery order.
    pub fn set_relations(&mut self, relations: BTreeSet<Relation>) {
        self.relations = relations.into_iter().collect();
    }

    /// Canonical serialization: the package header followed by each
    /// relation, bracket-delimited, with no other separators.
    fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = format!("[{} {} {}]", self.type_code, self.name, self.version);
        for relation in &self.relations {
            out.push_str(&relation.to_string());
        }
        out.into_bytes()
    }

    /// Compute the 20-byte identity digest for this skeleton.
    pub fn hash(&self) -> Digest {
        let mut hasher = Sha1::new();
        hasher.update(self.canonical_bytes());
        Digest::new(hasher.finalize().into())
    }
}

/// Build a skeleton from a backend-native package record.
///
/// With `with_info=false` every field that does not participate in
/// hashing is omitted, which keeps bulk catalog reloads cheap.
pub fn build_skeleton(record: &PackageRecord, with_info: bool) -> PackageSkeleton {
    let mut skeleton = PackageSkeleton::new(DEB_PACKAGE, &record.name, &record.version);
    let mut relations = BTreeSet::new();

    for target in &record.provides {
        relations.insert(Relation::new(RelationKind::Provides, target.clone()));
    }
    // Every version implicitly provides its own name at its own version
    // and upgrades anything earlier.
    relations.insert(Relation::new(
        RelationKind::NameProvides,
        format!("{} = {}", record.name, record.version),
    ));
    relations.insert(Relation::new(
        RelationKind::Upgrades,
        format!("{} < {}", record.name, record.version),
    ));

    for group in record.pre_depends.iter().chain(&record.depends) {
        let kind = if group.alternatives().len() > 1 {
            RelationKind::OrRequires
        } else {
            RelationKind::Requires
        };
        relations.insert(Relation::new(kind, group.to_string()));
    }
    for group in record.conflicts.iter().chain(&record.breaks) {
        relations.insert(Relation::new(RelationKind::Conflicts, group.to_string()));
    }
    skeleton.set_relations(relations);

    if with_info {
        skeleton.info = Some(SkeletonInfo {
            section: record.section.clone(),
            summary: record.summary.clone(),
            description: record.description.clone(),
            size: record.size,
            installed_size: record.installed_size,
        });
    }
    skeleton
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PackageRecord;

    fn minimal_record(name: &str, version: &str) -> PackageRecord {
        PackageRecord::new(name, version)
    }

    #[test]
    fn test_wire_codes_are_stable() {
        assert_eq!(DEB_PACKAGE, 65537);
        assert_eq!(RelationKind::Provides.wire_code(), 131074);
        assert_eq!(RelationKind::NameProvides.wire_code(), 196610);
        assert_eq!(RelationKind::Requires.wire_code(), 262148);
        assert_eq!(RelationKind::OrRequires.wire_code(), 327684);
        assert_eq!(RelationKind::Upgrades.wire_code(), 393224);
        assert_eq!(RelationKind::Conflicts.wire_code(), 458768);
    }

    #[test]
    fn test_hash_is_20_bytes() {
        let skeleton = build_skeleton(&minimal_record("name1", "version1"), false);
        assert_eq!(skeleton.hash().as_bytes().len(), 20);
    }

    #[test]
    fn test_hash_deterministic_across_insertion_order() {
        let mut a = PackageSkeleton::new(DEB_PACKAGE, "pkg", "1.0");
        let mut forward = BTreeSet::new();
        forward.insert(Relation::new(RelationKind::Requires, "libc6 >= 2.34"));
        forward.insert(Relation::new(RelationKind::Provides, "editor"));
        a.set_relations(forward);

        let mut b = PackageSkeleton::new(DEB_PACKAGE, "pkg", "1.0");
        let mut reverse = BTreeSet::new();
        reverse.insert(Relation::new(RelationKind::Provides, "editor"));
        reverse.insert(Relation::new(RelationKind::Requires, "libc6 >= 2.34"));
        // Duplicates collapse
        reverse.insert(Relation::new(RelationKind::Provides, "editor"));
        b.set_relations(reverse);

        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_hash_sensitive_to_relations() {
        let mut a = PackageSkeleton::new(DEB_PACKAGE, "pkg", "1.0");
        let mut b = a.clone();
        let mut relations = BTreeSet::new();
        relations.insert(Relation::new(RelationKind::Requires, "libc6"));
        a.set_relations(relations.clone());

        // Same spec, different kind
        let mut changed = BTreeSet::new();
        changed.insert(Relation::new(RelationKind::Conflicts, "libc6"));
        b.set_relations(changed);
        assert_ne!(a.hash(), b.hash());

        // Same kind, different spec
        let mut c = PackageSkeleton::new(DEB_PACKAGE, "pkg", "1.0");
        relations.insert(Relation::new(RelationKind::Requires, "libc6 >= 2.0"));
        c.set_relations(relations);
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn test_hash_sensitive_to_identity() {
        let a = build_skeleton(&minimal_record("pkg", "1.0"), false);
        let b = build_skeleton(&minimal_record("pkg", "1.1"), false);
        let c = build_skeleton(&minimal_record("gkp", "1.0"), false);
        assert_ne!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn test_info_does_not_affect_hash() {
        let mut record = minimal_record("pkg", "1.0");
        record.section = Some("utils".to_string());
        record.summary = Some("A package".to_string());
        record.size = Some(1024);

        let bare = build_skeleton(&record, false);
        let rich = build_skeleton(&record, true);
        assert!(bare.info().is_none());
        assert!(rich.info().is_some());
        assert_eq!(bare.hash(), rich.hash());
    }

    #[test]
    fn test_implicit_relations() {
        let skeleton = build_skeleton(&minimal_record("pkg", "1.0"), false);
        let rendered: Vec<String> = skeleton
            .relations()
            .iter()
            .map(|r| r.to_string())
            .collect();
        assert!(rendered.contains(&"[196610 pkg = 1.0]".to_string()));
        assert!(rendered.contains(&"[393224 pkg < 1.0]".to_string()));
    }

    #[test]
    fn test_canonical_serialization_layout() {
        let mut skeleton = PackageSkeleton::new(DEB_PACKAGE, "pkg", "1.0");
        let mut relations = BTreeSet::new();
        relations.insert(Relation::new(RelationKind::Provides, "editor"));
        skeleton.set_relations(relations);
        assert_eq!(
            skeleton.canonical_bytes(),
            b"[65537 pkg 1.0][131074 editor]".to_vec()
        );
    }
}
