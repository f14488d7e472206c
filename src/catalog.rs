// src/catalog.rs

//! Package identities, backend-native records, and the digest index
//!
//! `PackageVersion` is the immutable identity the rest of the engine
//! passes around; `PackageRecord` is the richer stanza one channel entry
//! produced, kept by the owning backend; `CatalogIndex` is the
//! digest <-> version mapping rebuilt wholesale on every channel reload.

use crate::version::{compare_versions, VersionOp};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Which backend variant owns a package version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BackendKind {
    /// Modern engine (apt-style holds)
    Deb,
    /// Legacy engine (name+constraint locks, no holds)
    Legacy,
}

/// Identity of one installable unit at one version.
///
/// Immutable once observed from a catalog reload; a reload supersedes
/// rather than mutates.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageVersion {
    pub name: String,
    pub version: String,
    pub kind: BackendKind,
}

impl PackageVersion {
    pub fn new(name: impl Into<String>, version: impl Into<String>, kind: BackendKind) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            kind,
        }
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

/// 20-byte canonical identity digest of a package skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; 20]);

impl Digest {
    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Parse a digest from its 40-character hex rendering.
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 40 {
            return None;
        }
        let mut bytes = [0u8; 20];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let s = std::str::from_utf8(chunk).ok()?;
            bytes[i] = u8::from_str_radix(s, 16).ok()?;
        }
        Some(Self(bytes))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// One alternative inside a relationship group, e.g. `libc6 (>= 2.34)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DepAtom {
    pub name: String,
    pub constraint: Option<(VersionOp, String)>,
}

impl DepAtom {
    pub fn unversioned(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constraint: None,
        }
    }
}

impl fmt::Display for DepAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.constraint {
            Some((op, version)) => write!(f, "{} {} {}", self.name, op, version),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A relationship group: one or more alternatives joined by `|`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DepGroup(Vec<DepAtom>);

impl DepGroup {
    pub fn new(alternatives: Vec<DepAtom>) -> Self {
        Self(alternatives)
    }

    pub fn alternatives(&self) -> &[DepAtom] {
        &self.0
    }
}

impl fmt::Display for DepGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.0.iter().map(|atom| atom.to_string()).collect();
        write!(f, "{}", rendered.join(" | "))
    }
}

/// Backend-native view of one package stanza.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    pub section: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub size: Option<u64>,
    pub installed_size: Option<u64>,
    pub filename: Option<String>,
    pub provides: Vec<String>,
    pub pre_depends: Vec<DepGroup>,
    pub depends: Vec<DepGroup>,
    pub conflicts: Vec<DepGroup>,
    pub breaks: Vec<DepGroup>,
}

impl PackageRecord {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            section: None,
            summary: None,
            description: None,
            size: None,
            installed_size: None,
            filename: None,
            provides: Vec::new(),
            pre_depends: Vec::new(),
            depends: Vec::new(),
            conflicts: Vec::new(),
            breaks: Vec::new(),
        }
    }

    /// Identity of this record under the given backend.
    pub fn identity(&self, kind: BackendKind) -> PackageVersion {
        PackageVersion::new(&self.name, &self.version, kind)
    }
}

/// Parse a relationship field like
/// `"libc6 (>= 2.34), editor | nano, zlib1g"` into groups of
/// alternatives. Empty and malformed entries are skipped rather than
/// failing the whole stanza.
pub fn parse_depends(field: &str) -> Vec<DepGroup> {
    let mut groups = Vec::new();
    for group in field.split(',') {
        let mut alternatives = Vec::new();
        for alternative in group.split('|') {
            if let Some(atom) = parse_atom(alternative) {
                alternatives.push(atom);
            }
        }
        if !alternatives.is_empty() {
            groups.push(DepGroup::new(alternatives));
        }
    }
    groups
}

/// Parse a `Provides` field into target names, dropping any `= version`
/// qualifier on versioned provides.
pub fn parse_provides(field: &str) -> Vec<String> {
    field
        .split(',')
        .filter_map(|entry| parse_atom(entry))
        .map(|atom| atom.name)
        .collect()
}

/// Parse one alternative: `name` or `name (op version)`.
fn parse_atom(entry: &str) -> Option<DepAtom> {
    let entry = entry.trim();
    if entry.is_empty() {
        return None;
    }
    if let Some(paren) = entry.find('(') {
        let name = entry[..paren].trim();
        let inner = entry[paren + 1..].trim_end_matches(')').trim();
        if name.is_empty() {
            return None;
        }
        let constraint = inner.split_once(char::is_whitespace).and_then(|(op, ver)| {
            VersionOp::parse(op.trim()).map(|op| (op, ver.trim().to_string()))
        });
        return Some(DepAtom {
            name: name.to_string(),
            constraint,
        });
    }
    // Architecture qualifiers on names are not modeled.
    Some(DepAtom::unversioned(entry))
}

/// All records from the current channel load, grouped by name with the
/// versions of each name sorted highest-first (the first entry is the
/// candidate).
#[derive(Debug, Default)]
pub struct RecordStore {
    by_name: BTreeMap<String, Vec<PackageRecord>>,
}

impl RecordStore {
    /// Build a store from a freshly loaded record set, collapsing exact
    /// duplicates from overlapping channels.
    pub fn rebuild(records: Vec<PackageRecord>) -> Self {
        let mut by_name: BTreeMap<String, Vec<PackageRecord>> = BTreeMap::new();
        for record in records {
            let versions = by_name.entry(record.name.clone()).or_default();
            if !versions.iter().any(|r| r.version == record.version) {
                versions.push(record);
            }
        }
        for versions in by_name.values_mut() {
            versions.sort_by(|a, b| compare_versions(&b.version, &a.version));
        }
        Self { by_name }
    }

    pub fn versions_of(&self, name: &str) -> &[PackageRecord] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, name: &str, version: &str) -> Option<&PackageRecord> {
        self.versions_of(name).iter().find(|r| r.version == version)
    }

    /// Highest available version of a name, if any.
    pub fn candidate(&self, name: &str) -> Option<&PackageRecord> {
        self.versions_of(name).first()
    }

    /// Records that provide `target` as a virtual name.
    pub fn providers_of(&self, target: &str) -> Vec<&PackageRecord> {
        self.by_name
            .values()
            .flatten()
            .filter(|record| record.provides.iter().any(|p| p == target))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PackageRecord> {
        self.by_name.values().flatten()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.by_name.keys()
    }

    pub fn len(&self) -> usize {
        self.by_name.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Bidirectional digest <-> version index over the loaded catalog.
#[derive(Debug, Default)]
pub struct CatalogIndex {
    by_digest: HashMap<Digest, PackageVersion>,
    by_version: HashMap<PackageVersion, Digest>,
}

impl CatalogIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every entry from the previous load.
    pub fn clear(&mut self) {
        self.by_digest.clear();
        self.by_version.clear();
    }

    pub fn insert(&mut self, digest: Digest, version: PackageVersion) {
        self.by_version.insert(version.clone(), digest);
        self.by_digest.insert(digest, version);
    }

    pub fn digest_for(&self, version: &PackageVersion) -> Option<Digest> {
        self.by_version.get(version).copied()
    }

    pub fn version_for(&self, digest: &Digest) -> Option<&PackageVersion> {
        self.by_digest.get(digest)
    }

    /// All digests for the currently loaded channel set.
    pub fn digests(&self) -> impl Iterator<Item = &Digest> {
        self.by_version.values()
    }

    pub fn len(&self) -> usize {
        self.by_digest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_digest.is_empty()
    }
}
