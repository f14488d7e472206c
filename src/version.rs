// src/version.rs

//! Debian version ordering and relationship operators
//!
//! Implements the dpkg comparison algorithm (epoch, upstream version,
//! revision, with `~` sorting before everything) so that candidate
//! selection and constraint checks agree with the native tools.

use std::cmp::Ordering;
use std::fmt;

/// Comparison operator in a relationship field version constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionOp {
    StrictlyEarlier,
    EarlierEqual,
    Exactly,
    LaterEqual,
    StrictlyLater,
}

impl VersionOp {
    /// Parse an operator token from a relationship field.
    ///
    /// The single-character forms `<` and `>` are the historical
    /// spellings of `<=` and `>=`.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "<<" => Some(Self::StrictlyEarlier),
            "<=" | "<" => Some(Self::EarlierEqual),
            "=" => Some(Self::Exactly),
            ">=" | ">" => Some(Self::LaterEqual),
            ">>" => Some(Self::StrictlyLater),
            _ => None,
        }
    }

    /// Whether `ordering` (candidate compared to the constraint bound)
    /// satisfies this operator.
    pub fn matches(self, ordering: Ordering) -> bool {
        match self {
            Self::StrictlyEarlier => ordering == Ordering::Less,
            Self::EarlierEqual => ordering != Ordering::Greater,
            Self::Exactly => ordering == Ordering::Equal,
            Self::LaterEqual => ordering != Ordering::Less,
            Self::StrictlyLater => ordering == Ordering::Greater,
        }
    }
}

impl fmt::Display for VersionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            Self::StrictlyEarlier => "<<",
            Self::EarlierEqual => "<=",
            Self::Exactly => "=",
            Self::LaterEqual => ">=",
            Self::StrictlyLater => ">>",
        };
        write!(f, "{}", token)
    }
}

/// Compare two Debian version strings.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (a_epoch, a_upstream, a_revision) = split_version(a);
    let (b_epoch, b_upstream, b_revision) = split_version(b);

    a_epoch
        .cmp(&b_epoch)
        .then_with(|| compare_fragment(a_upstream, b_upstream))
        .then_with(|| compare_fragment(a_revision, b_revision))
}

/// Check whether `candidate` satisfies `op bound`.
pub fn satisfies(candidate: &str, op: VersionOp, bound: &str) -> bool {
    op.matches(compare_versions(candidate, bound))
}

/// Split a version string into (epoch, upstream, revision).
///
/// The epoch is everything before the first `:` if it is all digits;
/// the revision is everything after the last `-`.
fn split_version(version: &str) -> (u64, &str, &str) {
    let (epoch, rest) = match version.split_once(':') {
        Some((epoch, rest)) if !epoch.is_empty() && epoch.bytes().all(|b| b.is_ascii_digit()) => {
            (epoch.parse().unwrap_or(0), rest)
        }
        _ => (0, version),
    };
    let (upstream, revision) = match rest.rsplit_once('-') {
        Some((upstream, revision)) => (upstream, revision),
        None => (rest, ""),
    };
    (epoch, upstream, revision)
}

/// Character weight for the non-digit comparison, per dpkg: `~` sorts
/// before the end of the string, letters before everything else.
fn order(c: Option<u8>) -> i32 {
    match c {
        None => 0,
        Some(b'~') => -1,
        Some(c) if c.is_ascii_digit() => 0,
        Some(c) if c.is_ascii_alphabetic() => i32::from(c),
        Some(c) => i32::from(c) + 256,
    }
}

/// Compare one upstream-version or revision fragment.
fn compare_fragment(a: &str, b: &str) -> Ordering {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let mut i = 0;
    let mut j = 0;

    while i < a.len() || j < b.len() {
        // Non-digit run, including the `~`-before-end rule.
        while i < a.len() && !a[i].is_ascii_digit() || j < b.len() && !b[j].is_ascii_digit() {
            let oa = order(a.get(i).copied().filter(|c| !c.is_ascii_digit()));
            let ob = order(b.get(j).copied().filter(|c| !c.is_ascii_digit()));
            if oa != ob {
                return oa.cmp(&ob);
            }
            // Equal nonzero weights imply both sides sit on the same
            // non-digit character, so both cursors advance.
            i += 1;
            j += 1;
        }

        // Numeric run, compared by value (leading zeros skipped).
        while i < a.len() && a[i] == b'0' {
            i += 1;
        }
        while j < b.len() && b[j] == b'0' {
            j += 1;
        }
        let mut first_diff = Ordering::Equal;
        while i < a.len() && a[i].is_ascii_digit() && j < b.len() && b[j].is_ascii_digit() {
            if first_diff == Ordering::Equal {
                first_diff = a[i].cmp(&b[j]);
            }
            i += 1;
            j += 1;
        }
        if i < a.len() && a[i].is_ascii_digit() {
            return Ordering::Greater;
        }
        if j < b.len() && b[j].is_ascii_digit() {
            return Ordering::Less;
        }
        if first_diff != Ordering::Equal {
            return first_diff;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_ordering() {
        assert_eq!(compare_versions("1.0", "1.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.0", "1.1"), Ordering::Less);
        assert_eq!(compare_versions("2.0", "1.9"), Ordering::Greater);
        assert_eq!(compare_versions("1.10", "1.9"), Ordering::Greater);
        assert_eq!(compare_versions("1.01", "1.1"), Ordering::Equal);
    }

    #[test]
    fn test_epoch_dominates() {
        assert_eq!(compare_versions("1:0.5", "2.0"), Ordering::Greater);
        assert_eq!(compare_versions("0:1.0", "1.0"), Ordering::Equal);
        assert_eq!(compare_versions("2:1.0", "1:9.9"), Ordering::Greater);
    }

    #[test]
    fn test_revision_ordering() {
        assert_eq!(compare_versions("1.0-1", "1.0-2"), Ordering::Less);
        assert_eq!(compare_versions("1.0-10", "1.0-2"), Ordering::Greater);
        assert_eq!(compare_versions("1.0", "1.0-1"), Ordering::Less);
    }

    #[test]
    fn test_tilde_sorts_before_everything() {
        assert_eq!(compare_versions("1.0~rc1", "1.0"), Ordering::Less);
        assert_eq!(compare_versions("1.0~rc1", "1.0~rc2"), Ordering::Less);
        assert_eq!(compare_versions("1.0~~", "1.0~"), Ordering::Less);
    }

    #[test]
    fn test_letters_sort_before_punctuation() {
        assert_eq!(compare_versions("1.0a", "1.0+"), Ordering::Less);
        assert_eq!(compare_versions("1.0+b1", "1.0+b2"), Ordering::Less);
    }

    #[test]
    fn test_operator_parsing() {
        assert_eq!(VersionOp::parse(">="), Some(VersionOp::LaterEqual));
        assert_eq!(VersionOp::parse(">"), Some(VersionOp::LaterEqual));
        assert_eq!(VersionOp::parse("<<"), Some(VersionOp::StrictlyEarlier));
        assert_eq!(VersionOp::parse("="), Some(VersionOp::Exactly));
        assert_eq!(VersionOp::parse("~="), None);
    }

    #[test]
    fn test_satisfies() {
        assert!(satisfies("2.34-3", VersionOp::LaterEqual, "2.34"));
        assert!(satisfies("1.0", VersionOp::Exactly, "1.0"));
        assert!(!satisfies("1.0~rc1", VersionOp::LaterEqual, "1.0"));
        assert!(satisfies("0.9", VersionOp::StrictlyEarlier, "1.0"));
    }
}
