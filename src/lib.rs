// src/lib.rs

//! Steward Package Engine
//!
//! Reconciliation engine for package transactions with a canonical
//! identity scheme, speaking for two host backends behind one facade.
//!
//! # Architecture
//!
//! - Facade-first: callers program against `facade::PackageFacade`,
//!   never against a backend variant
//! - Mark/commit: intent accumulates in a queue, `perform_changes`
//!   resolves and commits atomically or not at all
//! - Canonical identity: every package version hashes to a stable
//!   SHA-1 digest derived from its relationship facts
//! - Database-first host state: installed set, holds, and locks live
//!   in SQLite

pub mod catalog;
pub mod channel;
mod error;
pub mod facade;
pub mod resolver;
pub mod skeleton;
pub mod state;
pub mod version;

pub use error::{Error, Result};
