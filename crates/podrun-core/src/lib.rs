//! # podrun-core
//!
//! Low-level primitives the pod lifecycle is built from.
//!
//! This crate provides safe abstractions over:
//! - **Advisory locks**: `flock(2)` on pod directories, released when the
//!   last descriptor closes.
//! - **Filesystem**: atomic directory renames that distinguish a vanished
//!   source, change-time reads, and recursive removal.
//! - **Hand-off**: making a held lock descriptor survive into the process
//!   that executes a pod.
//!
//! All unsafe system calls are encapsulated in safe wrappers with
//! `// SAFETY:` documentation.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod fs;
pub mod handoff;
pub mod lock;
