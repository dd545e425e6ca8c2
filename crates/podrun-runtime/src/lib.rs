//! Pod lifecycle management for podrun.
//!
//! A pod's phase is never stored. It is the pair (which directory holds the
//! pod, whether that directory is locked), and every module here reads or
//! changes exactly that pair.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod engine;
pub mod exec;
pub mod gc;
pub mod layout;
pub mod lifecycle;
pub mod pod;
pub mod pulse;
