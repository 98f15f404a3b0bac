//! Boot configuration formats and probes shared by the Swix tools.
//!
//! Nothing in here spawns processes or mutates the running system beyond the
//! files explicitly passed in. The loader-specific policy lives in
//! `swix-ctrl`.

pub mod artifact;
pub mod boot;
pub mod cmdline;
