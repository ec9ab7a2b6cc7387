//! Tap installer library.
//!
//! This crate installs the prebuilt release binaries a Homebrew-style tap
//! publishes: it picks the manifest entry for the running platform,
//! downloads and verifies the archive, extracts the binary, installs it
//! atomically and smoke-tests it. It is used by the `tap-installer` CLI
//! binary and can be consumed programmatically for testing or custom
//! installation workflows.
//!
//! # Modules
//!
//! - [`artefact`] - Archive download, retry, verification, extraction and caching
//! - [`cli`] - Command-line argument definitions
//! - [`dirs`] - Directory resolution abstraction for platform-specific paths
//! - [`error`] - Stage-tagged error types
//! - [`list`] - The `list` command
//! - [`list_output`] - Output formatting for package listing
//! - [`manifest`] - Release manifest model, TOML parsing and manifest sources
//! - [`output`] - Progress lines, success messages and dry-run plans
//! - [`pipeline`] - The install run state machine
//! - [`platform`] - Operating system and architecture identifiers
//! - [`release`] - Refreshing manifests from GitHub releases
//! - [`resolution`] - Platform-to-entry resolution
//! - [`selftest`] - Post-install smoke test
//! - [`stager`] - Atomic binary placement with per-binary locking

pub mod artefact;
pub mod cli;
pub mod dirs;
pub mod error;
pub mod list;
pub mod list_output;
pub mod manifest;
pub mod output;
pub mod pipeline;
pub mod platform;
pub mod release;
pub mod resolution;
pub mod selftest;
pub mod stager;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
