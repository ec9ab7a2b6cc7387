//! Release archive handling: download, retry, verification, extraction.
//!
//! # Sub-modules
//!
//! - [`cache`] - Verified-download cache keyed by checksum.
//! - [`download`] - Download trait, HTTP implementation and cancel flag.
//! - [`extraction`] - Archive extraction with path traversal protection.
//! - [`fetch`] - Fetching an entry's archive into a scratch directory.
//! - [`retry`] - Bounded exponential backoff for transient failures.
//! - [`verification`] - SHA-256 computation and archive verification.

pub mod cache;
pub mod download;
pub mod extraction;
pub mod fetch;
pub mod retry;
pub mod verification;
