//! Shared plumbing for the `sessantaquattro-rs` binaries.

pub mod logging;
