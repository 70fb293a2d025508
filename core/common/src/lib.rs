//! Common utilities and types shared across kryptr crates.
//!
//! This module provides the error type every crate reports through and
//! the wrappers used to carry secret material between them.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{MachineFingerprint, SensitiveBytes};
