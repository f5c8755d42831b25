//! Firmware Update Distribution
//!
//! Components:
//! - `package` - Manifest generation and transport protection

pub mod package;

pub use package::{manifest_text, validate_model, PackageError, UpdatePackager, UpdateResult};
