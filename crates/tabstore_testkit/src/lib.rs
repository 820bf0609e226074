//! # Tabstore Testkit
//!
//! Test utilities for Tabstore.
//!
//! This crate provides:
//! - Engine fixtures with automatic cleanup
//! - Property-based test generators using proptest
//! - The storage engine conformance suite every backend must pass
//! - An R2 bucket that counts live object bodies, for cancellation checks
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tabstore_testkit::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let fixture = TestEngine::filesystem();
//! run_storage_engine_suite(&fixture.engine).await;
//! run_tabular_suite(&fixture.engine).await;
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod suite;
pub mod tracking;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::suite::{run_storage_engine_suite, run_tabular_suite};
    pub use crate::tracking::TrackingR2Bucket;
}

pub use fixtures::*;
pub use generators::*;
