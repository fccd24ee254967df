//! Steplog Testing Infrastructure
//!
//! Shared proptest strategies and test setup for the steplog crates.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
//!
//! # Usage
//!
//! Add this to your crate's `Cargo.toml` dev-dependencies:
//! ```toml
//! [dev-dependencies]
//! steplog-testkit = { path = "../steplog-testkit" }
//! ```
//!
//! Then in integration tests:
//! ```rust,no_run
//! use steplog_testkit::strategies::arb_record;
//! use steplog_testkit::proptest::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn merge_with_empty_is_identity(record in arb_record()) {
//!         let merged = record.merge(&steplog_core::Record::new()).unwrap();
//!         prop_assert_eq!(merged, record);
//!     }
//! }
//! ```

pub mod strategies;

pub use strategies::proptest;

use tracing_subscriber::EnvFilter;

/// Install a test-friendly tracing subscriber once per process.
///
/// Output goes through the test harness capture and honours `RUST_LOG`.
/// Later calls are no-ops.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    tracing::trace!("test tracing initialised");
}
