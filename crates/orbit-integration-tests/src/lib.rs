//! Integration test crate for the Orbit ring core.
//!
//! This crate has no library code — it only contains integration tests
//! that exercise the ring view, its reference implementations, and the
//! maintenance protocol together.
//!
//! Run all integration tests, including the large churn scenarios:
//! ```sh
//! cargo test -p orbit-integration-tests -- --include-ignored
//! ```
