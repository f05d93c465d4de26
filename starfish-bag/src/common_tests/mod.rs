//! Test bodies shared by the unit and integration tests.
//!
//! - [`bag_core_tests`] - Functional tests (ordering, stealing, snapshots)
//! - [`bag_stress_tests`] - Concurrent correctness under contention

pub mod bag_stress_tests;
