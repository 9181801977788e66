//! Crate-level tests that drive the library through its public API.

mod cycle_tests;
