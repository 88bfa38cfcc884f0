//! Shared fixtures for the Vellum integration tests.

pub mod test_util;
