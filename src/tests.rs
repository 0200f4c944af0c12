//! Helpers shared by unit and integration tests.

#[path = "../tests/support/mod.rs"]
pub mod support;
