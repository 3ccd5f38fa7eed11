//! Common test utilities for workshop-dl integration tests

#[allow(dead_code)]
pub mod fixtures;
#[allow(dead_code)]
pub mod tools;

#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use tools::*;
