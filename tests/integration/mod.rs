//! Integration test modules

pub mod errors;
pub mod registry;
pub mod routing;
