//! Shared fixtures for the integration tests.

pub mod diagnostic_helpers;
pub mod static_loader;
pub mod workspace;
