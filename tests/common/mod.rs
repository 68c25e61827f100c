/// Common test utilities for integration tests
///
/// This module provides shared functionality including:
/// - A scripted analysis engine with per-feature failures
/// - An in-process region server speaking the health/replication surface
/// - Region configuration builders
pub mod engine;
pub mod region_server;

#[allow(unused_imports)]
pub use engine::ScriptedEngine;
#[allow(unused_imports)]
pub use region_server::{closed_port_url, region_config, RegionServer};
