// Multi-region support
//
// - status.rs: Per-region health record and its state machine
// - manager.rs: Health probing, best-region routing and replication

pub mod manager;
pub mod status;

pub use manager::RegionManager;
pub use status::{RegionState, RegionStatus};
