// Task dispatch module
//
// Organized structure:
// - engine.rs: Analysis engine seam and the built-in basic engine
// - tasks.rs: Per-unit task bodies and their result envelopes
// - pool.rs: Worker pool that fans units out and aggregates results

pub mod engine;
pub mod pool;
pub mod tasks;

pub use engine::{AnalysisEngine, BasicEngine};
pub use pool::{ChunkAggregate, TaskDispatcher};
pub use tasks::{FeatureAnalysis, TaskResult, WorkerHealth, WorkerStats};
