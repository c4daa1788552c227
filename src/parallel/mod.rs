//! Concurrency substrate shared by every stage: work partitioning, completion detection and the
//! strategy selector.
pub mod barrier;
pub mod partition;
pub mod strategy;

pub use barrier::{CompletionBarrier, CompletionToken};
pub use partition::{
    Assignment, DynamicCursor, PartitionPolicy, PartitionRange, WorkPartitioner, static_ranges,
};
pub use strategy::Strategy;
