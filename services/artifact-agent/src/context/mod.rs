//! Per-task customer context and its periodic persistence.

mod aggregator;
mod flush;

pub use aggregator::ContextAggregator;
pub use flush::{ContextError, ContextFlusher, FlushConfig, FlushReport};
