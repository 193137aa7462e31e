pub use annotations::*;
pub use config::*;
pub use execution::*;
pub use runtime_error::*;

pub mod annotations;
pub mod config;
pub mod execution;
pub mod functions;
pub mod memory_pool;
pub mod provider;
mod runtime_error;
pub mod types;

#[cfg(test)]
mod tests;

pub mod prelude {
    pub use crate::annotations::{Annotation, Annotations};
    pub use crate::config::EngineConfig;
    pub use crate::execution::operators::*;
    pub use crate::execution::{
        CancellationHandle, Engine, InstantVectorOperator, NextSeries, Operator, OperatorArg,
        QueryContext, QueryResult, QuerySeries, RangeVectorOperator, ScalarOperator,
    };
    pub use crate::functions::aggregate::AggregationFunction;
    pub use crate::functions::{new_aggregation, FunctionRegistry};
    pub use crate::memory_pool::MemoryPool;
    pub use crate::provider::{LabelMatcher, MatchOp, MemorySeriesSource, RawSeries, SeriesSource};
    pub use crate::runtime_error::{RuntimeError, RuntimeResult};
    pub use crate::types::*;
}
