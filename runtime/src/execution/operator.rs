use std::fmt;

use crate::execution::context::QueryContext;
use crate::runtime_error::RuntimeResult;
use crate::types::{InstantVectorSeriesData, RangeVectorSeriesData, ScalarData, SeriesMetadata};

/// Outcome of a successful pull.
#[derive(Debug, PartialEq)]
pub enum NextSeries<T> {
    Series(T),
    /// Every declared series has been returned.
    EndOfStream,
}

impl<T> NextSeries<T> {
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, NextSeries::EndOfStream)
    }

    pub fn into_series(self) -> Option<T> {
        match self {
            NextSeries::Series(series) => Some(series),
            NextSeries::EndOfStream => None,
        }
    }
}

/// Behaviour common to every node of an operator tree.
pub trait Operator: Send {
    /// Releases every pooled buffer still held, closing inner operators too.
    /// Safe to call more than once and at any point.
    fn close(&mut self);
}

/// A node producing a stream of instant vector series.
///
/// `series_metadata` is called once. After it, `next_series` yields exactly one
/// series per returned metadata entry, in the same order, and `EndOfStream`
/// from then on.
pub trait InstantVectorOperator: Operator {
    fn series_metadata(&mut self, ctx: &QueryContext) -> RuntimeResult<Vec<SeriesMetadata>>;

    fn next_series(
        &mut self,
        ctx: &QueryContext,
    ) -> RuntimeResult<NextSeries<InstantVectorSeriesData>>;
}

/// A node producing raw sample windows, one series at a time.
pub trait RangeVectorOperator: Operator {
    fn series_metadata(&mut self, ctx: &QueryContext) -> RuntimeResult<Vec<SeriesMetadata>>;

    fn next_series(&mut self, ctx: &QueryContext)
        -> RuntimeResult<NextSeries<RangeVectorSeriesData>>;

    fn range_ms(&self) -> i64;
}

/// A node producing a scalar. Scalars are computed eagerly, once.
pub trait ScalarOperator: Operator {
    fn values(&mut self, ctx: &QueryContext) -> RuntimeResult<ScalarData>;
}

/// An already constructed argument handed to a function factory.
pub enum OperatorArg {
    InstantVector(Box<dyn InstantVectorOperator>),
    RangeVector(Box<dyn RangeVectorOperator>),
    Scalar(Box<dyn ScalarOperator>),
}

impl OperatorArg {
    pub fn kind_name(&self) -> &'static str {
        match self {
            OperatorArg::InstantVector(_) => "instant vector",
            OperatorArg::RangeVector(_) => "range vector",
            OperatorArg::Scalar(_) => "scalar",
        }
    }

    pub fn close(&mut self) {
        match self {
            OperatorArg::InstantVector(op) => op.close(),
            OperatorArg::RangeVector(op) => op.close(),
            OperatorArg::Scalar(op) => op.close(),
        }
    }
}

impl fmt::Debug for OperatorArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OperatorArg({})", self.kind_name())
    }
}
