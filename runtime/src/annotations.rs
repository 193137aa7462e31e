use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::debug;

use streamql_common::histogram::HistogramError;

use crate::runtime_error::{RuntimeError, RuntimeResult};

/// A non-fatal problem found while evaluating a query. The affected points are
/// left out of the result; evaluation continues.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum Annotation {
    #[error("PromQL warning: vector contains a mix of histograms with exponential and custom buckets schemas")]
    MixedExponentialCustomHistograms,
    #[error("PromQL warning: vector contains histograms with incompatible custom buckets")]
    IncompatibleCustomBuckets,
    #[error("PromQL warning: encountered a mix of histograms and floats for aggregation {aggregation}")]
    MixedFloatsHistogramsAggregation { aggregation: &'static str },
}

/// Collects annotations raised during a query. Duplicates are recorded once.
#[derive(Debug, Default)]
pub struct Annotations {
    inner: Mutex<Vec<Annotation>>,
}

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, annotation: Annotation) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if !inner.contains(&annotation) {
            debug!(%annotation, "annotation raised");
            inner.push(annotation);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_vec(&self) -> Vec<Annotation> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Converts a histogram arithmetic failure into an annotation when it is a known
/// incompatibility. Anything else is returned as a fatal error.
pub fn native_histogram_error_to_annotation(
    err: HistogramError,
    annotations: &Annotations,
) -> RuntimeResult<()> {
    match err {
        HistogramError::MixedExponentialCustom => {
            annotations.add(Annotation::MixedExponentialCustomHistograms);
            Ok(())
        }
        HistogramError::CustomBucketsMismatch => {
            annotations.add(Annotation::IncompatibleCustomBuckets);
            Ok(())
        }
        other => Err(RuntimeError::Histogram(other)),
    }
}
