use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, field, info, trace_span, Span};

use crate::annotations::Annotation;
use crate::config::EngineConfig;
use crate::execution::context::QueryContext;
use crate::execution::operator::{InstantVectorOperator, NextSeries};
use crate::execution::operators::InstantVectorSelector;
use crate::functions::FunctionRegistry;
use crate::memory_pool::MemoryPool;
use crate::provider::{LabelMatcher, SeriesSource};
use crate::runtime_error::{RuntimeError, RuntimeResult};
use crate::types::{FPoint, HPoint, QueryTimeRange, SeriesMetadata};

/// One output series, detached from the memory pool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuerySeries {
    #[serde(flatten)]
    pub metadata: SeriesMetadata,
    pub floats: Vec<FPoint>,
    #[serde(skip)]
    pub histograms: Vec<HPoint>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct QueryResult {
    pub series: Vec<QuerySeries>,
    pub annotations: Vec<Annotation>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Runs operator trees under the engine configuration.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    registry: FunctionRegistry,
}

impl Engine {
    pub fn new(config: EngineConfig) -> RuntimeResult<Self> {
        Self::with_registry(config, FunctionRegistry::default())
    }

    pub fn with_registry(config: EngineConfig, registry: FunctionRegistry) -> RuntimeResult<Self> {
        config.validate()?;
        Ok(Self { config, registry })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.registry
    }

    /// A pool for one query, capped at `max_memory_bytes`.
    pub fn new_memory_pool(&self) -> MemoryPool {
        MemoryPool::new(self.config.max_memory_bytes)
    }

    pub fn new_context(&self) -> QueryContext {
        let ctx = QueryContext::new().with_tracing(self.config.trace_enabled);
        match self.config.query_timeout_ms {
            Some(ms) => ctx.with_timeout(Duration::from_millis(ms)),
            None => ctx,
        }
    }

    /// An instant vector selector using the configured lookback delta.
    pub fn new_instant_selector(
        &self,
        source: Arc<dyn SeriesSource>,
        matchers: Vec<LabelMatcher>,
        time_range: QueryTimeRange,
        pool: &MemoryPool,
    ) -> Box<dyn InstantVectorOperator> {
        Box::new(InstantVectorSelector::new(
            source,
            matchers,
            time_range,
            self.config.lookback_delta_ms,
            pool.clone(),
        ))
    }

    /// Drains `operator` into a [QueryResult]. The operator is closed whether
    /// or not evaluation succeeds. On error no partial result is returned.
    pub fn execute(
        &self,
        ctx: &QueryContext,
        mut operator: Box<dyn InstantVectorOperator>,
    ) -> RuntimeResult<QueryResult> {
        let started = Instant::now();
        let span = if ctx.trace_enabled() {
            trace_span!("execute", series = field::Empty, points = field::Empty)
        } else {
            Span::none()
        }
        .entered();

        let result = drain(ctx, operator.as_mut());
        operator.close();

        match result {
            Ok(series) => {
                let points: usize = series
                    .iter()
                    .map(|s| s.floats.len() + s.histograms.len())
                    .sum();
                span.record("series", series.len());
                span.record("points", points);
                info!(
                    series = series.len(),
                    points,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "query finished"
                );
                Ok(QueryResult {
                    series,
                    annotations: ctx.annotations().to_vec(),
                })
            }
            Err(err) => {
                if err.is_caller_abort() {
                    debug!(error = %err, "query aborted");
                } else {
                    info!(error = %err, "query failed");
                }
                Err(err)
            }
        }
    }
}

fn drain(
    ctx: &QueryContext,
    operator: &mut dyn InstantVectorOperator,
) -> RuntimeResult<Vec<QuerySeries>> {
    let metadata = operator.series_metadata(ctx)?;
    debug!(series = metadata.len(), "query started");

    let mut series = Vec::with_capacity(metadata.len());
    for metadata in metadata {
        let data = match operator.next_series(ctx)? {
            NextSeries::Series(data) => data,
            NextSeries::EndOfStream => {
                return Err(RuntimeError::execution(format!(
                    "expected series {metadata}, but the operator is exhausted"
                )))
            }
        };
        series.push(QuerySeries {
            metadata,
            floats: data.floats.into_vec(),
            histograms: data.histograms.into_vec(),
        });
    }

    match operator.next_series(ctx)? {
        NextSeries::EndOfStream => Ok(series),
        NextSeries::Series(_) => Err(RuntimeError::execution(
            "operator returned more series than it declared",
        )),
    }
}
