use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use itertools::Itertools;

use crate::execution::operator::{InstantVectorOperator, OperatorArg};
use crate::execution::operators::{
    drop_series_name, Aggregation, FunctionOverInstantVector, FunctionOverRangeVector,
    RangeStepFunction,
};
use crate::functions::aggregate::AggregationFunction;
use crate::functions::rollup::rate;
use crate::functions::transform::*;
use crate::memory_pool::MemoryPool;
use crate::runtime_error::{ArgCountError, RuntimeError, RuntimeResult};
use crate::types::{InstantVectorSeriesData, QueryTimeRange};

/// Builds the operator for one function call from its already built arguments.
pub type FunctionOperatorFactory = Arc<
    dyn Fn(
            Vec<OperatorArg>,
            &MemoryPool,
            &QueryTimeRange,
        ) -> RuntimeResult<Box<dyn InstantVectorOperator>>
        + Send
        + Sync,
>;

/// A per-series transformation usable by [simple_function_factory].
pub type InstantVectorSeriesFunction =
    fn(InstantVectorSeriesData, &MemoryPool) -> RuntimeResult<InstantVectorSeriesData>;

/// Maps function names to operator factories.
#[derive(Clone)]
pub struct FunctionRegistry {
    factories: AHashMap<String, FunctionOperatorFactory>,
}

impl FunctionRegistry {
    /// A registry with no functions at all.
    pub fn empty() -> Self {
        Self {
            factories: AHashMap::new(),
        }
    }

    pub fn register<F>(&mut self, name: &str, factory: F) -> RuntimeResult<()>
    where
        F: Fn(
                Vec<OperatorArg>,
                &MemoryPool,
                &QueryTimeRange,
            ) -> RuntimeResult<Box<dyn InstantVectorOperator>>
            + Send
            + Sync
            + 'static,
    {
        if self.factories.contains_key(name) {
            return Err(RuntimeError::FunctionAlreadyRegistered(name.to_string()));
        }
        self.factories.insert(name.to_string(), Arc::new(factory));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FunctionOperatorFactory> {
        self.factories.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in alphabetical order.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).sorted().collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Builds the operator for `name(args...)`. The arguments are closed if the
    /// function is unknown.
    pub fn build(
        &self,
        name: &str,
        mut args: Vec<OperatorArg>,
        pool: &MemoryPool,
        time_range: &QueryTimeRange,
    ) -> RuntimeResult<Box<dyn InstantVectorOperator>> {
        match self.factories.get(name) {
            Some(factory) => factory(args, pool, time_range),
            None => {
                close_args(&mut args);
                Err(RuntimeError::UnknownFunction(name.to_string()))
            }
        }
    }

    fn register_builtin(&mut self, name: &'static str, factory: FunctionOperatorFactory) {
        let previous = self.factories.insert(name.to_string(), factory);
        debug_assert!(previous.is_none(), "duplicate builtin function {name}");
    }
}

impl Default for FunctionRegistry {
    /// A registry holding the builtin function library.
    fn default() -> Self {
        let mut registry = Self::empty();

        let transforms: [(&'static str, InstantVectorSeriesFunction); 25] = [
            ("abs", transform_abs),
            ("acos", transform_acos),
            ("acosh", transform_acosh),
            ("asin", transform_asin),
            ("asinh", transform_asinh),
            ("atan", transform_atan),
            ("atanh", transform_atanh),
            ("ceil", transform_ceil),
            ("cos", transform_cos),
            ("cosh", transform_cosh),
            ("deg", transform_deg),
            ("exp", transform_exp),
            ("floor", transform_floor),
            ("ln", transform_ln),
            ("log10", transform_log10),
            ("log2", transform_log2),
            ("rad", transform_rad),
            ("sgn", transform_sgn),
            ("sin", transform_sin),
            ("sinh", transform_sinh),
            ("sqrt", transform_sqrt),
            ("tan", transform_tan),
            ("tanh", transform_tanh),
            ("histogram_count", histogram_count),
            ("histogram_sum", histogram_sum),
        ];
        for (name, func) in transforms {
            registry.register_builtin(name, Arc::new(simple_function_factory(name, func)));
        }

        registry.register_builtin("clamp", Arc::new(clamp_factory));
        registry.register_builtin("clamp_min", Arc::new(clamp_min_factory));
        registry.register_builtin("clamp_max", Arc::new(clamp_max_factory));
        registry.register_builtin("rate", Arc::new(range_vector_function_factory("rate", rate)));
        registry
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

fn close_args(args: &mut [OperatorArg]) {
    args.iter_mut().for_each(OperatorArg::close);
}

/// Checks the argument count. On mismatch every argument is closed.
fn take_args<const N: usize>(
    name: &str,
    args: Vec<OperatorArg>,
) -> RuntimeResult<[OperatorArg; N]> {
    let actual = args.len();
    <[OperatorArg; N]>::try_from(args).map_err(|mut args| {
        close_args(&mut args);
        RuntimeError::InvalidArgCount(ArgCountError::new(name, N, N, actual))
    })
}

fn kind_error(name: &str, expected: &str, args: &mut [OperatorArg]) -> RuntimeError {
    let got = args.iter().map(OperatorArg::kind_name).join(", ");
    close_args(args);
    RuntimeError::ArgumentError(format!(
        "expected ({expected}) arguments for {name}, got ({got})"
    ))
}

/// A factory for functions taking a single instant vector and transforming
/// each of its series with `func`. The metric name is dropped.
pub fn simple_function_factory(
    name: &'static str,
    func: InstantVectorSeriesFunction,
) -> impl Fn(Vec<OperatorArg>, &MemoryPool, &QueryTimeRange) -> RuntimeResult<Box<dyn InstantVectorOperator>>
       + Send
       + Sync
       + 'static {
    move |args: Vec<OperatorArg>,
          pool: &MemoryPool,
          _time_range: &QueryTimeRange|
          -> RuntimeResult<Box<dyn InstantVectorOperator>> {
        let inner = match take_args::<1>(name, args)? {
            [OperatorArg::InstantVector(inner)] => inner,
            mut args => return Err(kind_error(name, "instant vector", &mut args)),
        };
        Ok(Box::new(FunctionOverInstantVector::new(
            name,
            inner,
            pool.clone(),
            Some(drop_series_name),
            func,
        )))
    }
}

/// A factory for functions evaluated over the windows of one range vector.
pub fn range_vector_function_factory(
    name: &'static str,
    step_func: RangeStepFunction,
) -> impl Fn(Vec<OperatorArg>, &MemoryPool, &QueryTimeRange) -> RuntimeResult<Box<dyn InstantVectorOperator>>
       + Send
       + Sync
       + 'static {
    move |args: Vec<OperatorArg>,
          pool: &MemoryPool,
          time_range: &QueryTimeRange|
          -> RuntimeResult<Box<dyn InstantVectorOperator>> {
        let inner = match take_args::<1>(name, args)? {
            [OperatorArg::RangeVector(inner)] => inner,
            mut args => return Err(kind_error(name, "range vector", &mut args)),
        };
        Ok(Box::new(FunctionOverRangeVector::new(
            name,
            inner,
            pool.clone(),
            *time_range,
            Some(drop_series_name),
            step_func,
        )))
    }
}

fn clamp_factory(
    args: Vec<OperatorArg>,
    pool: &MemoryPool,
    time_range: &QueryTimeRange,
) -> RuntimeResult<Box<dyn InstantVectorOperator>> {
    const NAME: &str = "clamp";
    match take_args::<3>(NAME, args)? {
        [OperatorArg::InstantVector(inner), OperatorArg::Scalar(min), OperatorArg::Scalar(max)] => {
            Ok(Box::new(FunctionOverInstantVector::new(
                NAME,
                inner,
                pool.clone(),
                Some(drop_series_name),
                ClampFunction::clamp(min, max, *time_range),
            )))
        }
        mut args => Err(kind_error(NAME, "instant vector, scalar, scalar", &mut args)),
    }
}

fn clamp_min_factory(
    args: Vec<OperatorArg>,
    pool: &MemoryPool,
    time_range: &QueryTimeRange,
) -> RuntimeResult<Box<dyn InstantVectorOperator>> {
    const NAME: &str = "clamp_min";
    match take_args::<2>(NAME, args)? {
        [OperatorArg::InstantVector(inner), OperatorArg::Scalar(min)] => {
            Ok(Box::new(FunctionOverInstantVector::new(
                NAME,
                inner,
                pool.clone(),
                Some(drop_series_name),
                ClampFunction::clamp_min(min, *time_range),
            )))
        }
        mut args => Err(kind_error(NAME, "instant vector, scalar", &mut args)),
    }
}

fn clamp_max_factory(
    args: Vec<OperatorArg>,
    pool: &MemoryPool,
    time_range: &QueryTimeRange,
) -> RuntimeResult<Box<dyn InstantVectorOperator>> {
    const NAME: &str = "clamp_max";
    match take_args::<2>(NAME, args)? {
        [OperatorArg::InstantVector(inner), OperatorArg::Scalar(max)] => {
            Ok(Box::new(FunctionOverInstantVector::new(
                NAME,
                inner,
                pool.clone(),
                Some(drop_series_name),
                ClampFunction::clamp_max(max, *time_range),
            )))
        }
        mut args => Err(kind_error(NAME, "instant vector, scalar", &mut args)),
    }
}

/// Builds the operator for an aggregation expression such as
/// `sum by (job) (inner)`.
pub fn new_aggregation(
    name: &str,
    inner: Box<dyn InstantVectorOperator>,
    grouping: Vec<String>,
    without: bool,
    pool: &MemoryPool,
    time_range: &QueryTimeRange,
) -> RuntimeResult<Box<dyn InstantVectorOperator>> {
    let mut inner = inner;
    let function = match AggregationFunction::parse(name) {
        Ok(function) => function,
        Err(err) => {
            inner.close();
            return Err(err);
        }
    };
    Ok(Box::new(Aggregation::new(
        inner,
        function,
        grouping,
        without,
        *time_range,
        pool.clone(),
    )))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use super::*;
    use crate::execution::operators::ScalarConstant;
    use crate::tests::utils::SeriesListOperator;

    fn instant_vector(pool: &MemoryPool) -> OperatorArg {
        OperatorArg::InstantVector(Box::new(SeriesListOperator::new(
            vec![],
            QueryTimeRange::instant(0),
            pool.clone(),
        )))
    }

    fn scalar(pool: &MemoryPool) -> OperatorArg {
        OperatorArg::Scalar(Box::new(ScalarConstant::new(
            1.0,
            QueryTimeRange::instant(0),
            pool.clone(),
        )))
    }

    #[test]
    fn default_registry_has_builtins() {
        let registry = FunctionRegistry::default();
        for name in ["abs", "sgn", "histogram_sum", "clamp", "clamp_min", "clamp_max", "rate"] {
            assert!(registry.contains(name), "missing {name}");
        }
        assert_eq!(registry.len(), 29);
        assert_eq!(registry.names()[0], "abs");
    }

    #[test]
    fn register_rejects_duplicates() {
        let mut registry = FunctionRegistry::default();
        let err = registry
            .register("abs", simple_function_factory("abs", transform_abs))
            .unwrap_err();
        assert_eq!(err, RuntimeError::FunctionAlreadyRegistered("abs".to_string()));
        assert_eq!(err.to_string(), "function 'abs' has already been registered");
    }

    #[test]
    fn register_new_function() {
        let mut registry = FunctionRegistry::empty();
        assert!(registry.is_empty());
        registry
            .register("my_abs", simple_function_factory("my_abs", transform_abs))
            .unwrap();
        assert!(registry.get("my_abs").is_some());
        assert_eq!(registry.names(), vec!["my_abs"]);
    }

    #[test]
    fn unknown_function() {
        let pool = MemoryPool::unlimited();
        let registry = FunctionRegistry::empty();
        let err = registry
            .build("nope", vec![instant_vector(&pool)], &pool, &QueryTimeRange::instant(0))
            .err()
            .unwrap();
        assert_eq!(err, RuntimeError::UnknownFunction("nope".to_string()));
    }

    #[test]
    fn wrong_argument_count() {
        let pool = MemoryPool::unlimited();
        let registry = FunctionRegistry::default();
        let args = vec![instant_vector(&pool), instant_vector(&pool)];
        let err = registry
            .build("abs", args, &pool, &QueryTimeRange::instant(0))
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "expected exactly 1 argument(s) for abs, got 2");
    }

    #[test_case("abs", "expected (instant vector) arguments for abs, got (scalar)")]
    #[test_case("rate", "expected (range vector) arguments for rate, got (scalar)")]
    fn wrong_argument_kind(name: &str, message: &str) {
        let pool = MemoryPool::unlimited();
        let registry = FunctionRegistry::default();
        let err = registry
            .build(name, vec![scalar(&pool)], &pool, &QueryTimeRange::instant(0))
            .err()
            .unwrap();
        assert_eq!(err, RuntimeError::ArgumentError(message.to_string()));
    }

    #[test]
    fn clamp_argument_kinds() {
        let pool = MemoryPool::unlimited();
        let registry = FunctionRegistry::default();
        let range = QueryTimeRange::instant(0);

        let args = vec![instant_vector(&pool), scalar(&pool), scalar(&pool)];
        assert!(registry.build("clamp", args, &pool, &range).is_ok());

        let args = vec![instant_vector(&pool), instant_vector(&pool)];
        let err = registry.build("clamp_min", args, &pool, &range).err().unwrap();
        assert_eq!(
            err.to_string(),
            "Argument error: expected (instant vector, scalar) arguments for clamp_min, got (instant vector, instant vector)"
        );
    }

    #[test]
    fn unknown_aggregation() {
        let pool = MemoryPool::unlimited();
        let inner = Box::new(SeriesListOperator::new(vec![], QueryTimeRange::instant(0), pool.clone()));
        let err = new_aggregation("median", inner, vec![], false, &pool, &QueryTimeRange::instant(0))
            .err()
            .unwrap();
        assert_eq!(err, RuntimeError::UnknownFunction("median".to_string()));
    }
}
