use crate::execution::operator::InstantVectorOperator;
use crate::execution::operators::{drop_series_name, FunctionOverInstantVector};
use crate::memory_pool::MemoryPool;
use crate::runtime_error::RuntimeResult;
use crate::types::InstantVectorSeriesData;

macro_rules! math_fn {
    ($name: ident, $func: expr) => {
        pub(crate) fn $name(
            data: InstantVectorSeriesData,
            _pool: &MemoryPool,
        ) -> RuntimeResult<InstantVectorSeriesData> {
            float_transform_drop_histograms(data, $func)
        }
    };
}

/// Applies `op` to every float in place. Histograms are dropped.
fn float_transform_drop_histograms(
    data: InstantVectorSeriesData,
    op: fn(f64) -> f64,
) -> RuntimeResult<InstantVectorSeriesData> {
    let InstantVectorSeriesData { mut floats, histograms } = data;
    histograms.release();
    for p in floats.iter_mut() {
        p.f = op(p.f);
    }
    Ok(InstantVectorSeriesData::new(floats, Default::default()))
}

math_fn!(transform_abs, |x: f64| x.abs());
math_fn!(transform_acos, |x: f64| x.acos());
math_fn!(transform_acosh, |x: f64| x.acosh());
math_fn!(transform_asin, |x: f64| x.asin());
math_fn!(transform_asinh, |x: f64| x.asinh());
math_fn!(transform_atan, |x: f64| x.atan());
math_fn!(transform_atanh, |x: f64| x.atanh());
math_fn!(transform_ceil, |x: f64| x.ceil());
math_fn!(transform_cos, |x: f64| x.cos());
math_fn!(transform_cosh, |x: f64| x.cosh());
math_fn!(transform_deg, |x: f64| x * 180.0 / std::f64::consts::PI);
math_fn!(transform_exp, |x: f64| x.exp());
math_fn!(transform_floor, |x: f64| x.floor());
math_fn!(transform_ln, |x: f64| x.ln());
math_fn!(transform_log2, |x: f64| x.log2());
math_fn!(transform_log10, |x: f64| x.log10());
math_fn!(transform_rad, |x: f64| x * std::f64::consts::PI / 180.0);
math_fn!(transform_sgn, sgn);
math_fn!(transform_sin, |x: f64| x.sin());
math_fn!(transform_sinh, |x: f64| x.sinh());
math_fn!(transform_sqrt, |x: f64| x.sqrt());
math_fn!(transform_tan, |x: f64| x.tan());
math_fn!(transform_tanh, |x: f64| x.tanh());

/// Sign of `x`. Zero and NaN are returned unchanged.
fn sgn(x: f64) -> f64 {
    if x < 0.0 {
        -1.0
    } else if x > 0.0 {
        1.0
    } else {
        x
    }
}

pub(crate) fn negate(
    mut data: InstantVectorSeriesData,
    _pool: &MemoryPool,
) -> RuntimeResult<InstantVectorSeriesData> {
    for p in data.floats.iter_mut() {
        p.f = -p.f;
    }
    for p in data.histograms.iter_mut() {
        p.h.mul(-1.0);
    }
    Ok(data)
}

/// `-v`: negates floats and histograms and drops the metric name.
pub fn new_unary_negation(
    inner: Box<dyn InstantVectorOperator>,
    pool: MemoryPool,
) -> Box<dyn InstantVectorOperator> {
    Box::new(FunctionOverInstantVector::new(
        "unary negation",
        inner,
        pool,
        Some(drop_series_name),
        negate,
    ))
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::types::{FPoint, FloatHistogram, HPoint};

    fn data(pool: &MemoryPool, values: &[f64], with_histogram: bool) -> InstantVectorSeriesData {
        let mut floats = pool.fpoints().acquire(values.len()).unwrap();
        for (i, v) in values.iter().enumerate() {
            floats.push(FPoint::new(i as i64, *v)).unwrap();
        }
        let mut histograms = pool.hpoints().acquire(1).unwrap();
        if with_histogram {
            let mut h = FloatHistogram::new(0);
            h.observe_positive(1, 2.0, 3.0);
            histograms.push(HPoint::new(10, h)).unwrap();
        }
        InstantVectorSeriesData::new(floats, histograms)
    }

    #[test_case(-2.5, -1.0)]
    #[test_case(4.0, 1.0)]
    #[test_case(0.0, 0.0)]
    fn test_sgn(x: f64, expected: f64) {
        assert_eq!(sgn(x), expected);
    }

    #[test]
    fn sgn_keeps_nan() {
        assert!(sgn(f64::NAN).is_nan());
    }

    #[test]
    fn float_transforms_drop_histograms() {
        let pool = MemoryPool::unlimited();
        let out = transform_abs(data(&pool, &[-1.0, 2.0], true), &pool).unwrap();
        let values: Vec<f64> = out.floats.iter().map(|p| p.f).collect();
        assert_eq!(values, vec![1.0, 2.0]);
        assert!(out.histograms.is_empty());
        drop(out);

        let out = transform_deg(data(&pool, &[std::f64::consts::PI], false), &pool).unwrap();
        assert_eq!(out.floats[0].f, 180.0);
        drop(out);
        assert!(pool.tracker().is_balanced());
    }

    #[test]
    fn negation_covers_histograms() {
        let pool = MemoryPool::unlimited();
        let out = negate(data(&pool, &[3.0], true), &pool).unwrap();
        assert_eq!(out.floats[0].f, -3.0);
        assert_eq!(out.histograms[0].h.count, -2.0);
        assert_eq!(out.histograms[0].h.sum, -3.0);
    }
}
