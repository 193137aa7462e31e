use crate::memory_pool::MemoryPool;
use crate::runtime_error::RuntimeResult;
use crate::types::{FPoint, FloatHistogram, InstantVectorSeriesData};

/// Turns every histogram into a float using `f`. Float samples are dropped.
fn histogram_to_float(
    data: InstantVectorSeriesData,
    pool: &MemoryPool,
    f: fn(&FloatHistogram) -> f64,
) -> RuntimeResult<InstantVectorSeriesData> {
    let InstantVectorSeriesData { floats, histograms } = data;
    floats.release();
    if histograms.is_empty() {
        return Ok(InstantVectorSeriesData::default());
    }
    let mut out = pool.fpoints().acquire(histograms.len())?;
    for p in histograms.iter() {
        out.push(FPoint::new(p.t, f(&p.h)))?;
    }
    Ok(InstantVectorSeriesData::new(out, Default::default()))
}

pub(crate) fn histogram_count(
    data: InstantVectorSeriesData,
    pool: &MemoryPool,
) -> RuntimeResult<InstantVectorSeriesData> {
    histogram_to_float(data, pool, |h| h.count)
}

pub(crate) fn histogram_sum(
    data: InstantVectorSeriesData,
    pool: &MemoryPool,
) -> RuntimeResult<InstantVectorSeriesData> {
    histogram_to_float(data, pool, |h| h.sum)
}
