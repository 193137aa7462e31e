use crate::types::{FPoint, HPoint, Timestamp};

/// Per-second increase of a counter over the window `(t - range_ms, t]`,
/// extrapolated towards the window edges the way Prometheus does it.
///
/// Windows holding histograms or fewer than two floats produce no point.
pub(crate) fn rate(
    floats: &[FPoint],
    histograms: &[HPoint],
    t: Timestamp,
    range_ms: i64,
) -> Option<f64> {
    if !histograms.is_empty() || floats.len() < 2 {
        return None;
    }
    let first = floats[0];
    let last = floats[floats.len() - 1];

    let mut result = last.f - first.f;
    let mut prev = first.f;
    for p in &floats[1..] {
        // counter reset
        if p.f < prev {
            result += prev;
        }
        prev = p.f;
    }

    let range_start = t - range_ms;
    let mut duration_to_start = (first.t - range_start) as f64 / 1000.0;
    let duration_to_end = (t - last.t) as f64 / 1000.0;
    let sampled_interval = (last.t - first.t) as f64 / 1000.0;
    let average_duration_between_samples = sampled_interval / (floats.len() - 1) as f64;

    // A counter can't have been below zero before the first sample.
    if result > 0.0 && first.f >= 0.0 {
        let duration_to_zero = sampled_interval * (first.f / result);
        if duration_to_zero < duration_to_start {
            duration_to_start = duration_to_zero;
        }
    }

    let extrapolation_threshold = average_duration_between_samples * 1.1;
    let mut extrapolate_to_interval = sampled_interval;
    extrapolate_to_interval += if duration_to_start < extrapolation_threshold {
        duration_to_start
    } else {
        average_duration_between_samples / 2.0
    };
    extrapolate_to_interval += if duration_to_end < extrapolation_threshold {
        duration_to_end
    } else {
        average_duration_between_samples / 2.0
    };

    let factor = extrapolate_to_interval / sampled_interval / (range_ms as f64 / 1000.0);
    Some(result * factor)
}
