/// One step of Kahan-Babuska-Neumaier summation. Returns the new sum and the new
/// compensation term. The true total is `sum + c`.
#[inline]
pub fn kahan_sum_inc(inc: f64, sum: f64, c: f64) -> (f64, f64) {
    let t = sum + inc;
    let c = if t.is_infinite() {
        0.0
    } else if sum.abs() >= inc.abs() {
        // Neumaier: swap when the next term is larger than the running sum
        c + ((sum - t) + inc)
    } else {
        c + ((inc - t) + sum)
    };
    (t, c)
}
