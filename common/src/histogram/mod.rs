mod float_histogram;

pub use float_histogram::*;
