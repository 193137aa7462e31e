mod clamp;
mod histogram;
mod math;

pub use clamp::*;
pub(crate) use histogram::*;
pub use math::*;
