pub mod hash;
pub mod histogram;
pub mod label;
pub mod math;

pub mod prelude {
    pub use crate::hash::*;
    pub use crate::histogram::*;
    pub use crate::label::*;
    pub use crate::math::*;
}
