pub mod aggregate;
pub mod registry;
pub(crate) mod rollup;
pub mod transform;

pub use registry::*;
