mod aggregation;
mod function_over_instant_vector;
mod function_over_range_vector;
mod scalar;
mod selector;

pub use aggregation::*;
pub use function_over_instant_vector::*;
pub use function_over_range_vector::*;
pub use scalar::*;
pub use selector::*;
