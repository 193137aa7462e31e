pub use series::*;
pub use time_range::*;

mod series;
mod time_range;

pub use streamql_common::histogram::FloatHistogram;
pub use streamql_common::label::{Label, Labels};

pub type Timestamp = i64;
