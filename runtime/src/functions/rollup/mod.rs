mod rate;

pub(crate) use rate::*;
