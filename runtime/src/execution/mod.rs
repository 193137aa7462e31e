pub use context::*;
pub use engine::*;
pub use operator::*;

pub mod context;
pub mod engine;
pub mod operator;
pub mod operators;
