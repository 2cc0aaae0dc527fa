pub mod facts;
pub mod plan;
pub mod targets;

pub use facts::*;
pub use plan::*;
pub use targets::*;
