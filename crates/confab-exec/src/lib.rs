pub mod contracts;
pub mod fixtures;
pub mod source;

pub use contracts::*;
pub use fixtures::*;
pub use source::*;
