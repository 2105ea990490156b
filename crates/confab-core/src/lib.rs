pub mod actions;
pub mod catalog;
pub mod config;
pub mod error;
pub mod progression;
pub mod reducer;
pub mod scheduler;
pub mod state;

pub use actions::*;
pub use config::Config;
pub use error::*;
pub use progression::ProgressPoint;
pub use reducer::*;
pub use scheduler::*;
pub use state::*;
