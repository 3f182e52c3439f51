pub mod config;
pub mod dependency;
pub mod project;
pub mod risk;
pub mod task;
pub mod wbs;

pub use config::*;
pub use dependency::*;
pub use project::*;
pub use risk::*;
pub use task::*;
pub use wbs::*;
