pub mod check;
pub mod hierarchy;
pub mod import;
pub mod store;
