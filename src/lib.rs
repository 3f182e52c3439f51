//! tasknet: one task network behind a grid, a board, a timeline and a
//! dependency network, kept consistent with an authoritative task service
//! through optimistic mutations.

pub mod cli;
pub mod gateway;
pub mod io;
pub mod model;
pub mod ops;
pub mod service;
pub mod session;
pub mod util;
pub mod views;
