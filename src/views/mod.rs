//! Pure projections of the task set into the four view shapes. Each one is
//! total over any task set and safe to recompute on every render.

pub mod board;
pub mod grid;
pub mod network;
pub mod timeline;

pub use board::{BoardCard, BoardColumn, BoardLane, BoardOrder, project_board};
pub use grid::{GridRow, dependency_label, project_grid};
pub use network::{Network, NetworkEdge, NetworkNode, project_network};
pub use timeline::{BarShape, Timeline, TimelineBar, TimelineLink, effective_interval, project_timeline};
