use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ops::hierarchy::CollapseSet;

/// Persisted client-local view state (written to .state.json). Board card
/// order is session-only and deliberately not part of it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiState {
    /// Hierarchy codes collapsed in the grid
    #[serde(default)]
    pub collapsed: CollapseSet,
}

/// Read .state.json from the project directory. Missing or unreadable state
/// is treated as no state.
pub fn read_ui_state(dir: &Path) -> Option<UiState> {
    let path = dir.join(".state.json");
    let content = fs::read_to_string(&path).ok()?;
    serde_json::from_str(&content).ok()
}

/// Write .state.json to the project directory
pub fn write_ui_state(dir: &Path, state: &UiState) -> Result<(), std::io::Error> {
    let path = dir.join(".state.json");
    let content = serde_json::to_string_pretty(state)?;
    fs::write(&path, content)
}
