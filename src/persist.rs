//! Snapshot persistence for run state. The snapshot is plain JSON and
//! round-trips every field, including per-section search history in order.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::state::ReportState;

pub fn save_state(state: &ReportState, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(state)?;
    fs::write(path, json).with_context(|| format!("writing state to {}", path.display()))?;
    Ok(())
}

pub fn load_state(path: &Path) -> Result<ReportState> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("reading state from {}", path.display()))?;
    let state = serde_json::from_str(&json)
        .with_context(|| format!("parsing state from {}", path.display()))?;
    Ok(state)
}
