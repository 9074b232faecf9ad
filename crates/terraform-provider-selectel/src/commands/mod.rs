pub mod lookup;
pub mod resource;
pub mod resources;
pub mod validate;

use anyhow::Context;
use std::path::Path;

/// Read a JSON attribute file.
pub(crate) fn read_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("{} is not valid JSON", path.display()))
}
