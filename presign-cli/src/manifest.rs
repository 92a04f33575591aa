//! Resource manifest: a JSON array of `{ "key": .., "path": .. }` objects.

use std::path::Path;

use anyhow::{Context, Result};

use presign_core::types::ResourceDescriptor;

pub fn load_manifest(path: &Path) -> Result<Vec<ResourceDescriptor>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    let resources: Vec<ResourceDescriptor> = serde_json::from_str(&contents)
        .with_context(|| format!("Invalid manifest {}", path.display()))?;
    Ok(resources)
}
