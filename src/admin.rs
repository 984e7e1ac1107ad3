// Offline helpers behind the `cipherfs` admin commands

use anyhow::{Context, Result};
use cipherfs_crypto::BlockId;
use std::path::Path;

use crate::EngineConfig;

/// Block id of a sealed block file, exactly as stored
pub fn block_id_of_file(path: &Path) -> Result<BlockId> {
    let ciphertext = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(BlockId::for_ciphertext(&ciphertext))
}

/// Whether the file's contents hash to `expected`
pub fn verify_file(path: &Path, expected: &str) -> Result<bool> {
    let expected: BlockId = expected
        .parse()
        .with_context(|| format!("parsing block id {:?}", expected))?;
    let ciphertext = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(expected.matches(&ciphertext))
}

/// Effective configuration rendered as YAML, or JSON when `json` is set
pub fn render_config(path: Option<&Path>, json: bool) -> Result<String> {
    let cfg = EngineConfig::load(path)?;
    if json {
        return Ok(serde_json::to_string_pretty(&cfg)?);
    }
    Ok(serde_yaml::to_string(&cfg)?)
}
