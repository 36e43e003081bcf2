//! Loading fetched items from disk.
//!
//! Accepts either a JSON array of items or JSON Lines (one item per line).
//! The format is picked from the first non-whitespace character.

use std::path::Path;

use anyhow::{Context, Result};

use threadvec_core::models::Item;

pub fn load_items(path: &Path) -> Result<Vec<Item>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read items file: {}", path.display()))?;
    parse_items(&content).with_context(|| format!("Failed to parse items file: {}", path.display()))
}

pub fn parse_items(content: &str) -> Result<Vec<Item>> {
    let trimmed = content.trim_start();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}", i + 1))
        })
        .collect()
}
