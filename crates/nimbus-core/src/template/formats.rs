//! Manifest file formats
//!
//! Four candidate files are recognized, tried in this order: two
//! structured-data spellings of YAML, JSON, and an executable Lua chunk
//! whose final expression is the manifest table.

use crate::error::{Error, Result};
use camino::Utf8Path;
use mlua::Lua;
use serde_json::Value;

/// Candidate manifest file names, in resolution priority order
pub const MANIFEST_FILE_NAMES: &[&str] =
    &["nimbus.yml", "nimbus.yaml", "nimbus.json", "nimbus.lua"];

/// Parse a manifest file into a JSON value tree, dispatching on extension
pub fn parse_manifest_file(path: &Utf8Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)?;

    match path.extension() {
        Some("yml") | Some("yaml") => Ok(serde_yaml_ng::from_str(&content)?),
        Some("json") => Ok(serde_json::from_str(&content)?),
        Some("lua") => eval_lua_manifest(&content),
        _ => Err(Error::invalid_manifest(
            path.as_str(),
            "unsupported manifest format",
        )),
    }
}

/// Evaluate a Lua manifest in a fresh interpreter and convert the
/// resulting table to a JSON value tree.
fn eval_lua_manifest(source: &str) -> Result<Value> {
    let lua = Lua::new();
    let value: mlua::Value = lua.load(source).eval()?;
    Ok(serde_json::to_value(&value)?)
}
