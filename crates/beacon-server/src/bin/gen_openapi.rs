//! Writes the beacon OpenAPI document for client generation.
//!
//! ```bash
//! cargo run --bin gen-openapi -p beacon-server [-- <output path>]
//! ```
//!
//! Without an argument the document lands in `openapi.json` at the
//! workspace root.

use std::path::PathBuf;

use anyhow::Context;
use serde_json::Value;

fn main() -> anyhow::Result<()> {
    let output = match std::env::args_os().nth(1) {
        Some(path) => PathBuf::from(path),
        None => workspace_root()?.join("openapi.json"),
    };

    let json = beacon_server::api::get_openapi_json().context("serializing OpenAPI document")?;
    std::fs::write(&output, &json).with_context(|| format!("writing {}", output.display()))?;

    let doc: Value = serde_json::from_str(&json)?;
    let count = |pointer: &str| doc.pointer(pointer).and_then(Value::as_object).map_or(0, serde_json::Map::len);
    println!(
        "Wrote {} ({} paths, {} schemas)",
        output.display(),
        count("/paths"),
        count("/components/schemas")
    );
    Ok(())
}

fn workspace_root() -> anyhow::Result<PathBuf> {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map(PathBuf::from)
        .context("beacon-server is not inside a workspace")
}
