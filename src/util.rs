//! Small helpers shared by the file tooling.

use std::num::ParseIntError;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

/// Returns a copy of `value` with object keys sorted at every level.
pub fn sorted_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = Map::new();
            for (key, child) in entries {
                out.insert(key.clone(), sorted_json(child));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted_json).collect()),
        other => other.clone(),
    }
}

/// Serializes with 4-space indentation, the layout the simulation tooling
/// writes its JSON files in.
pub fn to_pretty_string(value: &Value) -> Result<String, serde_json::Error> {
    let mut bytes = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut bytes, formatter);
    serde::Serialize::serialize(value, &mut serializer)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Default JSON header path for a binary file: the binary path with `.json`
/// appended. Migration and climate files both pair up this way.
pub fn header_path_for(binary: &Path) -> PathBuf {
    let mut name = binary.as_os_str().to_owned();
    name.push(".json");
    PathBuf::from(name)
}

/// Parses a node id the way the inspection verbs accept them: hex when the
/// text contains a hex letter or an `0x` prefix, decimal otherwise.
pub fn parse_node_id(text: &str) -> Result<u32, ParseIntError> {
    let lower = text.to_lowercase();
    if lower.chars().any(|c| matches!(c, 'a'..='f' | 'x')) {
        u32::from_str_radix(lower.trim_start_matches("0x"), 16)
    } else {
        text.parse()
    }
}
