//! Demographics file loading, validation, and compilation.
//!
//! A demographics file is JSON with a `Metadata` object, an optional
//! `Defaults` object, and a `Nodes` array. The compiled form substitutes
//! every attribute key with a generated short key through a `StringTable`
//! and adds a `NodeOffsets` index; a file carrying only one of the two is
//! malformed.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::offsets::{NodeOffsets, OffsetError};

#[derive(Error, Debug)]
pub enum DemographicsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Missing the 'Metadata' object")]
    MissingMetadata,
    #[error("Missing the 'Metadata.IdReference' object")]
    MissingIdReference,
    #[error("Missing the 'Metadata.NodeCount' object")]
    MissingNodeCount,
    #[error("'NodeCount' = {0}. It must be positive")]
    BadNodeCount(i64),
    #[error("Invalid compiled file. The file contains 'NodeOffsets' but does not have 'StringTable'")]
    OffsetsWithoutStringTable,
    #[error("Invalid compiled file. The file contains 'StringTable' but does not have 'NodeOffsets'")]
    StringTableWithoutOffsets,
    #[error("Missing the 'Nodes' array")]
    MissingNodes,
    #[error("Node at index {0} is missing 'NodeID'")]
    MissingNodeId(usize),
    #[error("File is already compiled")]
    AlreadyCompiled,
    #[error(transparent)]
    Offsets(#[from] OffsetError),
}

/// A validated demographics document.
#[derive(Debug, Clone)]
pub struct Demographics {
    root: Value,
    node_ids: Vec<u32>,
    id_reference: String,
    node_count: usize,
    compiled: bool,
}

impl Demographics {
    /// Validates a parsed document and indexes its nodes.
    ///
    /// Node ids come from each node's `NodeID` in a plain file and from the
    /// `NodeOffsets` index in a compiled one.
    pub fn from_value(root: Value) -> Result<Self, DemographicsError> {
        let metadata = root
            .get("Metadata")
            .and_then(Value::as_object)
            .ok_or(DemographicsError::MissingMetadata)?;
        let id_reference = metadata
            .get("IdReference")
            .and_then(Value::as_str)
            .ok_or(DemographicsError::MissingIdReference)?
            .to_string();
        let node_count_value = metadata
            .get("NodeCount")
            .and_then(Value::as_i64)
            .ok_or(DemographicsError::MissingNodeCount)?;
        if node_count_value <= 0 {
            return Err(DemographicsError::BadNodeCount(node_count_value));
        }
        let node_count = node_count_value as usize;

        let has_string_table = root.get("StringTable").is_some();
        let has_offsets = root.get("NodeOffsets").is_some();
        let compiled = match (has_string_table, has_offsets) {
            (false, true) => return Err(DemographicsError::OffsetsWithoutStringTable),
            (true, false) => return Err(DemographicsError::StringTableWithoutOffsets),
            (both, _) => both,
        };

        let nodes = root
            .get("Nodes")
            .and_then(Value::as_array)
            .ok_or(DemographicsError::MissingNodes)?;

        let node_ids = if compiled {
            let offsets = root
                .get("NodeOffsets")
                .and_then(Value::as_str)
                .unwrap_or_default();
            NodeOffsets::from_hex(node_count, offsets)?.node_ids()
        } else {
            let mut ids = Vec::with_capacity(nodes.len());
            for (index, node) in nodes.iter().enumerate() {
                let id = node
                    .get("NodeID")
                    .and_then(Value::as_u64)
                    .ok_or(DemographicsError::MissingNodeId(index))?;
                ids.push(id as u32);
            }
            ids
        };

        Ok(Self {
            root,
            node_ids,
            id_reference,
            node_count,
            compiled,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, DemographicsError> {
        Self::from_value(serde_json::from_str(text)?)
    }

    pub fn read(path: &Path) -> Result<Self, DemographicsError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Node ids in file order.
    pub fn node_ids(&self) -> &[u32] {
        &self.node_ids
    }

    /// Node ids as a sorted set, for cross-file validation.
    pub fn node_id_set(&self) -> BTreeSet<u32> {
        self.node_ids.iter().copied().collect()
    }

    pub fn id_reference(&self) -> &str {
        &self.id_reference
    }

    /// `Metadata.NodeCount` as declared by the file.
    pub fn declared_node_count(&self) -> usize {
        self.node_count
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    pub fn document(&self) -> &Value {
        &self.root
    }

    fn string_table(&self) -> Option<&Map<String, Value>> {
        self.root.get("StringTable").and_then(Value::as_object)
    }

    /// Looks up an attribute path on a node, falling back to `Defaults`.
    /// Path keys are the full names; compiled files resolve through the
    /// `StringTable`.
    pub fn node_attribute(&self, node_id: u32, path: &[&str]) -> Option<&Value> {
        let index = self.node_ids.iter().position(|&id| id == node_id)?;
        let node = self.root.get("Nodes")?.get(index)?;
        self.walk(node, path)
            .or_else(|| self.walk(self.root.get("Defaults")?, path))
    }

    fn walk<'a>(&'a self, mut value: &'a Value, path: &[&str]) -> Option<&'a Value> {
        for key in path {
            let stored = match self.string_table() {
                Some(table) => table.get(*key).and_then(Value::as_str)?,
                None => *key,
            };
            value = value.get(stored)?;
        }
        Some(value)
    }

    /// Produces the compiled form of a plain file: attribute keys replaced
    /// through a generated `StringTable`, plus a `NodeOffsets` index of each
    /// node object's byte position within the serialized `Nodes` array.
    pub fn compile(&self) -> Result<Demographics, DemographicsError> {
        if self.compiled {
            return Err(DemographicsError::AlreadyCompiled);
        }

        let mut table: Map<String, Value> = Map::new();
        let mut used: HashSet<String> = HashSet::new();
        let mut last = String::new();

        if let Some(defaults) = self.root.get("Defaults") {
            collect_keys(defaults, &mut table, &mut used, &mut last);
        }
        let nodes = self
            .root
            .get("Nodes")
            .and_then(Value::as_array)
            .ok_or(DemographicsError::MissingNodes)?;
        for node in nodes {
            collect_keys(node, &mut table, &mut used, &mut last);
        }

        let translated_nodes: Vec<Value> = nodes.iter().map(|n| translate(n, &table)).collect();

        let mut entries = Vec::with_capacity(translated_nodes.len());
        let mut offset = 0u32;
        for (node, value) in self.node_ids.iter().zip(translated_nodes.iter()) {
            entries.push((*node, offset));
            let serialized = serde_json::to_string(value)?;
            // +1 for the comma separating array elements
            offset += serialized.len() as u32 + 1;
        }
        let node_offsets = NodeOffsets::new(entries);

        let mut out = Map::new();
        for (key, value) in self.root.as_object().into_iter().flatten() {
            match key.as_str() {
                "Defaults" => {
                    out.insert(key.clone(), translate(value, &table));
                }
                "Nodes" => {
                    out.insert(key.clone(), Value::Array(translated_nodes.clone()));
                }
                _ => {
                    out.insert(key.clone(), value.clone());
                }
            }
        }
        out.insert("StringTable".to_string(), Value::Object(table));
        out.insert(
            "NodeOffsets".to_string(),
            Value::String(node_offsets.to_hex()),
        );

        Demographics::from_value(Value::Object(out))
    }

    /// Serializes the document with 4-space indentation.
    pub fn write(&self, path: &Path) -> Result<(), DemographicsError> {
        let text = crate::util::to_pretty_string(&self.root)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

/// Walks a node or defaults subtree, assigning a short value to every new
/// object key in document order.
fn collect_keys(
    value: &Value,
    table: &mut Map<String, Value>,
    used: &mut HashSet<String>,
    last: &mut String,
) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if !table.contains_key(key) {
                    let short = next_short_value(last, used);
                    used.insert(short.clone());
                    table.insert(key.clone(), Value::String(short.clone()));
                    *last = short;
                }
                collect_keys(child, table, used, last);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_keys(item, table, used, last);
            }
        }
        _ => {}
    }
}

/// Base-26 successor of a short value (`a`..`z`, `aa`..), skipping values
/// already in use.
fn next_short_value(last: &str, used: &HashSet<String>) -> String {
    let mut chars: Vec<u8> = last.bytes().collect();
    loop {
        let mut index = chars.len();
        loop {
            if index == 0 {
                chars = vec![b'a'; chars.len() + 1];
                break;
            }
            index -= 1;
            if chars[index] != b'z' {
                chars[index] += 1;
                for c in &mut chars[index + 1..] {
                    *c = b'a';
                }
                break;
            }
        }
        let candidate = String::from_utf8_lossy(&chars).into_owned();
        if !used.contains(&candidate) {
            return candidate;
        }
    }
}

/// Rewrites every object key through the string table, recursively.
fn translate(value: &Value, table: &Map<String, Value>) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, child) in map {
                let stored = table
                    .get(key)
                    .and_then(Value::as_str)
                    .unwrap_or(key)
                    .to_string();
                out.insert(stored, translate(child, table));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| translate(v, table)).collect()),
        other => other.clone(),
    }
}
