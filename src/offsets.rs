//! Node offset strings.
//!
//! Migration metadata, climate headers, and compiled demographics all locate
//! per-node data through the same `NodeOffsets` string: for each node, 8
//! uppercase hex characters of node id followed by 8 of byte offset.

use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OffsetError {
    #[error("Offset string length {found} doesn't match node count {nodes} ({expected} expected)")]
    LengthMismatch {
        nodes: usize,
        expected: usize,
        found: usize,
    },
    #[error("Invalid hex in offset string: {0:?}")]
    InvalidHex(String),
}

/// An ordered node id to byte offset table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeOffsets {
    entries: Vec<(u32, u32)>,
}

impl NodeOffsets {
    pub fn new(entries: Vec<(u32, u32)>) -> Self {
        Self { entries }
    }

    /// Parses a `NodeOffsets` string with a known node count. The string
    /// must be exactly 16 characters per node.
    pub fn from_hex(node_count: usize, offsets: &str) -> Result<Self, OffsetError> {
        if offsets.len() != node_count * 16 {
            return Err(OffsetError::LengthMismatch {
                nodes: node_count,
                expected: node_count * 16,
                found: offsets.len(),
            });
        }

        // non-ASCII means the slicing below could land mid-character; it is
        // invalid hex either way
        if !offsets.is_ascii() {
            return Err(OffsetError::InvalidHex(offsets.to_string()));
        }

        let mut entries = Vec::with_capacity(node_count);
        for index in 0..node_count {
            let chunk = &offsets[index * 16..(index + 1) * 16];
            let node_id = u32::from_str_radix(&chunk[..8], 16)
                .map_err(|_| OffsetError::InvalidHex(chunk[..8].to_string()))?;
            let offset = u32::from_str_radix(&chunk[8..], 16)
                .map_err(|_| OffsetError::InvalidHex(chunk[8..].to_string()))?;
            entries.push((node_id, offset));
        }
        Ok(Self { entries })
    }

    /// Renders the table in the on-disk hex form.
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(self.entries.len() * 16);
        for &(node_id, offset) in &self.entries {
            out.push_str(&format!("{:08X}{:08X}", node_id, offset));
        }
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in file order.
    pub fn entries(&self) -> &[(u32, u32)] {
        &self.entries
    }

    /// Byte offset for a node id, if the node is present.
    pub fn offset_of(&self, node_id: u32) -> Option<u32> {
        self.entries
            .iter()
            .find(|&&(id, _)| id == node_id)
            .map(|&(_, offset)| offset)
    }

    pub fn contains(&self, node_id: u32) -> bool {
        self.offset_of(node_id).is_some()
    }

    /// Node ids in file order.
    pub fn node_ids(&self) -> Vec<u32> {
        self.entries.iter().map(|&(id, _)| id).collect()
    }

    /// Entries keyed and sorted by node id.
    pub fn to_map(&self) -> BTreeMap<u32, u32> {
        self.entries.iter().copied().collect()
    }
}
