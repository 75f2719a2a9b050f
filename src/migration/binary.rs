//! Reading and inspecting compiled migration binaries.

use std::fmt::Write as _;
use std::path::Path;

use tracing::warn;

use crate::offsets::NodeOffsets;

use super::{header_path_for, GenderDataType, MigrationError, MigrationHeader, SLOT_SIZE};

/// A migration binary paired with its JSON header.
///
/// Sections follow the body layout: every age of the first gender section,
/// then every age of the second. A plain rates file has one section.
#[derive(Debug, Clone)]
pub struct MigrationBinary {
    header: MigrationHeader,
    node_ids: Vec<u32>,
    sections: Vec<Vec<Vec<(u32, f64)>>>,
}

impl MigrationBinary {
    /// Reads a binary body using the header next to it (`<binary>.json`).
    pub fn read(binary_path: &Path) -> Result<Self, MigrationError> {
        Self::read_with_header(binary_path, &header_path_for(binary_path))
    }

    pub fn read_with_header(
        binary_path: &Path,
        header_path: &Path,
    ) -> Result<Self, MigrationError> {
        let header = MigrationHeader::read(header_path)?;
        let bytes = std::fs::read(binary_path)?;
        Self::from_bytes(header, &bytes)
    }

    pub fn from_bytes(header: MigrationHeader, bytes: &[u8]) -> Result<Self, MigrationError> {
        let node_count = header.metadata.node_count;
        let stride = header.metadata.datavalue_count * SLOT_SIZE;
        let section_count = header.section_count();
        let offsets = NodeOffsets::from_hex(node_count, &header.node_offsets)?;

        let expected = section_count * node_count * stride;
        if bytes.len() < expected {
            return Err(MigrationError::Truncated {
                expected,
                found: bytes.len(),
            });
        }
        if bytes.len() > expected {
            warn!(
                trailing_bytes = bytes.len() - expected,
                node_count, section_count, "ignoring trailing bytes after migration body"
            );
        }

        let node_ids = offsets.node_ids();
        let mut sections = Vec::with_capacity(section_count);
        for section in 0..section_count {
            let section_base = section * node_count * stride;
            let mut nodes = Vec::with_capacity(node_count);
            for &(_, offset) in offsets.entries() {
                let base = section_base + offset as usize;
                let mut slots = Vec::with_capacity(header.metadata.datavalue_count);
                for slot in 0..header.metadata.datavalue_count {
                    let id = read_u32(bytes, base + slot * 4)?;
                    let rate =
                        read_f64(bytes, base + header.metadata.datavalue_count * 4 + slot * 8)?;
                    slots.push((id, rate));
                }
                nodes.push(slots);
            }
            sections.push(nodes);
        }

        Ok(Self {
            header,
            node_ids,
            sections,
        })
    }

    pub fn header(&self) -> &MigrationHeader {
        &self.header
    }

    pub fn node_ids(&self) -> &[u32] {
        &self.node_ids
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Raw destination slots of a node, zero padding included.
    pub fn slots(&self, section: usize, node_id: u32) -> Option<&[(u32, f64)]> {
        let index = self.node_ids.iter().position(|&id| id == node_id)?;
        self.sections.get(section)?.get(index).map(Vec::as_slice)
    }

    /// Populated destination slots of a node.
    pub fn links(&self, section: usize, node_id: u32) -> Option<Vec<(u32, f64)>> {
        let slots = self.slots(section, node_id)?;
        Some(
            slots
                .iter()
                .copied()
                .filter(|&(id, _)| id != 0)
                .collect(),
        )
    }

    /// Populated slots across all sections.
    pub fn total_links(&self) -> usize {
        self.sections
            .iter()
            .flatten()
            .flatten()
            .filter(|&&(id, _)| id != 0)
            .count()
    }

    /// Human-readable label for a section, e.g. `male, age 25`.
    pub fn section_label(&self, section: usize) -> String {
        let ages = self.header.metadata.ages_years.as_deref().unwrap_or(&[]);
        let age_count = if ages.is_empty() { 1 } else { ages.len() };
        let gendered = matches!(
            self.header.metadata.gender_data_type,
            Some(GenderDataType::OneForEachGender)
        );
        let age = ages.get(section % age_count);
        match (gendered, age) {
            (false, None) => "all".to_string(),
            (false, Some(age)) => format!("age {age}"),
            (true, age) => {
                let gender = if section < age_count { "male" } else { "female" };
                match age {
                    Some(age) => format!("{gender}, age {age}"),
                    None => gender.to_string(),
                }
            }
        }
    }

    /// Renders a single-section binary back into the text rates table it
    /// was built from: one `source destination rate` line per populated
    /// slot, in node order.
    pub fn to_rates_text(&self) -> Result<String, MigrationError> {
        if self.sections.len() != 1 {
            return Err(MigrationError::MultipleSections(self.sections.len()));
        }
        let mut text = String::new();
        for (source, slots) in self.node_ids.iter().zip(self.sections[0].iter()) {
            for &(destination, rate) in slots.iter().filter(|&&(id, _)| id != 0) {
                // write! to a String cannot fail
                let _ = writeln!(text, "{source} {destination} {rate}");
            }
        }
        Ok(text)
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, MigrationError> {
    let slice = offset
        .checked_add(4)
        .and_then(|end| bytes.get(offset..end))
        .ok_or(MigrationError::Truncated {
            expected: offset + 4,
            found: bytes.len(),
        })?;
    let mut buffer = [0u8; 4];
    buffer.copy_from_slice(slice);
    Ok(u32::from_le_bytes(buffer))
}

fn read_f64(bytes: &[u8], offset: usize) -> Result<f64, MigrationError> {
    let slice = offset
        .checked_add(8)
        .and_then(|end| bytes.get(offset..end))
        .ok_or(MigrationError::Truncated {
            expected: offset + 8,
            found: bytes.len(),
        })?;
    let mut buffer = [0u8; 8];
    buffer.copy_from_slice(slice);
    Ok(f64::from_le_bytes(buffer))
}
