//! Simple migration files built from a text rates table.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use tracing::warn;

use crate::demographics::Demographics;
use crate::offsets::NodeOffsets;

use super::{
    date_created, header_path_for, MigrationError, MigrationHeader, MigrationMetadata,
    MigrationType,
};

/// A validated migration network: outbound links per source node, kept in
/// the node order of the demographics file it was built against.
#[derive(Debug, Clone)]
pub struct MigrationRates {
    migration_type: MigrationType,
    id_reference: String,
    node_ids: Vec<u32>,
    links: Vec<Vec<(u32, f64)>>,
}

impl MigrationRates {
    /// Parses a rates table against a demographics file's node set.
    ///
    /// Each line is `source destination rate`. Text after `#` is a comment;
    /// lines that are blank after comment stripping are skipped. Every node
    /// named must exist in the demographics file, a node may not migrate to
    /// itself, and a link may only be defined once.
    pub fn build(
        demographics: &Demographics,
        text: &str,
        migration_type: MigrationType,
    ) -> Result<Self, MigrationError> {
        let node_ids = demographics.node_ids().to_vec();
        let index_of: HashMap<u32, usize> = node_ids
            .iter()
            .enumerate()
            .map(|(index, &id)| (id, index))
            .collect();
        let mut links: Vec<Vec<(u32, f64)>> = vec![Vec::new(); node_ids.len()];

        for (number, raw) in text.lines().enumerate() {
            let line = number + 1;
            let code = raw.split('#').next().unwrap_or("").trim();
            if code.is_empty() {
                continue;
            }
            let fields: Vec<&str> = code.split_whitespace().collect();
            if fields.len() != 3 {
                return Err(MigrationError::MalformedRateLine {
                    line,
                    text: raw.trim().to_string(),
                });
            }
            let source = parse_field::<u32>(fields[0], line)?;
            let destination = parse_field::<u32>(fields[1], line)?;
            let rate = parse_field::<f64>(fields[2], line)?;

            let Some(&index) = index_of.get(&source) else {
                return Err(MigrationError::UnknownSourceNode { line, node: source });
            };
            if !index_of.contains_key(&destination) {
                return Err(MigrationError::UnknownDestinationNode {
                    line,
                    node: destination,
                });
            }
            if destination == source {
                return Err(MigrationError::SelfLink {
                    line,
                    text: raw.trim().to_string(),
                });
            }
            if links[index].iter().any(|&(existing, _)| existing == destination) {
                return Err(MigrationError::DuplicateLink {
                    from_node: source,
                    destination,
                });
            }
            links[index].push((destination, rate));
        }

        Ok(Self {
            migration_type,
            id_reference: demographics.id_reference().to_string(),
            node_ids,
            links,
        })
    }

    pub fn read(
        demographics: &Demographics,
        path: &Path,
        migration_type: MigrationType,
    ) -> Result<Self, MigrationError> {
        let text = std::fs::read_to_string(path)?;
        Self::build(demographics, &text, migration_type)
    }

    pub fn migration_type(&self) -> MigrationType {
        self.migration_type
    }

    pub fn id_reference(&self) -> &str {
        &self.id_reference
    }

    pub fn node_ids(&self) -> &[u32] {
        &self.node_ids
    }

    /// Outbound links of a source node, in rates-file order.
    pub fn links(&self, node_id: u32) -> Option<&[(u32, f64)]> {
        let index = self.node_ids.iter().position(|&id| id == node_id)?;
        Some(&self.links[index])
    }

    pub fn total_links(&self) -> usize {
        self.links.iter().map(Vec::len).sum()
    }

    /// Checks the network shape and warns on suspect nodes: more outbound
    /// links than the migration type allows, islands and sinks with no
    /// outbound links, and nodes nothing migrates to. Returns true when no
    /// warnings were raised.
    pub fn validate(&self) -> bool {
        let budget = self.migration_type.max_destinations();
        let mut clean = true;
        let mut has_inbound: BTreeSet<u32> = BTreeSet::new();

        for (node, links) in self.node_ids.iter().copied().zip(self.links.iter()) {
            if links.is_empty() {
                warn!(node, "node is an island or sink, no outbound migration links");
                clean = false;
            } else if links.len() > budget {
                warn!(
                    node,
                    links = links.len(),
                    budget,
                    "node has more outbound links than the migration type allows"
                );
                clean = false;
            }
            for &(destination, _) in links {
                has_inbound.insert(destination);
            }
        }
        for node in self.node_ids.iter().copied() {
            if !has_inbound.contains(&node) {
                warn!(node, "node has no inbound links");
                clean = false;
            }
        }
        clean
    }

    /// Serializes the binary body: per node, the destination id slots and
    /// then the rate slots, zero padded to the migration type's budget.
    pub fn to_bytes(&self) -> Result<Vec<u8>, MigrationError> {
        let budget = self.migration_type.max_destinations();
        let mut bytes =
            Vec::with_capacity(self.node_ids.len() * self.migration_type.node_stride());

        for (node, links) in self.node_ids.iter().copied().zip(self.links.iter()) {
            if links.len() > budget {
                return Err(MigrationError::TooManyLinks {
                    node,
                    count: links.len(),
                    budget,
                    migration_type: self.migration_type,
                });
            }
            for slot in 0..budget {
                let id = links.get(slot).map_or(0, |&(destination, _)| destination);
                bytes.extend_from_slice(&id.to_le_bytes());
            }
            for slot in 0..budget {
                let rate = links.get(slot).map_or(0.0, |&(_, rate)| rate);
                bytes.extend_from_slice(&rate.to_le_bytes());
            }
        }
        Ok(bytes)
    }

    /// Builds the JSON header for the binary body.
    pub fn header(&self, tool: &str) -> MigrationHeader {
        let stride = self.migration_type.node_stride() as u32;
        let entries = self
            .node_ids
            .iter()
            .enumerate()
            .map(|(index, &node)| (node, index as u32 * stride))
            .collect();
        MigrationHeader {
            metadata: MigrationMetadata {
                id_reference: self.id_reference.clone(),
                date_created: date_created(),
                tool: tool.to_string(),
                author: std::env::var("USERNAME").ok(),
                datavalue_count: self.migration_type.max_destinations(),
                migration_type: None,
                gender_data_type: None,
                interpolation_type: None,
                ages_years: None,
                node_count: self.node_ids.len(),
            },
            node_offsets: NodeOffsets::new(entries).to_hex(),
        }
    }

    /// Writes the binary body and its JSON header. The header lands next to
    /// the binary with `.json` appended unless a path is given.
    pub fn write(
        &self,
        binary_path: &Path,
        header_path: Option<&Path>,
        tool: &str,
    ) -> Result<MigrationHeader, MigrationError> {
        std::fs::write(binary_path, self.to_bytes()?)?;
        let header = self.header(tool);
        let default_path;
        let header_path = match header_path {
            Some(path) => path,
            None => {
                default_path = header_path_for(binary_path);
                &default_path
            }
        };
        header.write(header_path, true)?;
        Ok(header)
    }
}

fn parse_field<T: std::str::FromStr>(value: &str, line: usize) -> Result<T, MigrationError> {
    value.parse().map_err(|_| MigrationError::BadRateValue {
        line,
        value: value.to_string(),
    })
}
