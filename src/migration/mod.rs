//! Migration file construction and inspection.
//!
//! Migration data travels as a pair of files: a binary body holding, for
//! each source node, a fixed number of destination slots (4-byte node id
//! plus 8-byte rate each), and a JSON header describing the layout. The
//! simple form is built from a text rates table against a demographics
//! file; the age/gender form is built from a JSON description and repeats
//! the per-node block once per age per gender.

mod age_gender;
mod binary;
mod rates;

pub use age_gender::{AgeGenderMigration, NodeData, RateData};
pub use binary::MigrationBinary;
pub use rates::MigrationRates;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::offsets::OffsetError;
use crate::util;
pub use crate::util::header_path_for;

/// Bytes per destination slot: a u32 node id and an f64 rate.
pub const SLOT_SIZE: usize = 12;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Offsets(#[from] OffsetError),
    #[error("unknown migration type '{0}'")]
    UnknownType(String),
    #[error("poorly formed input in migration rates file (line {line}): '{text}'")]
    MalformedRateLine { line: usize, text: String },
    #[error("bad value '{value}' in migration rates file (line {line})")]
    BadRateValue { line: usize, value: String },
    #[error("source node ID {node} not found in demographics (line {line})")]
    UnknownSourceNode { line: usize, node: u32 },
    #[error("destination node ID {node} not found in demographics (line {line})")]
    UnknownDestinationNode { line: usize, node: u32 },
    #[error("destination node == source node in migration rates file (line {line}): '{text}'")]
    SelfLink { line: usize, text: String },
    #[error("link from {from_node} to {destination} defined multiple times")]
    DuplicateLink { from_node: u32, destination: u32 },
    #[error("node {node} has {count} outbound links, {migration_type} allows {budget}")]
    TooManyLinks {
        node: u32,
        count: usize,
        budget: usize,
        migration_type: MigrationType,
    },
    #[error("migration binary truncated: expected {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },
    #[error("file has {0} data sections, a flat rates table needs exactly 1")]
    MultipleSections(usize),
    #[error("invalid age {0}, ages must be between 0 and 125 years")]
    InvalidAge(f64),
    #[error("Ages_Years must be a non-empty array of ages in increasing order")]
    BadAgeArray,
    #[error("Node_Data has no elements so there would be no migration data")]
    EmptyNodeData,
    #[error("Rate_Data for node {0} has no elements")]
    EmptyRateData(u32),
    #[error("could not find {key} for node {node}")]
    MissingRates { node: u32, key: &'static str },
    #[error("Ages_Years has {expected} values and a {key} entry has {found}, they must match")]
    RateCount {
        key: &'static str,
        expected: usize,
        found: usize,
    },
}

/// The four canonical migration channels, each with a fixed number of
/// destination slots per source node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationType {
    #[serde(rename = "LOCAL_MIGRATION")]
    Local,
    #[serde(rename = "AIR_MIGRATION")]
    Air,
    #[serde(rename = "REGIONAL_MIGRATION")]
    Regional,
    #[serde(rename = "SEA_MIGRATION")]
    Sea,
}

impl MigrationType {
    pub const ALL: [MigrationType; 4] = [
        MigrationType::Local,
        MigrationType::Regional,
        MigrationType::Sea,
        MigrationType::Air,
    ];

    /// Destination slots reserved per source node.
    pub fn max_destinations(self) -> usize {
        match self {
            MigrationType::Local => 8,
            MigrationType::Regional => 30,
            MigrationType::Sea => 5,
            MigrationType::Air => 60,
        }
    }

    /// Bytes per source node in the binary body.
    pub fn node_stride(self) -> usize {
        self.max_destinations() * SLOT_SIZE
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MigrationType::Local => "LOCAL_MIGRATION",
            MigrationType::Air => "AIR_MIGRATION",
            MigrationType::Regional => "REGIONAL_MIGRATION",
            MigrationType::Sea => "SEA_MIGRATION",
        }
    }

    /// Resolves a user-supplied name. Accepts the full channel name or any
    /// prefix of LOCAL, REGIONAL, SEA, or AIR, case-insensitively.
    pub fn resolve(name: &str) -> Result<Self, MigrationError> {
        let upper = name.to_uppercase();
        if upper.is_empty() {
            return Err(MigrationError::UnknownType(name.to_string()));
        }
        for migration_type in Self::ALL {
            if migration_type.as_str() == upper {
                return Ok(migration_type);
            }
            let short = match migration_type {
                MigrationType::Local => "LOCAL",
                MigrationType::Regional => "REGIONAL",
                MigrationType::Sea => "SEA",
                MigrationType::Air => "AIR",
            };
            if short.starts_with(&upper) {
                return Ok(migration_type);
            }
        }
        Err(MigrationError::UnknownType(name.to_string()))
    }
}

impl fmt::Display for MigrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenderDataType {
    #[serde(rename = "SAME_FOR_BOTH_GENDERS")]
    SameForBothGenders,
    #[serde(rename = "ONE_FOR_EACH_GENDER")]
    OneForEachGender,
}

impl GenderDataType {
    /// Gender data sections in the binary body.
    pub fn section_count(self) -> usize {
        match self {
            GenderDataType::SameForBothGenders => 1,
            GenderDataType::OneForEachGender => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterpolationType {
    #[serde(rename = "LINEAR_INTERPOLATION")]
    LinearInterpolation,
    #[serde(rename = "PIECEWISE_CONSTANT")]
    PiecewiseConstant,
}

/// `Metadata` object of a migration header. The age/gender fields are only
/// present on files built from an age/gender description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationMetadata {
    #[serde(rename = "IdReference")]
    pub id_reference: String,
    #[serde(rename = "DateCreated")]
    pub date_created: String,
    #[serde(rename = "Tool")]
    pub tool: String,
    #[serde(rename = "Author", skip_serializing_if = "Option::is_none", default)]
    pub author: Option<String>,
    #[serde(rename = "DatavalueCount")]
    pub datavalue_count: usize,
    #[serde(
        rename = "MigrationType",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub migration_type: Option<MigrationType>,
    #[serde(
        rename = "GenderDataType",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub gender_data_type: Option<GenderDataType>,
    #[serde(
        rename = "InterpolationType",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub interpolation_type: Option<InterpolationType>,
    #[serde(rename = "AgesYears", skip_serializing_if = "Option::is_none", default)]
    pub ages_years: Option<Vec<f64>>,
    #[serde(rename = "NodeCount")]
    pub node_count: usize,
}

/// A migration header file: metadata plus the hex offsets index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationHeader {
    #[serde(rename = "Metadata")]
    pub metadata: MigrationMetadata,
    #[serde(rename = "NodeOffsets")]
    pub node_offsets: String,
}

impl MigrationHeader {
    pub fn read(path: &Path) -> Result<Self, MigrationError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Writes the header with 4-space indentation. The rates builder sorts
    /// keys; the age/gender converter keeps declaration order.
    pub fn write(&self, path: &Path, sort_keys: bool) -> Result<(), MigrationError> {
        let mut value = serde_json::to_value(self)?;
        if sort_keys {
            value = util::sorted_json(&value);
        }
        let text = util::to_pretty_string(&value)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Gender sections times age sections; 1 for a plain rates file.
    pub fn section_count(&self) -> usize {
        let genders = self
            .metadata
            .gender_data_type
            .map_or(1, GenderDataType::section_count);
        let ages = self.metadata.ages_years.as_ref().map_or(1, |ages| {
            if ages.is_empty() {
                1
            } else {
                ages.len()
            }
        });
        genders * ages
    }
}

/// Timestamp in the `DateCreated` style of the existing tooling, e.g.
/// `Mon Aug 24 12:00:00 2026`.
pub(crate) fn date_created() -> String {
    chrono::Local::now().format("%a %b %e %H:%M:%S %Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_prefixes() {
        assert_eq!(MigrationType::resolve("local").unwrap(), MigrationType::Local);
        assert_eq!(MigrationType::resolve("L").unwrap(), MigrationType::Local);
        assert_eq!(MigrationType::resolve("re").unwrap(), MigrationType::Regional);
        assert_eq!(MigrationType::resolve("SEA").unwrap(), MigrationType::Sea);
        assert_eq!(MigrationType::resolve("a").unwrap(), MigrationType::Air);
        assert_eq!(
            MigrationType::resolve("AIR_MIGRATION").unwrap(),
            MigrationType::Air
        );
        assert!(MigrationType::resolve("road").is_err());
        assert!(MigrationType::resolve("").is_err());
    }

    #[test]
    fn test_budgets() {
        assert_eq!(MigrationType::Local.max_destinations(), 8);
        assert_eq!(MigrationType::Regional.max_destinations(), 30);
        assert_eq!(MigrationType::Sea.max_destinations(), 5);
        assert_eq!(MigrationType::Air.max_destinations(), 60);
        assert_eq!(MigrationType::Local.node_stride(), 96);
    }

    #[test]
    fn test_metadata_roundtrip_without_age_fields() {
        let header = MigrationHeader {
            metadata: MigrationMetadata {
                id_reference: "Legacy".to_string(),
                date_created: "Mon Aug 24 12:00:00 2026".to_string(),
                tool: "epiregress".to_string(),
                author: None,
                datavalue_count: 8,
                migration_type: None,
                gender_data_type: None,
                interpolation_type: None,
                ages_years: None,
                node_count: 2,
            },
            node_offsets: "00000001000000000000000200000060".to_string(),
        };
        let text = serde_json::to_string(&header).unwrap();
        assert!(!text.contains("AgesYears"));
        assert!(!text.contains("Author"));

        let parsed: MigrationHeader = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.metadata.node_count, 2);
        assert_eq!(parsed.section_count(), 1);
    }

    #[test]
    fn test_section_count_age_gender() {
        let metadata = MigrationMetadata {
            id_reference: "Legacy".to_string(),
            date_created: String::new(),
            tool: String::new(),
            author: None,
            datavalue_count: 3,
            migration_type: Some(MigrationType::Regional),
            gender_data_type: Some(GenderDataType::OneForEachGender),
            interpolation_type: Some(InterpolationType::LinearInterpolation),
            ages_years: Some(vec![0.0, 15.0, 125.0]),
            node_count: 4,
        };
        let header = MigrationHeader {
            metadata,
            node_offsets: String::new(),
        };
        assert_eq!(header.section_count(), 6);
    }
}
