//! Age and gender structured migration built from a JSON description.
//!
//! The description names the ages its rates are sampled at and optionally
//! carries separate male and female rate lists. The binary repeats the
//! per-node destination block once per age per gender section, so every
//! rate list must be exactly as long as the age list.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::offsets::NodeOffsets;

use super::{
    date_created, header_path_for, GenderDataType, InterpolationType, MigrationError,
    MigrationHeader, MigrationMetadata, MigrationType, SLOT_SIZE,
};

pub const AGE_MIN_YEARS: f64 = 0.0;
pub const AGE_MAX_YEARS: f64 = 125.0;

const RATES_BOTH: &str = "Avg_Num_Trips_Per_Day_Both";
const RATES_MALE: &str = "Avg_Num_Trips_Per_Day_Male";
const RATES_FEMALE: &str = "Avg_Num_Trips_Per_Day_Female";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgeGenderMigration {
    #[serde(rename = "IdReference")]
    pub id_reference: String,
    #[serde(rename = "Interpolation_Type")]
    pub interpolation_type: InterpolationType,
    #[serde(rename = "Gender_Data_Type")]
    pub gender_data_type: GenderDataType,
    #[serde(rename = "Ages_Years")]
    pub ages_years: Vec<f64>,
    #[serde(rename = "Node_Data")]
    pub node_data: Vec<NodeData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeData {
    #[serde(rename = "From_Node_ID")]
    pub from_node_id: u32,
    #[serde(rename = "Rate_Data")]
    pub rate_data: Vec<RateData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateData {
    #[serde(rename = "To_Node_ID")]
    pub to_node_id: u32,
    #[serde(
        rename = "Avg_Num_Trips_Per_Day_Both",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub rates_both: Option<Vec<f64>>,
    #[serde(
        rename = "Avg_Num_Trips_Per_Day_Male",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub rates_male: Option<Vec<f64>>,
    #[serde(
        rename = "Avg_Num_Trips_Per_Day_Female",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub rates_female: Option<Vec<f64>>,
}

impl RateData {
    fn rates(&self, key: &str) -> Option<&[f64]> {
        match key {
            RATES_BOTH => self.rates_both.as_deref(),
            RATES_MALE => self.rates_male.as_deref(),
            RATES_FEMALE => self.rates_female.as_deref(),
            _ => None,
        }
    }
}

impl AgeGenderMigration {
    pub fn from_json(text: &str) -> Result<Self, MigrationError> {
        let migration: Self = serde_json::from_str(text)?;
        migration.validate()?;
        Ok(migration)
    }

    pub fn read(path: &Path) -> Result<Self, MigrationError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Checks the description the way the binary writer needs it: a
    /// non-empty ascending age list within [0, 125], at least one node with
    /// at least one destination each, and a rate list per age for the
    /// declared gender layout.
    pub fn validate(&self) -> Result<(), MigrationError> {
        if self.ages_years.is_empty() {
            return Err(MigrationError::BadAgeArray);
        }
        let mut previous = AGE_MIN_YEARS;
        for &age in &self.ages_years {
            if !(AGE_MIN_YEARS..=AGE_MAX_YEARS).contains(&age) {
                return Err(MigrationError::InvalidAge(age));
            }
            if age < previous {
                return Err(MigrationError::BadAgeArray);
            }
            previous = age;
        }

        if self.node_data.is_empty() {
            return Err(MigrationError::EmptyNodeData);
        }
        let expected = self.ages_years.len();
        for node in &self.node_data {
            if node.rate_data.is_empty() {
                return Err(MigrationError::EmptyRateData(node.from_node_id));
            }
            for entry in &node.rate_data {
                for &key in self.rate_keys() {
                    let rates = entry.rates(key).ok_or(MigrationError::MissingRates {
                        node: node.from_node_id,
                        key,
                    })?;
                    if rates.len() != expected {
                        return Err(MigrationError::RateCount {
                            key,
                            expected,
                            found: rates.len(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Widest destination list; fixes the slot count of every node block.
    pub fn max_destinations(&self) -> usize {
        self.node_data
            .iter()
            .map(|node| node.rate_data.len())
            .max()
            .unwrap_or(0)
    }

    pub fn node_ids(&self) -> Vec<u32> {
        self.node_data.iter().map(|node| node.from_node_id).collect()
    }

    fn rate_keys(&self) -> &'static [&'static str] {
        match self.gender_data_type {
            GenderDataType::SameForBothGenders => &[RATES_BOTH],
            GenderDataType::OneForEachGender => &[RATES_MALE, RATES_FEMALE],
        }
    }

    /// Serializes the sectioned binary body: per gender, per age, per node,
    /// the destination id slots then the rate slots sampled at that age,
    /// zero padded to the widest destination list.
    pub fn to_bytes(&self) -> Result<Vec<u8>, MigrationError> {
        let max_destinations = self.max_destinations();
        let age_count = self.ages_years.len();
        let keys = self.rate_keys();

        let mut bytes = Vec::with_capacity(
            keys.len() * age_count * self.node_data.len() * max_destinations * SLOT_SIZE,
        );
        for &key in keys {
            for age_index in 0..age_count {
                for node in &self.node_data {
                    for slot in 0..max_destinations {
                        let id = node.rate_data.get(slot).map_or(0, |entry| entry.to_node_id);
                        bytes.extend_from_slice(&id.to_le_bytes());
                    }
                    for slot in 0..max_destinations {
                        let rate = match node.rate_data.get(slot) {
                            Some(entry) => {
                                let rates =
                                    entry.rates(key).ok_or(MigrationError::MissingRates {
                                        node: node.from_node_id,
                                        key,
                                    })?;
                                rates.get(age_index).copied().ok_or(
                                    MigrationError::RateCount {
                                        key,
                                        expected: age_count,
                                        found: rates.len(),
                                    },
                                )?
                            }
                            None => 0.0,
                        };
                        bytes.extend_from_slice(&rate.to_le_bytes());
                    }
                }
            }
        }
        Ok(bytes)
    }

    /// Builds the JSON header for the sectioned binary.
    pub fn metadata(&self, migration_type: MigrationType, tool: &str) -> MigrationHeader {
        let stride = (self.max_destinations() * SLOT_SIZE) as u32;
        let entries = self
            .node_data
            .iter()
            .enumerate()
            .map(|(index, node)| (node.from_node_id, index as u32 * stride))
            .collect();
        MigrationHeader {
            metadata: MigrationMetadata {
                id_reference: self.id_reference.clone(),
                date_created: date_created(),
                tool: tool.to_string(),
                author: None,
                datavalue_count: self.max_destinations(),
                migration_type: Some(migration_type),
                gender_data_type: Some(self.gender_data_type),
                interpolation_type: Some(self.interpolation_type),
                ages_years: Some(self.ages_years.clone()),
                node_count: self.node_data.len(),
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
        migration_type: MigrationType,
        tool: &str,
    ) -> Result<MigrationHeader, MigrationError> {
        std::fs::write(binary_path, self.to_bytes()?)?;
        let header = self.metadata(migration_type, tool);
        let default_path;
        let header_path = match header_path {
            Some(path) => path,
            None => {
                default_path = header_path_for(binary_path);
                &default_path
            }
        };
        header.write(header_path, false)?;
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::MigrationBinary;
    use tempfile::tempdir;

    const BOTH_GENDERS: &str = r#"{
        "IdReference": "Legacy",
        "Interpolation_Type": "LINEAR_INTERPOLATION",
        "Gender_Data_Type": "SAME_FOR_BOTH_GENDERS",
        "Ages_Years": [15.0, 125.0],
        "Node_Data": [
            {"From_Node_ID": 1, "Rate_Data": [
                {"To_Node_ID": 2, "Avg_Num_Trips_Per_Day_Both": [0.1, 0.2]},
                {"To_Node_ID": 3, "Avg_Num_Trips_Per_Day_Both": [0.05, 0.1]}
            ]},
            {"From_Node_ID": 2, "Rate_Data": [
                {"To_Node_ID": 1, "Avg_Num_Trips_Per_Day_Both": [0.3, 0.4]}
            ]}
        ]
    }"#;

    #[test]
    fn test_parse_and_shape() {
        let migration = AgeGenderMigration::from_json(BOTH_GENDERS).unwrap();
        assert_eq!(migration.max_destinations(), 2);
        assert_eq!(migration.node_ids(), vec![1, 2]);
    }

    #[test]
    fn test_binary_layout() {
        let migration = AgeGenderMigration::from_json(BOTH_GENDERS).unwrap();
        let bytes = migration.to_bytes().unwrap();

        // One gender section, two ages, two nodes, two slots each:
        // (2*4 + 2*8) * 2 * 2 = 96 bytes.
        assert_eq!(bytes.len(), 96);
        assert_eq!(&bytes[0..4], &2u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &3u32.to_le_bytes());
        assert_eq!(&bytes[8..16], &0.1f64.to_le_bytes());
        assert_eq!(&bytes[16..24], &0.05f64.to_le_bytes());
        // Second node pads its unused slot with zeros.
        assert_eq!(&bytes[28..32], &0u32.to_le_bytes());
        assert_eq!(&bytes[40..48], &0.0f64.to_le_bytes());
        // Second age block repeats the ids with the age-1 rates.
        assert_eq!(&bytes[48..52], &2u32.to_le_bytes());
        assert_eq!(&bytes[56..64], &0.2f64.to_le_bytes());
    }

    #[test]
    fn test_age_validation() {
        let mut migration = AgeGenderMigration::from_json(BOTH_GENDERS).unwrap();

        migration.ages_years = vec![];
        assert!(matches!(
            migration.validate().unwrap_err(),
            MigrationError::BadAgeArray
        ));

        migration.ages_years = vec![15.0, 200.0];
        assert!(matches!(
            migration.validate().unwrap_err(),
            MigrationError::InvalidAge(age) if age == 200.0
        ));

        migration.ages_years = vec![50.0, 15.0];
        assert!(matches!(
            migration.validate().unwrap_err(),
            MigrationError::BadAgeArray
        ));
    }

    #[test]
    fn test_gendered_rates_required() {
        let text = BOTH_GENDERS.replace("SAME_FOR_BOTH_GENDERS", "ONE_FOR_EACH_GENDER");
        let err = AgeGenderMigration::from_json(&text).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::MissingRates {
                node: 1,
                key: "Avg_Num_Trips_Per_Day_Male"
            }
        ));
    }

    #[test]
    fn test_rate_length_must_match_ages() {
        let text = BOTH_GENDERS.replace("[0.3, 0.4]", "[0.3]");
        let err = AgeGenderMigration::from_json(&text).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::RateCount {
                expected: 2,
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_write_and_read_back() {
        let migration = AgeGenderMigration::from_json(BOTH_GENDERS).unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join("regional.bin");
        migration
            .write(&path, None, MigrationType::Regional, "epiregress")
            .unwrap();

        let binary = MigrationBinary::read(&path).unwrap();
        assert_eq!(binary.section_count(), 2);
        assert_eq!(binary.node_ids(), &[1, 2]);
        assert_eq!(binary.links(0, 1).unwrap(), vec![(2, 0.1), (3, 0.05)]);
        assert_eq!(binary.links(1, 1).unwrap(), vec![(2, 0.2), (3, 0.1)]);
        assert_eq!(binary.section_label(1), "age 125");

        let header = binary.header();
        assert_eq!(header.metadata.migration_type, Some(MigrationType::Regional));
        assert_eq!(header.metadata.datavalue_count, 2);
    }
}
