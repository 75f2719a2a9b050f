//! Climate file inspection.
//!
//! Climate inputs come in pairs: a binary of little-endian f32 series and
//! a JSON header next to it at `<file>.json` naming the node count, the
//! number of values per node, the cell resolution, and the byte offset of
//! every node's series. Offsets may be shared between nodes, so the
//! binary can be smaller than node count times series length.
//!
//! Node ids encode a grid cell: the low 16 bits of `id - 1` index
//! latitude from the south pole, the high bits index longitude from the
//! antimeridian, both in cells of the file's resolution.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::offsets::{NodeOffsets, OffsetError};
use crate::util;

#[derive(Error, Debug)]
pub enum ClimateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("node offsets: {0}")]
    Offsets(#[from] OffsetError),
    #[error("unknown resolution '{0}', expected 30arcsec or 2.5arcmin")]
    UnknownResolution(String),
    #[error("node {0} is not in the header")]
    UnknownNode(u32),
    #[error("series for node {node} ends at byte {end} but the file has {len} bytes")]
    Truncated { node: u32, end: usize, len: usize },
}

/// Grid cell size of a climate file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Arcsec30,
    Arcmin2_5,
}

impl Resolution {
    pub fn parse(text: &str) -> Result<Self, ClimateError> {
        match text {
            "30arcsec" => Ok(Resolution::Arcsec30),
            "2.5arcmin" => Ok(Resolution::Arcmin2_5),
            other => Err(ClimateError::UnknownResolution(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Resolution::Arcsec30 => "30arcsec",
            Resolution::Arcmin2_5 => "2.5arcmin",
        }
    }

    /// Cell size in arc seconds.
    pub fn arcsec(self) -> i64 {
        match self {
            Resolution::Arcsec30 => 30,
            Resolution::Arcmin2_5 => 150,
        }
    }
}

/// Latitude and longitude of a node's cell center, in arc seconds.
pub fn node_lat_lon_arcsec(node_id: u32, resolution: Resolution) -> (i64, i64) {
    let res = resolution.arcsec();
    let index = node_id as i64 - 1;
    let lat = (index % 65536) * res - 324_000 + res / 2;
    let lon = (index >> 16) * res - 648_000 + res / 2;
    (lat, lon)
}

/// Latitude and longitude of a node's cell center, in degrees.
pub fn node_lat_lon_degrees(node_id: u32, resolution: Resolution) -> (f64, f64) {
    let (lat, lon) = node_lat_lon_arcsec(node_id, resolution);
    (lat as f64 / 3600.0, lon as f64 / 3600.0)
}

/// Node id of the cell containing the given coordinates, in arc seconds.
pub fn node_id_at_arcsec(lat: i64, lon: i64, resolution: Resolution) -> u32 {
    let res = resolution.arcsec();
    let x = (lon + 648_000) / res;
    let y = (lat + 324_000) / res;
    ((x << 16) + y + 1) as u32
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClimateHeader {
    #[serde(rename = "Metadata")]
    pub metadata: ClimateMetadata,
    #[serde(rename = "NodeOffsets")]
    pub node_offsets: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClimateMetadata {
    #[serde(rename = "NodeCount")]
    pub node_count: usize,
    #[serde(rename = "DatavalueCount")]
    pub datavalue_count: usize,
    #[serde(rename = "Resolution", default)]
    pub resolution: Option<String>,
}

/// A climate binary joined with its parsed header.
#[derive(Debug)]
pub struct ClimateFile {
    header: ClimateHeader,
    offsets: NodeOffsets,
    data: Vec<u8>,
}

impl ClimateFile {
    /// Reads a climate binary together with the header at `<binary>.json`,
    /// checking that every node's series fits inside the file.
    pub fn read(binary: &Path) -> Result<Self, ClimateError> {
        let header_path = util::header_path_for(binary);
        let header: ClimateHeader = serde_json::from_str(&fs::read_to_string(header_path)?)?;
        let offsets = NodeOffsets::from_hex(header.metadata.node_count, &header.node_offsets)?;
        let data = fs::read(binary)?;

        let series_bytes = header.metadata.datavalue_count * 4;
        let mut used = 0usize;
        for &(node_id, offset) in offsets.entries() {
            let end = offset as usize + series_bytes;
            if end > data.len() {
                return Err(ClimateError::Truncated {
                    node: node_id,
                    end,
                    len: data.len(),
                });
            }
            used = used.max(end);
        }
        if used < data.len() {
            warn!(
                trailing = data.len() - used,
                "climate file has bytes no node offset reaches"
            );
        }

        Ok(ClimateFile {
            header,
            offsets,
            data,
        })
    }

    pub fn header(&self) -> &ClimateHeader {
        &self.header
    }

    pub fn node_count(&self) -> usize {
        self.header.metadata.node_count
    }

    pub fn datavalue_count(&self) -> usize {
        self.header.metadata.datavalue_count
    }

    /// Cell resolution declared in the header, when present and recognized.
    pub fn resolution(&self) -> Option<Resolution> {
        self.header
            .metadata
            .resolution
            .as_deref()
            .and_then(|text| Resolution::parse(text).ok())
    }

    pub fn contains(&self, node_id: u32) -> bool {
        self.offsets.contains(node_id)
    }

    /// Node ids from the header, sorted ascending.
    pub fn node_ids(&self) -> Vec<u32> {
        let mut ids = self.offsets.node_ids();
        ids.sort_unstable();
        ids
    }

    pub fn node_id_set(&self) -> BTreeSet<u32> {
        self.offsets.node_ids().into_iter().collect()
    }

    /// Series of values for one node.
    pub fn node_series(&self, node_id: u32) -> Result<Vec<f32>, ClimateError> {
        let offset = self
            .offsets
            .offset_of(node_id)
            .ok_or(ClimateError::UnknownNode(node_id))? as usize;
        let end = offset + self.header.metadata.datavalue_count * 4;
        Ok(self.data[offset..end].chunks_exact(4).map(read_f32).collect())
    }

    /// Splits the node ids here and in `other` into the ids present only
    /// on each side. Both lists empty means the two sets agree.
    pub fn compare_nodes(&self, other: &BTreeSet<u32>) -> (Vec<u32>, Vec<u32>) {
        let here = self.node_id_set();
        let here_only = here.difference(other).copied().collect();
        let other_only = other.difference(&here).copied().collect();
        (here_only, other_only)
    }
}

fn read_f32(bytes: &[u8]) -> f32 {
    f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_climate(
        dir: &Path,
        entries: Vec<(u32, u32)>,
        datavalue_count: usize,
        values: &[f32],
    ) -> std::path::PathBuf {
        let binary = dir.join("air_temperature.bin");
        let offsets = NodeOffsets::new(entries);
        let header = json!({
            "Metadata": {
                "NodeCount": offsets.len(),
                "DatavalueCount": datavalue_count,
                "Resolution": "2.5arcmin",
            },
            "NodeOffsets": offsets.to_hex(),
        });
        std::fs::write(
            util::header_path_for(&binary),
            serde_json::to_string(&header).unwrap(),
        )
        .unwrap();
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        std::fs::write(&binary, bytes).unwrap();
        binary
    }

    #[test]
    fn test_read_and_node_series() {
        let dir = tempfile::tempdir().unwrap();
        let binary = write_climate(
            dir.path(),
            vec![(10, 0), (11, 12)],
            3,
            &[20.0, 21.5, 22.0, -3.0, -2.5, -1.0],
        );

        let climate = ClimateFile::read(&binary).unwrap();
        assert_eq!(climate.node_count(), 2);
        assert_eq!(climate.datavalue_count(), 3);
        assert_eq!(climate.resolution(), Some(Resolution::Arcmin2_5));
        assert_eq!(climate.node_ids(), vec![10, 11]);
        assert_eq!(climate.node_series(10).unwrap(), vec![20.0, 21.5, 22.0]);
        assert_eq!(climate.node_series(11).unwrap(), vec![-3.0, -2.5, -1.0]);
    }

    #[test]
    fn test_shared_offsets_read_the_same_series() {
        let dir = tempfile::tempdir().unwrap();
        // Both nodes point at the only series in the file.
        let binary = write_climate(dir.path(), vec![(1, 0), (2, 0)], 2, &[5.0, 6.0]);

        let climate = ClimateFile::read(&binary).unwrap();
        assert_eq!(climate.node_series(1).unwrap(), vec![5.0, 6.0]);
        assert_eq!(climate.node_series(2).unwrap(), vec![5.0, 6.0]);
    }

    #[test]
    fn test_series_past_end_of_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let binary = write_climate(dir.path(), vec![(1, 0), (2, 8)], 3, &[1.0, 2.0, 3.0]);

        let err = ClimateFile::read(&binary).unwrap_err();
        assert!(matches!(
            err,
            ClimateError::Truncated { node: 2, end: 20, len: 12 }
        ));
    }

    #[test]
    fn test_unknown_node_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let binary = write_climate(dir.path(), vec![(1, 0)], 1, &[9.0]);

        let climate = ClimateFile::read(&binary).unwrap();
        assert!(matches!(
            climate.node_series(99),
            Err(ClimateError::UnknownNode(99))
        ));
    }

    #[test]
    fn test_compare_nodes() {
        let dir = tempfile::tempdir().unwrap();
        let binary = write_climate(dir.path(), vec![(1, 0), (2, 0), (3, 0)], 1, &[0.5]);

        let climate = ClimateFile::read(&binary).unwrap();
        let other: BTreeSet<u32> = [2, 3, 4].into_iter().collect();
        let (here_only, other_only) = climate.compare_nodes(&other);
        assert_eq!(here_only, vec![1]);
        assert_eq!(other_only, vec![4]);
    }

    #[test]
    fn test_resolution_parse() {
        assert_eq!(Resolution::parse("30arcsec").unwrap(), Resolution::Arcsec30);
        assert_eq!(Resolution::parse("2.5arcmin").unwrap(), Resolution::Arcmin2_5);
        assert!(matches!(
            Resolution::parse("1arcmin"),
            Err(ClimateError::UnknownResolution(_))
        ));
        assert_eq!(Resolution::Arcsec30.arcsec(), 30);
        assert_eq!(Resolution::Arcmin2_5.arcsec(), 150);
    }

    #[test]
    fn test_node_id_geodesy_round_trip() {
        let (lat, lon) = node_lat_lon_arcsec(340461476, Resolution::Arcmin2_5);
        assert_eq!(lat, -30675);
        assert_eq!(lon, 131325);
        assert_eq!(node_id_at_arcsec(lat, lon, Resolution::Arcmin2_5), 340461476);

        let (lat_deg, lon_deg) = node_lat_lon_degrees(340461476, Resolution::Arcmin2_5);
        assert!((lat_deg - (-8.520833)).abs() < 1e-6);
        assert!((lon_deg - 36.479166).abs() < 1e-5);
    }

    #[test]
    fn test_first_node_id_sits_at_the_grid_origin() {
        let (lat, lon) = node_lat_lon_arcsec(1, Resolution::Arcsec30);
        assert_eq!(lat, -324_000 + 15);
        assert_eq!(lon, -648_000 + 15);
        assert_eq!(node_id_at_arcsec(lat, lon, Resolution::Arcsec30), 1);
    }
}
