//! Binary spatial report decoding and encoding.
//!
//! Spatial reports are flat little-endian files: an 8-byte header with the
//! node and timestep counts, the node id block, then one row of float32
//! values per timestep. Filtered reports insert two float32 fields (start
//! time and reporting interval) between the header and the id block.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Size of the fixed count header in bytes.
pub const HEADER_SIZE: usize = 8;
/// Size of the fixed header of a filtered report in bytes.
pub const FILTERED_HEADER_SIZE: usize = 16;

/// Errors that can occur while decoding or encoding a spatial report.
#[derive(Error, Debug)]
pub enum SpatialReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("File too short for header: {0} bytes")]
    MalformedHeader(usize),
    #[error("Invalid dimensions: node_count={0}, timestep_count={1}")]
    InvalidDimensions(i32, i32),
    #[error("Truncated file: header promises {expected} body bytes, found {found}")]
    Truncated { expected: usize, found: usize },
    #[error("Timestep {row} has {found} values, expected {expected}")]
    ShapeMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Report too large to encode: {0} nodes, {1} timesteps")]
    Oversize(usize, usize),
}

/// Extra header fields carried by a filtered spatial report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilteredHeader {
    /// Simulation time of the first reported timestep.
    pub start_time: f32,
    /// Reporting interval in simulation days.
    pub interval: f32,
}

/// A decoded spatial report: one row of per-node values per timestep.
///
/// The structure is immutable once decoded; re-reading the same bytes yields
/// an identical value.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialReport {
    node_ids: Vec<i32>,
    data: Vec<Vec<f32>>,
    filtered: Option<FilteredHeader>,
    trailing_bytes: usize,
}

impl SpatialReport {
    /// Builds a report from parts, checking that every row has one value
    /// per node.
    pub fn new(node_ids: Vec<i32>, data: Vec<Vec<f32>>) -> Result<Self, SpatialReportError> {
        for (row, values) in data.iter().enumerate() {
            if values.len() != node_ids.len() {
                return Err(SpatialReportError::ShapeMismatch {
                    row,
                    expected: node_ids.len(),
                    found: values.len(),
                });
            }
        }
        Ok(Self {
            node_ids,
            data,
            filtered: None,
            trailing_bytes: 0,
        })
    }

    /// Builds a filtered report from parts.
    pub fn new_filtered(
        node_ids: Vec<i32>,
        data: Vec<Vec<f32>>,
        header: FilteredHeader,
    ) -> Result<Self, SpatialReportError> {
        let mut report = Self::new(node_ids, data)?;
        report.filtered = Some(header);
        Ok(report)
    }

    /// Decodes a plain spatial report from a byte buffer.
    ///
    /// Trailing bytes after the promised body are not an error: a warning is
    /// logged, the count is recorded, and the parsed prefix is returned.
    /// A body shorter than the header promises is a hard failure.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SpatialReportError> {
        Self::decode(bytes, false)
    }

    /// Decodes a filtered spatial report (start time and interval after the
    /// count header) from a byte buffer.
    pub fn from_bytes_filtered(bytes: &[u8]) -> Result<Self, SpatialReportError> {
        Self::decode(bytes, true)
    }

    fn decode(bytes: &[u8], is_filtered: bool) -> Result<Self, SpatialReportError> {
        let header_size = if is_filtered {
            FILTERED_HEADER_SIZE
        } else {
            HEADER_SIZE
        };
        if bytes.len() < header_size {
            return Err(SpatialReportError::MalformedHeader(bytes.len()));
        }

        let node_count = read_i32(&bytes[0..4]);
        let timestep_count = read_i32(&bytes[4..8]);
        if node_count < 0 || timestep_count < 0 {
            return Err(SpatialReportError::InvalidDimensions(
                node_count,
                timestep_count,
            ));
        }
        let nodes = node_count as usize;
        let timesteps = timestep_count as usize;

        let filtered = if is_filtered {
            Some(FilteredHeader {
                start_time: read_f32(&bytes[8..12]),
                interval: read_f32(&bytes[12..16]),
            })
        } else {
            None
        };

        let body = &bytes[header_size..];
        let expected = nodes * 4 + timesteps * nodes * 4;
        if body.len() < expected {
            return Err(SpatialReportError::Truncated {
                expected,
                found: body.len(),
            });
        }

        let trailing_bytes = body.len() - expected;
        if trailing_bytes > 0 {
            warn!(
                trailing_bytes,
                node_count, timestep_count, "ignoring trailing bytes after spatial report body"
            );
        }

        let node_ids: Vec<i32> = body[..nodes * 4].chunks_exact(4).map(read_i32).collect();

        let mut data = Vec::with_capacity(timesteps);
        let mut offset = nodes * 4;
        for _ in 0..timesteps {
            let row: Vec<f32> = body[offset..offset + nodes * 4]
                .chunks_exact(4)
                .map(read_f32)
                .collect();
            data.push(row);
            offset += nodes * 4;
        }

        Ok(Self {
            node_ids,
            data,
            filtered,
            trailing_bytes,
        })
    }

    /// Reads a plain spatial report from a file.
    pub fn read(path: &Path) -> Result<Self, SpatialReportError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Reads a filtered spatial report from a file.
    pub fn read_filtered(path: &Path) -> Result<Self, SpatialReportError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes_filtered(&bytes)
    }

    /// Encodes the report in the on-disk layout.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SpatialReportError> {
        let nodes = self.node_ids.len();
        let timesteps = self.data.len();
        if nodes > i32::MAX as usize || timesteps > i32::MAX as usize {
            return Err(SpatialReportError::Oversize(nodes, timesteps));
        }

        for (row, values) in self.data.iter().enumerate() {
            if values.len() != nodes {
                return Err(SpatialReportError::ShapeMismatch {
                    row,
                    expected: nodes,
                    found: values.len(),
                });
            }
        }

        let header_size = if self.filtered.is_some() {
            FILTERED_HEADER_SIZE
        } else {
            HEADER_SIZE
        };
        let mut out = Vec::with_capacity(header_size + nodes * 4 + timesteps * nodes * 4);
        out.extend_from_slice(&(nodes as i32).to_le_bytes());
        out.extend_from_slice(&(timesteps as i32).to_le_bytes());
        if let Some(header) = &self.filtered {
            out.extend_from_slice(&header.start_time.to_le_bytes());
            out.extend_from_slice(&header.interval.to_le_bytes());
        }
        for &id in &self.node_ids {
            out.extend_from_slice(&id.to_le_bytes());
        }
        for row in &self.data {
            for &value in row {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
        Ok(out)
    }

    /// Writes the report to a file in the on-disk layout.
    pub fn write(&self, path: &Path) -> Result<(), SpatialReportError> {
        let bytes = self.to_bytes()?;
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }

    /// Node ids in column order.
    pub fn node_ids(&self) -> &[i32] {
        &self.node_ids
    }

    /// Rows of per-node values, ordered by increasing timestep.
    pub fn data(&self) -> &[Vec<f32>] {
        &self.data
    }

    pub fn node_count(&self) -> usize {
        self.node_ids.len()
    }

    pub fn timestep_count(&self) -> usize {
        self.data.len()
    }

    /// Filtered-report header fields, if the report was decoded as filtered.
    pub fn filtered_header(&self) -> Option<&FilteredHeader> {
        self.filtered.as_ref()
    }

    /// Number of bytes ignored after the expected body.
    pub fn trailing_bytes(&self) -> usize {
        self.trailing_bytes
    }

    /// Column index of a node id, if present.
    pub fn node_index(&self, node_id: i32) -> Option<usize> {
        self.node_ids.iter().position(|&id| id == node_id)
    }

    /// The time series for one node column.
    pub fn node_series(&self, index: usize) -> Option<Vec<f32>> {
        if index >= self.node_ids.len() {
            return None;
        }
        Some(self.data.iter().map(|row| row[index]).collect())
    }

    /// Per-timestep sums across all nodes, accumulated in f64.
    pub fn timestep_totals(&self) -> Vec<f64> {
        self.data
            .iter()
            .map(|row| row.iter().map(|&v| v as f64).sum())
            .collect()
    }
}

fn read_i32(bytes: &[u8]) -> i32 {
    i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_f32(bytes: &[u8]) -> f32 {
    f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Extracts the channel name from a conventional report file name
/// (`SpatialReport_Prevalence.bin` → `Prevalence`).
pub fn channel_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    stem.split_once('_').map(|(_, channel)| channel.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn example_bytes() -> Vec<u8> {
        // 3 nodes x 2 timesteps, ids [10, 20, 30],
        // rows [1.0, 2.0, 3.0] and [4.0, 5.0, 6.0].
        let mut bytes = vec![0x03, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00];
        for id in [10i32, 20, 30] {
            bytes.extend_from_slice(&id.to_le_bytes());
        }
        for value in [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0] {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn test_decode_example() {
        let report = SpatialReport::from_bytes(&example_bytes()).unwrap();
        assert_eq!(report.node_ids(), &[10, 20, 30]);
        assert_eq!(report.data(), &[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        assert_eq!(report.node_count(), 3);
        assert_eq!(report.timestep_count(), 2);
        assert_eq!(report.trailing_bytes(), 0);
    }

    #[test]
    fn test_roundtrip() {
        let original = SpatialReport::new(
            vec![340461476, 340461477, 340461478],
            vec![vec![0.0, 12.5, 3.25], vec![1.0, 0.0, 99.75]],
        )
        .unwrap();
        let bytes = original.to_bytes().unwrap();
        let decoded = SpatialReport::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_encode_matches_example_bytes() {
        let report = SpatialReport::new(
            vec![10, 20, 30],
            vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
        )
        .unwrap();
        assert_eq!(report.to_bytes().unwrap(), example_bytes());
    }

    #[test]
    fn test_zero_timesteps() {
        let mut bytes = vec![0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        bytes.extend_from_slice(&7i32.to_le_bytes());
        bytes.extend_from_slice(&9i32.to_le_bytes());

        let report = SpatialReport::from_bytes(&bytes).unwrap();
        assert_eq!(report.node_ids(), &[7, 9]);
        assert!(report.data().is_empty());
    }

    #[test]
    fn test_short_header() {
        let err = SpatialReport::from_bytes(&[0x01, 0x00, 0x00]).unwrap_err();
        assert!(matches!(err, SpatialReportError::MalformedHeader(3)));
    }

    #[test]
    fn test_negative_node_count() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(-1i32).to_le_bytes());
        bytes.extend_from_slice(&2i32.to_le_bytes());
        let err = SpatialReport::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, SpatialReportError::InvalidDimensions(-1, 2)));
    }

    #[test]
    fn test_truncated_data() {
        // Header promises 3 nodes x 2 timesteps but only one row follows.
        let bytes = &example_bytes()[..HEADER_SIZE + 3 * 4 + 3 * 4];
        let err = SpatialReport::from_bytes(bytes).unwrap_err();
        match err {
            SpatialReportError::Truncated { expected, found } => {
                assert_eq!(expected, 3 * 4 + 2 * 3 * 4);
                assert_eq!(found, 3 * 4 + 3 * 4);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_truncated_ids() {
        let bytes = &example_bytes()[..HEADER_SIZE + 2 * 4];
        assert!(matches!(
            SpatialReport::from_bytes(bytes).unwrap_err(),
            SpatialReportError::Truncated { .. }
        ));
    }

    #[test]
    fn test_trailing_bytes_are_ignored() {
        let mut bytes = example_bytes();
        bytes.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);

        let report = SpatialReport::from_bytes(&bytes).unwrap();
        assert_eq!(report.trailing_bytes(), 4);
        assert_eq!(report.data(), &[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
    }

    #[test]
    fn test_filtered_roundtrip() {
        let original = SpatialReport::new_filtered(
            vec![1, 2],
            vec![vec![10.0, 20.0]],
            FilteredHeader {
                start_time: 30.0,
                interval: 5.0,
            },
        )
        .unwrap();

        let bytes = original.to_bytes().unwrap();
        assert_eq!(bytes.len(), FILTERED_HEADER_SIZE + 2 * 4 + 2 * 4);

        let decoded = SpatialReport::from_bytes_filtered(&bytes).unwrap();
        assert_eq!(decoded, original);
        let header = decoded.filtered_header().unwrap();
        assert_eq!(header.start_time, 30.0);
        assert_eq!(header.interval, 5.0);
    }

    #[test]
    fn test_filtered_header_too_short() {
        // 12 bytes is a valid plain header plus one id but not a filtered one.
        let mut bytes = vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        bytes.extend_from_slice(&1i32.to_le_bytes());
        assert!(matches!(
            SpatialReport::from_bytes_filtered(&bytes).unwrap_err(),
            SpatialReportError::MalformedHeader(12)
        ));
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let err = SpatialReport::new(vec![1, 2], vec![vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(matches!(
            err,
            SpatialReportError::ShapeMismatch {
                row: 1,
                expected: 2,
                found: 1
            }
        ));
    }

    #[test]
    fn test_write_and_read_file() {
        let report = SpatialReport::new(
            vec![5, 6, 7],
            vec![vec![0.5, 1.5, 2.5], vec![3.5, 4.5, 5.5], vec![6.5, 7.5, 8.5]],
        )
        .unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("SpatialReport_Prevalence.bin");
        report.write(&path).unwrap();

        let metadata = std::fs::metadata(&path).unwrap();
        assert_eq!(metadata.len(), (HEADER_SIZE + 3 * 4 + 9 * 4) as u64);

        let decoded = SpatialReport::read(&path).unwrap();
        assert_eq!(decoded, report);
    }

    #[test]
    fn test_node_series_and_totals() {
        let report = SpatialReport::new(
            vec![10, 20, 30],
            vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
        )
        .unwrap();

        assert_eq!(report.node_index(20), Some(1));
        assert_eq!(report.node_series(1), Some(vec![2.0, 5.0]));
        assert_eq!(report.node_series(5), None);
        assert_eq!(report.timestep_totals(), vec![6.0, 15.0]);
    }

    #[test]
    fn test_channel_name() {
        assert_eq!(
            channel_name(Path::new("output/SpatialReport_New_Infections.bin")),
            Some("New_Infections".to_string())
        );
        assert_eq!(channel_name(Path::new("noextension")), None);
    }
}
