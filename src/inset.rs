//! Inset chart parsing and cross-checks against spatial reports.
//!
//! `InsetChart.json` carries one whole-population time series per channel.
//! For channels that also have a spatial report, the per-timestep sum across
//! nodes must agree with the inset series within tolerance.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Map;
use thiserror::Error;

use crate::spatial::SpatialReport;

/// Default relative tolerance for channel comparisons.
pub const DEFAULT_TOLERANCE: f64 = 0.2;

#[derive(Error, Debug)]
pub enum InsetChartError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Channel {0:?} not found in inset chart")]
    UnknownChannel(String),
    #[error("Channel {channel:?} has {found} values, expected {expected}")]
    ChannelLength {
        channel: String,
        expected: usize,
        found: usize,
    },
    #[error("Timestep count mismatch: inset chart has {inset}, spatial report has {spatial}")]
    TimestepMismatch { inset: usize, spatial: usize },
}

/// Header block of an inset chart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsetHeader {
    #[serde(rename = "DateTime", default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(rename = "Report_Version", default, skip_serializing_if = "Option::is_none")]
    pub report_version: Option<String>,
    #[serde(rename = "Start_Time", default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
    #[serde(rename = "Simulation_Timestep", default, skip_serializing_if = "Option::is_none")]
    pub simulation_timestep: Option<f64>,
    #[serde(rename = "Timesteps", default, skip_serializing_if = "Option::is_none")]
    pub timesteps: Option<usize>,
    #[serde(rename = "Channels", default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<usize>,
}

/// One channel: units label and per-timestep values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    #[serde(rename = "Units", default)]
    pub units: String,
    #[serde(rename = "Data")]
    pub data: Vec<f64>,
}

/// A parsed inset chart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsetChart {
    #[serde(rename = "Header", default)]
    pub header: InsetHeader,
    #[serde(rename = "Channels")]
    pub channels: Map<String, serde_json::Value>,
}

/// One disagreement between an inset channel and a spatial report.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMismatch {
    pub timestep: usize,
    pub inset_value: f64,
    pub spatial_sum: f64,
}

impl InsetChart {
    pub fn from_json(text: &str) -> Result<Self, InsetChartError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn read(path: &Path) -> Result<Self, InsetChartError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Channel names in file order.
    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.keys().map(String::as_str).collect()
    }

    /// Decodes a single channel.
    pub fn channel(&self, name: &str) -> Result<Channel, InsetChartError> {
        let value = self
            .channels
            .get(name)
            .ok_or_else(|| InsetChartError::UnknownChannel(name.to_string()))?;
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Checks that every channel has the same length, and that it matches
    /// the header's timestep count when one is present.
    pub fn validate_lengths(&self) -> Result<usize, InsetChartError> {
        let mut expected = self.header.timesteps;
        for name in self.channel_names() {
            let channel = self.channel(name)?;
            match expected {
                None => expected = Some(channel.data.len()),
                Some(len) if channel.data.len() != len => {
                    return Err(InsetChartError::ChannelLength {
                        channel: name.to_string(),
                        expected: len,
                        found: channel.data.len(),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(expected.unwrap_or(0))
    }

    /// Compares a spatial report's per-timestep node sums against the inset
    /// channel of the same name.
    ///
    /// A timestep disagrees when `|sum - inset| > tolerance * |inset|`.
    /// Returns the disagreeing timesteps; an empty list means the check
    /// passed.
    pub fn check_spatial_report(
        &self,
        name: &str,
        report: &SpatialReport,
        tolerance: f64,
    ) -> Result<Vec<ChannelMismatch>, InsetChartError> {
        let channel = self.channel(name)?;
        let totals = report.timestep_totals();
        if channel.data.len() != totals.len() {
            return Err(InsetChartError::TimestepMismatch {
                inset: channel.data.len(),
                spatial: totals.len(),
            });
        }

        let mut mismatches = Vec::new();
        for (timestep, (&inset_value, &spatial_sum)) in
            channel.data.iter().zip(totals.iter()).enumerate()
        {
            if (spatial_sum - inset_value).abs() > tolerance * inset_value.abs() {
                mismatches.push(ChannelMismatch {
                    timestep,
                    inset_value,
                    spatial_sum,
                });
            }
        }
        Ok(mismatches)
    }
}
