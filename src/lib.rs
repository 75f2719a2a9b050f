//! Regression-testing utilities for an epidemiological simulator.
//!
//! This crate reads, writes, and checks the file formats a simulation run
//! touches: binary spatial reports, inset charts, event recorder output,
//! migration files, demographics, configs, and climate inputs, plus the
//! statistical validation the scientific feature tests apply to them.

pub mod climate;
pub mod config;
pub mod demographics;
pub mod events;
pub mod inset;
pub mod migration;
pub mod offsets;
pub mod sft;
pub mod spatial;
pub mod util;

pub use climate::{ClimateFile, Resolution};
pub use config::SimType;
pub use demographics::Demographics;
pub use events::EventRecords;
pub use inset::InsetChart;
pub use migration::{AgeGenderMigration, MigrationBinary, MigrationRates, MigrationType};
pub use offsets::NodeOffsets;
pub use sft::Report;
pub use spatial::SpatialReport;
