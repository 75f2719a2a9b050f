//! Epiregress CLI - regression tooling for simulator files.
//!
//! Inspect binary spatial reports, build and convert migration files,
//! compile demographics, migrate configs between simulator versions, and
//! run the statistical checks the feature tests use.

use std::collections::BTreeSet;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use epiregress::climate::{self, ClimateFile, Resolution};
use epiregress::config::{self, MigrateOptions, RuleSet, SimType, StitchOutcome};
use epiregress::demographics::Demographics;
use epiregress::inset::{InsetChart, DEFAULT_TOLERANCE};
use epiregress::migration::{AgeGenderMigration, MigrationBinary, MigrationRates, MigrationType};
use epiregress::offsets::NodeOffsets;
use epiregress::sft::{check_binomial_95ci, check_binomial_99ci, Report, REPORT_FILE_NAME};
use epiregress::spatial::{self, SpatialReport};
use epiregress::util;

/// Tool name recorded in the headers this binary writes.
const TOOL_NAME: &str = "epiregress";

/// Regression tooling for epidemiological simulator files.
#[derive(Parser)]
#[command(name = "epiregress")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and check binary spatial reports.
    #[command(subcommand)]
    Spatial(SpatialCommand),
    /// Build, inspect, and convert migration files.
    #[command(subcommand)]
    Migration(MigrationCommand),
    /// Inspect and compile demographics files.
    #[command(subcommand)]
    Demographics(DemographicsCommand),
    /// Stitch and migrate simulation configs.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Inspect climate files.
    #[command(subcommand)]
    Climate(ClimateCommand),
    /// Statistical checks for scientific feature tests.
    #[command(subcommand)]
    Sft(SftCommand),
}

#[derive(Subcommand)]
enum SpatialCommand {
    /// Summarize a spatial report.
    Info {
        /// Path to the binary report.
        file: PathBuf,

        /// Treat the file as a filtered report with the extended header.
        #[arg(long)]
        filtered: bool,

        /// Print the full series for one node.
        #[arg(long)]
        node: Option<i32>,
    },

    /// Check a report's per-timestep totals against an inset chart channel.
    Check {
        /// Path to the binary report.
        #[arg(short, long)]
        report: PathBuf,

        /// Inset chart to compare against.
        #[arg(short, long)]
        inset: PathBuf,

        /// Channel name; taken from the report file name when omitted.
        #[arg(short, long)]
        channel: Option<String>,

        /// Relative tolerance per timestep.
        #[arg(short, long, default_value_t = DEFAULT_TOLERANCE)]
        tolerance: f64,

        /// Treat the file as a filtered report with the extended header.
        #[arg(long)]
        filtered: bool,
    },
}

#[derive(Subcommand)]
enum MigrationCommand {
    /// Build a migration binary from a text rates table.
    Build {
        /// Demographics file naming the nodes.
        #[arg(short, long)]
        demographics: PathBuf,

        /// Text file of `source destination rate` lines.
        #[arg(short, long)]
        rates: PathBuf,

        /// Output binary; its header lands next to it.
        #[arg(short, long)]
        binary: PathBuf,

        /// Migration type; an unambiguous prefix is accepted.
        #[arg(short = 't', long = "type", value_parser = MigrationType::resolve)]
        migration_type: MigrationType,

        /// Header path; `<binary>.json` when omitted.
        #[arg(long)]
        header: Option<PathBuf>,
    },

    /// Build an age/gender migration binary from a JSON description.
    FromJson {
        /// JSON description of nodes, ages, and rates.
        file: PathBuf,

        /// Output binary; its header lands next to it.
        binary: PathBuf,

        /// Migration type recorded in the header; an unambiguous prefix is
        /// accepted.
        #[arg(value_parser = MigrationType::resolve)]
        migration_type: MigrationType,
    },

    /// Summarize a migration binary, look nodes up in its offsets index, or
    /// compare its node ids against a demographics file.
    Inspect {
        /// Path to the migration binary.
        file: PathBuf,

        /// Header path; `<binary>.json` when omitted.
        #[arg(long)]
        metadata: Option<PathBuf>,

        /// Print every node id, sorted.
        #[arg(long)]
        dump: bool,

        /// Look up node ids (decimal or hex) in the offsets index.
        #[arg(long, value_delimiter = ',')]
        find: Vec<String>,

        /// Check that the node ids match this demographics file.
        #[arg(long)]
        validate: Option<PathBuf>,

        /// Print every link of every section.
        #[arg(long)]
        links: bool,
    },

    /// Render a single-section migration binary back into a rates table.
    ToText {
        /// Path to the migration binary.
        file: PathBuf,

        /// Header path; `<binary>.json` when omitted.
        #[arg(long)]
        metadata: Option<PathBuf>,

        /// Output text file; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum DemographicsCommand {
    /// Summarize a demographics file.
    Info {
        /// Path to the demographics file.
        file: PathBuf,

        /// Print every node id.
        #[arg(long)]
        nodes: bool,
    },

    /// Compile a demographics file: shorten attribute names into a string
    /// table and add the per-node offsets index.
    Compile {
        /// Path to the demographics file.
        file: PathBuf,

        /// Output path; `<name>.compiled.json` next to the input when omitted.
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Apply a version migration to a config file, or to every matching
    /// file under a directory.
    Migrate {
        /// Config file, or a directory to sweep with --recursive.
        path: PathBuf,

        /// JSON rule set; the built-in v2.18 to v2.20 table when omitted.
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Sweep every matching file under a directory.
        #[arg(long)]
        recursive: bool,

        /// File-name substring to match when sweeping a directory.
        #[arg(long, default_value = "config.json")]
        file_name: String,

        /// Add the target version's new parameters.
        #[arg(long)]
        add_new: bool,

        /// Rewrite documents with keys sorted.
        #[arg(long)]
        sort: bool,

        /// Sim type assumed when a document does not declare one and the
        /// file name gives no hint.
        #[arg(long = "default-type", default_value = "HIV_SIM")]
        default_sim_type: SimType,
    },

    /// Merge a multi-part config into a single flat file.
    Stitch {
        /// Config file with a `paths` list.
        file: PathBuf,

        /// Output path; a `.config_stitched.json` sibling when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ClimateCommand {
    /// Summarize a climate file, locate nodes on its grid, or compare its
    /// node ids against a demographics file.
    Inspect {
        /// Path to the climate binary; the header is read from `<file>.json`.
        file: PathBuf,

        /// Print every node id, sorted.
        #[arg(long)]
        dump: bool,

        /// Locate node ids (decimal or hex) and print their series.
        #[arg(long, value_delimiter = ',')]
        find: Vec<String>,

        /// Check that the node ids match this demographics file.
        #[arg(long)]
        validate: Option<PathBuf>,

        /// Grid resolution; the header's value when omitted.
        #[arg(long, value_parser = Resolution::parse)]
        resolution: Option<Resolution>,
    },
}

#[derive(Subcommand)]
enum SftCommand {
    /// Check a binomial draw against the confidence interval of its
    /// expected distribution.
    CheckBinomial {
        /// Observed success count.
        #[arg(long)]
        successes: u64,

        /// Number of trials.
        #[arg(long)]
        trials: u64,

        /// Success probability per trial.
        #[arg(long)]
        prob: f64,

        /// Confidence interval width.
        #[arg(long, value_enum, default_value = "95")]
        ci: CiLevel,

        /// Category label used in the report lines.
        #[arg(long, default_value = "default")]
        category: String,

        /// Write the report here instead of printing it. A directory gets
        /// the standard report file name.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CiLevel {
    /// Mean plus or minus two standard deviations.
    #[value(name = "95")]
    Ci95,
    /// Mean plus or minus three standard deviations.
    #[value(name = "99")]
    Ci99,
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "epiregress=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Spatial(command) => run_spatial(command),
        Commands::Migration(command) => run_migration(command),
        Commands::Demographics(command) => run_demographics(command),
        Commands::Config(command) => run_config(command),
        Commands::Climate(command) => run_climate(command),
        Commands::Sft(command) => run_sft(command),
    };

    if let Err(error) = outcome {
        eprintln!("Error: {error}");
        let mut source = error.source();
        while let Some(cause) = source {
            eprintln!("  caused by: {cause}");
            source = cause.source();
        }
        std::process::exit(1);
    }
}

fn run_spatial(command: SpatialCommand) -> Result<(), Box<dyn Error>> {
    match command {
        SpatialCommand::Info {
            file,
            filtered,
            node,
        } => {
            let report = read_spatial(&file, filtered)?;
            if let Some(channel) = spatial::channel_name(&file) {
                println!("Channel: {channel}");
            }
            println!("Nodes: {}", report.node_count());
            println!("Timesteps: {}", report.timestep_count());
            if let Some(header) = report.filtered_header() {
                println!("Start time: {}", header.start_time);
                println!("Reporting interval: {}", header.interval);
            }
            if report.trailing_bytes() > 0 {
                println!("Trailing bytes: {}", report.trailing_bytes());
            }
            let ids: Vec<String> = report.node_ids().iter().map(i32::to_string).collect();
            println!("Node ids: {}", ids.join(", "));
            println!("Per-timestep totals:");
            for (timestep, total) in report.timestep_totals().iter().enumerate() {
                println!("  [{timestep}] {total}");
            }

            if let Some(node_id) = node {
                let index = report
                    .node_index(node_id)
                    .ok_or_else(|| format!("node {node_id} is not in the report"))?;
                if let Some(series) = report.node_series(index) {
                    let values: Vec<String> =
                        series.iter().map(|value| value.to_string()).collect();
                    println!("Node {node_id}: {}", values.join(", "));
                }
            }
            Ok(())
        }
        SpatialCommand::Check {
            report: report_path,
            inset,
            channel,
            tolerance,
            filtered,
        } => {
            let report = read_spatial(&report_path, filtered)?;
            let chart = InsetChart::read(&inset)?;
            let channel = match channel {
                Some(name) => name,
                None => spatial::channel_name(&report_path)
                    .ok_or("the report file name does not imply a channel; pass --channel")?,
            };

            let mismatches = chart.check_spatial_report(&channel, &report, tolerance)?;
            if mismatches.is_empty() {
                println!(
                    "GOOD: channel '{channel}' matches the report over {} timesteps \
                     at tolerance {tolerance}",
                    report.timestep_count()
                );
                Ok(())
            } else {
                for mismatch in &mismatches {
                    println!(
                        "BAD: timestep {}: inset value {} vs spatial sum {}",
                        mismatch.timestep, mismatch.inset_value, mismatch.spatial_sum
                    );
                }
                println!(
                    "{} of {} timesteps out of tolerance",
                    mismatches.len(),
                    report.timestep_count()
                );
                std::process::exit(1);
            }
        }
    }
}

fn read_spatial(file: &Path, filtered: bool) -> Result<SpatialReport, Box<dyn Error>> {
    let report = if filtered {
        SpatialReport::read_filtered(file)?
    } else {
        SpatialReport::read(file)?
    };
    Ok(report)
}

fn read_migration(file: &Path, metadata: Option<&Path>) -> Result<MigrationBinary, Box<dyn Error>> {
    let binary = match metadata {
        Some(header) => MigrationBinary::read_with_header(file, header)?,
        None => MigrationBinary::read(file)?,
    };
    Ok(binary)
}

fn run_migration(command: MigrationCommand) -> Result<(), Box<dyn Error>> {
    match command {
        MigrationCommand::Build {
            demographics,
            rates,
            binary,
            migration_type,
            header,
        } => {
            let demographics = Demographics::read(&demographics)?;
            let table = MigrationRates::read(&demographics, &rates, migration_type)?;
            table.validate();
            let header = table.write(&binary, header.as_deref(), TOOL_NAME)?;
            println!(
                "Wrote {} ({} nodes, {} links, {})",
                binary.display(),
                header.metadata.node_count,
                table.total_links(),
                migration_type
            );
            Ok(())
        }
        MigrationCommand::FromJson {
            file,
            binary,
            migration_type,
        } => {
            let description = AgeGenderMigration::read(&file)?;
            let header = description.write(&binary, None, migration_type, TOOL_NAME)?;
            println!(
                "Wrote {} ({} nodes, {} sections)",
                binary.display(),
                header.metadata.node_count,
                header.section_count()
            );
            Ok(())
        }
        MigrationCommand::Inspect {
            file,
            metadata,
            dump,
            find,
            validate,
            links,
        } => {
            let binary = read_migration(&file, metadata.as_deref())?;
            let metadata = &binary.header().metadata;
            println!("IdReference: {}", metadata.id_reference);
            if let Some(migration_type) = metadata.migration_type {
                println!("Type: {migration_type}");
            }
            println!("Nodes: {}", binary.node_ids().len());
            println!("Destinations per node: {}", metadata.datavalue_count);
            println!("Sections: {}", binary.section_count());
            println!("Links: {}", binary.total_links());
            println!("Tool: {}", metadata.tool);
            println!("Created: {}", metadata.date_created);

            if dump {
                let mut ids = binary.node_ids().to_vec();
                ids.sort_unstable();
                for node_id in ids {
                    println!("{node_id}");
                }
            }

            if !find.is_empty() {
                let offsets =
                    NodeOffsets::from_hex(metadata.node_count, &binary.header().node_offsets)?;
                let mut missing = 0usize;
                for text in &find {
                    let node_id = util::parse_node_id(text)?;
                    match offsets.offset_of(node_id) {
                        Some(offset) => {
                            println!("Node {node_id} (0x{node_id:08X}): offset 0x{offset:08X}");
                        }
                        None => {
                            println!("Node {node_id} (0x{node_id:08X}): not in the offsets index");
                            missing += 1;
                        }
                    }
                }
                if missing > 0 {
                    std::process::exit(1);
                }
            }

            if let Some(demographics_path) = validate {
                let demographics = Demographics::read(&demographics_path)?;
                let binary_ids: BTreeSet<u32> = binary.node_ids().iter().copied().collect();
                let demographics_ids = demographics.node_id_set();
                let binary_only: Vec<u32> =
                    binary_ids.difference(&demographics_ids).copied().collect();
                let demographics_only: Vec<u32> =
                    demographics_ids.difference(&binary_ids).copied().collect();
                if binary_only.is_empty() && demographics_only.is_empty() {
                    println!(
                        "Node ids match {} ({} nodes)",
                        demographics_path.display(),
                        binary_ids.len()
                    );
                } else {
                    for node_id in &binary_only {
                        println!("only in migration file: {node_id}");
                    }
                    for node_id in &demographics_only {
                        println!("only in demographics: {node_id}");
                    }
                    println!(
                        "{} ids only in the migration file, {} only in the demographics",
                        binary_only.len(),
                        demographics_only.len()
                    );
                    std::process::exit(1);
                }
            }

            if links {
                for section in 0..binary.section_count() {
                    println!("[{}]", binary.section_label(section));
                    for &source in binary.node_ids() {
                        let Some(section_links) = binary.links(section, source) else {
                            continue;
                        };
                        for (destination, rate) in section_links {
                            println!("  {source} -> {destination}: {rate}");
                        }
                    }
                }
            }
            Ok(())
        }
        MigrationCommand::ToText {
            file,
            metadata,
            output,
        } => {
            let binary = read_migration(&file, metadata.as_deref())?;
            let text = binary.to_rates_text()?;
            match output {
                Some(path) => {
                    std::fs::write(&path, text)?;
                    println!("Wrote {}", path.display());
                }
                None => print!("{text}"),
            }
            Ok(())
        }
    }
}

fn run_demographics(command: DemographicsCommand) -> Result<(), Box<dyn Error>> {
    match command {
        DemographicsCommand::Info { file, nodes } => {
            let demographics = Demographics::read(&file)?;
            println!("IdReference: {}", demographics.id_reference());
            println!("Nodes: {}", demographics.node_ids().len());
            println!(
                "Compiled: {}",
                if demographics.is_compiled() { "yes" } else { "no" }
            );
            if nodes {
                for node_id in demographics.node_ids() {
                    println!("{node_id}");
                }
            }
            Ok(())
        }
        DemographicsCommand::Compile { file, output } => {
            let demographics = Demographics::read(&file)?;
            if demographics.is_compiled() {
                println!("{} is already compiled", file.display());
                return Ok(());
            }
            let compiled = demographics.compile()?;
            let output = output.unwrap_or_else(|| file.with_extension("compiled.json"));
            compiled.write(&output)?;
            println!(
                "Compiled {} nodes into {}",
                compiled.node_ids().len(),
                output.display()
            );
            Ok(())
        }
    }
}

fn run_config(command: ConfigCommand) -> Result<(), Box<dyn Error>> {
    match command {
        ConfigCommand::Migrate {
            path,
            recursive,
            file_name,
            rules,
            add_new,
            sort,
            default_sim_type,
        } => {
            let rules = match rules {
                Some(path) => RuleSet::read(&path)?,
                None => RuleSet::v2_18_to_v2_20(),
            };
            let options = MigrateOptions {
                add_new_parameters: add_new,
                sort_keys: sort,
                default_sim_type,
            };

            if recursive {
                let start = Instant::now();
                let summary = config::migrate_tree(&path, &file_name, &rules, &options)?;
                println!(
                    "Swept {} files in {:.2?}: {} changed, {} unchanged, {} failed",
                    summary.total(),
                    start.elapsed(),
                    summary.changed.len(),
                    summary.unchanged.len(),
                    summary.failed.len()
                );
                for changed in &summary.changed {
                    println!("  changed   {}", changed.display());
                }
                for (failed, error) in &summary.failed {
                    println!("  failed    {}: {error}", failed.display());
                }
                if !summary.failed.is_empty() {
                    std::process::exit(1);
                }
            } else if path.is_dir() {
                return Err(format!(
                    "{} is a directory; pass --recursive to sweep it",
                    path.display()
                )
                .into());
            } else {
                let changed = config::migrate_file(&path, &rules, &options)?;
                println!(
                    "{}: {}",
                    path.display(),
                    if changed { "changed" } else { "unchanged" }
                );
            }
            Ok(())
        }
        ConfigCommand::Stitch { file, output } => {
            match config::stitch_file(&file, output.as_deref())? {
                StitchOutcome::AlreadyFlat => {
                    println!("{} already carries its parameters inline", file.display());
                }
                StitchOutcome::Stitched(path) => {
                    println!("Stitched into {}", path.display());
                }
            }
            Ok(())
        }
    }
}

fn run_climate(command: ClimateCommand) -> Result<(), Box<dyn Error>> {
    match command {
        ClimateCommand::Inspect {
            file,
            dump,
            find,
            validate,
            resolution,
        } => {
            let climate = ClimateFile::read(&file)?;
            println!("Nodes: {}", climate.node_count());
            println!("Values per node: {}", climate.datavalue_count());
            let resolution = resolution.or_else(|| climate.resolution());
            if let Some(resolution) = resolution {
                println!("Resolution: {}", resolution.as_str());
            }

            if dump {
                for node_id in climate.node_ids() {
                    println!("{node_id}");
                }
            }

            if !find.is_empty() {
                let resolution =
                    resolution.ok_or("the header names no grid resolution; pass --resolution")?;
                let mut missing = 0usize;
                for text in &find {
                    let node_id = util::parse_node_id(text)?;
                    let (lat, lon) = climate::node_lat_lon_degrees(node_id, resolution);
                    println!("Node {node_id} (0x{node_id:08X}): lat {lat:.6}, lon {lon:.6}");
                    if !climate.contains(node_id) {
                        println!("Node {node_id} is not in this file");
                        missing += 1;
                        continue;
                    }
                    let series = climate.node_series(node_id)?;
                    let head: Vec<String> = series
                        .iter()
                        .take(5)
                        .map(|value| value.to_string())
                        .collect();
                    println!("Series: {} values, starting {}", series.len(), head.join(", "));
                }
                if missing > 0 {
                    std::process::exit(1);
                }
            }

            if let Some(demographics_path) = validate {
                let demographics = Demographics::read(&demographics_path)?;
                let (climate_only, demographics_only) =
                    climate.compare_nodes(&demographics.node_id_set());
                if climate_only.is_empty() && demographics_only.is_empty() {
                    println!(
                        "Node ids match {} ({} nodes)",
                        demographics_path.display(),
                        climate.node_count()
                    );
                } else {
                    for node_id in &climate_only {
                        println!("only in climate file: {node_id}");
                    }
                    for node_id in &demographics_only {
                        println!("only in demographics: {node_id}");
                    }
                    println!(
                        "{} ids only in the climate file, {} only in the demographics",
                        climate_only.len(),
                        demographics_only.len()
                    );
                    std::process::exit(1);
                }
            }
            Ok(())
        }
    }
}

fn run_sft(command: SftCommand) -> Result<(), Box<dyn Error>> {
    match command {
        SftCommand::CheckBinomial {
            successes,
            trials,
            prob,
            ci,
            category,
            output,
        } => {
            let mut report = Report::new("check-binomial");
            let passed = match ci {
                CiLevel::Ci95 => {
                    check_binomial_95ci(&mut report, successes, trials, prob, &category)
                }
                CiLevel::Ci99 => {
                    check_binomial_99ci(&mut report, successes, trials, prob, &category)
                }
            };

            match output {
                Some(path) => {
                    let path = if path.is_dir() {
                        path.join(REPORT_FILE_NAME)
                    } else {
                        path
                    };
                    report.write(&path)?;
                    println!("Wrote {}", path.display());
                }
                None => print!("{}", report.render()),
            }
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
