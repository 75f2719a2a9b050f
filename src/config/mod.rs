//! Configuration document tooling.
//!
//! Simulation configs are JSON documents that usually keep their settings
//! under a top level `parameters` object. This module covers the pieces
//! the rest of the tooling needs: locating a key anywhere in a document,
//! reading and adding parameters, stitching a multi-part config into one
//! document, and migrating configs between simulator versions.

mod migrate;

pub use migrate::{
    migrate_file, migrate_tree, migrate_value, AddRule, KeyRule, KeyRuleAction, MigrateOptions,
    MigrateSummary, RuleSet, SimTypeSet, ValueRule,
};

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::util;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config has neither a 'parameters' nor a 'paths' object")]
    NotStitchable,
    #[error("could not read included config {path}: {source}")]
    Include {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no 'parameters' object in included config {0}")]
    MissingIncludeParameters(PathBuf),
    #[error("parameter '{name}' is not in {path}")]
    MissingParameter { name: String, path: PathBuf },
    #[error("unknown simulation type '{0}'")]
    UnknownSimType(String),
}

/// The simulation types a config can declare in `Simulation_Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimType {
    #[serde(rename = "GENERIC_SIM")]
    Generic,
    #[serde(rename = "VECTOR_SIM")]
    Vector,
    #[serde(rename = "MALARIA_SIM")]
    Malaria,
    #[serde(rename = "ENVIRONMENTAL_SIM")]
    Environmental,
    #[serde(rename = "POLIO_SIM")]
    Polio,
    #[serde(rename = "AIRBORNE_SIM")]
    Airborne,
    #[serde(rename = "TBHIV_SIM")]
    Tbhiv,
    #[serde(rename = "STI_SIM")]
    Sti,
    #[serde(rename = "HIV_SIM")]
    Hiv,
    #[serde(rename = "PY_SIM")]
    Py,
    #[serde(rename = "TYPHOID_SIM")]
    Typhoid,
    #[serde(rename = "DENGUE_SIM")]
    Dengue,
}

impl SimType {
    pub const ALL: [SimType; 12] = [
        SimType::Generic,
        SimType::Vector,
        SimType::Malaria,
        SimType::Environmental,
        SimType::Polio,
        SimType::Airborne,
        SimType::Tbhiv,
        SimType::Sti,
        SimType::Hiv,
        SimType::Py,
        SimType::Typhoid,
        SimType::Dengue,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SimType::Generic => "GENERIC_SIM",
            SimType::Vector => "VECTOR_SIM",
            SimType::Malaria => "MALARIA_SIM",
            SimType::Environmental => "ENVIRONMENTAL_SIM",
            SimType::Polio => "POLIO_SIM",
            SimType::Airborne => "AIRBORNE_SIM",
            SimType::Tbhiv => "TBHIV_SIM",
            SimType::Sti => "STI_SIM",
            SimType::Hiv => "HIV_SIM",
            SimType::Py => "PY_SIM",
            SimType::Typhoid => "TYPHOID_SIM",
            SimType::Dengue => "DENGUE_SIM",
        }
    }

    pub fn from_name(name: &str) -> Option<SimType> {
        Self::ALL
            .iter()
            .copied()
            .find(|sim_type| sim_type.as_str() == name)
    }

    /// Guesses the sim type from a config file name, the same substring
    /// checks the existing conversion tooling uses.
    pub fn guess_from_file_name(path: &Path) -> Option<SimType> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        const GUESSES: [(&str, SimType); 9] = [
            ("tb", SimType::Tbhiv),
            ("malaria", SimType::Malaria),
            ("polio", SimType::Polio),
            ("generic", SimType::Generic),
            ("hiv", SimType::Hiv),
            ("sti", SimType::Sti),
            ("typhoid", SimType::Typhoid),
            ("vector", SimType::Vector),
            ("dengue", SimType::Dengue),
        ];
        GUESSES
            .iter()
            .find(|(needle, _)| name.contains(needle))
            .map(|&(_, sim_type)| sim_type)
    }
}

impl fmt::Display for SimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimType {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::from_name(name).ok_or_else(|| ConfigError::UnknownSimType(name.to_string()))
    }
}

enum Step {
    Key(String),
    Index(usize),
}

fn path_to_container(needle: &str, haystack: &Value, skip: &mut usize, path: &mut Vec<Step>) -> bool {
    match haystack {
        Value::Object(map) => {
            if map.contains_key(needle) {
                if *skip == 0 {
                    return true;
                }
                // a matching object counts once; its children are not searched
                *skip -= 1;
                return false;
            }
            for (key, child) in map {
                path.push(Step::Key(key.clone()));
                if path_to_container(needle, child, skip, path) {
                    return true;
                }
                path.pop();
            }
            false
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                path.push(Step::Index(index));
                if path_to_container(needle, item, skip, path) {
                    return true;
                }
                path.pop();
            }
            false
        }
        _ => false,
    }
}

/// Depth-first search for the object containing `key`, skipping the first
/// `skip` matches. Objects are scanned before arrays are descended into,
/// and an object that carries the key itself is counted without searching
/// its children.
pub fn find_key<'a>(key: &str, root: &'a Value, skip: usize) -> Option<&'a Map<String, Value>> {
    fn search<'a>(key: &str, value: &'a Value, skip: &mut usize) -> Option<&'a Map<String, Value>> {
        match value {
            Value::Object(map) => {
                if map.contains_key(key) {
                    if *skip == 0 {
                        return Some(map);
                    }
                    *skip -= 1;
                    return None;
                }
                map.values().find_map(|child| search(key, child, skip))
            }
            Value::Array(items) => items.iter().find_map(|item| search(key, item, skip)),
            _ => None,
        }
    }
    let mut skip = skip;
    search(key, root, &mut skip)
}

/// Mutable counterpart of [`find_key`]: the returned object can be edited
/// in place.
pub fn find_key_context<'a>(
    key: &str,
    root: &'a mut Value,
    skip: usize,
) -> Option<&'a mut Map<String, Value>> {
    let mut path = Vec::new();
    let mut remaining = skip;
    if !path_to_container(key, root, &mut remaining, &mut path) {
        return None;
    }
    let mut value = root;
    for step in &path {
        value = match step {
            Step::Key(key) => value.get_mut(key)?,
            Step::Index(index) => value.get_mut(*index)?,
        };
    }
    value.as_object_mut()
}

/// Reads a named parameter: from the `parameters` object when the document
/// has one, else from the document root.
pub fn parameter<'a>(root: &'a Value, name: &str) -> Option<&'a Value> {
    match root.get("parameters") {
        Some(parameters) => parameters.get(name),
        None => root.get(name),
    }
}

/// Adds a parameter when absent (an explicit JSON null counts as absent):
/// under the `parameters` object when the document has one, else at the
/// root. Returns true when the document changed.
pub fn add_param(root: &mut Value, key: &str, value: Value) -> bool {
    let target = match root.get_mut("parameters") {
        Some(parameters) => parameters,
        None => root,
    };
    let Some(map) = target.as_object_mut() else {
        return false;
    };
    if map.get(key).map_or(true, Value::is_null) {
        map.insert(key.to_string(), value);
        true
    } else {
        false
    }
}

/// Reads named parameters out of a config file. Every name must resolve;
/// validation code treats an absent key as a broken test setup.
pub fn read_parameters(path: &Path, names: &[&str]) -> Result<Vec<Value>, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let root: Value = serde_json::from_str(&text)?;
    names
        .iter()
        .map(|name| {
            parameter(&root, name)
                .cloned()
                .ok_or_else(|| ConfigError::MissingParameter {
                    name: name.to_string(),
                    path: path.to_path_buf(),
                })
        })
        .collect()
}

/// Result of pre-processing a multi-part config.
#[derive(Debug)]
pub enum StitchOutcome {
    /// The config already carries its parameters inline.
    AlreadyFlat,
    /// Parameters were merged from the referenced parts into a new file.
    Stitched(PathBuf),
}

/// Merges the `parameters` objects of the files a `paths` config refers
/// to, later entries winning. Returns `None` when the document already has
/// a `parameters` object. Relative paths resolve against `base_dir`.
pub fn merge_parameters(root: &Value, base_dir: &Path) -> Result<Option<Value>, ConfigError> {
    if root.get("parameters").is_some() {
        return Ok(None);
    }
    let Some(paths) = root.get("paths").and_then(Value::as_array) else {
        return Err(ConfigError::NotStitchable);
    };

    let mut merged = Map::new();
    for path in paths {
        let Some(name) = path.as_str() else {
            return Err(ConfigError::NotStitchable);
        };
        let part_path = base_dir.join(name);
        let text = std::fs::read_to_string(&part_path).map_err(|source| ConfigError::Include {
            path: part_path.clone(),
            source,
        })?;
        let part: Value = serde_json::from_str(&text)?;
        let Some(parameters) = part.get("parameters").and_then(Value::as_object) else {
            return Err(ConfigError::MissingIncludeParameters(part_path));
        };
        for (key, value) in parameters {
            merged.insert(key.clone(), value.clone());
        }
    }

    let mut document = Map::new();
    document.insert("parameters".to_string(), Value::Object(merged));
    Ok(Some(Value::Object(document)))
}

/// Pre-processes a config file: a flat config passes through untouched, a
/// `paths` config is stitched into a sibling file (default name
/// `.config_stitched.json`) with sorted keys.
pub fn stitch_file(path: &Path, output: Option<&Path>) -> Result<StitchOutcome, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let root: Value = serde_json::from_str(&text)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

    let Some(merged) = merge_parameters(&root, base_dir)? else {
        return Ok(StitchOutcome::AlreadyFlat);
    };

    let default_output;
    let output = match output {
        Some(output) => output,
        None => {
            default_output = base_dir.join(".config_stitched.json");
            &default_output
        }
    };
    let sorted = util::sorted_json(&merged);
    std::fs::write(output, util::to_pretty_string(&sorted)?)?;
    Ok(StitchOutcome::Stitched(output.to_path_buf()))
}
