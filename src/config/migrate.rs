//! Config migration between simulator versions.
//!
//! A migration is a rule set applied to every occurrence of a key in the
//! document: keys are renamed or deleted, enum values are rewritten, and
//! new parameters are added when missing. Rules carry the simulation types
//! they apply to, so one table serves every disease build.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::util;

use super::{add_param, find_key, find_key_context, ConfigError, SimType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyRuleAction {
    /// Remove the key wherever it appears.
    Delete,
    /// Replace the key, keeping its value.
    Rename,
    /// Replace the key when present; otherwise add the replacement with the
    /// rule's default value.
    RenameOrAdd,
}

/// The simulation types a rule applies to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SimTypeSet {
    One(SimType),
    Many(Vec<SimType>),
    /// The keyword `ALL`.
    Keyword(String),
}

impl SimTypeSet {
    pub fn all() -> Self {
        SimTypeSet::Keyword("ALL".to_string())
    }

    pub fn contains(&self, sim_type: SimType) -> bool {
        match self {
            SimTypeSet::One(one) => *one == sim_type,
            SimTypeSet::Many(list) => list.contains(&sim_type),
            SimTypeSet::Keyword(word) => word.eq_ignore_ascii_case("ALL"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRule {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
    pub sim_types: SimTypeSet,
    pub action: KeyRuleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueRule {
    pub key: String,
    pub from: Value,
    pub to: Value,
    pub sim_types: SimTypeSet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddRule {
    pub key: String,
    pub value: Value,
    pub sim_types: SimTypeSet,
}

/// A config migration: key rewrites, value rewrites, and new parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub keys: Vec<KeyRule>,
    #[serde(default)]
    pub values: Vec<ValueRule>,
    #[serde(default)]
    pub additions: Vec<AddRule>,
}

impl RuleSet {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// The built-in v2.18 to v2.20 migration.
    pub fn v2_18_to_v2_20() -> Self {
        let environmental = || {
            SimTypeSet::Many(vec![SimType::Environmental, SimType::Polio, SimType::Typhoid])
        };
        RuleSet {
            keys: vec![
                rename("Base_Population_Scale_Factor", "x_Base_Population"),
                rename("Incubation_Period_Log_Mean", "Incubation_Period_Log_Normal_Mu"),
                rename("Incubation_Period_Log_Width", "Incubation_Period_Log_Normal_Sigma"),
                rename("Base_Incubation_Period", "Incubation_Period_Constant"),
                rename_for(
                    "Reporting_Period_Log_Mean",
                    "Reporting_Period_Log_Normal_Mu",
                    SimTypeSet::One(SimType::Dengue),
                ),
                rename_for(
                    "Reporting_Period_Log_Width",
                    "Reporting_Period_Log_Normal_Sigma",
                    SimTypeSet::One(SimType::Dengue),
                ),
                rename("Infectious_Period_Mean", "Infectious_Period_Gaussian_Mean"),
                rename("Infectious_Period_Width", "Infectious_Period_Gaussian_Std_Dev"),
                rename("Base_Infectious_Period", "Infectious_Period_Exponential"),
                rename("Listed_Events", "Custom_Individual_Events"),
                rename(
                    "Immunity_Initialization_Distribution_Type",
                    "Susceptibility_Initialization_Distribution_Type",
                ),
                KeyRule {
                    key: "Enable_Abort_Zero_Infectivity".to_string(),
                    replacement: Some(
                        "Enable_Termination_On_Zero_Total_Infectivity".to_string(),
                    ),
                    sim_types: SimTypeSet::all(),
                    action: KeyRuleAction::RenameOrAdd,
                    default: Some(json!(0)),
                },
                rename(
                    "Enable_Immunity_Distribution",
                    "Enable_Initial_Susceptibility_Distribution",
                ),
                rename(
                    "Enable_Maternal_Transmission",
                    "Enable_Maternal_Infection_Transmission",
                ),
                rename("TB_Active_Period_Std_Dev", "TB_Active_Period_Gaussian_Std_Dev"),
                rename("Reporting_Onset_Delay_Mean", "Reporting_Period_Constant"),
                delete("x_Population_Immunity"),
                delete("Enable_Demographics_Gender"),
                delete("Animal_Reservoir_Type"),
                delete("Environmental_Incubation_Period"),
                delete_for("Typhoid_Environmental_Ramp_Up_Duration", SimType::Typhoid),
                delete_for("Typhoid_Environmental_Ramp_Down_Duration", SimType::Typhoid),
                delete_for("Typhoid_Environmental_Ramp_Duration", SimType::Typhoid),
                delete_for("Typhoid_Environmental_Peak_Start", SimType::Typhoid),
                delete_for("Typhoid_Environmental_Cutoff_Days", SimType::Typhoid),
                delete_for("Typhoid_Carrier_Probability_Male", SimType::Typhoid),
            ],
            values: vec![
                revalue("Infectious_Period_Distribution", "FIXED_DURATION", "CONSTANT_DISTRIBUTION"),
                revalue("Infectious_Period_Distribution", "EXPONENTIAL_DURATION", "EXPONENTIAL_DISTRIBUTION"),
                revalue("Infectious_Period_Distribution", "GAUSSIAN_DURATION", "GAUSSIAN_DISTRIBUTION"),
                revalue("Egg_Hatch_Delay_Distribution", "EXPONENTIAL_DURATION", "EXPONENTIAL_DISTRIBUTION"),
                revalue("Incubation_Period_Distribution", "FIXED_DURATION", "CONSTANT_DISTRIBUTION"),
                revalue("Incubation_Period_Distribution", "GAUSSIAN_DURATION", "GAUSSIAN_DISTRIBUTION"),
                revalue("Incubation_Period_Distribution", "EXPONENTIAL_DURATION", "EXPONENTIAL_DISTRIBUTION"),
                revalue("Incubation_Period_Distribution", "LOG_NORMAL_DURATION", "LOG_NORMAL_DISTRIBUTION"),
                revalue("TB_Active_Period_Distribution", "EXPONENTIAL_DURATION", "EXPONENTIAL_DISTRIBUTION"),
                revalue("Reporting_Period_Distribution", "LOG_NORMAL_DURATION", "LOG_NORMAL_DISTRIBUTION"),
            ],
            additions: vec![
                add("Serialization_Type", json!("NONE")),
                add("Enable_Infectivity_Reservoir", json!(0)),
                add("Custom_Coordinator_Events", json!([])),
                add("Custom_Node_Events", json!([])),
                add("Report_Coordinator_Event_Recorder", json!(0)),
                add("Report_Node_Event_Recorder", json!(0)),
                add("Report_Surveillance_Event_Recorder", json!(0)),
                add_for(
                    "Typhoid_Carrier_Probability",
                    json!(0.5),
                    SimTypeSet::One(SimType::Typhoid),
                ),
                add_for("Environmental_Peak_Start", json!(360), environmental()),
                add_for("Environmental_Ramp_Down_Duration", json!(170), environmental()),
                add_for("Environmental_Ramp_Up_Duration", json!(30), environmental()),
                add_for("Environmental_Cutoff_Days", json!(160), environmental()),
            ],
        }
    }
}

fn rename(key: &str, replacement: &str) -> KeyRule {
    rename_for(key, replacement, SimTypeSet::all())
}

fn rename_for(key: &str, replacement: &str, sim_types: SimTypeSet) -> KeyRule {
    KeyRule {
        key: key.to_string(),
        replacement: Some(replacement.to_string()),
        sim_types,
        action: KeyRuleAction::Rename,
        default: None,
    }
}

fn delete(key: &str) -> KeyRule {
    KeyRule {
        key: key.to_string(),
        replacement: None,
        sim_types: SimTypeSet::all(),
        action: KeyRuleAction::Delete,
        default: None,
    }
}

fn delete_for(key: &str, sim_type: SimType) -> KeyRule {
    KeyRule {
        key: key.to_string(),
        replacement: None,
        sim_types: SimTypeSet::One(sim_type),
        action: KeyRuleAction::Delete,
        default: None,
    }
}

fn revalue(key: &str, from: &str, to: &str) -> ValueRule {
    ValueRule {
        key: key.to_string(),
        from: json!(from),
        to: json!(to),
        sim_types: SimTypeSet::all(),
    }
}

fn add(key: &str, value: Value) -> AddRule {
    add_for(key, value, SimTypeSet::all())
}

fn add_for(key: &str, value: Value, sim_types: SimTypeSet) -> AddRule {
    AddRule {
        key: key.to_string(),
        value,
        sim_types,
    }
}

#[derive(Debug, Clone)]
pub struct MigrateOptions {
    /// Add the target version's new parameters. Off for documents that only
    /// share key names with a config, like demographics overlays.
    pub add_new_parameters: bool,
    /// Rewrite the document with keys in alphabetical order.
    pub sort_keys: bool,
    /// Sim type assumed when the document does not declare one and the file
    /// name gives no hint.
    pub default_sim_type: SimType,
}

impl Default for MigrateOptions {
    fn default() -> Self {
        Self {
            add_new_parameters: false,
            sort_keys: false,
            default_sim_type: SimType::Hiv,
        }
    }
}

/// Sim type of a parsed config: `Simulation_Type` anywhere in the document,
/// else a guess from the file name, else the given default.
pub fn detect_sim_type(root: &Value, path: &Path, default: SimType) -> SimType {
    if let Some(container) = find_key("Simulation_Type", root, 0) {
        if let Some(name) = container.get("Simulation_Type").and_then(Value::as_str) {
            if let Some(sim_type) = SimType::from_name(name) {
                return sim_type;
            }
        }
    }
    SimType::guess_from_file_name(path).unwrap_or(default)
}

/// Applies a rule set to a parsed document. Returns true when the document
/// changed.
pub fn migrate_value(
    root: &mut Value,
    rules: &RuleSet,
    sim_type: SimType,
    add_new_parameters: bool,
) -> bool {
    let mut changed = false;
    if add_new_parameters {
        for rule in &rules.additions {
            if rule.sim_types.contains(sim_type) {
                changed |= add_param(root, &rule.key, rule.value.clone());
            }
        }
    }
    changed |= apply_key_rules(root, &rules.keys, sim_type);
    changed |= apply_value_rules(root, &rules.values, sim_type);
    changed
}

fn apply_key_rules(root: &mut Value, rules: &[KeyRule], sim_type: SimType) -> bool {
    let mut changed = false;
    for rule in rules {
        if !rule.sim_types.contains(sim_type) {
            continue;
        }
        let mut rule_changed = false;
        let mut skip = 0;
        while let Some(container) = find_key_context(&rule.key, root, skip) {
            match rule.action {
                KeyRuleAction::Delete => {
                    container.remove(&rule.key);
                    rule_changed = true;
                }
                KeyRuleAction::Rename | KeyRuleAction::RenameOrAdd => {
                    if let Some(replacement) = rule.replacement.as_deref() {
                        if replacement != rule.key {
                            if let Some(value) = container.remove(&rule.key) {
                                container.insert(replacement.to_string(), value);
                                rule_changed = true;
                            }
                        }
                    }
                }
            }
            if container.contains_key(&rule.key) {
                // nothing consumed this occurrence, look past it
                skip += 1;
            }
        }
        if !rule_changed && rule.action == KeyRuleAction::RenameOrAdd {
            if let Some(replacement) = rule.replacement.as_deref() {
                if find_key(replacement, root, 0).is_none() {
                    let default = rule.default.clone().unwrap_or(Value::Null);
                    rule_changed = add_param(root, replacement, default);
                }
            }
        }
        changed |= rule_changed;
    }
    changed
}

fn apply_value_rules(root: &mut Value, rules: &[ValueRule], sim_type: SimType) -> bool {
    let mut changed = false;
    for rule in rules {
        if !rule.sim_types.contains(sim_type) {
            continue;
        }
        let mut skip = 0;
        while let Some(container) = find_key_context(&rule.key, root, skip) {
            skip += 1;
            if let Some(value) = container.get_mut(&rule.key) {
                if *value == rule.from {
                    *value = rule.to.clone();
                    changed = true;
                }
            }
        }
    }
    changed
}

/// Applies a rule set to one file in place. The file is only rewritten
/// when something changed. Returns true when it was.
pub fn migrate_file(
    path: &Path,
    rules: &RuleSet,
    options: &MigrateOptions,
) -> Result<bool, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let mut root: Value = serde_json::from_str(&text)?;
    let sim_type = detect_sim_type(&root, path, options.default_sim_type);
    debug!(path = %path.display(), %sim_type, "migrating config");

    let changed = migrate_value(&mut root, rules, sim_type, options.add_new_parameters);
    if changed {
        let output = if options.sort_keys {
            util::sorted_json(&root)
        } else {
            root
        };
        std::fs::write(path, util::to_pretty_string(&output)?)?;
    }
    Ok(changed)
}

/// Per-file outcome of a tree migration, each list sorted by path.
#[derive(Debug, Default)]
pub struct MigrateSummary {
    pub changed: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
    /// Files that could not be read or parsed, with the error text.
    pub failed: Vec<(PathBuf, String)>,
}

impl MigrateSummary {
    pub fn total(&self) -> usize {
        self.changed.len() + self.unchanged.len() + self.failed.len()
    }
}

/// Migrates every file under `root_dir` whose name contains `file_name`.
/// A file that fails to read or parse is recorded in the summary rather
/// than aborting the sweep.
pub fn migrate_tree(
    root_dir: &Path,
    file_name: &str,
    rules: &RuleSet,
    options: &MigrateOptions,
) -> Result<MigrateSummary, ConfigError> {
    let mut files = Vec::new();
    collect_config_files(root_dir, file_name, &mut files)?;
    files.sort();

    let outcomes: Vec<(PathBuf, Result<bool, ConfigError>)> = files
        .into_par_iter()
        .map(|path| {
            let outcome = migrate_file(&path, rules, options);
            (path, outcome)
        })
        .collect();

    let mut summary = MigrateSummary::default();
    for (path, outcome) in outcomes {
        match outcome {
            Ok(true) => summary.changed.push(path),
            Ok(false) => summary.unchanged.push(path),
            Err(error) => {
                warn!(path = %path.display(), %error, "config failed to migrate");
                summary.failed.push((path, error.to_string()));
            }
        }
    }
    Ok(summary)
}

fn collect_config_files(
    dir: &Path,
    file_name: &str,
    files: &mut Vec<PathBuf>,
) -> Result<(), ConfigError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_config_files(&path, file_name, files)?;
        } else if entry.file_name().to_string_lossy().contains(file_name) {
            files.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn generic_config() -> Value {
        json!({
            "parameters": {
                "Simulation_Type": "GENERIC_SIM",
                "Base_Population_Scale_Factor": 0.01,
                "Base_Infectious_Period": 4,
                "Infectious_Period_Distribution": "FIXED_DURATION",
                "x_Population_Immunity": 1
            }
        })
    }

    #[test]
    fn test_rename_delete_and_value_rules() {
        let mut config = generic_config();
        let rules = RuleSet::v2_18_to_v2_20();
        assert!(migrate_value(&mut config, &rules, SimType::Generic, false));

        let parameters = &config["parameters"];
        assert_eq!(parameters["x_Base_Population"], 0.01);
        assert!(parameters.get("Base_Population_Scale_Factor").is_none());
        assert_eq!(parameters["Infectious_Period_Exponential"], 4);
        assert_eq!(
            parameters["Infectious_Period_Distribution"],
            "CONSTANT_DISTRIBUTION"
        );
        assert!(parameters.get("x_Population_Immunity").is_none());
    }

    #[test]
    fn test_rename_or_add_renames_when_present() {
        let mut config = json!({"parameters": {"Enable_Abort_Zero_Infectivity": 1}});
        let rules = RuleSet::v2_18_to_v2_20();
        assert!(migrate_value(&mut config, &rules, SimType::Generic, false));
        assert_eq!(
            config["parameters"]["Enable_Termination_On_Zero_Total_Infectivity"],
            1
        );
        assert!(config["parameters"]
            .get("Enable_Abort_Zero_Infectivity")
            .is_none());
    }

    #[test]
    fn test_rename_or_add_adds_default_when_missing() {
        let mut config = json!({"parameters": {"Simulation_Type": "GENERIC_SIM"}});
        let rules = RuleSet::v2_18_to_v2_20();
        assert!(migrate_value(&mut config, &rules, SimType::Generic, false));
        assert_eq!(
            config["parameters"]["Enable_Termination_On_Zero_Total_Infectivity"],
            0
        );
    }

    #[test]
    fn test_rename_applies_to_every_occurrence() {
        let mut config = json!({
            "first": {"Listed_Events": ["a"]},
            "second": {"Listed_Events": ["b"]}
        });
        let rules = RuleSet::v2_18_to_v2_20();
        assert!(migrate_value(&mut config, &rules, SimType::Generic, false));
        assert_eq!(config["first"]["Custom_Individual_Events"], json!(["a"]));
        assert_eq!(config["second"]["Custom_Individual_Events"], json!(["b"]));
    }

    #[test]
    fn test_sim_type_scoping() {
        let mut config = json!({"parameters": {
            "Typhoid_Carrier_Probability_Male": 0.2,
            "Enable_Termination_On_Zero_Total_Infectivity": 0
        }});
        let rules = RuleSet::v2_18_to_v2_20();

        // The typhoid-only delete must not fire for a generic sim.
        assert!(!migrate_value(&mut config, &rules, SimType::Generic, false));
        assert_eq!(config["parameters"]["Typhoid_Carrier_Probability_Male"], 0.2);

        assert!(migrate_value(&mut config, &rules, SimType::Typhoid, false));
        assert!(config["parameters"]
            .get("Typhoid_Carrier_Probability_Male")
            .is_none());
    }

    #[test]
    fn test_additions_respect_sim_type() {
        let rules = RuleSet::v2_18_to_v2_20();

        let mut generic = json!({"parameters": {}});
        migrate_value(&mut generic, &rules, SimType::Generic, true);
        assert_eq!(generic["parameters"]["Serialization_Type"], "NONE");
        assert!(generic["parameters"]
            .get("Typhoid_Carrier_Probability")
            .is_none());
        assert!(generic["parameters"].get("Environmental_Peak_Start").is_none());

        let mut typhoid = json!({"parameters": {}});
        migrate_value(&mut typhoid, &rules, SimType::Typhoid, true);
        assert_eq!(typhoid["parameters"]["Typhoid_Carrier_Probability"], 0.5);
        assert_eq!(typhoid["parameters"]["Environmental_Peak_Start"], 360);
    }

    #[test]
    fn test_additions_do_not_overwrite() {
        let rules = RuleSet::v2_18_to_v2_20();
        let mut config = json!({"parameters": {"Serialization_Type": "TIMESTEP"}});
        migrate_value(&mut config, &rules, SimType::Generic, true);
        assert_eq!(config["parameters"]["Serialization_Type"], "TIMESTEP");
    }

    #[test]
    fn test_detect_sim_type_precedence() {
        let declared = json!({"parameters": {"Simulation_Type": "VECTOR_SIM"}});
        assert_eq!(
            detect_sim_type(&declared, Path::new("tb_config.json"), SimType::Hiv),
            SimType::Vector
        );

        let empty = json!({});
        assert_eq!(
            detect_sim_type(&empty, Path::new("malaria_config.json"), SimType::Hiv),
            SimType::Malaria
        );
        assert_eq!(
            detect_sim_type(&empty, Path::new("config.json"), SimType::Hiv),
            SimType::Hiv
        );
    }

    #[test]
    fn test_migrate_file_rewrites_only_on_change() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let settled = r#"{"parameters": {"Enable_Termination_On_Zero_Total_Infectivity": 0}}"#;
        std::fs::write(&path, settled).unwrap();

        let rules = RuleSet::v2_18_to_v2_20();
        let options = MigrateOptions::default();
        assert!(!migrate_file(&path, &rules, &options).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), settled);

        std::fs::write(
            &path,
            r#"{"parameters": {"Simulation_Type": "GENERIC_SIM", "Listed_Events": []}}"#,
        )
        .unwrap();
        assert!(migrate_file(&path, &rules, &options).unwrap());
        let migrated: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(migrated["parameters"]["Custom_Individual_Events"], json!([]));
    }

    #[test]
    fn test_migrate_tree_matches_names_and_recurses() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        let top = dir.path().join("config.json");
        let nested = dir.path().join("nested/test_config.json");
        let other = dir.path().join("nested/campaign.json");
        for path in [&top, &nested] {
            std::fs::write(path, r#"{"parameters": {"Listed_Events": []}}"#).unwrap();
        }
        std::fs::write(&other, r#"{"parameters": {"Listed_Events": []}}"#).unwrap();

        let rules = RuleSet::v2_18_to_v2_20();
        let options = MigrateOptions::default();
        let summary = migrate_tree(dir.path(), "config.json", &rules, &options).unwrap();
        assert_eq!(summary.changed, vec![top.clone(), nested.clone()]);
        assert!(summary.unchanged.is_empty());
        assert!(summary.failed.is_empty());

        // Files not matching the name filter are untouched.
        let untouched: Value =
            serde_json::from_str(&std::fs::read_to_string(&other).unwrap()).unwrap();
        assert!(untouched["parameters"].get("Listed_Events").is_some());

        // A second sweep finds nothing left to do.
        let again = migrate_tree(dir.path(), "config.json", &rules, &options).unwrap();
        assert!(again.changed.is_empty());
        assert_eq!(again.unchanged, vec![top, nested]);
    }

    #[test]
    fn test_migrate_tree_records_unparseable_files() {
        let dir = tempdir().unwrap();
        let broken = dir.path().join("broken_config.json");
        std::fs::write(&broken, "not json").unwrap();
        let good = dir.path().join("config.json");
        std::fs::write(&good, r#"{"parameters": {"Listed_Events": []}}"#).unwrap();

        let rules = RuleSet::v2_18_to_v2_20();
        let options = MigrateOptions::default();
        let summary = migrate_tree(dir.path(), "config.json", &rules, &options).unwrap();
        assert_eq!(summary.changed, vec![good]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, broken);
        assert_eq!(summary.total(), 2);
    }

    #[test]
    fn test_sorted_rewrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"parameters": {"Zeta": 1, "Listed_Events": []}}"#).unwrap();

        let rules = RuleSet::v2_18_to_v2_20();
        let options = MigrateOptions {
            sort_keys: true,
            ..MigrateOptions::default()
        };
        assert!(migrate_file(&path, &rules, &options).unwrap());
        let text = std::fs::read_to_string(&path).unwrap();
        let custom = text.find("Custom_Individual_Events").unwrap();
        let zeta = text.find("Zeta").unwrap();
        assert!(custom < zeta);
    }

    #[test]
    fn test_rule_set_from_json() {
        let text = r#"{
            "keys": [
                {"key": "Old_Name", "replacement": "New_Name", "sim_types": "ALL", "action": "rename"},
                {"key": "Gone", "sim_types": ["TYPHOID_SIM", "POLIO_SIM"], "action": "delete"}
            ],
            "values": [
                {"key": "Mode", "from": "A", "to": "B", "sim_types": "GENERIC_SIM"}
            ]
        }"#;
        let rules: RuleSet = serde_json::from_str(text).unwrap();
        assert_eq!(rules.keys.len(), 2);
        assert!(rules.keys[0].sim_types.contains(SimType::Dengue));
        assert!(rules.keys[1].sim_types.contains(SimType::Polio));
        assert!(!rules.keys[1].sim_types.contains(SimType::Generic));
        assert!(rules.additions.is_empty());

        let mut config = json!({"Old_Name": 7, "Gone": true});
        assert!(migrate_value(&mut config, &rules, SimType::Typhoid, false));
        assert_eq!(config, json!({"New_Name": 7}));
    }
}
