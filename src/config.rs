//! Configuration
//!
//! Read from:
//! - `.vacuum.yaml` / `.vacuum.yml` / `.vacuum.json` (project-level)
//! - the same names in the home directory (user-level)

use crate::model::Severity;
use crate::motor::{RuleSetExecution, DEFAULT_RULE_TIMEOUT};
use crate::rulesets::{RuleSet, RuleSets};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const MAX_DEPTH: usize = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of workers (0 = one per CPU)
    pub jobs: usize,

    /// Deadline for a whole run in milliseconds (0 = none)
    pub timeout_ms: u64,

    /// Budget per rule in milliseconds
    pub rule_timeout_ms: u64,

    /// Skip remote references and double the workers
    pub turbo: bool,

    pub skip_circular_references: bool,

    pub silent: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            jobs: 0,
            timeout_ms: 0,
            rule_timeout_ms: DEFAULT_RULE_TIMEOUT.as_millis() as u64,
            turbo: false,
            skip_circular_references: false,
            silent: false,
        }
    }
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Spectral,
    Junit,
    Report,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "spectral" => Ok(OutputFormat::Spectral),
            "junit" => Ok(OutputFormat::Junit),
            "report" => Ok(OutputFormat::Report),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// Color mode options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Auto,
    Always,
    Never,
}

/// Output settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,

    pub color: ColorMode,

    /// Show how-to-fix text and documentation links
    pub details: bool,
}

/// Which built-in rules a run starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RulePreset {
    #[default]
    Recommended,
    All,
    Owasp,
    Off,
}

/// Rule configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub preset: RulePreset,

    /// Rule set file, replacing the preset
    pub ruleset: Option<PathBuf>,

    /// Directory of JavaScript functions
    pub functions: Option<PathBuf>,

    /// Disabled rules
    pub disabled: Vec<String>,

    /// Severity overrides (rule_id -> severity)
    pub severity: HashMap<String, Severity>,

    /// Ignore file (rule id -> JSONPaths)
    pub ignore_file: Option<PathBuf>,
}

/// Narrowing results to a diff
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Diff report whose changed regions results are narrowed to
    pub changes_file: Option<PathBuf>,

    /// Only report breaking changes as violations
    pub breaking_only: bool,

    /// Report the changes themselves as violations
    pub changes_as_violations: bool,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Other configuration files or presets
    pub extends: Vec<String>,

    pub engine: EngineConfig,

    pub output: OutputConfig,

    pub rules: RulesConfig,

    pub filter: FilterConfig,
}

/// Engine settings resolved for one run
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOptions {
    pub jobs: usize,
    pub timeout: Option<Duration>,
    pub rule_timeout: Duration,
    pub turbo: bool,
    pub silent: bool,
    pub skip_circular_references: bool,
}

impl ExecutionOptions {
    pub fn apply(&self, execution: RuleSetExecution) -> RuleSetExecution {
        let mut execution = execution.with_jobs(self.jobs).with_rule_timeout(self.rule_timeout);
        if let Some(timeout) = self.timeout {
            execution = execution.with_timeout(timeout);
        }
        if self.turbo {
            execution = execution.turbo();
        }
        if self.silent {
            execution = execution.silent();
        }
        if self.skip_circular_references {
            execution = execution.skip_circular_references();
        }
        execution
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// A preset configuration by name
    pub fn preset(name: &str) -> Option<Self> {
        let preset = match name {
            "recommended" => RulePreset::Recommended,
            "all" => RulePreset::All,
            "owasp" => RulePreset::Owasp,
            "off" => RulePreset::Off,
            _ => return None,
        };
        let mut config = Self::default();
        config.rules.preset = preset;
        Some(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with_depth(path, 0)
    }

    fn load_with_depth(path: &Path, depth: usize) -> Result<Self, ConfigError> {
        if depth >= MAX_DEPTH {
            return Err(ConfigError::Invalid(
                "Maximum config inheritance depth exceeded".to_string(),
            ));
        }

        let content = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let mut config: Self = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "Unknown config file format: {}",
                    ext
                )))
            }
        };

        let base_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(base_dir);

        if !config.extends.is_empty() {
            let mut base = Self::default();
            for extend in &config.extends {
                let extended = match Self::preset(extend) {
                    Some(preset) => preset,
                    None => {
                        let extend_path = if Path::new(extend).is_absolute() {
                            PathBuf::from(extend)
                        } else {
                            base_dir.join(extend)
                        };
                        Self::load_with_depth(&extend_path, depth + 1)?
                    }
                };
                base.merge(extended);
            }
            base.merge(config);
            config = base;
        }

        Ok(config)
    }

    /// Relative file settings are relative to the file that names them
    fn resolve_paths(&mut self, base_dir: &Path) {
        let fields = [
            &mut self.rules.ruleset,
            &mut self.rules.functions,
            &mut self.rules.ignore_file,
            &mut self.filter.changes_file,
        ];
        for field in fields {
            if let Some(path) = field.as_mut() {
                if path.is_relative() {
                    *path = base_dir.join(&*path);
                }
            }
        }
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: Self) {
        let defaults = EngineConfig::default();
        if other.engine.jobs != defaults.jobs {
            self.engine.jobs = other.engine.jobs;
        }
        if other.engine.timeout_ms != defaults.timeout_ms {
            self.engine.timeout_ms = other.engine.timeout_ms;
        }
        if other.engine.rule_timeout_ms != defaults.rule_timeout_ms {
            self.engine.rule_timeout_ms = other.engine.rule_timeout_ms;
        }
        self.engine.turbo |= other.engine.turbo;
        self.engine.skip_circular_references |= other.engine.skip_circular_references;
        self.engine.silent |= other.engine.silent;

        if other.output.format != OutputFormat::Text {
            self.output.format = other.output.format;
        }
        if other.output.color != ColorMode::Auto {
            self.output.color = other.output.color;
        }
        self.output.details |= other.output.details;

        if other.rules.preset != RulePreset::Recommended {
            self.rules.preset = other.rules.preset;
        }
        if other.rules.ruleset.is_some() {
            self.rules.ruleset = other.rules.ruleset;
        }
        if other.rules.functions.is_some() {
            self.rules.functions = other.rules.functions;
        }
        if other.rules.ignore_file.is_some() {
            self.rules.ignore_file = other.rules.ignore_file;
        }
        for rule in other.rules.disabled {
            if !self.rules.disabled.contains(&rule) {
                self.rules.disabled.push(rule);
            }
        }
        self.rules.severity.extend(other.rules.severity);

        if other.filter.changes_file.is_some() {
            self.filter.changes_file = other.filter.changes_file;
        }
        self.filter.breaking_only |= other.filter.breaking_only;
        self.filter.changes_as_violations |= other.filter.changes_as_violations;
    }

    /// Load configuration from default locations
    pub fn load_default() -> Result<Self, ConfigError> {
        let config_names = [".vacuum.yaml", ".vacuum.yml", ".vacuum.json"];

        for name in &config_names {
            let path = PathBuf::from(name);
            if path.exists() {
                return Self::load(&path);
            }
        }

        if let Some(home) = dirs::home_dir() {
            for name in &config_names {
                let path = home.join(name);
                if path.exists() {
                    return Self::load(&path);
                }
            }
        }

        Ok(Self::default())
    }

    pub fn to_execution_options(&self) -> ExecutionOptions {
        ExecutionOptions {
            jobs: self.engine.jobs,
            timeout: (self.engine.timeout_ms > 0).then(|| Duration::from_millis(self.engine.timeout_ms)),
            rule_timeout: Duration::from_millis(self.engine.rule_timeout_ms),
            turbo: self.engine.turbo,
            silent: self.engine.silent || self.engine.turbo,
            skip_circular_references: self.engine.skip_circular_references,
        }
    }

    /// The built-in rule set named by the preset
    pub fn base_rule_set(&self, sets: &RuleSets) -> RuleSet {
        match self.rules.preset {
            RulePreset::Recommended => sets.generate_openapi_recommended_rule_set(),
            RulePreset::All => sets.generate_openapi_default_rule_set(),
            RulePreset::Owasp => sets.generate_owasp_rule_set(),
            RulePreset::Off => RuleSet::default(),
        }
    }

    pub fn is_rule_enabled(&self, rule_id: &str) -> bool {
        !self.rules.disabled.iter().any(|r| r == rule_id)
    }

    pub fn get_severity_override(&self, rule_id: &str) -> Option<Severity> {
        self.rules.severity.get(rule_id).copied()
    }

    /// Remove disabled rules and apply severity overrides
    pub fn apply_rule_overrides(&self, rule_set: &mut RuleSet) {
        rule_set.rules.retain(|id, _| self.is_rule_enabled(id));
        for (id, rule) in rule_set.rules.iter_mut() {
            if let Some(severity) = self.get_severity_override(id) {
                rule.severity = severity;
            }
        }
    }
}
