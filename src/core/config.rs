use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use super::scope::ScopeManager;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub general: GeneralConfig,
    pub target: TargetDefaults,
    pub analyzer: AnalyzerConfig,
    pub calibrator: CalibratorConfig,
    #[serde(skip)]
    pub scope: Arc<ScopeManager>,
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub name: String,
    pub description: String,
}

/// Defaults for the injected endpoint, used when a command omits `--url`/`--template`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetDefaults {
    pub param: String,
    pub payload_template: String,
    pub request_timeout_secs: u64,
}

/// Knobs for the Welch's-t-test timing analyzer (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    pub confidence_level: f64,
    pub min_samples: usize,
    pub oracle_samples: usize,
}

/// Knobs for the adaptive delay calibrator (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibratorConfig {
    pub min_delay_secs: f64,
    pub max_delay_secs: f64,
    pub step_secs: f64,
    pub detection_factor: f64,
    pub fallback_delay_secs: f64,
    pub default_workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub log_path: String,
    pub retention_days: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConfigFile {
    general: GeneralConfig,
    target: TargetDefaults,
    analyzer: AnalyzerConfig,
    calibrator: CalibratorConfig,
    scope: ScopeConfig,
    audit: AuditConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct ScopeConfig {
    authorized_targets: Vec<String>,
}

impl Config {
    /// Load config from file, or use defaults if file doesn't exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // If config file doesn't exist, use defaults
        if !path.exists() {
            return Ok(Self::default());
        }

        // Try to load the config file
        Self::load(path)
    }

    /// Load config from file (fails if file doesn't exist)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config_file: ConfigFile =
            toml::from_str(&contents).context("Failed to parse config file")?;

        let scope = Arc::new(ScopeManager::new(config_file.scope.authorized_targets));

        Ok(Config {
            general: config_file.general,
            target: config_file.target,
            analyzer: config_file.analyzer,
            calibrator: config_file.calibrator,
            scope,
            audit: config_file.audit,
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let config_file = ConfigFile {
            general: self.general.clone(),
            target: self.target.clone(),
            analyzer: self.analyzer.clone(),
            calibrator: self.calibrator.clone(),
            scope: ScopeConfig {
                authorized_targets: self.scope.list_targets(),
            },
            audit: self.audit.clone(),
        };

        let contents =
            toml::to_string_pretty(&config_file).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}

impl Default for ScopeManager {
    fn default() -> Self {
        ScopeManager::new(vec![])
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            general: GeneralConfig {
                name: "chronosqli Project".to_string(),
                description: "Time-based blind SQL injection extraction session".to_string(),
            },
            target: TargetDefaults {
                param: "id".to_string(),
                payload_template: "' OR ({condition}) -- -".to_string(),
                request_timeout_secs: 30,
            },
            analyzer: AnalyzerConfig {
                confidence_level: 0.95,
                min_samples: 5,
                oracle_samples: 7,
            },
            calibrator: CalibratorConfig {
                min_delay_secs: 0.5,
                max_delay_secs: 5.0,
                step_secs: 0.5,
                detection_factor: 1.5,
                fallback_delay_secs: 1.0,
                default_workers: 4,
            },
            scope: Arc::new(ScopeManager::new(vec![])),
            audit: AuditConfig {
                log_path: "logs/audit.jsonl".to_string(),
                retention_days: 90,
            },
        }
    }
}
