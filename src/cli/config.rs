// ABOUTME: Configuration management for the taskseq CLI
// ABOUTME: Loads settings from a YAML file and applies TASKSEQ_* environment overrides

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_MAX_PARALLELISM: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,

    #[serde(default)]
    pub parallel: bool,

    /// Extra variables merged into every run. `--var` values win over these.
    #[serde(default)]
    pub variables: IndexMap<String, String>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_max_parallelism() -> usize {
    DEFAULT_MAX_PARALLELISM
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "pretty".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_parallelism: DEFAULT_MAX_PARALLELISM,
            parallel: false,
            variables: IndexMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

impl Config {
    /// Load configuration from an explicit path or the standard locations, then apply
    /// environment overrides. A missing file yields the defaults.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut config = match path.or_else(Self::find_config_file) {
            Some(config_path) if config_path.exists() => Self::from_file(&config_path)?,
            _ => Config::default(),
        };

        config.merge_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    fn find_config_file() -> Option<PathBuf> {
        let local = [
            "taskseq.yaml",
            "taskseq.yml",
            ".taskseq.yaml",
            ".taskseq.yml",
        ]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists());

        local.or_else(|| {
            dirs::home_dir()
                .map(|home| home.join(".taskseq").join("config.yaml"))
                .filter(|path| path.exists())
        })
    }

    /// Apply `TASKSEQ_*` overrides read through `lookup`.
    pub fn merge_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("TASKSEQ_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("TASKSEQ_LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Some(max) = lookup("TASKSEQ_MAX_PARALLELISM") {
            self.max_parallelism = max
                .trim()
                .parse()
                .with_context(|| format!("TASKSEQ_MAX_PARALLELISM must be a number, got '{}'", max))?;
        }
        if let Some(parallel) = lookup("TASKSEQ_PARALLEL") {
            self.parallel = match parallel.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                other => anyhow::bail!("TASKSEQ_PARALLEL must be true or false, got '{}'", other),
            };
        }
        Ok(())
    }

    /// Merge command-line variables over the configured ones.
    pub fn merge_variables(&mut self, vars: IndexMap<String, String>) {
        self.variables.extend(vars);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_parallelism, 4);
        assert!(!config.parallel);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_load_from_file_keeps_missing_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("taskseq.yaml");
        std::fs::write(
            &path,
            "parallel: true\nvariables:\n  OSDComputerName: LAB-01\nlogging:\n  level: debug\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert!(config.parallel);
        assert_eq!(config.max_parallelism, 4);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(
            config.variables.get("OSDComputerName").map(String::as_str),
            Some("LAB-01")
        );
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("TASKSEQ_LOG_LEVEL", "trace"),
            ("TASKSEQ_LOG_FORMAT", "compact"),
            ("TASKSEQ_MAX_PARALLELISM", "8"),
            ("TASKSEQ_PARALLEL", "Yes"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .merge_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.logging.level, "trace");
        assert_eq!(config.logging.format, "compact");
        assert_eq!(config.max_parallelism, 8);
        assert!(config.parallel);
    }

    #[test]
    fn test_invalid_env_override() {
        let mut config = Config::default();
        let result = config.merge_env(|key| {
            (key == "TASKSEQ_MAX_PARALLELISM").then(|| "many".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_variables_win() {
        let mut config = Config::default();
        config.variables.insert("Env".into(), "lab".into());

        let mut cli = IndexMap::new();
        cli.insert("Env".to_string(), "prod".to_string());
        config.merge_variables(cli);

        assert_eq!(config.variables.get("Env").map(String::as_str), Some("prod"));
    }
}
