//! Suite parser for loading suite files.
//!
//! This module handles loading suites from YAML files, resolving scenario
//! targets against the suite's directory, and applying environment
//! overrides.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, HarnessError, Result};

use super::spec::SuiteConfig;

/// Environment variable naming the suite file.
pub const SUITE_ENV_VAR: &str = "PLAN_HARNESS_SUITE";

/// Suite parser.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new suite parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads a suite from a YAML file.
    ///
    /// Relative targets resolve against the file's directory unless a base
    /// path was set.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<SuiteConfig> {
        let path = path.as_ref();
        info!("Loading suite from: {}", path.display());

        if !path.exists() {
            return Err(HarnessError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        let mut suite = self.parse_yaml(&content, Some(path))?;

        let base = self
            .base_path
            .clone()
            .or_else(|| path.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        Self::resolve_targets(&mut suite, &base);

        Ok(suite)
    }

    /// Parses a suite from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<SuiteConfig> {
        debug!("Parsing YAML suite");

        let suite: SuiteConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = e
                .location()
                .map(|l| format!("line {}, column {}", l.line(), l.column()))
                .or_else(|| source.map(|p| p.display().to_string()));
            HarnessError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!("Parsed suite with {} scenarios", suite.scenarios.len());
        Ok(suite)
    }

    /// Loads a suite with environment variable overrides.
    ///
    /// Recognized variables: `PLAN_HARNESS_ENGINE_BINARY`,
    /// `PLAN_HARNESS_PARALLELISM`, `PLAN_HARNESS_TIMEOUT_SECS`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or an override is not a
    /// number.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<SuiteConfig> {
        let mut suite = self.load_file(path)?;
        Self::apply_overrides(&mut suite, |name| std::env::var(name).ok())?;
        Ok(suite)
    }

    /// Applies overrides from a variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric override does not parse.
    pub fn apply_overrides(
        suite: &mut SuiteConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<()> {
        if let Some(binary) = lookup("PLAN_HARNESS_ENGINE_BINARY") {
            debug!("Overriding engine.binary from environment");
            suite.engine.binary = binary;
        }

        if let Some(value) = lookup("PLAN_HARNESS_PARALLELISM") {
            debug!("Overriding engine.parallelism from environment");
            suite.engine.parallelism = parse_number("PLAN_HARNESS_PARALLELISM", &value)?;
        }

        if let Some(value) = lookup("PLAN_HARNESS_TIMEOUT_SECS") {
            debug!("Overriding engine.timeout_secs from environment");
            suite.engine.timeout_secs = parse_number("PLAN_HARNESS_TIMEOUT_SECS", &value)?;
        }

        Ok(())
    }

    /// Loads the .env file if present (provider credentials).
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                HarnessError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    fn resolve_targets(suite: &mut SuiteConfig, base: &Path) {
        for scenario in &mut suite.scenarios {
            if scenario.target.is_relative() {
                let joined = base.join(&scenario.target);
                scenario.target = std::path::absolute(&joined).unwrap_or(joined);
            }
        }
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        HarnessError::Config(ConfigError::validation(
            format!("{name} must be a positive integer, got '{value}'"),
            name,
        ))
    })
}

/// Default suite file names to search for.
pub const DEFAULT_SUITE_FILES: &[&str] = &["plan-harness.yaml", "plan-harness.yml", "harness.yaml"];

/// Finds the suite file in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no suite file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_SUITE_FILES {
            let suite_path = current.join(filename);
            if suite_path.exists() {
                info!("Found suite file: {}", suite_path.display());
                return Ok(suite_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(HarnessError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_SUITE_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SUITE: &str = r"
scenarios:
  - name: basic
    target: modules/cosmosdb
    vars:
      location: westeurope
  - name: absolute
    target: /srv/modules/cosmosdb
";

    #[test]
    fn test_parse_minimal_suite() {
        let parser = ConfigParser::new();
        let suite = parser.parse_yaml("scenarios: []\n", None).unwrap();
        assert!(suite.scenarios.is_empty());
        assert_eq!(suite.engine.binary, "terraform");
    }

    #[test]
    fn test_parse_error_has_location() {
        let parser = ConfigParser::new();
        let err = parser.parse_yaml("scenarios:\n  - name: [unclosed\n", Some(Path::new("suite.yaml"))).unwrap_err();
        match err {
            HarnessError::Config(ConfigError::ParseError { location, .. }) => assert!(location.is_some()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_file_resolves_relative_targets() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plan-harness.yaml");
        std::fs::write(&path, SUITE).unwrap();

        let suite = ConfigParser::new().load_file(&path).unwrap();
        assert_eq!(suite.scenarios[0].target, dir.path().join("modules/cosmosdb"));
        assert_eq!(suite.scenarios[1].target, PathBuf::from("/srv/modules/cosmosdb"));
    }

    #[test]
    fn test_relative_suite_dir_gives_absolute_targets() {
        let mut suite = ConfigParser::new().parse_yaml(SUITE, None).unwrap();
        ConfigParser::resolve_targets(&mut suite, Path::new("./suites"));

        let target = &suite.scenarios[0].target;
        assert!(target.is_absolute());
        assert!(target.ends_with("suites/modules/cosmosdb"));
    }

    #[test]
    fn test_demo_suite_parses_and_validates() {
        use crate::assertions::Assertion;
        use crate::config::ConfigValidator;

        let suite = ConfigParser::new()
            .parse_yaml(include_str!("../../demos/plan-harness.yaml"), None)
            .unwrap();
        ConfigValidator::default().validate(&suite).unwrap();

        let exists = |name: &str| -> Vec<String> {
            let scenario = suite.scenarios.iter().find(|s| s.name == name).unwrap();
            scenario
                .assertions
                .iter()
                .filter_map(|a| match a {
                    Assertion::AddressExists(address) => Some(address.clone()),
                    _ => None,
                })
                .collect()
        };

        let mongodb = exists("mongodb");
        assert_eq!(mongodb.len(), 3);
        assert!(mongodb.contains(&String::from("azurerm_cosmosdb_mongo_collection.mongo_collections")));

        let secure = suite
            .scenarios
            .iter()
            .find(|s| s.vars.contains_key("private_endpoints"))
            .unwrap();
        let secure = exists(&secure.name);
        assert!(secure.contains(&String::from("azurerm_cosmosdb_sql_database.sql_databases")));
        assert!(secure.contains(&String::from("azurerm_cosmosdb_sql_container.sql_containers")));
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigParser::new().load_file("/nonexistent/plan-harness.yaml").unwrap_err();
        assert!(matches!(err, HarnessError::Config(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_overrides() {
        let mut suite = ConfigParser::new().parse_yaml(SUITE, None).unwrap();
        ConfigParser::apply_overrides(&mut suite, |name| match name {
            "PLAN_HARNESS_ENGINE_BINARY" => Some(String::from("tofu")),
            "PLAN_HARNESS_PARALLELISM" => Some(String::from("8")),
            _ => None,
        })
        .unwrap();
        assert_eq!(suite.engine.binary, "tofu");
        assert_eq!(suite.engine.parallelism, 8);

        let err = ConfigParser::apply_overrides(&mut suite, |name| {
            (name == "PLAN_HARNESS_TIMEOUT_SECS").then(|| String::from("soon"))
        })
        .unwrap_err();
        assert!(matches!(err, HarnessError::Config(ConfigError::ValidationError { .. })));
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("tests").join("unit");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("harness.yaml"), "scenarios: []\n").unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, dir.path().join("harness.yaml"));
    }
}
