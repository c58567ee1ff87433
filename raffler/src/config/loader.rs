//! Configuration loader
//!
//! Loading pipeline:
//! 1. Size check and read
//! 2. YAML parsing into [`RafflerConfig`]
//! 3. Environment overrides (`RAFFLER_DATA_DIR`, `RAFFLER_MAX_TICKET_WEIGHT`, `RAFFLER_SEED`)
//! 4. Validation
//! 5. Freeze with `Arc`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::schema::RafflerConfig;
use crate::config::validation::Validator;
use crate::error::ConfigError;

// ============================================================================
// Public API
// ============================================================================

/// Options for the configuration loader.
#[derive(Debug, Clone, Default)]
pub struct LoaderOptions {
    /// Limits for configuration values.
    pub config_limits: ConfigLimits,

    /// Skip environment overrides (used by `raffler validate`).
    pub ignore_env: bool,
}

/// Hard limits for configuration values.
#[derive(Debug, Clone)]
pub struct ConfigLimits {
    /// Maximum chain length (phase 1 plus configured follow-up phases).
    pub max_phases: usize,

    /// Maximum allowed ticket weight cap.
    pub max_ticket_weight: u32,

    /// Maximum configuration file size in bytes.
    pub max_config_size: usize,
}

impl Default for ConfigLimits {
    fn default() -> Self {
        Self {
            max_phases: env_or("RAFFLER_MAX_PHASES", 16),
            max_ticket_weight: env_or("RAFFLER_TICKET_WEIGHT_LIMIT", 1000),
            max_config_size: env_or("RAFFLER_MAX_CONFIG_SIZE", 1024 * 1024),
        }
    }
}

/// Result of loading a configuration file.
#[derive(Debug)]
pub struct LoadResult {
    /// The loaded and validated configuration.
    pub config: Arc<RafflerConfig>,

    /// Warnings encountered during loading.
    pub warnings: Vec<LoadWarning>,
}

/// Warning during configuration loading.
#[derive(Debug, Clone)]
pub struct LoadWarning {
    /// Warning message.
    pub message: String,

    /// Location where the warning occurred.
    pub location: Option<String>,
}

/// Configuration loader.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: LoaderOptions,
}

impl ConfigLoader {
    /// Creates a new configuration loader with the given options.
    #[must_use]
    pub const fn new(options: LoaderOptions) -> Self {
        Self { options }
    }

    /// Creates a new configuration loader with default options.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(LoaderOptions::default())
    }

    /// Loads a configuration file and returns the frozen configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file doesn't exist or exceeds the size limit
    /// - The YAML is invalid or has unknown fields
    /// - Validation fails
    pub fn load(&self, path: &Path) -> Result<LoadResult, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;
        self.load_str(&content, path)
    }

    /// Loads configuration from an in-memory YAML document.
    ///
    /// `origin` is only used for error messages.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load), minus the missing-file case.
    pub fn load_str(&self, content: &str, origin: &Path) -> Result<LoadResult, ConfigError> {
        let limits = &self.options.config_limits;
        if content.len() > limits.max_config_size {
            return Err(ConfigError::ParseError {
                path: origin.to_path_buf(),
                line: None,
                message: format!(
                    "configuration is {} bytes, limit is {}",
                    content.len(),
                    limits.max_config_size
                ),
            });
        }

        let mut config: RafflerConfig = if content.trim().is_empty() {
            RafflerConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
                path: origin.to_path_buf(),
                line: e.location().map(|l| l.line()),
                message: e.to_string(),
            })?
        };

        let mut warnings = Vec::new();
        if !self.options.ignore_env {
            warnings.extend(apply_overrides(&mut config, |name| std::env::var(name).ok()));
        }

        let result = Validator::new().validate(&config, limits);
        if result.has_errors() {
            return Err(ConfigError::ValidationError {
                path: origin.display().to_string(),
                errors: result.errors,
            });
        }

        warnings.extend(result.warnings.into_iter().map(|issue| LoadWarning {
            message: issue.message,
            location: Some(issue.path),
        }));

        Ok(LoadResult {
            config: Arc::new(config),
            warnings,
        })
    }

    /// Returns a validated default configuration with environment overrides.
    ///
    /// Used when no `--config` was given.
    ///
    /// # Errors
    ///
    /// Returns an error if an environment override produces an invalid config.
    pub fn defaults(&self) -> Result<LoadResult, ConfigError> {
        self.load_str("", Path::new("<defaults>"))
    }
}

// ============================================================================
// Environment Overrides
// ============================================================================

/// Applies `RAFFLER_*` overrides using `lookup` to read variables.
///
/// Unparseable values are ignored with a warning rather than failing the
/// load.
fn apply_overrides(
    config: &mut RafflerConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Vec<LoadWarning> {
    let mut warnings = Vec::new();

    if let Some(dir) = lookup("RAFFLER_DATA_DIR") {
        config.store.path = PathBuf::from(dir);
    }

    if let Some(raw) = lookup("RAFFLER_MAX_TICKET_WEIGHT") {
        match raw.parse() {
            Ok(cap) => config.scheduler.max_ticket_weight = cap,
            Err(_) => warnings.push(LoadWarning {
                message: format!("ignoring RAFFLER_MAX_TICKET_WEIGHT='{raw}': not a number"),
                location: Some("scheduler.max_ticket_weight".to_string()),
            }),
        }
    }

    if let Some(raw) = lookup("RAFFLER_SEED") {
        match raw.parse() {
            Ok(seed) => config.scheduler.seed = Some(seed),
            Err(_) => warnings.push(LoadWarning {
                message: format!("ignoring RAFFLER_SEED='{raw}': not a number"),
                location: Some("scheduler.seed".to_string()),
            }),
        }
    }

    warnings
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
