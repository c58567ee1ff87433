//! Configuration validation
//!
//! Semantic checks on a fully deserialized [`RafflerConfig`]. Validation
//! collects ALL issues (doesn't stop at the first) so a single run of
//! `raffler validate` reports everything that needs fixing.

use std::time::Duration;

use crate::config::loader::ConfigLimits;
use crate::config::schema::{ChainConfig, RafflerConfig, StoreKind};
use crate::error::{Severity, ValidationIssue};

// ============================================================================
// Public API
// ============================================================================

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Validation errors (prevent loading).
    pub errors: Vec<ValidationIssue>,

    /// Validation warnings (informational).
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Returns `true` if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns `true` if validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Configuration validator.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Validator {
    /// Creates a new validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a configuration and returns every issue found.
    pub fn validate(&mut self, config: &RafflerConfig, limits: &ConfigLimits) -> ValidationResult {
        self.errors.clear();
        self.warnings.clear();

        self.validate_scheduler(config, limits);
        self.validate_store(config);
        self.validate_chain(&config.chain, limits);

        ValidationResult {
            errors: std::mem::take(&mut self.errors),
            warnings: std::mem::take(&mut self.warnings),
        }
    }

    // ========================================================================
    // Sections
    // ========================================================================

    fn validate_scheduler(&mut self, config: &RafflerConfig, limits: &ConfigLimits) {
        let scheduler = &config.scheduler;

        if scheduler.status_interval.get().is_zero() {
            self.add_error(
                "scheduler.status_interval",
                "status interval must be greater than zero",
            );
        } else if scheduler.status_interval.get() < Duration::from_secs(1) {
            self.add_warning(
                "scheduler.status_interval",
                "status refreshes more than once per second may hit presentation rate limits",
            );
        }

        if scheduler.max_ticket_weight == 0 {
            self.add_error(
                "scheduler.max_ticket_weight",
                "ticket weight cap must be at least 1",
            );
        } else if scheduler.max_ticket_weight > limits.max_ticket_weight {
            self.add_error(
                "scheduler.max_ticket_weight",
                &format!(
                    "ticket weight cap {} exceeds limit {}",
                    scheduler.max_ticket_weight, limits.max_ticket_weight
                ),
            );
        }

        if scheduler.join_cooldown.get() > Duration::from_secs(60 * 60) {
            self.add_warning(
                "scheduler.join_cooldown",
                "join cooldown longer than an hour effectively locks actors out",
            );
        }
    }

    fn validate_store(&mut self, config: &RafflerConfig) {
        match config.store.kind {
            StoreKind::File if config.store.path.as_os_str().is_empty() => {
                self.add_error("store.path", "file store requires a data directory");
            }
            StoreKind::Memory => {
                self.add_warning(
                    "store.kind",
                    "memory store loses every active entity on restart",
                );
            }
            StoreKind::File => {}
        }
    }

    fn validate_chain(&mut self, chain: &ChainConfig, limits: &ConfigLimits) {
        if chain.phases.len() + 1 > limits.max_phases {
            self.add_error(
                "chain.phases",
                &format!(
                    "{} phases configured, limit is {}",
                    chain.phases.len() + 1,
                    limits.max_phases
                ),
            );
        }

        for (i, phase) in chain.phases.iter().enumerate() {
            if phase.duration.get().is_zero() {
                self.add_error(
                    &format!("chain.phases[{i}].duration"),
                    "phase duration must be greater than zero",
                );
            }
            if !(phase.ratio > 0.0 && phase.ratio <= 1.0) {
                self.add_error(
                    &format!("chain.phases[{i}].ratio"),
                    "ratio must be in (0, 1]",
                );
            }
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn add_error(&mut self, path: &str, message: &str) {
        self.errors.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Error,
        });
    }

    fn add_warning(&mut self, path: &str, message: &str) {
        self.warnings.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Warning,
        });
    }
}
