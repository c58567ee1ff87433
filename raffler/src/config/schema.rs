//! Configuration schema types
//!
//! These types are deserialized from YAML configuration files. Every
//! section has defaults, so an empty file (or no file at all) is a valid
//! configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ============================================================================
// Top-Level Configuration
// ============================================================================

/// Root configuration for a `raffler` process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct RafflerConfig {
    /// Timer, cooldown and draw settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Where entity records live
    #[serde(default)]
    pub store: StoreConfig,

    /// Tournament phase table
    #[serde(default)]
    pub chain: ChainConfig,
}

// ============================================================================
// Durations
// ============================================================================

/// A `std::time::Duration` written in human form (`"30s"`, `"1h 30m"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HumanDuration(pub Duration);

impl HumanDuration {
    /// Builds a duration from whole seconds.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    /// Returns the wrapped duration.
    #[must_use]
    pub const fn get(self) -> Duration {
        self.0
    }
}

impl Serialize for HumanDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(self.0))
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim())
            .map(Self)
            .map_err(|e| serde::de::Error::custom(format!("invalid duration '{raw}': {e}")))
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct SchedulerConfig {
    /// How often live entities get a status refresh
    #[serde(default = "default_status_interval")]
    pub status_interval: HumanDuration,

    /// Upper bound applied to every ticket weight
    #[serde(default = "default_max_ticket_weight")]
    pub max_ticket_weight: u32,

    /// Minimum time between two join/leave actions of one actor
    #[serde(default = "default_join_cooldown")]
    pub join_cooldown: HumanDuration,

    /// Fixed RNG seed for reproducible draws
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            status_interval: default_status_interval(),
            max_ticket_weight: default_max_ticket_weight(),
            join_cooldown: default_join_cooldown(),
            seed: None,
        }
    }
}

const fn default_status_interval() -> HumanDuration {
    HumanDuration::from_secs(30)
}

const fn default_max_ticket_weight() -> u32 {
    10
}

const fn default_join_cooldown() -> HumanDuration {
    HumanDuration::from_secs(3)
}

// ============================================================================
// Store
// ============================================================================

/// Entity store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// One JSON document per entity in a data directory (default)
    #[default]
    File,
    /// Process memory only; nothing survives a restart
    Memory,
}

/// Entity store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct StoreConfig {
    /// Backend to use
    #[serde(default)]
    pub kind: StoreKind,

    /// Data directory for the file backend
    #[serde(default = "default_data_dir")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::File,
            path: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

// ============================================================================
// Chain
// ============================================================================

/// Settings for one phase after the first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct PhaseConfig {
    /// How long the phase runs
    pub duration: HumanDuration,

    /// Fraction of phase 1's winner count that this phase draws
    pub ratio: f64,
}

/// Tournament phase table.
///
/// `phases[0]` configures phase 2, `phases[1]` phase 3, and so on; the
/// longest supported chain is therefore `phases.len() + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ChainConfig {
    /// Per-phase settings, starting at phase 2
    #[serde(default = "default_phases")]
    pub phases: Vec<PhaseConfig>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            phases: default_phases(),
        }
    }
}

impl ChainConfig {
    /// Longest chain the table can drive.
    #[must_use]
    pub fn max_phases(&self) -> u32 {
        u32::try_from(self.phases.len())
            .unwrap_or(u32::MAX - 1)
            .saturating_add(1)
    }

    /// Settings for the 1-based `phase_index`, if it is a configured
    /// follow-up phase.
    #[must_use]
    pub fn phase(&self, phase_index: u32) -> Option<&PhaseConfig> {
        let slot = usize::try_from(phase_index.checked_sub(2)?).ok()?;
        self.phases.get(slot)
    }
}

fn default_phases() -> Vec<PhaseConfig> {
    vec![
        PhaseConfig {
            duration: HumanDuration::from_secs(60 * 60),
            ratio: 0.5,
        },
        PhaseConfig {
            duration: HumanDuration::from_secs(30 * 60),
            ratio: 0.3,
        },
    ]
}
