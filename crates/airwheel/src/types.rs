//! Core type definitions: IDs, constants, commands, and the error taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Type Aliases
// ============================================================================

pub type FloaterId = u32;
pub type SimTime = f64;
pub type EventId = u64;

// ============================================================================
// Constants
// ============================================================================

pub const GRAVITY_M_S2: f64 = 9.81;
pub const WATER_DENSITY_KG_M3: f64 = 1000.0;
pub const ATMOSPHERIC_PRESSURE_PA: f64 = 101_325.0;
pub const AMBIENT_TEMPERATURE_K: f64 = 293.15;
/// Specific gas constant for dry air, J/(kg·K).
pub const AIR_GAS_CONSTANT: f64 = 287.05;
/// Floor applied to the enhanced fluid density so buoyancy and drag stay
/// well-defined no matter how aggressive the enhancement settings are.
pub const MIN_EFFECTIVE_DENSITY_KG_M3: f64 = 1.0;
/// Number of journal entries carried in each engine snapshot.
pub const SNAPSHOT_EVENT_TAIL: usize = 32;

// ============================================================================
// Commands
// ============================================================================

/// A host-issued command, queued and applied at the start of the next step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Command {
    /// Begin the timed air-injection process for a floater.
    StartPulse { floater_id: FloaterId },
    /// Pin the clutch engaged or disengaged, overriding the clutch FSM.
    SetClutch { engaged: bool },
    /// Release a manual clutch pin and return control to the clutch FSM.
    ClearClutchOverride,
    /// Set the external electrical load factor, clamped to [0, 1].
    SetLoad { load_factor: f64 },
}

// ============================================================================
// Error Taxonomy
// ============================================================================

/// Invalid construction parameters. Raised at setup, never mid-step.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("floater count must be at least 1, got {count}")]
    FloaterCount { count: u32 },
    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },
    #[error("{name} must be finite, got {value}")]
    NonFinite { name: &'static str, value: f64 },
    #[error("{name} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        name: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("{name}: lower bound {low} exceeds upper bound {high}")]
    InvertedBand {
        name: &'static str,
        low: f64,
        high: f64,
    },
}

/// Invalid per-floater parameter, reported with the offending id.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FloaterError {
    #[error("floater {id}: {name} must be positive, got {value}")]
    NonPositive {
        id: FloaterId,
        name: &'static str,
        value: f64,
    },
    #[error("floater {id} not found (count is {count})")]
    NotFound { id: FloaterId, count: u32 },
}

/// Invalid environment parameter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvironmentError {
    #[error("environment: {name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },
}

/// Illegal command given the current lifecycle state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    #[error("engine is already running")]
    AlreadyRunning,
    #[error("engine is not running")]
    NotRunning,
    #[error("engine configuration may only change while stopped")]
    NotStopped,
    #[error("time step must be positive and finite, got {dt}")]
    InvalidTimeStep { dt: f64 },
}

/// Non-finite value detected mid-step. Fatal: the engine halts stepping and
/// keeps serving the last good snapshot.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("non-finite {quantity} ({value}) at t={time}")]
pub struct PhysicsError {
    pub quantity: &'static str,
    pub value: f64,
    pub time: SimTime,
}

/// Unified error surface for the engine boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Floater(#[from] FloaterError),
    #[error(transparent)]
    Environment(#[from] EnvironmentError),
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error(transparent)]
    Physics(#[from] PhysicsError),
}

// ============================================================================
// Validation Helpers
// ============================================================================

pub(crate) fn require_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::NonFinite { name, value });
    }
    if value <= 0.0 {
        return Err(ConfigError::NonPositive { name, value });
    }
    Ok(())
}

pub(crate) fn require_finite(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::NonFinite { name, value });
    }
    Ok(())
}

pub(crate) fn require_unit(name: &'static str, value: f64) -> Result<(), ConfigError> {
    require_finite(name, value)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::OutOfRange {
            name,
            min: 0.0,
            max: 1.0,
            value,
        });
    }
    Ok(())
}
