//! Safety monitor: four threshold channels mapped to a severity ladder, an
//! append-only transition log, and synchronous callback dispatch (wired by
//! the engine).

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{require_positive, ConfigError, SimTime};

// ============================================================================
// Levels and Channels
// ============================================================================

/// Severity ordering is total: NORMAL < WARNING < CRITICAL < EMERGENCY.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    #[default]
    Normal,
    Warning,
    Critical,
    Emergency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyChannel {
    Speed,
    Torque,
    Power,
    Pressure,
}

/// Ratio-to-maximum severity ladder shared by every channel.
pub fn classify(value: f64, maximum: f64) -> SafetyLevel {
    if maximum <= 0.0 {
        return SafetyLevel::Normal;
    }
    let ratio = value.abs() / maximum;
    if ratio >= 1.2 {
        SafetyLevel::Emergency
    } else if ratio >= 1.0 {
        SafetyLevel::Critical
    } else if ratio >= 0.9 {
        SafetyLevel::Warning
    } else {
        SafetyLevel::Normal
    }
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub max_speed_rad_s: f64,
    pub max_torque_nm: f64,
    pub max_power_w: f64,
    pub max_pressure_pa: f64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_speed_rad_s: 50.0,
            max_torque_nm: 5_000.0,
            max_power_w: 30_000.0,
            max_pressure_pa: 600_000.0,
        }
    }
}

impl SafetyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("safety.max_speed_rad_s", self.max_speed_rad_s)?;
        require_positive("safety.max_torque_nm", self.max_torque_nm)?;
        require_positive("safety.max_power_w", self.max_power_w)?;
        require_positive("safety.max_pressure_pa", self.max_pressure_pa)?;
        Ok(())
    }
}

// ============================================================================
// Readings, Warnings, Transitions
// ============================================================================

/// One tick's worth of monitored quantities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct SafetyReading {
    pub speed_rad_s: f64,
    pub torque_nm: f64,
    pub power_w: f64,
    pub pressure_pa: f64,
}

/// An active per-channel exceedance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyWarning {
    pub channel: SafetyChannel,
    pub level: SafetyLevel,
    pub value: f64,
    pub limit: f64,
}

/// A level change, appended to the ordered transition log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyTransition {
    pub from: SafetyLevel,
    pub to: SafetyLevel,
    pub time: SimTime,
}

// ============================================================================
// Monitor
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SafetyMonitor {
    level: SafetyLevel,
    warnings: Vec<SafetyWarning>,
    transitions: Vec<SafetyTransition>,
}

impl SafetyMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self) -> SafetyLevel {
        self.level
    }

    pub fn warnings(&self) -> &[SafetyWarning] {
        &self.warnings
    }

    /// Append-only, ordered by evaluation time.
    pub fn transitions(&self) -> &[SafetyTransition] {
        &self.transitions
    }

    /// Evaluate every channel against its maximum; overall level is the most
    /// severe. Returns the transition when the level changed.
    pub fn evaluate(
        &mut self,
        reading: &SafetyReading,
        config: &SafetyConfig,
        time: SimTime,
    ) -> Option<SafetyTransition> {
        let channels = [
            (SafetyChannel::Speed, reading.speed_rad_s, config.max_speed_rad_s),
            (SafetyChannel::Torque, reading.torque_nm, config.max_torque_nm),
            (SafetyChannel::Power, reading.power_w, config.max_power_w),
            (
                SafetyChannel::Pressure,
                reading.pressure_pa,
                config.max_pressure_pa,
            ),
        ];

        self.warnings.clear();
        let mut overall = SafetyLevel::Normal;
        for (channel, value, limit) in channels {
            let level = classify(value, limit);
            if level > SafetyLevel::Normal {
                self.warnings.push(SafetyWarning {
                    channel,
                    level,
                    value,
                    limit,
                });
            }
            overall = overall.max(level);
        }

        if overall != self.level {
            let transition = SafetyTransition {
                from: self.level,
                to: overall,
                time,
            };
            self.level = overall;
            self.transitions.push(transition);
            info!(?transition.from, ?transition.to, time, "safety level changed");
            Some(transition)
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// Tests
// ============================================================================
