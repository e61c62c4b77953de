//! Optional physics enhancement modules: nanobubble density/drag reduction,
//! thermal buoyancy boost, and the pulse-and-coast clutch override.
//!
//! Each module is toggled independently and is an exact identity when
//! disabled.

use serde::{Deserialize, Serialize};

use crate::types::{
    require_finite, require_unit, ConfigError, AMBIENT_TEMPERATURE_K,
    MIN_EFFECTIVE_DENSITY_KG_M3,
};

// ============================================================================
// Configuration
// ============================================================================

/// Nanobubble injection lowers the effective density and drag of the water
/// column on the descending side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NanobubbleConfig {
    pub enabled: bool,
    /// Fraction of the column aerated, [0, 1].
    pub fraction: f64,
    /// Relative density reduction at full aeration, [0, 1].
    pub density_reduction: f64,
    /// Relative drag-coefficient reduction at full aeration, [0, 1].
    pub drag_reduction: f64,
}

impl Default for NanobubbleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            fraction: 0.2,
            density_reduction: 0.1,
            drag_reduction: 0.1,
        }
    }
}

/// Injected air is warmed by the surrounding water, expanding and boosting
/// buoyancy over the ascent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermalConfig {
    pub enabled: bool,
    pub water_temperature_k: f64,
    pub reference_temperature_k: f64,
    /// Volumetric thermal-expansion coefficient of water, 1/K.
    pub water_expansion_coeff: f64,
    /// First-order heat-transfer rate between water and injected air, 1/s.
    pub heat_transfer_coeff: f64,
    /// Cap on the volumetric expansion factor.
    pub max_boost: f64,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            water_temperature_k: 303.15,
            reference_temperature_k: AMBIENT_TEMPERATURE_K,
            water_expansion_coeff: 2.1e-4,
            heat_transfer_coeff: 0.05,
            max_boost: 1.2,
        }
    }
}

/// Pulse-and-coast alternates clutch engagement in fixed windows while the
/// shaft speed stays inside a safe band; outside the band it always forces
/// engagement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseCoastConfig {
    pub enabled: bool,
    pub pulse_duration_s: f64,
    pub coast_duration_s: f64,
    pub min_safe_speed_rad_s: f64,
    pub max_safe_speed_rad_s: f64,
}

impl Default for PulseCoastConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pulse_duration_s: 2.0,
            coast_duration_s: 1.0,
            min_safe_speed_rad_s: 2.0,
            max_safe_speed_rad_s: 40.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EnhancementConfig {
    pub nanobubble: NanobubbleConfig,
    pub thermal: ThermalConfig,
    pub pulse_coast: PulseCoastConfig,
}

impl EnhancementConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_unit("nanobubble.fraction", self.nanobubble.fraction)?;
        require_unit("nanobubble.density_reduction", self.nanobubble.density_reduction)?;
        require_unit("nanobubble.drag_reduction", self.nanobubble.drag_reduction)?;
        require_finite("thermal.water_temperature_k", self.thermal.water_temperature_k)?;
        require_finite(
            "thermal.reference_temperature_k",
            self.thermal.reference_temperature_k,
        )?;
        if self.pulse_coast.min_safe_speed_rad_s > self.pulse_coast.max_safe_speed_rad_s {
            return Err(ConfigError::InvertedBand {
                name: "pulse_coast.safe_speed",
                low: self.pulse_coast.min_safe_speed_rad_s,
                high: self.pulse_coast.max_safe_speed_rad_s,
            });
        }
        Ok(())
    }
}

// ============================================================================
// Runtime State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PulseCoastPhase {
    #[default]
    Pulse,
    Coast,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enhancements {
    config: EnhancementConfig,
    /// Current temperature of the injected air column, K.
    air_temperature_k: f64,
    pulse_coast_phase: PulseCoastPhase,
    phase_elapsed_s: f64,
}

impl Enhancements {
    pub fn new(config: EnhancementConfig) -> Self {
        let start_temp = config.thermal.reference_temperature_k;
        Self {
            config,
            air_temperature_k: start_temp,
            pulse_coast_phase: PulseCoastPhase::Pulse,
            phase_elapsed_s: 0.0,
        }
    }

    pub fn config(&self) -> &EnhancementConfig {
        &self.config
    }

    pub fn air_temperature_k(&self) -> f64 {
        self.air_temperature_k
    }

    /// Effective fluid density after nanobubble and thermal reduction,
    /// floored at a positive minimum.
    pub fn effective_density(&self, base_density: f64) -> f64 {
        let mut density = base_density;
        let nb = &self.config.nanobubble;
        if nb.enabled {
            density *= 1.0 - nb.fraction * nb.density_reduction;
        }
        let th = &self.config.thermal;
        if th.enabled {
            let delta = th.water_temperature_k - th.reference_temperature_k;
            density *= 1.0 - th.water_expansion_coeff * delta;
        }
        density.max(MIN_EFFECTIVE_DENSITY_KG_M3)
    }

    /// Multiplier applied to the drag coefficient.
    pub fn drag_scale(&self) -> f64 {
        let nb = &self.config.nanobubble;
        if nb.enabled {
            (1.0 - nb.fraction * nb.drag_reduction).max(0.0)
        } else {
            1.0
        }
    }

    /// Volumetric expansion factor applied to buoyancy.
    pub fn buoyancy_boost(&self) -> f64 {
        let th = &self.config.thermal;
        if !th.enabled {
            return 1.0;
        }
        let reference = th.reference_temperature_k.max(1.0);
        let boost = self.air_temperature_k / reference;
        boost.clamp(1.0, th.max_boost)
    }

    /// Advance the thermal state: injected air relaxes toward water
    /// temperature at the configured first-order rate.
    pub fn advance(&mut self, dt: f64) {
        let th = &self.config.thermal;
        if th.enabled {
            let delta = th.water_temperature_k - self.air_temperature_k;
            self.air_temperature_k += th.heat_transfer_coeff * delta * dt;
        }
    }

    /// Pulse-and-coast clutch decision for this tick.
    ///
    /// `Some(true)` forces engagement, `Some(false)` forces coast, `None`
    /// leaves the clutch FSM alone (module disabled).
    pub fn clutch_override(&mut self, dt: f64, angular_velocity: f64) -> Option<bool> {
        let pc = &self.config.pulse_coast;
        if !pc.enabled {
            return None;
        }
        let in_band = angular_velocity >= pc.min_safe_speed_rad_s
            && angular_velocity <= pc.max_safe_speed_rad_s;
        if !in_band {
            // Outside the safe band the override always engages.
            self.pulse_coast_phase = PulseCoastPhase::Pulse;
            self.phase_elapsed_s = 0.0;
            return Some(true);
        }
        self.phase_elapsed_s += dt;
        let window = match self.pulse_coast_phase {
            PulseCoastPhase::Pulse => pc.pulse_duration_s,
            PulseCoastPhase::Coast => pc.coast_duration_s,
        };
        if self.phase_elapsed_s >= window {
            self.phase_elapsed_s = 0.0;
            self.pulse_coast_phase = match self.pulse_coast_phase {
                PulseCoastPhase::Pulse => PulseCoastPhase::Coast,
                PulseCoastPhase::Coast => PulseCoastPhase::Pulse,
            };
        }
        Some(matches!(self.pulse_coast_phase, PulseCoastPhase::Pulse))
    }
}

// ============================================================================
// Tests
// ============================================================================
