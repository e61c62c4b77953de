//! Generator and electrical model: mechanical-to-electrical conversion under
//! an efficiency and load model.

use serde::{Deserialize, Serialize};

use crate::types::{require_finite, require_positive, require_unit, ConfigError};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Mechanical-to-electrical conversion efficiency, (0, 1].
    pub efficiency: f64,
    pub min_power_w: f64,
    pub max_power_w: f64,
    pub power_factor: f64,
    pub nominal_voltage_v: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            efficiency: 0.92,
            min_power_w: 0.0,
            max_power_w: 25_000.0,
            power_factor: 0.9,
            nominal_voltage_v: 400.0,
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_unit("generator.efficiency", self.efficiency)?;
        require_positive("generator.max_power_w", self.max_power_w)?;
        require_finite("generator.min_power_w", self.min_power_w)?;
        require_unit("generator.power_factor", self.power_factor)?;
        require_positive("generator.nominal_voltage_v", self.nominal_voltage_v)?;
        if self.min_power_w > self.max_power_w {
            return Err(ConfigError::InvertedBand {
                name: "generator.power",
                low: self.min_power_w,
                high: self.max_power_w,
            });
        }
        Ok(())
    }
}

// ============================================================================
// Generator
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generator {
    pub mechanical_power_w: f64,
    pub electrical_power_w: f64,
    pub current_a: f64,
    pub reactive_power_var: f64,
    /// Cumulative delivered electrical energy, J.
    pub energy_delivered_j: f64,
    /// External load factor, [0, 1].
    pub load_factor: f64,
}

impl Default for Generator {
    fn default() -> Self {
        Self {
            mechanical_power_w: 0.0,
            electrical_power_w: 0.0,
            current_a: 0.0,
            reactive_power_var: 0.0,
            energy_delivered_j: 0.0,
            load_factor: 1.0,
        }
    }
}

impl Generator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_load(&mut self, load_factor: f64) {
        self.load_factor = load_factor.clamp(0.0, 1.0);
    }

    /// Electrical power for a given shaft torque and speed: `tau * omega *
    /// efficiency`, clipped to the configured band and capped by the load.
    pub fn compute_power(&self, torque_nm: f64, angular_velocity: f64, config: &GeneratorConfig) -> f64 {
        let mechanical = torque_nm * angular_velocity;
        let electrical = (mechanical * config.efficiency)
            .clamp(config.min_power_w, config.max_power_w);
        electrical.min(config.max_power_w * self.load_factor)
    }

    /// Book one tick of conversion from the drivetrain's mechanical output.
    pub fn update(&mut self, mechanical_power_w: f64, dt: f64, config: &GeneratorConfig) {
        self.mechanical_power_w = mechanical_power_w;
        let electrical = (mechanical_power_w * config.efficiency)
            .clamp(config.min_power_w, config.max_power_w)
            .min(config.max_power_w * self.load_factor);
        self.electrical_power_w = electrical;
        self.current_a = electrical / config.nominal_voltage_v;
        // Reactive power from the power-factor triangle; guarded near pf = 0.
        self.reactive_power_var = if config.power_factor > f64::EPSILON {
            let apparent = electrical / config.power_factor;
            (apparent * apparent - electrical * electrical).max(0.0).sqrt()
        } else {
            0.0
        };
        self.energy_delivered_j += electrical * dt;
    }

    /// Realized conversion efficiency: output over input, or 0 with no input.
    pub fn efficiency_actual(&self) -> f64 {
        if self.mechanical_power_w > 0.0 {
            self.electrical_power_w / self.mechanical_power_w
        } else {
            0.0
        }
    }

    pub fn reset(&mut self) {
        let load = self.load_factor;
        *self = Self::default();
        self.load_factor = load;
    }
}

// ============================================================================
// Tests
// ============================================================================
