//! Drivetrain: overrunning-clutch state machine, rotational inertia model,
//! and the coupling to the generator shaft.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{require_positive, require_unit, ConfigError};

// ============================================================================
// Clutch
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClutchState {
    #[default]
    Disengaged,
    /// Coupling ramps linearly from 0 to 1 over the slip duration.
    Slip,
    Engaged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClutchConfig {
    /// Torque required to begin engagement, N·m.
    pub engagement_threshold_nm: f64,
    /// Time for the coupling to ramp from 0 to 1, s.
    pub slip_duration_s: f64,
    /// Shaft speed below which the clutch will not engage, rad/s.
    pub min_speed_rad_s: f64,
    /// Shaft speed above which the clutch lets go, rad/s.
    pub max_speed_rad_s: f64,
}

impl Default for ClutchConfig {
    fn default() -> Self {
        Self {
            engagement_threshold_nm: 200.0,
            slip_duration_s: 1.0,
            min_speed_rad_s: 5.0,
            max_speed_rad_s: 50.0,
        }
    }
}

impl ClutchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("clutch.engagement_threshold_nm", self.engagement_threshold_nm)?;
        require_positive("clutch.slip_duration_s", self.slip_duration_s)?;
        if self.min_speed_rad_s > self.max_speed_rad_s {
            return Err(ConfigError::InvertedBand {
                name: "clutch.speed",
                low: self.min_speed_rad_s,
                high: self.max_speed_rad_s,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClutchTransition {
    pub from: ClutchState,
    pub to: ClutchState,
}

/// Overrunning clutch. Coupling coefficient stays in [0, 1]; DISENGAGED can
/// only reach ENGAGED through SLIP. An explicit override pins the state until
/// cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clutch {
    pub state: ClutchState,
    /// Fractional torque transmission, 0 = decoupled, 1 = locked.
    pub coefficient: f64,
    slip_timer_s: f64,
    override_engaged: Option<bool>,
}

impl Default for Clutch {
    fn default() -> Self {
        Self {
            state: ClutchState::Disengaged,
            coefficient: 0.0,
            slip_timer_s: 0.0,
            override_engaged: None,
        }
    }
}

impl Clutch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn override_engaged(&self) -> Option<bool> {
        self.override_engaged
    }

    /// Pin the clutch engaged or disengaged, bypassing the state machine.
    pub fn set_override(&mut self, engaged: bool) -> Option<ClutchTransition> {
        self.override_engaged = Some(engaged);
        let target = if engaged {
            ClutchState::Engaged
        } else {
            ClutchState::Disengaged
        };
        self.coefficient = if engaged { 1.0 } else { 0.0 };
        self.slip_timer_s = 0.0;
        if self.state != target {
            let transition = ClutchTransition {
                from: self.state,
                to: target,
            };
            self.state = target;
            Some(transition)
        } else {
            None
        }
    }

    /// Return control to the state machine.
    pub fn clear_override(&mut self) {
        self.override_engaged = None;
    }

    /// Advance the state machine one tick.
    pub fn update(
        &mut self,
        net_torque_nm: f64,
        angular_velocity: f64,
        dt: f64,
        config: &ClutchConfig,
    ) -> Option<ClutchTransition> {
        if self.override_engaged.is_some() {
            return None;
        }
        let from = self.state;
        match self.state {
            ClutchState::Disengaged => {
                self.coefficient = 0.0;
                if net_torque_nm >= config.engagement_threshold_nm
                    && angular_velocity >= config.min_speed_rad_s
                {
                    // Entry tick: coupling starts at zero, the ramp begins on
                    // the next update.
                    self.state = ClutchState::Slip;
                    self.slip_timer_s = config.slip_duration_s;
                }
            }
            ClutchState::Slip => {
                if net_torque_nm < 0.0
                    || angular_velocity < config.min_speed_rad_s
                    || angular_velocity > config.max_speed_rad_s
                {
                    self.state = ClutchState::Disengaged;
                    self.coefficient = 0.0;
                    self.slip_timer_s = 0.0;
                } else {
                    self.slip_timer_s -= dt;
                    if self.slip_timer_s <= 0.0 {
                        self.state = ClutchState::Engaged;
                        self.coefficient = 1.0;
                        self.slip_timer_s = 0.0;
                    } else {
                        self.coefficient =
                            (1.0 - self.slip_timer_s / config.slip_duration_s).clamp(0.0, 1.0);
                    }
                }
            }
            ClutchState::Engaged => {
                self.coefficient = 1.0;
                if net_torque_nm < 0.0
                    || angular_velocity < config.min_speed_rad_s
                    || angular_velocity > config.max_speed_rad_s
                {
                    self.state = ClutchState::Disengaged;
                    self.coefficient = 0.0;
                }
            }
        }
        if self.state != from {
            debug!(?from, to = ?self.state, "clutch transition");
            Some(ClutchTransition {
                from,
                to: self.state,
            })
        } else {
            None
        }
    }
}

// ============================================================================
// Drivetrain
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrivetrainConfig {
    pub base_inertia_kg_m2: f64,
    pub flywheel_enabled: bool,
    pub flywheel_inertia_kg_m2: f64,
    pub mechanical_efficiency: f64,
    /// Linear generator reaction coefficient k in tau = -k * omega, N·m·s.
    pub generator_torque_coeff: f64,
    pub min_operating_speed_rad_s: f64,
    pub max_operating_speed_rad_s: f64,
    pub clutch: ClutchConfig,
}

impl Default for DrivetrainConfig {
    fn default() -> Self {
        Self {
            base_inertia_kg_m2: 50.0,
            flywheel_enabled: false,
            flywheel_inertia_kg_m2: 100.0,
            mechanical_efficiency: 0.95,
            generator_torque_coeff: 8.0,
            min_operating_speed_rad_s: 0.0,
            max_operating_speed_rad_s: 60.0,
            clutch: ClutchConfig::default(),
        }
    }
}

impl DrivetrainConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("drivetrain.base_inertia_kg_m2", self.base_inertia_kg_m2)?;
        if self.flywheel_enabled {
            require_positive(
                "drivetrain.flywheel_inertia_kg_m2",
                self.flywheel_inertia_kg_m2,
            )?;
        }
        require_unit("drivetrain.mechanical_efficiency", self.mechanical_efficiency)?;
        require_positive("drivetrain.generator_torque_coeff", self.generator_torque_coeff)?;
        if self.min_operating_speed_rad_s > self.max_operating_speed_rad_s {
            return Err(ConfigError::InvertedBand {
                name: "drivetrain.operating_speed",
                low: self.min_operating_speed_rad_s,
                high: self.max_operating_speed_rad_s,
            });
        }
        self.clutch.validate()
    }

    pub fn total_inertia(&self) -> f64 {
        if self.flywheel_enabled {
            self.base_inertia_kg_m2 + self.flywheel_inertia_kg_m2
        } else {
            self.base_inertia_kg_m2
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Drivetrain {
    pub angular_velocity_rad_s: f64,
    pub angular_position_rad: f64,
    pub kinetic_energy_j: f64,
    /// Mechanical power flowing into the generator, W. Zero while decoupled.
    pub output_power_w: f64,
    pub output_energy_j: f64,
    pub clutch: Clutch,
}

impl Drivetrain {
    pub fn new(config: &DrivetrainConfig) -> Self {
        Self {
            angular_velocity_rad_s: config.min_operating_speed_rad_s,
            ..Self::default()
        }
    }

    /// Advance the clutch and integrate the shaft one tick. Returns the clutch
    /// transition, if any.
    pub fn update(
        &mut self,
        chain_torque_nm: f64,
        dt: f64,
        config: &DrivetrainConfig,
    ) -> Option<ClutchTransition> {
        let transition = self.clutch.update(
            chain_torque_nm,
            self.angular_velocity_rad_s,
            dt,
            &config.clutch,
        );

        let coupling = self.clutch.coefficient;
        let generator_torque = -config.generator_torque_coeff * self.angular_velocity_rad_s * coupling;
        let total_torque = (chain_torque_nm + generator_torque) * config.mechanical_efficiency;

        let inertia = config.total_inertia();
        let angular_acceleration = total_torque / inertia;
        let mut omega = self.angular_velocity_rad_s + angular_acceleration * dt;
        omega = omega.clamp(
            config.min_operating_speed_rad_s,
            config.max_operating_speed_rad_s,
        );
        self.angular_velocity_rad_s = omega;
        self.angular_position_rad += omega * dt;
        self.kinetic_energy_j = 0.5 * inertia * omega * omega;

        self.output_power_w = if coupling > 0.0 {
            config.generator_torque_coeff * omega * omega * coupling
        } else {
            0.0
        };
        self.output_energy_j += self.output_power_w * dt;

        transition
    }
}

// ============================================================================
// Tests
// ============================================================================
