//! Floater dynamics: per-floater force computation and explicit integration.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{require_positive, ConfigError, FloaterError, FloaterId, SimTime};

// ============================================================================
// Floater State
// ============================================================================

/// Where a floater is in the fill/release cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FloaterState {
    /// Full of water, waiting at or moving along the descending side.
    #[default]
    WaterFilled,
    /// An injection is in progress; `fill_progress` is ramping to 1.
    Filling,
    /// Air-filled and rising on the ascending side.
    Ascending,
    /// Air released at the top, sinking back toward the bottom.
    Descending,
}

impl FloaterState {
    /// True for states counted on the ascending side of the chain.
    pub fn is_ascending_side(&self) -> bool {
        matches!(self, FloaterState::Filling | FloaterState::Ascending)
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Geometry and hydrodynamic parameters shared by every floater.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FloaterConfig {
    pub mass_kg: f64,
    pub volume_m3: f64,
    /// Cross-section area facing the flow, m².
    pub area_m2: f64,
    pub drag_coefficient: f64,
    /// Velocity magnitude clamp, m/s.
    pub max_velocity_m_s: f64,
    /// Nominal duration of the buoyancy pulse, s.
    pub pulse_duration_s: f64,
    /// Fraction of injection pressure converted into jet thrust.
    pub jet_efficiency: f64,
    /// Effective nozzle area of the water jet, m².
    pub nozzle_area_m2: f64,
}

impl Default for FloaterConfig {
    fn default() -> Self {
        Self {
            mass_kg: 2.0,
            volume_m3: 0.04,
            area_m2: 0.1,
            drag_coefficient: 0.8,
            max_velocity_m_s: 5.0,
            pulse_duration_s: 0.5,
            jet_efficiency: 0.1,
            nozzle_area_m2: 0.001,
        }
    }
}

impl FloaterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("floater.mass_kg", self.mass_kg)?;
        require_positive("floater.volume_m3", self.volume_m3)?;
        require_positive("floater.area_m2", self.area_m2)?;
        require_positive("floater.drag_coefficient", self.drag_coefficient)?;
        require_positive("floater.max_velocity_m_s", self.max_velocity_m_s)?;
        require_positive("floater.pulse_duration_s", self.pulse_duration_s)?;
        Ok(())
    }
}

// ============================================================================
// Forces
// ============================================================================

/// The force breakdown from the most recent update, N.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct FloaterForces {
    pub buoyancy_n: f64,
    pub gravity_n: f64,
    pub drag_n: f64,
    pub pulse_n: f64,
    pub net_n: f64,
}

/// Per-tick fluid view handed to a floater by the engine: base environment
/// already combined with whatever enhancement modules are enabled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FluidContext {
    /// Enhanced fluid density, floored at a positive minimum, kg/m³.
    pub effective_density_kg_m3: f64,
    /// Multiplier on the drag coefficient (1.0 when no enhancement).
    pub drag_scale: f64,
    /// Multiplier on buoyancy from thermal expansion (1.0 when disabled).
    pub buoyancy_boost: f64,
    pub gravity_m_s2: f64,
    /// Gauge pressure driving the water jet while this floater is pulsing, Pa.
    pub injection_gauge_pa: f64,
}

// ============================================================================
// Floater
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Floater {
    pub id: FloaterId,
    pub position_m: f64,
    pub velocity_m_s: f64,
    pub state: FloaterState,
    pub is_pulsing: bool,
    pub pulse_start_time: SimTime,
    /// Fill fraction in [0, 1]; non-decreasing while `Filling`.
    pub fill_progress: f64,
    pub forces: FloaterForces,
    config: FloaterConfig,
}

impl Floater {
    /// Fails fast on invalid geometry; no errors are raised during stepping.
    pub fn new(
        id: FloaterId,
        config: FloaterConfig,
        position_m: f64,
    ) -> Result<Self, FloaterError> {
        let check = |name: &'static str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(FloaterError::NonPositive { id, name, value })
            }
        };
        check("mass_kg", config.mass_kg)?;
        check("volume_m3", config.volume_m3)?;
        check("area_m2", config.area_m2)?;
        check("drag_coefficient", config.drag_coefficient)?;
        Ok(Self {
            id,
            position_m: position_m.max(0.0),
            velocity_m_s: 0.0,
            state: FloaterState::WaterFilled,
            is_pulsing: false,
            pulse_start_time: 0.0,
            fill_progress: 0.0,
            forces: FloaterForces::default(),
            config,
        })
    }

    pub fn config(&self) -> &FloaterConfig {
        &self.config
    }

    /// Begin the injection pulse: resets fill progress and enters `Filling`.
    pub fn start_pulse(&mut self, time: SimTime) {
        self.is_pulsing = true;
        self.pulse_start_time = time;
        self.fill_progress = 0.0;
        self.state = FloaterState::Filling;
        debug!(floater = self.id, time, "pulse started");
    }

    /// Advance the fill fraction. Monotonic: a lower value is ignored.
    pub fn set_fill_progress(&mut self, progress: f64) {
        let clamped = progress.clamp(0.0, 1.0);
        if clamped > self.fill_progress {
            self.fill_progress = clamped;
        }
    }

    /// Injection finished: the floater is air-filled and rising.
    pub fn complete_fill(&mut self, time: SimTime) {
        self.fill_progress = 1.0;
        self.is_pulsing = false;
        self.state = FloaterState::Ascending;
        debug!(floater = self.id, time, "fill complete, ascending");
    }

    /// Air vented at the top: back to water ballast, sinking.
    pub fn release(&mut self, time: SimTime) {
        self.is_pulsing = false;
        self.fill_progress = 0.0;
        self.state = FloaterState::Descending;
        debug!(floater = self.id, time, "air released, descending");
    }

    /// Recompute forces and integrate position/velocity in place.
    ///
    /// All numerically risky paths are guarded and clamped; this method never
    /// fails. Non-finite detection is the engine's job after the fact.
    pub fn update(&mut self, dt: f64, ctx: &FluidContext) {
        let cfg = &self.config;
        let rho = ctx.effective_density_kg_m3;
        let g = ctx.gravity_m_s2;
        let v = self.velocity_m_s;

        let buoyancy = rho * g * cfg.volume_m3 * ctx.buoyancy_boost;
        // Ballast water still inside the shell weighs the floater down until
        // the air fill displaces it; an empty (water-filled) floater sinks
        // under exactly its dry weight.
        let ballast_kg = rho * cfg.volume_m3 * (1.0 - self.fill_progress);
        let gravity = (cfg.mass_kg + ballast_kg) * g;
        // Quadratic drag, opposing velocity; exactly zero at rest.
        let drag = if v.abs() > f64::EPSILON {
            -0.5 * rho * v * v.abs() * cfg.drag_coefficient * ctx.drag_scale * cfg.area_m2
        } else {
            0.0
        };
        let pulse = if self.is_pulsing && self.fill_progress < 1.0 {
            self.pulse_force(rho, g, ctx.injection_gauge_pa)
        } else {
            0.0
        };

        let net = buoyancy - gravity + drag + pulse;
        self.forces = FloaterForces {
            buoyancy_n: buoyancy,
            gravity_n: gravity,
            drag_n: drag,
            pulse_n: pulse,
            net_n: net,
        };

        let acceleration = net / cfg.mass_kg;
        let mut velocity = self.velocity_m_s + acceleration * dt;
        velocity = velocity.clamp(-cfg.max_velocity_m_s, cfg.max_velocity_m_s);
        let mut position = self.position_m + velocity * dt;

        // Reflecting floor: the floater cannot leave the tank at the bottom.
        if position <= 0.0 {
            position = 0.0;
            if velocity < 0.0 {
                velocity = 0.0;
            }
            if self.state == FloaterState::Descending {
                self.state = FloaterState::WaterFilled;
                debug!(floater = self.id, "reached bottom, water filled");
            }
        }

        self.velocity_m_s = velocity;
        self.position_m = position;
    }

    /// Buoyancy-pulse term plus the water-jet reaction from the injection.
    fn pulse_force(&self, rho: f64, g: f64, injection_gauge_pa: f64) -> f64 {
        let cfg = &self.config;
        // Displaced-volume rate during the pulse window.
        let dv_dt = cfg.volume_m3 / cfg.pulse_duration_s.max(f64::EPSILON);
        let buoyancy_pulse = rho * g * dv_dt * cfg.pulse_duration_s;
        let jet = cfg.jet_efficiency * injection_gauge_pa.max(0.0) * cfg.nozzle_area_m2;
        buoyancy_pulse + jet
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GRAVITY_M_S2, WATER_DENSITY_KG_M3};

    fn quiet_water() -> FluidContext {
        FluidContext {
            effective_density_kg_m3: WATER_DENSITY_KG_M3,
            drag_scale: 1.0,
            buoyancy_boost: 1.0,
            gravity_m_s2: GRAVITY_M_S2,
            injection_gauge_pa: 0.0,
        }
    }

    #[test]
    fn construction_rejects_invalid_geometry() {
        let mut config = FloaterConfig::default();
        config.mass_kg = 0.0;
        let err = Floater::new(7, config, 0.0).unwrap_err();
        assert!(matches!(
            err,
            FloaterError::NonPositive { id: 7, name: "mass_kg", .. }
        ));

        let mut config = FloaterConfig::default();
        config.volume_m3 = -0.1;
        assert!(Floater::new(0, config, 0.0).is_err());
    }

    #[test]
    fn air_filled_forces_at_rest_match_archimedes() {
        // 2 kg floater displacing 0.04 m3 of 1000 kg/m3 water, fully air
        // filled so no ballast remains.
        let mut floater = Floater::new(0, FloaterConfig::default(), 1.0).unwrap();
        floater.complete_fill(0.0);
        floater.update(0.01, &quiet_water());
        let forces = floater.forces;
        assert!((forces.buoyancy_n - 392.4).abs() < 1e-9);
        assert!((forces.gravity_n - 19.62).abs() < 1e-9);
        assert_eq!(forces.drag_n, 0.0);
        assert!((forces.net_n - 372.78).abs() < 1e-9);
    }

    #[test]
    fn water_filled_floater_sinks() {
        // Full ballast: buoyancy cancels the water weight and the dry mass
        // pulls the floater down.
        let mut floater = Floater::new(0, FloaterConfig::default(), 5.0).unwrap();
        floater.update(0.01, &quiet_water());
        assert!((floater.forces.net_n + 19.62).abs() < 1e-9);

        for _ in 0..100 {
            floater.update(0.1, &quiet_water());
        }
        assert_eq!(floater.position_m, 0.0);
        assert_eq!(floater.state, FloaterState::WaterFilled);
    }

    #[test]
    fn vented_floater_returns_to_the_bottom() {
        let mut floater = Floater::new(0, FloaterConfig::default(), 8.0).unwrap();
        floater.complete_fill(0.0);
        floater.release(1.0);
        assert_eq!(floater.state, FloaterState::Descending);

        for _ in 0..200 {
            floater.update(0.05, &quiet_water());
        }
        assert_eq!(floater.position_m, 0.0);
        assert_eq!(floater.state, FloaterState::WaterFilled);
    }

    #[test]
    fn drag_opposes_motion() {
        let mut floater = Floater::new(0, FloaterConfig::default(), 1.0).unwrap();
        floater.velocity_m_s = 1.0;
        floater.update(0.001, &quiet_water());
        assert!(floater.forces.drag_n < 0.0);

        floater.velocity_m_s = -1.0;
        floater.update(0.001, &quiet_water());
        assert!(floater.forces.drag_n > 0.0);
    }

    #[test]
    fn velocity_clamped_to_configured_maximum() {
        let mut floater = Floater::new(0, FloaterConfig::default(), 0.0).unwrap();
        floater.complete_fill(0.0);
        for _ in 0..1000 {
            floater.update(0.05, &quiet_water());
        }
        assert!(floater.velocity_m_s <= floater.config().max_velocity_m_s + 1e-12);
    }

    #[test]
    fn floor_is_reflecting_and_refills_descending() {
        let mut floater = Floater::new(0, FloaterConfig::default(), 0.05).unwrap();
        floater.state = FloaterState::Descending;
        floater.velocity_m_s = -2.0;
        for _ in 0..100 {
            floater.update(0.01, &quiet_water());
        }
        assert_eq!(floater.position_m, 0.0);
        assert!(floater.velocity_m_s >= 0.0);
        assert_eq!(floater.state, FloaterState::WaterFilled);
    }

    #[test]
    fn fill_progress_is_monotonic() {
        let mut floater = Floater::new(0, FloaterConfig::default(), 0.0).unwrap();
        floater.start_pulse(0.0);
        floater.set_fill_progress(0.4);
        floater.set_fill_progress(0.2);
        assert_eq!(floater.fill_progress, 0.4);
        floater.set_fill_progress(2.0);
        assert_eq!(floater.fill_progress, 1.0);
    }

    #[test]
    fn pulse_force_only_while_pulsing() {
        let mut floater = Floater::new(0, FloaterConfig::default(), 0.0).unwrap();
        let ctx = FluidContext {
            injection_gauge_pa: 200_000.0,
            ..quiet_water()
        };
        floater.update(0.01, &ctx);
        assert_eq!(floater.forces.pulse_n, 0.0);

        floater.start_pulse(0.0);
        floater.set_fill_progress(0.5);
        floater.update(0.01, &ctx);
        assert!(floater.forces.pulse_n > 0.0);

        floater.complete_fill(1.0);
        floater.update(0.01, &ctx);
        assert_eq!(floater.forces.pulse_n, 0.0);
        assert_eq!(floater.state, FloaterState::Ascending);
    }
}
