//! Pneumatic event system: timed two-phase air injections, air release, and
//! compressor duty cycling.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::floater::{Floater, FloaterState};
use crate::types::{
    require_positive, ConfigError, FloaterId, SimTime, AIR_GAS_CONSTANT,
    AMBIENT_TEMPERATURE_K, ATMOSPHERIC_PRESSURE_PA,
};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PneumaticConfig {
    /// Valve response delay before any air flows, s.
    pub valve_delay_s: f64,
    /// Duration of the fill ramp from ambient to compressor pressure, s.
    pub injection_duration_s: f64,
    pub compressor_pressure_pa: f64,
    pub ambient_pressure_pa: f64,
    /// Air temperature at the compressor outlet, K.
    pub compressor_air_temperature_k: f64,
    /// Half-period of the compressor run/idle duty cycle, s.
    pub compressor_half_period_s: f64,
    /// Electrical draw while the compressor runs, W.
    pub compressor_power_w: f64,
}

impl Default for PneumaticConfig {
    fn default() -> Self {
        Self {
            valve_delay_s: 0.2,
            injection_duration_s: 1.5,
            compressor_pressure_pa: 400_000.0,
            ambient_pressure_pa: ATMOSPHERIC_PRESSURE_PA,
            compressor_air_temperature_k: 313.15,
            compressor_half_period_s: 30.0,
            compressor_power_w: 4_000.0,
        }
    }
}

impl PneumaticConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("pneumatic.valve_delay_s", self.valve_delay_s)?;
        require_positive("pneumatic.injection_duration_s", self.injection_duration_s)?;
        require_positive("pneumatic.compressor_pressure_pa", self.compressor_pressure_pa)?;
        require_positive("pneumatic.ambient_pressure_pa", self.ambient_pressure_pa)?;
        require_positive(
            "pneumatic.compressor_half_period_s",
            self.compressor_half_period_s,
        )?;
        Ok(())
    }
}

// ============================================================================
// Per-Floater Air State
// ============================================================================

/// Air inventory of one floater; exclusive to the pneumatic system.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloaterAirState {
    pub air_mass_kg: f64,
    pub pressure_pa: f64,
    pub temperature_k: f64,
    pub fill_fraction: f64,
}

impl FloaterAirState {
    fn ambient(config: &PneumaticConfig) -> Self {
        Self {
            air_mass_kg: 0.0,
            pressure_pa: config.ambient_pressure_pa,
            temperature_k: AMBIENT_TEMPERATURE_K,
            fill_fraction: 0.0,
        }
    }
}

// ============================================================================
// Injection Process
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum InjectionPhase {
    ValveDelay,
    Filling,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ActiveInjection {
    phase: InjectionPhase,
    elapsed_s: f64,
}

/// Why an injection request was turned away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum InjectionRejectReason {
    /// An injection for this floater is already in flight.
    AlreadyFilling { floater_id: FloaterId },
    /// The floater is not water-filled, so there is nothing to displace.
    NotWaterFilled { floater_id: FloaterId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PneumaticEvent {
    InjectionStarted { floater_id: FloaterId },
    InjectionCompleted { floater_id: FloaterId },
    InjectionRejected { reason: InjectionRejectReason },
    AirReleased { floater_id: FloaterId, energy_j: f64 },
    CompressorToggled { running: bool },
}

// ============================================================================
// Compressor
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressorState {
    pub running: bool,
    elapsed_s: f64,
    pub energy_used_j: f64,
}

impl Default for CompressorState {
    fn default() -> Self {
        Self {
            running: true,
            elapsed_s: 0.0,
            energy_used_j: 0.0,
        }
    }
}

// ============================================================================
// Pneumatic System
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PneumaticSystem {
    config: PneumaticConfig,
    states: Vec<FloaterAirState>,
    active: BTreeMap<FloaterId, ActiveInjection>,
    pub compressor: CompressorState,
    /// Expansion work booked by `release_air`, J. Non-decreasing.
    pub released_energy_j: f64,
}

impl PneumaticSystem {
    pub fn new(config: PneumaticConfig, floater_count: u32) -> Self {
        let states = (0..floater_count)
            .map(|_| FloaterAirState::ambient(&config))
            .collect();
        Self {
            config,
            states,
            active: BTreeMap::new(),
            compressor: CompressorState::default(),
            released_energy_j: 0.0,
        }
    }

    pub fn config(&self) -> &PneumaticConfig {
        &self.config
    }

    pub fn air_state(&self, id: FloaterId) -> Option<&FloaterAirState> {
        self.states.get(id as usize)
    }

    pub fn air_states(&self) -> &[FloaterAirState] {
        &self.states
    }

    pub fn active_injections(&self) -> usize {
        self.active.len()
    }

    pub fn is_filling(&self, id: FloaterId) -> bool {
        self.active.contains_key(&id)
    }

    /// Begin the two-phase injection process for a floater.
    ///
    /// Re-entrant requests for a floater already filling are rejected, not
    /// merged; the rejection is reported as an event rather than an error.
    pub fn request_injection(&mut self, floater: &mut Floater, time: SimTime) -> PneumaticEvent {
        let id = floater.id;
        if self.active.contains_key(&id) {
            warn!(floater = id, "injection rejected: already filling");
            return PneumaticEvent::InjectionRejected {
                reason: InjectionRejectReason::AlreadyFilling { floater_id: id },
            };
        }
        if floater.state != FloaterState::WaterFilled {
            return PneumaticEvent::InjectionRejected {
                reason: InjectionRejectReason::NotWaterFilled { floater_id: id },
            };
        }
        floater.start_pulse(time);
        self.active.insert(
            id,
            ActiveInjection {
                phase: InjectionPhase::ValveDelay,
                elapsed_s: 0.0,
            },
        );
        debug!(floater = id, time, "injection started");
        PneumaticEvent::InjectionStarted { floater_id: id }
    }

    /// Advance every active injection and the compressor duty cycle.
    pub fn update(&mut self, dt: f64, floaters: &mut [Floater], time: SimTime) -> Vec<PneumaticEvent> {
        let mut events = Vec::new();
        let mut completed = Vec::new();

        for (id, injection) in self.active.iter_mut() {
            injection.elapsed_s += dt;
            if injection.phase == InjectionPhase::ValveDelay {
                if injection.elapsed_s < self.config.valve_delay_s {
                    continue;
                }
                injection.phase = InjectionPhase::Filling;
            }
            let filling_elapsed = injection.elapsed_s - self.config.valve_delay_s;
            let fraction = (filling_elapsed / self.config.injection_duration_s).clamp(0.0, 1.0);

            let Some(floater) = floaters.get_mut(*id as usize) else {
                completed.push(*id);
                continue;
            };
            let Some(state) = self.states.get_mut(*id as usize) else {
                completed.push(*id);
                continue;
            };

            // Linear ramp from ambient to compressor conditions.
            let cfg = &self.config;
            state.fill_fraction = fraction;
            state.pressure_pa = cfg.ambient_pressure_pa
                + (cfg.compressor_pressure_pa - cfg.ambient_pressure_pa) * fraction;
            state.temperature_k = AMBIENT_TEMPERATURE_K
                + (cfg.compressor_air_temperature_k - AMBIENT_TEMPERATURE_K) * fraction;
            let full_mass = cfg.compressor_pressure_pa * floater.config().volume_m3
                / (AIR_GAS_CONSTANT * cfg.compressor_air_temperature_k.max(1.0));
            state.air_mass_kg = full_mass * fraction;

            floater.set_fill_progress(fraction);
            if fraction >= 1.0 {
                floater.complete_fill(time);
                completed.push(*id);
                events.push(PneumaticEvent::InjectionCompleted { floater_id: *id });
            }
        }
        for id in completed {
            self.active.remove(&id);
        }

        events.extend(self.update_compressor(dt));
        events
    }

    /// Vent a floater at the top of the loop: reset it to water-filled and
    /// book the isothermal expansion work as released energy.
    pub fn release_air(&mut self, floater: &mut Floater, time: SimTime) -> PneumaticEvent {
        let id = floater.id;
        self.active.remove(&id);

        let mut energy_j = 0.0;
        if let Some(state) = self.states.get_mut(id as usize) {
            let ratio = state.pressure_pa / self.config.ambient_pressure_pa;
            // Expansion work only exists above ambient; the log is guarded.
            if ratio > 1.0 {
                energy_j = state.pressure_pa
                    * floater.config().volume_m3
                    * state.fill_fraction
                    * ratio.ln();
            }
            *state = FloaterAirState::ambient(&self.config);
        }
        self.released_energy_j += energy_j;
        floater.release(time);
        debug!(floater = id, energy_j, "air released");
        PneumaticEvent::AirReleased {
            floater_id: id,
            energy_j,
        }
    }

    fn update_compressor(&mut self, dt: f64) -> Vec<PneumaticEvent> {
        let mut events = Vec::new();
        if self.compressor.running {
            self.compressor.energy_used_j += self.config.compressor_power_w * dt;
        }
        self.compressor.elapsed_s += dt;
        while self.compressor.elapsed_s >= self.config.compressor_half_period_s {
            self.compressor.elapsed_s -= self.config.compressor_half_period_s;
            self.compressor.running = !self.compressor.running;
            events.push(PneumaticEvent::CompressorToggled {
                running: self.compressor.running,
            });
        }
        events
    }

    pub fn reset(&mut self) {
        self.active.clear();
        for state in &mut self.states {
            *state = FloaterAirState::ambient(&self.config);
        }
        self.compressor = CompressorState::default();
        self.released_energy_j = 0.0;
    }
}

// ============================================================================
// Tests
// ============================================================================
