//! Engine: owns every subsystem, advances them in a fixed order each tick,
//! and exposes the snapshot/command interface consumed by the host.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{info, warn};

use crate::chain::{self, ChainConfig, ChainState};
use crate::control::{
    ControlAction, ControlConfig, ControlContext, ControlEvent, Coordinator,
};
use crate::drivetrain::{ClutchTransition, Drivetrain, DrivetrainConfig};
use crate::enhancements::{EnhancementConfig, Enhancements};
use crate::floater::{Floater, FloaterConfig, FloaterState, FluidContext};
use crate::generator::{Generator, GeneratorConfig};
use crate::pneumatics::{FloaterAirState, PneumaticConfig, PneumaticEvent, PneumaticSystem};
use crate::safety::{SafetyConfig, SafetyLevel, SafetyMonitor, SafetyReading, SafetyTransition, SafetyWarning};
use crate::types::{
    Command, ConfigError, ControlError, EventId, FloaterError, PhysicsError, SimError, SimTime,
    SNAPSHOT_EVENT_TAIL,
};

// ============================================================================
// Environment
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub water_density_kg_m3: f64,
    pub gravity_m_s2: f64,
    /// Height of the ascent span; floaters venting above this are released.
    pub tank_height_m: f64,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            water_density_kg_m3: crate::types::WATER_DENSITY_KG_M3,
            gravity_m_s2: crate::types::GRAVITY_M_S2,
            tank_height_m: 10.0,
        }
    }
}

impl EnvironmentConfig {
    pub fn validate(&self) -> Result<(), crate::types::EnvironmentError> {
        let check = |name: &'static str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(crate::types::EnvironmentError::NonPositive { name, value })
            }
        };
        check("water_density_kg_m3", self.water_density_kg_m3)?;
        check("gravity_m_s2", self.gravity_m_s2)?;
        check("tank_height_m", self.tank_height_m)?;
        Ok(())
    }
}

// ============================================================================
// Engine Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub floater_count: u32,
    pub floater: FloaterConfig,
    pub environment: EnvironmentConfig,
    pub chain: ChainConfig,
    pub drivetrain: DrivetrainConfig,
    pub generator: GeneratorConfig,
    pub pneumatics: PneumaticConfig,
    pub control: ControlConfig,
    pub safety: SafetyConfig,
    pub enhancements: EnhancementConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            floater_count: 8,
            floater: FloaterConfig::default(),
            environment: EnvironmentConfig::default(),
            chain: ChainConfig::default(),
            drivetrain: DrivetrainConfig::default(),
            generator: GeneratorConfig::default(),
            pneumatics: PneumaticConfig::default(),
            control: ControlConfig::default(),
            safety: SafetyConfig::default(),
            enhancements: EnhancementConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Fail-fast validation of every section. Nothing is clamped here:
    /// invalid construction input is an error, not a repair.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.floater_count < 1 {
            return Err(ConfigError::FloaterCount {
                count: self.floater_count,
            }
            .into());
        }
        self.floater.validate()?;
        self.environment.validate()?;
        self.chain.validate()?;
        self.drivetrain.validate()?;
        self.generator.validate()?;
        self.pneumatics.validate()?;
        self.control.validate()?;
        self.safety.validate()?;
        self.enhancements.validate()?;
        Ok(())
    }
}

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    Started,
    Stopped,
    Reset,
    Faulted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SimEventKind {
    Lifecycle { change: LifecycleEvent },
    Command { command: Command },
    Control(ControlEvent),
    Pneumatic(PneumaticEvent),
    Clutch(ClutchTransition),
    Safety(SafetyTransition),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    pub id: EventId,
    pub time: SimTime,
    pub kind: SimEventKind,
}

// ============================================================================
// Run State and Snapshot
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Stopped,
    Running,
    /// A physics fault was latched; only `reset` leaves this state.
    Faulted,
}

/// Everything the host needs to render or log one tick. Pure value type:
/// querying it twice without an intervening step yields identical data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub time: SimTime,
    pub run_state: RunState,
    pub floaters: Vec<Floater>,
    pub air_states: Vec<FloaterAirState>,
    pub chain: ChainState,
    pub drivetrain: Drivetrain,
    pub generator: Generator,
    pub safety_level: SafetyLevel,
    pub safety_warnings: Vec<SafetyWarning>,
    /// Tail of the engine journal, most recent last.
    pub recent_events: Vec<SimEvent>,
    pub released_energy_j: f64,
    pub compressor_energy_j: f64,
    /// Delivered electrical energy minus compressor draw.
    pub net_energy_j: f64,
}

// ============================================================================
// Engine
// ============================================================================

type SafetyCallback = Box<dyn FnMut(&SafetyTransition) + Send>;

pub struct Engine {
    config: EngineConfig,
    time: SimTime,
    run_state: RunState,
    floaters: Vec<Floater>,
    pneumatics: PneumaticSystem,
    enhancements: Enhancements,
    chain_state: ChainState,
    drivetrain: Drivetrain,
    generator: Generator,
    safety: SafetyMonitor,
    coordinator: Coordinator,
    manual_clutch_override: Option<bool>,
    pending_commands: VecDeque<Command>,
    journal: Vec<SimEvent>,
    next_event_id: EventId,
    safety_callbacks: Vec<SafetyCallback>,
    last_snapshot: Option<EngineSnapshot>,
    fault: Option<PhysicsError>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, SimError> {
        config.validate()?;
        let floaters = Self::build_floaters(&config)?;
        let pneumatics = PneumaticSystem::new(config.pneumatics.clone(), config.floater_count);
        let enhancements = Enhancements::new(config.enhancements.clone());
        let drivetrain = Drivetrain::new(&config.drivetrain);
        let coordinator = Coordinator::new(&config.control);
        Ok(Self {
            config,
            time: 0.0,
            run_state: RunState::Stopped,
            floaters,
            pneumatics,
            enhancements,
            chain_state: ChainState::default(),
            drivetrain,
            generator: Generator::new(),
            safety: SafetyMonitor::new(),
            coordinator,
            manual_clutch_override: None,
            pending_commands: VecDeque::new(),
            journal: Vec::new(),
            next_event_id: 0,
            safety_callbacks: Vec::new(),
            last_snapshot: None,
            fault: None,
        })
    }

    /// Evenly space the floaters along the ascent span, all water-filled.
    fn build_floaters(config: &EngineConfig) -> Result<Vec<Floater>, FloaterError> {
        let count = config.floater_count;
        let spacing = config.environment.tank_height_m / count as f64;
        (0..count)
            .map(|id| Floater::new(id, config.floater.clone(), id as f64 * spacing))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn time(&self) -> SimTime {
        self.time
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn safety_level(&self) -> SafetyLevel {
        self.safety.level()
    }

    pub fn safety_transitions(&self) -> &[SafetyTransition] {
        self.safety.transitions()
    }

    pub fn journal(&self) -> &[SimEvent] {
        &self.journal
    }

    pub fn floaters(&self) -> &[Floater] {
        &self.floaters
    }

    #[cfg(test)]
    pub(crate) fn floaters_mut(&mut self) -> &mut [Floater] {
        &mut self.floaters
    }

    /// Build the current snapshot. Pure read; no state changes.
    pub fn snapshot(&self) -> EngineSnapshot {
        let tail_start = self.journal.len().saturating_sub(SNAPSHOT_EVENT_TAIL);
        EngineSnapshot {
            time: self.time,
            run_state: self.run_state,
            floaters: self.floaters.clone(),
            air_states: self.pneumatics.air_states().to_vec(),
            chain: self.chain_state,
            drivetrain: self.drivetrain.clone(),
            generator: self.generator.clone(),
            safety_level: self.safety.level(),
            safety_warnings: self.safety.warnings().to_vec(),
            recent_events: self.journal[tail_start..].to_vec(),
            released_energy_j: self.pneumatics.released_energy_j,
            compressor_energy_j: self.pneumatics.compressor.energy_used_j,
            net_energy_j: self.generator.energy_delivered_j
                - self.pneumatics.compressor.energy_used_j,
        }
    }

    /// The snapshot from the last completed step. After a physics fault this
    /// is the last good state; mid-fault mutations are never published.
    pub fn last_snapshot(&self) -> Option<&EngineSnapshot> {
        self.last_snapshot.as_ref()
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    pub fn start(&mut self) -> Result<(), SimError> {
        match self.run_state {
            RunState::Running => Err(ControlError::AlreadyRunning.into()),
            RunState::Faulted => Err(SimError::Physics(
                self.fault.clone().unwrap_or(PhysicsError {
                    quantity: "unknown",
                    value: f64::NAN,
                    time: self.time,
                }),
            )),
            RunState::Stopped => {
                self.run_state = RunState::Running;
                self.record_event(SimEventKind::Lifecycle {
                    change: LifecycleEvent::Started,
                });
                info!(time = self.time, "engine started");
                Ok(())
            }
        }
    }

    /// Idempotent: stopping a stopped engine is a no-op.
    pub fn stop(&mut self) {
        if self.run_state == RunState::Running {
            self.run_state = RunState::Stopped;
            self.coordinator.stop_system();
            self.record_event(SimEventKind::Lifecycle {
                change: LifecycleEvent::Stopped,
            });
            info!(time = self.time, "engine stopped");
        }
    }

    /// Rebuild floaters and zero every accumulator. Allowed in any state,
    /// including mid-run and after a fault.
    pub fn reset(&mut self) -> Result<(), SimError> {
        self.floaters = Self::build_floaters(&self.config)?;
        self.pneumatics.reset();
        self.enhancements = Enhancements::new(self.config.enhancements.clone());
        self.chain_state = ChainState::default();
        self.drivetrain = Drivetrain::new(&self.config.drivetrain);
        self.generator.reset();
        self.safety.reset();
        self.coordinator.reset(&self.config.control);
        self.manual_clutch_override = None;
        self.pending_commands.clear();
        self.time = 0.0;
        self.run_state = RunState::Stopped;
        self.fault = None;
        self.last_snapshot = None;
        self.record_event(SimEventKind::Lifecycle {
            change: LifecycleEvent::Reset,
        });
        info!("engine reset");
        Ok(())
    }

    /// Validate and apply a new configuration. Only legal while stopped.
    pub fn configure(&mut self, config: EngineConfig) -> Result<(), SimError> {
        if self.run_state == RunState::Running {
            return Err(ControlError::NotStopped.into());
        }
        config.validate()?;
        self.config = config;
        self.reset()
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    /// Queue a command; it is applied at the start of the next step.
    pub fn submit(&mut self, command: Command) {
        self.pending_commands.push_back(command);
    }

    pub fn start_pulse(&mut self, floater_id: u32) -> Result<(), SimError> {
        if floater_id >= self.config.floater_count {
            return Err(FloaterError::NotFound {
                id: floater_id,
                count: self.config.floater_count,
            }
            .into());
        }
        self.submit(Command::StartPulse { floater_id });
        Ok(())
    }

    pub fn set_load(&mut self, load_factor: f64) {
        self.submit(Command::SetLoad { load_factor });
    }

    pub fn set_clutch_state(&mut self, engaged: bool) {
        self.submit(Command::SetClutch { engaged });
    }

    pub fn clear_clutch_override(&mut self) {
        self.submit(Command::ClearClutchOverride);
    }

    /// The handler fires synchronously on every safety-level transition.
    pub fn register_safety_callback(
        &mut self,
        callback: impl FnMut(&SafetyTransition) + Send + 'static,
    ) {
        self.safety_callbacks.push(Box::new(callback));
    }

    // -------------------------------------------------------------------------
    // Stepping
    // -------------------------------------------------------------------------

    /// Advance the whole plant by `dt` seconds of logical time.
    ///
    /// Fixed order: commands -> coordinator -> pneumatics -> enhancements ->
    /// floater dynamics -> aggregation -> drivetrain -> generator -> safety.
    pub fn step(&mut self, dt: f64) -> Result<EngineSnapshot, SimError> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(ControlError::InvalidTimeStep { dt }.into());
        }
        match self.run_state {
            RunState::Running => {}
            RunState::Stopped => return Err(ControlError::NotRunning.into()),
            RunState::Faulted => {
                let fault = self.fault.clone().unwrap_or(PhysicsError {
                    quantity: "unknown",
                    value: f64::NAN,
                    time: self.time,
                });
                return Err(SimError::Physics(fault));
            }
        }
        let time = self.time;

        // 1. Host commands queued since the last step.
        while let Some(command) = self.pending_commands.pop_front() {
            self.apply_command(command, time);
        }

        // 2. Control coordinator: logical-time processes fire in order.
        let ctx = ControlContext {
            angular_velocity_rad_s: self.drivetrain.angular_velocity_rad_s,
            floater_count: self.config.floater_count,
        };
        let out = self.coordinator.advance(dt, &self.config.control, &ctx);
        for event in out.events {
            self.record_event(SimEventKind::Control(event));
        }
        for action in out.actions {
            self.apply_action(action, time);
        }

        // 3. Pneumatic fill processes and the compressor duty cycle.
        let events = self.pneumatics.update(dt, &mut self.floaters, time);
        for event in events {
            self.record_event(SimEventKind::Pneumatic(event));
        }

        // 4. Enhancement state, including the pulse-and-coast override.
        self.enhancements.advance(dt);
        self.apply_clutch_override(dt);

        // 5. Floater dynamics.
        let density = self
            .enhancements
            .effective_density(self.config.environment.water_density_kg_m3);
        let drag_scale = self.enhancements.drag_scale();
        let boost = self.enhancements.buoyancy_boost();
        let ambient = self.config.pneumatics.ambient_pressure_pa;
        for index in 0..self.floaters.len() {
            let gauge = if self.floaters[index].is_pulsing {
                self.pneumatics
                    .air_state(index as u32)
                    .map(|s| (s.pressure_pa - ambient).max(0.0))
                    .unwrap_or(0.0)
            } else {
                0.0
            };
            let fluid = FluidContext {
                effective_density_kg_m3: density,
                drag_scale,
                buoyancy_boost: boost,
                gravity_m_s2: self.config.environment.gravity_m_s2,
                injection_gauge_pa: gauge,
            };
            self.floaters[index].update(dt, &fluid);
            let net = self.floaters[index].forces.net_n;
            let velocity = self.floaters[index].velocity_m_s;
            self.check_finite("floater net force", net)?;
            self.check_finite("floater velocity", velocity)?;
        }

        // Floaters that crest the ascent span vent their air.
        let top = self.config.environment.tank_height_m;
        for index in 0..self.floaters.len() {
            if self.floaters[index].state == FloaterState::Ascending
                && self.floaters[index].position_m >= top
            {
                let event = self
                    .pneumatics
                    .release_air(&mut self.floaters[index], time);
                self.record_event(SimEventKind::Pneumatic(event));
            }
        }

        // 6. Aggregate chain torque.
        self.chain_state = chain::aggregate(
            &mut self.floaters,
            &self.config.chain,
            self.drivetrain.angular_velocity_rad_s,
        );
        self.check_finite("chain torque", self.chain_state.net_torque_nm)?;

        // 7. Drivetrain and clutch.
        if let Some(transition) = self.drivetrain.update(
            self.chain_state.net_torque_nm,
            dt,
            &self.config.drivetrain,
        ) {
            self.record_event(SimEventKind::Clutch(transition));
        }
        self.check_finite("angular velocity", self.drivetrain.angular_velocity_rad_s)?;

        // 8. Electrical conversion.
        self.generator
            .update(self.drivetrain.output_power_w, dt, &self.config.generator);
        self.check_finite("electrical power", self.generator.electrical_power_w)?;

        // 9. Safety evaluation, callbacks, and the built-in response.
        let reading = SafetyReading {
            speed_rad_s: self.drivetrain.angular_velocity_rad_s,
            torque_nm: self.chain_state.net_torque_nm,
            power_w: self.generator.electrical_power_w,
            pressure_pa: self
                .pneumatics
                .air_states()
                .iter()
                .map(|s| s.pressure_pa)
                .fold(0.0, f64::max),
        };
        // Same clock as the journal entry that wraps the transition.
        let transition = self.safety.evaluate(&reading, &self.config.safety, time);
        if let Some(transition) = transition {
            self.record_event(SimEventKind::Safety(transition));
            for callback in &mut self.safety_callbacks {
                callback(&transition);
            }
            if transition.to == SafetyLevel::Emergency {
                self.emergency_response();
            }
        }

        self.time += dt;
        let snapshot = self.snapshot();
        self.last_snapshot = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// EMERGENCY: disengage the clutch and stop the run.
    fn emergency_response(&mut self) {
        warn!(time = self.time, "emergency response: disengaging and stopping");
        if let Some(transition) = self.drivetrain.clutch.set_override(false) {
            self.record_event(SimEventKind::Clutch(transition));
        }
        self.manual_clutch_override = Some(false);
        self.coordinator.stop_system();
        self.record_event(SimEventKind::Control(ControlEvent::SystemStopped));
        self.run_state = RunState::Stopped;
        self.record_event(SimEventKind::Lifecycle {
            change: LifecycleEvent::Stopped,
        });
    }

    /// Manual override wins over pulse-and-coast; the FSM runs otherwise.
    fn apply_clutch_override(&mut self, dt: f64) {
        if let Some(engaged) = self.manual_clutch_override {
            if let Some(transition) = self.drivetrain.clutch.set_override(engaged) {
                self.record_event(SimEventKind::Clutch(transition));
            }
            return;
        }
        match self
            .enhancements
            .clutch_override(dt, self.drivetrain.angular_velocity_rad_s)
        {
            Some(engaged) => {
                if let Some(transition) = self.drivetrain.clutch.set_override(engaged) {
                    self.record_event(SimEventKind::Clutch(transition));
                }
            }
            None => self.drivetrain.clutch.clear_override(),
        }
    }

    fn apply_command(&mut self, command: Command, time: SimTime) {
        self.record_event(SimEventKind::Command {
            command: command.clone(),
        });
        match command {
            Command::StartPulse { floater_id } => {
                self.inject(floater_id, time);
            }
            Command::SetClutch { engaged } => {
                self.manual_clutch_override = Some(engaged);
            }
            Command::ClearClutchOverride => {
                self.manual_clutch_override = None;
            }
            Command::SetLoad { load_factor } => {
                self.generator.set_load(load_factor);
            }
        }
    }

    fn apply_action(&mut self, action: ControlAction, time: SimTime) {
        match action {
            ControlAction::InjectFloater { floater_id } => {
                self.inject(floater_id, time);
            }
            ControlAction::SetClutch { engaged } => {
                self.manual_clutch_override = Some(engaged);
            }
            ControlAction::Wait => {}
        }
    }

    fn inject(&mut self, floater_id: u32, time: SimTime) {
        if let Some(floater) = self.floaters.get_mut(floater_id as usize) {
            let event = self.pneumatics.request_injection(floater, time);
            self.record_event(SimEventKind::Pneumatic(event));
        }
    }

    fn check_finite(&mut self, quantity: &'static str, value: f64) -> Result<(), SimError> {
        if value.is_finite() {
            return Ok(());
        }
        let fault = PhysicsError {
            quantity,
            value,
            time: self.time,
        };
        warn!(%fault, "physics fault latched; engine halted");
        self.fault = Some(fault.clone());
        self.run_state = RunState::Faulted;
        self.coordinator.stop_system();
        self.record_event(SimEventKind::Lifecycle {
            change: LifecycleEvent::Faulted,
        });
        Err(SimError::Physics(fault))
    }

    fn record_event(&mut self, kind: SimEventKind) {
        let event = SimEvent {
            id: self.next_event_id,
            time: self.time,
            kind,
        };
        self.next_event_id = self.next_event_id.saturating_add(1);
        self.journal.push(event);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> EngineConfig {
        EngineConfig {
            floater_count: 3,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn new_rejects_invalid_config() {
        let mut config = small_config();
        config.floater_count = 0;
        assert!(matches!(
            Engine::new(config),
            Err(SimError::Config(ConfigError::FloaterCount { count: 0 }))
        ));

        let mut config = small_config();
        config.floater.volume_m3 = -1.0;
        assert!(Engine::new(config).is_err());
    }

    #[test]
    fn floaters_spawn_evenly_spaced() {
        let engine = Engine::new(small_config()).unwrap();
        let positions: Vec<f64> = engine.floaters().iter().map(|f| f.position_m).collect();
        let spacing = engine.config().environment.tank_height_m / 3.0;
        for (index, position) in positions.iter().enumerate() {
            assert!((position - index as f64 * spacing).abs() < 1e-9);
        }
        assert!(engine
            .floaters()
            .iter()
            .all(|f| f.state == FloaterState::WaterFilled));
    }

    #[test]
    fn lifecycle_rules() {
        let mut engine = Engine::new(small_config()).unwrap();
        // Step before start is rejected.
        assert!(matches!(
            engine.step(0.1),
            Err(SimError::Control(ControlError::NotRunning))
        ));
        engine.start().unwrap();
        assert!(matches!(
            engine.start(),
            Err(SimError::Control(ControlError::AlreadyRunning))
        ));
        // Stop is idempotent.
        engine.stop();
        engine.stop();
        assert_eq!(engine.run_state(), RunState::Stopped);
        // Reset mid-run is allowed.
        engine.start().unwrap();
        engine.step(0.1).unwrap();
        engine.reset().unwrap();
        assert_eq!(engine.time(), 0.0);
        assert_eq!(engine.run_state(), RunState::Stopped);
    }

    #[test]
    fn invalid_time_step_is_rejected() {
        let mut engine = Engine::new(small_config()).unwrap();
        engine.start().unwrap();
        assert!(engine.step(0.0).is_err());
        assert!(engine.step(-1.0).is_err());
        assert!(engine.step(f64::NAN).is_err());
    }

    #[test]
    fn configure_requires_stopped_engine() {
        let mut engine = Engine::new(small_config()).unwrap();
        engine.start().unwrap();
        assert!(matches!(
            engine.configure(small_config()),
            Err(SimError::Control(ControlError::NotStopped))
        ));
        engine.stop();
        engine.configure(EngineConfig::default()).unwrap();
        assert_eq!(engine.floaters().len(), 8);
    }

    #[test]
    fn start_pulse_validates_floater_id() {
        let mut engine = Engine::new(small_config()).unwrap();
        assert!(matches!(
            engine.start_pulse(99),
            Err(SimError::Floater(FloaterError::NotFound { id: 99, .. }))
        ));
        engine.start_pulse(1).unwrap();
        engine.start().unwrap();
        engine.step(0.05).unwrap();
        assert_eq!(engine.floaters()[1].state, FloaterState::Filling);
    }

    #[test]
    fn snapshot_is_idempotent_between_steps() {
        let mut engine = Engine::new(small_config()).unwrap();
        engine.start().unwrap();
        engine.step(0.1).unwrap();
        let first = engine.snapshot();
        let second = engine.snapshot();
        assert_eq!(first, second);
    }

    #[test]
    fn journal_tail_is_bounded() {
        let mut engine = Engine::new(small_config()).unwrap();
        engine.start().unwrap();
        for _ in 0..500 {
            if engine.step(0.05).is_err() {
                break;
            }
        }
        let snapshot = engine.snapshot();
        assert!(snapshot.recent_events.len() <= crate::types::SNAPSHOT_EVENT_TAIL);
        assert!(!engine.journal().is_empty());
    }

    #[test]
    fn set_load_caps_generator_output() {
        let mut engine = Engine::new(small_config()).unwrap();
        engine.set_load(0.0);
        engine.start().unwrap();
        for _ in 0..50 {
            engine.step(0.05).unwrap();
        }
        assert_eq!(engine.snapshot().generator.electrical_power_w, 0.0);
    }
}
