//! Deterministic simulation engine for a buoyancy-chain power plant: floaters
//! cycling a closed loop, pneumatic air injection, an overrunning-clutch
//! drivetrain, a generator, a control coordinator, and a safety monitor.
//!
//! The engine advances in fixed logical-time steps; identically configured
//! and identically driven engines produce identical trajectories.

pub mod chain;
pub mod control;
pub mod drivetrain;
pub mod engine;
pub mod enhancements;
pub mod floater;
pub mod generator;
pub mod pneumatics;
pub mod safety;
pub mod types;

pub use chain::{aggregate, ChainConfig, ChainState};
pub use control::{
    ControlAction, ControlConfig, ControlContext, ControlEvent, Coordinator, CoordinatorOutput,
    FeedbackStrategy, PeriodicStrategy, Strategy, StrategyConfig, FEEDBACK_MAX_ADJUST,
    FEEDBACK_MAX_INTERVAL_S, FEEDBACK_MIN_INTERVAL_S,
};
pub use drivetrain::{
    Clutch, ClutchConfig, ClutchState, ClutchTransition, Drivetrain, DrivetrainConfig,
};
pub use engine::{
    Engine, EngineConfig, EngineSnapshot, EnvironmentConfig, LifecycleEvent, RunState, SimEvent,
    SimEventKind,
};
pub use enhancements::{
    EnhancementConfig, Enhancements, NanobubbleConfig, PulseCoastConfig, PulseCoastPhase,
    ThermalConfig,
};
pub use floater::{Floater, FloaterConfig, FloaterForces, FloaterState, FluidContext};
pub use generator::{Generator, GeneratorConfig};
pub use pneumatics::{
    CompressorState, FloaterAirState, InjectionRejectReason, PneumaticConfig, PneumaticEvent,
    PneumaticSystem,
};
pub use safety::{
    classify, SafetyChannel, SafetyConfig, SafetyLevel, SafetyMonitor, SafetyReading,
    SafetyTransition, SafetyWarning,
};
pub use types::{
    Command, ConfigError, ControlError, EnvironmentError, EventId, FloaterError, FloaterId,
    PhysicsError, SimError, SimTime, AIR_GAS_CONSTANT, AMBIENT_TEMPERATURE_K,
    ATMOSPHERIC_PRESSURE_PA, GRAVITY_M_S2, WATER_DENSITY_KG_M3,
};

#[cfg(test)]
mod tests;
