//! Control coordinator: a cooperative fixed-step scheduler running the
//! injection strategy, a speed monitor, and an emergency-stop latch.
//!
//! The source of truth is logical simulation time, never wall clock. The
//! coordinator's "processes" are explicit timers advanced inside the engine
//! step; they suspend only at their scheduled fire points and resume in
//! scheduling order (control loop before speed monitor when both are due),
//! which keeps runs deterministic and replayable.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{require_finite, require_positive, ConfigError, FloaterId, SimTime};

// ============================================================================
// Actions and Events
// ============================================================================

/// What a strategy asks the engine to do.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ControlAction {
    InjectFloater { floater_id: FloaterId },
    SetClutch { engaged: bool },
    Wait,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ControlEvent {
    Dispatched { action: ControlAction },
    OverSpeed { measured: f64, limit: f64 },
    UnderSpeed { measured: f64, limit: f64 },
    SystemStopped,
}

/// Read-only view of the plant handed to the coordinator each tick. The
/// coordinator never reaches back into the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlContext {
    pub angular_velocity_rad_s: f64,
    pub floater_count: u32,
}

// ============================================================================
// Strategies
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StrategyConfig {
    /// Inject a round-robin floater every fixed interval.
    Periodic { injection_interval_s: f64 },
    /// Periodic injection whose interval tracks a speed target.
    Feedback {
        base_interval_s: f64,
        target_speed_rad_s: f64,
        kp: f64,
        ki: f64,
        kd: f64,
    },
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig::Periodic {
            injection_interval_s: 2.0,
        }
    }
}

impl StrategyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            StrategyConfig::Periodic { injection_interval_s } => {
                require_positive("strategy.injection_interval_s", *injection_interval_s)
            }
            StrategyConfig::Feedback {
                base_interval_s,
                target_speed_rad_s,
                ..
            } => {
                require_positive("strategy.base_interval_s", *base_interval_s)?;
                require_positive("strategy.target_speed_rad_s", *target_speed_rad_s)
            }
        }
    }
}

pub const FEEDBACK_MIN_INTERVAL_S: f64 = 0.5;
pub const FEEDBACK_MAX_INTERVAL_S: f64 = 5.0;
/// Largest relative interval adjustment the feedback strategy may make.
pub const FEEDBACK_MAX_ADJUST: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodicStrategy {
    interval_s: f64,
    next_floater: FloaterId,
    next_due_s: SimTime,
}

impl PeriodicStrategy {
    pub fn new(interval_s: f64) -> Self {
        Self {
            interval_s,
            next_floater: 0,
            next_due_s: 0.0,
        }
    }

    fn poll(&mut self, time: SimTime, ctx: &ControlContext) -> Vec<ControlAction> {
        let mut actions = Vec::new();
        if ctx.floater_count == 0 {
            return actions;
        }
        while time >= self.next_due_s {
            actions.push(ControlAction::InjectFloater {
                floater_id: self.next_floater,
            });
            self.next_floater = (self.next_floater + 1) % ctx.floater_count;
            self.next_due_s += self.interval_s;
        }
        actions
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackStrategy {
    base_interval_s: f64,
    target_speed_rad_s: f64,
    kp: f64,
    ki: f64,
    kd: f64,
    interval_s: f64,
    integral: f64,
    last_error: f64,
    last_update_s: SimTime,
    next_floater: FloaterId,
    next_due_s: SimTime,
}

impl FeedbackStrategy {
    pub fn new(
        base_interval_s: f64,
        target_speed_rad_s: f64,
        kp: f64,
        ki: f64,
        kd: f64,
    ) -> Self {
        Self {
            base_interval_s,
            target_speed_rad_s,
            kp,
            ki,
            kd,
            interval_s: base_interval_s.clamp(FEEDBACK_MIN_INTERVAL_S, FEEDBACK_MAX_INTERVAL_S),
            integral: 0.0,
            last_error: 0.0,
            last_update_s: 0.0,
            next_floater: 0,
            next_due_s: 0.0,
        }
    }

    pub fn interval_s(&self) -> f64 {
        self.interval_s
    }

    /// Relative speed error driving the PID terms.
    fn relative_error(&self, omega: f64) -> f64 {
        (omega - self.target_speed_rad_s) / self.target_speed_rad_s.max(f64::EPSILON)
    }

    fn retune(&mut self, time: SimTime, omega: f64) {
        let error = self.relative_error(omega);
        let elapsed = (time - self.last_update_s).max(f64::EPSILON);
        self.integral = (self.integral + error * elapsed).clamp(-10.0, 10.0);
        let derivative = (error - self.last_error) / elapsed;
        self.last_error = error;
        self.last_update_s = time;

        let raw = self.kp * error + self.ki * self.integral + self.kd * derivative;
        // Above target -> positive error -> stretch the interval (less air).
        let adjust = raw.clamp(-FEEDBACK_MAX_ADJUST, FEEDBACK_MAX_ADJUST);
        self.interval_s = (self.base_interval_s * (1.0 + adjust))
            .clamp(FEEDBACK_MIN_INTERVAL_S, FEEDBACK_MAX_INTERVAL_S);
        debug!(error, interval = self.interval_s, "feedback retune");
    }

    fn poll(&mut self, time: SimTime, ctx: &ControlContext) -> Vec<ControlAction> {
        let mut actions = Vec::new();
        if ctx.floater_count == 0 {
            return actions;
        }
        while time >= self.next_due_s {
            self.retune(time, ctx.angular_velocity_rad_s);
            actions.push(ControlAction::InjectFloater {
                floater_id: self.next_floater,
            });
            self.next_floater = (self.next_floater + 1) % ctx.floater_count;
            self.next_due_s = time + self.interval_s;
        }
        actions
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Strategy {
    Periodic(PeriodicStrategy),
    Feedback(FeedbackStrategy),
}

impl Strategy {
    pub fn from_config(config: &StrategyConfig) -> Self {
        match config {
            StrategyConfig::Periodic { injection_interval_s } => {
                Strategy::Periodic(PeriodicStrategy::new(*injection_interval_s))
            }
            StrategyConfig::Feedback {
                base_interval_s,
                target_speed_rad_s,
                kp,
                ki,
                kd,
            } => Strategy::Feedback(FeedbackStrategy::new(
                *base_interval_s,
                *target_speed_rad_s,
                *kp,
                *ki,
                *kd,
            )),
        }
    }

    pub fn poll(&mut self, time: SimTime, ctx: &ControlContext) -> Vec<ControlAction> {
        match self {
            Strategy::Periodic(s) => s.poll(time, ctx),
            Strategy::Feedback(s) => s.poll(time, ctx),
        }
    }
}

// ============================================================================
// Coordinator
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Period of the control loop polling the strategy, s.
    pub control_period_s: f64,
    /// Period of the coarser speed monitor, s.
    pub speed_monitor_period_s: f64,
    pub overspeed_rad_s: f64,
    pub underspeed_rad_s: f64,
    pub strategy: StrategyConfig,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            control_period_s: 0.1,
            speed_monitor_period_s: 0.5,
            overspeed_rad_s: 45.0,
            underspeed_rad_s: 0.5,
            strategy: StrategyConfig::default(),
        }
    }
}

impl ControlConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("control.control_period_s", self.control_period_s)?;
        require_positive("control.speed_monitor_period_s", self.speed_monitor_period_s)?;
        require_positive("control.overspeed_rad_s", self.overspeed_rad_s)?;
        require_finite("control.underspeed_rad_s", self.underspeed_rad_s)?;
        if self.underspeed_rad_s < 0.0 {
            return Err(ConfigError::OutOfRange {
                name: "control.underspeed_rad_s",
                min: 0.0,
                max: self.overspeed_rad_s,
                value: self.underspeed_rad_s,
            });
        }
        if self.underspeed_rad_s > self.overspeed_rad_s {
            return Err(ConfigError::InvertedBand {
                name: "control.speed_band",
                low: self.underspeed_rad_s,
                high: self.overspeed_rad_s,
            });
        }
        self.strategy.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinator {
    time_s: SimTime,
    next_control_at: SimTime,
    next_monitor_at: SimTime,
    stopped: bool,
    pub strategy: Strategy,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CoordinatorOutput {
    pub actions: Vec<ControlAction>,
    pub events: Vec<ControlEvent>,
}

impl Coordinator {
    pub fn new(config: &ControlConfig) -> Self {
        Self {
            time_s: 0.0,
            // The control loop fires immediately at t = 0; the monitor waits
            // one full period for data to exist.
            next_control_at: 0.0,
            next_monitor_at: config.speed_monitor_period_s,
            stopped: false,
            strategy: Strategy::from_config(&config.strategy),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Halt every cooperative process immediately. Fields already written
    /// stay written; nothing is rolled back.
    pub fn stop_system(&mut self) {
        if !self.stopped {
            warn!(time = self.time_s, "control coordinator stopped");
        }
        self.stopped = true;
    }

    /// Advance logical time by `dt`, firing each process at its scheduled
    /// points in chronological order.
    pub fn advance(&mut self, dt: f64, config: &ControlConfig, ctx: &ControlContext) -> CoordinatorOutput {
        let mut out = CoordinatorOutput::default();
        let end = self.time_s + dt;
        if self.stopped {
            self.time_s = end;
            return out;
        }

        loop {
            let control_due = self.next_control_at <= end;
            let monitor_due = self.next_monitor_at <= end;
            if !control_due && !monitor_due {
                break;
            }
            // Ties resolve in scheduling order: control loop first.
            if control_due && (!monitor_due || self.next_control_at <= self.next_monitor_at) {
                let fire_at = self.next_control_at;
                self.next_control_at += config.control_period_s;
                for action in self.strategy.poll(fire_at, ctx) {
                    out.events.push(ControlEvent::Dispatched { action });
                    if !matches!(action, ControlAction::Wait) {
                        out.actions.push(action);
                    }
                }
            } else {
                self.next_monitor_at += config.speed_monitor_period_s;
                let omega = ctx.angular_velocity_rad_s;
                if omega > config.overspeed_rad_s {
                    out.events.push(ControlEvent::OverSpeed {
                        measured: omega,
                        limit: config.overspeed_rad_s,
                    });
                } else if omega < config.underspeed_rad_s {
                    out.events.push(ControlEvent::UnderSpeed {
                        measured: omega,
                        limit: config.underspeed_rad_s,
                    });
                }
            }
        }

        self.time_s = end;
        out
    }

    pub fn reset(&mut self, config: &ControlConfig) {
        *self = Self::new(config);
    }
}

// ============================================================================
// Tests
// ============================================================================
