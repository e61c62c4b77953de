//! Integration tests driving the full engine through multi-subsystem
//! scenarios: injection cycles, clutch engagement, safety escalation, fault
//! latching, and determinism.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::control::StrategyConfig;
use crate::engine::{Engine, EngineConfig, LifecycleEvent, RunState, SimEventKind};
use crate::drivetrain::ClutchState;
use crate::floater::FloaterState;
use crate::pneumatics::PneumaticEvent;
use crate::safety::SafetyLevel;
use crate::types::SimError;

fn config(floater_count: u32) -> EngineConfig {
    EngineConfig {
        floater_count,
        ..EngineConfig::default()
    }
}

/// Run the engine for `seconds` of logical time, stopping early on error.
fn run_for(engine: &mut Engine, seconds: f64, dt: f64) {
    let steps = (seconds / dt).round() as usize;
    for _ in 0..steps {
        if engine.step(dt).is_err() {
            break;
        }
    }
}

#[test]
fn periodic_strategy_injects_round_robin() {
    let mut engine = Engine::new(config(3)).unwrap();
    engine.start().unwrap();
    run_for(&mut engine, 7.0, 0.1);

    // Default strategy: one injection every 2 s starting at t = 0.
    let started: Vec<u32> = engine
        .journal()
        .iter()
        .filter_map(|e| match &e.kind {
            SimEventKind::Pneumatic(PneumaticEvent::InjectionStarted { floater_id }) => {
                Some(*floater_id)
            }
            _ => None,
        })
        .collect();
    assert!(started.len() >= 3);
    assert_eq!(&started[..3], &[0, 1, 2]);
}

#[test]
fn manual_pulse_fills_and_releases_at_the_top() {
    let mut cfg = config(2);
    // Push the automatic strategy far out so only the manual pulse for
    // floater 1 matters (the strategy still fires once at t = 0 for floater 0).
    cfg.control.strategy = StrategyConfig::Periodic {
        injection_interval_s: 1_000.0,
    };
    // Tall tank: the fill must complete well before the floater crests.
    cfg.environment.tank_height_m = 50.0;
    let mut engine = Engine::new(cfg).unwrap();
    engine.start_pulse(1).unwrap();
    engine.start().unwrap();

    // Fill completes after valve delay + injection duration (1.7 s).
    run_for(&mut engine, 2.0, 0.05);
    assert_eq!(engine.floaters()[1].state, FloaterState::Ascending);
    assert_eq!(engine.floaters()[1].fill_progress, 1.0);

    // The floater rises from mid-tank to the top and vents.
    run_for(&mut engine, 10.0, 0.05);
    let released: Vec<u32> = engine
        .journal()
        .iter()
        .filter_map(|e| match &e.kind {
            SimEventKind::Pneumatic(PneumaticEvent::AirReleased { floater_id, .. }) => {
                Some(*floater_id)
            }
            _ => None,
        })
        .collect();
    assert!(released.contains(&1));
    assert_eq!(engine.floaters()[1].state, FloaterState::Descending);
    assert!(engine.snapshot().released_energy_j > 0.0);
}

#[test]
fn vented_floater_sinks_back_and_accepts_reinjection() {
    let mut cfg = config(2);
    cfg.control.strategy = StrategyConfig::Periodic {
        injection_interval_s: 1_000.0,
    };
    let mut engine = Engine::new(cfg).unwrap();
    engine.start_pulse(1).unwrap();
    engine.start().unwrap();

    // Full cycle: fill, rise to the 10 m top, vent, sink back to the floor.
    run_for(&mut engine, 30.0, 0.05);
    assert_eq!(engine.floaters()[1].state, FloaterState::WaterFilled);
    assert_eq!(engine.floaters()[1].position_m, 0.0);

    // The refilled floater is injectable again, closing the loop.
    engine.start_pulse(1).unwrap();
    engine.step(0.05).unwrap();
    assert_eq!(engine.floaters()[1].state, FloaterState::Filling);
    let started = engine
        .journal()
        .iter()
        .filter(|e| {
            matches!(
                e.kind,
                SimEventKind::Pneumatic(PneumaticEvent::InjectionStarted { floater_id: 1 })
            )
        })
        .count();
    assert_eq!(started, 2);
}

#[test]
fn reinjecting_a_filling_floater_is_rejected() {
    let mut cfg = config(2);
    cfg.control.strategy = StrategyConfig::Periodic {
        injection_interval_s: 1_000.0,
    };
    let mut engine = Engine::new(cfg).unwrap();
    engine.start_pulse(1).unwrap();
    engine.start().unwrap();
    engine.step(0.1).unwrap();

    // Second request while the first is still in flight.
    engine.start_pulse(1).unwrap();
    engine.step(0.1).unwrap();
    assert!(engine.journal().iter().any(|e| matches!(
        e.kind,
        SimEventKind::Pneumatic(PneumaticEvent::InjectionRejected { .. })
    )));
}

#[test]
fn emergency_level_triggers_callbacks_and_built_in_stop() {
    let mut cfg = config(4);
    // Any realistic chain torque exceeds this limit immediately.
    cfg.safety.max_torque_nm = 1.0;
    let mut engine = Engine::new(cfg).unwrap();

    let fired = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&fired);
    engine.register_safety_callback(move |transition| {
        if transition.to == SafetyLevel::Emergency {
            flag.store(true, Ordering::SeqCst);
        }
    });

    engine.start().unwrap();
    let snapshot = engine.step(0.1).unwrap();

    assert!(fired.load(Ordering::SeqCst));
    assert_eq!(snapshot.safety_level, SafetyLevel::Emergency);
    // Built-in response: clutch pinned open and the run stopped.
    assert_eq!(snapshot.run_state, RunState::Stopped);
    assert_eq!(snapshot.drivetrain.clutch.state, ClutchState::Disengaged);
    assert!(engine.journal().iter().any(|e| matches!(
        e.kind,
        SimEventKind::Lifecycle {
            change: LifecycleEvent::Stopped
        }
    )));
}

#[test]
fn safety_transition_log_is_ordered() {
    let mut cfg = config(4);
    cfg.safety.max_torque_nm = 1.0;
    let mut engine = Engine::new(cfg).unwrap();
    engine.start().unwrap();
    let _ = engine.step(0.1);
    let log = engine.safety_transitions();
    assert!(!log.is_empty());
    for pair in log.windows(2) {
        assert!(pair[0].time <= pair[1].time);
    }
}

#[test]
fn safety_journal_entry_matches_the_transition_timestamp() {
    let mut cfg = config(4);
    cfg.safety.max_torque_nm = 1.0;
    let mut engine = Engine::new(cfg).unwrap();
    engine.start().unwrap();
    let _ = engine.step(0.1);

    let (event_time, transition_time) = engine
        .journal()
        .iter()
        .find_map(|e| match &e.kind {
            SimEventKind::Safety(transition) => Some((e.time, transition.time)),
            _ => None,
        })
        .unwrap();
    assert_eq!(event_time, transition_time);
}

#[test]
fn physics_fault_latches_until_reset() {
    let mut cfg = config(1);
    // Finite but astronomically large: the buoyancy product overflows to
    // infinity on the first update.
    cfg.environment.water_density_kg_m3 = f64::MAX;
    let mut engine = Engine::new(cfg).unwrap();
    engine.start().unwrap();

    assert!(matches!(engine.step(0.1), Err(SimError::Physics(_))));
    assert_eq!(engine.run_state(), RunState::Faulted);
    // The latch holds: stepping and starting keep failing.
    assert!(matches!(engine.step(0.1), Err(SimError::Physics(_))));
    assert!(matches!(engine.start(), Err(SimError::Physics(_))));
    // No completed step, so no last good snapshot.
    assert!(engine.last_snapshot().is_none());

    // Only reset clears the fault.
    engine.reset().unwrap();
    assert_eq!(engine.run_state(), RunState::Stopped);
}

#[test]
fn mid_run_fault_preserves_the_last_good_snapshot() {
    let mut engine = Engine::new(config(2)).unwrap();
    engine.start().unwrap();
    let good = engine.step(0.1).unwrap();

    // Corrupt one floater; the finiteness check trips on the next step.
    engine.floaters_mut()[0].velocity_m_s = f64::NAN;
    assert!(matches!(engine.step(0.1), Err(SimError::Physics(_))));
    assert_eq!(engine.run_state(), RunState::Faulted);

    // The pre-fault snapshot is still served, unchanged, on every query.
    assert_eq!(engine.last_snapshot(), Some(&good));
    assert!(matches!(engine.step(0.1), Err(SimError::Physics(_))));
    assert_eq!(engine.last_snapshot(), Some(&good));
}

#[test]
fn last_snapshot_tracks_completed_steps() {
    let mut engine = Engine::new(config(2)).unwrap();
    assert!(engine.last_snapshot().is_none());
    engine.start().unwrap();
    let returned = engine.step(0.1).unwrap();
    assert_eq!(engine.last_snapshot(), Some(&returned));
}

#[test]
fn identically_driven_engines_are_identical() {
    let drive = |engine: &mut Engine| {
        engine.start().unwrap();
        engine.set_load(0.7);
        engine.start_pulse(1).unwrap();
        for step in 0..300 {
            if step == 120 {
                engine.set_clutch_state(true);
            }
            if step == 180 {
                engine.clear_clutch_override();
            }
            // An emergency auto-stop ends the run; both engines must hit it
            // at the same step or not at all.
            if engine.step(0.05).is_err() {
                break;
            }
        }
        engine.snapshot()
    };
    let mut a = Engine::new(config(4)).unwrap();
    let mut b = Engine::new(config(4)).unwrap();
    assert_eq!(drive(&mut a), drive(&mut b));
    assert_eq!(a.journal(), b.journal());
}

#[test]
fn long_run_invariants_hold() {
    let mut cfg = config(6);
    cfg.enhancements.nanobubble.enabled = true;
    cfg.enhancements.thermal.enabled = true;
    let mut engine = Engine::new(cfg).unwrap();
    engine.start().unwrap();

    let mut last_released = 0.0;
    let mut last_delivered = 0.0;
    for _ in 0..600 {
        let Ok(snapshot) = engine.step(0.05) else {
            break;
        };
        for floater in &snapshot.floaters {
            assert!((0.0..=1.0).contains(&floater.fill_progress));
            assert!(
                floater.velocity_m_s.abs()
                    <= engine.config().floater.max_velocity_m_s + 1e-9
            );
        }
        let clutch = &snapshot.drivetrain.clutch;
        assert!((0.0..=1.0).contains(&clutch.coefficient));
        let omega = snapshot.drivetrain.angular_velocity_rad_s;
        assert!(omega >= engine.config().drivetrain.min_operating_speed_rad_s);
        assert!(omega <= engine.config().drivetrain.max_operating_speed_rad_s);
        assert!(snapshot.released_energy_j >= last_released);
        assert!(snapshot.generator.energy_delivered_j >= last_delivered);
        last_released = snapshot.released_energy_j;
        last_delivered = snapshot.generator.energy_delivered_j;
    }
}

#[test]
fn pulse_coast_alternates_clutch_without_manual_override() {
    let mut cfg = config(2);
    cfg.enhancements.pulse_coast.enabled = true;
    cfg.enhancements.pulse_coast.pulse_duration_s = 0.5;
    cfg.enhancements.pulse_coast.coast_duration_s = 0.5;
    // Keep the shaft inside the safe band so the alternation actually runs.
    cfg.enhancements.pulse_coast.min_safe_speed_rad_s = 0.0;
    let mut engine = Engine::new(cfg).unwrap();
    engine.start().unwrap();

    let mut engaged = 0;
    let mut coasting = 0;
    for _ in 0..60 {
        let snapshot = engine.step(0.1).unwrap();
        match snapshot.drivetrain.clutch.state {
            ClutchState::Engaged => engaged += 1,
            ClutchState::Disengaged => coasting += 1,
            ClutchState::Slip => {}
        }
    }
    assert!(engaged > 0);
    assert!(coasting > 0);
}

#[test]
fn feedback_strategy_drives_a_full_run() {
    let mut cfg = config(4);
    cfg.control.strategy = StrategyConfig::Feedback {
        base_interval_s: 2.0,
        target_speed_rad_s: 10.0,
        kp: 0.5,
        ki: 0.05,
        kd: 0.0,
    };
    let mut engine = Engine::new(cfg).unwrap();
    engine.start().unwrap();
    run_for(&mut engine, 20.0, 0.1);

    let injections = engine
        .journal()
        .iter()
        .filter(|e| {
            matches!(
                e.kind,
                SimEventKind::Pneumatic(PneumaticEvent::InjectionStarted { .. })
            )
        })
        .count();
    assert!(injections >= 4);
}

#[test]
fn snapshot_round_trips_through_json() {
    let mut engine = Engine::new(config(3)).unwrap();
    engine.start().unwrap();
    run_for(&mut engine, 3.0, 0.1);

    let snapshot = engine.snapshot();
    let json = serde_json::to_string(&snapshot).unwrap();
    let restored: crate::engine::EngineSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(snapshot, restored);
}

#[test]
fn reset_returns_the_plant_to_its_spawn_state() {
    let mut engine = Engine::new(config(3)).unwrap();
    let spawn: Vec<f64> = engine.floaters().iter().map(|f| f.position_m).collect();
    engine.start().unwrap();
    run_for(&mut engine, 5.0, 0.1);
    assert!(engine.time() > 0.0);

    engine.reset().unwrap();
    assert_eq!(engine.time(), 0.0);
    assert_eq!(engine.run_state(), RunState::Stopped);
    let after: Vec<f64> = engine.floaters().iter().map(|f| f.position_m).collect();
    assert_eq!(spawn, after);
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.generator.energy_delivered_j, 0.0);
    assert_eq!(snapshot.released_energy_j, 0.0);
    assert_eq!(snapshot.drivetrain.angular_velocity_rad_s, 0.0);
}

#[test]
fn journal_event_ids_are_strictly_increasing() {
    let mut engine = Engine::new(config(3)).unwrap();
    engine.start().unwrap();
    run_for(&mut engine, 5.0, 0.1);
    let journal = engine.journal();
    assert!(!journal.is_empty());
    for pair in journal.windows(2) {
        assert!(pair[0].id < pair[1].id);
        assert!(pair[0].time <= pair[1].time);
    }
}
