//! Force aggregation: per-floater net forces summed into chain torque, with
//! simplified pairwise spacing and wake corrections.
//!
//! This is not a contact solver. Spacing violations get a linear repulsive
//! correction and trailing floaters get a wake drag credit; nothing more.

use serde::{Deserialize, Serialize};

use crate::floater::Floater;
use crate::types::{require_positive, require_unit, ConfigError};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Radius of the drive sprocket the chain wraps, m.
    pub sprocket_radius_m: f64,
    /// Minimum center-to-center spacing between neighbours, m.
    pub min_spacing_m: f64,
    /// Linear stiffness of the spacing correction, N/m.
    pub spacing_stiffness_n_m: f64,
    /// Length of the wake shadow behind a moving floater, m.
    pub wake_length_m: f64,
    /// Fraction of drag refunded to a floater inside a leader's wake, [0, 1].
    pub wake_drag_reduction: f64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            sprocket_radius_m: 0.5,
            min_spacing_m: 0.4,
            spacing_stiffness_n_m: 150.0,
            wake_length_m: 0.8,
            wake_drag_reduction: 0.3,
        }
    }
}

impl ChainConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("chain.sprocket_radius_m", self.sprocket_radius_m)?;
        require_positive("chain.min_spacing_m", self.min_spacing_m)?;
        require_positive("chain.spacing_stiffness_n_m", self.spacing_stiffness_n_m)?;
        require_positive("chain.wake_length_m", self.wake_length_m)?;
        require_unit("chain.wake_drag_reduction", self.wake_drag_reduction)?;
        Ok(())
    }
}

// ============================================================================
// Chain State
// ============================================================================

/// Recomputed from the floater set every tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ChainState {
    /// Net driving force along the chain, N. Ascending-side lift counts
    /// positive, descending-side lift counts against.
    pub net_force_n: f64,
    /// Net torque at the drive sprocket, N·m.
    pub net_torque_nm: f64,
    /// Chain linear velocity at the sprocket, m/s.
    pub linear_velocity_m_s: f64,
    /// Magnitude of the larger side load, N.
    pub tension_n: f64,
}

/// Apply pairwise corrections to the floaters' net forces, then sum them into
/// chain torque. `angular_velocity` is the current sprocket speed.
pub fn aggregate(
    floaters: &mut [Floater],
    config: &ChainConfig,
    angular_velocity: f64,
) -> ChainState {
    apply_interactions(floaters, config);

    let mut ascending_force = 0.0;
    let mut descending_force = 0.0;
    for floater in floaters.iter() {
        if floater.state.is_ascending_side() {
            ascending_force += floater.forces.net_n;
        } else {
            descending_force += floater.forces.net_n;
        }
    }

    // Both sides ride the same chain: upward force on the ascending side and
    // downward force on the descending side drive the sprocket the same way.
    let net_force = ascending_force - descending_force;
    ChainState {
        net_force_n: net_force,
        net_torque_nm: net_force * config.sprocket_radius_m,
        linear_velocity_m_s: angular_velocity * config.sprocket_radius_m,
        tension_n: ascending_force.abs().max(descending_force.abs()),
    }
}

/// Spacing and wake corrections between same-side neighbours.
fn apply_interactions(floaters: &mut [Floater], config: &ChainConfig) {
    for side_ascending in [true, false] {
        let mut members: Vec<usize> = floaters
            .iter()
            .enumerate()
            .filter(|(_, f)| f.state.is_ascending_side() == side_ascending)
            .map(|(i, _)| i)
            .collect();
        members.sort_by(|&a, &b| {
            floaters[a]
                .position_m
                .partial_cmp(&floaters[b].position_m)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        for pair in members.windows(2) {
            let (lower, upper) = (pair[0], pair[1]);
            let gap = floaters[upper].position_m - floaters[lower].position_m;

            if gap < config.min_spacing_m {
                // Linear repulsion pushing the pair apart.
                let correction = config.spacing_stiffness_n_m * (config.min_spacing_m - gap);
                floaters[upper].forces.net_n += correction;
                floaters[lower].forces.net_n -= correction;
            } else if gap <= config.wake_length_m {
                // The trailing floater sits in the leader's wake and gets part
                // of its drag back. On the ascending side the lower floater
                // trails; on the descending side the upper one does.
                let trailing = if side_ascending { lower } else { upper };
                let refund = -floaters[trailing].forces.drag_n * config.wake_drag_reduction;
                floaters[trailing].forces.net_n += refund;
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
