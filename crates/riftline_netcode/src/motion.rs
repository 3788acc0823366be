//! # Deterministic Motion
//!
//! The input-application function shared bit-for-bit by client prediction and
//! the authoritative server. Pure: no randomness, no wall-clock reads, so a
//! replay of the same inputs from the same state is exact.
//!
//! ```text
//! velocity.xz  = move_input * move_speed
//! velocity.y   = jump_velocity            (if jump held)
//! velocity.y  += gravity * dt
//! position    += velocity * dt
//! position.y   < 0  =>  position.y = 0, velocity.y = 0
//! ```

use riftline_shared::{InputCmd, PlayerId, Snapshot};

use crate::config::MotionParams;

/// Applies one input to one state over one fixed step.
///
/// Implementations must be pure and order-sensitive but time-independent.
pub trait InputApplier: Send + Sync {
    /// Returns the state after applying `input` for `dt` seconds.
    fn apply(&self, state: &Snapshot, input: &InputCmd, dt: f32) -> Snapshot;
}

/// Minimum viable deterministic movement.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MotionModel {
    params: MotionParams,
}

impl MotionModel {
    /// Creates a model with the given parameters.
    #[must_use]
    pub const fn new(params: MotionParams) -> Self {
        Self { params }
    }

    /// Parameters in use.
    #[must_use]
    pub const fn params(&self) -> &MotionParams {
        &self.params
    }
}

impl InputApplier for MotionModel {
    fn apply(&self, state: &Snapshot, input: &InputCmd, dt: f32) -> Snapshot {
        let mut next = *state;

        next.velocity.x = input.move_input.x * self.params.move_speed;
        next.velocity.z = input.move_input.y * self.params.move_speed;
        if input.is_jump_pressed() {
            next.velocity.y = self.params.jump_velocity;
        }
        next.velocity.y += self.params.gravity * dt;

        next.position += next.velocity * dt;

        // Ground plane
        if next.position.y < 0.0 {
            next.position.y = 0.0;
            next.velocity.y = 0.0;
        }

        next
    }
}

/// Server-side input validation hook. Anti-cheat plugs in here.
pub trait InputValidator: Send + Sync {
    /// Returns false to discard `cmd` from `player`.
    fn validate(&self, player: PlayerId, cmd: &InputCmd) -> bool;
}

/// Accepts every input.
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAll;

impl InputValidator for AcceptAll {
    #[inline]
    fn validate(&self, _player: PlayerId, _cmd: &InputCmd) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riftline_shared::{Buttons, Vec2, Vec3};

    const DT: f32 = 0.02;

    fn model() -> MotionModel {
        MotionModel::new(MotionParams::default())
    }

    #[test]
    fn test_horizontal_movement() {
        let cmd = InputCmd::new(1, Vec2::new(1.0, 0.0), Buttons::NONE);
        let next = model().apply(&Snapshot::empty(0), &cmd, DT);

        assert!((next.position.x - 5.0 * DT).abs() < 1e-6);
        assert!((next.velocity.x - 5.0).abs() < 1e-6);
        // Gravity pulled below ground, then clamped
        assert_eq!(next.position.y, 0.0);
        assert_eq!(next.velocity.y, 0.0);
    }

    #[test]
    fn test_move_y_drives_z_axis() {
        let cmd = InputCmd::new(1, Vec2::new(0.0, -1.0), Buttons::NONE);
        let next = model().apply(&Snapshot::empty(0), &cmd, DT);
        assert!((next.position.z + 5.0 * DT).abs() < 1e-6);
        assert_eq!(next.position.x, 0.0);
    }

    #[test]
    fn test_jump_then_fall() {
        let jump = InputCmd::new(1, Vec2::ZERO, Buttons::NONE.with(Buttons::JUMP, true));
        let idle = InputCmd::new(2, Vec2::ZERO, Buttons::NONE);
        let m = model();

        let mut state = m.apply(&Snapshot::empty(0), &jump, DT);
        assert!((state.velocity.y - (8.0 - 20.0 * DT)).abs() < 1e-5);
        assert!(state.position.y > 0.0);

        for _ in 0..200 {
            state = m.apply(&state, &idle, DT);
        }
        assert_eq!(state.position.y, 0.0);
        assert_eq!(state.velocity.y, 0.0);
    }

    #[test]
    fn test_preserves_non_motion_fields() {
        let mut state = Snapshot::empty(4);
        state.current_hp = 90;
        state.carried_points = 12;
        state.ability_state = 3;
        state.position = Vec3::new(1.0, 2.0, 3.0);

        let cmd = InputCmd::new(9, Vec2::ZERO, Buttons::NONE);
        let next = model().apply(&state, &cmd, DT);

        assert_eq!(next.current_hp, 90);
        assert_eq!(next.carried_points, 12);
        assert_eq!(next.ability_state, 3);
        assert_eq!(next.tick, 4);
    }

    #[test]
    fn test_is_deterministic() {
        let cmd = InputCmd::new(3, Vec2::new(0.3, 0.7), Buttons::NONE.with(Buttons::JUMP, true));
        let start = Snapshot::empty(0);
        let a = model().apply(&start, &cmd, DT);
        let b = model().apply(&start, &cmd, DT);
        assert_eq!(a.wire_bytes(), b.wire_bytes());
    }
}
