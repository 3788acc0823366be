//! Error-decay smoothing.
//!
//! A correction moves the simulated state at once but the rendered state
//! keeps a visual offset that shrinks by at most `speed * dt` per update.

use riftline_shared::Vec3;

/// Below this the offset is considered gone.
pub const SETTLE_EPSILON: f32 = 0.01;

/// Outstanding visual error.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ErrorSmoother {
    position: Vec3,
    velocity: Vec3,
}

impl ErrorSmoother {
    /// Adds a new correction on top of whatever is still decaying.
    pub fn absorb(&mut self, position: Vec3, velocity: Vec3) {
        self.position += position;
        self.velocity += velocity;
    }

    /// Moves both offsets toward zero by `min(remaining, step)`.
    ///
    /// Returns true once both are under [`SETTLE_EPSILON`]; the offsets are
    /// cleared at that point.
    pub fn decay(&mut self, step: f32) -> bool {
        self.position = self.position.shrink_by(step);
        self.velocity = self.velocity.shrink_by(step);

        if self.is_settled() {
            self.clear();
            return true;
        }
        false
    }

    /// True if nothing is left to hide.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.position.length() < SETTLE_EPSILON && self.velocity.length() < SETTLE_EPSILON
    }

    /// Drops any outstanding offset.
    pub fn clear(&mut self) {
        self.position = Vec3::ZERO;
        self.velocity = Vec3::ZERO;
    }

    /// Positional offset still applied to the rendered state.
    #[must_use]
    pub const fn position(&self) -> Vec3 {
        self.position
    }

    /// Velocity offset still applied to the rendered state.
    #[must_use]
    pub const fn velocity(&self) -> Vec3 {
        self.velocity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decay_is_capped_per_step() {
        let mut smoother = ErrorSmoother::default();
        smoother.absorb(Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO);

        // 10 units/s over 20 ms
        assert!(!smoother.decay(0.2));
        assert!((smoother.position().x - 0.8).abs() < 1e-5);
    }

    #[test]
    fn test_decay_never_overshoots() {
        let mut smoother = ErrorSmoother::default();
        smoother.absorb(Vec3::new(0.05, 0.0, 0.0), Vec3::new(0.0, -0.05, 0.0));

        assert!(smoother.decay(1.0));
        assert_eq!(smoother.position(), Vec3::ZERO);
        assert_eq!(smoother.velocity(), Vec3::ZERO);
    }

    #[test]
    fn test_settles_only_when_both_small() {
        let mut smoother = ErrorSmoother::default();
        smoother.absorb(Vec3::new(0.005, 0.0, 0.0), Vec3::new(0.0, 0.0, 2.0));
        assert!(!smoother.is_settled());

        let mut updates = 0;
        while !smoother.decay(0.2) {
            updates += 1;
            assert!(updates < 100);
        }
        assert!(smoother.is_settled());
    }

    #[test]
    fn test_corrections_accumulate() {
        let mut smoother = ErrorSmoother::default();
        smoother.absorb(Vec3::new(0.5, 0.0, 0.0), Vec3::ZERO);
        smoother.absorb(Vec3::new(0.25, 0.0, 0.0), Vec3::ZERO);
        assert!((smoother.position().x - 0.75).abs() < 1e-6);
    }
}
