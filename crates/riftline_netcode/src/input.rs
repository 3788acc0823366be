//! # Input Source
//!
//! Axis/button polling collaborator. Sampled once per frame; this crate only
//! consumes already-deadzoned values.

use riftline_shared::{Buttons, Vec2};

/// Polled input device.
pub trait InputSource {
    /// Horizontal axis in `[-1, 1]`.
    fn horizontal(&self) -> f32;
    /// Vertical axis in `[-1, 1]`.
    fn vertical(&self) -> f32;
    /// Jump held.
    fn is_jump_pressed(&self) -> bool;
    /// First ability held.
    fn is_ability1_pressed(&self) -> bool;
    /// Second ability held.
    fn is_ability2_pressed(&self) -> bool;
    /// Ultimate held.
    fn is_ultimate_pressed(&self) -> bool;
    /// Scoring held.
    fn is_scoring_pressed(&self) -> bool;

    /// Called once the current frame has been sampled.
    fn end_frame(&mut self) {}
}

/// One frame's worth of sampled input.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct InputSample {
    /// Movement axes.
    pub move_input: Vec2,
    /// Held buttons.
    pub buttons: Buttons,
}

impl InputSample {
    /// Creates a sample.
    #[must_use]
    pub const fn new(move_input: Vec2, buttons: Buttons) -> Self {
        Self { move_input, buttons }
    }

    /// Samples every axis and button of `source` once.
    #[must_use]
    pub fn poll(source: &dyn InputSource) -> Self {
        let buttons = Buttons::NONE
            .with(Buttons::JUMP, source.is_jump_pressed())
            .with(Buttons::ABILITY_1, source.is_ability1_pressed())
            .with(Buttons::ABILITY_2, source.is_ability2_pressed())
            .with(Buttons::ULTIMATE, source.is_ultimate_pressed())
            .with(Buttons::SCORING, source.is_scoring_pressed());

        Self {
            move_input: Vec2::new(source.horizontal(), source.vertical()),
            buttons,
        }
    }
}

/// Replays a fixed script of samples, one per [`ScriptedInput::advance`].
///
/// Holds the last sample once the script runs out.
#[derive(Clone, Debug, Default)]
pub struct ScriptedInput {
    script: Vec<InputSample>,
    cursor: usize,
}

impl ScriptedInput {
    /// Creates a script.
    #[must_use]
    pub fn new(script: Vec<InputSample>) -> Self {
        Self { script, cursor: 0 }
    }

    /// Same sample forever.
    #[must_use]
    pub fn constant(sample: InputSample) -> Self {
        Self::new(vec![sample])
    }

    /// Moves to the next sample.
    pub fn advance(&mut self) {
        if self.cursor + 1 < self.script.len() {
            self.cursor += 1;
        }
    }

    fn current(&self) -> InputSample {
        self.script.get(self.cursor).copied().unwrap_or_default()
    }
}

impl InputSource for ScriptedInput {
    fn horizontal(&self) -> f32 {
        self.current().move_input.x
    }

    fn vertical(&self) -> f32 {
        self.current().move_input.y
    }

    fn is_jump_pressed(&self) -> bool {
        self.current().buttons.contains(Buttons::JUMP)
    }

    fn is_ability1_pressed(&self) -> bool {
        self.current().buttons.contains(Buttons::ABILITY_1)
    }

    fn is_ability2_pressed(&self) -> bool {
        self.current().buttons.contains(Buttons::ABILITY_2)
    }

    fn is_ultimate_pressed(&self) -> bool {
        self.current().buttons.contains(Buttons::ULTIMATE)
    }

    fn is_scoring_pressed(&self) -> bool {
        self.current().buttons.contains(Buttons::SCORING)
    }

    fn end_frame(&mut self) {
        self.advance();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_packs_buttons() {
        let source = ScriptedInput::constant(InputSample::new(
            Vec2::new(0.5, -1.0),
            Buttons::NONE.with(Buttons::SCORING, true),
        ));
        let sample = InputSample::poll(&source);

        assert_eq!(sample.move_input, Vec2::new(0.5, -1.0));
        assert!(sample.buttons.contains(Buttons::SCORING));
        assert!(!sample.buttons.contains(Buttons::JUMP));
    }

    #[test]
    fn test_script_holds_last_sample() {
        let mut source = ScriptedInput::new(vec![
            InputSample::new(Vec2::new(1.0, 0.0), Buttons::NONE),
            InputSample::new(Vec2::new(0.0, 1.0), Buttons::NONE),
        ]);
        assert!((source.horizontal() - 1.0).abs() < f32::EPSILON);
        source.advance();
        source.advance();
        source.advance();
        assert!((source.vertical() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_empty_script_is_neutral() {
        let source = ScriptedInput::default();
        assert_eq!(InputSample::poll(&source), InputSample::default());
    }
}
