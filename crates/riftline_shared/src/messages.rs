//! # Message Types
//!
//! The three records exchanged between roles.
//!
//! ## Wire Economy
//!
//! [`InputCmd`] and [`Snapshot`] are fixed-size `Pod` records so they can be
//! copied straight into a packet buffer. Button booleans are packed into a
//! single bitfield byte and state-machine fields are single bytes.
//!
//! | Record     | Size     |
//! |------------|----------|
//! | `InputCmd` | 16 bytes |
//! | `Snapshot` | 48 bytes |

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::math::{Vec2, Vec3};

/// Identifier of a connected player.
pub type PlayerId = u32;

/// One fixed-duration simulation step.
pub type Tick = u32;

/// Per-producer input sequence number. Strictly increasing, never reused.
pub type SequenceNumber = u32;

// ============================================================================
// INPUT (Client -> Server)
// ============================================================================

/// Button state packed into a single byte.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize)]
pub struct Buttons(pub u8);

impl Buttons {
    /// Jump.
    pub const JUMP: u8 = 1 << 0;
    /// First ability.
    pub const ABILITY_1: u8 = 1 << 1;
    /// Second ability.
    pub const ABILITY_2: u8 = 1 << 2;
    /// Ultimate ability.
    pub const ULTIMATE: u8 = 1 << 3;
    /// Score deposit.
    pub const SCORING: u8 = 1 << 4;

    /// No buttons held.
    pub const NONE: Self = Self(0);

    /// Returns a copy with `flag` set or cleared.
    #[inline]
    #[must_use]
    pub const fn with(self, flag: u8, pressed: bool) -> Self {
        if pressed {
            Self(self.0 | flag)
        } else {
            Self(self.0 & !flag)
        }
    }

    /// Returns true if `flag` is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, flag: u8) -> bool {
        self.0 & flag != 0
    }
}

/// Player input for a single simulation step.
///
/// Immutable once created.
///
/// Size: 16 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct InputCmd {
    /// Producer-local sequence number.
    pub sequence: SequenceNumber,
    /// Analog movement, already deadzoned.
    pub move_input: Vec2,
    /// Button bitfield.
    pub buttons: Buttons,
    /// Padding for alignment.
    pub _padding: [u8; 3],
}

impl InputCmd {
    /// Size in bytes.
    pub const SIZE: usize = 16;

    /// Creates a new input command.
    #[inline]
    #[must_use]
    pub const fn new(sequence: SequenceNumber, move_input: Vec2, buttons: Buttons) -> Self {
        Self {
            sequence,
            move_input,
            buttons,
            _padding: [0; 3],
        }
    }

    /// Returns true if jump is held.
    #[inline]
    #[must_use]
    pub const fn is_jump_pressed(&self) -> bool {
        self.buttons.contains(Buttons::JUMP)
    }

    /// Returns true if the first ability is held.
    #[inline]
    #[must_use]
    pub const fn is_ability1_pressed(&self) -> bool {
        self.buttons.contains(Buttons::ABILITY_1)
    }

    /// Returns true if the second ability is held.
    #[inline]
    #[must_use]
    pub const fn is_ability2_pressed(&self) -> bool {
        self.buttons.contains(Buttons::ABILITY_2)
    }

    /// Returns true if the ultimate is held.
    #[inline]
    #[must_use]
    pub const fn is_ultimate_pressed(&self) -> bool {
        self.buttons.contains(Buttons::ULTIMATE)
    }

    /// Returns true if scoring is held.
    #[inline]
    #[must_use]
    pub const fn is_scoring_pressed(&self) -> bool {
        self.buttons.contains(Buttons::SCORING)
    }

    /// Raw wire bytes.
    #[must_use]
    pub fn wire_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Reads a command from wire bytes. `None` on a length mismatch.
    #[must_use]
    pub fn from_wire_bytes(bytes: &[u8]) -> Option<Self> {
        bytemuck::try_pod_read_unaligned(bytes).ok()
    }
}

// ============================================================================
// SNAPSHOT (Server -> Client)
// ============================================================================

/// Authoritative state of one replicated entity for one tick.
///
/// `last_processed_seq` is the receipt a client uses to know which of its own
/// inputs are already folded into this state.
///
/// Size: 48 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Snapshot {
    /// Newest input sequence folded into this state.
    pub last_processed_seq: SequenceNumber,
    /// Tick this state represents.
    pub tick: Tick,
    /// World position.
    pub position: Vec3,
    /// World velocity.
    pub velocity: Vec3,
    /// Ultimate charge.
    pub ultimate_energy: f32,
    /// Points carried, not yet deposited.
    pub carried_points: i32,
    /// Hit points.
    pub current_hp: i32,
    /// Locomotion state machine.
    pub locomotion_state: u8,
    /// Ability state machine.
    pub ability_state: u8,
    /// Scoring state machine.
    pub scoring_state: u8,
    /// Padding for alignment.
    pub _padding: u8,
}

impl Snapshot {
    /// Size in bytes.
    pub const SIZE: usize = 48;

    /// Empty state at the given tick.
    #[must_use]
    pub const fn empty(tick: Tick) -> Self {
        Self {
            last_processed_seq: 0,
            tick,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            ultimate_energy: 0.0,
            carried_points: 0,
            current_hp: 0,
            locomotion_state: 0,
            ability_state: 0,
            scoring_state: 0,
            _padding: 0,
        }
    }

    /// Raw wire bytes.
    #[must_use]
    pub fn wire_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Reads a snapshot from wire bytes. `None` on a length mismatch.
    #[must_use]
    pub fn from_wire_bytes(bytes: &[u8]) -> Option<Self> {
        bytemuck::try_pod_read_unaligned(bytes).ok()
    }
}

// ============================================================================
// GAME EVENTS (Server -> Client)
// ============================================================================

/// Event type discriminator
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameEventType {
    /// A player was killed.
    PlayerKill = 0,
    /// Carried points were deposited.
    ScoreDeposit = 1,
    /// An ultimate was fired.
    UltimateUsed = 2,
    /// An objective changed hands.
    ObjectiveCaptured = 3,
    /// A player entered the simulation.
    PlayerSpawned = 4,
    /// A player left the simulation.
    PlayerDisconnected = 5,
}

/// Discrete, non-continuous occurrence.
///
/// Never re-sent or interpolated. Delivered at most once.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    /// What happened.
    pub event_type: GameEventType,
    /// Server tick it happened on.
    pub tick: Tick,
    /// Acting player.
    pub player_id: PlayerId,
    /// Affected player or objective (0 = none).
    pub target_id: u32,
    /// Event-specific magnitude (points, damage...).
    pub value: i32,
    /// Where it happened.
    pub position: Vec3,
}

impl GameEvent {
    /// Creates an event with no target, value or position.
    #[must_use]
    pub const fn new(event_type: GameEventType, tick: Tick, player_id: PlayerId) -> Self {
        Self {
            event_type,
            tick,
            player_id,
            target_id: 0,
            value: 0,
            position: Vec3::ZERO,
        }
    }

    /// Sets the target.
    #[must_use]
    pub fn with_target(mut self, target_id: u32) -> Self {
        self.target_id = target_id;
        self
    }

    /// Sets the value.
    #[must_use]
    pub fn with_value(mut self, value: i32) -> Self {
        self.value = value;
        self
    }

    /// Sets the position.
    #[must_use]
    pub fn at(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }
}
