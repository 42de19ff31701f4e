//! Display modes and rotations

use enumflags2::{bitflags, BitFlags};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A supported (width, height, refresh-rate) triple for an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mode {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Refresh rate in Hz, rounded to an integer
    pub refresh: u32,
}

impl Mode {
    /// Pixel area, the primary tie-break key for "best mode" selection.
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}@{}", self.width, self.height, self.refresh)
    }
}

/// Output rotation.
///
/// Reflections are excluded by policy; only the four cardinal rotations are
/// allowed. The discriminants are the RandR wire bitmask values, which is
/// also what the `RotateTo` D-Bus method carries.
#[bitflags]
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rotation {
    /// No rotation
    Rotate0 = 0b0001,
    /// 90 degrees counter-clockwise
    Rotate90 = 0b0010,
    /// Upside down
    Rotate180 = 0b0100,
    /// 270 degrees counter-clockwise
    Rotate270 = 0b1000,
}

/// A set of allowed rotations for an output.
pub type RotationSet = BitFlags<Rotation>;

/// The hotkey cycling order: 0 → 90 → 180 → 270 → 0.
pub const ROTATION_CYCLE: [Rotation; 4] = [
    Rotation::Rotate0,
    Rotation::Rotate90,
    Rotation::Rotate180,
    Rotation::Rotate270,
];

impl Rotation {
    /// Decode the D-Bus/RandR wire value; `None` for reflections or garbage.
    pub fn from_wire(value: i32) -> Option<Rotation> {
        match value {
            0b0001 => Some(Rotation::Rotate0),
            0b0010 => Some(Rotation::Rotate90),
            0b0100 => Some(Rotation::Rotate180),
            0b1000 => Some(Rotation::Rotate270),
            _ => None,
        }
    }

    /// The RandR wire value.
    pub fn wire(self) -> i32 {
        self as u16 as i32
    }

    /// Whether this rotation swaps an output's width and height on screen.
    pub fn swaps_dimensions(self) -> bool {
        matches!(self, Rotation::Rotate90 | Rotation::Rotate270)
    }

    /// Rotation angle in degrees.
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Rotate0 => 0,
            Rotation::Rotate90 => 90,
            Rotation::Rotate180 => 180,
            Rotation::Rotate270 => 270,
        }
    }

    /// The next rotation in the fixed cycle that is present in `allowed`.
    ///
    /// Returns `self` unchanged if no other allowed rotation exists, so
    /// callers can detect "nothing to do" by comparison.
    pub fn next_allowed(self, allowed: RotationSet) -> Rotation {
        let Some(current_index) = ROTATION_CYCLE.iter().position(|&r| r == self) else {
            return self;
        };

        let mut i = (current_index + 1) % ROTATION_CYCLE.len();
        loop {
            let candidate = ROTATION_CYCLE[i];
            if candidate == self {
                // Wrapped around; no other rotation is allowed.
                return self;
            }
            if allowed.contains(candidate) {
                return candidate;
            }
            i = (i + 1) % ROTATION_CYCLE.len();
        }
    }
}

impl Default for Rotation {
    fn default() -> Self {
        Rotation::Rotate0
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}
