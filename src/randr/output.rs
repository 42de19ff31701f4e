//! Observed hardware state of a single connector

use super::mode::{Mode, Rotation};

/// The live CRTC state of an output that is currently driving a picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveState {
    /// X position in the framebuffer
    pub x: i32,
    /// Y position in the framebuffer
    pub y: i32,
    /// The mode currently programmed
    pub mode: Mode,
    /// Current rotation
    pub rotation: Rotation,
}

/// One physical connector as reported by the RR-screen provider.
#[derive(Debug, Clone)]
pub struct OutputSnapshot {
    /// Stable hardware identifier (e.g. "eDP-1", "HDMI-2")
    pub name: String,
    /// Whether a display is attached
    pub connected: bool,
    /// Whether this is the built-in laptop panel
    pub is_laptop: bool,
    /// The hardware-preferred mode, if the output reports one
    pub preferred_mode: Option<Mode>,
    /// All modes the output supports
    pub modes: Vec<Mode>,
    /// Live state; `None` if the output is off
    pub current: Option<ActiveState>,
    /// Whether the controller designates this output as primary
    pub primary: bool,
    /// Physical width in millimeters (0 if unknown)
    pub mm_width: u32,
    /// Physical height in millimeters (0 if unknown)
    pub mm_height: u32,
}

impl OutputSnapshot {
    /// Whether the output supports `mode` (exact width/height/refresh).
    pub fn supports_mode(&self, mode: &Mode) -> bool {
        self.modes.contains(mode)
    }

    /// Whether the output has any mode with the given size.
    pub fn supports_size(&self, width: u32, height: u32) -> bool {
        self.modes
            .iter()
            .any(|m| m.width == width && m.height == height)
    }

    /// The highest refresh rate available at the given size, if any.
    pub fn best_refresh_for_size(&self, width: u32, height: u32) -> Option<u32> {
        self.modes
            .iter()
            .filter(|m| m.width == width && m.height == height)
            .map(|m| m.refresh)
            .max()
    }
}
