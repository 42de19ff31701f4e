//! Screen-layout value objects

use serde::{Deserialize, Serialize};
use std::fmt;

use super::mode::{Mode, Rotation};
use super::screen::ScreenSnapshot;
use super::{RandrError, Result};

fn default_scale() -> f32 {
    1.0
}

fn default_base_scale() -> u32 {
    1
}

/// One connector's intended state within a [`Config`].
///
/// If `active` is false the geometry, rotation, and refresh fields carry no
/// meaning and must not be fed into fit-checking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Stable hardware identifier
    pub name: String,
    /// Whether a display was attached when this configuration was built;
    /// part of the structural fingerprint used by [`Config::matches`]
    pub connected: bool,
    /// Whether the output should drive a picture
    pub active: bool,
    /// X position in the framebuffer
    pub x: i32,
    /// Y position in the framebuffer
    pub y: i32,
    /// Mode width in pixels (unrotated)
    pub width: u32,
    /// Mode height in pixels (unrotated)
    pub height: u32,
    /// Rotation
    #[serde(default)]
    pub rotation: Rotation,
    /// Refresh rate in Hz
    pub refresh: u32,
    /// Whether this is the primary output
    pub primary: bool,
    /// Per-output UI scale
    #[serde(default = "default_scale")]
    pub scale: f32,
}

impl OutputConfig {
    /// An inactive entry for a connector.
    pub fn off(name: &str, connected: bool) -> OutputConfig {
        OutputConfig {
            name: name.to_owned(),
            connected,
            active: false,
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            rotation: Rotation::Rotate0,
            refresh: 0,
            primary: false,
            scale: 1.0,
        }
    }

    /// Activate this output with `mode` at the given position, rotation 0.
    pub fn turn_on_at(&mut self, mode: Mode, x: i32, y: i32) {
        self.active = true;
        self.x = x;
        self.y = y;
        self.width = mode.width;
        self.height = mode.height;
        self.rotation = Rotation::Rotate0;
        self.refresh = mode.refresh;
    }

    /// The mode this entry asks for.
    pub fn mode(&self) -> Mode {
        Mode {
            width: self.width,
            height: self.height,
            refresh: self.refresh,
        }
    }

    /// Screen-space footprint (x, y, width, height), accounting for
    /// dimension swap under 90°/270° rotation.
    pub fn footprint(&self) -> (i32, i32, u32, u32) {
        if self.rotation.swaps_dimensions() {
            (self.x, self.y, self.height, self.width)
        } else {
            (self.x, self.y, self.width, self.height)
        }
    }

    /// State equality as the cycle engine and sanitizer see it: active flag,
    /// geometry, rotation, refresh, and primary designation.
    pub fn same_state(&self, other: &OutputConfig) -> bool {
        if self.active != other.active {
            return false;
        }
        if !self.active {
            // Both off: remaining fields carry no meaning.
            return true;
        }
        self.x == other.x
            && self.y == other.y
            && self.width == other.width
            && self.height == other.height
            && self.rotation == other.rotation
            && self.refresh == other.refresh
            && self.primary == other.primary
    }
}

impl fmt::Display for OutputConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.active {
            write!(
                f,
                "{}: {}x{}@{} +{}+{} rot {}{}",
                self.name,
                self.width,
                self.height,
                self.refresh,
                self.x,
                self.y,
                self.rotation,
                if self.primary { " (primary)" } else { "" }
            )
        } else if self.connected {
            write!(f, "{}: off", self.name)
        } else {
            write!(f, "{}: disconnected", self.name)
        }
    }
}

/// A complete screen layout: one entry per connector known to the hardware,
/// a clone flag, and the global UI scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Per-connector intended state
    pub outputs: Vec<OutputConfig>,
    /// Whether all active outputs mirror the same image at the origin
    #[serde(default)]
    pub clone: bool,
    /// Global UI scale (max over the active outputs' scales)
    #[serde(default = "default_base_scale")]
    pub base_scale: u32,
}

impl Config {
    /// Snapshot the live hardware state into a configuration.
    pub fn new_current(snapshot: &ScreenSnapshot) -> Config {
        let outputs: Vec<OutputConfig> = snapshot
            .outputs
            .iter()
            .map(|o| match o.current {
                Some(state) => OutputConfig {
                    name: o.name.clone(),
                    connected: o.connected,
                    active: true,
                    x: state.x,
                    y: state.y,
                    width: state.mode.width,
                    height: state.mode.height,
                    rotation: state.rotation,
                    refresh: state.mode.refresh,
                    primary: o.primary,
                    scale: 1.0,
                },
                None => OutputConfig::off(&o.name, o.connected),
            })
            .collect();

        let active: Vec<&OutputConfig> = outputs.iter().filter(|o| o.active).collect();
        let clone = active.len() >= 2
            && active
                .windows(2)
                .all(|w| w[0].footprint() == w[1].footprint());

        Config {
            outputs,
            clone,
            base_scale: 1,
        }
    }

    /// Look up an entry by connector name.
    pub fn output(&self, name: &str) -> Option<&OutputConfig> {
        self.outputs.iter().find(|o| o.name == name)
    }

    /// Mutable lookup by connector name.
    pub fn output_mut(&mut self, name: &str) -> Option<&mut OutputConfig> {
        self.outputs.iter_mut().find(|o| o.name == name)
    }

    /// Full state equality: every output's active/geometry/rotation/refresh/
    /// primary state matches. Underlies de-duplication and the cycle
    /// engine's "did reality drift" check.
    pub fn equals(&self, other: &Config) -> bool {
        if self.outputs.len() != other.outputs.len() {
            return false;
        }
        self.outputs.iter().all(|ours| {
            other
                .output(&ours.name)
                .is_some_and(|theirs| ours.same_state(theirs))
        })
    }

    /// Structural comparison: same connector names with the same connected
    /// flags. A stored configuration only applies to hardware it matches.
    pub fn matches(&self, other: &Config) -> bool {
        if self.outputs.len() != other.outputs.len() {
            return false;
        }
        self.outputs.iter().all(|ours| {
            other
                .output(&ours.name)
                .is_some_and(|theirs| ours.connected == theirs.connected)
        })
    }

    /// Structural comparison against the live topology.
    pub fn matches_snapshot(&self, snapshot: &ScreenSnapshot) -> bool {
        if self.outputs.len() != snapshot.outputs.len() {
            return false;
        }
        self.outputs.iter().all(|ours| {
            snapshot
                .output(&ours.name)
                .is_some_and(|hw| ours.connected == hw.connected)
        })
    }

    /// Whether no output is active.
    pub fn is_all_off(&self) -> bool {
        !self.outputs.iter().any(|o| o.active)
    }

    /// Guarantee at most one primary output, preferring an existing one.
    ///
    /// If no active output is marked primary, the first active output is
    /// promoted. Returns whether anything changed.
    pub fn ensure_primary(&mut self) -> bool {
        let mut changed = false;
        let mut seen_primary = false;

        for output in &mut self.outputs {
            if !output.active {
                if output.primary {
                    output.primary = false;
                    changed = true;
                }
                continue;
            }
            if output.primary {
                if seen_primary {
                    output.primary = false;
                    changed = true;
                } else {
                    seen_primary = true;
                }
            }
        }

        if !seen_primary {
            if let Some(first_active) = self.outputs.iter_mut().find(|o| o.active) {
                first_active.primary = true;
                changed = true;
            }
        }

        changed
    }

    /// Bounding box over the active outputs' screen-space footprints:
    /// (left, top, right, bottom). `None` when everything is off.
    pub fn bounding_box(&self) -> Option<(i32, i32, i32, i32)> {
        let mut bbox: Option<(i32, i32, i32, i32)> = None;
        for output in self.outputs.iter().filter(|o| o.active) {
            let (x, y, w, h) = output.footprint();
            let (right, bottom) = (x + w as i32, y + h as i32);
            bbox = Some(match bbox {
                None => (x, y, right, bottom),
                Some((l, t, r, b)) => (l.min(x), t.min(y), r.max(right), b.max(bottom)),
            });
        }
        bbox
    }

    /// Shift active outputs so the layout's top-left corner lands at (0, 0).
    pub fn sanitize_origin(&mut self) {
        let Some((left, top, _, _)) = self.bounding_box() else {
            return;
        };
        if left == 0 && top == 0 {
            return;
        }
        for output in self.outputs.iter_mut().filter(|o| o.active) {
            output.x -= left;
            output.y -= top;
        }
    }

    /// Check whether the controller could accept this configuration.
    ///
    /// Distinguishes "this configuration is for different hardware"
    /// ([`RandrError::NoMatchingConfig`]) from "it is for this hardware but
    /// exceeds the addressable framebuffer" ([`RandrError::Bounds`]); the
    /// latter drives the sanitizer's trimming loop.
    pub fn applicable(&self, snapshot: &ScreenSnapshot) -> Result<()> {
        for output in self.outputs.iter().filter(|o| o.active) {
            let Some(hw) = snapshot.output(&output.name) else {
                tracing::debug!(output = %output.name, "not applicable: unknown output");
                return Err(RandrError::NoMatchingConfig);
            };
            if !hw.connected {
                tracing::debug!(output = %output.name, "not applicable: output not connected");
                return Err(RandrError::NoMatchingConfig);
            }
            if !hw.supports_mode(&output.mode()) {
                tracing::debug!(
                    output = %output.name,
                    mode = %output.mode(),
                    "not applicable: mode not supported"
                );
                return Err(RandrError::NoMatchingConfig);
            }
        }

        if let Some((left, top, right, bottom)) = self.bounding_box() {
            let required_width = (right - left.min(0)) as u32;
            let required_height = (bottom - top.min(0)) as u32;
            let bounds = snapshot.bounds;
            if required_width > bounds.max_width || required_height > bounds.max_height {
                return Err(RandrError::Bounds {
                    required_width,
                    required_height,
                    max_width: bounds.max_width,
                    max_height: bounds.max_height,
                });
            }
        }

        Ok(())
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "clone: {}, scale: {}", self.clone, self.base_scale)?;
        for output in &self.outputs {
            writeln!(f, "  {output}")?;
        }
        Ok(())
    }
}
