//! The RR-screen provider boundary

use std::collections::HashSet;

use super::config::Config;
use super::mode::Mode;
use super::output::OutputSnapshot;
use super::Result;

/// Addressable framebuffer limits reported by the display controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenBounds {
    /// Smallest supported framebuffer width
    pub min_width: u32,
    /// Smallest supported framebuffer height
    pub min_height: u32,
    /// Largest supported framebuffer width
    pub max_width: u32,
    /// Largest supported framebuffer height
    pub max_height: u32,
}

/// One coherent observation of the display hardware.
///
/// `change_timestamp` is bumped whenever any client reconfigures the screen;
/// `config_timestamp` is bumped when the hardware topology itself changes
/// (hotplug/unplug). The event router compares the two to tell "someone set a
/// configuration" apart from "a monitor (dis)appeared".
#[derive(Debug, Clone)]
pub struct ScreenSnapshot {
    /// All connectors known to the controller
    pub outputs: Vec<OutputSnapshot>,
    /// Framebuffer limits
    pub bounds: ScreenBounds,
    /// Last reconfiguration time
    pub change_timestamp: u32,
    /// Last hardware-topology change time
    pub config_timestamp: u32,
}

impl ScreenSnapshot {
    /// Look up an output by connector name.
    pub fn output(&self, name: &str) -> Option<&OutputSnapshot> {
        self.outputs.iter().find(|o| o.name == name)
    }

    /// The first laptop panel, if one exists.
    pub fn laptop_output(&self) -> Option<&OutputSnapshot> {
        self.outputs.iter().find(|o| o.is_laptop)
    }

    /// Modes supported by every connected output, for clone layouts.
    pub fn clone_modes(&self) -> Vec<Mode> {
        let mut connected = self.outputs.iter().filter(|o| o.connected);

        let Some(first) = connected.next() else {
            return Vec::new();
        };

        // Intersect on (width, height) only: refresh rates rarely line up
        // across monitors, and clone layouts pick the per-output rate later.
        let mut sizes: HashSet<(u32, u32)> =
            first.modes.iter().map(|m| (m.width, m.height)).collect();
        for output in connected {
            let supported: HashSet<(u32, u32)> =
                output.modes.iter().map(|m| (m.width, m.height)).collect();
            sizes.retain(|s| supported.contains(s));
        }

        first
            .modes
            .iter()
            .filter(|m| sizes.contains(&(m.width, m.height)))
            .copied()
            .collect()
    }
}

/// The display controller, as far as this daemon is concerned.
///
/// Implementations are expected to be cheap and synchronous: queries serve
/// from a cached snapshot, `refresh` re-polls the hardware, and
/// `apply_with_time` programs the controller atomically. The production
/// implementation is `backend::x11::XScreen`; tests use
/// [`super::testing::FakeScreen`].
pub trait RrScreen {
    /// Re-poll the hardware and update the cached snapshot.
    fn refresh(&mut self) -> Result<()>;

    /// The cached observation from the last refresh.
    fn snapshot(&self) -> &ScreenSnapshot;

    /// Program the controller with `config`.
    ///
    /// `timestamp` orders the call against other clients' changes; the
    /// controller rejects calls older than its last accepted configuration.
    /// On success the cached snapshot reflects the new state.
    fn apply_with_time(&mut self, config: &Config, timestamp: u32) -> Result<()>;

    /// The best integer UI scale for one output, judged from its pixel
    /// density. Never below 1.
    fn best_scale_for_output(&self, name: &str) -> u32 {
        let Some(output) = self.snapshot().output(name) else {
            return 1;
        };
        if output.mm_width == 0 {
            return 1;
        }
        let mode = match (output.current.map(|c| c.mode), output.preferred_mode) {
            (Some(m), _) => m,
            (None, Some(m)) => m,
            (None, None) => return 1,
        };
        let dpi = f64::from(mode.width) * 25.4 / f64::from(output.mm_width);
        // HiDPI heuristic: dense panel that is also tall enough that halving
        // the logical size still leaves a usable desktop.
        if dpi >= 144.0 && mode.height >= 1200 {
            2
        } else {
            1
        }
    }
}
