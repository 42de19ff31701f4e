//! Scriptable in-memory RR-screen provider
//!
//! [`FakeScreen`] implements [`RrScreen`] against a hand-built topology, so
//! the layout, cycle, and event-routing logic can be exercised without a
//! display server. Used by this crate's unit and integration tests.

use std::collections::HashMap;

use super::config::Config;
use super::mode::{Mode, Rotation};
use super::output::{ActiveState, OutputSnapshot};
use super::screen::{RrScreen, ScreenBounds, ScreenSnapshot};
use super::{RandrError, Result};

/// Builder for one fake connector.
#[derive(Debug, Clone)]
pub struct FakeOutput {
    name: String,
    connected: bool,
    is_laptop: bool,
    preferred: Option<Mode>,
    modes: Vec<Mode>,
    current: Option<ActiveState>,
    primary: bool,
    mm: (u32, u32),
}

fn mode(width: u32, height: u32, refresh: u32) -> Mode {
    Mode {
        width,
        height,
        refresh,
    }
}

impl FakeOutput {
    /// A connected laptop panel with `width`x`height` native resolution and
    /// a ladder of common smaller modes.
    pub fn laptop(name: &str, width: u32, height: u32) -> FakeOutput {
        FakeOutput {
            name: name.to_owned(),
            connected: true,
            is_laptop: true,
            preferred: Some(mode(width, height, 60)),
            modes: vec![
                mode(width, height, 60),
                mode(1280, 720, 60),
                mode(1024, 768, 60),
            ],
            current: None,
            primary: false,
            mm: (0, 0),
        }
    }

    /// A connected external monitor.
    pub fn external(name: &str, width: u32, height: u32) -> FakeOutput {
        FakeOutput {
            name: name.to_owned(),
            connected: true,
            is_laptop: false,
            preferred: Some(mode(width, height, 60)),
            modes: vec![
                mode(width, height, 60),
                mode(1920, 1080, 60),
                mode(1280, 720, 60),
                mode(1024, 768, 60),
            ],
            current: None,
            primary: false,
            mm: (0, 0),
        }
    }

    /// A connector with nothing attached.
    pub fn disconnected(name: &str) -> FakeOutput {
        FakeOutput {
            name: name.to_owned(),
            connected: false,
            is_laptop: false,
            preferred: None,
            modes: Vec::new(),
            current: None,
            primary: false,
            mm: (0, 0),
        }
    }

    /// Turn the output on at its preferred mode at the given position.
    pub fn active_at(mut self, x: i32, y: i32) -> FakeOutput {
        let mode = self
            .preferred
            .expect("active_at requires a preferred mode");
        self.current = Some(ActiveState {
            x,
            y,
            mode,
            rotation: Rotation::Rotate0,
        });
        self
    }

    /// Replace the mode list (and the preferred mode with the first entry).
    pub fn with_modes(mut self, modes: Vec<(u32, u32, u32)>) -> FakeOutput {
        self.modes = modes.iter().map(|&(w, h, r)| mode(w, h, r)).collect();
        self.preferred = self.modes.first().copied();
        self
    }

    /// Add one more supported mode.
    pub fn with_extra_mode(mut self, width: u32, height: u32, refresh: u32) -> FakeOutput {
        self.modes.push(mode(width, height, refresh));
        self
    }

    /// Drop the hardware-preferred mode, forcing best-mode selection to fall
    /// back to the largest-area rule.
    pub fn without_preferred(mut self) -> FakeOutput {
        self.preferred = None;
        self
    }

    /// Mark as the primary output.
    pub fn primary(mut self) -> FakeOutput {
        self.primary = true;
        self
    }

    /// Set the physical dimensions in millimeters.
    pub fn mm(mut self, width: u32, height: u32) -> FakeOutput {
        self.mm = (width, height);
        self
    }

    fn build(self) -> OutputSnapshot {
        OutputSnapshot {
            name: self.name,
            connected: self.connected,
            is_laptop: self.is_laptop,
            preferred_mode: self.preferred,
            modes: self.modes,
            current: self.current,
            primary: self.primary,
            mm_width: self.mm.0,
            mm_height: self.mm.1,
        }
    }
}

/// Default framebuffer limits for fake topologies.
pub const DEFAULT_BOUNDS: ScreenBounds = ScreenBounds {
    min_width: 320,
    min_height: 200,
    max_width: 8192,
    max_height: 8192,
};

/// Build a snapshot from fake outputs with default bounds and timestamps.
pub fn snapshot_with(outputs: Vec<FakeOutput>) -> ScreenSnapshot {
    ScreenSnapshot {
        outputs: outputs.into_iter().map(FakeOutput::build).collect(),
        bounds: DEFAULT_BOUNDS,
        change_timestamp: 10,
        config_timestamp: 10,
    }
}

/// An in-memory display controller.
pub struct FakeScreen {
    snapshot: ScreenSnapshot,
    /// Every configuration accepted by [`RrScreen::apply_with_time`], with
    /// its timestamp, in order.
    pub applied: Vec<(Config, u32)>,
    /// Number of [`RrScreen::refresh`] calls observed.
    pub refresh_count: usize,
    /// When set, the next apply fails with [`RandrError::Apply`].
    pub fail_next_apply: bool,
    scale_overrides: HashMap<String, u32>,
}

impl FakeScreen {
    /// A controller exposing the given connectors.
    pub fn new(outputs: Vec<FakeOutput>) -> FakeScreen {
        FakeScreen {
            snapshot: snapshot_with(outputs),
            applied: Vec::new(),
            refresh_count: 0,
            fail_next_apply: false,
            scale_overrides: HashMap::new(),
        }
    }

    /// Swap the topology, as a hotplug would, bumping the config timestamp
    /// past the change timestamp.
    pub fn hotplug(&mut self, outputs: Vec<FakeOutput>) {
        let bounds = self.snapshot.bounds;
        let change = self.snapshot.change_timestamp;
        self.snapshot = snapshot_with(outputs);
        self.snapshot.bounds = bounds;
        self.snapshot.change_timestamp = change;
        self.snapshot.config_timestamp = change + 10;
    }

    /// Override the controller's framebuffer limits.
    pub fn set_max_bounds(&mut self, max_width: u32, max_height: u32) {
        self.snapshot.bounds.max_width = max_width;
        self.snapshot.bounds.max_height = max_height;
    }

    /// Pin the change/config timestamps.
    pub fn set_timestamps(&mut self, change: u32, config: u32) {
        self.snapshot.change_timestamp = change;
        self.snapshot.config_timestamp = config;
    }

    /// Script the best-scale answer for an output.
    pub fn set_best_scale(&mut self, name: &str, scale: u32) {
        self.scale_overrides.insert(name.to_owned(), scale);
    }

    /// The most recently applied configuration, if any.
    pub fn last_applied(&self) -> Option<&(Config, u32)> {
        self.applied.last()
    }
}

impl RrScreen for FakeScreen {
    fn refresh(&mut self) -> Result<()> {
        self.refresh_count += 1;
        Ok(())
    }

    fn snapshot(&self) -> &ScreenSnapshot {
        &self.snapshot
    }

    fn apply_with_time(&mut self, config: &Config, timestamp: u32) -> Result<()> {
        if self.fail_next_apply {
            self.fail_next_apply = false;
            return Err(RandrError::Apply("scripted failure".to_owned()));
        }

        config.applicable(&self.snapshot)?;

        for entry in &config.outputs {
            let Some(hw) = self
                .snapshot
                .outputs
                .iter_mut()
                .find(|o| o.name == entry.name)
            else {
                continue;
            };
            hw.current = entry.active.then(|| ActiveState {
                x: entry.x,
                y: entry.y,
                mode: entry.mode(),
                rotation: entry.rotation,
            });
            hw.primary = entry.primary;
        }

        self.snapshot.change_timestamp = self.snapshot.change_timestamp.max(timestamp) + 1;
        self.applied.push((config.clone(), timestamp));
        Ok(())
    }

    fn best_scale_for_output(&self, name: &str) -> u32 {
        self.scale_overrides.get(name).copied().unwrap_or(1)
    }
}
