//! The fn-F7 / XF86Display cycle engine
//!
//! Maintains the ordered list of sanitized candidate layouts and the index
//! of the one currently active. Each hotkey press advances to the next
//! candidate; the list is regenerated lazily whenever hardware reality
//! stops matching it.

use tracing::debug;

use crate::config::MonitorsSetup;
use crate::layout::{clone_setup, laptop_setup, other_setup, sanitize, xinerama_setup};
use crate::randr::{Config, RrScreen};

/// Candidate list plus current position.
pub struct CycleEngine {
    configs: Option<Vec<Config>>,
    current: usize,
}

impl Default for CycleEngine {
    fn default() -> Self {
        CycleEngine::new()
    }
}

impl CycleEngine {
    /// An uninitialized engine; the candidate list is built on first use.
    pub fn new() -> CycleEngine {
        CycleEngine {
            configs: None,
            current: 0,
        }
    }

    /// Whether a candidate list exists.
    pub fn is_initialized(&self) -> bool {
        self.configs.is_some()
    }

    /// Number of candidates, zero when uninitialized.
    pub fn len(&self) -> usize {
        self.configs.as_ref().map_or(0, Vec::len)
    }

    /// True when no candidate list exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The current candidate list, empty when uninitialized.
    pub fn candidates(&self) -> &[Config] {
        self.configs.as_deref().unwrap_or(&[])
    }

    /// Drop the candidate list; the next advance regenerates it.
    pub fn invalidate(&mut self) {
        self.configs = None;
        self.current = 0;
    }

    fn generate(&mut self, screen: &dyn RrScreen, lid_closed: bool, policy: MonitorsSetup) {
        debug!("generating fn-F7 configurations");
        self.invalidate();

        let mut candidates = vec![
            Some(Config::new_current(screen.snapshot())),
            clone_setup(screen, lid_closed),
            xinerama_setup(screen, lid_closed, policy),
            other_setup(screen),
            laptop_setup(screen, lid_closed),
        ];

        // Candidates are stored exactly as they will be applied: the primary
        // fix-up has to happen before de-duplication, or the "did reality
        // drift" equality check can never settle.
        for candidate in candidates.iter_mut().flatten() {
            candidate.ensure_primary();
        }

        if let Some(sanitized) = sanitize(screen, candidates) {
            debug!("generated {} configurations", sanitized.len());
            self.configs = Some(sanitized);
            self.current = 0;
        }
    }

    /// Advance to the next candidate and return a copy of it.
    ///
    /// Regenerates the list first if there is none yet, if the live state no
    /// longer structurally matches candidate 0 (stale list), or if the live
    /// state stopped being equal to the candidate we believe is active
    /// (something reconfigured the screen behind our back).
    pub fn advance(
        &mut self,
        screen: &dyn RrScreen,
        lid_closed: bool,
        policy: MonitorsSetup,
    ) -> Option<Config> {
        if self.configs.is_none() {
            self.generate(screen, lid_closed, policy);
        }

        let current_state = Config::new_current(screen.snapshot());
        if let Some(configs) = &self.configs {
            if !current_state.matches(&configs[0]) || !current_state.equals(&configs[self.current])
            {
                debug!("hardware reality drifted from the candidate list, regenerating");
                self.generate(screen, lid_closed, policy);
            }
        }

        let configs = self.configs.as_ref()?;
        self.current = (self.current + 1) % configs.len();
        debug!("cycling to configuration {}", self.current);
        Some(configs[self.current].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::randr::testing::{FakeOutput, FakeScreen};
    use crate::randr::RrScreen;

    fn screen() -> FakeScreen {
        FakeScreen::new(vec![
            FakeOutput::laptop("eDP-1", 1920, 1080).active_at(0, 0),
            FakeOutput::external("HDMI-1", 1920, 1080),
        ])
    }

    fn advance_and_apply(engine: &mut CycleEngine, screen: &mut FakeScreen) -> Config {
        let config = engine
            .advance(screen, false, MonitorsSetup::FollowLid)
            .expect("candidates exist");
        screen
            .apply_with_time(&config, 100)
            .expect("candidate applies");
        config
    }

    #[test]
    fn test_generates_on_first_advance() {
        let mut screen = screen();
        let mut engine = CycleEngine::new();
        assert!(!engine.is_initialized());

        advance_and_apply(&mut engine, &mut screen);
        assert!(engine.is_initialized());
        assert!(engine.len() >= 2);
    }

    // L consecutive advances return to the original candidate.
    #[test]
    fn test_wraparound() {
        let mut screen = screen();
        let mut engine = CycleEngine::new();

        let first = advance_and_apply(&mut engine, &mut screen);
        let len = engine.len();
        let mut last = first.clone();
        for _ in 0..len {
            last = advance_and_apply(&mut engine, &mut screen);
        }
        assert!(first.equals(&last));
    }

    #[test]
    fn test_regenerates_after_hotplug() {
        let mut screen = screen();
        let mut engine = CycleEngine::new();
        advance_and_apply(&mut engine, &mut screen);
        let old_len = engine.len();

        screen.hotplug(vec![FakeOutput::laptop("eDP-1", 1920, 1080).active_at(0, 0)]);
        let config = engine
            .advance(&screen, false, MonitorsSetup::FollowLid)
            .expect("regenerated candidates");

        // The returned candidate belongs to the new topology.
        assert_eq!(config.outputs.len(), 1);
        assert_ne!(engine.len(), old_len);
    }

    #[test]
    fn test_regenerates_after_external_change() {
        let mut screen = screen();
        let mut engine = CycleEngine::new();
        advance_and_apply(&mut engine, &mut screen);

        // Someone else reconfigures the screen: the active candidate no
        // longer equals reality, so the next advance starts over.
        let mut foreign = Config::new_current(screen.snapshot());
        for output in &mut foreign.outputs {
            if output.name == "HDMI-1" {
                output.turn_on_at(
                    crate::randr::Mode {
                        width: 1280,
                        height: 720,
                        refresh: 60,
                    },
                    0,
                    0,
                );
            }
        }
        screen.apply_with_time(&foreign, 200).unwrap();

        let next = engine
            .advance(&screen, false, MonitorsSetup::FollowLid)
            .expect("candidates exist");
        // Regeneration put the live state at index 0, so the advance lands
        // on index 1 of a fresh list.
        assert!(!next.equals(&foreign) || engine.len() == 1);
    }

    #[test]
    fn test_no_candidates_when_everything_fails() {
        // One disconnected connector only: every policy yields nothing and
        // even "current" is all-off.
        let screen = FakeScreen::new(vec![FakeOutput::disconnected("HDMI-1")]);
        let mut engine = CycleEngine::new();
        assert!(engine
            .advance(&screen, false, MonitorsSetup::FollowLid)
            .is_none());
    }
}
