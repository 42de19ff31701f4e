//! Candidate layout construction
//!
//! Each setup function returns `None` instead of an error when its policy
//! cannot produce a usable layout (no common clone mode, lid-closed laptop
//! with nothing else attached, layout too large for the framebuffer). A
//! policy that yields nothing is simply not offered as a candidate.

use tracing::debug;

use crate::config::MonitorsSetup;
use crate::randr::{Config, Mode, OutputSnapshot, RrScreen, ScreenSnapshot};

use super::sanitize::trim_rightmost;

/// Pick an output's best mode: the hardware-preferred mode if it reports
/// one, otherwise the largest area, ties broken by the highest refresh rate.
pub fn find_best_mode(output: &OutputSnapshot) -> Option<Mode> {
    if let Some(preferred) = output.preferred_mode {
        return Some(preferred);
    }

    let mut best: Option<Mode> = None;
    for &mode in &output.modes {
        best = Some(match best {
            None => mode,
            Some(current) => {
                if mode.area() > current.area()
                    || (mode.area() == current.area() && mode.refresh > current.refresh)
                {
                    mode
                } else {
                    current
                }
            }
        });
    }
    best
}

/// The largest resolution every connected output can display.
fn clone_size(snapshot: &ScreenSnapshot) -> Option<(u32, u32)> {
    snapshot
        .clone_modes()
        .iter()
        .map(|m| (m.width, m.height))
        .max_by_key(|&(w, h)| u64::from(w) * u64::from(h))
}

/// Start from the live state with every output switched off.
fn all_off_config(snapshot: &ScreenSnapshot) -> Config {
    let mut config = Config::new_current(snapshot);
    for output in &mut config.outputs {
        output.active = false;
        output.primary = false;
    }
    config.clone = false;
    config
}

/// Activate `name` at its best mode at the given position. Returns false if
/// the output has no usable mode at all.
fn turn_on(config: &mut Config, snapshot: &ScreenSnapshot, name: &str, x: i32, y: i32) -> bool {
    let Some(hw) = snapshot.output(name) else {
        return false;
    };
    let Some(mode) = find_best_mode(hw) else {
        return false;
    };
    if let Some(entry) = config.output_mut(name) {
        entry.turn_on_at(mode, x, y);
        return true;
    }
    false
}

/// Mirror every eligible output at the largest common resolution.
pub fn clone_setup(screen: &dyn RrScreen, lid_closed: bool) -> Option<Config> {
    let snapshot = screen.snapshot();
    let (width, height) = clone_size(snapshot)?;

    let mut config = all_off_config(snapshot);
    config.clone = true;

    for hw in &snapshot.outputs {
        if !hw.connected || (hw.is_laptop && lid_closed) {
            continue;
        }
        // Pick the best rate this output offers at the common size.
        let Some(refresh) = hw.best_refresh_for_size(width, height) else {
            continue;
        };
        if let Some(entry) = config.output_mut(&hw.name) {
            entry.turn_on_at(
                Mode {
                    width,
                    height,
                    refresh,
                },
                0,
                0,
            );
        }
    }

    if config.is_all_off() {
        debug!("clone setup: no eligible outputs, dropping");
        return None;
    }

    debug!("clone setup:\n{config}");
    Some(config)
}

/// Extended desktop: laptop panel first (and primary), remaining connected
/// outputs tiled left-to-right at their best modes.
pub fn xinerama_setup(
    screen: &dyn RrScreen,
    lid_closed: bool,
    policy: MonitorsSetup,
) -> Option<Config> {
    let snapshot = screen.snapshot();
    let mut config = all_off_config(snapshot);
    let mut x = 0i32;

    for hw in &snapshot.outputs {
        if !hw.is_laptop {
            continue;
        }
        if lid_closed && policy.follow_laptop_lid() {
            continue;
        }
        if let Some(entry) = config.output_mut(&hw.name) {
            entry.primary = true;
        }
        if turn_on(&mut config, snapshot, &hw.name, x, 0) {
            let (_, _, width, _) = config.output(&hw.name).unwrap().footprint();
            x += width as i32;
        }
    }

    for hw in &snapshot.outputs {
        if hw.is_laptop || !hw.connected {
            continue;
        }
        if turn_on(&mut config, snapshot, &hw.name, x, 0) {
            let (_, _, width, _) = config.output(&hw.name).unwrap().footprint();
            x += width as i32;
        }
    }

    if !trim_rightmost(&mut config, screen) {
        debug!("xinerama setup: nothing applicable, dropping");
        return None;
    }

    debug!("xinerama setup:\n{config}");
    Some(config)
}

/// Laptop panel only, everything else off.
pub fn laptop_setup(screen: &dyn RrScreen, lid_closed: bool) -> Option<Config> {
    let snapshot = screen.snapshot();
    let mut config = all_off_config(snapshot);

    for hw in &snapshot.outputs {
        if hw.is_laptop && !lid_closed && !turn_on(&mut config, snapshot, &hw.name, 0, 0) {
            debug!("laptop setup: panel has no usable mode, dropping");
            return None;
        }
    }

    if config.is_all_off() {
        debug!("laptop setup: nothing active, dropping");
        return None;
    }

    debug!("laptop setup:\n{config}");
    Some(config)
}

/// Docked: laptop panel off, all external outputs at the origin.
pub fn other_setup(screen: &dyn RrScreen) -> Option<Config> {
    let snapshot = screen.snapshot();
    let mut config = all_off_config(snapshot);

    for hw in &snapshot.outputs {
        if !hw.is_laptop && hw.connected {
            turn_on(&mut config, snapshot, &hw.name, 0, 0);
        }
    }

    if !trim_rightmost(&mut config, screen) {
        debug!("other setup: nothing applicable, dropping");
        return None;
    }

    debug!("other setup:\n{config}");
    Some(config)
}

/// The boot-behavior fallback layout for the configured policy.
pub fn default_setup(
    screen: &dyn RrScreen,
    lid_closed: bool,
    policy: MonitorsSetup,
) -> Option<Config> {
    match policy {
        MonitorsSetup::DoNothing => xinerama_setup(screen, lid_closed, policy),
        MonitorsSetup::FollowLid => {
            if lid_closed {
                other_setup(screen)
            } else {
                xinerama_setup(screen, lid_closed, policy)
            }
        }
        MonitorsSetup::Clone => clone_setup(screen, lid_closed),
        MonitorsSetup::Dock => other_setup(screen),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::randr::testing::{FakeOutput, FakeScreen};

    fn laptop_and_external() -> FakeScreen {
        FakeScreen::new(vec![
            FakeOutput::laptop("eDP-1", 1920, 1080).active_at(0, 0),
            FakeOutput::external("HDMI-1", 2560, 1440),
        ])
    }

    #[test]
    fn test_find_best_mode_prefers_preferred() {
        let output = FakeOutput::external("DP-1", 1920, 1080);
        let screen = FakeScreen::new(vec![output]);
        let hw = screen.snapshot().output("DP-1").unwrap();
        assert_eq!(
            find_best_mode(hw),
            Some(Mode {
                width: 1920,
                height: 1080,
                refresh: 60
            })
        );
    }

    #[test]
    fn test_find_best_mode_area_then_refresh() {
        let output = FakeOutput::external("DP-1", 1920, 1080)
            .with_modes(vec![(1280, 720, 60), (1920, 1080, 60), (1920, 1080, 144)])
            .without_preferred();
        let screen = FakeScreen::new(vec![output]);
        let hw = screen.snapshot().output("DP-1").unwrap();
        assert_eq!(
            find_best_mode(hw),
            Some(Mode {
                width: 1920,
                height: 1080,
                refresh: 144
            })
        );
    }

    // Scenario: laptop + external, lid open, extended policy. The laptop
    // lands primary at the origin, the external to its right, both at their
    // best modes.
    #[test]
    fn test_xinerama_laptop_first_then_external() {
        let screen = laptop_and_external();
        let config = xinerama_setup(&screen, false, MonitorsSetup::FollowLid).unwrap();

        let laptop = config.output("eDP-1").unwrap();
        assert!(laptop.active);
        assert!(laptop.primary);
        assert_eq!((laptop.x, laptop.y), (0, 0));
        assert_eq!((laptop.width, laptop.height), (1920, 1080));

        let external = config.output("HDMI-1").unwrap();
        assert!(external.active);
        assert!(!external.primary);
        assert_eq!((external.x, external.y), (1920, 0));
        assert_eq!((external.width, external.height), (2560, 1440));
    }

    // Scenario: lid closed under follow-lid policy. The laptop panel stays
    // off and the external takes the origin.
    #[test]
    fn test_xinerama_lid_closed_follow_lid() {
        let screen = laptop_and_external();
        let config = xinerama_setup(&screen, true, MonitorsSetup::FollowLid).unwrap();

        assert!(!config.output("eDP-1").unwrap().active);
        let external = config.output("HDMI-1").unwrap();
        assert!(external.active);
        assert_eq!((external.x, external.y), (0, 0));
    }

    #[test]
    fn test_xinerama_lid_closed_ignored_without_follow_lid() {
        let screen = laptop_and_external();
        let config = xinerama_setup(&screen, true, MonitorsSetup::DoNothing).unwrap();
        assert!(config.output("eDP-1").unwrap().active);
    }

    #[test]
    fn test_clone_common_mode() {
        let screen = laptop_and_external();
        let config = clone_setup(&screen, false).unwrap();

        assert!(config.clone);
        // 1920x1080 is the largest size both outputs share.
        let laptop = config.output("eDP-1").unwrap();
        let external = config.output("HDMI-1").unwrap();
        assert!(laptop.active && external.active);
        assert_eq!((laptop.x, laptop.y), (0, 0));
        assert_eq!((external.x, external.y), (0, 0));
        assert_eq!(
            (laptop.width, laptop.height),
            (external.width, external.height)
        );
        assert_eq!((laptop.width, laptop.height), (1920, 1080));
    }

    // Scenario: clone requested but no common resolution exists. The
    // policy yields nothing.
    #[test]
    fn test_clone_no_common_mode() {
        let screen = FakeScreen::new(vec![
            FakeOutput::laptop("eDP-1", 1366, 768).with_modes(vec![(1366, 768, 60)]),
            FakeOutput::external("HDMI-1", 2560, 1440).with_modes(vec![(2560, 1440, 60)]),
        ]);
        assert!(clone_setup(&screen, false).is_none());
    }

    #[test]
    fn test_clone_lid_closed_excludes_laptop() {
        let screen = laptop_and_external();
        let config = clone_setup(&screen, true).unwrap();
        assert!(!config.output("eDP-1").unwrap().active);
        assert!(config.output("HDMI-1").unwrap().active);
    }

    #[test]
    fn test_laptop_setup() {
        let screen = laptop_and_external();
        let config = laptop_setup(&screen, false).unwrap();

        let laptop = config.output("eDP-1").unwrap();
        assert!(laptop.active);
        assert_eq!((laptop.width, laptop.height), (1920, 1080));
        assert!(!config.output("HDMI-1").unwrap().active);
    }

    #[test]
    fn test_laptop_setup_lid_closed_yields_nothing() {
        let screen = laptop_and_external();
        assert!(laptop_setup(&screen, true).is_none());
    }

    #[test]
    fn test_other_setup_docks() {
        let screen = laptop_and_external();
        let config = other_setup(&screen).unwrap();

        assert!(!config.output("eDP-1").unwrap().active);
        let external = config.output("HDMI-1").unwrap();
        assert!(external.active);
        assert_eq!((external.x, external.y), (0, 0));
    }

    #[test]
    fn test_other_setup_no_externals_yields_nothing() {
        let screen = FakeScreen::new(vec![
            FakeOutput::laptop("eDP-1", 1920, 1080).active_at(0, 0),
            FakeOutput::disconnected("HDMI-1"),
        ]);
        assert!(other_setup(&screen).is_none());
    }

    #[test]
    fn test_default_setup_policies() {
        let screen = laptop_and_external();

        let dock = default_setup(&screen, false, MonitorsSetup::Dock).unwrap();
        assert!(!dock.output("eDP-1").unwrap().active);

        let clone = default_setup(&screen, false, MonitorsSetup::Clone).unwrap();
        assert!(clone.clone);

        let open = default_setup(&screen, false, MonitorsSetup::FollowLid).unwrap();
        assert!(open.output("eDP-1").unwrap().active);

        let closed = default_setup(&screen, true, MonitorsSetup::FollowLid).unwrap();
        assert!(!closed.output("eDP-1").unwrap().active);
    }

    #[test]
    fn test_xinerama_skips_disconnected() {
        let screen = FakeScreen::new(vec![
            FakeOutput::laptop("eDP-1", 1920, 1080),
            FakeOutput::disconnected("DP-1"),
            FakeOutput::external("HDMI-1", 1920, 1080),
        ]);
        let config = xinerama_setup(&screen, false, MonitorsSetup::FollowLid).unwrap();
        assert!(!config.output("DP-1").unwrap().active);
        assert_eq!(config.output("HDMI-1").unwrap().x, 1920);
    }
}
