//! Candidate-list sanitization and framebuffer fitting

use tracing::debug;

use crate::randr::{Config, RandrError, RrScreen};

/// Names of the active outputs ordered left-to-right.
fn active_left_to_right(config: &Config) -> Vec<String> {
    let mut order: Vec<(i32, String)> = config
        .outputs
        .iter()
        .filter(|o| o.active)
        .map(|o| (o.x, o.name.clone()))
        .collect();
    order.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    order.into_iter().map(|(_, name)| name).collect()
}

/// Recompute the global scale and re-flow the x offsets of the still-active
/// outputs.
///
/// The global scale is the maximum of the per-output best scales; a HiDPI
/// output is never downscaled to accommodate a low-DPI neighbor. Positions
/// re-flow left-to-right as `previous_x + width * global_scale`.
fn adjust_positions_for_scaling(config: &mut Config, screen: &dyn RrScreen, order: &[String]) {
    let mut global_scale = 1u32;

    for name in order {
        let scale = screen.best_scale_for_output(name).max(1);
        let Some(entry) = config.output_mut(name) else {
            continue;
        };
        if !entry.active {
            continue;
        }
        entry.scale = scale as f32;
        global_scale = global_scale.max(scale);
    }

    config.base_scale = global_scale;

    let mut x = 0i32;
    for name in order {
        let Some(entry) = config.output_mut(name) else {
            continue;
        };
        if !entry.active {
            continue;
        }
        let (_, _, width, _) = entry.footprint();
        entry.x = x;
        x += (width * global_scale) as i32;
    }
}

/// Deactivate outputs right-to-left until the configuration fits the
/// framebuffer. Returns whether an applicable, non-empty layout remains.
///
/// Only bounds violations drive trimming; any other applicability failure
/// aborts immediately. The scale re-flow runs in either case so a surviving
/// configuration always carries consistent positions.
pub fn trim_rightmost(config: &mut Config, screen: &dyn RrScreen) -> bool {
    let order = active_left_to_right(config);
    let mut applicable = false;

    for trim_index in (0..order.len()).rev() {
        match config.applicable(screen.snapshot()) {
            Ok(()) => {
                applicable = true;
                break;
            }
            Err(RandrError::Bounds { .. }) => {
                debug!(output = %order[trim_index], "turning off rightmost output to fit framebuffer");
                if let Some(entry) = config.output_mut(&order[trim_index]) {
                    entry.active = false;
                }
            }
            Err(e) => {
                debug!("not applicable for a non-bounds reason: {e}");
                break;
            }
        }
    }

    if config.is_all_off() {
        applicable = false;
    }

    adjust_positions_for_scaling(config, screen, &order);

    applicable
}

/// Filter a candidate list down to distinct, non-empty, applicable
/// configurations, preserving order. Returns `None` when nothing survives.
pub fn sanitize(screen: &dyn RrScreen, candidates: Vec<Option<Config>>) -> Option<Vec<Config>> {
    let mut slots = candidates;

    // Duplicates of an earlier entry lose.
    for i in 0..slots.len() {
        for j in (i + 1)..slots.len() {
            let duplicate = match (&slots[i], &slots[j]) {
                (Some(a), Some(b)) => a.equals(b),
                _ => false,
            };
            if duplicate {
                debug!("removing duplicate configuration");
                slots[j] = None;
            }
        }
    }

    for slot in &mut slots {
        if slot.as_ref().is_some_and(Config::is_all_off) {
            debug!("removing configuration with all outputs off");
            *slot = None;
        }
    }

    // Final pass: drop whatever the controller cannot address, trimming
    // oversized layouts first.
    for slot in &mut slots {
        let Some(config) = slot else {
            continue;
        };
        match config.applicable(screen.snapshot()) {
            Ok(()) => {}
            Err(RandrError::Bounds { .. }) => {
                if !trim_rightmost(config, screen) {
                    debug!("removing configuration that cannot fit the framebuffer");
                    *slot = None;
                }
            }
            Err(e) => {
                debug!("removing configuration which is not applicable: {e}");
                *slot = None;
            }
        }
    }

    let result: Vec<Config> = slots.into_iter().flatten().collect();
    if result.is_empty() {
        None
    } else {
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorsSetup;
    use crate::layout::synthesis::{laptop_setup, xinerama_setup};
    use crate::randr::testing::{FakeOutput, FakeScreen};
    use crate::randr::Config;
    use proptest::prelude::*;

    fn three_externals() -> FakeScreen {
        FakeScreen::new(vec![
            FakeOutput::external("DP-1", 2560, 1440),
            FakeOutput::external("DP-2", 2560, 1440),
            FakeOutput::external("DP-3", 2560, 1440),
        ])
    }

    #[test]
    fn test_trim_turns_off_rightmost_first() {
        let mut screen = three_externals();
        // Two 2560-wide outputs fit, three do not.
        screen.set_max_bounds(6000, 6000);

        let config =
            xinerama_setup(&screen, false, MonitorsSetup::DoNothing).expect("layout survives");

        let active: Vec<&str> = config
            .outputs
            .iter()
            .filter(|o| o.active)
            .map(|o| o.name.as_str())
            .collect();
        assert_eq!(active, vec!["DP-1", "DP-2"]);
        assert!(config.applicable(screen.snapshot()).is_ok());

        // And the trim left positions packed from the origin.
        assert_eq!(config.output("DP-1").unwrap().x, 0);
        assert_eq!(config.output("DP-2").unwrap().x, 2560);
    }

    #[test]
    fn test_trim_gives_up_when_nothing_fits() {
        let mut screen = three_externals();
        screen.set_max_bounds(1024, 768);

        assert!(xinerama_setup(&screen, false, MonitorsSetup::DoNothing).is_none());
    }

    #[test]
    fn test_scale_reflow_uses_max_scale() {
        let mut screen = FakeScreen::new(vec![
            FakeOutput::laptop("eDP-1", 1920, 1080),
            FakeOutput::external("HDMI-1", 1920, 1080),
        ]);
        screen.set_best_scale("eDP-1", 2);

        let config = xinerama_setup(&screen, false, MonitorsSetup::FollowLid).unwrap();

        assert_eq!(config.base_scale, 2);
        assert_eq!(config.output("eDP-1").unwrap().scale, 2.0);
        assert_eq!(config.output("HDMI-1").unwrap().scale, 1.0);
        // x offsets accumulate as width * global scale.
        assert_eq!(config.output("eDP-1").unwrap().x, 0);
        assert_eq!(config.output("HDMI-1").unwrap().x, 3840);
    }

    #[test]
    fn test_sanitize_removes_duplicates_keeping_earliest() {
        let screen = three_externals();
        let a = xinerama_setup(&screen, false, MonitorsSetup::DoNothing).unwrap();
        let b = a.clone();

        let sanitized = sanitize(&screen, vec![Some(a), None, Some(b)]).unwrap();
        assert_eq!(sanitized.len(), 1);
    }

    #[test]
    fn test_sanitize_removes_all_off() {
        let screen = three_externals();
        let mut all_off = Config::new_current(screen.snapshot());
        for output in &mut all_off.outputs {
            output.active = false;
        }

        assert!(sanitize(&screen, vec![Some(all_off)]).is_none());
    }

    #[test]
    fn test_sanitize_survivors_are_pairwise_distinct() {
        let screen = FakeScreen::new(vec![
            FakeOutput::laptop("eDP-1", 1920, 1080).active_at(0, 0),
            FakeOutput::external("HDMI-1", 1920, 1080),
        ]);
        let candidates = vec![
            Some(Config::new_current(screen.snapshot())),
            laptop_setup(&screen, false),
            xinerama_setup(&screen, false, MonitorsSetup::FollowLid),
            laptop_setup(&screen, false),
        ];

        let sanitized = sanitize(&screen, candidates).unwrap();
        for i in 0..sanitized.len() {
            for j in 0..sanitized.len() {
                if i != j {
                    assert!(!sanitized[i].equals(&sanitized[j]));
                }
            }
        }
    }

    proptest! {
        // Trimming terminates in at most N steps, never re-activates an
        // output it turned off, and the survivor (if any) fits the bounds.
        #[test]
        fn prop_trim_monotone(
            widths in prop::collection::vec(640u32..4000, 1..6),
            max_width in 640u32..10000,
        ) {
            let outputs: Vec<FakeOutput> = widths
                .iter()
                .enumerate()
                .map(|(i, &w)| FakeOutput::external(&format!("DP-{i}"), w, 1080)
                    .with_modes(vec![(w, 1080, 60)]))
                .collect();
            let mut screen = FakeScreen::new(outputs);
            screen.set_max_bounds(max_width, 8192);

            let mut config = Config::new_current(screen.snapshot());
            let mut x = 0i32;
            for (i, &w) in widths.iter().enumerate() {
                let entry = config.output_mut(&format!("DP-{i}")).unwrap();
                entry.turn_on_at(
                    crate::randr::Mode { width: w, height: 1080, refresh: 60 },
                    x,
                    0,
                );
                x += w as i32;
            }

            let before: Vec<bool> = config.outputs.iter().map(|o| o.active).collect();
            let applicable = trim_rightmost(&mut config, &screen);
            let after: Vec<bool> = config.outputs.iter().map(|o| o.active).collect();

            // No output that was off came back on.
            for (b, a) in before.iter().zip(after.iter()) {
                prop_assert!(*b || !*a);
            }

            if applicable {
                prop_assert!(config.applicable(screen.snapshot()).is_ok());
                prop_assert!(!config.is_all_off());
            }
        }
    }
}
