//! The XRandR manager
//!
//! One application-owned context object, created at startup and torn down at
//! shutdown, runs the whole show: it receives hardware, session, and D-Bus
//! events over a single mpsc channel and turns them into configuration
//! changes against the RR-screen provider. No global state; everything the
//! subsystems need is passed in explicitly.

pub mod confirm;
pub mod cycle;
pub mod debuglog;
pub mod persist;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::backend::touch::TouchscreenRotator;
use crate::config::{DaemonConfig, MonitorsSetup};
use crate::layout::default_setup;
use crate::randr::mode::ROTATION_CYCLE;
use crate::randr::{
    Config, RandrError, Result, Rotation, RotationSet, RrScreen, ScreenSnapshot, CURRENT_TIME,
};

use confirm::{ConfirmationUi, Decision};
use cycle::CycleEngine;
use debuglog::{timestamp_relationship, DebugLog};
use persist::ConfigPaths;

/// Everything that can wake the manager up.
pub enum Event {
    /// The display controller reported a screen change (our own apply, an
    /// external client's, or a hotplug).
    RandrChanged,
    /// The laptop lid opened (false) or closed (true).
    LidChanged(bool),
    /// D-Bus `ApplyConfiguration`: load the intended file, apply it
    /// speculatively, and schedule the confirmation countdown.
    ApplyConfiguration {
        /// XID of the caller's window; kept for dialog parenting
        parent_window_id: i64,
        /// Caller-supplied X timestamp
        timestamp: i64,
        /// Completes when the speculative apply has succeeded or failed
        reply: oneshot::Sender<Result<()>>,
    },
    /// D-Bus `VideoModeSwitch` / the XF86Display hotkey.
    VideoModeSwitch {
        /// Caller-supplied X timestamp
        timestamp: i64,
    },
    /// D-Bus `Rotate` / `RotateTo`.
    Rotate {
        /// `None` cycles to the next allowed rotation
        target: Option<Rotation>,
        /// Caller-supplied X timestamp
        timestamp: i64,
    },
    /// The confirmation countdown resolved.
    ConfirmationResolved {
        /// What the user (or the timeout) decided
        decision: Decision,
        /// Timestamp of the change being confirmed
        timestamp: u32,
    },
    /// Stop the event loop.
    Shutdown,
}

/// Force the laptop panel off in `config`, but only while other outputs
/// keep a picture, so an all-black-screens layout can never result. Shifts
/// the remaining outputs back to the origin.
fn turn_off_laptop_in_config(config: &mut Config, snapshot: &ScreenSnapshot) {
    let Some(laptop) = snapshot.laptop_output() else {
        return;
    };
    let others_active = config
        .outputs
        .iter()
        .any(|o| o.name != laptop.name && o.active);
    if others_active {
        if let Some(entry) = config.output_mut(&laptop.name) {
            entry.active = false;
        }
    }
    config.sanitize_origin();
}

/// The xrandr plugin context.
pub struct XrandrManager<S: RrScreen> {
    screen: S,
    config: DaemonConfig,
    paths: ConfigPaths,
    ui: Arc<dyn ConfirmationUi>,
    touch: Option<Arc<dyn TouchscreenRotator>>,
    events_tx: mpsc::Sender<Event>,
    lid_closed: bool,
    /// Timestamp of the last auto-configuration, for de-duplicating
    /// redundant hotplug events.
    last_config_timestamp: u32,
    cycle: CycleEngine,
    confirmation_pending: bool,
}

impl<S: RrScreen> XrandrManager<S> {
    /// Build the manager. `events_tx` must be the sender side of the
    /// channel later passed to [`XrandrManager::run`]; spawned confirmation
    /// tasks report back through it.
    pub fn new(
        screen: S,
        config: DaemonConfig,
        paths: ConfigPaths,
        ui: Arc<dyn ConfirmationUi>,
        touch: Option<Arc<dyn TouchscreenRotator>>,
        events_tx: mpsc::Sender<Event>,
    ) -> XrandrManager<S> {
        XrandrManager {
            screen,
            config,
            paths,
            ui,
            touch,
            events_tx,
            lid_closed: false,
            last_config_timestamp: CURRENT_TIME,
            cycle: CycleEngine::new(),
            confirmation_pending: false,
        }
    }

    /// Seed the lid state before startup.
    pub fn set_lid_closed(&mut self, closed: bool) {
        self.lid_closed = closed;
    }

    /// The RR-screen provider (for inspection in tests).
    pub fn screen(&self) -> &S {
        &self.screen
    }

    /// Mutable provider access (for tests that script hardware state).
    pub fn screen_mut(&mut self) -> &mut S {
        &mut self.screen
    }

    fn policy(&self) -> MonitorsSetup {
        self.config.policy.default_monitors_setup
    }

    /// Initial configuration pass: crash recovery via the backup file,
    /// then the intended/legacy stores, then the system default file, then
    /// the boot-behavior policy.
    pub fn startup(&mut self) {
        let mut log = DebugLog::open();
        log.msg("------------------------------------------------------------");
        log.msg("STARTING XRANDR PLUGIN");
        log.msg("State of screen at startup:");
        log.log_screen(self.screen.snapshot());

        if !self.apply_stored_configuration_at_startup(CURRENT_TIME)
            && !self.apply_default_configuration_from_file(CURRENT_TIME)
        {
            self.apply_default_boot_configuration(CURRENT_TIME);
        }

        log.msg("State of screen after initial configuration:");
        log.log_screen(self.screen.snapshot());
    }

    /// Process events until [`Event::Shutdown`] or channel closure.
    pub async fn run(mut self, mut events: mpsc::Receiver<Event>) {
        info!("xrandr manager running");
        while let Some(event) = events.recv().await {
            if !self.handle_event(event) {
                break;
            }
        }

        let mut log = DebugLog::open();
        log.msg("STOPPING XRANDR PLUGIN");
        log.msg("------------------------------------------------------------");
    }

    /// Dispatch one event. Returns false when the loop should stop.
    ///
    /// Must run inside a tokio runtime: confirmations and warnings spawn
    /// background tasks.
    pub fn handle_event(&mut self, event: Event) -> bool {
        match event {
            Event::RandrChanged => self.on_randr_event(),
            Event::LidChanged(closed) => self.on_lid_changed(closed),
            Event::ApplyConfiguration {
                parent_window_id,
                timestamp,
                reply,
            } => {
                debug!(parent_window_id, "handling ApplyConfiguration");
                let result = self.handle_apply_configuration(timestamp as u32);
                let _ = reply.send(result);
            }
            Event::VideoModeSwitch { timestamp } => self.handle_fn_f7(timestamp as u32),
            Event::Rotate { target, timestamp } => self.handle_rotate(target, timestamp as u32),
            Event::ConfirmationResolved {
                decision,
                timestamp,
            } => self.on_confirmation_resolved(decision, timestamp),
            Event::Shutdown => {
                info!("stopping xrandr manager");
                return false;
            }
        }
        true
    }

    // ------------------------------------------------------------------
    // Apply centralizers
    // ------------------------------------------------------------------

    /// Apply `config`, fixing up the primary designation first. On success
    /// with `save`, the configuration becomes the new intended file. Returns
    /// whether the controller accepted it.
    fn apply_configuration(&mut self, config: &mut Config, timestamp: u32, save: bool) -> bool {
        config.ensure_primary();
        debug!("applying configuration:\n{config}");

        match self.screen.apply_with_time(config, timestamp) {
            Ok(()) => {
                if save {
                    if let Err(e) = persist::save(&self.paths.intended, config) {
                        warn!("could not save the applied configuration: {e}");
                    }
                }
                true
            }
            Err(e) => {
                warn!("could not switch to configuration (timestamp {timestamp}): {e}");
                let mut log = DebugLog::open();
                log.msg(format!(
                    "Could not switch to the following configuration (timestamp {timestamp}): {e}"
                ));
                log.log_config(config);
                false
            }
        }
    }

    /// Load the configuration matching the live topology from `path` and
    /// apply it, honoring a closed lid and re-slaving touchscreens.
    fn apply_from_file(&mut self, path: &Path, timestamp: u32) -> Result<()> {
        let mut config = persist::load_matching(path, self.screen.snapshot())?;

        if self.lid_closed {
            turn_off_laptop_in_config(&mut config, self.screen.snapshot());
        }
        config.ensure_primary();

        self.screen.apply_with_time(&config, timestamp)?;
        self.slave_touchscreens_to(&config);
        Ok(())
    }

    /// `apply_from_file` with the error policy of the startup/intended
    /// path: missing files and topology mismatches are quiet, anything else
    /// is surfaced. Returns whether a configuration was applied.
    fn apply_intended(&mut self, path: &Path, timestamp: u32) -> bool {
        match self.apply_from_file(path, timestamp) {
            Ok(()) => true,
            Err(e) => {
                if !e.is_not_found() && !e.is_no_match() {
                    self.spawn_warning(
                        "Could not apply the stored configuration for monitors",
                        &e.to_string(),
                    );
                }
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Startup recovery chain
    // ------------------------------------------------------------------

    fn apply_stored_configuration_at_startup(&mut self, timestamp: u32) -> bool {
        let backup = self.paths.backup.clone();

        // A backup file means the previous session died while a
        // configuration change was awaiting confirmation: the user never
        // accepted the intended file, so the backup wins.
        match self.apply_from_file(&backup, timestamp) {
            Ok(()) => {
                info!("recovered backup configuration from an interrupted confirmation");
                self.restore_backup(timestamp);
                return true;
            }
            Err(e) if e.is_no_match() => {
                // Stale backup for different hardware; still promote it
                // over the never-confirmed intended file.
                info!("promoting stale backup configuration over the unconfirmed intended file");
                self.restore_backup(timestamp);
                return true;
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                warn!("could not apply the backup configuration ({e}); discarding it");
                if let Err(e) = persist::discard_backup(&self.paths) {
                    warn!("could not remove the backup configuration: {e}");
                }
                return false;
            }
        }

        // No backup: ordinary startup.
        let intended = self.paths.intended.clone();
        if self.apply_intended(&intended, timestamp) {
            debug!("loaded existing monitor configuration");
            return true;
        }

        info!("existing monitor config not found at startup, looking for legacy configuration");
        let legacy = self.paths.legacy.clone();
        self.apply_intended(&legacy, timestamp)
    }

    fn apply_default_configuration_from_file(&mut self, timestamp: u32) -> bool {
        let Some(path) = self.config.policy.default_configuration_file.clone() else {
            return false;
        };
        match self.apply_from_file(&path, timestamp) {
            Ok(()) => true,
            Err(e) => {
                debug!("default configuration file not used: {e}");
                false
            }
        }
    }

    fn apply_default_boot_configuration(&mut self, timestamp: u32) {
        if self.policy() == MonitorsSetup::DoNothing {
            return;
        }
        let Some(mut config) = default_setup(&self.screen, self.lid_closed, self.policy()) else {
            return;
        };
        // A system-default setting, not a user choice: never saved.
        self.apply_configuration(&mut config, timestamp, false);
    }

    // ------------------------------------------------------------------
    // Event router
    // ------------------------------------------------------------------

    fn on_randr_event(&mut self) {
        if let Err(e) = self.screen.refresh() {
            warn!("could not refresh screen state after RANDR event: {e}");
            return;
        }

        let (change, config_ts) = {
            let snapshot = self.screen.snapshot();
            (snapshot.change_timestamp, snapshot.config_timestamp)
        };

        let mut log = DebugLog::open();
        log.msg(format!(
            "Got RANDR event with timestamps change={change} {} config={config_ts}",
            timestamp_relationship(change, config_ts)
        ));

        if change >= config_ts {
            // An explicit configuration change, made by us or by another
            // client; the screen is already configured. Only re-assert a
            // sane primary designation.
            let mut current = Config::new_current(self.screen.snapshot());
            if current.ensure_primary()
                && current.applicable(self.screen.snapshot()).is_ok()
            {
                debug!("updating configuration for primary output");
                self.last_config_timestamp = config_ts;
                if let Err(e) = self.screen.apply_with_time(&current, config_ts) {
                    debug!("could not re-assert primary output: {e}");
                }
            }
            log.msg("  Ignoring event since change >= config");
        } else {
            // config > change: the topology changed underneath us
            // (hotplug/unplug) without an explicit configuration call.
            self.use_stored_or_autoconfigure(config_ts);
        }
    }

    fn on_lid_changed(&mut self, closed: bool) {
        if closed == self.lid_closed {
            return;
        }
        self.lid_closed = closed;
        info!(lid_closed = closed, "laptop lid state changed");

        if !self.policy().follow_laptop_lid() {
            return;
        }

        // The lid moved, so the user did something interesting: probe the
        // outputs even if we cannot detect hotplug on this hardware.
        if let Err(e) = self.screen.refresh() {
            warn!("could not refresh screen state after lid event: {e}");
        }

        if closed {
            self.turn_off_laptop_display(CURRENT_TIME);
        }

        // Stored-else-auto on both close and open; a notebook can wake with
        // the lid already closed and must still end up with a live output.
        self.use_stored_or_autoconfigure(CURRENT_TIME);
    }

    fn use_stored_or_autoconfigure(&mut self, timestamp: u32) {
        let mut log = DebugLog::open();

        let intended = self.paths.intended.clone();
        match self.apply_from_file(&intended, timestamp) {
            Ok(()) => {
                log.msg("Applied stored configuration");
                return;
            }
            Err(e) => {
                info!(
                    "existing monitor config not usable during hotplug or lid event ({e}); \
                     looking for legacy configuration"
                );
            }
        }

        let legacy = self.paths.legacy.clone();
        if self.apply_from_file(&legacy, timestamp).is_ok() {
            log.msg("Applied legacy configuration");
            return;
        }

        // De-duplicate repeated events for the same hardware change; a zero
        // timestamp means "now" and always passes.
        if timestamp != self.last_config_timestamp || timestamp == CURRENT_TIME {
            self.last_config_timestamp = timestamp;
            self.auto_configure(timestamp);
            log.msg("  Automatically configured outputs");
        } else {
            log.msg("  Ignored autoconfiguration as old and new config timestamps are the same");
        }
    }

    fn auto_configure(&mut self, timestamp: u32) {
        debug!("auto-configuring outputs");
        let Some(mut config) = default_setup(&self.screen, self.lid_closed, self.policy()) else {
            debug!("no applicable configuration found during auto-configure");
            return;
        };
        // The result becomes the new durable target, so the layout chosen
        // for this hardware survives the next session.
        self.apply_configuration(&mut config, timestamp, true);
    }

    fn turn_off_laptop_display(&mut self, timestamp: u32) {
        let mut config = Config::new_current(self.screen.snapshot());
        turn_off_laptop_in_config(&mut config, self.screen.snapshot());

        // The laptop panel stays on when it is the only display present.
        if !config.is_all_off() {
            // Not saved: restoring a panel-off layout on a later lid-open
            // boot would leave the user in the dark.
            self.apply_configuration(&mut config, timestamp, false);
        }
    }

    // ------------------------------------------------------------------
    // fn-F7 cycling
    // ------------------------------------------------------------------

    fn handle_fn_f7(&mut self, timestamp: u32) {
        debug!("handling XF86Display hotkey");
        let mut log = DebugLog::open();
        log.msg(format!("Handling XF86Display hotkey - timestamp {timestamp}"));

        if let Err(e) = self.screen.refresh() {
            let message = format!("Could not refresh the screen information: {e}");
            log.msg(&message);
            self.spawn_warning(
                &message,
                "Trying to switch the monitor configuration anyway.",
            );
        }

        let Some(mut config) = self
            .cycle
            .advance(&self.screen, self.lid_closed, self.policy())
        else {
            debug!("no configurations generated");
            return;
        };
        if log.enabled() {
            log.msg("Candidate configurations:");
            log.log_configs(self.cycle.candidates());
        }

        // Hotkey timestamps can arrive out of order with respect to RANDR
        // time (BIOS-injected display-switch keystrokes); never let the
        // controller reject the cycle for staleness alone.
        let server_timestamp = self.screen.snapshot().config_timestamp;
        let timestamp = timestamp.max(server_timestamp);

        if self.apply_configuration(&mut config, timestamp, true) {
            log.msg(format!(
                "Successfully switched to configuration (timestamp {timestamp}):"
            ));
            log.log_config(&config);
        }
    }

    // ------------------------------------------------------------------
    // Rotation
    // ------------------------------------------------------------------

    fn allowed_rotations(&self, config: &mut Config, name: &str) -> RotationSet {
        let snapshot = self.screen.snapshot();
        let original = config.output(name).map(|o| o.rotation).unwrap_or_default();

        let mut allowed = RotationSet::empty();
        for rotation in ROTATION_CYCLE {
            if let Some(entry) = config.output_mut(name) {
                entry.rotation = rotation;
            }
            if config.applicable(snapshot).is_ok() {
                allowed |= rotation;
            }
        }
        if let Some(entry) = config.output_mut(name) {
            entry.rotation = original;
        }

        if allowed.is_empty() {
            warn!("output {name} reports no supported rotations, keeping the current one");
            allowed = original.into();
        }
        allowed
    }

    fn handle_rotate(&mut self, target: Option<Rotation>, timestamp: u32) {
        debug!(?target, "handling rotation request");

        let Some(laptop_name) = self
            .screen
            .snapshot()
            .laptop_output()
            .map(|o| o.name.clone())
        else {
            debug!("no laptop output found to rotate");
            return;
        };

        let mut current = Config::new_current(self.screen.snapshot());
        let Some(current_rotation) = current.output(&laptop_name).map(|o| o.rotation) else {
            return;
        };

        let next = match target {
            Some(rotation) => rotation,
            None => {
                let allowed = self.allowed_rotations(&mut current, &laptop_name);
                let next = current_rotation.next_allowed(allowed);
                if next == current_rotation {
                    debug!("no other rotation is supported, nothing to do");
                    return;
                }
                next
            }
        };

        if let Some(entry) = current.output_mut(&laptop_name) {
            entry.rotation = next;
        }

        if self.apply_configuration(&mut current, timestamp, false) {
            self.rotate_touchscreens(next);
        }
    }

    fn rotate_touchscreens(&self, rotation: Rotation) {
        if let Some(touch) = &self.touch {
            touch.rotate_all(rotation);
        }
    }

    /// After applying a stored file, align touch input with the laptop
    /// panel's rotation.
    fn slave_touchscreens_to(&self, config: &Config) {
        let Some(laptop) = self.screen.snapshot().laptop_output() else {
            return;
        };
        if let Some(entry) = config.output(&laptop.name) {
            self.rotate_touchscreens(entry.rotation);
        }
    }

    // ------------------------------------------------------------------
    // Confirmation protocol
    // ------------------------------------------------------------------

    fn handle_apply_configuration(&mut self, timestamp: u32) -> Result<()> {
        if self.confirmation_pending {
            return Err(RandrError::ConfirmationPending);
        }

        // Capture the rollback target first: the state the user is looking
        // at right now. Without a backup there is no safe way to proceed.
        let current = Config::new_current(self.screen.snapshot());
        persist::write_backup_unless_present(&self.paths, &current)?;

        let intended = self.paths.intended.clone();
        match self.apply_from_file(&intended, timestamp) {
            Ok(()) => {
                self.queue_confirmation(timestamp);
                Ok(())
            }
            Err(e) if e.is_no_match() => {
                // Nothing was applied, but the intended file exists and the
                // user asked for it; let the countdown decide its fate.
                self.queue_confirmation(timestamp);
                Ok(())
            }
            Err(e) => {
                self.spawn_warning(
                    "The selected configuration for displays could not be applied",
                    &e.to_string(),
                );
                if let Err(restore) = persist::promote_backup(&self.paths) {
                    if !restore.is_not_found() {
                        warn!("could not restore the previous configuration file: {restore}");
                    }
                }
                Err(e)
            }
        }
    }

    /// The D-Bus caller only wants to know whether RANDR accepted the
    /// geometry; whether the user likes it resolves asynchronously.
    fn queue_confirmation(&mut self, timestamp: u32) {
        self.confirmation_pending = true;
        let ui = Arc::clone(&self.ui);
        let events = self.events_tx.clone();
        let timeout = Duration::from_secs(self.config.confirmation.timeout_seconds);

        tokio::spawn(async move {
            let decision = ui.confirm(timeout).await;
            let _ = events
                .send(Event::ConfirmationResolved {
                    decision,
                    timestamp,
                })
                .await;
        });
    }

    fn on_confirmation_resolved(&mut self, decision: Decision, timestamp: u32) {
        self.confirmation_pending = false;
        match decision {
            Decision::Keep => {
                info!("new display configuration confirmed");
                if let Err(e) = persist::discard_backup(&self.paths) {
                    warn!("could not remove the backup configuration: {e}");
                }
            }
            Decision::Restore => {
                info!("restoring previous display configuration");
                self.restore_backup(timestamp);
            }
        }
    }

    fn restore_backup(&mut self, timestamp: u32) {
        match persist::promote_backup(&self.paths) {
            Ok(()) => {
                let intended = self.paths.intended.clone();
                if let Err(e) = self.apply_from_file(&intended, timestamp) {
                    if !e.is_no_match() {
                        self.spawn_warning(
                            "Could not restore the display's configuration",
                            &e.to_string(),
                        );
                    }
                }
            }
            Err(e) if e.is_not_found() => {
                // No backup means there never was an original configuration
                // (first login). The rejected intended file must not
                // survive either.
                persist::remove_intended(&self.paths);
            }
            Err(e) => {
                // The backup stays on disk; deleting the only rollback
                // target over an I/O hiccup loses data.
                self.spawn_warning(
                    "Could not restore the display's configuration from a backup",
                    &e.to_string(),
                );
            }
        }
    }

    fn spawn_warning(&self, summary: &str, body: &str) {
        warn!("{summary}: {body}");
        let ui = Arc::clone(&self.ui);
        let summary = summary.to_owned();
        let body = body.to_owned();
        tokio::spawn(async move {
            ui.warn(&summary, &body).await;
        });
    }
}
