//! X11 implementations of the provider boundaries
//!
//! [`XScreen`] drives the RandR extension through `x11rb`: topology
//! snapshots, framebuffer resizing, and CRTC programming. [`XTouchscreens`]
//! drives the XInput "Coordinate Transformation Matrix" property for
//! rotation slaving. One extra OS thread pumps X events into the manager's
//! channel; everything else stays synchronous on the caller's thread.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use x11rb::connection::Connection;
use x11rb::protocol::randr::{self, ConnectionExt as _};
use x11rb::protocol::xinput::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{self, ConnectionExt as _};
use x11rb::protocol::Event as XEvent;
use x11rb::rust_connection::RustConnection;

use crate::manager::Event;
use crate::randr::{
    ActiveState, Config, Mode, OutputSnapshot, RandrError, Result, Rotation, RrScreen,
    ScreenBounds, ScreenSnapshot,
};

use super::touch::{matrix_for, TabletDatabase, TouchscreenRotator};

fn provider_err(e: impl std::fmt::Display) -> RandrError {
    RandrError::Provider(e.to_string())
}

/// Built-in panels announce themselves through their connector name.
fn is_laptop_name(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    ["LVDS", "EDP", "DSI", "IDP", "LCD", "DFLT"]
        .iter()
        .any(|prefix| upper.starts_with(prefix))
}

fn mode_refresh(info: &randr::ModeInfo) -> u32 {
    let denominator = u64::from(info.htotal) * u64::from(info.vtotal);
    if denominator == 0 {
        return 0;
    }
    ((u64::from(info.dot_clock) + denominator / 2) / denominator) as u32
}

fn to_randr_rotation(rotation: Rotation) -> randr::Rotation {
    match rotation {
        Rotation::Rotate0 => randr::Rotation::ROTATE0,
        Rotation::Rotate90 => randr::Rotation::ROTATE90,
        Rotation::Rotate180 => randr::Rotation::ROTATE180,
        Rotation::Rotate270 => randr::Rotation::ROTATE270,
    }
}

fn from_randr_rotation(rotation: randr::Rotation) -> Rotation {
    // Reflection bits are ignored; they are excluded by policy.
    if rotation.contains(randr::Rotation::ROTATE90) {
        Rotation::Rotate90
    } else if rotation.contains(randr::Rotation::ROTATE180) {
        Rotation::Rotate180
    } else if rotation.contains(randr::Rotation::ROTATE270) {
        Rotation::Rotate270
    } else {
        Rotation::Rotate0
    }
}

/// Hardware identifiers behind one snapshot output.
struct HwOutput {
    id: randr::Output,
    /// CRTC currently driving the output, 0 if off
    crtc: randr::Crtc,
    /// CRTCs this output can be driven by
    crtcs: Vec<randr::Crtc>,
    /// Mode triple → server-side mode id
    mode_ids: HashMap<Mode, u32>,
}

struct HwState {
    outputs_by_name: HashMap<String, HwOutput>,
    enabled_crtcs: Vec<randr::Crtc>,
    config_timestamp: u32,
}

/// The RandR-backed RR-screen provider.
pub struct XScreen {
    conn: Arc<RustConnection>,
    root: xproto::Window,
    snapshot: ScreenSnapshot,
    hw: HwState,
}

impl XScreen {
    /// Connect to the display named by `$DISPLAY` and take the first
    /// snapshot.
    pub fn connect() -> Result<XScreen> {
        let (conn, screen_num) = x11rb::connect(None).map_err(provider_err)?;
        let root = conn.setup().roots[screen_num].root;

        let version = conn
            .randr_query_version(1, 5)
            .map_err(provider_err)?
            .reply()
            .map_err(provider_err)?;
        debug!(
            "RandR version {}.{}",
            version.major_version, version.minor_version
        );
        if version.major_version < 1 || (version.major_version == 1 && version.minor_version < 3) {
            return Err(RandrError::Provider(format!(
                "RandR {}.{} is too old, need at least 1.3",
                version.major_version, version.minor_version
            )));
        }

        let mut screen = XScreen {
            conn: Arc::new(conn),
            root,
            snapshot: ScreenSnapshot {
                outputs: Vec::new(),
                bounds: ScreenBounds {
                    min_width: 0,
                    min_height: 0,
                    max_width: 0,
                    max_height: 0,
                },
                change_timestamp: 0,
                config_timestamp: 0,
            },
            hw: HwState {
                outputs_by_name: HashMap::new(),
                enabled_crtcs: Vec::new(),
                config_timestamp: 0,
            },
        };
        screen.refresh()?;
        Ok(screen)
    }

    /// The shared X connection, for sibling backends (touch rotation).
    pub fn connection(&self) -> Arc<RustConnection> {
        Arc::clone(&self.conn)
    }

    /// Pump ScreenChangeNotify events into the manager's channel from a
    /// dedicated thread with its own X connection.
    pub fn spawn_event_pump(events: mpsc::Sender<Event>) -> Result<()> {
        let (conn, screen_num) = x11rb::connect(None).map_err(provider_err)?;
        let root = conn.setup().roots[screen_num].root;

        conn.randr_select_input(root, randr::NotifyMask::SCREEN_CHANGE)
            .map_err(provider_err)?
            .check()
            .map_err(provider_err)?;

        thread::Builder::new()
            .name("randr-events".to_owned())
            .spawn(move || loop {
                match conn.wait_for_event() {
                    Ok(XEvent::RandrScreenChangeNotify(_)) => {
                        if events.blocking_send(Event::RandrChanged).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("X event connection lost: {e}");
                        break;
                    }
                }
            })
            .map_err(|e| provider_err(format!("could not spawn event thread: {e}")))?;

        Ok(())
    }

    fn read_state(&self) -> Result<(ScreenSnapshot, HwState)> {
        let conn = &*self.conn;

        let resources = conn
            .randr_get_screen_resources_current(self.root)
            .map_err(provider_err)?
            .reply()
            .map_err(provider_err)?;
        let range = conn
            .randr_get_screen_size_range(self.root)
            .map_err(provider_err)?
            .reply()
            .map_err(provider_err)?;
        let primary = conn
            .randr_get_output_primary(self.root)
            .map_err(provider_err)?
            .reply()
            .map_err(provider_err)?
            .output;

        let modes_by_id: HashMap<u32, Mode> = resources
            .modes
            .iter()
            .map(|info| {
                (
                    info.id,
                    Mode {
                        width: u32::from(info.width),
                        height: u32::from(info.height),
                        refresh: mode_refresh(info),
                    },
                )
            })
            .collect();

        let mut outputs = Vec::new();
        let mut outputs_by_name = HashMap::new();
        let mut enabled_crtcs = Vec::new();

        for &output_id in &resources.outputs {
            let info = conn
                .randr_get_output_info(output_id, resources.config_timestamp)
                .map_err(provider_err)?
                .reply()
                .map_err(provider_err)?;

            let name = String::from_utf8_lossy(&info.name).into_owned();
            let connected = info.connection == randr::Connection::CONNECTED;

            let mut modes = Vec::new();
            let mut mode_ids = HashMap::new();
            for &mode_id in &info.modes {
                if let Some(&mode) = modes_by_id.get(&mode_id) {
                    modes.push(mode);
                    // Keep the lowest id per triple: ids are listed in the
                    // server's preference order.
                    mode_ids.entry(mode).or_insert(mode_id);
                }
            }

            let preferred_mode = info
                .modes
                .first()
                .filter(|_| info.num_preferred > 0)
                .and_then(|id| modes_by_id.get(id))
                .copied();

            let current = if info.crtc != 0 {
                let crtc_info = conn
                    .randr_get_crtc_info(info.crtc, resources.config_timestamp)
                    .map_err(provider_err)?
                    .reply()
                    .map_err(provider_err)?;
                if crtc_info.mode != 0 {
                    enabled_crtcs.push(info.crtc);
                    modes_by_id.get(&crtc_info.mode).map(|&mode| ActiveState {
                        x: i32::from(crtc_info.x),
                        y: i32::from(crtc_info.y),
                        mode,
                        rotation: from_randr_rotation(crtc_info.rotation),
                    })
                } else {
                    None
                }
            } else {
                None
            };

            outputs_by_name.insert(
                name.clone(),
                HwOutput {
                    id: output_id,
                    crtc: info.crtc,
                    crtcs: info.crtcs.clone(),
                    mode_ids,
                },
            );

            outputs.push(OutputSnapshot {
                is_laptop: is_laptop_name(&name),
                name,
                connected,
                preferred_mode,
                modes,
                current,
                primary: output_id == primary,
                mm_width: info.mm_width,
                mm_height: info.mm_height,
            });
        }

        // enabled_crtcs collected via outputs misses cloned CRTCs at most
        // once; de-duplicate.
        enabled_crtcs.sort_unstable();
        enabled_crtcs.dedup();

        let snapshot = ScreenSnapshot {
            outputs,
            bounds: ScreenBounds {
                min_width: u32::from(range.min_width),
                min_height: u32::from(range.min_height),
                max_width: u32::from(range.max_width),
                max_height: u32::from(range.max_height),
            },
            change_timestamp: resources.timestamp,
            config_timestamp: resources.config_timestamp,
        };
        let hw = HwState {
            outputs_by_name,
            enabled_crtcs,
            config_timestamp: resources.config_timestamp,
        };

        Ok((snapshot, hw))
    }

    fn apply_inner(&self, config: &Config, timestamp: u32) -> Result<()> {
        let conn = &*self.conn;

        // Required framebuffer, clamped into the controller's range.
        let (fb_width, fb_height) = match config.bounding_box() {
            Some((left, top, right, bottom)) => (
                (right - left.min(0)) as u32,
                (bottom - top.min(0)) as u32,
            ),
            None => return Err(RandrError::Apply("all outputs are off".to_owned())),
        };
        let fb_width = fb_width.max(self.snapshot.bounds.min_width);
        let fb_height = fb_height.max(self.snapshot.bounds.min_height);

        // Pass 1: everything off, so no CRTC can stick out of the new
        // framebuffer while it shrinks. Each reply carries the server's new
        // timestamp; later requests must use it or they are rejected as
        // stale.
        let mut op_timestamp = timestamp;
        for &crtc in &self.hw.enabled_crtcs {
            let reply = conn
                .randr_set_crtc_config(
                    crtc,
                    op_timestamp,
                    self.hw.config_timestamp,
                    0,
                    0,
                    0,
                    randr::Rotation::ROTATE0,
                    &[],
                )
                .map_err(provider_err)?
                .reply()
                .map_err(provider_err)?;
            if reply.status != randr::SetConfig::SUCCESS {
                return Err(RandrError::Apply(format!(
                    "could not disable CRTC {crtc}: {:?}",
                    reply.status
                )));
            }
            op_timestamp = op_timestamp.max(reply.timestamp);
        }

        // Physical size scaled to keep the DPI the server assumes (96).
        let mm_width = (f64::from(fb_width) * 25.4 / 96.0) as u32;
        let mm_height = (f64::from(fb_height) * 25.4 / 96.0) as u32;
        conn.randr_set_screen_size(self.root, fb_width as u16, fb_height as u16, mm_width, mm_height)
            .map_err(provider_err)?
            .check()
            .map_err(provider_err)?;

        // Pass 2: program the active outputs.
        let mut used_crtcs: HashSet<randr::Crtc> = HashSet::new();
        let mut primary_output: randr::Output = 0;

        for entry in config.outputs.iter().filter(|o| o.active) {
            let hw = self
                .hw
                .outputs_by_name
                .get(&entry.name)
                .ok_or(RandrError::NoMatchingConfig)?;
            let mode_id = *hw
                .mode_ids
                .get(&entry.mode())
                .ok_or(RandrError::NoMatchingConfig)?;

            let crtc = if hw.crtc != 0 && !used_crtcs.contains(&hw.crtc) {
                hw.crtc
            } else {
                *hw.crtcs
                    .iter()
                    .find(|c| !used_crtcs.contains(c))
                    .ok_or_else(|| {
                        RandrError::Apply(format!("no free CRTC for output {}", entry.name))
                    })?
            };
            used_crtcs.insert(crtc);

            let reply = conn
                .randr_set_crtc_config(
                    crtc,
                    op_timestamp,
                    self.hw.config_timestamp,
                    entry.x as i16,
                    entry.y as i16,
                    mode_id,
                    to_randr_rotation(entry.rotation),
                    &[hw.id],
                )
                .map_err(provider_err)?
                .reply()
                .map_err(provider_err)?;
            if reply.status != randr::SetConfig::SUCCESS {
                return Err(RandrError::Apply(format!(
                    "could not configure output {}: {:?}",
                    entry.name, reply.status
                )));
            }
            op_timestamp = op_timestamp.max(reply.timestamp);

            if entry.primary {
                primary_output = hw.id;
            }
        }

        conn.randr_set_output_primary(self.root, primary_output)
            .map_err(provider_err)?
            .check()
            .map_err(provider_err)?;

        Ok(())
    }
}

impl RrScreen for XScreen {
    fn refresh(&mut self) -> Result<()> {
        let (snapshot, hw) = self.read_state()?;
        self.snapshot = snapshot;
        self.hw = hw;
        Ok(())
    }

    fn snapshot(&self) -> &ScreenSnapshot {
        &self.snapshot
    }

    fn apply_with_time(&mut self, config: &Config, timestamp: u32) -> Result<()> {
        config.applicable(&self.snapshot)?;

        self.conn
            .grab_server()
            .map_err(provider_err)?
            .check()
            .map_err(provider_err)?;
        let result = self.apply_inner(config, timestamp);
        let _ = self.conn.ungrab_server();
        let _ = self.conn.flush();
        result?;

        self.refresh()
    }
}

/// XInput-backed touchscreen rotation.
pub struct XTouchscreens {
    conn: Arc<RustConnection>,
    tablets: Box<dyn TabletDatabase>,
}

impl XTouchscreens {
    /// Rotate touch devices over an existing connection (normally the
    /// [`XScreen`]'s), excluding devices the database classifies as drawing
    /// tablets.
    pub fn new(conn: Arc<RustConnection>, tablets: Box<dyn TabletDatabase>) -> XTouchscreens {
        XTouchscreens { conn, tablets }
    }

    fn atom(&self, name: &[u8]) -> Result<xproto::Atom> {
        Ok(self
            .conn
            .intern_atom(false, name)
            .map_err(provider_err)?
            .reply()
            .map_err(provider_err)?
            .atom)
    }

    fn atom_name(&self, atom: xproto::Atom) -> Option<String> {
        if atom == 0 {
            return None;
        }
        let reply = self.conn.get_atom_name(atom).ok()?.reply().ok()?;
        Some(String::from_utf8_lossy(&reply.name).into_owned())
    }

    fn rotate_inner(&self, rotation: Rotation) -> Result<()> {
        let conn = &*self.conn;

        let float_atom = self.atom(b"FLOAT")?;
        let matrix_atom = self.atom(b"Coordinate Transformation Matrix")?;
        let matrix: Vec<u32> = matrix_for(rotation)
            .iter()
            .map(|f| f.to_bits())
            .collect();

        let devices = conn
            .xinput_list_input_devices()
            .map_err(provider_err)?
            .reply()
            .map_err(provider_err)?;

        for (info, name) in devices.devices.iter().zip(devices.names.iter()) {
            let device_name = String::from_utf8_lossy(&name.name).into_owned();

            let Some(kind) = self.atom_name(info.device_type) else {
                continue;
            };
            if kind != "TOUCHSCREEN" && kind != "TABLET" {
                continue;
            }
            if self.tablets.is_drawing_tablet(&device_name) {
                debug!("not rotating drawing tablet '{device_name}'");
                continue;
            }

            debug!("rotating '{device_name}' to {rotation}");
            conn.xinput_change_device_property(
                matrix_atom,
                float_atom,
                info.device_id,
                xproto::PropMode::REPLACE,
                9,
                &xinput::ChangeDevicePropertyAux::Data32(matrix.clone()),
            )
            .map_err(provider_err)?
            .check()
            .map_err(provider_err)?;
        }

        conn.flush().map_err(provider_err)?;
        Ok(())
    }
}

impl TouchscreenRotator for XTouchscreens {
    fn rotate_all(&self, rotation: Rotation) {
        if let Err(e) = self.rotate_inner(rotation) {
            warn!("could not rotate touchscreen devices: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_laptop_name() {
        assert!(is_laptop_name("eDP-1"));
        assert!(is_laptop_name("LVDS1"));
        assert!(is_laptop_name("DSI-0"));
        assert!(!is_laptop_name("HDMI-1"));
        assert!(!is_laptop_name("DP-3"));
    }

    #[test]
    fn test_mode_refresh_rounds() {
        let info = randr::ModeInfo {
            id: 1,
            width: 1920,
            height: 1080,
            dot_clock: 148_500_000,
            hsync_start: 0,
            hsync_end: 0,
            htotal: 2200,
            hskew: 0,
            vsync_start: 0,
            vsync_end: 0,
            vtotal: 1125,
            name_len: 0,
            mode_flags: 0u32.into(),
        };
        assert_eq!(mode_refresh(&info), 60);
    }

    #[test]
    fn test_rotation_round_trip() {
        for rotation in crate::randr::mode::ROTATION_CYCLE {
            assert_eq!(from_randr_rotation(to_randr_rotation(rotation)), rotation);
        }
    }
}
