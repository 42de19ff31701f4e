//! # csd-xrandr
//!
//! XRandR output-configuration daemon for the Cinnamon session.
//!
//! The daemon computes, validates, and applies monitor layouts against the
//! live display hardware, persists them across hotplug and lid events, and
//! wraps risky changes in a confirmation/rollback protocol.
//!
//! # Architecture
//!
//! ```text
//! csd-xrandr
//!   ├─> XrandrManager (event loop: hotplug, lid, D-Bus methods)
//!   │     ├─> Layout synthesizer + sanitizer (candidate configurations)
//!   │     ├─> Cycle engine (XF86Display hotkey state machine)
//!   │     ├─> Persistence (intended / backup / legacy files)
//!   │     └─> Confirmation protocol (countdown + rollback)
//!   ├─> RR-screen provider (RandR via x11rb)
//!   ├─> D-Bus facade (org.cinnamon.SettingsDaemon.XRANDR_2)
//!   ├─> UPower lid monitor (system bus)
//!   └─> Notification dialog (org.freedesktop.Notifications)
//! ```
//!
//! # Data Flow
//!
//! Hardware/session events → event router → {stored configuration, or
//! synthesizer + sanitizer} → candidate configuration → provider apply →
//! (optionally) confirmation countdown → persistence.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Production providers (X11 RandR screen, XInput touch rotation)
pub mod backend;

/// Daemon configuration
pub mod config;

/// D-Bus facade and consumed bus interfaces
pub mod dbus;

/// Layout synthesis and sanitization
pub mod layout;

/// The manager: event router, cycle engine, persistence, confirmation
pub mod manager;

/// RandR data model and the RR-screen provider boundary
pub mod randr;
