//! RandR data model and provider boundary
//!
//! The types here describe *intended* screen layouts ([`config::Config`]) and
//! the *observed* hardware topology ([`screen::ScreenSnapshot`]). The
//! [`screen::RrScreen`] trait is the seam to the display controller: the
//! daemon core never talks X11 directly, it builds and validates
//! configurations against a snapshot and hands them to the provider for
//! atomic application.

use thiserror::Error;

pub mod config;
pub mod mode;
pub mod output;
pub mod screen;
pub mod testing;

pub use config::{Config, OutputConfig};
pub use mode::{Mode, Rotation, RotationSet};
pub use output::{ActiveState, OutputSnapshot};
pub use screen::{RrScreen, ScreenBounds, ScreenSnapshot};

/// The X "CurrentTime" sentinel: a zero timestamp means "now" and is never
/// rejected for staleness.
pub const CURRENT_TIME: u32 = 0;

/// RandR result type
pub type Result<T> = std::result::Result<T, RandrError>;

/// Errors produced while loading, validating, or applying configurations.
#[derive(Error, Debug)]
pub enum RandrError {
    /// A configuration does not describe the current hardware topology.
    ///
    /// Not a true failure: fall-through chains (stored → legacy →
    /// auto-configure) treat it as "try the next strategy".
    #[error("none of the stored configurations match the current outputs")]
    NoMatchingConfig,

    /// The union of active outputs exceeds the framebuffer's addressable size.
    #[error(
        "configuration needs a {required_width}x{required_height} framebuffer, \
         but the controller allows at most {max_width}x{max_height}"
    )]
    Bounds {
        /// Width the configuration would need
        required_width: u32,
        /// Height the configuration would need
        required_height: u32,
        /// Largest addressable width
        max_width: u32,
        /// Largest addressable height
        max_height: u32,
    },

    /// The display controller rejected an apply call.
    #[error("display controller rejected the configuration: {0}")]
    Apply(String),

    /// A previous configuration change is still awaiting user confirmation.
    #[error("a previous display change is still awaiting confirmation")]
    ConfirmationPending,

    /// Provider-level failure (connection lost, refresh failed, ...).
    #[error("RandR provider error: {0}")]
    Provider(String),

    /// A stored configuration file could not be parsed.
    #[error("could not parse configuration file: {0}")]
    Parse(String),

    /// Filesystem failure while reading or writing configuration files.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RandrError {
    /// True for "the file is simply not there": expected for the backup
    /// file at steady state and for the intended file on first login.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RandrError::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }

    /// True for the non-fatal "stored file does not match this hardware"
    /// outcome.
    pub fn is_no_match(&self) -> bool {
        matches!(self, RandrError::NoMatchingConfig)
    }
}
