//! D-Bus surfaces
//!
//! The served façade [`XrandrService`] exposes the
//! `org.cinnamon.SettingsDaemon.XRANDR_2` interface and forwards every call
//! into the manager's event channel; the manager never blocks the bus. The
//! submodules hold the consumed interfaces: the Notifications-based
//! confirmation dialog and the UPower lid monitor.

pub mod notifications;
pub mod upower;

use anyhow::Context;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::manager::Event;
use crate::randr::Rotation;

/// Well-known bus name of the xrandr service.
pub const BUS_NAME: &str = "org.cinnamon.SettingsDaemon.XRANDR_2";
/// Object path of the xrandr service.
pub const OBJECT_PATH: &str = "/org/cinnamon/SettingsDaemon/XRANDR";

/// The served xrandr interface.
pub struct XrandrService {
    events: mpsc::Sender<Event>,
}

impl XrandrService {
    /// A service handle feeding the given manager channel.
    pub fn new(events: mpsc::Sender<Event>) -> XrandrService {
        XrandrService { events }
    }

    async fn forward(&self, event: Event) -> zbus::fdo::Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| zbus::fdo::Error::Failed("the display manager is shutting down".into()))
    }
}

#[zbus::interface(name = "org.cinnamon.SettingsDaemon.XRANDR_2")]
impl XrandrService {
    /// Apply the intended configuration file, queuing a confirmation
    /// countdown. Returns once the speculative apply has succeeded; the
    /// user's verdict resolves asynchronously.
    async fn apply_configuration(
        &self,
        parent_window_id: i64,
        timestamp: i64,
    ) -> zbus::fdo::Result<()> {
        let (reply, outcome) = oneshot::channel();
        self.forward(Event::ApplyConfiguration {
            parent_window_id,
            timestamp,
            reply,
        })
        .await?;

        match outcome.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(zbus::fdo::Error::Failed(e.to_string())),
            Err(_) => Err(zbus::fdo::Error::Failed(
                "the display manager dropped the request".into(),
            )),
        }
    }

    /// Cycle to the next candidate layout (the XF86Display hotkey).
    async fn video_mode_switch(&self, timestamp: i64) -> zbus::fdo::Result<()> {
        self.forward(Event::VideoModeSwitch { timestamp }).await
    }

    /// Rotate the laptop output to the next allowed rotation.
    async fn rotate(&self, timestamp: i64) -> zbus::fdo::Result<()> {
        self.forward(Event::Rotate {
            target: None,
            timestamp,
        })
        .await
    }

    /// Rotate the laptop output to an explicit rotation; values outside the
    /// four allowed rotations are rejected.
    async fn rotate_to(&self, rotation: i32, timestamp: i64) -> zbus::fdo::Result<()> {
        let Some(target) = Rotation::from_wire(rotation) else {
            debug!("not setting out of bounds rotation '{rotation}'");
            return Err(zbus::fdo::Error::InvalidArgs(format!(
                "rotation {rotation} is not one of the allowed values"
            )));
        };
        self.forward(Event::Rotate {
            target: Some(target),
            timestamp,
        })
        .await
    }
}

/// Own the bus name and serve the façade. The returned connection must stay
/// alive for the lifetime of the daemon.
pub async fn serve(events: mpsc::Sender<Event>) -> anyhow::Result<zbus::Connection> {
    let connection = zbus::connection::Builder::session()
        .context("could not connect to the session bus")?
        .name(BUS_NAME)
        .context("invalid bus name")?
        .serve_at(OBJECT_PATH, XrandrService::new(events))
        .context("invalid object path")?
        .build()
        .await
        .context("could not register the XRANDR D-Bus service")?;

    Ok(connection)
}
