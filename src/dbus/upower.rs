//! Laptop lid state via UPower
//!
//! Reads `LidIsClosed` from org.freedesktop.UPower on the system bus and
//! streams property changes into the manager's event channel. A machine
//! without UPower simply runs without lid handling.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::debug;

use crate::manager::Event;

/// Connection to the UPower daemon.
pub struct LidMonitor {
    proxy: zbus::Proxy<'static>,
}

impl LidMonitor {
    /// Connect to the system bus and build the UPower proxy.
    pub async fn connect() -> Result<LidMonitor> {
        let connection = zbus::Connection::system()
            .await
            .context("Failed to connect to the system bus")?;

        let proxy: zbus::Proxy<'static> = zbus::ProxyBuilder::new(&connection)
            .interface("org.freedesktop.UPower")?
            .path("/org/freedesktop/UPower")?
            .destination("org.freedesktop.UPower")?
            .build()
            .await
            .context("Failed to create UPower proxy")?;

        Ok(LidMonitor { proxy })
    }

    /// Whether the laptop lid is currently closed.
    pub async fn lid_is_closed(&self) -> Result<bool> {
        self.proxy
            .get_property("LidIsClosed")
            .await
            .context("Failed to read LidIsClosed")
    }

    /// Forward lid transitions into the manager until the channel closes.
    pub async fn watch(self, events: mpsc::Sender<Event>) {
        let mut changes = self
            .proxy
            .receive_property_changed::<bool>("LidIsClosed")
            .await;

        while let Some(change) = changes.next().await {
            match change.get().await {
                Ok(closed) => {
                    debug!(lid_closed = closed, "UPower lid state change");
                    if events.send(Event::LidChanged(closed)).await.is_err() {
                        break;
                    }
                }
                Err(e) => debug!("could not read lid state change: {e}"),
            }
        }
    }
}
