//! Confirmation dialog over org.freedesktop.Notifications
//!
//! The confirmation "dialog" is a persistent notification with two action
//! buttons and a body line that counts down once per second. Timeout,
//! dismissal, or an unreachable notification service all resolve to
//! restore: silence never keeps a possibly-broken configuration.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::{debug, warn};
use zbus::zvariant::Value;

use crate::manager::confirm::{ConfirmationUi, Decision};

const APP_NAME: &str = "csd-xrandr";
const ICON: &str = "preferences-desktop-display";
const SUMMARY: &str = "Does the display look OK?";
const ACTION_KEEP: &str = "keep";
const ACTION_RESTORE: &str = "restore";

fn countdown_body(seconds: u64) -> String {
    if seconds == 1 {
        "The display will be reset to its previous configuration in 1 second".to_owned()
    } else {
        format!("The display will be reset to its previous configuration in {seconds} seconds")
    }
}

/// Notification-backed confirmation and warning surface.
pub struct NotificationUi {
    proxy: zbus::Proxy<'static>,
}

impl NotificationUi {
    /// Build the proxy on an existing session-bus connection.
    pub async fn new(connection: &zbus::Connection) -> Result<NotificationUi> {
        let proxy: zbus::Proxy<'static> = zbus::ProxyBuilder::new(connection)
            .interface("org.freedesktop.Notifications")?
            .path("/org/freedesktop/Notifications")?
            .destination("org.freedesktop.Notifications")?
            .build()
            .await
            .context("Failed to create Notifications proxy")?;

        Ok(NotificationUi { proxy })
    }

    async fn notify(
        &self,
        replaces_id: u32,
        summary: &str,
        body: &str,
        actions: &[&str],
        expire_ms: i32,
    ) -> Result<u32> {
        // Critical urgency keeps the countdown on screen instead of letting
        // the shell fold it away after a few seconds.
        let mut hints: HashMap<&str, Value<'_>> = HashMap::new();
        hints.insert("urgency", Value::from(2u8));

        let reply = self
            .proxy
            .call_method(
                "Notify",
                &(
                    APP_NAME,
                    replaces_id,
                    ICON,
                    summary,
                    body,
                    actions.to_vec(),
                    hints,
                    expire_ms,
                ),
            )
            .await
            .context("Failed to call Notify")?;

        let id: u32 = reply
            .body()
            .deserialize()
            .context("Failed to deserialize Notify response")?;
        Ok(id)
    }

    async fn close(&self, id: u32) {
        let _ = self.proxy.call_method("CloseNotification", &(id,)).await;
    }

    async fn run_confirmation(&self, timeout: Duration) -> Result<Decision> {
        let mut action_signals = self
            .proxy
            .receive_signal("ActionInvoked")
            .await
            .context("Failed to subscribe to ActionInvoked")?;
        let mut closed_signals = self
            .proxy
            .receive_signal("NotificationClosed")
            .await
            .context("Failed to subscribe to NotificationClosed")?;

        let actions = [
            ACTION_RESTORE,
            "Restore Previous Configuration",
            ACTION_KEEP,
            "Keep This Configuration",
        ];

        let mut remaining = timeout.as_secs().max(1);
        let id = self
            .notify(0, SUMMARY, &countdown_body(remaining), &actions, 0)
            .await?;

        let mut ticks = tokio::time::interval(Duration::from_secs(1));
        // The first tick of an interval completes immediately.
        ticks.tick().await;

        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    remaining -= 1;
                    if remaining == 0 {
                        self.close(id).await;
                        return Ok(Decision::Restore);
                    }
                    if let Err(e) = self
                        .notify(id, SUMMARY, &countdown_body(remaining), &actions, 0)
                        .await
                    {
                        debug!("could not update the countdown notification: {e}");
                    }
                }
                Some(message) = action_signals.next() => {
                    let Ok((signal_id, key)) = message.body().deserialize::<(u32, String)>() else {
                        continue;
                    };
                    if signal_id != id {
                        continue;
                    }
                    self.close(id).await;
                    return Ok(if key == ACTION_KEEP {
                        Decision::Keep
                    } else {
                        Decision::Restore
                    });
                }
                Some(message) = closed_signals.next() => {
                    let Ok((signal_id, _reason)) = message.body().deserialize::<(u32, u32)>() else {
                        continue;
                    };
                    if signal_id != id {
                        continue;
                    }
                    // Dismissed without choosing: revert.
                    return Ok(Decision::Restore);
                }
            }
        }
    }
}

#[async_trait]
impl ConfirmationUi for NotificationUi {
    async fn confirm(&self, timeout: Duration) -> Decision {
        match self.run_confirmation(timeout).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!("could not present the confirmation dialog ({e}); waiting out the countdown");
                tokio::time::sleep(timeout).await;
                Decision::Restore
            }
        }
    }

    async fn warn(&self, summary: &str, body: &str) {
        if let Err(e) = self.notify(0, summary, body, &[], 10_000).await {
            debug!("could not show warning notification: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_countdown_body_pluralizes() {
        assert!(countdown_body(30).contains("30 seconds"));
        assert!(countdown_body(1).ends_with("1 second"));
    }
}
