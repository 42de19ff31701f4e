//! Confirmation dialog seam
//!
//! The protocol itself (backup, speculative apply, restore) lives in the
//! manager; this module defines the user-facing side as a trait so the
//! daemon core never depends on a particular dialog technology. The
//! production implementation is
//! [`crate::dbus::notifications::NotificationUi`].

use async_trait::async_trait;
use std::time::Duration;

/// The user's verdict on a speculatively applied configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Keep the new configuration; the rollback target is discarded.
    Keep,
    /// Restore the previous configuration. Also the answer for a timeout or
    /// a dismissed dialog: silence never keeps a possibly-broken layout.
    Restore,
}

/// A modal-ish confirmation surface with a visible countdown.
#[async_trait]
pub trait ConfirmationUi: Send + Sync {
    /// Ask whether the display looks OK, counting down from `timeout`.
    ///
    /// Implementations resolve to [`Decision::Restore`] when the countdown
    /// expires or the question cannot be presented at all.
    async fn confirm(&self, timeout: Duration) -> Decision;

    /// Show a non-blocking warning (best effort, never fails the caller).
    async fn warn(&self, summary: &str, body: &str);
}

/// A UI that cannot reach the user: waits out the full countdown, then
/// restores. Used when the notification service is unavailable.
pub struct UnattendedUi;

#[async_trait]
impl ConfirmationUi for UnattendedUi {
    async fn confirm(&self, timeout: Duration) -> Decision {
        tokio::time::sleep(timeout).await;
        Decision::Restore
    }

    async fn warn(&self, summary: &str, body: &str) {
        tracing::debug!("no UI available for warning: {summary}: {body}");
    }
}
