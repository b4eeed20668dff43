//! Background polling of per-user server status.
//!
//! One task per session polls the status endpoint on a fixed interval and
//! publishes the latest snapshot on a watch channel. Ticks never overlap: a
//! slow poll delays the next tick instead of stacking requests. Errors are
//! logged and the previous snapshot stays published.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Result;
use crate::projects::{ProjectClient, UserStatus};

pub const POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Where a status snapshot comes from. Indirected so the poll loop can be
/// driven by a stub in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusSource: Send + Sync + 'static {
    async fn poll_status(&self) -> Result<UserStatus>;
}

/// Production source: the portal's per-user status endpoint.
pub struct UserStatusSource {
    client: Arc<ProjectClient>,
    user: String,
}

impl UserStatusSource {
    pub fn new(client: Arc<ProjectClient>, user: impl Into<String>) -> Self {
        Self {
            client,
            user: user.into(),
        }
    }
}

#[async_trait]
impl StatusSource for UserStatusSource {
    async fn poll_status(&self) -> Result<UserStatus> {
        self.client.user_status(&self.user).await
    }
}

/// Spawn the poll loop. The receiver holds `None` until the first successful
/// poll; cancelling the token stops the task.
pub fn spawn_status_poll(
    source: impl StatusSource,
    cancel: CancellationToken,
) -> (watch::Receiver<Option<UserStatus>>, JoinHandle<()>) {
    let (tx, rx) = watch::channel(None);

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        // A poll that outlasts the interval pushes the next tick back.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("status poll cancelled");
                    return;
                }
                _ = ticker.tick() => {}
            }

            match source.poll_status().await {
                Ok(status) => {
                    if tx.send(Some(status)).is_err() {
                        debug!("status receiver dropped, stopping poll");
                        return;
                    }
                }
                Err(e) => warn!(error = %e, "status poll failed"),
            }
        }
    });

    (rx, handle)
}
