//! Connection liveness monitoring.
//!
//! The monitor pings the server through the ordinary action path on a fixed
//! interval. If a ping goes unanswered within the bound, the transport is
//! force-closed with [`CLOSE_CODE_PING_TIMEOUT`]; reconnecting is left to the
//! connection owner.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, trace, warn};

use crate::error::Error;
use crate::protocol::{Action, CLOSE_CODE_PING_TIMEOUT, PING_TIMEOUT_REASON};

use super::connection::Connection;

// ============================================================================
// Constants
// ============================================================================

/// Default time between pings.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(60);

/// Default bound on a ping round trip.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// KeepaliveConfig
// ============================================================================

/// Keepalive timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepaliveConfig {
    /// Time between pings.
    pub interval: Duration,
    /// How long to wait for each ping's response.
    pub timeout: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_PING_INTERVAL,
            timeout: DEFAULT_PING_TIMEOUT,
        }
    }
}

// ============================================================================
// KeepaliveHandle
// ============================================================================

/// Owned handle to a running monitor.
///
/// Dropping the handle stops the monitor.
#[derive(Debug)]
pub struct KeepaliveHandle {
    task: JoinHandle<()>,
}

impl KeepaliveHandle {
    /// Starts monitoring `connection`.
    ///
    /// The first ping goes out one full interval after start.
    #[must_use]
    pub fn start(connection: Connection, config: KeepaliveConfig) -> Self {
        let task = tokio::spawn(run(connection, config));
        Self { task }
    }

    /// Stops the monitor.
    pub fn stop(self) {
        drop(self);
    }

    /// Returns `true` once the monitor task has exited.
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for KeepaliveHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ============================================================================
// Monitor Loop
// ============================================================================

async fn run(connection: Connection, config: KeepaliveConfig) {
    let mut ticker = interval_at(Instant::now() + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        if !connection.is_open() {
            debug!("Connection no longer open, keepalive exiting");
            return;
        }

        match connection
            .execute(Action::Ping, None, Some(config.timeout))
            .await
        {
            Ok(_) => trace!("Ping answered"),

            Err(Error::ActionTimeout { timeout_ms, .. }) => {
                warn!(timeout_ms, "Ping took too long, disconnecting");
                connection.force_close(CLOSE_CODE_PING_TIMEOUT, PING_TIMEOUT_REASON);
                return;
            }

            Err(Error::ConnectionLost | Error::NotConnected) => {
                debug!("Connection closed during ping, keepalive exiting");
                return;
            }

            Err(e) => warn!(error = %e, "Ping failed"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
