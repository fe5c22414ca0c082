//! Single-instance guard.
//!
//! Binds a fixed localhost port before the state machine starts; a bound
//! port means another instance owns the microphone and the speech queue,
//! which is the one startup failure allowed to terminate the process.

use crate::error::{AssistantError, Result};
use std::net::TcpListener;
use tracing::debug;

/// Holds the port for the lifetime of the process.
pub struct InstanceLock {
    listener: TcpListener,
}

impl InstanceLock {
    /// The bound port.
    pub fn port(&self) -> u16 {
        self.listener
            .local_addr()
            .map(|addr| addr.port())
            .unwrap_or_default()
    }
}

/// Acquire the instance lock on `port`.
///
/// # Errors
///
/// Returns [`AssistantError::AlreadyRunning`] if the port is taken.
pub fn acquire(port: u16) -> Result<InstanceLock> {
    match TcpListener::bind(("127.0.0.1", port)) {
        Ok(listener) => {
            debug!("instance lock acquired on port {}", port);
            Ok(InstanceLock { listener })
        }
        Err(_) => Err(AssistantError::AlreadyRunning),
    }
}
