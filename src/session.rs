//! Lazily opened network session shared by every request of a client.

use std::fmt;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::ApiError;
use crate::http::{DynHttpTransport, TransportFactory};

/// Exclusively owned transport handle, created on first use.
///
/// At most one transport is live at a time. [`Session::ensure_open`] is
/// idempotent under concurrent first calls; after [`Session::close`] the next
/// request transparently opens a fresh transport.
pub struct Session {
    factory: TransportFactory,
    timeout: Duration,
    slot: RwLock<Option<DynHttpTransport>>,
}

impl Session {
    /// Creates a closed session that will use `factory` with `timeout` on open.
    pub fn new(factory: TransportFactory, timeout: Duration) -> Self {
        Self {
            factory,
            timeout,
            slot: RwLock::new(None),
        }
    }

    /// Returns the live transport, opening one if none exists.
    pub async fn ensure_open(&self) -> Result<DynHttpTransport, ApiError> {
        if let Some(transport) = self.slot.read().await.as_ref() {
            return Ok(transport.clone());
        }

        let mut slot = self.slot.write().await;
        // another caller may have opened it while we waited for the write lock
        if let Some(transport) = slot.as_ref() {
            return Ok(transport.clone());
        }
        let transport = (self.factory)(self.timeout)?;
        debug!(timeout_ms = self.timeout.as_millis() as u64, "opened http session");
        *slot = Some(transport.clone());
        Ok(transport)
    }

    /// Tears the session down. Returns `false` if nothing was open.
    ///
    /// In-flight requests keep their own handle and finish normally; the
    /// connection pool is released once the last handle is dropped.
    pub async fn close(&self) -> bool {
        let closed = self.slot.write().await.take().is_some();
        if closed {
            debug!("closed http session");
        }
        closed
    }

    /// Reports whether a transport is currently live.
    pub async fn is_open(&self) -> bool {
        self.slot.read().await.is_some()
    }

    /// Per-attempt timeout the session was configured with.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
