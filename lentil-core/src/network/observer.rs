//! Hooks for watching the raw protocol traffic of a connection.
//!
//! An observer is handed to the transport when it is created and sees
//! every command line sent and every status line received. The default is
//! [`NoopObserver`].

use std::sync::Arc;

/// Receives every protocol line crossing a connection.
///
/// Lines are passed without their CRLF terminator; payload bytes are not
/// included.
pub trait Observer: Send + Sync {
    fn on_send(&self, _peer: &str, _line: &str) {}

    fn on_receive(&self, _peer: &str, _line: &str) {}
}

/// Ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

/// Logs every line at `trace` level under the `lentil::wire` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_send(&self, peer: &str, line: &str) {
        tracing::trace!(target: "lentil::wire", %peer, "-> {line}");
    }

    fn on_receive(&self, peer: &str, line: &str) {
        tracing::trace!(target: "lentil::wire", %peer, "<- {line}");
    }
}

pub(crate) fn noop() -> Arc<dyn Observer> {
    Arc::new(NoopObserver)
}
