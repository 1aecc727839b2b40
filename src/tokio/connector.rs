use tokio::sync::mpsc;

use crate::handle::ConnectionHandle;
use crate::state::Event;

/// Sink a handle reports its events to.
pub type EventSender = mpsc::UnboundedSender<Event>;

/// Creates connection handles.
///
/// A [`Client`](super::Client) opens one handle for its own connection and
/// one more for each `KILL` it has to issue.
pub trait Connector: Send + Sync + 'static {
    type Handle: ConnectionHandle + Send + 'static;

    /// Create a handle that reports to `events`. The handle must not connect
    /// until [`ConnectionHandle::connect`] is called.
    fn open(&self, events: EventSender) -> Self::Handle;
}
