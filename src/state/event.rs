//! Events flowing into and out of the queue state machine.

use crate::error::{Error, ServerError};
use crate::row::ColumnInfo;

/// Event produced by a [`ConnectionHandle`](crate::ConnectionHandle).
///
/// The handle emits these in transport order; the queue consumes them one at
/// a time through [`QueueStateMachine::on_event`](super::QueueStateMachine::on_event).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The transport is up and authenticated.
    Connected,

    /// The connection failed and will close.
    FatalError(ServerError),

    /// A statement failed.
    ///
    /// Dead-connection codes (2006, 2013, 2055) are treated as fatal.
    Error(ServerError),

    /// A result set begins.
    ResultStarted {
        /// Column names, in order
        columns: Vec<String>,
        /// Column metadata (empty unless requested)
        metadata: Vec<ColumnInfo>,
    },

    /// A data row of the current result set.
    Row(Vec<Option<String>>),

    /// The current result set (or a row-less statement) finished.
    ResultEnded {
        num_rows: u64,
        affected_rows: u64,
        insert_id: u64,
    },

    /// The query finished; no more result sets follow.
    QueryIdle,

    /// The server answered a ping.
    PingAck,

    /// The connection is closed.
    Closed {
        had_error: bool,
    },
}

/// Connection-level notification for the client's listeners.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Connected and (if enabled) the identity probe finished.
    Ready,

    /// A connection-level error: fatal errors, lost pings, and statement
    /// errors that arrived while no query was running.
    Error(Error),

    /// The connection closed.
    Closed {
        had_error: bool,
    },
}
