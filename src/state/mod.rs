//! Sans-I/O state machine for the query queue.
//!
//! The queue never performs I/O. It calls into a
//! [`ConnectionHandle`](crate::ConnectionHandle), consumes the [`Event`]s the
//! handle reports back, and exposes the keepalive timer it wants scheduled.

mod delivery;
pub mod event;
pub mod keepalive;
pub mod queue;
pub mod request;

pub use event::{ClientEvent, Event};
pub use keepalive::{ArmedTimer, TimerKind};
pub use queue::{AbortPlan, ConnectionState, QueueStateMachine};
pub use request::{Callback, QueryOpts};
