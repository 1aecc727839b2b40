//! Tokio driver for the query queue.

mod actor;
mod client;
mod connector;

pub use client::Client;
pub use connector::{Connector, EventSender};
