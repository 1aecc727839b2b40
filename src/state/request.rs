//! Queued queries.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::row::Response;
use crate::stream::{Demand, EmitterShared, QueryStream};
use crate::value::Params;

use super::delivery::Delivery;

/// Statement run right after connecting to learn the connection id.
pub(crate) const IDENTITY_PROBE_SQL: &str = "SELECT CONNECTION_ID()";

/// Receives the outcome of a buffered query.
pub type Callback = Box<dyn FnOnce(Result<Response>) + Send>;

/// Per-query options.
#[derive(Debug, Clone, Default)]
pub struct QueryOpts {
    /// Values for the template's placeholders.
    ///
    /// Without params the SQL text is sent as-is.
    pub params: Option<Params>,

    /// Deliver rows addressable by index only, without column names.
    pub use_array: bool,

    /// Attach column metadata; `None` uses the connection default.
    pub metadata: Option<bool>,

    /// Rows buffered per streaming result; `None` uses the connection default.
    pub high_water_mark: Option<usize>,
}

impl QueryOpts {
    pub fn with_params(params: impl Into<Params>) -> Self {
        Self {
            params: Some(params.into()),
            ..Self::default()
        }
    }

    pub fn use_array(mut self) -> Self {
        self.use_array = true;
        self
    }

    pub fn metadata(mut self, metadata: bool) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn high_water_mark(mut self, rows: usize) -> Self {
        self.high_water_mark = Some(rows);
        self
    }
}

enum Kind {
    IdentityProbe,
    Callback(Callback),
    Stream,
}

/// One query waiting in (or at the front of) the queue.
pub(crate) struct Request {
    pub(crate) sql: String,
    pub(crate) need_columns: bool,
    pub(crate) need_metadata: bool,
    pub(crate) delivery: Delivery,
    kind: Kind,
}

impl Request {
    pub(crate) fn identity_probe() -> Self {
        Self {
            sql: IDENTITY_PROBE_SQL.to_string(),
            need_columns: false,
            need_metadata: false,
            delivery: Delivery::buffered(false, false),
            kind: Kind::IdentityProbe,
        }
    }

    pub(crate) fn buffered(
        sql: String,
        need_columns: bool,
        need_metadata: bool,
        callback: Callback,
    ) -> Self {
        Self {
            sql,
            need_columns,
            need_metadata,
            delivery: Delivery::buffered(need_columns, need_metadata),
            kind: Kind::Callback(callback),
        }
    }

    pub(crate) fn streaming(
        sql: String,
        need_columns: bool,
        need_metadata: bool,
        high_water_mark: usize,
        demand: Demand,
    ) -> (Self, QueryStream) {
        let emitter = EmitterShared::new();
        let stream = QueryStream::new(Arc::clone(&emitter));
        let request = Self {
            sql,
            need_columns,
            need_metadata,
            delivery: Delivery::streaming(
                need_columns,
                need_metadata,
                emitter,
                high_water_mark,
                demand,
            ),
            kind: Kind::Stream,
        };
        (request, stream)
    }

    pub(crate) fn is_probe(&self) -> bool {
        matches!(self.kind, Kind::IdentityProbe)
    }

    pub(crate) fn is_buffered(&self) -> bool {
        self.delivery.is_buffered()
    }

    /// Settle a request whose query went idle.
    ///
    /// Callbacks are invoked here; only the identity probe hands its outcome
    /// back to the caller.
    pub(crate) fn finish(self) -> Option<Result<Response>> {
        let outcome = self.delivery.finish();
        self.kind.settle(outcome)
    }

    /// Settle a request that will never run.
    pub(crate) fn fail(self, err: Error) -> Option<Result<Response>> {
        let outcome = self.delivery.fail(err);
        self.kind.settle(outcome)
    }
}

impl Kind {
    fn settle(self, outcome: Option<Result<Response>>) -> Option<Result<Response>> {
        match (self, outcome) {
            (Kind::IdentityProbe, outcome) => outcome,
            (Kind::Callback(callback), Some(outcome)) => {
                callback(outcome);
                None
            }
            _ => None,
        }
    }
}
