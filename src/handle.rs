//! Boundary to the native protocol engine.
//!
//! A [`ConnectionHandle`] owns one physical connection. Every method only
//! starts an operation; outcomes come back asynchronously as
//! [`Event`](crate::state::Event)s delivered to the queue.
//!
//! Operation/event pairs:
//! - `connect` → `Connected` | `FatalError` → `Closed`
//! - `query` → (`ResultStarted` → `Row`* → `ResultEnded` | `Error`)* → `QueryIdle`
//! - `ping` → `PingAck`
//! - `close` → `Closed`

use crate::escape::escape_into;
use crate::opts::Opts;

/// What `abort_query` and `KILL` target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortMode {
    /// Stop the running statement, keep the connection
    Query,
    /// Terminate the whole connection
    Connection,
}

impl AbortMode {
    /// The server statement that kills `connection_id` in this mode.
    pub fn kill_statement(self, connection_id: &str) -> String {
        match self {
            AbortMode::Query => format!("KILL QUERY {}", connection_id),
            AbortMode::Connection => format!("KILL CONNECTION {}", connection_id),
        }
    }
}

/// One physical connection to the server.
///
/// Only the queue calls these methods, one command at a time.
pub trait ConnectionHandle {
    /// Start connecting.
    fn connect(&mut self, opts: &Opts);

    /// Start executing `sql`.
    ///
    /// `want_columns` asks for column names in `ResultStarted`, `want_metadata`
    /// for full column metadata. `buffered` is false for streamed results,
    /// where the handle may fetch rows lazily and honor `pause`.
    fn query(&mut self, sql: &str, want_columns: bool, want_metadata: bool, buffered: bool);

    /// Stop delivering rows until `resume`.
    fn pause(&mut self);

    /// Continue delivering rows.
    fn resume(&mut self);

    /// Append `text`, escaped for a quoted string literal, to `out`.
    fn escape(&self, text: &str, out: &mut String) {
        escape_into(out, text);
    }

    /// Start closing; `Closed` follows.
    fn close(&mut self);

    /// Abort the running query in-band.
    fn abort_query(&mut self, mode: AbortMode);

    /// Send a lightweight ping; `PingAck` follows.
    fn ping(&mut self);

    /// Returns true if the server is MariaDB.
    fn is_mariadb(&self) -> bool;

    /// AUTO_INCREMENT id of the last insert.
    fn last_insert_id(&self) -> u64;

    /// Server version string.
    fn server_version(&self) -> String;
}

impl<H: ConnectionHandle + ?Sized> ConnectionHandle for Box<H> {
    fn connect(&mut self, opts: &Opts) {
        (**self).connect(opts);
    }

    fn query(&mut self, sql: &str, want_columns: bool, want_metadata: bool, buffered: bool) {
        (**self).query(sql, want_columns, want_metadata, buffered);
    }

    fn pause(&mut self) {
        (**self).pause();
    }

    fn resume(&mut self) {
        (**self).resume();
    }

    fn escape(&self, text: &str, out: &mut String) {
        (**self).escape(text, out);
    }

    fn close(&mut self) {
        (**self).close();
    }

    fn abort_query(&mut self, mode: AbortMode) {
        (**self).abort_query(mode);
    }

    fn ping(&mut self) {
        (**self).ping();
    }

    fn is_mariadb(&self) -> bool {
        (**self).is_mariadb()
    }

    fn last_insert_id(&self) -> u64 {
        (**self).last_insert_id()
    }

    fn server_version(&self) -> String {
        (**self).server_version()
    }
}
