//! Query queue state machine.
//!
//! Owns a [`ConnectionHandle`] and serializes queries onto it: at most one
//! query runs at a time, in submission order. Handle events are fed in with
//! [`QueueStateMachine::on_event`] and timer expirations with
//! [`QueueStateMachine::on_timer`]. Connection-level notifications are
//! collected and drained with [`QueueStateMachine::poll_notification`].
//!
//! The machine performs no I/O and never blocks; a driver (see
//! [`crate::tokio`]) supplies events, schedules [`ArmedTimer`]s and routes
//! notifications.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::{QueryCache, prepare};
use crate::error::{Error, Result};
use crate::handle::{AbortMode, ConnectionHandle};
use crate::opts::Opts;
use crate::row::Response;
use crate::statement::CompiledQuery;
use crate::stream::{Demand, QueryStream};

use super::delivery::Counters;
use super::event::{ClientEvent, Event};
use super::keepalive::{ArmedTimer, Keepalive, TimerKind};
use super::request::{Callback, QueryOpts, Request};

/// Connection lifecycle as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected
    Idle,
    /// Connect issued, not ready yet
    Connecting,
    /// Ready for queries
    Connected,
    /// Close requested, not closed yet
    Closing,
    /// Closed after having been open
    Closed,
}

/// How to abort the running query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortPlan {
    /// Run `sql` on a separate connection.
    Kill { mode: AbortMode, sql: String },
    /// The handle was asked to abort in-band.
    InBand,
}

pub struct QueueStateMachine<H> {
    handle: H,
    opts: Opts,
    cache: Option<Arc<QueryCache>>,
    demand: Demand,
    requests: VecDeque<Request>,
    keepalive: Keepalive,
    notifications: VecDeque<ClientEvent>,
    connection_id: Option<String>,
    /// The front request was sent to the handle and has not gone idle
    in_flight: bool,
    /// The handle was told to pause row delivery
    paused: bool,
    /// `connect` issued and `Closed` not yet seen
    handle_active: bool,
    /// `Connected` seen and `Closed` not yet seen
    transport_up: bool,
    connecting: bool,
    connected: bool,
    closing: bool,
    /// `close` issued to the handle
    handle_closing: bool,
    /// A connect was requested while the handle was closing
    reconnect_after_close: bool,
    /// Requests queued after `close` was issued; they run on the next
    /// connection
    held: usize,
    closed_once: bool,
}

impl<H: ConnectionHandle> QueueStateMachine<H> {
    /// Create a queue around a handle.
    ///
    /// `demand` is invoked when a streaming consumer drained a saturated
    /// result; the driver must answer it by calling [`Self::resume`].
    pub fn new(handle: H, opts: Opts, demand: Demand) -> Self {
        let cache = opts.query_cache.build();
        let keepalive = Keepalive::new(opts.keepalive());
        Self {
            handle,
            opts,
            cache,
            demand,
            requests: VecDeque::new(),
            keepalive,
            notifications: VecDeque::new(),
            connection_id: None,
            in_flight: false,
            paused: false,
            handle_active: false,
            transport_up: false,
            connecting: false,
            connected: false,
            closing: false,
            handle_closing: false,
            reconnect_after_close: false,
            held: 0,
            closed_once: false,
        }
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }

    pub fn handle_mut(&mut self) -> &mut H {
        &mut self.handle
    }

    pub fn opts(&self) -> &Opts {
        &self.opts
    }

    pub fn cache(&self) -> Option<&Arc<QueryCache>> {
        self.cache.as_ref()
    }

    pub fn state(&self) -> ConnectionState {
        if self.closing {
            ConnectionState::Closing
        } else if self.connected {
            ConnectionState::Connected
        } else if self.connecting {
            ConnectionState::Connecting
        } else if self.closed_once {
            ConnectionState::Closed
        } else {
            ConnectionState::Idle
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_connecting(&self) -> bool {
        self.connecting
    }

    /// Server-side id of this connection, once the identity probe ran.
    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    /// Returns true while a query is executing.
    pub fn is_running(&self) -> bool {
        self.in_flight
    }

    /// Number of user requests waiting behind the running one.
    pub fn queued(&self) -> usize {
        self.requests
            .iter()
            .skip(usize::from(self.in_flight))
            .filter(|request| !request.is_probe())
            .count()
    }

    /// Compile `sql`, through the query cache when enabled.
    pub fn prepare(&self, sql: &str) -> Arc<CompiledQuery> {
        prepare(self.cache.as_deref(), sql)
    }

    /// Escape `text` with the connection's rules.
    pub fn escape(&self, text: &str) -> Result<String> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        let mut out = String::with_capacity(text.len());
        self.handle.escape(text, &mut out);
        Ok(out)
    }

    /// Next connection-level notification.
    pub fn poll_notification(&mut self) -> Option<ClientEvent> {
        self.notifications.pop_front()
    }

    /// The keepalive timer the driver must have scheduled, if any.
    pub fn armed_timer(&self) -> Option<ArmedTimer> {
        self.keepalive.armed()
    }

    /// Start connecting. No-op while connecting or connected.
    pub fn connect(&mut self) {
        if self.handle_active {
            if self.handle_closing {
                self.reconnect_after_close = true;
            }
            return;
        }
        debug!(host = %self.opts.host, port = self.opts.port, "connecting");
        self.handle_active = true;
        self.connecting = true;
        self.closing = false;
        self.handle.connect(&self.opts);
    }

    /// Queue a buffered query; `callback` receives the outcome exactly once.
    pub fn submit(&mut self, sql: &str, opts: QueryOpts, callback: Callback) {
        let sql = self.render(sql, &opts);
        let need_metadata = opts.metadata.unwrap_or(self.opts.metadata);
        self.enqueue(Request::buffered(
            sql,
            !opts.use_array,
            need_metadata,
            callback,
        ));
    }

    /// Queue a streamed query.
    pub fn submit_stream(&mut self, sql: &str, opts: QueryOpts) -> QueryStream {
        let sql = self.render(sql, &opts);
        let need_metadata = opts.metadata.unwrap_or(self.opts.metadata);
        let high_water_mark = opts
            .high_water_mark
            .unwrap_or(self.opts.stream_high_water_mark)
            .max(1);
        let (request, stream) = Request::streaming(
            sql,
            !opts.use_array,
            need_metadata,
            high_water_mark,
            Arc::clone(&self.demand),
        );
        self.enqueue(request);
        stream
    }

    fn render(&self, sql: &str, opts: &QueryOpts) -> String {
        match &opts.params {
            None => sql.to_string(),
            Some(params) => {
                let compiled = prepare(self.cache.as_deref(), sql);
                compiled.render_with(params, |text, out| self.handle.escape(text, out))
            }
        }
    }

    fn enqueue(&mut self, request: Request) {
        debug!(sql = %request.sql, queued = self.requests.len(), "queueing query");
        self.requests.push_back(request);
        if self.handle_closing {
            self.held += 1;
            self.reconnect_after_close = true;
        } else if self.transport_up {
            self.process();
        } else {
            self.connect();
        }
    }

    /// Close the connection.
    ///
    /// A graceful close lets queued queries finish first; a forced close
    /// closes the handle immediately.
    pub fn close(&mut self, force: bool) {
        if !self.handle_active {
            self.fail_all(Error::ClosedEarly);
            return;
        }
        debug!(force, "closing");
        self.closing = true;
        if force {
            self.held = 0;
            self.reconnect_after_close = false;
            self.keepalive.cancel();
            self.issue_close();
        } else {
            self.process();
        }
    }

    /// A drained streaming result wants more rows.
    ///
    /// Delivery stays paused while another result of the running query is
    /// still full; draining that one asks again.
    pub fn resume(&mut self) {
        let saturated = self.in_flight
            && self
                .requests
                .front()
                .is_some_and(|request| request.delivery.is_saturated());
        if self.paused && !saturated {
            self.paused = false;
            self.handle.resume();
        }
    }

    /// Abort the running query.
    ///
    /// With a known connection id the caller must run the returned `KILL`
    /// statement on a separate connection.
    pub fn abort(&mut self, kill_connection: bool) -> Result<AbortPlan> {
        if !self.in_flight {
            return Err(Error::InvalidUsage("No query is running".into()));
        }
        let mode = if kill_connection {
            AbortMode::Connection
        } else {
            AbortMode::Query
        };
        match self.connection_id.as_deref() {
            Some(id) if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) => {
                Ok(AbortPlan::Kill {
                    mode,
                    sql: mode.kill_statement(id),
                })
            }
            _ => {
                debug!(?mode, "aborting in-band");
                self.handle.abort_query(mode);
                Ok(AbortPlan::InBand)
            }
        }
    }

    /// Feed a handle event.
    pub fn on_event(&mut self, event: Event) {
        match event {
            Event::Connected => self.on_connected(),
            Event::FatalError(err) => self.on_fatal(Error::Connection(err)),
            Event::Error(err) if err.is_dead_connection() => {
                self.on_fatal(Error::Connection(err))
            }
            Event::Error(err) => self.on_statement_error(Error::Server(err)),
            Event::ResultStarted { columns, metadata } => {
                if let Some(request) = self.current_request() {
                    request.delivery.result_started(columns, metadata);
                }
            }
            Event::Row(values) => {
                let saturated = match self.current_request() {
                    Some(request) => request.delivery.row(values),
                    None => false,
                };
                if saturated && !self.paused {
                    self.paused = true;
                    self.handle.pause();
                }
            }
            Event::ResultEnded {
                num_rows,
                affected_rows,
                insert_id,
            } => {
                if let Some(request) = self.current_request() {
                    request.delivery.result_ended(Counters {
                        num_rows,
                        affected_rows,
                        insert_id,
                    });
                }
            }
            Event::QueryIdle => self.advance(),
            Event::PingAck => self.on_ping_ack(),
            Event::Closed { had_error } => self.on_closed(had_error),
        }
    }

    /// A timer previously reported by [`Self::armed_timer`] elapsed.
    pub fn on_timer(&mut self, epoch: u64) {
        match self.keepalive.fire(epoch) {
            Some(TimerKind::Inactivity) => {
                if self.in_flight || !self.requests.is_empty() || !self.transport_up {
                    return;
                }
                debug!("sending keepalive ping");
                self.handle.ping();
                self.keepalive.ping_sent();
            }
            Some(TimerKind::PingTimeout) => {
                let wait = self.keepalive.wait_response();
                self.on_fatal(Error::PingLost(wait));
            }
            None => {}
        }
    }

    fn current_request(&mut self) -> Option<&mut Request> {
        if !self.in_flight {
            warn!("result event without a running query");
            return None;
        }
        self.requests.front_mut()
    }

    /// Dispatch the next request, or close, or go idle.
    fn process(&mut self) {
        if !self.transport_up || self.in_flight || self.handle_closing {
            return;
        }
        if let Some(request) = self.requests.front() {
            // An outstanding ping is abandoned; its late ack is ignored.
            self.keepalive.cancel();
            self.in_flight = true;
            debug!(sql = %request.sql, "running query");
            self.handle.query(
                &request.sql,
                request.need_columns,
                request.need_metadata,
                request.is_buffered(),
            );
        } else if self.closing {
            if !self.keepalive.ping_outstanding() {
                self.issue_close();
            }
        } else if self.connected {
            self.keepalive.arm_idle();
        }
    }

    fn issue_close(&mut self) {
        if self.handle_active && !self.handle_closing {
            self.handle_closing = true;
            self.keepalive.cancel();
            self.handle.close();
        }
    }

    fn on_connected(&mut self) {
        debug!("transport connected");
        self.transport_up = true;
        self.paused = false;
        if self.opts.identity_probe {
            if !self.requests.front().is_some_and(Request::is_probe) {
                self.requests.push_front(Request::identity_probe());
            }
        } else {
            self.mark_ready();
        }
        self.process();
    }

    fn mark_ready(&mut self) {
        self.connecting = false;
        self.connected = true;
        self.notifications.push_back(ClientEvent::Ready);
    }

    fn advance(&mut self) {
        if !self.in_flight {
            warn!("query idle without a running query");
            return;
        }
        self.in_flight = false;
        if self.paused {
            self.paused = false;
            self.handle.resume();
        }
        if let Some(request) = self.requests.pop_front() {
            let probe = request.is_probe();
            let outcome = request.finish();
            if probe {
                self.on_probe_result(outcome);
            }
        }
        self.process();
    }

    fn on_probe_result(&mut self, outcome: Option<Result<Response>>) {
        let outcome = outcome
            .unwrap_or(Err(Error::ClosedEarly))
            .and_then(|response| response.into_single());
        match outcome {
            Ok(rs) => {
                self.connection_id = rs
                    .rows
                    .first()
                    .and_then(|row| row.get(0))
                    .map(str::to_string);
                debug!(connection_id = ?self.connection_id, "connection ready");
                self.mark_ready();
            }
            Err(err) => {
                warn!(error = %err, "identity probe failed");
                self.on_fatal(err);
            }
        }
    }

    fn on_statement_error(&mut self, err: Error) {
        if self.in_flight
            && let Some(request) = self.requests.front_mut()
        {
            request.delivery.error(err);
            return;
        }
        warn!(error = %err, "error without a running query");
        self.notifications.push_back(ClientEvent::Error(err));
    }

    fn on_fatal(&mut self, err: Error) {
        warn!(error = %err, "connection failed");
        self.connecting = false;
        self.connected = false;
        self.notifications.push_back(ClientEvent::Error(err));
        if self.handle_active {
            self.closing = true;
            self.issue_close();
        }
    }

    fn on_ping_ack(&mut self) {
        if !self.keepalive.on_ack() {
            debug!("ignoring unexpected ping ack");
            return;
        }
        self.process();
    }

    fn on_closed(&mut self, had_error: bool) {
        debug!(had_error, "connection closed");
        self.handle_active = false;
        self.transport_up = false;
        self.connecting = false;
        self.connected = false;
        self.closing = false;
        self.handle_closing = false;
        self.in_flight = false;
        self.paused = false;
        self.closed_once = true;
        self.connection_id = None;
        self.keepalive.cancel();

        let kept = self.requests.len().saturating_sub(core::mem::take(&mut self.held));
        let held = self.requests.split_off(kept);
        self.requests.retain(|r| !r.is_probe());
        if self.opts.keep_queries {
            for request in &mut self.requests {
                request.delivery.reset();
            }
        } else {
            self.fail_all(Error::ClosedEarly);
        }
        self.requests.extend(held);
        self.notifications
            .push_back(ClientEvent::Closed { had_error });

        if core::mem::take(&mut self.reconnect_after_close) && !self.requests.is_empty() {
            self.connect();
        }
    }

    fn fail_all(&mut self, err: Error) {
        for request in core::mem::take(&mut self.requests) {
            request.fail(err.clone());
        }
    }
}
