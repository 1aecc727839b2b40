//! Task driving a [`QueueStateMachine`].

use std::sync::Arc;

use tokio::sync::{Notify, broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::handle::ConnectionHandle;
use crate::row::Response;
use crate::state::{AbortPlan, ClientEvent, ConnectionState, Event, QueryOpts, QueueStateMachine};
use crate::stream::QueryStream;

/// Facts reported by the handle.
#[derive(Debug, Clone)]
pub(crate) struct HandleInfo {
    pub(crate) is_mariadb: bool,
    pub(crate) server_version: String,
    pub(crate) last_insert_id: u64,
}

pub(crate) enum Command {
    Connect {
        reply: oneshot::Sender<Result<()>>,
    },
    Submit {
        sql: String,
        opts: QueryOpts,
        reply: oneshot::Sender<Result<Response>>,
    },
    Stream {
        sql: String,
        opts: QueryOpts,
        reply: oneshot::Sender<QueryStream>,
    },
    Escape {
        text: String,
        reply: oneshot::Sender<Result<String>>,
    },
    Abort {
        kill_connection: bool,
        reply: oneshot::Sender<Result<AbortPlan>>,
    },
    Close {
        force: bool,
    },
    WaitClosed {
        reply: oneshot::Sender<()>,
    },
    Inspect {
        reply: oneshot::Sender<HandleInfo>,
    },
}

/// Published after every step of the actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Status {
    pub(crate) state: ConnectionState,
    /// Ready for queries, including while a graceful close drains the queue
    pub(crate) connected: bool,
    pub(crate) connection_id: Option<String>,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            state: ConnectionState::Idle,
            connected: false,
            connection_id: None,
        }
    }
}

pub(crate) struct Actor<H> {
    queue: QueueStateMachine<H>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedReceiver<Event>,
    resume: Arc<Notify>,
    status: watch::Sender<Status>,
    notify: broadcast::Sender<ClientEvent>,
    ready_waiters: Vec<oneshot::Sender<Result<()>>>,
    closed_waiters: Vec<oneshot::Sender<()>>,
    last_error: Option<Error>,
    timer: Option<(u64, Instant)>,
    detached: bool,
}

impl<H: ConnectionHandle> Actor<H> {
    pub(crate) fn new(
        queue: QueueStateMachine<H>,
        commands: mpsc::UnboundedReceiver<Command>,
        events: mpsc::UnboundedReceiver<Event>,
        resume: Arc<Notify>,
        status: watch::Sender<Status>,
        notify: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self {
            queue,
            commands,
            events,
            resume,
            status,
            notify,
            ready_waiters: Vec::new(),
            closed_waiters: Vec::new(),
            last_error: None,
            timer: None,
            detached: false,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            self.dispatch_notifications();
            self.publish();
            if self.detached && self.is_down() {
                debug!("client dropped, stopping");
                return;
            }

            let deadline = self.sync_timer();
            tokio::select! {
                command = self.commands.recv(), if !self.detached => match command {
                    Some(command) => self.on_command(command),
                    None => {
                        self.detached = true;
                        self.queue.close(true);
                    }
                },
                Some(event) = self.events.recv() => {
                    trace!(?event, "handle event");
                    self.queue.on_event(event);
                }
                _ = self.resume.notified() => self.queue.resume(),
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some((epoch, _)) = self.timer.take() {
                        self.queue.on_timer(epoch);
                    }
                }
            }
        }
    }

    fn is_down(&self) -> bool {
        matches!(
            self.queue.state(),
            ConnectionState::Idle | ConnectionState::Closed
        )
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect { reply } => {
                if self.queue.is_connected() {
                    let _ = reply.send(Ok(()));
                } else {
                    self.ready_waiters.push(reply);
                    self.queue.connect();
                }
            }
            Command::Submit { sql, opts, reply } => {
                self.queue.submit(
                    &sql,
                    opts,
                    Box::new(move |outcome| {
                        let _ = reply.send(outcome);
                    }),
                );
            }
            Command::Stream { sql, opts, reply } => {
                let stream = self.queue.submit_stream(&sql, opts);
                let _ = reply.send(stream);
            }
            Command::Escape { text, reply } => {
                let _ = reply.send(self.queue.escape(&text));
            }
            Command::Abort {
                kill_connection,
                reply,
            } => {
                let _ = reply.send(self.queue.abort(kill_connection));
            }
            Command::Close { force } => self.queue.close(force),
            Command::WaitClosed { reply } => {
                if self.is_down() {
                    let _ = reply.send(());
                } else {
                    self.closed_waiters.push(reply);
                }
            }
            Command::Inspect { reply } => {
                let handle = self.queue.handle();
                let _ = reply.send(HandleInfo {
                    is_mariadb: handle.is_mariadb(),
                    server_version: handle.server_version(),
                    last_insert_id: handle.last_insert_id(),
                });
            }
        }
    }

    fn dispatch_notifications(&mut self) {
        while let Some(event) = self.queue.poll_notification() {
            match &event {
                ClientEvent::Ready => {
                    self.last_error = None;
                    for waiter in self.ready_waiters.drain(..) {
                        let _ = waiter.send(Ok(()));
                    }
                }
                ClientEvent::Error(err) => {
                    self.last_error = Some(err.clone());
                }
                ClientEvent::Closed { .. } => {
                    let err = self.last_error.take().unwrap_or(Error::ClosedEarly);
                    for waiter in self.ready_waiters.drain(..) {
                        let _ = waiter.send(Err(err.clone()));
                    }
                    if self.is_down() {
                        for waiter in self.closed_waiters.drain(..) {
                            let _ = waiter.send(());
                        }
                    }
                }
            }
            // No subscribers is fine.
            let _ = self.notify.send(event);
        }
    }

    fn publish(&self) {
        let state = self.queue.state();
        let connected = self.queue.is_connected();
        let connection_id = self.queue.connection_id();
        self.status.send_if_modified(|status| {
            if status.state == state
                && status.connected == connected
                && status.connection_id.as_deref() == connection_id
            {
                return false;
            }
            status.state = state;
            status.connected = connected;
            status.connection_id = connection_id.map(str::to_string);
            true
        });
    }

    /// Deadline of the armed keepalive timer, keeping the one already
    /// scheduled for the same epoch.
    fn sync_timer(&mut self) -> Option<Instant> {
        let Some(armed) = self.queue.armed_timer() else {
            self.timer = None;
            return None;
        };
        match self.timer {
            Some((epoch, at)) if epoch == armed.epoch => Some(at),
            _ => {
                let at = Instant::now() + armed.after;
                self.timer = Some((armed.epoch, at));
                Some(at)
            }
        }
    }
}
