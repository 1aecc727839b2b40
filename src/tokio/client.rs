//! Asynchronous MySQL/MariaDB client.

use std::sync::Arc;

use tokio::sync::{Notify, broadcast, mpsc, oneshot, watch};
use tracing::debug;

use crate::cache::{QueryCache, prepare};
use crate::error::{Error, Result};
use crate::opts::{Opts, QueryCacheOpts};
use crate::row::Response;
use crate::state::{AbortPlan, ClientEvent, ConnectionState, QueryOpts, QueueStateMachine};
use crate::statement::CompiledQuery;
use crate::stream::QueryStream;

use super::actor::{Actor, Command, HandleInfo, Status};
use super::connector::Connector;

/// Buffered connection-level notifications per subscriber.
const EVENT_CAPACITY: usize = 64;

/// Asynchronous MySQL/MariaDB client.
///
/// Queries are queued and run one at a time on a single connection, in
/// submission order. Submitting a query connects automatically.
///
/// The connection is driven by a background task; creating a client requires
/// a Tokio runtime. Dropping the client force-closes the connection.
pub struct Client<C: Connector> {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<Status>,
    notify: broadcast::Sender<ClientEvent>,
    cache: Option<Arc<QueryCache>>,
    opts: Opts,
    connector: Arc<C>,
}

impl<C: Connector> Client<C> {
    /// Create a client. Nothing connects until [`Client::connect`] or the
    /// first query.
    pub fn new(opts: Opts, connector: C) -> Self {
        Self::spawn(opts, Arc::new(connector))
    }

    fn spawn(mut opts: Opts, connector: Arc<C>) -> Self {
        // The client and its queue share one cache.
        let cache = opts.query_cache.build();
        opts.query_cache = match &cache {
            Some(cache) => QueryCacheOpts::Shared(Arc::clone(cache)),
            None => QueryCacheOpts::Disabled,
        };

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(Status::default());
        let (notify, _) = broadcast::channel(EVENT_CAPACITY);

        let resume = Arc::new(Notify::new());
        let demand = {
            let resume = Arc::clone(&resume);
            Arc::new(move || resume.notify_one())
        };
        let handle = connector.open(event_tx);
        let queue = QueueStateMachine::new(handle, opts.clone(), demand);
        let actor = Actor::new(
            queue,
            command_rx,
            event_rx,
            resume,
            status_tx,
            notify.clone(),
        );
        tokio::spawn(actor.run());

        Self {
            commands: command_tx,
            status: status_rx,
            notify,
            cache,
            opts,
            connector,
        }
    }

    pub fn opts(&self) -> &Opts {
        &self.opts
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::Shutdown)
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.send(command(tx))?;
        rx.await.map_err(|_| Error::Shutdown)
    }

    /// Connect and wait until the connection is ready for queries.
    ///
    /// Resolves immediately when already connected.
    pub async fn connect(&self) -> Result<()> {
        self.request(|reply| Command::Connect { reply }).await?
    }

    /// Run a query and buffer all of its results.
    pub async fn query(&self, sql: &str, opts: QueryOpts) -> Result<Response> {
        let sql = sql.to_string();
        self.request(|reply| Command::Submit { sql, opts, reply })
            .await?
    }

    /// Run a query and stream its results.
    ///
    /// The query is queued when this returns; rows flow as the stream is read.
    pub async fn query_stream(&self, sql: &str, opts: QueryOpts) -> Result<QueryStream> {
        let sql = sql.to_string();
        self.request(|reply| Command::Stream { sql, opts, reply })
            .await
    }

    /// Compile a template into a reusable [`CompiledQuery`].
    pub fn prepare(&self, sql: &str) -> Arc<CompiledQuery> {
        prepare(self.cache.as_deref(), sql)
    }

    /// The compiled-template cache, unless disabled.
    pub fn query_cache(&self) -> Option<&Arc<QueryCache>> {
        self.cache.as_ref()
    }

    /// Escape `text` with the connection's rules. Requires a connection.
    pub async fn escape(&self, text: &str) -> Result<String> {
        let text = text.to_string();
        self.request(|reply| Command::Escape { text, reply }).await?
    }

    /// Abort the running query, or the whole connection with
    /// `kill_connection`.
    ///
    /// With a known connection id this issues `KILL QUERY <id>` or
    /// `KILL CONNECTION <id>` on a short-lived second connection and resolves
    /// once that finished. Fails with [`Error::InvalidUsage`] when no query
    /// is running.
    pub async fn abort(&self, kill_connection: bool) -> Result<()> {
        let plan = self
            .request(|reply| Command::Abort {
                kill_connection,
                reply,
            })
            .await??;
        match plan {
            AbortPlan::InBand => Ok(()),
            AbortPlan::Kill { sql, .. } => {
                debug!(%sql, "killing over a side connection");
                let side = Self::spawn(self.opts.side_channel(), Arc::clone(&self.connector));
                let outcome = side.query(&sql, QueryOpts::default()).await;
                side.close(false);
                side.closed().await;
                outcome.map(drop)
            }
        }
    }

    /// Close the connection.
    ///
    /// A graceful close runs every queued query first. A forced close fails
    /// queued queries with [`Error::ClosedEarly`] (unless `keep_queries`).
    pub fn close(&self, force: bool) {
        let _ = self.send(Command::Close { force });
    }

    /// Wait until no connection is open.
    pub async fn closed(&self) {
        let _ = self.request(|reply| Command::WaitClosed { reply }).await;
    }

    /// Subscribe to connection-level notifications.
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.notify.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    /// Returns true while queries can run, including during a graceful
    /// close that is still draining the queue.
    pub fn is_connected(&self) -> bool {
        self.status.borrow().connected
    }

    pub fn is_connecting(&self) -> bool {
        self.state() == ConnectionState::Connecting
    }

    /// Server-side id of the connection, once known.
    pub fn connection_id(&self) -> Option<String> {
        self.status.borrow().connection_id.clone()
    }

    async fn inspect(&self) -> Result<HandleInfo> {
        self.request(|reply| Command::Inspect { reply }).await
    }

    /// Returns true if the server is MariaDB.
    pub async fn is_mariadb(&self) -> Result<bool> {
        Ok(self.inspect().await?.is_mariadb)
    }

    pub async fn server_version(&self) -> Result<String> {
        Ok(self.inspect().await?.server_version)
    }

    /// AUTO_INCREMENT id of the last insert on this connection.
    pub async fn last_insert_id(&self) -> Result<u64> {
        Ok(self.inspect().await?.last_insert_id)
    }
}
