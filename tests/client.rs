//! Tests for the tokio Client against a scripted in-process server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use zero_mariasql::tokio::{Client, Connector, EventSender};
use zero_mariasql::{
    AbortMode, ClientEvent, ConnectionHandle, ConnectionState, Error, Event, Opts, QueryOpts,
    Response, ServerError,
};

#[derive(Default)]
struct ServerState {
    next_id: u64,
    log: Vec<(u64, String)>,
    responses: HashMap<String, Vec<Event>>,
    connections: HashMap<u64, EventSender>,
    silent_pings: bool,
}

#[derive(Clone, Default)]
struct MockServer(Arc<Mutex<ServerState>>);

impl MockServer {
    fn respond(&self, sql: &str, events: Vec<Event>) {
        self.0
            .lock()
            .unwrap()
            .responses
            .insert(sql.to_string(), events);
    }

    fn silence_pings(&self) {
        self.0.lock().unwrap().silent_pings = true;
    }

    fn log_of(&self, id: u64) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|(conn, _)| *conn == id)
            .map(|(_, cmd)| cmd.clone())
            .collect()
    }
}

struct MockConnector(MockServer);

impl Connector for MockConnector {
    type Handle = MockHandle;

    fn open(&self, events: EventSender) -> MockHandle {
        MockHandle {
            server: self.0.clone(),
            events,
            id: 0,
        }
    }
}

struct MockHandle {
    server: MockServer,
    events: EventSender,
    id: u64,
}

fn rows(columns: &[&str], rows: &[&[&str]]) -> Vec<Event> {
    let mut events = vec![Event::ResultStarted {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        metadata: Vec::new(),
    }];
    for row in rows {
        events.push(Event::Row(
            row.iter().map(|v| Some(v.to_string())).collect(),
        ));
    }
    events.push(Event::ResultEnded {
        num_rows: rows.len() as u64,
        affected_rows: 0,
        insert_id: 0,
    });
    events
}

impl MockHandle {
    fn log(&self, cmd: &str) {
        self.server
            .0
            .lock()
            .unwrap()
            .log
            .push((self.id, cmd.to_string()));
    }

    fn send_all(&self, events: Vec<Event>) {
        for event in events {
            let _ = self.events.send(event);
        }
    }
}

impl ConnectionHandle for MockHandle {
    fn connect(&mut self, _opts: &Opts) {
        {
            let mut state = self.server.0.lock().unwrap();
            state.next_id += 1;
            self.id = state.next_id;
            state.connections.insert(self.id, self.events.clone());
        }
        self.log("CONNECT");
        let _ = self.events.send(Event::Connected);
    }

    fn query(&mut self, sql: &str, _want_columns: bool, _want_metadata: bool, _buffered: bool) {
        self.log(sql);
        if sql == "SELECT CONNECTION_ID()" {
            let id = self.id.to_string();
            let mut events = rows(&["CONNECTION_ID()"], &[&[id.as_str()]]);
            events.push(Event::QueryIdle);
            self.send_all(events);
        } else if sql.starts_with("SELECT SLEEP") {
            // runs until killed
        } else if let Some(target) = sql.strip_prefix("KILL QUERY ") {
            let target: u64 = target.parse().unwrap();
            if let Some(tx) = self.server.0.lock().unwrap().connections.get(&target) {
                let _ = tx.send(Event::Error(ServerError::new(
                    1317,
                    "Query execution was interrupted",
                )));
                let _ = tx.send(Event::QueryIdle);
            }
            self.send_all(vec![
                Event::ResultEnded {
                    num_rows: 0,
                    affected_rows: 0,
                    insert_id: 0,
                },
                Event::QueryIdle,
            ]);
        } else {
            let scripted = self.server.0.lock().unwrap().responses.get(sql).cloned();
            let mut events = scripted.unwrap_or_else(|| {
                vec![Event::ResultEnded {
                    num_rows: 0,
                    affected_rows: 1,
                    insert_id: 0,
                }]
            });
            if !events.iter().any(|e| matches!(e, Event::Error(err) if err.is_dead_connection()))
            {
                events.push(Event::QueryIdle);
            }
            self.send_all(events);
        }
    }

    fn pause(&mut self) {
        self.log("PAUSE");
    }

    fn resume(&mut self) {
        self.log("RESUME");
    }

    fn close(&mut self) {
        self.log("CLOSE");
        self.server.0.lock().unwrap().connections.remove(&self.id);
        let _ = self.events.send(Event::Closed { had_error: false });
    }

    fn abort_query(&mut self, mode: AbortMode) {
        self.log(&format!("ABORT {:?}", mode));
    }

    fn ping(&mut self) {
        self.log("PING");
        if !self.server.0.lock().unwrap().silent_pings {
            let _ = self.events.send(Event::PingAck);
        }
    }

    fn is_mariadb(&self) -> bool {
        true
    }

    fn last_insert_id(&self) -> u64 {
        7
    }

    fn server_version(&self) -> String {
        "10.11.6-MariaDB".into()
    }
}

fn client_with(opts: Opts) -> (Client<MockConnector>, MockServer) {
    let server = MockServer::default();
    let client = Client::new(opts, MockConnector(server.clone()));
    (client, server)
}

fn client() -> (Client<MockConnector>, MockServer) {
    client_with(Opts::default())
}

fn keepalive_opts() -> Opts {
    Opts {
        ping_inactive: Some(Duration::from_secs(10)),
        ping_wait_response: Some(Duration::from_secs(2)),
        ..Opts::default()
    }
}

#[tokio::test]
async fn test_probe_runs_before_first_query() {
    let (client, server) = client();
    assert_eq!(client.state(), ConnectionState::Idle);

    let response = client.query("SELECT 1", QueryOpts::default()).await.unwrap();
    assert!(matches!(response, Response::Single(_)));
    assert_eq!(
        server.log_of(1),
        vec!["CONNECT", "SELECT CONNECTION_ID()", "SELECT 1"]
    );
    assert_eq!(client.connection_id().as_deref(), Some("1"));
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_named_rows_and_rendered_params() {
    let (client, server) = client();
    server.respond(
        "SELECT id, name FROM items WHERE id = '42'",
        rows(&["id", "name"], &[&["42", "lamp"]]),
    );

    let rs = client
        .query(
            "SELECT id, name FROM items WHERE id = :id",
            QueryOpts::with_params([("id", 42)]),
        )
        .await
        .unwrap()
        .into_single()
        .unwrap();
    assert_eq!(rs.rows.len(), 1);
    assert_eq!(rs.rows[0].get_by_name("name"), Some("lamp"));
    assert_eq!(rs.info.num_rows, 1);

    let rs = client
        .query(
            "SELECT id, name FROM items WHERE id = ?",
            QueryOpts::with_params((42,)).use_array(),
        )
        .await
        .unwrap()
        .into_single()
        .unwrap();
    assert!(!rs.rows[0].is_named());
    assert_eq!(rs.rows[0].get(1), Some("lamp"));

    // both templates compiled once each
    assert_eq!(client.query_cache().map(|c| c.len()), Some(2));
}

#[tokio::test]
async fn test_multi_statement_keeps_failed_position() {
    let (client, server) = client();
    let mut events = rows(&["a"], &[&["1"]]);
    events.push(Event::Error(ServerError::new(1146, "Table 'nope' doesn't exist")));
    server.respond("SELECT 1 AS a; SELECT * FROM nope", events);

    let response = client
        .query("SELECT 1 AS a; SELECT * FROM nope", QueryOpts::default())
        .await
        .unwrap();
    let Response::Multi(results) = response else {
        panic!("expected a multi-statement response");
    };
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap().rows.len(), 1);
    assert_eq!(results[1].as_ref().unwrap_err().code(), Some(1146));
}

#[tokio::test]
async fn test_streaming_pauses_and_resumes() {
    let (client, server) = client();
    let data: Vec<String> = (0..5).map(|n| n.to_string()).collect();
    let mut events = vec![Event::ResultStarted {
        columns: vec!["n".into()],
        metadata: Vec::new(),
    }];
    events.extend(data.iter().map(|n| Event::Row(vec![Some(n.clone())])));
    events.push(Event::ResultEnded {
        num_rows: 5,
        affected_rows: 0,
        insert_id: 0,
    });
    server.respond("SELECT n FROM seq", events);
    client.connect().await.unwrap();

    let mut stream = client
        .query_stream("SELECT n FROM seq", QueryOpts::default().high_water_mark(2))
        .await
        .unwrap();
    let mut result = stream.next_result().await.unwrap();
    let mut seen = Vec::new();
    while let Some(row) = result.next_row().await {
        seen.push(row.unwrap().get_by_name("n").unwrap().to_string());
    }
    assert_eq!(seen, data);
    assert_eq!(result.info().unwrap().num_rows, 5);
    assert!(stream.next_result().await.is_none());
    stream.done().await;

    let log = server.log_of(1);
    let pause = log.iter().position(|c| c == "PAUSE").unwrap();
    let resume = log.iter().position(|c| c == "RESUME").unwrap();
    assert!(pause < resume);
}

#[tokio::test]
async fn test_graceful_close_runs_queued_queries() {
    let (client, server) = client();
    let (a, b, c, ()) = tokio::join!(
        client.query("SELECT 1", QueryOpts::default()),
        client.query("SELECT 2", QueryOpts::default()),
        client.query("SELECT 3", QueryOpts::default()),
        async { client.close(false) },
    );
    assert!(a.is_ok());
    assert!(b.is_ok());
    assert!(c.is_ok());

    client.closed().await;
    assert_eq!(client.state(), ConnectionState::Closed);
    assert_eq!(
        server.log_of(1),
        vec![
            "CONNECT",
            "SELECT CONNECTION_ID()",
            "SELECT 1",
            "SELECT 2",
            "SELECT 3",
            "CLOSE"
        ]
    );
}

#[tokio::test]
async fn test_still_connected_while_close_drains_queue() {
    let (client, _server) = client();
    client.connect().await.unwrap();
    let (running, ()) = tokio::join!(
        client.query("SELECT SLEEP(100)", QueryOpts::default()),
        async {
            client.close(false);
            // commands are handled in order, so the close has been seen
            assert_eq!(client.escape("x").await.unwrap(), "x");
            assert_eq!(client.state(), ConnectionState::Closing);
            assert!(client.is_connected());
            client.abort(false).await.unwrap();
        },
    );
    assert!(running.unwrap_err().is_query_interrupted());

    client.closed().await;
    assert!(!client.is_connected());
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_force_close_fails_pending_queries() {
    let (client, _server) = client();
    client.connect().await.unwrap();
    let (running, queued, ()) = tokio::join!(
        client.query("SELECT SLEEP(100)", QueryOpts::default()),
        client.query("SELECT 2", QueryOpts::default()),
        async { client.close(true) },
    );
    assert!(matches!(running, Err(Error::ClosedEarly)));
    assert!(matches!(queued, Err(Error::ClosedEarly)));
    client.closed().await;
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_abort_kills_over_side_connection() {
    let (client, server) = client();
    assert!(matches!(
        client.abort(false).await,
        Err(Error::InvalidUsage(_))
    ));

    client.connect().await.unwrap();
    let (running, aborted) = tokio::join!(
        client.query("SELECT SLEEP(100)", QueryOpts::default()),
        client.abort(false),
    );
    aborted.unwrap();
    let err = running.unwrap_err();
    assert!(err.is_query_interrupted());

    assert_eq!(server.log_of(2), vec!["CONNECT", "KILL QUERY 1", "CLOSE"]);
    // the main connection survives a killed query
    assert!(client.is_connected());
    assert!(client.query("SELECT 2", QueryOpts::default()).await.is_ok());
}

#[tokio::test]
async fn test_abort_without_probe_goes_in_band() {
    let (client, server) = client_with(Opts {
        identity_probe: false,
        ..Opts::default()
    });
    client.connect().await.unwrap();
    assert_eq!(client.connection_id(), None);

    let (running, aborted) = tokio::join!(
        tokio::time::timeout(
            Duration::from_millis(50),
            client.query("SELECT SLEEP(100)", QueryOpts::default())
        ),
        client.abort(true),
    );
    aborted.unwrap();
    // the scripted handle ignores in-band aborts
    assert!(running.is_err());
    assert!(server.log_of(1).contains(&"ABORT Connection".to_string()));
}

#[tokio::test]
async fn test_dead_connection_error_closes_and_next_query_reconnects() {
    let (client, server) = client();
    server.respond(
        "SELECT boom",
        vec![Event::Error(ServerError::new(2013, "Lost connection"))],
    );
    let mut events = client.events();

    let err = client.query("SELECT boom", QueryOpts::default()).await.unwrap_err();
    assert!(matches!(err, Error::ClosedEarly));

    assert!(matches!(events.recv().await.unwrap(), ClientEvent::Ready));
    match events.recv().await.unwrap() {
        ClientEvent::Error(err) => assert!(err.is_connection_broken()),
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(matches!(
        events.recv().await.unwrap(),
        ClientEvent::Closed { had_error: false }
    ));

    // no automatic reconnect; the next query connects again
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(client.query("SELECT 1", QueryOpts::default()).await.is_ok());
    assert_eq!(
        server.log_of(2),
        vec!["CONNECT", "SELECT CONNECTION_ID()", "SELECT 1"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_pings_idle_connection() {
    let (client, server) = client_with(keepalive_opts());
    client.connect().await.unwrap();

    tokio::time::sleep(Duration::from_secs(11)).await;
    let pings = server.log_of(1).iter().filter(|c| *c == "PING").count();
    assert_eq!(pings, 1);
    assert!(client.is_connected());

    // a query resets the inactivity window
    client.query("SELECT 1", QueryOpts::default()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    let pings = server.log_of(1).iter().filter(|c| *c == "PING").count();
    assert_eq!(pings, 1);
}

#[tokio::test(start_paused = true)]
async fn test_lost_ping_closes_connection() {
    let (client, server) = client_with(keepalive_opts());
    server.silence_pings();
    let mut events = client.events();
    client.connect().await.unwrap();
    assert!(matches!(events.recv().await.unwrap(), ClientEvent::Ready));

    tokio::time::sleep(Duration::from_secs(13)).await;
    match events.recv().await.unwrap() {
        ClientEvent::Error(Error::PingLost(wait)) => assert_eq!(wait, Duration::from_secs(2)),
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(matches!(
        events.recv().await.unwrap(),
        ClientEvent::Closed { .. }
    ));
    assert_eq!(server.log_of(1).last().map(String::as_str), Some("CLOSE"));
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_escape_and_server_info() {
    let (client, _server) = client();
    assert!(matches!(client.escape("x").await, Err(Error::NotConnected)));

    client.connect().await.unwrap();
    assert_eq!(client.escape("it's").await.unwrap(), "it\\'s");
    assert!(client.is_mariadb().await.unwrap());
    assert_eq!(client.server_version().await.unwrap(), "10.11.6-MariaDB");
    assert_eq!(client.last_insert_id().await.unwrap(), 7);
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let (client, server) = client();
    client.connect().await.unwrap();
    client.connect().await.unwrap();
    assert_eq!(
        server.log_of(1).iter().filter(|c| *c == "CONNECT").count(),
        1
    );
}
