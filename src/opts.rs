//! Connection options.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use no_panic::no_panic;
use url::Url;

use crate::cache::{DEFAULT_QUERY_CACHE_SIZE, QueryCache};
use crate::error::Error;

/// Default buffer size (in rows) of a streaming result.
pub const DEFAULT_STREAM_HIGH_WATER_MARK: usize = 16;

/// Compiled-template cache setting.
#[derive(Debug, Clone)]
pub enum QueryCacheOpts {
    /// Compile templates on every call
    Disabled,
    /// Own an LRU cache of this capacity
    Capacity(NonZeroUsize),
    /// Use a cache shared with other clients
    Shared(Arc<QueryCache>),
}

impl QueryCacheOpts {
    pub(crate) fn build(&self) -> Option<Arc<QueryCache>> {
        match self {
            QueryCacheOpts::Disabled => None,
            QueryCacheOpts::Capacity(n) => Some(Arc::new(QueryCache::new(*n))),
            QueryCacheOpts::Shared(cache) => Some(Arc::clone(cache)),
        }
    }
}

/// Connection options for MySQL/MariaDB.
#[derive(Debug, Clone)]
pub struct Opts {
    /// Hostname or IP address.
    ///
    /// Default: `""`
    pub host: String,

    /// Port number for the server.
    ///
    /// Default: `3306`
    pub port: u16,

    /// Unix socket path.
    ///
    /// Default: `None`
    pub socket: Option<String>,

    /// Username for authentication.
    ///
    /// Default: `""`
    pub user: String,

    /// Password for authentication.
    ///
    /// Default: `None`
    pub password: Option<String>,

    /// Database name to use.
    ///
    /// Default: `None`
    pub database: Option<String>,

    /// Additional connection parameters passed through to the handle.
    ///
    /// Default: `[]`
    pub params: Vec<(String, String)>,

    /// Compiled-template cache.
    ///
    /// Default: `QueryCacheOpts::Capacity(100)`
    pub query_cache: QueryCacheOpts,

    /// Keep queued queries across a lost connection and replay them on the
    /// next connect, instead of failing them with `Error::ClosedEarly`.
    ///
    /// Default: `false`
    pub keep_queries: bool,

    /// Idle time before a keepalive ping is sent.
    ///
    /// Keepalive is active only when both this and `ping_wait_response` are set.
    ///
    /// Default: `None`
    pub ping_inactive: Option<Duration>,

    /// Time to wait for a ping response before declaring the connection dead.
    ///
    /// Default: `None`
    pub ping_wait_response: Option<Duration>,

    /// Rows buffered per streaming result before the connection is paused.
    ///
    /// Default: `16`
    pub stream_high_water_mark: usize,

    /// Run `SELECT CONNECTION_ID()` before any other query after connecting.
    ///
    /// The connection id is needed by `abort()` to issue `KILL`.
    ///
    /// Default: `true`
    pub identity_probe: bool,

    /// Attach column metadata to results unless a query says otherwise.
    ///
    /// Default: `false`
    pub metadata: bool,
}

impl Default for Opts {
    #[no_panic]
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 3306,
            socket: None,
            user: String::new(),
            password: None,
            database: None,
            params: Vec::new(),
            query_cache: QueryCacheOpts::Capacity(DEFAULT_QUERY_CACHE_SIZE),
            keep_queries: false,
            ping_inactive: None,
            ping_wait_response: None,
            stream_high_water_mark: DEFAULT_STREAM_HIGH_WATER_MARK,
            identity_probe: true,
            metadata: false,
        }
    }
}

impl Opts {
    /// Keepalive intervals, when both are configured.
    pub fn keepalive(&self) -> Option<(Duration, Duration)> {
        Some((self.ping_inactive?, self.ping_wait_response?))
    }

    /// Options for a short-lived side connection (used to issue `KILL`).
    pub(crate) fn side_channel(&self) -> Self {
        Self {
            query_cache: QueryCacheOpts::Disabled,
            keep_queries: false,
            ping_inactive: None,
            ping_wait_response: None,
            identity_probe: false,
            ..self.clone()
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, Error> {
    match value {
        "true" | "True" | "1" | "yes" | "on" => Ok(true),
        "false" | "False" | "0" | "no" | "off" => Ok(false),
        _ => Err(Error::InvalidUsage(format!("Invalid {}: {}", key, value))),
    }
}

fn parse_secs(key: &str, value: &str) -> Result<Option<Duration>, Error> {
    let secs: u64 = value
        .parse()
        .map_err(|_| Error::InvalidUsage(format!("Invalid {}: {}", key, value)))?;
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}

impl TryFrom<&Url> for Opts {
    type Error = Error;

    /// Parse a MySQL connection URL.
    ///
    /// Format: `mysql://[user[:password]@]host[:port][/database][?param1=value1&..]`
    ///
    /// Supported query parameters:
    /// - `socket`: unix socket path
    /// - `query_cache`: `false`/`0` disables, a positive integer sets the capacity
    /// - `keep_queries`: true/True/1/yes/on or false/False/0/no/off
    /// - `ping_inactive`, `ping_wait_response`: seconds (0 disables)
    /// - `stream_hwm`: rows buffered per streaming result
    /// - `identity_probe`: boolean
    /// - `metadata`: boolean
    fn try_from(url: &Url) -> Result<Self, Self::Error> {
        if !["mysql", "mariadb"].contains(&url.scheme()) {
            return Err(Error::InvalidUsage(format!(
                "Invalid scheme: expected 'mysql://' or 'mariadb://', got '{}://'",
                url.scheme()
            )));
        }

        let mut opts = Opts {
            host: url.host_str().unwrap_or("localhost").to_string(),
            port: url.port().unwrap_or(3306),
            user: url.username().to_string(),
            password: url.password().map(|s| s.to_string()),
            database: url.path().strip_prefix('/').and_then(|s| {
                if s.is_empty() {
                    None
                } else {
                    Some(s.to_string())
                }
            }),
            ..Opts::default()
        };

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "socket" => {
                    opts.socket = Some(value.to_string());
                }
                "query_cache" => {
                    opts.query_cache = match value.as_ref() {
                        "true" | "True" | "yes" | "on" => {
                            QueryCacheOpts::Capacity(DEFAULT_QUERY_CACHE_SIZE)
                        }
                        "false" | "False" | "0" | "no" | "off" => QueryCacheOpts::Disabled,
                        n => match n.parse::<NonZeroUsize>() {
                            Ok(n) => QueryCacheOpts::Capacity(n),
                            Err(_) => {
                                return Err(Error::InvalidUsage(format!(
                                    "Invalid query_cache: {}",
                                    value
                                )));
                            }
                        },
                    };
                }
                "keep_queries" => {
                    opts.keep_queries = parse_bool("keep_queries", &value)?;
                }
                "ping_inactive" => {
                    opts.ping_inactive = parse_secs("ping_inactive", &value)?;
                }
                "ping_wait_response" => {
                    opts.ping_wait_response = parse_secs("ping_wait_response", &value)?;
                }
                "stream_hwm" => {
                    opts.stream_high_water_mark = value.parse().map_err(|_| {
                        Error::InvalidUsage(format!("Invalid stream_hwm: {}", value))
                    })?;
                }
                "identity_probe" => {
                    opts.identity_probe = parse_bool("identity_probe", &value)?;
                }
                "metadata" => {
                    opts.metadata = parse_bool("metadata", &value)?;
                }
                _ => {
                    opts.params.push((key.to_string(), value.to_string()));
                }
            }
        }

        Ok(opts)
    }
}

impl TryFrom<&str> for Opts {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let url = Url::parse(s).map_err(|e| Error::InvalidUsage(format!("Invalid URL: {}", e)))?;
        Self::try_from(&url)
    }
}
