//! Result sinks of a request: buffered into a [`Response`] or streamed.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::row::{ColumnInfo, ResultInfo, ResultSet, Response, Row};
use crate::stream::{Demand, EmitterShared, ResultShared};

/// Counters carried by `ResultEnded`.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Counters {
    pub(crate) num_rows: u64,
    pub(crate) affected_rows: u64,
    pub(crate) insert_id: u64,
}

impl Counters {
    fn into_info(self, metadata: Option<Arc<[ColumnInfo]>>) -> ResultInfo {
        ResultInfo {
            num_rows: self.num_rows,
            affected_rows: self.affected_rows,
            insert_id: self.insert_id,
            metadata,
        }
    }
}

fn make_row(columns: &Option<Arc<[String]>>, values: Vec<Option<String>>) -> Row {
    match columns {
        Some(columns) => Row::named(Arc::clone(columns), values),
        None => Row::positional(values),
    }
}

pub(crate) enum Delivery {
    Buffered(Buffered),
    Streaming(Streaming),
}

impl Delivery {
    pub(crate) fn buffered(need_columns: bool, need_metadata: bool) -> Self {
        Delivery::Buffered(Buffered {
            need_columns,
            need_metadata,
            columns: None,
            metadata: None,
            rows: Vec::new(),
            results: Vec::new(),
        })
    }

    pub(crate) fn streaming(
        need_columns: bool,
        need_metadata: bool,
        emitter: Arc<EmitterShared>,
        high_water_mark: usize,
        demand: Demand,
    ) -> Self {
        Delivery::Streaming(Streaming {
            need_columns,
            need_metadata,
            emitter,
            current: None,
            opened: Vec::new(),
            columns: None,
            high_water_mark,
            demand,
        })
    }

    pub(crate) fn is_buffered(&self) -> bool {
        matches!(self, Delivery::Buffered(_))
    }

    pub(crate) fn result_started(&mut self, columns: Vec<String>, metadata: Vec<ColumnInfo>) {
        match self {
            Delivery::Buffered(b) => b.result_started(columns, metadata),
            Delivery::Streaming(s) => s.result_started(columns, metadata),
        }
    }

    /// Returns true when the streaming result that took the row is full.
    pub(crate) fn row(&mut self, values: Vec<Option<String>>) -> bool {
        match self {
            Delivery::Buffered(b) => {
                let row = make_row(&b.columns, values);
                b.rows.push(row);
                false
            }
            Delivery::Streaming(s) => s.row(values),
        }
    }

    /// Returns true while any result handed to the consumer is full.
    pub(crate) fn is_saturated(&self) -> bool {
        match self {
            Delivery::Buffered(_) => false,
            Delivery::Streaming(s) => s.opened.iter().any(|r| r.is_saturated()),
        }
    }

    pub(crate) fn result_ended(&mut self, counters: Counters) {
        match self {
            Delivery::Buffered(b) => b.result_ended(counters),
            Delivery::Streaming(s) => s.result_ended(counters),
        }
    }

    pub(crate) fn error(&mut self, err: Error) {
        match self {
            Delivery::Buffered(b) => b.error(err),
            Delivery::Streaming(s) => s.error(err),
        }
    }

    /// The query went idle. Buffered deliveries produce their outcome.
    pub(crate) fn finish(self) -> Option<Result<Response>> {
        match self {
            Delivery::Buffered(b) => Some(b.finish()),
            Delivery::Streaming(s) => {
                s.finish();
                None
            }
        }
    }

    /// The request will never run to completion.
    pub(crate) fn fail(self, err: Error) -> Option<Result<Response>> {
        match self {
            Delivery::Buffered(_) => Some(Err(err)),
            Delivery::Streaming(mut s) => {
                s.error(err);
                s.finish();
                None
            }
        }
    }

    /// Drop partial state before the request is replayed on a new connection.
    pub(crate) fn reset(&mut self) {
        match self {
            Delivery::Buffered(b) => {
                b.columns = None;
                b.metadata = None;
                b.rows.clear();
                b.results.clear();
            }
            Delivery::Streaming(s) => {
                if let Some(current) = s.current.take() {
                    current.fail(Error::ClosedEarly);
                }
                s.opened.clear();
                s.columns = None;
            }
        }
    }
}

pub(crate) struct Buffered {
    need_columns: bool,
    need_metadata: bool,
    columns: Option<Arc<[String]>>,
    metadata: Option<Arc<[ColumnInfo]>>,
    rows: Vec<Row>,
    results: Vec<Result<ResultSet>>,
}

impl Buffered {
    fn result_started(&mut self, columns: Vec<String>, metadata: Vec<ColumnInfo>) {
        self.columns = self.need_columns.then(|| columns.into());
        self.metadata = self.need_metadata.then(|| metadata.into());
    }

    fn result_ended(&mut self, counters: Counters) {
        let rows = core::mem::take(&mut self.rows);
        self.columns = None;
        self.results.push(Ok(ResultSet {
            rows,
            info: counters.into_info(self.metadata.take()),
        }));
    }

    fn error(&mut self, err: Error) {
        self.rows.clear();
        self.columns = None;
        self.metadata = None;
        self.results.push(Err(err));
    }

    fn finish(self) -> Result<Response> {
        let mut results = self.results;
        if results.len() == 1
            && let Some(result) = results.pop()
        {
            return result.map(Response::Single);
        }
        Ok(Response::Multi(results))
    }
}

pub(crate) struct Streaming {
    need_columns: bool,
    need_metadata: bool,
    emitter: Arc<EmitterShared>,
    current: Option<Arc<ResultShared>>,
    /// The newest result plus earlier ones that are still full
    opened: Vec<Arc<ResultShared>>,
    columns: Option<Arc<[String]>>,
    high_water_mark: usize,
    demand: Demand,
}

impl Streaming {
    fn open(&mut self, metadata: Option<Arc<[ColumnInfo]>>) -> Arc<ResultShared> {
        let result =
            self.emitter
                .open_result(metadata, self.high_water_mark, Arc::clone(&self.demand));
        // Drained or dropped results can no longer hold delivery back.
        self.opened.retain(|r| r.is_saturated());
        self.opened.push(Arc::clone(&result));
        result
    }

    fn take_or_open(&mut self) -> Arc<ResultShared> {
        match self.current.take() {
            Some(current) => current,
            None => self.open(None),
        }
    }

    fn result_started(&mut self, columns: Vec<String>, metadata: Vec<ColumnInfo>) {
        if let Some(previous) = self.current.take() {
            previous.end(ResultInfo::default());
        }
        self.columns = self.need_columns.then(|| columns.into());
        let metadata = self.need_metadata.then(|| metadata.into());
        self.current = Some(self.open(metadata));
    }

    fn row(&mut self, values: Vec<Option<String>>) -> bool {
        let row = make_row(&self.columns, values);
        let current = match self.current.clone() {
            Some(current) => current,
            None => {
                let current = self.open(None);
                self.current = Some(Arc::clone(&current));
                current
            }
        };
        current.push(row);
        current.is_saturated()
    }

    fn result_ended(&mut self, counters: Counters) {
        self.columns = None;
        self.take_or_open().end(counters.into_info(None));
    }

    fn error(&mut self, err: Error) {
        self.columns = None;
        self.take_or_open().fail(err);
    }

    fn finish(self) {
        if let Some(current) = self.current {
            current.end(ResultInfo::default());
        }
        self.emitter.set_idle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServerError;
    use crate::stream::QueryStream;

    fn counters(num_rows: u64) -> Counters {
        Counters {
            num_rows,
            ..Counters::default()
        }
    }

    #[test]
    fn test_buffered_single() {
        let mut d = Delivery::buffered(true, false);
        d.result_started(vec!["a".into()], Vec::new());
        d.row(vec![Some("1".into())]);
        d.row(vec![None]);
        d.result_ended(counters(2));
        let Some(Ok(Response::Single(rs))) = d.finish() else {
            panic!("expected a single result");
        };
        assert_eq!(rs.rows.len(), 2);
        assert_eq!(rs.rows[0].get_by_name("a"), Some("1"));
        assert_eq!(rs.info.num_rows, 2);
        assert!(rs.info.metadata.is_none());
    }

    #[test]
    fn test_buffered_positional() {
        let mut d = Delivery::buffered(false, false);
        d.result_started(vec!["a".into()], Vec::new());
        d.row(vec![Some("1".into())]);
        d.result_ended(counters(1));
        let Some(Ok(Response::Single(rs))) = d.finish() else {
            panic!("expected a single result");
        };
        assert!(!rs.rows[0].is_named());
    }

    #[test]
    fn test_buffered_single_error_fails_request() {
        let mut d = Delivery::buffered(true, false);
        d.error(Error::Server(ServerError::new(1064, "syntax")));
        assert!(matches!(d.finish(), Some(Err(Error::Server(_)))));
    }

    #[test]
    fn test_buffered_multi_keeps_error_positions() {
        let mut d = Delivery::buffered(true, true);
        d.result_started(
            vec!["a".into()],
            vec![ColumnInfo {
                name: "a".into(),
                ..ColumnInfo::default()
            }],
        );
        d.row(vec![Some("1".into())]);
        d.result_ended(counters(1));
        d.error(Error::Server(ServerError::new(1146, "no table")));
        d.result_ended(Counters {
            affected_rows: 3,
            ..Counters::default()
        });
        let Some(Ok(Response::Multi(results))) = d.finish() else {
            panic!("expected a multi result");
        };
        assert_eq!(results.len(), 3);
        assert!(results[0].as_ref().unwrap().info.metadata.is_some());
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().info.affected_rows, 3);
    }

    #[test]
    fn test_buffered_no_results_is_empty_multi() {
        let d = Delivery::buffered(true, false);
        assert!(matches!(d.finish(), Some(Ok(Response::Multi(v))) if v.is_empty()));
    }

    #[tokio::test]
    async fn test_streaming_rows_without_start_open_a_result() {
        let emitter = EmitterShared::new();
        let mut query = QueryStream::new(Arc::clone(&emitter));
        let mut d = Delivery::streaming(true, false, emitter, 4, Arc::new(|| {}));
        d.row(vec![Some("x".into())]);
        d.result_ended(counters(1));
        d.result_ended(Counters {
            affected_rows: 1,
            ..Counters::default()
        });
        assert!(d.finish().is_none());

        let first = query.next_result().await.unwrap().collect().await.unwrap();
        assert_eq!(first.rows.len(), 1);
        let second = query.next_result().await.unwrap().collect().await.unwrap();
        assert_eq!(second.info.affected_rows, 1);
        assert!(query.next_result().await.is_none());
        assert!(query.is_done());
    }

    #[tokio::test]
    async fn test_streaming_fail_reports_error() {
        let emitter = EmitterShared::new();
        let mut query = QueryStream::new(Arc::clone(&emitter));
        let d = Delivery::streaming(true, false, emitter, 4, Arc::new(|| {}));
        assert!(d.fail(Error::ClosedEarly).is_none());
        let result = query.next_result().await.unwrap();
        assert!(matches!(result.collect().await, Err(Error::ClosedEarly)));
        query.done().await;
    }
}
