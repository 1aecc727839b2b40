//! Streaming results.
//!
//! A streamed query yields a [`QueryStream`], which hands out one
//! [`ResultStream`] per statement. Each result buffers at most
//! `high_water_mark` rows; when the buffer fills, the connection stops
//! delivering rows until the consumer drains it.
//!
//! ```ignore
//! let mut query = client.query_stream("SELECT * FROM big", QueryOpts::default())?;
//! while let Some(mut result) = query.next_result().await {
//!     while let Some(row) = result.next_row().await {
//!         let row = row?;
//!         // ...
//!     }
//! }
//! query.done().await;
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::error::{Error, Result};
use crate::row::{ColumnInfo, ResultInfo, ResultSet, Row};

/// Wakes the queue after a saturated result was drained.
pub type Demand = Arc<dyn Fn() + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// === Per-result buffer ===

#[derive(Default)]
struct ResultState {
    rows: VecDeque<Row>,
    error: Option<Error>,
    info: Option<ResultInfo>,
    ended: bool,
    needs_resume: bool,
    detached: bool,
}

/// Buffer shared between the queue (producer) and a [`ResultStream`].
pub(crate) struct ResultShared {
    state: Mutex<ResultState>,
    notify: Notify,
    high_water_mark: usize,
    metadata: Option<Arc<[ColumnInfo]>>,
    demand: Demand,
}

impl ResultShared {
    fn new(metadata: Option<Arc<[ColumnInfo]>>, high_water_mark: usize, demand: Demand) -> Self {
        Self {
            state: Mutex::new(ResultState::default()),
            notify: Notify::new(),
            high_water_mark: high_water_mark.max(1),
            metadata,
            demand,
        }
    }

    /// Buffer a row.
    ///
    /// Returns true when this row filled the buffer; the caller must pause the
    /// connection. Reported once per saturation, until the consumer drains.
    pub(crate) fn push(&self, row: Row) -> bool {
        let saturated = {
            let mut state = lock(&self.state);
            if state.detached {
                return false;
            }
            state.rows.push_back(row);
            if state.rows.len() >= self.high_water_mark && !state.needs_resume {
                state.needs_resume = true;
                true
            } else {
                false
            }
        };
        self.notify.notify_one();
        saturated
    }

    /// Returns true while the buffer is at the mark and not yet drained.
    pub(crate) fn is_saturated(&self) -> bool {
        lock(&self.state).needs_resume
    }

    pub(crate) fn end(&self, mut info: ResultInfo) {
        info.metadata = self.metadata.clone();
        {
            let mut state = lock(&self.state);
            state.info = Some(info);
            state.ended = true;
        }
        self.notify.notify_one();
    }

    pub(crate) fn fail(&self, err: Error) {
        {
            let mut state = lock(&self.state);
            if !state.detached {
                state.error = Some(err);
            }
            state.ended = true;
        }
        self.notify.notify_one();
    }

    fn detach(&self) {
        let resume = {
            let mut state = lock(&self.state);
            state.detached = true;
            state.rows.clear();
            core::mem::take(&mut state.needs_resume)
        };
        if resume {
            (self.demand)();
        }
    }
}

// === Per-query emitter ===

#[derive(Default)]
struct EmitterState {
    pending: VecDeque<ResultStream>,
    unfinished: usize,
    idle: bool,
    abandoned: bool,
}

/// State shared between the queue and a [`QueryStream`].
pub(crate) struct EmitterShared {
    state: Mutex<EmitterState>,
    notify: Notify,
}

impl EmitterShared {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(EmitterState::default()),
            notify: Notify::new(),
        })
    }

    /// Expose a new result to the consumer.
    pub(crate) fn open_result(
        self: &Arc<Self>,
        metadata: Option<Arc<[ColumnInfo]>>,
        high_water_mark: usize,
        demand: Demand,
    ) -> Arc<ResultShared> {
        let shared = Arc::new(ResultShared::new(metadata, high_water_mark, demand));
        {
            let mut state = lock(&self.state);
            if state.abandoned {
                drop(state);
                shared.detach();
                return shared;
            }
            state.unfinished += 1;
            state.pending.push_back(ResultStream {
                shared: Arc::clone(&shared),
                emitter: Arc::clone(self),
                finished: false,
            });
        }
        self.notify.notify_one();
        shared
    }

    /// The query finished on the connection.
    pub(crate) fn set_idle(&self) {
        lock(&self.state).idle = true;
        self.notify.notify_one();
    }

    fn result_finished(&self) {
        {
            let mut state = lock(&self.state);
            state.unfinished = state.unfinished.saturating_sub(1);
        }
        self.notify.notify_one();
    }

    fn is_done(&self) -> bool {
        let state = lock(&self.state);
        state.idle && state.unfinished == 0
    }
}

/// Results of a streamed query, one [`ResultStream`] per statement.
pub struct QueryStream {
    shared: Arc<EmitterShared>,
}

impl QueryStream {
    pub(crate) fn new(shared: Arc<EmitterShared>) -> Self {
        Self { shared }
    }

    /// Wait for the next result.
    ///
    /// Returns `None` once the query finished and every result was handed out.
    pub async fn next_result(&mut self) -> Option<ResultStream> {
        loop {
            {
                let mut state = lock(&self.shared.state);
                if let Some(result) = state.pending.pop_front() {
                    return Some(result);
                }
                if state.idle {
                    return None;
                }
            }
            self.shared.notify.notified().await;
        }
    }

    /// Returns true once the query finished and every handed-out result was
    /// read to its end (or dropped).
    pub fn is_done(&self) -> bool {
        self.shared.is_done()
    }

    /// Wait until the query finished and every handed-out result was read to
    /// its end (or dropped).
    ///
    /// Results not yet taken with `next_result` are discarded.
    pub async fn done(self) {
        let shared = Arc::clone(&self.shared);
        drop(self);
        loop {
            if shared.is_done() {
                return;
            }
            shared.notify.notified().await;
        }
    }

    /// Read every result to its end.
    pub async fn collect(mut self) -> Vec<Result<ResultSet>> {
        let mut results = Vec::new();
        while let Some(result) = self.next_result().await {
            results.push(result.collect().await);
        }
        self.done().await;
        results
    }
}

impl Drop for QueryStream {
    fn drop(&mut self) {
        let pending = {
            let mut state = lock(&self.shared.state);
            state.abandoned = true;
            core::mem::take(&mut state.pending)
        };
        // Dropped outside the lock: each result reports back to the emitter.
        drop(pending);
    }
}

/// Rows of one statement of a streamed query.
///
/// Dropping a result before its end discards the remaining rows.
pub struct ResultStream {
    shared: Arc<ResultShared>,
    emitter: Arc<EmitterShared>,
    finished: bool,
}

impl ResultStream {
    /// Column metadata, when requested.
    pub fn metadata(&self) -> Option<&Arc<[ColumnInfo]>> {
        self.shared.metadata.as_ref()
    }

    /// Counters of the statement, available once it ended.
    pub fn info(&self) -> Option<ResultInfo> {
        lock(&self.shared.state).info.clone()
    }

    /// Returns true once the end of the result was read.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Wait for the next row.
    ///
    /// A statement error is yielded once as `Err`, then the stream ends.
    pub async fn next_row(&mut self) -> Option<Result<Row>> {
        loop {
            if let Some(item) = self.try_next_row() {
                return item;
            }
            self.shared.notify.notified().await;
        }
    }

    /// Take the next row without waiting.
    ///
    /// `None` means nothing is buffered yet; `Some(None)` means the end.
    pub fn try_next_row(&mut self) -> Option<Option<Result<Row>>> {
        if self.finished {
            return Some(None);
        }
        let mut resume = false;
        let item = {
            let mut state = lock(&self.shared.state);
            if let Some(row) = state.rows.pop_front() {
                if state.needs_resume && state.rows.len() < self.shared.high_water_mark {
                    state.needs_resume = false;
                    resume = true;
                }
                Some(Some(Ok(row)))
            } else if let Some(err) = state.error.take() {
                Some(Some(Err(err)))
            } else if state.ended {
                Some(None)
            } else {
                None
            }
        };
        if resume {
            (self.shared.demand)();
        }
        if matches!(item, Some(None)) {
            self.finish();
        }
        item
    }

    /// Read the remaining rows into a [`ResultSet`].
    pub async fn collect(mut self) -> Result<ResultSet> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row().await {
            rows.push(row?);
        }
        Ok(ResultSet {
            rows,
            info: self.info().unwrap_or_default(),
        })
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.emitter.result_finished();
        }
    }
}

impl Drop for ResultStream {
    fn drop(&mut self) {
        if !self.finished {
            self.shared.detach();
            self.finish();
        }
    }
}
