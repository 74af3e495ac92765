//! Scripted in-memory provider for unit tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::bulk::BulkBatch;
use crate::command::Statement;
use crate::error::{Error, Result};
use crate::traits::{
    Column, Connection, Connector, ExecuteResult, IsolationLevel, RawCursor,
};
use crate::value::Value;

/// Calls made against mock connections, in order.
#[derive(Clone, Default)]
pub(crate) struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }
}

/// One result set: column names and rows.
pub(crate) type ResultSet = (Vec<&'static str>, Vec<Vec<Value>>);

pub(crate) struct MockConnection {
    log: CallLog,
    open: bool,
    results: VecDeque<Vec<ResultSet>>,
    executes: VecDeque<Result<ExecuteResult>>,
    fail_fetch_after: Option<usize>,
    fail_bulk_at: Option<usize>,
    bulk_calls: usize,
}

impl MockConnection {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            open: false,
            results: VecDeque::new(),
            executes: VecDeque::new(),
            fail_fetch_after: None,
            fail_bulk_at: None,
            bulk_calls: 0,
        }
    }

    /// Queue a single-result query response.
    pub fn rows(self, columns: &[&'static str], rows: Vec<Vec<Value>>) -> Self {
        self.result_sets(vec![(columns.to_vec(), rows)])
    }

    pub fn result_sets(mut self, sets: Vec<ResultSet>) -> Self {
        self.results.push_back(sets);
        self
    }

    pub fn execute_result(mut self, result: Result<ExecuteResult>) -> Self {
        self.executes.push_back(result);
        self
    }

    /// Fail the fetch after `n` rows were read.
    pub fn fail_fetch_after(mut self, n: usize) -> Self {
        self.fail_fetch_after = Some(n);
        self
    }

    /// Fail the n-th (zero-based) bulk write.
    pub fn fail_bulk_at(mut self, n: usize) -> Self {
        self.fail_bulk_at = Some(n);
        self
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(Error::Connection("connection is not open".to_string()))
        }
    }
}

pub(crate) struct MockCursor {
    log: CallLog,
    sets: VecDeque<ResultSet>,
    columns: Arc<[Column]>,
    rows: VecDeque<Vec<Value>>,
    fetched: usize,
    fail_after: Option<usize>,
}

impl MockCursor {
    fn load(&mut self) {
        match self.sets.pop_front() {
            Some((columns, rows)) => {
                self.columns = columns.into_iter().map(Column::new).collect();
                self.rows = rows.into();
            }
            None => {
                self.columns = Arc::from(Vec::new());
                self.rows.clear();
            }
        }
    }
}

#[async_trait]
impl RawCursor for MockCursor {
    fn columns(&self) -> Arc<[Column]> {
        self.columns.clone()
    }

    async fn fetch(&mut self) -> Result<Option<Vec<Value>>> {
        if self.fail_after == Some(self.fetched) {
            return Err(Error::Query("fetch failed".to_string()));
        }
        let row = self.rows.pop_front();
        if row.is_some() {
            self.fetched += 1;
            self.log.push("fetch");
        }
        Ok(row)
    }

    async fn next_result(&mut self) -> Result<bool> {
        self.log.push("next_result");
        if self.sets.is_empty() {
            return Ok(false);
        }
        self.load();
        Ok(true)
    }

    async fn close(&mut self) -> Result<()> {
        self.log.push("cursor.close");
        Ok(())
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn is_open(&self) -> bool {
        self.open
    }

    async fn open(&mut self) -> Result<()> {
        self.log.push("open");
        self.open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.log.push("close");
        self.open = false;
        Ok(())
    }

    async fn execute(&mut self, statement: &Statement) -> Result<ExecuteResult> {
        self.ensure_open()?;
        self.log.push(format!("execute {}", statement.query()));
        self.executes
            .pop_front()
            .unwrap_or_else(|| Ok(ExecuteResult::default()))
    }

    async fn query<'a>(
        &'a mut self,
        statement: &'a Statement,
    ) -> Result<Box<dyn RawCursor + 'a>> {
        self.ensure_open()?;
        self.log.push(format!("query {}", statement.query()));
        let mut cursor = MockCursor {
            log: self.log.clone(),
            sets: self.results.pop_front().unwrap_or_default().into(),
            columns: Arc::from(Vec::new()),
            rows: VecDeque::new(),
            fetched: 0,
            fail_after: self.fail_fetch_after,
        };
        cursor.load();
        Ok(Box::new(cursor))
    }

    async fn begin(&mut self, isolation: Option<IsolationLevel>) -> Result<()> {
        self.ensure_open()?;
        match isolation {
            Some(level) => self.log.push(format!("begin {}", level)),
            None => self.log.push("begin"),
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.log.push("commit");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.log.push("rollback");
        Ok(())
    }

    async fn save(&mut self, name: &str) -> Result<()> {
        self.log.push(format!("save {}", name));
        Ok(())
    }

    async fn rollback_to(&mut self, name: &str) -> Result<()> {
        self.log.push(format!("rollback_to {}", name));
        Ok(())
    }

    async fn write_to_server(&mut self, batch: &BulkBatch) -> Result<u64> {
        self.ensure_open()?;
        let call = self.bulk_calls;
        self.bulk_calls += 1;
        if self.fail_bulk_at == Some(call) {
            return Err(Error::Query("bulk write failed".to_string()));
        }
        self.log
            .push(format!("bulk {} {}", batch.table, batch.rows.len()));
        Ok(batch.rows.len() as u64)
    }
}

/// Hands out prepared connections in order, then empty ones.
pub(crate) struct MockConnector {
    log: CallLog,
    prepared: Mutex<VecDeque<MockConnection>>,
}

impl MockConnector {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            prepared: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with(self, conn: MockConnection) -> Self {
        self.prepared.lock().unwrap().push_back(conn);
        self
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Connection = MockConnection;

    async fn connect(&self) -> Result<MockConnection> {
        self.log.push("connect");
        let prepared = self.prepared.lock().unwrap().pop_front();
        Ok(prepared.unwrap_or_else(|| MockConnection::new(&self.log)))
    }
}
