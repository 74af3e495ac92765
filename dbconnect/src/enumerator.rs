//! Lazy, single-pass enumeration of a live cursor

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use async_stream::stream;
use futures::stream::{FusedStream, Stream, StreamExt};
use futures::ready;

use crate::command::Statement;
use crate::connection::DbConnection;
use crate::error::{Error, Result};
use crate::traits::{Connection, FromRow, RawCursor, Row};

/// The connection an enumerator runs on: borrowed from the caller, or owned
/// and closed by the enumerator when it is done.
pub(crate) enum ConnSlot<'c, C: Connection> {
    Shared(&'c mut DbConnection<C>),
    Owned(DbConnection<C>),
}

impl<C: Connection> ConnSlot<'_, C> {
    pub(crate) fn get_mut(&mut self) -> &mut DbConnection<C> {
        match self {
            ConnSlot::Shared(conn) => conn,
            ConnSlot::Owned(conn) => conn,
        }
    }
}

enum Step<T> {
    Opened,
    Row(T),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Exhausted,
    Closed,
}

/// A lazy, forward-only, single-pass sequence of materialized rows.
///
/// Rows come from the first result of the statement; once they are consumed
/// the cursor is advanced past that result and released. Release happens in
/// a fixed order: the cursor, then the statement, then the connection if the
/// enumerator owns it. A caller-supplied connection is never closed.
///
/// The enumerator is a fused [`Stream`] of `Result<T>`. [`try_next`] is the
/// strict form: it reports reads past the end as [`Error::SequenceExhausted`]
/// and reads after [`close`] as [`Error::CursorClosed`].
///
/// Dropping an enumerator mid-way releases everything without waiting for
/// the provider; call [`close`] to release gracefully.
///
/// [`try_next`]: AsyncEnumerator::try_next
/// [`close`]: AsyncEnumerator::close
pub struct AsyncEnumerator<'c, T> {
    rows: Pin<Box<dyn Stream<Item = Result<Step<T>>> + Send + 'c>>,
    closing: Arc<AtomicBool>,
    state: State,
}

impl<'c, T: FromRow> AsyncEnumerator<'c, T> {
    /// Execute the statement and open the cursor.
    pub(crate) async fn open<C: Connection + 'c>(
        slot: ConnSlot<'c, C>,
        statement: Statement,
    ) -> Result<Self> {
        let closing = Arc::new(AtomicBool::new(false));
        let mut rows = Box::pin(rows::<C, T>(slot, statement, closing.clone()));
        match rows.next().await {
            Some(Ok(Step::Opened)) => Ok(Self {
                rows,
                closing,
                state: State::Open,
            }),
            Some(Err(e)) => Err(e),
            _ => Err(Error::Query("cursor did not open".to_string())),
        }
    }
}

impl<T> AsyncEnumerator<'_, T> {
    /// Read the next row.
    ///
    /// Returns `Ok(None)` once, at the end of the rows.
    pub async fn try_next(&mut self) -> Result<Option<T>> {
        match self.state {
            State::Open => self.next().await.transpose(),
            State::Exhausted => Err(Error::SequenceExhausted),
            State::Closed => Err(Error::CursorClosed),
        }
    }

    /// Read all remaining rows.
    pub async fn fetch_all(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.try_next().await? {
            items.push(item);
        }
        Ok(items)
    }

    /// Stop reading and release the cursor, the statement and an owned
    /// connection. Safe to call more than once.
    pub async fn close(&mut self) -> Result<()> {
        if self.state != State::Open {
            self.state = State::Closed;
            return Ok(());
        }
        self.closing.store(true, Ordering::Release);
        let mut failure = None;
        while let Some(step) = self.rows.next().await {
            if let Err(e) = step {
                failure.get_or_insert(e);
            }
        }
        self.state = State::Closed;
        failure.map_or(Ok(()), Err)
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }
}

impl<T> Stream for AsyncEnumerator<'_, T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.state != State::Open {
            return Poll::Ready(None);
        }
        loop {
            match ready!(this.rows.as_mut().poll_next(cx)) {
                Some(Ok(Step::Row(item))) => return Poll::Ready(Some(Ok(item))),
                Some(Ok(Step::Opened)) => continue,
                Some(Err(e)) => {
                    this.state = State::Exhausted;
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    this.state = State::Exhausted;
                    return Poll::Ready(None);
                }
            }
        }
    }
}

impl<T> FusedStream for AsyncEnumerator<'_, T> {
    fn is_terminated(&self) -> bool {
        self.state != State::Open
    }
}

/// Consume what is left of the current result and step past it.
async fn finish(cursor: &mut (dyn RawCursor + '_)) -> Result<()> {
    while cursor.fetch().await?.is_some() {}
    cursor.next_result().await?;
    Ok(())
}

fn rows<'c, C, T>(
    mut slot: ConnSlot<'c, C>,
    statement: Statement,
    closing: Arc<AtomicBool>,
) -> impl Stream<Item = Result<Step<T>>> + Send + 'c
where
    C: Connection + 'c,
    T: FromRow,
{
    stream! {
        let mut failure: Option<Error> = None;
        let conn = slot.get_mut();
        let materializer = conn.materializer().clone();

        match conn.open_cursor(&statement).await {
            Ok(mut cursor) => {
                yield Ok(Step::Opened);

                let columns = cursor.columns();
                let plan = materializer.plan::<T>(&columns);
                while !closing.load(Ordering::Acquire) {
                    match cursor.fetch().await {
                        Ok(Some(values)) => {
                            match Row::new(columns.clone(), values).and_then(|row| plan.apply(row)) {
                                Ok(item) => {
                                    yield Ok(Step::Row(item));
                                }
                                Err(e) => {
                                    failure = Some(e);
                                    break;
                                }
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            failure = Some(e.classify());
                            break;
                        }
                    }
                }

                if failure.is_none() {
                    if let Err(e) = finish(cursor.as_mut()).await {
                        failure = Some(e.classify());
                    }
                }
                if let Err(e) = cursor.close().await {
                    failure.get_or_insert(e.classify());
                }
                drop(cursor);
            }
            Err(e) => failure = Some(e),
        }
        drop(statement);

        if let ConnSlot::Owned(mut conn) = slot {
            if let Err(e) = conn.close().await {
                failure.get_or_insert(e);
            }
        }
        if let Some(e) = failure {
            yield Err(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::connection::DbConnect;
    use crate::testing::{CallLog, MockConnection, MockConnector};
    use crate::value::Value;
    use crate::FromRow;

    #[derive(Debug, Default, PartialEq, FromRow)]
    struct User {
        id: i64,
        name: String,
        email: Option<String>,
    }

    fn users(log: &CallLog) -> MockConnection {
        MockConnection::new(log).rows(
            &["ID", "name", "email", "created"],
            vec![
                vec![
                    Value::I64(1),
                    Value::String("ada".into()),
                    Value::Null,
                    Value::I64(0),
                ],
                vec![
                    Value::I64(2),
                    Value::String("bob".into()),
                    Value::String("bob@example.com".into()),
                    Value::I64(0),
                ],
            ],
        )
    }

    fn statement() -> Statement {
        Command::new("list_users").build().unwrap()
    }

    #[tokio::test]
    async fn test_rows_are_read_once() {
        let log = CallLog::default();
        let mut conn = DbConnection::new(users(&log));
        let mut rows = conn.query::<User>(statement()).await.unwrap();

        let ada = rows.try_next().await.unwrap().unwrap();
        assert_eq!(ada.id, 1);
        assert_eq!(ada.email, None);
        let bob = rows.try_next().await.unwrap().unwrap();
        assert_eq!(bob.email.as_deref(), Some("bob@example.com"));

        assert!(rows.try_next().await.unwrap().is_none());
        assert!(matches!(rows.try_next().await, Err(Error::SequenceExhausted)));
        assert!(rows.next().await.is_none());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let log = CallLog::default();
        let mut conn = DbConnection::new(users(&log));
        let mut rows = conn.query::<User>(statement()).await.unwrap();
        rows.try_next().await.unwrap();

        rows.close().await.unwrap();
        rows.close().await.unwrap();
        assert!(rows.is_closed());
        assert!(matches!(rows.try_next().await, Err(Error::CursorClosed)));
        drop(rows);

        assert_eq!(log.count("cursor.close"), 1);
        // a borrowed connection stays open
        assert!(conn.is_open());
        assert_eq!(log.count("close"), 0);
    }

    #[tokio::test]
    async fn test_owned_connection_released_after_cursor() {
        let log = CallLog::default();
        let db = DbConnect::new(MockConnector::new(&log).with(users(&log)));
        let rows = db.query::<User>(statement()).await.unwrap();
        let all = rows.fetch_all().await.unwrap();
        assert_eq!(all.len(), 2);

        let entries = log.entries();
        let tail = &entries[entries.len() - 3..];
        assert_eq!(tail, ["next_result", "cursor.close", "close"]);
    }

    #[tokio::test]
    async fn test_only_first_result_is_read() {
        let log = CallLog::default();
        let conn = MockConnection::new(&log).result_sets(vec![
            (vec!["n"], vec![vec![Value::I64(1)]]),
            (vec!["m"], vec![vec![Value::I64(9)], vec![Value::I64(9)]]),
        ]);
        let mut conn = DbConnection::new(conn);
        let all = conn.fetch_all::<i64>(statement()).await.unwrap();
        assert_eq!(all, [1]);
        assert_eq!(log.count("fetch"), 1);
        assert_eq!(log.count("next_result"), 1);
    }

    #[tokio::test]
    async fn test_fetch_error_still_releases_cursor() {
        let log = CallLog::default();
        let mut conn = DbConnection::new(users(&log).fail_fetch_after(1));
        let mut rows = conn.query::<User>(statement()).await.unwrap();
        assert!(rows.try_next().await.unwrap().is_some());
        assert!(rows.try_next().await.is_err());
        assert!(matches!(rows.try_next().await, Err(Error::SequenceExhausted)));
        drop(rows);
        assert_eq!(log.count("cursor.close"), 1);
        assert_eq!(log.count("next_result"), 0);
    }

    #[tokio::test]
    async fn test_conversion_error_surfaces() {
        let log = CallLog::default();
        let conn = MockConnection::new(&log).rows(&["id"], vec![vec![Value::String("x".into())]]);
        let mut conn = DbConnection::new(conn);
        let err = conn.fetch_all::<User>(statement()).await.unwrap_err();
        assert!(matches!(err, Error::TypeConversion { .. }));
        assert_eq!(log.count("cursor.close"), 1);
    }

    #[tokio::test]
    async fn test_row_and_scalar_targets() {
        let log = CallLog::default();
        let conn = MockConnection::new(&log)
            .rows(&["id", "name"], vec![vec![Value::I64(5), Value::String("eve".into())]])
            .rows(&["id"], vec![vec![Value::Null]]);
        let mut conn = DbConnection::new(conn);

        let row = conn.first::<Row>(statement()).await.unwrap().unwrap();
        assert_eq!(row.get::<String>("NAME").unwrap(), "eve");

        let id = conn.first::<Option<i64>>(statement()).await.unwrap();
        assert_eq!(id, Some(None));
    }

    #[tokio::test]
    async fn test_stream_combinators() {
        let log = CallLog::default();
        let mut conn = DbConnection::new(users(&log));
        let names: Vec<String> = conn
            .query::<User>(statement())
            .await
            .unwrap()
            .map(|user| user.map(|u| u.name))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(names, ["ada", "bob"]);
    }
}
