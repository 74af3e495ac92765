//! Forward-only reader over every result of a statement

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_stream::stream;
use futures::stream::{BoxStream, Stream, StreamExt, TryStreamExt};

use crate::command::Statement;
use crate::enumerator::ConnSlot;
use crate::error::{Error, Result};
use crate::materialize::{Materializer, RowPlan};
use crate::traits::{Connection, FromRow, Row};

enum Event {
    Opened,
    Row(Row),
    NextResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    /// Rows of the current result may remain
    InResult,
    /// The current result is consumed and the next one is ready
    BeforeNext,
    Finished,
    Closed,
}

/// A reader over all results of a statement, e.g. a stored procedure that
/// selects more than once.
///
/// Rows of the current result are read with [`rows`] or [`fetch_all`];
/// [`next_result`] skips whatever is left of it and moves on. Release
/// follows the same order as [`AsyncEnumerator`](crate::AsyncEnumerator):
/// the cursor, then the statement, then the connection if the reader owns
/// it.
///
/// ```ignore
/// let mut reader = conn.reader(Command::new("order_with_lines").build()?).await?;
/// let order: Vec<Order> = reader.fetch_all().await?;
/// reader.next_result().await?;
/// let lines: Vec<OrderLine> = reader.fetch_all().await?;
/// reader.close().await?;
/// ```
///
/// [`rows`]: DbReader::rows
/// [`fetch_all`]: DbReader::fetch_all
/// [`next_result`]: DbReader::next_result
pub struct DbReader<'c> {
    events: Pin<Box<dyn Stream<Item = Result<Event>> + Send + 'c>>,
    closing: Arc<AtomicBool>,
    materializer: Materializer,
    position: Position,
}

impl<'c> DbReader<'c> {
    /// Execute the statement and position the reader on its first result.
    pub(crate) async fn open<C: Connection + 'c>(
        mut slot: ConnSlot<'c, C>,
        statement: Statement,
    ) -> Result<Self> {
        let materializer = slot.get_mut().materializer().clone();
        let closing = Arc::new(AtomicBool::new(false));
        let mut events = Box::pin(events(slot, statement, closing.clone()));
        match events.next().await {
            Some(Ok(Event::Opened)) => Ok(Self {
                events,
                closing,
                materializer,
                position: Position::InResult,
            }),
            Some(Err(e)) => Err(e),
            _ => Err(Error::Query("cursor did not open".to_string())),
        }
    }
}

impl DbReader<'_> {
    /// Next row of the current result; `None` at its end.
    async fn pull(&mut self) -> Result<Option<Row>> {
        while self.position == Position::InResult {
            match self.events.next().await {
                Some(Ok(Event::Row(row))) => return Ok(Some(row)),
                Some(Ok(Event::Opened)) => continue,
                Some(Ok(Event::NextResult)) => self.position = Position::BeforeNext,
                Some(Err(e)) => {
                    self.position = Position::Finished;
                    return Err(e);
                }
                None => self.position = Position::Finished,
            }
        }
        Ok(None)
    }

    /// Stream the remaining rows of the current result.
    pub fn rows<T: FromRow>(&mut self) -> BoxStream<'_, Result<T>> {
        stream! {
            if self.position == Position::Closed {
                yield Err(Error::CursorClosed);
                return;
            }
            let mut plan: Option<RowPlan<T>> = None;
            loop {
                match self.pull().await {
                    Ok(Some(row)) => {
                        let plan = plan
                            .get_or_insert_with(|| self.materializer.plan::<T>(row.columns()));
                        yield plan.apply(row);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        }
        .boxed()
    }

    /// Read the remaining rows of the current result.
    pub async fn fetch_all<T: FromRow>(&mut self) -> Result<Vec<T>> {
        self.rows::<T>().try_collect().await
    }

    /// Skip what is left of the current result and move to the next one.
    ///
    /// Returns `false` once there are no more results.
    pub async fn next_result(&mut self) -> Result<bool> {
        loop {
            match self.position {
                Position::Closed => return Err(Error::CursorClosed),
                Position::Finished => return Ok(false),
                Position::BeforeNext => {
                    self.position = Position::InResult;
                    return Ok(true);
                }
                Position::InResult => {
                    self.pull().await?;
                }
            }
        }
    }

    /// Stop reading and release the cursor, the statement and an owned
    /// connection. Safe to call more than once.
    pub async fn close(&mut self) -> Result<()> {
        if self.position == Position::Closed {
            return Ok(());
        }
        self.closing.store(true, Ordering::Release);
        let mut failure = None;
        while let Some(event) = self.events.next().await {
            if let Err(e) = event {
                failure.get_or_insert(e);
            }
        }
        self.position = Position::Closed;
        failure.map_or(Ok(()), Err)
    }

    pub fn is_closed(&self) -> bool {
        self.position == Position::Closed
    }
}

fn events<'c, C>(
    mut slot: ConnSlot<'c, C>,
    statement: Statement,
    closing: Arc<AtomicBool>,
) -> impl Stream<Item = Result<Event>> + Send + 'c
where
    C: Connection + 'c,
{
    stream! {
        let mut failure: Option<Error> = None;
        let conn = slot.get_mut();

        match conn.open_cursor(&statement).await {
            Ok(mut cursor) => {
                yield Ok(Event::Opened);

                'results: loop {
                    while !closing.load(Ordering::Acquire) {
                        match cursor.fetch().await {
                            Ok(Some(values)) => match Row::new(cursor.columns(), values) {
                                Ok(row) => {
                                    yield Ok(Event::Row(row));
                                }
                                Err(e) => {
                                    failure = Some(e);
                                    break 'results;
                                }
                            },
                            Ok(None) => break,
                            Err(e) => {
                                failure = Some(e.classify());
                                break 'results;
                            }
                        }
                    }
                    if closing.load(Ordering::Acquire) {
                        break;
                    }
                    match cursor.next_result().await {
                        Ok(true) => {
                            yield Ok(Event::NextResult);
                        }
                        Ok(false) => break,
                        Err(e) => {
                            failure = Some(e.classify());
                            break;
                        }
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
