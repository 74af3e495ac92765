//! MySQL raw cursor over a streamed query result

use std::sync::Arc;

use async_trait::async_trait;
use mysql_async::{BinaryProtocol, QueryResult};

use crate::error::{Error, Result};
use crate::traits::{Column, RawCursor};
use crate::value::Value;

use super::connection::from_mysql;
use super::types::row_values;

/// Rows of a statement executed with `exec_iter`, read one at a time.
pub(crate) struct MySqlCursor<'a> {
    result: Option<QueryResult<'a, 'static, BinaryProtocol>>,
    columns: Arc<[Column]>,
    // current result set fully read
    done: bool,
}

fn columns_of(result: &QueryResult<'_, 'static, BinaryProtocol>) -> Arc<[Column]> {
    result
        .columns()
        .map(|cols| cols.iter().map(|c| Column::new(c.name_str())).collect())
        .unwrap_or_else(|| Arc::from(Vec::new()))
}

impl<'a> MySqlCursor<'a> {
    pub fn new(result: QueryResult<'a, 'static, BinaryProtocol>) -> Self {
        let columns = columns_of(&result);
        Self {
            result: Some(result),
            columns,
            done: false,
        }
    }
}

#[async_trait]
impl RawCursor for MySqlCursor<'_> {
    fn columns(&self) -> Arc<[Column]> {
        self.columns.clone()
    }

    async fn fetch(&mut self) -> Result<Option<Vec<Value>>> {
        if self.done {
            return Ok(None);
        }
        let Some(result) = self.result.as_mut() else {
            self.done = true;
            return Ok(None);
        };
        match result.next().await.map_err(from_mysql)? {
            Some(row) => {
                if self.columns.len() != row.len() {
                    self.columns = row
                        .columns_ref()
                        .iter()
                        .map(|c| Column::new(c.name_str()))
                        .collect();
                }
                Ok(Some(row_values(&row)?))
            }
            None => {
                self.done = true;
                Ok(None)
            }
        }
    }

    async fn next_result(&mut self) -> Result<bool> {
        while !self.done {
            self.fetch().await?;
        }
        let Some(result) = self.result.as_mut() else {
            return Ok(false);
        };
        // Skip the trailing status-only results a CALL produces
        while !result.is_empty() {
            let columns = columns_of(result);
            if !columns.is_empty() {
                self.columns = columns;
                self.done = false;
                return Ok(true);
            }
            if result.next().await.map_err(from_mysql)?.is_some() {
                return Err(Error::RowDecode(
                    "row received for a result without columns".to_string(),
                ));
            }
        }
        Ok(false)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(result) = self.result.take() {
            result.drop_result().await.map_err(from_mysql)?;
        }
        self.done = true;
        Ok(())
    }
}
