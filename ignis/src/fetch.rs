//! Lazy row streaming over an open cursor.
use std::{
    collections::VecDeque,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use bytes::BytesMut;
use futures_core::Stream;
use tokio::sync::oneshot;

use crate::{
    codec::ProtocolError,
    connection::{Connection, Expect},
    error::{ClosedError, Error, Result},
    proto::{
        backend::Reply,
        dsql,
        frontend::{Fetch, FreeStatement},
    },
    row::Row,
    statement::Statement,
    types::{Column, SqlType, Value},
};

/// Rows of a cursor, fetched batch by batch as the stream is polled.
///
/// Dropping the stream early closes the cursor.
pub struct RowStream<'c> {
    conn: &'c Connection,
    stmt_handle: i32,
    columns: Arc<[Column]>,
    format: Vec<SqlType>,
    blr: BytesMut,
    buffered: VecDeque<Vec<Value>>,
    pending: Option<oneshot::Receiver<Result<Reply, Error>>>,
    more: bool,
    done: bool,
}

impl<'c> RowStream<'c> {
    /// Stream over an executed cursor statement.
    pub(crate) fn open(conn: &'c Connection, stmt: Statement) -> Self {
        Self {
            conn,
            stmt_handle: stmt.handle,
            format: stmt.row_format(),
            blr: stmt.row_blr(),
            columns: stmt.columns.into(),
            buffered: VecDeque::new(),
            pending: None,
            more: true,
            done: false,
        }
    }

    /// Degenerate stream for statements without a cursor: at most the
    /// inline row.
    pub(crate) fn ready(conn: &'c Connection, row: Option<Row>) -> Self {
        let (columns, buffered) = match row {
            Some(row) => (
                row.columns().to_vec().into(),
                VecDeque::from([row.into_values()]),
            ),
            None => (Vec::new().into(), VecDeque::new()),
        };
        Self {
            conn,
            stmt_handle: 0,
            columns,
            format: Vec::new(),
            blr: BytesMut::new(),
            buffered,
            pending: None,
            more: false,
            done: true,
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }
}

impl Stream for RowStream<'_> {
    type Item = Result<Row>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(values) = this.buffered.pop_front() {
                return Poll::Ready(Some(Ok(Row::new(this.columns.clone(), values))));
            }
            if this.done {
                return Poll::Ready(None);
            }
            if !this.more {
                this.done = true;
                this.conn.forget(FreeStatement {
                    stmt_handle: this.stmt_handle,
                    mode: dsql::CLOSE,
                });
                return Poll::Ready(None);
            }
            if this.pending.is_none() {
                let rx = this.conn.submit(
                    Expect::Fetch { format: this.format.clone() },
                    Fetch { stmt_handle: this.stmt_handle, blr: &this.blr },
                );
                match rx {
                    Ok(rx) => this.pending = Some(rx),
                    Err(err) => {
                        this.done = true;
                        return Poll::Ready(Some(Err(err)));
                    }
                }
            }
            let rx = this.pending.as_mut().unwrap();
            match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(Ok(Reply::Rows(batch)))) => {
                    this.pending = None;
                    this.more = batch.more;
                    this.buffered.extend(batch.rows);
                }
                Poll::Ready(Ok(Ok(_))) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(
                        ProtocolError::new("expected fetch response").into(),
                    )));
                }
                Poll::Ready(Ok(Err(err))) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(Err(_)) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(ClosedError.into())));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Drop for RowStream<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.conn.forget(FreeStatement {
                stmt_handle: self.stmt_handle,
                mode: dsql::CLOSE,
            });
        }
    }
}
