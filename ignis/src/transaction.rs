//! Transactions and statement execution.
//!
//! Every statement runs under a transaction handle. [`Connection::execute`]
//! and [`Connection::query`] wrap one around a single statement; explicit
//! control goes through [`Connection::start_transaction`]. An unfinished
//! transaction rolls back when dropped.
//!
//! [`Connection::execute`]: crate::Connection::execute
//! [`Connection::query`]: crate::Connection::query
//! [`Connection::start_transaction`]: crate::Connection::start_transaction
use std::sync::Arc;

use crate::{
    codec::ProtocolError,
    connection::{Connection, Expect},
    error::{ParamCountError, Result, RowNotFound},
    fetch::RowStream,
    proto::{
        backend::Reply,
        dsql,
        frontend::{ExecImmediate, Execute, Fetch, FreeStatement, HandleOp},
        op, tpb,
    },
    row::Row,
    statement::Statement,
    types::{Column, MAX_VARYING, Value, bind_params},
};

/// Isolation profile for [`Connection::start_transaction`].
///
/// [`Connection::start_transaction`]: crate::Connection::start_transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Stable view of the database as of transaction start.
    #[default]
    Snapshot,
    /// Snapshot that also locks out concurrent writers table wide.
    Consistency,
    /// Sees committed changes of concurrent transactions; reads the latest
    /// committed record version instead of waiting.
    ReadCommitted,
    /// Read committed that waits out concurrent updates.
    ReadCommittedNoRecordVersion,
    /// Read only read committed; the server can serve it without write
    /// locks.
    ReadOnlyReadCommitted,
}

impl IsolationLevel {
    /// Transaction parameter block for this profile.
    pub(crate) fn tpb(&self) -> Vec<u8> {
        let mut out = vec![tpb::VERSION3];
        match self {
            Self::Snapshot => out.extend([tpb::WRITE, tpb::WAIT, tpb::CONCURRENCY]),
            Self::Consistency => out.extend([tpb::WRITE, tpb::WAIT, tpb::CONSISTENCY]),
            Self::ReadCommitted => {
                out.extend([tpb::WRITE, tpb::WAIT, tpb::READ_COMMITTED, tpb::REC_VERSION])
            }
            Self::ReadCommittedNoRecordVersion => out.extend([
                tpb::WRITE,
                tpb::WAIT,
                tpb::READ_COMMITTED,
                tpb::NO_REC_VERSION,
            ]),
            Self::ReadOnlyReadCommitted => {
                out.extend([tpb::READ, tpb::WAIT, tpb::READ_COMMITTED, tpb::REC_VERSION])
            }
        }
        out
    }
}

/// An open transaction.
#[derive(Debug)]
pub struct Transaction<'c> {
    conn: &'c Connection,
    handle: i32,
    open: bool,
}

impl<'c> Transaction<'c> {
    pub(crate) fn new(conn: &'c Connection, handle: i32) -> Self {
        Self { conn, handle, open: true }
    }

    pub(crate) fn conn(&self) -> &'c Connection {
        self.conn
    }

    pub(crate) fn handle(&self) -> i32 {
        self.handle
    }

    /// Execute a statement; returns the inline row of an
    /// `EXECUTE PROCEDURE`, otherwise `None`.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        let stmt = self.conn.prepare(self.handle, sql).await?;
        check_params(&stmt, params.len())?;
        let params = self.stage(params).await?;
        let (blr, data) = bind_params(&params, self.conn.protocol_version());

        if stmt.stmt_type.singleton() && !stmt.columns.is_empty() {
            let out_blr = stmt.row_blr();
            let reply = self
                .conn
                .request(
                    Expect::Sql { format: stmt.row_format() },
                    Execute {
                        stmt_handle: stmt.handle,
                        tr_handle: self.handle,
                        blr: &blr,
                        data: &data,
                        out_blr: Some(out_blr.as_ref()),
                    },
                )
                .await?;
            let Reply::Sql(resp) = reply else {
                return Err(ProtocolError::new("expected sql response").into());
            };
            let columns: Arc<[Column]> = stmt.columns.into();
            return Ok(resp.row.map(|values| Row::new(columns, values)));
        }

        self.conn
            .response(Execute {
                stmt_handle: stmt.handle,
                tr_handle: self.handle,
                blr: &blr,
                data: &data,
                out_blr: None,
            })
            .await?;
        Ok(None)
    }

    /// Execute a cursor statement and fetch every row.
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let stmt = self.conn.prepare(self.handle, sql).await?;
        if !stmt.stmt_type.has_cursor() {
            return Ok(self.execute(sql, params).await?.into_iter().collect());
        }
        check_params(&stmt, params.len())?;
        let params = self.stage(params).await?;
        let (blr, data) = bind_params(&params, self.conn.protocol_version());

        self.conn
            .response(Execute {
                stmt_handle: stmt.handle,
                tr_handle: self.handle,
                blr: &blr,
                data: &data,
                out_blr: None,
            })
            .await?;

        let format = stmt.row_format();
        let fetch_blr = stmt.row_blr();
        let columns: Arc<[Column]> = stmt.columns.into();
        let mut rows = Vec::new();
        loop {
            let reply = self
                .conn
                .request(
                    Expect::Fetch { format: format.clone() },
                    Fetch { stmt_handle: stmt.handle, blr: &fetch_blr },
                )
                .await?;
            let Reply::Rows(batch) = reply else {
                return Err(ProtocolError::new("expected fetch response").into());
            };
            rows.extend(
                batch
                    .rows
                    .into_iter()
                    .map(|values| Row::new(columns.clone(), values)),
            );
            if !batch.more {
                break;
            }
        }
        // deferred close, the reply is uninteresting
        self.conn
            .forget(FreeStatement { stmt_handle: stmt.handle, mode: dsql::CLOSE });

        if self.conn.config().eager_blobs {
            self.materialize(&mut rows).await?;
        }
        Ok(rows)
    }

    /// Stream the rows of a cursor statement batch by batch instead of
    /// collecting them.
    pub async fn query_stream(&self, sql: &str, params: &[Value]) -> Result<RowStream<'c>> {
        let stmt = self.conn.prepare(self.handle, sql).await?;
        check_params(&stmt, params.len())?;
        if !stmt.stmt_type.has_cursor() {
            let row = self.execute(sql, params).await?;
            return Ok(RowStream::ready(self.conn, row));
        }
        let params = self.stage(params).await?;
        let (blr, data) = bind_params(&params, self.conn.protocol_version());

        self.conn
            .response(Execute {
                stmt_handle: stmt.handle,
                tr_handle: self.handle,
                blr: &blr,
                data: &data,
                out_blr: None,
            })
            .await?;
        Ok(RowStream::open(self.conn, stmt))
    }

    /// Like [`query`][Self::query], expecting exactly one row.
    pub async fn query_one(&self, sql: &str, params: &[Value]) -> Result<Row> {
        let mut rows = self.query(sql, params).await?;
        match rows.len() {
            0 => Err(RowNotFound.into()),
            _ => Ok(rows.swap_remove(0)),
        }
    }

    /// Run a statement without preparing it; no parameters, no rows back.
    pub async fn exec_immediate(&self, sql: &str) -> Result<()> {
        self.conn
            .response(ExecImmediate { tr_handle: self.handle, sql })
            .await?;
        Ok(())
    }

    /// Replace blob ids in fetched rows with their content.
    async fn materialize(&self, rows: &mut [Row]) -> Result<()> {
        for row in rows {
            let columns = row.columns().to_vec();
            for (value, column) in row.values_mut().iter_mut().zip(&columns) {
                let Value::Blob(id) = *value else { continue };
                let data = self.read_blob(id).await?;
                // blob subtype 1 is text
                *value = match column.subtype {
                    1 => Value::Text(std::str::from_utf8(&data)?.to_string()),
                    _ => Value::Bytes(data),
                };
            }
        }
        Ok(())
    }

    /// Byte parameters and text past the VARYING cap are carried as blobs;
    /// stage them before binding.
    async fn stage(&self, params: &[Value]) -> Result<Vec<Value>> {
        let mut out = Vec::with_capacity(params.len());
        for param in params {
            match staged_bytes(param) {
                Some(bytes) => out.push(Value::Blob(self.create_blob(bytes).await?)),
                None => out.push(param.clone()),
            }
        }
        Ok(out)
    }

    pub async fn commit(mut self) -> Result<()> {
        self.open = false;
        self.conn
            .response(HandleOp { op: op::COMMIT, handle: self.handle })
            .await?;
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<()> {
        self.open = false;
        self.conn
            .response(HandleOp { op: op::ROLLBACK, handle: self.handle })
            .await?;
        Ok(())
    }

    /// Commit while keeping the transaction handle and its snapshot context.
    pub async fn commit_retaining(&self) -> Result<()> {
        self.conn
            .response(HandleOp { op: op::COMMIT_RETAINING, handle: self.handle })
            .await?;
        Ok(())
    }

    pub async fn rollback_retaining(&self) -> Result<()> {
        self.conn
            .response(HandleOp { op: op::ROLLBACK_RETAINING, handle: self.handle })
            .await?;
        Ok(())
    }
}

/// Payload to write as a blob, `None` when the value binds inline.
fn staged_bytes(value: &Value) -> Option<&[u8]> {
    match value {
        Value::Bytes(bytes) => Some(bytes),
        Value::Text(s) if s.len() > MAX_VARYING => Some(s.as_bytes()),
        _ => None,
    }
}

/// Local mismatch check; nothing reaches the wire when it fails, so the
/// reply queue stays aligned.
fn check_params(stmt: &Statement, given: usize) -> Result<()> {
    let expected = stmt.param_count();
    if expected != given {
        return Err(ParamCountError { expected, given }.into());
    }
    Ok(())
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.open {
            self.conn
                .forget(HandleOp { op: op::ROLLBACK, handle: self.handle });
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn isolation_parameter_blocks() {
        assert_eq!(
            IsolationLevel::Snapshot.tpb(),
            [tpb::VERSION3, tpb::WRITE, tpb::WAIT, tpb::CONCURRENCY],
        );
        assert_eq!(
            IsolationLevel::ReadCommitted.tpb(),
            [tpb::VERSION3, tpb::WRITE, tpb::WAIT, tpb::READ_COMMITTED, tpb::REC_VERSION],
        );
        assert_eq!(
            IsolationLevel::ReadOnlyReadCommitted.tpb(),
            [tpb::VERSION3, tpb::READ, tpb::WAIT, tpb::READ_COMMITTED, tpb::REC_VERSION],
        );
    }

    #[test]
    fn oversized_text_goes_through_blobs() {
        assert_eq!(staged_bytes(&Value::Text("inline".into())), None);
        assert_eq!(staged_bytes(&Value::Text("x".repeat(MAX_VARYING))), None);
        let big = "x".repeat(MAX_VARYING + 1);
        assert_eq!(staged_bytes(&Value::Text(big.clone())), Some(big.as_bytes()));
        assert_eq!(staged_bytes(&Value::Bytes(vec![1])), Some(&[1u8][..]));
        assert_eq!(staged_bytes(&Value::Int(1)), None);
    }
}
