//! Server status vectors.
//!
//! Every generic response trails a status vector: a sequence of
//! `(kind, payload)` pairs ended by a zero kind. Error codes reference
//! message templates with `@N` placeholders filled from the arguments that
//! follow the code.
use crate::{codec::Incomplete, proto::arg, wire::xdr::XdrReader};

/// An error reported by the server, assembled from a status vector.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ServerError {
    /// First error code in the vector.
    pub gds_code: u32,
    /// SQL error code, when the vector carried one.
    pub sql_code: Option<i32>,
    /// SQLSTATE, when the vector carried one.
    pub sql_state: Option<String>,
    /// Human readable message, one line per vector entry.
    pub message: String,
}

#[derive(Debug)]
enum Entry {
    Gds(u32),
    Str(String),
    Num(i32),
    Interpreted(String),
}

/// Marks the next numeric argument as the SQL error code.
const GDS_SQLERR: u32 = 335_544_436;

/// Decode a status vector. `None` when it reports success.
pub fn decode_status(r: &mut XdrReader<'_>) -> Result<Option<ServerError>, Incomplete> {
    let mut entries = Vec::new();
    let mut sql_state = None;
    loop {
        match r.get_u32()? {
            arg::END => break,
            arg::GDS | arg::WARNING => {
                let code = r.get_u32()?;
                if code != 0 {
                    entries.push(Entry::Gds(code));
                }
            }
            arg::NUMBER => entries.push(Entry::Num(r.get_i32()?)),
            arg::STRING => entries.push(Entry::Str(read_str(r)?)),
            arg::INTERPRETED => entries.push(Entry::Interpreted(read_str(r)?)),
            arg::SQL_STATE => sql_state = Some(read_str(r)?),
            // unknown kinds carry a single word payload
            _ => {
                r.get_u32()?;
            }
        }
    }
    Ok(assemble(entries, sql_state))
}

fn read_str(r: &mut XdrReader<'_>) -> Result<String, Incomplete> {
    Ok(String::from_utf8_lossy(r.get_buffer()?).into_owned())
}

fn assemble(entries: Vec<Entry>, sql_state: Option<String>) -> Option<ServerError> {
    let mut gds_code = 0;
    let mut sql_code = None;
    let mut lines: Vec<String> = Vec::new();

    let mut iter = entries.into_iter().peekable();
    while let Some(entry) = iter.next() {
        match entry {
            Entry::Gds(code) => {
                if gds_code == 0 {
                    gds_code = code;
                }
                // the code is captured and its line still rendered
                if code == GDS_SQLERR {
                    if let Some(Entry::Num(n)) = iter.peek() {
                        sql_code = Some(*n);
                    }
                }
                // following strings and numbers are this code's arguments
                let mut args = Vec::new();
                while let Some(Entry::Str(_) | Entry::Num(_)) = iter.peek() {
                    args.push(match iter.next() {
                        Some(Entry::Str(s)) => s,
                        Some(Entry::Num(n)) => n.to_string(),
                        _ => unreachable!(),
                    });
                }
                lines.push(render(code, &args));
            }
            Entry::Interpreted(s) => lines.push(s),
            Entry::Str(s) => lines.push(s),
            Entry::Num(n) => lines.push(n.to_string()),
        }
    }

    if gds_code == 0 && lines.is_empty() {
        return None;
    }
    Some(ServerError { gds_code, sql_code, sql_state, message: lines.join("\n") })
}

/// Fill a message template, `@N` standing for the N-th argument.
fn render(code: u32, args: &[String]) -> String {
    let Some(template) = template(code) else {
        return match args {
            [] => format!("error code {code}"),
            _ => format!("error code {code}: {}", args.join(", ")),
        };
    };
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '@' {
            if let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                chars.next();
                match args.get(d as usize - 1) {
                    Some(arg) => out.push_str(arg),
                    None => out.push_str("<missing>"),
                }
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Templates for the codes a remote client most often sees.
fn template(code: u32) -> Option<&'static str> {
    Some(match code {
        335544321 => "arithmetic exception, numeric overflow, or string truncation",
        335544324 => "invalid database handle (no active connection)",
        335544332 => "invalid transaction handle (expecting explicit transaction start)",
        335544336 => "deadlock",
        335544342 => "action cancelled by trigger (@1) to preserve data integrity",
        335544344 => "I/O error during \"@1\" operation for file \"@2\"",
        335544345 => "lock conflict on no wait transaction",
        335544347 => "validation error for column @1, value \"@2\"",
        335544349 => {
            "attempt to store duplicate value (visible to active transactions) in unique index \"@1\""
        }
        335544351 => "unsuccessful metadata update",
        335544352 => "no permission for @1 access to @2 @3",
        335544374 => "attempt to fetch past the last record in a record stream",
        335544379 => "unsupported on-disk structure for file @1; found @2.@3, support @4.@5",
        335544382 => "@1",
        335544436 => "SQL error code = @1",
        335544451 => "update conflicts with concurrent update",
        335544466 => "violation of FOREIGN KEY constraint \"@1\" on table \"@2\"",
        335544472 => {
            "Your user name and password are not defined. \
             Ask your database administrator to set up a Firebird login."
        }
        335544517 => "exception @1",
        335544558 => "Operation violates CHECK constraint @1 on view or table @2",
        335544569 => "Dynamic SQL Error",
        335544570 => "Invalid command",
        335544573 => "Data type unknown",
        335544578 => "Column unknown",
        335544580 => "Table unknown",
        335544581 => "Procedure unknown",
        335544604 => "SQLDA error",
        335544606 => "expression evaluation not supported",
        335544665 => "violation of PRIMARY or UNIQUE KEY constraint \"@1\" on table \"@2\"",
        335544721 => "Unable to complete network request to host \"@1\".",
        335544727 => "Error reading data from the connection.",
        335544728 => "Error writing data to the connection.",
        335544834 => "Cursor is not open",
        335544838 => "Foreign key reference target does not exist",
        335544856 => "connection shutdown",
        335544878 => "concurrent transaction number is @1",
        335545026 => "Statement timeout expired.",
        _ => return None,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::xdr::XdrWriter;
    use bytes::BytesMut;

    fn vector(build: impl FnOnce(&mut XdrWriter<'_>)) -> Option<ServerError> {
        let mut buf = BytesMut::new();
        let mut w = XdrWriter::new(&mut buf);
        build(&mut w);
        w.put_u32(arg::END);
        decode_status(&mut XdrReader::new(&buf)).unwrap()
    }

    #[test]
    fn success_is_none() {
        assert_eq!(vector(|_| {}), None);
        // a zero code also reports success
        assert_eq!(
            vector(|w| {
                w.put_u32(arg::GDS);
                w.put_u32(0);
            }),
            None,
        );
    }

    #[test]
    fn substitutes_arguments() {
        let err = vector(|w| {
            w.put_u32(arg::GDS);
            w.put_u32(335544665);
            w.put_u32(arg::STRING);
            w.put_string("PK_T");
            w.put_u32(arg::STRING);
            w.put_string("T");
        })
        .unwrap();
        assert_eq!(err.gds_code, 335544665);
        assert_eq!(
            err.message,
            "violation of PRIMARY or UNIQUE KEY constraint \"PK_T\" on table \"T\"",
        );
    }

    #[test]
    fn captures_sql_code_and_state() {
        let err = vector(|w| {
            w.put_u32(arg::GDS);
            w.put_u32(335544569);
            w.put_u32(arg::GDS);
            w.put_u32(335544436);
            w.put_u32(arg::NUMBER);
            w.put_i32(-104);
            w.put_u32(arg::SQL_STATE);
            w.put_string("42000");
        })
        .unwrap();
        assert_eq!(err.gds_code, 335544569);
        assert_eq!(err.sql_code, Some(-104));
        assert_eq!(err.sql_state.as_deref(), Some("42000"));
        assert_eq!(err.message, "Dynamic SQL Error\nSQL error code = -104");
    }

    #[test]
    fn unknown_code_still_renders() {
        let err = vector(|w| {
            w.put_u32(arg::GDS);
            w.put_u32(999);
            w.put_u32(arg::STRING);
            w.put_string("detail");
        })
        .unwrap();
        assert_eq!(err.message, "error code 999: detail");
    }

    #[test]
    fn truncated_vector_is_incomplete() {
        let mut buf = BytesMut::new();
        let mut w = XdrWriter::new(&mut buf);
        w.put_u32(arg::GDS);
        let got = decode_status(&mut XdrReader::new(&buf));
        assert_eq!(got, Err(Incomplete { needed: 8 }));
    }
}
