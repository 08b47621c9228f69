//! Reply pairing engine.
//!
//! The wire has no request ids: replies arrive in request order. Every
//! request that expects a reply pushes a descriptor into a FIFO; arriving
//! bytes are decoded under the front descriptor and the result is delivered
//! through its channel. Requests whose deferred replies carry nothing useful
//! push a descriptor with no channel and are dropped on arrival.
use std::{collections::VecDeque, ops::ControlFlow};

use bytes::{Buf, Bytes, BytesMut};
use tokio::sync::oneshot;

use crate::{
    codec::ProtocolError,
    common::verbose,
    error::{ClosedError, Error},
    proto::{
        backend::{peek_op, FetchDecoder, GenericResponse, Reply, SqlResponse},
        op,
    },
    types::SqlType,
};

/// What kind of reply the front request is owed.
#[derive(Debug)]
pub enum Expect {
    /// A generic response.
    Response,
    /// A generic response nobody cares about, deferred under lazy delivery.
    Discard,
    /// A singleton row response.
    Sql { format: Vec<SqlType> },
    /// A row batch.
    Fetch { format: Vec<SqlType> },
}

#[derive(Debug)]
pub struct Pending {
    expect: Expect,
    tx: Option<oneshot::Sender<Result<Reply, Error>>>,
    /// Encoded request, kept for replay after a reconnect.
    frame: Bytes,
}

#[derive(Debug)]
pub struct Engine {
    version: u16,
    queue: VecDeque<Pending>,
    /// Fetch decode in flight; holds its progress between arrivals.
    current: Option<FetchDecoder>,
}

impl Engine {
    pub fn new(version: u16) -> Self {
        Self { version, queue: VecDeque::new(), current: None }
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.current.is_none()
    }

    /// Register an expected reply, paired to the request `frame`.
    pub fn submit(&mut self, expect: Expect, frame: Bytes) -> oneshot::Receiver<Result<Reply, Error>> {
        let (tx, rx) = oneshot::channel();
        self.submit_with(expect, frame, tx);
        rx
    }

    /// Like [`submit`][Engine::submit] with a caller provided channel.
    pub fn submit_with(
        &mut self,
        expect: Expect,
        frame: Bytes,
        tx: oneshot::Sender<Result<Reply, Error>>,
    ) {
        self.queue.push_back(Pending { expect, tx: Some(tx), frame });
    }

    /// Adopt the version of a renegotiated session.
    pub fn set_version(&mut self, version: u16) {
        self.version = version;
        self.current = None;
    }

    /// Register a reply that will be dropped on arrival.
    pub fn submit_discard(&mut self, frame: Bytes) {
        self.queue.push_back(Pending { expect: Expect::Discard, tx: None, frame });
    }

    /// Decode as many complete replies as the buffer holds, delivering each
    /// to its descriptor. Leftover bytes stay buffered for the next call;
    /// a decode that needs more input consumes nothing.
    pub fn feed(&mut self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        loop {
            let Some(opcode) = peek_op(buf) else { return Ok(()) };
            if opcode == op::DUMMY {
                buf.advance(4);
                continue;
            }
            let Some(front) = self.queue.front() else {
                return Err(ProtocolError::new(format!(
                    "unsolicited message, opcode {opcode}",
                )));
            };
            verbose!(opcode, expect = ?front.expect, buffered = buf.len(), "feed");
            // a generic response in place of rows reports an error
            enum Plan {
                Generic,
                Fetch(Vec<SqlType>),
                Sql(Vec<SqlType>),
            }
            let plan = match (&front.expect, opcode) {
                (_, op::RESPONSE) => Plan::Generic,
                (Expect::Fetch { format }, op::FETCH_RESPONSE) => Plan::Fetch(format.clone()),
                (Expect::Sql { format }, op::SQL_RESPONSE) => Plan::Sql(format.clone()),
                (expect, opcode) => {
                    return Err(ProtocolError::new(format!(
                        "expected {expect:?}, got opcode {opcode}",
                    )));
                }
            };
            match plan {
                Plan::Generic => {
                    let resp = match GenericResponse::decode(buf)? {
                        ControlFlow::Continue(_) => return Ok(()),
                        ControlFlow::Break(resp) => resp,
                    };
                    self.current = None;
                    self.deliver(match resp.ok() {
                        Ok(resp) => Ok(Reply::Generic(resp)),
                        Err(err) => Err(err.into()),
                    });
                }
                Plan::Fetch(format) => {
                    let version = self.version;
                    let dec = self
                        .current
                        .get_or_insert_with(|| FetchDecoder::new(format, version));
                    match dec.decode(buf)? {
                        ControlFlow::Continue(_) => return Ok(()),
                        ControlFlow::Break(batch) => {
                            self.current = None;
                            self.deliver(Ok(Reply::Rows(batch)));
                        }
                    }
                }
                Plan::Sql(format) => {
                    match SqlResponse::decode(buf, &format, self.version)? {
                        ControlFlow::Continue(_) => return Ok(()),
                        ControlFlow::Break(resp) => self.deliver(Ok(Reply::Sql(resp))),
                    }
                }
            }
        }
    }

    fn deliver(&mut self, reply: Result<Reply, Error>) {
        if let Some(front) = self.queue.pop_front() {
            if let Some(tx) = front.tx {
                let _ = tx.send(reply);
            }
        }
    }

    /// Request frames still awaiting replies, oldest first. Replayed
    /// verbatim after a re-handshake.
    pub fn pending_frames(&self) -> impl Iterator<Item = &Bytes> {
        self.queue.iter().map(|p| &p.frame)
    }

    /// Fail every outstanding descriptor; the engine is unusable afterwards.
    pub fn close(&mut self) {
        self.current = None;
        while let Some(pending) = self.queue.pop_front() {
            if let Some(tx) = pending.tx {
                let _ = tx.send(Err(ClosedError.into()));
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        proto::{arg, proto, FETCH_NO_MORE_ROWS},
        types::Value,
        wire::xdr::XdrWriter,
    };

    fn generic(handle: i32) -> BytesMut {
        let mut buf = BytesMut::new();
        let mut w = XdrWriter::new(&mut buf);
        w.put_u32(op::RESPONSE);
        w.put_i32(handle);
        w.put_quad(0, 0);
        w.put_bytes(&[]);
        w.put_u32(arg::END);
        buf
    }

    fn expect_generic(rx: &mut oneshot::Receiver<Result<Reply, Error>>) -> GenericResponse {
        match rx.try_recv().unwrap().unwrap() {
            Reply::Generic(resp) => resp,
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[test]
    fn replies_pair_in_fifo_order_under_fragmentation() {
        let mut engine = Engine::new(proto::VERSION13);
        let mut rx1 = engine.submit(Expect::Response, Bytes::new());
        let mut rx2 = engine.submit(Expect::Response, Bytes::new());

        let mut stream = generic(1);
        stream.extend_from_slice(&generic(2));

        let mut buf = BytesMut::new();
        for byte in stream.iter() {
            buf.extend_from_slice(&[*byte]);
            engine.feed(&mut buf).unwrap();
        }
        assert_eq!(expect_generic(&mut rx1).handle, 1);
        assert_eq!(expect_generic(&mut rx2).handle, 2);
        assert!(engine.is_idle());
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_feed_is_idempotent() {
        let mut engine = Engine::new(proto::VERSION13);
        let mut rx = engine.submit(Expect::Response, Bytes::new());

        let full = generic(9);
        let mut buf = BytesMut::from(&full[..7]);
        engine.feed(&mut buf).unwrap();
        engine.feed(&mut buf).unwrap();
        // nothing consumed, nothing delivered
        assert_eq!(&buf[..], &full[..7]);
        assert!(rx.try_recv().is_err());

        buf.extend_from_slice(&full[7..]);
        engine.feed(&mut buf).unwrap();
        assert_eq!(expect_generic(&mut rx).handle, 9);
    }

    #[test]
    fn dummy_packets_are_skipped() {
        let mut engine = Engine::new(proto::VERSION13);
        let mut rx = engine.submit(Expect::Response, Bytes::new());

        let mut buf = BytesMut::new();
        XdrWriter::new(&mut buf).put_u32(op::DUMMY);
        buf.extend_from_slice(&generic(4));
        engine.feed(&mut buf).unwrap();
        assert_eq!(expect_generic(&mut rx).handle, 4);
    }

    #[test]
    fn discard_swallows_deferred_response() {
        let mut engine = Engine::new(proto::VERSION13);
        engine.submit_discard(Bytes::new());
        let mut rx = engine.submit(Expect::Response, Bytes::new());

        let mut buf = generic(0);
        buf.extend_from_slice(&generic(5));
        engine.feed(&mut buf).unwrap();
        assert_eq!(expect_generic(&mut rx).handle, 5);
        assert!(engine.is_idle());
    }

    #[test]
    fn unsolicited_message_is_fatal() {
        let mut engine = Engine::new(proto::VERSION13);
        let mut buf = generic(1);
        assert!(engine.feed(&mut buf).is_err());
    }

    #[test]
    fn fetch_delivers_rows_and_survives_splits() {
        let mut engine = Engine::new(proto::VERSION13);
        let format = vec![SqlType::Long { scale: 0 }, SqlType::Long { scale: 0 }];
        let mut rx = engine.submit(Expect::Fetch { format }, Bytes::new());

        let mut stream = BytesMut::new();
        {
            let mut w = XdrWriter::new(&mut stream);
            for (a, b) in [(1, 2), (3, 4), (5, 6)] {
                w.put_u32(op::FETCH_RESPONSE);
                w.put_u32(0);
                w.put_u32(1);
                w.put_text(&[0]);
                w.put_i32(a);
                w.put_i32(b);
            }
            w.put_u32(op::FETCH_RESPONSE);
            w.put_u32(FETCH_NO_MORE_ROWS);
            w.put_u32(0);
        }

        // split mid row
        let mut buf = BytesMut::from(&stream[..30]);
        engine.feed(&mut buf).unwrap();
        assert!(rx.try_recv().is_err());
        buf.extend_from_slice(&stream[30..]);
        engine.feed(&mut buf).unwrap();

        match rx.try_recv().unwrap().unwrap() {
            Reply::Rows(batch) => {
                assert_eq!(batch.rows.len(), 3);
                assert_eq!(batch.rows[2], vec![Value::Int(5), Value::Int(6)]);
                assert!(!batch.more);
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[test]
    fn error_response_resolves_fetch_descriptor() {
        let mut engine = Engine::new(proto::VERSION13);
        let format = vec![SqlType::Long { scale: 0 }];
        let mut rx = engine.submit(Expect::Fetch { format }, Bytes::new());

        let mut buf = BytesMut::new();
        let mut w = XdrWriter::new(&mut buf);
        w.put_u32(op::RESPONSE);
        w.put_i32(0);
        w.put_quad(0, 0);
        w.put_bytes(&[]);
        w.put_u32(arg::GDS);
        w.put_u32(335544569);
        w.put_u32(arg::END);
        engine.feed(&mut buf).unwrap();

        let err = rx.try_recv().unwrap().unwrap_err();
        assert_eq!(err.as_server().unwrap().gds_code, 335544569);
    }

    #[test]
    fn close_fails_all_pending() {
        let mut engine = Engine::new(proto::VERSION13);
        let mut rx1 = engine.submit(Expect::Response, Bytes::new());
        let mut rx2 = engine.submit(Expect::Response, Bytes::new());
        engine.close();
        assert!(rx1.try_recv().unwrap().is_err());
        assert!(rx2.try_recv().unwrap().is_err());
    }

    #[test]
    fn pending_frames_keep_request_order() {
        let mut engine = Engine::new(proto::VERSION13);
        let _rx1 = engine.submit(Expect::Response, Bytes::from_static(b"one"));
        engine.submit_discard(Bytes::from_static(b"two"));
        let frames: Vec<_> = engine.pending_frames().collect();
        assert_eq!(frames, [&Bytes::from_static(b"one"), &Bytes::from_static(b"two")]);
    }
}
