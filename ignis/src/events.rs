//! Database event notifications.
//!
//! Events arrive over a second socket. The server hands out its listening
//! port through an auxiliary connect; the client dials it, queues interest
//! in named events with their last seen counts, and receives one
//! notification per queue request. The first notification merely reports
//! the current counts and is swallowed as a baseline; each later one is
//! diffed against the stored counts and interest is queued again.
use std::ops::ControlFlow;

use bytes::BytesMut;
use tokio::{io::AsyncReadExt, net::TcpStream};

use crate::{
    codec::ProtocolError,
    common::verbose,
    connection::Connection,
    error::Result,
    proto::{
        backend::{peek_op, EventNotice},
        frontend::{AuxConnect, CancelEvents, QueEvents},
        op,
    },
};

const EPB_VERSION1: u8 = 1;

/// A named event with its fire count since the previous notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub name: String,
    pub count: u32,
}

/// A live subscription to named events.
#[derive(Debug)]
pub struct Events<'c> {
    conn: &'c Connection,
    socket: TcpStream,
    buf: BytesMut,
    names: Vec<String>,
    counts: Vec<u32>,
    event_id: u32,
    primed: bool,
    active: bool,
}

impl Connection {
    /// Subscribe to the named events; await notifications with
    /// [`Events::wait`].
    pub async fn listen_events(&self, names: &[&str]) -> Result<Events<'_>> {
        let resp = self.response(AuxConnect { db_handle: self.db_handle() }).await?;
        let port = aux_port(&resp.buffer)?;
        verbose!(port, "aux channel");

        let socket = TcpStream::connect((self.config().host.as_str(), port)).await?;
        socket.set_nodelay(true)?;

        let mut events = Events {
            conn: self,
            socket,
            buf: BytesMut::new(),
            names: names.iter().map(|n| n.to_string()).collect(),
            counts: vec![0; names.len()],
            event_id: 0,
            primed: false,
            active: true,
        };
        events.queue().await?;
        Ok(events)
    }
}

impl Events<'_> {
    /// Wait for the next notification; returns the events that fired with
    /// their counts.
    pub async fn wait(&mut self) -> Result<Vec<Event>> {
        loop {
            let notice = self.read_notice().await?;
            if notice.event_id != self.event_id {
                continue;
            }
            let counts = parse_counts(&notice.buffer, &self.names)?;
            let fired: Vec<Event> = self
                .names
                .iter()
                .zip(&self.counts)
                .zip(&counts)
                .filter(|((_, old), new)| new > old)
                .map(|((name, old), new)| Event { name: name.clone(), count: new - *old })
                .collect();
            self.counts = counts;
            self.queue().await?;

            // the first notification only reports where the counters stand
            if !self.primed {
                self.primed = true;
                continue;
            }
            if !fired.is_empty() {
                return Ok(fired);
            }
        }
    }

    /// Cancel the subscription and close the aux channel.
    pub async fn close(mut self) -> Result<()> {
        self.active = false;
        self.conn
            .response(CancelEvents {
                db_handle: self.conn.db_handle(),
                event_id: self.event_id,
            })
            .await?;
        Ok(())
    }

    /// Queue interest with the current counts as the new baseline. Each
    /// registration gets a fresh generation id; notifications carrying a
    /// stale one are dropped by [`wait`][Self::wait].
    async fn queue(&mut self) -> Result<()> {
        self.event_id = self.conn.next_event_id();
        let epb = build_epb(&self.names, &self.counts);
        self.conn
            .response(QueEvents {
                db_handle: self.conn.db_handle(),
                epb: &epb,
                event_id: self.event_id,
            })
            .await?;
        Ok(())
    }

    async fn read_notice(&mut self) -> Result<EventNotice> {
        loop {
            while let Some(opcode) = peek_op(&self.buf) {
                if opcode != op::DUMMY {
                    break;
                }
                let _ = self.buf.split_to(4);
            }
            if !self.buf.is_empty() {
                match EventNotice::decode(&mut self.buf)? {
                    ControlFlow::Break(notice) => return Ok(notice),
                    ControlFlow::Continue(needed) => {
                        while self.buf.len() < needed {
                            self.read_more().await?;
                        }
                        continue;
                    }
                }
            }
            self.read_more().await?;
        }
    }

    async fn read_more(&mut self) -> Result<()> {
        if self.socket.read_buf(&mut self.buf).await? == 0 {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        Ok(())
    }
}

impl Drop for Events<'_> {
    fn drop(&mut self) {
        if self.active {
            self.conn.forget(CancelEvents {
                db_handle: self.conn.db_handle(),
                event_id: self.event_id,
            });
        }
    }
}

/// Server port from the auxiliary connect reply, a raw `sockaddr_in`.
fn aux_port(buffer: &[u8]) -> Result<u16, ProtocolError> {
    let bytes = buffer
        .get(2..4)
        .ok_or_else(|| ProtocolError::new("short aux address"))?;
    Ok(u16::from_be_bytes(bytes.try_into().unwrap()))
}

/// Counted event block: version, then length prefixed name and a little
/// endian count per event. Shared by the request and the notification.
fn build_epb(names: &[String], counts: &[u32]) -> Vec<u8> {
    let mut out = vec![EPB_VERSION1];
    for (name, count) in names.iter().zip(counts) {
        out.push(name.len() as u8);
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&count.to_le_bytes());
    }
    out
}

fn parse_counts(buffer: &[u8], names: &[String]) -> Result<Vec<u32>, ProtocolError> {
    let err = || ProtocolError::new("malformed event block");
    if buffer.first() != Some(&EPB_VERSION1) {
        return Err(err());
    }
    let mut counts = vec![0u32; names.len()];
    let mut at = 1;
    while at < buffer.len() {
        let len = *buffer.get(at).ok_or_else(err)? as usize;
        let name = buffer.get(at + 1..at + 1 + len).ok_or_else(err)?;
        at += 1 + len;
        let count = buffer.get(at..at + 4).ok_or_else(err)?;
        at += 4;
        if let Some(index) = names.iter().position(|n| n.as_bytes() == name) {
            counts[index] = u32::from_le_bytes(count.try_into().unwrap());
        }
    }
    Ok(counts)
}
