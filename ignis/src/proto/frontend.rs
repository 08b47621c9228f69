//! Request messages, client to server.
//!
//! Every message is an opcode word followed by record format fields. Encoders
//! append to the write buffer; nothing here flushes.
use bytes::BytesMut;

use crate::{
    codec::ProtocolEncode,
    proto::{dpb, op, proto},
    wire::{blr::BlrWriter, xdr::XdrWriter},
};

/// SQL dialect spoken on every statement operation.
pub const SQL_DIALECT: u32 = 3;

/// Rows requested per fetch round trip.
pub const FETCH_BATCH: u32 = 400;

/// Read buffer offered for one blob segment round trip.
const SEGMENT_BUFFER: u32 = 65535;

fn writer(buf: &mut BytesMut) -> XdrWriter<'_> {
    XdrWriter::new(buf)
}

/// Protocol versions offered during negotiation, newest preferred.
pub const CANDIDATES: [u16; 4] = [
    proto::VERSION13,
    proto::VERSION12,
    proto::VERSION11,
    proto::VERSION10,
];

/// Opening handshake message.
///
/// Offers every supported protocol version; the identification block carries
/// the login and the authentication plugin data.
pub struct Connect<'a> {
    pub database: &'a str,
    pub uid: &'a [u8],
}

impl ProtocolEncode for Connect<'_> {
    fn encode(self, buf: &mut BytesMut) {
        let mut w = writer(buf);
        w.put_u32(op::CONNECT);
        w.put_u32(op::ATTACH);
        w.put_u32(proto::CONNECT_VERSION3);
        w.put_u32(proto::ARCH_GENERIC);
        w.put_string(self.database);
        w.put_u32(CANDIDATES.len() as u32);
        w.put_bytes(self.uid);
        for (i, version) in CANDIDATES.iter().enumerate() {
            w.put_u32(proto::encode_version(*version));
            w.put_u32(proto::ARCH_GENERIC);
            w.put_u32(0);
            w.put_u32(if *version > proto::VERSION10 {
                proto::PTYPE_LAZY_SEND
            } else {
                proto::PTYPE_BATCH_SEND
            });
            // higher weight wins; newest carries the largest
            w.put_u32((CANDIDATES.len() - i) as u32 * 2);
        }
    }
}

/// Continue a multi round authentication exchange.
pub struct ContAuth<'a> {
    pub data: &'a [u8],
    pub plugin: &'a str,
    pub plugin_list: &'a str,
    pub keys: &'a [u8],
}

impl ProtocolEncode for ContAuth<'_> {
    fn encode(self, buf: &mut BytesMut) {
        let mut w = writer(buf);
        w.put_u32(op::CONT_AUTH);
        w.put_bytes(self.data);
        w.put_string(self.plugin);
        w.put_string(self.plugin_list);
        w.put_bytes(self.keys);
    }
}

/// Attach to an existing database.
pub struct Attach<'a> {
    pub database: &'a str,
    pub dpb: &'a [u8],
}

impl ProtocolEncode for Attach<'_> {
    fn encode(self, buf: &mut BytesMut) {
        let mut w = writer(buf);
        w.put_u32(op::ATTACH);
        w.put_u32(0);
        w.put_string(self.database);
        w.put_bytes(self.dpb);
    }
}

/// Create a database, then attach to it.
pub struct Create<'a> {
    pub database: &'a str,
    pub dpb: &'a [u8],
}

impl ProtocolEncode for Create<'_> {
    fn encode(self, buf: &mut BytesMut) {
        let mut w = writer(buf);
        w.put_u32(op::CREATE);
        w.put_u32(0);
        w.put_string(self.database);
        w.put_bytes(self.dpb);
    }
}

/// A bare `(opcode, object handle)` message. Covers detach, drop database,
/// commit, rollback and their retaining variants, close blob and cancel
/// blob-less single handle operations.
pub struct HandleOp {
    pub op: u32,
    pub handle: i32,
}

impl ProtocolEncode for HandleOp {
    fn encode(self, buf: &mut BytesMut) {
        let mut w = writer(buf);
        w.put_u32(self.op);
        w.put_i32(self.handle);
    }
}

/// Start a transaction under a parameter block.
pub struct StartTransaction<'a> {
    pub db_handle: i32,
    pub tpb: &'a [u8],
}

impl ProtocolEncode for StartTransaction<'_> {
    fn encode(self, buf: &mut BytesMut) {
        let mut w = writer(buf);
        w.put_u32(op::TRANSACTION);
        w.put_i32(self.db_handle);
        w.put_bytes(self.tpb);
    }
}

/// Allocate a statement handle.
pub struct AllocateStatement {
    pub db_handle: i32,
}

impl ProtocolEncode for AllocateStatement {
    fn encode(self, buf: &mut BytesMut) {
        let mut w = writer(buf);
        w.put_u32(op::ALLOCATE_STATEMENT);
        w.put_i32(self.db_handle);
    }
}

/// Prepare SQL text against an allocated statement, asking for the
/// description items in the same round trip.
pub struct PrepareStatement<'a> {
    pub tr_handle: i32,
    pub stmt_handle: i32,
    pub sql: &'a str,
    pub items: &'a [u8],
    pub buffer_len: u32,
}

impl ProtocolEncode for PrepareStatement<'_> {
    fn encode(self, buf: &mut BytesMut) {
        let mut w = writer(buf);
        w.put_u32(op::PREPARE_STATEMENT);
        w.put_i32(self.tr_handle);
        w.put_i32(self.stmt_handle);
        w.put_u32(SQL_DIALECT);
        w.put_string(self.sql);
        w.put_bytes(self.items);
        w.put_u32(self.buffer_len);
    }
}

/// Request statement information, typically to continue a truncated
/// description.
pub struct InfoSql<'a> {
    pub stmt_handle: i32,
    pub items: &'a [u8],
    pub buffer_len: u32,
}

impl ProtocolEncode for InfoSql<'_> {
    fn encode(self, buf: &mut BytesMut) {
        let mut w = writer(buf);
        w.put_u32(op::INFO_SQL);
        w.put_i32(self.stmt_handle);
        w.put_u32(0);
        w.put_bytes(self.items);
        w.put_u32(self.buffer_len);
    }
}

/// Execute a prepared statement.
///
/// `out_blr` asks for a singleton result row in the same response
/// (`EXECUTE2`); without it the reply is a plain generic response.
pub struct Execute<'a> {
    pub stmt_handle: i32,
    pub tr_handle: i32,
    pub blr: &'a [u8],
    pub data: &'a [u8],
    pub out_blr: Option<&'a [u8]>,
}

impl ProtocolEncode for Execute<'_> {
    fn encode(self, buf: &mut BytesMut) {
        let mut w = writer(buf);
        w.put_u32(if self.out_blr.is_some() { op::EXECUTE2 } else { op::EXECUTE });
        w.put_i32(self.stmt_handle);
        w.put_i32(self.tr_handle);
        w.put_bytes(self.blr);
        w.put_u32(0); // message number
        w.put_u32(!self.blr.is_empty() as u32); // message count
        w.put_raw(self.data);
        if let Some(out_blr) = self.out_blr {
            w.put_bytes(out_blr);
            w.put_u32(0);
        }
    }
}

/// Execute SQL text without a prepared statement, no output.
pub struct ExecImmediate<'a> {
    pub tr_handle: i32,
    pub sql: &'a str,
}

impl ProtocolEncode for ExecImmediate<'_> {
    fn encode(self, buf: &mut BytesMut) {
        let mut w = writer(buf);
        w.put_u32(op::EXEC_IMMEDIATE);
        w.put_i32(self.tr_handle);
        w.put_i32(0);
        w.put_u32(SQL_DIALECT);
        w.put_string(self.sql);
        w.put_bytes(&[]);
        w.put_u32(0);
    }
}

/// Pull the next batch of rows from an open cursor.
pub struct Fetch<'a> {
    pub stmt_handle: i32,
    pub blr: &'a [u8],
}

impl ProtocolEncode for Fetch<'_> {
    fn encode(self, buf: &mut BytesMut) {
        let mut w = writer(buf);
        w.put_u32(op::FETCH);
        w.put_i32(self.stmt_handle);
        w.put_bytes(self.blr);
        w.put_u32(0);
        w.put_u32(FETCH_BATCH);
    }
}

/// Close a cursor or drop a statement, mode from [`dsql`][crate::proto::dsql].
pub struct FreeStatement {
    pub stmt_handle: i32,
    pub mode: u32,
}

impl ProtocolEncode for FreeStatement {
    fn encode(self, buf: &mut BytesMut) {
        let mut w = writer(buf);
        w.put_u32(op::FREE_STATEMENT);
        w.put_i32(self.stmt_handle);
        w.put_u32(self.mode);
    }
}

/// Open an existing blob for reading.
pub struct OpenBlob {
    pub tr_handle: i32,
    pub id: (i32, i32),
}

impl ProtocolEncode for OpenBlob {
    fn encode(self, buf: &mut BytesMut) {
        let mut w = writer(buf);
        w.put_u32(op::OPEN_BLOB);
        w.put_i32(self.tr_handle);
        w.put_quad(self.id.0, self.id.1);
    }
}

/// Create a fresh blob for writing; the response carries its id.
pub struct CreateBlob {
    pub tr_handle: i32,
}

impl ProtocolEncode for CreateBlob {
    fn encode(self, buf: &mut BytesMut) {
        let mut w = writer(buf);
        w.put_u32(op::CREATE_BLOB2);
        w.put_bytes(&[]); // parameter block
        w.put_i32(self.tr_handle);
        w.put_quad(0, 0);
    }
}

/// Read one segment buffer from an open blob.
pub struct GetSegment {
    pub blob_handle: i32,
}

impl ProtocolEncode for GetSegment {
    fn encode(self, buf: &mut BytesMut) {
        let mut w = writer(buf);
        w.put_u32(op::GET_SEGMENT);
        w.put_i32(self.blob_handle);
        w.put_u32(SEGMENT_BUFFER);
        w.put_u32(0);
    }
}

/// Write one segment into an open blob.
///
/// The segment travels with its own little-endian length prefix inside the
/// aligned payload.
pub struct BatchSegments<'a> {
    pub blob_handle: i32,
    pub segment: &'a [u8],
}

impl ProtocolEncode for BatchSegments<'_> {
    fn encode(self, buf: &mut BytesMut) {
        let len = self.segment.len() as u32 + 2;
        let mut w = writer(buf);
        w.put_u32(op::BATCH_SEGMENTS);
        w.put_i32(self.blob_handle);
        w.put_u32(len);
        w.put_u32(len);
        w.put_raw(&(self.segment.len() as u16).to_le_bytes());
        w.put_raw(self.segment);
        w.pad(len as usize);
    }
}

/// Register interest in a set of events.
pub struct QueEvents<'a> {
    pub db_handle: i32,
    pub epb: &'a [u8],
    pub event_id: u32,
}

impl ProtocolEncode for QueEvents<'_> {
    fn encode(self, buf: &mut BytesMut) {
        let mut w = writer(buf);
        w.put_u32(op::QUE_EVENTS);
        w.put_i32(self.db_handle);
        w.put_bytes(self.epb);
        w.put_u32(0); // ast
        w.put_u32(0); // ast argument
        w.put_u32(self.event_id);
    }
}

/// Cancel an event registration.
pub struct CancelEvents {
    pub db_handle: i32,
    pub event_id: u32,
}

impl ProtocolEncode for CancelEvents {
    fn encode(self, buf: &mut BytesMut) {
        let mut w = writer(buf);
        w.put_u32(op::CANCEL_EVENTS);
        w.put_i32(self.db_handle);
        w.put_u32(self.event_id);
    }
}

/// Ask the server for an auxiliary connection endpoint for event delivery.
pub struct AuxConnect {
    pub db_handle: i32,
}

impl ProtocolEncode for AuxConnect {
    fn encode(self, buf: &mut BytesMut) {
        let mut w = writer(buf);
        w.put_u32(op::AUX_CONNECT);
        w.put_u32(1); // asynchronous channel
        w.put_i32(self.db_handle);
        w.put_u32(0); // no partner identification
    }
}

/// Out of band cancel of the operation in flight.
pub struct Cancel;

impl ProtocolEncode for Cancel {
    fn encode(self, buf: &mut BytesMut) {
        let mut w = writer(buf);
        w.put_u32(op::CANCEL);
        w.put_u32(2); // raise
    }
}

/// Liveness probe; replies with an empty generic response.
pub struct Ping;

impl ProtocolEncode for Ping {
    fn encode(self, buf: &mut BytesMut) {
        writer(buf).put_u32(op::PING);
    }
}

/// Courtesy goodbye before closing the socket. No reply follows.
pub struct Disconnect;

impl ProtocolEncode for Disconnect {
    fn encode(self, buf: &mut BytesMut) {
        writer(buf).put_u32(op::DISCONNECT);
    }
}

/// Database parameter block builder for attach and create.
#[derive(Debug, Default)]
pub struct Dpb {
    w: BlrWriter,
}

impl Dpb {
    pub fn new() -> Self {
        let mut w = BlrWriter::new();
        w.put_u8(dpb::VERSION1);
        Self { w }
    }

    pub fn user_name(&mut self, user: &str) {
        self.w.put_small(dpb::USER_NAME, user.as_bytes());
    }

    /// Plain text password, only for pre-11 legacy attach.
    pub fn password(&mut self, password: &str) {
        self.w.put_small(dpb::PASSWORD, password.as_bytes());
    }

    pub fn password_enc(&mut self, hash: &str) {
        self.w.put_small(dpb::PASSWORD_ENC, hash.as_bytes());
    }

    pub fn role(&mut self, role: &str) {
        self.w.put_small(dpb::SQL_ROLE_NAME, role.as_bytes());
    }

    pub fn lc_ctype(&mut self, charset: &str) {
        self.w.put_small(dpb::LC_CTYPE, charset.as_bytes());
    }

    pub fn sql_dialect(&mut self, dialect: u8) {
        self.w.put_small(dpb::SQL_DIALECT, &[dialect]);
    }

    pub fn utf8_filename(&mut self) {
        self.w.put_small(dpb::UTF8_FILENAME, &[1]);
    }

    /// Proof material produced by the authentication exchange.
    pub fn specific_auth_data(&mut self, data: &[u8]) {
        self.w.put_multipart(dpb::SPECIFIC_AUTH_DATA, data);
    }

    pub fn auth_plugin_name(&mut self, name: &str) {
        self.w.put_small(dpb::AUTH_PLUGIN_NAME, name.as_bytes());
    }

    pub fn auth_plugin_list(&mut self, list: &str) {
        self.w.put_small(dpb::AUTH_PLUGIN_LIST, list.as_bytes());
    }

    pub fn process_id(&mut self, pid: u32) {
        self.w.put_small(dpb::PROCESS_ID, &pid.to_le_bytes());
    }

    pub fn process_name(&mut self, name: &str) {
        self.w.put_small(dpb::PROCESS_NAME, name.as_bytes());
    }

    /// Page size for create database.
    pub fn page_size(&mut self, size: u32) {
        self.w.put_small(dpb::PAGE_SIZE, &size.to_le_bytes());
    }

    pub fn force_write(&mut self, on: bool) {
        self.w.put_small(dpb::FORCE_WRITE, &[on as u8]);
    }

    pub fn overwrite(&mut self) {
        self.w.put_small(dpb::OVERWRITE, &[1]);
    }

    pub fn set_db_charset(&mut self, charset: &str) {
        self.w.put_small(dpb::SET_DB_CHARSET, charset.as_bytes());
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.w.as_bytes()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::align4;

    fn encoded(msg: impl ProtocolEncode) -> BytesMut {
        let mut buf = BytesMut::new();
        msg.encode(&mut buf);
        buf
    }

    #[test]
    fn connect_offers_all_versions() {
        let buf = encoded(Connect { database: "/db/test.fdb", uid: &[1, 2, 3] });
        assert_eq!(&buf[..4], &op::CONNECT.to_be_bytes());
        // opcode + operation + version + arch, db string, count, uid, 4
        // candidates of 5 words each
        let expect = 16 + (4 + align4(12)) + 4 + (4 + align4(3)) + 4 * 20;
        assert_eq!(buf.len(), expect);
        // newest version first, flagged on the wire
        let first = &buf[expect - 80..];
        assert_eq!(&first[..4], &(proto::FLAGGED | 13).to_be_bytes());
        assert_eq!(&first[12..16], &proto::PTYPE_LAZY_SEND.to_be_bytes());
        assert_eq!(&first[16..20], &8u32.to_be_bytes());
        // oldest last, unflagged, batch send
        let last = &buf[buf.len() - 20..];
        assert_eq!(&last[..4], &10u32.to_be_bytes());
        assert_eq!(&last[12..16], &proto::PTYPE_BATCH_SEND.to_be_bytes());
        assert_eq!(&last[16..20], &2u32.to_be_bytes());
    }

    #[test]
    fn execute_without_params_has_no_message() {
        let buf = encoded(Execute {
            stmt_handle: 3,
            tr_handle: 2,
            blr: &[],
            data: &[],
            out_blr: None,
        });
        assert_eq!(
            &buf[..],
            &[0, 0, 0, 63, 0, 0, 0, 3, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
        );
    }

    #[test]
    fn execute2_appends_output_format() {
        let buf = encoded(Execute {
            stmt_handle: 1,
            tr_handle: 1,
            blr: &[],
            data: &[],
            out_blr: Some(&[5, 2, 4]),
        });
        assert_eq!(&buf[..4], &op::EXECUTE2.to_be_bytes());
        let tail = &buf[buf.len() - 12..];
        assert_eq!(tail, &[0, 0, 0, 3, 5, 2, 4, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn batch_segments_length_prefix() {
        let buf = encoded(BatchSegments { blob_handle: 8, segment: b"abc" });
        // two copies of len+2, then little-endian length, data, filler
        assert_eq!(
            &buf[..],
            &[0, 0, 0, 44, 0, 0, 0, 8, 0, 0, 0, 5, 0, 0, 0, 5, 3, 0, b'a', b'b', b'c', 0, 0, 0],
        );
        assert_eq!(buf.len() % 4, 0);
    }

    #[test]
    fn dpb_starts_with_version() {
        let mut dpb = Dpb::new();
        dpb.user_name("SYSDBA");
        dpb.sql_dialect(3);
        let b = dpb.as_bytes();
        assert_eq!(b[0], dpb::VERSION1);
        assert_eq!(&b[1..3], &[dpb::USER_NAME, 6]);
        assert_eq!(&b[3..9], b"SYSDBA");
        assert_eq!(&b[9..], &[dpb::SQL_DIALECT, 1, 3]);
    }
}
