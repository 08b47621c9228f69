//! Firebird wire protocol messages.
//!
//! Requests are built in [`frontend`], replies decoded in [`backend`],
//! server status vectors in [`status`].
pub mod backend;
pub mod frontend;
pub mod status;

/// Operation codes. Every message starts with one as a big-endian `u32`.
pub mod op {
    pub const CONNECT: u32 = 1;
    pub const ACCEPT: u32 = 3;
    pub const REJECT: u32 = 4;
    pub const DISCONNECT: u32 = 6;
    pub const RESPONSE: u32 = 9;
    pub const ATTACH: u32 = 19;
    pub const CREATE: u32 = 20;
    pub const DETACH: u32 = 21;
    pub const TRANSACTION: u32 = 29;
    pub const COMMIT: u32 = 30;
    pub const ROLLBACK: u32 = 31;
    pub const OPEN_BLOB: u32 = 35;
    pub const GET_SEGMENT: u32 = 36;
    pub const PUT_SEGMENT: u32 = 37;
    pub const CLOSE_BLOB: u32 = 39;
    pub const INFO_DATABASE: u32 = 40;
    pub const BATCH_SEGMENTS: u32 = 44;
    pub const QUE_EVENTS: u32 = 48;
    pub const CANCEL_EVENTS: u32 = 49;
    pub const COMMIT_RETAINING: u32 = 50;
    pub const EVENT: u32 = 52;
    pub const AUX_CONNECT: u32 = 53;
    pub const CREATE_BLOB2: u32 = 57;
    pub const ALLOCATE_STATEMENT: u32 = 62;
    pub const EXECUTE: u32 = 63;
    pub const EXEC_IMMEDIATE: u32 = 64;
    pub const FETCH: u32 = 65;
    pub const FETCH_RESPONSE: u32 = 66;
    pub const FREE_STATEMENT: u32 = 67;
    pub const PREPARE_STATEMENT: u32 = 68;
    pub const INFO_SQL: u32 = 70;
    pub const DUMMY: u32 = 71;
    pub const EXECUTE2: u32 = 76;
    pub const SQL_RESPONSE: u32 = 78;
    pub const DROP_DATABASE: u32 = 81;
    pub const ROLLBACK_RETAINING: u32 = 86;
    pub const CANCEL: u32 = 91;
    pub const CONT_AUTH: u32 = 92;
    pub const PING: u32 = 93;
    pub const ACCEPT_DATA: u32 = 94;
    pub const COND_ACCEPT: u32 = 98;
}

/// Protocol negotiation constants.
pub mod proto {
    /// Oldest protocol this driver speaks: per-field null indicators.
    pub const VERSION10: u16 = 10;
    pub const VERSION11: u16 = 11;
    pub const VERSION12: u16 = 12;
    /// First protocol with the row-level null bitmap.
    pub const VERSION13: u16 = 13;

    /// Versions past 10 carry a flag word in the high bits on the wire.
    pub const FLAGGED: u32 = 0xFFFF_8000;

    pub const CONNECT_VERSION3: u32 = 3;
    pub const ARCH_GENERIC: u32 = 1;

    /// Batch sends, no asynchrony.
    pub const PTYPE_BATCH_SEND: u32 = 3;
    pub const PTYPE_OUT_OF_BAND: u32 = 4;
    /// Deferred packet delivery.
    pub const PTYPE_LAZY_SEND: u32 = 5;

    /// Encode a candidate version for the wire.
    pub const fn encode_version(v: u16) -> u32 {
        if v > VERSION10 { FLAGGED | v as u32 } else { v as u32 }
    }

    /// Normalize an accepted version from the wire.
    pub const fn decode_version(raw: u32) -> u16 {
        (raw & 0xFF) as u16
    }
}

/// Connect block (`uid`) tags.
pub mod cnct {
    pub const USER: u8 = 1;
    pub const HOST: u8 = 4;
    pub const USER_VERIFICATION: u8 = 6;
    pub const SPECIFIC_DATA: u8 = 7;
    pub const PLUGIN_NAME: u8 = 8;
    pub const LOGIN: u8 = 9;
    pub const PLUGIN_LIST: u8 = 10;
    pub const CLIENT_CRYPT: u8 = 11;
}

/// Database parameter block tags.
pub mod dpb {
    pub const VERSION1: u8 = 1;
    pub const PAGE_SIZE: u8 = 4;
    pub const FORCE_WRITE: u8 = 24;
    pub const USER_NAME: u8 = 28;
    pub const PASSWORD: u8 = 29;
    pub const PASSWORD_ENC: u8 = 30;
    pub const LC_CTYPE: u8 = 48;
    pub const OVERWRITE: u8 = 54;
    pub const SQL_ROLE_NAME: u8 = 60;
    pub const SQL_DIALECT: u8 = 63;
    pub const SET_DB_CHARSET: u8 = 68;
    pub const PROCESS_ID: u8 = 71;
    pub const PROCESS_NAME: u8 = 74;
    pub const UTF8_FILENAME: u8 = 77;
    pub const SPECIFIC_AUTH_DATA: u8 = 84;
    pub const AUTH_PLUGIN_LIST: u8 = 85;
    pub const AUTH_PLUGIN_NAME: u8 = 86;
}

/// Transaction parameter block tags.
pub mod tpb {
    pub const VERSION3: u8 = 3;
    pub const CONSISTENCY: u8 = 1;
    pub const CONCURRENCY: u8 = 2;
    pub const WAIT: u8 = 6;
    pub const READ: u8 = 8;
    pub const WRITE: u8 = 9;
    pub const READ_COMMITTED: u8 = 15;
    pub const REC_VERSION: u8 = 17;
    pub const NO_REC_VERSION: u8 = 18;
}

/// Status vector argument kinds.
pub mod arg {
    pub const END: u32 = 0;
    pub const GDS: u32 = 1;
    pub const STRING: u32 = 2;
    pub const NUMBER: u32 = 4;
    pub const INTERPRETED: u32 = 5;
    pub const WARNING: u32 = 18;
    pub const SQL_STATE: u32 = 19;
}

/// Information items used by prepare and statement description.
pub mod info {
    pub const END: u8 = 1;
    pub const TRUNCATED: u8 = 2;

    pub const SQL_SELECT: u8 = 4;
    pub const SQL_BIND: u8 = 5;
    pub const SQL_DESCRIBE_VARS: u8 = 7;
    pub const SQL_DESCRIBE_END: u8 = 8;
    pub const SQL_SQLDA_SEQ: u8 = 9;
    pub const SQL_TYPE: u8 = 11;
    pub const SQL_SUB_TYPE: u8 = 12;
    pub const SQL_SCALE: u8 = 13;
    pub const SQL_LENGTH: u8 = 14;
    pub const SQL_NULL_IND: u8 = 15;
    pub const SQL_FIELD: u8 = 16;
    pub const SQL_RELATION: u8 = 17;
    pub const SQL_OWNER: u8 = 18;
    pub const SQL_ALIAS: u8 = 19;
    pub const SQL_SQLDA_START: u8 = 20;
    pub const SQL_STMT_TYPE: u8 = 21;
}

/// `op_free_statement` modes.
pub mod dsql {
    /// Close the open cursor, keep the statement.
    pub const CLOSE: u32 = 1;
    /// Drop the statement entirely.
    pub const DROP: u32 = 2;
}

/// Placeholder statement handle under lazy delivery: "the statement the
/// in-flight allocate is about to produce".
pub const INVALID_OBJECT: i32 = 0xFFFF;

/// End-of-cursor status in a fetch response.
pub const FETCH_NO_MORE_ROWS: u32 = 100;

/// End-of-blob handle value in a get-segment response.
pub const BLOB_FINISHED: i32 = 2;

/// Largest piece written per blob segment on the write path.
pub const BLOB_SEGMENT_SIZE: usize = 1024;
