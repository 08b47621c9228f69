//! Prepared statement description.
//!
//! Prepare replies with an information buffer in the tagged format: the
//! statement kind, then one described entry per output column. Oversized
//! descriptions arrive truncated and are continued with further info
//! requests starting at the last complete entry.
use bytes::BytesMut;

use crate::{
    codec::ProtocolError,
    proto::info,
    types::{message_blr, Column, SqlType},
    wire::blr::{BlrReader, BlrWriter},
};

/// What a prepared statement will do when executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementType {
    Select,
    Insert,
    Update,
    Delete,
    Ddl,
    ExecProcedure,
    SetGenerator,
    Savepoint,
    Other(i32),
}

impl StatementType {
    fn from_wire(n: i32) -> Self {
        match n {
            1 => Self::Select,
            2 => Self::Insert,
            3 => Self::Update,
            4 => Self::Delete,
            5 => Self::Ddl,
            8 => Self::ExecProcedure,
            13 => Self::SetGenerator,
            14 => Self::Savepoint,
            n => Self::Other(n),
        }
    }

    /// Whether execution opens a cursor to fetch from.
    pub fn has_cursor(&self) -> bool {
        matches!(self, Self::Select)
    }

    /// Whether execution returns a singleton row inline.
    pub fn singleton(&self) -> bool {
        matches!(self, Self::ExecProcedure)
    }
}

/// Items requested on prepare: statement kind, then a full description of
/// the output columns and of the bind parameters.
pub const PREPARE_ITEMS: &[u8] = &[
    info::SQL_STMT_TYPE,
    info::SQL_SELECT,
    info::SQL_DESCRIBE_VARS,
    info::SQL_SQLDA_SEQ,
    info::SQL_TYPE,
    info::SQL_SUB_TYPE,
    info::SQL_SCALE,
    info::SQL_LENGTH,
    info::SQL_NULL_IND,
    info::SQL_FIELD,
    info::SQL_RELATION,
    info::SQL_OWNER,
    info::SQL_ALIAS,
    info::SQL_DESCRIBE_END,
    info::SQL_BIND,
    info::SQL_DESCRIBE_VARS,
    info::SQL_SQLDA_SEQ,
    info::SQL_TYPE,
    info::SQL_SUB_TYPE,
    info::SQL_SCALE,
    info::SQL_LENGTH,
    info::SQL_NULL_IND,
    info::SQL_FIELD,
    info::SQL_RELATION,
    info::SQL_OWNER,
    info::SQL_ALIAS,
    info::SQL_DESCRIBE_END,
];

/// Buffer length offered for prepare and info replies.
pub const INFO_BUFFER_LEN: u32 = 32768;

/// Which variable list a description entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Section {
    #[default]
    Select,
    Bind,
}

/// Items to continue a truncated description from variable `index` of one
/// section.
pub fn continue_items(section: Section, index: u16) -> Vec<u8> {
    let marker = match section {
        Section::Select => info::SQL_SELECT,
        Section::Bind => info::SQL_BIND,
    };
    let mut items = vec![info::SQL_SQLDA_START, 2, index as u8, (index >> 8) as u8, marker];
    items.extend_from_slice(&PREPARE_ITEMS[2..14]);
    items
}

/// Items describing only the bind parameters.
pub fn bind_items() -> &'static [u8] {
    &PREPARE_ITEMS[14..]
}

/// Parsed content of one or more description buffers.
#[derive(Debug, Default)]
pub struct PrepareInfo {
    pub stmt_type: Option<StatementType>,
    pub columns: Vec<Column>,
    pub params: Vec<Column>,
    /// Whether a bind section was seen; a statement without parameters
    /// still carries an empty one.
    pub bind_seen: bool,
    /// Set when the buffer ended early; holds the section and the next
    /// variable index to request.
    pub truncated: Option<(Section, u16)>,
    section: Section,
}

impl PrepareInfo {
    /// Parse one buffer, appending to what earlier buffers produced.
    pub fn parse(&mut self, buffer: &[u8]) -> Result<(), ProtocolError> {
        let mut r = BlrReader::new(buffer);
        let mut current = ColumnBuilder::default();
        self.truncated = None;
        while !r.is_eof() {
            match r.get_u8()? {
                info::END => break,
                info::TRUNCATED => {
                    // resume at the variable being described, it may be partial
                    let next = match self.section {
                        Section::Select => self.columns.len(),
                        Section::Bind => self.params.len(),
                    } as u16
                        + 1;
                    self.truncated = Some((self.section, next));
                    break;
                }
                info::SQL_STMT_TYPE => {
                    self.stmt_type = Some(StatementType::from_wire(r.get_int()?));
                }
                info::SQL_SELECT => self.section = Section::Select,
                info::SQL_BIND => {
                    self.section = Section::Bind;
                    self.bind_seen = true;
                }
                info::SQL_DESCRIBE_VARS => {
                    r.get_int()?;
                }
                info::SQL_SQLDA_SEQ => {
                    r.get_int()?;
                }
                info::SQL_TYPE => current.ty = r.get_int()?,
                info::SQL_SUB_TYPE => current.subtype = r.get_int()?,
                info::SQL_SCALE => current.scale = r.get_int()?,
                info::SQL_LENGTH => current.len = r.get_int()?,
                info::SQL_NULL_IND => current.nullable = r.get_int()? != 0,
                info::SQL_FIELD => current.field = r.get_string()?.to_string(),
                info::SQL_RELATION => current.relation = r.get_string()?.to_string(),
                info::SQL_OWNER => current.owner = r.get_string()?.to_string(),
                info::SQL_ALIAS => current.alias = r.get_string()?.to_string(),
                info::SQL_DESCRIBE_END => {
                    let built = std::mem::take(&mut current).build()?;
                    match self.section {
                        Section::Select => self.columns.push(built),
                        Section::Bind => self.params.push(built),
                    }
                }
                tag => return Err(ProtocolError::new(format!("unexpected info item {tag}"))),
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ColumnBuilder {
    ty: i32,
    subtype: i32,
    scale: i32,
    len: i32,
    nullable: bool,
    field: String,
    relation: String,
    owner: String,
    alias: String,
}

impl ColumnBuilder {
    fn build(self) -> Result<Column, ProtocolError> {
        let ty = SqlType::from_wire(self.ty as u16, self.scale as i16, self.len as u16)?;
        Ok(Column {
            ty,
            subtype: self.subtype as i16,
            nullable: self.nullable || self.ty & 1 == 1,
            field: self.field,
            relation: self.relation,
            owner: self.owner,
            alias: self.alias,
        })
    }
}

/// A prepared statement, described and ready to execute.
#[derive(Debug, Clone)]
pub struct Statement {
    pub handle: i32,
    pub stmt_type: StatementType,
    pub columns: Vec<Column>,
    pub params: Vec<Column>,
}

impl Statement {
    /// Parameters the statement takes when executed.
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Output row wire types, in column order.
    pub fn row_format(&self) -> Vec<SqlType> {
        self.columns.iter().map(|c| c.ty).collect()
    }

    /// Message description for fetching this statement's rows.
    pub fn row_blr(&self) -> BytesMut {
        message_blr(&self.row_format()).into_bytes()
    }
}

/// Build a description buffer for tests and fixtures.
#[cfg(test)]
pub(crate) fn describe(w: &mut BlrWriter, seq: i32, ty: i32, scale: i32, len: i32, alias: &str) {
    let int = |w: &mut BlrWriter, code, n: i32| {
        w.put_u8(code);
        w.put_u8(4);
        w.put_u8(0);
        let b = n.to_le_bytes();
        for x in b {
            w.put_u8(x);
        }
    };
    int(w, info::SQL_SQLDA_SEQ, seq);
    int(w, info::SQL_TYPE, ty);
    int(w, info::SQL_SCALE, scale);
    int(w, info::SQL_LENGTH, len);
    w.put_string2(info::SQL_ALIAS, alias.as_bytes());
    w.put_u8(info::SQL_DESCRIBE_END);
}

#[cfg(test)]
mod test {
    use super::*;

    fn int_item(w: &mut BlrWriter, code: u8, n: i32) {
        w.put_u8(code);
        w.put_u8(4);
        w.put_u8(0);
        for x in n.to_le_bytes() {
            w.put_u8(x);
        }
    }

    #[test]
    fn parses_type_columns_and_params() {
        let mut w = BlrWriter::new();
        int_item(&mut w, info::SQL_STMT_TYPE, 1);
        w.put_u8(info::SQL_SELECT);
        int_item(&mut w, info::SQL_DESCRIBE_VARS, 2);
        describe(&mut w, 1, 496, 0, 4, "ID");
        describe(&mut w, 2, 448 + 1, 0, 20, "NAME");
        w.put_u8(info::SQL_BIND);
        int_item(&mut w, info::SQL_DESCRIBE_VARS, 1);
        describe(&mut w, 1, 496, 0, 4, "");
        w.put_u8(info::END);

        let mut parsed = PrepareInfo::default();
        parsed.parse(w.as_bytes()).unwrap();
        assert_eq!(parsed.stmt_type, Some(StatementType::Select));
        assert_eq!(parsed.truncated, None);
        assert!(parsed.bind_seen);
        assert_eq!(parsed.columns.len(), 2);
        assert_eq!(parsed.columns[0].ty, SqlType::Long { scale: 0 });
        assert_eq!(parsed.columns[0].name(), "ID");
        assert!(!parsed.columns[0].nullable);
        assert_eq!(parsed.columns[1].ty, SqlType::Varying { len: 20 });
        assert!(parsed.columns[1].nullable);
        assert_eq!(parsed.params.len(), 1);
    }

    #[test]
    fn truncation_resumes_after_complete_columns() {
        let mut w = BlrWriter::new();
        int_item(&mut w, info::SQL_STMT_TYPE, 1);
        w.put_u8(info::SQL_SELECT);
        int_item(&mut w, info::SQL_DESCRIBE_VARS, 2);
        describe(&mut w, 1, 496, 0, 4, "A");
        // second column cut off mid description
        int_item(&mut w, info::SQL_SQLDA_SEQ, 2);
        int_item(&mut w, info::SQL_TYPE, 496);
        w.put_u8(info::TRUNCATED);

        let mut parsed = PrepareInfo::default();
        parsed.parse(w.as_bytes()).unwrap();
        assert_eq!(parsed.columns.len(), 1);
        assert_eq!(parsed.truncated, Some((Section::Select, 2)));
        assert!(!parsed.bind_seen);

        // continuation carries the remaining description
        let mut w = BlrWriter::new();
        w.put_u8(info::SQL_SELECT);
        int_item(&mut w, info::SQL_DESCRIBE_VARS, 2);
        describe(&mut w, 2, 480, 0, 8, "B");
        w.put_u8(info::END);
        parsed.parse(w.as_bytes()).unwrap();
        assert_eq!(parsed.truncated, None);
        assert_eq!(parsed.columns.len(), 2);
        assert_eq!(parsed.columns[1].ty, SqlType::Double);
    }

    #[test]
    fn truncation_in_bind_section_points_at_params() {
        let mut w = BlrWriter::new();
        w.put_u8(info::SQL_BIND);
        int_item(&mut w, info::SQL_DESCRIBE_VARS, 3);
        describe(&mut w, 1, 496, 0, 4, "");
        w.put_u8(info::TRUNCATED);

        let mut parsed = PrepareInfo::default();
        parsed.parse(w.as_bytes()).unwrap();
        assert_eq!(parsed.params.len(), 1);
        assert_eq!(parsed.truncated, Some((Section::Bind, 2)));
    }

    #[test]
    fn continue_items_carry_the_start_index() {
        let items = continue_items(Section::Select, 258);
        assert_eq!(&items[..5], &[info::SQL_SQLDA_START, 2, 2, 1, info::SQL_SELECT]);
        assert_eq!(&items[5..], &PREPARE_ITEMS[2..14]);
        assert_eq!(continue_items(Section::Bind, 1)[4], info::SQL_BIND);
        assert_eq!(bind_items()[0], info::SQL_BIND);
    }

    #[test]
    fn non_cursor_statements() {
        assert!(StatementType::from_wire(1).has_cursor());
        assert!(!StatementType::from_wire(2).has_cursor());
        assert!(StatementType::from_wire(8).singleton());
        assert_eq!(StatementType::from_wire(99), StatementType::Other(99));
    }
}
