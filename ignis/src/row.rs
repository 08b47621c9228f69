//! Decoded result rows.
use std::sync::Arc;

use crate::types::{Column, Value};

/// One fetched row, sharing its column metadata with its siblings.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<[Column]>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(columns: Arc<[Column]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Value by position.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value by column alias or field name, case insensitive.
    pub fn get_named(&self, name: &str) -> Option<&Value> {
        let index = self
            .columns
            .iter()
            .position(|c| c.name().eq_ignore_ascii_case(name))?;
        self.values.get(index)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut [Value] {
        &mut self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::SqlType;

    fn column(alias: &str) -> Column {
        Column {
            ty: SqlType::Long { scale: 0 },
            subtype: 0,
            nullable: true,
            field: "F".into(),
            relation: String::new(),
            owner: String::new(),
            alias: alias.into(),
        }
    }

    #[test]
    fn lookup_by_name_is_case_insensitive() {
        let columns: Arc<[Column]> = vec![column("ID"), column("TOTAL")].into();
        let row = Row::new(columns, vec![Value::Int(1), Value::Double(2.5)]);
        assert_eq!(row.get_named("total"), Some(&Value::Double(2.5)));
        assert_eq!(row.get_named("missing"), None);
        assert_eq!(row.get(0), Some(&Value::Int(1)));
    }
}
