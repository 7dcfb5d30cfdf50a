use serde::Serialize;

use crate::domain::value_objects::TableName;

/// A single column value as stored in a changeset or read back from the
/// reference database.
///
/// `Null` is an explicit SQL NULL. An *absent* value (the column was not
/// recorded at all) is modelled one level up as `None` in [`ColumnSlot`],
/// never as `Null`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Storage class name as SQLite reports it from `typeof()`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
        }
    }
}

/// Row operation recorded in a changeset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Old/new value pair for one column of one row change.
///
/// Both sides `None` on an UPDATE means the column was not modified, which
/// is distinct from being modified to `Value::Null`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnSlot {
    pub old: Option<Value>,
    pub new: Option<Value>,
}

impl ColumnSlot {
    pub fn is_unchanged(&self) -> bool {
        self.old.is_none() && self.new.is_none()
    }
}

/// One INSERT / UPDATE / DELETE record, positional over the table's columns.
#[derive(Debug, Clone, PartialEq)]
pub struct RowChange {
    operation: Operation,
    indirect: bool,
    slots: Vec<ColumnSlot>,
}

impl RowChange {
    pub(crate) fn new(operation: Operation, indirect: bool, slots: Vec<ColumnSlot>) -> Self {
        Self {
            operation,
            indirect,
            slots,
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Set when the change was made by a trigger or foreign-key action
    /// rather than directly by the user.
    pub fn is_indirect(&self) -> bool {
        self.indirect
    }

    pub fn slots(&self) -> &[ColumnSlot] {
        &self.slots
    }

    pub fn slot(&self, column: usize) -> Option<&ColumnSlot> {
        self.slots.get(column)
    }
}

/// All consecutive records that follow one table header.
#[derive(Debug, Clone, PartialEq)]
pub struct TableChanges {
    table: TableName,
    pk_flags: Vec<u8>,
    rows: Vec<RowChange>,
}

impl TableChanges {
    pub(crate) fn new(table: TableName, pk_flags: Vec<u8>, rows: Vec<RowChange>) -> Self {
        Self {
            table,
            pk_flags,
            rows,
        }
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    /// Number of columns the table had when the changeset was recorded.
    pub fn column_count(&self) -> usize {
        self.pk_flags.len()
    }

    pub fn pk_flags(&self) -> &[u8] {
        &self.pk_flags
    }

    /// Column positions of the primary key, ordered by key ordinal.
    pub fn primary_key_positions(&self) -> Vec<usize> {
        let mut keyed: Vec<(u8, usize)> = self
            .pk_flags
            .iter()
            .enumerate()
            .filter(|(_, flag)| **flag > 0)
            .map(|(pos, flag)| (*flag, pos))
            .collect();
        keyed.sort_unstable();
        keyed.into_iter().map(|(_, pos)| pos).collect()
    }

    pub fn rows(&self) -> &[RowChange] {
        &self.rows
    }
}

/// A fully decoded changeset: table blocks in file order.
///
/// Only produced by [`crate::infrastructure::changeset::decoder::decode`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChangesetFile {
    blocks: Vec<TableChanges>,
}

impl ChangesetFile {
    pub(crate) fn new(blocks: Vec<TableChanges>) -> Self {
        Self { blocks }
    }

    /// `true` for a valid stream with zero table blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[TableChanges] {
        &self.blocks
    }

    pub fn record_count(&self) -> usize {
        self.blocks.iter().map(|b| b.rows.len()).sum()
    }

    /// Distinct table names, in order of first appearance.
    pub fn tables(&self) -> Vec<&TableName> {
        let mut seen: Vec<&TableName> = Vec::new();
        for block in &self.blocks {
            if !seen.contains(&&block.table) {
                seen.push(&block.table);
            }
        }
        seen
    }
}

/// Per-operation counts of emitted features.
#[derive(Debug, Serialize, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub total_inserts: usize,
    pub total_updates: usize,
    pub total_deletes: usize,
    pub total_changes: usize,
}

impl Summary {
    pub fn record(&mut self, op: Operation) {
        match op {
            Operation::Insert => self.total_inserts += 1,
            Operation::Update => self.total_updates += 1,
            Operation::Delete => self.total_deletes += 1,
        }
        self.total_changes += 1;
    }
}
