use tracing::debug;

use crate::domain::changeset::{ChangesetFile, ColumnSlot, Operation, RowChange, TableChanges, Value};
use crate::domain::error::{ExtractError, Result};
use crate::domain::value_objects::TableName;
use crate::infrastructure::changeset::{op_codes, value_tags, PATCHSET_MARKER, TABLE_MARKER};

/// Decode a binary changeset into table blocks.
///
/// Purely structural: values are never checked against any live schema. A
/// zero-length stream yields an empty [`ChangesetFile`].
pub fn decode(bytes: &[u8]) -> Result<ChangesetFile> {
    let mut reader = Reader::new(bytes);
    let mut blocks: Vec<TableChanges> = Vec::new();
    let mut current: Option<(TableName, Vec<u8>, Vec<RowChange>)> = None;

    while !reader.is_eof() {
        let at = reader.pos;
        let marker = reader.u8("record marker")?;

        match marker {
            TABLE_MARKER => {
                if let Some((table, pk_flags, rows)) = current.take() {
                    blocks.push(TableChanges::new(table, pk_flags, rows));
                }
                let (table, pk_flags) = read_table_header(&mut reader)?;
                current = Some((table, pk_flags, Vec::new()));
            }
            PATCHSET_MARKER => {
                return Err(ExtractError::corrupt(
                    at,
                    "patchset table header found, expected a changeset",
                ));
            }
            op => {
                let operation = match op {
                    op_codes::INSERT => Operation::Insert,
                    op_codes::UPDATE => Operation::Update,
                    op_codes::DELETE => Operation::Delete,
                    other => {
                        return Err(ExtractError::corrupt(
                            at,
                            format!("unknown opcode 0x{other:02x}"),
                        ))
                    }
                };
                let Some((_, pk_flags, rows)) = current.as_mut() else {
                    return Err(ExtractError::corrupt(at, "row record before any table header"));
                };
                let indirect = reader.u8("indirect flag")? != 0;
                let slots = read_slots(&mut reader, operation, pk_flags.len())?;
                rows.push(RowChange::new(operation, indirect, slots));
            }
        }
    }

    if let Some((table, pk_flags, rows)) = current.take() {
        blocks.push(TableChanges::new(table, pk_flags, rows));
    }

    let changeset = ChangesetFile::new(blocks);
    debug!(
        bytes = bytes.len(),
        blocks = changeset.blocks().len(),
        records = changeset.record_count(),
        "changeset decoded"
    );
    Ok(changeset)
}

fn read_table_header(reader: &mut Reader<'_>) -> Result<(TableName, Vec<u8>)> {
    let at = reader.pos;
    let n_col = reader.varint("column count")?;
    if n_col == 0 {
        return Err(ExtractError::corrupt(at, "table header declares zero columns"));
    }
    let n_col = usize::try_from(n_col)
        .ok()
        .filter(|n| *n <= reader.remaining())
        .ok_or_else(|| {
            ExtractError::corrupt(at, format!("column count {n_col} exceeds remaining input"))
        })?;

    let pk_flags = reader.take(n_col, "primary key flags")?.to_vec();

    let name_at = reader.pos;
    let name_bytes = reader.until_nul("table name")?;
    let name = std::str::from_utf8(name_bytes)
        .map_err(|_| ExtractError::corrupt(name_at, "table name is not valid UTF-8"))?;

    Ok((TableName::new(name), pk_flags))
}

fn read_slots(reader: &mut Reader<'_>, operation: Operation, n_col: usize) -> Result<Vec<ColumnSlot>> {
    let mut slots = vec![ColumnSlot::default(); n_col];
    match operation {
        Operation::Insert => {
            for slot in &mut slots {
                slot.new = read_value(reader)?;
            }
        }
        Operation::Delete => {
            for slot in &mut slots {
                slot.old = read_value(reader)?;
            }
        }
        Operation::Update => {
            for slot in &mut slots {
                slot.old = read_value(reader)?;
            }
            for slot in &mut slots {
                slot.new = read_value(reader)?;
            }
        }
    }
    Ok(slots)
}

/// `Ok(None)` for the undefined tag, i.e. a value that was not recorded.
fn read_value(reader: &mut Reader<'_>) -> Result<Option<Value>> {
    let at = reader.pos;
    let tag = reader.u8("value type")?;
    let value = match tag {
        value_tags::UNDEFINED => return Ok(None),
        value_tags::NULL => Value::Null,
        value_tags::INTEGER => {
            let raw = reader.take(8, "integer value")?;
            Value::Integer(i64::from_be_bytes(to_array(raw)))
        }
        value_tags::REAL => {
            let raw = reader.take(8, "real value")?;
            Value::Real(f64::from_bits(u64::from_be_bytes(to_array(raw))))
        }
        value_tags::TEXT => {
            let len = reader.length("text length")?;
            let text_at = reader.pos;
            let raw = reader.take(len, "text value")?;
            let text = String::from_utf8(raw.to_vec())
                .map_err(|_| ExtractError::corrupt(text_at, "text value is not valid UTF-8"))?;
            Value::Text(text)
        }
        value_tags::BLOB => {
            let len = reader.length("blob length")?;
            Value::Blob(reader.take(len, "blob value")?.to_vec())
        }
        other => {
            return Err(ExtractError::corrupt(
                at,
                format!("unknown value type 0x{other:02x}"),
            ))
        }
    };
    Ok(Some(value))
}

fn to_array(raw: &[u8]) -> [u8; 8] {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(raw);
    buf
}

/// Decode an SQLite varint from the front of `data`.
///
/// Returns the value and the number of bytes consumed, or `None` when the
/// input ends mid-varint.
pub fn get_varint(data: &[u8]) -> Option<(u64, usize)> {
    let mut value: u64 = 0;
    for i in 0..8 {
        let byte = *data.get(i)?;
        value = (value << 7) | u64::from(byte & 0x7f);
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    // the ninth byte contributes all eight bits
    let byte = *data.get(8)?;
    Some(((value << 8) | u64::from(byte), 9))
}

// ─── Cursor ───────────────────────────────────────────────────────────────────

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn truncated(&self, what: &str) -> ExtractError {
        ExtractError::corrupt(self.pos, format!("truncated {what}"))
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        let byte = *self.data.get(self.pos).ok_or_else(|| self.truncated(what))?;
        self.pos += 1;
        Ok(byte)
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(self.truncated(what));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn varint(&mut self, what: &str) -> Result<u64> {
        let (value, consumed) =
            get_varint(&self.data[self.pos..]).ok_or_else(|| self.truncated(what))?;
        self.pos += consumed;
        Ok(value)
    }

    fn length(&mut self, what: &str) -> Result<usize> {
        let at = self.pos;
        let len = self.varint(what)?;
        usize::try_from(len)
            .ok()
            .filter(|n| *n <= self.remaining())
            .ok_or_else(|| ExtractError::corrupt(at, format!("{what} {len} exceeds remaining input")))
    }

    fn until_nul(&mut self, what: &str) -> Result<&'a [u8]> {
        let rest = &self.data[self.pos..];
        let end = rest
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| ExtractError::corrupt(self.data.len(), format!("unterminated {what}")))?;
        self.pos += end + 1;
        Ok(&rest[..end])
    }
}
