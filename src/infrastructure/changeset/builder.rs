use crate::domain::changeset::Value;
use crate::infrastructure::changeset::{op_codes, value_tags, TABLE_MARKER};

/// Writes changeset bytes in the same format [`super::decoder::decode`] reads.
///
/// Records are appended in call order under the most recent `table` header,
/// with no consolidation of operations on the same row. Used to produce
/// fixtures; slot vectors must match the header's column count.
///
/// ```
/// use geodelta::{ChangesetBuilder, Value};
///
/// let bytes = ChangesetBuilder::new()
///     .table("points", &[1, 0])
///     .insert(&[Some(Value::Integer(1)), Some(Value::Text("well".into()))])
///     .build();
/// assert_eq!(bytes[0], b'T');
/// ```
#[derive(Debug, Default, Clone)]
pub struct ChangesetBuilder {
    out: Vec<u8>,
    next_indirect: bool,
}

impl ChangesetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a table block. `pk_flags` holds one entry per column: 0 for
    /// non-key columns, the 1-based key ordinal otherwise.
    pub fn table(mut self, name: &str, pk_flags: &[u8]) -> Self {
        self.out.push(TABLE_MARKER);
        put_varint(&mut self.out, pk_flags.len() as u64);
        self.out.extend_from_slice(pk_flags);
        self.out.extend_from_slice(name.as_bytes());
        self.out.push(0);
        self
    }

    /// Flag the next record as indirect.
    pub fn indirect(mut self) -> Self {
        self.next_indirect = true;
        self
    }

    pub fn insert(mut self, new: &[Option<Value>]) -> Self {
        self.record_header(op_codes::INSERT);
        for value in new {
            encode_value(&mut self.out, value.as_ref());
        }
        self
    }

    pub fn delete(mut self, old: &[Option<Value>]) -> Self {
        self.record_header(op_codes::DELETE);
        for value in old {
            encode_value(&mut self.out, value.as_ref());
        }
        self
    }

    /// `None` on both sides of a column marks it unchanged.
    pub fn update(mut self, old: &[Option<Value>], new: &[Option<Value>]) -> Self {
        self.record_header(op_codes::UPDATE);
        for value in old.iter().chain(new) {
            encode_value(&mut self.out, value.as_ref());
        }
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.out
    }

    fn record_header(&mut self, op: u8) {
        self.out.push(op);
        self.out.push(u8::from(std::mem::take(&mut self.next_indirect)));
    }
}

fn encode_value(out: &mut Vec<u8>, value: Option<&Value>) {
    match value {
        None => out.push(value_tags::UNDEFINED),
        Some(Value::Null) => out.push(value_tags::NULL),
        Some(Value::Integer(i)) => {
            out.push(value_tags::INTEGER);
            out.extend_from_slice(&i.to_be_bytes());
        }
        Some(Value::Real(f)) => {
            out.push(value_tags::REAL);
            out.extend_from_slice(&f.to_bits().to_be_bytes());
        }
        Some(Value::Text(s)) => {
            out.push(value_tags::TEXT);
            put_varint(out, s.len() as u64);
            out.extend_from_slice(s.as_bytes());
        }
        Some(Value::Blob(b)) => {
            out.push(value_tags::BLOB);
            put_varint(out, b.len() as u64);
            out.extend_from_slice(b);
        }
    }
}

/// Append `v` as an SQLite varint (1 to 9 bytes, big-endian 7-bit groups).
pub fn put_varint(out: &mut Vec<u8>, mut v: u64) {
    if v & (0xff00_0000_u64 << 32) != 0 {
        let mut buf = [0u8; 9];
        buf[8] = v as u8;
        v >>= 8;
        for byte in buf[..8].iter_mut().rev() {
            *byte = (v as u8 & 0x7f) | 0x80;
            v >>= 7;
        }
        out.extend_from_slice(&buf);
        return;
    }

    let mut groups = Vec::with_capacity(9);
    loop {
        groups.push((v as u8 & 0x7f) | 0x80);
        v >>= 7;
        if v == 0 {
            break;
        }
    }
    groups[0] &= 0x7f;
    out.extend(groups.iter().rev());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_matches_session_format() {
        let bytes = ChangesetBuilder::new()
            .table("t", &[1, 0])
            .insert(&[Some(Value::Integer(1)), Some(Value::Text("a".into()))])
            .build();
        assert_eq!(&bytes[..8], &[b'T', 2, 1, 0, b't', 0, 0x12, 0]);
    }

    #[test]
    fn update_writes_all_old_then_all_new() {
        let bytes = ChangesetBuilder::new()
            .table("t", &[1, 0])
            .update(
                &[Some(Value::Integer(5)), Some(Value::Null)],
                &[None, Some(Value::Text("b".into()))],
            )
            .build();
        let body = &bytes[6..];
        assert_eq!(body[0], 0x17);
        assert_eq!(body[2], value_tags::INTEGER);
        assert_eq!(body[11], value_tags::NULL);
        assert_eq!(body[12], value_tags::UNDEFINED);
        assert_eq!(&body[13..], &[value_tags::TEXT, 1, b'b']);
    }

    #[test]
    fn indirect_applies_to_next_record_only() {
        let bytes = ChangesetBuilder::new()
            .table("t", &[1])
            .indirect()
            .delete(&[Some(Value::Null)])
            .delete(&[Some(Value::Null)])
            .build();
        assert_eq!(bytes[5..], [0x09, 1, value_tags::NULL, 0x09, 0, value_tags::NULL]);
    }

    #[test]
    fn small_varints_are_one_byte() {
        let mut out = Vec::new();
        put_varint(&mut out, 127);
        assert_eq!(out, vec![0x7f]);
        out.clear();
        put_varint(&mut out, 128);
        assert_eq!(out, vec![0x81, 0x00]);
    }
}
