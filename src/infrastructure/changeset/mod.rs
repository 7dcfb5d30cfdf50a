//! SQLite session-extension changeset format.
//!
//! ```text
//! table header : 'T' | varint n_col | n_col pk-flag bytes | name '\0'
//! record       : opcode | indirect | values
//!                INSERT → n_col new values
//!                DELETE → n_col old values
//!                UPDATE → n_col old values, then n_col new values
//! value        : 0 undefined | 1 i64 BE | 2 f64 BE | 3 varint len + utf8
//!                | 4 varint len + bytes | 5 NULL
//! ```

pub mod builder;
pub mod decoder;

pub const TABLE_MARKER: u8 = b'T';
pub const PATCHSET_MARKER: u8 = b'P';

pub mod op_codes {
    pub const INSERT: u8 = 0x12;
    pub const UPDATE: u8 = 0x17;
    pub const DELETE: u8 = 0x09;
}

pub mod value_tags {
    pub const UNDEFINED: u8 = 0;
    pub const INTEGER: u8 = 1;
    pub const REAL: u8 = 2;
    pub const TEXT: u8 = 3;
    pub const BLOB: u8 = 4;
    pub const NULL: u8 = 5;
}
