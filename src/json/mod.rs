//! Streaming JSON access for record extraction.
//!
//! Three pieces: a byte-range tokenizer ([`scanner`]), a field selector
//! tree parsed from dotted paths ([`fields`]), and an extractor that
//! drives the tokenizer across one record, assigning matched tokens to
//! tree leaves ([`extract`]).
//!
//! Nothing is decoded: every token is a `(kind, begin, end)` span of the
//! record buffer, and string escapes are recognized syntactically but
//! never unescaped.

pub mod extract;
pub mod fields;
pub mod scanner;

pub use self::extract::extract;
pub use self::fields::{FieldPath, FieldTree, Selector};
pub use self::scanner::JsonParser;

/// Token kinds. `Object`/`Array` are composite kinds assigned by the
/// extractor (span of a whole value); the scanner itself only emits the
/// `*Beg`/`*End` structural forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Eof,
    Colon,
    Comma,
    Object,
    ObjectBeg,
    ObjectEnd,
    Array,
    ArrayBeg,
    ArrayEnd,
    String,
    /// String containing at least one escape sequence.
    StringEsc,
    Number,
    False,
    True,
    Null,
}

/// A byte span of the current record buffer. String spans exclude the
/// surrounding quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub begin: usize,
    pub end: usize,
}

impl Token {
    pub fn eof() -> Token {
        Token {
            kind: TokenKind::Eof,
            begin: 0,
            end: 0,
        }
    }

    /// The bytes this token spans within `data`.
    pub fn bytes<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.begin..self.end]
    }
}

/// Record-local parse failure. The offending record is skipped and the
/// pipeline moves on; this never aborts a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonError;

pub type JsonResult<T> = std::result::Result<T, JsonError>;
