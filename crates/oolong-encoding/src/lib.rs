//! # oolong-encoding
//!
//! Order-preserving binary encoding for Oolong keys and rows.
//!
//! Byte-wise comparison of two encoded values equals the domain-level
//! comparison of the decoded values, for every value kind:
//!
//! - integers: sign-flipped big-endian
//! - doubles: IEEE-754 bits with the sign bit flipped, all bits flipped
//!   for negatives
//! - text and blobs: content with `0x00` escaped as `0x00 0xFF`,
//!   terminated by `0x00 0x00`
//! - arrays and documents: concatenated element encodings with a `0x00`
//!   terminator
//! - NULL sorts before every non-null value of its column
//!
//! Composite keys concatenate per-field encodings in declaration order,
//! prefixed by the owning namespace encoded as an integer. The
//! [`comparator`] module exposes the block-separator and successor
//! operations the key-value engine's comparator interface requires.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod comparator;

use oolong_common::namespace::Namespace;
use oolong_common::types::{Document, Value};
use oolong_common::{Error, Result};

/// Type tags, ordered so that NULL sorts first.
mod tag {
    pub const NULL: u8 = 0x01;
    pub const FALSE: u8 = 0x02;
    pub const TRUE: u8 = 0x03;
    pub const INT: u8 = 0x04;
    pub const DOUBLE: u8 = 0x05;
    pub const TEXT: u8 = 0x06;
    pub const BLOB: u8 = 0x07;
    pub const ARRAY: u8 = 0x08;
    pub const DOCUMENT: u8 = 0x09;

    /// Ends arrays, documents, and (doubled) byte strings.
    pub const TERMINATOR: u8 = 0x00;
    /// Second byte of an escaped `0x00` inside a byte string.
    pub const ESCAPE: u8 = 0xFF;
}

/// Appends the encoding of `value` to `buf`.
pub fn encode_value(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => buf.push(tag::NULL),
        Value::Bool(false) => buf.push(tag::FALSE),
        Value::Bool(true) => buf.push(tag::TRUE),
        Value::Int(i) => {
            buf.push(tag::INT);
            encode_i64(buf, *i);
        }
        Value::Double(d) => {
            buf.push(tag::DOUBLE);
            encode_f64(buf, *d);
        }
        Value::Text(s) => {
            buf.push(tag::TEXT);
            encode_bytes(buf, s.as_bytes());
        }
        Value::Blob(b) => {
            buf.push(tag::BLOB);
            encode_bytes(buf, b);
        }
        Value::Array(items) => {
            buf.push(tag::ARRAY);
            for item in items {
                encode_value(buf, item);
            }
            buf.push(tag::TERMINATOR);
        }
        Value::Document(doc) => {
            buf.push(tag::DOCUMENT);
            for (name, value) in doc.iter() {
                encode_bytes(buf, name.as_bytes());
                encode_value(buf, value);
            }
            buf.push(tag::TERMINATOR);
        }
    }
}

/// Returns the encoding of `value` as a fresh buffer.
#[must_use]
pub fn encoded_value(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value(&mut buf, value);
    buf
}

/// Appends the encoding of a namespace prefix to `buf`.
///
/// Namespaces use the integer encoding so that namespace-bounded ranges
/// are contiguous in the keyspace.
pub fn encode_namespace(buf: &mut Vec<u8>, ns: Namespace) {
    buf.push(tag::INT);
    encode_i64(buf, ns);
}

/// Returns the key prefix covering namespace `ns`.
#[must_use]
pub fn namespace_prefix(ns: Namespace) -> Vec<u8> {
    let mut buf = Vec::with_capacity(9);
    encode_namespace(&mut buf, ns);
    buf
}

fn encode_i64(buf: &mut Vec<u8>, i: i64) {
    // Flipping the sign bit maps i64 order onto unsigned byte order.
    let flipped = (i as u64) ^ (1 << 63);
    buf.extend_from_slice(&flipped.to_be_bytes());
}

fn encode_f64(buf: &mut Vec<u8>, d: f64) {
    let bits = d.to_bits();
    let ordered = if bits & (1 << 63) == 0 {
        bits ^ (1 << 63)
    } else {
        !bits
    };
    buf.extend_from_slice(&ordered.to_be_bytes());
}

fn encode_bytes(buf: &mut Vec<u8>, content: &[u8]) {
    for &b in content {
        if b == 0x00 {
            buf.push(tag::TERMINATOR);
            buf.push(tag::ESCAPE);
        } else {
            buf.push(b);
        }
    }
    buf.push(tag::TERMINATOR);
    buf.push(tag::TERMINATOR);
}

/// Decodes one value from the front of `buf`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_value(buf: &[u8]) -> Result<(Value, usize)> {
    let (&t, rest) = buf
        .split_first()
        .ok_or_else(|| Error::corruption("empty encoded value"))?;
    match t {
        tag::NULL => Ok((Value::Null, 1)),
        tag::FALSE => Ok((Value::Bool(false), 1)),
        tag::TRUE => Ok((Value::Bool(true), 1)),
        tag::INT => {
            let raw = take_u64(rest)?;
            Ok((Value::Int((raw ^ (1 << 63)) as i64), 9))
        }
        tag::DOUBLE => {
            let ordered = take_u64(rest)?;
            let bits = if ordered & (1 << 63) != 0 {
                ordered ^ (1 << 63)
            } else {
                !ordered
            };
            Ok((Value::Double(f64::from_bits(bits)), 9))
        }
        tag::TEXT => {
            let (content, read) = decode_bytes(rest)?;
            let s = String::from_utf8(content)
                .map_err(|_| Error::corruption("invalid UTF-8 in encoded text"))?;
            Ok((Value::Text(s), 1 + read))
        }
        tag::BLOB => {
            let (content, read) = decode_bytes(rest)?;
            Ok((Value::Blob(content), 1 + read))
        }
        tag::ARRAY => {
            let mut items = Vec::new();
            let mut offset = 0;
            loop {
                match rest.get(offset) {
                    Some(&tag::TERMINATOR) => return Ok((Value::Array(items), 1 + offset + 1)),
                    Some(_) => {
                        let (item, read) = decode_value(&rest[offset..])?;
                        items.push(item);
                        offset += read;
                    }
                    None => return Err(Error::corruption("unterminated encoded array")),
                }
            }
        }
        tag::DOCUMENT => {
            let mut doc = Document::new();
            let mut offset = 0;
            loop {
                match rest.get(offset) {
                    Some(&tag::TERMINATOR) => {
                        return Ok((Value::Document(doc), 1 + offset + 1));
                    }
                    Some(_) => {
                        let (name, read) = decode_bytes(&rest[offset..])?;
                        offset += read;
                        let name = String::from_utf8(name)
                            .map_err(|_| Error::corruption("invalid UTF-8 in field name"))?;
                        let (value, read) = decode_value(&rest[offset..])?;
                        offset += read;
                        doc.insert(name, value);
                    }
                    None => return Err(Error::corruption("unterminated encoded document")),
                }
            }
        }
        other => Err(Error::corruption(format!(
            "unknown value tag {other:#04x}"
        ))),
    }
}

/// Decodes the namespace prefix at the front of an encoded key.
pub fn decode_namespace(buf: &[u8]) -> Result<(Namespace, usize)> {
    match decode_value(buf)? {
        (Value::Int(ns), read) => Ok((ns, read)),
        _ => Err(Error::corruption("key does not start with a namespace")),
    }
}

fn take_u64(buf: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = buf
        .get(..8)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| Error::corruption("truncated 8-byte encoding"))?;
    Ok(u64::from_be_bytes(bytes))
}

fn decode_bytes(buf: &[u8]) -> Result<(Vec<u8>, usize)> {
    let mut content = Vec::new();
    let mut i = 0;
    loop {
        match (buf.get(i), buf.get(i + 1)) {
            (Some(&tag::TERMINATOR), Some(&tag::ESCAPE)) => {
                content.push(0x00);
                i += 2;
            }
            (Some(&tag::TERMINATOR), Some(&tag::TERMINATOR)) => {
                return Ok((content, i + 2));
            }
            (Some(&b), _) if b != tag::TERMINATOR => {
                content.push(b);
                i += 1;
            }
            _ => return Err(Error::corruption("unterminated byte string")),
        }
    }
}
