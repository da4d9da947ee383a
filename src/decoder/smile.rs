//! Smile (binary JSON) decoder for `Accept: application/x-jackson-smile`.
//!
//! Single pass over the buffer, no intermediate JSON tree. Only the shape
//! Druid produces for `resultFormat: array` is materialized: an array of
//! arrays of scalars. Nested containers inside a row are parsed (so shared
//! string tables stay in sync) but surface as `Value::Unsupported`.

use super::WireDecoder;
use crate::error::{DruidError, DruidResult};
use crate::value::Value;

// ============================================================================
// Header
// ============================================================================

const HEADER_MAGIC: &[u8; 3] = b":)\n";
const FLAG_SHARED_NAMES: u8 = 0x01;
const FLAG_SHARED_VALUES: u8 = 0x02;
const FLAG_RAW_BINARY: u8 = 0x04;

/// Back-reference tables are reset once they reach this size.
const MAX_SHARED_REFS: usize = 1024;

// ============================================================================
// Value-mode tokens
// ============================================================================

const TOKEN_EMPTY_STRING: u8 = 0x20;
const TOKEN_NULL: u8 = 0x21;
const TOKEN_FALSE: u8 = 0x22;
const TOKEN_TRUE: u8 = 0x23;
const TOKEN_INT32: u8 = 0x24;
const TOKEN_INT64: u8 = 0x25;
const TOKEN_BIG_INTEGER: u8 = 0x26;
const TOKEN_FLOAT32: u8 = 0x28;
const TOKEN_FLOAT64: u8 = 0x29;
const TOKEN_BIG_DECIMAL: u8 = 0x2A;
const TOKEN_LONG_ASCII: u8 = 0xE0;
const TOKEN_LONG_UNICODE: u8 = 0xE4;
const TOKEN_BINARY_7BIT: u8 = 0xE8;
const TOKEN_START_ARRAY: u8 = 0xF8;
const TOKEN_END_ARRAY: u8 = 0xF9;
const TOKEN_START_OBJECT: u8 = 0xFA;
const TOKEN_END_OBJECT: u8 = 0xFB;
const TOKEN_END_STRING: u8 = 0xFC;
const TOKEN_RAW_BINARY: u8 = 0xFD;
const TOKEN_END_CONTENT: u8 = 0xFF;

// ============================================================================
// Key-mode tokens
// ============================================================================

const KEY_EMPTY: u8 = 0x20;
const KEY_LONG_UNICODE: u8 = 0x34;

/// Smile sub-decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmileDecoder;

impl WireDecoder for SmileDecoder {
    fn decode_rows(&self, body: &[u8]) -> DruidResult<Vec<Vec<Value>>> {
        if body.is_empty() {
            return Ok(Vec::new());
        }
        let mut parser = Parser::new(body)?;

        let root = match parser.next_token()? {
            None | Some(TOKEN_END_CONTENT) => return Ok(Vec::new()),
            Some(TOKEN_START_ARRAY) => parser.parse_array()?,
            Some(token) => {
                return Err(DruidError::Decode(format!(
                    "Smile document must be an array, found token 0x{:02X}",
                    token
                )));
            }
        };

        root.into_iter()
            .enumerate()
            .map(|(i, node)| match node {
                Node::Array(cells) => Ok(cells.into_iter().map(Node::into_value).collect()),
                other => Err(DruidError::Decode(format!(
                    "Smile row {} is {}, expected an array",
                    i,
                    other.into_value().type_name()
                ))),
            })
            .collect()
    }
}

/// Parsed Smile value.
#[derive(Debug)]
enum Node {
    Scalar(Value),
    Array(Vec<Node>),
    Object,
}

impl Node {
    fn into_value(self) -> Value {
        match self {
            Node::Scalar(v) => v,
            Node::Array(_) => Value::Unsupported("array"),
            Node::Object => Value::Unsupported("object"),
        }
    }
}

struct Parser<'a> {
    buf: &'a [u8],
    raw_binary: bool,
    shared_names: Option<Vec<String>>,
    shared_values: Option<Vec<String>>,
}

impl<'a> Parser<'a> {
    fn new(data: &'a [u8]) -> DruidResult<Self> {
        if data.len() < 4 || &data[..3] != HEADER_MAGIC {
            return Err(DruidError::Decode("Missing Smile header".to_string()));
        }

        let flags = data[3];
        let version = flags >> 4;
        if version != 0 {
            return Err(DruidError::Decode(format!("Unsupported Smile version: {}", version)));
        }

        Ok(Self {
            buf: &data[4..],
            raw_binary: flags & FLAG_RAW_BINARY != 0,
            shared_names: (flags & FLAG_SHARED_NAMES != 0).then(Vec::new),
            shared_values: (flags & FLAG_SHARED_VALUES != 0).then(Vec::new),
        })
    }

    #[inline]
    fn next_token(&mut self) -> DruidResult<Option<u8>> {
        match self.buf.split_first() {
            Some((&b, rest)) => {
                self.buf = rest;
                Ok(Some(b))
            }
            None => Ok(None),
        }
    }

    #[inline]
    fn byte(&mut self) -> DruidResult<u8> {
        self.next_token()?
            .ok_or_else(|| DruidError::Decode("Unexpected end of Smile data".to_string()))
    }

    fn take(&mut self, len: usize) -> DruidResult<&'a [u8]> {
        if self.buf.len() < len {
            return Err(DruidError::Decode(format!(
                "Truncated Smile data: need {} bytes, have {}",
                len,
                self.buf.len()
            )));
        }
        let (head, rest) = self.buf.split_at(len);
        self.buf = rest;
        Ok(head)
    }

    fn take_str(&mut self, len: usize) -> DruidResult<String> {
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|e| DruidError::Decode(format!("Invalid UTF-8 in Smile string: {}", e)))
    }

    /// Read bytes up to the 0xFC end-of-string marker.
    fn take_terminated_str(&mut self) -> DruidResult<String> {
        let end = self
            .buf
            .iter()
            .position(|&b| b == TOKEN_END_STRING)
            .ok_or_else(|| DruidError::Decode("Unterminated Smile string".to_string()))?;
        let s = self.take_str(end)?;
        self.buf = &self.buf[1..];
        Ok(s)
    }

    /// Smile VInt: 7 bits per byte, the last byte flagged by 0x80 and holding 6 bits.
    fn vint(&mut self) -> DruidResult<u64> {
        let mut value: u64 = 0;
        for _ in 0..10 {
            let b = self.byte()?;
            if b & 0x80 != 0 {
                return Ok((value << 6) | (b & 0x3F) as u64);
            }
            value = (value << 7) | b as u64;
        }
        Err(DruidError::Decode("Smile VInt too long".to_string()))
    }

    /// Fixed-width integer spread over `count` 7-bit bytes.
    fn seven_bit_fixed(&mut self, count: usize) -> DruidResult<u64> {
        let bytes = self.take(count)?;
        Ok(bytes.iter().fold(0u64, |acc, &b| (acc << 7) | (b & 0x7F) as u64))
    }

    /// Skip `len` raw bytes stored in 7-bit groups.
    fn skip_seven_bit_binary(&mut self, len: usize) -> DruidResult<()> {
        let encoded = len / 7 * 8 + if len % 7 > 0 { len % 7 + 1 } else { 0 };
        self.take(encoded).map(|_| ())
    }

    fn remember(table: &mut Option<Vec<String>>, s: &str) {
        if let Some(table) = table {
            if table.len() >= MAX_SHARED_REFS {
                table.clear();
            }
            table.push(s.to_string());
        }
    }

    fn lookup(table: &Option<Vec<String>>, index: usize, what: &str) -> DruidResult<String> {
        table
            .as_ref()
            .and_then(|t| t.get(index))
            .cloned()
            .ok_or_else(|| DruidError::Decode(format!("Invalid shared {} reference {}", what, index)))
    }

    fn short_value_string(&mut self, len: usize) -> DruidResult<Value> {
        let s = self.take_str(len)?;
        Self::remember(&mut self.shared_values, &s);
        Ok(Value::String(s))
    }

    fn parse_value(&mut self, token: u8) -> DruidResult<Node> {
        let value = match token {
            0x01..=0x1F => {
                let s = Self::lookup(&self.shared_values, (token - 1) as usize, "value")?;
                Value::String(s)
            }
            TOKEN_EMPTY_STRING => Value::String(String::new()),
            TOKEN_NULL => Value::Null,
            TOKEN_FALSE => Value::Bool(false),
            TOKEN_TRUE => Value::Bool(true),
            TOKEN_INT32 | TOKEN_INT64 => Value::Int(zigzag(self.vint()?)),
            TOKEN_BIG_INTEGER => {
                let len = self.vint()? as usize;
                self.skip_seven_bit_binary(len)?;
                Value::Unsupported("big_integer")
            }
            TOKEN_FLOAT32 => {
                let bits = self.seven_bit_fixed(5)? as u32;
                Value::Float(f32::from_bits(bits) as f64)
            }
            TOKEN_FLOAT64 => Value::Float(f64::from_bits(self.seven_bit_fixed(10)?)),
            TOKEN_BIG_DECIMAL => {
                let _scale = self.vint()?;
                let len = self.vint()? as usize;
                self.skip_seven_bit_binary(len)?;
                Value::Unsupported("big_decimal")
            }
            0x40..=0x5F => self.short_value_string((token & 0x1F) as usize + 1)?,
            0x60..=0x7F => self.short_value_string((token & 0x1F) as usize + 33)?,
            0x80..=0x9F => self.short_value_string((token & 0x1F) as usize + 2)?,
            0xA0..=0xBF => self.short_value_string((token & 0x1F) as usize + 34)?,
            0xC0..=0xDF => Value::Int(zigzag((token & 0x1F) as u64)),
            TOKEN_LONG_ASCII | TOKEN_LONG_UNICODE => Value::String(self.take_terminated_str()?),
            TOKEN_BINARY_7BIT => {
                let len = self.vint()? as usize;
                self.skip_seven_bit_binary(len)?;
                Value::Unsupported("binary")
            }
            0xEC..=0xEF => {
                let index = (((token & 0x03) as usize) << 8) | self.byte()? as usize;
                Value::String(Self::lookup(&self.shared_values, index, "value")?)
            }
            TOKEN_RAW_BINARY if self.raw_binary => {
                let len = self.vint()? as usize;
                self.take(len)?;
                Value::Unsupported("binary")
            }
            TOKEN_START_ARRAY => return self.parse_array().map(Node::Array),
            TOKEN_START_OBJECT => {
                self.skip_object()?;
                return Ok(Node::Object);
            }
            other => {
                return Err(DruidError::Decode(format!("Unexpected Smile value token 0x{:02X}", other)));
            }
        };
        Ok(Node::Scalar(value))
    }

    /// Parse array elements; the start marker is already consumed.
    fn parse_array(&mut self) -> DruidResult<Vec<Node>> {
        let mut items = Vec::new();
        loop {
            match self.byte()? {
                TOKEN_END_ARRAY => return Ok(items),
                token => items.push(self.parse_value(token)?),
            }
        }
    }

    /// Walk an object so that its keys and values feed the shared tables.
    fn skip_object(&mut self) -> DruidResult<()> {
        loop {
            let key = self.byte()?;
            match key {
                TOKEN_END_OBJECT => return Ok(()),
                KEY_EMPTY => {}
                0x30..=0x33 => {
                    let index = (((key & 0x03) as usize) << 8) | self.byte()? as usize;
                    Self::lookup(&self.shared_names, index, "name")?;
                }
                KEY_LONG_UNICODE => {
                    let name = self.take_terminated_str()?;
                    Self::remember(&mut self.shared_names, &name);
                }
                0x40..=0x7F => {
                    Self::lookup(&self.shared_names, (key & 0x3F) as usize, "name")?;
                }
                0x80..=0xBF => {
                    let name = self.take_str((key & 0x3F) as usize + 1)?;
                    Self::remember(&mut self.shared_names, &name);
                }
                0xC0..=0xF7 => {
                    let name = self.take_str((key & 0x3F) as usize + 2)?;
                    Self::remember(&mut self.shared_names, &name);
                }
                other => {
                    return Err(DruidError::Decode(format!("Unexpected Smile key token 0x{:02X}", other)));
                }
            }
            let token = self.byte()?;
            self.parse_value(token)?;
        }
    }
}

#[inline]
fn zigzag(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

// ============================================================================
// Tests
// ============================================================================
