//! Response decoding for the Druid SQL endpoint.
//!
//! Each wire format has its own [`WireDecoder`] producing the same
//! intermediate shape: an array of rows, row 0 being the header. [`decode`]
//! turns that shape into column names plus typed rows, so nothing downstream
//! knows which format was on the wire.

pub mod json;
pub mod smile;

use crate::error::{DruidError, DruidResult};
use crate::value::Value;

/// Encoding of a query response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// `resultFormat: arrayLines`
    JsonLines,
    /// `resultFormat: array`
    JsonArray,
    /// `resultFormat: array` with `Accept: application/x-jackson-smile`
    Smile,
}

/// Decodes a raw body into rows of cells, header included.
pub trait WireDecoder: Send + Sync {
    fn decode_rows(&self, body: &[u8]) -> DruidResult<Vec<Vec<Value>>>;
}

/// Pick the sub-decoder for a wire format.
pub fn decoder_for(format: WireFormat) -> &'static dyn WireDecoder {
    match format {
        WireFormat::JsonLines => &json::JsonLinesDecoder,
        WireFormat::JsonArray => &json::JsonArrayDecoder,
        WireFormat::Smile => &smile::SmileDecoder,
    }
}

/// Column names and typed rows of one result.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Outcome of a successful decode.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// The payload held no rows at all, not even a header.
    Empty,
    Table(Table),
}

/// Decode a response body in the given wire format.
pub fn decode(body: &[u8], format: WireFormat) -> DruidResult<Decoded> {
    let raw = decoder_for(format).decode_rows(body)?;
    let decoded = into_table(raw)?;

    if let Decoded::Table(table) = &decoded {
        tracing::debug!(
            "Decoded {:?} response: {} columns, {} rows",
            format,
            table.columns.len(),
            table.rows.len()
        );
    }

    Ok(decoded)
}

/// Split the header off raw rows and check every row against it.
///
/// Rows whose length differs from the header are rejected rather than
/// padded, since a short row would otherwise shift values between columns.
pub fn into_table(raw: Vec<Vec<Value>>) -> DruidResult<Decoded> {
    let mut iter = raw.into_iter();
    let Some(header) = iter.next() else {
        return Ok(Decoded::Empty);
    };

    let columns = header
        .into_iter()
        .enumerate()
        .map(|(i, cell)| match cell {
            Value::String(name) => Ok(name),
            other => Err(DruidError::Decode(format!(
                "header cell {} is {}, expected a column name string",
                i,
                other.type_name()
            ))),
        })
        .collect::<DruidResult<Vec<String>>>()?;

    let rows = iter
        .enumerate()
        .map(|(i, row)| {
            if row.len() == columns.len() {
                Ok(row)
            } else {
                Err(DruidError::Decode(format!(
                    "row {} has {} fields, expected {}",
                    i,
                    row.len(),
                    columns.len()
                )))
            }
        })
        .collect::<DruidResult<Vec<_>>>()?;

    Ok(Decoded::Table(Table { columns, rows }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    #[test]
    fn test_empty_is_distinct_from_error() {
        assert_eq!(into_table(vec![]).unwrap(), Decoded::Empty);
        assert_eq!(decode(b"", WireFormat::JsonLines).unwrap(), Decoded::Empty);
        assert_eq!(decode(b"[]", WireFormat::JsonArray).unwrap(), Decoded::Empty);
        assert!(decode(b"{oops", WireFormat::JsonLines).is_err());
    }

    #[test]
    fn test_header_only_has_columns_and_no_rows() {
        let decoded = into_table(vec![vec![s("a"), s("b")]]).unwrap();
        assert_eq!(
            decoded,
            Decoded::Table(Table {
                columns: vec!["a".into(), "b".into()],
                rows: vec![],
            })
        );
    }

    #[test]
    fn test_non_string_header_is_decode_error() {
        let err = into_table(vec![vec![s("a"), Value::Int(1)]]).unwrap_err();
        assert!(matches!(err, DruidError::Decode(msg) if msg.contains("header cell 1")));
    }

    #[test]
    fn test_ragged_rows_are_rejected() {
        let short = vec![vec![s("a"), s("b")], vec![Value::Int(1), Value::Int(2)], vec![Value::Int(3)]];
        let err = into_table(short).unwrap_err();
        assert!(matches!(err, DruidError::Decode(msg) if msg == "row 1 has 1 fields, expected 2"));

        let long = vec![vec![s("a")], vec![Value::Int(1), Value::Int(2)]];
        assert!(matches!(into_table(long), Err(DruidError::Decode(_))));
    }

    #[test]
    fn test_formats_agree() {
        let lines = b"[\"a\",\"b\"]\n[1,\"x\"]\n";
        let array = b"[[\"a\",\"b\"],[1,\"x\"]]";
        assert_eq!(
            decode(lines, WireFormat::JsonLines).unwrap(),
            decode(array, WireFormat::JsonArray).unwrap()
        );
    }
}
