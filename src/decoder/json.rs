//! JSON result decoders (`arrayLines` and `array`).

use super::WireDecoder;
use crate::error::{DruidError, DruidResult};
use crate::value::Value;

/// Newline separated JSON arrays, the first being the header.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesDecoder;

impl WireDecoder for JsonLinesDecoder {
    fn decode_rows(&self, body: &[u8]) -> DruidResult<Vec<Vec<Value>>> {
        let mut rows = Vec::new();

        for (n, line) in body.split(|&b| b == b'\n').enumerate() {
            let line = line.trim_ascii();
            if line.is_empty() {
                continue;
            }

            let cells: Vec<serde_json::Value> = serde_json::from_slice(line)
                .map_err(|e| DruidError::Decode(format!("line {}: {}", n + 1, e)))?;
            rows.push(cells.iter().map(Value::from).collect());
        }

        Ok(rows)
    }
}

/// A single JSON array of arrays, element 0 being the header.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonArrayDecoder;

impl WireDecoder for JsonArrayDecoder {
    fn decode_rows(&self, body: &[u8]) -> DruidResult<Vec<Vec<Value>>> {
        let body = body.trim_ascii();
        if body.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<Vec<serde_json::Value>> = serde_json::from_slice(body)?;
        Ok(rows
            .iter()
            .map(|row| row.iter().map(Value::from).collect())
            .collect())
    }
}
