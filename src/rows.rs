//! Row cursor over a decoded result.
//!
//! ```ignore
//! let mut rows = conn.query("SELECT __time, added FROM wikiticker").await?;
//! let mut dest = vec![Datum::Null; rows.columns().len()];
//! while rows.read_row(&mut dest)? {
//!     println!("{:?}", dest);
//! }
//! ```

use chrono::{DateTime, TimeZone, Utc};

use crate::config::DateFormat;
use crate::decoder::Table;
use crate::error::{DruidError, DruidResult};
use crate::value::{Datum, Value};

/// Decoded rows plus the date coercion rule of the connection.
#[derive(Debug, Clone)]
struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    current: usize,
    date_field: Option<String>,
    date_format: DateFormat,
}

/// Sequential, single-pass cursor over query results.
#[derive(Debug, Clone)]
pub struct Rows {
    set: ResultSet,
}

impl Rows {
    pub(crate) fn new(table: Table, date_field: Option<String>, date_format: DateFormat) -> Self {
        Self {
            set: ResultSet {
                columns: table.columns,
                rows: table.rows,
                current: 0,
                date_field,
                date_format,
            },
        }
    }

    /// Column names, in result order.
    pub fn columns(&self) -> &[String] {
        &self.set.columns
    }

    /// Total number of rows in the result.
    pub fn len(&self) -> usize {
        self.set.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.rows.is_empty()
    }

    /// Index of the row the next read returns.
    pub fn position(&self) -> usize {
        self.set.current
    }

    pub fn has_next(&self) -> bool {
        self.set.current < self.set.rows.len()
    }

    /// Skip the current row. Returns `false` once past the last row.
    pub fn advance(&mut self) -> bool {
        if self.has_next() {
            self.set.current += 1;
        }
        self.has_next()
    }

    /// Read the current row into `dest` and move to the next one.
    ///
    /// Returns `Ok(false)` without touching `dest` when the cursor is exhausted.
    /// On error `dest` is left as it was and the cursor does not move.
    pub fn read_row(&mut self, dest: &mut [Datum]) -> DruidResult<bool> {
        let Some(row) = self.set.rows.get(self.set.current) else {
            return Ok(false);
        };

        if row.len() != dest.len() {
            return Err(DruidError::Scan(format!(
                "destination count mismatch: {} columns, {} destinations",
                row.len(),
                dest.len()
            )));
        }

        let scanned = self
            .set
            .columns
            .iter()
            .zip(row)
            .map(|(column, value)| {
                if self.set.date_field.as_deref() == Some(column.as_str()) {
                    coerce_timestamp(column, value, self.set.date_format)
                } else {
                    scan_value(column, value)
                }
            })
            .collect::<DruidResult<Vec<Datum>>>()?;

        for (slot, datum) in dest.iter_mut().zip(scanned) {
            *slot = datum;
        }

        self.set.current += 1;
        Ok(true)
    }

    /// Cursor holds no external resource; kept for driver-contract parity.
    pub fn close(&mut self) {}
}

impl Iterator for Rows {
    type Item = DruidResult<Vec<Datum>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut dest = vec![Datum::Null; self.set.columns.len()];
        match self.read_row(&mut dest) {
            Ok(true) => Some(Ok(dest)),
            Ok(false) => None,
            Err(e) => {
                // skip the bad row so iteration makes progress
                self.set.current += 1;
                Some(Err(e))
            }
        }
    }
}

fn scan_value(column: &str, value: &Value) -> DruidResult<Datum> {
    Ok(match value {
        Value::Bool(b) => Datum::Bool(*b),
        Value::String(s) => Datum::String(s.clone()),
        Value::Int(i) => Datum::Int(*i),
        Value::Float(f) => Datum::Float(*f),
        Value::Null => Datum::Null,
        Value::Unsupported(kind) => {
            return Err(DruidError::Scan(format!("can't scan type {} in column '{}'", kind, column)));
        }
    })
}

fn coerce_timestamp(column: &str, value: &Value, format: DateFormat) -> DruidResult<Datum> {
    let parsed = match (format, value) {
        (_, Value::Null) => return Ok(Datum::Null),
        (DateFormat::Iso | DateFormat::Auto, Value::String(s)) => parse_iso(s),
        (DateFormat::Millis | DateFormat::Auto, Value::Int(ms)) => Utc.timestamp_millis_opt(*ms).single(),
        (DateFormat::Posix, Value::Int(secs)) => Utc.timestamp_opt(*secs, 0).single(),
        _ => None,
    };

    parsed.map(Datum::Timestamp).ok_or_else(|| {
        DruidError::Scan(format!(
            "failed to parse date field '{}' value {:?} as {}",
            column, value, format
        ))
    })
}

fn parse_iso(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn wikiticker(date_field: Option<&str>, format: DateFormat) -> Rows {
        let table = Table {
            columns: vec!["__time".into(), "added".into(), "channel".into()],
            rows: vec![
                vec![
                    Value::String("2015-09-12T00:46:58.771Z".into()),
                    Value::Int(36),
                    Value::String("#en.wikipedia".into()),
                ],
                vec![
                    Value::String("2015-09-12T00:46:58.772Z".into()),
                    Value::Int(76),
                    Value::String("#ca.wikipedia".into()),
                ],
            ],
        };
        Rows::new(table, date_field.map(str::to_string), format)
    }

    fn single(column: &str, value: Value, format: DateFormat) -> Rows {
        let table = Table {
            columns: vec![column.to_string()],
            rows: vec![vec![value]],
        };
        Rows::new(table, Some(column.to_string()), format)
    }

    #[test]
    fn test_read_rows_in_order() {
        let mut rows = wikiticker(None, DateFormat::Iso);
        let mut dest = vec![Datum::Null; 3];

        assert_eq!(rows.columns(), ["__time", "added", "channel"]);
        assert!(rows.read_row(&mut dest).unwrap());
        assert_eq!(dest[1], Datum::Int(36));
        assert_eq!(dest[2], Datum::String("#en.wikipedia".into()));
        assert_eq!(dest[0], Datum::String("2015-09-12T00:46:58.771Z".into()));

        assert!(rows.read_row(&mut dest).unwrap());
        assert_eq!(dest[1], Datum::Int(76));
        assert_eq!(dest[2], Datum::String("#ca.wikipedia".into()));

        assert!(!rows.has_next());
        assert!(!rows.read_row(&mut dest).unwrap());
        assert_eq!(rows.position(), 2);
    }

    #[test]
    fn test_destination_count_mismatch() {
        let mut rows = wikiticker(None, DateFormat::Iso);
        let mut dest = vec![Datum::Null; 2];
        let err = rows.read_row(&mut dest).unwrap_err();
        assert!(matches!(err, DruidError::Scan(msg) if msg.contains("destination count mismatch")));
        assert_eq!(rows.position(), 0);
    }

    #[test]
    fn test_advance_skips_rows() {
        let mut rows = wikiticker(None, DateFormat::Iso);
        assert!(rows.has_next());
        assert!(rows.advance());
        assert!(!rows.advance());
        assert!(!rows.advance());
        assert_eq!(rows.position(), 2);
    }

    #[test]
    fn test_iso_date_field() {
        let mut rows = single("created_at", Value::String("2013-01-01T00:00:00.000Z".into()), DateFormat::Iso);
        let mut dest = vec![Datum::Null];
        rows.read_row(&mut dest).unwrap();

        let expected = Utc.with_ymd_and_hms(2013, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(dest[0], Datum::Timestamp(expected));
    }

    #[test]
    fn test_date_field_on_wikiticker() {
        let rows = wikiticker(Some("__time"), DateFormat::Iso);
        let all: Vec<Vec<Datum>> = rows.collect::<DruidResult<_>>().unwrap();
        let ts = all[0][0].as_timestamp().unwrap();
        assert_eq!(ts.timestamp_millis(), 1_442_018_818_771);
        assert_eq!(all[1][1], Datum::Int(76));
    }

    #[test]
    fn test_epoch_date_formats() {
        let mut dest = vec![Datum::Null];

        let mut rows = single("t", Value::Int(1_356_998_400_000), DateFormat::Millis);
        rows.read_row(&mut dest).unwrap();
        assert_eq!(dest[0].as_timestamp().unwrap().timestamp(), 1_356_998_400);

        let mut rows = single("t", Value::Int(1_356_998_400), DateFormat::Posix);
        rows.read_row(&mut dest).unwrap();
        assert_eq!(dest[0].as_timestamp().unwrap().timestamp(), 1_356_998_400);

        let mut rows = single("t", Value::Int(1_356_998_400_000), DateFormat::Auto);
        rows.read_row(&mut dest).unwrap();
        assert_eq!(dest[0].as_timestamp().unwrap().timestamp(), 1_356_998_400);
    }

    #[test]
    fn test_bad_date_never_passes_through_as_string() {
        let mut dest = vec![Datum::Null];

        let mut rows = single("t", Value::String("yesterday".into()), DateFormat::Iso);
        assert!(matches!(rows.read_row(&mut dest), Err(DruidError::Scan(_))));
        assert_eq!(dest[0], Datum::Null);

        let mut rows = single("t", Value::String("2013-01-01T00:00:00.000Z".into()), DateFormat::Millis);
        assert!(matches!(rows.read_row(&mut dest), Err(DruidError::Scan(_))));
    }

    #[test]
    fn test_failed_read_leaves_destinations_untouched() {
        let table = Table {
            columns: vec!["added".into(), "__time".into()],
            rows: vec![vec![Value::Int(36), Value::String("not a date".into())]],
        };
        let mut rows = Rows::new(table, Some("__time".into()), DateFormat::Iso);
        let mut dest = vec![Datum::Int(-1), Datum::Bool(true)];

        assert!(matches!(rows.read_row(&mut dest), Err(DruidError::Scan(_))));
        assert_eq!(dest, vec![Datum::Int(-1), Datum::Bool(true)]);
        assert_eq!(rows.position(), 0);
    }

    #[test]
    fn test_null_date_is_null() {
        let mut rows = single("t", Value::Null, DateFormat::Iso);
        let mut dest = vec![Datum::Int(1)];
        rows.read_row(&mut dest).unwrap();
        assert_eq!(dest[0], Datum::Null);
    }

    #[test]
    fn test_unsupported_value_is_scan_error() {
        let table = Table {
            columns: vec!["tags".into()],
            rows: vec![vec![Value::Unsupported("array")], vec![Value::Int(1)]],
        };
        let mut rows = Rows::new(table, None, DateFormat::Iso);

        let first = rows.next().unwrap();
        assert!(matches!(first, Err(DruidError::Scan(msg)) if msg.contains("array")));
        assert_eq!(rows.next().unwrap().unwrap(), vec![Datum::Int(1)]);
        assert!(rows.next().is_none());
    }
}
