//! QAIL driver for Apache Druid.
//!
//! Runs SQL against a Druid broker's HTTP endpoint and exposes the result as
//! a row cursor. Responses can be line-delimited JSON, a single JSON
//! document, or Smile; all three decode to the same typed rows.
//!
//! # Example
//! ```ignore
//! use qail_druid::prelude::*;
//!
//! let conn = DruidConnection::connect(
//!     DruidConfig::builder()
//!         .broker("http://localhost:8082")
//!         .date_field("__time")
//!         .build(),
//! )
//! .await?;
//!
//! let mut rows = conn.query("SELECT __time, channel FROM wikiticker LIMIT 5").await?;
//! for row in &mut rows {
//!     let row = row?;
//!     println!("{:?} {:?}", row[0].as_timestamp(), row[1].as_str());
//! }
//! ```

pub mod config;
pub mod connection;
pub mod context;
pub mod decoder;
pub mod error;
pub mod pipeline;
pub mod rows;
pub mod value;

pub use config::{DateFormat, DruidConfig, DruidConfigBuilder, ResultFormat};
pub use connection::{DruidConnection, QueryExecutor};
pub use context::Context;
pub use decoder::WireFormat;
pub use error::{DruidError, DruidResult};
pub use rows::Rows;
pub use value::{Datum, Value};

pub mod prelude {
    pub use crate::{Context, DateFormat, DruidConfig, DruidConnection, DruidError, DruidResult};
    pub use crate::{Datum, QueryExecutor, ResultFormat, Rows, Value, WireFormat};
}
