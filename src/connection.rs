//! Druid connection: transport ownership and query execution.
//!
//! # Example
//! ```ignore
//! use qail_druid::{Context, DruidConnection, Datum};
//! use std::time::Duration;
//!
//! let conn = DruidConnection::connect_dsn("localhost:8082?sslenable=false").await?;
//! conn.ping().await?;
//!
//! let ctx = Context::with_timeout(Duration::from_secs(5));
//! let mut rows = conn.query_context(&ctx, "SELECT channel, added FROM wikiticker LIMIT 10").await?;
//! let mut dest = vec![Datum::Null; rows.columns().len()];
//! while rows.read_row(&mut dest)? {
//!     println!("{:?}", dest);
//! }
//! conn.close().await?;
//! ```

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tokio::sync::Mutex;

use crate::config::DruidConfig;
use crate::context::Context;
use crate::decoder::{self, Decoded};
use crate::error::{DruidError, DruidResult};
use crate::pipeline::{self, RequestPipeline};
use crate::rows::Rows;

/// Minimal capability set a driver-contract adapter needs from a connection.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run a query without cancellation.
    async fn query(&self, sql: &str) -> DruidResult<Rows>;

    /// Run a query that gives up when `ctx` fires.
    async fn query_context(&self, ctx: &Context, sql: &str) -> DruidResult<Rows>;

    /// Check broker health.
    async fn ping(&self) -> DruidResult<()>;

    /// Release the transport. Idempotent.
    async fn close(&self) -> DruidResult<()>;
}

struct ConnState {
    closed: bool,
    client: Option<Client>,
    pipeline: Option<RequestPipeline>,
}

/// One logical handle to a Druid broker.
///
/// Every query is a single stateless HTTP exchange; nothing is retried.
pub struct DruidConnection {
    config: DruidConfig,
    state: Mutex<ConnState>,
}

impl DruidConnection {
    /// Open a connection from a resolved configuration.
    ///
    /// No request is made; use [`ping`](Self::ping) to check the broker.
    pub async fn connect(config: DruidConfig) -> DruidResult<Self> {
        config.validate()?;

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| DruidError::Config(format!("failed to build HTTP client: {}", e)))?;

        let pipeline = RequestPipeline::start(client.clone());
        tracing::debug!("Opened Druid connection to {}", config.broker_addr);

        Ok(Self {
            config,
            state: Mutex::new(ConnState {
                closed: false,
                client: Some(client),
                pipeline: Some(pipeline),
            }),
        })
    }

    /// Open a connection from a DSN string.
    pub async fn connect_dsn(dsn: &str) -> DruidResult<Self> {
        Self::connect(DruidConfig::parse_dsn(dsn)?).await
    }

    pub fn config(&self) -> &DruidConfig {
        &self.config
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    async fn client(&self) -> DruidResult<Client> {
        let state = self.state.lock().await;
        state.client.clone().ok_or(DruidError::ConnectionClosed)
    }

    async fn live(&self) -> DruidResult<(Client, RequestPipeline)> {
        let state = self.state.lock().await;
        match (&state.client, &state.pipeline) {
            (Some(client), Some(pipeline)) => Ok((client.clone(), pipeline.clone())),
            _ => Err(DruidError::ConnectionClosed),
        }
    }

    /// Run a query and wait for the full result.
    pub async fn query(&self, sql: &str) -> DruidResult<Rows> {
        let client = self.client().await?;
        let request = pipeline::build_request(&client, &self.config, sql)?;

        tracing::debug!("Dispatching Druid query: {}", sql);
        let body = pipeline::exchange(&client, request).await?;
        self.rows_from(&body)
    }

    /// Run a query that returns early with `Cancelled`/`DeadlineExceeded`
    /// when `ctx` fires first.
    ///
    /// The HTTP request itself is not aborted server-side; only the local
    /// wait is abandoned. A background context takes the plain path.
    pub async fn query_context(&self, ctx: &Context, sql: &str) -> DruidResult<Rows> {
        if !ctx.is_cancellable() {
            return self.query(sql).await;
        }
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        let (client, pipeline) = self.live().await?;
        let mut request = pipeline::build_request(&client, &self.config, sql)?;
        if let Some(remaining) = ctx.remaining() {
            *request.timeout_mut() = Some(remaining);
        }

        tracing::debug!("Dispatching cancellable Druid query: {}", sql);
        let body = pipeline.submit(ctx, request).await?;
        self.rows_from(&body)
    }

    /// Hit the broker's health endpoint; anything but 200 is an error.
    pub async fn ping(&self) -> DruidResult<()> {
        let client = self.client().await?;
        let response = pipeline::with_auth(client.get(self.config.ping_url()), &self.config)
            .send()
            .await
            .map_err(|e| DruidError::Ping(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(DruidError::Ping(format!("health endpoint returned {}", status)));
        }
        Ok(())
    }

    /// Stop the background worker and drop the transport.
    pub async fn close(&self) -> DruidResult<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Ok(());
        }

        state.closed = true;
        if let Some(pipeline) = state.pipeline.take() {
            pipeline.shutdown();
        }
        state.client = None;

        tracing::debug!("Closed Druid connection to {}", self.config.broker_addr);
        Ok(())
    }

    fn rows_from(&self, body: &[u8]) -> DruidResult<Rows> {
        match decoder::decode(body, self.config.wire_format())? {
            Decoded::Empty => Err(DruidError::NoRows),
            Decoded::Table(table) => Ok(Rows::new(
                table,
                self.config.date_field.clone(),
                self.config.date_format,
            )),
        }
    }
}

#[async_trait]
impl QueryExecutor for DruidConnection {
    async fn query(&self, sql: &str) -> DruidResult<Rows> {
        DruidConnection::query(self, sql).await
    }

    async fn query_context(&self, ctx: &Context, sql: &str) -> DruidResult<Rows> {
        DruidConnection::query_context(self, ctx, sql).await
    }

    async fn ping(&self) -> DruidResult<()> {
        DruidConnection::ping(self).await
    }

    async fn close(&self) -> DruidResult<()> {
        DruidConnection::close(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_requires_broker() {
        let err = DruidConnection::connect(DruidConfig::default()).await.err().unwrap();
        assert!(matches!(err, DruidError::Config(_)));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let conn = DruidConnection::connect_dsn("localhost:8082").await.unwrap();
        assert!(!conn.is_closed().await);

        conn.close().await.unwrap();
        conn.close().await.unwrap();
        assert!(conn.is_closed().await);
    }

    #[tokio::test]
    async fn test_operations_after_close_fail() {
        let conn = DruidConnection::connect_dsn("localhost:8082").await.unwrap();
        conn.close().await.unwrap();

        assert!(matches!(conn.query("SELECT 1").await, Err(DruidError::ConnectionClosed)));
        assert!(matches!(conn.ping().await, Err(DruidError::ConnectionClosed)));

        let (ctx, _token) = Context::with_cancel();
        assert!(matches!(
            conn.query_context(&ctx, "SELECT 1").await,
            Err(DruidError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_already_fired_context_short_circuits() {
        let conn = DruidConnection::connect_dsn("localhost:8082").await.unwrap();
        let (ctx, token) = Context::with_cancel();
        token.cancel();

        assert!(matches!(conn.query_context(&ctx, "SELECT 1").await, Err(DruidError::Cancelled)));
    }
}
