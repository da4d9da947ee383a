//! Connection configuration and DSN handling.
//!
//! A DSN looks like
//! `[scheme://][user:pass@]host[:port][/path]?pingEndpoint=..&queryEndpoint=..&sslenable=..`.
//! The scheme is informational only: TLS is decided by `sslenable`, falling
//! back to `https://` when the parameter is absent.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use url::Url;

use crate::decoder::WireFormat;
use crate::error::{DruidError, DruidResult};

/// Default health check path of a Druid broker.
pub const DEFAULT_PING_ENDPOINT: &str = "/status/health";

/// Default SQL endpoint of a Druid broker.
pub const DEFAULT_QUERY_ENDPOINT: &str = "/druid/v2/sql";

/// Characters left as-is in DSN userinfo; everything else is percent-encoded.
const USERINFO: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// How the configured date field is turned into a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateFormat {
    /// ISO-8601 / RFC 3339 strings, e.g. `2015-09-12T00:46:58.771Z`.
    #[default]
    Iso,
    /// Milliseconds since the epoch.
    Millis,
    /// Seconds since the epoch.
    Posix,
    /// ISO strings or epoch milliseconds, whichever the cell holds.
    Auto,
}

impl DateFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateFormat::Iso => "iso",
            DateFormat::Millis => "millis",
            DateFormat::Posix => "posix",
            DateFormat::Auto => "auto",
        }
    }
}

impl FromStr for DateFormat {
    type Err = DruidError;

    fn from_str(s: &str) -> DruidResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "iso" => Ok(DateFormat::Iso),
            "millis" => Ok(DateFormat::Millis),
            "posix" => Ok(DateFormat::Posix),
            "auto" => Ok(DateFormat::Auto),
            other => Err(DruidError::Config(format!("unsupported date format '{}'", other))),
        }
    }
}

impl fmt::Display for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `resultFormat` requested from the SQL endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultFormat {
    /// One JSON array per line.
    #[default]
    ArrayLines,
    /// A single JSON array of arrays.
    Array,
}

impl ResultFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultFormat::ArrayLines => "arrayLines",
            ResultFormat::Array => "array",
        }
    }
}

impl FromStr for ResultFormat {
    type Err = DruidError;

    fn from_str(s: &str) -> DruidResult<Self> {
        match s {
            "arrayLines" => Ok(ResultFormat::ArrayLines),
            "array" => Ok(ResultFormat::Array),
            other => Err(DruidError::Config(format!("unsupported result format '{}'", other))),
        }
    }
}

/// Resolved configuration for one Druid connection.
#[derive(Debug, Clone, PartialEq)]
pub struct DruidConfig {
    /// Broker base address: `http[s]://host[:port][/path]`.
    pub broker_addr: String,
    pub user: String,
    pub password: String,
    pub ping_endpoint: String,
    pub query_endpoint: String,
    /// Column whose values are scanned as timestamps.
    pub date_field: Option<String>,
    pub date_format: DateFormat,
    pub result_format: ResultFormat,
    /// Request Smile-encoded responses.
    pub smile: bool,
    pub use_tls: bool,
    /// Client-wide request timeout.
    pub timeout: Option<Duration>,
}

impl Default for DruidConfig {
    fn default() -> Self {
        Self {
            broker_addr: String::new(),
            user: String::new(),
            password: String::new(),
            ping_endpoint: DEFAULT_PING_ENDPOINT.to_string(),
            query_endpoint: DEFAULT_QUERY_ENDPOINT.to_string(),
            date_field: None,
            date_format: DateFormat::Iso,
            result_format: ResultFormat::ArrayLines,
            smile: false,
            use_tls: false,
            timeout: None,
        }
    }
}

impl DruidConfig {
    /// Create a new configuration builder
    pub fn builder() -> DruidConfigBuilder {
        DruidConfigBuilder::default()
    }

    /// Parse a DSN into a resolved configuration.
    pub fn parse_dsn(dsn: &str) -> DruidResult<Self> {
        let dsn = dsn.trim();
        if dsn.is_empty() {
            return Err(DruidError::Config("empty DSN".to_string()));
        }

        let normalized = if dsn.contains("://") {
            dsn.to_string()
        } else if let Some(rest) = dsn.strip_prefix("//") {
            format!("http://{}", rest)
        } else {
            format!("http://{}", dsn)
        };

        let url = Url::parse(&normalized)
            .map_err(|e| DruidError::Config(format!("invalid DSN '{}': {}", dsn, e)))?;

        let host = match url.host_str() {
            Some(h) if !h.is_empty() => h,
            _ => return Err(DruidError::Config(format!("DSN '{}' has no broker host", dsn))),
        };

        let mut cfg = DruidConfig {
            user: decode_userinfo(url.username())?,
            password: decode_userinfo(url.password().unwrap_or_default())?,
            use_tls: url.scheme() == "https",
            ..Default::default()
        };

        for (key, value) in url.query_pairs() {
            match &*key {
                "pingEndpoint" if !value.is_empty() => cfg.ping_endpoint = value.into_owned(),
                "queryEndpoint" if !value.is_empty() => cfg.query_endpoint = value.into_owned(),
                "pingEndpoint" | "queryEndpoint" => {}
                "sslenable" => cfg.use_tls = parse_bool("sslenable", &value)?,
                "smile" => cfg.smile = parse_bool("smile", &value)?,
                "dateField" if !value.is_empty() => cfg.date_field = Some(value.into_owned()),
                "dateField" => {}
                "dateFormat" => cfg.date_format = value.parse()?,
                "resultFormat" => cfg.result_format = value.parse()?,
                "timeout" => {
                    let ms: u64 = value.parse().map_err(|_| {
                        DruidError::Config(format!("timeout must be milliseconds, got '{}'", value))
                    })?;
                    cfg.timeout = Some(Duration::from_millis(ms));
                }
                other => tracing::warn!("Ignoring unknown DSN parameter '{}'", other),
            }
        }

        // the port survives a scheme flip by sslenable; only the output default is elided
        let (scheme, default_port) = if cfg.use_tls { ("https", 443) } else { ("http", 80) };
        let port = match url.port_or_known_default() {
            Some(p) if p != default_port => format!(":{}", p),
            _ => String::new(),
        };
        let path = url.path().trim_end_matches('/');
        cfg.broker_addr = format!("{}://{}{}{}", scheme, host, port, path);

        Ok(cfg)
    }

    /// Format this configuration as a normalized DSN.
    ///
    /// Optional parameters are only emitted when they differ from defaults.
    pub fn format_dsn(&self) -> DruidResult<String> {
        self.validate()?;

        let address = self
            .broker_addr
            .split_once("://")
            .map_or(self.broker_addr.as_str(), |(_, rest)| rest);
        let scheme = if self.use_tls { "https" } else { "http" };

        let mut auth = String::new();
        if !self.user.is_empty() {
            auth.extend(utf8_percent_encode(&self.user, USERINFO));
            if !self.password.is_empty() {
                auth.push(':');
                auth.extend(utf8_percent_encode(&self.password, USERINFO));
            }
            auth.push('@');
        }

        let mut dsn = format!(
            "{}://{}{}?pingEndpoint={}&queryEndpoint={}&sslenable={}",
            scheme,
            auth,
            address,
            non_empty_or(&self.ping_endpoint, DEFAULT_PING_ENDPOINT),
            non_empty_or(&self.query_endpoint, DEFAULT_QUERY_ENDPOINT),
            self.use_tls
        );

        if let Some(field) = &self.date_field {
            dsn.push_str(&format!("&dateField={}", field));
        }
        if self.date_format != DateFormat::Iso {
            dsn.push_str(&format!("&dateFormat={}", self.date_format));
        }
        if self.result_format != ResultFormat::ArrayLines {
            dsn.push_str(&format!("&resultFormat={}", self.result_format.as_str()));
        }
        if self.smile {
            dsn.push_str("&smile=true");
        }
        if let Some(timeout) = self.timeout {
            dsn.push_str(&format!("&timeout={}", timeout.as_millis()));
        }

        Ok(dsn)
    }

    /// Check that a query is possible with this configuration.
    ///
    /// The broker address must carry an `http` or `https` scheme that agrees
    /// with `use_tls`.
    pub fn validate(&self) -> DruidResult<()> {
        if self.broker_addr.trim().is_empty() {
            return Err(DruidError::Config("you must specify a broker address".to_string()));
        }

        let expected = if self.use_tls { "https" } else { "http" };
        match self.broker_addr.split_once("://") {
            Some((scheme, _)) if scheme == expected => Ok(()),
            Some((scheme, _)) => Err(DruidError::Config(format!(
                "broker address scheme '{}' conflicts with TLS {}",
                scheme,
                if self.use_tls { "enabled" } else { "disabled" }
            ))),
            None => Err(DruidError::Config(format!(
                "broker address '{}' has no http:// or https:// scheme",
                self.broker_addr
            ))),
        }
    }

    /// Wire format the decoder should expect for this configuration.
    pub fn wire_format(&self) -> WireFormat {
        if self.smile {
            return WireFormat::Smile;
        }
        match self.result_format {
            ResultFormat::ArrayLines => WireFormat::JsonLines,
            ResultFormat::Array => WireFormat::JsonArray,
        }
    }

    pub(crate) fn query_url(&self) -> String {
        format!("{}{}", self.broker_addr, self.query_endpoint)
    }

    pub(crate) fn ping_url(&self) -> String {
        format!("{}{}", self.broker_addr, self.ping_endpoint)
    }
}

impl FromStr for DruidConfig {
    type Err = DruidError;

    fn from_str(s: &str) -> DruidResult<Self> {
        Self::parse_dsn(s)
    }
}

fn parse_bool(key: &str, value: &str) -> DruidResult<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(DruidError::Config(format!("{} must be true or false, got '{}'", key, other))),
    }
}

fn decode_userinfo(part: &str) -> DruidResult<String> {
    percent_decode_str(part)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| DruidError::Config(format!("DSN credentials are not valid UTF-8: {}", e)))
}

fn non_empty_or<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() { default } else { value }
}

/// Builder for DruidConfig
#[derive(Debug, Default)]
pub struct DruidConfigBuilder {
    config: DruidConfig,
    tls: Option<bool>,
}

impl DruidConfigBuilder {
    /// Set the broker address, e.g. `http://localhost:8082` or `localhost:8082`.
    ///
    /// Without [`tls`](Self::tls), an `https://` address enables TLS.
    pub fn broker(mut self, addr: impl Into<String>) -> Self {
        self.config.broker_addr = addr.into().trim_end_matches('/').to_string();
        self
    }

    /// Set basic auth credentials.
    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.user = user.into();
        self.config.password = password.into();
        self
    }

    pub fn ping_endpoint(mut self, path: impl Into<String>) -> Self {
        self.config.ping_endpoint = path.into();
        self
    }

    pub fn query_endpoint(mut self, path: impl Into<String>) -> Self {
        self.config.query_endpoint = path.into();
        self
    }

    /// Scan this column as a timestamp.
    pub fn date_field(mut self, field: impl Into<String>) -> Self {
        self.config.date_field = Some(field.into());
        self
    }

    pub fn date_format(mut self, format: DateFormat) -> Self {
        self.config.date_format = format;
        self
    }

    pub fn result_format(mut self, format: ResultFormat) -> Self {
        self.config.result_format = format;
        self
    }

    /// Request Smile-encoded responses.
    pub fn smile(mut self, enabled: bool) -> Self {
        self.config.smile = enabled;
        self
    }

    /// Force TLS on or off; the broker scheme is rewritten to match.
    pub fn tls(mut self, enabled: bool) -> Self {
        self.tls = Some(enabled);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Build the configuration
    pub fn build(self) -> DruidConfig {
        let mut config = self.config;
        let (scheme, address) = match config.broker_addr.split_once("://") {
            Some((scheme, rest)) => (Some(scheme), rest),
            None => (None, config.broker_addr.as_str()),
        };

        config.use_tls = self.tls.unwrap_or(scheme == Some("https"));
        if !address.is_empty() {
            let scheme = if config.use_tls { "https" } else { "http" };
            config.broker_addr = format!("{}://{}", scheme, address);
        }
        config
    }
}
