//! Connection configuration

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::{PgProcError, Result};

/// Default PostgreSQL port
pub const DEFAULT_PORT: u16 = 5432;

/// TLS negotiation mode, using libpq's `sslmode` names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    #[default]
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    /// The libpq `sslmode` spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        }
    }

    pub fn parse(mode: &str) -> Result<Self> {
        match mode.to_lowercase().as_str() {
            "disable" => Ok(SslMode::Disable),
            "allow" | "prefer" => Ok(SslMode::Prefer),
            "require" => Ok(SslMode::Require),
            "verify-ca" | "verify_ca" => Ok(SslMode::VerifyCa),
            "verify-full" | "verify_full" => Ok(SslMode::VerifyFull),
            other => Err(PgProcError::Configuration(format!(
                "unknown ssl mode: {}",
                other
            ))),
        }
    }
}

/// Timestamps standing in for PostgreSQL's `-infinity` and `infinity`.
///
/// The driver decodes an infinite timestamp or date into the matching
/// sentinel and encodes a parameter equal to a sentinel as the infinite
/// value, so both markers round-trip unchanged. The value is handed to each
/// connection explicitly; nothing is stored process-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampSentinels {
    pub negative_infinity: NaiveDateTime,
    pub infinity: NaiveDateTime,
}

impl TimestampSentinels {
    pub fn new(negative_infinity: NaiveDateTime, infinity: NaiveDateTime) -> Result<Self> {
        if negative_infinity >= infinity {
            return Err(PgProcError::Configuration(format!(
                "negative infinity sentinel {} must be earlier than infinity sentinel {}",
                negative_infinity, infinity
            )));
        }
        Ok(Self {
            negative_infinity,
            infinity,
        })
    }
}

impl Default for TimestampSentinels {
    fn default() -> Self {
        let at_midnight = |year| {
            NaiveDate::from_ymd_opt(year, 1, 1)
                .unwrap_or(NaiveDate::MIN)
                .and_time(NaiveTime::MIN)
        };
        Self {
            negative_infinity: at_midnight(0),
            infinity: at_midnight(9999),
        }
    }
}

/// Everything needed to open a connection for calling routines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Host address
    pub host: String,
    /// Port number (0 for default)
    pub port: u16,
    /// Database name
    pub database: String,
    /// Username
    pub username: Option<String>,
    /// Password
    pub password: Option<String>,
    /// TLS negotiation mode
    pub ssl_mode: SslMode,
    /// Root certificate used to verify the server (PEM)
    pub ssl_ca_cert: Option<String>,
    /// Application name reported to the server
    pub application_name: Option<String>,
    /// Connect timeout in seconds (0 disables the timeout)
    pub connect_timeout_secs: u64,
    /// Infinity markers for timestamp conversion
    pub sentinels: TimestampSentinels,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            database: "postgres".to_string(),
            username: None,
            password: None,
            ssl_mode: SslMode::default(),
            ssl_ca_cert: None,
            application_name: Some("pgproc".to_string()),
            connect_timeout_secs: 10,
            sentinels: TimestampSentinels::default(),
        }
    }
}

impl ConnectionConfig {
    /// Create a configuration for the given server and database
    pub fn new(host: &str, port: u16, database: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            database: database.to_string(),
            ..Self::default()
        }
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| {
            PgProcError::Configuration(format!("invalid connection configuration: {}", e))
        })
    }

    /// Port to connect to, substituting the default for 0
    pub fn effective_port(&self) -> u16 {
        if self.port > 0 { self.port } else { DEFAULT_PORT }
    }

    // Builder methods
    pub fn username(mut self, username: &str) -> Self {
        self.username = Some(username.to_string());
        self
    }

    pub fn password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn ssl_mode(mut self, mode: SslMode) -> Self {
        self.ssl_mode = mode;
        self
    }

    pub fn ssl_ca_cert(mut self, path: &str) -> Self {
        self.ssl_ca_cert = Some(path.to_string());
        self
    }

    pub fn application_name(mut self, name: &str) -> Self {
        self.application_name = Some(name.to_string());
        self
    }

    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    pub fn sentinels(mut self, sentinels: TimestampSentinels) -> Self {
        self.sentinels = sentinels;
        self
    }

    /// Build a `postgresql://` URL, omitting the password
    pub fn display_url(&self) -> String {
        let mut url = "postgresql://".to_string();
        if let Some(user) = &self.username {
            url.push_str(user);
            url.push('@');
        }
        url.push_str(&format!(
            "{}:{}/{}",
            self.host,
            self.effective_port(),
            self.database
        ));
        url
    }
}
