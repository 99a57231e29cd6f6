//! Account and endpoint configuration
//!
//! An [`AccountConfig`] is owned by the host's account store and
//! handed to this crate per request, with the secret already
//! decrypted. Nothing here is ever persisted.

use crate::error::{Error, Result};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default transport timeout for connect, TLS handshake and login.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Wire protocol a session is opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Imap,
    Smtp,
    Pop3,
}

impl Protocol {
    /// Port on which the protocol speaks TLS from the first byte.
    #[must_use]
    pub const fn implicit_tls_port(self) -> u16 {
        match self {
            Self::Imap => 993,
            Self::Pop3 => 995,
            Self::Smtp => 465,
        }
    }

    /// Port on which the protocol starts in plaintext and upgrades.
    /// POP3 has no well-known upgrade port.
    #[must_use]
    pub const fn upgrade_port(self) -> Option<u16> {
        match self {
            Self::Imap => Some(143),
            Self::Smtp => Some(587),
            Self::Pop3 => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Imap => "imap",
            Self::Smtp => "smtp",
            Self::Pop3 => "pop3",
        })
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "imap" => Ok(Self::Imap),
            "smtp" => Ok(Self::Smtp),
            "pop3" | "pop" => Ok(Self::Pop3),
            other => Err(Error::Config(format!("Unknown protocol: {other}"))),
        }
    }
}

/// Security mode as configured by the account owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SecurityMode {
    /// `ssl` / `tls`: TLS from the first byte.
    Tls,
    /// `starttls`: plaintext, then an explicit upgrade.
    StartTls,
    /// `none` / `plain`.
    Plain,
    /// Not configured; decided by port.
    #[default]
    Auto,
}

impl FromStr for SecurityMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ssl" | "tls" => Ok(Self::Tls),
            "starttls" => Ok(Self::StartTls),
            "none" | "plain" => Ok(Self::Plain),
            "" | "auto" => Ok(Self::Auto),
            other => Err(Error::Config(format!("Unknown security mode: {other}"))),
        }
    }
}

/// How a connection is actually opened, after resolving the
/// configured [`SecurityMode`] against the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    ImplicitTls,
    StartTls,
    Plain,
}

/// One server endpoint (incoming or outgoing).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub security: SecurityMode,
}

impl Endpoint {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, security: SecurityMode) -> Self {
        Self {
            host: host.into(),
            port,
            security,
        }
    }

    /// Resolve the transport for `protocol`.
    ///
    /// Explicit TLS or the protocol's implicit-TLS port opens TLS
    /// immediately; explicit STARTTLS or the protocol's upgrade port
    /// upgrades after the greeting; anything else is plaintext.
    #[must_use]
    pub fn transport(&self, protocol: Protocol) -> Transport {
        if self.security == SecurityMode::Tls || self.port == protocol.implicit_tls_port() {
            Transport::ImplicitTls
        } else if self.security == SecurityMode::StartTls
            || protocol.upgrade_port() == Some(self.port)
        {
            Transport::StartTls
        } else {
            Transport::Plain
        }
    }

    pub(crate) fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Everything needed to open a session for one mail account.
#[derive(Clone)]
pub struct AccountConfig {
    /// Login name and mailbox address.
    pub address: String,
    /// Opaque secret, decrypted by the caller.
    pub secret: String,
    /// IMAP or POP3 server.
    pub incoming: Endpoint,
    /// SMTP server.
    pub outgoing: Endpoint,
    /// Free-form provider hint (`gmail`, `outlook`, ...).
    pub provider_hint: Option<String>,
    /// Skip certificate verification (self-signed bridges).
    pub accept_invalid_certs: bool,
    pub timeout: Duration,
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("address", &self.address)
            .field("secret", &"<redacted>")
            .field("incoming", &self.incoming)
            .field("outgoing", &self.outgoing)
            .field("provider_hint", &self.provider_hint)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl AccountConfig {
    #[must_use]
    pub fn new(
        address: impl Into<String>,
        secret: impl Into<String>,
        incoming: Endpoint,
        outgoing: Endpoint,
    ) -> Self {
        Self {
            address: address.into(),
            secret: secret.into(),
            incoming,
            outgoing,
            provider_hint: None,
            accept_invalid_certs: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Endpoint used for `protocol`.
    #[must_use]
    pub const fn endpoint(&self, protocol: Protocol) -> &Endpoint {
        match protocol {
            Protocol::Imap | Protocol::Pop3 => &self.incoming,
            Protocol::Smtp => &self.outgoing,
        }
    }

    /// Load an account configuration from environment variables
    ///
    /// Reads from `.env` file if present. Required variables:
    /// - `MAIL_ADDRESS`
    /// - `MAIL_SECRET`
    ///
    /// Optional (with defaults):
    /// - `MAIL_IMAP_HOST` (default: `127.0.0.1`)
    /// - `MAIL_IMAP_PORT` (default: `993`)
    /// - `MAIL_IMAP_SECURITY` (default: decided by port)
    /// - `MAIL_SMTP_HOST` (default: the IMAP host)
    /// - `MAIL_SMTP_PORT` (default: `465`)
    /// - `MAIL_SMTP_SECURITY` (default: decided by port)
    /// - `MAIL_PROVIDER`
    /// - `MAIL_ACCEPT_INVALID_CERTS` (default: `false`)
    /// - `MAIL_TIMEOUT_SECS` (default: `30`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required variable is missing or a
    /// value does not parse.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let imap_host = env::var("MAIL_IMAP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let incoming = Endpoint::new(
            imap_host.clone(),
            parse_port("MAIL_IMAP_PORT", 993)?,
            parse_security("MAIL_IMAP_SECURITY")?,
        );
        let outgoing = Endpoint::new(
            env::var("MAIL_SMTP_HOST").unwrap_or(imap_host),
            parse_port("MAIL_SMTP_PORT", 465)?,
            parse_security("MAIL_SMTP_SECURITY")?,
        );

        let timeout = match env::var("MAIL_TIMEOUT_SECS") {
            Ok(v) => Duration::from_secs(
                v.parse()
                    .map_err(|e| Error::Config(format!("Invalid MAIL_TIMEOUT_SECS: {e}")))?,
            ),
            Err(_) => DEFAULT_TIMEOUT,
        };

        Ok(Self {
            address: env::var("MAIL_ADDRESS")
                .map_err(|_| Error::Config("MAIL_ADDRESS not set".into()))?,
            secret: env::var("MAIL_SECRET")
                .map_err(|_| Error::Config("MAIL_SECRET not set".into()))?,
            incoming,
            outgoing,
            provider_hint: env::var("MAIL_PROVIDER").ok().filter(|p| !p.is_empty()),
            accept_invalid_certs: env::var("MAIL_ACCEPT_INVALID_CERTS")
                .is_ok_and(|v| matches!(v.trim(), "1" | "true" | "yes")),
            timeout,
        })
    }
}

fn parse_port(var: &str, default: u16) -> Result<u16> {
    env::var(var).map_or(Ok(default), |v| {
        v.parse()
            .map_err(|e| Error::Config(format!("Invalid {var}: {e}")))
    })
}

fn parse_security(var: &str) -> Result<SecurityMode> {
    env::var(var).map_or(Ok(SecurityMode::Auto), |v| v.parse())
}
