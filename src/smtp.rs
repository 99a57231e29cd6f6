//! SMTP session opening
//!
//! Delivery goes through the host's outgoing channel; this module only
//! opens and verifies an authenticated SMTP transport for the account.

use crate::config::{AccountConfig, Protocol, Transport};
use crate::error::{Error, Result};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, Tokio1Executor};
use tracing::{debug, info};

/// A verified SMTP transport.
pub struct SmtpSession {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl std::fmt::Debug for SmtpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SmtpSession")
    }
}

impl SmtpSession {
    /// Build the transport from the outgoing endpoint and run a
    /// connect/EHLO/AUTH/QUIT round trip against it.
    ///
    /// # Errors
    ///
    /// [`Error::Connectivity`] or [`Error::Auth`], depending on where
    /// the round trip stopped.
    pub async fn connect(config: &AccountConfig) -> Result<Self> {
        let transport = build_transport(config)?;
        let addr = config.outgoing.address();
        debug!("Testing SMTP connection to {}", addr);

        match transport.test_connection().await {
            Ok(true) => {
                info!("Connected to SMTP server {}", addr);
                Ok(Self { transport })
            }
            Ok(false) => Err(Error::Connectivity(format!(
                "SMTP server {addr} did not accept the connection"
            ))),
            Err(e) if e.is_permanent() => Err(Error::Auth(format!("SMTP login rejected: {e}"))),
            Err(e) => Err(Error::Connectivity(format!("SMTP connection failed: {e}"))),
        }
    }

    /// The underlying lettre transport, for callers that deliver mail.
    #[must_use]
    pub const fn transport(&self) -> &AsyncSmtpTransport<Tokio1Executor> {
        &self.transport
    }

    /// Drop the transport. Each lettre command opened and closed its
    /// own connection, so nothing stays open.
    pub fn release(self) {
        debug!("Releasing SMTP session");
    }
}

fn build_transport(config: &AccountConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
    let endpoint = &config.outgoing;
    let host = endpoint.host.as_str();

    let builder = match endpoint.transport(Protocol::Smtp) {
        Transport::Plain => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
        Transport::ImplicitTls if config.accept_invalid_certs => {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                .tls(Tls::Wrapper(dangerous_tls(host)?))
        }
        Transport::StartTls if config.accept_invalid_certs => {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                .tls(Tls::Required(dangerous_tls(host)?))
        }
        Transport::ImplicitTls => AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| Error::Config(format!("SMTP TLS relay init failed: {e}")))?,
        Transport::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| Error::Config(format!("SMTP STARTTLS relay init failed: {e}")))?,
    };

    Ok(builder
        .port(endpoint.port)
        .credentials(Credentials::new(
            config.address.clone(),
            config.secret.clone(),
        ))
        .timeout(Some(config.timeout))
        .build())
}

fn dangerous_tls(host: &str) -> Result<TlsParameters> {
    TlsParameters::builder(host.to_string())
        .dangerous_accept_invalid_certs(true)
        .dangerous_accept_invalid_hostnames(true)
        .build_rustls()
        .map_err(|e| Error::Config(format!("SMTP TLS parameters: {e}")))
}
