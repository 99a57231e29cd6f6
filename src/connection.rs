//! Transport session factory
//!
//! Opens authenticated sessions for IMAP, SMTP and POP3. Every
//! `MailClient` operation opens exactly one session here and releases
//! it before returning.

use crate::config::{AccountConfig, Endpoint, Protocol, Transport};
use crate::error::{Error, Result, is_transport_failure};
use crate::flag::Flag;
use crate::pop3::Pop3Session;
use crate::smtp::SmtpSession;
use async_imap::error::ValidateError;
use futures::TryStreamExt;
use rustls::pki_types::ServerName;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, info};

/// A TCP stream that may or may not be wrapped in TLS.
pub enum MailStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for MailStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MailStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_flush(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

impl std::fmt::Debug for MailStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(_) => write!(f, "MailStream::Plain"),
            Self::Tls(_) => write!(f, "MailStream::Tls"),
        }
    }
}

/// An authenticated IMAP session over a plain or TLS stream.
pub type ImapSession = async_imap::Session<Compat<MailStream>>;

/// A live, authenticated handle to one protocol endpoint.
#[derive(Debug)]
pub enum Session {
    Imap(Box<ImapSession>),
    Smtp(SmtpSession),
    Pop3(Pop3Session),
}

impl Session {
    /// Open and authenticate a session for `protocol`.
    ///
    /// # Errors
    ///
    /// [`Error::Connectivity`] when the server cannot be reached,
    /// [`Error::Auth`] when it rejects the credentials.
    pub async fn open(config: &AccountConfig, protocol: Protocol) -> Result<Self> {
        match protocol {
            Protocol::Imap => Ok(Self::Imap(Box::new(connect(config).await?))),
            Protocol::Smtp => Ok(Self::Smtp(SmtpSession::connect(config).await?)),
            Protocol::Pop3 => Ok(Self::Pop3(Pop3Session::connect(config).await?)),
        }
    }

    /// Log out and drop the connection. Failures are logged, not
    /// returned: the operation result has already been decided.
    pub async fn release(self) {
        match self {
            Self::Imap(session) => release(*session).await,
            Self::Smtp(session) => session.release(),
            Self::Pop3(session) => session.release().await,
        }
    }
}

/// Build a TLS connector.
///
/// Uses the webpki root store unless `accept_invalid_certs` is set,
/// in which case every certificate is accepted (local bridges with
/// self-signed certificates).
pub(crate) fn tls_connector(accept_invalid_certs: bool) -> Result<TlsConnector> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Connectivity(format!("TLS setup failed: {e}")))?;

    let config = if accept_invalid_certs {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(DangerousVerifier))
            .with_no_client_auth()
    } else {
        let roots = rustls::RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        builder.with_root_certificates(roots).with_no_client_auth()
    };
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Run `fut` under the transport timeout, reporting expiry as a
/// connectivity failure for `what`.
pub(crate) async fn with_timeout<T>(
    timeout: Duration,
    what: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| Error::Connectivity(format!("{what} timed out after {timeout:?}")))?
}

/// Open a TCP connection to `endpoint`.
pub(crate) async fn tcp_connect(endpoint: &Endpoint, timeout: Duration) -> Result<TcpStream> {
    let addr = endpoint.address();
    debug!("Connecting to {}", addr);
    with_timeout(timeout, "TCP connect", async {
        TcpStream::connect(&addr)
            .await
            .map_err(|e| Error::Connectivity(format!("Cannot reach {addr}: {e}")))
    })
    .await
}

/// Perform the TLS handshake on an established TCP stream.
pub(crate) async fn tls_handshake(
    host: &str,
    tcp: TcpStream,
    accept_invalid_certs: bool,
    timeout: Duration,
) -> Result<TlsStream<TcpStream>> {
    let connector = tls_connector(accept_invalid_certs)?;
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| Error::Connectivity(format!("Invalid server name: {e}")))?;

    with_timeout(timeout, "TLS handshake", async {
        connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| Error::Connectivity(format!("TLS handshake failed: {e}")))
    })
    .await
}

/// Open a fresh, authenticated IMAP session.
///
/// Picks implicit TLS, STARTTLS or plaintext from the incoming
/// endpoint, then logs in with the account address and secret.
pub async fn connect(config: &AccountConfig) -> Result<ImapSession> {
    let endpoint = &config.incoming;
    let tcp = tcp_connect(endpoint, config.timeout).await?;

    let stream = match endpoint.transport(Protocol::Imap) {
        Transport::ImplicitTls => MailStream::Tls(Box::new(
            tls_handshake(
                &endpoint.host,
                tcp,
                config.accept_invalid_certs,
                config.timeout,
            )
            .await?,
        )),
        Transport::StartTls => {
            let mut client = async_imap::Client::new(tcp.compat());
            with_timeout(config.timeout, "STARTTLS", async {
                client
                    .run_command_and_check_ok("STARTTLS", None)
                    .await
                    .map_err(|e| Error::Connectivity(format!("STARTTLS failed: {e}")))
            })
            .await?;
            let inner = client.into_inner().into_inner();
            MailStream::Tls(Box::new(
                tls_handshake(
                    &endpoint.host,
                    inner,
                    config.accept_invalid_certs,
                    config.timeout,
                )
                .await?,
            ))
        }
        Transport::Plain => MailStream::Plain(tcp),
    };

    let client = async_imap::Client::new(stream.compat());
    let session = with_timeout(config.timeout, "IMAP login", async {
        client
            .login(&config.address, &config.secret)
            .await
            .map_err(|(e, _)| {
                if is_transport_failure(&e) {
                    Error::Connectivity(format!("Connection lost during login: {e}"))
                } else {
                    Error::Auth(format!("IMAP login rejected: {e}"))
                }
            })
    })
    .await?;

    info!("Connected to IMAP server {}", endpoint.address());
    Ok(session)
}

/// LOGOUT, logging rather than returning failures.
pub async fn release(mut session: ImapSession) {
    if let Err(e) = session.logout().await {
        debug!("LOGOUT failed: {}", e);
    }
}

/// SELECT a folder read-write.
pub async fn select(session: &mut ImapSession, folder: &str) -> Result<()> {
    session
        .select(folder)
        .await
        .map_err(|e| open_error(folder, "SELECT", e))?;
    Ok(())
}

/// EXAMINE a folder (read-only SELECT).
pub async fn examine(session: &mut ImapSession, folder: &str) -> Result<()> {
    session
        .examine(folder)
        .await
        .map_err(|e| open_error(folder, "EXAMINE", e))?;
    Ok(())
}

/// `UID COPY` to `mailbox`.
pub(crate) async fn uid_copy(
    session: &mut ImapSession,
    uid_set: &str,
    mailbox: &str,
) -> async_imap::error::Result<()> {
    session
        .run_command_and_check_ok(&format!("UID COPY {uid_set} {}", quote(mailbox)?))
        .await
}

/// `UID STORE +FLAGS.SILENT (\Deleted)`.
pub(crate) async fn mark_deleted(
    session: &mut ImapSession,
    uid_set: &str,
) -> async_imap::error::Result<()> {
    let query = Flag::add_silently(&[Flag::Deleted]);
    session
        .uid_store(uid_set, &query)
        .await?
        .try_collect::<Vec<_>>()
        .await?;
    Ok(())
}

/// `UID STORE -FLAGS.SILENT (\Deleted)`.
pub(crate) async fn unmark_deleted(
    session: &mut ImapSession,
    uid_set: &str,
) -> async_imap::error::Result<()> {
    let query = Flag::remove_silently(&[Flag::Deleted]);
    session
        .uid_store(uid_set, &query)
        .await?
        .try_collect::<Vec<_>>()
        .await?;
    Ok(())
}

/// `EXPUNGE` the selected mailbox.
pub(crate) async fn expunge(session: &mut ImapSession) -> async_imap::error::Result<()> {
    session.expunge().await?.try_collect::<Vec<_>>().await?;
    Ok(())
}

/// Refuse CR, LF and NUL, which cannot travel inside a quoted string.
pub(crate) fn check_quotable(s: &str) -> async_imap::error::Result<()> {
    match s.chars().find(|c| matches!(c, '\r' | '\n' | '\0')) {
        Some(c) => Err(async_imap::error::Error::Validate(ValidateError(c))),
        None => Ok(()),
    }
}

/// Quote a mailbox name or search value as an IMAP quoted string.
pub(crate) fn quote(s: &str) -> async_imap::error::Result<String> {
    check_quotable(s)?;
    Ok(format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")))
}

fn open_error(folder: &str, stage: &'static str, e: async_imap::error::Error) -> Error {
    match e {
        async_imap::error::Error::No(_) => Error::NotFound(format!("Folder {folder}")),
        other => Error::imap("open folder", stage)(other),
    }
}

/// Certificate verifier that accepts all certificates.
#[derive(Debug)]
struct DangerousVerifier;

impl rustls::client::danger::ServerCertVerifier for DangerousVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
