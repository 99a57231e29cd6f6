//! Minimal POP3 client: greeting, optional STLS, USER/PASS, STAT, QUIT.
//!
//! POP3 has no folders; it is only used to verify that an incoming
//! POP3 endpoint accepts the account's credentials.

use crate::config::{AccountConfig, Protocol, Transport};
use crate::connection::{MailStream, tcp_connect, tls_handshake, with_timeout};
use crate::error::{Error, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

/// `STAT` reply: message count and total size in octets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaildropStat {
    pub count: u32,
    pub total_size: u64,
}

/// An authenticated POP3 session.
#[derive(Debug)]
pub struct Pop3Session {
    stream: BufReader<MailStream>,
}

impl Pop3Session {
    /// Connect to the incoming endpoint and authenticate with USER/PASS.
    ///
    /// # Errors
    ///
    /// [`Error::Connectivity`] for transport failures, [`Error::Auth`]
    /// when USER or PASS is refused.
    pub async fn connect(config: &AccountConfig) -> Result<Self> {
        let endpoint = &config.incoming;
        let tcp = tcp_connect(endpoint, config.timeout).await?;

        let stream = match endpoint.transport(Protocol::Pop3) {
            Transport::ImplicitTls => {
                let tls = tls_handshake(
                    &endpoint.host,
                    tcp,
                    config.accept_invalid_certs,
                    config.timeout,
                )
                .await?;
                let mut stream = BufReader::new(MailStream::Tls(Box::new(tls)));
                expect_ok(&mut stream, "greeting").await?;
                stream
            }
            Transport::StartTls => {
                let mut plain = BufReader::new(tcp);
                with_timeout(config.timeout, "POP3 STLS", async {
                    expect_ok(&mut plain, "greeting").await?;
                    command(&mut plain, "STLS", "STLS").await
                })
                .await?;
                let tls = tls_handshake(
                    &endpoint.host,
                    plain.into_inner(),
                    config.accept_invalid_certs,
                    config.timeout,
                )
                .await?;
                BufReader::new(MailStream::Tls(Box::new(tls)))
            }
            Transport::Plain => {
                let mut stream = BufReader::new(MailStream::Plain(tcp));
                expect_ok(&mut stream, "greeting").await?;
                stream
            }
        };

        let mut session = Self { stream };
        with_timeout(config.timeout, "POP3 login", session.login(config)).await?;
        info!("Connected to POP3 server {}", endpoint.address());
        Ok(session)
    }

    async fn login(&mut self, config: &AccountConfig) -> Result<()> {
        command(&mut self.stream, &format!("USER {}", config.address), "USER")
            .await
            .map_err(into_auth)?;
        command(&mut self.stream, &format!("PASS {}", config.secret), "PASS")
            .await
            .map_err(into_auth)?;
        Ok(())
    }

    /// Number of messages and total size in the maildrop.
    ///
    /// # Errors
    ///
    /// Fails if the server answers `-ERR` or the reply is malformed.
    pub async fn stat(&mut self) -> Result<MaildropStat> {
        let reply = command(&mut self.stream, "STAT", "STAT").await?;
        parse_stat(&reply)
    }

    /// QUIT, logging rather than returning failures.
    pub async fn release(mut self) {
        if let Err(e) = command(&mut self.stream, "QUIT", "QUIT").await {
            debug!("POP3 QUIT failed: {}", e);
        }
    }
}

/// Send one command line and require a `+OK` reply.
async fn command<S>(stream: &mut S, line: &str, stage: &'static str) -> Result<String>
where
    S: AsyncBufRead + AsyncWrite + Unpin,
{
    if stage == "PASS" {
        debug!("POP3 > PASS ****");
    } else {
        debug!("POP3 > {}", line);
    }
    stream
        .write_all(format!("{line}\r\n").as_bytes())
        .await
        .map_err(|e| Error::Connectivity(format!("POP3 {stage}: {e}")))?;
    stream
        .flush()
        .await
        .map_err(|e| Error::Connectivity(format!("POP3 {stage}: {e}")))?;
    expect_ok(stream, stage).await
}

/// Read one reply line; `+OK` yields the rest of the line.
async fn expect_ok<S>(stream: &mut S, stage: &'static str) -> Result<String>
where
    S: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let n = stream
        .read_line(&mut line)
        .await
        .map_err(|e| Error::Connectivity(format!("POP3 {stage}: {e}")))?;
    if n == 0 {
        return Err(Error::Connectivity(format!(
            "POP3 {stage}: connection closed"
        )));
    }
    let line = line.trim_end();
    line.strip_prefix("+OK").map_or_else(
        || {
            Err(Error::Protocol {
                operation: "pop3",
                stage,
                message: line.to_string(),
            })
        },
        |rest| Ok(rest.trim().to_string()),
    )
}

fn into_auth(e: Error) -> Error {
    match e {
        Error::Protocol { message, .. } => Error::Auth(format!("POP3 login rejected: {message}")),
        other => other,
    }
}

fn parse_stat(reply: &str) -> Result<MaildropStat> {
    let mut parts = reply.split_whitespace();
    let count = parts.next().and_then(|s| s.parse().ok());
    let total_size = parts.next().and_then(|s| s.parse().ok());
    match (count, total_size) {
        (Some(count), Some(total_size)) => Ok(MaildropStat { count, total_size }),
        _ => Err(Error::Protocol {
            operation: "pop3",
            stage: "STAT",
            message: format!("Malformed STAT reply: {reply}"),
        }),
    }
}
