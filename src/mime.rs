//! MIME tree walk and part addressing
//!
//! Every node of a parsed message, the root included, gets a dotted
//! [`PartAddress`] from a depth-first walk. The root is `0`, its
//! children are `1`, `2`, ... and deeper nodes append `.n`. The same
//! raw bytes always produce the same addresses.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use mail_parser::{Address, HeaderValue, Message, MessageParser, MessagePart, MimeHeaders, PartType};
use serde::Serialize;
use std::fmt;

const OCTET_STREAM: &str = "application/octet-stream";

/// Dotted positional path of one MIME node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PartAddress(String);

impl PartAddress {
    #[must_use]
    pub fn root() -> Self {
        Self("0".to_string())
    }

    /// Address of the `n`th child (1-based).
    #[must_use]
    pub fn child(&self, n: usize) -> Self {
        if self.is_root() {
            Self(n.to_string())
        } else {
            Self(format!("{}.{n}", self.0))
        }
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "0"
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartAddress {
    fn from(s: &str) -> Self {
        Self(s.trim().to_string())
    }
}

/// Headers exposed with a retrieved message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageHeaders {
    pub subject: String,
    pub from: String,
    pub to: String,
    pub cc: String,
    pub date: Option<DateTime<Utc>>,
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
}

/// Descriptor of one attachment node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentInfo {
    pub address: PartAddress,
    pub filename: String,
    pub content_type: String,
    /// Decoded size in bytes.
    pub size: usize,
}

/// A fully retrieved message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDetail {
    pub uid: u32,
    pub headers: MessageHeaders,
    pub plain_body: Option<String>,
    pub html_body: Option<String>,
    pub attachments: Vec<AttachmentInfo>,
}

/// Decoded payload of one part, with a usable name and type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

pub fn parse(raw: &[u8]) -> Result<Message<'_>> {
    MessageParser::default()
        .parse(raw)
        .ok_or_else(|| Error::Parse("Failed to parse MIME message".into()))
}

/// Depth-first walk assigning an address to every node.
#[must_use]
pub fn walk<'m>(message: &'m Message<'_>) -> Vec<(PartAddress, &'m MessagePart<'m>)> {
    let mut out = Vec::new();
    visit(message, 0, PartAddress::root(), &mut out);
    out
}

fn visit<'m>(
    message: &'m Message<'_>,
    id: usize,
    address: PartAddress,
    out: &mut Vec<(PartAddress, &'m MessagePart<'m>)>,
) {
    let Some(part) = message.part(id) else {
        return;
    };
    out.push((address.clone(), part));
    if let PartType::Multipart(children) = &part.body {
        for (n, &child) in children.iter().enumerate() {
            visit(message, child, address.child(n + 1), out);
        }
    }
}

/// A node with a filename or an `attachment` disposition.
#[must_use]
pub fn is_attachment(part: &MessagePart<'_>) -> bool {
    if matches!(part.body, PartType::Multipart(_)) {
        return false;
    }
    part.attachment_name().is_some()
        || part
            .content_disposition()
            .is_some_and(|d| d.is_attachment())
}

/// `type/subtype` of a part, lowercased, if declared.
#[must_use]
pub fn content_type_of(part: &MessagePart<'_>) -> Option<String> {
    part.content_type().map(|ct| {
        let subtype = ct.subtype().unwrap_or("octet-stream");
        format!("{}/{subtype}", ct.ctype()).to_ascii_lowercase()
    })
}

fn is_text(part: &MessagePart<'_>, subtype: &str) -> bool {
    part.content_type().map_or(subtype == "plain", |ct| {
        ct.ctype().eq_ignore_ascii_case("text")
            && ct.subtype().is_some_and(|s| s.eq_ignore_ascii_case(subtype))
    })
}

/// Build the detail view of a raw message.
pub fn detail(uid: u32, raw: &[u8]) -> Result<MessageDetail> {
    let message = parse(raw)?;
    let mut plain_body = None;
    let mut html_body = None;
    let mut attachments = Vec::new();

    for (address, part) in walk(&message) {
        if is_attachment(part) {
            let (filename, content_type) = resolve_names(
                &address,
                part.attachment_name(),
                content_type_of(part).as_deref(),
            );
            attachments.push(AttachmentInfo {
                address,
                filename,
                content_type,
                size: part.contents().len(),
            });
            continue;
        }
        match &part.body {
            PartType::Text(text) if plain_body.is_none() && is_text(part, "plain") => {
                plain_body = Some(text.to_string());
            }
            PartType::Html(html) if html_body.is_none() => {
                html_body = Some(html.to_string());
            }
            _ => {}
        }
    }

    Ok(MessageDetail {
        uid,
        headers: headers_of(&message),
        plain_body,
        html_body,
        attachments,
    })
}

/// Decoded payload of the node at `address`.
pub fn attachment(raw: &[u8], address: &PartAddress) -> Result<Attachment> {
    let message = parse(raw)?;
    let (_, part) = walk(&message)
        .into_iter()
        .find(|(a, _)| a == address)
        .ok_or_else(|| Error::NotFound(format!("MIME part {address}")))?;
    let (filename, content_type) = resolve_names(
        address,
        part.attachment_name(),
        content_type_of(part).as_deref(),
    );
    Ok(Attachment {
        filename,
        content_type,
        data: part.contents().to_vec(),
    })
}

/// Fill in whichever of filename and content type is missing.
///
/// A missing filename becomes `part-<address>.<ext>` with the
/// extension guessed from the content type; a missing or generic
/// content type is guessed from the filename extension.
#[must_use]
pub fn resolve_names(
    address: &PartAddress,
    filename: Option<&str>,
    content_type: Option<&str>,
) -> (String, String) {
    let filename = filename.map(str::trim).filter(|f| !f.is_empty());
    let content_type = content_type
        .map(str::trim)
        .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case(OCTET_STREAM));

    match (filename, content_type) {
        (Some(name), Some(ct)) => (name.to_string(), ct.to_string()),
        (Some(name), None) => (
            name.to_string(),
            mime_guess::from_path(name)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
        ),
        (None, Some(ct)) => (
            format!("part-{address}.{}", extension_for(ct)),
            ct.to_string(),
        ),
        (None, None) => (format!("part-{address}.bin"), OCTET_STREAM.to_string()),
    }
}

fn extension_for(content_type: &str) -> &'static str {
    mime_guess::get_mime_extensions_str(content_type)
        .and_then(|exts| exts.first().copied())
        .unwrap_or("bin")
}

/// Extract the headers shown with a message.
#[must_use]
pub fn headers_of(message: &Message<'_>) -> MessageHeaders {
    MessageHeaders {
        subject: message.subject().unwrap_or_default().to_string(),
        from: format_addresses(message.from()),
        to: format_addresses(message.to()),
        cc: format_addresses(message.cc()),
        date: message
            .date()
            .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0)),
        message_id: message.message_id().map(str::to_string),
        in_reply_to: match message.in_reply_to() {
            HeaderValue::Text(t) => Some(t.to_string()),
            HeaderValue::TextList(list) => list.first().map(ToString::to_string),
            _ => None,
        },
    }
}

/// `Name <address>` entries joined with `, `.
#[must_use]
pub fn format_addresses(addr: Option<&Address<'_>>) -> String {
    addr.map(|a| {
        a.iter()
            .map(|a| {
                let email = a.address.as_deref().unwrap_or_default();
                match a.name.as_deref() {
                    Some(name) if !name.is_empty() => format!("{name} <{email}>"),
                    _ => email.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    })
    .unwrap_or_default()
}
