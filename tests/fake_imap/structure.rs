//! BODYSTRUCTURE rendering for the fake IMAP server.
//!
//! Parses the stored message with `mail-parser` and renders the MIME
//! tree in RFC 3501 Section 7.4.2 syntax:
//!
//! ```text
//! (("TEXT" "PLAIN" ("CHARSET" "utf-8") NIL NIL "7BIT" 12 1 NIL NIL NIL NIL)
//!  ("APPLICATION" "PDF" ("NAME" "a.pdf") NIL NIL "BASE64" 4 NIL
//!   ("ATTACHMENT" ("FILENAME" "a.pdf")) NIL NIL) "MIXED")
//! ```
//!
//! Embedded `message/rfc822` parts are rendered as opaque
//! `APPLICATION/OCTET-STREAM` leaves.

use crate::fake_imap::io::quoted;
use mail_parser::{Message, MessageParser, MessagePart, MimeHeaders, PartType};

const FALLBACK: &str = "(\"TEXT\" \"PLAIN\" NIL NIL NIL \"7BIT\" 0 0)";

pub fn body_structure(raw: &[u8]) -> String {
    MessageParser::default()
        .parse(raw)
        .map_or_else(|| FALLBACK.to_string(), |message| node(&message, 0))
}

fn node(message: &Message<'_>, id: usize) -> String {
    let Some(part) = message.part(id) else {
        return FALLBACK.to_string();
    };
    let content_type = part.content_type();
    let subtype = |default: &str| {
        content_type
            .and_then(|ct| ct.subtype())
            .unwrap_or(default)
            .to_ascii_uppercase()
    };

    match &part.body {
        PartType::Multipart(children) => {
            let inner: String = children.iter().map(|&c| node(message, c)).collect();
            format!("({inner} {})", quoted(&subtype("mixed")))
        }
        PartType::Text(_) | PartType::Html(_) => {
            let default = if matches!(part.body, PartType::Html(_)) {
                "html"
            } else {
                "plain"
            };
            let contents = part.contents();
            let lines = contents.iter().filter(|&&b| b == b'\n').count() + 1;
            format!(
                "(\"TEXT\" {} {} NIL NIL {} {} {lines} NIL {} NIL NIL)",
                quoted(&subtype(default)),
                params(part),
                encoding(part),
                contents.len(),
                disposition(part)
            )
        }
        PartType::Message(_) => format!(
            "(\"APPLICATION\" \"OCTET-STREAM\" NIL NIL NIL {} {} NIL {} NIL NIL)",
            encoding(part),
            part.contents().len(),
            disposition(part)
        ),
        _ => {
            let main = content_type
                .map_or("application", |ct| ct.ctype())
                .to_ascii_uppercase();
            format!(
                "({} {} {} NIL NIL {} {} NIL {} NIL NIL)",
                quoted(&main),
                quoted(&subtype("octet-stream")),
                params(part),
                encoding(part),
                part.contents().len(),
                disposition(part)
            )
        }
    }
}

/// Content-Type parameters the client cares about.
fn params(part: &MessagePart<'_>) -> String {
    let Some(ct) = part.content_type() else {
        return "NIL".to_string();
    };
    let pairs: Vec<String> = ["charset", "name"]
        .iter()
        .filter_map(|&key| {
            ct.attribute(key)
                .map(|v| format!("{} {}", quoted(&key.to_ascii_uppercase()), quoted(v)))
        })
        .collect();
    if pairs.is_empty() {
        "NIL".to_string()
    } else {
        format!("({})", pairs.join(" "))
    }
}

fn encoding(part: &MessagePart<'_>) -> String {
    quoted(
        &part
            .content_transfer_encoding()
            .unwrap_or("7bit")
            .to_ascii_uppercase(),
    )
}

fn disposition(part: &MessagePart<'_>) -> String {
    let Some(disp) = part.content_disposition() else {
        return "NIL".to_string();
    };
    let filename = disp.attribute("filename").map_or_else(
        || "NIL".to_string(),
        |f| format!("(\"FILENAME\" {})", quoted(f)),
    );
    format!(
        "({} {filename})",
        quoted(&disp.ctype().to_ascii_uppercase())
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIXED: &[u8] = b"From: a@b.com\r\n\
        Subject: Report\r\n\
        MIME-Version: 1.0\r\n\
        Content-Type: multipart/mixed; boundary=\"XX\"\r\n\
        \r\n\
        --XX\r\n\
        Content-Type: text/plain; charset=utf-8\r\n\
        \r\n\
        See attached.\r\n\
        --XX\r\n\
        Content-Type: application/pdf; name=\"a.pdf\"\r\n\
        Content-Disposition: attachment; filename=\"a.pdf\"\r\n\
        Content-Transfer-Encoding: base64\r\n\
        \r\n\
        JVBERg==\r\n\
        --XX--\r\n";

    #[test]
    fn renders_multipart_with_attachment() {
        let s = body_structure(MIXED);
        assert!(s.starts_with("((\"TEXT\" \"PLAIN\" (\"CHARSET\" \"utf-8\")"));
        assert!(s.contains("\"APPLICATION\" \"PDF\" (\"NAME\" \"a.pdf\")"));
        assert!(s.contains("(\"ATTACHMENT\" (\"FILENAME\" \"a.pdf\"))"));
        assert!(s.ends_with(" \"MIXED\")"));
    }

    #[test]
    fn client_parser_accepts_rendering() {
        use async_imap::imap_proto::parser::parse_response;
        use async_imap::imap_proto::{AttributeValue, Response};

        let line = format!("* 1 FETCH (UID 1 BODYSTRUCTURE {})\r\n", body_structure(MIXED));
        let (_, response) = parse_response(line.as_bytes()).unwrap();
        let Response::Fetch(_, attrs) = response else {
            panic!("expected FETCH");
        };
        assert!(
            attrs
                .iter()
                .any(|a| matches!(a, AttributeValue::BodyStructure(_)))
        );
    }

    #[test]
    fn single_part_is_a_text_leaf() {
        let s = body_structure(b"Subject: x\r\n\r\nhello\r\n");
        assert!(s.starts_with("(\"TEXT\" \"PLAIN\""));
        assert!(s.contains("\"7BIT\""));
    }
}
