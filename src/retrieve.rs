//! Message and attachment retrieval
//!
//! A message is located by UID, then by sequence number, then by its
//! Message-ID. The first lookup that yields a body wins.

use crate::connection::{ImapSession, examine, quote};
use crate::error::{Error, Result, is_transport_failure};
use crate::mime::{self, Attachment, MessageDetail, PartAddress};
use async_imap::types::Fetch;
use futures::TryStreamExt;
use tracing::debug;

const OPERATION: &str = "get message";
const BODY_ITEMS: &str = "(UID BODY.PEEK[])";

/// Raw bytes of a located message and the UID it was found under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub uid: u32,
    pub raw: Vec<u8>,
}

/// Locate `id` in `folder` and return its raw bytes.
pub async fn fetch_raw(
    session: &mut ImapSession,
    folder: &str,
    id: u32,
    correlation_id: Option<&str>,
) -> Result<RawMessage> {
    examine(session, folder).await?;

    if let Some(found) = by_uid(session, id).await? {
        return Ok(found);
    }
    debug!("UID {} not found in {}, trying sequence number", id, folder);
    if let Some(found) = by_sequence(session, id).await? {
        return Ok(found);
    }
    if let Some(message_id) = correlation_id.map(str::trim).filter(|m| !m.is_empty()) {
        debug!("Sequence {} not found, searching Message-ID {}", id, message_id);
        if let Some(found) = by_message_id(session, message_id).await? {
            return Ok(found);
        }
    }
    Err(Error::NotFound(format!("Message {id} in {folder}")))
}

/// Fetch, parse and summarise one message.
pub async fn get_message(
    session: &mut ImapSession,
    folder: &str,
    id: u32,
    correlation_id: Option<&str>,
) -> Result<MessageDetail> {
    let found = fetch_raw(session, folder, id, correlation_id).await?;
    mime::detail(found.uid, &found.raw)
}

/// Decoded payload of the part at `part`.
pub async fn get_attachment_bytes(
    session: &mut ImapSession,
    folder: &str,
    id: u32,
    part: &PartAddress,
) -> Result<Attachment> {
    let found = fetch_raw(session, folder, id, None).await?;
    mime::attachment(&found.raw, part)
}

async fn by_uid(session: &mut ImapSession, uid: u32) -> Result<Option<RawMessage>> {
    let fetched = match session.uid_fetch(uid.to_string(), BODY_ITEMS).await {
        Ok(stream) => stream.try_collect::<Vec<_>>().await,
        Err(e) => Err(e),
    };
    Ok(first_body(miss_on_refusal(fetched, "UID FETCH")?, uid))
}

async fn by_sequence(session: &mut ImapSession, seq: u32) -> Result<Option<RawMessage>> {
    let fetched = match session.fetch(seq.to_string(), BODY_ITEMS).await {
        Ok(stream) => stream.try_collect::<Vec<_>>().await,
        Err(e) => Err(e),
    };
    Ok(first_body(miss_on_refusal(fetched, "FETCH")?, seq))
}

async fn by_message_id(session: &mut ImapSession, message_id: &str) -> Result<Option<RawMessage>> {
    let needle = quote(message_id).map_err(Error::imap(OPERATION, "UID SEARCH"))?;
    let searched = session
        .uid_search(format!("HEADER Message-ID {needle}"))
        .await;
    let Some(uids) = miss_on_refusal(searched, "UID SEARCH")? else {
        return Ok(None);
    };
    let Some(uid) = uids.into_iter().min() else {
        return Ok(None);
    };
    by_uid(session, uid).await
}

/// `NO`/`BAD` means "not here"; transport failures propagate.
fn miss_on_refusal<T>(
    result: async_imap::error::Result<T>,
    stage: &'static str,
) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if is_transport_failure(&e) => Err(Error::imap(OPERATION, stage)(e)),
        Err(e) => {
            debug!("{} refused: {}", stage, e);
            Ok(None)
        }
    }
}

fn first_body(fetches: Option<Vec<Fetch>>, fallback_uid: u32) -> Option<RawMessage> {
    fetches?.iter().find_map(|f| {
        f.body().map(|raw| RawMessage {
            uid: f.uid.unwrap_or(fallback_uid),
            raw: raw.to_vec(),
        })
    })
}
