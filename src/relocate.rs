//! Message relocator
//!
//! Moves one message between folders with native `UID MOVE` when the
//! server offers it, or copy, flag and expunge otherwise. Repeating a
//! move that failed half way never leaves two copies behind.

use crate::connection::{
    ImapSession, check_quotable, examine, expunge, mark_deleted, quote, select, uid_copy,
};
use crate::error::{Error, Result};
use crate::folder_create::ensure_mailbox;
use futures::TryStreamExt;
use mail_parser::MessageParser;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

const OPERATION: &str = "move message";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MoveMethod {
    NativeMove,
    CopyThenDelete,
}

/// Step of a move that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MoveStage {
    EnsureTarget,
    Move,
    Lookup,
    Copy,
    MarkDeleted,
    Expunge,
    Verify,
}

impl fmt::Display for MoveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::EnsureTarget => "ensure target",
            Self::Move => "UID MOVE",
            Self::Lookup => "lookup",
            Self::Copy => "UID COPY",
            Self::MarkDeleted => "UID STORE",
            Self::Expunge => "EXPUNGE",
            Self::Verify => "verify",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveOutcome {
    pub method: MoveMethod,
    pub ok: bool,
    pub failed_stage: Option<MoveStage>,
    pub detail: Option<String>,
}

impl MoveOutcome {
    const fn succeeded(method: MoveMethod) -> Self {
        Self {
            method,
            ok: true,
            failed_stage: None,
            detail: None,
        }
    }

    fn failed(method: MoveMethod, stage: MoveStage, detail: impl fmt::Display) -> Self {
        Self {
            method,
            ok: false,
            failed_stage: Some(stage),
            detail: Some(detail.to_string()),
        }
    }
}

/// Turn a stage error into a failed outcome. Connectivity errors stay
/// errors so the caller can tell a retryable failure apart.
fn stage_failed(method: MoveMethod, stage: MoveStage, e: Error) -> Result<MoveOutcome> {
    if e.is_retryable() {
        return Err(e);
    }
    warn!("Move failed at {}: {}", stage, e);
    Ok(MoveOutcome::failed(method, stage, e))
}

/// Move message `uid` from `from` to `to`.
pub async fn move_message(
    session: &mut ImapSession,
    from: &str,
    uid: u32,
    to: &str,
) -> Result<MoveOutcome> {
    let native = session
        .capabilities()
        .await
        .map_err(Error::imap(OPERATION, "CAPABILITY"))?
        .has_str("MOVE");
    let method = if native {
        MoveMethod::NativeMove
    } else {
        MoveMethod::CopyThenDelete
    };

    check_quotable(to).map_err(Error::imap(OPERATION, "UID MOVE"))?;
    select(session, from).await?;
    if !uid_present(session, uid).await? {
        return Err(Error::NotFound(format!("Message {uid} in {from}")));
    }
    if let Err(e) = ensure_mailbox(session, to).await {
        return stage_failed(method, MoveStage::EnsureTarget, e);
    }

    let outcome = match method {
        MoveMethod::NativeMove => native_move(session, from, uid, to).await?,
        MoveMethod::CopyThenDelete => copy_then_delete(session, from, uid, to).await?,
    };
    if outcome.ok {
        info!("Moved message {} from {} to {}", uid, from, to);
    }
    Ok(outcome)
}

async fn native_move(
    session: &mut ImapSession,
    from: &str,
    uid: u32,
    to: &str,
) -> Result<MoveOutcome> {
    let target = quote(to).map_err(Error::imap(OPERATION, "UID MOVE"))?;
    let reply = session
        .run_command_and_check_ok(&format!("UID MOVE {uid} {target}"))
        .await;
    match reply {
        Ok(()) => Ok(MoveOutcome::succeeded(MoveMethod::NativeMove)),
        Err(e) => {
            let e = Error::imap(OPERATION, "UID MOVE")(e);
            if e.is_retryable() {
                return Err(e);
            }
            // Some servers move the message and still answer NO.
            if uid_present(session, uid).await? {
                warn!("UID MOVE of message {} failed ({}); falling back to copy", uid, e);
                copy_then_delete(session, from, uid, to).await
            } else {
                warn!("UID MOVE answered '{}' but message {} is gone; treating as moved", e, uid);
                Ok(MoveOutcome::succeeded(MoveMethod::NativeMove))
            }
        }
    }
}

async fn copy_then_delete(
    session: &mut ImapSession,
    from: &str,
    uid: u32,
    to: &str,
) -> Result<MoveOutcome> {
    let method = MoveMethod::CopyThenDelete;
    let set = uid.to_string();

    let already_there = match already_in_target(session, from, uid, to).await {
        Ok(found) => found,
        Err(e) => return stage_failed(method, MoveStage::Lookup, e),
    };
    if already_there {
        debug!("Message {} already present in {}, skipping copy", uid, to);
    } else if let Err(e) = uid_copy(session, &set, to).await {
        return stage_failed(method, MoveStage::Copy, Error::imap(OPERATION, "UID COPY")(e));
    }

    if let Err(e) = mark_deleted(session, &set).await {
        return stage_failed(
            method,
            MoveStage::MarkDeleted,
            Error::imap(OPERATION, "UID STORE")(e),
        );
    }
    if let Err(e) = expunge(session).await {
        return stage_failed(method, MoveStage::Expunge, Error::imap(OPERATION, "EXPUNGE")(e));
    }

    match uid_present(session, uid).await {
        Ok(false) => Ok(MoveOutcome::succeeded(method)),
        Ok(true) => Ok(MoveOutcome::failed(
            method,
            MoveStage::Verify,
            format!("message {uid} is still in {from}"),
        )),
        Err(e) => stage_failed(method, MoveStage::Verify, e),
    }
}

/// Whether a message with the same Message-ID is already in `to`.
/// Leaves `from` selected read-write on success.
async fn already_in_target(
    session: &mut ImapSession,
    from: &str,
    uid: u32,
    to: &str,
) -> Result<bool> {
    let Some(message_id) = message_id_of(session, uid).await? else {
        return Ok(false);
    };
    let needle = quote(&message_id).map_err(Error::imap(OPERATION, "UID SEARCH"))?;
    examine(session, to).await?;
    let found = !session
        .uid_search(format!("HEADER Message-ID {needle}"))
        .await
        .map_err(Error::imap(OPERATION, "UID SEARCH"))?
        .is_empty();
    select(session, from).await?;
    Ok(found)
}

async fn message_id_of(session: &mut ImapSession, uid: u32) -> Result<Option<String>> {
    let fetches: Vec<_> = session
        .uid_fetch(uid.to_string(), "(UID BODY.PEEK[HEADER.FIELDS (MESSAGE-ID)])")
        .await
        .map_err(Error::imap(OPERATION, "UID FETCH"))?
        .try_collect()
        .await
        .map_err(Error::imap(OPERATION, "UID FETCH"))?;
    Ok(fetches
        .iter()
        .find_map(|f| f.header())
        .and_then(message_id_from_header))
}

fn message_id_from_header(header: &[u8]) -> Option<String> {
    MessageParser::default()
        .parse(header)?
        .message_id()
        .map(str::to_string)
}

async fn uid_present(session: &mut ImapSession, uid: u32) -> Result<bool> {
    Ok(session
        .uid_search(format!("UID {uid}"))
        .await
        .map_err(Error::imap(OPERATION, "UID SEARCH"))?
        .contains(&uid))
}
