//! Sent and draft archiving
//!
//! Stores already-built raw messages in the account's canonical Sent
//! or Drafts folder. A missing folder is created at the top level.

use crate::connection::{ImapSession, expunge, mark_deleted, select};
use crate::error::{Error, Result};
use crate::flag::Flag;
use crate::folder::SpecialUse;
use crate::folder_create::ensure_mailbox;
use crate::topology;
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Archived {
    /// Folder the message was appended to.
    pub folder: String,
    /// Whether a previous draft was removed.
    pub replaced_previous: bool,
}

/// Append a sent message to Sent, flagged `\Seen`.
pub async fn append_sent(session: &mut ImapSession, raw: &[u8]) -> Result<Archived> {
    check_not_empty(raw)?;
    let folder = target_folder(session, SpecialUse::Sent).await?;
    append(session, &folder, &[Flag::Seen], raw, "append sent").await?;
    info!("Archived sent message in {}", folder);
    Ok(Archived {
        folder,
        replaced_previous: false,
    })
}

/// Append a draft to Drafts, flagged `\Draft \Seen`, then remove the
/// draft it replaces.
pub async fn append_draft(
    session: &mut ImapSession,
    raw: &[u8],
    previous_draft_id: Option<u32>,
) -> Result<Archived> {
    const OPERATION: &str = "append draft";

    check_not_empty(raw)?;
    let folder = target_folder(session, SpecialUse::Drafts).await?;
    append(session, &folder, &[Flag::Draft, Flag::Seen], raw, OPERATION).await?;
    info!("Saved draft in {}", folder);

    let Some(previous) = previous_draft_id else {
        return Ok(Archived {
            folder,
            replaced_previous: false,
        });
    };

    let partial = |stage: &'static str, message: String| Error::PartialFailure {
        operation: OPERATION,
        stage,
        uid: previous.to_string(),
        message,
    };
    select(session, &folder)
        .await
        .map_err(|e| partial("SELECT", e.to_string()))?;
    let present = session
        .uid_search(format!("UID {previous}"))
        .await
        .map_err(|e| partial("UID SEARCH", e.to_string()))?
        .contains(&previous);
    if !present {
        warn!("Previous draft {} is not in {}; nothing to replace", previous, folder);
        return Ok(Archived {
            folder,
            replaced_previous: false,
        });
    }
    let set = previous.to_string();
    mark_deleted(session, &set)
        .await
        .map_err(|e| partial("UID STORE", e.to_string()))?;
    expunge(session)
        .await
        .map_err(|e| partial("EXPUNGE", e.to_string()))?;
    debug!("Removed previous draft {} from {}", previous, folder);

    Ok(Archived {
        folder,
        replaced_previous: true,
    })
}

/// Canonical folder for `special`, created under its default name when
/// the account has none.
async fn target_folder(session: &mut ImapSession, special: SpecialUse) -> Result<String> {
    let topology = topology::resolve(session).await?;
    if let Some(path) = topology.special_path(special) {
        return Ok(path.to_string());
    }
    let name = special.default_path();
    ensure_mailbox(session, name).await?;
    Ok(name.to_string())
}

async fn append(
    session: &mut ImapSession,
    folder: &str,
    flags: &[Flag],
    raw: &[u8],
    operation: &'static str,
) -> Result<()> {
    let flags = Flag::list(flags);
    session
        .append(folder, Some(flags.as_str()), None, raw)
        .await
        .map_err(Error::imap(operation, "APPEND"))
}

fn check_not_empty(raw: &[u8]) -> Result<()> {
    if raw.is_empty() {
        return Err(Error::Parse("Refusing to append an empty message".into()));
    }
    Ok(())
}
