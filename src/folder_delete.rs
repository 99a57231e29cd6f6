//! Folder deletion guard
//!
//! Removes one user-created leaf folder. Its messages are relocated to
//! the parent folder first, so nothing is lost with the mailbox.

use crate::connection::{ImapSession, expunge, mark_deleted, select, uid_copy, unmark_deleted};
use crate::error::{Error, Result};
use crate::topology::{
    Heuristics, MailboxEntry, discover_delimiter, is_under_bracketed_namespace, list_entries,
};
use serde::Serialize;
use tracing::{debug, info, warn};

const OPERATION: &str = "delete folder";

/// Result of [`delete_folder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedFolder {
    pub path: String,
    /// Where the folder's messages went.
    pub parent: String,
    /// UIDs (in the deleted folder) that were relocated.
    pub relocated: Vec<u32>,
}

/// Parent of `path`: everything before the last delimiter, or INBOX.
#[must_use]
pub fn parent_path(path: &str, delimiter: &str) -> String {
    match path.rsplit_once(delimiter) {
        Some((parent, _)) if !parent.is_empty() && !delimiter.is_empty() => parent.to_string(),
        _ => "INBOX".to_string(),
    }
}

/// Refuse INBOX, special-use folders and provider namespaces.
///
/// # Errors
///
/// Returns [`Error::Policy`] for protected folders.
pub fn check_deletable(
    path: &str,
    listed: Option<&MailboxEntry>,
    delimiter: &str,
    heuristics: &Heuristics,
) -> Result<()> {
    if path.eq_ignore_ascii_case("INBOX") {
        return Err(Error::Policy("INBOX cannot be deleted".into()));
    }
    let entry = listed
        .cloned()
        .unwrap_or_else(|| MailboxEntry::new(path, Some(delimiter), &[]));
    if let Some(class) = heuristics.classify(&entry, delimiter) {
        return Err(Error::Policy(format!(
            "{path} is the {} folder",
            class.special
        )));
    }
    if is_under_bracketed_namespace(path, delimiter) {
        return Err(Error::Policy(format!(
            "{path} belongs to a provider namespace"
        )));
    }
    Ok(())
}

/// Delete `path` after moving its messages to the parent folder.
///
/// Preconditions are checked before anything is touched: the folder
/// must not be protected, must exist and must have no children.
pub async fn delete_folder(session: &mut ImapSession, path: &str) -> Result<DeletedFolder> {
    let entries = list_entries(session, "*").await?;
    let delimiter = discover_delimiter(session, &entries).await?;
    let listed = entries.iter().find(|e| e.name == path);

    check_deletable(path, listed, &delimiter, &Heuristics::DEFAULT)?;
    if listed.is_none() {
        return Err(Error::NotFound(format!("Folder {path}")));
    }

    let children = list_entries(session, &format!("{path}{delimiter}*")).await?;
    if !children.is_empty() {
        return Err(Error::Policy(format!(
            "{path} has {} subfolder(s); delete them first",
            children.len()
        )));
    }

    let parent = parent_path(path, &delimiter);
    select(session, path).await?;
    let mut uids: Vec<u32> = session
        .uid_search("ALL")
        .await
        .map_err(Error::imap(OPERATION, "UID SEARCH"))?
        .into_iter()
        .collect();
    uids.sort_unstable();
    debug!("Relocating {} message(s) from {} to {}", uids.len(), path, parent);

    // Each EXPUNGE below must only remove the message just copied.
    if !uids.is_empty() {
        unmark_deleted(session, "1:*")
            .await
            .map_err(Error::imap(OPERATION, "UID STORE"))?;
    }

    let mut relocated = Vec::with_capacity(uids.len());
    for uid in uids {
        let set = uid.to_string();
        uid_copy(session, &set, &parent)
            .await
            .map_err(|e| partial("UID COPY", uid, &e))?;
        mark_deleted(session, &set)
            .await
            .map_err(|e| partial("UID STORE", uid, &e))?;
        expunge(session)
            .await
            .map_err(|e| partial("EXPUNGE", uid, &e))?;
        relocated.push(uid);
    }

    session
        .close()
        .await
        .map_err(Error::imap(OPERATION, "CLOSE"))?;
    if let Err(e) = session.unsubscribe(path).await {
        warn!("UNSUBSCRIBE {} failed (ignored): {}", path, e);
    }
    session
        .delete(path)
        .await
        .map_err(Error::imap(OPERATION, "DELETE"))?;

    info!(
        "Deleted folder {} ({} message(s) moved to {})",
        path,
        relocated.len(),
        parent
    );
    Ok(DeletedFolder {
        path: path.to_string(),
        parent,
        relocated,
    })
}

fn partial(stage: &'static str, uid: u32, e: &async_imap::error::Error) -> Error {
    Error::PartialFailure {
        operation: OPERATION,
        stage,
        uid: uid.to_string(),
        message: e.to_string(),
    }
}
