//! Folder path materializer
//!
//! Creates every missing segment of a nested folder path. Safe to
//! repeat: existing segments are skipped and "already exists" replies
//! count as success.

use crate::connection::ImapSession;
use crate::error::{Error, Result, is_already_exists, is_transport_failure};
use crate::folder::is_reserved_name;
use crate::topology::{discover_delimiter, list_entries, normalize};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

const OPERATION: &str = "create folder";

/// Separators accepted in client-supplied paths.
pub const PATH_SEPARATORS: [char; 3] = ['/', '\\', '.'];

/// Result of [`create_folder_path`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPath {
    /// Mailboxes this call actually created, outermost first.
    pub created: Vec<String>,
    /// The server path of the final segment.
    pub full_path: String,
    pub delimiter: String,
}

/// Split a client path on any accepted separator, dropping empty
/// segments. A leading INBOX segment is normalised to `INBOX`.
#[must_use]
pub fn split_path(input: &str) -> Vec<String> {
    let mut segs: Vec<String> = input
        .split(PATH_SEPARATORS)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if let Some(first) = segs.first_mut()
        && first.eq_ignore_ascii_case("INBOX")
    {
        *first = "INBOX".to_string();
    }
    segs
}

/// Refuse empty paths and reserved final segments.
///
/// # Errors
///
/// Returns [`Error::Policy`] naming the offending segment.
pub fn check_path_policy(segs: &[String]) -> Result<()> {
    let Some(last) = segs.last() else {
        return Err(Error::Policy("Folder path is empty".into()));
    };
    if segs.iter().any(|s| s.contains(['\r', '\n', '\0'])) {
        return Err(Error::Policy("Folder path contains a line break or NUL".into()));
    }
    if is_reserved_name(last) {
        return Err(Error::Policy(format!("{last} is a reserved folder name")));
    }
    Ok(())
}

enum Attempt {
    Done(Vec<String>),
    TopLevelRejected(String),
}

/// Create `input` and every missing ancestor.
///
/// If the server refuses to create the top-level segment, the whole
/// path is retried once nested under `INBOX`.
pub async fn create_folder_path(session: &mut ImapSession, input: &str) -> Result<CreatedPath> {
    let segs = split_path(input);
    check_path_policy(&segs)?;

    let entries = list_entries(session, "*").await?;
    let delimiter = discover_delimiter(session, &entries).await?;
    let existing: HashSet<String> = entries
        .iter()
        .filter(|e| e.is_selectable())
        .map(|e| normalize(&e.name, &delimiter))
        .collect();

    let direct = segs.join(&delimiter);
    let nested = nest_under_inbox(&segs);
    let nested_path = nested.join(&delimiter);
    if !existing.contains(&direct) && segs[0] != "INBOX" && existing.contains(&nested_path) {
        debug!("{} already exists under INBOX", nested_path);
        return verify(session, Vec::new(), nested_path, delimiter).await;
    }

    match materialize(session, &segs, &delimiter, &existing).await? {
        Attempt::Done(created) => verify(session, created, direct, delimiter).await,
        Attempt::TopLevelRejected(reason) if segs[0] != "INBOX" => {
            warn!(
                "Top-level CREATE refused ({}), retrying under INBOX",
                reason
            );
            match materialize(session, &nested, &delimiter, &existing).await? {
                Attempt::Done(created) => verify(session, created, nested_path, delimiter).await,
                Attempt::TopLevelRejected(reason) => Err(create_refused(&nested_path, &reason)),
            }
        }
        Attempt::TopLevelRejected(reason) => Err(create_refused(&direct, &reason)),
    }
}

fn nest_under_inbox(segs: &[String]) -> Vec<String> {
    if segs.first().is_some_and(|s| s == "INBOX") {
        segs.to_vec()
    } else {
        std::iter::once("INBOX".to_string())
            .chain(segs.iter().cloned())
            .collect()
    }
}

async fn materialize(
    session: &mut ImapSession,
    segs: &[String],
    delimiter: &str,
    existing: &HashSet<String>,
) -> Result<Attempt> {
    let mut created = Vec::new();
    for depth in 1..=segs.len() {
        let prefix = segs[..depth].join(delimiter);
        if prefix == "INBOX" || existing.contains(&prefix) {
            continue;
        }
        match session.create(&prefix).await {
            Ok(()) => {
                debug!("Created {}", prefix);
                created.push(prefix);
            }
            Err(e) if is_already_exists(&e) => debug!("{} already exists", prefix),
            Err(e) if is_transport_failure(&e) => {
                return Err(Error::imap(OPERATION, "CREATE")(e));
            }
            Err(e) if depth == 1 => return Ok(Attempt::TopLevelRejected(e.to_string())),
            Err(e) => return Err(create_refused(&prefix, &e.to_string())),
        }
    }
    Ok(Attempt::Done(created))
}

/// The final path must show up in a fresh listing.
async fn verify(
    session: &mut ImapSession,
    created: Vec<String>,
    full_path: String,
    delimiter: String,
) -> Result<CreatedPath> {
    let visible = list_entries(session, &full_path)
        .await?
        .iter()
        .any(|e| normalize(&e.name, &delimiter) == full_path);
    if !visible {
        return Err(Error::Protocol {
            operation: OPERATION,
            stage: "verify",
            message: format!("{full_path} is not listed after creation"),
        });
    }
    info!("Folder path {} ready ({} created)", full_path, created.len());
    Ok(CreatedPath {
        created,
        full_path,
        delimiter,
    })
}

fn create_refused(path: &str, reason: &str) -> Error {
    Error::Protocol {
        operation: OPERATION,
        stage: "CREATE",
        message: format!("{path}: {reason}"),
    }
}

/// Make sure a single mailbox exists, creating it if needed.
/// Reserved names are allowed here: this is how a missing Sent or
/// Drafts folder gets created.
pub(crate) async fn ensure_mailbox(session: &mut ImapSession, name: &str) -> Result<bool> {
    let listed = list_entries(session, name)
        .await?
        .iter()
        .any(|e| e.name == name);
    if listed {
        return Ok(false);
    }
    match session.create(name).await {
        Ok(()) => {
            info!("Created missing folder {}", name);
            Ok(true)
        }
        Err(e) if is_already_exists(&e) => Ok(false),
        Err(e) => Err(Error::imap("ensure folder", "CREATE")(e)),
    }
}
