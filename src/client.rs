//! Mail client facade

use crate::archive::{self, Archived};
use crate::config::{AccountConfig, Protocol};
use crate::connection::{self, ImapSession, Session};
use crate::error::Result;
use crate::folder_create::{self, CreatedPath};
use crate::folder_delete::{self, DeletedFolder};
use crate::listing::{self, ListQuery, MessageSummary};
use crate::mime::{Attachment, MessageDetail, PartAddress};
use crate::relocate::{self, MoveOutcome};
use crate::retrieve;
use crate::topology::{self, Topology};
use tracing::{debug, info};

/// Client for one mail account.
///
/// Holds only configuration. Every call opens its own session and
/// releases it before returning, whether the call succeeded or not.
#[derive(Debug, Clone)]
pub struct MailClient {
    config: AccountConfig,
}

impl MailClient {
    #[must_use]
    pub const fn new(config: AccountConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &AccountConfig {
        &self.config
    }

    /// Open and release a session for `protocol`.
    ///
    /// # Errors
    ///
    /// Returns `Connectivity` or `Auth` when the session cannot be
    /// established.
    pub async fn check_connectivity(&self, protocol: Protocol) -> Result<()> {
        let mut session = Session::open(&self.config, protocol).await?;
        let outcome = match &mut session {
            Session::Pop3(pop3) => pop3
                .stat()
                .await
                .map(|stat| debug!("Maildrop holds {} message(s)", stat.count)),
            _ => Ok(()),
        };
        session.release().await;
        outcome?;
        info!("{} connectivity check passed for {}", protocol, self.config.address);
        Ok(())
    }

    /// Resolve the canonical folder tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or LIST fails.
    pub async fn folder_tree(&self) -> Result<Topology> {
        self.with_imap(async |s| topology::resolve(s).await).await
    }

    /// List message summaries matching `query`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a missing folder, or an error if SEARCH
    /// or FETCH fails.
    pub async fn list_messages(&self, query: &ListQuery) -> Result<Vec<MessageSummary>> {
        self.with_imap(async |s| listing::list_messages(s, query).await)
            .await
    }

    /// Retrieve one message by UID, sequence number or Message-ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no lookup finds the message.
    pub async fn get_message(
        &self,
        folder: &str,
        id: u32,
        correlation_id: Option<&str>,
    ) -> Result<MessageDetail> {
        self.with_imap(async |s| retrieve::get_message(s, folder, id, correlation_id).await)
            .await
    }

    /// Decoded bytes of one MIME part.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the message or the part is absent.
    pub async fn get_attachment_bytes(
        &self,
        folder: &str,
        id: u32,
        part: &PartAddress,
    ) -> Result<Attachment> {
        self.with_imap(async |s| retrieve::get_attachment_bytes(s, folder, id, part).await)
            .await
    }

    /// Create a nested folder path.
    ///
    /// # Errors
    ///
    /// Returns `Policy` for empty or reserved paths and `Protocol`
    /// when the server refuses or the result is not visible.
    pub async fn create_folder_path(&self, path: &str) -> Result<CreatedPath> {
        self.with_imap(async |s| folder_create::create_folder_path(s, path).await)
            .await
    }

    /// Delete a user folder, relocating its messages to the parent.
    ///
    /// # Errors
    ///
    /// Returns `Policy`, `NotFound` or `PartialFailure`.
    pub async fn delete_folder(&self, path: &str) -> Result<DeletedFolder> {
        self.with_imap(async |s| folder_delete::delete_folder(s, path).await)
            .await
    }

    /// Move one message between folders.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the message is not in `from`. Stage
    /// failures are reported in the returned outcome.
    pub async fn move_message(&self, from: &str, uid: u32, to: &str) -> Result<MoveOutcome> {
        self.with_imap(async |s| relocate::move_message(s, from, uid, to).await)
            .await
    }

    /// Store a sent message in the Sent folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder cannot be resolved or APPEND
    /// fails.
    pub async fn append_sent(&self, raw: &[u8]) -> Result<Archived> {
        self.with_imap(async |s| archive::append_sent(s, raw).await)
            .await
    }

    /// Store a draft, replacing `previous_draft_id` if given.
    ///
    /// # Errors
    ///
    /// Returns `PartialFailure` if the new draft was stored but the
    /// previous one could not be removed.
    pub async fn append_draft(
        &self,
        raw: &[u8],
        previous_draft_id: Option<u32>,
    ) -> Result<Archived> {
        self.with_imap(async |s| archive::append_draft(s, raw, previous_draft_id).await)
            .await
    }

    async fn with_imap<T>(&self, op: impl AsyncFnOnce(&mut ImapSession) -> Result<T>) -> Result<T> {
        let mut session = connection::connect(&self.config).await?;
        let result = op(&mut session).await;
        connection::release(session).await;
        result
    }
}
