//! Mail protocol client library
//!
//! Talks IMAP, SMTP and POP3 to arbitrary providers (Gmail, Outlook,
//! Dovecot, bridges with self-signed certificates) and hides their
//! differences behind one [`MailClient`]:
//!
//! - a canonical folder tree with exactly one Inbox, Sent, Drafts,
//!   Spam, Trash and Archive, whatever the server calls them;
//! - idempotent nested folder creation and guarded deletion;
//! - message listing, retrieval with stable MIME part addresses and
//!   attachment download;
//! - moves that survive servers without `MOVE` and retries;
//! - archiving of sent messages and drafts.
//!
//! Each call opens its own authenticated session and releases it
//! before returning.

mod archive;
mod client;
mod config;
mod connection;
mod error;
mod flag;
mod folder;
mod folder_create;
mod folder_delete;
mod listing;
mod mime;
mod pop3;
mod relocate;
mod retrieve;
mod smtp;
mod topology;

pub use archive::Archived;
pub use client::MailClient;
pub use config::{AccountConfig, DEFAULT_TIMEOUT, Endpoint, Protocol, SecurityMode, Transport};
pub use connection::Session;
pub use error::{Error, Result};
pub use flag::Flag;
pub use folder::{MailboxNode, RESERVED_NAMES, SpecialUse, find_node, find_special, is_reserved_name};
pub use folder_create::{CreatedPath, check_path_policy, split_path};
pub use folder_delete::{DeletedFolder, check_deletable, parent_path};
pub use listing::{FETCH_BATCH, ListQuery, MessageSummary, SortOrder};
pub use mime::{AttachmentInfo, Attachment, MessageDetail, MessageHeaders, PartAddress};
pub use pop3::{MaildropStat, Pop3Session};
pub use relocate::{MoveMethod, MoveOutcome, MoveStage};
pub use smtp::SmtpSession;
pub use topology::{
    Classification, DEFAULT_DELIMITER, Heuristics, MailboxEntry, Rule, Topology, build_tree,
    check_single_canonical,
};
