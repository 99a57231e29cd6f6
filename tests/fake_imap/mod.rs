//! Fake IMAP server for integration testing
//!
//! An in-process IMAP server that speaks enough of the protocol to
//! drive `MailClient` end-to-end, including the quirks that make real
//! providers differ: missing `MOVE`, refused CHARSET searches,
//! top-level CREATE restrictions, ambiguous replies and injected
//! failures.
//!
//! ## Module layout
//!
//! - `server` -- TCP listener, TLS modes, and command dispatch
//! - `command` -- reads whole commands (literals included) into arguments
//! - `handlers/` -- one file per command family
//! - `structure` -- BODYSTRUCTURE rendering
//! - `mailbox` -- account state model (folders, emails, quirks, builder)
//! - `io` -- shared write helpers

#![allow(dead_code)]

pub mod mailbox;
mod structure;

pub use mailbox::{MailboxBuilder, Quirks};
pub use server::{FakeImapServer, Security};
