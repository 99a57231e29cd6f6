//! Test data model for the fake IMAP server
//!
//! Provides a builder-style API for constructing account state:
//!
//! ```ignore
//! let mailbox = MailboxBuilder::new()
//!     .delimiter("/")
//!     .capability("MOVE")
//!     .folder("INBOX")
//!         .email(1, false, raw_rfc2822_bytes)
//!     .folder_with("[Gmail]", &["\\Noselect"])
//!     .folder_with("[Gmail]/Sent Mail", &["\\Sent"])
//!     .build();
//! ```
//!
//! The `Mailbox` is shared with the server behind `Arc<Mutex<_>>`, so
//! tests can inspect it after the client has mutated it.

/// Server-side behaviour switches used to reproduce provider quirks.
#[derive(Debug, Clone, Default)]
pub struct Quirks {
    /// CREATE of a top-level mailbox is refused with `NO [CANNOT]`.
    pub restrict_top_level: bool,
    /// `SEARCH CHARSET ...` is refused with `NO [BADCHARSET]`.
    pub reject_charset: bool,
    /// UID MOVE performs the move, then answers `NO`.
    pub ambiguous_move: bool,
    /// UID MOVE is refused with `NO` and nothing moves.
    pub refuse_move: bool,
    /// Every UID COPY is refused.
    pub fail_copy: bool,
    /// The next N EXPUNGE commands are refused.
    pub fail_expunge: u32,
    /// `LIST "" ""` returns no delimiter line.
    pub silent_root: bool,
}

/// Complete account state: folders, capabilities and quirks.
#[derive(Debug, Clone)]
pub struct Mailbox {
    /// Hierarchy delimiter; `None` is sent as `NIL`.
    pub delimiter: Option<String>,
    pub capabilities: Vec<String>,
    pub folders: Vec<Folder>,
    pub quirks: Quirks,
    /// Accepted `(user, password)`; `None` accepts anything.
    pub credentials: Option<(String, String)>,
    /// Every command line received, in order.
    pub commands: Vec<String>,
}

impl Mailbox {
    /// Look up a folder by name (case-sensitive, except INBOX).
    pub fn get_folder(&self, name: &str) -> Option<&Folder> {
        self.folders.iter().find(|f| same_name(&f.name, name))
    }

    pub fn get_folder_mut(&mut self, name: &str) -> Option<&mut Folder> {
        self.folders.iter_mut().find(|f| same_name(&f.name, name))
    }

    pub fn has_capability(&self, cap: &str) -> bool {
        self.capabilities.iter().any(|c| c.eq_ignore_ascii_case(cap))
    }

    /// The delimiter, or `.` when the server has none.
    pub fn delim(&self) -> &str {
        self.delimiter.as_deref().unwrap_or(".")
    }

    /// Commands whose text contains `needle` (case-insensitive).
    pub fn commands_containing(&self, needle: &str) -> Vec<String> {
        let needle = needle.to_ascii_uppercase();
        self.commands
            .iter()
            .filter(|c| c.to_ascii_uppercase().contains(&needle))
            .cloned()
            .collect()
    }
}

fn same_name(a: &str, b: &str) -> bool {
    a == b || (a.eq_ignore_ascii_case("INBOX") && b.eq_ignore_ascii_case("INBOX"))
}

/// A single IMAP folder.
#[derive(Debug, Clone)]
pub struct Folder {
    pub name: String,
    /// LIST attributes, e.g. `\Noselect` or `\Sent`.
    pub attributes: Vec<String>,
    pub emails: Vec<TestEmail>,
    pub uid_next: u32,
}

impl Folder {
    pub fn new(name: &str, attributes: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            attributes: attributes.iter().map(|a| (*a).to_string()).collect(),
            emails: Vec::new(),
            uid_next: 1,
        }
    }

    pub fn is_selectable(&self) -> bool {
        !self
            .attributes
            .iter()
            .any(|a| a.eq_ignore_ascii_case("\\Noselect"))
    }

    /// Store a copy of `email` under the next free UID.
    pub fn push_copy(&mut self, email: &TestEmail) -> u32 {
        let uid = self.uid_next;
        self.uid_next += 1;
        self.emails.push(TestEmail {
            uid,
            deleted: false,
            ..email.clone()
        });
        uid
    }

    pub fn uids(&self) -> Vec<u32> {
        self.emails.iter().map(|e| e.uid).collect()
    }
}

/// A test email stored in a folder.
#[derive(Debug, Clone)]
pub struct TestEmail {
    pub uid: u32,
    pub seen: bool,
    pub deleted: bool,
    pub draft: bool,
    pub raw: Vec<u8>,
}

impl TestEmail {
    pub fn flags(&self) -> Vec<&'static str> {
        let mut flags = Vec::new();
        if self.seen {
            flags.push("\\Seen");
        }
        if self.deleted {
            flags.push("\\Deleted");
        }
        if self.draft {
            flags.push("\\Draft");
        }
        flags
    }
}

/// Builder for constructing a `Mailbox` step by step.
///
/// Call `.folder(name)` to start a new folder, then chain
/// `.email(uid, seen, raw)` calls to add messages to it.
pub struct MailboxBuilder {
    mailbox: Mailbox,
}

impl MailboxBuilder {
    pub fn new() -> Self {
        Self {
            mailbox: Mailbox {
                delimiter: Some("/".to_string()),
                capabilities: vec!["IMAP4rev1".to_string(), "STARTTLS".to_string()],
                folders: Vec::new(),
                quirks: Quirks::default(),
                credentials: None,
                commands: Vec::new(),
            },
        }
    }

    pub fn delimiter(mut self, delimiter: &str) -> Self {
        self.mailbox.delimiter = Some(delimiter.to_string());
        self
    }

    pub fn nil_delimiter(mut self) -> Self {
        self.mailbox.delimiter = None;
        self
    }

    pub fn capability(mut self, cap: &str) -> Self {
        self.mailbox.capabilities.push(cap.to_string());
        self
    }

    pub fn credentials(mut self, user: &str, password: &str) -> Self {
        self.mailbox.credentials = Some((user.to_string(), password.to_string()));
        self
    }

    pub fn quirks(mut self, quirks: Quirks) -> Self {
        self.mailbox.quirks = quirks;
        self
    }

    /// Add a new folder. Subsequent `.email()` calls add to this folder.
    pub fn folder(self, name: &str) -> Self {
        self.folder_with(name, &[])
    }

    /// Add a folder carrying LIST attributes.
    pub fn folder_with(mut self, name: &str, attributes: &[&str]) -> Self {
        self.mailbox.folders.push(Folder::new(name, attributes));
        self
    }

    /// Add an email to the most recently added folder.
    ///
    /// # Panics
    ///
    /// Panics if called before any `.folder()` call.
    pub fn email(mut self, uid: u32, seen: bool, raw: &[u8]) -> Self {
        let folder = self
            .mailbox
            .folders
            .last_mut()
            .expect("call .folder() before .email()");
        folder.emails.push(TestEmail {
            uid,
            seen,
            deleted: false,
            draft: false,
            raw: raw.to_vec(),
        });
        folder.uid_next = folder.uid_next.max(uid + 1);
        self
    }

    /// Consume the builder and return the finished `Mailbox`.
    pub fn build(self) -> Mailbox {
        self.mailbox
    }
}
