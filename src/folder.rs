//! Special-use categories and the resolved folder tree
//!
//! Servers name their Sent or Trash folders however they like. The
//! topology resolver maps each of them onto one [`SpecialUse`] and
//! builds a tree of [`MailboxNode`]s with exactly one node per
//! category.

use serde::Serialize;
use std::fmt;

/// A conventional mailbox role.
///
/// # Examples
///
/// ```
/// use mail_courier::SpecialUse;
///
/// assert_eq!(SpecialUse::Spam.label(), "Spam");
/// assert_eq!(SpecialUse::from_label("junk"), Some(SpecialUse::Spam));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum SpecialUse {
    Inbox,
    Sent,
    Drafts,
    Spam,
    Trash,
    Archive,
}

impl SpecialUse {
    /// Every category, in the order they appear at the top of a tree.
    pub const ALL: [Self; 6] = [
        Self::Inbox,
        Self::Sent,
        Self::Drafts,
        Self::Spam,
        Self::Trash,
        Self::Archive,
    ];

    /// Human-facing canonical label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Inbox => "Inbox",
            Self::Sent => "Sent",
            Self::Drafts => "Drafts",
            Self::Spam => "Spam",
            Self::Trash => "Trash",
            Self::Archive => "Archive",
        }
    }

    /// Folder name used when an account lacks this category and one
    /// has to be created.
    #[must_use]
    pub const fn default_path(self) -> &'static str {
        match self {
            Self::Inbox => "INBOX",
            other => other.label(),
        }
    }

    /// Look up a category by label or common alias, ignoring case.
    #[must_use]
    pub fn from_label(s: &str) -> Option<Self> {
        RESERVED_NAMES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(s.trim()))
            .map(|&(_, special)| special)
    }
}

impl fmt::Display for SpecialUse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Names that may never be the final segment of a newly created
/// folder, with the category each one stands for.
pub const RESERVED_NAMES: &[(&str, SpecialUse)] = &[
    ("Inbox", SpecialUse::Inbox),
    ("Sent", SpecialUse::Sent),
    ("Drafts", SpecialUse::Drafts),
    ("Spam", SpecialUse::Spam),
    ("Junk", SpecialUse::Spam),
    ("Trash", SpecialUse::Trash),
    ("Bin", SpecialUse::Trash),
    ("Deleted Items", SpecialUse::Trash),
    ("Archive", SpecialUse::Archive),
    ("All Mail", SpecialUse::Archive),
];

/// True if `name` is one of [`RESERVED_NAMES`], ignoring case.
#[must_use]
pub fn is_reserved_name(name: &str) -> bool {
    SpecialUse::from_label(name).is_some()
}

/// One node of the resolved folder tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxNode {
    /// The server's real mailbox name; pass this back to other
    /// operations.
    pub full_path: String,
    /// Canonical label for specials, leaf name otherwise.
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special: Option<SpecialUse>,
    pub children: Vec<Self>,
}

impl MailboxNode {
    #[must_use]
    pub fn new(full_path: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            full_path: full_path.into(),
            label: label.into(),
            special: None,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn special(full_path: impl Into<String>, special: SpecialUse) -> Self {
        Self {
            special: Some(special),
            ..Self::new(full_path, special.label())
        }
    }

    /// Depth-first iterator over this node and all of its descendants.
    pub fn walk(&self) -> impl Iterator<Item = &Self> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }
}

/// Find the node with `full_path` anywhere in `tree`.
#[must_use]
pub fn find_node<'a>(tree: &'a [MailboxNode], full_path: &str) -> Option<&'a MailboxNode> {
    tree.iter()
        .flat_map(MailboxNode::walk)
        .find(|n| n.full_path == full_path)
}

/// Find the node carrying `special` anywhere in `tree`.
#[must_use]
pub fn find_special(tree: &[MailboxNode], special: SpecialUse) -> Option<&MailboxNode> {
    tree.iter()
        .flat_map(MailboxNode::walk)
        .find(|n| n.special == Some(special))
}
