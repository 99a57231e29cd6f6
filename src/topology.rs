//! Folder topology resolver
//!
//! Discovers the hierarchy delimiter, enumerates every mailbox and
//! classifies the special-use ones into a single canonical tree.
//!
//! Classification runs through four ordered rules:
//!
//! 1. the name is `INBOX` (any case);
//! 2. the mailbox lives under a bracketed provider namespace such as
//!    `[Gmail]/` and its trailing segment is a known role;
//! 3. a top-level mailbox (or a direct child of `INBOX`) carries one
//!    of the common literal names;
//! 4. the server flags it with a special-use attribute.
//!
//! The first rule that matches decides the category. When several
//! mailboxes fall into the same category, the earliest rule wins,
//! then the one also carrying the matching server flag, then listing
//! order. The others are aliases and never appear in the tree.

use crate::connection::{ImapSession, quote};
use crate::error::{Error, Result};
use crate::folder::{MailboxNode, SpecialUse};
use async_imap::types::{Name, NameAttribute};
use futures::TryStreamExt;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

/// Delimiter assumed when the server never reveals one.
pub const DEFAULT_DELIMITER: &str = ".";

/// One line of a `LIST` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxEntry {
    pub name: String,
    pub delimiter: Option<String>,
    /// Attributes as sent on the wire, e.g. `\Noselect`, `\Sent`.
    pub attributes: Vec<String>,
}

impl MailboxEntry {
    #[must_use]
    pub fn new(name: impl Into<String>, delimiter: Option<&str>, attributes: &[&str]) -> Self {
        Self {
            name: name.into(),
            delimiter: delimiter.map(str::to_string),
            attributes: attributes.iter().map(|a| (*a).to_string()).collect(),
        }
    }

    pub(crate) fn from_name(name: &Name) -> Self {
        Self {
            name: name.name().to_string(),
            delimiter: name.delimiter().map(str::to_string),
            attributes: name
                .attributes()
                .iter()
                .filter_map(attribute_text)
                .collect(),
        }
    }

    #[must_use]
    pub fn has_attribute(&self, attr: &str) -> bool {
        self.attributes.iter().any(|a| a.eq_ignore_ascii_case(attr))
    }

    /// False for `\Noselect` containers and `\NonExistent` placeholders.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        !self.has_attribute("\\Noselect") && !self.has_attribute("\\NonExistent")
    }
}

fn attribute_text(attr: &NameAttribute<'_>) -> Option<String> {
    let text = match attr {
        NameAttribute::NoSelect => "\\Noselect",
        NameAttribute::All => "\\All",
        NameAttribute::Archive => "\\Archive",
        NameAttribute::Drafts => "\\Drafts",
        NameAttribute::Junk => "\\Junk",
        NameAttribute::Sent => "\\Sent",
        NameAttribute::Trash => "\\Trash",
        NameAttribute::Extension(s) => return Some(s.to_string()),
        _ => return None,
    };
    Some(text.to_string())
}

/// Which classification rule matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Rule {
    Inbox,
    Bracketed,
    LiteralName,
    ServerFlag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub special: SpecialUse,
    pub rule: Rule,
    /// The server also flagged the mailbox with this category.
    pub flagged: bool,
}

/// Provider naming conventions, as ordered lookup tables.
#[derive(Debug, Clone, Copy)]
pub struct Heuristics {
    /// Trailing segments under a bracketed namespace (`[Gmail]/...`).
    pub bracketed: &'static [(&'static str, SpecialUse)],
    /// Literal names of top-level mailboxes.
    pub names: &'static [(&'static str, SpecialUse)],
    /// Special-use attributes.
    pub flags: &'static [(&'static str, SpecialUse)],
}

impl Heuristics {
    pub const DEFAULT: Self = Self {
        bracketed: &[
            ("All Mail", SpecialUse::Archive),
            ("Sent Mail", SpecialUse::Sent),
            ("Sent", SpecialUse::Sent),
            ("Drafts", SpecialUse::Drafts),
            ("Spam", SpecialUse::Spam),
            ("Junk", SpecialUse::Spam),
            ("Trash", SpecialUse::Trash),
            ("Bin", SpecialUse::Trash),
        ],
        names: &[
            ("Sent", SpecialUse::Sent),
            ("Sent Items", SpecialUse::Sent),
            ("Sent Messages", SpecialUse::Sent),
            ("Drafts", SpecialUse::Drafts),
            ("Spam", SpecialUse::Spam),
            ("Junk", SpecialUse::Spam),
            ("Trash", SpecialUse::Trash),
            ("Bin", SpecialUse::Trash),
            ("Deleted Items", SpecialUse::Trash),
            ("Archive", SpecialUse::Archive),
            ("All Mail", SpecialUse::Archive),
        ],
        flags: &[
            ("\\Sent", SpecialUse::Sent),
            ("\\Drafts", SpecialUse::Drafts),
            ("\\Trash", SpecialUse::Trash),
            ("\\Junk", SpecialUse::Spam),
            ("\\Archive", SpecialUse::Archive),
            ("\\All", SpecialUse::Archive),
        ],
    };

    /// Classify one mailbox. `delimiter` is used when the entry
    /// carries none of its own.
    #[must_use]
    pub fn classify(&self, entry: &MailboxEntry, delimiter: &str) -> Option<Classification> {
        if !entry.is_selectable() {
            return None;
        }
        let delim = entry.delimiter.as_deref().unwrap_or(delimiter);
        let segs = segments(&entry.name, delim);
        let last = segs.last().copied().unwrap_or_default();
        let flag_match = lookup(self.flags, |f| entry.has_attribute(f));

        let by_name = if entry.name.eq_ignore_ascii_case("INBOX") {
            Some((SpecialUse::Inbox, Rule::Inbox))
        } else if is_bracketed(&segs) {
            lookup(self.bracketed, |n| n.eq_ignore_ascii_case(last))
                .map(|s| (s, Rule::Bracketed))
        } else if is_personal_level(&segs) {
            lookup(self.names, |n| n.eq_ignore_ascii_case(last)).map(|s| (s, Rule::LiteralName))
        } else {
            None
        };

        by_name
            .map(|(special, rule)| Classification {
                special,
                rule,
                flagged: flag_match == Some(special),
            })
            .or_else(|| {
                flag_match.map(|special| Classification {
                    special,
                    rule: Rule::ServerFlag,
                    flagged: true,
                })
            })
    }
}

impl Default for Heuristics {
    fn default() -> Self {
        Self::DEFAULT
    }
}

fn lookup(
    table: &[(&'static str, SpecialUse)],
    matches: impl Fn(&str) -> bool,
) -> Option<SpecialUse> {
    table
        .iter()
        .find(|(key, _)| matches(key))
        .map(|&(_, special)| special)
}

pub(crate) fn segments<'a>(name: &'a str, delimiter: &str) -> Vec<&'a str> {
    if delimiter.is_empty() {
        vec![name]
    } else {
        name.split(delimiter).collect()
    }
}

fn is_bracketed(segs: &[&str]) -> bool {
    segs.len() >= 2 && segs[0].starts_with('[') && segs[0].ends_with(']')
}

/// True if the mailbox lives under a provider's bracketed namespace.
#[must_use]
pub fn is_under_bracketed_namespace(name: &str, delimiter: &str) -> bool {
    is_bracketed(&segments(name, delimiter))
}

fn is_personal_level(segs: &[&str]) -> bool {
    segs.len() == 1 || (segs.len() == 2 && segs[0].eq_ignore_ascii_case("INBOX"))
}

/// Resolved folder tree plus the hierarchy information behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Topology {
    pub tree: Vec<MailboxNode>,
    pub delimiter: String,
    /// `INBOX<delim>` when every personal mailbox lives under INBOX.
    pub namespace_prefix: Option<String>,
}

impl Topology {
    /// Real path of the canonical mailbox for `special`, if any.
    #[must_use]
    pub fn special_path(&self, special: SpecialUse) -> Option<&str> {
        crate::folder::find_special(&self.tree, special).map(|n| n.full_path.as_str())
    }
}

/// Resolve the account's topology on an open session.
pub async fn resolve(session: &mut ImapSession) -> Result<Topology> {
    resolve_with(session, &Heuristics::DEFAULT).await
}

/// [`resolve`] with caller-supplied heuristics.
pub async fn resolve_with(session: &mut ImapSession, heuristics: &Heuristics) -> Result<Topology> {
    let entries = list_entries(session, "*").await?;
    let delimiter = discover_delimiter(session, &entries).await?;
    let namespace_prefix = infer_namespace_prefix(&entries, &delimiter);
    let tree = build_tree(&entries, &delimiter, heuristics)?;
    info!(
        "Resolved {} mailboxes into {} top-level folders (delimiter {:?})",
        entries.len(),
        tree.len(),
        delimiter
    );
    Ok(Topology {
        tree,
        delimiter,
        namespace_prefix,
    })
}

/// `LIST "" <pattern>`.
pub(crate) async fn list_entries(
    session: &mut ImapSession,
    pattern: &str,
) -> Result<Vec<MailboxEntry>> {
    let names: Vec<Name> = session
        .list(
            Some(""),
            Some(&quote(pattern).map_err(Error::imap("list folders", "LIST"))?),
        )
        .await
        .map_err(Error::imap("list folders", "LIST"))?
        .try_collect()
        .await
        .map_err(Error::imap("list folders", "LIST"))?;
    Ok(names.iter().map(MailboxEntry::from_name).collect())
}

/// Find the hierarchy delimiter.
///
/// Asks the server with `LIST "" ""`; if that yields nothing, infers
/// it from a listed child of INBOX; otherwise falls back to `"."`.
pub(crate) async fn discover_delimiter(
    session: &mut ImapSession,
    entries: &[MailboxEntry],
) -> Result<String> {
    match list_entries(session, "").await {
        Ok(root) => {
            if let Some(d) = root.iter().find_map(|e| e.delimiter.clone()) {
                debug!("Server reports delimiter {:?}", d);
                return Ok(d);
            }
        }
        Err(Error::Connectivity(msg)) => return Err(Error::Connectivity(msg)),
        Err(e) => debug!("Delimiter query rejected: {}", e),
    }

    if let Some(d) = infer_delimiter(entries) {
        debug!("Inferred delimiter {:?} from listing", d);
        return Ok(d);
    }
    debug!("No delimiter found, assuming {:?}", DEFAULT_DELIMITER);
    Ok(DEFAULT_DELIMITER.to_string())
}

/// Infer the delimiter from any mailbox naming a child of INBOX,
/// preferring the delimiter field of that line.
#[must_use]
pub fn infer_delimiter(entries: &[MailboxEntry]) -> Option<String> {
    entries.iter().find_map(|e| {
        let head = e.name.get(..5)?;
        let rest = e.name.get(5..)?;
        if !head.eq_ignore_ascii_case("INBOX") || rest.is_empty() {
            return None;
        }
        if let Some(d) = e.delimiter.as_deref().filter(|d| rest.starts_with(d)) {
            return Some(d.to_string());
        }
        let c = rest.chars().next()?;
        (!c.is_alphanumeric() && c != '_' && c != '-').then(|| c.to_string())
    })
}

/// `INBOX<delim>` if every mailbox other than INBOX lives beneath it.
#[must_use]
pub fn infer_namespace_prefix(entries: &[MailboxEntry], delimiter: &str) -> Option<String> {
    let prefix = format!("INBOX{delimiter}");
    let mut others = entries
        .iter()
        .filter(|e| !e.name.eq_ignore_ascii_case("INBOX"))
        .peekable();
    others.peek()?;
    others
        .all(|e| {
            e.name
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(&prefix))
        })
        .then_some(prefix)
}

/// Case-normalise a leading INBOX segment so lookups ignore its case.
pub(crate) fn normalize(name: &str, delimiter: &str) -> String {
    let mut segs = segments(name, delimiter);
    if segs.first().is_some_and(|s| s.eq_ignore_ascii_case("INBOX")) {
        segs[0] = "INBOX";
    }
    segs.join(delimiter)
}

/// Build the canonical tree from a listing.
///
/// Fails only if the single-canonical-node invariant would be broken,
/// which indicates a bug rather than a server quirk.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if a category ends up with two nodes.
pub fn build_tree(
    entries: &[MailboxEntry],
    delimiter: &str,
    heuristics: &Heuristics,
) -> Result<Vec<MailboxNode>> {
    let mut entries = entries.to_vec();
    let mut classes: Vec<Option<Classification>> = entries
        .iter()
        .map(|e| heuristics.classify(e, delimiter))
        .collect();

    if !classes
        .iter()
        .flatten()
        .any(|c| c.special == SpecialUse::Inbox)
    {
        entries.push(MailboxEntry::new("INBOX", Some(delimiter), &[]));
        classes.push(Some(Classification {
            special: SpecialUse::Inbox,
            rule: Rule::Inbox,
            flagged: false,
        }));
    }

    let rank = |c: &Classification, idx: usize| (c.rule, !c.flagged, idx);
    let mut canonical: HashMap<SpecialUse, usize> = HashMap::new();
    for (i, class) in classes.iter().enumerate() {
        let Some(class) = class else { continue };
        let replace = canonical.get(&class.special).is_none_or(|&j| {
            classes[j].is_some_and(|other| rank(class, i) < rank(&other, j))
        });
        if replace {
            canonical.insert(class.special, i);
        }
    }

    let is_canonical = |i: usize| {
        classes[i].is_some_and(|c| canonical.get(&c.special) == Some(&i))
    };
    let alias_of = |i: usize| -> Option<usize> {
        let c = classes[i]?;
        let target = *canonical.get(&c.special)?;
        (target != i).then_some(target)
    };
    let kept: Vec<bool> = (0..entries.len())
        .map(|i| is_canonical(i) || (classes[i].is_none() && entries[i].is_selectable()))
        .collect();

    let mut index: HashMap<String, usize> = HashMap::new();
    for (i, e) in entries.iter().enumerate() {
        index.insert(normalize(&e.name, delimiter), i);
    }
    // The real INBOX always wins the lookup over a noselect twin.
    if let Some(&inbox) = canonical.get(&SpecialUse::Inbox) {
        index.insert("INBOX".to_string(), inbox);
    }

    let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut top_level: Vec<usize> = Vec::new();
    for i in 0..entries.len() {
        if !kept[i] || is_canonical(i) {
            continue;
        }
        let delim = entries[i].delimiter.as_deref().unwrap_or(delimiter);
        let segs = segments(&entries[i].name, delim);
        let parent = (1..segs.len()).rev().find_map(|k| {
            let j = *index.get(&normalize(&segs[..k].join(delim), delimiter))?;
            if kept[j] { Some(j) } else { alias_of(j) }
        });
        match parent {
            Some(p) => children.entry(p).or_default().push(i),
            None => top_level.push(i),
        }
    }

    let mut tree = Vec::new();
    for special in SpecialUse::ALL {
        if let Some(&i) = canonical.get(&special) {
            tree.push(make_node(i, &entries, &classes, &children, delimiter));
        }
    }
    for i in top_level {
        tree.push(make_node(i, &entries, &classes, &children, delimiter));
    }

    let aliases: Vec<&str> = (0..entries.len())
        .filter(|&i| alias_of(i).is_some())
        .map(|i| entries[i].name.as_str())
        .collect();
    check_single_canonical(&tree, &aliases)?;
    Ok(tree)
}

fn make_node(
    i: usize,
    entries: &[MailboxEntry],
    classes: &[Option<Classification>],
    children: &HashMap<usize, Vec<usize>>,
    delimiter: &str,
) -> MailboxNode {
    let entry = &entries[i];
    let mut node = match classes[i] {
        Some(c) => MailboxNode::special(&entry.name, c.special),
        None => {
            let delim = entry.delimiter.as_deref().unwrap_or(delimiter);
            let leaf = segments(&entry.name, delim)
                .last()
                .copied()
                .unwrap_or(entry.name.as_str());
            MailboxNode::new(&entry.name, leaf)
        }
    };
    node.children = children
        .get(&i)
        .map(|kids| {
            kids.iter()
                .map(|&k| make_node(k, entries, classes, children, delimiter))
                .collect()
        })
        .unwrap_or_default();
    node
}

/// Each category at most once, and no alias surfaced as a node.
///
/// # Errors
///
/// Returns [`Error::Protocol`] describing the first violation.
pub fn check_single_canonical(tree: &[MailboxNode], aliases: &[&str]) -> Result<()> {
    let mut seen: HashMap<SpecialUse, &str> = HashMap::new();
    for node in tree.iter().flat_map(MailboxNode::walk) {
        if aliases.contains(&node.full_path.as_str()) {
            return Err(invariant(format!(
                "alias {} surfaced as a folder",
                node.full_path
            )));
        }
        if let Some(special) = node.special
            && let Some(first) = seen.insert(special, &node.full_path)
        {
            return Err(invariant(format!(
                "{special} resolved twice ({first} and {})",
                node.full_path
            )));
        }
    }
    Ok(())
}

fn invariant(message: String) -> Error {
    Error::Protocol {
        operation: "folder tree",
        stage: "classification",
        message,
    }
}
