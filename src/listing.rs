//! Message lister
//!
//! Searches one folder, fetches light summaries in batches and applies
//! ordering and pagination on the client side.

use crate::connection::{ImapSession, examine, quote};
use crate::error::{Error, Result, is_transport_failure};
use crate::flag::Flag;
use crate::mime::format_addresses;
use async_imap::imap_proto::types::BodyStructure;
use async_imap::types::Fetch;
use chrono::{DateTime, Days, NaiveDate, Utc};
use futures::TryStreamExt;
use mail_parser::MessageParser;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::str::FromStr;
use tracing::{debug, warn};

const OPERATION: &str = "list messages";

/// UIDs fetched per `UID FETCH` round trip.
pub const FETCH_BATCH: usize = 200;

const FETCH_ITEMS: &str =
    "(UID FLAGS BODYSTRUCTURE BODY.PEEK[HEADER.FIELDS (SUBJECT FROM DATE MESSAGE-ID)])";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Newest first.
    #[default]
    DateDesc,
    DateAsc,
}

impl FromStr for SortOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "date-desc" | "desc" | "newest" => Ok(Self::DateDesc),
            "date-asc" | "asc" | "oldest" => Ok(Self::DateAsc),
            other => Err(Error::Config(format!("Unknown sort order: {other}"))),
        }
    }
}

/// What to list and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub folder: String,
    /// Matched against Subject or From.
    pub text: Option<String>,
    pub sort: SortOrder,
    pub unread_only: bool,
    pub last_n_days: Option<u32>,
    pub has_attachment: bool,
    /// Zero means no limit.
    pub limit: usize,
    pub offset: usize,
}

impl ListQuery {
    pub fn new(folder: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            text: None,
            sort: SortOrder::default(),
            unread_only: false,
            last_n_days: None,
            has_attachment: false,
            limit: 0,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSummary {
    pub uid: u32,
    pub subject: String,
    pub from: String,
    pub date: Option<DateTime<Utc>>,
    pub message_id: Option<String>,
    pub unread: bool,
    pub has_attachment: bool,
}

/// Search criteria shared by every search of one listing.
#[must_use]
pub fn base_criteria(query: &ListQuery, today: NaiveDate) -> String {
    let mut criteria = String::from("ALL");
    if query.unread_only {
        criteria.push_str(" UNSEEN");
    }
    if let Some(days) = query.last_n_days {
        let since = today
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or(NaiveDate::MIN);
        criteria.push_str(&format!(" SINCE {}", since.format("%d-%b-%Y")));
    }
    criteria
}

/// List messages in `query.folder`.
///
/// A text filter runs two searches (Subject, From) and unions the
/// results. Each search first declares `CHARSET UTF-8` and is retried
/// without it if the server refuses.
pub async fn list_messages(
    session: &mut ImapSession,
    query: &ListQuery,
) -> Result<Vec<MessageSummary>> {
    examine(session, &query.folder).await?;

    let base = base_criteria(query, Utc::now().date_naive());
    let text = query
        .text
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());

    let uids: BTreeSet<u32> = match text {
        Some(text) => {
            let mut all = BTreeSet::new();
            for field in ["SUBJECT", "FROM"] {
                let needle = quote(text).map_err(Error::imap(OPERATION, "UID SEARCH"))?;
                let criteria = format!("{base} {field} {needle}");
                all.extend(search_with_charset(session, &criteria).await?);
            }
            all
        }
        None => search(session, &base).await?,
    };
    debug!("{} matched {} message(s)", query.folder, uids.len());

    let uids: Vec<u32> = uids.into_iter().collect();
    let mut summaries = Vec::with_capacity(uids.len());
    for batch in uids.chunks(FETCH_BATCH) {
        let fetches: Vec<Fetch> = session
            .uid_fetch(uid_set(batch), FETCH_ITEMS)
            .await
            .map_err(Error::imap(OPERATION, "UID FETCH"))?
            .try_collect()
            .await
            .map_err(Error::imap(OPERATION, "UID FETCH"))?;
        summaries.extend(fetches.iter().filter_map(summarize));
    }

    if query.has_attachment {
        summaries.retain(|s| s.has_attachment);
    }
    sort_summaries(&mut summaries, query.sort);
    Ok(paginate(summaries, query.offset, query.limit))
}

async fn search(session: &mut ImapSession, criteria: &str) -> Result<BTreeSet<u32>> {
    Ok(session
        .uid_search(criteria)
        .await
        .map_err(Error::imap(OPERATION, "UID SEARCH"))?
        .into_iter()
        .collect())
}

async fn search_with_charset(session: &mut ImapSession, criteria: &str) -> Result<BTreeSet<u32>> {
    match session.uid_search(format!("CHARSET UTF-8 {criteria}")).await {
        Ok(uids) => Ok(uids.into_iter().collect()),
        Err(e) if is_transport_failure(&e) => Err(Error::imap(OPERATION, "UID SEARCH")(e)),
        Err(e) => {
            warn!("CHARSET search refused ({}), retrying without it", e);
            search(session, criteria).await
        }
    }
}

/// Comma-joined UID set.
pub(crate) fn uid_set(uids: &[u32]) -> String {
    uids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn summarize(fetch: &Fetch) -> Option<MessageSummary> {
    let uid = fetch.uid?;
    let seen = fetch
        .flags()
        .any(|f| Flag::from_server(&f) == Some(Flag::Seen));
    let has_attachment = fetch.bodystructure().is_some_and(has_attachment);
    Some(summary_from_header(
        uid,
        fetch.header().unwrap_or_default(),
        seen,
        has_attachment,
    ))
}

fn summary_from_header(uid: u32, header: &[u8], seen: bool, has_attachment: bool) -> MessageSummary {
    let parsed = MessageParser::default().parse(header);
    let (subject, from, date, message_id) = parsed.as_ref().map_or_else(
        || (String::new(), String::new(), None, None),
        |m| {
            (
                m.subject().unwrap_or_default().to_string(),
                format_addresses(m.from()),
                m.date()
                    .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0)),
                m.message_id().map(str::to_string),
            )
        },
    );
    MessageSummary {
        uid,
        subject,
        from,
        date,
        message_id,
        unread: !seen,
        has_attachment,
    }
}

/// True when any node has a filename or an `attachment` disposition.
///
/// Multipart containers are searched; an embedded message is judged
/// as a single node, matching how retrieval addresses it.
#[must_use]
pub fn has_attachment(bs: &BodyStructure<'_>) -> bool {
    match bs {
        BodyStructure::Basic { common, .. }
        | BodyStructure::Text { common, .. }
        | BodyStructure::Message { common, .. } => {
            let by_disposition = common.disposition.as_ref().is_some_and(|d| {
                d.ty.eq_ignore_ascii_case("attachment")
                    || d.params
                        .as_ref()
                        .is_some_and(|p| p.iter().any(|(k, _)| k.eq_ignore_ascii_case("filename")))
            });
            let by_name = common
                .ty
                .params
                .as_ref()
                .is_some_and(|p| p.iter().any(|(k, _)| k.eq_ignore_ascii_case("name")));
            by_disposition || by_name
        }
        BodyStructure::Multipart { bodies, .. } => bodies.iter().any(has_attachment),
    }
}

/// Order by date, undated messages last; ties by UID in the same
/// direction.
pub fn sort_summaries(summaries: &mut [MessageSummary], order: SortOrder) {
    let directed = |o: Ordering| match order {
        SortOrder::DateAsc => o,
        SortOrder::DateDesc => o.reverse(),
    };
    summaries.sort_by(|a, b| match (a.date, b.date) {
        (Some(x), Some(y)) => directed(x.cmp(&y).then(a.uid.cmp(&b.uid))),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => directed(a.uid.cmp(&b.uid)),
    });
}

#[must_use]
pub fn paginate<T>(items: Vec<T>, offset: usize, limit: usize) -> Vec<T> {
    let rest = items.into_iter().skip(offset);
    if limit == 0 {
        rest.collect()
    } else {
        rest.take(limit).collect()
    }
}
