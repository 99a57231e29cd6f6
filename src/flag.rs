//! IMAP system flags used by STORE and APPEND

use std::fmt;

/// The system flags this crate sets or reads.
///
/// # Examples
///
/// ```
/// use mail_courier::Flag;
///
/// assert_eq!(Flag::list(&[Flag::Draft, Flag::Seen]), "(\\Draft \\Seen)");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    /// `\Seen`: read, and set on archived sent mail.
    Seen,
    /// `\Deleted`: removed by the next EXPUNGE.
    Deleted,
    /// `\Draft`
    Draft,
}

impl Flag {
    /// Wire form, leading backslash included.
    #[must_use]
    pub const fn as_imap_str(self) -> &'static str {
        match self {
            Self::Seen => "\\Seen",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
        }
    }

    /// Map a flag reported by the server; anything else is `None`.
    #[must_use]
    pub const fn from_server(flag: &async_imap::types::Flag<'_>) -> Option<Self> {
        use async_imap::types::Flag as F;
        match flag {
            F::Seen => Some(Self::Seen),
            F::Deleted => Some(Self::Deleted),
            F::Draft => Some(Self::Draft),
            _ => None,
        }
    }

    /// Parenthesised flag list, as APPEND and STORE expect it.
    #[must_use]
    pub fn list(flags: &[Self]) -> String {
        let names: Vec<&str> = flags.iter().map(|f| f.as_imap_str()).collect();
        format!("({})", names.join(" "))
    }

    /// `UID STORE` query adding `flags` without echoing FETCH replies.
    #[must_use]
    pub fn add_silently(flags: &[Self]) -> String {
        format!("+FLAGS.SILENT {}", Self::list(flags))
    }

    /// `UID STORE` query removing `flags`, also silent.
    #[must_use]
    pub fn remove_silently(flags: &[Self]) -> String {
        format!("-FLAGS.SILENT {}", Self::list(flags))
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_imap_str())
    }
}
