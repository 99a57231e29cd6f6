//! SELECT and EXAMINE command handler.
//!
//! Opens a folder and responds with metadata. The key pieces are:
//!
//! - `* N EXISTS` -- total number of messages in the folder.
//! - `* OK [UIDVALIDITY V]` -- changes if the folder's UID space is
//!   reset.
//! - `[READ-WRITE]` or `[READ-ONLY]` in the tagged OK.
//!
//! Missing and `\Noselect` folders are refused with `NO`.

use crate::fake_imap::io::{tagged, write_line};
use crate::fake_imap::mailbox::Mailbox;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// The folder a session has open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selected {
    pub name: String,
    pub read_only: bool,
}

pub async fn handle_select<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    folder_name: &str,
    read_only: bool,
    mailbox: &Mailbox,
    stream: &mut BufReader<S>,
) -> Option<Selected> {
    let command = if read_only { "EXAMINE" } else { "SELECT" };
    let Some(folder) = mailbox.get_folder(folder_name).filter(|f| f.is_selectable()) else {
        tagged(stream, tag, "NO [NONEXISTENT] Folder not found").await;
        return None;
    };

    let _ = write_line(
        stream,
        "* FLAGS (\\Seen \\Answered \\Flagged \\Deleted \\Draft)\r\n",
    )
    .await;
    let _ = write_line(stream, &format!("* {} EXISTS\r\n", folder.emails.len())).await;
    let _ = write_line(stream, "* 0 RECENT\r\n").await;
    let _ = write_line(stream, "* OK [UIDVALIDITY 1]\r\n").await;
    let _ = write_line(stream, &format!("* OK [UIDNEXT {}]\r\n", folder.uid_next)).await;
    let _ = write_line(
        stream,
        "* OK [PERMANENTFLAGS (\\Seen \\Deleted \\Draft)] Limited\r\n",
    )
    .await;

    let access = if read_only { "READ-ONLY" } else { "READ-WRITE" };
    tagged(stream, tag, &format!("OK [{access}] {command} completed")).await;
    Some(Selected {
        name: folder.name.clone(),
        read_only,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::handlers::test_util::plain_email;
    use crate::fake_imap::io::collect_output;
    use crate::fake_imap::mailbox::MailboxBuilder;

    async fn run(folder_name: &str, read_only: bool, mailbox: &Mailbox) -> (String, Option<Selected>) {
        let (client, server) = tokio::io::duplex(4096);
        let mut stream = BufReader::new(server);

        let selected = handle_select("A1", folder_name, read_only, mailbox, &mut stream).await;
        drop(stream);

        (collect_output(client).await, selected)
    }

    #[tokio::test]
    async fn selects_existing_folder() {
        let raw = plain_email("Test");
        let mailbox = MailboxBuilder::new()
            .folder("INBOX")
            .email(1, false, &raw)
            .email(2, true, &raw)
            .build();

        let (output, selected) = run("INBOX", false, &mailbox).await;

        assert_eq!(selected.map(|s| s.name), Some("INBOX".to_string()));
        assert!(output.contains("* 2 EXISTS"));
        assert!(output.contains("A1 OK [READ-WRITE] SELECT completed"));
    }

    #[tokio::test]
    async fn examine_is_read_only() {
        let mailbox = MailboxBuilder::new().folder("Archive").build();
        let (output, selected) = run("Archive", true, &mailbox).await;

        assert!(selected.unwrap().read_only);
        assert!(output.contains("A1 OK [READ-ONLY] EXAMINE completed"));
    }

    #[tokio::test]
    async fn inbox_is_case_insensitive() {
        let mailbox = MailboxBuilder::new().folder("INBOX").build();
        let (_, selected) = run("inbox", false, &mailbox).await;
        assert_eq!(selected.map(|s| s.name), Some("INBOX".to_string()));
    }

    #[tokio::test]
    async fn missing_folder_is_refused() {
        let mailbox = MailboxBuilder::new().folder("INBOX").build();
        let (output, selected) = run("NoSuchFolder", false, &mailbox).await;

        assert!(selected.is_none());
        assert!(output.starts_with("A1 NO"));
    }

    #[tokio::test]
    async fn noselect_folder_is_refused() {
        let mailbox = MailboxBuilder::new()
            .folder_with("[Gmail]", &["\\Noselect"])
            .build();
        let (output, selected) = run("[Gmail]", true, &mailbox).await;

        assert!(selected.is_none());
        assert!(output.starts_with("A1 NO"));
    }

    #[tokio::test]
    async fn uidnext_follows_highest_uid() {
        let raw = plain_email("Test");
        let mailbox = MailboxBuilder::new()
            .folder("INBOX")
            .email(5, true, &raw)
            .email(10, true, &raw)
            .build();
        let (output, _) = run("INBOX", false, &mailbox).await;
        assert!(output.contains("* OK [UIDNEXT 11]"));
    }
}
