//! UID MOVE command handler (RFC 6851).
//!
//! Only answered when the mailbox advertises `MOVE`; otherwise the
//! command is unknown, as on a server without the extension. Each
//! moved message gets the destination's next UID and is reported
//! with `* N EXPUNGE` in the source.
//!
//! With the `ambiguous_move` quirk the move happens but the tagged
//! response is `NO`, the way a server can fail after committing.
//! With `refuse_move` the command is answered `NO` and nothing moves.

use crate::fake_imap::command::{Arg, expand_set};
use crate::fake_imap::handlers::Selected;
use crate::fake_imap::io::{tagged, write_line};
use crate::fake_imap::mailbox::Mailbox;
use std::sync::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

pub async fn handle_uid_move<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    args: &[Arg],
    mailbox: &Mutex<Mailbox>,
    selected: Option<&Selected>,
    stream: &mut BufReader<S>,
) {
    if !mailbox.lock().unwrap().has_capability("MOVE") {
        tagged(stream, tag, "BAD Unknown command").await;
        return;
    }
    let Some(selected) = selected.filter(|s| !s.read_only) else {
        tagged(stream, tag, "BAD No folder selected for writing").await;
        return;
    };
    let (Some(set), Some(dest)) = (
        args.first().and_then(Arg::as_str),
        args.get(1).and_then(Arg::as_str),
    ) else {
        tagged(stream, tag, "BAD Missing arguments").await;
        return;
    };

    let outcome = {
        let mut mb = mailbox.lock().unwrap();
        if mb.get_folder(dest).is_none() {
            Err("NO [TRYCREATE] Mailbox doesn't exist")
        } else if mb.quirks.refuse_move {
            Err("NO [UNAVAILABLE] Move temporarily unavailable")
        } else {
            let ambiguous = mb.quirks.ambiguous_move;
            let moving: Vec<_> = mb
                .get_folder(&selected.name)
                .map(|src| {
                    let uids = expand_set(set, &src.uids());
                    src.emails
                        .iter()
                        .filter(|e| uids.contains(&e.uid))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();

            let target = mb.get_folder_mut(dest).unwrap();
            for email in &moving {
                target.push_copy(email);
            }

            let mut expunged = Vec::new();
            if let Some(src) = mb.get_folder_mut(&selected.name) {
                for email in &moving {
                    if let Some(idx) = src.emails.iter().position(|e| e.uid == email.uid) {
                        src.emails.remove(idx);
                        expunged.push(idx + 1);
                    }
                }
            }
            Ok((expunged, ambiguous))
        }
    };

    match outcome {
        Err(status) => tagged(stream, tag, status).await,
        Ok((expunged, ambiguous)) => {
            for seq in expunged {
                if write_line(stream, &format!("* {seq} EXPUNGE\r\n")).await.is_err() {
                    return;
                }
            }
            if ambiguous {
                tagged(stream, tag, "NO [SERVERBUG] Move status unknown").await;
            } else {
                tagged(stream, tag, "OK MOVE completed").await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::command::tokenize;
    use crate::fake_imap::handlers::test_util::plain_email;
    use crate::fake_imap::io::collect_output;
    use crate::fake_imap::mailbox::{MailboxBuilder, Quirks};

    fn inbox() -> Selected {
        Selected {
            name: "INBOX".into(),
            read_only: false,
        }
    }

    fn account(with_move: bool, quirks: Quirks) -> Mutex<Mailbox> {
        let mut builder = MailboxBuilder::new().quirks(quirks);
        if with_move {
            builder = builder.capability("MOVE");
        }
        Mutex::new(
            builder
                .folder("INBOX")
                .email(3, false, &plain_email("One"))
                .email(4, false, &plain_email("Two"))
                .folder("Archive")
                .build(),
        )
    }

    async fn run(args: &str, mailbox: &Mutex<Mailbox>) -> String {
        let (client, server) = tokio::io::duplex(1024);
        let mut stream = BufReader::new(server);

        handle_uid_move("A1", &tokenize(args), mailbox, Some(&inbox()), &mut stream).await;
        drop(stream);

        collect_output(client).await
    }

    #[tokio::test]
    async fn moves_and_reports_expunge() {
        let mb = account(true, Quirks::default());

        let output = run("4 \"Archive\"", &mb).await;

        assert_eq!(output, "* 2 EXPUNGE\r\nA1 OK MOVE completed\r\n");
        let state = mb.lock().unwrap();
        assert_eq!(state.get_folder("INBOX").unwrap().uids(), [3]);
        assert_eq!(state.get_folder("Archive").unwrap().uids(), [1]);
    }

    #[tokio::test]
    async fn unknown_without_capability() {
        let mb = account(false, Quirks::default());
        assert_eq!(run("4 \"Archive\"", &mb).await, "A1 BAD Unknown command\r\n");
        assert_eq!(mb.lock().unwrap().get_folder("INBOX").unwrap().uids(), [3, 4]);
    }

    #[tokio::test]
    async fn ambiguous_move_commits_then_says_no() {
        let mb = account(
            true,
            Quirks {
                ambiguous_move: true,
                ..Quirks::default()
            },
        );

        let output = run("3 \"Archive\"", &mb).await;

        assert!(output.contains("A1 NO"));
        assert_eq!(mb.lock().unwrap().get_folder("INBOX").unwrap().uids(), [4]);
    }

    #[tokio::test]
    async fn refused_move_leaves_source_alone() {
        let mb = account(
            true,
            Quirks {
                refuse_move: true,
                ..Quirks::default()
            },
        );

        assert!(run("3 \"Archive\"", &mb).await.starts_with("A1 NO"));
        let state = mb.lock().unwrap();
        assert_eq!(state.get_folder("INBOX").unwrap().uids(), [3, 4]);
        assert!(state.get_folder("Archive").unwrap().emails.is_empty());
    }

    #[tokio::test]
    async fn missing_destination_asks_to_create() {
        let mb = account(true, Quirks::default());
        assert!(run("3 \"Nowhere\"", &mb).await.starts_with("A1 NO [TRYCREATE]"));
    }
}
