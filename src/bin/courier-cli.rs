#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for a mail account over IMAP, SMTP and POP3

use clap::{Parser, Subcommand};
use mail_courier::{
    AccountConfig, ListQuery, MailClient, MailboxNode, MessageDetail, MessageSummary,
    PartAddress, Protocol, SortOrder,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "courier-cli")]
#[command(about = "Mail account CLI for IMAP, SMTP and POP3 servers")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Open and close a session to check the account settings
    Check {
        /// Protocol to check (imap, smtp, pop3)
        #[arg(long, default_value = "imap")]
        protocol: Protocol,
    },

    /// Show the canonical folder tree
    Folders,

    /// List emails
    List {
        /// Folder to list from
        #[arg(long, default_value = "INBOX")]
        folder: String,

        /// Maximum number of emails to show (0 for all)
        #[arg(long, default_value = "20")]
        limit: usize,

        /// Number of emails to skip
        #[arg(long, default_value = "0")]
        offset: usize,

        /// Show only unread emails
        #[arg(long)]
        unread: bool,

        /// Show only emails from the last N days
        #[arg(long)]
        days: Option<u32>,

        /// Match this text in Subject or From
        #[arg(long)]
        text: Option<String>,

        /// Show only emails with attachments
        #[arg(long)]
        has_attachment: bool,

        /// Sort order (newest, oldest)
        #[arg(long, default_value = "newest")]
        sort: SortOrder,
    },

    /// Show a single email
    Show {
        /// Email UID (or sequence number)
        uid: u32,

        /// Folder containing the email
        #[arg(long, default_value = "INBOX")]
        folder: String,

        /// Message-ID to fall back on
        #[arg(long)]
        message_id: Option<String>,
    },

    /// Save one MIME part of an email to a file
    Attachment {
        /// Email UID
        uid: u32,

        /// Part address as shown by `show` (e.g. 2 or 2.1)
        part: String,

        /// Folder containing the email
        #[arg(long, default_value = "INBOX")]
        folder: String,

        /// Output file (defaults to the part's filename)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Create a folder path, creating missing parents
    Mkdir {
        /// Path using `/`, `\` or `.` as separators
        path: String,
    },

    /// Delete an empty leaf folder, moving its emails to the parent
    Rmdir {
        /// Server path of the folder
        path: String,
    },

    /// Move an email to another folder
    Move {
        /// Email UID
        uid: u32,

        /// Source folder
        #[arg(long, default_value = "INBOX")]
        from: String,

        /// Destination folder
        #[arg(long)]
        to: String,
    },

    /// Store a raw RFC 822 message in the Sent folder
    AppendSent {
        /// File holding the message
        file: PathBuf,
    },

    /// Store a raw RFC 822 message in the Drafts folder
    AppendDraft {
        /// File holding the message
        file: PathBuf,

        /// UID of the draft this one replaces
        #[arg(long)]
        replace: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = AccountConfig::from_env()?;
    let client = MailClient::new(config);

    match &args.command {
        Command::Check { protocol } => {
            client.check_connectivity(*protocol).await?;
            println!("{protocol} OK");
        }
        Command::Folders => cmd_folders(&client, &args).await?,
        Command::List {
            folder,
            limit,
            offset,
            unread,
            days,
            text,
            has_attachment,
            sort,
        } => {
            let query = ListQuery {
                folder: folder.clone(),
                text: text.clone(),
                sort: *sort,
                unread_only: *unread,
                last_n_days: *days,
                has_attachment: *has_attachment,
                limit: *limit,
                offset: *offset,
            };
            cmd_list(&client, &args, &query).await?;
        }
        Command::Show {
            uid,
            folder,
            message_id,
        } => {
            let detail = client
                .get_message(folder, *uid, message_id.as_deref())
                .await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&detail)?);
            } else {
                print_email_detail(&detail);
            }
        }
        Command::Attachment {
            uid,
            part,
            folder,
            output,
        } => {
            let part = PartAddress::from(part.as_str());
            let attachment = client.get_attachment_bytes(folder, *uid, &part).await?;
            let path = output
                .clone()
                .unwrap_or_else(|| PathBuf::from(&attachment.filename));
            std::fs::write(&path, &attachment.data)?;
            println!(
                "Saved {} ({}, {} bytes) to {}",
                attachment.filename,
                attachment.content_type,
                attachment.data.len(),
                path.display()
            );
        }
        Command::Mkdir { path } => {
            let created = client.create_folder_path(path).await?;
            print_result(&args, &created, || {
                format!(
                    "{} ready ({} created)",
                    created.full_path,
                    created.created.len()
                )
            })?;
        }
        Command::Rmdir { path } => {
            let deleted = client.delete_folder(path).await?;
            print_result(&args, &deleted, || {
                format!(
                    "Deleted {} ({} email(s) moved to {})",
                    deleted.path,
                    deleted.relocated.len(),
                    deleted.parent
                )
            })?;
        }
        Command::Move { uid, from, to } => {
            let outcome = client.move_message(from, *uid, to).await?;
            print_result(&args, &outcome, || {
                outcome.failed_stage.map_or_else(
                    || format!("Moved {uid} from {from} to {to}"),
                    |stage| {
                        format!(
                            "Move failed at {stage}: {}",
                            outcome.detail.as_deref().unwrap_or("-")
                        )
                    },
                )
            })?;
            if !outcome.ok {
                std::process::exit(2);
            }
        }
        Command::AppendSent { file } => {
            let raw = std::fs::read(file)?;
            let archived = client.append_sent(&raw).await?;
            print_result(&args, &archived, || format!("Stored in {}", archived.folder))?;
        }
        Command::AppendDraft { file, replace } => {
            let raw = std::fs::read(file)?;
            let archived = client.append_draft(&raw, *replace).await?;
            print_result(&args, &archived, || {
                if archived.replaced_previous {
                    format!("Stored in {} (previous draft removed)", archived.folder)
                } else {
                    format!("Stored in {}", archived.folder)
                }
            })?;
        }
    }

    Ok(())
}

async fn cmd_folders(client: &MailClient, args: &Args) -> anyhow::Result<()> {
    let topology = client.folder_tree().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&topology)?);
    } else {
        for node in &topology.tree {
            print_node(node, 0);
        }
    }

    Ok(())
}

async fn cmd_list(client: &MailClient, args: &Args, query: &ListQuery) -> anyhow::Result<()> {
    let emails = client.list_messages(query).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&emails)?);
    } else {
        print_email_table(&emails);
    }

    Ok(())
}

fn print_result<T: serde::Serialize>(
    args: &Args,
    value: &T,
    text: impl FnOnce() -> String,
) -> anyhow::Result<()> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text());
    }
    Ok(())
}

fn print_node(node: &MailboxNode, depth: usize) {
    let marker = node
        .special
        .map(|s| format!("  [{s}]"))
        .unwrap_or_default();
    println!(
        "{}{:<24} {}{marker}",
        "  ".repeat(depth),
        node.label,
        node.full_path
    );
    for child in &node.children {
        print_node(child, depth + 1);
    }
}

fn print_email_table(emails: &[MessageSummary]) {
    if emails.is_empty() {
        println!("No emails found.");
        return;
    }

    let header = format!("{:<8} {:<17} {:<30} {}", "UID", "Date", "From", "Subject");
    println!("{header}");
    println!("{}", "-".repeat(100));

    for email in emails {
        let date = email
            .date
            .map_or_else(|| "-".to_string(), |d| d.format("%Y-%m-%d %H:%M").to_string());
        let mut marks = String::new();
        if email.unread {
            marks.push('*');
        }
        if email.has_attachment {
            marks.push('@');
        }
        println!(
            "{:<8} {:<17} {:<30} {}{}",
            email.uid,
            date,
            truncate(&email.from, 28),
            truncate(&email.subject, 40),
            if marks.is_empty() {
                String::new()
            } else {
                format!(" {marks}")
            },
        );
    }

    println!("\n{} email(s)", emails.len());
}

fn print_email_detail(email: &MessageDetail) {
    let h = &email.headers;
    println!("UID:     {}", email.uid);
    if let Some(date) = h.date {
        println!("Date:    {}", date.format("%Y-%m-%d %H:%M:%S"));
    }
    println!("From:    {}", h.from);
    println!("To:      {}", h.to);
    if !h.cc.is_empty() {
        println!("CC:      {}", h.cc);
    }
    println!("Subject: {}", h.subject);
    println!("Msg-ID:  {}", h.message_id.as_deref().unwrap_or("-"));
    if let Some(parent) = &h.in_reply_to {
        println!("Reply-To-ID: {parent}");
    }

    println!("\n--- Body ---\n");
    match (&email.plain_body, &email.html_body) {
        (Some(text), _) => println!("{text}"),
        (None, Some(html)) => println!("{html}"),
        (None, None) => println!("(no text body)"),
    }

    if !email.attachments.is_empty() {
        println!("\n--- Attachments ---");
        for a in &email.attachments {
            println!(
                "  [{}] {} ({}, {} bytes)",
                a.address, a.filename, a.content_type, a.size
            );
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
