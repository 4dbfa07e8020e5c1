use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use shared::store::{change_message_status, remove_items, DetailView};
use shared::{
    Affected, BulkDelete, BulkStatusUpdate, ComposeRequest, Data, Folder, FolderCounts,
    ForwardRequest, MessageDetail, MessageListQuery, MessageStatus, MessageType, MessageView,
    NoData, ReplyRequest, ScheduleRequest, SortOrder, StatusUpdate, UploadedFile,
};

use super::{announce, read_body, write_export};
use crate::{client::ApiClient, render, screen::Screen};

#[derive(Subcommand)]
pub enum MessagesCommand {
    /// List a folder
    List {
        #[command(flatten)]
        filter: FolderFilter,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Show how many messages each folder holds
    Counts,
    /// Show a message and its thread; an unread message is marked read
    Show { id: String },
    /// Change the status of one message
    Status {
        id: String,
        /// UNREAD, READ, ARCHIVED or TRASH
        status: MessageStatus,
        /// Folder the message is listed in
        #[arg(long, default_value = "inbox")]
        folder: Folder,
    },
    /// Change the status of several messages at once
    BulkStatus {
        status: MessageStatus,
        #[arg(required = true)]
        ids: Vec<String>,
        #[arg(long, default_value = "inbox")]
        folder: Folder,
    },
    /// Send a new message now, at a later time, or keep it as a draft
    Compose {
        #[command(flatten)]
        draft: DraftArgs,
        /// Send at this time (RFC 3339) instead of now
        #[arg(long, conflicts_with = "save_as_draft")]
        at: Option<DateTime<Utc>>,
        #[arg(long)]
        save_as_draft: bool,
        /// Replace this existing draft
        #[arg(long)]
        draft_id: Option<String>,
    },
    /// Schedule a new message
    Schedule {
        #[command(flatten)]
        draft: DraftArgs,
        /// Delivery time (RFC 3339)
        #[arg(long)]
        at: DateTime<Utc>,
    },
    /// Reply to a message, threaded under it
    Reply {
        id: String,
        #[command(flatten)]
        body: BodyArgs,
        #[arg(long = "attach")]
        attachments: Vec<PathBuf>,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Forward a message and its attachments
    Forward {
        id: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "")]
        note: String,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Cancel a scheduled message; it becomes a draft
    Cancel { id: String },
    /// Deliver a scheduled message immediately
    SendNow { id: String },
    /// Delete messages permanently
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
        #[arg(long, default_value = "trash")]
        folder: Folder,
    },
    /// Permanently delete everything in the trash
    EmptyTrash,
    /// Export a folder as CSV
    Export {
        #[command(flatten)]
        filter: FolderFilter,
        /// Write to this file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(Args)]
pub struct FolderFilter {
    #[arg(long, default_value = "inbox")]
    folder: Folder,
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    from: Option<DateTime<Utc>>,
    #[arg(long)]
    to: Option<DateTime<Utc>>,
    /// Oldest first
    #[arg(long)]
    oldest: bool,
}

impl FolderFilter {
    fn query(&self, page: u32) -> MessageListQuery {
        MessageListQuery {
            page,
            status: self.folder,
            sort_by: if self.oldest { SortOrder::Oldest } else { SortOrder::Newest },
            search: self.search.clone(),
            date_from: self.from,
            date_to: self.to,
            ..MessageListQuery::default()
        }
    }
}

#[derive(Args)]
pub struct BodyArgs {
    /// HTML body
    #[arg(long, conflicts_with = "body_file")]
    body: Option<String>,
    /// Read the HTML body from a file
    #[arg(long)]
    body_file: Option<PathBuf>,
}

#[derive(Args)]
pub struct DraftArgs {
    /// Recipient address
    #[arg(long)]
    to: String,
    /// Recipient name
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    subject: String,
    #[command(flatten)]
    body: BodyArgs,
    /// Attach a local file (repeatable)
    #[arg(long = "attach")]
    attachments: Vec<PathBuf>,
}

fn folder_screen(folder: Folder) -> (Screen<MessageView>, MessageListQuery) {
    let query = MessageListQuery {
        status: folder,
        ..MessageListQuery::default()
    };
    (Screen::new("messages", &query), query)
}

async fn upload_all(api: &ApiClient, paths: &[PathBuf]) -> Result<Vec<UploadedFile>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let reply = api.upload(path).await?;
        tracing::info!("Uploaded {} as {}", path.display(), reply.data.url);
        files.push(reply.data);
    }
    Ok(files)
}

async fn compose_request(api: &ApiClient, draft: DraftArgs) -> Result<ComposeRequest> {
    Ok(ComposeRequest {
        name: draft.name,
        email: draft.to,
        subject: draft.subject,
        body: read_body(draft.body.body, draft.body.body_file)?,
        attachments: upload_all(api, &draft.attachments).await?,
        ..ComposeRequest::default()
    })
}

fn print_sent(reply_message: Option<String>, message: &MessageView) {
    announce(reply_message, "Done");
    println!("{}", message.id);
}

/// Opens the detail view. An unread inbound message is marked read once.
async fn show(api: &ApiClient, id: &str) -> Result<()> {
    let mut view = DetailView::mount(id);
    let mut detail = api.get::<MessageDetail>(&format!("/api/messages/{}", id)).await?.data;

    let unread = detail.message.kind == MessageType::Inbound
        && detail.message.status == MessageStatus::Unread;
    if let Some(id) = view.on_render(unread) {
        let update = StatusUpdate {
            status: MessageStatus::Read.to_string(),
        };
        match api
            .patch::<Data<MessageView>, _>(&format!("/api/messages/{}/status", id), &update)
            .await
        {
            Ok(reply) => detail.message.status = reply.data.data.status,
            Err(e) => tracing::warn!("Could not mark {} read: {}", id, e),
        }
    }
    render::message_detail(&detail);
    Ok(())
}

async fn change_status(
    api: &ApiClient,
    folder: Folder,
    ids: Vec<String>,
    target: MessageStatus,
) -> Result<()> {
    let (mut screen, query) = folder_screen(folder);
    screen.refresh(api, "/api/messages", &query).await?;

    let single = ids.len() == 1;
    let request = async {
        if single {
            let update = StatusUpdate {
                status: target.to_string(),
            };
            api.patch::<Data<MessageView>, _>(&format!("/api/messages/{}/status", ids[0]), &update)
                .await
                .map(|reply| reply.message)
        } else {
            let update = BulkStatusUpdate {
                ids: ids.clone(),
                status: target.to_string(),
            };
            api.post::<Affected, _>("/api/messages/bulk-status", &update)
                .await
                .map(|reply| reply.message)
        }
    };
    let outcome = screen
        .mutate(
            |list| change_message_status(list, folder, &ids, target),
            request,
        )
        .await;

    match outcome {
        Ok(message) => {
            announce(message, "Status updated");
            screen.refresh(api, "/api/messages", &query).await?;
        }
        Err(e) => {
            eprintln!("\x1b[31m✗ {}\x1b[0m", e);
            eprintln!("\x1b[90mNothing changed.\x1b[0m");
        }
    }
    if let Some(list) = screen.list() {
        render::messages(list);
    }
    Ok(())
}

async fn delete(api: &ApiClient, folder: Folder, ids: Vec<String>) -> Result<()> {
    let (mut screen, query) = folder_screen(folder);
    screen.refresh(api, "/api/messages", &query).await?;

    let request = async {
        if let [id] = ids.as_slice() {
            api.delete::<NoData>(&format!("/api/messages/{}", id))
                .await
                .map(|reply| reply.message)
        } else {
            api.post::<Affected, _>("/api/messages/bulk-delete", &BulkDelete { ids: ids.clone() })
                .await
                .map(|reply| reply.message)
        }
    };
    let message = screen.mutate(|list| remove_items(list, &ids), request).await?;
    announce(message, "Deleted");
    Ok(())
}

async fn empty_trash(api: &ApiClient) -> Result<()> {
    let (mut screen, query) = folder_screen(Folder::Trash);
    screen.refresh(api, "/api/messages", &query).await?;
    let ids: Vec<String> = screen
        .list()
        .map(|list| list.items.iter().map(|m| m.id.clone()).collect())
        .unwrap_or_default();

    let reply = screen
        .mutate(
            |list| remove_items(list, &ids),
            api.delete::<Affected>("/api/messages/trash"),
        )
        .await?;
    announce(reply.message, "Trash emptied");
    println!("{} messages deleted", reply.data.affected);
    Ok(())
}

pub async fn run(api: &ApiClient, command: MessagesCommand) -> Result<()> {
    match command {
        MessagesCommand::List { filter, page } => {
            let query = filter.query(page);
            let mut screen = Screen::new("messages", &query);
            screen.refresh(api, "/api/messages", &query).await?;
            if let Some(list) = screen.list() {
                render::messages(list);
            }
        }
        MessagesCommand::Counts => {
            let counts = api.get::<FolderCounts>("/api/messages/counts").await?.data;
            render::folder_counts(&counts);
        }
        MessagesCommand::Show { id } => show(api, &id).await?,
        MessagesCommand::Status { id, status, folder } => {
            change_status(api, folder, vec![id], status).await?
        }
        MessagesCommand::BulkStatus { status, ids, folder } => {
            change_status(api, folder, ids, status).await?
        }
        MessagesCommand::Compose {
            draft,
            at,
            save_as_draft,
            draft_id,
        } => {
            let mut request = compose_request(api, draft).await?;
            request.scheduled_for = at;
            request.save_as_draft = save_as_draft;
            let reply = match draft_id {
                Some(id) => {
                    api.put::<Data<MessageView>, _>(&format!("/api/messages/{}", id), &request)
                        .await?
                }
                None => {
                    api.post::<Data<MessageView>, _>("/api/messages/compose", &request)
                        .await?
                }
            };
            print_sent(reply.message, &reply.data.data);
        }
        MessagesCommand::Schedule { draft, at } => {
            let request = ScheduleRequest {
                payload: compose_request(api, draft).await?,
                send_at: at,
            };
            let reply = api
                .post::<Data<MessageView>, _>("/api/messages/schedule", &request)
                .await?;
            print_sent(reply.message, &reply.data.data);
        }
        MessagesCommand::Reply {
            id,
            body,
            attachments,
            at,
        } => {
            let request = ReplyRequest {
                body: read_body(body.body, body.body_file)?,
                attachments: upload_all(api, &attachments).await?,
                scheduled_for: at,
            };
            let reply = api
                .post::<Data<MessageView>, _>(&format!("/api/messages/{}/reply", id), &request)
                .await?;
            print_sent(reply.message, &reply.data.data);
        }
        MessagesCommand::Forward {
            id,
            to,
            name,
            note,
            at,
        } => {
            let request = ForwardRequest {
                email: to,
                name,
                note,
                scheduled_for: at,
            };
            let reply = api
                .post::<Data<MessageView>, _>(&format!("/api/messages/{}/forward", id), &request)
                .await?;
            print_sent(reply.message, &reply.data.data);
        }
        MessagesCommand::Cancel { id } => {
            let reply = api
                .post_empty::<Data<MessageView>>(&format!("/api/messages/{}/cancel", id))
                .await?;
            announce(reply.message, "Schedule cancelled");
        }
        MessagesCommand::SendNow { id } => {
            let reply = api
                .post_empty::<Data<MessageView>>(&format!("/api/messages/{}/send-now", id))
                .await?;
            announce(reply.message, "Message sent");
        }
        MessagesCommand::Delete { ids, folder } => delete(api, folder, ids).await?,
        MessagesCommand::EmptyTrash => empty_trash(api).await?,
        MessagesCommand::Export { filter, out } => {
            let csv = api
                .download("/api/messages/export", &filter.query(1))
                .await?;
            write_export(&csv, out.as_deref())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serde_json::json;

    #[derive(Parser)]
    struct Harness {
        #[command(subcommand)]
        command: MessagesCommand,
    }

    #[test]
    fn test_parses_status_and_folder() {
        let parsed = Harness::try_parse_from(["x", "status", "m1", "archived"]).unwrap();
        match parsed.command {
            MessagesCommand::Status { id, status, folder } => {
                assert_eq!(id, "m1");
                assert_eq!(status, MessageStatus::Archived);
                assert_eq!(folder, Folder::Inbox);
            }
            _ => panic!("wrong command"),
        }
        assert!(Harness::try_parse_from(["x", "status", "m1", "deleted"]).is_err());
    }

    #[test]
    fn test_compose_rejects_draft_with_time() {
        let result = Harness::try_parse_from([
            "x",
            "compose",
            "--to",
            "buyer@example.com",
            "--subject",
            "Offer",
            "--body",
            "<p>Hi</p>",
            "--save-as-draft",
            "--at",
            "2030-01-01T09:00:00Z",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_filter_builds_query() {
        let parsed = Harness::try_parse_from([
            "x", "list", "--folder", "sent", "--search", "lamb", "--oldest", "--page", "3",
        ])
        .unwrap();
        let MessagesCommand::List { filter, page } = parsed.command else {
            panic!("wrong command");
        };
        let query = filter.query(page);
        assert_eq!(query.status, Folder::Sent);
        assert_eq!(query.sort_by, SortOrder::Oldest);
        assert_eq!(query.search.as_deref(), Some("lamb"));
        assert_eq!(query.page, 3);
        assert_eq!(json!(query)["status"], "sent");
    }
}
